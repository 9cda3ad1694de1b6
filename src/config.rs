//! Graph configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::layout::TypeLayout;
use crate::mutation::BatchMode;

/// Configuration for one graph instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Physical index holding every document of the graph.
    pub index_name: String,
    /// Search page size.
    pub scroll_size: usize,
    /// Scroll context keep-alive in seconds.
    pub scroll_keep_alive_secs: u64,
    /// Refresh the index before each search.
    pub refresh: bool,
    /// Immediate or bulk writes.
    pub batch_mode: BatchMode,
    /// Health wait at startup in seconds.
    pub health_timeout_secs: u64,
    /// Label-to-type layout.
    pub layout: TypeLayout,
}

impl GraphConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            index_name: std::env::var("DOCGRAPH_INDEX_NAME").unwrap_or_else(|_| "graph".to_string()),
            scroll_size: std::env::var("DOCGRAPH_SCROLL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            scroll_keep_alive_secs: std::env::var("DOCGRAPH_SCROLL_KEEP_ALIVE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            refresh: std::env::var("DOCGRAPH_REFRESH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            batch_mode: match std::env::var("DOCGRAPH_BULK").ok().as_deref() {
                Some("1") | Some("true") | Some("bulk") => BatchMode::Bulk,
                _ => BatchMode::Immediate,
            },
            health_timeout_secs: std::env::var("DOCGRAPH_HEALTH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            layout: match std::env::var("DOCGRAPH_SHARED_TYPE") {
                Ok(doc_type) if !doc_type.is_empty() => TypeLayout::Shared { doc_type },
                _ => TypeLayout::PerLabel,
            },
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> GraphResult<()> {
        if self.index_name.is_empty() || self.index_name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(GraphError::InvalidConfig(format!(
                "index name '{}' must be non-empty and lowercase",
                self.index_name
            )));
        }
        if self.scroll_size == 0 {
            return Err(GraphError::InvalidConfig("scroll_size must be positive".to_string()));
        }
        if self.scroll_keep_alive_secs == 0 {
            return Err(GraphError::InvalidConfig(
                "scroll_keep_alive_secs must be positive".to_string(),
            ));
        }
        if let TypeLayout::Shared { doc_type } = &self.layout {
            if doc_type.is_empty() || doc_type.starts_with('_') {
                return Err(GraphError::InvalidConfig(format!(
                    "shared type name '{}' is not usable",
                    doc_type
                )));
            }
        }
        Ok(())
    }

    /// Scroll keep-alive as a duration.
    pub fn scroll_keep_alive(&self) -> Duration {
        Duration::from_secs(self.scroll_keep_alive_secs)
    }

    /// Health wait as a duration.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Builder-style index name override.
    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    /// Builder-style batch mode override.
    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    /// Builder-style layout override.
    pub fn with_layout(mut self, layout: TypeLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder-style scroll size override.
    pub fn with_scroll_size(mut self, scroll_size: usize) -> Self {
        self.scroll_size = scroll_size;
        self
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            index_name: "graph".to_string(),
            scroll_size: 100,
            scroll_keep_alive_secs: 60,
            refresh: false,
            batch_mode: BatchMode::Immediate,
            health_timeout_secs: 10,
            layout: TypeLayout::PerLabel,
        }
    }
}
