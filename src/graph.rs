//! Shared graph context.
//!
//! One [`Graph`] is created per router and shared by every handler and
//! every element handle through an `Arc`.

use std::fmt;
use std::sync::Arc;

use crate::backend::{Document, DocumentBackend};
use crate::config::GraphConfig;
use crate::error::GraphResult;
use crate::layout::TypeLayout;
use crate::mapping::LabelRegistry;
use crate::mutation::MutationBatcher;
use crate::query::cursor::{CursorOptions, ResultIterator};
use crate::query::filter::Filter;
use crate::query::translate::PredicateTranslator;
use crate::schema::SchemaProvider;
use crate::timing::TimingAccessor;

/// Backend, configuration and per-graph services.
pub struct Graph {
    config: GraphConfig,
    backend: Arc<dyn DocumentBackend>,
    registry: LabelRegistry,
    mutations: MutationBatcher,
    schema: SchemaProvider,
    translator: PredicateTranslator,
    timing: TimingAccessor,
}

impl Graph {
    /// Assemble a graph context. Does not touch the backend.
    pub fn new(config: GraphConfig, backend: Arc<dyn DocumentBackend>, registry: LabelRegistry) -> GraphResult<Self> {
        config.validate()?;
        let timing = TimingAccessor::new();
        let mutations = MutationBatcher::new(Arc::clone(&backend), config.batch_mode, timing.clone());
        let schema = SchemaProvider::new(
            Arc::clone(&backend),
            config.index_name.clone(),
            config.health_timeout(),
            timing.clone(),
        );
        let translator = PredicateTranslator::new(config.layout.clone());
        Ok(Self {
            config,
            backend,
            registry,
            mutations,
            schema,
            translator,
            timing,
        })
    }

    /// Configuration.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The document index.
    pub fn index(&self) -> &str {
        &self.config.index_name
    }

    /// Label-to-type layout.
    pub fn layout(&self) -> &TypeLayout {
        &self.config.layout
    }

    /// Backend client.
    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    /// Label registry.
    pub fn registry(&self) -> &LabelRegistry {
        &self.registry
    }

    /// Write batcher.
    pub fn mutations(&self) -> &MutationBatcher {
        &self.mutations
    }

    /// Schema provider.
    pub fn schema(&self) -> &SchemaProvider {
        &self.schema
    }

    /// Predicate translator.
    pub fn translator(&self) -> &PredicateTranslator {
        &self.translator
    }

    /// Round-trip timers.
    pub fn timing(&self) -> &TimingAccessor {
        &self.timing
    }

    /// Open a cursor over the graph's index.
    pub fn search<T, F>(&self, filter: Filter, cap: Option<usize>, decode: F) -> ResultIterator<T>
    where
        F: FnMut(Vec<Document>) -> GraphResult<Vec<T>> + Send + 'static,
    {
        let options = CursorOptions {
            indices: vec![self.config.index_name.clone()],
            page_size: self.config.scroll_size,
            keep_alive: self.config.scroll_keep_alive(),
            cap,
            refresh: self.config.refresh,
        };
        ResultIterator::new(
            Arc::clone(&self.backend),
            filter,
            options,
            self.timing.clone(),
            Box::new(decode),
        )
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("index", &self.config.index_name)
            .field("layout", &self.config.layout)
            .field("batch_mode", &self.config.batch_mode)
            .finish()
    }
}
