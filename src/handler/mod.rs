//! Encoding handlers.
//!
//! Each handler serves the vertex labels of one encoding. The router picks
//! a handler by label and merges results across handlers.
//!
//! ```text
//!                  QueryRouter
//!                 /     |      \
//!   EmbeddedHandler  EmbeddedHandler  StandaloneHandler
//!     ("person")       ("team")       (other labels + standalone edges)
//! ```

pub mod embedded;
pub mod standalone;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::Document;
use crate::error::GraphResult;
use crate::graph::Graph;
use crate::query::predicate::Predicates;
use crate::query::translate::Translation;
use crate::types::vertex::PropertyMap;
use crate::types::{Direction, Edge, Element, ElementId, Vertex};

pub use embedded::EmbeddedHandler;
pub use standalone::StandaloneHandler;

/// Boxed lazy element sequence.
pub type ElementIter<T> = Box<dyn Iterator<Item = GraphResult<T>> + Send>;

/// Adjacent edges grouped by the seed vertex they were found for.
pub type AdjacentEdges = BTreeMap<ElementId, Vec<Edge>>;

/// Operations every encoding supports.
pub trait ElementHandler: Send + Sync {
    /// Vertex labels served.
    fn vertex_labels(&self) -> Vec<String>;

    /// Vertices of the served labels matching the predicates.
    fn vertices(&self, predicates: &Predicates) -> GraphResult<ElementIter<Vertex>>;

    /// Create a vertex; `None` generates an id.
    fn add_vertex(&self, id: Option<ElementId>, label: &str, properties: PropertyMap) -> GraphResult<Vertex>;

    /// Edges stored by this encoding matching the predicates.
    fn edges(&self, predicates: &Predicates) -> GraphResult<ElementIter<Edge>>;

    /// Edges stored by this encoding with the given ids.
    fn edges_by_ids(&self, ids: &[ElementId]) -> GraphResult<Vec<Edge>>;

    /// Edges stored by this encoding that touch the seeds in a direction
    /// (seen from the seed), grouped by seed id.
    ///
    /// The row window of `predicates` is ignored; callers apply it after
    /// merging encodings.
    fn adjacent_edges(
        &self,
        seeds: &[Vertex],
        direction: Direction,
        edge_labels: &[String],
        predicates: &Predicates,
    ) -> GraphResult<AdjacentEdges>;
}

/// Apply a row window to a fallible sequence.
///
/// Errors are never skipped; they are terminal for the underlying cursor.
pub(crate) fn window<T, I>(iter: I, predicates: &Predicates) -> ElementIter<T>
where
    T: 'static,
    I: Iterator<Item = GraphResult<T>> + Send + 'static,
{
    let mut skip = predicates.limit_low;
    let take = predicates.window_len().unwrap_or(usize::MAX);
    Box::new(
        iter.filter(move |r| {
            if r.is_ok() && skip > 0 {
                skip -= 1;
                return false;
            }
            true
        })
        .take(take),
    )
}

/// Search, decode, apply local constraints, then the window.
///
/// When every constraint was pushed down, the window's upper bound becomes
/// the cursor cap.
pub(crate) fn search_elements<T, F>(
    graph: &Graph,
    translation: Translation,
    predicates: &Predicates,
    decode: F,
) -> ElementIter<T>
where
    T: Element + Send + 'static,
    F: FnMut(Vec<Document>) -> GraphResult<Vec<T>> + Send + 'static,
{
    let cap = if translation.is_exact() {
        predicates.limit_high
    } else {
        None
    };
    let cursor = graph.search(translation.filter.clone(), cap, decode);
    let filtered = cursor.filter(move |r| match r {
        Ok(e) => translation.test_local(e),
        Err(_) => true,
    });
    window(filtered, predicates)
}

/// Empty sequence.
pub(crate) fn empty<T: 'static>() -> ElementIter<T> {
    Box::new(std::iter::empty())
}

/// Keep the graph alive inside decoders.
pub(crate) fn vertex_decoder(graph: &Arc<Graph>) -> impl FnMut(Vec<Document>) -> GraphResult<Vec<Vertex>> + Send + 'static {
    let graph = Arc::clone(graph);
    move |docs| {
        let batch = crate::lazy::BatchContext::new();
        docs.into_iter()
            .map(|doc| Vertex::from_document(&graph, doc, &batch))
            .collect()
    }
}
