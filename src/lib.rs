//! # docgraph
//!
//! A property graph stored in a document index.
//!
//! Vertices are documents. Edges are stored one of two ways:
//!
//! - **Embedded**: grouped inside the document of one endpoint, under a
//!   field named by an [`EdgeMapping`]
//! - **Standalone**: as documents of their own, routed by the out-vertex id
//!
//! The graph layer picks the encoding per vertex label, translates graph
//! predicates into store filters, and resolves edge endpoints lazily in
//! batched multi-gets.
//!
//! ## Architecture
//!
//! ```text
//! QueryRouter → ElementHandler (embedded / standalone)
//!                    ↓
//!   PredicateTranslator → ResultIterator ← LazyGetter
//!                    ↓
//!   MutationBatcher / SchemaProvider → DocumentBackend (memory or HTTP)
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use docgraph::{properties, Direction, EdgeMapping, Element, GraphConfig, InMemoryBackend, QueryRouter};
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let router = QueryRouter::builder(GraphConfig::default(), backend)
//!     .embedded("person", vec![EdgeMapping::new("created", "software", Direction::Out, "created")])
//!     .standalone("software")
//!     .build()
//!     .unwrap();
//!
//! let marko = router.add_vertex(Some("1".into()), "person", properties([("name", "marko")])).unwrap();
//! let lop = router.add_vertex(Some("3".into()), "software", properties([("name", "lop")])).unwrap();
//! let created = router.add_edge(&marko, &lop, "created", None, properties([("weight", 0.4)])).unwrap();
//! assert!(created.is_embedded());
//! assert_eq!(created.out_id(), marko.id());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod handler;
pub mod layout;
pub mod lazy;
pub mod mapping;
pub mod mutation;
pub mod query;
pub mod router;
pub mod schema;
pub mod timing;
pub mod types;

// Re-exports
pub use backend::{BackendError, DocRef, Document, DocumentBackend, InMemoryBackend, RequestKind, WriteOp};
#[cfg(feature = "http")]
pub use backend::{HttpBackend, HttpBackendConfig};
pub use config::GraphConfig;
pub use error::{GraphError, GraphResult};
pub use graph::Graph;
pub use handler::{ElementHandler, EmbeddedHandler, StandaloneHandler};
pub use layout::TypeLayout;
pub use lazy::{BatchContext, LazyGetter, LazyVertex, Placeholder};
pub use mapping::{EdgeMapping, Encoding, LabelRegistry, MappingSet};
pub use mutation::{BatchMode, DocumentSource, MutationBatcher};
pub use query::{Compare, Filter, HasContainer, PredicateTranslator, Predicates, PropertyKey, ResultIterator};
pub use router::{properties, QueryRouter, RouterBuilder};
pub use schema::SchemaProvider;
pub use timing::TimingAccessor;
pub use types::{Direction, Edge, EdgeLocation, Element, ElementId, ElementKind, Property, Value, Vertex};
pub use types::vertex::PropertyMap;
