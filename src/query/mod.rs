//! Query model and its translation to document store filters.
//!
//! ```text
//! Predicates → PredicateTranslator → Filter (pushed down) + local checks
//!                                        ↓
//!                                  ResultIterator (scroll pages)
//! ```

pub mod cursor;
pub mod filter;
pub mod predicate;
pub mod translate;

pub use cursor::{CursorOptions, PageDecoder, ResultIterator};
pub use filter::{Filter, RangeBounds};
pub use predicate::{Compare, HasContainer, Predicates, PropertyKey};
pub use translate::{PredicateTranslator, Translation};
