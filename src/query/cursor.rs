//! Scroll-based result cursor.
//!
//! ```text
//! Uninitialized ──search──▶ Paging ──scroll──▶ Paging
//!        │                    │
//!        └── cap == 0 ──▶ Exhausted ◀── empty page / cap reached / error
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Document, DocumentBackend, SearchPage, SearchRequest};
use crate::error::GraphResult;
use crate::query::filter::Filter;
use crate::timing::TimingAccessor;

/// Page decoder supplied by the caller.
pub type PageDecoder<T> = Box<dyn FnMut(Vec<Document>) -> GraphResult<Vec<T>> + Send>;

enum CursorState {
    Uninitialized,
    Paging { scroll_id: Option<String> },
    Exhausted,
}

/// Search parameters for a cursor.
#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Indices to search.
    pub indices: Vec<String>,
    /// Page size.
    pub page_size: usize,
    /// Scroll keep-alive.
    pub keep_alive: Duration,
    /// Maximum number of decoded elements to yield.
    pub cap: Option<usize>,
    /// Refresh the indices before the first search.
    pub refresh: bool,
}

/// Lazy, forward-only, non-restartable sequence of decoded search hits.
///
/// Never yields more than `cap` elements. Any backend or decode failure is
/// yielded once and ends the sequence.
pub struct ResultIterator<T> {
    backend: Arc<dyn DocumentBackend>,
    filter: Filter,
    options: CursorOptions,
    timing: TimingAccessor,
    decode: PageDecoder<T>,
    state: CursorState,
    buffer: VecDeque<T>,
    yielded: usize,
}

impl<T> ResultIterator<T> {
    /// Create a cursor; no request is issued until the first `next`.
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        filter: Filter,
        options: CursorOptions,
        timing: TimingAccessor,
        decode: PageDecoder<T>,
    ) -> Self {
        Self {
            backend,
            filter,
            options,
            timing,
            decode,
            state: CursorState::Uninitialized,
            buffer: VecDeque::new(),
            yielded: 0,
        }
    }

    /// Number of elements yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Whether the cursor has reached its terminal state.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, CursorState::Exhausted) && self.buffer.is_empty()
    }

    fn remaining(&self) -> Option<usize> {
        self.options.cap.map(|c| c.saturating_sub(self.yielded))
    }

    fn first_page(&mut self) -> GraphResult<SearchPage> {
        if self.options.refresh {
            let _t = self.timing.time("refresh");
            self.backend.refresh(&self.options.indices)?;
        }
        let size = match self.remaining() {
            Some(r) => r.min(self.options.page_size),
            None => self.options.page_size,
        };
        let request = SearchRequest {
            indices: self.options.indices.clone(),
            filter: self.filter.clone(),
            size: size.max(1),
            scroll: Some(self.options.keep_alive),
        };
        let _t = self.timing.time("search");
        let page = self.backend.search(&request)?;
        tracing::debug!(
            indices = ?self.options.indices,
            size,
            total = page.total,
            hits = page.hits.len(),
            "Search page"
        );
        Ok(page)
    }

    fn next_page(&mut self, scroll_id: &str) -> GraphResult<SearchPage> {
        let _t = self.timing.time("scroll");
        let page = self.backend.scroll(scroll_id, self.options.keep_alive)?;
        tracing::debug!(hits = page.hits.len(), "Scroll page");
        Ok(page)
    }

    fn finish(&mut self) {
        let previous = std::mem::replace(&mut self.state, CursorState::Exhausted);
        if let CursorState::Paging { scroll_id: Some(id) } = previous {
            if let Err(e) = self.backend.clear_scroll(&id) {
                tracing::warn!(error = %e, "Failed to clear scroll context");
            }
        }
    }

    /// Fetch and decode the next page into the buffer.
    fn fill(&mut self) -> GraphResult<()> {
        let page = match &self.state {
            CursorState::Uninitialized => self.first_page()?,
            CursorState::Paging { scroll_id: Some(id) } => {
                let id = id.clone();
                self.next_page(&id)?
            }
            CursorState::Paging { scroll_id: None } | CursorState::Exhausted => {
                self.finish();
                return Ok(());
            }
        };

        if page.hits.is_empty() {
            self.state = CursorState::Paging { scroll_id: page.scroll_id };
            self.finish();
            return Ok(());
        }
        self.state = CursorState::Paging { scroll_id: page.scroll_id };
        let decoded = (self.decode)(page.hits)?;
        self.buffer.extend(decoded);
        Ok(())
    }
}

impl<T> Iterator for ResultIterator<T> {
    type Item = GraphResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining() == Some(0) {
                self.buffer.clear();
                if !matches!(self.state, CursorState::Exhausted) {
                    self.finish();
                }
                return None;
            }
            if let Some(item) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(item));
            }
            if matches!(self.state, CursorState::Exhausted) {
                return None;
            }
            if let Err(e) = self.fill() {
                self.finish();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fields, InMemoryBackend, RequestKind, WriteOp};

    fn backend_with(n: usize) -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        for i in 0..n {
            backend
                .execute(WriteOp::Index {
                    target: crate::backend::DocRef::new("graph", "person", format!("{:03}", i)),
                    routing: None,
                    source: Fields::new(),
                    create: true,
                })
                .unwrap();
        }
        backend
    }

    fn cursor(backend: Arc<InMemoryBackend>, cap: Option<usize>, page_size: usize) -> ResultIterator<String> {
        ResultIterator::new(
            backend,
            Filter::MatchAll,
            CursorOptions {
                indices: vec!["graph".into()],
                page_size,
                keep_alive: Duration::from_secs(60),
                cap,
                refresh: false,
            },
            TimingAccessor::new(),
            Box::new(|docs| Ok(docs.into_iter().map(|d| d.id).collect())),
        )
    }

    #[test]
    fn test_pages_until_empty() {
        let backend = backend_with(7);
        let ids: Vec<_> = cursor(backend.clone(), None, 3).map(|r| r.unwrap()).collect();
        assert_eq!(ids.len(), 7);
        assert_eq!(ids[0], "000");
        assert_eq!(backend.request_count(RequestKind::Search), 1);
        // pages of 3, 3, 1, then the empty page
        assert_eq!(backend.request_count(RequestKind::Scroll), 3);
    }

    #[test]
    fn test_cap_is_never_exceeded() {
        let backend = backend_with(10);
        let ids: Vec<_> = cursor(backend, Some(4), 3).map(|r| r.unwrap()).collect();
        assert_eq!(ids, vec!["000", "001", "002", "003"]);
    }

    #[test]
    fn test_zero_cap_issues_no_request() {
        let backend = backend_with(3);
        assert_eq!(cursor(backend.clone(), Some(0), 3).count(), 0);
        assert_eq!(backend.request_count(RequestKind::Search), 0);
    }

    #[test]
    fn test_decode_error_is_fatal() {
        let backend = backend_with(5);
        let mut it: ResultIterator<String> = ResultIterator::new(
            backend,
            Filter::MatchAll,
            CursorOptions {
                indices: vec!["graph".into()],
                page_size: 2,
                keep_alive: Duration::from_secs(60),
                cap: None,
                refresh: false,
            },
            TimingAccessor::new(),
            Box::new(|_| Err(crate::error::GraphError::decode("x", "bad"))),
        );
        assert!(matches!(it.next(), Some(Err(_))));
        assert!(it.next().is_none());
        assert!(it.is_exhausted());
    }
}
