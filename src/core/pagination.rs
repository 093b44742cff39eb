// Exhibitor Search - core/pagination.rs
//
// Stop rules shared by every pagination engine.
//
// Sites rarely report a reliable total, so the crawlers keep requesting
// pages until one of these holds:
//   - a page could not be parsed (the item list is gone)
//   - a page repeats the previous page (the API clamps to its last page)
//   - a request failed after retries, the page callback asked to stop,
//     the page budget ran out, or the crawl was cancelled
//
// The engines themselves live in app::crawl; this module holds the pure
// bookkeeping so it can be tested without a server.

use crate::core::model::Record;
use std::fmt;

/// Page callback verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Result of fetching one page, as seen by the stop rules.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Items(Vec<Record>),
    ParseFailed,
    Failed,
}

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ParseFailure { page: u32 },
    RepeatedPage { page: u32 },
    RequestFailed { page: u32 },
    CallbackStop { page: u32 },
    PageLimit { last_page: u32 },
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure { page } => write!(f, "page {page} could not be parsed"),
            Self::RepeatedPage { page } => write!(f, "page {page} repeats the previous page"),
            Self::RequestFailed { page } => write!(f, "request for page {page} failed"),
            Self::CallbackStop { page } => write!(f, "stopped after page {page}"),
            Self::PageLimit { last_page } => write!(f, "page limit reached at page {last_page}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Remembers the last parsed page to detect repeats.
#[derive(Debug, Default)]
pub struct StopTracker {
    previous: Option<Vec<Record>>,
}

impl StopTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one parsed page. Returns `Some` when pagination must stop.
    ///
    /// The page becomes the new "previous" page either way.
    pub fn observe(&mut self, page: u32, records: &[Record]) -> Option<StopReason> {
        let repeated = self
            .previous
            .as_deref()
            .is_some_and(|prev| prev == records);
        self.previous = Some(records.to_vec());
        repeated.then_some(StopReason::RepeatedPage { page })
    }

    /// Check a batch of pages, sorted by page number.
    ///
    /// Any parse failure stops. Otherwise each parsed page is compared with
    /// the parsed page before it (across batch boundaries). Failed requests
    /// are skipped by the comparison. On a repeat the remembered page is left
    /// unchanged.
    pub fn observe_batch(&mut self, batch: &[(u32, PageOutcome)]) -> Option<StopReason> {
        if let Some((page, _)) = batch
            .iter()
            .find(|(_, outcome)| matches!(outcome, PageOutcome::ParseFailed))
        {
            return Some(StopReason::ParseFailure { page: *page });
        }

        let mut last_valid = self.previous.as_deref();
        for (page, outcome) in batch {
            if let PageOutcome::Items(records) = outcome {
                if last_valid.is_some_and(|prev| prev == records.as_slice()) {
                    return Some(StopReason::RepeatedPage { page: *page });
                }
                last_valid = Some(records.as_slice());
            }
        }
        self.previous = last_valid.map(<[Record]>::to_vec);
        None
    }
}

/// The range of pages a crawl may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub start: u32,
    /// Number of pages to request at most; `None` is unbounded.
    pub max_pages: Option<u32>,
}

impl PageWindow {
    pub fn new(start: u32, max_pages: Option<u32>) -> Self {
        Self {
            start: start.max(1),
            max_pages,
        }
    }

    /// Last page allowed, if bounded.
    pub fn last_page(&self) -> Option<u32> {
        self.max_pages
            .map(|n| self.start.saturating_add(n.saturating_sub(1)))
    }

    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && self.last_page().map_or(true, |last| page <= last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(names: &[&str]) -> Vec<Record> {
        names
            .iter()
            .map(|n| {
                let mut r = Record::new();
                r.insert("Company".to_string(), json!(n));
                r
            })
            .collect()
    }

    #[test]
    fn test_observe_detects_repeat() {
        let mut tracker = StopTracker::new();
        assert_eq!(tracker.observe(1, &page(&["a", "b"])), None);
        assert_eq!(tracker.observe(2, &page(&["c"])), None);
        assert_eq!(
            tracker.observe(3, &page(&["c"])),
            Some(StopReason::RepeatedPage { page: 3 })
        );
    }

    #[test]
    fn test_two_empty_pages_stop() {
        let mut tracker = StopTracker::new();
        assert_eq!(tracker.observe(4, &[]), None);
        assert!(tracker.observe(5, &[]).is_some());
    }

    #[test]
    fn test_batch_parse_failure_stops() {
        let mut tracker = StopTracker::new();
        let batch = vec![
            (1, PageOutcome::Items(page(&["a"]))),
            (2, PageOutcome::ParseFailed),
        ];
        assert_eq!(
            tracker.observe_batch(&batch),
            Some(StopReason::ParseFailure { page: 2 })
        );
    }

    #[test]
    fn test_batch_repeat_across_batches() {
        let mut tracker = StopTracker::new();
        let first = vec![
            (1, PageOutcome::Items(page(&["a"]))),
            (2, PageOutcome::Items(page(&["b"]))),
        ];
        assert_eq!(tracker.observe_batch(&first), None);

        let second = vec![
            (3, PageOutcome::Items(page(&["b"]))),
            (4, PageOutcome::Items(page(&["c"]))),
        ];
        assert_eq!(
            tracker.observe_batch(&second),
            Some(StopReason::RepeatedPage { page: 3 })
        );
    }

    #[test]
    fn test_batch_failed_pages_are_skipped() {
        let mut tracker = StopTracker::new();
        let batch = vec![
            (1, PageOutcome::Items(page(&["a"]))),
            (2, PageOutcome::Failed),
            (3, PageOutcome::Items(page(&["b"]))),
        ];
        assert_eq!(tracker.observe_batch(&batch), None);
        assert!(tracker.observe(4, &page(&["b"])).is_some());
    }

    #[test]
    fn test_page_window() {
        let unbounded = PageWindow::new(3, None);
        assert!(unbounded.contains(1_000));
        assert!(!unbounded.contains(2));

        let bounded = PageWindow::new(3, Some(2));
        assert_eq!(bounded.last_page(), Some(4));
        assert!(bounded.contains(4));
        assert!(!bounded.contains(5));

        assert_eq!(PageWindow::new(0, None).start, 1);
    }
}
