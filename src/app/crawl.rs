// Exhibitor Search - app/crawl.rs
//
// Crawl orchestration: list pages, pagination engines and page saving.
//
// Architecture:
//   - `crawl_page` fetches and parses one list page.
//   - Three pagination engines share the stop rules in core::pagination:
//       streaming   `workers` threads pull page numbers from a shared
//                   counter; each page is handed over as soon as it lands.
//       sequential  one page at a time (used by `Double` mode, where every
//                   page already fans out into parallel detail requests).
//       batches     a block of consecutive pages at a time, in parallel.
//   - `run` deletes the old output when starting from page 1, picks the
//     engine for the config's mode and appends every page to the CSV file.
//   - An `Arc<AtomicBool>` cancel flag is checked before each page.
//
// Page-level failures never abort the crawl: a failed save is logged and
// pagination continues, a failed request ends pagination cleanly.

use crate::app::detail::DetailFetcher;
use crate::app::exporter::CsvExporter;
use crate::app::http::{list_request, log_unparsed, HttpClient};
use crate::core::extract::{extract_items, parse_records};
use crate::core::model::{CrawlStats, CrawlSummary, ExhibitionConfig, Record, RequestMode};
use crate::core::pagination::{Flow, PageOutcome, PageWindow, StopReason, StopTracker};
use crate::platform::config::Settings;
use crate::util::error::{CrawlError, HttpError, ParseError};
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Shared cancellation flag.
pub type CancelFlag = Arc<AtomicBool>;

/// Which engine drives a `Single` mode crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Streaming,
    Batches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    pub workers: usize,
    pub start_page: u32,
    pub max_pages: Option<u32>,
    pub page_size: u32,
    pub batch_size: u32,
    pub engine: Engine,
}

impl CrawlOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workers: settings.workers,
            start_page: 1,
            max_pages: settings.max_pages,
            page_size: settings.page_size,
            batch_size: settings.batch_size,
            engine: Engine::Streaming,
        }
    }
}

/// Why a list page produced no records.
#[derive(Debug)]
pub enum PageError {
    /// The response arrived but the item list was not where configured.
    Parse(ParseError),
    /// The request failed.
    Http(HttpError),
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Http(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Http(e) => Some(e),
        }
    }
}

impl From<PageError> for CrawlError {
    fn from(e: PageError) -> Self {
        match e {
            PageError::Parse(e) => Self::Parse(e),
            PageError::Http(e) => Self::Http(e),
        }
    }
}

/// Build a named rayon pool, or `None` to fall back to the global pool.
pub(crate) fn worker_pool(workers: usize, name: &'static str) -> Option<rayon::ThreadPool> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(move |i| format!("{name}-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(error = %e, "Could not build {name} worker pool, using the global pool");
            None
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// =============================================================================
// Crawler
// =============================================================================

pub struct Crawler {
    config: ExhibitionConfig,
    client: HttpClient,
    exporter: CsvExporter,
    options: CrawlOptions,
    cancel: CancelFlag,
    stats: Mutex<CrawlStats>,
    pool: Option<rayon::ThreadPool>,
}

impl Crawler {
    pub fn new(config: ExhibitionConfig, client: HttpClient, exporter: CsvExporter, options: CrawlOptions) -> Self {
        let options = CrawlOptions {
            workers: options.workers.max(1),
            start_page: options.start_page.max(1),
            batch_size: options.batch_size.max(1),
            ..options
        };
        let pool = match options.engine {
            Engine::Batches => worker_pool(options.workers, "page"),
            Engine::Streaming => None,
        };
        Self {
            config,
            client,
            exporter,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
            stats: Mutex::new(CrawlStats::default()),
            pool,
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &ExhibitionConfig {
        &self.config
    }

    pub fn stats(&self) -> CrawlStats {
        *lock(&self.stats)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Fetch and parse one list page.
    pub fn crawl_page(&self, page: u32) -> Result<Vec<Record>, PageError> {
        let spec = list_request(&self.config, page, self.options.page_size);
        let response = self
            .client
            .send_with_retry(&spec, self.client.list_policy())
            .map_err(PageError::Http)?;

        match extract_items(&response, &self.config.items_key) {
            Ok(items) => Ok(parse_records(&items, &self.config.fields)),
            Err(e) => {
                log_unparsed(&spec, &response, &e.to_string());
                Err(PageError::Parse(e))
            }
        }
    }

    fn page_failed(page: u32, err: &PageError) -> StopReason {
        match err {
            PageError::Parse(e) => {
                tracing::info!(page, error = %e, "Page could not be parsed, stopping");
                StopReason::ParseFailure { page }
            }
            PageError::Http(e) => {
                tracing::error!(page, error = %e, "Page request failed, stopping");
                StopReason::RequestFailed { page }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Pagination engines
    // -------------------------------------------------------------------------

    /// Parallel streaming engine. `callback` sees each page as soon as it
    /// is fetched; completion order is not page order. Returns whether any
    /// page had records.
    pub fn paginate_streaming<F>(&self, start_page: u32, callback: F) -> bool
    where
        F: Fn(u32, &[Record]) -> Flow + Sync,
    {
        struct Counter {
            next_page: u32,
            stop: Option<StopReason>,
        }

        let window = PageWindow::new(start_page, self.options.max_pages);
        let counter = Mutex::new(Counter {
            next_page: window.start,
            stop: None,
        });
        let tracker = Mutex::new(StopTracker::new());
        let had_data = AtomicBool::new(false);

        let stop = |reason: StopReason| {
            let mut c = lock(&counter);
            if c.stop.is_none() {
                c.stop = Some(reason);
            }
        };

        let worker = || loop {
            let page = {
                let mut c = lock(&counter);
                if c.stop.is_some() {
                    return;
                }
                if self.is_cancelled() {
                    c.stop = Some(StopReason::Cancelled);
                    return;
                }
                if !window.contains(c.next_page) {
                    c.stop = Some(StopReason::PageLimit {
                        last_page: c.next_page.saturating_sub(1),
                    });
                    return;
                }
                let page = c.next_page;
                c.next_page += 1;
                page
            };

            let records = match self.crawl_page(page) {
                Ok(records) => records,
                Err(e) => {
                    stop(Self::page_failed(page, &e));
                    return;
                }
            };

            let repeated = lock(&tracker).observe(page, &records);
            if let Some(reason) = repeated {
                stop(reason);
                return;
            }

            if !records.is_empty() {
                had_data.store(true, Ordering::SeqCst);
            }
            if callback(page, &records) == Flow::Stop {
                stop(StopReason::CallbackStop { page });
                return;
            }
        };

        std::thread::scope(|s| {
            for _ in 0..self.options.workers {
                s.spawn(worker);
            }
        });

        if let Some(reason) = lock(&counter).stop {
            tracing::info!(code = %self.config.code, reason = %reason, "Pagination finished");
        }
        had_data.load(Ordering::SeqCst)
    }

    /// Sequential engine: one page at a time, in order.
    pub fn paginate_sequential<F>(&self, start_page: u32, mut callback: F) -> bool
    where
        F: FnMut(u32, &[Record]) -> Flow,
    {
        let window = PageWindow::new(start_page, self.options.max_pages);
        let mut tracker = StopTracker::new();
        let mut had_data = false;
        let mut page = window.start;

        let reason = loop {
            if self.is_cancelled() {
                break StopReason::Cancelled;
            }
            if !window.contains(page) {
                break StopReason::PageLimit {
                    last_page: page.saturating_sub(1),
                };
            }

            let records = match self.crawl_page(page) {
                Ok(records) => records,
                Err(e) => break Self::page_failed(page, &e),
            };
            if let Some(reason) = tracker.observe(page, &records) {
                break reason;
            }

            if !records.is_empty() {
                had_data = true;
            }
            if callback(page, &records) == Flow::Stop {
                break StopReason::CallbackStop { page };
            }
            page += 1;
        };

        tracing::info!(code = %self.config.code, reason = %reason, "Pagination finished");
        had_data
    }

    /// Batch engine: fetches `batch_size` consecutive pages in parallel and
    /// hands the batch, sorted by page, to `callback`.
    pub fn paginate_batches<F>(&self, start_page: u32, batch_size: u32, mut callback: F) -> bool
    where
        F: FnMut(&[(u32, PageOutcome)]) -> Flow,
    {
        let window = PageWindow::new(start_page, self.options.max_pages);
        let mut tracker = StopTracker::new();
        let mut had_data = false;
        let mut batch_start = window.start;
        let batch_size = batch_size.max(1);

        let reason = loop {
            if self.is_cancelled() {
                break StopReason::Cancelled;
            }
            let mut batch_end = batch_start.saturating_add(batch_size - 1);
            if let Some(last) = window.last_page() {
                batch_end = batch_end.min(last);
            }
            if batch_start > batch_end {
                break StopReason::PageLimit {
                    last_page: batch_end,
                };
            }

            let pages: Vec<u32> = (batch_start..=batch_end).collect();
            let fetch = || -> Vec<(u32, PageOutcome)> {
                pages
                    .par_iter()
                    .map(|&page| {
                        let outcome = match self.crawl_page(page) {
                            Ok(records) => PageOutcome::Items(records),
                            Err(e) => match Self::page_failed(page, &e) {
                                StopReason::ParseFailure { .. } => PageOutcome::ParseFailed,
                                _ => PageOutcome::Failed,
                            },
                        };
                        (page, outcome)
                    })
                    .collect()
            };
            let batch = match &self.pool {
                Some(pool) => pool.install(fetch),
                None => fetch(),
            };

            if batch
                .iter()
                .any(|(_, o)| matches!(o, PageOutcome::Items(r) if !r.is_empty()))
            {
                had_data = true;
            }

            if callback(&batch) == Flow::Stop {
                break StopReason::CallbackStop { page: batch_end };
            }
            if let Some(reason) = tracker.observe_batch(&batch) {
                break reason;
            }
            if batch.iter().all(|(_, o)| matches!(o, PageOutcome::Failed)) {
                break StopReason::RequestFailed { page: batch_start };
            }
            batch_start = batch_end + 1;
        };

        tracing::info!(code = %self.config.code, reason = %reason, "Pagination finished");
        had_data
    }

    // -------------------------------------------------------------------------
    // Full crawl
    // -------------------------------------------------------------------------

    /// Crawl the exhibition and append every page to its CSV file.
    pub fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();
        let code = self.config.code.clone();

        if self.options.start_page == 1 {
            if let Err(e) = self.exporter.remove_existing(&code) {
                tracing::error!(error = %e, "Could not remove previous output file");
            }
        }
        *lock(&self.stats) = CrawlStats::default();

        let headers = self.config.output_headers();
        let start = self.options.start_page;

        tracing::info!(
            code = %code,
            mode = %self.config.mode,
            workers = self.options.workers,
            start_page = start,
            "Crawl started"
        );

        let had_data = match self.config.mode {
            RequestMode::Single => match self.options.engine {
                Engine::Streaming => self.paginate_streaming(start, |page, records| {
                    self.save_list_page(page, &headers, records);
                    Flow::Continue
                }),
                Engine::Batches => self.paginate_batches(start, self.options.batch_size, |batch| {
                    for (page, outcome) in batch {
                        if let PageOutcome::Items(records) = outcome {
                            self.save_list_page(*page, &headers, records);
                        }
                    }
                    Flow::Continue
                }),
            },
            RequestMode::Double => {
                let fetcher = DetailFetcher::new(self.client.clone(), &self.config, self.options.workers)?;
                self.paginate_sequential(start, |page, records| {
                    self.save_detail_page(&fetcher, page, &headers, records);
                    Flow::Continue
                })
            }
        };

        let summary = CrawlSummary {
            code,
            mode: self.config.mode,
            stats: self.stats(),
            output_path: self.exporter.file_path(&self.config.code),
            had_data,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            code = %summary.code,
            pages = summary.stats.pages,
            companies = summary.stats.companies,
            contacts = summary.stats.contacts,
            elapsed_secs = summary.elapsed.as_secs(),
            "Crawl finished"
        );

        Ok(summary)
    }

    fn save_list_page(&self, page: u32, headers: &[String], records: &[Record]) {
        if records.is_empty() {
            return;
        }
        match self.exporter.save(&self.config.code, headers, records) {
            Ok(saved) => {
                let mut stats = lock(&self.stats);
                stats.pages += 1;
                stats.companies += saved as u64;
                tracing::info!(page, rows = saved, "Page saved");
            }
            Err(e) => tracing::error!(page, error = %e, "Failed to save page"),
        }
    }

    fn save_detail_page(&self, fetcher: &DetailFetcher, page: u32, headers: &[String], records: &[Record]) {
        if records.is_empty() {
            return;
        }
        tracing::info!(page, companies = records.len(), "List page fetched, requesting contacts");

        let rows = fetcher.fetch_page(records);
        {
            let mut stats = lock(&self.stats);
            stats.pages += 1;
            stats.companies += records.len() as u64;
        }

        match self.exporter.save(&self.config.code, headers, &rows) {
            Ok(saved) => {
                lock(&self.stats).contacts += saved as u64;
                tracing::info!(page, contacts = saved, "Contacts saved");
            }
            Err(e) => tracing::error!(page, error = %e, "Failed to save contacts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            workers: 4,
            max_pages: Some(3),
            ..Settings::default()
        };
        let options = CrawlOptions::from_settings(&settings);
        assert_eq!(options.workers, 4);
        assert_eq!(options.start_page, 1);
        assert_eq!(options.max_pages, Some(3));
        assert_eq!(options.engine, Engine::Streaming);
    }

    #[test]
    fn test_page_error_converts() {
        let err: CrawlError = PageError::Parse(ParseError::NotAnArray {
            items_key: "data".to_string(),
            found: "null".to_string(),
        })
        .into();
        assert!(matches!(err, CrawlError::Parse(_)));
    }
}
