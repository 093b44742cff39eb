// Exhibitor Search - app/tester.rs
//
// Live check of one exhibition config: request page 1, apply the field
// mapping, compare page 1 with page 2 and, in `Double` mode, fetch the
// contacts of the first company. Nothing is written to disk.

use crate::app::config_mgr::ConfigSet;
use crate::app::crawl::worker_pool;
use crate::app::detail::DetailFetcher;
use crate::app::http::{list_request, paginates, HttpClient};
use crate::core::extract::{cell_text, extract_items, get_nested_value, is_meaningful, parse_records};
use crate::core::model::{ExhibitionConfig, Record, RequestMode};
use crate::util::constants;
use crate::util::logging::preview;
use rayon::prelude::*;
use serde_json::Value;
use std::fmt::Write as _;

/// Result of one test step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass(String),
    Warn(String),
    Fail(String),
    Skipped(String),
}

impl Outcome {
    /// Pass, warning and skipped steps do not fail a config.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Fail(_))
    }

    fn mark(&self) -> &'static str {
        match self {
            Self::Pass(_) => "PASS",
            Self::Warn(_) => "WARN",
            Self::Fail(_) => "FAIL",
            Self::Skipped(_) => "SKIP",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Pass(m) | Self::Warn(m) | Self::Fail(m) | Self::Skipped(m) => m,
        }
    }
}

/// One column of the field mapping applied to the first item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingCheck {
    pub column: String,
    pub path: String,
    pub value: String,
    pub found: bool,
}

#[derive(Debug, Clone)]
pub struct TestReport {
    pub code: String,
    pub mode: RequestMode,
    /// Human-readable description of the config.
    pub basic: Vec<String>,
    pub list: Outcome,
    pub items: usize,
    pub mapping: Vec<MappingCheck>,
    pub mapping_outcome: Outcome,
    pub pagination: Outcome,
    pub detail: Outcome,
}

impl TestReport {
    /// Single mode: list and mapping. Double mode: list, mapping and detail.
    /// Pagination problems are warnings only.
    pub fn passed(&self) -> bool {
        let base = self.list.is_ok() && self.mapping_outcome.is_ok();
        match self.mode {
            RequestMode::Single => base,
            RequestMode::Double => base && self.detail.is_ok(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} [{}] {}",
            if self.passed() { "PASS" } else { "FAIL" },
            self.mode,
            self.code
        )
    }

    /// Full multi-section text report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "==================== {} ====================", self.code);
        for line in &self.basic {
            let _ = writeln!(out, "{line}");
        }

        let _ = writeln!(out, "\n--- List request ---");
        let _ = writeln!(out, "[{}] {}", self.list.mark(), self.list.message());

        let _ = writeln!(out, "\n--- Field mapping ---");
        for check in &self.mapping {
            let _ = writeln!(
                out,
                "  [{}] {} <- {}: {}",
                if check.found { "ok" } else { "--" },
                check.column,
                check.path,
                check.value
            );
        }
        let _ = writeln!(
            out,
            "[{}] {}",
            self.mapping_outcome.mark(),
            self.mapping_outcome.message()
        );

        let _ = writeln!(out, "\n--- Pagination ---");
        let _ = writeln!(out, "[{}] {}", self.pagination.mark(), self.pagination.message());

        if self.mode == RequestMode::Double {
            let _ = writeln!(out, "\n--- Detail request ---");
            let _ = writeln!(out, "[{}] {}", self.detail.mark(), self.detail.message());
        }

        let _ = writeln!(out, "\n{}", self.summary());
        out
    }
}

// =============================================================================
// Tester
// =============================================================================

pub struct ConfigTester<'a> {
    config: &'a ExhibitionConfig,
    client: HttpClient,
    page_size: u32,
}

impl<'a> ConfigTester<'a> {
    pub fn new(config: &'a ExhibitionConfig, client: HttpClient, page_size: u32) -> Self {
        Self {
            config,
            client: client.with_max_retries(constants::TESTER_MAX_RETRIES),
            page_size,
        }
    }

    pub fn run(&self) -> TestReport {
        tracing::info!(code = %self.config.code, "Testing config");

        let basic = self.basic_report();
        let (list, items) = self.test_list();
        let (mapping, mapping_outcome) = self.test_mapping(&items);

        let pagination = if items.is_empty() {
            Outcome::Skipped("page 1 returned no items".to_string())
        } else {
            self.test_pagination(&items)
        };

        let detail = match self.config.mode {
            RequestMode::Single => Outcome::Skipped("single mode".to_string()),
            RequestMode::Double => self.test_detail(&items),
        };

        let report = TestReport {
            code: self.config.code.clone(),
            mode: self.config.mode,
            basic,
            list,
            items: items.len(),
            mapping,
            mapping_outcome,
            pagination,
            detail,
        };
        tracing::info!(code = %report.code, passed = report.passed(), "Config test finished");
        report
    }

    fn basic_report(&self) -> Vec<String> {
        let c = self.config;
        let mut lines = vec![
            format!("Mode:      {}", c.mode),
            format!("URL:       {}", c.url),
            format!("Method:    {}", c.method),
            format!("Items key: {}", c.items_key),
            format!("Fields ({}):", c.fields.len()),
        ];
        lines.extend(
            c.fields
                .iter()
                .enumerate()
                .map(|(i, (column, path))| format!("  {}. {column} <- {path}", i + 1)),
        );
        if let Some(detail) = &c.detail {
            lines.push(format!("Detail URL:       {}", detail.url));
            lines.push(format!("Detail method:    {}", detail.method));
            lines.push(format!("Detail items key: {}", detail.items_key));
            lines.push(format!("Contact fields ({}):", detail.fields.len()));
            lines.extend(
                detail
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, (column, path))| format!("  {}. {column} <- {path}", i + 1)),
            );
        }
        lines
    }

    /// Items of one list page, without retries.
    fn fetch_items(&self, page: u32) -> Result<Vec<Value>, String> {
        let spec = list_request(self.config, page, self.page_size);
        let response = self.client.send(&spec).map_err(|e| e.to_string())?;
        extract_items(&response, &self.config.items_key).map_err(|e| e.to_string())
    }

    fn test_list(&self) -> (Outcome, Vec<Value>) {
        match self.fetch_items(1) {
            Ok(items) if items.is_empty() => (
                Outcome::Warn("request succeeded but the item list is empty".to_string()),
                items,
            ),
            Ok(items) => (Outcome::Pass(format!("{} items on page 1", items.len())), items),
            Err(e) => (Outcome::Fail(e), Vec::new()),
        }
    }

    fn test_mapping(&self, items: &[Value]) -> (Vec<MappingCheck>, Outcome) {
        let Some(first) = items.first() else {
            return (Vec::new(), Outcome::Fail("no item to test the mapping on".to_string()));
        };

        let checks: Vec<MappingCheck> = self
            .config
            .fields
            .iter()
            .map(|(column, path)| {
                let text = cell_text(&get_nested_value(first, path));
                MappingCheck {
                    column: column.clone(),
                    path: path.clone(),
                    found: !text.trim().is_empty(),
                    value: preview(&text, constants::TESTER_VALUE_PREVIEW_CHARS),
                }
            })
            .collect();

        let found = checks.iter().filter(|c| c.found).count();
        let outcome = if found > 0 {
            Outcome::Pass(format!("{found}/{} columns extracted", checks.len()))
        } else {
            Outcome::Fail("no configured path matched the first item".to_string())
        };
        (checks, outcome)
    }

    fn test_pagination(&self, page1: &[Value]) -> Outcome {
        let page2 = match self.fetch_items(2) {
            Ok(items) => items,
            Err(e) => return Outcome::Warn(format!("page 2 failed: {e}")),
        };

        if !page2.is_empty() {
            if page1.first() == page2.first() {
                return Outcome::Warn(format!(
                    "page 1: {} items, page 2: {} items, but the first items are identical",
                    page1.len(),
                    page2.len()
                ));
            }
            return Outcome::Pass(format!("page 1: {} items, page 2: {} items", page1.len(), page2.len()));
        }

        if paginates(self.config) {
            Outcome::Warn("page 2 is empty although a page placeholder is configured".to_string())
        } else {
            Outcome::Pass("page 2 is empty and no page placeholder is configured".to_string())
        }
    }

    fn test_detail(&self, items: &[Value]) -> Outcome {
        let Some(first) = items.first() else {
            return Outcome::Fail("no company to test the detail request on".to_string());
        };
        let company: Record = match parse_records(std::slice::from_ref(first), &self.config.fields).pop() {
            Some(record) => record,
            None => return Outcome::Fail("first item could not be mapped".to_string()),
        };

        if self.config.fields.contains_key("ID") {
            let id = company.get("ID").map(cell_text).unwrap_or_default();
            if id.trim().is_empty() {
                return Outcome::Fail("the first company has no ID value".to_string());
            }
        }

        let fetcher = match DetailFetcher::new(self.client.clone(), self.config, 1) {
            Ok(f) => f,
            Err(e) => return Outcome::Fail(e.to_string()),
        };

        let contacts = fetcher.fetch_contacts(&company);
        if fetcher.stats().failed > 0 {
            return Outcome::Fail("detail request failed, see the log for details".to_string());
        }
        let meaningful = contacts.iter().filter(|c| is_meaningful(c, None)).count();
        if meaningful == 0 {
            return Outcome::Fail("detail response contained no contact data".to_string());
        }
        Outcome::Pass(format!(
            "{meaningful} contact(s) for {}",
            company.get("Company").map(cell_text).unwrap_or_default()
        ))
    }
}

/// Test every config concurrently. Reports are sorted by code.
pub fn test_all(configs: &ConfigSet, client: &HttpClient, page_size: u32, workers: usize) -> Vec<TestReport> {
    let all: Vec<&ExhibitionConfig> = configs.iter().collect();
    let run = || -> Vec<TestReport> {
        all.par_iter()
            .map(|config| ConfigTester::new(config, client.clone(), page_size).run())
            .collect()
    };
    let mut reports = match worker_pool(workers, "tester") {
        Some(pool) => pool.install(run),
        None => run(),
    };
    reports.sort_by(|a, b| a.code.cmp(&b.code));

    let passed = reports.iter().filter(|r| r.passed()).count();
    tracing::info!(total = reports.len(), passed, "All configs tested");
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(mode: RequestMode, list: Outcome, mapping: Outcome, detail: Outcome) -> TestReport {
        TestReport {
            code: "expo".to_string(),
            mode,
            basic: Vec::new(),
            list,
            items: 1,
            mapping: Vec::new(),
            mapping_outcome: mapping,
            pagination: Outcome::Warn("page 2 is empty".to_string()),
            detail,
        }
    }

    fn pass() -> Outcome {
        Outcome::Pass(String::new())
    }

    fn fail() -> Outcome {
        Outcome::Fail(String::new())
    }

    #[test]
    fn test_single_mode_ignores_detail_and_pagination() {
        let r = report(RequestMode::Single, pass(), pass(), fail());
        assert!(r.passed());
        assert!(r.summary().starts_with("PASS"));
    }

    #[test]
    fn test_double_mode_requires_detail() {
        assert!(!report(RequestMode::Double, pass(), pass(), fail()).passed());
        assert!(report(RequestMode::Double, pass(), pass(), pass()).passed());
    }

    #[test]
    fn test_mapping_failure_fails_config() {
        let r = report(RequestMode::Single, pass(), fail(), pass());
        assert!(!r.passed());
        assert!(r.render().contains("FAIL [single] expo"));
    }

    #[test]
    fn test_render_lists_detail_only_in_double_mode() {
        let single = report(RequestMode::Single, pass(), pass(), Outcome::Skipped("single mode".into()));
        assert!(!single.render().contains("Detail request"));
        let double = report(RequestMode::Double, pass(), pass(), pass());
        assert!(double.render().contains("Detail request"));
    }
}
