// Exhibitor Search - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Output column name → dotted source path inside one response item.
///
/// Insertion order is significant: it is the column order of the output file.
pub type FieldMapping = IndexMap<String, String>;

/// One output row: column name → extracted value.
pub type Record = IndexMap<String, Value>;

/// HTTP headers sent with a request, in configuration order.
pub type HeaderMap = IndexMap<String, String>;

// =============================================================================
// Request mode
// =============================================================================

/// How an exhibition's data is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// The list endpoint returns every column directly.
    #[default]
    Single,

    /// The list endpoint returns companies; a detail request per company
    /// returns their contacts.
    Double,
}

impl RequestMode {
    /// Lenient parse used for hand-edited configs. Unknown values fall back
    /// to `Single`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "double" | "detail" | "two" | "2" => Self::Double,
            _ => Self::Single,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }
}

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// HTTP method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Case-insensitive parse. Returns `None` for anything but GET/POST.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Exhibition config (validated runtime form)
// =============================================================================

/// A validated exhibition config, ready for crawling.
///
/// Produced by `core::config::validate_and_compile` from the on-disk
/// `ExhibitionDefinition`. Template strings (`params`, `data`, URLs) keep
/// their placeholders; substitution happens per request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExhibitionConfig {
    /// Exhibition code; also the output file stem.
    pub code: String,

    /// List endpoint. May contain `{page}`, `{skipCount}`, `{pageSize}`.
    pub url: String,

    pub method: HttpMethod,

    pub headers: HeaderMap,

    /// Query template: JSON object text, possibly with page placeholders.
    pub params: String,

    /// Body template: JSON object text, possibly with page placeholders.
    pub data: String,

    /// Dotted path to the item array inside the list response.
    pub items_key: String,

    /// List columns.
    pub fields: FieldMapping,

    pub mode: RequestMode,

    /// Present only in `Double` mode.
    pub detail: Option<DetailConfig>,

    /// Informational: host city of the exhibition.
    pub city: String,

    /// Informational: month the exhibition takes place.
    pub month: String,

    /// File the config was loaded from.
    pub source_path: PathBuf,
}

/// Second-stage request settings for `Double` mode.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailConfig {
    /// Detail endpoint. May contain `#Column` placeholders.
    pub url: String,
    pub method: HttpMethod,
    pub headers: HeaderMap,
    pub params: String,
    pub data: String,
    /// Dotted path to the contact data inside the detail response.
    pub items_key: String,
    /// Contact columns.
    pub fields: FieldMapping,
}

impl ExhibitionConfig {
    /// Output columns: list columns, then contact columns in `Double` mode.
    pub fn output_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = self.fields.keys().cloned().collect();
        if let Some(detail) = &self.detail {
            for key in detail.fields.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
        headers
    }

    /// Value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// =============================================================================
// Crawl results
// =============================================================================

/// Running totals for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages that produced at least one saved row.
    pub pages: u64,
    /// Companies read from list pages.
    pub companies: u64,
    /// Contact rows saved (`Double` mode only).
    pub contacts: u64,
}

/// Result of a complete crawl, reported by the CLI.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub code: String,
    pub mode: RequestMode,
    pub stats: CrawlStats,
    pub output_path: PathBuf,
    /// True when at least one page returned rows.
    pub had_data: bool,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_mode_aliases() {
        assert_eq!(RequestMode::parse("double"), RequestMode::Double);
        assert_eq!(RequestMode::parse(" Detail "), RequestMode::Double);
        assert_eq!(RequestMode::parse("two"), RequestMode::Double);
        assert_eq!(RequestMode::parse("2"), RequestMode::Double);
        assert_eq!(RequestMode::parse("single"), RequestMode::Single);
        assert_eq!(RequestMode::parse(""), RequestMode::Single);
        assert_eq!(RequestMode::parse("whatever"), RequestMode::Single);
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse(" GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("PUT"), None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        assert_eq!(header_value(&headers, "Content-Type"), Some("application/json"));
        assert_eq!(header_value(&headers, "Cookie"), None);
    }
}
