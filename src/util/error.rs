// Exhibitor Search - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// All errors preserve the causal chain for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all crawler operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum CrawlError {
    /// Exhibition config loading or validation failed.
    Config(ConfigError),

    /// An HTTP exchange failed.
    Http(HttpError),

    /// A response did not contain the configured item list.
    Parse(ParseError),

    /// Writing results failed.
    Export(ExportError),

    /// config.toml loading failed.
    Settings(SettingsError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Config error: {e}"),
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Settings(e) => write!(f, "Settings error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CrawlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Settings(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Exhibition config errors
// ---------------------------------------------------------------------------

/// Errors related to exhibition config loading and validation.
#[derive(Debug)]
pub enum ConfigError {
    /// The file is not valid JSON or does not have the expected shape.
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Config file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing or blank.
    MissingField { code: String, field: &'static str },

    /// A field that must hold a JSON object holds something else.
    InvalidJsonField {
        code: String,
        field: &'static str,
        reason: String,
    },

    /// Request method is neither GET nor POST.
    InvalidMethod {
        code: String,
        field: &'static str,
        method: String,
    },

    /// Two files define the same exhibition code.
    DuplicateCode {
        code: String,
        path1: PathBuf,
        path2: PathBuf,
    },

    /// Maximum number of configs exceeded.
    TooManyConfigs { count: usize, max: usize },

    /// No config exists for the requested exhibition code.
    NotFound { code: String },

    /// The config directory does not exist.
    DirectoryNotFound { path: PathBuf },

    /// I/O error reading a config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonParse { path, source } => {
                write!(f, "Failed to parse JSON '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Config '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { code, field } => {
                write!(f, "Exhibition '{code}': missing required field '{field}'")
            }
            Self::InvalidJsonField {
                code,
                field,
                reason,
            } => write!(f, "Exhibition '{code}': field '{field}' is invalid: {reason}"),
            Self::InvalidMethod {
                code,
                field,
                method,
            } => write!(
                f,
                "Exhibition '{code}': '{field}' = '{method}' is not GET or POST"
            ),
            Self::DuplicateCode { code, path1, path2 } => write!(
                f,
                "Duplicate exhibition code '{code}' in '{}' and '{}'",
                path1.display(),
                path2.display()
            ),
            Self::TooManyConfigs { count, max } => {
                write!(f, "Too many configs loaded ({count}), maximum is {max}")
            }
            Self::NotFound { code } => {
                write!(f, "No config found for exhibition '{code}'")
            }
            Self::DirectoryNotFound { path } => {
                write!(f, "Config directory '{}' does not exist", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "I/O error reading config '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::JsonParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for CrawlError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// HTTP errors
// ---------------------------------------------------------------------------

/// Errors related to a single HTTP exchange.
#[derive(Debug)]
pub enum HttpError {
    /// The HTTP client could not be constructed.
    Build { source: reqwest::Error },

    /// Connection, timeout or body transfer failure.
    Transport { url: String, source: reqwest::Error },

    /// Server answered with a non-success status.
    Status {
        url: String,
        status: u16,
        body_preview: String,
    },

    /// Body could not be decoded as JSON or a Python literal.
    Decode { url: String, reason: String },

    /// Body decoded but carries a throttling message.
    RateLimited { url: String, message: String },

    /// The retry policy gave up.
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<HttpError>,
    },
}

impl HttpError {
    /// True when the error text carries one of the throttling keywords.
    ///
    /// For status errors only the status line and URL are checked; the body
    /// of an error page is not.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::RetriesExhausted { .. } => false,
            Self::Status { url, status, .. } => crate::core::ratelimit::is_rate_limited(&format!(
                "{status} {} for url: {url}",
                status_reason(*status)
            )),
            other => crate::core::ratelimit::is_rate_limited(&other.to_string()),
        }
    }
}

fn status_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build { source } => write!(f, "Failed to build HTTP client: {source}"),
            Self::Transport { url, source } => write!(f, "Request to '{url}' failed: {source}"),
            Self::Status {
                url,
                status,
                body_preview,
            } => {
                let reason = status_reason(*status);
                write!(f, "'{url}' returned HTTP {status} {reason}: {body_preview}")
            }
            Self::Decode { url, reason } => {
                write!(f, "Cannot decode response from '{url}': {reason}")
            }
            Self::RateLimited { url, message } => {
                write!(f, "'{url}' is rate limiting requests: {message}")
            }
            Self::RetriesExhausted {
                url,
                attempts,
                last,
            } => write!(f, "Gave up on '{url}' after {attempts} attempts: {last}"),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Build { source } => Some(source),
            Self::Transport { source, .. } => Some(source),
            Self::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<HttpError> for CrawlError {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors locating the item list inside a list response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A segment of `items_key` does not exist in the response.
    ItemsNotFound { items_key: String, segment: String },

    /// The value at `items_key` is not an array.
    NotAnArray { items_key: String, found: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemsNotFound { items_key, segment } => write!(
                f,
                "items_key '{items_key}': segment '{segment}' not present in response"
            ),
            Self::NotAnArray { items_key, found } => {
                write!(f, "items_key '{items_key}' points to {found}, expected an array")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for CrawlError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to writing result files.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// The file stayed locked by another program.
    Locked { path: PathBuf, attempts: u32 },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Locked { path, attempts } => write!(
                f,
                "'{}' is in use by another program (tried {attempts} times). \
                 Close it and resume with --start-page.",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ExportError> for CrawlError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

/// Errors related to config.toml loading.
#[derive(Debug)]
pub enum SettingsError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A settings value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading the settings file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Settings parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Setting '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Settings I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SettingsError> for CrawlError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

/// Convenience type alias for crawler results.
pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_requests_status_counts_as_rate_limit() {
        let err = HttpError::Status {
            url: "https://expo.test/api".to_string(),
            status: 429,
            body_preview: String::new(),
        };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_forbidden_status_counts_as_rate_limit() {
        let err = HttpError::Status {
            url: "https://expo.test/api".to_string(),
            status: 403,
            body_preview: "<html></html>".to_string(),
        };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_plain_status_is_not_rate_limit() {
        let err = HttpError::Status {
            url: "https://expo.test/api".to_string(),
            status: 500,
            body_preview: "internal".to_string(),
        };
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_error_page_body_is_not_checked_for_throttling() {
        let busy = HttpError::Status {
            url: "https://expo.test/api".to_string(),
            status: 500,
            body_preview: "Server busy, please try again later".to_string(),
        };
        assert!(!busy.is_rate_limit());

        let missing = HttpError::Status {
            url: "https://expo.test/api".to_string(),
            status: 404,
            body_preview: "Forbidden path".to_string(),
        };
        assert!(!missing.is_rate_limit());
    }

    #[test]
    fn test_exhausted_wraps_last_error() {
        let last = HttpError::RateLimited {
            url: "u".to_string(),
            message: "请求过于频繁".to_string(),
        };
        let err = HttpError::RetriesExhausted {
            url: "u".to_string(),
            attempts: 3,
            last: Box::new(last),
        };
        assert!(!err.is_rate_limit());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_config_error_converts_to_top_level() {
        let err: CrawlError = ConfigError::NotFound {
            code: "drone-expo".to_string(),
        }
        .into();
        assert!(err.to_string().contains("drone-expo"));
    }
}
