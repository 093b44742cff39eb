// Exhibitor Search - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "Exhibitor Search";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "ExhibitorSearch";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Crawl defaults and limits
// =============================================================================

/// Records per page substituted for the `{pageSize}` placeholder.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Smallest and largest accepted page size.
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 1_000;

/// Default concurrent requests. Kept low: most exhibition sites throttle
/// aggressively above two parallel clients.
pub const DEFAULT_WORKERS: usize = 2;

/// Bounds for the worker count (CLI and config.toml).
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 20;

/// Pages fetched together by the batch pagination engine.
pub const DEFAULT_BATCH_SIZE: u32 = 5;
pub const MAX_BATCH_SIZE: u32 = 100;

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// Retry policy
// =============================================================================

/// Exponential base: delays run 3, 9, 27, 81, 243 seconds before the cap.
pub const RETRY_BASE: u64 = 3;

/// Upper bound (exclusive) of the random jitter added to each delay.
pub const RETRY_JITTER_MAX_SECS: f64 = 10.0;

/// Maximum delay between two attempts.
pub const RETRY_MAX_DELAY_SECS: u64 = 600;

/// Maximum retries per request. 0 means retry until the request succeeds.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Hard upper bound for a configured retry count.
pub const ABSOLUTE_MAX_RETRIES: u32 = 1_000;

/// Substrings (matched case-insensitively) that mark a throttled response.
pub const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "频繁",
    "限流",
    "访问受限",
    "请稍后",
    "请求过快",
    "rate limit",
    "too many",
    "forbidden",
    "throttle",
    "slow down",
    "try again later",
];

// =============================================================================
// Export
// =============================================================================

/// Extension of the per-exhibition output file.
pub const OUTPUT_EXTENSION: &str = "csv";

/// Attempts made when the output file is locked by another program.
pub const EXPORT_MAX_RETRIES: u32 = 3;

/// Pause between locked-file attempts.
pub const EXPORT_RETRY_DELAY_MS: u64 = 500;

/// Byte-order mark written at the start of a new CSV file so spreadsheet
/// programs open it as UTF-8.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Attempts and pause for small status/config writes.
pub const WRITE_MAX_RETRIES: u32 = 3;
pub const WRITE_RETRY_DELAY_MS: u64 = 300;

// =============================================================================
// Exhibition configs
// =============================================================================

/// Maximum size of one exhibition config file.
pub const MAX_CONFIG_FILE_SIZE: u64 = 256 * 1024;

/// Maximum number of exhibition configs loaded from one directory.
pub const MAX_CONFIGS: usize = 1_000;

/// Directory listing file that is not an exhibition config.
pub const CONFIG_INDEX_FILE: &str = "index.json";

/// String values a spreadsheet-exported config uses for "no value".
pub const BLANK_MARKERS: &[&str] = &["", "nan", "None", "null"];

// =============================================================================
// Diagnostics
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// tracing target for the request-history log file.
pub const REQUEST_LOG_TARGET: &str = "request_history";

/// Request-history file name inside the log directory.
pub const REQUEST_LOG_FILE: &str = "request_history.log";

/// Characters of an undecodable response body included in the error.
pub const RESPONSE_PREVIEW_CHARS: usize = 500;

/// Characters of an error shown on the console for each retry.
pub const RETRY_MESSAGE_PREVIEW_CHARS: usize = 100;

/// Characters of a response body written to the request log.
pub const REQUEST_LOG_MAX_BODY_CHARS: usize = 5_000;

/// Characters of a value shown by the config tester.
pub const TESTER_VALUE_PREVIEW_CHARS: usize = 100;

/// Detail attempts made by the config tester before reporting a failure.
pub const TESTER_MAX_RETRIES: u32 = 2;

// =============================================================================
// File and directory names
// =============================================================================

/// Settings file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default exhibition config directory (relative to the working directory).
pub const CONFIG_DIR_NAME: &str = "config";

/// Default output directory (relative to the working directory).
pub const OUTPUT_DIR_NAME: &str = "ExhibitorList";

/// Default log directory (relative to the working directory).
pub const LOG_DIR_NAME: &str = "logs";

/// Config backups created by the upgrade command.
pub const BACKUP_DIR_NAME: &str = "config_backups";
