// Exhibitor Search - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.
//
// Lookup order for config.toml: --settings path, ./config.toml, then the
// platform config directory. Every value is range-checked; a bad value
// yields a warning and the default, so a typo never stops a crawl.

use crate::util::constants;
use crate::util::error::SettingsError;
use directories::ProjectDirs;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Resolved platform paths.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/exhibitorsearch/ or %APPDATA%\ExhibitorSearch\)
    pub config_dir: PathBuf,

    /// Data directory.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }
}

// =============================================================================
// config.toml shape
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are ignored so a newer file works with an older binary.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub crawl: CrawlSection,
    pub paths: PathsSection,
    pub logging: LoggingSection,
}

/// `[crawl]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    pub workers: Option<usize>,
    pub page_size: Option<u32>,
    pub timeout_secs: Option<u64>,
    /// 0 = retry throttled requests until they succeed.
    pub max_retries: Option<u32>,
    /// 0 = no page limit.
    pub max_pages: Option<u32>,
    pub batch_size: Option<u32>,
    pub accept_invalid_certs: Option<bool>,
}

/// `[paths]` section. Relative paths resolve against the working directory.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub config_dir: Option<String>,
    pub output_dir: Option<String>,
    /// Empty string disables the request-history file.
    pub log_dir: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "error", "warn", "info", "debug" or "trace".
    pub level: Option<String>,
}

/// Validated settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub workers: usize,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_pages: Option<u32>,
    pub batch_size: u32,
    pub accept_invalid_certs: bool,

    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: Option<PathBuf>,

    pub log_level: Option<String>,

    /// File the settings came from, if any.
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: constants::DEFAULT_WORKERS,
            page_size: constants::DEFAULT_PAGE_SIZE,
            timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            max_pages: None,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            accept_invalid_certs: true,
            config_dir: PathBuf::from(constants::CONFIG_DIR_NAME),
            output_dir: PathBuf::from(constants::OUTPUT_DIR_NAME),
            log_dir: Some(PathBuf::from(constants::LOG_DIR_NAME)),
            log_level: None,
            source: None,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Find config.toml: explicit path, working directory, platform config dir.
pub fn locate_settings_file(explicit: Option<&Path>, paths: &PlatformPaths) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    [
        PathBuf::from(constants::CONFIG_FILE_NAME),
        paths.config_dir.join(constants::CONFIG_FILE_NAME),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// Load settings from `path`.
///
/// Returns validated settings and a list of non-fatal warnings. A missing
/// or unreadable file gives defaults; a missing file that was never asked
/// for produces no warning.
pub fn load_settings(path: Option<&Path>) -> (Settings, Vec<String>) {
    let Some(path) = path else {
        tracing::debug!("No config.toml found; using defaults");
        return (Settings::default(), Vec::new());
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            let err = SettingsError::Io {
                path: path.to_path_buf(),
                source: e,
            };
            return (Settings::default(), vec![format!("{err}. Using defaults.")]);
        }
    };

    match parse_settings(&content, path) {
        Ok((mut settings, warnings)) => {
            settings.source = Some(path.to_path_buf());
            tracing::info!(path = %path.display(), warnings = warnings.len(), "Loaded config.toml");
            (settings, warnings)
        }
        Err(e) => (Settings::default(), vec![format!("{e}. Using defaults.")]),
    }
}

/// Parse and validate config.toml content.
///
/// Out-of-range values become warnings; only a syntax error fails.
pub fn parse_settings(content: &str, path: &Path) -> Result<(Settings, Vec<String>), SettingsError> {
    let raw: RawSettings = toml::from_str(content).map_err(|e| SettingsError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut warnings: Vec<String> = Vec::new();
    let mut settings = Settings::default();
    let crawl = &raw.crawl;

    settings.workers = checked(
        "[crawl] workers",
        crawl.workers,
        constants::MIN_WORKERS,
        constants::MAX_WORKERS,
        settings.workers,
        &mut warnings,
    );
    settings.page_size = checked(
        "[crawl] page_size",
        crawl.page_size,
        constants::MIN_PAGE_SIZE,
        constants::MAX_PAGE_SIZE,
        settings.page_size,
        &mut warnings,
    );
    settings.timeout_secs = checked(
        "[crawl] timeout_secs",
        crawl.timeout_secs,
        constants::MIN_REQUEST_TIMEOUT_SECS,
        constants::MAX_REQUEST_TIMEOUT_SECS,
        settings.timeout_secs,
        &mut warnings,
    );
    settings.max_retries = checked(
        "[crawl] max_retries",
        crawl.max_retries,
        0,
        constants::ABSOLUTE_MAX_RETRIES,
        settings.max_retries,
        &mut warnings,
    );
    settings.batch_size = checked(
        "[crawl] batch_size",
        crawl.batch_size,
        1,
        constants::MAX_BATCH_SIZE,
        settings.batch_size,
        &mut warnings,
    );

    // 0 means unbounded.
    settings.max_pages = crawl.max_pages.filter(|n| *n > 0);

    if let Some(accept) = crawl.accept_invalid_certs {
        settings.accept_invalid_certs = accept;
    }

    // -- Paths --
    if let Some(dir) = raw.paths.config_dir.as_deref().filter(|d| !d.trim().is_empty()) {
        settings.config_dir = PathBuf::from(dir);
    }
    if let Some(dir) = raw.paths.output_dir.as_deref().filter(|d| !d.trim().is_empty()) {
        settings.output_dir = PathBuf::from(dir);
    }
    if let Some(dir) = raw.paths.log_dir.as_deref() {
        settings.log_dir = if dir.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        };
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            settings.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    Ok((settings, warnings))
}

/// Range-check an optional value, warning and falling back on failure.
fn checked<T>(name: &str, value: Option<T>, min: T, max: T, default: T, warnings: &mut Vec<String>) -> T
where
    T: PartialOrd + Display + Copy,
{
    match value {
        None => default,
        Some(v) if v >= min && v <= max => v,
        Some(v) => {
            let err = SettingsError::ValueOutOfRange {
                field: name.to_string(),
                value: v.to_string(),
                expected: format!("{min}-{max}"),
            };
            warnings.push(format!("{err}. Using default ({default})."));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> (Settings, Vec<String>) {
        parse_settings(content, Path::new("config.toml")).unwrap()
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let (settings, warnings) = parse("");
        assert!(warnings.is_empty());
        assert_eq!(settings, Settings::default());
        assert!(settings.accept_invalid_certs);
    }

    #[test]
    fn test_valid_values_applied() {
        let (settings, warnings) = parse(
            r#"
            [crawl]
            workers = 4
            page_size = 50
            max_retries = 8
            max_pages = 10
            accept_invalid_certs = false

            [paths]
            output_dir = "out"
            log_dir = ""

            [logging]
            level = "DEBUG"
            "#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.max_retries, 8);
        assert_eq!(settings.max_pages, Some(10));
        assert!(!settings.accept_invalid_certs);
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert_eq!(settings.log_dir, None);
        assert_eq!(settings.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_values_warn_and_default() {
        let (settings, warnings) = parse(
            r#"
            [crawl]
            workers = 0
            timeout_secs = 100000
            [logging]
            level = "loud"
            "#,
        );
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("[crawl] workers"));
        assert_eq!(settings.workers, constants::DEFAULT_WORKERS);
        assert_eq!(settings.timeout_secs, constants::DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(settings.log_level, None);
    }

    #[test]
    fn test_zero_max_pages_is_unbounded() {
        let (settings, _) = parse("[crawl]\nmax_pages = 0\n");
        assert_eq!(settings.max_pages, None);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let (_, warnings) = parse("[crawl]\nturbo = true\n[gui]\ntheme = \"dark\"\n");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_syntax_error_is_error() {
        assert!(matches!(
            parse_settings("[crawl\nworkers = ", Path::new("config.toml")),
            Err(SettingsError::TomlParse { .. })
        ));
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[crawl]\nworkers = 3\n").unwrap();

        let (settings, warnings) = load_settings(Some(&path));
        assert!(warnings.is_empty());
        assert_eq!(settings.workers, 3);
        assert_eq!(settings.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_settings_missing_explicit_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, warnings) = load_settings(Some(&dir.path().join("nope.toml")));
        assert_eq!(warnings.len(), 1);
        assert_eq!(settings.workers, constants::DEFAULT_WORKERS);
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let paths = PlatformPaths {
            config_dir: PathBuf::from("/nonexistent"),
            data_dir: PathBuf::from("/nonexistent"),
        };
        let explicit = PathBuf::from("custom.toml");
        assert_eq!(locate_settings_file(Some(&explicit), &paths), Some(explicit));
    }
}
