// Exhibitor Search - app/config_mgr.rs
//
// Loads exhibition configs from the config directory: one JSON file per
// exhibition, `index.json` excluded. Invalid files are reported and skipped
// so one broken config never blocks the others.

use crate::core::config;
use crate::core::model::ExhibitionConfig;
use crate::platform::fs::read_file_lossy;
use crate::util::constants;
use crate::util::error::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Every valid exhibition config in a directory, keyed by code.
#[derive(Debug, Default)]
pub struct ConfigSet {
    configs: BTreeMap<String, ExhibitionConfig>,
}

impl ConfigSet {
    pub fn get(&self, code: &str) -> Option<&ExhibitionConfig> {
        self.configs.get(code)
    }

    /// Exhibition codes in sorted order.
    pub fn codes(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExhibitionConfig> {
        self.configs.values()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Configs matching optional city/month filters (substring, case-insensitive).
    pub fn filtered<'a>(
        &'a self,
        city: Option<&'a str>,
        month: Option<&'a str>,
    ) -> impl Iterator<Item = &'a ExhibitionConfig> + 'a {
        let matches = |field: &str, wanted: Option<&str>| {
            wanted.map_or(true, |w| field.to_lowercase().contains(&w.trim().to_lowercase()))
        };
        self.configs
            .values()
            .filter(move |c| matches(&c.city, city) && matches(&c.month, month))
    }
}

/// Load every exhibition config in `dir`.
///
/// Returns the valid configs and the non-fatal errors encountered. Files are
/// read in name order; for duplicate codes the first file wins.
pub fn load_all(dir: &Path) -> (ConfigSet, Vec<ConfigError>) {
    let mut set = ConfigSet::default();
    let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut errors = Vec::new();

    if !dir.is_dir() {
        errors.push(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
        return (set, errors);
    }

    let files = match config_files(dir) {
        Ok(files) => files,
        Err(e) => {
            errors.push(e);
            return (set, errors);
        }
    };

    for path in files {
        if set.len() >= constants::MAX_CONFIGS {
            tracing::warn!(max = constants::MAX_CONFIGS, "Too many exhibition configs, ignoring the rest");
            errors.push(ConfigError::TooManyConfigs {
                count: set.len() + 1,
                max: constants::MAX_CONFIGS,
            });
            break;
        }

        let config = match load_file(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping invalid config");
                errors.push(e);
                continue;
            }
        };

        if let Some(first) = sources.get(&config.code) {
            errors.push(ConfigError::DuplicateCode {
                code: config.code.clone(),
                path1: first.clone(),
                path2: path.clone(),
            });
            continue;
        }

        sources.insert(config.code.clone(), path);
        set.configs.insert(config.code.clone(), config);
    }

    tracing::info!(
        dir = %dir.display(),
        loaded = set.len(),
        errors = errors.len(),
        "Exhibition configs loaded"
    );

    (set, errors)
}

/// Load the config for one exhibition code.
///
/// Errors in other files are logged at debug level and otherwise ignored.
pub fn load_one(dir: &Path, code: &str) -> Result<ExhibitionConfig, ConfigError> {
    let (mut set, errors) = load_all(dir);
    for e in errors {
        match e {
            ConfigError::DirectoryNotFound { .. } => return Err(e),
            other => tracing::debug!(error = %other, "Config problem in directory"),
        }
    }
    set.configs
        .remove(code)
        .ok_or_else(|| ConfigError::NotFound {
            code: code.to_string(),
        })
}

/// Exhibition config files in `dir`, sorted by name.
pub fn config_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|e| ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let is_index = path.file_name().and_then(|n| n.to_str()) == Some(constants::CONFIG_INDEX_FILE);
        if is_json && !is_index && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_file(path: &Path) -> Result<ExhibitionConfig, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if metadata.len() > constants::MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_CONFIG_FILE_SIZE,
        });
    }

    let content = read_file_lossy(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    config::load_from_str(&content, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, code: &str, city: &str) {
        let json = format!(
            r#"{{"exhibition_code": "{code}", "url": "https://expo.test/{code}",
                "company_info_keys": {{"Company": "name"}}, "city": "{city}", "month": "5"}}"#
        );
        std::fs::write(dir.join(name), json).unwrap();
    }

    #[test]
    fn test_load_all_skips_index_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", "alpha", "Shenzhen");
        write(dir.path(), "b.json", "beta", "Shanghai");
        std::fs::write(dir.path().join("index.json"), r#"["a.json", "b.json"]"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let (set, errors) = load_all(dir.path());
        assert_eq!(set.codes(), vec!["alpha", "beta"]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::JsonParse { .. }));
    }

    #[test]
    fn test_duplicate_code_first_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1.json", "alpha", "first");
        write(dir.path(), "2.json", "alpha", "second");

        let (set, errors) = load_all(dir.path());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("alpha").unwrap().city, "first");
        assert!(matches!(errors[0], ConfigError::DuplicateCode { .. }));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (set, errors) = load_all(&dir.path().join("nope"));
        assert!(set.is_empty());
        assert!(matches!(errors[0], ConfigError::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_load_one() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", "alpha", "");
        assert_eq!(load_one(dir.path(), "alpha").unwrap().code, "alpha");
        assert!(matches!(
            load_one(dir.path(), "gamma").unwrap_err(),
            ConfigError::NotFound { .. }
        ));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let padding = " ".repeat(constants::MAX_CONFIG_FILE_SIZE as usize + 1);
        std::fs::write(dir.path().join("big.json"), padding).unwrap();
        let (_, errors) = load_all(dir.path());
        assert!(matches!(errors[0], ConfigError::FileTooLarge { .. }));
    }

    #[test]
    fn test_filter_by_city_and_month() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", "alpha", "Shenzhen");
        write(dir.path(), "b.json", "beta", "Shanghai");
        let (set, _) = load_all(dir.path());

        let codes: Vec<_> = set.filtered(Some("shen"), None).map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["alpha"]);
        assert_eq!(set.filtered(None, Some("5")).count(), 2);
        assert_eq!(set.filtered(None, Some("12")).count(), 0);
    }
}
