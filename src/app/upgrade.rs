// Exhibitor Search - app/upgrade.rs
//
// Schema upgrade for exhibition config files: adds the `city` and `month`
// keys introduced after the first config generation. Key order of existing
// entries is preserved (serde_json `preserve_order`).

use crate::app::config_mgr::config_files;
use crate::platform::fs::{copy_json_pretty, read_file_lossy, write_json_pretty};
use crate::util::error::ConfigError;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Keys added by the upgrade, each defaulting to an empty string.
const NEW_KEYS: &[&str] = &["city", "month"];

#[derive(Debug, Default)]
pub struct UpgradeReport {
    /// Files that gained at least one key.
    pub upgraded: Vec<PathBuf>,
    /// Files already up to date.
    pub skipped: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

impl UpgradeReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Add missing keys to every config JSON in `dir`.
pub fn upgrade_dir(dir: &Path) -> Result<UpgradeReport, ConfigError> {
    let mut report = UpgradeReport::default();

    for path in config_files(dir)? {
        match upgrade_file(&path) {
            Ok(added) if added.is_empty() => {
                tracing::debug!(file = %path.display(), "Config already up to date");
                report.skipped.push(path);
            }
            Ok(added) => {
                tracing::info!(file = %path.display(), added = ?added, "Config upgraded");
                report.upgraded.push(path);
            }
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "Config upgrade failed");
                report.errors.push((path, e));
            }
        }
    }

    tracing::info!(
        upgraded = report.upgraded.len(),
        skipped = report.skipped.len(),
        errors = report.errors.len(),
        "Upgrade finished"
    );
    Ok(report)
}

/// Returns the keys that were added. The file is only rewritten when the
/// list is non-empty.
fn upgrade_file(path: &Path) -> Result<Vec<&'static str>, String> {
    let text = read_file_lossy(path).map_err(|e| e.to_string())?;
    let mut value: Value = serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))?;
    let Some(object) = value.as_object_mut() else {
        return Err("top-level value is not an object".to_string());
    };

    let mut added = Vec::new();
    for key in NEW_KEYS {
        if !object.contains_key(*key) {
            object.insert((*key).to_string(), Value::String(String::new()));
            added.push(*key);
        }
    }

    if !added.is_empty() {
        write_json_pretty(path, &value).map_err(|e| e.to_string())?;
    }
    Ok(added)
}

/// Copy every config JSON in `dir` into a new timestamped folder under
/// `backup_root`. Returns the folder path.
pub fn backup_dir(dir: &Path, backup_root: &Path) -> Result<PathBuf, ConfigError> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let target = backup_root.join(format!("upgrade_{stamp}"));
    std::fs::create_dir_all(&target).map_err(|e| ConfigError::Io {
        path: target.clone(),
        source: e,
    })?;

    let mut copied = 0usize;
    for path in config_files(dir)? {
        let Some(name) = path.file_name() else { continue };
        match copy_json_pretty(&path, &target.join(name)) {
            Ok(()) => copied += 1,
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "Backup of config failed"),
        }
    }

    tracing::info!(dir = %target.display(), files = copied, "Configs backed up");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upgrade_adds_missing_keys_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expo.json");
        std::fs::write(&path, r#"{"exhibition_code": "expo", "url": "https://x", "city": "上海"}"#).unwrap();
        std::fs::write(dir.path().join("index.json"), "[]").unwrap();

        let report = upgrade_dir(dir.path()).unwrap();
        assert_eq!(report.upgraded, vec![path.clone()]);
        assert!(report.is_success());

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["exhibition_code", "url", "city", "month"]);
        assert_eq!(value["city"], json!("上海"));
        assert_eq!(std::fs::read_to_string(dir.path().join("index.json")).unwrap(), "[]");
    }

    #[test]
    fn test_upgrade_skips_current_and_reports_broken() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"city": "", "month": "5"}"#).unwrap();
        std::fs::write(dir.path().join("b.json"), "{not json").unwrap();

        let report = upgrade_dir(dir.path()).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_backup_copies_configs() {
        let dir = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("expo.json"), r#"{"exhibition_code":"expo"}"#).unwrap();

        let target = backup_dir(dir.path(), backups.path()).unwrap();
        assert!(target.file_name().unwrap().to_string_lossy().starts_with("upgrade_"));
        let copied = std::fs::read_to_string(target.join("expo.json")).unwrap();
        assert!(copied.contains("\n  \"exhibition_code\": \"expo\""));
    }
}
