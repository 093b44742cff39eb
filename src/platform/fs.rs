// Exhibitor Search - platform/fs.rs
//
// Filesystem helpers shared by the exporter, config loader and upgrade tool.
//
// On Windows a file open in a spreadsheet program fails with
// PermissionDenied; those errors are retried briefly, everything else fails
// immediately.

use crate::util::constants;
use serde_json::Value;
use std::io;
use std::path::Path;
use std::time::Duration;

/// True for errors caused by another program holding the file.
pub fn is_transient_lock(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    )
}

/// Write `content` to `path`, retrying while the file is locked.
///
/// `max_retries` is the total number of attempts (at least one is made).
pub fn write_with_retry(path: &Path, content: &[u8], max_retries: u32) -> io::Result<()> {
    let attempts = max_retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match std::fs::write(path, content) {
            Ok(()) => return Ok(()),
            Err(e) if is_transient_lock(&e) && attempt < attempts => {
                tracing::warn!(
                    path = %path.display(),
                    attempt,
                    "File is in use, retrying in {} ms",
                    constants::WRITE_RETRY_DELAY_MS
                );
                std::thread::sleep(Duration::from_millis(constants::WRITE_RETRY_DELAY_MS));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read the full content of a file as a string.
///
/// Configs exported on Windows sometimes carry a BOM or stray invalid bytes;
/// the BOM is dropped and invalid UTF-8 replaced.
pub fn read_file_lossy(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Serialise `value` as pretty JSON (two-space indent, non-ASCII kept).
pub fn write_json_pretty(path: &Path, value: &Value) -> io::Result<()> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    text.push('\n');
    write_with_retry(path, text.as_bytes(), constants::WRITE_MAX_RETRIES)
}

/// Copy a JSON file, re-serialising it in the pretty format.
pub fn copy_json_pretty(src: &Path, dst: &Path) -> io::Result<()> {
    let text = read_file_lossy(src)?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_json_pretty(dst, &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transient_lock_kinds() {
        assert!(is_transient_lock(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_transient_lock(&io::Error::from(io::ErrorKind::NotFound)));
    }

    #[test]
    fn test_write_with_retry_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.txt");
        write_with_retry(&path, b"running", 3).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "running");
    }

    #[test]
    fn test_write_with_retry_missing_dir_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("status.txt");
        assert_eq!(
            write_with_retry(&path, b"x", 3).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_read_file_lossy_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, b"\xEF\xBB\xBF{\"a\": 1}").unwrap();
        assert_eq!(read_file_lossy(&path).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_copy_json_pretty_keeps_order_and_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.json");
        let dst = dir.path().join("dst.json");
        std::fs::write(&src, r#"{"z": 1, "exhibition_code": "无人机展"}"#).unwrap();

        copy_json_pretty(&src, &dst).unwrap();
        let text = std::fs::read_to_string(&dst).unwrap();
        assert!(text.contains("无人机展"));
        assert!(text.find("\"z\"").unwrap() < text.find("exhibition_code").unwrap());
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"z": 1, "exhibition_code": "无人机展"}));
    }
}
