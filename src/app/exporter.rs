// Exhibitor Search - app/exporter.rs
//
// Per-exhibition CSV file store. Pages are appended as they arrive, so an
// interrupted crawl keeps everything saved so far.
//
// Thread safety: one mutex per output file; concurrent page workers of the
// same crawl serialise their appends.

use crate::core::export::write_rows;
use crate::core::model::Record;
use crate::platform::fs::is_transient_lock;
use crate::util::constants;
use crate::util::error::ExportError;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct CsvExporter {
    output_dir: PathBuf,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    retry_delay: Duration,
}

impl CsvExporter {
    /// Create the exporter, creating `output_dir` if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| ExportError::Io {
            path: output_dir.clone(),
            source: e,
        })?;
        Ok(Self {
            output_dir,
            file_locks: Mutex::new(HashMap::new()),
            retry_delay: Duration::from_millis(constants::EXPORT_RETRY_DELAY_MS),
        })
    }

    /// `<output_dir>/<code>.csv`
    pub fn file_path(&self, code: &str) -> PathBuf {
        self.output_dir
            .join(format!("{code}.{}", constants::OUTPUT_EXTENSION))
    }

    /// Delete a previous output file. Missing files are not an error.
    pub fn remove_existing(&self, code: &str) -> Result<bool, ExportError> {
        let path = self.file_path(code);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Removed previous output file");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ExportError::Io { path, source: e }),
        }
    }

    /// Append `records` to the exhibition's file.
    ///
    /// A new file starts with a UTF-8 BOM and the header row. Returns the
    /// number of rows written; an empty slice writes nothing.
    pub fn save(&self, code: &str, headers: &[String], records: &[Record]) -> Result<usize, ExportError> {
        if records.is_empty() {
            return Ok(0);
        }

        let path = self.file_path(code);
        let file_lock = self.lock_for(&path);
        // A poisoned lock only means another writer panicked mid-append.
        let _guard = file_lock.lock().unwrap_or_else(|p| p.into_inner());

        self.retry_locked(&path, || self.append(&path, headers, records))
    }

    /// Run `op` until it succeeds, fails for a reason other than a locked
    /// file, or the locked-file attempts are used up.
    fn retry_locked<T>(
        &self,
        path: &Path,
        mut op: impl FnMut() -> Result<T, ExportError>,
    ) -> Result<T, ExportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(ExportError::Io { source, .. })
                    if is_transient_lock(&source) && attempt < constants::EXPORT_MAX_RETRIES =>
                {
                    tracing::warn!(
                        path = %path.display(),
                        attempt,
                        "Output file is in use, retrying"
                    );
                    std::thread::sleep(self.retry_delay);
                }
                Err(ExportError::Io { source, .. }) if is_transient_lock(&source) => {
                    return Err(ExportError::Locked {
                        path: path.to_path_buf(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn append(&self, path: &Path, headers: &[String], records: &[Record]) -> Result<usize, ExportError> {
        let io_err = |e: io::Error| ExportError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        if is_new {
            writer.write_all(constants::UTF8_BOM).map_err(io_err)?;
        }
        let count = write_rows(&mut writer, headers, records, is_new, path)?;
        writer.flush().map_err(io_err)?;
        Ok(count)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}
