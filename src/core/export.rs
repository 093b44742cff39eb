// Exhibitor Search - core/export.rs
//
// CSV serialisation of crawled records.
// Core layer: writes to any Write trait object. File handling (create vs
// append, BOM, locking) lives in app::exporter.

use crate::core::extract::cell_text;
use crate::core::model::Record;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Write `records` as CSV rows in `headers` order.
///
/// The header row is written only when `write_header` is set (a new file).
/// Columns missing from a record are empty. Returns the number of data rows.
pub fn write_rows<W: Write>(
    writer: W,
    headers: &[String],
    records: &[Record],
    write_header: bool,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |e: csv::Error| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    if write_header {
        csv_writer.write_record(headers).map_err(csv_err)?;
    }

    let mut count = 0;
    for record in records {
        let row = headers.iter().map(|h| {
            record
                .get(h)
                .map(|v| clean_cell(&cell_text(v)))
                .unwrap_or_default()
        });
        csv_writer.write_record(row).map_err(csv_err)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Remove control characters below U+0020 except tab, LF and CR.
pub fn clean_cell(text: &str) -> String {
    text.chars()
        .filter(|c| *c >= ' ' || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}
