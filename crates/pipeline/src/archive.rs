//! Zip export of a run's completed outputs.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use towebp_core::report::CompletedResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name used when the caller does not pick one.
pub const DEFAULT_ARCHIVE_NAME: &str = "converted_images.zip";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("There are no converted files to export")]
    Empty,

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write `results` into an in-memory zip, one deflated entry per output.
///
/// Entries are written in the given order, which callers keep in original
/// submission order. Colliding output names get a ` (n)` suffix.
pub fn build_zip(results: &[CompletedResult]) -> Result<Vec<u8>, ArchiveError> {
    if results.is_empty() {
        return Err(ArchiveError::Empty);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::with_capacity(results.len());

    for result in results {
        let name = unique_name(&result.output_name, &mut used);
        writer.start_file(name, options)?;
        writer.write_all(&result.output_bytes)?;
    }

    let cursor = writer.finish()?;
    tracing::info!(entries = results.len(), "Archive built");
    Ok(cursor.into_inner())
}

/// `name`, or `stem (n).ext` for the smallest `n >= 2` not yet used.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
