//! Source files, dedup keys, and the immutable [`Task`] unit of work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::format::{output_name, EncodeParams};
use crate::types::TaskId;

/// Media type routed to the fallback path up front.
pub const MEDIA_TYPE_SVG: &str = "image/svg+xml";

// ---------------------------------------------------------------------------
// Input kinds
// ---------------------------------------------------------------------------

/// Coarse classification of an input, used only for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Pixel formats the pool workers decode themselves.
    Raster,
    /// Vector input (SVG); pool workers cannot rasterise it.
    Vector,
}

impl InputKind {
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.eq_ignore_ascii_case(MEDIA_TYPE_SVG) {
            InputKind::Vector
        } else {
            InputKind::Raster
        }
    }
}

/// Whether an outer surface should admit a file with this media type.
pub fn is_supported_media_type(media_type: &str) -> bool {
    media_type
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// Guess a media type from a file name's extension.
///
/// Returns `None` for anything that is not a recognised image extension.
pub fn media_type_for_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "svg" => MEDIA_TYPE_SVG,
        _ => return None,
    };
    Some(media_type)
}

// ---------------------------------------------------------------------------
// SourceFile
// ---------------------------------------------------------------------------

/// One raw input as handed to the pipeline.
///
/// The bytes are shared (`Arc`) so that the archive, the queued task, and
/// an executor can all refer to the same buffer without copying.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub media_type: String,
    /// Last-modified time in milliseconds since the Unix epoch (0 if unknown).
    pub last_modified_ms: i64,
    pub data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        last_modified_ms: i64,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            last_modified_ms,
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn kind(&self) -> InputKind {
        InputKind::from_media_type(&self.media_type)
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            name: self.name.clone(),
            size: self.size(),
            last_modified_ms: self.last_modified_ms,
        }
    }
}

/// `(name, size, last_modified)` identity of an input.
///
/// Two distinct files sharing all three fields are treated as the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub name: String,
    pub size: u64,
    pub last_modified_ms: i64,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Immutable description of one unit of conversion work.
///
/// Ownership moves queue -> executor -> aggregator; a task is never held by
/// two components at once. Cloning only bumps the shared byte buffer.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub source: Arc<SourceFile>,
    pub params: EncodeParams,
    /// Position of the source in the session archive.
    pub submission_index: usize,
}

impl Task {
    pub fn original_name(&self) -> &str {
        &self.source.name
    }

    pub fn original_size(&self) -> u64 {
        self.source.size()
    }

    pub fn kind(&self) -> InputKind {
        self.source.kind()
    }

    pub fn output_name(&self) -> String {
        output_name(&self.source.name, self.params.format)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
