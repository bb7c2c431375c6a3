//! Target encodings, encode parameters, and output file naming.
//!
//! Pure functions only: no codec is invoked here. The pool and fallback
//! executors hand an [`EncodeParams`] to the codec capability, and the
//! result aggregator uses [`output_name`] to key the prior-run index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default encode quality (`0.0..=1.0`).
pub const DEFAULT_QUALITY: f32 = 0.8;

pub const MIN_QUALITY: f32 = 0.0;
pub const MAX_QUALITY: f32 = 1.0;

// ---------------------------------------------------------------------------
// TargetFormat
// ---------------------------------------------------------------------------

/// Encoding every input of a run is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
    Avif,
    Gif,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 5] = [
        TargetFormat::Webp,
        TargetFormat::Jpeg,
        TargetFormat::Png,
        TargetFormat::Avif,
        TargetFormat::Gif,
    ];

    /// Short lowercase name, e.g. `"webp"`.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Webp => "webp",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Avif => "avif",
            TargetFormat::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            TargetFormat::Webp => "image/webp",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
            TargetFormat::Avif => "image/avif",
            TargetFormat::Gif => "image/gif",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Webp => ".webp",
            TargetFormat::Jpeg => ".jpg",
            TargetFormat::Png => ".png",
            TargetFormat::Avif => ".avif",
            TargetFormat::Gif => ".gif",
        }
    }

    /// Format of a converted output, judged by the extension its name was
    /// given at conversion time.
    pub fn from_output_name(name: &str) -> Option<TargetFormat> {
        let name = name.to_ascii_lowercase();
        TargetFormat::ALL
            .into_iter()
            .find(|format| name.ends_with(format.extension()))
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = CoreError;

    /// Accepts the short name (`"webp"`, `"jpg"`) or the MIME type
    /// (`"image/webp"`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("image/").unwrap_or(&lowered);
        match name {
            "webp" => Ok(TargetFormat::Webp),
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "avif" => Ok(TargetFormat::Avif),
            "gif" => Ok(TargetFormat::Gif),
            _ => Err(CoreError::Validation(format!(
                "Unknown target format '{s}'. Must be one of: webp, jpeg, png, avif, gif"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// EncodeParams
// ---------------------------------------------------------------------------

/// Global parameters of a run. Changing them after output exists triggers a
/// reprocessing pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeParams {
    pub format: TargetFormat,
    /// `0.0..=1.0`.
    pub quality: f32,
}

impl EncodeParams {
    /// Build validated parameters.
    pub fn new(format: TargetFormat, quality: f32) -> Result<Self, CoreError> {
        validate_quality(quality)?;
        Ok(Self { format, quality })
    }

    /// GIF quantizer speed derived from quality: `1` (best) ..= `30` (fastest).
    pub fn gif_speed(&self) -> i32 {
        (30.0 - self.quality * 29.0).round().clamp(1.0, 30.0) as i32
    }
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            format: TargetFormat::default(),
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Validate that `quality` is a finite value within `[MIN_QUALITY, MAX_QUALITY]`.
pub fn validate_quality(quality: f32) -> Result<(), CoreError> {
    if !quality.is_finite() || !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(CoreError::Validation(format!(
            "Quality must be between {MIN_QUALITY} and {MAX_QUALITY}, got {quality}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// Derive the output file name: strip the last extension (if any) and append
/// the target extension.
///
/// A leading dot does not count as an extension, so `.hidden` becomes
/// `.hidden.webp`.
pub fn output_name(original: &str, format: TargetFormat) -> String {
    let base = match original.rfind('.') {
        Some(idx) if idx > 0 => &original[..idx],
        _ => original,
    };
    format!("{base}{}", format.extension())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
