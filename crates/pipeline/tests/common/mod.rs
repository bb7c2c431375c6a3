#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use towebp_codec::{Codec, CodecError, FnCodec};
use towebp_core::format::{EncodeParams, TargetFormat};
use towebp_core::task::SourceFile;
use towebp_pipeline::{PipelineConfig, PipelineHandle};

/// Config with a fixed pool size and a fast tick.
pub fn config(pool_size: usize) -> PipelineConfig {
    PipelineConfig {
        tick_interval: Duration::from_millis(1),
        ..PipelineConfig::default().with_pool_size(pool_size)
    }
}

pub fn params(format: TargetFormat, quality: f32) -> EncodeParams {
    EncodeParams::new(format, quality).unwrap()
}

pub fn png(name: &str, size: usize) -> SourceFile {
    SourceFile::new(name, "image/png", 1_700_000_000_000, vec![7u8; size])
}

pub fn svg(name: &str) -> SourceFile {
    SourceFile::new(name, "image/svg+xml", 0, b"<svg/>".to_vec())
}

/// Deterministic codec: output length is `round(input_len * quality)`.
pub fn scaling_codec() -> Arc<dyn Codec> {
    Arc::new(FnCodec::new(|input: &[u8], params: &EncodeParams| {
        let len = (input.len() as f32 * params.quality).round() as usize;
        Ok(vec![1u8; len])
    }))
}

/// Codec with a fixed table of outcomes keyed by input length.
///
/// `100 -> 40`, `200 -> decode failure`, `50 -> 10`; anything else halves.
pub fn table_codec() -> Arc<dyn Codec> {
    Arc::new(FnCodec::new(|input: &[u8], _: &EncodeParams| match input.len() {
        100 => Ok(vec![0u8; 40]),
        200 => Err(CodecError::Decode("not an image".into())),
        50 => Ok(vec![0u8; 10]),
        n => Ok(vec![0u8; n / 2]),
    }))
}

pub fn start(pool_size: usize, codec: Arc<dyn Codec>) -> Arc<PipelineHandle> {
    PipelineHandle::start(config(pool_size), codec)
}
