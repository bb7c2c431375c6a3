//! The codec capability contract shared by pool workers and the fallback
//! executor.
//!
//! Both execution paths consume a codec only through [`Codec`], so the
//! result aggregator cannot tell which path produced an outcome.

use towebp_core::format::EncodeParams;
use towebp_core::report::TaskError;

/// Encoded output of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub data: Vec<u8>,
    /// Byte length of `data`.
    pub size: u64,
}

impl Encoded {
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { data, size }
    }
}

/// Errors a codec can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input is unreadable as an image.
    #[error("Decode failure: {0}")]
    Decode(String),

    /// The codec rejected the parameters or ran out of resources.
    #[error("Encode failure: {0}")]
    Encode(String),

    /// This codec cannot execute the input at all. From a pool worker this
    /// routes the task to the fallback path; it is not a terminal error.
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),
}

impl CodecError {
    /// Terminal per-task error for this codec failure.
    ///
    /// `UnsupportedInput` only becomes terminal when the fallback path
    /// cannot handle the input either; it is then reported as a decode
    /// failure.
    pub fn into_task_error(self) -> TaskError {
        match self {
            CodecError::Decode(msg) => TaskError::Decode(msg),
            CodecError::Encode(msg) => TaskError::Encode(msg),
            CodecError::UnsupportedInput(msg) => TaskError::Decode(msg),
        }
    }
}

/// External decode/encode capability.
///
/// Implementations are CPU-bound and synchronous; the pipeline runs them on
/// blocking threads.
pub trait Codec: Send + Sync {
    /// Convert `input` to the target format at the given quality.
    fn encode(&self, input: &[u8], params: &EncodeParams) -> Result<Encoded, CodecError>;

    /// Small preview of `input`. Best effort: callers ignore failures.
    fn thumbnail(&self, _input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::UnsupportedInput(
            "thumbnails are not supported by this codec".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// FnCodec
// ---------------------------------------------------------------------------

/// Adapts a closure into a [`Codec`].
///
/// Useful for embedding a codec that lives elsewhere, and for deterministic
/// stubs in tests.
pub struct FnCodec<F> {
    encode: F,
}

impl<F> FnCodec<F>
where
    F: Fn(&[u8], &EncodeParams) -> Result<Vec<u8>, CodecError> + Send + Sync,
{
    pub fn new(encode: F) -> Self {
        Self { encode }
    }
}

impl<F> Codec for FnCodec<F>
where
    F: Fn(&[u8], &EncodeParams) -> Result<Vec<u8>, CodecError> + Send + Sync,
{
    fn encode(&self, input: &[u8], params: &EncodeParams) -> Result<Encoded, CodecError> {
        (self.encode)(input, params).map(Encoded::new)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
