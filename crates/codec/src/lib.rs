//! Codec capability used by the conversion pipeline.
//!
//! [`Codec`] is the seam between scheduling and pixel work; [`ImageCodec`]
//! is the default implementation.

pub mod codec;
pub mod image_codec;

pub use codec::{Codec, CodecError, Encoded, FnCodec};
pub use image_codec::ImageCodec;
