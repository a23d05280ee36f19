//! HTTP/1.1 wire codec: request serialization and incremental response
//! decoding.

pub(crate) mod decoder;
pub(crate) mod encoder;

pub(crate) use decoder::{ResponseDecoder, ResponseHead};
