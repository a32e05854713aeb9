use thiserror::Error;

use crate::Descriptor;

/// Errors raised while encoding or decoding a [`Descriptor`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode descriptor: {0}")]
    Encode(String),
    #[error("failed to decode descriptor: {0}")]
    Decode(String),
}

/// A pluggable wire format for [`Descriptor`].
///
/// Implementations must be stable: `decode(encode(x))` must reproduce
/// every field of `x`, including the retry policy's `Definition` and the
/// single-hop `parent`/`link_error`/`children` structure.
pub trait Codec: Send + Sync {
    fn encode(&self, descriptor: &Descriptor) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Descriptor, CodecError>;
    /// The `serializer_tag` this codec stamps on descriptors it produces.
    fn tag(&self) -> &'static str;
}

/// Default codec: text JSON, the wire format every descriptor uses unless
/// a caller plugs in its own [`Codec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, descriptor: &Descriptor) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(descriptor).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Descriptor, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn tag(&self) -> &'static str {
        "json"
    }
}
