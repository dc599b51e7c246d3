//! Hand-rolled wire format: bit-packed codecs, the byte reader/writer, and the
//! message framer that sits between them and the transport.

mod buffer;
mod codec;
mod framer;

pub use buffer::{Reader, Writer};
pub use codec::{
    delta_axis_decode, delta_axis_encode, fixed16_decode, fixed16_encode, quat_sm3_decode,
    quat_sm3_encode, vec3_24_delta_decode, vec3_24_delta_encode, vec3_48_decode, vec3_48_encode,
};
pub use framer::{encode_header, CompressionProfile, Framer, FramerError};

/// Protocol version this crate speaks; a mismatch with a peer is fatal.
pub const PROTOCOL_VERSION: (u8, u8, u8) = (0, 0, 3);

/// Maximum bytes accepted for a single framed payload before decompression.
pub const MAX_RECV: usize = 1 << 20;
/// Maximum bytes accepted after LZ4 decompression.
pub const MAX_DECOMP: usize = 4 << 20;
