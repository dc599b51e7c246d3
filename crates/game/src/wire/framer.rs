//! Length-prefixed, optionally-compressed message framer.
//!
//! Generalizes `crates/game/src/net/transport.rs`'s `NetworkEndpoint::receive`
//! reassembly loop from discrete UDP datagrams to an arbitrary byte stream:
//! incoming chunks may split the 8-byte header or the payload at any boundary,
//! and the framer reassembles them before handing a complete payload to the caller.

use thiserror::Error;

/// Top bit of the 64-bit header selects the compression profile; the remaining
/// 63 bits are the payload length.
const HEADER_LEN: usize = 8;
const COMPRESSION_BIT: u64 = 1 << 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionProfile {
    None,
    Lz4,
}

impl CompressionProfile {
    fn to_bit(self) -> u64 {
        match self {
            CompressionProfile::None => 0,
            CompressionProfile::Lz4 => COMPRESSION_BIT,
        }
    }

    fn from_bit(header: u64) -> Self {
        if header & COMPRESSION_BIT != 0 {
            CompressionProfile::Lz4
        } else {
            CompressionProfile::None
        }
    }
}

pub fn encode_header(payload_len: usize, compression: CompressionProfile) -> [u8; HEADER_LEN] {
    let header = (payload_len as u64) | compression.to_bit();
    header.to_le_bytes()
}

#[derive(Debug, Error)]
pub enum FramerError {
    #[error("declared payload length {0} exceeds max_recv")]
    Overflow(usize),
    #[error("lz4 decompression failed")]
    DecompressionFailed,
}

enum State {
    AwaitingHeader { partial: Vec<u8> },
    AwaitingPayload {
        remaining: usize,
        compression: CompressionProfile,
        partial: Vec<u8>,
    },
}

/// Per-connection framing state machine. Feed arbitrary byte chunks via
/// [`Framer::feed`]; complete payloads are delivered through the callback.
pub struct Framer {
    state: State,
    max_recv: usize,
    max_decomp: usize,
}

impl Framer {
    pub fn new(max_recv: usize, max_decomp: usize) -> Self {
        Self {
            state: State::AwaitingHeader {
                partial: Vec::with_capacity(HEADER_LEN),
            },
            max_recv,
            max_decomp,
        }
    }

    /// Feed a chunk of bytes. `on_payload` is invoked once per fully reassembled
    /// message (already decompressed). Returns an error if the connection should
    /// be terminated (overflow or decompression failure); after an error no
    /// further bytes for this connection should be fed.
    pub fn feed(
        &mut self,
        mut chunk: &[u8],
        mut on_payload: impl FnMut(&[u8]),
    ) -> Result<(), FramerError> {
        while !chunk.is_empty() {
            match &mut self.state {
                State::AwaitingHeader { partial } => {
                    let need = HEADER_LEN - partial.len();
                    let take = need.min(chunk.len());
                    partial.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    if partial.len() < HEADER_LEN {
                        continue;
                    }

                    let mut header_bytes = [0u8; HEADER_LEN];
                    header_bytes.copy_from_slice(partial);
                    let header = u64::from_le_bytes(header_bytes);
                    let compression = CompressionProfile::from_bit(header);
                    let len = (header & !COMPRESSION_BIT) as usize;

                    if len > self.max_recv {
                        return Err(FramerError::Overflow(len));
                    }

                    if len == 0 {
                        on_payload(&[]);
                        self.state = State::AwaitingHeader {
                            partial: Vec::with_capacity(HEADER_LEN),
                        };
                        continue;
                    }

                    // Zero-copy fast path: the whole payload is already available.
                    if chunk.len() >= len {
                        let payload = &chunk[..len];
                        let decompressed;
                        let out: &[u8] = if compression == CompressionProfile::Lz4 {
                            decompressed = self.decompress(payload)?;
                            &decompressed
                        } else {
                            payload
                        };
                        on_payload(out);
                        chunk = &chunk[len..];
                        self.state = State::AwaitingHeader {
                            partial: Vec::with_capacity(HEADER_LEN),
                        };
                        continue;
                    }

                    self.state = State::AwaitingPayload {
                        remaining: len,
                        compression,
                        partial: Vec::with_capacity(len),
                    };
                }
                State::AwaitingPayload {
                    remaining,
                    compression,
                    partial,
                } => {
                    let take = (*remaining).min(chunk.len());
                    partial.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    *remaining -= take;

                    if *remaining > 0 {
                        continue;
                    }

                    let compression = *compression;
                    let payload = std::mem::take(partial);
                    let decompressed;
                    let out: &[u8] = if compression == CompressionProfile::Lz4 {
                        decompressed = self.decompress(&payload)?;
                        &decompressed
                    } else {
                        &payload
                    };
                    on_payload(out);
                    self.state = State::AwaitingHeader {
                        partial: Vec::with_capacity(HEADER_LEN),
                    };
                }
            }
        }
        Ok(())
    }

    fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>, FramerError> {
        let out = lz4_flex::decompress_size_prepended(payload)
            .map_err(|_| FramerError::DecompressionFailed)?;
        if out.len() > self.max_decomp {
            return Err(FramerError::DecompressionFailed);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8], compression: CompressionProfile) -> Vec<u8> {
        let mut buf = encode_header(payload.len(), compression).to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn single_chunk_delivery() {
        let payload = b"hello world".to_vec();
        let framed = frame(&payload, CompressionProfile::None);

        let mut framer = Framer::new(1 << 20, 1 << 20);
        let mut got = Vec::new();
        framer.feed(&framed, |p| got.push(p.to_vec())).unwrap();

        assert_eq!(got, vec![payload]);
    }

    #[test]
    fn arbitrary_split_matches_single_chunk_delivery() {
        let p1 = b"first message".to_vec();
        let p2 = b"a different, second message".to_vec();
        let mut stream = frame(&p1, CompressionProfile::None);
        stream.extend(frame(&p2, CompressionProfile::None));

        for split in 0..stream.len() {
            let (a, b) = stream.split_at(split);
            let mut framer = Framer::new(1 << 20, 1 << 20);
            let mut got = Vec::new();
            framer.feed(a, |p| got.push(p.to_vec())).unwrap();
            framer.feed(b, |p| got.push(p.to_vec())).unwrap();
            assert_eq!(got, vec![p1.clone(), p2.clone()], "split at {split}");
        }
    }

    #[test]
    fn byte_at_a_time_reassembly() {
        let payload = b"reassembled one byte at a time".to_vec();
        let framed = frame(&payload, CompressionProfile::None);

        let mut framer = Framer::new(1 << 20, 1 << 20);
        let mut got = Vec::new();
        for b in &framed {
            framer.feed(&[*b], |p| got.push(p.to_vec())).unwrap();
        }
        assert_eq!(got, vec![payload]);
    }

    #[test]
    fn overflow_is_rejected() {
        let framed = encode_header(100, CompressionProfile::None);
        let mut framer = Framer::new(10, 10);
        let err = framer.feed(&framed, |_| {}).unwrap_err();
        assert!(matches!(err, FramerError::Overflow(100)));
    }

    #[test]
    fn lz4_round_trip_through_framer() {
        let payload: Vec<u8> = (0..500u32).flat_map(|v| v.to_le_bytes()).collect();
        let compressed = lz4_flex::compress_prepend_size(&payload);
        let framed = frame(&compressed, CompressionProfile::Lz4);

        let mut framer = Framer::new(1 << 20, 1 << 20);
        let mut got = Vec::new();
        framer.feed(&framed, |p| got.push(p.to_vec())).unwrap();
        assert_eq!(got, vec![payload]);
    }
}
