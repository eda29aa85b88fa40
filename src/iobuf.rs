//! The packed, 8-byte-aligned wire format used for both directions of the
//! FastRPC reverse tunnel: a sequence of `{u32 size, padding, payload}`
//! triples, with the alignment cursor tracked modulo 8 across the *whole*
//! stream rather than per buffer.
//!
//! Grounded on `fastrpc/hexagonrpcd/iobuffer.c` or the upstream C daemon,
//! reworked as an explicit state machine so the decoder can be fed
//! arbitrarily small chunks (`feed()` tolerates one byte at a time) without
//! re-deriving which micro-state it's in from aliased zero/non-zero size
//! checks, the way the C reference does. The alignment cursor treats every
//! buffer uniformly (including zero-length ones), so that encode and decode
//! stay exact inverses and `decode(encode(v)) == v` for every `v`.

use std::fmt;

/// A single decoded or to-be-encoded buffer in the wire stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IoBuffer {
    pub payload: Vec<u8>,
}

impl IoBuffer {
    pub fn new(payload: Vec<u8>) -> IoBuffer {
        IoBuffer { payload }
    }

    pub fn size(&self) -> u32 {
        self.payload.len() as u32
    }
}

impl From<Vec<u8>> for IoBuffer {
    fn from(payload: Vec<u8>) -> IoBuffer {
        IoBuffer { payload }
    }
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("malformed fastrpc wire stream")]
    MalformedStream,
}

fn pad_to_8(offset: usize) -> usize {
    (8 - (offset % 8)) % 8
}

/// Computes the exact encoded length of `bufs`, per §4.A: for each buffer,
/// `4 + pad_to_8(running_total + 4) + size`, with the alignment cursor
/// carried across buffer boundaries.
pub fn encoded_len(bufs: &[IoBuffer]) -> usize {
    let mut total = 0usize;
    for b in bufs {
        total += 4;
        total += pad_to_8(total);
        total += b.payload.len();
    }
    total
}

/// Encodes `bufs` into `dest`, which must be exactly `encoded_len(bufs)`
/// bytes. Returns the number of bytes written (always `dest.len()`).
pub fn encode_into(bufs: &[IoBuffer], dest: &mut [u8]) -> usize {
    assert_eq!(dest.len(), encoded_len(bufs));

    let mut pos = 0usize;
    for b in bufs {
        let size = b.payload.len() as u32;
        dest[pos..pos + 4].copy_from_slice(&size.to_le_bytes());
        pos += 4;

        let pad = pad_to_8(pos);
        for byte in &mut dest[pos..pos + pad] {
            *byte = 0;
        }
        pos += pad;

        dest[pos..pos + b.payload.len()].copy_from_slice(&b.payload);
        pos += b.payload.len();
    }
    pos
}

pub fn encode(bufs: &[IoBuffer]) -> Vec<u8> {
    let mut dest = vec![0u8; encoded_len(bufs)];
    encode_into(bufs, &mut dest);
    dest
}

enum State {
    ReadingSize { buf: [u8; 4], have: usize },
    ReadingPayload { data: Vec<u8>, written: usize, pad_remaining: usize },
    Done,
}

/// Incremental decoder for an inbound stream of a known buffer count
/// (`REMOTE_SCALARS_INBUFS(sc)`). Fed arbitrarily sliced chunks via
/// [`Decoder::feed`].
pub struct Decoder {
    expected: usize,
    results: Vec<IoBuffer>,
    state: State,
    /// Alignment cursor, `0..8`, tracked across the entire stream.
    cursor: usize,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("expected", &self.expected)
            .field("decoded", &self.results.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Decoder {
    pub fn new(expected_count: usize) -> Decoder {
        let state = if expected_count == 0 {
            State::Done
        } else {
            State::ReadingSize { buf: [0; 4], have: 0 }
        };

        Decoder { expected: expected_count, results: Vec::with_capacity(expected_count), state, cursor: 0 }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Feeds `input` into the decoder. May be called repeatedly with
    /// arbitrarily small slices, including empty ones; feeding the same
    /// overall byte sequence through any chunking yields identical results.
    pub fn feed(&mut self, mut input: &[u8]) -> Result<(), DecodeError> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => {
                    if input.is_empty() {
                        self.state = State::Done;
                        return Ok(());
                    }
                    return Err(DecodeError::MalformedStream);
                }
                State::ReadingSize { mut buf, mut have } => {
                    if input.is_empty() {
                        self.state = State::ReadingSize { buf, have };
                        return Ok(());
                    }

                    let need = 4 - have;
                    let take = need.min(input.len());
                    buf[have..have + take].copy_from_slice(&input[..take]);
                    have += take;
                    self.cursor = (self.cursor + take) % 8;
                    input = &input[take..];

                    if have < 4 {
                        self.state = State::ReadingSize { buf, have };
                        return Ok(());
                    }

                    let size = u32::from_le_bytes(buf) as usize;
                    let pad = (8 - self.cursor) % 8;
                    self.state = State::ReadingPayload { data: vec![0u8; size], written: 0, pad_remaining: pad };
                }
                State::ReadingPayload { mut data, mut written, mut pad_remaining } => {
                    if pad_remaining > 0 {
                        if input.is_empty() {
                            self.state = State::ReadingPayload { data, written, pad_remaining };
                            return Ok(());
                        }
                        let take = pad_remaining.min(input.len());
                        if input[..take].iter().any(|&b| b != 0) {
                            return Err(DecodeError::MalformedStream);
                        }
                        pad_remaining -= take;
                        self.cursor = (self.cursor + take) % 8;
                        input = &input[take..];
                        self.state = State::ReadingPayload { data, written, pad_remaining };
                        continue;
                    }

                    let remaining = data.len() - written;
                    if remaining > 0 {
                        if input.is_empty() {
                            self.state = State::ReadingPayload { data, written, pad_remaining };
                            return Ok(());
                        }
                        let take = remaining.min(input.len());
                        data[written..written + take].copy_from_slice(&input[..take]);
                        written += take;
                        self.cursor = (self.cursor + take) % 8;
                        input = &input[take..];
                    }

                    if written == data.len() {
                        self.results.push(IoBuffer { payload: data });
                        self.state = if self.results.len() == self.expected {
                            State::Done
                        } else {
                            State::ReadingSize { buf: [0; 4], have: 0 }
                        };
                    } else {
                        self.state = State::ReadingPayload { data, written, pad_remaining };
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Consumes the decoder, returning the decoded buffers if decoding
    /// reached completion, or `MalformedStream` if it did not (caller fed
    /// fewer bytes than the stream needed).
    pub fn finish(self) -> Result<Vec<IoBuffer>, DecodeError> {
        if matches!(self.state, State::Done) {
            Ok(self.results)
        } else {
            Err(DecodeError::MalformedStream)
        }
    }
}

/// Convenience one-shot decode: feeds the whole stream at once and finishes.
pub fn decode(expected_count: usize, bytes: &[u8]) -> Result<Vec<IoBuffer>, DecodeError> {
    let mut decoder = Decoder::new(expected_count);
    decoder.feed(bytes)?;
    decoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bufs(sizes: &[usize]) -> Vec<IoBuffer> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| IoBuffer::new((0..s).map(|b| (b + i) as u8).collect()))
            .collect()
    }

    #[test]
    fn s1_scenario_round_trips_byte_at_a_time() {
        let v = vec![
            IoBuffer::new(vec![0x12]),
            IoBuffer::new(vec![0x02, 0x46, 0x8A, 0xCF, 0x13, 0x57, 0x9B, 0xDF, 0x04, 0x8C]),
            IoBuffer::new(b"ABC".to_vec()),
            IoBuffer::new(b"Fast".to_vec()),
            IoBuffer::new(b"Slow\0".to_vec()),
            IoBuffer::new(b"faster".to_vec()),
            IoBuffer::new(b"FastRPC".to_vec()),
            IoBuffer::new(b":D".to_vec()),
        ];

        let wire = encode(&v);

        let mut decoder = Decoder::new(v.len());
        for byte in &wire {
            decoder.feed(std::slice::from_ref(byte)).unwrap();
        }
        let decoded = decoder.finish().unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn all_empty_buffers_encode_to_all_zero_padded_stream() {
        let v = bufs(&[0, 0, 0]);
        let wire = encode(&v);
        assert_eq!(wire.len(), 8 * 3);
        assert!(wire.iter().all(|&b| b == 0));
        assert_eq!(decode(3, &wire).unwrap(), v);
    }

    #[test]
    fn extra_bytes_past_expected_count_are_rejected() {
        let v = bufs(&[1]);
        let mut wire = encode(&v);
        wire.push(0xFF);
        assert_eq!(decode(1, &wire), Err(DecodeError::MalformedStream));
    }

    #[test]
    fn incomplete_stream_fails_to_finish() {
        let v = bufs(&[4]);
        let wire = encode(&v);
        let mut decoder = Decoder::new(1);
        decoder.feed(&wire[..wire.len() - 1]).unwrap();
        assert!(!decoder.is_complete());
        assert_eq!(decoder.finish(), Err(DecodeError::MalformedStream));
    }

    proptest! {
        #[test]
        fn round_trip(sizes in prop::collection::vec(0usize..=2048, 0..12)) {
            let v = bufs(&sizes);
            let wire = encode(&v);
            prop_assert_eq!(decode(v.len(), &wire).unwrap(), v);
        }

        #[test]
        fn chunk_invariance(sizes in prop::collection::vec(0usize..=512, 0..8), chunk in 1usize..=7) {
            let v = bufs(&sizes);
            let wire = encode(&v);

            let mut decoder = Decoder::new(v.len());
            for piece in wire.chunks(chunk) {
                decoder.feed(piece).unwrap();
            }
            prop_assert_eq!(decoder.finish().unwrap(), v);
        }

        #[test]
        fn size_words_are_4_byte_aligned_and_payloads_8_byte_aligned(sizes in prop::collection::vec(1usize..=64, 1..8)) {
            let v = bufs(&sizes);
            let wire = encode(&v);

            let mut pos = 0usize;
            for b in &v {
                prop_assert_eq!(pos % 4, 0);
                let declared = u32::from_le_bytes(wire[pos..pos + 4].try_into().unwrap()) as usize;
                prop_assert_eq!(declared, b.payload.len());
                pos += 4;
                let pad = pad_to_8(pos);
                prop_assert!(wire[pos..pos + pad].iter().all(|&x| x == 0));
                pos += pad;
                prop_assert_eq!(pos % 8, 0);
                prop_assert_eq!(&wire[pos..pos + b.payload.len()], &b.payload[..]);
                pos += b.payload.len();
            }
        }
    }
}
