//! Two-byte sample framing used by the acquisition firmware.
//!
//! Every 10-bit reading travels as a high byte (`0b111x_xxxx`, 224..=255)
//! carrying bits 9..5 followed by a low byte (`0b011x_xxxx`, 96..=127)
//! carrying bits 4..0. Bytes outside both ranges are line noise and are
//! skipped without disturbing a pending high byte.
use crate::types::Sample;

const HIGH_TAG: u8 = 0b1110_0000;
const LOW_TAG: u8 = 0b0110_0000;
const PAYLOAD_MASK: u8 = 0b0001_1111;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ByteKind {
    High(u8),
    Low(u8),
    Garbage,
}

fn classify(byte: u8) -> ByteKind {
    match byte {
        224..=255 => ByteKind::High(byte & PAYLOAD_MASK),
        96..=127 => ByteKind::Low(byte & PAYLOAD_MASK),
        _ => ByteKind::Garbage,
    }
}

/// Decodes a single frame, `None` if either byte is out of its range.
pub fn decode_pair(high: u8, low: u8) -> Option<Sample> {
    match (classify(high), classify(low)) {
        (ByteKind::High(h), ByteKind::Low(l)) => Some(((h as Sample) << 5) | l as Sample),
        _ => None,
    }
}

/// Firmware side of the framing; values above 1023 are truncated to 10 bits.
pub fn encode_sample(value: Sample) -> [u8; 2] {
    let high = ((value >> 5) as u8 & PAYLOAD_MASK) | HIGH_TAG;
    let low = (value as u8 & PAYLOAD_MASK) | LOW_TAG;
    [high, low]
}

/// Byte-stream state machine. Pending high-byte state survives across
/// `feed` calls, so chunk boundaries may fall anywhere in a frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending_high: Option<u8>,
    discarded: u64,
    chunk_reset: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reproduces the old reader, which forgot a pending high byte at the
    /// start of every read and so lost frames split across reads.
    pub fn with_chunk_reset(chunk_reset: bool) -> Self {
        Self {
            chunk_reset,
            ..Self::default()
        }
    }

    /// Lazily decodes `bytes`. Drain the iterator to consume the whole chunk;
    /// bytes left unread are never seen by the state machine.
    pub fn feed<'d, 'b>(&'d mut self, bytes: &'b [u8]) -> DecodedSamples<'d, 'b> {
        if self.chunk_reset {
            self.pending_high = None;
        }
        DecodedSamples {
            decoder: self,
            bytes: bytes.iter(),
        }
    }

    pub fn resync(&mut self) {
        self.pending_high = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending_high.is_some()
    }

    /// Bytes dropped so far: garbage, plus low bytes with no high byte ahead of them.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn push_byte(&mut self, byte: u8) -> Option<Sample> {
        match classify(byte) {
            ByteKind::High(bits) => {
                if self.pending_high.is_some() {
                    self.discarded += 1;
                }
                self.pending_high = Some(bits);
                None
            }
            ByteKind::Low(bits) => match self.pending_high.take() {
                Some(high) => Some(((high as Sample) << 5) | bits as Sample),
                None => {
                    self.discarded += 1;
                    None
                }
            },
            ByteKind::Garbage => {
                self.discarded += 1;
                None
            }
        }
    }
}

/// Iterator returned by [`FrameDecoder::feed`].
pub struct DecodedSamples<'d, 'b> {
    decoder: &'d mut FrameDecoder,
    bytes: std::slice::Iter<'b, u8>,
}

impl Iterator for DecodedSamples<'_, '_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        for &byte in self.bytes.by_ref() {
            if let Some(sample) = self.decoder.push_byte(byte) {
                return Some(sample);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bytes.len();
        let pending = usize::from(self.decoder.pending_high.is_some());
        (0, Some((remaining + pending) / 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Sample> {
        decoder.feed(bytes).collect()
    }

    #[test]
    fn every_valid_pair_decodes_to_its_bits() {
        for high in 224u8..=255 {
            for low in 96u8..=127 {
                let expected = (((high & 0x1F) as Sample) << 5) | (low & 0x1F) as Sample;
                assert_eq!(decode_pair(high, low), Some(expected));
                let mut decoder = FrameDecoder::new();
                assert_eq!(decode_all(&mut decoder, &[high, low]), vec![expected]);
            }
        }
        assert_eq!(decode_pair(224, 96), Some(0));
        assert_eq!(decode_pair(255, 127), Some(1023));
    }

    #[test]
    fn out_of_range_pairs_do_not_decode() {
        assert_eq!(decode_pair(0x61, 0xE5), None);
        assert_eq!(decode_pair(0xE5, 0x00), None);
        assert_eq!(decode_pair(128, 97), None);
    }

    #[test]
    fn decodes_reference_frame() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decode_all(&mut decoder, &[0xE5, 0x61]), vec![161]);
    }

    #[test]
    fn skips_leading_garbage() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decode_all(&mut decoder, &[0x00, 0xE0, 0x60]), vec![0]);
        assert_eq!(decoder.discarded(), 1);
    }

    #[test]
    fn garbage_only_input_yields_nothing_and_keeps_pending_byte() {
        let garbage: Vec<u8> = (0u8..96).chain(128..224).collect();

        let mut idle = FrameDecoder::new();
        assert!(decode_all(&mut idle, &garbage).is_empty());
        assert!(!idle.has_pending());

        let mut primed = FrameDecoder::new();
        assert!(decode_all(&mut primed, &[0xE5]).is_empty());
        assert!(decode_all(&mut primed, &garbage).is_empty());
        assert!(primed.has_pending());
        assert_eq!(decode_all(&mut primed, &[0x61]), vec![161]);
    }

    #[test]
    fn frame_split_across_feeds_is_paired() {
        let mut whole = FrameDecoder::new();
        let expected = decode_all(&mut whole, &[0xE5, 0x61]);

        let mut split = FrameDecoder::new();
        assert!(decode_all(&mut split, &[0xE5]).is_empty());
        assert_eq!(decode_all(&mut split, &[0x61]), expected);
    }

    #[test]
    fn arbitrary_chunking_matches_single_feed() {
        let stream: Vec<u8> = [3u16, 500, 1023, 0, 77, 640]
            .iter()
            .flat_map(|&v| encode_sample(v))
            .chain([0x05, 0x80])
            .chain(encode_sample(321))
            .collect();
        let mut reference = FrameDecoder::new();
        let expected = decode_all(&mut reference, &stream);
        assert_eq!(expected, vec![3, 500, 1023, 0, 77, 640, 321]);

        for chunk in 1..=7 {
            let mut decoder = FrameDecoder::new();
            let got: Vec<Sample> = stream
                .chunks(chunk)
                .flat_map(|c| decode_all(&mut decoder, c))
                .collect();
            assert_eq!(got, expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn second_high_byte_restarts_assembly() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decode_all(&mut decoder, &[0xE1, 0xE5, 0x61]), vec![161]);
        assert_eq!(decoder.discarded(), 1);
    }

    #[test]
    fn low_byte_without_high_is_ignored() {
        let mut decoder = FrameDecoder::new();
        assert!(decode_all(&mut decoder, &[0x61, 0x7F]).is_empty());
        // a completed frame does not let a following low byte complete again
        assert_eq!(decode_all(&mut decoder, &[0xE5, 0x61, 0x62]), vec![161]);
        assert_eq!(decoder.discarded(), 3);
    }

    #[test]
    fn resync_drops_pending_high_byte() {
        let mut decoder = FrameDecoder::new();
        assert!(decode_all(&mut decoder, &[0xE5]).is_empty());
        decoder.resync();
        assert!(!decoder.has_pending());
        assert!(decode_all(&mut decoder, &[0x61]).is_empty());
    }

    #[test]
    fn chunk_reset_mode_loses_split_frames() {
        let mut decoder = FrameDecoder::with_chunk_reset(true);
        assert!(decode_all(&mut decoder, &[0xE5]).is_empty());
        assert!(decode_all(&mut decoder, &[0x61]).is_empty());
        assert_eq!(decode_all(&mut decoder, &[0xE5, 0x61]), vec![161]);
    }

    #[test]
    fn feed_is_lazy() {
        let mut decoder = FrameDecoder::new();
        let bytes = [0xE0, 0x61, 0xE0, 0x62];
        let mut samples = decoder.feed(&bytes);
        assert_eq!(samples.next(), Some(1));
        assert_eq!(samples.size_hint(), (0, Some(1)));
        assert_eq!(samples.next(), Some(2));
        assert_eq!(samples.next(), None);
    }

    #[test]
    fn encoder_round_trips_through_decoder() {
        let mut decoder = FrameDecoder::new();
        for value in [0u16, 1, 31, 32, 512, 1023] {
            let [h, l] = encode_sample(value);
            assert_eq!(decode_all(&mut decoder, &[h, l]), vec![value]);
        }
    }
}
