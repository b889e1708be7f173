//! Streaming frame decoder
//!
//! Accumulates bytes from a socket and yields whole frames. Integrity
//! failures are reported one at a time and the decoder resynchronises on
//! the next GUID, so a corrupted frame costs exactly that frame.

use crate::frame::Frame;
use crate::{FrameError, Result, GUID, HEADER_LEN};

const GUID_BYTES: [u8; 2] = GUID.to_le_bytes();

/// Reassembles frames from an arbitrary byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Next complete frame, an integrity error, or `None` when more bytes are needed
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        if !self.align_to_guid() || self.buffer.len() < HEADER_LEN {
            return None;
        }

        match Frame::decode(&self.buffer) {
            Ok((frame, used)) => {
                self.buffer.drain(..used);
                Some(Ok(frame))
            }
            Err(FrameError::Truncated { .. }) => None,
            Err(err @ (FrameError::PayloadCrc { .. } | FrameError::UnknownEndpoint(_))) => {
                // Header was sound, so its length can be trusted
                self.drop_trusted_frame();
                Some(Err(err))
            }
            Err(err) => {
                self.buffer.drain(..1);
                Some(Err(err))
            }
        }
    }

    /// Discard bytes ahead of the first GUID; false when no GUID is buffered
    fn align_to_guid(&mut self) -> bool {
        match self.buffer.windows(2).position(|w| w == GUID_BYTES) {
            Some(0) => true,
            Some(pos) => {
                self.buffer.drain(..pos);
                true
            }
            None => {
                // Keep a trailing half-GUID for the next push
                let keep = self.buffer.last() == Some(&GUID_BYTES[0]);
                let cut = self.buffer.len() - usize::from(keep);
                self.buffer.drain(..cut);
                false
            }
        }
    }

    fn drop_trusted_frame(&mut self) {
        let len = crate::frame::FrameHeader::parse(&self.buffer)
            .map(|h| h.frame_len())
            .unwrap_or(1)
            .min(self.buffer.len());
        self.buffer.drain(..len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Endpoint, FrameType};
    use crate::HEADER_LEN;

    fn frame(text: &[u8]) -> Frame {
        Frame::new(
            FrameType::XbandCommand,
            Endpoint::Server,
            Endpoint::Haystack,
            text.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_frame_split_across_reads() {
        let bytes = frame(b"arm").encode();
        let mut decoder = FrameDecoder::new();

        decoder.push(&bytes[..5]);
        assert!(decoder.next_frame().is_none());
        decoder.push(&bytes[5..]);
        assert_eq!(decoder.next_frame(), Some(Ok(frame(b"arm"))));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut bytes = frame(b"one").encode();
        bytes.extend(frame(b"two").encode());
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert_eq!(decoder.next_frame(), Some(Ok(frame(b"one"))));
        assert_eq!(decoder.next_frame(), Some(Ok(frame(b"two"))));
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_leading_garbage_skipped() {
        let mut bytes = vec![0x00, 0x55, 0x1A, 0xFF];
        bytes.extend(frame(b"ok").encode());
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert_eq!(decoder.next_frame(), Some(Ok(frame(b"ok"))));
    }

    #[test]
    fn test_corrupt_payload_then_valid_frame() {
        let mut bad = frame(b"corrupted").encode();
        bad[HEADER_LEN + 1] ^= 0x40;
        let mut bytes = bad;
        bytes.extend(frame(b"next").encode());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert!(matches!(
            decoder.next_frame(),
            Some(Err(FrameError::PayloadCrc { .. }))
        ));
        assert_eq!(decoder.next_frame(), Some(Ok(frame(b"next"))));
    }

    #[test]
    fn test_corrupt_header_resyncs() {
        let mut bad = frame(b"lost").encode();
        bad[6] ^= 0x10; // payload_size
        let mut bytes = bad;
        bytes.extend(frame(b"kept").encode());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        let mut errors = 0;
        loop {
            match decoder.next_frame() {
                Some(Ok(f)) => {
                    assert_eq!(f, frame(b"kept"));
                    break;
                }
                Some(Err(_)) => errors += 1,
                None => panic!("valid frame never surfaced"),
            }
        }
        assert!(errors >= 1);
    }

    #[test]
    fn test_half_guid_kept_between_reads() {
        let bytes = frame(b"edge").encode();
        let mut decoder = FrameDecoder::new();

        decoder.push(&[0x99, 0x98, bytes[0]]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 1);

        decoder.push(&bytes[1..]);
        assert_eq!(decoder.next_frame(), Some(Ok(frame(b"edge"))));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::frame::{Endpoint, FrameType};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        // Fuzz: garbage ahead of a frame never hides it
        #[test]
        fn fuzz_resync_after_garbage(
            garbage in proptest::collection::vec(any::<u8>(), 0..256),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let frame = Frame::new(FrameType::Data, Endpoint::Haystack, Endpoint::Client, payload).unwrap();
            let mut decoder = FrameDecoder::new();
            decoder.push(&garbage);
            decoder.push(&frame.encode());

            let mut found = false;
            for _ in 0..(garbage.len() + 2) {
                match decoder.next_frame() {
                    Some(Ok(f)) if f == frame => { found = true; break; }
                    Some(_) => continue,
                    None => break,
                }
            }
            prop_assert!(found, "frame lost behind {} garbage bytes", garbage.len());
        }

        // Fuzz: byte-at-a-time delivery yields the same frames
        #[test]
        fn fuzz_byte_at_a_time(
            payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..4),
        ) {
            let frames: Vec<Frame> = payloads
                .into_iter()
                .map(|p| Frame::new(FrameType::Data, Endpoint::Haystack, Endpoint::Client, p).unwrap())
                .collect();
            let stream: Vec<u8> = frames.iter().flat_map(|f| f.encode()).collect();

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for byte in stream {
                decoder.push(&[byte]);
                while let Some(result) = decoder.next_frame() {
                    prop_assert!(result.is_ok(), "clean stream produced {:?}", result);
                    decoded.push(result.unwrap());
                }
            }
            prop_assert_eq!(decoded, frames);
        }
    }
}
