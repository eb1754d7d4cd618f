// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame decoder.

use super::bitsource::BitReader;
use super::component::parser;
use super::component::Decode;
use super::component::Frame;
use super::component::FrameHeader;
use super::config;
use super::error::DecodeError;
use super::error::Verify;
use super::source::PcmFormat;

/// Samples reconstructed from a frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedFrame {
    consumed: usize,
    header: FrameHeader,
    samples: Vec<i32>,
}

impl DecodedFrame {
    /// Returns the number of bytes the frame occupied in the input.
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Returns the frame header.
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Returns the number of samples per channel.
    pub const fn block_size(&self) -> usize {
        self.header.block_size()
    }

    /// Returns the interleaved samples.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Returns the interleaved samples, consuming `self`.
    pub fn into_samples(self) -> Vec<i32> {
        self.samples
    }
}

/// Decoder for frames of a stream with a known PCM format.
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    config: config::Decoder,
    format: PcmFormat,
    frame_count: u64,
}

impl FrameDecoder {
    /// Constructs `FrameDecoder`.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Config` if `format` is invalid.
    pub fn new(config: config::Decoder, format: PcmFormat) -> Result<Self, DecodeError> {
        config.verify().map_err(|e| e.within("config"))?;
        format.verify().map_err(|e| e.within("format"))?;
        Ok(Self {
            config,
            format,
            frame_count: 0,
        })
    }

    /// Returns the PCM format of the stream.
    pub const fn format(&self) -> &PcmFormat {
        &self.format
    }

    /// Parses the frame at the start of `bytes` into its components.
    ///
    /// Returns the frame and the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Structural` if the frame is malformed or doesn't
    /// agree with the PCM format, and `DecodeError::Integrity` on a checksum
    /// mismatch when checksum verification is enabled.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::*;
    /// # use flakecodec::component::*;
    /// let format = source::PcmFormat::new(8, 1, 8000).unwrap();
    /// let mut encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
    /// let frame = encoder.encode_frame(&[3; 64]).unwrap();
    ///
    /// let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
    /// let (parsed, consumed) = decoder.parse_frame(frame.bytes()).unwrap();
    /// assert_eq!(consumed, frame.bytes().len());
    /// assert!(matches!(parsed.subframe(0), Some(SubFrame::Constant(_))));
    /// ```
    pub fn parse_frame(&mut self, bytes: &[u8]) -> Result<(Frame, usize), DecodeError> {
        let mut reader = BitReader::new(bytes);
        let frame = parser::frame(
            &mut reader,
            self.format.channels(),
            self.format.bits_per_sample(),
            self.config.verify_checksums,
        )?;
        let consumed = reader.byte_position();

        #[cfg(feature = "log")]
        log::trace!(
            target: "flakecodec::decoder",
            "{{ frame_index: {}, offset: \"{:?}\", block_size: {}, bytes: {} }}",
            self.frame_count,
            frame.header().frame_offset(),
            frame.block_size(),
            consumed,
        );

        self.frame_count += 1;
        Ok((frame, consumed))
    }

    /// Decodes the frame at the start of `bytes` into interleaved samples.
    ///
    /// # Errors
    ///
    /// Same as [`FrameDecoder::parse_frame`].
    pub fn decode_frame(&mut self, bytes: &[u8]) -> Result<DecodedFrame, DecodeError> {
        let (frame, consumed) = self.parse_frame(bytes)?;
        let samples = frame.decode();
        let (header, _) = frame.into_parts();
        Ok(DecodedFrame {
            consumed,
            header,
            samples,
        })
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use crate::error::ChecksumKind;
    use crate::error::StructuralErrorKind;
    use crate::test_helper;
    use crate::FrameEncoder;

    use rstest::rstest;

    fn encoded_stereo() -> (PcmFormat, Vec<i32>, Vec<u8>) {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let signal = test_helper::interleave(&[
            test_helper::sinusoids(3000, 16, &[(0.01, 0.3)], 1),
            test_helper::sinusoids(3000, 16, &[(0.02, 0.3)], 2),
        ]);
        let config = config::Encoder {
            block_size: Some(2048),
            ..config::Encoder::default()
        };
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let mut stream = vec![];
        encoder.write(&signal, &mut stream).unwrap();
        encoder.finish(&mut stream).unwrap();
        (format, signal, stream)
    }

    fn structural_kind(err: DecodeError) -> StructuralErrorKind {
        match err {
            DecodeError::Structural(e) => e.kind(),
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn decoders_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameDecoder>();
    }

    #[test]
    fn decodes_consecutive_frames() {
        let (format, signal, stream) = encoded_stereo();
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let mut pos = 0;
        let mut decoded = vec![];
        let mut frames = 0;
        while pos < stream.len() {
            let frame = decoder.decode_frame(&stream[pos..]).unwrap();
            assert_eq!(frame.samples().len(), frame.block_size() * 2);
            pos += frame.consumed();
            decoded.extend_from_slice(frame.samples());
            frames += 1;
        }
        assert_eq!(frames, 2);
        assert_eq!(decoded, signal);
    }

    #[test]
    fn bad_sync_is_rejected() {
        let (format, _, mut stream) = encoded_stereo();
        stream[1] = 0xF0;
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let err = decoder.decode_frame(&stream).unwrap_err();
        assert_eq!(structural_kind(err), StructuralErrorKind::SyncCode);
    }

    #[rstest]
    #[case(16, 1, StructuralErrorKind::ChannelMismatch)]
    #[case(24, 2, StructuralErrorKind::BitDepthMismatch)]
    fn format_mismatch_is_rejected(
        #[case] bits_per_sample: usize,
        #[case] channels: usize,
        #[case] expected: StructuralErrorKind,
    ) {
        let (_, _, stream) = encoded_stereo();
        let format = PcmFormat::new(bits_per_sample, channels, 44100).unwrap();
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let err = decoder.decode_frame(&stream).unwrap_err();
        assert_eq!(structural_kind(err), expected);
    }

    #[test]
    fn corrupt_checksums() {
        let (format, signal, stream) = encoded_stereo();
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let len = decoder.decode_frame(&stream).unwrap().consumed();

        // The last byte of the frame belongs to the CRC-16.
        let mut broken = stream.clone();
        broken[len - 1] ^= 0x01;
        match decoder.decode_frame(&broken) {
            Err(DecodeError::Integrity(e)) => assert_eq!(e.kind(), ChecksumKind::FrameCrc16),
            other => panic!("unexpected result: {other:?}"),
        }

        // The sixth byte is the CRC-8 for a single-byte frame number.
        let mut broken = stream.clone();
        broken[5] ^= 0x80;
        match decoder.decode_frame(&broken) {
            Err(DecodeError::Integrity(e)) => assert_eq!(e.kind(), ChecksumKind::HeaderCrc8),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut lenient = FrameDecoder::new(
            config::Decoder {
                verify_checksums: false,
            },
            format,
        )
        .unwrap();
        let mut broken = stream;
        broken[len - 1] ^= 0x01;
        broken[len - 2] ^= 0x10;
        let frame = lenient.decode_frame(&broken).unwrap();
        assert_eq!(frame.consumed(), len);
        assert_eq!(frame.samples(), &signal[..frame.samples().len()]);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let (format, _, stream) = encoded_stereo();
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let len = decoder.decode_frame(&stream).unwrap().consumed();
        for cut in [0, 3, len / 2, len - 1] {
            let err = decoder.decode_frame(&stream[..cut]).unwrap_err();
            assert_eq!(structural_kind(err), StructuralErrorKind::Truncated);
        }
    }

    #[test]
    fn parsed_tree_matches_decoded_samples() {
        let (format, _, stream) = encoded_stereo();
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let (frame, consumed) = decoder.parse_frame(&stream).unwrap();
        let decoded = decoder.decode_frame(&stream).unwrap();
        assert_eq!(consumed, decoded.consumed());
        assert_eq!(frame.header(), decoded.header());
        assert_eq!(frame.decode(), decoded.into_samples());
    }
}
