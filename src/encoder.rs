// Copyright 2022 Google LLC
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

//! Frame encoder: block buffering, channel decorrelation and frame assembly.

use super::bitsink::ByteSink;
use super::bitsource::BitReader;
use super::coding::Searcher;
use super::coding::TrialFrame;
use super::component::parser;
use super::component::BitRepr;
use super::component::ChannelAssignment;
use super::component::Decode;
use super::component::Frame;
use super::component::FrameHeader;
use super::component::FrameOffset;
use super::component::SubFrame;
use super::component::Verbatim;
use super::config;
use super::config::StereoMethod;
use super::constant::block::MIN_STEREO_BLOCK_SIZE;
use super::constant::block::MIN_VARIABLE_SPLIT;
use super::error::EncodeError;
use super::error::OutputError;
use super::error::RangeError;
use super::error::VerificationError;
use super::error::Verified;
use super::error::Verify;
use super::error::VerifyError;
use super::source::FrameBuf;
use super::source::PcmFormat;

/// Returns the upper bound of the size of a frame in bytes.
///
/// # Examples
///
/// ```
/// # use flakecodec::*;
/// assert_eq!(max_frame_size(4096, 2, 16), 16924);
/// ```
pub const fn max_frame_size(block_size: usize, channels: usize, bits_per_sample: usize) -> usize {
    18 + 5 * channels + (block_size * (channels * bits_per_sample + 1) + 7) / 8
}

/// Bytes of an encoded frame together with the number of samples it holds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedFrame {
    bytes: Vec<u8>,
    samples: usize,
}

impl EncodedFrame {
    /// Returns the encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of samples per channel consumed by the frame.
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Returns the encoded bytes, consuming `self`.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Writes `frame` to `sink`, mapping formatting errors to `EncodeError`.
fn write_frame(frame: &Frame, sink: &mut ByteSink) -> Result<(), EncodeError> {
    frame.write(sink).map_err(|e| match e {
        OutputError::Range(e) => EncodeError::Output(e),
        OutputError::Sink(never) => match never {},
    })
}

/// Per-stream encoding state apart from the input buffers.
#[derive(Clone, Debug)]
struct BlockEncoder {
    config: Verified<config::Encoder>,
    format: PcmFormat,
    block_size: usize,
    searcher: Searcher,
    frame: TrialFrame,
    first_half: TrialFrame,
    second_half: TrialFrame,
    frame_count: u64,
    sample_count: u64,
}

impl BlockEncoder {
    fn new(config: Verified<config::Encoder>, format: PcmFormat) -> Self {
        let block_size = config.block_size_for(format.sample_rate());
        let searcher = Searcher::new(&config, format.bits_per_sample());
        let windows = searcher.window_count();
        let channels = format.channels();
        Self {
            config,
            format,
            block_size,
            searcher,
            frame: TrialFrame::new(channels, windows),
            first_half: TrialFrame::new(channels, windows),
            second_half: TrialFrame::new(channels, windows),
            frame_count: 0,
            sample_count: 0,
        }
    }

    fn is_variable_blocking(&self) -> bool {
        self.config.variable_block_size > 0
    }

    fn counter(&self) -> u64 {
        if self.is_variable_blocking() {
            self.sample_count
        } else {
            self.frame_count
        }
    }

    fn frame_offset(&self) -> Result<FrameOffset, RangeError> {
        if self.is_variable_blocking() {
            Ok(FrameOffset::StartSample(self.sample_count))
        } else {
            u32::try_from(self.frame_count)
                .ok()
                .filter(|n| *n < 1u32 << 31)
                .map(FrameOffset::Frame)
                .ok_or_else(|| {
                    RangeError::from_display(
                        "frame_number",
                        "must be smaller than 2^31",
                        &self.frame_count,
                    )
                })
        }
    }

    /// Halves the current stereo frame while the halves look smaller.
    fn split_variable_block(&mut self, mut frame_bits: usize) {
        let mode = self.config.variable_block_size;
        let counter = self.counter();
        while self.frame.block_size() % 2 == 0 && self.frame.block_size() >= MIN_VARIABLE_SPLIT {
            let half = self.frame.block_size() / 2;
            self.first_half.load_part(&self.frame, 0, half);
            self.searcher.estimate_frame(&mut self.first_half);
            let first_bits = self.searcher.measure_frame(&mut self.first_half, counter);
            let second_bits = if mode == 2 || mode == 4 {
                self.second_half.load_part(&self.frame, half, half);
                self.searcher.estimate_frame(&mut self.second_half);
                self.searcher.measure_frame(&mut self.second_half, counter)
            } else {
                first_bits
            };
            #[cfg(feature = "log")]
            log::trace!(
                target: "flakecodec::encoder",
                "{{ msg: \"variable block trial\", block_size: {}, whole: {}, halves: [{}, {}] }}",
                self.frame.block_size(),
                frame_bits,
                first_bits,
                second_bits,
            );
            if first_bits.saturating_add(second_bits) > frame_bits {
                break;
            }
            std::mem::swap(&mut self.frame, &mut self.first_half);
            frame_bits = first_bits;
            if mode <= 2 {
                break;
            }
        }
    }

    /// Runs the predictor search on the leading samples of `src`.
    ///
    /// Returns the number of samples per channel covered by the search.
    fn search(&mut self, src: &FrameBuf) -> usize {
        let channels = self.format.channels();
        let bits_per_sample = self.format.bits_per_sample();
        let block_size = src.len();
        self.searcher.prepare(block_size);

        if channels == 2
            && block_size >= MIN_STEREO_BLOCK_SIZE
            && self.searcher.stereo_method() != StereoMethod::Independent
        {
            self.frame
                .load_stereo(src.channel_slice(0), src.channel_slice(1), bits_per_sample);
            self.searcher.estimate_frame(&mut self.frame);
            let counter = self.counter();
            let frame_bits = self.searcher.measure_frame(&mut self.frame, counter);
            if self.is_variable_blocking() {
                self.split_variable_block(frame_bits);
            }
            self.searcher.encode_estimated_frame(&mut self.frame);
        } else {
            self.frame
                .load_independent((0..channels).map(|ch| src.channel_slice(ch)), bits_per_sample);
            for idx in self.frame.selected_channels() {
                self.searcher.pass2(self.frame.channel_mut(idx));
            }
        }
        self.frame.block_size()
    }

    fn verbatim_frame(&self, src: &FrameBuf, block_size: usize) -> Result<Frame, EncodeError> {
        let bits_per_sample = self.format.bits_per_sample();
        let subframes = (0..self.format.channels())
            .map(|ch| {
                SubFrame::from(Verbatim::from_samples(
                    &src.channel_slice(ch)[..block_size],
                    bits_per_sample as u8,
                ))
            })
            .collect();
        let header = FrameHeader::new(
            block_size,
            ChannelAssignment::Independent(self.format.channels() as u8),
            bits_per_sample,
            self.format.sample_rate(),
            self.frame_offset()?,
        )?;
        Ok(Frame::from_parts(header, subframes))
    }

    fn verify_frame(&self, bytes: &[u8], src: &FrameBuf) -> Result<(), VerificationError> {
        let channels = self.format.channels();
        let mut reader = BitReader::new(bytes);
        let decoded = parser::frame(
            &mut reader,
            channels,
            self.format.bits_per_sample(),
            true,
        )
        .map_err(VerificationError::Decode)?
        .decode();
        for (t, actual) in decoded.iter().enumerate() {
            let expected = src.channel_slice(t % channels)[t / channels];
            if *actual != expected {
                return Err(VerificationError::Mismatch {
                    position: t,
                    expected,
                    actual: *actual,
                });
            }
        }
        Ok(())
    }

    /// Encodes a frame from the leading samples of `src`.
    fn encode(&mut self, src: &FrameBuf) -> Result<EncodedFrame, EncodeError> {
        let block_size = self.search(src);
        let header = FrameHeader::new(
            block_size,
            self.frame.assignment(),
            self.format.bits_per_sample(),
            self.format.sample_rate(),
            self.frame_offset()?,
        )?;
        let frame = Frame::from_parts(header, self.frame.subframes());

        let limit = max_frame_size(
            block_size,
            self.format.channels(),
            self.format.bits_per_sample(),
        );
        let mut sink = ByteSink::bounded(limit);
        write_frame(&frame, &mut sink)?;
        let bytes = if sink.overflowed() {
            #[cfg(feature = "log")]
            log::debug!(
                target: "flakecodec::encoder",
                "{{ msg: \"frame exceeded the size bound, rewriting as verbatim\", bits: {}, limit_bytes: {} }}",
                frame.count_bits(),
                limit,
            );
            let frame = self.verbatim_frame(src, block_size)?;
            let mut sink = ByteSink::with_capacity(frame.count_bits());
            write_frame(&frame, &mut sink)?;
            sink.into_inner()
        } else {
            sink.into_inner()
        };

        if self.config.verify {
            if let Err(e) = self.verify_frame(&bytes, src) {
                #[cfg(feature = "log")]
                log::warn!(
                    target: "flakecodec::encoder",
                    "{{ msg: \"self-verification failed\", counter: {}, error: \"{}\" }}",
                    self.counter(),
                    e,
                );
                return Err(e.into());
            }
        }

        #[cfg(feature = "log")]
        log::debug!(
            target: "flakecodec::encoder",
            "{{ counter: {}, block_size: {}, channel_assignment: \"{:?}\", bytes: {} }}",
            self.counter(),
            block_size,
            self.frame.assignment(),
            bytes.len(),
        );

        self.frame_count += 1;
        self.sample_count += block_size as u64;
        Ok(EncodedFrame {
            bytes,
            samples: block_size,
        })
    }
}

/// Encoder turning interleaved PCM samples into frames.
///
/// # Examples
///
/// ```
/// # use flakecodec::*;
/// let format = source::PcmFormat::new(16, 2, 44100).unwrap();
/// let mut encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
/// let signal: Vec<i32> = (0..2000).map(|t| (t % 64) * 100 - 3200).collect();
///
/// let mut stream = vec![];
/// encoder.write(&signal, &mut stream).unwrap();
/// encoder.finish(&mut stream).unwrap();
///
/// let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
/// let decoded = decoder.decode_frame(&stream).unwrap();
/// assert_eq!(decoded.consumed(), stream.len());
/// assert_eq!(decoded.samples(), signal.as_slice());
/// ```
#[derive(Clone, Debug)]
pub struct FrameEncoder {
    inner: BlockEncoder,
    buf: FrameBuf,
    scratch: FrameBuf,
}

impl FrameEncoder {
    /// Constructs `FrameEncoder`.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::Config` if `config` or `format` is invalid.
    pub fn new(config: config::Encoder, format: PcmFormat) -> Result<Self, EncodeError> {
        let config = config
            .into_verified()
            .map_err(|(_, e)| e.within("config"))?;
        format.verify().map_err(|e| e.within("format"))?;
        let inner = BlockEncoder::new(config, format);
        let block_size = inner.block_size;

        #[cfg(feature = "log")]
        log::debug!(
            target: "flakecodec::encoder",
            "{{ msg: \"encoder initialized\", block_size: {}, variable_block_size: {}, channels: {}, bits_per_sample: {} }}",
            block_size,
            inner.config.variable_block_size,
            format.channels(),
            format.bits_per_sample(),
        );

        Ok(Self {
            inner,
            buf: FrameBuf::with_capacity(format.channels(), block_size),
            scratch: FrameBuf::with_capacity(format.channels(), block_size),
        })
    }

    /// Returns the (maximum) number of samples per channel in a frame.
    pub const fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Returns the upper bound of the size of a frame from this encoder.
    pub const fn max_frame_size(&self) -> usize {
        max_frame_size(
            self.inner.block_size,
            self.inner.format.channels(),
            self.inner.format.bits_per_sample(),
        )
    }

    /// Returns the PCM format of the input.
    pub const fn format(&self) -> &PcmFormat {
        &self.inner.format
    }

    /// Encodes one frame from the start of `interleaved`.
    ///
    /// At most `block_size()` samples per channel are taken. With variable
    /// block size enabled, the frame may hold fewer samples than given; the
    /// caller must pass the rest again.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::Input` if `interleaved` is empty or has a sample
    /// out of range, and `EncodeError::Verification` if verification is
    /// enabled and the frame doesn't reproduce the input.
    pub fn encode_frame(&mut self, interleaved: &[i32]) -> Result<EncodedFrame, EncodeError> {
        self.inner
            .format
            .verify_samples(interleaved)
            .map_err(EncodeError::Input)?;
        if interleaved.is_empty() {
            return Err(EncodeError::Input(VerifyError::new(
                "samples",
                "must not be empty",
            )));
        }
        self.scratch.consume(self.scratch.len());
        self.scratch.fill_from_interleaved(interleaved);
        self.inner.encode(&self.scratch)
    }

    /// Buffers `interleaved` and appends every complete frame to `out`.
    ///
    /// # Errors
    ///
    /// Same as [`FrameEncoder::encode_frame`]. Nothing is buffered if the
    /// input is rejected.
    pub fn write(&mut self, interleaved: &[i32], out: &mut Vec<u8>) -> Result<(), EncodeError> {
        self.inner
            .format
            .verify_samples(interleaved)
            .map_err(EncodeError::Input)?;
        let channels = self.inner.format.channels();
        let mut rest = interleaved;
        loop {
            let taken = self.buf.fill_from_interleaved(rest);
            rest = &rest[taken * channels..];
            if !self.buf.is_full() {
                break;
            }
            self.flush_one(out)?;
        }
        Ok(())
    }

    /// Encodes the buffered samples and appends the frames to `out`.
    ///
    /// # Errors
    ///
    /// Same as [`FrameEncoder::encode_frame`].
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        while !self.buf.is_empty() {
            self.flush_one(out)?;
        }
        Ok(())
    }

    fn flush_one(&mut self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let frame = self.inner.encode(&self.buf)?;
        out.extend_from_slice(frame.bytes());
        self.buf.consume(frame.samples());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use crate::component::ChannelAssignment;
    use crate::config::PredictionType;
    use crate::decoder::FrameDecoder;
    use crate::test_helper;

    use rstest::rstest;

    fn stereo_signal(len: usize) -> Vec<i32> {
        let left = test_helper::sinusoids(len, 16, &[(0.011, 0.4), (0.07, 0.1)], 1);
        let right: Vec<i32> = left
            .iter()
            .zip(test_helper::sinusoids(len, 16, &[(0.003, 0.2)], 2))
            .map(|(l, d)| l / 2 + d)
            .collect();
        test_helper::interleave(&[left, right])
    }

    fn parse(bytes: &[u8], channels: usize, bits_per_sample: usize) -> Frame {
        parser::frame(&mut BitReader::new(bytes), channels, bits_per_sample, true).unwrap()
    }

    #[test]
    fn encoders_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameEncoder>();
    }

    #[rstest]
    #[case(192, 1, 8, 18 + 5 + 216)]
    #[case(4608, 2, 24, 18 + 10 + 28224)]
    #[case(16, 8, 4, 18 + 40 + 66)]
    fn frame_size_bound(
        #[case] block_size: usize,
        #[case] channels: usize,
        #[case] bits_per_sample: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(max_frame_size(block_size, channels, bits_per_sample), expected);
    }

    #[test]
    fn invalid_construction_is_rejected() {
        let format = PcmFormat::new(16, 1, 8000).unwrap();
        let config = config::Encoder {
            max_prediction_order: 40,
            ..config::Encoder::default()
        };
        let err = FrameEncoder::new(config, format).unwrap_err();
        assert!(matches!(err, EncodeError::Config(e) if e.path() == "config.max_prediction_order"));
    }

    #[test]
    fn invalid_input_is_rejected() {
        let format = PcmFormat::new(8, 2, 8000).unwrap();
        let mut encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        assert!(matches!(
            encoder.encode_frame(&[]),
            Err(EncodeError::Input(_))
        ));
        assert!(matches!(
            encoder.encode_frame(&[0, 0, 300, 0]),
            Err(EncodeError::Input(_))
        ));
        let mut out = vec![];
        assert!(matches!(
            encoder.write(&[0, 0, 0], &mut out),
            Err(EncodeError::Input(_))
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn frame_numbers_advance() {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let config = config::Encoder {
            block_size: Some(1152),
            ..config::Encoder::default()
        };
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let signal = stereo_signal(3000);

        let mut offset = 0;
        for n in 0..3 {
            let frame = encoder.encode_frame(&signal[offset * 2..]).unwrap();
            let parsed = parse(frame.bytes(), 2, 16);
            assert_eq!(parsed.header().frame_offset(), FrameOffset::Frame(n));
            assert_eq!(parsed.header().block_size(), frame.samples());
            assert!(frame.bytes().len() <= encoder.max_frame_size());
            let end = offset + frame.samples();
            assert_eq!(parsed.decode(), signal[offset * 2..end * 2]);
            offset = end;
        }
        assert_eq!(offset, 3000);
    }

    fn parse_with_decoder(bytes: &[u8], format: PcmFormat) -> Frame {
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let (frame, consumed) = decoder.parse_frame(bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        frame
    }

    #[test]
    fn constant_signal_yields_constant_subframe() {
        let format = PcmFormat::new(16, 1, 44100).unwrap();
        let mut encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        let signal = vec![1000i32; 4096];
        let frame = encoder.encode_frame(&signal).unwrap();
        assert_eq!(frame.samples(), 4096);
        let parsed = parse_with_decoder(frame.bytes(), format);
        match parsed.subframe(0) {
            Some(SubFrame::Constant(c)) => assert_eq!(c.dc_offset(), 1000),
            other => panic!("unexpected subframe {other:?}"),
        }
        assert_eq!(parsed.decode(), signal);
    }

    #[test]
    fn ramp_yields_fixed_subframe() {
        let format = PcmFormat::new(16, 1, 44100).unwrap();
        let config = config::Encoder::with_level(0).unwrap();
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let signal: Vec<i32> = (0..4096).map(|t| t * 3 - 2000).collect();
        let frame = encoder.encode_frame(&signal).unwrap();
        let end = frame.samples();
        let parsed = parse_with_decoder(frame.bytes(), format);
        match parsed.subframe(0) {
            Some(SubFrame::FixedLpc(f)) => assert!(f.order() >= 1),
            other => panic!("unexpected subframe {other:?}"),
        }
        assert_eq!(parsed.decode(), signal[..end]);
    }

    #[rstest]
    fn identical_channels_use_mid_side(#[values(3, 7, 10)] level: usize) {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let config = config::Encoder::with_level(level).unwrap();
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let mono = test_helper::sinusoids(4608, 16, &[(0.02, 0.6)], 5);
        let signal = test_helper::interleave(&[mono.clone(), mono]);
        let frame = encoder.encode_frame(&signal).unwrap();
        let end = frame.samples();
        let parsed = parse_with_decoder(frame.bytes(), format);
        assert_eq!(
            *parsed.header().channel_assignment(),
            ChannelAssignment::MidSide
        );
        match parsed.subframe(1) {
            Some(SubFrame::Constant(c)) => assert_eq!(c.dc_offset(), 0),
            other => panic!("unexpected side subframe {other:?}"),
        }
        assert_eq!(parsed.decode(), signal[..end * 2]);
    }

    #[test]
    fn independent_stereo_method_keeps_channels() {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let config = config::Encoder::with_level(0).unwrap();
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let signal = stereo_signal(2304);
        let frame = encoder.encode_frame(&signal).unwrap();
        let parsed = parse(frame.bytes(), 2, 16);
        assert_eq!(
            *parsed.header().channel_assignment(),
            ChannelAssignment::Independent(2)
        );
        assert_eq!(parsed.decode(), signal);
    }

    #[test]
    fn short_stereo_block_is_independent() {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let mut encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        let signal = stereo_signal(32);
        let frame = encoder.encode_frame(&signal).unwrap();
        assert_eq!(frame.samples(), 32);
        let parsed = parse(frame.bytes(), 2, 16);
        assert_eq!(
            *parsed.header().channel_assignment(),
            ChannelAssignment::Independent(2)
        );
        assert_eq!(parsed.decode(), signal);
    }

    #[test]
    fn noise_stays_within_verbatim_size() {
        let format = PcmFormat::new(24, 2, 96000).unwrap();
        let config = config::Encoder {
            block_size: Some(4096),
            verify: true,
            ..config::Encoder::default()
        };
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let signal = test_helper::interleave(&[
            test_helper::white_noise(4096, 24, 10),
            test_helper::white_noise(4096, 24, 11),
        ]);
        let frame = encoder.encode_frame(&signal).unwrap();
        assert!(frame.bytes().len() <= encoder.max_frame_size());
        assert_eq!(parse(frame.bytes(), 2, 24).decode(), signal);
    }

    #[test]
    fn verbatim_rewrite_reproduces_input() {
        let format = PcmFormat::new(12, 3, 16000).unwrap();
        let encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        let signal = test_helper::interleave(&[
            test_helper::white_noise(100, 12, 1),
            test_helper::white_noise(100, 12, 2),
            vec![-5; 100],
        ]);
        let mut buf = FrameBuf::with_capacity(3, 100);
        buf.fill_from_interleaved(&signal);
        let frame = encoder.inner.verbatim_frame(&buf, 100).unwrap();
        assert!(frame
            .subframes()
            .iter()
            .all(|sf| matches!(sf, SubFrame::Verbatim(_))));
        assert_eq!(frame.decode(), signal);
        assert!(frame.count_bits() / 8 <= max_frame_size(100, 3, 12));
    }

    #[test]
    fn verification_detects_mismatch() {
        let format = PcmFormat::new(16, 1, 8000).unwrap();
        let mut encoder = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        let signal = test_helper::sinusoids(512, 16, &[(0.05, 0.5)], 3);
        let frame = encoder.encode_frame(&signal).unwrap();

        let mut other = signal.clone();
        other[100] += 1;
        let mut buf = FrameBuf::with_capacity(1, 512);
        buf.fill_from_interleaved(&other);
        assert_eq!(
            encoder.inner.verify_frame(frame.bytes(), &buf),
            Err(VerificationError::Mismatch {
                position: 100,
                expected: other[100],
                actual: signal[100],
            })
        );
        assert!(matches!(
            encoder.inner.verify_frame(&frame.bytes()[..10], &buf),
            Err(VerificationError::Decode(_))
        ));
    }

    #[rstest]
    fn variable_block_size_splits_on_transients(#[values(1, 2, 3, 4)] mode: usize) {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let config = config::Encoder {
            variable_block_size: mode,
            verify: true,
            ..config::Encoder::default()
        };
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        assert_eq!(encoder.block_size(), 4096);

        // Silence followed by loud noise favors a split at the boundary.
        let len = 4096 * 3;
        let mut left = vec![0i32; len];
        let mut right = vec![0i32; len];
        let noise_l = test_helper::white_noise(len, 16, 8);
        let noise_r = test_helper::white_noise(len, 16, 9);
        for t in 2048..4096 {
            left[t] = noise_l[t];
            right[t] = noise_r[t];
        }
        let signal = test_helper::interleave(&[left, right]);

        let mut stream = vec![];
        encoder.write(&signal, &mut stream).unwrap();
        encoder.finish(&mut stream).unwrap();

        let mut pos = 0;
        let mut decoded = vec![];
        let mut sizes = vec![];
        while pos < stream.len() {
            let mut reader = BitReader::new(&stream[pos..]);
            let frame = parser::frame(&mut reader, 2, 16, true).unwrap();
            assert_eq!(
                frame.header().frame_offset(),
                FrameOffset::StartSample((decoded.len() / 2) as u64)
            );
            sizes.push(frame.block_size());
            decoded.extend(frame.decode());
            pos += reader.byte_position();
        }
        assert_eq!(decoded, signal);
        assert!(sizes.iter().any(|n| *n < 4096), "sizes = {sizes:?}");
    }

    #[rstest]
    fn prediction_types_round_trip(
        #[values(
            PredictionType::None,
            PredictionType::Fixed,
            PredictionType::Levinson,
            PredictionType::Search
        )]
        prediction: PredictionType,
    ) {
        let format = PcmFormat::new(20, 1, 48000).unwrap();
        let config = config::Encoder {
            prediction,
            block_size: Some(1000),
            verify: true,
            ..config::Encoder::default()
        };
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let signal = test_helper::ar2_process(2500, 20, [1.7, -0.85], 4);
        let mut stream = vec![];
        encoder.write(&signal, &mut stream).unwrap();
        encoder.finish(&mut stream).unwrap();

        let mut decoded = vec![];
        let mut pos = 0;
        while pos < stream.len() {
            let mut reader = BitReader::new(&stream[pos..]);
            decoded.extend(parser::frame(&mut reader, 1, 20, true).unwrap().decode());
            pos += reader.byte_position();
        }
        assert_eq!(decoded, signal);
        if prediction != PredictionType::None {
            assert!(stream.len() < 2500 * 20 / 8);
        }
    }
}
