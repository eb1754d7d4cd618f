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

#![doc = include_str!("../README.md")]
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
// Some of clippy::pedantic rules are actually useful, so use it with a lot of
// ad-hoc exceptions.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_const_for_fn,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::wildcard_dependencies
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

pub mod bitsink;
pub mod bitsource;
pub(crate) mod coding;
pub mod component;
pub mod config;
pub mod constant;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod lpc;
pub mod rice;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helper;

// import global entry points
pub use decoder::DecodedFrame;
pub use decoder::FrameDecoder;
pub use encoder::max_frame_size;
pub use encoder::EncodedFrame;
pub use encoder::FrameEncoder;
pub use source::PcmFormat;

#[cfg(test)]
mod test {
    // end-to-end, but transparent test.
    use super::*;
    use rstest::rstest;

    fn decode_all(stream: &[u8], format: PcmFormat) -> (Vec<i32>, Vec<usize>) {
        let mut decoder = FrameDecoder::new(config::Decoder::default(), format).unwrap();
        let mut samples = vec![];
        let mut block_sizes = vec![];
        let mut pos = 0;
        while pos < stream.len() {
            let frame = decoder
                .decode_frame(&stream[pos..])
                .expect("decoding error");
            pos += frame.consumed();
            block_sizes.push(frame.block_size());
            samples.extend_from_slice(frame.samples());
        }
        (samples, block_sizes)
    }

    fn channel_signals(channels: usize, len: usize, bits_per_sample: usize) -> Vec<i32> {
        let mut signals: Vec<Vec<i32>> = vec![];
        for ch in 0..channels {
            let seed = ch as u64 + 100;
            let signal = match ch % 3 {
                0 => test_helper::sinusoids(
                    len,
                    bits_per_sample,
                    &[(0.004, 0.3), (0.031, 0.2)],
                    seed,
                ),
                1 => test_helper::ar2_process(len, bits_per_sample, [1.5, -0.7], seed),
                _ => {
                    // correlated with the first channel.
                    let base = &signals[0];
                    let mut s = test_helper::sinusoids(len, bits_per_sample, &[(0.1, 0.05)], seed);
                    for (x, b) in s.iter_mut().zip(base.iter()) {
                        *x += b / 2;
                    }
                    s
                }
            };
            signals.push(signal);
        }
        test_helper::interleave(&signals)
    }

    #[rstest]
    fn e2e_with_every_level(
        #[values(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11)] level: usize,
        #[values(1, 2, 6)] channels: usize,
    ) {
        let signal_len = 20000;
        let bits_per_sample = 16;
        let format = PcmFormat::new(bits_per_sample, channels, 44100).unwrap();
        let mut config = config::Encoder::with_level(level).unwrap();
        config.verify = true;

        let signal = channel_signals(channels, signal_len, bits_per_sample);
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let mut stream = vec![];
        // Irregular chunks to exercise buffering.
        for chunk in signal.chunks(777 * channels) {
            encoder.write(chunk, &mut stream).unwrap();
        }
        encoder.finish(&mut stream).unwrap();

        let (decoded, block_sizes) = decode_all(&stream, format);
        assert_eq!(decoded, signal);
        assert_eq!(block_sizes.iter().sum::<usize>(), signal_len);
        assert!(block_sizes.iter().all(|n| *n <= encoder.block_size()));
        assert!(stream.len() < signal.len() * 2);
    }

    #[rstest]
    fn e2e_with_bit_depths(#[values(4, 8, 12, 20, 24)] bits_per_sample: usize) {
        let format = PcmFormat::new(bits_per_sample, 2, 48000).unwrap();
        let config = config::Encoder {
            verify: true,
            ..config::Encoder::with_level(8).unwrap()
        };
        let signal = channel_signals(2, 5000, bits_per_sample);
        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let mut stream = vec![];
        encoder.write(&signal, &mut stream).unwrap();
        encoder.finish(&mut stream).unwrap();
        assert_eq!(decode_all(&stream, format).0, signal);
    }

    #[test]
    fn variable_block_size_levels_produce_differing_sizes() {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let config = config::Encoder::with_level(11).unwrap();
        let mut encoder = FrameEncoder::new(config, format).unwrap();

        // Silence followed by noise.
        let len = 4096 * 4 + 1000;
        let noise = test_helper::white_noise(len, 16, 5);
        let left: Vec<i32> = noise
            .iter()
            .enumerate()
            .map(|(t, v)| if t < 3072 { 0 } else { v / 64 })
            .collect();
        let right: Vec<i32> = left.iter().map(|v| -v).collect();
        let signal = test_helper::interleave(&[left, right]);

        let mut stream = vec![];
        encoder.write(&signal, &mut stream).unwrap();
        encoder.finish(&mut stream).unwrap();
        let (decoded, block_sizes) = decode_all(&stream, format);
        assert_eq!(decoded, signal);
        assert!(block_sizes[0] < encoder.block_size());
        assert!(
            block_sizes.iter().any(|n| *n != block_sizes[0]),
            "block_sizes = {block_sizes:?}"
        );
    }

    #[rstest]
    fn claxon_decodes_fixed_blocking_streams(
        #[values(0, 3, 7, 10)] level: usize,
        #[values(1, 2, 5)] channels: usize,
    ) {
        let signal_len = 12345;
        let format = PcmFormat::new(16, channels, 44100).unwrap();
        let config = config::Encoder::with_level(level).unwrap();
        // Tones and noise, then digital silence starting inside a block.
        let signals: Vec<Vec<i32>> = (0..channels)
            .map(|ch| {
                let mut signal: Vec<i32> = if ch == 1 {
                    test_helper::white_noise(signal_len, 16, ch as u64)
                        .iter()
                        .map(|v| v / 4)
                        .collect()
                } else {
                    let f = 0.003 * (ch + 1) as f64;
                    test_helper::sinusoids(signal_len, 16, &[(f, 0.4), (f * 7.0, 0.2)], ch as u64)
                };
                signal[6000..].fill(0);
                signal
            })
            .collect();
        let signal = test_helper::interleave(&signals);

        let mut encoder = FrameEncoder::new(config, format).unwrap();
        let mut frames = vec![];
        encoder.write(&signal, &mut frames).unwrap();
        encoder.finish(&mut frames).unwrap();

        let stream =
            test_helper::make_stream(&format, encoder.block_size(), signal_len as u64, &frames);
        let decoded = test_helper::decode_with_claxon(stream, &format);
        assert_eq!(decoded, signal);
    }

    #[test]
    fn streaming_and_single_frame_apis_agree() {
        let format = PcmFormat::new(16, 2, 22050).unwrap();
        let signal = channel_signals(2, 6000, 16);

        let mut streaming = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        let mut stream = vec![];
        streaming.write(&signal, &mut stream).unwrap();
        streaming.finish(&mut stream).unwrap();

        let mut framewise = FrameEncoder::new(config::Encoder::default(), format).unwrap();
        let mut bytes = vec![];
        let mut offset = 0;
        while offset < 6000 {
            let frame = framewise.encode_frame(&signal[offset * 2..]).unwrap();
            offset += frame.samples();
            bytes.extend_from_slice(frame.bytes());
        }
        assert_eq!(bytes, stream);
    }
}
