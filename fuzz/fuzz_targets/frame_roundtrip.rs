// Copyright 2023 Google LLC
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

#![no_main]

use std::fs::File;
use std::io::Write;

use arbitrary::Arbitrary;
use arbitrary::Unstructured;
use libfuzzer_sys::fuzz_target;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use flakecodec::config;
use flakecodec::constant;
use flakecodec::lpc::WindowFunction;
use flakecodec::source::PcmFormat;
use flakecodec::FrameDecoder;
use flakecodec::FrameEncoder;

fn arbitrary_config(
    u: &mut Unstructured,
    block_size: usize,
) -> Result<config::Encoder, arbitrary::Error> {
    let mut config = config::Encoder::with_level(u.int_in_range(0..=config::MAX_LEVEL)?)
        .expect("preset levels are valid");
    if bool::arbitrary(u)? {
        config.block_size = Some(block_size);
    }
    config.stereo_method = match u.int_in_range(0..=3usize)? {
        0 => config::StereoMethod::Independent,
        1 => config::StereoMethod::Estimate,
        2 => config::StereoMethod::Evaluate,
        _ => config::StereoMethod::Search,
    };
    config.window_method = match u.int_in_range(0..=2usize)? {
        0 => config::WindowMethod::Estimate,
        1 => config::WindowMethod::Evaluate,
        _ => config::WindowMethod::Search,
    };
    let window_count = u.int_in_range(1..=constant::qlpc::MAX_WINDOWS)?;
    config.window_functions = WindowFunction::ALL[..window_count].to_vec();
    config.max_prediction_order = u.int_in_range(1..=constant::qlpc::MAX_ORDER)?;
    config.min_prediction_order = u.int_in_range(1..=config.max_prediction_order)?;
    config.max_fixed_order = u.int_in_range(0..=constant::fixed::MAX_LPC_ORDER)?;
    config.min_fixed_order = u.int_in_range(0..=config.max_fixed_order)?;
    config.max_partition_order = u.int_in_range(0..=constant::rice::MAX_PARTITION_ORDER)?;
    config.min_partition_order = u.int_in_range(0..=config.max_partition_order)?;
    config.variable_block_size = u.int_in_range(0..=4usize)?;
    config.verify = true;
    Ok(config)
}

/// Piecewise signal made of silence, noise, and sinusoid segments.
fn arbitrary_signal(
    u: &mut Unstructured,
    len: usize,
    bits_per_sample: usize,
) -> Result<Vec<i32>, arbitrary::Error> {
    let max = (1i64 << (bits_per_sample - 1)) - 1;
    let mut rng = StdRng::seed_from_u64(u64::arbitrary(u)?);
    let mut ret = Vec::with_capacity(len);
    while ret.len() < len {
        let seg_len = u.int_in_range(1..=len - ret.len())?;
        let amplitude = f64::from(u16::arbitrary(u)?) / f64::from(u16::MAX) * max as f64;
        match u.int_in_range(0..=2usize)? {
            0 => {
                let dc = i64::arbitrary(u)?.clamp(-max - 1, max) as i32;
                ret.extend(std::iter::repeat(dc).take(seg_len));
            }
            1 => {
                let a = amplitude as i64;
                ret.extend((0..seg_len).map(|_| rng.gen_range(-a..=a) as i32));
            }
            _ => {
                let freq = f64::from(u16::arbitrary(u)?) / f64::from(u16::MAX) * 0.5;
                ret.extend((0..seg_len).map(|t| {
                    let v = amplitude * (2.0 * std::f64::consts::PI * freq * t as f64).sin();
                    (v.round() as i64).clamp(-max - 1, max) as i32
                }));
            }
        }
    }
    Ok(ret)
}

#[derive(Debug)]
struct Input {
    format: PcmFormat,
    config: config::Encoder,
    interleaved: Vec<i32>,
}

impl<'a> Arbitrary<'a> for Input {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self, arbitrary::Error> {
        let channels = u.int_in_range(1usize..=constant::MAX_CHANNELS)?;
        let bits_per_sample =
            u.int_in_range(constant::MIN_BITS_PER_SAMPLE..=constant::MAX_BITS_PER_SAMPLE)?;
        let sample_rate = u.int_in_range(1usize..=192_000)?;
        let format = PcmFormat::new(bits_per_sample, channels, sample_rate)
            .map_err(|_| arbitrary::Error::IncorrectFormat)?;
        let block_size = u.int_in_range(16usize..=8192)?;
        let len = u.int_in_range(1usize..=3 * block_size)?;
        let config = arbitrary_config(u, block_size)?;

        let mut interleaved = vec![0i32; len * channels];
        for ch in 0..channels {
            for (t, x) in arbitrary_signal(u, len, bits_per_sample)?
                .into_iter()
                .enumerate()
            {
                interleaved[t * channels + ch] = x;
            }
        }
        Ok(Self {
            format,
            config,
            interleaved,
        })
    }
}

fn dump_failed_stream(stream: &[u8]) {
    let mut f = File::create("fuzz.failed_stream.bin").unwrap();
    f.write_all(stream).unwrap();
}

fuzz_target!(|input: Input| {
    let Ok(mut encoder) = FrameEncoder::new(input.config.clone(), input.format) else {
        // random order ranges may be rejected by the config verifier.
        return;
    };
    let mut stream = vec![];
    encoder.write(&input.interleaved, &mut stream).unwrap();
    encoder.finish(&mut stream).unwrap();

    let mut decoder = FrameDecoder::new(config::Decoder::default(), input.format).unwrap();
    let mut decoded = vec![];
    let mut offset = 0;
    while offset < stream.len() {
        match decoder.decode_frame(&stream[offset..]) {
            Ok(frame) => {
                assert!(frame.consumed() <= encoder.max_frame_size());
                offset += frame.consumed();
                decoded.extend_from_slice(frame.samples());
            }
            Err(e) => {
                dump_failed_stream(&stream);
                panic!("decoding failed: {e}");
            }
        }
    }
    if decoded != input.interleaved {
        dump_failed_stream(&stream);
        panic!("input signal and decoded signal didn't match");
    }
});
