// Copyright 2022-2024 Google LLC
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

#![allow(clippy::missing_panics_doc)]

use std::io::Cursor;

use rand::distributions::Distribution;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::source::PcmFormat;

#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let err = ($actual - $expected).abs();
        #[allow(clippy::suboptimal_flops)]
        let tol = $rtol * ($expected).abs() + $atol;
        assert!(err < tol);
    }};
    ($actual:expr, $expected:expr) => {{
        assert_close!($actual, $expected, rtol = 0.00001, atol = 0.00001);
    }};
}

#[macro_export]
macro_rules! assert_finite {
    ($result:expr) => {{
        for (i, &value) in $result.iter().enumerate() {
            assert!(
                value.is_normal() || value == 0.0,
                "{}-th element in a vector is not finite ({}), x={:?}.",
                i,
                value,
                $result
            );
        }
    }};
}

fn clamp_to_bits(v: i64, bits_per_sample: usize) -> i32 {
    let max = (1i64 << (bits_per_sample - 1)) - 1;
    v.clamp(-max - 1, max) as i32
}

/// Generates a sum of sinusoids plus a small uniform noise.
///
/// Each component is given as `(frequency, amplitude)` where frequency is
/// normalized by the sampling rate and amplitude is relative to the full
/// scale of `bits_per_sample`.
pub fn sinusoids(
    block_size: usize,
    bits_per_sample: usize,
    components: &[(f64, f64)],
    seed: u64,
) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Uniform::from(-2i64..=2);
    let full_scale = (1i64 << (bits_per_sample - 1)) as f64;
    (0..block_size)
        .map(|t| {
            let v: f64 = components
                .iter()
                .map(|(freq, amp)| {
                    amp * full_scale * (2.0 * std::f64::consts::PI * freq * t as f64).sin()
                })
                .sum();
            clamp_to_bits(v.round() as i64 + noise.sample(&mut rng), bits_per_sample)
        })
        .collect()
}

/// Generates uniform white noise over the whole range of `bits_per_sample`.
pub fn white_noise(block_size: usize, bits_per_sample: usize, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let max = (1i32 << (bits_per_sample - 1)) - 1;
    let dist = Uniform::from(-max - 1..=max);
    (0..block_size).map(|_| dist.sample(&mut rng)).collect()
}

/// Generates a second-order autoregressive process driven by uniform noise.
pub fn ar2_process(
    block_size: usize,
    bits_per_sample: usize,
    coefs: [f64; 2],
    seed: u64,
) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let excitation = Uniform::from(-64.0f64..64.0);
    let mut x1 = 0.0f64;
    let mut x2 = 0.0f64;
    (0..block_size)
        .map(|_| {
            let x = coefs[0].mul_add(x1, coefs[1] * x2) + excitation.sample(&mut rng);
            x2 = x1;
            x1 = x;
            clamp_to_bits(x.round() as i64, bits_per_sample)
        })
        .collect()
}

/// Interleaves channel signals of the same length.
pub fn interleave(channels: &[Vec<i32>]) -> Vec<i32> {
    let len = channels.iter().map(Vec::len).min().unwrap_or(0);
    let mut ret = Vec::with_capacity(len * channels.len());
    for t in 0..len {
        for ch in channels {
            ret.push(ch[t]);
        }
    }
    ret
}

/// Makes a stream consisting of "fLaC", a STREAMINFO block, and `frames`.
///
/// Frame sizes and MD5 digest are written as unknown.
pub fn make_stream(
    format: &PcmFormat,
    max_block_size: usize,
    total_samples: u64,
    frames: &[u8],
) -> Vec<u8> {
    let mut ret = b"fLaC".to_vec();
    // last-metadata flag + STREAMINFO type, and the 24-bit length.
    ret.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    ret.extend_from_slice(&16u16.to_be_bytes());
    ret.extend_from_slice(&(max_block_size as u16).to_be_bytes());
    ret.extend_from_slice(&[0u8; 6]);
    let packed: u64 = (format.sample_rate() as u64) << 44
        | ((format.channels() as u64 - 1) << 41)
        | ((format.bits_per_sample() as u64 - 1) << 36)
        | total_samples;
    ret.extend_from_slice(&packed.to_be_bytes());
    ret.extend_from_slice(&[0u8; 16]);
    ret.extend_from_slice(frames);
    ret
}

/// Decodes a stream made by `make_stream` with `claxon`.
pub fn decode_with_claxon(stream: Vec<u8>, format: &PcmFormat) -> Vec<i32> {
    let mut reader =
        claxon::FlacReader::new(Cursor::new(stream)).expect("claxon rejected the stream header");
    let info = reader.streaminfo();
    assert_eq!(info.channels as usize, format.channels());
    assert_eq!(info.bits_per_sample as usize, format.bits_per_sample());
    assert_eq!(info.sample_rate as usize, format.sample_rate());
    reader
        .samples()
        .map(|s| s.expect("claxon failed to decode a frame"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_signals_fit_in_bits() {
        for bps in [8, 16, 24] {
            let limit = 1i32 << (bps - 1);
            let s = sinusoids(1000, bps, &[(0.01, 0.7), (0.2, 0.29)], 1);
            assert!(s.iter().all(|v| (-limit..limit).contains(v)));
            let s = white_noise(1000, bps, 2);
            assert!(s.iter().all(|v| (-limit..limit).contains(v)));
            let s = ar2_process(1000, bps, [1.6, -0.8], 3);
            assert!(s.iter().all(|v| (-limit..limit).contains(v)));
        }
    }

    #[test]
    fn interleaving() {
        let x = interleave(&[vec![1, 2, 3], vec![-1, -2, -3]]);
        assert_eq!(x, vec![1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn streaminfo_layout() {
        let format = PcmFormat::new(16, 2, 44100).unwrap();
        let stream = make_stream(&format, 4096, 12345, &[]);
        assert_eq!(stream.len(), 42);
        assert_eq!(&stream[..4], b"fLaC");
        // 44100 = 0x0AC44, channels - 1 = 1, bps - 1 = 15.
        assert_eq!(&stream[18..22], &[0x0A, 0xC4, 0x42, 0xF0]);
        assert_eq!(&stream[22..26], &12345u32.to_be_bytes());
    }
}
