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

//! Module for the PCM format and input sample buffering.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::MAX_BITS_PER_SAMPLE;
use super::constant::MAX_CHANNELS;
use super::constant::MAX_SAMPLE_RATE;
use super::constant::MIN_BITS_PER_SAMPLE;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;

/// Format of the PCM samples carried in a stream.
///
/// Every frame of a stream must agree with the bit depth and the channel
/// count given here.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct PcmFormat {
    bits_per_sample: usize,
    channels: usize,
    sample_rate: usize,
}

impl PcmFormat {
    /// Constructs `PcmFormat`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if a value is out of the supported range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::source::*;
    /// let format = PcmFormat::new(16, 2, 44100).unwrap();
    /// assert_eq!(format.block_align(), 4);
    ///
    /// assert!(PcmFormat::new(16, 9, 44100).is_err());
    /// ```
    pub fn new(
        bits_per_sample: usize,
        channels: usize,
        sample_rate: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self {
            bits_per_sample,
            channels,
            sample_rate,
        };
        ret.verify()?;
        Ok(ret)
    }

    /// Returns the number of bits per sample.
    #[inline]
    pub const fn bits_per_sample(&self) -> usize {
        self.bits_per_sample
    }

    /// Returns the number of channels.
    #[inline]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Returns sampling rate in Hz.
    #[inline]
    pub const fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    /// Returns the size of an inter-channel sample in bytes.
    #[inline]
    pub const fn block_align(&self) -> usize {
        self.channels * ((self.bits_per_sample + 7) / 8)
    }

    /// Checks that the interleaved samples fit in the format.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` pointing the first sample out of range, or if
    /// the slice doesn't hold a whole number of inter-channel samples.
    pub fn verify_samples(&self, interleaved: &[i32]) -> Result<(), VerifyError> {
        verify_true!(
            "samples.len",
            interleaved.len() % self.channels == 0,
            "must be a multiple of the channel count"
        )?;
        let min = -(1i32 << (self.bits_per_sample - 1));
        let max = (1i32 << (self.bits_per_sample - 1)) - 1;
        for (t, v) in interleaved.iter().enumerate() {
            verify_true!(
                "samples[{t}]",
                (min..=max).contains(v),
                "must fit in the bits per sample"
            )?;
        }
        Ok(())
    }
}

impl Verify for PcmFormat {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!(
            "bits_per_sample",
            self.bits_per_sample,
            MIN_BITS_PER_SAMPLE..=MAX_BITS_PER_SAMPLE
        )?;
        verify_range!("channels", self.channels, 1..=MAX_CHANNELS)?;
        verify_range!("sample_rate", self.sample_rate, 1..=MAX_SAMPLE_RATE)
    }
}

/// Buffer of deinterleaved samples waiting to be encoded.
///
/// Each channel has room for `capacity` samples, of which the first `len`
/// are filled.
#[derive(Clone, Debug)]
pub struct FrameBuf {
    samples: Vec<i32>,
    channels: usize,
    capacity: usize,
    len: usize,
}

impl FrameBuf {
    /// Constructs an empty `FrameBuf` holding up to `capacity` samples per channel.
    pub fn with_capacity(channels: usize, capacity: usize) -> Self {
        Self {
            samples: vec![0i32; capacity * channels],
            channels,
            capacity,
            len: 0,
        }
    }

    /// Returns the number of filled samples per channel.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no sample is filled.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the buffer has no room left.
    pub const fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Returns the number of channels
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Appends interleaved samples, and returns the number of inter-channel
    /// samples taken.
    pub fn fill_from_interleaved(&mut self, interleaved: &[i32]) -> usize {
        let taken = std::cmp::min(self.capacity - self.len, interleaved.len() / self.channels);
        for (t, frame) in interleaved.chunks_exact(self.channels).take(taken).enumerate() {
            for (ch, v) in frame.iter().enumerate() {
                self.samples[ch * self.capacity + self.len + t] = *v;
            }
        }
        self.len += taken;
        taken
    }

    /// Drops the first `n` samples of each channel and moves the rest forward.
    pub fn consume(&mut self, n: usize) {
        let n = std::cmp::min(n, self.len);
        for ch in 0..self.channels {
            let offset = ch * self.capacity;
            self.samples
                .copy_within(offset + n..offset + self.len, offset);
        }
        self.len -= n;
    }

    /// Returns filled samples from the given channel.
    pub fn channel_slice(&self, ch: usize) -> &[i32] {
        &self.samples[ch * self.capacity..ch * self.capacity + self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(3, 1, 8000, "bits_per_sample")]
    #[case(25, 1, 8000, "bits_per_sample")]
    #[case(16, 0, 8000, "channels")]
    #[case(16, 2, 0, "sample_rate")]
    #[case(16, 2, 1_048_576, "sample_rate")]
    fn invalid_formats(
        #[case] bits_per_sample: usize,
        #[case] channels: usize,
        #[case] sample_rate: usize,
        #[case] path: &str,
    ) {
        let err = PcmFormat::new(bits_per_sample, channels, sample_rate)
            .expect_err("should be rejected");
        assert_eq!(err.path(), path);
    }

    #[test]
    fn sample_range_check() {
        let format = PcmFormat::new(8, 2, 8000).unwrap();
        assert!(format.verify_samples(&[127, -128, 0, 1]).is_ok());
        assert_eq!(
            format.verify_samples(&[0, 0, 128, 0]).unwrap_err().path(),
            "samples[2]"
        );
        assert_eq!(
            format.verify_samples(&[0, 0, 0]).unwrap_err().path(),
            "samples.len"
        );
        assert_eq!(PcmFormat::new(24, 6, 96000).unwrap().block_align(), 18);
    }

    #[test]
    fn frame_buf_carries_remainder() {
        let mut buf = FrameBuf::with_capacity(2, 4);
        assert_eq!(buf.fill_from_interleaved(&[1, 10, 2, 20, 3, 30]), 3);
        assert!(!buf.is_full());
        assert_eq!(buf.fill_from_interleaved(&[4, 40, 5, 50]), 1);
        assert!(buf.is_full());
        assert_eq!(buf.channel_slice(1), &[10, 20, 30, 40]);

        buf.consume(3);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.channel_slice(0), &[4]);
        assert_eq!(buf.channel_slice(1), &[40]);
        assert_eq!(buf.fill_from_interleaved(&[5, 50]), 1);
        assert_eq!(buf.channel_slice(0), &[4, 5]);

        buf.consume(10);
        assert!(buf.is_empty());
    }
}
