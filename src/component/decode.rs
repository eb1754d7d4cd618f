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

use super::super::constant::fixed::COEFFICIENTS as FIXED_LPC_COEFS;
use super::bitrepr::seal_bit_repr;

use super::datatype::*;

/// Traits for components containing signals (represented in [`i32`]).
///
/// "Signal" here has slightly different meaning depending on the component
/// that implements this trait. For example, for `Residual`, signal is a
/// prediction error signal. For `SubFrame`, signal means a single-channel
/// sequence of samples whereas for `Frame`, signal is an interleaved multi-
/// channel samples.
///
/// All the arithmetic wraps around, so malformed components decode to
/// garbage instead of panicking.
pub trait Decode: seal_bit_repr::Sealed {
    /// Decodes and copies signal to the specified buffer.
    ///
    /// # Panics
    ///
    /// Implementations of this method should panic when `dest` doesn't have
    /// a sufficient length.
    fn copy_signal(&self, dest: &mut [i32]);

    /// Returns number of elements in the decoded signal.
    fn signal_len(&self) -> usize;

    /// Returns signal represented as `Vec<i32>`.
    fn decode(&self) -> Vec<i32> {
        let mut ret = vec![0i32; self.signal_len()];
        self.copy_signal(&mut ret);
        ret
    }
}

/// Returns true if LPC prediction with `coefs` may overflow a 32-bit accumulator.
///
/// Both the encoder and the decoder must take the same decision here so
/// that a wrapped-around prediction is reproduced bit-exactly.
#[inline]
pub(crate) fn needs_wide_accumulator(coefs: &[i16], bits_per_sample: usize) -> bool {
    let abs_sum: u64 = coefs.iter().map(|c| u64::from(c.unsigned_abs())).sum();
    (abs_sum << bits_per_sample) >= 1u64 << 32
}

/// Undoes the inter-channel decorrelation in place.
pub(crate) fn restore_stereo(assignment: ChannelAssignment, ch0: &mut [i32], ch1: &mut [i32]) {
    match assignment {
        ChannelAssignment::Independent(_) => {}
        ChannelAssignment::LeftSide => {
            for (l, s) in ch0.iter().zip(ch1.iter_mut()) {
                *s = l.wrapping_sub(*s);
            }
        }
        ChannelAssignment::RightSide => {
            for (s, r) in ch0.iter_mut().zip(ch1.iter()) {
                *s = s.wrapping_add(*r);
            }
        }
        ChannelAssignment::MidSide => {
            for (m, s) in ch0.iter_mut().zip(ch1.iter_mut()) {
                let side = *s;
                let mid = (m.wrapping_shl(1)) | (side & 0x01);
                *m = mid.wrapping_add(side) >> 1;
                *s = mid.wrapping_sub(side) >> 1;
            }
        }
    }
}

impl Decode for Frame {
    fn signal_len(&self) -> usize {
        self.block_size() * self.subframe_count()
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        assert!(dest.len() >= self.signal_len());

        let mut channels: Vec<Vec<i32>> = self.subframes().iter().map(Decode::decode).collect();

        if let [ch0, ch1] = channels.as_mut_slice() {
            restore_stereo(*self.header().channel_assignment(), ch0, ch1);
        }

        // interleave
        let channel_count = channels.len();
        for (ch, sig) in channels.iter().enumerate() {
            for (t, x) in sig.iter().enumerate() {
                dest[t * channel_count + ch] = *x;
            }
        }
    }
}

impl Decode for SubFrame {
    fn signal_len(&self) -> usize {
        match self {
            Self::Verbatim(c) => c.signal_len(),
            Self::Constant(c) => c.signal_len(),
            Self::FixedLpc(c) => c.signal_len(),
            Self::Lpc(c) => c.signal_len(),
        }
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        match self {
            Self::Verbatim(c) => c.copy_signal(dest),
            Self::Constant(c) => c.copy_signal(dest),
            Self::FixedLpc(c) => c.copy_signal(dest),
            Self::Lpc(c) => c.copy_signal(dest),
        }
        let wasted_bits = self.wasted_bits() as u32;
        if wasted_bits > 0 {
            for v in &mut dest[0..self.signal_len()] {
                *v = v.wrapping_shl(wasted_bits);
            }
        }
    }
}

impl Decode for Constant {
    fn signal_len(&self) -> usize {
        self.block_size()
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        assert!(dest.len() >= self.block_size());
        dest[0..self.signal_len()].fill(self.dc_offset());
    }
}

impl Decode for Verbatim {
    fn signal_len(&self) -> usize {
        self.samples().len()
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        assert!(dest.len() >= self.signal_len());
        dest[0..self.signal_len()].copy_from_slice(self.samples());
    }
}

/// Restores fixed-predictor signal in place, `dest[..order]` holds warm-up samples.
#[inline]
pub(crate) fn restore_fixed(order: usize, dest: &mut [i32]) {
    let coefs = &FIXED_LPC_COEFS[order][0..order];
    for t in order..dest.len() {
        let mut pred = 0i32;
        for (tau, w) in coefs.iter().enumerate() {
            pred = pred.wrapping_add(w.wrapping_mul(dest[t - 1 - tau]));
        }
        dest[t] = dest[t].wrapping_add(pred);
    }
}

/// Restores LPC signal in place, `dest[..coefs.len()]` holds warm-up samples.
#[inline]
pub(crate) fn restore_lpc(coefs: &[i16], shift: usize, bits_per_sample: usize, dest: &mut [i32]) {
    let order = coefs.len();
    if needs_wide_accumulator(coefs, bits_per_sample) {
        for t in order..dest.len() {
            let mut pred = 0i64;
            for (tau, w) in coefs.iter().enumerate() {
                pred = pred.wrapping_add(i64::from(*w).wrapping_mul(i64::from(dest[t - 1 - tau])));
            }
            dest[t] = dest[t].wrapping_add((pred >> shift) as i32);
        }
    } else {
        for t in order..dest.len() {
            let mut pred = 0i32;
            for (tau, w) in coefs.iter().enumerate() {
                pred = pred.wrapping_add(i32::from(*w).wrapping_mul(dest[t - 1 - tau]));
            }
            dest[t] = dest[t].wrapping_add(pred >> shift);
        }
    }
}

impl Decode for FixedLpc {
    fn signal_len(&self) -> usize {
        self.residual().signal_len()
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        let n = self.signal_len();
        self.residual().copy_signal(dest);
        dest[..self.order()].copy_from_slice(self.warm_up());
        restore_fixed(self.order(), &mut dest[..n]);
    }
}

impl Decode for Lpc {
    fn signal_len(&self) -> usize {
        self.residual().signal_len()
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        let n = self.signal_len();
        self.residual().copy_signal(dest);
        dest[..self.order()].copy_from_slice(self.warm_up());
        restore_lpc(
            self.parameters().coefs(),
            self.parameters().shift().max(0) as usize,
            self.bits_per_sample(),
            &mut dest[..n],
        );
    }
}

impl Decode for Residual {
    fn signal_len(&self) -> usize {
        self.block_size()
    }

    fn copy_signal(&self, dest: &mut [i32]) {
        assert!(dest.len() >= self.signal_len());
        dest[..self.signal_len()].copy_from_slice(self.residuals());
    }
}
