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

use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::qlpc::MAX_PRECISION as MAX_LPC_PRECISION;
use crate::constant::qlpc::MAX_SHIFT as MAX_LPC_SHIFT;
use crate::constant::qlpc::MIN_SHIFT as MIN_LPC_SHIFT;
use crate::constant::rice::MAX_PARTITION_ORDER;
use crate::constant::MAX_CHANNELS;
use crate::error::verify_range;
use crate::error::verify_true;
use crate::error::Verify;
use crate::error::VerifyError;
use crate::rice::PartitionCode;

use super::datatype::ChannelAssignment;
use super::datatype::Constant;
use super::datatype::FixedLpc;
use super::datatype::Frame;
use super::datatype::FrameHeader;
use super::datatype::Lpc;
use super::datatype::QuantizedParameters;
use super::datatype::Residual;
use super::datatype::SubFrame;
use super::datatype::Verbatim;

// Some (internal) utility macros for value verification.
macro_rules! verify_block_size {
    ($varname:literal, $size:expr) => {
        verify_range!($varname, $size, 1..=(crate::constant::MAX_BLOCK_SIZE))
    };
}
pub(crate) use verify_block_size;

/// Checks the width of coded samples. A side channel may take one extra bit.
macro_rules! verify_bps {
    ($varname:literal, $bps:expr) => {
        verify_range!(
            $varname,
            $bps,
            1..=(crate::constant::MAX_BITS_PER_SAMPLE + 1)
        )
    };
}
pub(crate) use verify_bps;

macro_rules! verify_sample_range {
    ($varname:literal, $sample:expr, $bps:expr) => {{
        let min_sample = -((1i64 << ($bps as usize - 1)));
        let max_sample = (1i64 << ($bps as usize - 1)) - 1;
        verify_range!($varname, i64::from($sample), min_sample..=max_sample)
    }};
}
pub(crate) use verify_sample_range;

impl Verify for Frame {
    fn verify(&self) -> Result<(), VerifyError> {
        self.header().verify().map_err(|e| e.within("header"))?;
        verify_true!(
            "subframes.len",
            self.subframe_count() == self.header().channel_assignment().channels(),
            "must match the number of channels in the header"
        )?;
        for (ch, sf) in self.subframes().iter().enumerate() {
            sf.verify()
                .map_err(|e| e.within(&format!("subframe[{ch}]")))?;
            verify_true!(
                "subframe[{ch}].block_size",
                sf.block_size() == self.block_size(),
                "must match the block size in the header"
            )?;
        }
        Ok(())
    }
}

impl Verify for ChannelAssignment {
    fn verify(&self) -> Result<(), VerifyError> {
        match *self {
            Self::Independent(ch) => {
                verify_range!("Independent(ch)", ch as usize, 1..=MAX_CHANNELS)
            }
            Self::LeftSide | Self::RightSide | Self::MidSide => Ok(()),
        }
    }
}

impl Verify for FrameHeader {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_range!(
            "frame_offset",
            self.frame_offset().counter(),
            ..=((1u64 << 36) - 1)
        )?;
        self.channel_assignment()
            .verify()
            .map_err(|e| e.within("channel_assignment"))
    }
}

/// Checks the common parts of subframes.
fn verify_widths(bits_per_sample: usize, wasted_bits: usize) -> Result<(), VerifyError> {
    verify_bps!("bits_per_sample", bits_per_sample)?;
    verify_range!(
        "wasted_bits",
        bits_per_sample + wasted_bits,
        ..=(crate::constant::MAX_BITS_PER_SAMPLE + 1)
    )
}

impl Verify for SubFrame {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_widths(self.bits_per_sample(), self.wasted_bits())?;
        match self {
            Self::Verbatim(c) => c.verify(),
            Self::Constant(c) => c.verify(),
            Self::FixedLpc(c) => c.verify(),
            Self::Lpc(c) => c.verify(),
        }
    }
}

impl Verify for Constant {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_sample_range!("dc_offset", self.dc_offset(), self.bits_per_sample())
    }
}

impl Verify for Verbatim {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("data.len", self.samples().len())?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        for (t, v) in self.samples().iter().enumerate() {
            verify_sample_range!("data[{t}]", *v, self.bits_per_sample())?;
        }
        Ok(())
    }
}

impl Verify for FixedLpc {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        for (t, v) in self.warm_up().iter().enumerate() {
            verify_sample_range!("warm_up[{t}]", *v, self.bits_per_sample())?;
        }
        verify_true!(
            "residual.warmup_length",
            self.residual().warmup_length() == self.order(),
            "must be equal to the order"
        )?;
        self.residual()
            .verify()
            .map_err(|err| err.within("residual"))
    }
}

impl Verify for Lpc {
    fn verify(&self) -> Result<(), VerifyError> {
        self.parameters()
            .verify()
            .map_err(|err| err.within("parameters"))?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_true!(
            "warm_up.len",
            self.warm_up().len() == self.order(),
            "must be equal to the order"
        )?;
        for (t, v) in self.warm_up().iter().enumerate() {
            verify_sample_range!("warm_up[{t}]", *v, self.bits_per_sample())?;
        }
        verify_true!(
            "residual.warmup_length",
            self.residual().warmup_length() == self.order(),
            "must be equal to the order"
        )?;
        self.residual()
            .verify()
            .map_err(|err| err.within("residual"))
    }
}

impl Verify for QuantizedParameters {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("order", self.order(), 1..=MAX_LPC_ORDER)?;
        verify_range!("shift", self.shift(), MIN_LPC_SHIFT..=MAX_LPC_SHIFT)?;
        verify_range!("precision", self.precision(), 1..=MAX_LPC_PRECISION)?;
        for (t, c) in self.coefs().iter().enumerate() {
            verify_sample_range!("coefs[{t}]", *c, self.precision())?;
        }
        Ok(())
    }
}

impl Verify for Residual {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!(
            "partition_order",
            self.partition_order(),
            ..=MAX_PARTITION_ORDER
        )?;
        verify_block_size!("block_size", self.block_size())?;
        let nparts = 1usize << self.partition_order();
        verify_true!(
            "block_size",
            self.block_size() % nparts == 0,
            "must be divisible by the number of partitions"
        )?;
        verify_true!(
            "warmup_length",
            self.block_size() / nparts >= self.warmup_length(),
            "must not be longer than a partition"
        )?;
        for t in 0..self.warmup_length() {
            verify_true!(
                "residuals[{t}]",
                self.residual(t) == 0,
                "must be zero for warmup samples"
            )?;
        }

        let max_parameter = self.method().max_parameter();
        for (p, (code, values)) in self.partitions().enumerate() {
            match code {
                PartitionCode::Rice(k) => {
                    verify_range!("codes[{p}]", k as usize, ..=max_parameter)?;
                }
                PartitionCode::Escaped(width) => {
                    verify_range!("codes[{p}]", width as usize, ..=31usize)?;
                    for v in values {
                        let fits = if width == 0 {
                            *v == 0
                        } else {
                            verify_sample_range!("residual", *v, width).is_ok()
                        };
                        verify_true!(
                            "codes[{p}]",
                            fits,
                            "escaped width must hold all the values in the partition"
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}
