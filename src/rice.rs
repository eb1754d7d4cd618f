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

//! Functions for partitioned rice coding (PRC).

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::panic_msg;
use super::constant::rice::ESCAPE_PARAMETER;
use super::constant::rice::ESCAPE_PARAMETER_EXTENDED;
use super::constant::rice::ESCAPE_WIDTH_BITS;
use super::constant::rice::MAX_PARTITIONS;
use super::constant::rice::MAX_PARTITION_ORDER;
use super::constant::rice::MAX_RICE_PARAMETER;
use super::constant::rice::MAX_RICE_PARAMETER_EXTENDED;

/// Encodes the sign bit into its LSB (for Rice coding).
///
/// # Examples
///
/// ```
/// # use flakecodec::rice::*;
/// assert_eq!(encode_signbit(0), 0);
/// assert_eq!(encode_signbit(-1), 1);
/// assert_eq!(encode_signbit(1), 2);
/// assert_eq!(encode_signbit(i32::MIN), u32::MAX);
/// ```
#[inline]
pub const fn encode_signbit(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// Recovers a sign bit from its LSB.
///
/// # Examples
///
/// ```
/// # use flakecodec::rice::*;
/// assert_eq!(decode_signbit(3), -2);
/// assert_eq!(decode_signbit(u32::MAX), i32::MIN);
/// ```
#[inline]
pub const fn decode_signbit(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Residual coding method, i.e. the width of the per-partition parameters.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum RiceMethod {
    /// 4-bit parameters.
    #[default]
    Rice4,
    /// 5-bit parameters.
    Rice5,
}

impl RiceMethod {
    /// Returns the method from the 2-bit tag used in the bitstream.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Rice4),
            1 => Some(Self::Rice5),
            _ => None,
        }
    }

    /// Returns the 2-bit tag used in the bitstream.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Rice4 => 0,
            Self::Rice5 => 1,
        }
    }

    /// Returns the number of bits for each partition parameter.
    pub const fn parameter_bits(self) -> usize {
        match self {
            Self::Rice4 => 4,
            Self::Rice5 => 5,
        }
    }

    /// Returns the largest usable Rice parameter.
    pub const fn max_parameter(self) -> usize {
        match self {
            Self::Rice4 => MAX_RICE_PARAMETER,
            Self::Rice5 => MAX_RICE_PARAMETER_EXTENDED,
        }
    }

    /// Returns the parameter value reserved for escaped partitions.
    pub const fn escape_code(self) -> usize {
        match self {
            Self::Rice4 => ESCAPE_PARAMETER,
            Self::Rice5 => ESCAPE_PARAMETER_EXTENDED,
        }
    }
}

/// Coding of a single partition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum PartitionCode {
    /// Rice code with the given parameter.
    Rice(u8),
    /// Raw two's complement values with the given bit width.
    Escaped(u8),
}

/// Parameter for PRC (partitioned Rice-coding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrcParameter {
    /// Partition order.
    pub order: usize,
    /// Coding method.
    pub method: RiceMethod,
    /// Coding of each partition.
    pub codes: heapless::Vec<PartitionCode, MAX_PARTITIONS>,
    /// Estimated size in bits, excluding the method and the order fields.
    pub bits: usize,
}

#[inline]
const fn bit_length(v: u64) -> usize {
    (u64::BITS - v.leading_zeros()) as usize
}

#[inline]
const fn rice_cost(count: u64, sum: u64, k: usize) -> u64 {
    count * (k as u64 + 1) + (sum >> k)
}

/// Finds the Rice parameter minimizing the estimated cost of a partition.
///
/// The cost is convex in `k`, so a local search from the log2 estimate finds
/// the global minimum. Among equal costs, the smallest parameter wins.
fn best_rice_parameter(count: u64, sum: u64, max_parameter: usize) -> (usize, u64) {
    if count == 0 {
        return (0, 0);
    }
    let mut k = std::cmp::min(bit_length(sum / count), max_parameter);
    let mut cost = rice_cost(count, sum, k);
    while k < max_parameter {
        let next = rice_cost(count, sum, k + 1);
        if next >= cost {
            break;
        }
        k += 1;
        cost = next;
    }
    while k > 0 {
        let prev = rice_cost(count, sum, k - 1);
        if prev > cost {
            break;
        }
        k -= 1;
        cost = prev;
    }
    (k, cost)
}

/// Upper bound for searching the unconstrained Rice parameter.
const MAX_NATURAL_PARAMETER: usize = u64::BITS as usize - 1;

/// Chooses the Rice parameter for a partition.
///
/// A partition is escaped to raw values only when its optimal parameter is
/// larger than `method` can signal and the value width fits the 5-bit field.
fn partition_code(count: u64, sum: u64, max: u32, method: RiceMethod) -> (PartitionCode, u64) {
    let cap = method.max_parameter();
    let (k, cost) = best_rice_parameter(count, sum, cap);
    if k == cap {
        let (natural, _) = best_rice_parameter(count, sum, MAX_NATURAL_PARAMETER);
        let width = bit_length(u64::from(max));
        if natural > cap && width < (1 << ESCAPE_WIDTH_BITS) {
            let escaped = ESCAPE_WIDTH_BITS as u64 + count * width as u64;
            return (PartitionCode::Escaped(width as u8), escaped);
        }
    }
    (PartitionCode::Rice(k as u8), cost)
}

/// Returns the finest partition order usable for the given block.
///
/// Every partition must be aligned, and the first partition must keep at
/// least one residual after `order` warm-up samples.
///
/// # Examples
///
/// ```
/// # use flakecodec::rice::*;
/// assert_eq!(max_partition_order(4096, 0, 8), 8);
/// assert_eq!(max_partition_order(192, 0, 8), 6);
/// assert_eq!(max_partition_order(64, 8, 8), 2);
/// assert_eq!(max_partition_order(4095, 2, 8), 0);
/// ```
pub fn max_partition_order(block_size: usize, order: usize, max_porder: usize) -> usize {
    let mut pmax = std::cmp::min(
        std::cmp::min(max_porder, MAX_PARTITION_ORDER),
        block_size.trailing_zeros() as usize,
    );
    while pmax > 0 && (block_size >> pmax) <= order {
        pmax -= 1;
    }
    pmax
}

/// Helper object that holds pre-allocated buffers for PRC optimization.
///
/// Partition statistics for all partition orders are stored in flat buffers
/// where the level for the order `p` starts at `(1 << p) - 1`.
#[derive(Clone, Debug, Default)]
pub struct PrcParameterFinder {
    sums: Vec<u64>,
    maxes: Vec<u32>,
}

impl PrcParameterFinder {
    /// Constructs a finder with empty buffers.
    pub const fn new() -> Self {
        Self {
            sums: Vec::new(),
            maxes: Vec::new(),
        }
    }

    fn collect_statistics(&mut self, residual: &[i32], order: usize, pmax: usize) {
        let levels = (1usize << (pmax + 1)) - 1;
        self.sums.clear();
        self.sums.resize(levels, 0);
        self.maxes.clear();
        self.maxes.resize(levels, 0);

        let nparts = 1usize << pmax;
        let base = nparts - 1;
        let psize = residual.len() >> pmax;
        for p in 0..nparts {
            let start = std::cmp::max(p * psize, order);
            let end = (p + 1) * psize;
            let mut sum = 0u64;
            let mut max = 0u32;
            for v in &residual[start..end] {
                let u = encode_signbit(*v);
                sum += u64::from(u);
                max = std::cmp::max(max, u);
            }
            self.sums[base + p] = sum;
            self.maxes[base + p] = max;
        }

        for level in (0..pmax).rev() {
            let dest = (1usize << level) - 1;
            let src = (1usize << (level + 1)) - 1;
            for p in 0..(1usize << level) {
                self.sums[dest + p] = self.sums[src + 2 * p] + self.sums[src + 2 * p + 1];
                self.maxes[dest + p] =
                    std::cmp::max(self.maxes[src + 2 * p], self.maxes[src + 2 * p + 1]);
            }
        }
    }

    fn evaluate(
        &self,
        block_size: usize,
        order: usize,
        porder: usize,
        method: RiceMethod,
        codes: &mut heapless::Vec<PartitionCode, MAX_PARTITIONS>,
    ) -> usize {
        codes.clear();
        let nparts = 1usize << porder;
        let base = nparts - 1;
        let psize = block_size >> porder;
        let mut bits = (method.parameter_bits() * nparts) as u64;
        for p in 0..nparts {
            let count = if p == 0 { psize - order } else { psize };
            let (code, cost) =
                partition_code(count as u64, self.sums[base + p], self.maxes[base + p], method);
            bits += cost;
            codes.push(code).expect(panic_msg::PARTITION_OVERFLOW);
        }
        bits as usize
    }

    /// Finds the partitioning and the parameters minimizing the code size.
    ///
    /// `residual` is the whole block of prediction residuals where the first
    /// `order` values are warm-up samples and not coded. Partition orders are
    /// searched within `min_porder..=max_porder` (the upper bound is further
    /// limited by the block size). 5-bit parameters are only tried when
    /// `allow_extended` is set. Among equal sizes, the lower partition order
    /// and the 4-bit method are preferred.
    ///
    /// # Panics
    ///
    /// Panics if `residual` is not longer than `order`.
    pub fn find(
        &mut self,
        residual: &[i32],
        order: usize,
        min_porder: usize,
        max_porder: usize,
        allow_extended: bool,
    ) -> PrcParameter {
        assert!(residual.len() > order, "{}", panic_msg::DATA_INCONSISTENT);
        let block_size = residual.len();
        let pmax = max_partition_order(block_size, order, max_porder);
        let pmin = std::cmp::min(min_porder, pmax);
        self.collect_statistics(residual, order, pmax);

        let methods: &[RiceMethod] = if allow_extended {
            &[RiceMethod::Rice4, RiceMethod::Rice5]
        } else {
            &[RiceMethod::Rice4]
        };

        let mut best: Option<PrcParameter> = None;
        let mut codes = heapless::Vec::new();
        for porder in pmin..=pmax {
            for &method in methods {
                let bits = self.evaluate(block_size, order, porder, method, &mut codes);
                // Strict comparison: on ties the lower order and Rice4 stay.
                if best.as_ref().map_or(true, |b| bits < b.bits) {
                    best = Some(PrcParameter {
                        order: porder,
                        method,
                        codes: codes.clone(),
                        bits,
                    });
                }
            }
        }
        best.expect(panic_msg::DATA_INCONSISTENT)
    }
}

/// Finds the PRC parameter with a temporary [`PrcParameterFinder`].
///
/// # Examples
///
/// ```
/// # use flakecodec::rice::*;
/// let residual = [0i32; 64];
/// let prc = find_partitioned_rice_parameter(&residual, 2, 0, 8, false);
/// assert_eq!(prc.order, 0);
/// assert_eq!(prc.codes[0], PartitionCode::Rice(0));
/// assert_eq!(prc.bits, 4 + 62);
/// ```
pub fn find_partitioned_rice_parameter(
    residual: &[i32],
    order: usize,
    min_porder: usize,
    max_porder: usize,
    allow_extended: bool,
) -> PrcParameter {
    PrcParameterFinder::new().find(residual, order, min_porder, max_porder, allow_extended)
}
