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

//! Codec constants

#![allow(dead_code)] // it's okay if some format constants are not used.

// Constants sorted in an alphabetical-order.  Top-level constants first, and
// then sub-modules. Constants that are used only in a specific sub-module or
// its caller should be placed in the corresponding submodule.

/// Maximum number of bits-per-sample supported.
pub const MAX_BITS_PER_SAMPLE: usize = 24;

/// Maximum length of a block (in samples per channel) representable in a header.
pub const MAX_BLOCK_SIZE: usize = 65535;

/// Maximum number of channels.
pub const MAX_CHANNELS: usize = 8;

/// Maximum sample rate in Hz that can be declared in a PCM format.
pub const MAX_SAMPLE_RATE: usize = 1_048_575;

/// Minimum number of bits-per-sample supported.
pub const MIN_BITS_PER_SAMPLE: usize = 4;

/// Constants related to block size selection.
pub mod block {
    /// Default target duration of a frame in milliseconds.
    pub const DEFAULT_BLOCK_TIME_MS: usize = 105;

    /// Block size used when no tabulated size fits the target duration.
    pub const FALLBACK_BLOCK_SIZE: usize = 192;

    /// Block sizes that have a dedicated 4-bit code in the frame header.
    pub const TABULATED_BLOCK_SIZES: [usize; 12] = [
        192, 576, 1152, 2304, 4608, 256, 512, 1024, 2048, 4096, 8192, 16384,
    ];

    /// The smallest block size variable blocking starts doubling from.
    pub const VARIABLE_BLOCK_BASE: usize = 1024;

    /// Blocks shorter than this are not split further by variable blocking.
    pub const MIN_VARIABLE_SPLIT: usize = 1024;

    /// Blocks shorter than this never use stereo decorrelation.
    pub const MIN_STEREO_BLOCK_SIZE: usize = 33;

    /// Blocks shorter than this are never predicted.
    pub const MIN_PREDICTED_BLOCK_SIZE: usize = 5;
}

/// Constants related to fixed-parameter LPC encoding.
pub mod fixed {
    /// Maximum order of fixed LPC supported.
    pub const MAX_LPC_ORDER: usize = 4;

    /// Coefficients of fixed predictors, indexed by order.
    pub const COEFFICIENTS: [[i32; MAX_LPC_ORDER]; MAX_LPC_ORDER + 1] = [
        [0, 0, 0, 0],
        [1, 0, 0, 0],
        [2, -1, 0, 0],
        [3, -3, 1, 0],
        [4, -6, 4, -1],
    ];
}

/// Constants related to quantized linear predictive coding (QLPC).
pub mod qlpc {
    /// The number of bits used for encoding shift bits of QLPC.
    pub const SHIFT_BITS: usize = 5;

    /// The number of bits used for encoding `precision - 1`.
    pub const PRECISION_BITS: usize = 4;

    /// Maximum order of LPC supported.
    pub const MAX_ORDER: usize = 32;

    /// Max number of bits (precision) for storing QLPC coefficients.
    pub const MAX_PRECISION: usize = 15;

    /// Maximum shift parameter of QLPC.
    pub const MAX_SHIFT: i8 = 15;

    /// Minimum shift parameter of QLPC.
    ///
    /// The bitstream can carry negative shifts, but they are rejected here.
    pub const MIN_SHIFT: i8 = 0;

    /// Maximum number of analysis windows kept by an encoder.
    pub const MAX_WINDOWS: usize = 5;

    /// Penalty per order (in units of `ln(n)`) used in Akaike order ranking.
    pub const AKAIKE_ALPHA: f64 = 4.5;

    /// Penalty per squared order used in Akaike order ranking.
    pub const AKAIKE_BETA: f64 = 0.0;

    /// Per-order bit cost factor used when estimating a channel from its Akaike score.
    pub const ESTIMATE_ORDER_FACTOR: f64 = 7.1;

    /// Order of the reflection analysis used by the cheap stereo estimate.
    pub const ESTIMATE_ORDER: usize = 4;

    /// Base coefficient precisions indexed by block-size thresholds.
    pub const PRECISION_TABLE: [(usize, usize); 8] = [
        (192, 7),
        (384, 8),
        (576, 9),
        (1152, 10),
        (2304, 11),
        (4608, 12),
        (8192, 13),
        (16384, 14),
    ];

    /// Base precision for blocks longer than the last threshold.
    pub const DEFAULT_PRECISION: usize = 15;

    /// Smallest window length kept in a window cache.
    pub const MIN_WINDOW_SIZE: usize = 32;
}

/// Constants related to partitioned rice coding (PRC).
pub mod rice {
    /// Maximum rice parameter for 4-bit parameter coding.
    pub const MAX_RICE_PARAMETER: usize = 14;

    /// Maximum rice parameter for 5-bit parameter coding.
    pub const MAX_RICE_PARAMETER_EXTENDED: usize = 30;

    /// Escape code for 4-bit parameter coding.
    pub const ESCAPE_PARAMETER: usize = 15;

    /// Escape code for 5-bit parameter coding.
    pub const ESCAPE_PARAMETER_EXTENDED: usize = 31;

    /// Number of bits for storing the raw width of an escaped partition.
    pub const ESCAPE_WIDTH_BITS: usize = 5;

    /// Maximum order of Rice parameter partitioning.
    pub const MAX_PARTITION_ORDER: usize = 8;

    /// Maximum number of Rice partitions.
    pub const MAX_PARTITIONS: usize = 1usize << MAX_PARTITION_ORDER;

    /// Bits for the coding method and the partition order fields.
    pub const HEADER_BITS: usize = 6;
}

/// Module for internal error messages.
///
/// Use `panic!` and those messages only for unrecoverable errors.
/// It's okay to use them in tests, but it's not okay to add another variable
/// only for test functions.
pub(crate) mod panic_msg {
    pub const DATA_INCONSISTENT: &str = "INTERNAL ERROR: Internal variable inconsistency detected.";
    pub const NO_ERROR_EXPECTED: &str =
        "INTERNAL ERROR: Error emitted from the function designed not to return err.";
    pub const PARTITION_OVERFLOW: &str =
        "INTERNAL ERROR: Number of rice partitions exceeded the capacity.";
    pub const WINDOW_OVERFLOW: &str =
        "INTERNAL ERROR: Number of analysis windows exceeded the capacity.";
}
