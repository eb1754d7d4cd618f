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

//! Encoder and decoder configuration structs.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::block::DEFAULT_BLOCK_TIME_MS;
use super::constant::block::FALLBACK_BLOCK_SIZE;
use super::constant::block::TABULATED_BLOCK_SIZES;
use super::constant::block::VARIABLE_BLOCK_BASE;
use super::constant::fixed::MAX_LPC_ORDER as MAX_FIXED_LPC_ORDER;
use super::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use super::constant::qlpc::MAX_WINDOWS;
use super::constant::rice::MAX_PARTITION_ORDER;
use super::constant::MAX_BLOCK_SIZE;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;
use super::lpc::WindowFunction;

/// Highest compression level accepted by [`Encoder::with_level`].
pub const MAX_LEVEL: usize = 11;

/// Kind of predictors searched for each channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum PredictionType {
    /// Only constant and verbatim subframes.
    None,
    /// Fixed polynomial predictors.
    Fixed,
    /// LPC via Levinson-Durbin, with fixed predictors for short blocks.
    Levinson,
    /// LPC and fixed predictors.
    Search,
}

/// How the stereo decorrelation mode is decided.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum StereoMethod {
    /// Channels are always coded independently.
    Independent,
    /// Compares cheap order-4 estimates of the four candidate channels.
    Estimate,
    /// Compares the results of a narrowed first search pass.
    Evaluate,
    /// Fully searches all the four candidate channels.
    Search,
}

/// How the analysis window is chosen for the full search pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum WindowMethod {
    /// The window with the smallest order-2 prediction error.
    Estimate,
    /// The window that won a narrowed first search pass.
    Evaluate,
    /// All the windows.
    Search,
}

/// Configuration for encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Encoder {
    /// If specified, the encoder uses this block size instead of deriving it
    /// from `block_time_ms`.
    pub block_size: Option<usize>,
    /// Target duration of a frame in milliseconds.
    pub block_time_ms: usize,
    /// Kind of predictors to search.
    pub prediction: PredictionType,
    /// Method for choosing the stereo decorrelation.
    pub stereo_method: StereoMethod,
    /// Method for choosing the analysis window.
    pub window_method: WindowMethod,
    /// Analysis windows used for LPC.
    pub window_functions: Vec<WindowFunction>,
    /// Minimum LPC order.
    pub min_prediction_order: usize,
    /// Maximum LPC order.
    pub max_prediction_order: usize,
    /// Minimum fixed predictor order.
    pub min_fixed_order: usize,
    /// Maximum fixed predictor order.
    pub max_fixed_order: usize,
    /// Minimum partition order of the residual coding.
    pub min_partition_order: usize,
    /// Maximum partition order of the residual coding.
    pub max_partition_order: usize,
    /// Number of the best-ranked LPC orders evaluated.
    pub estimation_depth: usize,
    /// Lowest offset added to the base coefficient precision.
    pub lpc_min_precision_search: usize,
    /// Highest offset added to the base coefficient precision.
    pub lpc_max_precision_search: usize,
    /// Variable block size mode. `0` disables variable blocking, `1` and `2`
    /// halve a block at most once, `3` and `4` repeat halving. Even modes
    /// also estimate the second half.
    pub variable_block_size: usize,
    /// If set, every encoded frame is decoded and compared with the input.
    pub verify: bool,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            block_size: None,
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            prediction: PredictionType::Search,
            stereo_method: StereoMethod::Evaluate,
            window_method: WindowMethod::Evaluate,
            window_functions: vec![WindowFunction::Tukey, WindowFunction::Flattop],
            min_prediction_order: 1,
            max_prediction_order: 12,
            min_fixed_order: 2,
            max_fixed_order: 2,
            min_partition_order: 0,
            max_partition_order: 8,
            estimation_depth: 1,
            lpc_min_precision_search: 1,
            lpc_max_precision_search: 1,
            variable_block_size: 0,
            verify: false,
        }
    }
}

impl Encoder {
    /// Constructs the preset configuration of a compression level.
    ///
    /// Level 7 is the default. Higher levels search more exhaustively.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if `level` is larger than 11.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::config::*;
    /// let config = Encoder::with_level(0).unwrap();
    /// assert_eq!(config.prediction, PredictionType::Fixed);
    /// assert_eq!(Encoder::with_level(7).unwrap(), Encoder::default());
    /// assert!(Encoder::with_level(12).is_err());
    /// ```
    pub fn with_level(level: usize) -> Result<Self, VerifyError> {
        verify_range!("level", level, ..=MAX_LEVEL)?;
        let mut ret = Self::default();
        match level {
            0 => {
                ret.block_time_ms = 53;
                ret.prediction = PredictionType::Fixed;
                ret.stereo_method = StereoMethod::Independent;
                ret.max_partition_order = 6;
            }
            1 => {
                ret.prediction = PredictionType::Levinson;
                ret.stereo_method = StereoMethod::Independent;
                ret.window_functions = vec![WindowFunction::Bartlett];
                ret.max_prediction_order = 8;
                ret.max_partition_order = 6;
            }
            2 => {
                ret.stereo_method = StereoMethod::Independent;
                ret.window_functions = vec![WindowFunction::Bartlett];
                ret.max_partition_order = 6;
            }
            3 => {
                ret.stereo_method = StereoMethod::Estimate;
                ret.window_functions = vec![WindowFunction::Bartlett];
                ret.max_prediction_order = 8;
            }
            4 => {
                ret.stereo_method = StereoMethod::Estimate;
                ret.window_functions = vec![WindowFunction::Bartlett];
            }
            5 => {
                ret.stereo_method = StereoMethod::Estimate;
                ret.window_method = WindowMethod::Estimate;
            }
            6 => {
                ret.stereo_method = StereoMethod::Estimate;
            }
            8 => {
                ret.estimation_depth = 2;
                ret.min_fixed_order = 0;
                ret.lpc_min_precision_search = 0;
            }
            9 => {
                ret.window_functions = vec![WindowFunction::Bartlett];
                ret.max_prediction_order = 32;
            }
            10 => {
                ret.min_fixed_order = 0;
                ret.max_fixed_order = 4;
                ret.max_prediction_order = 32;
            }
            11 => {
                ret.min_fixed_order = 0;
                ret.max_fixed_order = 4;
                ret.max_prediction_order = 32;
                ret.estimation_depth = 5;
                ret.variable_block_size = 4;
            }
            _ => {}
        }
        Ok(ret)
    }

    /// Returns the block size used for a stream of `sample_rate`.
    ///
    /// When `block_size` is not given, fixed blocking picks the largest
    /// tabulated size that fits in `block_time_ms`, and variable blocking
    /// picks the largest power of two not above the target (at least 512).
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::config::*;
    /// let mut config = Encoder::default();
    /// assert_eq!(config.block_size_for(44100), 4608);
    /// config.variable_block_size = 4;
    /// assert_eq!(config.block_size_for(44100), 4096);
    /// config.block_size = Some(1000);
    /// assert_eq!(config.block_size_for(44100), 1000);
    /// ```
    pub fn block_size_for(&self, sample_rate: usize) -> usize {
        if let Some(size) = self.block_size {
            return size;
        }
        let target = sample_rate * self.block_time_ms / 1000;
        if self.variable_block_size > 0 {
            let mut size = VARIABLE_BLOCK_BASE;
            while target >= size && size < MAX_BLOCK_SIZE {
                size <<= 1;
            }
            return size >> 1;
        }
        TABULATED_BLOCK_SIZES
            .iter()
            .copied()
            .filter(|size| *size <= target)
            .max()
            .unwrap_or(FALLBACK_BLOCK_SIZE)
    }
}

impl Verify for Encoder {
    fn verify(&self) -> Result<(), VerifyError> {
        if let Some(size) = self.block_size {
            verify_range!("block_size", size, 16..=MAX_BLOCK_SIZE)?;
        }
        verify_range!("block_time_ms", self.block_time_ms, 1..=10_000usize)?;
        verify_range!(
            "min_prediction_order",
            self.min_prediction_order,
            1..=MAX_LPC_ORDER
        )?;
        verify_range!(
            "max_prediction_order",
            self.max_prediction_order,
            (self.min_prediction_order)..=MAX_LPC_ORDER
        )?;
        verify_range!(
            "max_fixed_order",
            self.max_fixed_order,
            ..=MAX_FIXED_LPC_ORDER
        )?;
        verify_range!(
            "min_fixed_order",
            self.min_fixed_order,
            ..=(self.max_fixed_order)
        )?;
        verify_range!(
            "max_partition_order",
            self.max_partition_order,
            ..=MAX_PARTITION_ORDER
        )?;
        verify_range!(
            "min_partition_order",
            self.min_partition_order,
            ..=(self.max_partition_order)
        )?;
        verify_range!("estimation_depth", self.estimation_depth, 1..=MAX_LPC_ORDER)?;
        verify_range!(
            "lpc_max_precision_search",
            self.lpc_max_precision_search,
            ..=1usize
        )?;
        verify_range!(
            "lpc_min_precision_search",
            self.lpc_min_precision_search,
            ..=(self.lpc_max_precision_search)
        )?;
        verify_range!(
            "variable_block_size",
            self.variable_block_size,
            ..=4usize
        )?;
        verify_true!(
            "window_functions",
            !self.window_functions.is_empty(),
            "must not be empty"
        )?;
        verify_range!(
            "window_functions.len",
            self.window_functions.len(),
            ..=MAX_WINDOWS
        )
    }
}

/// Configuration for decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Decoder {
    /// If set, CRC-8 and CRC-16 mismatches are reported as errors.
    pub verify_checksums: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}

impl Verify for Decoder {
    fn verify(&self) -> Result<(), VerifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn every_level_is_valid() {
        for level in 0..=MAX_LEVEL {
            let config = Encoder::with_level(level).unwrap();
            assert!(config.verify().is_ok(), "level {level} is invalid");
        }
        let err = Encoder::with_level(12).expect_err("level 12 doesn't exist");
        assert_eq!(err.path(), "level");
    }

    #[rstest]
    #[case(0, 44100, 2304)]
    #[case(7, 44100, 4608)]
    #[case(7, 8000, 576)]
    #[case(7, 1000, 192)]
    #[case(11, 44100, 4096)]
    #[case(11, 8000, 512)]
    #[case(11, 1_048_575, 32768)]
    fn block_size_selection(
        #[case] level: usize,
        #[case] sample_rate: usize,
        #[case] expected: usize,
    ) {
        let config = Encoder::with_level(level).unwrap();
        assert_eq!(config.block_size_for(sample_rate), expected);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = Encoder::default();
        config.min_prediction_order = 13;
        assert_eq!(
            config.verify().expect_err("min > max").path(),
            "max_prediction_order"
        );

        let mut config = Encoder::default();
        config.window_functions.clear();
        assert_eq!(
            config.verify().expect_err("no window").path(),
            "window_functions"
        );

        let mut config = Encoder::default();
        config.lpc_max_precision_search = 2;
        assert!(config.verify().is_err());

        let mut config = Encoder::default();
        config.block_size = Some(8);
        assert!(config.verify().is_err());

        let mut config = Encoder::default();
        config.variable_block_size = 5;
        assert!(config.verify().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialization() {
        let config = Encoder::default();
        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("window_method = \"Evaluate\""));
        assert!(!serialized.contains("order_method"));
        assert!(toml::to_string(&Decoder::default()).is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialization() {
        let src = "
max_prediction_order = 32
stereo_method = \"Search\"
window_functions = [\"Welch\", \"Hann\"]
";
        let config: Encoder = toml::from_str(src).expect("Parse error.");
        assert_eq!(config.max_prediction_order, 32);
        assert_eq!(config.stereo_method, StereoMethod::Search);
        assert_eq!(
            config.window_functions,
            vec![WindowFunction::Welch, WindowFunction::Hann]
        );

        // Check the rest is default.
        assert_eq!(config.min_prediction_order, 1);
        assert_eq!(config.block_size, None);
        assert_eq!(config.window_method, WindowMethod::Evaluate);
        assert!(!config.verify);

        let decoder: Decoder = toml::from_str("verify_checksums = false").expect("Parse error.");
        assert!(!decoder.verify_checksums);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn if_empty_source_yields_default_config() {
        let empty_src = "";
        let config: Encoder = toml::from_str(empty_src).expect("Parse error.");
        let default_config: Encoder = Encoder::default();
        eprintln!(
            "## Current default config\n\n{}",
            toml::to_string(&config).unwrap()
        );
        assert_eq!(config, default_config);

        let decoder: Decoder = toml::from_str(empty_src).expect("Parse error.");
        assert!(decoder.verify_checksums);
    }
}
