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

//! Error and verification traits

use std::convert::Infallible;
use std::error::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::bitsink::BitSink;

/// Enum of errors that can be returned while making an output bitstream.
#[derive(Clone, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
#[non_exhaustive]
pub enum OutputError<S>
where
    S: BitSink,
    S::Error: std::error::Error,
{
    /// A parameter in a component doesn't fit in a format.
    Range(RangeError),
    /// I/O error propagated from [`BitSink`].
    Sink(S::Error),
}

impl<S> OutputError<S>
where
    S: BitSink,
    S::Error: std::error::Error,
{
    #[inline]
    pub(crate) const fn from_sink(e: S::Error) -> Self {
        Self::Sink(e)
    }

    /// Drops the sink-error part of an `OutputError` from an infallible sink.
    pub(crate) fn ignore_sink_error<U>(err: OutputError<U>) -> Self
    where
        U: BitSink<Error = Infallible>,
    {
        match err {
            OutputError::Range(e) => Self::Range(e),
            #[allow(unreachable_patterns)]
            OutputError::Sink(_) => unreachable!(),
        }
    }
}

impl<S> Error for OutputError<S>
where
    S: BitSink,
    S::Error: Error,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl<S> fmt::Display for OutputError<S>
where
    S: BitSink,
    S::Error: std::error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(err) => err.fmt(f),
            Self::Sink(err) => err.fmt(f),
        }
    }
}

impl<S> fmt::Debug for OutputError<S>
where
    S: BitSink,
    S::Error: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(err) => f
                .debug_tuple("OutputError::InvalidRange")
                .field(&err)
                .finish(),
            Self::Sink(err) => f.debug_tuple("OutputError::Sink").field(&err).finish(),
        }
    }
}

impl<S> From<RangeError> for OutputError<S>
where
    S: BitSink,
    S::Error: fmt::Debug,
{
    fn from(e: RangeError) -> Self {
        Self::Range(e)
    }
}

/// Error emitted when a parameter is out of the expected range.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct RangeError {
    var: String,
    reason: String,
    actual: String,
}

impl RangeError {
    /// Makes range error from `actual: impl Display` that is out of range.
    pub(crate) fn from_display<T>(var: &str, reason: &str, actual: &T) -> Self
    where
        T: fmt::Display,
    {
        Self {
            var: var.to_owned(),
            reason: reason.to_owned(),
            actual: format!("{actual}"),
        }
    }
}

impl Error for RangeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` is out of range: {} (actual={})",
            self.var, self.reason, self.actual
        )
    }
}

/// Error object returned when config or component verification failed.
///
/// This error maintains a path to the component that is actually erroneous
/// in the nested components.
///
/// # Design Notes
///
/// Parameter verification happens on the public API boundary. Arguments that
/// implement `Verify` and are given to the public API are assumed to be
/// verified, and the called function verifies the remaining parameters and
/// the interaction between the provided parameters.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct VerifyError {
    components: Vec<String>,
    reason: String,
}

impl VerifyError {
    /// Makes verification error for an invalid variable `component`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `order` is not valid. reason: must be non-negative"
    /// );
    /// ```
    pub fn new(component: &str, reason: &str) -> Self {
        Self {
            components: vec![component.to_owned()],
            reason: reason.to_owned(),
        }
    }

    /// Prepends the name of an enclosing component to the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// let err = err.within("encoder");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `encoder.order` is not valid. reason: must be non-negative"
    /// );
    /// ```
    #[must_use]
    pub fn within(self, component: &str) -> Self {
        let mut components = self.components;
        let reason = self.reason;
        components.push(component.to_owned());
        Self { components, reason }
    }

    /// Gets dot-separated path string for the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// let err = err.within("encoder");
    /// assert_eq!(err.path(), "encoder.order");
    /// ```
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (i, name) in self.components.iter().rev().enumerate() {
            if i != 0 {
                path.push('.');
            }
            path.push_str(name);
        }
        path
    }
}

impl Error for VerifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verification error: `{}` is not valid. reason: {}",
            self.path(),
            self.reason
        )
    }
}

/// A wrapper that ensures that the inner `T` is verified and unchanged.
///
/// `Verified<T>` can be obtained via [`Verify::into_verified`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Verified<T>(T);

impl<T> std::ops::Deref for Verified<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Verified<T> {
    /// Unwraps the verified value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Trait for verifiable structs.
pub trait Verify: Sized + seal_verify::Sealed {
    /// Verifies there's no internal data inconsistency.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if there's an invalid variable.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// # use flakecodec::config;
    /// let mut config = config::Encoder::default();
    /// config.max_partition_order = 9; // invalid setting
    /// assert!(config.verify().is_err());
    ///
    /// config.max_partition_order = 6; // valid setting
    /// assert!(config.verify().is_ok());
    /// ```
    fn verify(&self) -> Result<(), VerifyError>;

    /// Wraps into `Verified` to indicate that the data is already verified.
    ///
    /// # Errors
    ///
    /// Returns the original input and `VerifyError` if `verify` failed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// # use flakecodec::config;
    /// let mut config = config::Encoder::default();
    /// config.estimation_depth = 0;
    /// assert!(config.clone().into_verified().is_err());
    ///
    /// config.estimation_depth = 2;
    /// let verified = config.into_verified().map_err(|(_, e)| e)?;
    /// assert_eq!(verified.estimation_depth, 2);
    /// # Ok::<(), VerifyError>(())
    /// ```
    fn into_verified(self) -> Result<Verified<Self>, (Self, VerifyError)> {
        let result = self.verify();
        if let Err(e) = result {
            Err((self, e))
        } else {
            Ok(Verified(self))
        }
    }
}

/// A wrapping function to make it compatible with "?" operator.
pub(crate) fn verify_macro_impl(cond: bool, varname: &str, msg: &str) -> Result<(), VerifyError> {
    if !cond {
        return Err(VerifyError::new(varname, msg));
    }
    Ok(())
}

/// Checks if `$cond` is true and do `return Err(...)` if so.
///
/// An error object `VerifyErr` is constructed using `$varname` and
/// `$msg` that are formatted using the extra args (`$args`).
macro_rules! verify_true {
    ($varname:literal, $cond:expr, $msg:literal, $($args: expr),*) => {
        crate::error::verify_macro_impl(
            $cond,
            &format!($varname, $($args),*),
            &format!($msg, $($args),*),
        )
    };
    ($varname:literal, $cond:expr, $msg:literal) => {
        verify_true!($varname, $cond, $msg,)
    }
}
pub(crate) use verify_true;

/// Checks if `$actual` is in the range, and emits err with default msgs if not.
///
/// An error is constructed using the same way as [`verify_true`].
macro_rules! verify_range {
    ($varname: literal, $actual:expr, $lowlimit:tt .. $highlimit:tt) => {
        verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| verify_range!($varname, $actual, ..($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..= $highlimit:tt) => {
        verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| verify_range!($varname, $actual, ..=($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..) => {{
        #[allow(unused_parens)]
        let limit = $lowlimit;
        verify_true!(
            $varname,
            $actual >= limit,
            "must be greater than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, ..= $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        verify_true!(
            $varname,
            $actual <= limit,
            "must be less than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, .. $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        verify_true!($varname, $actual < limit, "must be less than {limit}")
    }};
}
pub(crate) use verify_range;

/// Kinds of malformed bitstream fields detected while parsing a frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum StructuralErrorKind {
    /// The frame doesn't start with the sync code.
    SyncCode,
    /// A reserved bit in the frame header or the subframe header is set.
    ReservedBit,
    /// The block-size code is reserved.
    BlockSizeCode,
    /// The sample-rate code is invalid.
    SampleRateCode,
    /// The channel-assignment code is reserved.
    ChannelCode,
    /// The bit-depth code is reserved.
    BitDepthCode,
    /// The bit depth in the header differs from the PCM format.
    BitDepthMismatch,
    /// The channel count in the header differs from the PCM format.
    ChannelMismatch,
    /// The frame/sample counter is not a valid UTF-8-like sequence.
    Counter,
    /// The subframe type code is reserved.
    SubFrameType,
    /// The wasted-bits count leaves no bit for samples.
    WastedBits,
    /// The LPC precision code is reserved.
    LpcPrecision,
    /// The LPC shift is negative.
    LpcShift,
    /// The predictor order exceeds the block size.
    PredictorOrder,
    /// The residual coding method is reserved.
    ResidualMethod,
    /// The partition order is out of range or inconsistent with the block size.
    PartitionOrder,
    /// The input ended in the middle of the frame.
    Truncated,
}

impl fmt::Display for StructuralErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SyncCode => "sync code not found",
            Self::ReservedBit => "reserved bit is set",
            Self::BlockSizeCode => "reserved block-size code",
            Self::SampleRateCode => "invalid sample-rate code",
            Self::ChannelCode => "reserved channel-assignment code",
            Self::BitDepthCode => "reserved bit-depth code",
            Self::BitDepthMismatch => "bit depth does not match the PCM format",
            Self::ChannelMismatch => "channel count does not match the PCM format",
            Self::Counter => "malformed frame counter",
            Self::SubFrameType => "reserved subframe type",
            Self::WastedBits => "too many wasted bits",
            Self::LpcPrecision => "invalid LPC precision",
            Self::LpcShift => "negative LPC shift",
            Self::PredictorOrder => "predictor order exceeds block size",
            Self::ResidualMethod => "reserved residual coding method",
            Self::PartitionOrder => "invalid partition order",
            Self::Truncated => "truncated frame",
        };
        f.write_str(s)
    }
}

/// Error emitted when a bitstream field is malformed.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct StructuralError {
    kind: StructuralErrorKind,
    bit_position: usize,
}

impl StructuralError {
    /// Makes a structural error found at `bit_position` in the frame.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// let err = StructuralError::new(StructuralErrorKind::SyncCode, 0);
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "structural error: sync code not found (at bit 0)"
    /// );
    /// ```
    pub const fn new(kind: StructuralErrorKind, bit_position: usize) -> Self {
        Self { kind, bit_position }
    }

    /// Returns the kind of the violation.
    pub const fn kind(&self) -> StructuralErrorKind {
        self.kind
    }

    /// Returns the bit offset in the frame where the violation was detected.
    pub const fn bit_position(&self) -> usize {
        self.bit_position
    }
}

impl Error for StructuralError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "structural error: {} (at bit {})",
            self.kind, self.bit_position
        )
    }
}

/// Checksums carried in a frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChecksumKind {
    /// CRC-8 over the frame header.
    HeaderCrc8,
    /// CRC-16 over the whole frame.
    FrameCrc16,
}

/// Error emitted when a checksum does not match.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct IntegrityError {
    kind: ChecksumKind,
    expected: u16,
    actual: u16,
}

impl IntegrityError {
    /// Makes an integrity error from the stored (`expected`) and the computed
    /// (`actual`) checksum.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::error::*;
    /// let err = IntegrityError::new(ChecksumKind::HeaderCrc8, 0x69, 0x7F);
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "integrity error: HeaderCrc8 mismatch (stored=0x0069, computed=0x007f)"
    /// );
    /// ```
    pub const fn new(kind: ChecksumKind, expected: u16, actual: u16) -> Self {
        Self {
            kind,
            expected,
            actual,
        }
    }

    /// Returns which checksum failed.
    pub const fn kind(&self) -> ChecksumKind {
        self.kind
    }
}

impl Error for IntegrityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "integrity error: {:?} mismatch (stored={:#06x}, computed={:#06x})",
            self.kind, self.expected, self.actual
        )
    }
}

/// Enum for possible decoder errors.
#[non_exhaustive]
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// Malformed bitstream.
    Structural(StructuralError),
    /// Checksum mismatch.
    Integrity(IntegrityError),
    /// Invalid decoder configuration or PCM format.
    Config(VerifyError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural(e) => e.fmt(f),
            Self::Integrity(e) => e.fmt(f),
            Self::Config(e) => e.fmt(f),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Structural(e) => Some(e),
            Self::Integrity(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<StructuralError> for DecodeError {
    fn from(e: StructuralError) -> Self {
        Self::Structural(e)
    }
}

impl From<IntegrityError> for DecodeError {
    fn from(e: IntegrityError) -> Self {
        Self::Integrity(e)
    }
}

impl From<VerifyError> for DecodeError {
    fn from(e: VerifyError) -> Self {
        Self::Config(e)
    }
}

/// Error emitted when an encoded frame doesn't decode to its input.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum VerificationError {
    /// The encoded frame could not be decoded.
    Decode(DecodeError),
    /// A decoded sample differs from the input.
    Mismatch {
        /// Index of the first differing sample in the interleaved frame.
        position: usize,
        /// Input sample.
        expected: i32,
        /// Decoded sample.
        actual: i32,
    },
}

impl Error for VerificationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Mismatch { .. } => None,
        }
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "encoded frame is not decodable: {e}"),
            Self::Mismatch {
                position,
                expected,
                actual,
            } => write!(
                f,
                "decoded sample differs at {position} (input={expected}, decoded={actual})"
            ),
        }
    }
}

/// Enum for possible encoder errors.
#[non_exhaustive]
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug)]
pub enum EncodeError {
    /// Encoder errors due to invalid configuration or PCM format.
    Config(VerifyError),
    /// Input samples are not valid for the PCM format.
    Input(VerifyError),
    /// A frame component couldn't be serialized.
    Output(RangeError),
    /// Self-verification of an encoded frame failed.
    Verification(VerificationError),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) | Self::Input(e) => e.fmt(f),
            Self::Output(e) => e.fmt(f),
            Self::Verification(e) => e.fmt(f),
        }
    }
}

impl Error for EncodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) | Self::Input(e) => Some(e),
            Self::Output(e) => Some(e),
            Self::Verification(e) => Some(e),
        }
    }
}

impl From<VerifyError> for EncodeError {
    fn from(e: VerifyError) -> Self {
        Self::Config(e)
    }
}

impl From<RangeError> for EncodeError {
    fn from(e: RangeError) -> Self {
        Self::Output(e)
    }
}

impl From<VerificationError> for EncodeError {
    fn from(e: VerificationError) -> Self {
        Self::Verification(e)
    }
}

mod seal_verify {
    pub trait Sealed {}

    impl Sealed for crate::component::ChannelAssignment {}
    impl Sealed for crate::component::SubFrame {}
    impl Sealed for crate::component::Constant {}
    impl Sealed for crate::component::FixedLpc {}
    impl Sealed for crate::component::Frame {}
    impl Sealed for crate::component::FrameHeader {}
    impl Sealed for crate::component::Lpc {}
    impl Sealed for crate::component::QuantizedParameters {}
    impl Sealed for crate::component::Residual {}
    impl Sealed for crate::component::Verbatim {}
    impl Sealed for crate::config::Decoder {}
    impl Sealed for crate::config::Encoder {}
    impl Sealed for crate::source::PcmFormat {}
}
