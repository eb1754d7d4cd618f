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

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::super::bitsink::BitSink;
use super::super::constant::fixed::MAX_LPC_ORDER as MAX_FIXED_LPC_ORDER;
use super::super::constant::panic_msg;
use super::super::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use super::super::constant::rice::ESCAPE_WIDTH_BITS;
use super::super::constant::rice::HEADER_BITS as RICE_HEADER_BITS;
use super::super::constant::rice::MAX_PARTITIONS;
use super::super::constant::MAX_BLOCK_SIZE;
use super::super::error::verify_range;
use super::super::error::verify_true;
use super::super::error::Verify;
use super::super::error::VerifyError;
use super::super::rice::encode_signbit;
use super::super::rice::PartitionCode;
use super::super::rice::RiceMethod;

/// [`FRAME`](https://xiph.org/flac/format.html#frame) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    header: FrameHeader,
    subframes: Vec<SubFrame>,
}

impl Frame {
    /// Constructs `Frame` from a header and per-channel subframes.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if the number of subframes doesn't match the
    /// channel assignment, or a subframe has a different block size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let header = FrameHeader::new(
    ///     4, ChannelAssignment::Independent(2), 16, 44100, FrameOffset::Frame(0)
    /// ).unwrap();
    /// let sf0: SubFrame = Constant::new(4, 10, 16).unwrap().into();
    /// let sf1: SubFrame = Verbatim::new(&[1, 2, 3, 4], 16).unwrap().into();
    /// let frame = Frame::new(header.clone(), [sf0.clone(), sf1]).unwrap();
    /// assert_eq!(frame.subframe_count(), 2);
    ///
    /// assert!(Frame::new(header, [sf0]).is_err());
    /// ```
    pub fn new<I>(header: FrameHeader, subframes: I) -> Result<Self, VerifyError>
    where
        I: IntoIterator<Item = SubFrame>,
    {
        let ret = Self::from_parts(header, subframes.into_iter().collect());
        verify_true!(
            "subframes.len",
            ret.subframes.len() == ret.header.channel_assignment().channels(),
            "must match the number of channels in the header"
        )?;
        for (ch, sf) in ret.subframes.iter().enumerate() {
            verify_true!(
                "subframes[{ch}].block_size",
                sf.block_size() == ret.header.block_size(),
                "must match the block size in the header"
            )?;
        }
        Ok(ret)
    }

    /// Constructs `Frame` from parts without verification.
    #[inline]
    pub(crate) fn from_parts(header: FrameHeader, subframes: Vec<SubFrame>) -> Self {
        Self { header, subframes }
    }

    /// Deconstructs the frame into its header and subframes.
    #[inline]
    pub fn into_parts(self) -> (FrameHeader, Vec<SubFrame>) {
        (self.header, self.subframes)
    }

    /// Returns [`FrameHeader`] of this frame.
    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Returns [`SubFrame`] for the channel `ch`.
    #[inline]
    pub fn subframe(&self, ch: usize) -> Option<&SubFrame> {
        self.subframes.get(ch)
    }

    /// Returns the number of subframes (channels).
    #[inline]
    pub fn subframe_count(&self) -> usize {
        self.subframes.len()
    }

    /// Returns a slice of all subframes.
    #[inline]
    pub fn subframes(&self) -> &[SubFrame] {
        &self.subframes
    }

    /// Returns the block size (the number of samples per channel).
    #[inline]
    pub fn block_size(&self) -> usize {
        self.header.block_size()
    }
}

/// Enum for channel assignment in `FRAME_HEADER`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "data"))]
pub enum ChannelAssignment {
    /// Indicates that the frame contains multiple channels independently.
    ///
    /// The `u8` field indicates the number of channels. This is the only
    /// option if the number of channels is not two.
    Independent(u8),
    /// Indicates that the frame contains left and side channels.
    LeftSide,
    /// Indicates that the frame contains right and side channels.
    RightSide,
    /// Indicates that the frame contains mid and side channels.
    MidSide,
}

impl ChannelAssignment {
    /// Constructs `ChannelAssignment` from the tag.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// assert_eq!(
    ///     ChannelAssignment::from_tag(5),
    ///     Some(ChannelAssignment::Independent(6)),
    /// );
    /// assert_eq!(
    ///     ChannelAssignment::from_tag(10),
    ///     Some(ChannelAssignment::MidSide),
    /// );
    /// assert_eq!(ChannelAssignment::from_tag(11), None);
    /// ```
    #[inline]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        if tag < 8 {
            Some(Self::Independent(tag + 1))
        } else if tag == 8 {
            Some(Self::LeftSide)
        } else if tag == 9 {
            Some(Self::RightSide)
        } else if tag == 10 {
            Some(Self::MidSide)
        } else {
            None
        }
    }

    /// Returns the 4-bit tag used in the frame header.
    #[inline]
    pub const fn tag(&self) -> u8 {
        match *self {
            Self::Independent(n) => n - 1,
            Self::LeftSide => 8,
            Self::RightSide => 9,
            Self::MidSide => 10,
        }
    }

    /// Returns the number of extra bit required to store the channel samples.
    ///
    /// "Side" signal (as used in mid-side coding) requires an extra bit for
    /// storing large values such as `i32::MAX - i32::MIN`. This function maps
    /// `ChannelAssignment` and channel id `ch` to the number of extra bits
    /// required (0 or 1).
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let rs = ChannelAssignment::RightSide;
    /// // Ride-side coding stores the side signal in channel-0.
    /// assert_eq!(rs.bits_per_sample_offset(0), 1);
    /// assert_eq!(rs.bits_per_sample_offset(1), 0);
    /// ```
    #[inline]
    pub const fn bits_per_sample_offset(&self, ch: usize) -> usize {
        #[allow(clippy::match_same_arms, clippy::bool_to_int_with_if)]
        match *self {
            Self::Independent(_) => 0,
            Self::LeftSide => {
                if ch == 1 {
                    1 // side
                } else {
                    0 // left
                }
            }
            Self::RightSide => {
                if ch == 0 {
                    1 // side
                } else {
                    0 // right
                }
            }
            Self::MidSide => {
                if ch == 1 {
                    1 // side
                } else {
                    0 // mid
                }
            }
        }
    }

    /// Picks the pair of channels stored for this assignment from the four
    /// stereo candidates (left, right, mid, side).
    #[inline]
    pub(crate) fn select_channels<T>(&self, l: T, r: T, m: T, s: T) -> (T, T) {
        match *self {
            Self::Independent(_) => (l, r),
            Self::LeftSide => (l, s),
            Self::RightSide => (s, r),
            Self::MidSide => (m, s),
        }
    }

    /// Returns the number of channels in a frame with this assignment.
    #[inline]
    pub const fn channels(&self) -> usize {
        if let Self::Independent(n) = *self {
            n as usize
        } else {
            2
        }
    }
}

/// Enum representing the location of frame either by a frame count or starting-sample number.
///
/// The use of `Self::Frame` implies fixed-blocking mode, and `Self::StartSample` implies variable
/// blocking mode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameOffset {
    /// Frame offset specifier based on the number of frames preceding.
    Frame(u32),
    /// Frame offset specifier based on the number of samples preceding.
    StartSample(u64),
}

impl FrameOffset {
    /// Returns the raw counter value written in the header.
    #[inline]
    pub const fn counter(self) -> u64 {
        match self {
            Self::Frame(n) => n as u64,
            Self::StartSample(n) => n,
        }
    }
}

/// Enum for block size specifier in [`FrameHeader`].
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum BlockSizeSpec {
    /// Special case when `size = 192`.
    S192,
    /// Size that can be represented as `size = 576 * 2^n` where `n` in `0..=3`.
    Pow2Mul576(u8),
    /// Size that is stored in a byte at the end of [`FrameHeader`].
    ExtraByte(u8),
    /// Size that is stored in two bytes at the end of [`FrameHeader`].
    ExtraTwoBytes(u16),
    /// Size that can be represented as `size = 256 * 2^n` where `n` in `0..=7`.
    Pow2Mul256(u8),
}

impl BlockSizeSpec {
    /// Constructs `BlockSizeSpec` from the block size.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// assert_eq!(BlockSizeSpec::from_size(4608), BlockSizeSpec::Pow2Mul576(3));
    /// assert_eq!(BlockSizeSpec::from_size(100), BlockSizeSpec::ExtraByte(99));
    /// assert_eq!(BlockSizeSpec::from_size(4000), BlockSizeSpec::ExtraTwoBytes(3999));
    /// ```
    #[inline]
    pub fn from_size(size: u16) -> Self {
        assert!(size > 0, "block size must be positive");
        match size {
            192 => Self::S192,
            576 | 1152 | 2304 | 4608 => Self::Pow2Mul576((size / 576).trailing_zeros() as u8),
            256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
                Self::Pow2Mul256((size / 256).trailing_zeros() as u8)
            }
            x if x <= 256 => Self::ExtraByte((x - 1) as u8),
            x => Self::ExtraTwoBytes(x - 1),
        }
    }

    /// Constructs `BlockSizeSpec` from the 4-bit tag and the extra field.
    ///
    /// `data` is only consulted for tags 6 and 7. Returns `None` for the
    /// reserved tag 0.
    #[inline]
    pub(crate) fn from_tag_and_data(tag: u8, data: Option<u16>) -> Option<Self> {
        match tag {
            1 => Some(Self::S192),
            2..=5 => Some(Self::Pow2Mul576(tag - 2)),
            6 => data.map(|v| Self::ExtraByte(v as u8)),
            7 => data.map(Self::ExtraTwoBytes),
            8..=15 => Some(Self::Pow2Mul256(tag - 8)),
            _ => None,
        }
    }

    /// Returns the number of extra bits required to store the specification.
    #[inline]
    pub(crate) const fn count_extra_bits(self) -> usize {
        match self {
            Self::ExtraByte(_) => 8,
            Self::ExtraTwoBytes(_) => 16,
            Self::S192 | Self::Pow2Mul576(_) | Self::Pow2Mul256(_) => 0,
        }
    }

    /// Returns the block size represented by `self`.
    #[inline]
    pub const fn block_size(self) -> usize {
        match self {
            Self::S192 => 192,
            Self::Pow2Mul576(x) => 576usize << x,
            Self::ExtraByte(x) => x as usize + 1,
            Self::ExtraTwoBytes(x) => x as usize + 1,
            Self::Pow2Mul256(x) => 256usize << x,
        }
    }

    /// Returns 4-bit indicator for the block-size specifier.
    #[inline]
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::S192 => 1,
            Self::Pow2Mul576(x) => 2 + x,
            Self::ExtraByte(_) => 6,
            Self::ExtraTwoBytes(_) => 7,
            Self::Pow2Mul256(x) => 8 + x,
        }
    }

    /// Writes extra data field to `dest`.
    #[inline]
    pub(crate) fn write_extra_bits<S: BitSink>(self, dest: &mut S) -> Result<(), S::Error> {
        match self {
            Self::ExtraByte(v) => dest.write_lsbs(v, 8),
            Self::ExtraTwoBytes(v) => dest.write_lsbs(v, 16),
            Self::S192 | Self::Pow2Mul576(_) | Self::Pow2Mul256(_) => Ok(()),
        }
    }
}

/// Enum for bit depths representable in a frame header.
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SampleSizeSpec {
    /// Instructs decoders to take the bit depth from the PCM format.
    Unspecified = 0,
    /// 8 bits-per-sample
    B8 = 1,
    /// 12 bits-per-sample
    B12 = 2,
    /// 16 bits-per-sample
    B16 = 4,
    /// 20 bits-per-sample
    B20 = 5,
    /// 24 bits-per-sample
    B24 = 6,
}

impl SampleSizeSpec {
    /// Constructs `SampleSizeSpec` from the tag (an integer in the bitstream).
    ///
    /// Tags 3 and 7 are reserved and give `None`.
    #[inline]
    pub const fn from_tag(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::B8),
            2 => Some(Self::B12),
            4 => Some(Self::B16),
            5 => Some(Self::B20),
            6 => Some(Self::B24),
            _ => None,
        }
    }

    /// Returns the tag (an integer in the bitstream) corresponding to `self`.
    #[inline]
    pub const fn into_tag(self) -> u8 {
        self as u8
    }

    /// Constructs `SampleSizeSpec` from the bits-per-sample value.
    #[inline]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(Self::B8),
            12 => Some(Self::B12),
            16 => Some(Self::B16),
            20 => Some(Self::B20),
            24 => Some(Self::B24),
            _ => None,
        }
    }

    /// Returns the bits-per-sample value corresponding to `self`.
    #[inline]
    pub const fn into_bits(self) -> Option<u8> {
        match self {
            Self::Unspecified => None,
            Self::B8 => Some(8),
            Self::B12 => Some(12),
            Self::B16 => Some(16),
            Self::B20 => Some(20),
            Self::B24 => Some(24),
        }
    }
}

/// Enum for sampling rates representable in a frame header.
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SampleRateSpec {
    /// Instructs decoders to take the sample rate from the PCM format.
    Unspecified,
    /// 88.2kHz.
    R88_2kHz,
    /// 176.4kHz.
    R176_4kHz,
    /// 192kHz.
    R192kHz,
    /// 8kHz.
    R8kHz,
    /// 16kHZ.
    R16kHz,
    /// 22.05kHz.
    R22_05kHz,
    /// 24kHz.
    R24kHz,
    /// 32kHz.
    R32kHz,
    /// 44.1kHz.
    R44_1kHz,
    /// 48kHz.
    R48kHz,
    /// 96kHz.
    R96kHz,
    /// An immediate value specifying kHz up to 255kHz.
    KHz(u8),
    /// An immediate value specifying Hz up to 65535Hz.
    Hz(u16),
    /// An immediate value specifying deca-Hz up to 655.35kHz.
    DaHz(u16),
}

impl SampleRateSpec {
    /// Constructs `SampleRateSpec` from frequency in Hz.
    ///
    /// This method returns None if the specified `freq` is not representable.
    /// When this function is called with a non-typical frequency, this
    /// function tries to use `KHz`, `DaHz`, and `Hz` in this order. This
    /// function never returns `Self::Unspecified`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// assert_eq!(SampleRateSpec::from_freq(44100), Some(SampleRateSpec::R44_1kHz));
    /// assert_eq!(SampleRateSpec::from_freq(11025), Some(SampleRateSpec::Hz(11025)));
    /// assert_eq!(SampleRateSpec::from_freq(64000), Some(SampleRateSpec::KHz(64)));
    /// assert_eq!(SampleRateSpec::from_freq(100_010), Some(SampleRateSpec::DaHz(10001)));
    /// assert_eq!(SampleRateSpec::from_freq(700_001), None);
    /// ```
    #[inline]
    pub fn from_freq(freq: u32) -> Option<Self> {
        match freq {
            88_200 => Some(Self::R88_2kHz),
            176_400 => Some(Self::R176_4kHz),
            192_000 => Some(Self::R192kHz),
            8_000 => Some(Self::R8kHz),
            16_000 => Some(Self::R16kHz),
            22_050 => Some(Self::R22_05kHz),
            24_000 => Some(Self::R24kHz),
            32_000 => Some(Self::R32kHz),
            44_100 => Some(Self::R44_1kHz),
            48_000 => Some(Self::R48kHz),
            96_000 => Some(Self::R96kHz),
            _ => None,
        }
        .or_else(|| {
            (0 == freq % 1000)
                .then(|| (freq / 1000).try_into().ok().map(Self::KHz))
                .flatten()
        })
        .or_else(|| {
            (0 == freq % 10)
                .then(|| (freq / 10).try_into().ok().map(Self::DaHz))
                .flatten()
        })
        .or_else(|| freq.try_into().ok().map(Self::Hz))
    }

    /// Constructs `SampleRateSpec` from the 4-bit tag and the extra field.
    ///
    /// Returns `None` for the invalid tag 15, or if the extra field is
    /// required but not given.
    #[inline]
    pub(crate) fn from_tag_and_data(tag: u8, value: Option<u16>) -> Option<Self> {
        Some(match tag {
            0b0000 => Self::Unspecified,
            0b0001 => Self::R88_2kHz,
            0b0010 => Self::R176_4kHz,
            0b0011 => Self::R192kHz,
            0b0100 => Self::R8kHz,
            0b0101 => Self::R16kHz,
            0b0110 => Self::R22_05kHz,
            0b0111 => Self::R24kHz,
            0b1000 => Self::R32kHz,
            0b1001 => Self::R44_1kHz,
            0b1010 => Self::R48kHz,
            0b1011 => Self::R96kHz,
            0b1100 => Self::KHz(value? as u8),
            0b1101 => Self::Hz(value?),
            0b1110 => Self::DaHz(value?),
            _ => return None,
        })
    }

    /// Returns the frequency in Hz, or `None` for `Unspecified`.
    #[inline]
    pub const fn freq(self) -> Option<usize> {
        Some(match self {
            Self::Unspecified => return None,
            Self::R88_2kHz => 88_200,
            Self::R176_4kHz => 176_400,
            Self::R192kHz => 192_000,
            Self::R8kHz => 8_000,
            Self::R16kHz => 16_000,
            Self::R22_05kHz => 22_050,
            Self::R24kHz => 24_000,
            Self::R32kHz => 32_000,
            Self::R44_1kHz => 44_100,
            Self::R48kHz => 48_000,
            Self::R96kHz => 96_000,
            Self::KHz(v) => v as usize * 1000,
            Self::Hz(v) => v as usize,
            Self::DaHz(v) => v as usize * 10,
        })
    }

    /// Returns the number of extra bits required to store the specification.
    #[inline]
    pub(crate) const fn count_extra_bits(self) -> usize {
        match self {
            Self::KHz(_) => 8,
            Self::DaHz(_) | Self::Hz(_) => 16,
            _ => 0,
        }
    }

    /// Returns 4-bit indicator for the sample-rate specifier.
    #[inline]
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::R88_2kHz => 1,
            Self::R176_4kHz => 2,
            Self::R192kHz => 3,
            Self::R8kHz => 4,
            Self::R16kHz => 5,
            Self::R22_05kHz => 6,
            Self::R24kHz => 7,
            Self::R32kHz => 8,
            Self::R44_1kHz => 9,
            Self::R48kHz => 10,
            Self::R96kHz => 11,
            Self::KHz(_) => 12,
            Self::Hz(_) => 13,
            Self::DaHz(_) => 14,
        }
    }

    /// Writes extra data field to `dest`.
    #[inline]
    pub(crate) fn write_extra_bits<S: BitSink>(self, dest: &mut S) -> Result<(), S::Error> {
        match self {
            Self::KHz(v) => dest.write_lsbs(v, 8),
            Self::DaHz(v) | Self::Hz(v) => dest.write_lsbs(v, 16),
            _ => Ok(()),
        }
    }
}

/// [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameHeader {
    block_size_spec: BlockSizeSpec,
    channel_assignment: ChannelAssignment,
    sample_size_spec: SampleSizeSpec,
    sample_rate_spec: SampleRateSpec,
    offset: FrameOffset,
}

impl FrameHeader {
    #[inline]
    pub(crate) const fn from_specs(
        block_size_spec: BlockSizeSpec,
        channel_assignment: ChannelAssignment,
        sample_size_spec: SampleSizeSpec,
        sample_rate_spec: SampleRateSpec,
        offset: FrameOffset,
    ) -> Self {
        Self {
            block_size_spec,
            channel_assignment,
            sample_size_spec,
            sample_rate_spec,
            offset,
        }
    }

    /// Constructs `FrameHeader` from the given metadata.
    ///
    /// A bit depth or a sample rate that has no code in the header is
    /// written as "unspecified", so decoders take it from the PCM format.
    ///
    /// # Errors
    ///
    /// Returns error when `block_size` or `channel_assignment` is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// # use flakecodec::bitsink::*;
    /// let header = FrameHeader::new(
    ///     192, ChannelAssignment::Independent(1), 8, 44100, FrameOffset::StartSample(123456)
    /// ).unwrap();
    /// let mut sink = ByteSink::new();
    /// header.write(&mut sink);
    /// assert_eq!(&sink.as_slice()[..8], &[
    ///     0xFF, 0xF9, // sync-code + fixed/var
    ///     0x19, 0x02, // block size + rate + channel + sample size + reserved
    ///     0xF0, 0x9E, 0x89, 0x80 // start sample number encoded in utf-8
    /// ]);
    /// ```
    #[inline]
    pub fn new(
        block_size: usize,
        channel_assignment: ChannelAssignment,
        bits_per_sample: usize,
        sample_rate: usize,
        offset: FrameOffset,
    ) -> Result<Self, VerifyError> {
        verify_range!("block_size", block_size, 1..=MAX_BLOCK_SIZE)?;
        channel_assignment
            .verify()
            .map_err(|e| e.within("channel_assignment"))?;
        let sample_size_spec = u8::try_from(bits_per_sample)
            .ok()
            .and_then(SampleSizeSpec::from_bits)
            .unwrap_or(SampleSizeSpec::Unspecified);
        let sample_rate_spec = u32::try_from(sample_rate)
            .ok()
            .and_then(SampleRateSpec::from_freq)
            .unwrap_or(SampleRateSpec::Unspecified);
        Ok(Self::from_specs(
            BlockSizeSpec::from_size(block_size as u16),
            channel_assignment,
            sample_size_spec,
            sample_rate_spec,
            offset,
        ))
    }

    /// Returns true if the header belongs to a variable-blocking stream.
    #[inline]
    pub const fn is_variable_blocking(&self) -> bool {
        matches!(self.offset, FrameOffset::StartSample(_))
    }

    /// Returns the location of the frame.
    #[inline]
    pub const fn frame_offset(&self) -> FrameOffset {
        self.offset
    }

    /// Sets the location of frame.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let chs = ChannelAssignment::Independent(2);
    /// let mut header = FrameHeader::new(160, chs, 16, 16000, FrameOffset::Frame(0)).unwrap();
    /// assert!(!header.is_variable_blocking());
    ///
    /// header.set_frame_offset(FrameOffset::StartSample(480));
    /// assert!(header.is_variable_blocking());
    /// ```
    #[inline]
    pub fn set_frame_offset(&mut self, offset: FrameOffset) {
        self.offset = offset;
    }

    #[inline]
    pub(crate) const fn sample_rate_spec(&self) -> SampleRateSpec {
        self.sample_rate_spec
    }

    #[inline]
    pub(crate) const fn sample_size_spec(&self) -> SampleSizeSpec {
        self.sample_size_spec
    }

    /// Returns block size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let chs = ChannelAssignment::Independent(2);
    /// let header = FrameHeader::new(160, chs, 16, 16000, FrameOffset::Frame(3)).unwrap();
    /// assert_eq!(header.block_size(), 160);
    /// ```
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.block_size_spec.block_size()
    }

    /// Returns block size spec.
    #[inline]
    pub(crate) const fn block_size_spec(&self) -> BlockSizeSpec {
        self.block_size_spec
    }

    /// Returns bits-per-sample.
    ///
    /// This function returns `None` when bits-per-sample specification is not
    /// given in the `FrameHeader`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let chs = ChannelAssignment::Independent(1);
    /// let header = FrameHeader::new(192, chs, 12, 44100, FrameOffset::Frame(0)).unwrap();
    /// assert_eq!(header.bits_per_sample(), Some(12));
    ///
    /// let header = FrameHeader::new(192, chs, 10, 44100, FrameOffset::Frame(0)).unwrap();
    /// assert_eq!(header.bits_per_sample(), None);
    /// ```
    #[inline]
    pub fn bits_per_sample(&self) -> Option<usize> {
        self.sample_size_spec.into_bits().map(|x| x as usize)
    }

    /// Returns the sample rate in Hz, or `None` if not given in the header.
    #[inline]
    pub const fn sample_rate(&self) -> Option<usize> {
        self.sample_rate_spec.freq()
    }

    /// Returns [`ChannelAssignment`] of this frame.
    #[inline]
    pub const fn channel_assignment(&self) -> &ChannelAssignment {
        &self.channel_assignment
    }
}

/// [`SUBFRAME`](https://xiph.org/flac/format.html#subframe) component.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SubFrame {
    /// This variant contains [`Constant`] subframe.
    Constant(Constant),
    /// This variant contains [`Verbatim`] subframe.
    Verbatim(Verbatim),
    /// This variant contains [`FixedLpc`] subframe.
    FixedLpc(FixedLpc),
    /// This variant contains [`Lpc`] subframe.
    Lpc(Lpc),
}

impl SubFrame {
    /// Returns the number of samples in the subframe.
    #[inline]
    pub fn block_size(&self) -> usize {
        match self {
            Self::Constant(c) => c.block_size(),
            Self::Verbatim(c) => c.samples().len(),
            Self::FixedLpc(c) => c.residual().block_size(),
            Self::Lpc(c) => c.residual().block_size(),
        }
    }

    /// Returns the width of the coded samples, i.e. after removing wasted bits.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        match self {
            Self::Constant(c) => c.bits_per_sample(),
            Self::Verbatim(c) => c.bits_per_sample(),
            Self::FixedLpc(c) => c.bits_per_sample(),
            Self::Lpc(c) => c.bits_per_sample(),
        }
    }

    /// Returns the number of wasted bits restored by a left shift.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        match self {
            Self::Constant(c) => c.wasted_bits as usize,
            Self::Verbatim(c) => c.wasted_bits as usize,
            Self::FixedLpc(c) => c.wasted_bits as usize,
            Self::Lpc(c) => c.wasted_bits as usize,
        }
    }

    /// Sets the number of wasted bits.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// // [4, 8, 12] stored as [1, 2, 3] with two wasted bits.
    /// let sf: SubFrame = Verbatim::new(&[1, 2, 3], 14).unwrap().into();
    /// let sf = sf.with_wasted_bits(2);
    /// assert_eq!(sf.wasted_bits(), 2);
    /// assert_eq!(sf.decode(), vec![4, 8, 12]);
    /// ```
    #[must_use]
    #[inline]
    pub fn with_wasted_bits(mut self, wasted_bits: usize) -> Self {
        let w = wasted_bits as u8;
        match &mut self {
            Self::Constant(c) => c.wasted_bits = w,
            Self::Verbatim(c) => c.wasted_bits = w,
            Self::FixedLpc(c) => c.wasted_bits = w,
            Self::Lpc(c) => c.wasted_bits = w,
        }
        self
    }
}

impl From<Constant> for SubFrame {
    fn from(c: Constant) -> Self {
        Self::Constant(c)
    }
}

impl From<Verbatim> for SubFrame {
    fn from(c: Verbatim) -> Self {
        Self::Verbatim(c)
    }
}

impl From<FixedLpc> for SubFrame {
    fn from(c: FixedLpc) -> Self {
        Self::FixedLpc(c)
    }
}

impl From<Lpc> for SubFrame {
    fn from(c: Lpc) -> Self {
        Self::Lpc(c)
    }
}

/// [`SUBFRAME_CONSTANT`](https://xiph.org/flac/format.html#subframe_constant) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Constant {
    block_size: usize,
    dc_offset: i32,
    bits_per_sample: u8,
    pub(super) wasted_bits: u8,
}

impl Constant {
    /// Constructs new `Constant`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let c = Constant::new(192, 4, 8).unwrap();
    /// assert_eq!(c.dc_offset(), 4);
    ///
    /// // 128 doesn't fit in 8 bits.
    /// assert!(Constant::new(192, 128, 8).is_err());
    /// ```
    pub fn new(
        block_size: usize,
        dc_offset: i32,
        bits_per_sample: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self::from_parts(block_size, dc_offset, bits_per_sample as u8);
        ret.verify()?;
        Ok(ret)
    }

    #[inline]
    pub(crate) const fn from_parts(block_size: usize, dc_offset: i32, bits_per_sample: u8) -> Self {
        Self {
            block_size,
            dc_offset,
            bits_per_sample,
            wasted_bits: 0,
        }
    }

    /// Returns the block size.
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns offset value (in the coded domain).
    #[inline]
    pub const fn dc_offset(&self) -> i32 {
        self.dc_offset
    }

    /// Returns bits-per-sample.
    #[inline]
    pub const fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }
}

/// [`SUBFRAME_VERBATIM`](https://xiph.org/flac/format.html#subframe_verbatim) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Verbatim {
    data: Vec<i32>,
    bits_per_sample: u8,
    pub(super) wasted_bits: u8,
}

impl Verbatim {
    /// Constructs new `Verbatim` component with the `samples`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if a sample doesn't fit in `bits_per_sample`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// let v = Verbatim::new(&[0, -1, 1], 2).unwrap();
    /// assert_eq!(v.samples(), &[0, -1, 1]);
    /// assert!(Verbatim::new(&[2], 2).is_err());
    /// ```
    pub fn new(samples: &[i32], bits_per_sample: usize) -> Result<Self, VerifyError> {
        let ret = Self::from_samples(samples, bits_per_sample as u8);
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs new `Verbatim` component from the sample slice without verification.
    #[inline]
    pub(crate) fn from_samples(samples: &[i32], bits_per_sample: u8) -> Self {
        Self::from_vec(samples.to_vec(), bits_per_sample)
    }

    #[inline]
    pub(crate) const fn from_vec(data: Vec<i32>, bits_per_sample: u8) -> Self {
        Self {
            data,
            bits_per_sample,
            wasted_bits: 0,
        }
    }

    /// Returns a slice for the verbatim samples.
    #[inline]
    pub fn samples(&self) -> &[i32] {
        &self.data
    }

    /// Returns bits-per-sample.
    #[inline]
    pub const fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }
}

/// [`SUBFRAME_FIXED`](https://xiph.org/flac/format.html#subframe_fixed) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixedLpc {
    warm_up: heapless::Vec<i32, MAX_FIXED_LPC_ORDER>,
    residual: Residual,
    bits_per_sample: u8,
    pub(super) wasted_bits: u8,
}

impl FixedLpc {
    /// Constructs new `FixedLpc`.
    ///
    /// The order is given by the length of `warm_up`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// # use flakecodec::rice::*;
    /// let residual = Residual::new(0, RiceMethod::Rice4, &[PartitionCode::Rice(0)], 2, &[0, 0, 0, 0]).unwrap();
    /// let fixed = FixedLpc::new(&[1, 2], residual, 8).unwrap();
    /// assert_eq!(fixed.order(), 2);
    /// assert_eq!(fixed.decode(), vec![1, 2, 3, 4]);
    /// ```
    pub fn new(
        warm_up: &[i32],
        residual: Residual,
        bits_per_sample: usize,
    ) -> Result<Self, VerifyError> {
        verify_range!("order", warm_up.len(), ..=MAX_FIXED_LPC_ORDER)?;
        let ret = Self::from_parts(warm_up, residual, bits_per_sample as u8);
        ret.verify()?;
        Ok(ret)
    }

    #[inline]
    pub(crate) fn from_parts(warm_up: &[i32], residual: Residual, bits_per_sample: u8) -> Self {
        let warm_up = heapless::Vec::from_slice(warm_up).expect(panic_msg::DATA_INCONSISTENT);
        Self {
            warm_up,
            residual,
            bits_per_sample,
            wasted_bits: 0,
        }
    }

    /// Returns the order.
    #[inline]
    pub fn order(&self) -> usize {
        self.warm_up.len()
    }

    /// Returns warm-up samples as a slice.
    #[inline]
    pub fn warm_up(&self) -> &[i32] {
        &self.warm_up
    }

    /// Returns a reference to the internal [`Residual`] component.
    #[inline]
    pub const fn residual(&self) -> &Residual {
        &self.residual
    }

    /// Returns bits-per-sample.
    #[inline]
    pub const fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }
}

/// [`SUBFRAME_LPC`](https://xiph.org/flac/format.html#subframe_lpc) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Lpc {
    parameters: QuantizedParameters,
    warm_up: heapless::Vec<i32, MAX_LPC_ORDER>,
    residual: Residual,
    bits_per_sample: u8,
    pub(super) wasted_bits: u8,
}

impl Lpc {
    /// Constructs `Lpc`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid, e.g. the number of
    /// warm-up samples differs from the order of `parameters`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// # use flakecodec::rice::*;
    /// let params = QuantizedParameters::new(&[2], 1, 4).unwrap();
    /// let residual = Residual::new(0, RiceMethod::Rice4, &[PartitionCode::Rice(1)], 1, &[0, 1, -1]).unwrap();
    /// let lpc = Lpc::new(&[4], params, residual, 8).unwrap();
    /// // x[t] = (2 * x[t - 1]) >> 1 + e[t]
    /// assert_eq!(lpc.decode(), vec![4, 5, 4]);
    /// ```
    pub fn new(
        warm_up: &[i32],
        parameters: QuantizedParameters,
        residual: Residual,
        bits_per_sample: usize,
    ) -> Result<Self, VerifyError> {
        verify_true!(
            "warm_up.len",
            warm_up.len() == parameters.order(),
            "must be equal to the order of the parameters"
        )?;
        let ret = Self::from_parts(warm_up, parameters, residual, bits_per_sample as u8);
        ret.verify()?;
        Ok(ret)
    }

    #[inline]
    pub(crate) fn from_parts(
        warm_up: &[i32],
        parameters: QuantizedParameters,
        residual: Residual,
        bits_per_sample: u8,
    ) -> Self {
        let warm_up = heapless::Vec::from_slice(warm_up).expect(panic_msg::DATA_INCONSISTENT);
        Self {
            parameters,
            warm_up,
            residual,
            bits_per_sample,
            wasted_bits: 0,
        }
    }

    /// Returns the order.
    #[inline]
    pub fn order(&self) -> usize {
        self.parameters.order()
    }

    /// Returns warm-up samples as a slice.
    #[inline]
    pub fn warm_up(&self) -> &[i32] {
        &self.warm_up
    }

    /// Returns a reference to the parameter struct.
    #[inline]
    pub const fn parameters(&self) -> &QuantizedParameters {
        &self.parameters
    }

    /// Returns a reference to the internal [`Residual`] component.
    #[inline]
    pub const fn residual(&self) -> &Residual {
        &self.residual
    }

    /// Returns bits-per-sample.
    #[inline]
    pub const fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }
}

/// Quantized LPC coefficients.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuantizedParameters {
    coefs: heapless::Vec<i16, MAX_LPC_ORDER>,
    shift: i8,
    precision: usize,
}

impl QuantizedParameters {
    /// Constructs new `QuantizedParameters`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let p = QuantizedParameters::new(&[1], 0, 7)?;
    /// assert_eq!(p.coefficient(0), Some(1));
    /// assert_eq!(p.coefficient(1), None);
    ///
    /// // 64 doesn't fit in 7 bits.
    /// assert!(QuantizedParameters::new(&[64], 0, 7).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(coefs: &[i16], shift: i8, precision: usize) -> Result<Self, VerifyError> {
        verify_range!("order", coefs.len(), 1..=MAX_LPC_ORDER)?;
        let ret = Self::from_parts(coefs, shift, precision);
        // `QuantizedParameter` doesn't have a child component, so calling
        // `verify` here is not redundant whereas it incurs redundant checks
        // when the struct has a child component.
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs new `QuantizedParameters` from parts without data verification.
    #[inline]
    pub(crate) fn from_parts(coefs: &[i16], shift: i8, precision: usize) -> Self {
        Self {
            coefs: heapless::Vec::from_slice(coefs).expect(panic_msg::DATA_INCONSISTENT),
            shift,
            precision,
        }
    }

    /// Returns the order of LPC specified by this parameter.
    #[inline]
    pub fn order(&self) -> usize {
        self.coefs.len()
    }

    /// Returns precision.
    #[inline]
    pub const fn precision(&self) -> usize {
        self.precision
    }

    /// Returns the shift parameter.
    #[inline]
    pub const fn shift(&self) -> i8 {
        self.shift
    }

    /// Returns an individual coefficient in quantized form.
    #[inline]
    pub fn coefficient(&self, idx: usize) -> Option<i16> {
        self.coefs.get(idx).copied()
    }

    /// Returns quantized coefficients.
    #[inline]
    pub fn coefs(&self) -> &[i16] {
        &self.coefs
    }
}

/// [`RESIDUAL`](https://xiph.org/flac/format.html#residual) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Residual {
    partition_order: u8,
    method: RiceMethod,
    codes: heapless::Vec<PartitionCode, MAX_PARTITIONS>,
    warmup_length: usize,
    // Left-padded with zeros for warm-up samples.
    residuals: Vec<i32>,
    // Precomputed size of the partitions, excluding the 6-bit header.
    body_bits: usize,
}

impl Residual {
    /// Constructs `Residual` from its parts.
    ///
    /// `residuals` holds the whole block including `warmup_length` leading
    /// samples that are not coded.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::component::*;
    /// # use flakecodec::rice::*;
    /// let codes = [PartitionCode::Rice(1), PartitionCode::Escaped(4)];
    /// let residual = Residual::new(1, RiceMethod::Rice4, &codes, 1, &[0, 1, 7, -8]).unwrap();
    /// assert_eq!(residual.residual(3), -8);
    ///
    /// // The warm-up samples may fill the first partition, but not overflow it.
    /// assert!(Residual::new(1, RiceMethod::Rice4, &codes, 2, &[0, 0, 7, -8]).is_ok());
    /// assert!(Residual::new(1, RiceMethod::Rice4, &codes, 3, &[0, 0, 0, -8]).is_err());
    /// ```
    pub fn new(
        partition_order: usize,
        method: RiceMethod,
        codes: &[PartitionCode],
        warmup_length: usize,
        residuals: &[i32],
    ) -> Result<Self, VerifyError> {
        verify_true!(
            "codes.len",
            partition_order < 16 && codes.len() == 1usize << partition_order,
            "must be equal to 2^partition_order"
        )?;
        verify_range!("codes.len", codes.len(), ..=MAX_PARTITIONS)?;
        verify_true!(
            "residuals.len",
            residuals.len() % codes.len() == 0 && residuals.len() >> partition_order >= warmup_length,
            "must be divisible into partitions not shorter than the warm-up"
        )?;
        let codes = heapless::Vec::from_slice(codes).expect(panic_msg::PARTITION_OVERFLOW);
        let ret = Self::from_parts(
            partition_order as u8,
            method,
            codes,
            warmup_length,
            residuals.to_vec(),
        );
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs `Residual` with consuming parts.
    #[inline]
    pub(crate) fn from_parts(
        partition_order: u8,
        method: RiceMethod,
        codes: heapless::Vec<PartitionCode, MAX_PARTITIONS>,
        warmup_length: usize,
        residuals: Vec<i32>,
    ) -> Self {
        debug_assert!(codes.len() == 1usize << partition_order as usize);
        let mut ret = Self {
            partition_order,
            method,
            codes,
            warmup_length,
            residuals,
            body_bits: 0,
        };
        let body_bits = ret
            .partitions()
            .map(|(code, part)| method.parameter_bits() + partition_bits(code, part))
            .sum();
        ret.body_bits = body_bits;
        ret
    }

    /// Iterates over the partitions, yielding the code and the coded values.
    #[inline]
    pub(crate) fn partitions(&self) -> impl Iterator<Item = (PartitionCode, &[i32])> + '_ {
        let part_len = self.residuals.len() >> self.partition_order;
        self.codes.iter().enumerate().map(move |(p, code)| {
            let start = if p == 0 { self.warmup_length } else { p * part_len };
            (*code, &self.residuals[start..(p + 1) * part_len])
        })
    }

    /// Returns the partition order for the PRC.
    #[inline]
    pub fn partition_order(&self) -> usize {
        self.partition_order as usize
    }

    /// Returns the coding method.
    #[inline]
    pub const fn method(&self) -> RiceMethod {
        self.method
    }

    /// Returns the code for the `p`-th partition.
    #[inline]
    pub fn partition_code(&self, p: usize) -> Option<PartitionCode> {
        self.codes.get(p).copied()
    }

    #[inline]
    pub(crate) fn codes(&self) -> &[PartitionCode] {
        &self.codes
    }

    /// Returns the residual value for the `t`-th sample.
    #[inline]
    pub fn residual(&self, t: usize) -> i32 {
        self.residuals[t]
    }

    #[inline]
    pub(crate) fn residuals(&self) -> &[i32] {
        &self.residuals
    }

    /// Returns the block size of this `Residual`.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.residuals.len()
    }

    /// Returns the warmup length of this `Residual`.
    #[inline]
    pub const fn warmup_length(&self) -> usize {
        self.warmup_length
    }

    /// Returns the exact number of bits, including the method and order fields.
    #[inline]
    pub(crate) const fn total_bits(&self) -> usize {
        RICE_HEADER_BITS + self.body_bits
    }
}

/// Returns the number of bits for the values in a partition (excluding the parameter).
#[inline]
fn partition_bits(code: PartitionCode, values: &[i32]) -> usize {
    match code {
        PartitionCode::Rice(k) => {
            let k = k as usize;
            let quotients: usize = values
                .iter()
                .map(|v| (encode_signbit(*v) >> k) as usize)
                .sum();
            quotients + values.len() * (k + 1)
        }
        PartitionCode::Escaped(width) => ESCAPE_WIDTH_BITS + values.len() * width as usize,
    }
}
