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

use super::super::bitsink::BitSink;
use super::super::bitsink::ByteSink;
use super::super::constant::panic_msg;
use super::super::constant::qlpc::PRECISION_BITS;
use super::super::constant::qlpc::SHIFT_BITS;
use super::super::constant::rice::ESCAPE_WIDTH_BITS;
use super::super::error::OutputError;
use super::super::error::RangeError;
use super::super::rice::PartitionCode;

use super::datatype::ChannelAssignment;
use super::datatype::Constant;
use super::datatype::FixedLpc;
use super::datatype::Frame;
use super::datatype::FrameHeader;
use super::datatype::Lpc;
use super::datatype::Residual;
use super::datatype::SubFrame;
use super::datatype::Verbatim;

const CRC_8_FLAC: crc::Algorithm<u8> = crc::CRC_8_SMBUS;
const CRC_16_FLAC: crc::Algorithm<u16> = crc::CRC_16_UMTS;

/// CRC-8 (polynomial 0x07) computed over the frame header bytes.
pub static HEADER_CRC: crc::Crc<u8, crc::Table<16>> =
    crc::Crc::<u8, crc::Table<16>>::new(&CRC_8_FLAC);

/// CRC-16 (polynomial 0x8005) computed over all the bytes of a frame.
pub static FRAME_CRC: crc::Crc<u16, crc::Table<16>> =
    crc::Crc::<u16, crc::Table<16>>::new(&CRC_16_FLAC);

pub mod seal_bit_repr {
    pub trait Sealed {}
    impl Sealed for super::Frame {}
    impl Sealed for super::FrameHeader {}
    impl Sealed for super::ChannelAssignment {}
    impl Sealed for super::SubFrame {}
    impl Sealed for super::Constant {}
    impl Sealed for super::FixedLpc {}
    impl Sealed for super::Verbatim {}
    impl Sealed for super::Lpc {}
    impl Sealed for super::Residual {}
}

/// Frame components that can be represented in a bit sequence.
pub trait BitRepr: seal_bit_repr::Sealed {
    /// Counts the number of bits required to store the component.
    fn count_bits(&self) -> usize;

    /// Writes the bit sequence to `BitSink`.
    ///
    /// # Errors
    ///
    /// This function returns error if `self` contains an invalid value that
    /// does not fit to the bitstream format, or if a `BitSink` method
    /// returned an error.
    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>>;

    /// Test utility for obtaining bits as a [`Vec`] of [`u8`].
    #[cfg(test)]
    fn to_bytes(&self) -> Vec<u8> {
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect(panic_msg::NO_ERROR_EXPECTED);
        sink.into_inner()
    }

    /// Test utility for obtaining bits as eight-bit separated `String`.
    #[cfg(test)]
    fn to_bitstring(&self) -> String {
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect(panic_msg::NO_ERROR_EXPECTED);
        sink.to_bitstring()
    }

    #[cfg(test)]
    /// Checks if the number of bits actually written equals to the expected number of bits.
    ///
    /// # Errors
    ///
    /// If the check passed i.e. the number of bits actually written is as same as the expected
    /// number, it returns `Ok(bits)`. Otherwise, it returns `Err((expected_bits, actual_bits))`.
    fn verify_bit_counter(&self) -> Result<usize, (usize, usize)> {
        let expected = self.count_bits();
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect(panic_msg::NO_ERROR_EXPECTED);
        if expected == sink.len() {
            Ok(expected)
        } else {
            Err((expected, sink.len()))
        }
    }
}

/// Lookup table for `encode_to_utf8like`.
const UTF8_HEADS: [u8; 7] = [0x80, 0xC0, 0xE0, 0xF0, 0xF8, 0xFC, 0xFE];

/// Encodes the given integer into UTF-8-like byte sequence.
///
/// # Errors
///
/// It returns an error if `val` exceeds 36-bit value.
///
/// # Examples
///
/// ```
/// # use flakecodec::component::*;
/// assert_eq!(encode_to_utf8like(0x7F).unwrap().as_slice(), &[0x7F]);
/// assert_eq!(encode_to_utf8like(0x80).unwrap().as_slice(), &[0xC2, 0x80]);
/// assert!(encode_to_utf8like(1 << 36).is_err());
/// ```
#[inline]
pub fn encode_to_utf8like(val: u64) -> Result<heapless::Vec<u8, 7>, RangeError> {
    let val_size = u64::BITS as usize;
    let code_bits: usize = val_size - val.leading_zeros() as usize;
    let mut buf = [0u8; 7];
    let len = if code_bits <= 7 {
        buf[0] = val as u8;
        1
    } else if code_bits > 36 {
        return Err(RangeError::from_display(
            "input",
            "cannot exceed 36 bits.",
            &val,
        ));
    } else {
        // capacity = n * 6 + 6 - n = n * 5 + 6
        // n = ceil(capacity - 6 / 5)
        let trailing_bytes: usize = (code_bits - 2) / 5;
        debug_assert!((1..=6).contains(&trailing_bytes));
        let capacity = trailing_bytes * 5 + 6;
        debug_assert!(capacity >= code_bits);

        let first_bits = 6 - trailing_bytes;
        let mut val = val << (val_size - capacity);
        buf[0] = if trailing_bytes == 6 {
            0xFEu8
        } else {
            UTF8_HEADS[trailing_bytes] | ((val >> (64 - first_bits)) & 0xFF) as u8
        };
        val <<= first_bits;

        for b in &mut buf[1..=trailing_bytes] {
            *b = 0x80u8 | (val >> 58) as u8;
            val <<= 6;
        }
        trailing_bytes + 1
    };
    Ok(heapless::Vec::from_slice(&buf[..len]).expect(panic_msg::DATA_INCONSISTENT))
}

/// Computes the number of bytes required for UTF-8-like encoding of `val`.
#[inline]
pub const fn utf8like_bytesize(val: u64) -> usize {
    let code_bits: usize = (u64::BITS - val.leading_zeros()) as usize;
    if code_bits <= 7 {
        1
    } else {
        1 + (code_bits - 2) / 5
    }
}

/// Writes the type byte of a subframe header followed by the wasted-bits code.
#[inline]
fn write_subframe_header<S: BitSink>(
    dest: &mut S,
    type_code: u8,
    wasted_bits: usize,
) -> Result<(), S::Error> {
    dest.write((type_code << 1) | u8::from(wasted_bits > 0))?;
    if wasted_bits > 0 {
        dest.write_unary(wasted_bits - 1)?;
    }
    Ok(())
}

/// Returns the number of bits for the subframe header.
#[inline]
const fn subframe_header_bits(wasted_bits: usize) -> usize {
    8 + wasted_bits
}

impl BitRepr for Frame {
    #[inline]
    fn count_bits(&self) -> usize {
        let header = self.header().count_bits();
        let body: usize = self.subframes().iter().map(BitRepr::count_bits).sum();

        let aligned = ((header + body + 7) >> 3) << 3;
        let footer = 16;
        aligned + footer
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let mut frame_sink = ByteSink::with_capacity(self.count_bits());
        self.header()
            .write(&mut frame_sink)
            .map_err(OutputError::<S>::ignore_sink_error)?;
        for sub in self.subframes() {
            sub.write(&mut frame_sink)
                .map_err(OutputError::<S>::ignore_sink_error)?;
        }
        frame_sink
            .align_to_byte()
            .expect(panic_msg::NO_ERROR_EXPECTED);

        let bytes = frame_sink.as_slice();
        dest.write_bytes_aligned(bytes)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(FRAME_CRC.checksum(bytes))
            .map_err(OutputError::<S>::from_sink)
    }
}

impl BitRepr for ChannelAssignment {
    #[inline]
    fn count_bits(&self) -> usize {
        4
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        if let Self::Independent(ch) = *self {
            if ch == 0 || ch > 8 {
                return Err(RangeError::from_display("#channel", "must be in 1..=8", &ch).into());
            }
        }
        dest.write_lsbs(self.tag(), 4)
            .map_err(OutputError::<S>::from_sink)
    }
}

impl BitRepr for FrameHeader {
    #[inline]
    fn count_bits(&self) -> usize {
        let mut ret = 40;
        ret += 8 * utf8like_bytesize(self.frame_offset().counter());
        ret += self.block_size_spec().count_extra_bits();
        ret += self.sample_rate_spec().count_extra_bits();
        ret
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let mut header_buffer = ByteSink::with_capacity(self.count_bits());

        // sync-code + reserved 1-bit + variable-block indicator
        let header_word = 0xFFF8u16 + u16::from(self.is_variable_blocking());
        // ^ `from` converts true to 1 and false to 0.
        header_buffer
            .write_lsbs(header_word, 16)
            .expect(panic_msg::NO_ERROR_EXPECTED);

        // block_size_spec tag + 4-bit sample rate specifier.
        header_buffer
            .write_lsbs(
                self.block_size_spec().tag() << 4 | self.sample_rate_spec().tag(),
                8,
            )
            .expect(panic_msg::NO_ERROR_EXPECTED);
        self.channel_assignment()
            .write(&mut header_buffer)
            .map_err(OutputError::<S>::ignore_sink_error)?;

        // sample size specifier + 1-bit reserved (zero)
        header_buffer
            .write_lsbs(self.sample_size_spec().into_tag() << 1, 4)
            .expect(panic_msg::NO_ERROR_EXPECTED);

        let counter = encode_to_utf8like(self.frame_offset().counter())?;
        header_buffer
            .write_bytes_aligned(&counter)
            .expect(panic_msg::NO_ERROR_EXPECTED);
        self.block_size_spec()
            .write_extra_bits(&mut header_buffer)
            .expect(panic_msg::NO_ERROR_EXPECTED);
        self.sample_rate_spec()
            .write_extra_bits(&mut header_buffer)
            .expect(panic_msg::NO_ERROR_EXPECTED);

        dest.write_bytes_aligned(header_buffer.as_slice())
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(HEADER_CRC.checksum(header_buffer.as_slice()))
            .map_err(OutputError::<S>::from_sink)?;
        Ok(())
    }
}

impl BitRepr for SubFrame {
    #[inline]
    fn count_bits(&self) -> usize {
        match self {
            Self::Verbatim(c) => c.count_bits(),
            Self::Constant(c) => c.count_bits(),
            Self::FixedLpc(c) => c.count_bits(),
            Self::Lpc(c) => c.count_bits(),
        }
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        match self {
            Self::Verbatim(c) => c.write(dest),
            Self::Constant(c) => c.write(dest),
            Self::FixedLpc(c) => c.write(dest),
            Self::Lpc(c) => c.write(dest),
        }
    }
}

impl BitRepr for Constant {
    #[inline]
    fn count_bits(&self) -> usize {
        subframe_header_bits(self.wasted_bits as usize) + self.bits_per_sample()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x00, self.wasted_bits as usize)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_twoc(self.dc_offset(), self.bits_per_sample())
            .map_err(OutputError::<S>::from_sink)?;
        Ok(())
    }
}

impl Verbatim {
    /// Computes the size of a verbatim subframe without constructing it.
    #[inline]
    pub(crate) const fn count_bits_from_metadata(
        block_size: usize,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> usize {
        subframe_header_bits(wasted_bits) + block_size * bits_per_sample
    }
}

impl BitRepr for Verbatim {
    #[inline]
    fn count_bits(&self) -> usize {
        Self::count_bits_from_metadata(
            self.samples().len(),
            self.bits_per_sample(),
            self.wasted_bits as usize,
        )
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x01, self.wasted_bits as usize)
            .map_err(OutputError::<S>::from_sink)?;
        for v in self.samples() {
            dest.write_twoc(*v, self.bits_per_sample())
                .map_err(OutputError::<S>::from_sink)?;
        }
        Ok(())
    }
}

impl BitRepr for FixedLpc {
    #[inline]
    fn count_bits(&self) -> usize {
        subframe_header_bits(self.wasted_bits as usize)
            + self.bits_per_sample() * self.order()
            + self.residual().count_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let type_code = 0x08u8 | self.order() as u8;
        write_subframe_header(dest, type_code, self.wasted_bits as usize)
            .map_err(OutputError::<S>::from_sink)?;
        for v in self.warm_up() {
            dest.write_twoc(*v, self.bits_per_sample())
                .map_err(OutputError::<S>::from_sink)?;
        }
        self.residual().write(dest)
    }
}

impl BitRepr for Lpc {
    #[inline]
    fn count_bits(&self) -> usize {
        let warm_up_bits = self.bits_per_sample() * self.order();
        subframe_header_bits(self.wasted_bits as usize)
            + warm_up_bits
            + PRECISION_BITS
            + SHIFT_BITS
            + self.parameters().precision() * self.order()
            + self.residual().count_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let type_code = 0x20u8 | (self.order() - 1) as u8;
        write_subframe_header(dest, type_code, self.wasted_bits as usize)
            .map_err(OutputError::<S>::from_sink)?;

        for v in self.warm_up() {
            dest.write_twoc(*v, self.bits_per_sample())
                .map_err(OutputError::<S>::from_sink)?;
        }

        let precision = self.parameters().precision();
        if !(1..16).contains(&precision) {
            return Err(
                RangeError::from_display("precision", "must be in 1..=15", &precision).into(),
            );
        }
        dest.write_lsbs((precision - 1) as u8, PRECISION_BITS)
            .map_err(OutputError::<S>::from_sink)?;

        let shift = self.parameters().shift();
        if shift < 0 {
            return Err(RangeError::from_display("shift", "must not be negative", &shift).into());
        }
        dest.write_twoc(shift, SHIFT_BITS)
            .map_err(OutputError::<S>::from_sink)?;

        for coef in self.parameters().coefs() {
            dest.write_twoc(*coef, precision)
                .map_err(OutputError::<S>::from_sink)?;
        }

        self.residual().write(dest)
    }
}

impl BitRepr for Residual {
    #[inline]
    fn count_bits(&self) -> usize {
        self.total_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let method = self.method();
        let param_bits = method.parameter_bits();
        dest.write_lsbs(method.tag(), 2)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.partition_order() as u8, 4)
            .map_err(OutputError::<S>::from_sink)?;

        for (code, values) in self.partitions() {
            match code {
                PartitionCode::Rice(k) => {
                    dest.write_lsbs(k, param_bits)
                        .map_err(OutputError::<S>::from_sink)?;
                    dest.write_rice_block_signed(k as usize, values)
                        .map_err(OutputError::<S>::from_sink)?;
                }
                PartitionCode::Escaped(width) => {
                    dest.write_lsbs(method.escape_code() as u8, param_bits)
                        .map_err(OutputError::<S>::from_sink)?;
                    dest.write_lsbs(width, ESCAPE_WIDTH_BITS)
                        .map_err(OutputError::<S>::from_sink)?;
                    for v in values {
                        dest.write_twoc(*v, width as usize)
                            .map_err(OutputError::<S>::from_sink)?;
                    }
                }
            }
        }
        Ok(())
    }
}
