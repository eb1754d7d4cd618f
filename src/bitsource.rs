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

//! Bit-level reader used by the frame parser.

use super::constant::rice::ESCAPE_WIDTH_BITS;
use super::error::StructuralError;
use super::error::StructuralErrorKind;
use super::rice::decode_signbit;

/// Number of bits that can always be appended to a non-full cache.
const REFILL_THRESHOLD: usize = 56;

/// MSB-first bit reader over a byte slice.
///
/// Bits are served from a 64-bit cache that is refilled from the slice a
/// byte at a time. Every read that runs past the end of the slice fails with
/// [`StructuralErrorKind::Truncated`] and leaves the position unchanged.
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    next_byte: usize,
    cache: u64,
    cache_bits: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `data`.
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next_byte: 0,
            cache: 0,
            cache_bits: 0,
        }
    }

    /// Returns the underlying bytes.
    #[inline]
    pub const fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the current position in bits.
    #[inline]
    pub const fn bit_position(&self) -> usize {
        self.next_byte * 8 - self.cache_bits
    }

    /// Returns the number of bytes touched so far (a partially read byte
    /// counts as consumed).
    #[inline]
    pub const fn byte_position(&self) -> usize {
        (self.bit_position() + 7) >> 3
    }

    /// Returns the number of unread bits.
    #[inline]
    pub const fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_position()
    }

    /// Makes a structural error located at the current position.
    #[inline]
    pub const fn error(&self, kind: StructuralErrorKind) -> StructuralError {
        StructuralError::new(kind, self.bit_position())
    }

    #[inline]
    fn refill(&mut self) {
        while self.cache_bits <= REFILL_THRESHOLD && self.next_byte < self.data.len() {
            self.cache |= u64::from(self.data[self.next_byte]) << (REFILL_THRESHOLD - self.cache_bits);
            self.cache_bits += 8;
            self.next_byte += 1;
        }
    }

    /// Drops `n` (at most `cache_bits`) bits from the cache.
    #[inline]
    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.cache_bits);
        self.cache = if n >= 64 { 0 } else { self.cache << n };
        self.cache_bits -= n;
    }

    /// Moves the reader to the absolute bit position `pos`.
    fn seek_bits(&mut self, pos: usize) {
        self.next_byte = pos >> 3;
        self.cache = 0;
        self.cache_bits = 0;
        self.refill();
        self.consume(pos & 7);
    }

    /// Reads `n` (at most 56) bits from the cache.
    #[inline]
    fn take(&mut self, n: usize) -> Result<u64, StructuralError> {
        if n == 0 {
            return Ok(0);
        }
        if self.cache_bits < n {
            self.refill();
            if self.cache_bits < n {
                return Err(self.error(StructuralErrorKind::Truncated));
            }
        }
        let ret = self.cache >> (64 - n);
        self.consume(n);
        Ok(ret)
    }

    /// Reads `n` (at most 64) bits as an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsource::BitReader;
    /// let mut reader = BitReader::new(&[0xCA, 0xFE]);
    /// assert_eq!(reader.read_bits64(4).unwrap(), 0xC);
    /// assert_eq!(reader.read_bits64(12).unwrap(), 0xAFE);
    /// assert!(reader.read_bits64(1).is_err());
    /// ```
    pub fn read_bits64(&mut self, n: usize) -> Result<u64, StructuralError> {
        debug_assert!(n <= 64);
        if n <= 32 {
            return self.take(n);
        }
        if n > self.remaining_bits() {
            return Err(self.error(StructuralErrorKind::Truncated));
        }
        let high = self.take(n - 32)?;
        let low = self.take(32)?;
        Ok((high << 32) | low)
    }

    /// Reads `n` (at most 32) bits as an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    #[inline]
    pub fn read_bits(&mut self, n: usize) -> Result<u32, StructuralError> {
        debug_assert!(n <= 32);
        self.take(n).map(|v| v as u32)
    }

    /// Reads a single bit as a flag.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, StructuralError> {
        self.take(1).map(|v| v == 1)
    }

    /// Reads an `n`-bit (at most 32) two's complement integer.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsource::BitReader;
    /// let mut reader = BitReader::new(&[0b1001_0111]);
    /// assert_eq!(reader.read_signed(4).unwrap(), -7);
    /// assert_eq!(reader.read_signed(4).unwrap(), 7);
    /// assert_eq!(reader.read_signed(0).unwrap(), 0);
    /// ```
    #[inline]
    pub fn read_signed(&mut self, n: usize) -> Result<i32, StructuralError> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        let v = self.take(n)?;
        let shift = 64 - n;
        Ok(((v << shift) as i64 >> shift) as i32)
    }

    /// Reads a unary code, i.e. counts zeros until a one.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if no terminating one is found.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsource::BitReader;
    /// let mut reader = BitReader::new(&[0b0010_0000, 0b0000_0001]);
    /// assert_eq!(reader.read_unary().unwrap(), 2);
    /// assert_eq!(reader.read_unary().unwrap(), 12);
    /// assert_eq!(reader.bit_position(), 16);
    /// ```
    pub fn read_unary(&mut self) -> Result<usize, StructuralError> {
        let start = self.bit_position();
        let mut count = 0usize;
        loop {
            if self.cache_bits == 0 {
                self.refill();
                if self.cache_bits == 0 {
                    self.seek_bits(start);
                    return Err(self.error(StructuralErrorKind::Truncated));
                }
            }
            let zeros = self.cache.leading_zeros() as usize;
            if zeros < self.cache_bits {
                count += zeros;
                self.consume(zeros + 1);
                return Ok(count);
            }
            count += self.cache_bits;
            self.consume(self.cache_bits);
        }
    }

    /// Reads a zigzag-mapped Rice code with the parameter `k`.
    ///
    /// Values that do not fit in 32 bits wrap around.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsource::BitReader;
    /// let mut reader = BitReader::new(&[0b0101_0000]);
    /// assert_eq!(reader.read_rice_signed(2).unwrap(), -3);
    /// ```
    #[inline]
    pub fn read_rice_signed(&mut self, k: usize) -> Result<i32, StructuralError> {
        let q = self.read_unary()? as u64;
        let r = self.take(k)?;
        Ok(decode_signbit((q.wrapping_shl(k as u32) | r) as u32))
    }

    /// Fills `dest` with the values of a residual partition.
    ///
    /// When `k == escape_code`, a 5-bit raw width follows and the values are
    /// stored as two's complement integers of that width. Otherwise, the
    /// values are Rice codes with the parameter `k`.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsource::BitReader;
    /// // escaped: width = 3, then 011 and 101.
    /// let mut reader = BitReader::new(&[0b0001_1011, 0b1010_0000]);
    /// let mut dest = [0i32; 2];
    /// reader.read_rice_block(&mut dest, 15, 15).unwrap();
    /// assert_eq!(dest, [3, -3]);
    /// ```
    pub fn read_rice_block(
        &mut self,
        dest: &mut [i32],
        k: usize,
        escape_code: usize,
    ) -> Result<(), StructuralError> {
        if k == escape_code {
            let width = self.take(ESCAPE_WIDTH_BITS)? as usize;
            if dest.len() * width > self.remaining_bits() {
                return Err(self.error(StructuralErrorKind::Truncated));
            }
            for v in dest {
                *v = self.read_signed(width)?;
            }
        } else {
            for v in dest {
                *v = self.read_rice_signed(k)?;
            }
        }
        Ok(())
    }

    /// Reads a UTF-8-like variable length integer (up to 36 bits).
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` with [`StructuralErrorKind::Counter`] if the
    /// code is malformed, or with `Truncated` if the input is too short.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsource::BitReader;
    /// let bytes = [0x7F, 0xC2, 0x80, 0xFE, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF];
    /// let mut reader = BitReader::new(&bytes);
    /// assert_eq!(reader.read_utf8().unwrap(), 127);
    /// assert_eq!(reader.read_utf8().unwrap(), 128);
    /// assert_eq!(reader.read_utf8().unwrap(), (1 << 36) - 1);
    /// ```
    pub fn read_utf8(&mut self) -> Result<u64, StructuralError> {
        let start = self.bit_position();
        let head = self.take(8)? as u8;
        let tail_count = match head.leading_ones() {
            0 => return Ok(u64::from(head)),
            n @ 2..=7 => n as usize - 1,
            _ => {
                self.seek_bits(start);
                return Err(self.error(StructuralErrorKind::Counter));
            }
        };
        let mut acc = u64::from(head & (0x7F >> (tail_count + 1)));
        for _ in 0..tail_count {
            let b = match self.take(8) {
                Ok(b) => b as u8,
                Err(e) => {
                    self.seek_bits(start);
                    return Err(e);
                }
            };
            if b & 0xC0 != 0x80 {
                self.seek_bits(start);
                return Err(self.error(StructuralErrorKind::Counter));
            }
            acc = (acc << 6) | u64::from(b & 0x3F);
        }
        Ok(acc)
    }

    /// Skips to the next byte boundary and returns the number of skipped bits.
    pub fn flush(&mut self) -> usize {
        let pads = self.cache_bits & 7;
        self.consume(pads);
        pads
    }

    /// Aligns to the next byte boundary, and then skips `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the input is too short.
    pub fn skip(&mut self, n: usize) -> Result<(), StructuralError> {
        let target = ((self.bit_position() + 7) >> 3) + n;
        if target > self.data.len() {
            return Err(self.error(StructuralErrorKind::Truncated));
        }
        self.seek_bits(target * 8);
        Ok(())
    }

    /// Returns true if the reader is on a byte boundary.
    #[inline]
    pub const fn is_aligned(&self) -> bool {
        self.cache_bits & 7 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bitsink::BitSink;
    use crate::bitsink::ByteSink;
    use crate::component::encode_to_utf8like;

    #[test]
    fn reading_unaligned_fields() {
        let mut reader = BitReader::new(&[0b1011_0011, 0b1100_0101, 0xFF]);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(7).unwrap(), 0b100_1111);
        assert!(!reader.is_aligned());
        assert_eq!(reader.byte_position(), 2);
        assert_eq!(reader.flush(), 6);
        assert_eq!(reader.bit_position(), 16);
        assert_eq!(reader.flush(), 0);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn reading_wide_fields() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x11];
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(4).unwrap(), 1);
        assert_eq!(reader.read_bits64(64).unwrap(), 0x2345_6789_ABCD_EF01);
        assert_eq!(reader.read_bits(4).unwrap(), 1);
        assert!(reader.read_bits64(40).is_err());
    }

    #[test]
    fn truncation_is_reported_without_moving() {
        let mut reader = BitReader::new(&[0x00, 0x00]);
        assert_eq!(reader.read_bits(3).unwrap(), 0);
        let err = reader.read_unary().unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::Truncated);
        assert_eq!(err.bit_position(), 3);
        assert_eq!(reader.bit_position(), 3);
        assert!(reader.read_bits(14).is_err());
        assert_eq!(reader.read_bits(13).unwrap(), 0);
        assert!(reader.read_bool().is_err());
    }

    #[test]
    fn skipping_bytes() {
        let mut reader = BitReader::new(&[0xFF, 0x00, 0xA5, 0x5A]);
        reader.read_bits(1).unwrap();
        reader.skip(1).unwrap();
        assert_eq!(reader.bit_position(), 16);
        assert_eq!(reader.read_bits(8).unwrap(), 0xA5);
        assert!(reader.skip(2).is_err());
        reader.skip(1).unwrap();
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn reading_sink_output() {
        let mut sink = ByteSink::new();
        sink.write_lsbs(5u8, 3).unwrap();
        sink.write_twoc(-100i32, 17).unwrap();
        sink.write_rice_block_signed(3, &[0, -1, 40, -41, 7]).unwrap();
        sink.write_unary(100).unwrap();
        sink.write_twoc(i32::MIN, 32).unwrap();
        sink.align_to_byte().unwrap();

        let mut reader = BitReader::new(sink.as_slice());
        assert_eq!(reader.read_bits(3).unwrap(), 5);
        assert_eq!(reader.read_signed(17).unwrap(), -100);
        let mut block = [0i32; 5];
        reader.read_rice_block(&mut block, 3, 15).unwrap();
        assert_eq!(block, [0, -1, 40, -41, 7]);
        assert_eq!(reader.read_unary().unwrap(), 100);
        assert_eq!(reader.read_signed(32).unwrap(), i32::MIN);
        reader.flush();
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn reading_escaped_block() {
        let mut sink = ByteSink::new();
        sink.write_lsbs(31u8, 5).unwrap();
        sink.write_lsbs(4u8, 5).unwrap();
        for v in [-8, 7, 0, -1] {
            sink.write_twoc(v, 4).unwrap();
        }
        sink.write_lsbs(0u8, 5).unwrap();
        let mut reader = BitReader::new(sink.as_slice());
        let code = reader.read_bits(5).unwrap() as usize;
        let mut block = [0i32; 4];
        reader.read_rice_block(&mut block, code, 31).unwrap();
        assert_eq!(block, [-8, 7, 0, -1]);
        let mut zero_width = [9i32; 3];
        reader.read_rice_block(&mut zero_width, 15, 15).unwrap();
        assert_eq!(zero_width, [0, 0, 0]);
    }

    #[test]
    fn decoding_utf8_code() {
        for x in [
            0u64,
            76,
            195,
            256,
            257,
            1000,
            1023,
            1024,
            65535,
            65536,
            68000,
            68_719_476_735, // 2^36 - 1
        ] {
            let code = encode_to_utf8like(x).expect("encode error");
            let mut reader = BitReader::new(&code);
            assert_eq!(reader.read_utf8().unwrap(), x);
            assert_eq!(reader.remaining_bits(), 0);
        }
    }

    #[test]
    fn malformed_utf8_code() {
        let mut reader = BitReader::new(&[0x80]);
        let err = reader.read_utf8().unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::Counter);

        let mut reader = BitReader::new(&[0xFF, 0x80]);
        assert_eq!(
            reader.read_utf8().unwrap_err().kind(),
            StructuralErrorKind::Counter
        );

        let mut reader = BitReader::new(&[0xE0, 0x80, 0x00]);
        assert_eq!(
            reader.read_utf8().unwrap_err().kind(),
            StructuralErrorKind::Counter
        );
        assert_eq!(reader.bit_position(), 0);

        let mut reader = BitReader::new(&[0xE0, 0x80]);
        assert_eq!(
            reader.read_utf8().unwrap_err().kind(),
            StructuralErrorKind::Truncated
        );
    }
}
