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

//! Abstract interface for bit-based output.

use std::convert::Infallible;

use super::rice::encode_signbit;

/// Trait for the bit-addressible unsigned integers.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`u8`], [`u16`], [`u32`], and [`u64`].
pub trait Bits: seal_bits::Sealed {}

impl<T: seal_bits::Sealed> Bits for T {}

/// Trait for the signed integers that can be provided to bitsink.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`i8`], [`i16`], [`i32`], and [`i64`].
pub trait SignedBits: seal_signed_bits::Sealed {}

impl<T: seal_signed_bits::Sealed> SignedBits for T {}

/// Storage-agnostic interface trait for bit-based output.
///
/// The encoder repeatedly generates arrays of code bits that are typically
/// smaller than a byte (8 bits).  Type implementing `BitSink` is used to
/// arrange those bits typically in bytes, and transfer them to the backend
/// storage. [`ByteSink`] is a standard implementation of `BitSink` that stores
/// code bits to a `Vec` of [`u8`]s.
pub trait BitSink: Sized {
    /// Error type that may happen while writing bits to `BitSink`.
    type Error: std::error::Error;

    /// Puts zeros to `BitSink` until the length aligns to the byte boundaries.
    ///
    /// # Returns
    ///
    /// The number of zeros put.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    /// let mut sink = ByteSink::new();
    ///
    /// sink.write_lsbs(0xFFu8, 3)?;
    /// assert_eq!(sink.len(), 3);
    ///
    /// let pads = sink.align_to_byte()?;
    /// assert_eq!(pads, 5);
    /// assert_eq!(sink.len(), 8);
    /// # Ok(())}
    /// ```
    fn align_to_byte(&mut self) -> Result<usize, Self::Error>;

    /// Writes bytes after alignment, and returns padded bits.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// # use flakecodec::bitsink::{ByteSink, BitSink};
    /// let mut sink = ByteSink::new();
    ///
    /// sink.write_lsbs(0xFFu8, 3)?;
    /// sink.write_bytes_aligned(&[0xB7, 0x7D])?;
    ///
    /// assert_eq!(sink.to_bitstring(), "11100000_10110111_01111101");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        for b in bytes {
            self.write(*b)?;
        }
        Ok(ret)
    }

    /// Writes `n` LSBs to the sink.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_lsbs(0x0Fu8, 3)?;
    ///
    /// assert_eq!(sink.len(), 3);
    /// assert_eq!(sink.to_bitstring(), "111*****");
    /// # Ok(())}
    /// ```
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error>;

    /// Writes `n` MSBs to the sink.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3)?;
    ///
    /// assert_eq!(sink.to_bitstring(), "111*****");
    /// # Ok(())}
    /// ```
    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error>;

    /// Writes all bits in `val: Bits`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3)?;
    ///
    /// sink.write(0x5555u16)?;
    ///
    /// assert_eq!(sink.to_bitstring(), "11101010_10101010_101*****");
    /// # Ok(())}
    /// ```
    fn write<T: Bits>(&mut self, val: T) -> Result<(), Self::Error>;

    /// Writes `val` in two's coplement format.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3)?;
    ///
    /// // two's complement of 00011 in 11101
    /// sink.write_twoc(-3i32, 5)?;
    /// assert_eq!(sink.to_bitstring(), "11111101");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_twoc<T: SignedBits>(
        &mut self,
        val: T,
        bits_per_sample: usize,
    ) -> Result<(), Self::Error> {
        if bits_per_sample == 0 {
            return Ok(());
        }
        let val: i64 = val.into();
        let shifted = (val << (64 - bits_per_sample)) as u64;
        self.write_msbs(shifted, bits_per_sample)
    }

    /// Writes `n`-bits of zeros.
    ///
    /// A default implementation using `write_msbs` is provided. An impl can
    /// provide a faster short-cut for writing zeros.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3)?;
    ///
    /// sink.write_zeros(6)?;
    /// assert_eq!(sink.to_bitstring(), "11100000_0*******");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        let mut n = n;
        while n > 64 {
            self.write(0u64)?;
            n -= 64;
        }
        self.write_msbs(0u64, n)?;
        Ok(())
    }

    /// Writes `q` in unary code, i.e. `q` zeros followed by a one.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_unary(3)?;
    /// sink.write_unary(0)?;
    /// assert_eq!(sink.to_bitstring(), "00011***");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_unary(&mut self, q: usize) -> Result<(), Self::Error> {
        self.write_zeros(q)?;
        self.write_lsbs(1u8, 1)
    }

    /// Writes the zigzag-mapped `v` in unary code.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    #[inline]
    fn write_unary_signed(&mut self, v: i32) -> Result<(), Self::Error> {
        self.write_unary(encode_signbit(v) as usize)
    }

    /// Writes the zigzag-mapped `v` in Rice code with the parameter `k`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flakecodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// // -3 maps to 5 = 0b1_01: quotient 1 and remainder 01 for k = 2.
    /// sink.write_rice_signed(2, -3)?;
    /// assert_eq!(sink.to_bitstring(), "0101****");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_rice_signed(&mut self, k: usize, v: i32) -> Result<(), Self::Error> {
        let u = u64::from(encode_signbit(v));
        self.write_zeros((u >> k) as usize)?;
        let mask = (1u64 << k) - 1;
        self.write_lsbs((1u64 << k) | (u & mask), k + 1)
    }

    /// Writes all the values in `vals` in Rice code with the parameter `k`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    #[inline]
    fn write_rice_block_signed(&mut self, k: usize, vals: &[i32]) -> Result<(), Self::Error> {
        for v in vals {
            self.write_rice_signed(k, *v)?;
        }
        Ok(())
    }
}

/// `BitSink` implementation based on [`Vec`] of [`u8`]s.
///
/// Since this type stores code bits in [`u8`]s, the internal buffer can
/// directly be written to, e.g. [`std::io::Write`] via [`write_all`] method.
///
/// A sink made with [`ByteSink::bounded`] silently drops every write that
/// would exceed the limit and raises the [`overflowed`] flag instead.
///
/// [`write_all`]: std::io::Write::write_all
/// [`overflowed`]: ByteSink::overflowed
#[derive(Clone, Debug, Default)]
pub struct ByteSink {
    storage: Vec<u8>,
    bitlength: usize,
    limit_bits: Option<usize>,
    overflowed: bool,
}

impl ByteSink {
    /// Creates new `ByteSink` instance with the default capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsink::*;
    /// let sink = ByteSink::new();
    /// let empty: [u8; 0] = [];
    /// assert_eq!(&empty, sink.as_slice());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates new `ByteSink` instance with the specified capacity (in bits).
    pub fn with_capacity(capacity_in_bits: usize) -> Self {
        Self {
            storage: Vec::with_capacity((capacity_in_bits >> 3) + 1),
            ..Self::default()
        }
    }

    /// Creates a `ByteSink` that holds at most `limit_bytes` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// # use flakecodec::bitsink::*;
    /// let mut sink = ByteSink::bounded(1);
    /// sink.write(0xABu8)?;
    /// assert!(!sink.overflowed());
    /// sink.write_lsbs(1u8, 1)?;
    /// assert!(sink.overflowed());
    /// assert_eq!(sink.as_slice(), &[0xAB]);
    /// # Ok(())}
    /// ```
    pub fn bounded(limit_bytes: usize) -> Self {
        Self {
            storage: Vec::with_capacity(limit_bytes),
            limit_bits: Some(limit_bytes * 8),
            ..Self::default()
        }
    }

    /// Returns true if a write has been dropped due to the size limit.
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Clears the buffer and the overflow flag, keeping the size limit.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_lsbs(0xAAAAAAAAu32, 14);
    /// assert_eq!(sink.to_bitstring(), "10101010_101010**");
    /// sink.clear();
    /// assert_eq!(sink.to_bitstring(), "");
    /// ```
    pub fn clear(&mut self) {
        self.storage.clear();
        self.bitlength = 0;
        self.overflowed = false;
    }

    /// Returns the number of bits stored in the buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write(0u64);
    /// sink.write_msbs(0u8, 6);
    /// assert_eq!(sink.len(), 70)
    /// ```
    pub fn len(&self) -> usize {
        self.bitlength
    }

    /// Checks if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bitlength == 0
    }

    /// Returns the remaining number of bits in the last byte.
    #[inline]
    const fn paddings(&self) -> usize {
        ((!self.bitlength).wrapping_add(1)) & 7
    }

    /// Checks the size limit before writing `n` more bits.
    #[inline]
    fn admit(&mut self, n: usize) -> bool {
        if self.overflowed {
            return false;
        }
        if let Some(limit) = self.limit_bits {
            if self.bitlength + n > limit {
                self.overflowed = true;
                return false;
            }
        }
        true
    }

    /// Returns bits in a string.
    ///
    /// This function formats an internal buffer state to a human-readable
    /// string. Each byte is shown in eight characters joined by `'_'`, and the
    /// last bits of the last byte that are not yet filled are shown as `'*'`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0x3456u16, 13);
    /// assert_eq!(sink.to_bitstring(), "00110100_01010***");
    /// ```
    pub fn to_bitstring(&self) -> String {
        let mut ret = String::new();
        for b in &self.storage {
            ret.push_str(&format!("{b:08b}"));
            ret.push('_');
        }
        ret.pop();

        for _t in 0..self.paddings() {
            ret.pop();
        }
        for _t in 0..self.paddings() {
            ret.push('*');
        }
        ret
    }

    /// Consumes `ByteSink` and returns the internal buffer.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.storage
    }

    /// Returns a reference to the internal bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0x3456u16, 13);
    /// assert_eq!(sink.as_slice(), &[0x34, 0x50]);
    /// ```
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }
}

impl BitSink for ByteSink {
    type Error = Infallible;

    #[inline]
    fn write<T: Bits>(&mut self, val: T) -> Result<(), Self::Error> {
        self.write_msbs(val, T::BITS)
    }

    #[inline]
    fn align_to_byte(&mut self) -> Result<usize, Self::Error> {
        let r = self.paddings();
        if self.overflowed {
            return Ok(0);
        }
        self.bitlength += r;
        Ok(r)
    }

    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        if self.admit(8 * bytes.len()) {
            self.storage.extend_from_slice(bytes);
            self.bitlength += 8 * bytes.len();
        }
        Ok(ret)
    }

    #[inline]
    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        if n == 0 || !self.admit(n) {
            return Ok(());
        }
        let mut val: u64 = val.into() << (64 - T::BITS);
        if n < 64 {
            val &= !(u64::MAX >> n);
        }
        let mut n = n;
        let r = self.paddings();
        if r != 0 {
            if let Some(last) = self.storage.last_mut() {
                *last |= (val >> (64 - r)) as u8;
            }
            if r >= n {
                self.bitlength += n;
                return Ok(());
            }
            val <<= r;
            n -= r;
            self.bitlength += r;
        }
        while n >= 8 {
            self.storage.push((val >> 56) as u8);
            val <<= 8;
            n -= 8;
            self.bitlength += 8;
        }
        if n > 0 {
            self.storage.push((val >> 56) as u8);
            self.bitlength += n;
        }
        Ok(())
    }

    #[inline]
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        if n == 0 {
            return Ok(());
        }
        self.write_msbs(val << (T::BITS - n), n)
    }

    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        if n == 0 || !self.admit(n) {
            return Ok(());
        }
        let pad = self.paddings();
        if n <= pad {
            self.bitlength += n;
            return Ok(());
        }
        self.bitlength += pad;
        let n = n - pad;

        let bytes = (n + 7) >> 3;
        self.storage.resize(self.storage.len() + bytes, 0u8);
        self.bitlength += n;

        Ok(())
    }
}

mod seal_bits {
    use num_traits::PrimInt;
    pub trait Sealed: From<u8> + Into<u64> + PrimInt + std::ops::Shl<usize, Output = Self> {
        /// The number of bits in the type.
        const BITS: usize = 1usize << Self::BITS_LOG2;
        /// `ilog2` of `Self::BITS`.
        #[rustversion::since(1.67)]
        const BITS_LOG2: usize = (std::mem::size_of::<Self>() * 8).ilog2() as usize;
        #[rustversion::before(1.67)]
        const BITS_LOG2: usize = 3 + std::mem::size_of::<Self>().trailing_zeros() as usize;
    }

    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

mod seal_signed_bits {
    pub trait Sealed: Into<i64> {}

    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_byte() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_lsbs(0x01u8, 1)?;
        sink.align_to_byte()?;
        assert_eq!(sink.len(), 8);
        sink.align_to_byte()?;
        assert_eq!(sink.len(), 8);
        sink.write_lsbs(0x01u8, 2)?;
        assert_eq!(sink.len(), 10);
        sink.align_to_byte()?;
        assert_eq!(sink.len(), 16);
        Ok(())
    }

    #[test]
    fn twoc_writing() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_twoc(-7, 4)?;
        assert_eq!(sink.to_bitstring(), "1001****");
        sink.write_twoc(-1i32, 0)?;
        assert_eq!(sink.len(), 4);
        Ok(())
    }

    #[test]
    fn bytevec_write_msb() -> Result<(), Infallible> {
        let mut bv = ByteSink::new();
        bv.write_msbs(0xFFu8, 3)?;
        bv.write_msbs(0x0u64, 12)?;
        bv.write_msbs(0xFFFF_FFFFu32, 9)?;
        bv.write_msbs(0x0u16, 8)?;
        assert_eq!(bv.to_bitstring(), "11100000_00000001_11111111_00000000");

        let mut bv = ByteSink::new();
        bv.write_msbs(0xA0u8, 3)?;
        assert_eq!(bv.to_bitstring(), "101*****");

        let mut bv = ByteSink::new();
        bv.write_msbs(0x00u8, 2)?;
        bv.write_msbs(0xFFu8, 3)?;
        bv.write_msbs(0x00u8, 2)?;
        assert_eq!(bv.to_bitstring(), "0011100*");

        Ok(())
    }

    #[test]
    fn bytevec_write_lsb() -> Result<(), Infallible> {
        let mut bv = ByteSink::new();
        bv.write_lsbs(0xFFu8, 3)?;
        bv.write_lsbs(0x0u64, 12)?;
        bv.write_lsbs(0xFFFF_FFFFu32, 9)?;
        bv.write_lsbs(0x0u16, 8)?;
        assert_eq!(bv.to_bitstring(), "11100000_00000001_11111111_00000000");

        let mut bv = ByteSink::new();
        bv.write_lsbs(0xFFu8, 3)?;
        bv.write_lsbs(0x0u64, 12)?;
        bv.write_lsbs(0xFFFF_FFFFu32, 9)?;
        bv.write_lsbs(0x0u16, 5)?;
        assert_eq!(bv.to_bitstring(), "11100000_00000001_11111111_00000***");
        Ok(())
    }

    #[test]
    fn full_width_writes() -> Result<(), Infallible> {
        let mut bv = ByteSink::new();
        bv.write_lsbs(1u8, 1)?;
        bv.write(0xCAFE_FEED_BEEF_FACEu64)?;
        assert_eq!(bv.len(), 65);
        assert_eq!(
            bv.as_slice(),
            &[0xE5, 0x7F, 0x7F, 0x76, 0xDF, 0x77, 0xFD, 0x67, 0x00]
        );
        Ok(())
    }

    #[test]
    fn rice_block_writing() -> Result<(), Infallible> {
        let mut bv = ByteSink::new();
        // zigzag: 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3
        bv.write_rice_block_signed(1, &[0, -1, 1, -2])?;
        // 0: q=0 r=0 "10"; 1: q=0 r=1 "11"; 2: q=1 r=0 "010"; 3: q=1 r=1 "011"
        assert_eq!(bv.to_bitstring(), "10110100_11******");

        let mut bv = ByteSink::new();
        bv.write_rice_signed(0, 40)?;
        assert_eq!(bv.len(), 81);
        Ok(())
    }

    #[test]
    fn unary_signed_writing() -> Result<(), Infallible> {
        let mut bv = ByteSink::new();
        bv.write_unary_signed(-2)?;
        assert_eq!(bv.to_bitstring(), "0001****");
        Ok(())
    }

    #[test]
    fn bounded_sink_drops_excess_bits() -> Result<(), Infallible> {
        let mut bv = ByteSink::bounded(2);
        bv.write_lsbs(0x3u8, 2)?;
        bv.write_zeros(20)?;
        assert!(bv.overflowed());
        assert_eq!(bv.len(), 2);
        // writes after overflow are ignored too.
        bv.write(0xFFu8)?;
        assert_eq!(bv.len(), 2);
        bv.clear();
        assert!(!bv.overflowed());
        bv.write_bytes_aligned(&[1, 2])?;
        assert_eq!(bv.as_slice(), &[1, 2]);
        assert!(!bv.overflowed());
        Ok(())
    }
}
