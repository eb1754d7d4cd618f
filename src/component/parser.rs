// Copyright 2024 Google LLC
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

//! Bitstream parsers for frame components.

use crate::bitsource::BitReader;
use crate::constant::panic_msg;
use crate::constant::qlpc::PRECISION_BITS;
use crate::constant::qlpc::SHIFT_BITS;
use crate::constant::rice::ESCAPE_WIDTH_BITS;
use crate::constant::rice::MAX_PARTITION_ORDER;
use crate::error::ChecksumKind;
use crate::error::DecodeError;
use crate::error::IntegrityError;
use crate::error::StructuralError;
use crate::error::StructuralErrorKind;
use crate::rice::PartitionCode;
use crate::rice::RiceMethod;

use super::bitrepr::FRAME_CRC;
use super::bitrepr::HEADER_CRC;
use super::datatype::BlockSizeSpec;
use super::datatype::ChannelAssignment;
use super::datatype::Constant;
use super::datatype::FixedLpc;
use super::datatype::Frame;
use super::datatype::FrameHeader;
use super::datatype::FrameOffset;
use super::datatype::Lpc;
use super::datatype::QuantizedParameters;
use super::datatype::Residual;
use super::datatype::SampleRateSpec;
use super::datatype::SampleSizeSpec;
use super::datatype::SubFrame;
use super::datatype::Verbatim;

const SYNC_CODE: u32 = 0x7FFC;
const SYNC_CODE_BITS: usize = 15;

/// Returns an error of `kind` located at `pos` unless `cond` holds.
#[inline]
fn ensure(cond: bool, kind: StructuralErrorKind, pos: usize) -> Result<(), StructuralError> {
    if cond {
        Ok(())
    } else {
        Err(StructuralError::new(kind, pos))
    }
}

/// Parses a frame header.
///
/// The reader must be byte-aligned at the sync code. The trailing CRC-8 is
/// always consumed, and compared against the header bytes only if
/// `check_crc` is set.
///
/// # Errors
///
/// Returns [`DecodeError::Structural`] for malformed fields, and
/// [`DecodeError::Integrity`] for a CRC mismatch.
///
/// # Examples
///
/// ```
/// # use flakecodec::bitsource::BitReader;
/// # use flakecodec::component::parser::frame_header;
/// # use flakecodec::component::*;
/// let bytes = [0xFF, 0xF8, 0x69, 0x08, 0x00, 0x0F, 0x30];
/// let mut reader = BitReader::new(&bytes);
/// let header = frame_header(&mut reader, true).unwrap();
/// assert_eq!(header.block_size(), 16);
/// assert_eq!(header.sample_rate(), Some(44100));
/// assert_eq!(header.bits_per_sample(), Some(16));
/// assert_eq!(*header.channel_assignment(), ChannelAssignment::Independent(1));
/// assert_eq!(reader.byte_position(), bytes.len());
/// ```
pub fn frame_header(reader: &mut BitReader, check_crc: bool) -> Result<FrameHeader, DecodeError> {
    debug_assert!(reader.is_aligned());
    let start_bit = reader.bit_position();
    let start = start_bit >> 3;

    ensure(
        reader.read_bits(SYNC_CODE_BITS)? == SYNC_CODE,
        StructuralErrorKind::SyncCode,
        start_bit,
    )?;
    let is_variable = reader.read_bool()?;

    let pos = reader.bit_position();
    let block_size_tag = reader.read_bits(4)? as u8;
    let sample_rate_tag = reader.read_bits(4)? as u8;
    let channel_tag = reader.read_bits(4)? as u8;
    let sample_size_tag = reader.read_bits(3)? as u8;
    ensure(
        !reader.read_bool()?,
        StructuralErrorKind::ReservedBit,
        pos + 15,
    )?;

    ensure(block_size_tag != 0, StructuralErrorKind::BlockSizeCode, pos)?;
    ensure(
        sample_rate_tag != 0x0F,
        StructuralErrorKind::SampleRateCode,
        pos + 4,
    )?;
    let channel_assignment = ChannelAssignment::from_tag(channel_tag)
        .ok_or_else(|| StructuralError::new(StructuralErrorKind::ChannelCode, pos + 8))?;
    let sample_size_spec = SampleSizeSpec::from_tag(sample_size_tag)
        .ok_or_else(|| StructuralError::new(StructuralErrorKind::BitDepthCode, pos + 12))?;

    let pos = reader.bit_position();
    let counter = reader.read_utf8()?;
    let offset = if is_variable {
        FrameOffset::StartSample(counter)
    } else {
        let frame_number = u32::try_from(counter)
            .map_err(|_| StructuralError::new(StructuralErrorKind::Counter, pos))?;
        FrameOffset::Frame(frame_number)
    };

    let block_size_data = match block_size_tag {
        6 => Some(reader.read_bits(8)? as u16),
        7 => Some(reader.read_bits(16)? as u16),
        _ => None,
    };
    let block_size_spec = BlockSizeSpec::from_tag_and_data(block_size_tag, block_size_data)
        .expect(panic_msg::DATA_INCONSISTENT);

    let sample_rate_data = match sample_rate_tag {
        12 => Some(reader.read_bits(8)? as u16),
        13 | 14 => Some(reader.read_bits(16)? as u16),
        _ => None,
    };
    let sample_rate_spec = SampleRateSpec::from_tag_and_data(sample_rate_tag, sample_rate_data)
        .expect(panic_msg::DATA_INCONSISTENT);

    let end = reader.byte_position();
    let stored = reader.read_bits(8)? as u8;
    if check_crc {
        let computed = HEADER_CRC.checksum(&reader.as_slice()[start..end]);
        if computed != stored {
            return Err(IntegrityError::new(
                ChecksumKind::HeaderCrc8,
                u16::from(stored),
                u16::from(computed),
            )
            .into());
        }
    }

    Ok(FrameHeader::from_specs(
        block_size_spec,
        channel_assignment,
        sample_size_spec,
        sample_rate_spec,
        offset,
    ))
}

/// Parses a whole frame, including the trailing padding and CRC-16.
///
/// `channels` and `bits_per_sample` describe the PCM format of the stream,
/// which must agree with whatever the header declares. When the header
/// leaves the bit depth unspecified, `bits_per_sample` is used.
///
/// # Errors
///
/// Returns [`DecodeError::Structural`] for malformed or inconsistent fields,
/// and [`DecodeError::Integrity`] for a CRC mismatch when `check_crc` is set.
pub fn frame(
    reader: &mut BitReader,
    channels: usize,
    bits_per_sample: usize,
    check_crc: bool,
) -> Result<Frame, DecodeError> {
    let start = reader.byte_position();
    let header = frame_header(reader, check_crc)?;

    if let Some(bps) = header.bits_per_sample() {
        ensure(
            bps == bits_per_sample,
            StructuralErrorKind::BitDepthMismatch,
            start * 8,
        )?;
    }
    let channel_assignment = *header.channel_assignment();
    ensure(
        channel_assignment.channels() == channels,
        StructuralErrorKind::ChannelMismatch,
        start * 8,
    )?;

    let block_size = header.block_size();
    let mut subframes = Vec::with_capacity(channels);
    for ch in 0..channels {
        let bps = bits_per_sample + channel_assignment.bits_per_sample_offset(ch);
        subframes.push(subframe(reader, block_size, bps)?);
    }

    reader.flush();
    let end = reader.byte_position();
    let stored = reader.read_bits(16)? as u16;
    if check_crc {
        let computed = FRAME_CRC.checksum(&reader.as_slice()[start..end]);
        if computed != stored {
            return Err(IntegrityError::new(ChecksumKind::FrameCrc16, stored, computed).into());
        }
    }
    Ok(Frame::from_parts(header, subframes))
}

/// Parses a subframe coded with `bits_per_sample` bits (wasted bits included).
///
/// # Errors
///
/// Returns `StructuralError` if the subframe is malformed or truncated.
pub fn subframe(
    reader: &mut BitReader,
    block_size: usize,
    bits_per_sample: usize,
) -> Result<SubFrame, StructuralError> {
    let pos = reader.bit_position();
    ensure(!reader.read_bool()?, StructuralErrorKind::ReservedBit, pos)?;
    let type_code = reader.read_bits(6)? as u8;
    let wasted_bits = if reader.read_bool()? {
        reader.read_unary()? + 1
    } else {
        0
    };
    ensure(
        wasted_bits < bits_per_sample,
        StructuralErrorKind::WastedBits,
        pos + 7,
    )?;
    let bps = bits_per_sample - wasted_bits;

    let ret: SubFrame = match type_code {
        0 => constant(reader, block_size, bps)?.into(),
        1 => verbatim(reader, block_size, bps)?.into(),
        8..=12 => {
            let order = (type_code - 8) as usize;
            ensure(
                order <= block_size,
                StructuralErrorKind::PredictorOrder,
                pos + 1,
            )?;
            fixed_lpc(reader, block_size, order, bps)?.into()
        }
        32..=63 => {
            let order = (type_code - 31) as usize;
            ensure(
                order <= block_size,
                StructuralErrorKind::PredictorOrder,
                pos + 1,
            )?;
            lpc(reader, block_size, order, bps)?.into()
        }
        _ => {
            return Err(StructuralError::new(
                StructuralErrorKind::SubFrameType,
                pos + 1,
            ))
        }
    };
    Ok(ret.with_wasted_bits(wasted_bits))
}

fn constant(
    reader: &mut BitReader,
    block_size: usize,
    bits_per_sample: usize,
) -> Result<Constant, StructuralError> {
    let dc_offset = reader.read_signed(bits_per_sample)?;
    Ok(Constant::from_parts(
        block_size,
        dc_offset,
        bits_per_sample as u8,
    ))
}

fn verbatim(
    reader: &mut BitReader,
    block_size: usize,
    bits_per_sample: usize,
) -> Result<Verbatim, StructuralError> {
    if block_size * bits_per_sample > reader.remaining_bits() {
        return Err(reader.error(StructuralErrorKind::Truncated));
    }
    let mut data = vec![0i32; block_size];
    for v in &mut data {
        *v = reader.read_signed(bits_per_sample)?;
    }
    Ok(Verbatim::from_vec(data, bits_per_sample as u8))
}

fn warm_up(
    reader: &mut BitReader,
    order: usize,
    bits_per_sample: usize,
) -> Result<heapless::Vec<i32, 32>, StructuralError> {
    let mut ret = heapless::Vec::new();
    for _ in 0..order {
        ret.push(reader.read_signed(bits_per_sample)?)
            .expect(panic_msg::DATA_INCONSISTENT);
    }
    Ok(ret)
}

fn fixed_lpc(
    reader: &mut BitReader,
    block_size: usize,
    order: usize,
    bits_per_sample: usize,
) -> Result<FixedLpc, StructuralError> {
    let warm_up = warm_up(reader, order, bits_per_sample)?;
    let residual = residual(reader, block_size, order)?;
    Ok(FixedLpc::from_parts(
        &warm_up,
        residual,
        bits_per_sample as u8,
    ))
}

fn lpc(
    reader: &mut BitReader,
    block_size: usize,
    order: usize,
    bits_per_sample: usize,
) -> Result<Lpc, StructuralError> {
    let warm_up = warm_up(reader, order, bits_per_sample)?;

    let pos = reader.bit_position();
    let precision_code = reader.read_bits(PRECISION_BITS)? as usize;
    ensure(
        precision_code != 0x0F,
        StructuralErrorKind::LpcPrecision,
        pos,
    )?;
    let precision = precision_code + 1;
    let pos = reader.bit_position();
    let shift = reader.read_signed(SHIFT_BITS)?;
    ensure(shift >= 0, StructuralErrorKind::LpcShift, pos)?;

    let mut coefs = heapless::Vec::<i16, 32>::new();
    for _ in 0..order {
        coefs
            .push(reader.read_signed(precision)? as i16)
            .expect(panic_msg::DATA_INCONSISTENT);
    }
    let parameters = QuantizedParameters::from_parts(&coefs, shift as i8, precision);
    let residual = residual(reader, block_size, order)?;
    Ok(Lpc::from_parts(
        &warm_up,
        parameters,
        residual,
        bits_per_sample as u8,
    ))
}

/// Parses a partitioned-Rice coded residual of a block.
///
/// The first `warmup_length` values are not in the bitstream and are filled
/// with zeros.
///
/// # Errors
///
/// Returns `StructuralError` if the residual is malformed or truncated.
///
/// # Examples
///
/// ```
/// # use flakecodec::bitsource::BitReader;
/// # use flakecodec::component::parser::residual;
/// // Rice4, order 0, k = 1: 0 -> "10", -1 -> "11", 1 -> "010"
/// let bytes = [0b0000_0000, 0b0110_1101, 0b0000_0000];
/// let mut reader = BitReader::new(&bytes);
/// let residual = residual(&mut reader, 4, 1).unwrap();
/// assert_eq!(residual.residual(0), 0);
/// assert_eq!(residual.residual(1), 0);
/// assert_eq!(residual.residual(2), -1);
/// assert_eq!(residual.residual(3), 1);
/// ```
pub fn residual(
    reader: &mut BitReader,
    block_size: usize,
    warmup_length: usize,
) -> Result<Residual, StructuralError> {
    let pos = reader.bit_position();
    let method = RiceMethod::from_tag(reader.read_bits(2)? as u8)
        .ok_or_else(|| StructuralError::new(StructuralErrorKind::ResidualMethod, pos))?;
    let pos = reader.bit_position();
    let partition_order = reader.read_bits(4)? as usize;
    ensure(
        partition_order <= MAX_PARTITION_ORDER
            && block_size % (1 << partition_order) == 0
            && (block_size >> partition_order) >= warmup_length,
        StructuralErrorKind::PartitionOrder,
        pos,
    )?;

    let nparts = 1usize << partition_order;
    let part_len = block_size >> partition_order;
    let escape_code = method.escape_code();
    let mut codes = heapless::Vec::new();
    let mut residuals = vec![0i32; block_size];
    for p in 0..nparts {
        let start = if p == 0 { warmup_length } else { p * part_len };
        let dest = &mut residuals[start..(p + 1) * part_len];
        let k = reader.read_bits(method.parameter_bits())? as usize;
        let code = if k == escape_code {
            let width = reader.read_bits(ESCAPE_WIDTH_BITS)? as usize;
            if dest.len() * width > reader.remaining_bits() {
                return Err(reader.error(StructuralErrorKind::Truncated));
            }
            for v in dest.iter_mut() {
                *v = reader.read_signed(width)?;
            }
            PartitionCode::Escaped(width as u8)
        } else {
            reader.read_rice_block(dest, k, escape_code)?;
            PartitionCode::Rice(k as u8)
        };
        codes.push(code).expect(panic_msg::PARTITION_OVERFLOW);
    }
    Ok(Residual::from_parts(
        partition_order as u8,
        method,
        codes,
        warmup_length,
        residuals,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::BitRepr;
    use crate::component::Decode;

    use rstest::rstest;

    #[rstest]
    #[case(16, 44100, 16, FrameOffset::Frame(0))]
    #[case(100, 44100, 0, FrameOffset::StartSample(1 << 31))]
    #[case(4000, 11025, 16, FrameOffset::Frame(5))]
    #[case(4608, 64000, 8, FrameOffset::StartSample(4608))]
    #[case(65535, 100_010, 16, FrameOffset::Frame(0x7FFF_FFFF))]
    fn header_fields_are_recovered(
        #[case] block_size: usize,
        #[case] sample_rate: usize,
        #[case] bits_per_sample: usize,
        #[case] offset: FrameOffset,
    ) {
        let header = FrameHeader::new(
            block_size,
            ChannelAssignment::MidSide,
            bits_per_sample,
            sample_rate,
            offset,
        )
        .unwrap();
        let bytes = header.to_bytes();
        let mut reader = BitReader::new(&bytes);
        let parsed = frame_header(&mut reader, true).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(reader.byte_position(), bytes.len());
    }

    #[test]
    fn header_crc_mismatch_is_reported() {
        let bytes = [0xFF, 0xF8, 0x69, 0x08, 0x00, 0x0F, 0x31];
        let err = frame_header(&mut BitReader::new(&bytes), true).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Integrity(IntegrityError::new(ChecksumKind::HeaderCrc8, 0x31, 0x30))
        );
        assert!(frame_header(&mut BitReader::new(&bytes), false).is_ok());
    }

    #[rstest]
    #[case(&[0xFF, 0xF0, 0x69, 0x08, 0x00, 0x00], StructuralErrorKind::SyncCode)]
    #[case(&[0xFF, 0xF8, 0x09, 0x08, 0x00, 0x00], StructuralErrorKind::BlockSizeCode)]
    #[case(&[0xFF, 0xF8, 0x6F, 0x08, 0x00, 0x00], StructuralErrorKind::SampleRateCode)]
    #[case(&[0xFF, 0xF8, 0x69, 0xB8, 0x00, 0x00], StructuralErrorKind::ChannelCode)]
    #[case(&[0xFF, 0xF8, 0x69, 0x06, 0x00, 0x00], StructuralErrorKind::BitDepthCode)]
    #[case(&[0xFF, 0xF8, 0x69, 0x09, 0x00, 0x00], StructuralErrorKind::ReservedBit)]
    #[case(&[0xFF, 0xF8, 0x69, 0x08, 0xFF, 0x00], StructuralErrorKind::Counter)]
    #[case(&[0xFF, 0xF8, 0x69, 0x08], StructuralErrorKind::Truncated)]
    fn malformed_headers(#[case] bytes: &[u8], #[case] expected: StructuralErrorKind) {
        match frame_header(&mut BitReader::new(bytes), false) {
            Err(DecodeError::Structural(e)) => assert_eq!(e.kind(), expected),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn frame_number_must_fit_in_32_bits() {
        let mut bytes = vec![0xFF, 0xF8, 0x69, 0x08];
        bytes.extend_from_slice(&crate::component::encode_to_utf8like(1 << 32).unwrap());
        bytes.push(0x0F);
        bytes.push(0x00);
        match frame_header(&mut BitReader::new(&bytes), false) {
            Err(DecodeError::Structural(e)) => {
                assert_eq!(e.kind(), StructuralErrorKind::Counter);
                assert_eq!(e.bit_position(), 32);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn subframe_types() {
        // reserved bit, type 0b000010, no wasted bits.
        let err = subframe(&mut BitReader::new(&[0x04, 0x00]), 4, 8).unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::SubFrameType);
        let err = subframe(&mut BitReader::new(&[0x80, 0x00]), 4, 8).unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::ReservedBit);
        // fixed order 4 for a 3-sample block.
        let err = subframe(&mut BitReader::new(&[0x18, 0x00]), 3, 8).unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::PredictorOrder);
        // constant with 8 wasted bits out of 8.
        let err = subframe(&mut BitReader::new(&[0x01, 0x01]), 4, 8).unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::WastedBits);
    }

    #[test]
    fn wasted_constant_subframe() {
        // constant, 3 wasted bits ("001"), dc = 0b00101 in 5 bits.
        let bytes = [0b0000_0001, 0b0010_0101];
        let sf = subframe(&mut BitReader::new(&bytes), 4, 8).unwrap();
        assert_eq!(sf.wasted_bits(), 3);
        assert_eq!(sf.bits_per_sample(), 5);
        assert_eq!(sf.decode(), vec![40; 4]);
    }

    #[test]
    fn lpc_parameters() {
        let residual = Residual::new(
            0,
            RiceMethod::Rice4,
            &[PartitionCode::Rice(2)],
            2,
            &[0, 0, 3, -1, 0, 2],
        )
        .unwrap();
        let params = QuantizedParameters::new(&[7, -3], 2, 5).unwrap();
        let sf: SubFrame = Lpc::new(&[10, 12], params, residual, 16).unwrap().into();
        let bytes = sf.to_bytes();
        let parsed = subframe(&mut BitReader::new(&bytes), 6, 16).unwrap();
        assert_eq!(parsed.decode(), sf.decode());
        match parsed {
            SubFrame::Lpc(lpc) => {
                assert_eq!(lpc.parameters().coefs(), &[7, -3]);
                assert_eq!(lpc.parameters().shift(), 2);
                assert_eq!(lpc.parameters().precision(), 5);
            }
            other => panic!("unexpected subframe: {other:?}"),
        }
    }

    #[test]
    fn negative_lpc_shift_is_rejected() {
        // LPC order 1 ("100000"), warm-up 8 bits, precision-1 = 3, shift = -1.
        let bytes = [0b0100_0000, 0b0000_0101, 0b0011_1111, 0b1000_0000, 0x00];
        let err = subframe(&mut BitReader::new(&bytes), 4, 8).unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::LpcShift);
        assert_eq!(err.bit_position(), 20);
    }

    #[test]
    fn escaped_partition_keeps_width() {
        let codes = [PartitionCode::Escaped(4), PartitionCode::Rice(0)];
        let residual = Residual::new(1, RiceMethod::Rice5, &codes, 1, &[0, -8, 0, 0]).unwrap();
        let bytes = residual.to_bytes();
        let parsed = super::residual(&mut BitReader::new(&bytes), 4, 1).unwrap();
        assert_eq!(parsed.method(), RiceMethod::Rice5);
        assert_eq!(parsed.partition_code(0), Some(PartitionCode::Escaped(4)));
        assert_eq!(parsed.partition_code(1), Some(PartitionCode::Rice(0)));
        assert_eq!(parsed.residual(1), -8);
    }

    #[test]
    fn warmup_may_fill_first_partition() {
        let codes = [PartitionCode::Rice(0), PartitionCode::Rice(1)];
        let residual =
            Residual::new(1, RiceMethod::Rice4, &codes, 4, &[0, 0, 0, 0, 1, -1, 2, 0]).unwrap();
        let bytes = residual.to_bytes();
        let parsed = super::residual(&mut BitReader::new(&bytes), 8, 4).unwrap();
        assert_eq!(parsed.warmup_length(), 4);
        assert_eq!(parsed.partition_code(1), Some(PartitionCode::Rice(1)));
        assert_eq!(parsed.decode(), residual.decode());

        // method, order 0, and a parameter for an empty partition.
        let parsed = super::residual(&mut BitReader::new(&[0, 0]), 4, 4).unwrap();
        assert_eq!(parsed.block_size(), 4);
        assert_eq!(parsed.partition_code(0), Some(PartitionCode::Rice(0)));

        let err = super::residual(&mut BitReader::new(&[0, 0]), 4, 5).unwrap_err();
        assert_eq!(err.kind(), StructuralErrorKind::PartitionOrder);
    }

    #[rstest]
    #[case(&[0b1000_0000], StructuralErrorKind::ResidualMethod)]
    #[case(&[0b0010_0100], StructuralErrorKind::PartitionOrder)]
    #[case(&[0b0000_1100], StructuralErrorKind::PartitionOrder)]
    #[case(&[0b0000_0000], StructuralErrorKind::Truncated)]
    fn malformed_residuals(#[case] bytes: &[u8], #[case] expected: StructuralErrorKind) {
        // block of 12 samples with an order-2 predictor.
        let err = residual(&mut BitReader::new(bytes), 12, 2).unwrap_err();
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn frame_checks_pcm_format() {
        let header = FrameHeader::new(
            4,
            ChannelAssignment::Independent(1),
            16,
            44100,
            FrameOffset::Frame(0),
        )
        .unwrap();
        let frame = Frame::new(header, [Constant::new(4, -3, 16).unwrap().into()]).unwrap();
        let mut bytes = frame.to_bytes();

        let parsed = super::frame(&mut BitReader::new(&bytes), 1, 16, true).unwrap();
        assert_eq!(parsed.decode(), vec![-3; 4]);

        match super::frame(&mut BitReader::new(&bytes), 1, 24, true) {
            Err(DecodeError::Structural(e)) => {
                assert_eq!(e.kind(), StructuralErrorKind::BitDepthMismatch);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match super::frame(&mut BitReader::new(&bytes), 2, 16, true) {
            Err(DecodeError::Structural(e)) => {
                assert_eq!(e.kind(), StructuralErrorKind::ChannelMismatch);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        match super::frame(&mut BitReader::new(&bytes), 1, 16, true) {
            Err(DecodeError::Integrity(e)) => assert_eq!(e.kind(), ChecksumKind::FrameCrc16),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(super::frame(&mut BitReader::new(&bytes), 1, 16, false).is_ok());
    }
}
