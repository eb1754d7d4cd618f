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

//! Components of a frame, and their bitstream representations.

mod bitrepr;
mod datatype;
mod decode;
pub mod parser;
mod verify;

pub use bitrepr::*;
pub use datatype::*;
pub use decode::*;

pub(crate) use decode::needs_wide_accumulator;
pub(crate) use decode::restore_stereo;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitsource::BitReader;
    use crate::error::Verify;
    use crate::rice::find_partitioned_rice_parameter;
    use crate::rice::PartitionCode;
    use crate::rice::RiceMethod;

    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    fn random_residual(rng: &mut StdRng, block_size: usize, order: usize) -> Residual {
        let mut residuals: Vec<i32> = (0..block_size)
            .map(|t| {
                let scale = if t < block_size / 2 { 16 } else { 4096 };
                rng.gen_range(-scale..scale)
            })
            .collect();
        residuals[..order].fill(0);
        let prc = find_partitioned_rice_parameter(&residuals, order, 0, 8, false);
        Residual::new(prc.order, prc.method, &prc.codes, order, &residuals)
            .expect("should construct a valid Residual")
    }

    fn test_frame(rng: &mut StdRng) -> Frame {
        let block_size = 64;
        let header = FrameHeader::new(
            block_size,
            ChannelAssignment::Independent(4),
            16,
            48000,
            FrameOffset::Frame(3),
        )
        .unwrap();
        let samples: Vec<i32> = (0..block_size).map(|_| rng.gen_range(-300..300)).collect();
        let params = QuantizedParameters::new(&[9, -4, 1], 3, 6).unwrap();
        let subframes: [SubFrame; 4] = [
            Constant::new(block_size, -17, 16).unwrap().into(),
            Verbatim::new(&samples, 16).unwrap().into(),
            FixedLpc::new(&[5, 7], random_residual(rng, block_size, 2), 16)
                .unwrap()
                .into(),
            Lpc::new(&[1, -1, 2], params, random_residual(rng, block_size, 3), 16)
                .unwrap()
                .into(),
        ];
        Frame::new(header, subframes).unwrap()
    }

    #[test]
    fn bit_counters_agree_with_writers() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let frame = test_frame(&mut rng);
        assert!(frame.verify_bit_counter().is_ok());
        assert!(frame.header().verify_bit_counter().is_ok());
        for sf in frame.subframes() {
            assert!(sf.verify_bit_counter().is_ok());
        }
        assert_eq!(frame.count_bits() % 8, 0);
    }

    #[test]
    fn written_frame_is_parsed_back() {
        let mut rng = StdRng::seed_from_u64(42);
        let frame = test_frame(&mut rng);
        frame.verify().unwrap();
        let bytes = frame.to_bytes();
        let mut reader = BitReader::new(&bytes);
        let parsed = parser::frame(&mut reader, 4, 16, true).unwrap();
        assert_eq!(reader.byte_position(), bytes.len());
        assert_eq!(parsed.header(), frame.header());
        assert_eq!(parsed.decode(), frame.decode());
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn random_residual_bit_count() {
        let mut rng = StdRng::seed_from_u64(7);
        for order in [0, 1, 4, 12] {
            let residual = random_residual(&mut rng, 256, order);
            residual.verify().unwrap();
            assert!(residual.verify_bit_counter().is_ok());
        }
    }

    #[test]
    fn escaped_zero_partition_is_parsed() {
        let residual = Residual::new(
            2,
            RiceMethod::Rice4,
            &[
                PartitionCode::Escaped(0),
                PartitionCode::Rice(3),
                PartitionCode::Escaped(0),
                PartitionCode::Rice(0),
            ],
            2,
            &[0, 0, 0, 0, 9, -9, 3, 1, 0, 0, 0, 0, 1, 0, -1, 0],
        )
        .unwrap();
        let bytes = residual.to_bytes();
        let parsed = parser::residual(&mut BitReader::new(&bytes), 16, 2).unwrap();
        assert_eq!(parsed.decode(), residual.decode());
        assert_eq!(parsed.count_bits(), residual.count_bits());
    }
}
