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

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use flakecodec::component::Decode;
use flakecodec::config;
use flakecodec::source::PcmFormat;
use flakecodec::FrameDecoder;

#[derive(Arbitrary, Debug)]
struct Input {
    channels: u8,
    bits_per_sample: u8,
    verify_checksums: bool,
    bytes: Vec<u8>,
}

// Arbitrary bytes must never make the decoder panic.
fuzz_target!(|input: Input| {
    let Ok(format) = PcmFormat::new(
        usize::from(input.bits_per_sample),
        usize::from(input.channels),
        44100,
    ) else {
        return;
    };
    let config = config::Decoder {
        verify_checksums: input.verify_checksums,
    };
    let mut decoder = FrameDecoder::new(config, format).unwrap();
    if let Ok((frame, consumed)) = decoder.parse_frame(&input.bytes) {
        assert!(consumed <= input.bytes.len());
        assert_eq!(
            frame.decode().len(),
            frame.block_size() * format.channels()
        );
    }
});
