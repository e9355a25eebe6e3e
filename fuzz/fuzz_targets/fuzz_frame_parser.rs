#![no_main]
use libfuzzer_sys::fuzz_target;
use lever_core::protocol::{crc16, parse_frame};

fuzz_target!(|data: &[u8]| {
    // Whatever parses must carry a CRC that matches its own bytes.
    if let Ok((cmd, payload)) = parse_frame(data) {
        assert_eq!(data[1], cmd.0);
        assert_eq!(payload.len() + 4, data.len());
        let n = data.len();
        let got = u16::from_be_bytes([data[n - 2], data[n - 1]]);
        assert_eq!(crc16(&data[..n - 2]), got);
    }
});
