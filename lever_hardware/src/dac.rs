//! MCP4725 wire format.

/// Default 7-bit I2C address of the MCP4725 breakout.
pub const MCP4725_ADDR: u16 = 0x62;
/// Fast-mode "write DAC register" command byte.
pub const MCP4725_WRITE_DAC: u8 = 0x40;

/// Build the 3-byte write for a 12-bit code. Codes above 4095 are clamped.
#[inline]
pub fn mcp4725_packet(code: u16) -> [u8; 3] {
    let code = code.min(4095);
    [
        MCP4725_WRITE_DAC,
        (code >> 4) as u8,
        ((code & 0x0F) << 4) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::mcp4725_packet;

    #[test]
    fn packs_twelve_bits_msb_first() {
        assert_eq!(mcp4725_packet(0), [0x40, 0x00, 0x00]);
        assert_eq!(mcp4725_packet(4095), [0x40, 0xFF, 0xF0]);
        assert_eq!(mcp4725_packet(2047), [0x40, 0x7F, 0xF0]);
        assert_eq!(mcp4725_packet(0x123), [0x40, 0x12, 0x30]);
    }

    #[test]
    fn clamps_out_of_range_codes() {
        assert_eq!(mcp4725_packet(u16::MAX), mcp4725_packet(4095));
    }
}
