//! Serial line checksums.

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF), used by RTU frames.
/// Transmitted low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Longitudinal redundancy check used by ASCII frames: the two's complement
/// of the byte sum.
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_known_frame() {
        // Read holding registers, unit 1, address 0, count 1
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(&frame).to_le_bytes(), [0x84, 0x0A]);
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_lrc() {
        // ":F7031389000A" from the serial line guide, LRC 0x60
        let frame = [0xF7, 0x03, 0x13, 0x89, 0x00, 0x0A];
        assert_eq!(lrc(&frame), 0x60);
    }

    #[test]
    fn test_lrc_sum_is_zero() {
        let data = [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03];
        let sum = data
            .iter()
            .fold(lrc(&data), |sum, byte| sum.wrapping_add(*byte));
        assert_eq!(sum, 0);
    }
}
