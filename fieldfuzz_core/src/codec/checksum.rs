/// CRC-16 as used on the Modbus serial line: reflected polynomial 0xA001,
/// initial value 0xFFFF, no final xor.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC16 of every byte in `frame` as a little-endian trailer.
pub fn append_crc16(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Odd parity bit for a payload with `ones` set bits: 0 if the count is
/// already odd, 1 otherwise.
#[must_use]
pub fn odd_parity_bit(ones: u32) -> u8 {
    if ones % 2 == 1 { 0 } else { 1 }
}

/// Odd parity bit over all bits of `payload`
#[must_use]
pub fn parity_of(payload: &[u8]) -> u8 {
    odd_parity_bit(payload.iter().map(|b| b.count_ones()).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_matches_the_modbus_check_value() {
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn crc16_of_read_coils_request() {
        // slave 1, read coils, start 0, quantity 10
        let mut frame = vec![0x01, 0x01, 0x00, 0x00, 0x00, 0x0A];
        append_crc16(&mut frame);
        assert_eq!(&frame[6..], &[0xBC, 0x0D]);
    }

    #[test]
    fn empty_input_keeps_the_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn parity_follows_the_odd_convention() {
        assert_eq!(parity_of(&[0x00, 0x00]), 1);
        assert_eq!(parity_of(&[0x01, 0x00]), 0);
        assert_eq!(parity_of(&[0x03, 0x00]), 1);
    }
}
