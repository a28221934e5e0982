//! Application data unit framing around a PDU.
//!
//! - serial line: `address | pdu | crc16 (little endian)`
//! - TCP: `transaction id | protocol id (0) | length | unit id | pdu`, big endian,
//!   where length counts the unit id and the pdu

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use fieldfuzz_core::codec::checksum::append_crc16;

/// Size of the MBAP header of Modbus TCP
pub const MBAP_LEN: usize = 7;

/// Wraps `pdu` for the serial line
#[must_use]
pub fn serial_frame(address: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(address);
    frame.extend_from_slice(pdu);
    append_crc16(&mut frame);
    frame
}

/// Wraps `pdu` into a Modbus TCP frame
#[must_use]
pub fn tcp_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = vec![0; MBAP_LEN];
    BigEndian::write_u16(&mut frame[0..2], transaction_id);
    BigEndian::write_u16(&mut frame[2..4], 0);
    BigEndian::write_u16(
        &mut frame[4..6],
        u16::try_from(pdu.len() + 1).unwrap_or(u16::MAX),
    );
    frame[6] = unit_id;
    frame.extend_from_slice(pdu);
    frame
}

/// Serial line frame split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialAdu<'a> {
    /// slave address
    pub address: u8,
    /// function code and data
    pub pdu: &'a [u8],
    /// trailer as found in the frame
    pub crc: u16,
}

impl<'a> SerialAdu<'a> {
    /// Splits a serial frame, `None` if it is shorter than address + crc
    #[must_use]
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        if frame.len() < 3 {
            return None;
        }
        let (body, crc) = frame.split_at(frame.len() - 2);
        Some(Self {
            address: body[0],
            pdu: &body[1..],
            crc: LittleEndian::read_u16(crc),
        })
    }
}

/// Modbus TCP frame split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpAdu<'a> {
    /// transaction identifier
    pub transaction_id: u16,
    /// protocol identifier, 0 for Modbus
    pub protocol_id: u16,
    /// announced length of unit id + pdu
    pub length: u16,
    /// unit identifier
    pub unit_id: u8,
    /// function code and data
    pub pdu: &'a [u8],
}

impl<'a> TcpAdu<'a> {
    /// Splits a TCP frame, `None` if it is shorter than the MBAP header
    #[must_use]
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        if frame.len() < MBAP_LEN {
            return None;
        }
        Some(Self {
            transaction_id: BigEndian::read_u16(&frame[0..2]),
            protocol_id: BigEndian::read_u16(&frame[2..4]),
            length: BigEndian::read_u16(&frame[4..6]),
            unit_id: frame[6],
            pdu: &frame[MBAP_LEN..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_frame_carries_the_crc_trailer() {
        let frame = serial_frame(0x01, &[0x01, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(frame, vec![0x01, 0x01, 0x00, 0x00, 0x00, 0x0A, 0xBC, 0x0D]);
        let adu = SerialAdu::parse(&frame).expect("long enough");
        assert_eq!(adu.address, 1);
        assert_eq!(adu.pdu, &[0x01, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(adu.crc, 0x0DBC);
    }

    #[test]
    fn tcp_frame_has_an_mbap_header() {
        let frame = tcp_frame(0x1234, 0xFF, &[0x03, 0x00, 0x6B, 0x00, 0x03]);
        assert_eq!(
            frame,
            vec![0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0xFF, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
        let adu = TcpAdu::parse(&frame).expect("long enough");
        assert_eq!(adu.transaction_id, 0x1234);
        assert_eq!(adu.length, 6);
        assert_eq!(adu.unit_id, 0xFF);
        assert_eq!(adu.pdu.len(), 5);
    }

    #[test]
    fn short_frames_do_not_parse() {
        assert_eq!(SerialAdu::parse(&[0x01, 0x02]), None);
        assert_eq!(TcpAdu::parse(&[0; 6]), None);
    }
}
