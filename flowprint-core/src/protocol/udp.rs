//! UDP header.

use crate::cursor::Cursor;

/// Decoded UDP header; the cursor is left at the payload, trimmed to the
/// datagram length.
#[derive(Debug, Clone, Copy)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

impl UdpHeader {
    pub fn parse(c: &mut Cursor<'_>) -> Self {
        let src_port = c.read_u16();
        let dst_port = c.read_u16();
        let length = c.read_u16();
        c.skip(2); // checksum

        if length >= 8 {
            c.trim_to_length(length as usize - 8);
        }

        UdpHeader {
            src_port,
            dst_port,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let length = (8 + payload.len()) as u16;
        let mut pkt = Vec::new();
        pkt.extend_from_slice(&src_port.to_be_bytes());
        pkt.extend_from_slice(&dst_port.to_be_bytes());
        pkt.extend_from_slice(&length.to_be_bytes());
        pkt.extend_from_slice(&[0, 0]);
        pkt.extend_from_slice(payload);
        pkt
    }

    #[test]
    fn test_parse_header() {
        let pkt = build_udp(50000, 53, b"abc");
        let mut c = Cursor::new(&pkt);
        let udp = UdpHeader::parse(&mut c);

        assert_eq!(udp.src_port, 50000);
        assert_eq!(udp.dst_port, 53);
        assert_eq!(udp.length, 11);
        assert_eq!(c.as_slice(), b"abc");
    }

    #[test]
    fn test_truncated_header_is_null() {
        let pkt = [0u8; 6];
        let mut c = Cursor::new(&pkt);
        UdpHeader::parse(&mut c);
        assert!(c.is_null());
    }
}
