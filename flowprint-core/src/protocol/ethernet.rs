//! Ethernet frame header.

use crate::cursor::Cursor;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;
pub const ETHERTYPE_VLAN: u16 = 0x8100;

/// Decoded Ethernet header; one 802.1Q tag is skipped transparently.
#[derive(Debug, Clone, Copy)]
pub struct EthernetHeader {
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn parse(c: &mut Cursor<'_>) -> Self {
        c.skip(12); // dst mac, src mac
        let mut ethertype = c.read_u16();
        if ethertype == ETHERTYPE_VLAN {
            c.skip(2); // tag control
            ethertype = c.read_u16();
        }
        EthernetHeader { ethertype }
    }

    pub fn is_not_empty(&self, c: &Cursor<'_>) -> bool {
        !c.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_frame() {
        let mut frame = vec![0xffu8; 12];
        frame.extend_from_slice(&[0x08, 0x00, 0x45]);

        let mut c = Cursor::new(&frame);
        let eth = EthernetHeader::parse(&mut c);
        assert_eq!(eth.ethertype, ETHERTYPE_IPV4);
        assert_eq!(c.len(), 1); // payload remains
    }

    #[test]
    fn test_parse_vlan_tagged() {
        let mut frame = vec![0x00u8; 12];
        frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x64, 0x86, 0xdd]);

        let mut c = Cursor::new(&frame);
        let eth = EthernetHeader::parse(&mut c);
        assert_eq!(eth.ethertype, ETHERTYPE_IPV6);
    }

    #[test]
    fn test_truncated_frame_is_null() {
        let frame = [0u8; 10];
        let mut c = Cursor::new(&frame);
        let eth = EthernetHeader::parse(&mut c);
        assert!(c.is_null());
        assert!(!eth.is_not_empty(&c));
    }
}
