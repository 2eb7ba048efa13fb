//! IPv6 header.

use std::net::{IpAddr, Ipv6Addr};

use crate::cursor::Cursor;

/// Extension headers we step over (at most one set).
const HOP_BY_HOP: u8 = 0;
const ROUTING: u8 = 43;
const DEST_OPTIONS: u8 = 60;

/// Decoded IPv6 header; the cursor is left at the transport header.
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Header {
    pub next_header: u8,
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
}

impl Ipv6Header {
    pub fn parse(c: &mut Cursor<'_>) -> Self {
        let empty = Ipv6Header {
            next_header: 0,
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
        };

        let vers = c.read_u8();
        if vers >> 4 != 6 {
            *c = Cursor::null();
            return empty;
        }
        c.skip(3); // traffic class / flow label
        let payload_length = c.read_u16() as usize;
        let mut next_header = c.read_u8();
        c.skip(1); // hop limit

        let src = read_addr(c);
        let dst = read_addr(c);
        c.trim_to_length(payload_length);

        // step over one chain of options-style extension headers
        while matches!(next_header, HOP_BY_HOP | ROUTING | DEST_OPTIONS) {
            let nh = c.read_u8();
            let hdr_ext_len = c.read_u8() as usize;
            c.skip(6 + hdr_ext_len * 8);
            next_header = nh;
            if c.is_null() {
                break;
            }
        }

        Ipv6Header {
            next_header,
            src_addr: src,
            dst_addr: dst,
        }
    }

    pub fn src(&self) -> IpAddr {
        IpAddr::V6(self.src_addr)
    }

    pub fn dst(&self) -> IpAddr {
        IpAddr::V6(self.dst_addr)
    }
}

fn read_addr(c: &mut Cursor<'_>) -> Ipv6Addr {
    let slice = c.read_slice(16);
    let mut octets = [0u8; 16];
    if slice.len() == 16 {
        octets.copy_from_slice(slice.as_slice());
    }
    Ipv6Addr::from(octets)
}
