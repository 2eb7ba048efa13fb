//! TCP header, flags, and SYN option fingerprint.

use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::fingerprint::{Fingerprint, FingerprintType};

pub const FLAG_FIN: u8 = 0x01;
pub const FLAG_SYN: u8 = 0x02;
pub const FLAG_RST: u8 = 0x04;
pub const FLAG_PSH: u8 = 0x08;
pub const FLAG_ACK: u8 = 0x10;

mod option_kind {
    pub const EOL: u8 = 0;
    pub const NOP: u8 = 1;
    pub const MSS: u8 = 2;
    pub const WINDOW_SCALE: u8 = 3;
}

/// Decoded TCP header; the cursor is left at the payload.
#[derive(Debug, Clone, Copy)]
pub struct TcpHeader<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub flags: u8,
    options: &'a [u8],
}

impl<'a> TcpHeader<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let empty = TcpHeader {
            src_port: 0,
            dst_port: 0,
            seq: 0,
            flags: 0,
            options: &[],
        };

        let src_port = c.read_u16();
        let dst_port = c.read_u16();
        let seq = c.read_u32();
        c.skip(4); // ack number
        let offset_byte = c.read_u8();
        let data_offset = (offset_byte >> 4) as usize;
        let flags = c.read_u8();
        c.skip(4); // window, checksum
        c.skip(2); // urgent pointer

        if data_offset < 5 {
            *c = Cursor::null();
            return empty;
        }
        let options = c.read_slice((data_offset - 5) * 4);

        TcpHeader {
            src_port,
            dst_port,
            seq,
            flags,
            options: options.as_slice(),
        }
    }

    pub fn is_syn(&self) -> bool {
        self.flags & (FLAG_SYN | FLAG_ACK) == FLAG_SYN
    }

    pub fn is_syn_ack(&self) -> bool {
        self.flags & (FLAG_SYN | FLAG_ACK) == FLAG_SYN | FLAG_ACK
    }

    /// Split the options block into one slice per option, in order.
    /// `None` when the block is malformed (missing or impossible length
    /// byte, or an option running past the block).
    fn split_options(&self) -> Option<SmallVec<[&'a [u8]; 8]>> {
        let mut opts = SmallVec::new();
        let mut i = 0;
        while i < self.options.len() {
            let kind = self.options[i];
            match kind {
                option_kind::EOL | option_kind::NOP => {
                    opts.push(&self.options[i..i + 1]);
                    i += 1;
                }
                _ => {
                    let len = *self.options.get(i + 1)? as usize;
                    if len < 2 || i + len > self.options.len() {
                        return None;
                    }
                    opts.push(&self.options[i..i + len]);
                    i += len;
                }
            }
        }
        Some(opts)
    }

    /// SYN fingerprint: one token per TCP option, in order. Options that
    /// carry negotiated values (MSS, window scale) contribute kind, length
    /// and value; everything else contributes its kind byte only, so
    /// per-connection data such as timestamps cannot fragment clusters.
    /// A malformed options block yields the null fingerprint and the
    /// sub-record is dropped.
    pub fn fingerprint(&self) -> Fingerprint {
        let Some(options) = self.split_options() else {
            return Fingerprint::null();
        };
        let fp_type = if self.is_syn_ack() {
            FingerprintType::TcpServer
        } else {
            FingerprintType::Tcp
        };
        Fingerprint::build(fp_type, |buf| {
            for opt in &options {
                let kind = opt[0];
                if kind == option_kind::MSS || kind == option_kind::WINDOW_SCALE {
                    buf.write_hex_token(opt);
                } else {
                    buf.write_hex_token(&[kind]);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_tcp(
        src_port: u16,
        dst_port: u16,
        seq: u32,
        flags: u8,
        options: &[u8],
        payload: &[u8],
    ) -> Vec<u8> {
        assert!(options.len() % 4 == 0);
        let data_offset = 5 + options.len() / 4;
        let mut pkt = Vec::new();
        pkt.extend_from_slice(&src_port.to_be_bytes());
        pkt.extend_from_slice(&dst_port.to_be_bytes());
        pkt.extend_from_slice(&seq.to_be_bytes());
        pkt.extend_from_slice(&[0, 0, 0, 0]); // ack
        pkt.push((data_offset as u8) << 4);
        pkt.push(flags);
        pkt.extend_from_slice(&[0xfa, 0xf0, 0, 0, 0, 0]); // window, csum, urg
        pkt.extend_from_slice(options);
        pkt.extend_from_slice(payload);
        pkt
    }

    #[test]
    fn test_parse_basic_header() {
        let pkt = build_tcp(50000, 443, 0x1a2b3c4d, FLAG_SYN, &[], b"hi");
        let mut c = Cursor::new(&pkt);
        let tcp = TcpHeader::parse(&mut c);

        assert_eq!(tcp.src_port, 50000);
        assert_eq!(tcp.dst_port, 443);
        assert_eq!(tcp.seq, 0x1a2b3c4d);
        assert!(tcp.is_syn());
        assert!(!tcp.is_syn_ack());
        assert_eq!(c.as_slice(), b"hi");
    }

    #[test]
    fn test_syn_fingerprint_options() {
        // MSS(1460), NOP, WS(7), padded with EOL
        let options = [2, 4, 0x05, 0xb4, 1, 3, 3, 7, 0, 0, 0, 0];
        let pkt = build_tcp(1, 2, 0, FLAG_SYN, &options, &[]);
        let mut c = Cursor::new(&pkt);
        let tcp = TcpHeader::parse(&mut c);

        let fp = tcp.fingerprint();
        assert_eq!(fp.as_str(), "tcp/(020405b4)(01)(030307)(00)(00)(00)(00)");
    }

    #[test]
    fn test_syn_ack_fingerprint_type() {
        let pkt = build_tcp(443, 50000, 7, FLAG_SYN | FLAG_ACK, &[], &[]);
        let mut c = Cursor::new(&pkt);
        let tcp = TcpHeader::parse(&mut c);
        assert!(tcp.is_syn_ack());
        assert!(tcp.fingerprint().as_str().starts_with("tcp_server/"));
    }

    #[test]
    fn test_bad_data_offset_rejected() {
        let mut pkt = build_tcp(1, 2, 0, 0, &[], &[]);
        pkt[12] = 0x40; // data offset 4
        let mut c = Cursor::new(&pkt);
        TcpHeader::parse(&mut c);
        assert!(c.is_null());
    }

    #[test]
    fn test_malformed_options_yield_null_fingerprint() {
        // option kind 2 with impossible length 1
        let options = [2, 1, 0, 0];
        let pkt = build_tcp(1, 2, 0, FLAG_SYN, &options, &[]);
        let mut c = Cursor::new(&pkt);
        let tcp = TcpHeader::parse(&mut c);
        assert!(tcp.fingerprint().is_null());
    }

    #[test]
    fn test_option_running_past_block_is_null() {
        // MSS claims 8 bytes but only 4 remain
        let options = [2, 8, 0x05, 0xb4];
        let pkt = build_tcp(1, 2, 0, FLAG_SYN, &options, &[]);
        let mut c = Cursor::new(&pkt);
        let tcp = TcpHeader::parse(&mut c);
        assert!(tcp.fingerprint().is_null());
    }

    #[test]
    fn test_no_options_is_a_valid_fingerprint() {
        let pkt = build_tcp(1, 2, 0, FLAG_SYN, &[], &[]);
        let mut c = Cursor::new(&pkt);
        let tcp = TcpHeader::parse(&mut c);
        let fp = tcp.fingerprint();
        assert!(!fp.is_null());
        assert_eq!(fp.as_str(), "tcp/");
    }
}
