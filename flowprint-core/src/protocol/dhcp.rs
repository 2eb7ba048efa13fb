//! DHCP (BOOTP) message view.

use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::fingerprint::FingerprintBuffer;
use crate::output::JsonObject;
use crate::protocol::MaskAndValue;

/// BOOTREQUEST from an Ethernet client.
pub const DISCOVER_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x01, 0x01, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00],
);

const MAGIC_COOKIE: u32 = 0x6382_5363;

/// Option codes reported in metadata.
mod option_code {
    pub const PAD: u8 = 0;
    pub const HOST_NAME: u8 = 12;
    pub const REQUESTED_IP: u8 = 50;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;
    pub const VENDOR_CLASS: u8 = 60;
    pub const CLIENT_ID: u8 = 61;
    pub const END: u8 = 255;
}

const METADATA_OPTIONS: [u8; 5] = [
    option_code::HOST_NAME,
    option_code::REQUESTED_IP,
    option_code::MESSAGE_TYPE,
    option_code::VENDOR_CLASS,
    option_code::CLIENT_ID,
];

#[derive(Debug, Clone, Copy)]
pub struct DhcpOption<'a> {
    pub code: u8,
    pub data: &'a [u8],
}

/// DHCP message with its options walked into a bounded list.
#[derive(Debug, Clone)]
pub struct DhcpDiscover<'a> {
    pub op: u8,
    pub chaddr: &'a [u8],
    pub options: SmallVec<[DhcpOption<'a>; 16]>,
    valid: bool,
}

impl<'a> DhcpDiscover<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let empty = DhcpDiscover {
            op: 0,
            chaddr: &[],
            options: SmallVec::new(),
            valid: false,
        };

        let op = c.read_u8();
        let htype = c.read_u8();
        let hlen = c.read_u8() as usize;
        if op != 1 || htype != 1 || hlen != 6 {
            return empty;
        }
        c.skip(1); // hops
        c.skip(4 + 2 + 2); // xid, secs, flags
        c.skip(16); // ciaddr, yiaddr, siaddr, giaddr
        let chaddr = c.read_slice(16);
        c.skip(64 + 128); // sname, file
        if c.read_u32() != MAGIC_COOKIE {
            return empty;
        }

        let mut options = SmallVec::new();
        while c.is_not_empty() && options.len() < 32 {
            let code = c.read_u8();
            match code {
                option_code::PAD => continue,
                option_code::END => {
                    options.push(DhcpOption { code, data: &[] });
                    break;
                }
                _ => {
                    let len = c.read_u8() as usize;
                    let data = c.read_slice(len);
                    if c.is_null() {
                        break;
                    }
                    options.push(DhcpOption {
                        code,
                        data: data.as_slice(),
                    });
                }
            }
        }

        let valid = !options.is_empty();
        DhcpDiscover {
            op,
            chaddr: chaddr.as_slice().get(..hlen).unwrap_or(&[]),
            options,
            valid,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    fn option(&self, code: u8) -> Option<&'a [u8]> {
        self.options
            .iter()
            .find(|o| o.code == code)
            .map(|o| o.data)
    }

    /// `(option_codes)` in observed order, plus `(vendor_class)` when the
    /// client sent one.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        if !self.valid {
            return;
        }
        buf.open();
        for opt in &self.options {
            buf.write_hex(&[opt.code]);
        }
        buf.close();
        if let Some(vendor) = self.option(option_code::VENDOR_CLASS) {
            buf.write_hex_token(vendor);
        }
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        o.print_key_hex("chaddr", self.chaddr);
        if let Some(mt) = self.option(option_code::MESSAGE_TYPE) {
            o.print_key_hex("msg_type", mt);
        }
        let mut opts = o.open_array("options");
        for opt in &self.options {
            let mut entry = opts.open_object();
            entry.print_key_uint("code", opt.code as u64);
            if METADATA_OPTIONS.contains(&opt.code) && !opt.data.is_empty() {
                entry.print_key_hex("data", opt.data);
            }
            entry.close();
        }
        opts.close();
        if let Some(prl) = self.option(option_code::PARAMETER_REQUEST_LIST) {
            o.print_key_hex("parameter_request_list", prl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprint, FingerprintType};

    pub(crate) fn build_discover(options: &[(u8, &[u8])]) -> Vec<u8> {
        let mut pkt = vec![0x01, 0x01, 0x06, 0x00];
        pkt.extend_from_slice(&[0u8; 4 + 2 + 2 + 16]); // xid..giaddr
        pkt.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]); // chaddr
        pkt.extend_from_slice(&[0u8; 10]); // chaddr padding
        pkt.extend_from_slice(&[0u8; 64 + 128]); // sname, file
        pkt.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        for (code, data) in options {
            pkt.push(*code);
            pkt.push(data.len() as u8);
            pkt.extend_from_slice(data);
        }
        pkt.push(option_code::END);
        pkt
    }

    #[test]
    fn test_parse_discover() {
        let pkt = build_discover(&[
            (option_code::MESSAGE_TYPE, &[1]),
            (option_code::PARAMETER_REQUEST_LIST, &[1, 3, 6, 15]),
        ]);
        let mut c = Cursor::new(&pkt);
        let dhcp = DhcpDiscover::parse(&mut c);

        assert!(dhcp.is_not_empty());
        assert_eq!(dhcp.chaddr, &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(dhcp.option(option_code::MESSAGE_TYPE), Some(&[1u8][..]));
    }

    #[test]
    fn test_fingerprint_option_codes() {
        let pkt = build_discover(&[
            (option_code::MESSAGE_TYPE, &[1]),
            (option_code::PARAMETER_REQUEST_LIST, &[1, 3, 6]),
            (option_code::VENDOR_CLASS, b"MSFT 5.0"),
        ]);
        let mut c = Cursor::new(&pkt);
        let dhcp = DhcpDiscover::parse(&mut c);

        let fp = Fingerprint::build(FingerprintType::Dhcp, |b| dhcp.fingerprint(b));
        // codes 53, 55, 60, 255 then the vendor class bytes
        assert_eq!(
            fp.as_str(),
            format!("dhcp/(35373cff)({})", hex::encode(b"MSFT 5.0"))
        );
    }

    #[test]
    fn test_bad_cookie_is_empty() {
        let mut pkt = build_discover(&[(option_code::MESSAGE_TYPE, &[1])]);
        pkt[236] ^= 0xff; // magic cookie sits after the 236-byte header
        let mut c = Cursor::new(&pkt);
        assert!(!DhcpDiscover::parse(&mut c).is_not_empty());
    }

    #[test]
    fn test_non_request_is_empty() {
        let mut pkt = build_discover(&[(option_code::MESSAGE_TYPE, &[1])]);
        pkt[0] = 2; // BOOTREPLY
        let mut c = Cursor::new(&pkt);
        assert!(!DhcpDiscover::parse(&mut c).is_not_empty());
    }
}
