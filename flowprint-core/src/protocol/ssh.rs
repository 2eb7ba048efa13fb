//! SSH identification banner and KEXINIT views.

use crate::cursor::Cursor;
use crate::fingerprint::FingerprintBuffer;
use crate::output::JsonObject;
use crate::protocol::MaskAndValue;

/// KEXINIT message type.
const SSH_MSG_KEXINIT: u8 = 20;

pub const INIT_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00],
    [b'S', b'S', b'H', b'-', 0x00, 0x00, 0x00, 0x00],
);

/// Binary-packet KEXINIT: 4-byte length, padding length, type 20.
pub const KEX_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00],
);

/// Protocol identification line (`SSH-2.0-software comments`).
#[derive(Debug, Clone, Copy)]
pub struct SshInit<'a> {
    pub banner: &'a [u8],
}

impl<'a> SshInit<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let line = c.read_up_to_delim(b'\n');
        let mut banner = line.as_slice();
        if banner.ends_with(b"\r") {
            banner = &banner[..banner.len() - 1];
        }
        if !banner.starts_with(b"SSH-") {
            banner = &[];
        }
        SshInit { banner }
    }

    pub fn is_not_empty(&self) -> bool {
        !self.banner.is_empty()
    }

    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        buf.write_hex_token(self.banner);
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.is_not_empty() {
            return;
        }
        let mut ssh = o.open_object("init");
        ssh.print_key_json_string("protocol", self.banner);
        ssh.close();
    }
}

/// The ten KEXINIT name-lists, in wire order.
const NAME_LIST_COUNT: usize = 10;

/// KEXINIT message: cookie plus algorithm name-lists.
#[derive(Debug, Clone, Copy)]
pub struct SshKexInit<'a> {
    lists: [&'a [u8]; NAME_LIST_COUNT],
    valid: bool,
}

/// Indices into the name-list array.
mod list {
    pub const KEX: usize = 0;
    pub const HOST_KEY: usize = 1;
    pub const ENC_C2S: usize = 2;
    pub const ENC_S2C: usize = 3;
    pub const MAC_C2S: usize = 4;
    pub const MAC_S2C: usize = 5;
    pub const COMP_C2S: usize = 6;
    pub const COMP_S2C: usize = 7;
}

impl<'a> SshKexInit<'a> {
    /// Parse a binary packet carrying KEXINIT.
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let empty = SshKexInit {
            lists: [&[]; NAME_LIST_COUNT],
            valid: false,
        };

        let packet_length = c.read_u32() as usize;
        let padding_length = c.read_u8() as usize;
        if packet_length < padding_length + 2 {
            return empty;
        }
        let msg_type = c.read_u8();
        if msg_type != SSH_MSG_KEXINIT {
            return empty;
        }
        c.skip(16); // cookie

        let mut lists = [&[] as &[u8]; NAME_LIST_COUNT];
        for slot in lists.iter_mut() {
            let len = c.read_u32() as usize;
            *slot = c.read_slice(len).as_slice();
        }
        // first_kex_packet_follows + reserved are not needed

        SshKexInit {
            lists,
            valid: !c.is_null(),
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    pub fn kex_algorithms(&self) -> &'a [u8] {
        self.lists[list::KEX]
    }

    /// Eight hex tokens: kex, host key, then the client/server pairs for
    /// encryption, MAC and compression. Language lists are excluded.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        if !self.valid {
            return;
        }
        for slot in [
            list::KEX,
            list::HOST_KEY,
            list::ENC_C2S,
            list::ENC_S2C,
            list::MAC_C2S,
            list::MAC_S2C,
            list::COMP_C2S,
            list::COMP_S2C,
        ] {
            buf.write_hex_token(self.lists[slot]);
        }
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        let mut kex = o.open_object("kex");
        kex.print_key_json_string("kex_algorithms", self.lists[list::KEX]);
        kex.print_key_json_string("server_host_key_algorithms", self.lists[list::HOST_KEY]);
        kex.print_key_json_string("encryption_algorithms_client_to_server", self.lists[list::ENC_C2S]);
        kex.print_key_json_string("encryption_algorithms_server_to_client", self.lists[list::ENC_S2C]);
        kex.print_key_json_string("mac_algorithms_client_to_server", self.lists[list::MAC_C2S]);
        kex.print_key_json_string("mac_algorithms_server_to_client", self.lists[list::MAC_S2C]);
        kex.print_key_json_string("compression_algorithms_client_to_server", self.lists[list::COMP_C2S]);
        kex.print_key_json_string("compression_algorithms_server_to_client", self.lists[list::COMP_S2C]);
        kex.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprint, FingerprintType};

    fn build_kexinit(lists: [&[u8]; 10]) -> Vec<u8> {
        let mut payload = vec![SSH_MSG_KEXINIT];
        payload.extend_from_slice(&[0xaa; 16]); // cookie
        for l in lists {
            payload.extend_from_slice(&(l.len() as u32).to_be_bytes());
            payload.extend_from_slice(l);
        }
        payload.push(0); // first_kex_packet_follows
        payload.extend_from_slice(&[0; 4]); // reserved

        let padding = 4usize;
        let packet_length = payload.len() + padding + 1;
        let mut pkt = (packet_length as u32).to_be_bytes().to_vec();
        pkt.push(padding as u8);
        pkt.extend_from_slice(&payload);
        pkt.extend_from_slice(&vec![0; padding]);
        pkt
    }

    #[test]
    fn test_banner() {
        let data = b"SSH-2.0-OpenSSH_8.9p1 Ubuntu\r\nrest";
        let mut c = Cursor::new(&data[..]);
        let init = SshInit::parse(&mut c);
        assert!(init.is_not_empty());
        assert_eq!(init.banner, b"SSH-2.0-OpenSSH_8.9p1 Ubuntu");
    }

    #[test]
    fn test_non_banner_is_empty() {
        let data = b"HELLO\r\n";
        let mut c = Cursor::new(&data[..]);
        assert!(!SshInit::parse(&mut c).is_not_empty());
    }

    #[test]
    fn test_kexinit_lists() {
        let pkt = build_kexinit([
            b"curve25519-sha256",
            b"ssh-ed25519",
            b"aes128-ctr",
            b"aes128-ctr",
            b"hmac-sha2-256",
            b"hmac-sha2-256",
            b"none",
            b"none",
            b"",
            b"",
        ]);
        let mut c = Cursor::new(&pkt);
        let kex = SshKexInit::parse(&mut c);
        assert!(kex.is_not_empty());
        assert_eq!(kex.kex_algorithms(), b"curve25519-sha256");
    }

    #[test]
    fn test_kexinit_fingerprint_has_eight_tokens() {
        let pkt = build_kexinit([
            b"kex", b"hk", b"e1", b"e2", b"m1", b"m2", b"c1", b"c2", b"l1", b"l2",
        ]);
        let mut c = Cursor::new(&pkt);
        let kex = SshKexInit::parse(&mut c);
        let fp = Fingerprint::build(FingerprintType::SshKex, |b| kex.fingerprint(b));

        assert_eq!(fp.as_str().matches('(').count(), 8);
        // language lists are never fingerprinted
        assert!(!fp.as_str().contains(&hex::encode(b"l1")));
    }

    #[test]
    fn test_wrong_msg_type_is_empty() {
        let mut pkt = build_kexinit([b""; 10]);
        pkt[5] = 21; // NEWKEYS
        let mut c = Cursor::new(&pkt);
        assert!(!SshKexInit::parse(&mut c).is_not_empty());
    }

    #[test]
    fn test_truncated_kexinit_is_empty() {
        let pkt = build_kexinit([b"curve25519-sha256"; 10]);
        let mut c = Cursor::new(&pkt[..30]);
        assert!(!SshKexInit::parse(&mut c).is_not_empty());
    }
}
