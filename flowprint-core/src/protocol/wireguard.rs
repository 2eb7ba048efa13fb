//! Wireguard handshake-initiation view.

use crate::cursor::Cursor;
use crate::output::JsonObject;
use crate::protocol::MaskAndValue;

/// Message type 1, reserved zero.
pub const HANDSHAKE_INIT_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00],
    [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
);

/// First message of the Noise handshake; only the sender index is
/// cleartext context worth reporting.
#[derive(Debug, Clone, Copy)]
pub struct WireguardHandshakeInit {
    pub message_type: u8,
    pub sender_index: u32,
    valid: bool,
}

impl WireguardHandshakeInit {
    pub fn parse(c: &mut Cursor<'_>) -> Self {
        let message_type = c.read_u8();
        c.skip(3); // reserved
        // sender index is little-endian on the wire
        let mut sender_index = [0u8; 4];
        for b in sender_index.iter_mut() {
            *b = c.read_u8();
        }
        let valid = !c.is_null() && message_type == 1;
        WireguardHandshakeInit {
            message_type,
            sender_index: u32::from_le_bytes(sender_index),
            valid,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        o.print_key_uint("message_type", self.message_type as u64);
        o.print_key_hex("sender_index", &self.sender_index.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake_init() {
        let pkt = [0x01, 0, 0, 0, 0x78, 0x56, 0x34, 0x12, 0xaa];
        let mut c = Cursor::new(&pkt);
        let wg = WireguardHandshakeInit::parse(&mut c);

        assert!(wg.is_not_empty());
        assert_eq!(wg.sender_index, 0x12345678);
    }

    #[test]
    fn test_other_message_type_is_empty() {
        let pkt = [0x04, 0, 0, 0, 1, 2, 3, 4];
        let mut c = Cursor::new(&pkt);
        assert!(!WireguardHandshakeInit::parse(&mut c).is_not_empty());
    }

    #[test]
    fn test_truncated_is_empty() {
        let pkt = [0x01, 0, 0];
        let mut c = Cursor::new(&pkt);
        assert!(!WireguardHandshakeInit::parse(&mut c).is_not_empty());
    }
}
