//! Canonical handshake fingerprints.
//!
//! A fingerprint is a deterministic byte string of the form
//! `type/version/body` (or `type/body` for unversioned types), where the
//! body is a sequence of parenthesized hex tokens in a protocol-specific
//! order. The string is the authoritative identifier used as the
//! classifier key; the version is a format generation number. GREASE
//! values are normalized while the body is written so that randomized
//! identifiers do not fragment fingerprint clusters.

use compact_str::CompactString;

/// Hard bound on a fingerprint string; a body that does not fit marks the
/// fingerprint invalid.
pub const MAX_FINGERPRINT_LEN: usize = 4096;

/// Protocol family of a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintType {
    Tls,
    TlsServer,
    Http,
    HttpServer,
    Quic,
    Ssh,
    SshKex,
    Dhcp,
    Dtls,
    Tcp,
    TcpServer,
    Tofsee,
    Unknown,
}

impl FingerprintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintType::Tls => "tls",
            FingerprintType::TlsServer => "tls_server",
            FingerprintType::Http => "http",
            FingerprintType::HttpServer => "http_server",
            FingerprintType::Quic => "quic",
            FingerprintType::Ssh => "ssh",
            FingerprintType::SshKex => "ssh_kex",
            FingerprintType::Dhcp => "dhcp",
            FingerprintType::Dtls => "dtls",
            FingerprintType::Tcp => "tcp",
            FingerprintType::TcpServer => "tcp_server",
            FingerprintType::Tofsee => "tofsee",
            FingerprintType::Unknown => "unknown",
        }
    }

    /// Parse the leading `type` component of a fingerprint string. Only
    /// the classifier-relevant families are recognized.
    pub fn from_db_name(name: &str) -> FingerprintType {
        match name {
            "tls" => FingerprintType::Tls,
            "http" => FingerprintType::Http,
            "quic" => FingerprintType::Quic,
            "tofsee" => FingerprintType::Tofsee,
            _ => FingerprintType::Unknown,
        }
    }

    /// Format generation written between type and body; `None` for
    /// unversioned families.
    pub fn format_version(&self) -> Option<usize> {
        match self {
            FingerprintType::Tls | FingerprintType::TlsServer => Some(1),
            FingerprintType::Quic => Some(1),
            _ => None,
        }
    }
}

/// True for RFC 8701 GREASE values (0x0a0a, 0x1a1a, .. 0xfafa).
pub fn is_grease_u16(v: u16) -> bool {
    (v >> 8) == (v & 0xff) && (v & 0x0f) == 0x0a
}

/// Replace a GREASE value with the canonical 0x0a0a.
pub fn degrease_u16(v: u16) -> u16 {
    if is_grease_u16(v) {
        0x0a0a
    } else {
        v
    }
}

/// Bounded writer for fingerprint bodies. Overflow is sticky and poisons
/// the resulting fingerprint.
pub struct FingerprintBuffer {
    buf: [u8; MAX_FINGERPRINT_LEN],
    len: usize,
    truncated: bool,
}

impl FingerprintBuffer {
    pub fn new() -> Self {
        FingerprintBuffer {
            buf: [0u8; MAX_FINGERPRINT_LEN],
            len: 0,
            truncated: false,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_str(&self) -> &str {
        // only ASCII is ever written
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    pub fn write_char(&mut self, c: u8) {
        if self.truncated || self.len >= MAX_FINGERPRINT_LEN {
            self.truncated = true;
            return;
        }
        self.buf[self.len] = c;
        self.len += 1;
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_char(b);
        }
    }

    pub fn write_hex(&mut self, bytes: &[u8]) {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        for &b in bytes {
            self.write_char(HEX[(b >> 4) as usize]);
            self.write_char(HEX[(b & 0x0f) as usize]);
        }
    }

    pub fn write_hex_u16(&mut self, v: u16) {
        self.write_hex(&v.to_be_bytes());
    }

    /// `(` hex of `bytes` `)` — the standard fingerprint token.
    pub fn write_hex_token(&mut self, bytes: &[u8]) {
        self.write_char(b'(');
        self.write_hex(bytes);
        self.write_char(b')');
    }

    /// `(` bytes verbatim `)` — used by HTTP, whose tokens are readable
    /// text rather than hex.
    pub fn write_raw_token(&mut self, bytes: &[u8]) {
        self.write_char(b'(');
        for &b in bytes {
            self.write_char(b);
        }
        self.write_char(b')');
    }

    pub fn open(&mut self) {
        self.write_char(b'(');
    }

    pub fn close(&mut self) {
        self.write_char(b')');
    }
}

impl Default for FingerprintBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished fingerprint: type tag plus its canonical string form. The
/// null fingerprint has an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    fp_type: FingerprintType,
    string: CompactString,
}

impl Fingerprint {
    pub fn null() -> Self {
        Fingerprint {
            fp_type: FingerprintType::Unknown,
            string: CompactString::default(),
        }
    }

    /// Assemble `type[/version]/body` where `body` is written by `f`.
    /// Returns the null fingerprint when the body overflows.
    pub fn build<F>(fp_type: FingerprintType, f: F) -> Fingerprint
    where
        F: FnOnce(&mut FingerprintBuffer),
    {
        let mut buf = FingerprintBuffer::new();
        buf.write_str(fp_type.as_str());
        buf.write_char(b'/');
        if let Some(v) = fp_type.format_version() {
            buf.write_str(&v.to_string());
            buf.write_char(b'/');
        }
        f(&mut buf);
        if buf.is_truncated() {
            return Fingerprint::null();
        }
        Fingerprint {
            fp_type,
            string: CompactString::new(buf.as_str()),
        }
    }

    pub fn is_null(&self) -> bool {
        self.string.is_empty()
    }

    pub fn fp_type(&self) -> FingerprintType {
        self.fp_type
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grease_detection() {
        for v in [0x0a0au16, 0x1a1a, 0x2a2a, 0xfafa] {
            assert!(is_grease_u16(v), "{v:#06x} is GREASE");
            assert_eq!(degrease_u16(v), 0x0a0a);
        }
        for v in [0x1301u16, 0x0a1a, 0x1a0a, 0x0000, 0xc02b] {
            assert!(!is_grease_u16(v), "{v:#06x} is not GREASE");
            assert_eq!(degrease_u16(v), v);
        }
    }

    #[test]
    fn test_build_versioned() {
        let fp = Fingerprint::build(FingerprintType::Tls, |b| {
            b.write_hex_token(&[0x03, 0x03]);
        });
        assert_eq!(fp.as_str(), "tls/1/(0303)");
        assert!(!fp.is_null());
    }

    #[test]
    fn test_build_unversioned() {
        let fp = Fingerprint::build(FingerprintType::Dhcp, |b| {
            b.write_hex_token(&[0x35, 0x37]);
        });
        assert_eq!(fp.as_str(), "dhcp/(3537)");
    }

    #[test]
    fn test_determinism() {
        let make = || {
            Fingerprint::build(FingerprintType::Quic, |b| {
                b.write_hex_token(&[0, 0, 0, 1]);
                b.write_hex_token(&[0x13, 0x01]);
            })
        };
        assert_eq!(make().as_str(), make().as_str());
    }

    #[test]
    fn test_overflow_yields_null() {
        let fp = Fingerprint::build(FingerprintType::Tls, |b| {
            let big = [0u8; MAX_FINGERPRINT_LEN];
            b.write_hex(&big); // twice the buffer in hex
        });
        assert!(fp.is_null());
    }

    #[test]
    fn test_nested_tokens() {
        let fp = Fingerprint::build(FingerprintType::Tls, |b| {
            b.open();
            b.write_hex_u16(0x0010);
            b.write_hex(&[0xde, 0xad]);
            b.close();
        });
        assert_eq!(fp.as_str(), "tls/1/(0010dead)");
    }
}
