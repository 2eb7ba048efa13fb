//! Streaming JSON emission over a bounded buffer.
//!
//! Records are serialized directly into a ring-slot payload with no
//! intermediate allocation. The writer tracks a truncation flag: once the
//! buffer is full every further write is suppressed, and the finished
//! record reports length 0 so the caller drops it instead of emitting a
//! malformed line.

/// Byte sink with a hard capacity and a sticky truncation flag.
#[derive(Debug)]
pub struct BufferStream<'a> {
    buf: &'a mut [u8],
    len: usize,
    truncated: bool,
}

impl<'a> BufferStream<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        BufferStream {
            buf,
            len: 0,
            truncated: false,
        }
    }

    /// Bytes written so far, or 0 if the stream overflowed.
    pub fn length(&self) -> usize {
        if self.truncated {
            0
        } else {
            self.len
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn write_char(&mut self, c: u8) {
        if self.truncated || self.len >= self.buf.len() {
            self.truncated = true;
            return;
        }
        self.buf[self.len] = c;
        self.len += 1;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.truncated || self.len + bytes.len() > self.buf.len() {
            self.truncated = true;
            return;
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Raw bytes as lowercase hex.
    pub fn write_hex(&mut self, bytes: &[u8]) {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        for &b in bytes {
            self.write_char(HEX[(b >> 4) as usize]);
            self.write_char(HEX[(b & 0x0f) as usize]);
        }
    }

    /// Bytes as a JSON string body: quotes, backslash, control bytes and
    /// non-ASCII are escaped `\u00xx` so arbitrary packet data stays
    /// valid JSON.
    pub fn write_json_escaped(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match b {
                b'"' => self.write_bytes(b"\\\""),
                b'\\' => self.write_bytes(b"\\\\"),
                b'\n' => self.write_bytes(b"\\n"),
                b'\r' => self.write_bytes(b"\\r"),
                b'\t' => self.write_bytes(b"\\t"),
                0x20..=0x7e => self.write_char(b),
                _ => {
                    const HEX: &[u8; 16] = b"0123456789abcdef";
                    self.write_bytes(b"\\u00");
                    self.write_char(HEX[(b >> 4) as usize]);
                    self.write_char(HEX[(b & 0x0f) as usize]);
                }
            }
        }
    }

    pub fn write_uint(&mut self, v: u64) {
        let mut digits = [0u8; 20];
        let mut i = digits.len();
        let mut v = v;
        loop {
            i -= 1;
            digits[i] = b'0' + (v % 10) as u8;
            v /= 10;
            if v == 0 {
                break;
            }
        }
        self.write_bytes(&digits[i..]);
    }
}

/// Streaming JSON object writer; children reborrow the parent's stream.
pub struct JsonObject<'b, 'a> {
    stream: &'b mut BufferStream<'a>,
    first: bool,
}

impl<'b, 'a> JsonObject<'b, 'a> {
    /// Open a top-level object (writes `{`).
    pub fn new(stream: &'b mut BufferStream<'a>) -> Self {
        stream.write_char(b'{');
        JsonObject {
            stream,
            first: true,
        }
    }

    fn key(&mut self, key: &str) {
        if !self.first {
            self.stream.write_char(b',');
        }
        self.first = false;
        self.stream.write_char(b'"');
        self.stream.write_str(key);
        self.stream.write_bytes(b"\":");
    }

    pub fn print_key_string(&mut self, key: &str, value: &str) {
        self.key(key);
        self.stream.write_char(b'"');
        self.stream.write_json_escaped(value.as_bytes());
        self.stream.write_char(b'"');
    }

    /// String value from raw packet bytes, escaped.
    pub fn print_key_json_string(&mut self, key: &str, value: &[u8]) {
        self.key(key);
        self.stream.write_char(b'"');
        self.stream.write_json_escaped(value);
        self.stream.write_char(b'"');
    }

    /// String value holding the hex expansion of `value`.
    pub fn print_key_hex(&mut self, key: &str, value: &[u8]) {
        self.key(key);
        self.stream.write_char(b'"');
        self.stream.write_hex(value);
        self.stream.write_char(b'"');
    }

    pub fn print_key_uint(&mut self, key: &str, value: u64) {
        self.key(key);
        self.stream.write_uint(value);
    }

    pub fn print_key_bool(&mut self, key: &str, value: bool) {
        self.key(key);
        self.stream
            .write_bytes(if value { b"true" } else { b"false" });
    }

    pub fn print_key_float(&mut self, key: &str, value: f64) {
        self.key(key);
        self.stream.write_str(&format!("{:e}", value));
    }

    /// Open a nested object under `key`; the child must be closed before
    /// the parent is used again.
    pub fn open_object<'c>(&'c mut self, key: &str) -> JsonObject<'c, 'a> {
        self.key(key);
        self.stream.write_char(b'{');
        JsonObject {
            stream: &mut *self.stream,
            first: true,
        }
    }

    /// Open a nested array under `key`.
    pub fn open_array<'c>(&'c mut self, key: &str) -> JsonArray<'c, 'a> {
        self.key(key);
        self.stream.write_char(b'[');
        JsonArray {
            stream: &mut *self.stream,
            first: true,
        }
    }

    pub fn close(self) {
        self.stream.write_char(b'}');
    }
}

/// Streaming JSON array writer.
pub struct JsonArray<'b, 'a> {
    stream: &'b mut BufferStream<'a>,
    first: bool,
}

impl<'b, 'a> JsonArray<'b, 'a> {
    fn elem(&mut self) {
        if !self.first {
            self.stream.write_char(b',');
        }
        self.first = false;
    }

    pub fn print_string(&mut self, value: &str) {
        self.elem();
        self.stream.write_char(b'"');
        self.stream.write_json_escaped(value.as_bytes());
        self.stream.write_char(b'"');
    }

    pub fn print_json_string(&mut self, value: &[u8]) {
        self.elem();
        self.stream.write_char(b'"');
        self.stream.write_json_escaped(value);
        self.stream.write_char(b'"');
    }

    pub fn print_hex(&mut self, value: &[u8]) {
        self.elem();
        self.stream.write_char(b'"');
        self.stream.write_hex(value);
        self.stream.write_char(b'"');
    }

    pub fn print_uint(&mut self, value: u64) {
        self.elem();
        self.stream.write_uint(value);
    }

    /// Open an object element.
    pub fn open_object<'c>(&'c mut self) -> JsonObject<'c, 'a> {
        self.elem();
        self.stream.write_char(b'{');
        JsonObject {
            stream: &mut *self.stream,
            first: true,
        }
    }

    pub fn close(self) {
        self.stream.write_char(b']');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut BufferStream)) -> (String, usize) {
        let mut buf = [0u8; 256];
        let mut stream = BufferStream::new(&mut buf);
        f(&mut stream);
        let len = stream.length();
        (String::from_utf8_lossy(&buf[..len]).into_owned(), len)
    }

    #[test]
    fn test_flat_object() {
        let (s, _) = render(|stream| {
            let mut o = JsonObject::new(stream);
            o.print_key_string("src_ip", "10.0.0.1");
            o.print_key_uint("src_port", 443);
            o.print_key_bool("malware", false);
            o.close();
        });
        assert_eq!(s, r#"{"src_ip":"10.0.0.1","src_port":443,"malware":false}"#);
    }

    #[test]
    fn test_nested_object_and_array() {
        let (s, _) = render(|stream| {
            let mut o = JsonObject::new(stream);
            {
                let mut fp = o.open_object("fingerprints");
                fp.print_key_string("tls", "tls/1/()");
                fp.close();
            }
            {
                let mut a = o.open_array("names");
                a.print_string("a");
                a.print_string("b");
                a.close();
            }
            o.close();
        });
        assert_eq!(s, r#"{"fingerprints":{"tls":"tls/1/()"},"names":["a","b"]}"#);
    }

    #[test]
    fn test_escaping() {
        let (s, _) = render(|stream| {
            let mut o = JsonObject::new(stream);
            o.print_key_json_string("v", b"a\"b\\c\x01d");
            o.close();
        });
        assert_eq!(s, "{\"v\":\"a\\\"b\\\\c\\u0001d\"}");
    }

    #[test]
    fn test_hex_value() {
        let (s, _) = render(|stream| {
            let mut o = JsonObject::new(stream);
            o.print_key_hex("dcid", &[0x83, 0x94, 0xc8, 0xf0]);
            o.close();
        });
        assert_eq!(s, r#"{"dcid":"8394c8f0"}"#);
    }

    #[test]
    fn test_overflow_reports_zero_length() {
        let mut buf = [0u8; 16];
        let mut stream = BufferStream::new(&mut buf);
        let mut o = JsonObject::new(&mut stream);
        o.print_key_string("key", "a value that cannot possibly fit here");
        o.close();
        assert!(stream.is_truncated());
        assert_eq!(stream.length(), 0);
    }

    #[test]
    fn test_uint_rendering() {
        let (s, _) = render(|stream| {
            let mut o = JsonObject::new(stream);
            o.print_key_uint("zero", 0);
            o.print_key_uint("big", u64::MAX);
            o.close();
        });
        assert_eq!(s, r#"{"zero":0,"big":18446744073709551615}"#);
    }
}
