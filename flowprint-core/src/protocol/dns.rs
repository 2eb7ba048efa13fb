//! DNS message view.
//!
//! Two reporting modes: decoded questions/answers as JSON, or (when
//! decoding is switched off) base64 of the raw message, which downstream
//! consumers re-parse with their own tooling.

use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::output::JsonObject;
use crate::protocol::MaskAndValue;

/// Standard query/response: opcode 0, Z bits clear.
pub const MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0x00, 0x00, 0x78, 0x40, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
);

/// Limit on compression-pointer hops while expanding a name.
const MAX_NAME_JUMPS: usize = 8;

/// Limit on decoded questions / records per section.
const MAX_RECORDS: usize = 16;

#[derive(Debug, Clone)]
pub struct DnsQuestion {
    pub name: String,
    pub rr_type: u16,
    pub rr_class: u16,
}

#[derive(Debug, Clone)]
pub struct DnsRecord<'a> {
    pub name: String,
    pub rr_type: u16,
    pub rr_class: u16,
    pub ttl: u32,
    pub rdata: &'a [u8],
}

/// Parsed DNS message.
#[derive(Debug, Clone)]
pub struct DnsPacket<'a> {
    raw: &'a [u8],
    pub id: u16,
    pub is_response: bool,
    pub questions: SmallVec<[DnsQuestion; 2]>,
    pub answers: SmallVec<[DnsRecord<'a>; 4]>,
    valid: bool,
}

impl<'a> DnsPacket<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let raw = c.as_slice();
        let empty = DnsPacket {
            raw,
            id: 0,
            is_response: false,
            questions: SmallVec::new(),
            answers: SmallVec::new(),
            valid: false,
        };

        let id = c.read_u16();
        let flags = c.read_u16();
        let qdcount = c.read_u16() as usize;
        let ancount = c.read_u16() as usize;
        c.skip(4); // nscount, arcount
        if c.is_null() {
            return empty;
        }

        let mut questions = SmallVec::new();
        for _ in 0..qdcount.min(MAX_RECORDS) {
            let Some(name) = read_name(c, raw) else {
                return empty;
            };
            let rr_type = c.read_u16();
            let rr_class = c.read_u16();
            if c.is_null() {
                return empty;
            }
            questions.push(DnsQuestion {
                name,
                rr_type,
                rr_class,
            });
        }

        let mut answers = SmallVec::new();
        for _ in 0..ancount.min(MAX_RECORDS) {
            let Some(name) = read_name(c, raw) else {
                break; // best-effort: keep what decoded cleanly
            };
            let rr_type = c.read_u16();
            let rr_class = c.read_u16();
            let ttl = c.read_u32();
            let rdlength = c.read_u16() as usize;
            let rdata = c.read_slice(rdlength);
            if c.is_null() {
                break;
            }
            answers.push(DnsRecord {
                name,
                rr_type,
                rr_class,
                ttl,
                rdata: rdata.as_slice(),
            });
        }

        let valid = !questions.is_empty() || !answers.is_empty();
        DnsPacket {
            raw,
            id,
            is_response: flags & 0x8000 != 0,
            questions,
            answers,
            valid,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    /// Decoded form: questions and answers.
    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        o.print_key_uint("id", self.id as u64);
        o.print_key_bool("response", self.is_response);
        let mut qs = o.open_array("questions");
        for q in &self.questions {
            let mut entry = qs.open_object();
            entry.print_key_string("name", &q.name);
            entry.print_key_uint("type", q.rr_type as u64);
            entry.print_key_uint("class", q.rr_class as u64);
            entry.close();
        }
        qs.close();
        if !self.answers.is_empty() {
            let mut ans = o.open_array("answers");
            for a in &self.answers {
                let mut entry = ans.open_object();
                entry.print_key_string("name", &a.name);
                entry.print_key_uint("type", a.rr_type as u64);
                entry.print_key_uint("class", a.rr_class as u64);
                entry.print_key_uint("ttl", a.ttl as u64);
                entry.print_key_hex("rdata", a.rdata);
                entry.close();
            }
            ans.close();
        }
    }

    /// Raw form: one base64 string.
    pub fn write_json_base64(&self, o: &mut JsonObject) {
        o.print_key_string("base64", &base64_encode(self.raw));
    }
}

/// Expand a possibly-compressed name. `raw` is the whole message, needed
/// to follow compression pointers.
fn read_name(c: &mut Cursor<'_>, raw: &[u8]) -> Option<String> {
    let mut name = String::new();
    let mut jumps = 0;
    // after the first pointer we read from `raw` at `pos` instead of `c`
    let mut indirect: Option<usize> = None;

    loop {
        let len = match indirect {
            None => c.read_u8(),
            Some(ref mut pos) => {
                let b = *raw.get(*pos)?;
                *pos += 1;
                b
            }
        };
        match len {
            0 => break,
            l if l & 0xc0 == 0xc0 => {
                let lo = match indirect {
                    None => c.read_u8(),
                    Some(ref mut pos) => {
                        let b = *raw.get(*pos)?;
                        *pos += 1;
                        b
                    }
                };
                jumps += 1;
                if jumps > MAX_NAME_JUMPS {
                    return None;
                }
                indirect = Some((((l & 0x3f) as usize) << 8) | lo as usize);
            }
            l => {
                let l = l as usize;
                if !name.is_empty() {
                    name.push('.');
                }
                match indirect {
                    None => {
                        let label = c.read_slice(l);
                        if c.is_null() {
                            return None;
                        }
                        name.push_str(&String::from_utf8_lossy(label.as_slice()));
                    }
                    Some(ref mut pos) => {
                        let label = raw.get(*pos..*pos + l)?;
                        *pos += l;
                        name.push_str(&String::from_utf8_lossy(label));
                    }
                }
            }
        }
        if name.len() > 255 {
            return None;
        }
    }
    Some(name)
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard base64 with padding.
fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
        out.push(BASE64_ALPHABET[(n >> 18) as usize & 0x3f] as char);
        out.push(BASE64_ALPHABET[(n >> 12) as usize & 0x3f] as char);
        out.push(if chunk.len() > 1 {
            BASE64_ALPHABET[(n >> 6) as usize & 0x3f] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            BASE64_ALPHABET[n as usize & 0x3f] as char
        } else {
            '='
        });
    }
    out
}
