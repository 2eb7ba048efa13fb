//! IP prefix to ASN mapping, loaded from `pyasn.db` lines.
//!
//! The table keeps one map per prefix length and answers a lookup by
//! probing lengths from most to least specific, which is exact
//! longest-prefix matching without a trie.

use std::collections::HashMap;
use std::net::IpAddr;

use tracing::warn;

/// ASN lookup table for IPv4 and IPv6 prefixes.
#[derive(Debug, Default)]
pub struct SubnetTable {
    v4: Vec<(u8, HashMap<u32, u32>)>,
    v6: Vec<(u8, HashMap<u128, u32>)>,
}

impl SubnetTable {
    pub fn new() -> Self {
        SubnetTable::default()
    }

    /// Ingest one `prefix/len<TAB>asn` line; malformed lines are logged
    /// and skipped.
    pub fn process_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            return;
        }
        let Some((prefix, asn_str)) = line.split_once(['\t', ' ']) else {
            warn!(line, "malformed pyasn line");
            return;
        };
        let Some((addr_str, len_str)) = prefix.split_once('/') else {
            warn!(line, "malformed pyasn prefix");
            return;
        };
        let (Ok(addr), Ok(len), Ok(asn)) = (
            addr_str.parse::<IpAddr>(),
            len_str.parse::<u8>(),
            asn_str.trim().parse::<u32>(),
        ) else {
            warn!(line, "malformed pyasn fields");
            return;
        };

        match addr {
            IpAddr::V4(v4) if len <= 32 => {
                let net = u32::from(v4) & mask_v4(len);
                self.bucket_v4(len).insert(net, asn);
            }
            IpAddr::V6(v6) if len <= 128 => {
                let net = u128::from(v6) & mask_v6(len);
                self.bucket_v6(len).insert(net, asn);
            }
            _ => warn!(line, "pyasn prefix length out of range"),
        }
    }

    /// Sort buckets most-specific first; call once after loading.
    pub fn process_final(&mut self) {
        self.v4.sort_by(|a, b| b.0.cmp(&a.0));
        self.v6.sort_by(|a, b| b.0.cmp(&a.0));
    }

    /// ASN for an address, 0 when unknown.
    pub fn get_asn(&self, addr: &IpAddr) -> u32 {
        match addr {
            IpAddr::V4(v4) => {
                let ip = u32::from(*v4);
                for (len, map) in &self.v4 {
                    if let Some(&asn) = map.get(&(ip & mask_v4(*len))) {
                        return asn;
                    }
                }
                0
            }
            IpAddr::V6(v6) => {
                let ip = u128::from(*v6);
                for (len, map) in &self.v6 {
                    if let Some(&asn) = map.get(&(ip & mask_v6(*len))) {
                        return asn;
                    }
                }
                0
            }
        }
    }

    /// ASN for a textual address, 0 for unknown or unparseable input.
    pub fn get_asn_str(&self, addr: &str) -> u32 {
        addr.parse::<IpAddr>()
            .map(|a| self.get_asn(&a))
            .unwrap_or(0)
    }

    fn bucket_v4(&mut self, len: u8) -> &mut HashMap<u32, u32> {
        if let Some(pos) = self.v4.iter().position(|(l, _)| *l == len) {
            return &mut self.v4[pos].1;
        }
        self.v4.push((len, HashMap::new()));
        &mut self.v4.last_mut().unwrap().1
    }

    fn bucket_v6(&mut self, len: u8) -> &mut HashMap<u128, u32> {
        if let Some(pos) = self.v6.iter().position(|(l, _)| *l == len) {
            return &mut self.v6[pos].1;
        }
        self.v6.push((len, HashMap::new()));
        &mut self.v6.last_mut().unwrap().1
    }
}

fn mask_v4(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - len as u32)
    }
}

fn mask_v6(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        u128::MAX << (128 - len as u32)
    }
}
