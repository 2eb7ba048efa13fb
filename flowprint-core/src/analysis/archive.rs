//! Resource-archive record parsing.
//!
//! The decompression/decryption layer is external; this module consumes
//! already-extracted named records and turns `fingerprint_db.json` lines
//! into compiled-model inputs. Malformed records are logged and skipped;
//! only structurally missing files abort classifier construction.

use std::collections::HashMap;

use compact_str::CompactString;
use serde_json::Value;
use tracing::warn;

use super::naive_bayes::{ProcessInfo, DEFAULT_FEATURE_WEIGHTS, FEATURE_NAMES, NUM_FEATURES};
use super::AttributeNames;
use crate::fingerprint::{FingerprintType, MAX_FINGERPRINT_LEN};

/// One extracted archive member.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub name: String,
    pub contents: String,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        ResourceRecord {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// A fully parsed fingerprint-db line.
pub(crate) struct FpDbEntry {
    pub str_repr: CompactString,
    pub fp_type: FingerprintType,
    pub version: usize,
    pub total_count: u64,
    pub weights: [f64; NUM_FEATURES],
    pub processes: Vec<ProcessInfo>,
    pub malware_db: bool,
}

/// Split `type/version/body` off a fingerprint string. `randomized` and
/// version-less bodies report version 0.
pub(crate) fn fingerprint_type_and_version(s: &str) -> (FingerprintType, usize) {
    let Some(idx) = s.find('/') else {
        return (FingerprintType::Unknown, 0);
    };
    let fp_type = FingerprintType::from_db_name(&s[..idx]);
    let tail = &s[idx + 1..];
    let version = if tail.starts_with('(') || tail.starts_with("randomized") {
        0
    } else {
        tail.split('/')
            .next()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or_else(|| {
                warn!(fingerprint = s, "unknown version in fingerprint");
                0
            })
    };
    (fp_type, version)
}

fn string_count_map(value: &Value, count: u64, threshold: f32) -> HashMap<CompactString, u64> {
    let mut out = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (k, v) in obj {
            if let Some(n) = v.as_u64() {
                if n as f32 / count as f32 > threshold {
                    out.insert(CompactString::new(k), n);
                }
            }
        }
    }
    out
}

/// Parse one `fingerprint_db.json` line. Returns `None` (with a warning)
/// for records the classifier must skip.
pub(crate) fn parse_fp_db_line(
    line: &str,
    fp_proc_threshold: f32,
    proc_dst_threshold: f32,
    report_os: bool,
    attr_names: &mut AttributeNames,
) -> Option<FpDbEntry> {
    let fp: Value = match serde_json::from_str(line) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => {
            warn!("invalid JSON line in resource file");
            return None;
        }
    };

    let mut str_repr = fp.get("str_repr")?.as_str()?.to_string();
    if str_repr.is_empty() {
        warn!("ignoring zero-length fingerprint string in resource file");
        return None;
    }
    if str_repr.len() >= MAX_FINGERPRINT_LEN {
        warn!(
            length = str_repr.len(),
            "ignoring fingerprint string in resource file; too long"
        );
        return None;
    }

    let fp_type_string = fp.get("fp_type").and_then(|v| v.as_str()).unwrap_or("tls");
    let fp_type = FingerprintType::from_db_name(fp_type_string);

    // older resource files carry TLS fingerprints without a type prefix
    if fp_type == FingerprintType::Tls && (str_repr.starts_with('(') || str_repr == "randomized") {
        str_repr = format!("tls/{str_repr}");
    }

    let (parsed_type, version) = fingerprint_type_and_version(&str_repr);
    if parsed_type != fp_type {
        warn!(
            fingerprint = str_repr,
            "fingerprint type of str_repr does not match fp_type, ignoring line"
        );
        return None;
    }

    let total_count = fp.get("total_count").and_then(|v| v.as_u64()).unwrap_or(0);

    // optional feature weights must name exactly the known features
    let mut weights = DEFAULT_FEATURE_WEIGHTS;
    if let Some(w) = fp.get("feature_weights") {
        let obj = w.as_object()?;
        if obj.len() != NUM_FEATURES {
            warn!(
                expected = NUM_FEATURES,
                observed = obj.len(),
                "unexpected feature weight count"
            );
            return None;
        }
        for (name, value) in obj {
            let Some(idx) = FEATURE_NAMES.iter().position(|f| f == name) else {
                warn!(feature = name.as_str(), "unexpected feature weight");
                return None;
            };
            let Some(v) = value.as_f64() else {
                warn!(feature = name.as_str(), "unexpected feature weight value");
                return None;
            };
            weights[idx] = v;
        }
    }

    let mut processes = Vec::new();
    let mut malware_db = false;

    if let Some(list) = fp.get("process_info").and_then(|v| v.as_array()) {
        for entry in list {
            let count = entry.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
            if count == 0 {
                warn!(fingerprint = str_repr, "process with zero count, skipping");
                continue;
            }
            let malware = match entry.get("malware").and_then(|v| v.as_bool()) {
                Some(m) => {
                    malware_db = true;
                    m
                }
                None => false,
            };

            // prevalence threshold: the two most common processes and all
            // malware are always kept
            if processes.len() > 1
                && (count as f32 / total_count.max(1) as f32) < fp_proc_threshold
                && !malware
            {
                continue;
            }

            let name = entry
                .get("process")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let mut attributes = 0u32;
            if let Some(attrs) = entry.get("attributes").and_then(|v| v.as_object()) {
                for (attr, set) in attrs {
                    let Some(idx) = attr_names.get_index(attr) else {
                        warn!(attribute = attr.as_str(), "unknown attribute in process info");
                        return None;
                    };
                    if set.as_bool() == Some(true) {
                        attributes |= 1 << idx;
                    }
                }
                attr_names.stop_accepting_new_names();
            }

            let mut ip_as = HashMap::new();
            if let Some(obj) = entry.get("classes_ip_as").and_then(|v| v.as_object()) {
                for (k, v) in obj {
                    let Some(n) = v.as_u64() else { continue };
                    if (n as f32 / count as f32) <= proc_dst_threshold || k == "unknown" {
                        continue;
                    }
                    match k.parse::<u32>() {
                        Ok(asn) => {
                            ip_as.insert(asn, n);
                        }
                        Err(_) => warn!(value = k.as_str(), "unexpected string in ip_as"),
                    }
                }
            }

            let mut dst_port = HashMap::new();
            if let Some(obj) = entry.get("classes_port_port").and_then(|v| v.as_object()) {
                for (k, v) in obj {
                    let Some(n) = v.as_u64() else { continue };
                    if (n as f32 / count as f32) <= proc_dst_threshold {
                        continue;
                    }
                    let port = k.parse::<u32>().unwrap_or_else(|_| {
                        warn!(value = k.as_str(), "unexpected string in classes_port_port");
                        0
                    });
                    if port > u16::MAX as u32 {
                        warn!(port, "port number too high in classes_port_port");
                        dst_port.insert(0u16, n);
                    } else {
                        dst_port.insert(port as u16, n);
                    }
                }
            }

            let hostname_domains = entry
                .get("classes_hostname_domains")
                .map(|v| string_count_map(v, count, proc_dst_threshold))
                .unwrap_or_default();
            let ip_ip = entry
                .get("classes_ip_ip")
                .map(|v| string_count_map(v, count, proc_dst_threshold))
                .unwrap_or_default();
            let hostname_sni = entry
                .get("classes_hostname_sni")
                .map(|v| string_count_map(v, count, proc_dst_threshold))
                .unwrap_or_default();
            let user_agent = entry
                .get("classes_user_agent")
                .map(|v| string_count_map(v, count, proc_dst_threshold))
                .unwrap_or_default();

            let mut os_info = Vec::new();
            if report_os {
                if let Some(obj) = entry.get("os_info").and_then(|v| v.as_object()) {
                    for (k, v) in obj {
                        if !k.is_empty() {
                            os_info.push((k.clone(), v.as_u64().unwrap_or(0)));
                        }
                    }
                    os_info.sort();
                }
            }

            processes.push(ProcessInfo {
                name,
                malware,
                count,
                attributes,
                ip_as,
                hostname_domains,
                dst_port,
                ip_ip,
                hostname_sni,
                user_agent,
                os_info,
            });
        }
    }

    Some(FpDbEntry {
        str_repr: CompactString::new(&str_repr),
        fp_type,
        version,
        total_count,
        weights,
        processes,
        malware_db,
    })
}
