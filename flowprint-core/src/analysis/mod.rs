//! Process classification from fingerprints and destination context.
//!
//! The classifier is built once from the resource archive and then
//! shared read-only by every worker; the prevalence LRU is its only
//! mutable component (interior, try-lock guarded). Classification never
//! fails across the component boundary: unknown fingerprints produce a
//! status-only result and the packet pipeline keeps running even when
//! the classifier is disabled.

mod archive;
mod naive_bayes;
mod prevalence;
mod subnets;

pub use archive::ResourceRecord;
pub use naive_bayes::{
    NaiveBayes, ProcessInfo, DEFAULT_FEATURE_WEIGHTS, FEATURE_NAMES, NUM_FEATURES,
};
pub use prevalence::{FingerprintPrevalence, PREVALENCE_CACHE_SIZE};
pub use subnets::SubnetTable;

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use compact_str::CompactString;
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::fingerprint::{Fingerprint, FingerprintType};
use crate::output::JsonObject;
use archive::{fingerprint_type_and_version, parse_fp_db_line, FpDbEntry};

/// Capacity of the per-process attribute bitset.
pub const MAX_ATTRIBUTES: usize = 32;

/// Sentinel process name for unlabeled traffic in malware databases.
const UNLABELED_PROCESS: &str = "generic dmz process";

/// Qualifiers expected in the VERSION file.
const NUM_QUALIFIERS: usize = 1;

/// Registry of attribute names; indices are stable for the classifier's
/// lifetime. New names are accepted only while the first process records
/// are being loaded.
#[derive(Debug, Default)]
pub struct AttributeNames {
    names: Vec<String>,
    accepting: bool,
}

impl AttributeNames {
    pub fn new() -> Self {
        AttributeNames {
            names: Vec::new(),
            accepting: true,
        }
    }

    /// Index for `name`, registering it when still accepting new names.
    pub fn get_index(&mut self, name: &str) -> Option<usize> {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return Some(idx);
        }
        if !self.accepting || self.names.len() >= MAX_ATTRIBUTES {
            return None;
        }
        self.names.push(name.to_string());
        Some(self.names.len() - 1)
    }

    pub fn stop_accepting_new_names(&mut self) {
        self.accepting = false;
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Outcome category for a classified fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintStatus {
    Labeled,
    Unlabeled,
    Randomized,
    Unanalyzed,
}

impl FingerprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintStatus::Labeled => "labeled",
            FingerprintStatus::Unlabeled => "unlabeled",
            FingerprintStatus::Randomized => "randomized",
            FingerprintStatus::Unanalyzed => "unanalyzed",
        }
    }
}

/// Result of one classification.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub status: FingerprintStatus,
    pub process: Option<String>,
    pub score: f64,
    pub malware: Option<bool>,
    pub malware_prob: Option<f64>,
    pub os_info: Vec<(String, u64)>,
    /// Attribute names set for the winning process, with probabilities.
    pub attributes: Vec<(String, f64)>,
}

impl AnalysisResult {
    fn status_only(status: FingerprintStatus) -> Self {
        AnalysisResult {
            status,
            process: None,
            score: 0.0,
            malware: None,
            malware_prob: None,
            os_info: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        let mut analysis = o.open_object("analysis");
        analysis.print_key_string("status", self.status.as_str());
        if let Some(process) = &self.process {
            analysis.print_key_string("process", process);
            analysis.print_key_float("score", self.score);
        }
        if let Some(malware) = self.malware {
            analysis.print_key_bool("malware", malware);
            if let Some(prob) = self.malware_prob {
                analysis.print_key_float("malware_score", prob);
            }
        }
        if !self.attributes.is_empty() {
            let mut attrs = analysis.open_object("attrs");
            for (name, prob) in &self.attributes {
                attrs.print_key_float(name, *prob);
            }
            attrs.close();
        }
        if !self.os_info.is_empty() {
            let mut os = analysis.open_array("os_info");
            for (name, count) in &self.os_info {
                let mut entry = os.open_object();
                entry.print_key_string("name", name);
                entry.print_key_uint("count", *count);
                entry.close();
            }
            os.close();
        }
        analysis.close();
    }
}

/// Data shared by every per-fingerprint model.
struct CommonData {
    subnets: SubnetTable,
    attr_names: AttributeNames,
    doh_names: HashSet<String>,
    doh_addrs: HashSet<IpAddr>,
    doh_idx: usize,
    enc_channel_idx: usize,
}

impl CommonData {
    fn doh_contains(&self, server_name: &str, dst_ip: &str) -> bool {
        if self.doh_names.contains(server_name) {
            return true;
        }
        dst_ip
            .parse::<IpAddr>()
            .map(|a| self.doh_addrs.contains(&a))
            .unwrap_or(false)
    }
}

/// Compiled model plus per-process output data for one fingerprint.
struct FingerprintData {
    process_name: Vec<String>,
    malware: Vec<bool>,
    attr: Vec<u32>,
    os_info: Vec<Vec<(String, u64)>>,
    model: NaiveBayes,
    malware_db: bool,
}

impl FingerprintData {
    fn new(entry: &FpDbEntry) -> Self {
        let model = NaiveBayes::new(&entry.processes, entry.total_count, entry.weights);
        FingerprintData {
            process_name: entry.processes.iter().map(|p| p.name.clone()).collect(),
            malware: entry.processes.iter().map(|p| p.malware).collect(),
            attr: entry.processes.iter().map(|p| p.attributes).collect(),
            os_info: entry.processes.iter().map(|p| p.os_info.clone()).collect(),
            model,
            malware_db: entry.malware_db,
        }
    }

    /// Top-two scan, softmax normalization, attribute aggregation.
    fn perform_analysis(
        &self,
        common: &CommonData,
        server_name: &str,
        dst_ip: &str,
        dst_port: u16,
        user_agent: Option<&str>,
        status: FingerprintStatus,
    ) -> AnalysisResult {
        if self.process_name.is_empty() {
            return AnalysisResult::status_only(status);
        }

        let asn = common.subnets.get_asn_str(dst_ip);
        let domain = tld_domain_name(server_name);

        let mut scores = self
            .model
            .classify(asn, dst_port, domain, server_name, dst_ip, user_agent);

        let mut max_score = f64::MIN;
        let mut sec_score = f64::MIN;
        let mut index_max = 0usize;
        let mut index_sec = 0usize;
        for (i, &s) in scores.iter().enumerate() {
            if s > max_score {
                sec_score = max_score;
                index_sec = index_max;
                max_score = s;
                index_max = i;
            } else if s > sec_score {
                sec_score = s;
                index_sec = i;
            }
        }

        let mut score_sum = 0.0;
        let mut malware_prob = 0.0;
        let mut attr_prob = [0.0f64; MAX_ATTRIBUTES];
        for (i, s) in scores.iter_mut().enumerate() {
            *s = (*s - max_score).exp();
            score_sum += *s;
            if self.malware[i] {
                malware_prob += *s;
            }
            for (j, slot) in attr_prob.iter_mut().enumerate() {
                if self.attr[i] >> j & 1 == 1 {
                    *slot += *s;
                }
            }
        }

        let mut max_score = scores[index_max];
        let sec_score = scores[index_sec];

        if score_sum > 0.0 && self.malware_db {
            malware_prob /= score_sum;
        }

        // an unlabeled winner yields to the runner-up unless the
        // runner-up is malware
        if self.malware_db
            && self.process_name[index_max] == UNLABELED_PROCESS
            && !self.malware[index_sec]
        {
            index_max = index_sec;
            score_sum -= max_score;
            max_score = sec_score;
        }
        if score_sum > 0.0 {
            max_score /= score_sum;
            for slot in attr_prob.iter_mut() {
                *slot /= score_sum;
            }
        }

        let mut attr_tags = self.attr[index_max];
        if common.doh_contains(server_name, dst_ip) {
            attr_tags |= 1 << common.doh_idx;
            attr_prob[common.doh_idx] = 1.0;
        }

        let mut attributes = Vec::new();
        for j in 0..common.attr_names.len() {
            if attr_tags >> j & 1 == 1 {
                if let Some(name) = common.attr_names.name(j) {
                    attributes.push((name.to_string(), attr_prob[j]));
                }
            }
        }

        AnalysisResult {
            status,
            process: Some(self.process_name[index_max].clone()),
            score: max_score,
            malware: self.malware_db.then(|| self.malware[index_max]),
            malware_prob: self.malware_db.then_some(malware_prob),
            os_info: self.os_info[index_max].clone(),
            attributes,
        }
    }

    fn recompute_probabilities(&mut self, weights: [f64; NUM_FEATURES]) {
        self.model.recompute_probabilities(weights);
    }
}

/// Top-two-label domain: `s3.amazonaws.com` yields `amazonaws.com`.
fn tld_domain_name(server_name: &str) -> &str {
    let mut separator = None;
    let mut previous = None;
    for (i, c) in server_name.char_indices() {
        if c == '.' {
            previous = separator;
            separator = Some(i);
        }
    }
    match previous {
        Some(idx) => &server_name[idx + 1..],
        None => server_name,
    }
}

/// Classifier construction options.
///
/// A nonzero threshold switches a `dual` archive to its lite database;
/// the per-line threshold filters themselves apply when a caller feeds
/// `fingerprint_db.json` records through a training pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierConfig {
    /// Process-prevalence threshold relative to a fingerprint's total.
    pub fp_proc_threshold: f32,
    /// Destination-feature threshold relative to a process's count.
    pub proc_dst_threshold: f32,
    /// Load and report OS information.
    pub report_os: bool,
    /// Adaptive prevalence cache capacity.
    pub max_prevalence_cache: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            fp_proc_threshold: 0.0,
            proc_dst_threshold: 0.0,
            report_os: true,
            max_prevalence_cache: PREVALENCE_CACHE_SIZE,
        }
    }
}

/// The process classifier: fingerprint database plus shared context.
pub struct Classifier {
    fpdb: HashMap<CompactString, FingerprintData>,
    prevalence: FingerprintPrevalence,
    common: CommonData,
    resource_version: String,
    fp_types: Vec<FingerprintType>,
    tls_fingerprint_format: usize,
    quic_fingerprint_format: usize,
    disabled: bool,
}

impl Classifier {
    /// Build from extracted archive records. Missing required files are
    /// an error; a qualifier mismatch merely disables classification.
    pub fn from_records<I>(records: I, config: ClassifierConfig) -> Result<Classifier>
    where
        I: IntoIterator<Item = ResourceRecord>,
    {
        let mut by_name: HashMap<String, String> = HashMap::new();
        for record in records {
            by_name.insert(record.name, record.contents);
        }

        let version = by_name
            .get("VERSION")
            .ok_or(ArchiveError::MissingFile { name: "VERSION" })?;
        let resource_version: String = version.lines().collect();
        let dual_db = resource_version.contains("dual");
        let lite_db = resource_version.contains("lite");
        let full_db = resource_version.contains("full");
        let legacy_archive = !dual_db && !lite_db && !full_db;
        let qualifier_count = resource_version.matches(';').count();

        let mut common = CommonData {
            subnets: SubnetTable::new(),
            attr_names: AttributeNames::new(),
            doh_names: HashSet::new(),
            doh_addrs: HashSet::new(),
            doh_idx: 0,
            enc_channel_idx: 0,
        };
        // reserved attributes exist even when no process carries them
        common.doh_idx = common
            .attr_names
            .get_index("encrypted_dns")
            .unwrap_or_default();
        common.enc_channel_idx = common
            .attr_names
            .get_index("encrypted_channel")
            .unwrap_or_default();

        let pyasn = by_name
            .get("pyasn.db")
            .ok_or(ArchiveError::MissingFile { name: "pyasn.db" })?;
        for line in pyasn.lines() {
            common.subnets.process_line(line);
        }
        common.subnets.process_final();

        let mut prevalence = FingerprintPrevalence::new(config.max_prevalence_cache);
        let seed = by_name
            .get("fp_prevalence_tls.txt")
            .ok_or(ArchiveError::MissingFile {
                name: "fp_prevalence_tls.txt",
            })?;
        for line in seed.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            // older seed files predate the type prefix
            if line.starts_with('(') {
                prevalence.initial_add(&format!("tls/{line}"));
            } else {
                prevalence.initial_add(line);
            }
        }

        let watchlist = by_name
            .get("doh-watchlist.txt")
            .ok_or(ArchiveError::MissingFile {
                name: "doh-watchlist.txt",
            })?;
        for line in watchlist.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<IpAddr>() {
                Ok(addr) => {
                    common.doh_addrs.insert(addr);
                }
                Err(_) => {
                    common.doh_names.insert(line.to_string());
                }
            }
        }

        // dual archives carry a lite database for threshold-limited loads
        let threshold_set = config.fp_proc_threshold > 0.0 || config.proc_dst_threshold > 0.0;
        let use_lite = dual_db && threshold_set && by_name.contains_key("fingerprint_db_lite.json");
        let db_name = if use_lite {
            "fingerprint_db_lite.json"
        } else {
            "fingerprint_db.json"
        };
        let db = by_name.get(db_name).ok_or(ArchiveError::MissingFile {
            name: "fingerprint_db.json",
        })?;

        let mut classifier = Classifier {
            fpdb: HashMap::new(),
            prevalence,
            common,
            resource_version,
            fp_types: vec![FingerprintType::Tls],
            tls_fingerprint_format: 0,
            quic_fingerprint_format: 0,
            disabled: false,
        };

        if legacy_archive {
            classifier.disabled = true;
            debug!("legacy resource archive, disabling classifier");
        } else {
            let mut first_line = true;
            let mut counts: HashMap<&'static str, u32> = HashMap::new();
            for line in db.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(entry) = parse_fp_db_line(
                    line,
                    0.0,
                    0.0,
                    config.report_os,
                    &mut classifier.common.attr_names,
                ) else {
                    continue;
                };

                // all fingerprints of a family must share one format
                match entry.fp_type {
                    FingerprintType::Tls => {
                        if first_line {
                            classifier.tls_fingerprint_format = entry.version;
                        } else if entry.version != classifier.tls_fingerprint_format {
                            warn!(
                                fingerprint = entry.str_repr.as_str(),
                                "tls fingerprint version with inconsistent format, ignoring line"
                            );
                            continue;
                        }
                        first_line = false;
                    }
                    FingerprintType::Quic => {
                        if first_line {
                            classifier.quic_fingerprint_format = entry.version;
                        } else if entry.version != classifier.quic_fingerprint_format {
                            warn!(
                                fingerprint = entry.str_repr.as_str(),
                                "quic fingerprint version with inconsistent format, ignoring line"
                            );
                            continue;
                        }
                        first_line = false;
                    }
                    _ => {}
                }

                if entry.fp_type != FingerprintType::Unknown
                    && !classifier.fp_types.contains(&entry.fp_type)
                {
                    classifier.fp_types.push(entry.fp_type);
                }
                *counts.entry(entry.fp_type.as_str()).or_default() += 1;

                if classifier.fpdb.contains_key(&entry.str_repr) {
                    warn!(
                        fingerprint = entry.str_repr.as_str(),
                        "fingerprint database has duplicate entry"
                    );
                    continue;
                }
                classifier
                    .fpdb
                    .insert(entry.str_repr.clone(), FingerprintData::new(&entry));
            }
            debug!(?counts, "fingerprints loaded");
        }

        if qualifier_count != NUM_QUALIFIERS {
            classifier.disabled = true;
            debug!(
                found = qualifier_count,
                "resource qualifier count does not match, disabling classifier"
            );
        }

        Ok(classifier)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn resource_version(&self) -> &str {
        &self.resource_version
    }

    pub fn tls_fingerprint_format(&self) -> usize {
        self.tls_fingerprint_format
    }

    pub fn quic_fingerprint_format(&self) -> usize {
        self.quic_fingerprint_format
    }

    /// Classify one fingerprint with its destination context.
    pub fn perform_analysis(
        &self,
        fp_str: &str,
        server_name: &str,
        dst_ip: &str,
        dst_port: u16,
        user_agent: Option<&str>,
    ) -> AnalysisResult {
        let Some(fp_data) = self.fpdb.get(fp_str) else {
            if self.prevalence.contains(fp_str) {
                self.prevalence.update(fp_str);
                return AnalysisResult::status_only(FingerprintStatus::Unlabeled);
            }
            self.prevalence.update(fp_str);

            // fall through to the family's randomized model when present,
            // e.g. tls/1/randomized
            let prefix: String = fp_str.chars().take_while(|&c| c != '(').collect();
            let randomized = format!("{prefix}randomized");
            let Some(fp_data) = self.fpdb.get(randomized.as_str()) else {
                return AnalysisResult::status_only(FingerprintStatus::Randomized);
            };
            return fp_data.perform_analysis(
                &self.common,
                server_name,
                dst_ip,
                dst_port,
                user_agent,
                FingerprintStatus::Randomized,
            );
        };

        fp_data.perform_analysis(
            &self.common,
            server_name,
            dst_ip,
            dst_port,
            user_agent,
            FingerprintStatus::Labeled,
        )
    }

    /// Training-path entry point: swap the feature weights of the model
    /// backing `fp_str`, then analyze. Not used on the packet path.
    pub fn perform_analysis_with_weights(
        &mut self,
        fp_str: &str,
        server_name: &str,
        dst_ip: &str,
        dst_port: u16,
        user_agent: Option<&str>,
        weights: [f64; NUM_FEATURES],
    ) -> AnalysisResult {
        let key: Option<CompactString> = if self.fpdb.contains_key(fp_str) {
            Some(CompactString::new(fp_str))
        } else {
            let prefix: String = fp_str.chars().take_while(|&c| c != '(').collect();
            let randomized = format!("{prefix}randomized");
            self.fpdb
                .contains_key(randomized.as_str())
                .then(|| CompactString::new(&randomized))
        };
        if let Some(key) = key {
            if let Some(fp_data) = self.fpdb.get_mut(&key) {
                fp_data.recompute_probabilities(weights);
            }
        }
        self.perform_analysis(fp_str, server_name, dst_ip, dst_port, user_agent)
    }

    /// Worker entry point: `None` when there is nothing to report (null
    /// fingerprint or classifier disabled).
    pub fn analyze_fingerprint(
        &self,
        fp: &Fingerprint,
        server_name: &str,
        dst_ip: &str,
        dst_port: u16,
        user_agent: Option<&str>,
    ) -> Option<AnalysisResult> {
        if self.disabled || fp.is_null() {
            return None;
        }
        let (fp_type, _) = fingerprint_type_and_version(fp.as_str());
        if !self.fp_types.contains(&fp_type) {
            return Some(AnalysisResult::status_only(FingerprintStatus::Unanalyzed));
        }

        let mut result =
            self.perform_analysis(fp.as_str(), server_name, dst_ip, dst_port, user_agent);

        // a malware verdict on a TLS fingerprint marks the channel itself
        if result.malware == Some(true) && fp.fp_type() == FingerprintType::Tls {
            if let Some(name) = self.common.attr_names.name(self.common.enc_channel_idx) {
                if !result.attributes.iter().any(|(n, _)| n == name) {
                    result
                        .attributes
                        .push((name.to_string(), result.malware_prob.unwrap_or(0.0)));
                }
            }
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_line(str_repr: &str, processes: &str) -> String {
        format!(
            r#"{{"str_repr":"{str_repr}","fp_type":"tls","total_count":100,"process_info":[{processes}]}}"#
        )
    }

    pub(crate) fn sample_records() -> Vec<ResourceRecord> {
        let db = [
            db_line(
                "tls/1/(0303)(13011302)((0000)(0017))",
                r#"{"process":"chrome.exe","count":80,"malware":false,
                   "classes_ip_as":{"15133":60},"classes_port_port":{"443":70},
                   "classes_hostname_domains":{"example.com":50},
                   "classes_hostname_sni":{"example.com":40},"classes_ip_ip":{"93.184.216.34":30},
                   "os_info":{"cpe:/o:microsoft:windows_10":60}},
                  {"process":"trickbot","count":20,"malware":true,
                   "classes_ip_as":{"64512":15},"classes_port_port":{"8443":18},
                   "classes_hostname_domains":{"evil.test":12},
                   "classes_hostname_sni":{"evil.test":12},"classes_ip_ip":{"203.0.113.7":10}}"#
                    .replace('\n', " ")
                    .as_str(),
            ),
            db_line(
                "tls/1/randomized",
                r#"{"process":"randomizer","count":100,"malware":false,
                   "classes_port_port":{"443":90}}"#
                    .replace('\n', " ")
                    .as_str(),
            ),
        ]
        .join("\n");

        vec![
            ResourceRecord::new("VERSION", "flowprint-resources;full"),
            ResourceRecord::new(
                "pyasn.db",
                "93.184.216.0/24\t15133\n203.0.113.0/24\t64512\n",
            ),
            ResourceRecord::new("fp_prevalence_tls.txt", "tls/1/(aaaa)(bbbb)()\n(cccc)()\n"),
            ResourceRecord::new("doh-watchlist.txt", "dns.evil.example\n198.51.100.53\n"),
            ResourceRecord::new("fingerprint_db.json", db),
        ]
    }

    fn classifier() -> Classifier {
        Classifier::from_records(sample_records(), ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn test_labeled_lookup() {
        let c = classifier();
        let result = c.perform_analysis(
            "tls/1/(0303)(13011302)((0000)(0017))",
            "example.com",
            "93.184.216.34",
            443,
            None,
        );
        assert_eq!(result.status, FingerprintStatus::Labeled);
        assert_eq!(result.process.as_deref(), Some("chrome.exe"));
        assert_eq!(result.malware, Some(false));
        assert!(result.score > 0.5);
        assert!(result.malware_prob.unwrap() < 0.5);
        assert_eq!(result.os_info.len(), 1);
    }

    #[test]
    fn test_malware_context_wins() {
        let c = classifier();
        let result = c.perform_analysis(
            "tls/1/(0303)(13011302)((0000)(0017))",
            "evil.test",
            "203.0.113.7",
            8443,
            None,
        );
        assert_eq!(result.process.as_deref(), Some("trickbot"));
        assert_eq!(result.malware, Some(true));
        assert!(result.malware_prob.unwrap() > 0.5);
    }

    #[test]
    fn test_seeded_fingerprint_is_unlabeled() {
        let c = classifier();
        let result = c.perform_analysis("tls/1/(aaaa)(bbbb)()", "", "", 443, None);
        assert_eq!(result.status, FingerprintStatus::Unlabeled);
        // prefixing applies to seeds without a type tag
        let result = c.perform_analysis("tls/(cccc)()", "", "", 443, None);
        assert_eq!(result.status, FingerprintStatus::Unlabeled);
    }

    #[test]
    fn test_unknown_falls_through_to_randomized_model() {
        let c = classifier();
        let result = c.perform_analysis("tls/1/(9999)(9999)()", "", "", 443, None);
        assert_eq!(result.status, FingerprintStatus::Randomized);
        assert_eq!(result.process.as_deref(), Some("randomizer"));
    }

    // Identical repeated lookups return the same status (idempotence).
    #[test]
    fn test_lookup_idempotent() {
        let c = classifier();
        let first = c.perform_analysis("tls/1/(9999)(9999)()", "", "", 443, None);
        let second = c.perform_analysis("tls/1/(9999)(9999)()", "", "", 443, None);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn test_doh_watchlist_forces_attribute() {
        let c = classifier();
        let result = c.perform_analysis(
            "tls/1/(0303)(13011302)((0000)(0017))",
            "dns.evil.example",
            "198.51.100.99",
            443,
            None,
        );
        let doh = result
            .attributes
            .iter()
            .find(|(n, _)| n == "encrypted_dns")
            .expect("encrypted_dns forced");
        assert_eq!(doh.1, 1.0);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut records = sample_records();
        records.retain(|r| r.name != "pyasn.db");
        assert!(Classifier::from_records(records, ClassifierConfig::default()).is_err());
    }

    #[test]
    fn test_bad_qualifier_count_disables() {
        let mut records = sample_records();
        for r in &mut records {
            if r.name == "VERSION" {
                r.contents = "flowprint-resources;full;extra".into();
            }
        }
        let c = Classifier::from_records(records, ClassifierConfig::default()).unwrap();
        assert!(c.is_disabled());
    }

    #[test]
    fn test_unanalyzed_type() {
        let c = classifier();
        let fp = Fingerprint::build(crate::fingerprint::FingerprintType::Dhcp, |b| {
            b.write_hex_token(&[0x35])
        });
        let result = c.analyze_fingerprint(&fp, "", "", 67, None).unwrap();
        assert_eq!(result.status, FingerprintStatus::Unanalyzed);
    }

    #[test]
    fn test_encrypted_channel_attribute_on_malware_tls() {
        let c = classifier();
        let fp = Fingerprint::build(crate::fingerprint::FingerprintType::Tls, |b| {
            b.write_str("(0303)(13011302)((0000)(0017))")
        });
        let result = c
            .analyze_fingerprint(&fp, "evil.test", "203.0.113.7", 8443, None)
            .unwrap();
        assert!(result
            .attributes
            .iter()
            .any(|(n, _)| n == "encrypted_channel"));
    }

    #[test]
    fn test_recompute_weights_path() {
        let mut c = classifier();
        let result = c.perform_analysis_with_weights(
            "tls/1/(0303)(13011302)((0000)(0017))",
            "example.com",
            "93.184.216.34",
            443,
            None,
            [0.2, 0.2, 0.01, 0.5, 0.9, 1.0],
        );
        assert_eq!(result.process.as_deref(), Some("chrome.exe"));
    }

    #[test]
    fn test_tld_domain_name() {
        assert_eq!(tld_domain_name("s3.amazonaws.com"), "amazonaws.com");
        assert_eq!(tld_domain_name("example.com"), "example.com");
        assert_eq!(tld_domain_name("localhost"), "localhost");
        assert_eq!(tld_domain_name("a.b.c.d.e"), "d.e");
    }
}
