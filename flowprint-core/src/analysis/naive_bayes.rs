//! Weighted naive-Bayes process model.
//!
//! Probabilities are precomputed at load time: each process carries a
//! log prior, and every observed feature value maps to a sparse list of
//! (process index, delta) updates. Classification is one vector copy
//! plus six hash lookups. Feature weights can be swapped at runtime by
//! rescaling the deltas; the rescaled model is identical to one built
//! fresh with the new weights.

use std::collections::HashMap;

use compact_str::CompactString;

/// Number of destination-context features.
pub const NUM_FEATURES: usize = 6;

/// Feature order used everywhere: weights arrays, resource records.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = ["as", "domain", "port", "ip", "sni", "ua"];

/// Weights used when a fingerprint record carries none.
pub const DEFAULT_FEATURE_WEIGHTS: [f64; NUM_FEATURES] =
    [0.13924, 0.15590, 0.00528, 0.56735, 0.96941, 1.0];

mod feature {
    pub const AS: usize = 0;
    pub const DOMAIN: usize = 1;
    pub const PORT: usize = 2;
    pub const IP: usize = 3;
    pub const SNI: usize = 4;
    pub const UA: usize = 5;
}

/// Per-process training data for one fingerprint, as ingested from the
/// resource archive.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub name: String,
    pub malware: bool,
    pub count: u64,
    pub attributes: u32,
    pub ip_as: HashMap<u32, u64>,
    pub hostname_domains: HashMap<CompactString, u64>,
    pub dst_port: HashMap<u16, u64>,
    pub ip_ip: HashMap<CompactString, u64>,
    pub hostname_sni: HashMap<CompactString, u64>,
    pub user_agent: HashMap<CompactString, u64>,
    pub os_info: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Copy)]
struct Update {
    index: u32,
    value: f64,
}

/// The compiled model for one fingerprint string.
#[derive(Debug)]
pub struct NaiveBayes {
    base_prior: f64,
    process_prior: Vec<f64>,
    as_updates: HashMap<u32, Vec<Update>>,
    domain_updates: HashMap<CompactString, Vec<Update>>,
    port_updates: HashMap<u16, Vec<Update>>,
    ip_updates: HashMap<CompactString, Vec<Update>>,
    sni_updates: HashMap<CompactString, Vec<Update>>,
    ua_updates: HashMap<CompactString, Vec<Update>>,
    weights: [f64; NUM_FEATURES],
}

fn push_update<K: std::hash::Hash + Eq>(
    table: &mut HashMap<K, Vec<Update>>,
    key: K,
    update: Update,
) {
    table.entry(key).or_default().push(update);
}

impl NaiveBayes {
    pub fn new(processes: &[ProcessInfo], total_count: u64, weights: [f64; NUM_FEATURES]) -> Self {
        let total = total_count.max(1) as f64;
        let base_prior = (0.1 / total).ln();
        let weight_sum: f64 = weights.iter().sum();

        let mut model = NaiveBayes {
            base_prior,
            process_prior: Vec::with_capacity(processes.len()),
            as_updates: HashMap::new(),
            domain_updates: HashMap::new(),
            port_updates: HashMap::new(),
            ip_updates: HashMap::new(),
            sni_updates: HashMap::new(),
            ua_updates: HashMap::new(),
            weights,
        };

        for (index, p) in processes.iter().enumerate() {
            let index = index as u32;
            let score = (p.count as f64 / total).ln();
            model
                .process_prior
                .push(score.max(0.1f64.ln()) + base_prior * weight_sum);

            let delta = |count: u64, weight: f64| Update {
                index,
                value: ((count as f64 / total).ln() - base_prior) * weight,
            };

            for (&asn, &count) in &p.ip_as {
                push_update(
                    &mut model.as_updates,
                    asn,
                    delta(count, weights[feature::AS]),
                );
            }
            for (domain, &count) in &p.hostname_domains {
                push_update(
                    &mut model.domain_updates,
                    domain.clone(),
                    delta(count, weights[feature::DOMAIN]),
                );
            }
            for (&port, &count) in &p.dst_port {
                push_update(
                    &mut model.port_updates,
                    port,
                    delta(count, weights[feature::PORT]),
                );
            }
            for (ip, &count) in &p.ip_ip {
                push_update(
                    &mut model.ip_updates,
                    ip.clone(),
                    delta(count, weights[feature::IP]),
                );
            }
            for (sni, &count) in &p.hostname_sni {
                push_update(
                    &mut model.sni_updates,
                    sni.clone(),
                    delta(count, weights[feature::SNI]),
                );
            }
            for (ua, &count) in &p.user_agent {
                push_update(
                    &mut model.ua_updates,
                    ua.clone(),
                    delta(count, weights[feature::UA]),
                );
            }
        }

        debug_assert_eq!(model.process_prior.len(), processes.len());
        model
    }

    pub fn process_count(&self) -> usize {
        self.process_prior.len()
    }

    /// Score every process for one destination context.
    pub fn classify(
        &self,
        asn: u32,
        dst_port: u16,
        domain: &str,
        server_name: &str,
        dst_ip: &str,
        user_agent: Option<&str>,
    ) -> Vec<f64> {
        let mut scores = self.process_prior.clone();

        let apply = |scores: &mut [f64], updates: Option<&Vec<Update>>| {
            if let Some(updates) = updates {
                for u in updates {
                    scores[u.index as usize] += u.value;
                }
            }
        };

        apply(&mut scores, self.as_updates.get(&asn));
        apply(&mut scores, self.port_updates.get(&dst_port));
        apply(&mut scores, self.domain_updates.get(domain));
        apply(&mut scores, self.ip_updates.get(dst_ip));
        apply(&mut scores, self.sni_updates.get(server_name));
        if let Some(ua) = user_agent {
            apply(&mut scores, self.ua_updates.get(ua));
        }

        scores
    }

    /// Swap feature weights by rescaling the precomputed model in place.
    ///
    /// Priors were built as `max(score, ln 0.1) + base_prior * Σw`, so
    /// they shift by `base_prior * (Σw' − Σw)`; each update delta was
    /// built as `(ln(freq/N) − base_prior) * w_f`, so it scales by
    /// `w'_f / w_f`.
    pub fn recompute_probabilities(&mut self, new_weights: [f64; NUM_FEATURES]) {
        if new_weights == self.weights {
            return;
        }

        let old_sum: f64 = self.weights.iter().sum();
        let new_sum: f64 = new_weights.iter().sum();
        for p in &mut self.process_prior {
            *p += self.base_prior * (new_sum - old_sum);
        }

        fn rescale<K>(table: &mut HashMap<K, Vec<Update>>, old_w: f64, new_w: f64) {
            if old_w == 0.0 {
                return;
            }
            for updates in table.values_mut() {
                for u in updates {
                    u.value = u.value * new_w / old_w;
                }
            }
        }

        rescale(
            &mut self.as_updates,
            self.weights[feature::AS],
            new_weights[feature::AS],
        );
        rescale(
            &mut self.domain_updates,
            self.weights[feature::DOMAIN],
            new_weights[feature::DOMAIN],
        );
        rescale(
            &mut self.port_updates,
            self.weights[feature::PORT],
            new_weights[feature::PORT],
        );
        rescale(
            &mut self.ip_updates,
            self.weights[feature::IP],
            new_weights[feature::IP],
        );
        rescale(
            &mut self.sni_updates,
            self.weights[feature::SNI],
            new_weights[feature::SNI],
        );
        rescale(
            &mut self.ua_updates,
            self.weights[feature::UA],
            new_weights[feature::UA],
        );

        self.weights = new_weights;
    }
}
