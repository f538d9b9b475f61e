use std::collections::BTreeMap;

use crate::aggregate::{
    Benchmark, GroupStat, allowed_equals_charges, bucket_lines, distribution_stats, metric_of,
};
use crate::audit::{self, DenialEntry, PatientAggregate, ProxyAuditEntry, Totals};
use crate::classify::{self, DerivationTrail, Issue};
use crate::key::GroupKey;
use crate::normalize::{CanonicalLine, cents_to_dollars, to_cents};
use crate::proxy::{ProxyMethod, decontaminated_metrics, select_proxy};

/// Immutable control parameters for one full recompute. Any change to these
/// (or to the row set or the override map) triggers a recompute from scratch;
/// there is no incremental state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub benchmark: Benchmark,
    pub threshold_pct: f64,
    pub decontaminate: bool,
    pub units_in_key: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            benchmark: Benchmark::Paid,
            threshold_pct: 10.0,
            decontaminate: false,
            units_in_key: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditOutputs {
    /// One row per group, in key order.
    pub group_stats: Vec<GroupStat>,
    /// One row per retained input line, in input order.
    pub issues: Vec<Issue>,
    /// Sorted by |metric - proxy| descending.
    pub proxy_audits: Vec<ProxyAuditEntry>,
    /// Input order.
    pub denials: Vec<DenialEntry>,
    /// Sorted by unpaid gap descending.
    pub unpaid_patients: Vec<PatientAggregate>,
    pub totals: Totals,
}

fn resolve_group(
    key: &GroupKey,
    group_lines: &[&CanonicalLine],
    overrides: &BTreeMap<String, f64>,
    config: &EngineConfig,
) -> GroupStat {
    let metrics: Vec<f64> = group_lines
        .iter()
        .map(|line| metric_of(line, config.benchmark))
        .collect();
    let dist = distribution_stats(&metrics);
    let n_eq_charges = group_lines
        .iter()
        .filter(|line| allowed_equals_charges(line))
        .count();

    let mut used_decontaminate = false;
    let candidates: Vec<i64> =
        if config.benchmark == Benchmark::Allowed && config.decontaminate {
            match decontaminated_metrics(group_lines.iter().copied()) {
                Some(clean) => {
                    used_decontaminate = true;
                    clean
                        .iter()
                        .map(|line| to_cents(metric_of(line, config.benchmark)))
                        .collect()
                }
                None => metrics.iter().map(|m| to_cents(*m)).collect(),
            }
        } else {
            metrics.iter().map(|m| to_cents(*m)).collect()
        };

    // Buckets always hold at least one line, so selection cannot come back
    // empty; the fallback value is never observed.
    let (mut proxy, mut method) = match select_proxy(&candidates) {
        Some((cents, method)) => (cents_to_dollars(cents), method),
        None => (0.0, ProxyMethod::MaxWhenFew),
    };

    if let Some(value) = overrides.get(&key.label()) {
        proxy = *value;
        method = ProxyMethod::Override;
    }

    GroupStat {
        key: key.clone(),
        n: group_lines.len(),
        proxy,
        method,
        median: dist.median,
        mean: dist.mean,
        min: dist.min,
        max: dist.max,
        n_eq_charges,
        used_decontaminate,
        top_frequencies: dist.top_frequencies,
        multi_modal: dist.multi_modal,
        near_tie: dist.near_tie,
    }
}

fn trail_for(stat: &GroupStat) -> DerivationTrail {
    DerivationTrail {
        method: stat.method,
        n: stat.n,
        min: stat.min,
        max: stat.max,
        median: stat.median,
        mean: stat.mean,
        top_frequencies: stat.top_frequencies.clone(),
        multi_modal: stat.multi_modal,
        near_tie: stat.near_tie,
        used_decontaminate: stat.used_decontaminate,
    }
}

/// Full deterministic recompute: buckets lines, resolves each group's proxy
/// (consulting overrides by key label), classifies every line, and runs the
/// secondary audit passes.
pub fn run_audit(
    lines: &[CanonicalLine],
    overrides: &BTreeMap<String, f64>,
    config: &EngineConfig,
) -> AuditOutputs {
    let buckets = bucket_lines(lines, config.units_in_key);

    let mut stats: BTreeMap<GroupKey, GroupStat> = BTreeMap::new();
    for (key, idxs) in &buckets {
        let group_lines: Vec<&CanonicalLine> = idxs.iter().map(|i| &lines[*i]).collect();
        stats.insert(key.clone(), resolve_group(key, &group_lines, overrides, config));
    }

    let mut issues = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let key = GroupKey::for_line(line, config.units_in_key);
        let Some(stat) = stats.get(&key) else { continue };
        let metric = metric_of(line, config.benchmark);
        let deviation = classify::deviation_pct(metric, stat.proxy);
        let status = classify::classify(deviation, config.threshold_pct);
        issues.push(Issue {
            line_index: idx,
            key,
            patient: line.patient.clone(),
            service_date: line.service_date.clone(),
            metric,
            proxy: stat.proxy,
            deviation_pct: deviation,
            status,
            explanation: classify::explanation_for(status),
            trail: trail_for(stat),
        });
    }

    let proxy_audits = audit::proxy_audits(lines, &issues, &stats);
    let denials = audit::denials(lines, config.benchmark, config.units_in_key);
    let unpaid_patients = audit::unpaid_patients(lines, config.benchmark);
    let totals = audit::totals(lines, &stats, config.benchmark);

    AuditOutputs {
        group_stats: stats.into_values().collect(),
        issues,
        proxy_audits,
        denials,
        unpaid_patients,
        totals,
    }
}

/// Resolved proxy metadata for one group, answering an ad hoc lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupLookup {
    pub label: String,
    pub proxy: f64,
    pub method: &'static str,
    pub n: usize,
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub multi_modal: bool,
    pub near_tie: bool,
    pub used_decontaminate: bool,
}

#[derive(Debug, Clone)]
pub enum LookupResult {
    Found(GroupLookup),
    NotFound,
}

/// Finds the group matching a descriptor under the active key variant in the
/// last computed aggregation.
pub fn lookup_group(outputs: &AuditOutputs, key: &GroupKey) -> LookupResult {
    match outputs.group_stats.iter().find(|stat| stat.key == *key) {
        Some(stat) => LookupResult::Found(GroupLookup {
            label: stat.key.label(),
            proxy: stat.proxy,
            method: stat.method.as_str(),
            n: stat.n,
            median: stat.median,
            mean: stat.mean,
            min: stat.min,
            max: stat.max,
            multi_modal: stat.multi_modal,
            near_tie: stat.near_tie,
            used_decontaminate: stat.used_decontaminate,
        }),
        None => LookupResult::NotFound,
    }
}
