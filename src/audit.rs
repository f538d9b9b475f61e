use std::collections::BTreeMap;

use crate::aggregate::{Benchmark, GroupStat, allowed_equals_charges, metric_of};
use crate::classify::{Issue, Status};
use crate::key::GroupKey;
use crate::normalize::CanonicalLine;

/// Overpaid line whose baseline itself deserves scrutiny.
#[derive(Debug, Clone)]
pub struct ProxyAuditEntry {
    pub line_index: usize,
    pub key: GroupKey,
    pub metric: f64,
    pub proxy: f64,
    /// |metric - proxy|; entries sort by this, descending.
    pub gap: f64,
    pub reasons: Vec<&'static str>,
}

pub const REASON_ALLOWED_EQ_CHARGES: &str = "allowed equals charges";
pub const REASON_THIN_GROUP: &str = "thin group (n<=2)";
pub const REASON_TINY_PROXY: &str = "proxy below 1.00";

/// Flags Overpaid lines where the proxy is low-confidence: the line's own
/// allowed tracks charges (the baseline may be charge-contaminated), the
/// group is thin, or the proxy is below one currency unit.
pub fn proxy_audits(
    lines: &[CanonicalLine],
    issues: &[Issue],
    stats: &BTreeMap<GroupKey, GroupStat>,
) -> Vec<ProxyAuditEntry> {
    let mut entries = Vec::new();
    for issue in issues {
        if issue.status != Status::Overpaid {
            continue;
        }
        let line = &lines[issue.line_index];
        let mut reasons = Vec::new();
        if allowed_equals_charges(line) {
            reasons.push(REASON_ALLOWED_EQ_CHARGES);
        }
        if let Some(stat) = stats.get(&issue.key) {
            if stat.n <= 2 {
                reasons.push(REASON_THIN_GROUP);
            }
        }
        if issue.proxy < 1.0 {
            reasons.push(REASON_TINY_PROXY);
        }
        if reasons.is_empty() {
            continue;
        }
        entries.push(ProxyAuditEntry {
            line_index: issue.line_index,
            key: issue.key.clone(),
            metric: issue.metric,
            proxy: issue.proxy,
            gap: (issue.metric - issue.proxy).abs(),
            reasons,
        });
    }
    entries.sort_by(|a, b| {
        b.gap
            .total_cmp(&a.gap)
            .then_with(|| a.line_index.cmp(&b.line_index))
    });
    entries
}

#[derive(Debug, Clone)]
pub struct DenialEntry {
    pub line_index: usize,
    pub patient: String,
    pub key: GroupKey,
    pub charges: f64,
    pub insurance_paid: f64,
    pub balance: f64,
    pub adjustment: f64,
    pub reason: &'static str,
}

pub const REASON_FULL_WRITE_OFF: &str = "full contractual write-off";
pub const REASON_ZERO_BENCHMARK: &str = "benchmark metric is zero";

fn is_full_write_off(line: &CanonicalLine) -> bool {
    line.charges > 0.0
        && (line.adjustment + line.charges).abs() <= 0.01
        && line.insurance_paid == 0.0
        && line.balance == 0.0
}

/// Lines fully denied or written off with zero recovery. A denial here does
/// not exclude the same line from carrying an Underpaid classification.
pub fn denials(
    lines: &[CanonicalLine],
    benchmark: Benchmark,
    units_in_key: bool,
) -> Vec<DenialEntry> {
    let mut entries = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let reason = if is_full_write_off(line) {
            REASON_FULL_WRITE_OFF
        } else if line.charges > 0.0 && metric_of(line, benchmark) == 0.0 {
            REASON_ZERO_BENCHMARK
        } else {
            continue;
        };
        entries.push(DenialEntry {
            line_index: idx,
            patient: line.patient.clone(),
            key: GroupKey::for_line(line, units_in_key),
            charges: line.charges,
            insurance_paid: line.insurance_paid,
            balance: line.balance,
            adjustment: line.adjustment,
            reason,
        });
    }
    entries
}

/// Per-patient rollup for patients with zero insurer reimbursement.
#[derive(Debug, Clone)]
pub struct PatientAggregate {
    pub patient: String,
    pub line_count: usize,
    pub charges_total: f64,
    pub allowed_total: f64,
    pub insurance_paid_total: f64,
    pub balance_total: f64,
    pub benchmark_total: f64,
    pub unpaid_gap: f64,
}

/// Patients whose lines total zero insurer payment against positive charges.
/// Sorted by unpaid gap descending, patient ascending. Lines with a blank
/// patient field cannot form a patient identity and are skipped here only.
pub fn unpaid_patients(lines: &[CanonicalLine], benchmark: Benchmark) -> Vec<PatientAggregate> {
    let mut rollup: BTreeMap<String, PatientAggregate> = BTreeMap::new();
    for line in lines {
        if line.patient.is_empty() {
            continue;
        }
        let agg = rollup
            .entry(line.patient.clone())
            .or_insert_with(|| PatientAggregate {
                patient: line.patient.clone(),
                line_count: 0,
                charges_total: 0.0,
                allowed_total: 0.0,
                insurance_paid_total: 0.0,
                balance_total: 0.0,
                benchmark_total: 0.0,
                unpaid_gap: 0.0,
            });
        agg.line_count += 1;
        agg.charges_total += line.charges;
        agg.allowed_total += line.allowed;
        agg.insurance_paid_total += line.insurance_paid;
        agg.balance_total += line.balance;
        agg.benchmark_total += metric_of(line, benchmark);
    }

    let mut unpaid: Vec<PatientAggregate> = rollup
        .into_values()
        .filter(|agg| agg.insurance_paid_total == 0.0 && agg.charges_total > 0.0)
        .map(|mut agg| {
            agg.unpaid_gap = (agg.benchmark_total - agg.insurance_paid_total).max(0.0);
            agg
        })
        .collect();
    unpaid.sort_by(|a, b| {
        b.unpaid_gap
            .total_cmp(&a.unpaid_gap)
            .then_with(|| a.patient.cmp(&b.patient))
    });
    unpaid
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    /// Sum of insurer payments across all lines.
    pub insurance_paid_total: f64,
    /// Sum of the active benchmark metric across all lines.
    pub actual_total: f64,
    /// Sum of proxy * n across all groups.
    pub expected_total: f64,
    /// expected - actual.
    pub delta: f64,
}

pub fn totals(
    lines: &[CanonicalLine],
    stats: &BTreeMap<GroupKey, GroupStat>,
    benchmark: Benchmark,
) -> Totals {
    let insurance_paid_total = lines.iter().map(|l| l.insurance_paid).sum();
    let actual_total = lines.iter().map(|l| metric_of(l, benchmark)).sum();
    let expected_total = stats
        .values()
        .map(|stat| stat.proxy * stat.n as f64)
        .sum::<f64>();
    Totals {
        insurance_paid_total,
        actual_total,
        expected_total,
        delta: expected_total - actual_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{RawFields, canonical_line};

    fn line(
        patient: &str,
        charges: &str,
        paid: &str,
        balance: &str,
        adjustment: &str,
    ) -> CanonicalLine {
        canonical_line(&RawFields {
            procedure_code: "99213".to_string(),
            patient: patient.to_string(),
            charges: charges.to_string(),
            insurance_payment: paid.to_string(),
            balance: balance.to_string(),
            adjustment: adjustment.to_string(),
            ..RawFields::default()
        })
        .unwrap()
    }

    #[test]
    fn full_write_off_is_a_denial_under_either_benchmark() {
        let lines = vec![line("P1", "200", "0", "0", "-200")];
        for benchmark in [Benchmark::Paid, Benchmark::Allowed] {
            let found = denials(&lines, benchmark, false);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].reason, REASON_FULL_WRITE_OFF);
        }
    }

    #[test]
    fn zero_metric_with_positive_charges_is_a_denial() {
        // Paid is zero but balance keeps allowed positive: denial under the
        // paid benchmark only.
        let lines = vec![line("P1", "150", "0", "150", "0")];
        assert_eq!(denials(&lines, Benchmark::Paid, false).len(), 1);
        assert_eq!(
            denials(&lines, Benchmark::Paid, false)[0].reason,
            REASON_ZERO_BENCHMARK
        );
        assert!(denials(&lines, Benchmark::Allowed, false).is_empty());
    }

    #[test]
    fn paid_lines_are_not_denials() {
        let lines = vec![line("P1", "200", "80", "0", "-120")];
        assert!(denials(&lines, Benchmark::Paid, false).is_empty());
    }

    #[test]
    fn zero_paid_patient_aggregates_and_gap() {
        let lines = vec![
            line("P1", "100", "0", "100", "0"),
            line("P1", "200", "0", "200", "0"),
            line("P2", "100", "80", "0", "-20"),
        ];
        let unpaid = unpaid_patients(&lines, Benchmark::Allowed);
        assert_eq!(unpaid.len(), 1);
        let agg = &unpaid[0];
        assert_eq!(agg.patient, "P1");
        assert_eq!(agg.line_count, 2);
        assert_eq!(agg.charges_total, 300.0);
        assert_eq!(agg.insurance_paid_total, 0.0);
        // Benchmark=allowed totals 300 (balances), gap = 300 - 0.
        assert_eq!(agg.unpaid_gap, 300.0);
    }

    #[test]
    fn zero_charge_patients_do_not_qualify() {
        let lines = vec![line("P1", "0", "0", "0", "0")];
        assert!(unpaid_patients(&lines, Benchmark::Paid).is_empty());
    }

    #[test]
    fn blank_patient_lines_are_skipped_by_the_rollup() {
        let lines = vec![line("", "100", "0", "100", "0")];
        assert!(unpaid_patients(&lines, Benchmark::Paid).is_empty());
    }
}
