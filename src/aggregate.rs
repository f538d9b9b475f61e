use std::collections::{BTreeMap, HashMap};

use crate::key::GroupKey;
use crate::normalize::{CanonicalLine, to_cents};
use crate::proxy::ProxyMethod;

/// Benchmark metric compared against the group proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Benchmark {
    /// Insurer payment per line.
    Paid,
    /// Reconstructed allowed amount per line.
    Allowed,
}

impl Benchmark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Benchmark::Paid => "paid",
            Benchmark::Allowed => "allowed",
        }
    }
}

impl std::fmt::Display for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn metric_of(line: &CanonicalLine, benchmark: Benchmark) -> f64 {
    match benchmark {
        Benchmark::Paid => line.insurance_paid,
        Benchmark::Allowed => line.allowed,
    }
}

/// Lines where allowed tracks charges this closely are treated as
/// charge-contaminated for decontamination and audit purposes.
pub const EQ_CHARGES_TOLERANCE: f64 = 0.01;

pub fn allowed_equals_charges(line: &CanonicalLine) -> bool {
    (line.allowed - line.charges).abs() <= EQ_CHARGES_TOLERANCE
}

/// One group's distribution statistics plus its resolved proxy.
#[derive(Debug, Clone)]
pub struct GroupStat {
    pub key: GroupKey,
    pub n: usize,
    pub proxy: f64,
    pub method: ProxyMethod,
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub n_eq_charges: usize,
    pub used_decontaminate: bool,
    /// (value, frequency) ranked by frequency desc then value desc, over the
    /// unfiltered metric list rounded to cents.
    pub top_frequencies: Vec<(f64, usize)>,
    pub multi_modal: bool,
    pub near_tie: bool,
}

/// Buckets line indices by grouping key. BTreeMap keeps group iteration
/// deterministic without a separate sort pass.
pub fn bucket_lines(lines: &[CanonicalLine], units_in_key: bool) -> BTreeMap<GroupKey, Vec<usize>> {
    let mut buckets: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for (idx, line) in lines.iter().enumerate() {
        buckets
            .entry(GroupKey::for_line(line, units_in_key))
            .or_default()
            .push(idx);
    }
    buckets
}

/// Ranks cent values by (frequency desc, value desc).
pub fn frequency_ranking(cents: &[i64]) -> Vec<(i64, usize)> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for value in cents {
        *counts.entry(*value).or_insert(0) += 1;
    }
    let mut ranked: Vec<(i64, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    ranked
}

#[derive(Debug, Clone, Default)]
pub struct DistributionStats {
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub top_frequencies: Vec<(f64, usize)>,
    pub multi_modal: bool,
    pub near_tie: bool,
}

/// Median/mean/min/max plus the ranked frequency table over the unfiltered
/// metric list. Tie flags come from the top two ranked frequencies.
pub fn distribution_stats(metrics: &[f64]) -> DistributionStats {
    if metrics.is_empty() {
        return DistributionStats::default();
    }

    let mut sorted = metrics.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let min = sorted[0];
    let max = sorted[n - 1];

    let cents: Vec<i64> = metrics.iter().map(|m| to_cents(*m)).collect();
    let ranked = frequency_ranking(&cents);
    let top = ranked.first().map(|(_, count)| *count).unwrap_or(0);
    let second = ranked.get(1).map(|(_, count)| *count).unwrap_or(0);
    let multi_modal = ranked.len() >= 2 && top == second;
    let near_tie = ranked.len() >= 2 && (second as f64) >= 0.6 * top as f64;
    let top_frequencies = ranked
        .into_iter()
        .map(|(value, count)| (value as f64 / 100.0, count))
        .collect();

    DistributionStats {
        median,
        mean,
        min,
        max,
        top_frequencies,
        multi_modal,
        near_tie,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{RawFields, canonical_line};

    #[test]
    fn frequency_ranking_orders_by_count_then_value() {
        let ranked = frequency_ranking(&[10000, 10000, 12000, 9000, 12000, 12000]);
        assert_eq!(ranked[0], (12000, 3));
        assert_eq!(ranked[1], (10000, 2));
        assert_eq!(ranked[2], (9000, 1));
    }

    #[test]
    fn frequency_ranking_breaks_count_ties_toward_higher_value() {
        let ranked = frequency_ranking(&[10000, 12000, 10000, 12000]);
        assert_eq!(ranked[0], (12000, 2));
        assert_eq!(ranked[1], (10000, 2));
    }

    #[test]
    fn stats_over_odd_and_even_lists() {
        let odd = distribution_stats(&[100.0, 120.0, 100.0]);
        assert_eq!(odd.median, 100.0);
        assert_eq!(odd.min, 100.0);
        assert_eq!(odd.max, 120.0);
        assert!((odd.mean - 106.666_666).abs() < 0.001);

        let even = distribution_stats(&[50.0, 80.0]);
        assert_eq!(even.median, 65.0);
        assert_eq!(even.mean, 65.0);
    }

    #[test]
    fn multi_modal_requires_equal_top_frequencies() {
        let tied = distribution_stats(&[100.0, 100.0, 120.0, 120.0]);
        assert!(tied.multi_modal);
        assert!(tied.near_tie);

        let clear = distribution_stats(&[100.0, 100.0, 100.0, 120.0]);
        assert!(!clear.multi_modal);
        assert!(!clear.near_tie);
    }

    #[test]
    fn near_tie_at_sixty_percent_of_top() {
        // top freq 5, second 3 -> 0.6 exactly.
        let metrics = [
            100.0, 100.0, 100.0, 100.0, 100.0, 90.0, 90.0, 90.0,
        ];
        let stats = distribution_stats(&metrics);
        assert!(stats.near_tie);
        assert!(!stats.multi_modal);
    }

    #[test]
    fn single_value_group_has_no_tie_flags() {
        let stats = distribution_stats(&[42.0]);
        assert!(!stats.multi_modal);
        assert!(!stats.near_tie);
        assert_eq!(stats.top_frequencies, vec![(42.0, 1)]);
    }

    #[test]
    fn eq_charges_uses_cent_tolerance() {
        let line = canonical_line(&RawFields {
            procedure_code: "99213".to_string(),
            charges: "100.005".to_string(),
            insurance_payment: "100.00".to_string(),
            ..RawFields::default()
        })
        .unwrap();
        // allowed 100.00 vs charges 100.005 sits inside the cent tolerance.
        assert!(allowed_equals_charges(&line));
    }

    #[test]
    fn bucket_order_is_independent_of_arrival_order() {
        let mk = |payer: &str, code: &str| {
            canonical_line(&RawFields {
                payer: payer.to_string(),
                procedure_code: code.to_string(),
                ..RawFields::default()
            })
            .unwrap()
        };
        let forward = vec![mk("Aetna", "99213"), mk("Cigna", "99214"), mk("Aetna", "99213")];
        let reverse: Vec<_> = forward.iter().rev().cloned().collect();
        let a: Vec<_> = bucket_lines(&forward, false).into_keys().collect();
        let b: Vec<_> = bucket_lines(&reverse, false).into_keys().collect();
        assert_eq!(a, b);
    }
}
