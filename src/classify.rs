use serde::Serialize;

use crate::key::GroupKey;
use crate::proxy::ProxyMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    WithinRange,
    Underpaid,
    Overpaid,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::WithinRange => "Within expected range",
            Status::Underpaid => "Underpaid",
            Status::Overpaid => "Overpaid",
        }
    }
}

const EXPLAIN_WITHIN: &str = "Payment aligns with the group's typical value.";
const EXPLAIN_UNDERPAID: &str = "Paid below the group's typical value; check for a missing modifier, \
bundling, a site-of-service mismatch, or unit miscoding.";
const EXPLAIN_OVERPAID: &str = "Paid above the group's typical value; check for a code variant, a \
bilateral/bundle paid separately, or a site-of-service mismatch.";

/// How the group's proxy was derived, carried on every issue for audit
/// display.
#[derive(Debug, Clone)]
pub struct DerivationTrail {
    pub method: ProxyMethod,
    pub n: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
    pub top_frequencies: Vec<(f64, usize)>,
    pub multi_modal: bool,
    pub near_tie: bool,
    pub used_decontaminate: bool,
}

impl DerivationTrail {
    pub fn summary(&self) -> String {
        let top = self
            .top_frequencies
            .iter()
            .take(3)
            .map(|(value, count)| format!("{value:.2}x{count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!(
            "method={} n={} range={:.2}..{:.2} median={:.2} mean={:.2} top=[{}]",
            self.method.as_str(),
            self.n,
            self.min,
            self.max,
            self.median,
            self.mean,
            top
        );
        if self.used_decontaminate {
            out.push_str(" decontaminated");
        }
        if self.multi_modal {
            out.push_str(" [multi-modal]");
        } else if self.near_tie {
            out.push_str(" [near tie]");
        }
        out
    }
}

/// Per-line classification result.
#[derive(Debug, Clone)]
pub struct Issue {
    pub line_index: usize,
    pub key: GroupKey,
    pub patient: String,
    pub service_date: String,
    pub metric: f64,
    pub proxy: f64,
    pub deviation_pct: f64,
    pub status: Status,
    pub explanation: &'static str,
    pub trail: DerivationTrail,
}

/// Deviation of a line metric from its group proxy, in percent. Defined as
/// exactly 0 when the proxy is 0 so a zero baseline never produces an
/// undefined or infinite result.
pub fn deviation_pct(metric: f64, proxy: f64) -> f64 {
    if proxy == 0.0 {
        0.0
    } else {
        (metric - proxy) / proxy * 100.0
    }
}

pub fn classify(deviation_pct: f64, threshold_pct: f64) -> Status {
    if deviation_pct < -threshold_pct {
        Status::Underpaid
    } else if deviation_pct > threshold_pct {
        Status::Overpaid
    } else {
        Status::WithinRange
    }
}

pub fn explanation_for(status: Status) -> &'static str {
    match status {
        Status::WithinRange => EXPLAIN_WITHIN,
        Status::Underpaid => EXPLAIN_UNDERPAID,
        Status::Overpaid => EXPLAIN_OVERPAID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_proxy_forces_zero_deviation() {
        assert_eq!(deviation_pct(130.0, 0.0), 0.0);
        assert_eq!(classify(deviation_pct(130.0, 0.0), 10.0), Status::WithinRange);
    }

    #[test]
    fn threshold_boundaries_are_inclusive_for_within() {
        assert_eq!(classify(10.0, 10.0), Status::WithinRange);
        assert_eq!(classify(-10.0, 10.0), Status::WithinRange);
        assert_eq!(classify(10.01, 10.0), Status::Overpaid);
        assert_eq!(classify(-10.01, 10.0), Status::Underpaid);
    }

    #[test]
    fn thirty_percent_over_is_overpaid_at_default_threshold() {
        let dev = deviation_pct(130.0, 100.0);
        assert!((dev - 30.0).abs() < 1e-9);
        assert_eq!(classify(dev, 10.0), Status::Overpaid);
    }

    #[test]
    fn trail_summary_names_method_and_warnings() {
        let trail = DerivationTrail {
            method: ProxyMethod::Mode,
            n: 3,
            min: 100.0,
            max: 120.0,
            median: 100.0,
            mean: 106.67,
            top_frequencies: vec![(100.0, 2), (120.0, 1)],
            multi_modal: false,
            near_tie: true,
            used_decontaminate: false,
        };
        let summary = trail.summary();
        assert!(summary.contains("method=mode"));
        assert!(summary.contains("top=[100.00x2, 120.00x1]"));
        assert!(summary.ends_with("[near tie]"));
    }
}
