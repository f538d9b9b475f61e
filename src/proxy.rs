use crate::aggregate::{allowed_equals_charges, frequency_ranking};
use crate::normalize::CanonicalLine;

/// How a group's proxy was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    /// Most frequent value, top frequency strictly ahead of the second.
    Mode,
    /// Frequencies tied at the top; broken toward the higher dollar amount
    /// to avoid falsely flagging legitimate payments as underpaid.
    ModeTieMax,
    /// Two or fewer observations; small samples are assumed to reflect
    /// best-case payment, so take the maximum.
    MaxWhenFew,
    /// Manually supplied override replaced the computed value.
    Override,
}

impl ProxyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMethod::Mode => "mode",
            ProxyMethod::ModeTieMax => "mode (tie→max)",
            ProxyMethod::MaxWhenFew => "max_when_few",
            ProxyMethod::Override => "override",
        }
    }
}

/// Selects a proxy from candidate metric values in cents. Pure; grouping and
/// override concerns live with the caller. Returns None only for an empty
/// candidate list, which callers prevent for any group with at least one line.
pub fn select_proxy(candidates: &[i64]) -> Option<(i64, ProxyMethod)> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() <= 2 {
        let max = candidates.iter().copied().max()?;
        return Some((max, ProxyMethod::MaxWhenFew));
    }

    let ranked = frequency_ranking(candidates);
    let (top_value, top_count) = ranked[0];
    let method = match ranked.get(1) {
        Some((_, second_count)) if *second_count == top_count => ProxyMethod::ModeTieMax,
        _ => ProxyMethod::Mode,
    };
    Some((top_value, method))
}

/// Decontamination for the allowed benchmark: when a group mixes
/// allowed≈charges lines with allowed≠charges lines, the proxy candidates
/// narrow to the latter. This guards against upstream exports that populated
/// "allowed" from list charges instead of a contracted rate. Returns None
/// when no narrowing applies (uniform group, or narrowing would empty the
/// list), in which case the caller keeps the full candidate list.
pub fn decontaminated_metrics<'a>(
    lines: impl Iterator<Item = &'a CanonicalLine> + Clone,
) -> Option<Vec<&'a CanonicalLine>> {
    let has_contaminated = lines.clone().any(allowed_equals_charges);
    let clean: Vec<&CanonicalLine> = lines.filter(|l| !allowed_equals_charges(l)).collect();
    if has_contaminated && !clean.is_empty() {
        Some(clean)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{RawFields, canonical_line};

    fn cents(values: &[i64]) -> Vec<i64> {
        values.to_vec()
    }

    #[test]
    fn empty_candidates_yield_nothing() {
        assert!(select_proxy(&[]).is_none());
    }

    #[test]
    fn one_or_two_candidates_take_the_maximum() {
        assert_eq!(select_proxy(&cents(&[5000])), Some((5000, ProxyMethod::MaxWhenFew)));
        assert_eq!(
            select_proxy(&cents(&[5000, 8000])),
            Some((8000, ProxyMethod::MaxWhenFew))
        );
    }

    #[test]
    fn clear_mode_wins_above_two_candidates() {
        assert_eq!(
            select_proxy(&cents(&[10000, 10000, 12000])),
            Some((10000, ProxyMethod::Mode))
        );
    }

    #[test]
    fn frequency_tie_breaks_toward_higher_value() {
        assert_eq!(
            select_proxy(&cents(&[10000, 10000, 12000, 12000])),
            Some((12000, ProxyMethod::ModeTieMax))
        );
    }

    #[test]
    fn all_distinct_values_are_a_full_tie() {
        let (value, method) = select_proxy(&cents(&[9000, 10000, 11000])).unwrap();
        assert_eq!(value, 11000);
        assert_eq!(method, ProxyMethod::ModeTieMax);
    }

    #[test]
    fn proxy_is_always_drawn_from_candidates() {
        let candidates = cents(&[7300, 8100, 8100, 9900, 7300, 10000]);
        let (value, _) = select_proxy(&candidates).unwrap();
        assert!(candidates.contains(&value));
    }

    fn line(charges: &str, paid: &str, balance: &str) -> CanonicalLine {
        canonical_line(&RawFields {
            procedure_code: "99213".to_string(),
            charges: charges.to_string(),
            insurance_payment: paid.to_string(),
            balance: balance.to_string(),
            ..RawFields::default()
        })
        .unwrap()
    }

    #[test]
    fn mixed_group_narrows_to_clean_lines() {
        // Two allowed==charges lines, two contracted-rate lines.
        let lines = vec![
            line("200", "200", "0"),
            line("200", "200", "0"),
            line("200", "80", "0"),
            line("200", "85", "0"),
        ];
        let narrowed = decontaminated_metrics(lines.iter()).unwrap();
        assert_eq!(narrowed.len(), 2);
        assert!(narrowed.iter().all(|l| l.allowed < 100.0));
    }

    #[test]
    fn uniform_groups_do_not_narrow() {
        let all_clean = vec![line("200", "80", "0"), line("200", "85", "0")];
        assert!(decontaminated_metrics(all_clean.iter()).is_none());

        let all_contaminated = vec![line("200", "200", "0"), line("200", "200", "0")];
        assert!(decontaminated_metrics(all_contaminated.iter()).is_none());
    }
}
