use crate::constants::{DEFAULT_UNITS, NO_MODIFIERS, UNITED_HEALTH_CARE, UNITED_HEALTH_CARE_ALIASES};

/// One billing line after field cleanup. Everything downstream (grouping,
/// proxy selection, classification, audits) operates on these.
#[derive(Debug, Clone)]
pub struct CanonicalLine {
    pub payer: String,
    pub procedure_code: String,
    pub place_of_service: String,
    pub modifiers: String,
    pub units: String,
    pub patient: String,
    pub service_date: String,
    pub charges: f64,
    pub insurance_paid: f64,
    pub patient_payment: f64,
    pub balance: f64,
    pub allowed: f64,
    pub adjustment: f64,
}

/// Raw field values for one record, before normalization. Produced by the
/// CSV ingest layer; any field may be blank.
#[derive(Debug, Clone, Default)]
pub struct RawFields {
    pub payer: String,
    pub procedure_code: String,
    pub place_of_service: String,
    pub modifiers: String,
    pub units: String,
    pub patient: String,
    pub service_date: String,
    pub charges: String,
    pub insurance_payment: String,
    pub patient_payment: String,
    pub balance: String,
    pub adjustment: String,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Parses a money-ish field. Currency symbols, thousands separators, and
/// whitespace are stripped; anything unparseable degrades to 0.
pub fn parse_money(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Splits a raw modifier field on commas/whitespace, uppercases, dedupes,
/// sorts, and joins with `+`. An empty set renders as the fixed sentinel.
pub fn normalize_modifiers(raw: &str) -> String {
    let mut mods: Vec<String> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|token| token.trim().to_ascii_uppercase())
        .filter(|token| !token.is_empty())
        .collect();
    mods.sort();
    mods.dedup();
    if mods.is_empty() {
        NO_MODIFIERS.to_string()
    } else {
        mods.join("+")
    }
}

fn alias_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn strip_inc_suffix(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    for suffix in [", inc.", ", inc", " inc.", " inc"] {
        if lower.ends_with(suffix) && name.len() > suffix.len() {
            return name[..name.len() - suffix.len()].trim_end().to_string();
        }
    }
    name.to_string()
}

/// Canonicalizes a payer name. Known United Health Care variants collapse to
/// one canonical spelling; other names get whitespace collapsed, hyphen
/// spacing tightened, and a trailing "Inc" suffix removed.
pub fn normalize_payer(raw: &str) -> String {
    let token = alias_token(raw);
    if UNITED_HEALTH_CARE_ALIASES.iter().any(|alias| *alias == token) {
        return UNITED_HEALTH_CARE.to_string();
    }
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let hyphenated = collapsed
        .replace(" - ", "-")
        .replace("- ", "-")
        .replace(" -", "-");
    strip_inc_suffix(hyphenated.trim())
}

/// Builds a canonical line from raw field values. Returns None when the
/// procedure code is empty after trimming; such lines never reach grouping.
pub fn canonical_line(raw: &RawFields) -> Option<CanonicalLine> {
    let procedure_code = raw.procedure_code.trim().to_string();
    if procedure_code.is_empty() {
        return None;
    }

    let insurance_paid = parse_money(&raw.insurance_payment).abs();
    let patient_payment = parse_money(&raw.patient_payment);
    let balance = parse_money(&raw.balance);
    let allowed = round2(insurance_paid + patient_payment.max(0.0) + balance.max(0.0));

    let units = {
        let trimmed = raw.units.trim();
        if trimmed.is_empty() {
            DEFAULT_UNITS.to_string()
        } else {
            trimmed.to_string()
        }
    };

    Some(CanonicalLine {
        payer: normalize_payer(&raw.payer),
        procedure_code,
        place_of_service: raw.place_of_service.trim().to_string(),
        modifiers: normalize_modifiers(&raw.modifiers),
        units,
        patient: raw.patient.trim().to_string(),
        service_date: raw.service_date.trim().to_string(),
        charges: parse_money(&raw.charges),
        insurance_paid,
        patient_payment,
        balance,
        allowed,
        adjustment: parse_money(&raw.adjustment),
    })
}
