/// Rendered modifier set for a line that carries no billing modifiers.
pub const NO_MODIFIERS: &str = "NONE";

/// Units value assumed when the units/days field is blank.
pub const DEFAULT_UNITS: &str = "1";

/// Canonical payer name for the United Health Care family of spellings.
pub const UNITED_HEALTH_CARE: &str = "United Health Care";

/// Known spelling/punctuation variants of United Health Care, stored as
/// uppercase alphanumeric-only tokens so that matching ignores spacing and
/// punctuation. Extend this table rather than adding inline conditionals.
pub const UNITED_HEALTH_CARE_ALIASES: &[&str] = &[
    "UHC",
    "UNITEDHEALTHCARE",
    "UNITEDHEALTH",
    "UNITEDHEALTHGROUP",
    "UNITEDHEALTHCAREINC",
    "UNITEDHCARE",
];
