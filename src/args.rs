use clap::Parser;

use crate::aggregate::Benchmark;

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if !(1.0..=30.0).contains(&value) {
        return Err(format!("threshold must be between 1 and 30, got {value}"));
    }
    Ok(value)
}

#[derive(Debug, Parser)]
#[command(name = "payment_audit")]
#[command(
    about = "Benchmark billing line payments against group-typical values and flag over/underpayments"
)]
pub struct Args {
    /// Billing export CSV path. Required unless the run only mutates overrides.
    #[arg(long)]
    pub input_csv: Option<std::path::PathBuf>,

    /// Directory for report CSVs and summary.json.
    #[arg(long, default_value = "reports")]
    pub output_dir: std::path::PathBuf,

    /// Metric benchmarked against the group proxy.
    #[arg(long, value_enum, default_value_t = Benchmark::Paid)]
    pub benchmark: Benchmark,

    /// Deviation threshold percent (1-30).
    #[arg(long, default_value_t = 10.0, value_parser = parse_threshold)]
    pub threshold_pct: f64,

    /// Exclude allowed==charges lines from proxy candidates (allowed benchmark only).
    #[arg(long, default_value_t = false)]
    pub decontaminate: bool,

    /// Include units in the grouping key. Changes every group identity, so
    /// overrides stored under the other variant will no longer match.
    #[arg(long, default_value_t = false)]
    pub units_in_key: bool,

    /// SQLite database holding manual proxy overrides.
    #[arg(long, default_value = "data/overrides.sqlite")]
    pub overrides_db: std::path::PathBuf,

    /// Store a manual proxy override, formatted "GROUP LABEL=VALUE".
    ///
    /// The label is the group key rendering used in reports, e.g.
    /// "Aetna | 99213 | 11 | 25+GT" (with a trailing " | UNITS" segment when
    /// --units-in-key is active). May be repeated.
    #[arg(long, value_name = "LABEL=VALUE")]
    pub set_override: Vec<String>,

    /// Remove the override stored for a group label. May be repeated.
    #[arg(long, value_name = "LABEL")]
    pub clear_override: Vec<String>,

    /// Remove every stored override.
    #[arg(long, default_value_t = false)]
    pub clear_all_overrides: bool,

    /// Look up one group's resolved proxy after the recompute, formatted
    /// "payer|procedure|pos|modifiers|units".
    #[arg(long, value_name = "DESCRIPTOR")]
    pub lookup: Option<String>,

    /// Print the console summary only, skip writing report files.
    #[arg(long, default_value_t = false)]
    pub summary_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds_are_enforced() {
        assert!(parse_threshold("10").is_ok());
        assert!(parse_threshold("1").is_ok());
        assert!(parse_threshold("30").is_ok());
        assert!(parse_threshold("0.5").is_err());
        assert!(parse_threshold("31").is_err());
        assert!(parse_threshold("abc").is_err());
    }
}
