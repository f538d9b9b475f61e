mod aggregate;
mod args;
mod audit;
mod classify;
mod constants;
mod engine;
mod ingest;
mod key;
mod normalize;
mod overrides;
mod proxy;
mod report;

use anyhow::{Context, Result, bail};
use clap::Parser;

use args::Args;
use engine::{EngineConfig, LookupResult};
use key::GroupKey;
use overrides::OverrideStore;

/// Splits a "LABEL=VALUE" override argument at the last `=`, so an `=`
/// inside an odd payer name cannot shift the value boundary.
fn parse_override_arg(raw: &str) -> Result<(String, f64)> {
    let Some((label, value)) = raw.rsplit_once('=') else {
        bail!("Override `{raw}` must be formatted LABEL=VALUE");
    };
    let label = label.trim();
    if label.is_empty() {
        bail!("Override `{raw}` has an empty group label");
    }
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Override value in `{raw}` is not a number"))?;
    Ok((label.to_string(), value))
}

/// Parses a "payer|procedure|pos|modifiers|units" lookup descriptor. Missing
/// trailing segments default to empty (units to "1" inside key building).
fn parse_lookup_descriptor(raw: &str, units_in_key: bool) -> GroupKey {
    let mut parts = raw.splitn(5, '|').map(str::trim);
    let payer = parts.next().unwrap_or("");
    let procedure = parts.next().unwrap_or("");
    let pos = parts.next().unwrap_or("");
    let modifiers = parts.next().unwrap_or("");
    let units = parts.next().unwrap_or("");
    GroupKey::from_descriptor(payer, procedure, pos, modifiers, units, units_in_key)
}

fn apply_override_mutations(args: &Args, store: &OverrideStore) -> Result<bool> {
    let mut mutated = false;

    if args.clear_all_overrides {
        let removed = store.clear_all()?;
        println!("Cleared {removed} stored override(s)");
        mutated = true;
    }

    for label in &args.clear_override {
        if store.delete(label)? {
            println!("Cleared override for {label}");
        } else {
            println!("No override stored for {label}");
        }
        mutated = true;
    }

    for raw in &args.set_override {
        let (label, value) = parse_override_arg(raw)?;
        store.set(&label, value)?;
        println!("Stored override {label} = {value:.2}");
        mutated = true;
    }

    Ok(mutated)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = OverrideStore::open(&args.overrides_db)?;
    let mutated = apply_override_mutations(&args, &store)?;

    let Some(input_csv) = &args.input_csv else {
        if mutated {
            return Ok(());
        }
        bail!("--input-csv is required unless the run only mutates overrides");
    };

    let config = EngineConfig {
        benchmark: args.benchmark,
        threshold_pct: args.threshold_pct,
        decontaminate: args.decontaminate,
        units_in_key: args.units_in_key,
    };

    let ingested = ingest::read_billing_csv(input_csv)?;
    println!(
        "Read {} row(s) from {} ({} retained, {} skipped for blank procedure code)",
        ingested.total_rows,
        input_csv.display(),
        ingested.lines.len(),
        ingested.skipped_no_code
    );

    let override_map = store.load_all()?;
    if !override_map.is_empty() {
        println!("Loaded {} stored override(s)", override_map.len());
    }

    let outputs = engine::run_audit(&ingested.lines, &override_map, &config);
    report::print_summary(&outputs, &config, &ingested);

    if !args.summary_only {
        report::write_reports(&args.output_dir, &outputs, &config, &ingested)?;
    }

    if let Some(descriptor) = &args.lookup {
        let key = parse_lookup_descriptor(descriptor, args.units_in_key);
        match engine::lookup_group(&outputs, &key) {
            LookupResult::Found(info) => {
                let body = serde_json::to_string_pretty(&info)
                    .context("Failed encoding lookup result")?;
                println!("{body}");
            }
            LookupResult::NotFound => {
                println!(
                    "No group matches {} under the active key variant",
                    key.label()
                );
            }
        }
    }

    Ok(())
}
