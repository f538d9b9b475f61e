use anyhow::{Context, Result};
use csv::Writer;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{AuditOutputs, EngineConfig};
use crate::ingest::IngestSummary;

fn fmt_money(value: f64) -> String {
    format!("{value:.2}")
}

fn fmt_pct(value: f64) -> String {
    format!("{value:.2}")
}

fn fmt_bool(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn fmt_frequencies(frequencies: &[(f64, usize)]) -> String {
    frequencies
        .iter()
        .map(|(value, count)| format!("{value:.2}x{count}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Writes through a `.tmp` sibling and renames, so a crashed run never
/// leaves a half-written report behind.
fn finish_atomic(tmp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp_path, path).with_context(|| {
        format!("Failed moving {} to {}", tmp_path.display(), path.display())
    })?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("report.csv");
    path.with_file_name(format!("{file_name}.tmp"))
}

fn write_group_stats(path: &Path, outputs: &AuditOutputs) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating {}", tmp_path.display()))?;
    writer
        .write_record([
            "payer",
            "procedure_code",
            "place_of_service",
            "modifiers",
            "units",
            "n",
            "proxy",
            "method",
            "median",
            "mean",
            "min",
            "max",
            "n_eq_charges",
            "decontaminated",
            "multi_modal",
            "near_tie",
            "top_frequencies",
        ])
        .context("Failed writing group stats header")?;
    for stat in &outputs.group_stats {
        writer
            .write_record([
                stat.key.payer.clone(),
                stat.key.procedure_code.clone(),
                stat.key.place_of_service.clone(),
                stat.key.modifiers.clone(),
                stat.key.units.clone().unwrap_or_default(),
                stat.n.to_string(),
                fmt_money(stat.proxy),
                stat.method.as_str().to_string(),
                fmt_money(stat.median),
                fmt_money(stat.mean),
                fmt_money(stat.min),
                fmt_money(stat.max),
                stat.n_eq_charges.to_string(),
                fmt_bool(stat.used_decontaminate).to_string(),
                fmt_bool(stat.multi_modal).to_string(),
                fmt_bool(stat.near_tie).to_string(),
                fmt_frequencies(&stat.top_frequencies),
            ])
            .context("Failed writing group stats row")?;
    }
    writer.flush().context("Failed flushing group stats writer")?;
    finish_atomic(&tmp_path, path)
}

fn write_issues(path: &Path, outputs: &AuditOutputs) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating {}", tmp_path.display()))?;
    writer
        .write_record([
            "line",
            "patient",
            "date_of_service",
            "group",
            "status",
            "deviation_pct",
            "metric",
            "proxy",
            "explanation",
            "derivation",
        ])
        .context("Failed writing issues header")?;
    for issue in &outputs.issues {
        writer
            .write_record([
                issue.line_index.to_string(),
                issue.patient.clone(),
                issue.service_date.clone(),
                issue.key.label(),
                issue.status.as_str().to_string(),
                fmt_pct(issue.deviation_pct),
                fmt_money(issue.metric),
                fmt_money(issue.proxy),
                issue.explanation.to_string(),
                issue.trail.summary(),
            ])
            .context("Failed writing issues row")?;
    }
    writer.flush().context("Failed flushing issues writer")?;
    finish_atomic(&tmp_path, path)
}

fn write_proxy_audits(path: &Path, outputs: &AuditOutputs) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating {}", tmp_path.display()))?;
    writer
        .write_record(["line", "group", "metric", "proxy", "gap", "reasons"])
        .context("Failed writing proxy audit header")?;
    for entry in &outputs.proxy_audits {
        writer
            .write_record([
                entry.line_index.to_string(),
                entry.key.label(),
                fmt_money(entry.metric),
                fmt_money(entry.proxy),
                fmt_money(entry.gap),
                entry.reasons.join("; "),
            ])
            .context("Failed writing proxy audit row")?;
    }
    writer.flush().context("Failed flushing proxy audit writer")?;
    finish_atomic(&tmp_path, path)
}

fn write_denials(path: &Path, outputs: &AuditOutputs) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating {}", tmp_path.display()))?;
    writer
        .write_record([
            "line",
            "patient",
            "group",
            "charges",
            "insurance_paid",
            "balance",
            "adjustment",
            "reason",
        ])
        .context("Failed writing denials header")?;
    for entry in &outputs.denials {
        writer
            .write_record([
                entry.line_index.to_string(),
                entry.patient.clone(),
                entry.key.label(),
                fmt_money(entry.charges),
                fmt_money(entry.insurance_paid),
                fmt_money(entry.balance),
                fmt_money(entry.adjustment),
                entry.reason.to_string(),
            ])
            .context("Failed writing denials row")?;
    }
    writer.flush().context("Failed flushing denials writer")?;
    finish_atomic(&tmp_path, path)
}

fn write_unpaid_patients(path: &Path, outputs: &AuditOutputs) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating {}", tmp_path.display()))?;
    writer
        .write_record([
            "patient",
            "lines",
            "charges_total",
            "allowed_total",
            "insurance_paid_total",
            "balance_total",
            "benchmark_total",
            "unpaid_gap",
        ])
        .context("Failed writing unpaid patients header")?;
    for agg in &outputs.unpaid_patients {
        writer
            .write_record([
                agg.patient.clone(),
                agg.line_count.to_string(),
                fmt_money(agg.charges_total),
                fmt_money(agg.allowed_total),
                fmt_money(agg.insurance_paid_total),
                fmt_money(agg.balance_total),
                fmt_money(agg.benchmark_total),
                fmt_money(agg.unpaid_gap),
            ])
            .context("Failed writing unpaid patients row")?;
    }
    writer
        .flush()
        .context("Failed flushing unpaid patients writer")?;
    finish_atomic(&tmp_path, path)
}

fn write_summary_json(
    path: &Path,
    outputs: &AuditOutputs,
    config: &EngineConfig,
    ingest: &IngestSummary,
) -> Result<()> {
    let summary = json!({
        "parameters": {
            "benchmark": config.benchmark.as_str(),
            "threshold_pct": config.threshold_pct,
            "decontaminate": config.decontaminate,
            "units_in_key": config.units_in_key,
        },
        "rows": {
            "total": ingest.total_rows,
            "retained": ingest.lines.len(),
            "skipped_no_procedure_code": ingest.skipped_no_code,
        },
        "counts": {
            "groups": outputs.group_stats.len(),
            "issues": outputs.issues.len(),
            "proxy_audits": outputs.proxy_audits.len(),
            "denials": outputs.denials.len(),
            "unpaid_patients": outputs.unpaid_patients.len(),
        },
        "totals": {
            "insurance_paid": outputs.totals.insurance_paid_total,
            "actual": outputs.totals.actual_total,
            "expected": outputs.totals.expected_total,
            "delta": outputs.totals.delta,
        },
    });
    let tmp_path = tmp_sibling(path);
    let body = serde_json::to_string_pretty(&summary).context("Failed encoding summary JSON")?;
    fs::write(&tmp_path, body).with_context(|| format!("Failed writing {}", tmp_path.display()))?;
    finish_atomic(&tmp_path, path)
}

/// Writes the five output collections plus the run summary under `out_dir`.
pub fn write_reports(
    out_dir: &Path,
    outputs: &AuditOutputs,
    config: &EngineConfig,
    ingest: &IngestSummary,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed creating report dir {}", out_dir.display()))?;

    let targets: [(&str, fn(&Path, &AuditOutputs) -> Result<()>); 5] = [
        ("group_stats.csv", write_group_stats),
        ("issues.csv", write_issues),
        ("proxy_audits.csv", write_proxy_audits),
        ("denials.csv", write_denials),
        ("unpaid_patients.csv", write_unpaid_patients),
    ];
    for (name, write_fn) in targets {
        let path = out_dir.join(name);
        write_fn(&path, outputs)?;
        println!("Wrote {}", path.display());
    }

    let summary_path = out_dir.join("summary.json");
    write_summary_json(&summary_path, outputs, config, ingest)?;
    println!("Wrote {}", summary_path.display());
    Ok(())
}

pub fn print_summary(outputs: &AuditOutputs, config: &EngineConfig, ingest: &IngestSummary) {
    use crate::classify::Status;

    let overpaid = outputs
        .issues
        .iter()
        .filter(|i| i.status == Status::Overpaid)
        .count();
    let underpaid = outputs
        .issues
        .iter()
        .filter(|i| i.status == Status::Underpaid)
        .count();

    println!(
        "Benchmark={} threshold={}% decontaminate={} units_in_key={}",
        config.benchmark.as_str(),
        config.threshold_pct,
        config.decontaminate,
        config.units_in_key
    );
    println!(
        "Rows: {} read, {} retained, {} skipped (blank procedure code)",
        ingest.total_rows,
        ingest.lines.len(),
        ingest.skipped_no_code
    );
    println!(
        "Groups: {} | Issues: {} ({} overpaid, {} underpaid) | Proxy audits: {} | Denials: {} | Unpaid patients: {}",
        outputs.group_stats.len(),
        outputs.issues.len(),
        overpaid,
        underpaid,
        outputs.proxy_audits.len(),
        outputs.denials.len(),
        outputs.unpaid_patients.len()
    );
    println!(
        "Totals: paid={:.2} actual={:.2} expected={:.2} delta={:.2}",
        outputs.totals.insurance_paid_total,
        outputs.totals.actual_total,
        outputs.totals.expected_total,
        outputs.totals.delta
    );
}
