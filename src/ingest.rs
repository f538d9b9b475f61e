use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::time::Duration;

use crate::normalize::{CanonicalLine, RawFields, canonical_line};

/// Canonical form of a header token: trimmed, whitespace runs collapsed to
/// `_`, everything but ASCII alphanumerics/underscore stripped, uppercased.
/// Field matching is by canonical-token equality, so header spelling
/// variation ("Ins. Payment", "insurance payment") lands on the same field.
pub fn canonical_header(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

const PAYER_HEADERS: &[&str] = &[
    "payer",
    "payer name",
    "insurance",
    "insurance company",
    "insurance name",
    "carrier",
];
const PROCEDURE_HEADERS: &[&str] = &[
    "procedure code",
    "proc code",
    "cpt",
    "cpt code",
    "hcpcs",
    "hcpcs code",
    "procedure",
    "code",
];
const POS_HEADERS: &[&str] = &[
    "place of service",
    "pos",
    "pos code",
    "service location",
    "facility code",
];
const MODIFIER_HEADERS: &[&str] = &["modifiers", "modifier", "mods", "mod", "modifier codes"];
const UNITS_HEADERS: &[&str] = &["units", "unit", "days units", "days or units", "qty", "quantity"];
const PATIENT_HEADERS: &[&str] = &["patient", "patient name", "patient id", "member", "member name"];
const DATE_HEADERS: &[&str] = &["date of service", "dos", "service date", "from date"];
const CHARGES_HEADERS: &[&str] = &[
    "charges",
    "charge",
    "charge amount",
    "billed",
    "billed amount",
    "total charges",
];
const INSURANCE_PAYMENT_HEADERS: &[&str] = &[
    "insurance payment",
    "insurance paid",
    "ins paid",
    "ins payment",
    "payment",
    "paid",
    "carrier paid",
];
const PATIENT_PAYMENT_HEADERS: &[&str] = &[
    "patient payment",
    "patient paid",
    "pt paid",
    "pt payment",
];
const BALANCE_HEADERS: &[&str] = &["balance", "bal", "remaining balance", "outstanding balance"];
const ADJUSTMENT_HEADERS: &[&str] = &[
    "adjustment",
    "adjustments",
    "adj",
    "write off",
    "writeoff",
    "contractual adjustment",
];

fn find_header_index(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    let canonical: Vec<String> = headers.iter().map(canonical_header).collect();
    for alias in aliases {
        let target = canonical_header(alias);
        if let Some((idx, _)) = canonical.iter().enumerate().find(|(_, h)| **h == target) {
            return Some(idx);
        }
    }
    None
}

fn field_at(record: &StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .unwrap_or("")
        .to_string()
}

#[derive(Debug, Clone, Copy)]
struct FieldIndexes {
    payer: Option<usize>,
    procedure_code: Option<usize>,
    place_of_service: Option<usize>,
    modifiers: Option<usize>,
    units: Option<usize>,
    patient: Option<usize>,
    service_date: Option<usize>,
    charges: Option<usize>,
    insurance_payment: Option<usize>,
    patient_payment: Option<usize>,
    balance: Option<usize>,
    adjustment: Option<usize>,
}

impl FieldIndexes {
    fn resolve(headers: &StringRecord) -> FieldIndexes {
        FieldIndexes {
            payer: find_header_index(headers, PAYER_HEADERS),
            procedure_code: find_header_index(headers, PROCEDURE_HEADERS),
            place_of_service: find_header_index(headers, POS_HEADERS),
            modifiers: find_header_index(headers, MODIFIER_HEADERS),
            units: find_header_index(headers, UNITS_HEADERS),
            patient: find_header_index(headers, PATIENT_HEADERS),
            service_date: find_header_index(headers, DATE_HEADERS),
            charges: find_header_index(headers, CHARGES_HEADERS),
            insurance_payment: find_header_index(headers, INSURANCE_PAYMENT_HEADERS),
            patient_payment: find_header_index(headers, PATIENT_PAYMENT_HEADERS),
            balance: find_header_index(headers, BALANCE_HEADERS),
            adjustment: find_header_index(headers, ADJUSTMENT_HEADERS),
        }
    }

    fn raw_fields(&self, record: &StringRecord) -> RawFields {
        RawFields {
            payer: field_at(record, self.payer),
            procedure_code: field_at(record, self.procedure_code),
            place_of_service: field_at(record, self.place_of_service),
            modifiers: field_at(record, self.modifiers),
            units: field_at(record, self.units),
            patient: field_at(record, self.patient),
            service_date: field_at(record, self.service_date),
            charges: field_at(record, self.charges),
            insurance_payment: field_at(record, self.insurance_payment),
            patient_payment: field_at(record, self.patient_payment),
            balance: field_at(record, self.balance),
            adjustment: field_at(record, self.adjustment),
        }
    }
}

#[derive(Debug)]
pub struct IngestSummary {
    pub lines: Vec<CanonicalLine>,
    pub total_rows: usize,
    pub skipped_no_code: usize,
}

fn apply_ingest_progress_style(progress: &ProgressBar) {
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} {prefix:.bold} [{elapsed_precise}] {pos} rows {msg}")
    {
        progress.set_style(style);
    }
}

fn read_lines<R: Read>(reader: R, progress: &ProgressBar, source: &str) -> Result<IngestSummary> {
    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader
        .headers()
        .with_context(|| format!("Failed reading CSV headers from {source}"))?
        .clone();
    let indexes = FieldIndexes::resolve(&headers);

    let mut lines = Vec::new();
    let mut total_rows = 0usize;
    let mut skipped_no_code = 0usize;
    for result in csv_reader.records() {
        let record = result.with_context(|| format!("Failed reading CSV row from {source}"))?;
        total_rows += 1;
        progress.inc(1);
        match canonical_line(&indexes.raw_fields(&record)) {
            Some(line) => lines.push(line),
            None => skipped_no_code += 1,
        }
    }

    Ok(IngestSummary {
        lines,
        total_rows,
        skipped_no_code,
    })
}

/// Reads a billing export CSV into canonical lines. Rows whose procedure
/// code is blank are counted and dropped; numeric field noise degrades to 0
/// inside normalization, so ingestion only fails on I/O or malformed CSV.
pub fn read_billing_csv(path: &Path) -> Result<IngestSummary> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed opening billing CSV {}", path.display()))?;

    let progress = if std::io::stderr().is_terminal() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    progress.set_prefix("INGEST");
    apply_ingest_progress_style(&progress);
    progress.enable_steady_tick(Duration::from_millis(250));

    let summary = read_lines(file, &progress, &path.display().to_string())?;
    progress.finish_and_clear();
    Ok(summary)
}
