//! Result sinks and resume support.
//!
//! Records are appended as they are produced, so an interrupted run keeps
//! everything it already finished. A later run can skip those addresses with
//! [`filter_pending`].

use crate::types::{ContactRecord, ContactStatus, FieldKind};
use anyhow::Context;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

pub trait ResultSink: Send {
    fn write(&mut self, record: &ContactRecord) -> anyhow::Result<()>;

    fn finish(&mut self) -> anyhow::Result<()>;
}

/// One JSON object per line.
pub struct JsonlSink {
    out: BufWriter<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it when missing.
    pub fn append(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl ResultSink for JsonlSink {
    fn write(&mut self, record: &ContactRecord) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        // each line must survive a crash mid-run
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Flat table with stable columns:
/// `identifier,status,<one per FieldKind>,error_detail,extracted_at`.
pub struct CsvSink {
    out: BufWriter<File>,
}

impl CsvSink {
    /// Open `path` for appending. The header is written only when the file is
    /// new or empty, so resumed runs extend the same table.
    pub fn append(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len()
            == 0;
        let mut out = BufWriter::new(file);
        if is_empty {
            writeln!(out, "{}", csv_header().join(","))?;
            out.flush()?;
        }
        Ok(Self { out })
    }
}

pub fn csv_header() -> Vec<&'static str> {
    let mut header = vec!["identifier", "status"];
    header.extend(FieldKind::ALL.iter().map(|k| k.as_str()));
    header.extend(["error_detail", "extracted_at"]);
    header
}

pub fn csv_row(record: &ContactRecord) -> String {
    let mut cells: Vec<String> = Vec::with_capacity(FieldKind::ALL.len() + 4);
    cells.push(csv_escape(record.identifier()));
    cells.push(record.status.as_str().to_string());
    for kind in FieldKind::ALL {
        cells.push(csv_escape(record.field(kind).unwrap_or("")));
    }
    cells.push(csv_escape(record.error_detail.as_deref().unwrap_or("")));
    cells.push(record.extracted_at.to_rfc3339());
    cells.join(",")
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl ResultSink for CsvSink {
    fn write(&mut self, record: &ContactRecord) -> anyhow::Result<()> {
        writeln!(self.out, "{}", csv_row(record))?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Last recorded status per identifier (lowercased) from a JSON Lines file.
///
/// A missing file is an empty map. Unparseable lines are skipped with a
/// warning; later lines override earlier ones.
pub fn load_completed(path: &Path) -> anyhow::Result<HashMap<String, ContactStatus>> {
    let mut completed = HashMap::new();
    if !path.exists() {
        return Ok(completed);
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ContactRecord>(&line) {
            Ok(record) => {
                completed.insert(record.identifier().to_lowercase(), record.status);
            }
            Err(e) => warn!("results: skipping line {} of {}: {}", n + 1, path.display(), e),
        }
    }
    info!(
        "results: {} identifiers already recorded in {}",
        completed.len(),
        path.display()
    );
    Ok(completed)
}

/// Drop identifiers whose last recorded status is Success or NotFound.
/// Error items are kept so a resumed run retries them.
pub fn filter_pending(
    addresses: Vec<String>,
    completed: &HashMap<String, ContactStatus>,
) -> Vec<String> {
    addresses
        .into_iter()
        .filter(|a| {
            !matches!(
                completed.get(&a.trim().to_lowercase()),
                Some(ContactStatus::Success | ContactStatus::NotFound)
            )
        })
        .collect()
}
