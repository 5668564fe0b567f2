//! Final pair report.
//!
//! The pair set is written once, sorted, with a `TaxiA`/`TaxiB` header.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ProximityError, Result};
use crate::PairSet;

/// Default location of the report, relative to the working directory.
pub const DEFAULT_REPORT_PATH: &str = "results/task8Output.txt";

const HEADERS: [&str; 2] = ["TaxiA", "TaxiB"];

/// Output format of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// Right-aligned text columns separated by a space
    #[default]
    Table,
    /// Comma separated values
    Csv,
}

impl std::str::FromStr for ReportFormat {
    type Err = ProximityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" | "txt" => Ok(ReportFormat::Table),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(ProximityError::Config {
                message: format!("unknown report format '{}'", other),
            }),
        }
    }
}

/// Render the report in memory.
pub fn render_report(pairs: &PairSet, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Table => Ok(render_table(pairs)),
        ReportFormat::Csv => render_csv(pairs),
    }
}

/// Write the report to `path`, creating parent directories as needed.
pub fn write_report(path: &Path, pairs: &PairSet, format: ReportFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = render_report(pairs, format)?;
    fs::write(path, contents)?;
    info!(
        "[Report] Wrote {} pairs to {}",
        pairs.len(),
        path.display()
    );
    Ok(())
}

fn render_table(pairs: &PairSet) -> String {
    let rows: Vec<[String; 2]> = pairs
        .sorted()
        .into_iter()
        .map(|p| [p.first().to_string(), p.second().to_string()])
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = format!(
        "{:>w0$} {:>w1$}",
        HEADERS[0],
        HEADERS[1],
        w0 = widths[0],
        w1 = widths[1]
    );
    for row in &rows {
        out.push('\n');
        out.push_str(&format!(
            "{:>w0$} {:>w1$}",
            row[0],
            row[1],
            w0 = widths[0],
            w1 = widths[1]
        ));
    }
    out
}

fn render_csv(pairs: &PairSet) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(HEADERS)?;
    for pair in pairs.sorted() {
        wtr.write_record([pair.first().to_string(), pair.second().to_string()])?;
    }
    let bytes = wtr.into_inner().map_err(|e| ProximityError::Report {
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| ProximityError::Report {
        message: e.to_string(),
    })
}
