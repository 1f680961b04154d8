//! CSV export of every registered variable, per agent and step.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{Carrier, LinearModel};

/// Column header of the telemetry CSV.
pub const TELEMETRY_HEADER: &str =
    "step,timestamp,agent,variable,carrier,lower,upper,integral,value";

#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryRow {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub variable: String,
    pub carrier: Option<Carrier>,
    pub lower: f64,
    pub upper: f64,
    pub integral: bool,
    /// Dispatched value, when the model was dispatched.
    pub value: Option<f64>,
}

/// One row per variable of `model`, in registration order.
pub fn rows_from_model(
    step: usize,
    timestamp: DateTime<Utc>,
    agent: &str,
    model: &LinearModel,
    values: Option<&BTreeMap<String, f64>>,
) -> Vec<TelemetryRow> {
    model
        .variables()
        .map(|v| TelemetryRow {
            step,
            timestamp,
            agent: agent.to_string(),
            variable: v.name.clone(),
            carrier: v.carrier,
            lower: v.lower,
            upper: v.upper,
            integral: v.integral,
            value: values.and_then(|vals| vals.get(&v.name).copied()),
        })
        .collect()
}

/// Writes telemetry rows as CSV to any writer.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_telemetry_csv(writer: impl Write, rows: &[TelemetryRow]) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(TELEMETRY_HEADER.split(','))?;

    for row in rows {
        wtr.write_record(&[
            row.step.to_string(),
            row.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            row.agent.clone(),
            row.variable.clone(),
            row.carrier.map(|c| c.to_string()).unwrap_or_default(),
            format!("{:.3}", row.lower),
            format!("{:.3}", row.upper),
            row.integral.to_string(),
            row.value.map(|v| format!("{v:.3}")).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes telemetry rows to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn write_telemetry_to_path(path: &Path, rows: &[TelemetryRow]) -> io::Result<()> {
    let file = File::create(path)?;
    write_telemetry_csv(BufWriter::new(file), rows)
}
