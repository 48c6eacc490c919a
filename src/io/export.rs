//! CSV export for the report log of a run.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::ReportRecord;

/// Column header of the report CSV.
const HEADER: &str = "offset_s,sequence,node_id,esi_endpoint,event_id,status,status_code,\
                      status_time,criticality,cooling_set_point,heating_set_point,\
                      avg_load_pct,duty_cycle,event_control";

/// Exports the report log to a CSV file at the given path.
///
/// Writes a header row followed by one row per report, in send order.
///
/// # Arguments
///
/// * `records` - Reports collected during the run
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[ReportRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(records, buf)
}

/// Writes the report log as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[ReportRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        wtr.write_record(&[
            r.offset.to_string(),
            r.sequence.to_string(),
            format!("0x{:04x}", r.node_id),
            r.esi_endpoint.to_string(),
            format!("0x{:08x}", r.event_id),
            format!("{:?}", r.status),
            format!("0x{:02x}", r.status.code()),
            r.status_time.to_string(),
            r.criticality_level.to_string(),
            r.cooling_temp_set_point.to_string(),
            r.heating_temp_set_point.to_string(),
            r.avg_load_percentage.to_string(),
            r.duty_cycle.to_string(),
            format!("0x{:02x}", r.event_control),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
