use super::{csv_buffer, csv_line, csv_write_error, finish_buffer, write_artifact, Artifact};
use crate::constants::{STAGE_EXTRACT_CSV, STAGE_EXTRACT_FIXED_WIDTH, STAGE_EXTRACT_TSV};
use crate::error::{EtlError, Result};
use crate::metrics::{time_stage, StageMetrics};
use crate::schema::{PositionalSchema, PAYMENT_PROJECTION, TOLLPLAZA_PROJECTION, VEHICLE_PROJECTION};
use csv::ByteRecord;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub stage: &'static str,
    pub columns: Vec<String>,
    pub artifact: Artifact,
}

/// Extract the vehicle fields from the comma-delimited raw source.
pub fn extract_csv(raw: &Path, output: &Path) -> Result<ExtractReport> {
    extract_fields(
        STAGE_EXTRACT_CSV,
        raw,
        &PositionalSchema::vehicle_data(),
        &VEHICLE_PROJECTION,
        output,
    )
}

/// Extract the toll plaza fields from the tab-delimited raw source.
pub fn extract_tsv(raw: &Path, output: &Path) -> Result<ExtractReport> {
    extract_fields(
        STAGE_EXTRACT_TSV,
        raw,
        &PositionalSchema::tollplaza_data(),
        &TOLLPLAZA_PROJECTION,
        output,
    )
}

/// Extract the payment fields from the fixed-width raw source.
pub fn extract_fixed_width(raw: &Path, output: &Path) -> Result<ExtractReport> {
    extract_fields(
        STAGE_EXTRACT_FIXED_WIDTH,
        raw,
        &PositionalSchema::payment_data(),
        &PAYMENT_PROJECTION,
        output,
    )
}

/// Project `projection` out of a headerless raw file laid out as `schema`,
/// writing a headered comma-separated extract to `output`.
///
/// Field bytes are copied as-is, so any single-byte encoding passes through.
#[instrument(skip_all, fields(stage = stage, raw = %raw.display(), output = %output.display()))]
pub fn extract_fields(
    stage: &'static str,
    raw: &Path,
    schema: &PositionalSchema,
    projection: &[&str],
    output: &Path,
) -> Result<ExtractReport> {
    let _timing = time_stage(stage);

    let positions = schema
        .resolve(projection)
        .map_err(|msg| EtlError::parse(stage, raw, None, msg))?;

    let contents = fs::read(raw).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EtlError::parse(stage, raw, None, "raw source file not found"),
        _ => EtlError::parse(stage, raw, None, format!("failed to read raw source: {}", e)),
    })?;

    let rows = match schema {
        PositionalSchema::Delimited { delimiter, .. } => {
            read_delimited(stage, raw, &contents, *delimiter, schema.len())?
        }
        PositionalSchema::FixedWidth { fields } => {
            let widths: Vec<usize> = fields.iter().map(|(_, w)| *w).collect();
            read_fixed_width(stage, raw, &contents, &widths)?
        }
    };
    StageMetrics::record_rows_read(stage, rows.len());

    let mut writer = csv_buffer();
    writer
        .write_record(projection)
        .map_err(|e| csv_write_error(stage, output, e))?;
    for row in &rows {
        let projected: ByteRecord = positions.iter().map(|&i| &row[i]).collect();
        writer
            .write_byte_record(&projected)
            .map_err(|e| csv_write_error(stage, output, e))?;
    }
    let buffer = finish_buffer(stage, output, writer)?;
    let artifact = write_artifact(stage, output, &buffer, rows.len())?;

    StageMetrics::record_rows_written(stage, artifact.rows);
    info!("✅ {}: extracted {} rows into {}", stage, artifact.rows, output.display());

    Ok(ExtractReport {
        stage,
        columns: projection.iter().map(|c| c.to_string()).collect(),
        artifact,
    })
}

fn read_delimited(
    stage: &'static str,
    raw: &Path,
    contents: &[u8],
    delimiter: u8,
    expected_fields: usize,
) -> Result<Vec<ByteRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(contents);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| EtlError::parse(stage, raw, csv_line(&e), e.to_string()))?;
        if record.len() != expected_fields {
            let line = record.position().map(|p| p.line() as usize);
            return Err(EtlError::parse(
                stage,
                raw,
                line,
                format!("expected {} fields, found {}", expected_fields, record.len()),
            ));
        }
        rows.push(record);
    }
    Ok(rows)
}

fn read_fixed_width(
    stage: &'static str,
    raw: &Path,
    contents: &[u8],
    widths: &[usize],
) -> Result<Vec<ByteRecord>> {
    let row_width: usize = widths.iter().sum();
    let mut rows = Vec::new();

    for (index, line) in contents.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.trim_ascii().is_empty() {
            continue;
        }
        if line.len() < row_width {
            return Err(EtlError::parse(
                stage,
                raw,
                Some(index + 1),
                format!("row is {} characters, layout needs {}", line.len(), row_width),
            ));
        }

        let mut record = ByteRecord::with_capacity(row_width, widths.len());
        let mut offset = 0;
        for width in widths {
            record.push_field(line[offset..offset + width].trim_ascii());
            offset += width;
        }
        rows.push(record);
    }
    Ok(rows)
}
