use super::{artifact_reader, csv_buffer, csv_line, csv_write_error, finish_buffer, write_artifact, Artifact};
use crate::constants::STAGE_TRANSFORM;
use crate::encoding;
use crate::error::{EtlError, Result};
use crate::metrics::{time_stage, StageMetrics};
use csv::ByteRecord;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub field: String,
    /// Number of values that changed.
    pub values_changed: usize,
    pub artifact: Artifact,
}

/// Uppercase every value of `field` in a consolidated record set.
///
/// The header and every other field are written back untouched. When the
/// header has no `field` column a [`EtlError::Schema`] is returned and
/// `output` is left alone.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display(), field = field))]
pub fn transform(input: &Path, output: &Path, field: &str) -> Result<TransformReport> {
    let _timing = time_stage(STAGE_TRANSFORM);

    let contents = fs::read(input).map_err(|e| EtlError::io(STAGE_TRANSFORM, input, e))?;
    let records = artifact_reader(&contents)
        .byte_records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EtlError::parse(STAGE_TRANSFORM, input, csv_line(&e), e.to_string()))?;
    StageMetrics::record_rows_read(STAGE_TRANSFORM, records.len().saturating_sub(1));

    let column = records
        .first()
        .and_then(|header| header.iter().position(|name| encoding::decode(name) == field));
    let (header, rows, column) = match (records.split_first(), column) {
        (Some((header, rows)), Some(column)) => (header, rows, column),
        _ => {
            error!("❌ Required field '{}' not found in {}", field, input.display());
            return Err(EtlError::Schema {
                stage: STAGE_TRANSFORM,
                path: input.to_path_buf(),
                field: field.to_string(),
            });
        }
    };

    let mut writer = csv_buffer();
    writer
        .write_byte_record(header)
        .map_err(|e| csv_write_error(STAGE_TRANSFORM, output, e))?;

    let mut values_changed = 0;
    for row in rows {
        let transformed: ByteRecord = row
            .iter()
            .enumerate()
            .map(|(i, value)| {
                if i != column {
                    return value.to_vec();
                }
                let upper = encoding::uppercase(value);
                if upper != value {
                    values_changed += 1;
                }
                upper
            })
            .collect();
        writer
            .write_byte_record(&transformed)
            .map_err(|e| csv_write_error(STAGE_TRANSFORM, output, e))?;
    }
    let buffer = finish_buffer(STAGE_TRANSFORM, output, writer)?;
    let artifact = write_artifact(STAGE_TRANSFORM, output, &buffer, rows.len())?;

    StageMetrics::record_rows_written(STAGE_TRANSFORM, artifact.rows);
    info!(
        "✅ {}: uppercased '{}' in {} rows ({} changed) into {}",
        STAGE_TRANSFORM,
        field,
        artifact.rows,
        values_changed,
        output.display()
    );

    Ok(TransformReport {
        field: field.to_string(),
        values_changed,
        artifact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::VEHICLE_TYPE;
    use tempfile::tempdir;

    const CONSOLIDATED: &str = "Rowid,Vehicle type,Tollplaza id\n1,car,4856\n2,,4154\n3,TRUCK,8026\n4,Van,1\n";

    #[test]
    fn test_uppercases_only_the_field() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("extracted_data.csv");
        let output = dir.path().join("transformed_data.csv");
        fs::write(&input, CONSOLIDATED).unwrap();

        let report = transform(&input, &output, VEHICLE_TYPE).unwrap();

        assert_eq!(report.artifact.rows, 4);
        assert_eq!(report.values_changed, 2);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "Rowid,Vehicle type,Tollplaza id\n1,CAR,4856\n2,,4154\n3,TRUCK,8026\n4,VAN,1\n"
        );
    }

    #[test]
    fn test_transform_is_idempotent() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("extracted_data.csv");
        let once = dir.path().join("once.csv");
        let twice = dir.path().join("twice.csv");
        fs::write(&input, CONSOLIDATED).unwrap();

        transform(&input, &once, VEHICLE_TYPE).unwrap();
        let report = transform(&once, &twice, VEHICLE_TYPE).unwrap();

        assert_eq!(report.values_changed, 0);
        assert_eq!(fs::read(&once).unwrap(), fs::read(&twice).unwrap());
    }

    #[test]
    fn test_missing_field_is_schema_error_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("extracted_data.csv");
        let output = dir.path().join("transformed_data.csv");
        fs::write(&input, "Rowid,Tollplaza id\n1,4856\n").unwrap();

        let err = transform(&input, &output, VEHICLE_TYPE).unwrap_err();

        assert!(matches!(err, EtlError::Schema { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_empty_input_is_schema_error() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("extracted_data.csv");
        fs::write(&input, "").unwrap();

        let err = transform(&input, &dir.path().join("out.csv"), VEHICLE_TYPE).unwrap_err();
        assert!(matches!(err, EtlError::Schema { .. }));
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempdir().unwrap();
        let err = transform(&dir.path().join("absent.csv"), &dir.path().join("out.csv"), VEHICLE_TYPE)
            .unwrap_err();
        assert!(matches!(err, EtlError::Io { .. }));
    }

    #[test]
    fn test_latin1_values_are_uppercased() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("extracted_data.csv");
        let output = dir.path().join("transformed_data.csv");
        fs::write(&input, b"Vehicle type,Note\ncami\xF3n,\xE9\n").unwrap();

        transform(&input, &output, VEHICLE_TYPE).unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"Vehicle type,Note\nCAMI\xD3N,\xE9\n".to_vec());
    }
}
