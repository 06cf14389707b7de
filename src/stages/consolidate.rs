use super::{artifact_reader, csv_buffer, csv_write_error, finish_buffer, write_artifact, Artifact};
use crate::constants::STAGE_CONSOLIDATE;
use crate::error::{EtlError, Result};
use crate::metrics::{time_stage, StageMetrics};
use csv::ByteRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// What to do when the extracts being merged have different row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Keep only as many rows as the shortest extract has.
    #[default]
    Truncate,
    /// Fail without writing any output.
    Strict,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    /// Data rows per input, header excluded, in input order.
    pub input_rows: Vec<usize>,
    pub truncated: bool,
    pub artifact: Artifact,
}

/// Join extracts column-wise by row position.
///
/// Row `i` of the output is row `i` of every input, concatenated in input
/// order; headers are concatenated the same way. No key is consulted: callers
/// guarantee that row `i` of every input describes the same toll event.
#[instrument(skip_all, fields(output = %output.display(), policy = ?policy))]
pub fn consolidate(inputs: &[&Path], output: &Path, policy: MergePolicy) -> Result<MergeReport> {
    let _timing = time_stage(STAGE_CONSOLIDATE);

    if inputs.is_empty() {
        return Err(EtlError::merge(STAGE_CONSOLIDATE, output, "no extracts to merge"));
    }

    let tables = inputs
        .iter()
        .map(|path| read_extract(path))
        .collect::<Result<Vec<_>>>()?;

    let input_rows: Vec<usize> = tables.iter().map(|t| t.len().saturating_sub(1)).collect();
    let shortest = tables.iter().map(Vec::len).min().unwrap_or(0);
    let truncated = tables.iter().any(|t| t.len() != shortest);

    if truncated {
        let counts = describe_counts(inputs, &input_rows);
        match policy {
            MergePolicy::Strict => {
                return Err(EtlError::merge(
                    STAGE_CONSOLIDATE,
                    output,
                    format!("extracts have unequal row counts: {}", counts),
                ));
            }
            MergePolicy::Truncate => {
                let dropped: usize = tables.iter().map(|t| t.len() - shortest).sum();
                StageMetrics::record_rows_truncated(dropped);
                warn!("⚠️ Extracts have unequal row counts ({}); truncating to the shortest", counts);
            }
        }
    }

    let mut writer = csv_buffer();
    for i in 0..shortest {
        let mut row = ByteRecord::new();
        for table in &tables {
            row.extend(table[i].iter());
        }
        writer
            .write_byte_record(&row)
            .map_err(|e| csv_write_error(STAGE_CONSOLIDATE, output, e))?;
    }
    let buffer = finish_buffer(STAGE_CONSOLIDATE, output, writer)?;
    let artifact = write_artifact(STAGE_CONSOLIDATE, output, &buffer, shortest.saturating_sub(1))?;

    StageMetrics::record_rows_written(STAGE_CONSOLIDATE, artifact.rows);
    info!(
        "✅ {}: merged {} extracts into {} rows at {}",
        STAGE_CONSOLIDATE,
        inputs.len(),
        artifact.rows,
        output.display()
    );

    Ok(MergeReport {
        input_rows,
        truncated,
        artifact,
    })
}

/// All records of an extract, header first.
fn read_extract(path: &Path) -> Result<Vec<ByteRecord>> {
    let contents = fs::read(path).map_err(|e| {
        EtlError::merge(STAGE_CONSOLIDATE, path, format!("extract unreadable: {}", e))
    })?;
    artifact_reader(&contents)
        .byte_records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EtlError::merge(STAGE_CONSOLIDATE, path, format!("extract unreadable: {}", e)))
}

fn describe_counts(inputs: &[&Path], rows: &[usize]) -> String {
    inputs
        .iter()
        .zip(rows)
        .map(|(path, n)| {
            let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf());
            format!("{}={}", name.display(), n)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn write_inputs(dir: &TempDir, a: &str, b: &str, c: &str) -> Vec<PathBuf> {
        [("csv_data.csv", a), ("tsv_data.csv", b), ("fixed_width_data.csv", c)]
            .iter()
            .map(|(name, contents)| {
                let path = dir.path().join(name);
                fs::write(&path, contents).unwrap();
                path
            })
            .collect()
    }

    fn as_refs(paths: &[PathBuf]) -> Vec<&Path> {
        paths.iter().map(PathBuf::as_path).collect()
    }

    #[test]
    fn test_equal_row_counts_merge_positionally() {
        let dir = tempdir().unwrap();
        let inputs = write_inputs(
            &dir,
            "Rowid,Vehicle type\n1,car\n2,truck\n3,van\n",
            "Tollplaza id\n4856\n4154\n8026\n",
            "Type of Payment code,Vehicle Code\nPTE,VC965\nPTP,VC1\nPTC,VC2\n",
        );
        let out = dir.path().join("extracted_data.csv");

        let report = consolidate(&as_refs(&inputs), &out, MergePolicy::Truncate).unwrap();

        assert_eq!(report.artifact.rows, 3);
        assert!(!report.truncated);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "Rowid,Vehicle type,Tollplaza id,Type of Payment code,Vehicle Code\n\
             1,car,4856,PTE,VC965\n\
             2,truck,4154,PTP,VC1\n\
             3,van,8026,PTC,VC2\n"
        );
    }

    #[test]
    fn test_unequal_row_counts_truncate_to_shortest() {
        let dir = tempdir().unwrap();
        let inputs = write_inputs(&dir, "a\n1\n2\n3\n", "b\n1\n2\n", "c\n1\n2\n3\n");
        let out = dir.path().join("extracted_data.csv");

        let report = consolidate(&as_refs(&inputs), &out, MergePolicy::Truncate).unwrap();

        assert_eq!(report.input_rows, vec![3, 2, 3]);
        assert!(report.truncated);
        assert_eq!(report.artifact.rows, 2);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a,b,c\n1,1,1\n2,2,2\n");
    }

    #[test]
    fn test_strict_policy_rejects_mismatch_without_output() {
        let dir = tempdir().unwrap();
        let inputs = write_inputs(&dir, "a\n1\n2\n3\n", "b\n1\n2\n", "c\n1\n2\n3\n");
        let out = dir.path().join("extracted_data.csv");

        let err = consolidate(&as_refs(&inputs), &out, MergePolicy::Strict).unwrap_err();

        assert!(matches!(err, EtlError::Merge { .. }));
        assert!(err.to_string().contains("tsv_data.csv=2"));
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_extract_is_merge_error() {
        let dir = tempdir().unwrap();
        let mut inputs = write_inputs(&dir, "a\n1\n", "b\n1\n", "c\n1\n");
        inputs[1] = dir.path().join("absent.csv");

        let err = consolidate(&as_refs(&inputs), &dir.path().join("out.csv"), MergePolicy::Truncate)
            .unwrap_err();
        match err {
            EtlError::Merge { path, .. } => assert!(path.ends_with("absent.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_quoted_fields_survive_merge() {
        let dir = tempdir().unwrap();
        let inputs = write_inputs(&dir, "a\n\"x,y\"\n", "b\n2\n", "c\n3\n");
        let out = dir.path().join("extracted_data.csv");

        consolidate(&as_refs(&inputs), &out, MergePolicy::Truncate).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "a,b,c\n\"x,y\",2,3\n");
    }
}
