//! Stage functions.
//!
//! Each stage takes explicit paths, reads the artifacts written by its
//! predecessors and writes a fresh artifact of its own. Stages never retry and
//! never substitute defaults for a missing input; scheduling, retry and
//! alerting live in [`crate::pipeline`].

pub mod consolidate;
pub mod expand;
pub mod extract;
pub mod transform;

pub use consolidate::{consolidate, MergePolicy, MergeReport};
pub use expand::{expand_archive, ExpandReport};
pub use extract::{extract_csv, extract_fields, extract_fixed_width, extract_tsv, ExtractReport};
pub use transform::{transform, TransformReport};

use crate::error::{EtlError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// A file written by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Data rows, header excluded.
    pub rows: usize,
    pub bytes: usize,
    pub sha256: String,
}

/// Fully rewrite `path` with `contents`; never appends.
pub(crate) fn write_artifact(
    stage: &'static str,
    path: &Path,
    contents: &[u8],
    rows: usize,
) -> Result<Artifact> {
    fs::write(path, contents).map_err(|e| EtlError::io(stage, path, e))?;
    Ok(Artifact {
        path: path.to_path_buf(),
        rows,
        bytes: contents.len(),
        sha256: hex::encode(Sha256::digest(contents)),
    })
}

/// Comma-delimited writer over an in-memory buffer.
pub(crate) fn csv_buffer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(b',')
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new())
}

pub(crate) fn finish_buffer(
    stage: &'static str,
    path: &Path,
    writer: csv::Writer<Vec<u8>>,
) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| EtlError::io(stage, path, e.into_error()))
}

pub(crate) fn csv_write_error(stage: &'static str, path: &Path, err: csv::Error) -> EtlError {
    EtlError::io(stage, path, std::io::Error::other(err.to_string()))
}

/// Reader for headered comma-separated artifacts. Headers are read as an
/// ordinary record so they can be passed through untouched.
pub(crate) fn artifact_reader(contents: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b',')
        .from_reader(contents)
}

pub(crate) fn csv_line(err: &csv::Error) -> Option<usize> {
    err.position().map(|p| p.line() as usize)
}
