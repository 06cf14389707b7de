use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("[{stage}] archive extraction failed for {}: {message}", path.display())]
    Extraction {
        stage: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("[{stage}] failed to parse {}{}: {message}", path.display(), line_suffix(*line))]
    Parse {
        stage: &'static str,
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("[{stage}] merge failed on {}: {message}", path.display())]
    Merge {
        stage: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("[{stage}] required field '{field}' not found in {}", path.display())]
    Schema {
        stage: &'static str,
        path: PathBuf,
        field: String,
    },

    #[error("[{stage}] I/O error on {}: {source}", path.display())]
    Io {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid pipeline graph: {0}")]
    Dag(String),
}

/// Coarse classification used by the orchestrator to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    Parse,
    Merge,
    Schema,
    Io,
    Config,
    Dag,
}

impl ErrorKind {
    /// Schema, config and graph errors come from the inputs' shape, so a
    /// second attempt would fail the same way.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Extraction | ErrorKind::Parse | ErrorKind::Merge | ErrorKind::Io
        )
    }
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::Extraction { .. } => ErrorKind::Extraction,
            EtlError::Parse { .. } => ErrorKind::Parse,
            EtlError::Merge { .. } => ErrorKind::Merge,
            EtlError::Schema { .. } => ErrorKind::Schema,
            EtlError::Io { .. } => ErrorKind::Io,
            EtlError::Config(_) | EtlError::Toml(_) => ErrorKind::Config,
            EtlError::Dag(_) => ErrorKind::Dag,
        }
    }

    pub fn extraction(stage: &'static str, path: &Path, message: impl Into<String>) -> Self {
        EtlError::Extraction {
            stage,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn parse(
        stage: &'static str,
        path: &Path,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        EtlError::Parse {
            stage,
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    pub fn merge(stage: &'static str, path: &Path, message: impl Into<String>) -> Self {
        EtlError::Merge {
            stage,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(stage: &'static str, path: &Path, source: std::io::Error) -> Self {
        EtlError::Io {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }
}

fn line_suffix(line: Option<usize>) -> String {
    match line {
        Some(n) => format!(" (line {})", n),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_file_and_line() {
        let err = EtlError::parse("extract_csv", Path::new("raw/vehicle-data.csv"), Some(7), "expected 6 fields, found 5");
        let msg = err.to_string();
        assert!(msg.contains("extract_csv"));
        assert!(msg.contains("raw/vehicle-data.csv"));
        assert!(msg.contains("(line 7)"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Io.is_retryable());
        assert!(ErrorKind::Merge.is_retryable());
        assert!(!ErrorKind::Schema.is_retryable());
        assert!(!ErrorKind::Dag.is_retryable());

        let err = EtlError::Schema {
            stage: "transform",
            path: PathBuf::from("extracted_data.csv"),
            field: "Vehicle type".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Schema);
    }
}
