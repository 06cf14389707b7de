use crate::constants::*;
use crate::error::{EtlError, Result};
use crate::stages::MergePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "toll_etl.toml";
pub const CONFIG_ENV_VAR: &str = "TOLL_ETL_CONFIG";

/// Immutable run parameters, loaded once and handed to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub run: RunConfig,
    pub paths: PathsConfig,
    pub transform: TransformConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub name: String,
    pub owner: String,
    pub email: String,
    /// Descriptive only; triggering runs on a schedule is left to the caller.
    pub schedule: String,
    /// Additional attempts after the first failure of a step.
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub step_timeout_secs: u64,
    pub notify_on_failure: bool,
    pub notify_on_retry: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "ETL_toll_data".to_string(),
            owner: "toll-etl".to_string(),
            email: "toll-etl@example.com".to_string(),
            schedule: "@daily".to_string(),
            retries: 1,
            retry_delay_secs: 300,
            step_timeout_secs: 600,
            notify_on_failure: true,
            notify_on_retry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub archive: PathBuf,
    pub staging_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from(DEFAULT_ARCHIVE),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    pub field: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            field: DEFAULT_TRANSFORM_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub policy: MergePolicy,
}

impl PipelineConfig {
    /// Load from `path`, or from `$TOLL_ETL_CONFIG`, or from `toll_etl.toml`.
    /// Only an explicitly named file must exist; otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transform.field.trim().is_empty() {
            return Err(EtlError::Config("transform.field must not be empty".to_string()));
        }
        if self.run.step_timeout_secs == 0 {
            return Err(EtlError::Config("run.step_timeout_secs must be greater than zero".to_string()));
        }
        if self.paths.staging_dir.as_os_str().is_empty() {
            return Err(EtlError::Config("paths.staging_dir must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn layout(&self) -> FileLayout {
        FileLayout::new(&self.paths.archive, &self.paths.staging_dir)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.run.retry_delay_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.run.step_timeout_secs)
    }
}

/// Every path a run reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLayout {
    pub archive: PathBuf,
    pub staging_dir: PathBuf,
    pub expansion_dir: PathBuf,
    pub vehicle_data: PathBuf,
    pub tollplaza_data: PathBuf,
    pub payment_data: PathBuf,
    pub csv_extract: PathBuf,
    pub tsv_extract: PathBuf,
    pub fixed_width_extract: PathBuf,
    pub consolidated: PathBuf,
    pub transformed: PathBuf,
}

impl FileLayout {
    pub fn new(archive: &Path, staging_dir: &Path) -> Self {
        let expansion_dir = staging_dir.join(EXPANSION_SUBDIR);
        Self {
            archive: archive.to_path_buf(),
            staging_dir: staging_dir.to_path_buf(),
            vehicle_data: expansion_dir.join(VEHICLE_DATA_FILE),
            tollplaza_data: expansion_dir.join(TOLLPLAZA_DATA_FILE),
            payment_data: expansion_dir.join(PAYMENT_DATA_FILE),
            csv_extract: staging_dir.join(CSV_EXTRACT_FILE),
            tsv_extract: staging_dir.join(TSV_EXTRACT_FILE),
            fixed_width_extract: staging_dir.join(FIXED_WIDTH_EXTRACT_FILE),
            consolidated: staging_dir.join(CONSOLIDATED_FILE),
            transformed: staging_dir.join(TRANSFORMED_FILE),
            expansion_dir,
        }
    }

    /// Raw sources expected inside the archive.
    pub fn raw_sources(&self) -> [&Path; 3] {
        [
            self.vehicle_data.as_path(),
            self.tollplaza_data.as_path(),
            self.payment_data.as_path(),
        ]
    }

    /// Normalized extracts in merge order.
    pub fn extracts(&self) -> [&Path; 3] {
        [
            self.csv_extract.as_path(),
            self.tsv_extract.as_path(),
            self.fixed_width_extract.as_path(),
        ]
    }
}
