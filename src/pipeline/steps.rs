use super::dag::StepKind;
use crate::config::FileLayout;
use crate::error::Result;
use crate::schema::{PositionalSchema, PAYMENT_PROJECTION, TOLLPLAZA_PROJECTION, VEHICLE_PROJECTION};
use crate::stages::{self, Artifact, MergePolicy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Common trait for all pipeline steps.
///
/// Steps do blocking file I/O; the orchestrator runs them on the blocking
/// thread pool.
pub trait PipelineStep: Send + Sync {
    /// Execute this step against the run's file layout
    fn execute(&self, layout: &FileLayout) -> Result<StepResult>;

    fn kind(&self) -> StepKind;

    fn step_name(&self) -> &'static str {
        self.kind().step_name()
    }
}

/// Result of executing a pipeline step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub processed_count: usize,
    pub message: String,
    pub artifacts: Vec<Artifact>,
    pub metadata: BTreeMap<String, String>,
}

impl StepResult {
    pub fn success(processed: usize, message: String) -> Self {
        Self {
            processed_count: processed,
            message,
            artifacts: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

pub struct ExpandStep;

impl PipelineStep for ExpandStep {
    fn execute(&self, layout: &FileLayout) -> Result<StepResult> {
        info!("📦 Expanding {} into {}", layout.archive.display(), layout.expansion_dir.display());
        let report = stages::expand_archive(&layout.archive, &layout.expansion_dir)?;

        for raw in layout.raw_sources() {
            if !raw.is_file() {
                warn!("⚠️ Expected raw source {} was not in the archive", raw.display());
            }
        }

        let members: Vec<String> = report.members.iter().map(|m| m.display().to_string()).collect();
        Ok(StepResult::success(
            report.members.len(),
            format!("Expanded {} files into {}", members.len(), report.destination.display()),
        )
        .with_metadata("members", members.join(",")))
    }

    fn kind(&self) -> StepKind {
        StepKind::Expand
    }
}

type SourcePaths = fn(&FileLayout) -> (&Path, &Path);

/// One extractor step per raw source format.
pub struct ExtractStep {
    kind: StepKind,
    schema: PositionalSchema,
    projection: &'static [&'static str],
    paths: SourcePaths,
}

fn vehicle_paths(layout: &FileLayout) -> (&Path, &Path) {
    (layout.vehicle_data.as_path(), layout.csv_extract.as_path())
}

fn tollplaza_paths(layout: &FileLayout) -> (&Path, &Path) {
    (layout.tollplaza_data.as_path(), layout.tsv_extract.as_path())
}

fn payment_paths(layout: &FileLayout) -> (&Path, &Path) {
    (layout.payment_data.as_path(), layout.fixed_width_extract.as_path())
}

impl ExtractStep {
    pub fn csv() -> Self {
        Self {
            kind: StepKind::ExtractCsv,
            schema: PositionalSchema::vehicle_data(),
            projection: &VEHICLE_PROJECTION,
            paths: vehicle_paths,
        }
    }

    pub fn tsv() -> Self {
        Self {
            kind: StepKind::ExtractTsv,
            schema: PositionalSchema::tollplaza_data(),
            projection: &TOLLPLAZA_PROJECTION,
            paths: tollplaza_paths,
        }
    }

    pub fn fixed_width() -> Self {
        Self {
            kind: StepKind::ExtractFixedWidth,
            schema: PositionalSchema::payment_data(),
            projection: &PAYMENT_PROJECTION,
            paths: payment_paths,
        }
    }
}

impl PipelineStep for ExtractStep {
    fn execute(&self, layout: &FileLayout) -> Result<StepResult> {
        let (raw, output) = (self.paths)(layout);
        let report = stages::extract_fields(self.step_name(), raw, &self.schema, self.projection, output)?;
        Ok(StepResult::success(
            report.artifact.rows,
            format!(
                "Extracted {} rows ({}) into {}",
                report.artifact.rows,
                report.columns.join(", "),
                output.display()
            ),
        )
        .with_artifact(report.artifact))
    }

    fn kind(&self) -> StepKind {
        self.kind
    }
}

pub struct ConsolidateStep {
    policy: MergePolicy,
}

impl ConsolidateStep {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }
}

impl PipelineStep for ConsolidateStep {
    fn execute(&self, layout: &FileLayout) -> Result<StepResult> {
        let report = stages::consolidate(&layout.extracts(), &layout.consolidated, self.policy)?;
        let counts: Vec<String> = report.input_rows.iter().map(|n| n.to_string()).collect();
        Ok(StepResult::success(
            report.artifact.rows,
            format!(
                "Consolidated {} rows into {}",
                report.artifact.rows,
                layout.consolidated.display()
            ),
        )
        .with_metadata("input_rows", counts.join(","))
        .with_metadata("truncated", report.truncated)
        .with_artifact(report.artifact))
    }

    fn kind(&self) -> StepKind {
        StepKind::Consolidate
    }
}

pub struct TransformStep {
    field: String,
}

impl TransformStep {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl PipelineStep for TransformStep {
    fn execute(&self, layout: &FileLayout) -> Result<StepResult> {
        let report = stages::transform(&layout.consolidated, &layout.transformed, &self.field)?;
        Ok(StepResult::success(
            report.artifact.rows,
            format!(
                "Uppercased '{}' in {} rows into {}",
                report.field,
                report.artifact.rows,
                layout.transformed.display()
            ),
        )
        .with_metadata("values_changed", report.values_changed)
        .with_artifact(report.artifact))
    }

    fn kind(&self) -> StepKind {
        StepKind::Transform
    }
}
