use super::dag::{PipelineDag, StepKind};
use super::notify::{Alert, AlertKind, Notifier, OperatorContact};
use super::steps::{ConsolidateStep, ExpandStep, ExtractStep, PipelineStep, StepResult, TransformStep};
use crate::config::{FileLayout, PipelineConfig};
use crate::error::{ErrorKind, EtlError, Result};
use crate::metrics::RunMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Retry, timeout and alerting policy applied to every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    /// Attempts after the first failure.
    pub retries: u32,
    pub retry_delay: Duration,
    pub step_timeout: Duration,
    pub notify_on_retry: bool,
    pub notify_on_failure: bool,
}

impl RunPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retries: config.run.retries,
            retry_delay: config.retry_delay(),
            step_timeout: config.step_timeout(),
            notify_on_retry: config.run.notify_on_retry,
            notify_on_failure: config.run.notify_on_failure,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Executes the step DAG layer by layer.
///
/// Steps within a layer run concurrently. A failed step is retried on its
/// own, reusing upstream outputs already on disk. Once any step in a layer
/// has failed for good, no later layer starts.
pub struct PipelineOrchestrator {
    name: String,
    layout: Arc<FileLayout>,
    policy: RunPolicy,
    contact: OperatorContact,
    dag: PipelineDag,
    steps: HashMap<StepKind, Arc<dyn PipelineStep>>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineOrchestrator {
    pub fn new(config: &PipelineConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;
        let dag = PipelineDag::toll_data();
        dag.validate()?;

        let mut steps: HashMap<StepKind, Arc<dyn PipelineStep>> = HashMap::new();
        for kind in StepKind::ALL {
            steps.insert(kind, Self::create_step(kind, config));
        }

        Ok(Self {
            name: config.run.name.clone(),
            layout: Arc::new(config.layout()),
            policy: RunPolicy::from_config(config),
            contact: OperatorContact {
                owner: config.run.owner.clone(),
                email: config.run.email.clone(),
            },
            dag,
            steps,
            notifier,
        })
    }

    /// Replace the implementation behind one step of the graph.
    pub fn with_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.insert(step.kind(), step);
        self
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dag(&self) -> &PipelineDag {
        &self.dag
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Create a step instance from configuration
    fn create_step(kind: StepKind, config: &PipelineConfig) -> Arc<dyn PipelineStep> {
        match kind {
            StepKind::Expand => Arc::new(ExpandStep),
            StepKind::ExtractCsv => Arc::new(ExtractStep::csv()),
            StepKind::ExtractTsv => Arc::new(ExtractStep::tsv()),
            StepKind::ExtractFixedWidth => Arc::new(ExtractStep::fixed_width()),
            StepKind::Consolidate => Arc::new(ConsolidateStep::new(config.merge.policy)),
            StepKind::Transform => Arc::new(TransformStep::new(config.transform.field.clone())),
        }
    }

    fn step(&self, kind: StepKind) -> Result<Arc<dyn PipelineStep>> {
        self.steps
            .get(&kind)
            .cloned()
            .ok_or_else(|| EtlError::Dag(format!("no implementation registered for step '{}'", kind)))
    }

    /// Run the complete graph.
    pub async fn run_pipeline(&self) -> Result<PipelineExecutionResult> {
        let layers = self.dag.layers()?;
        let mut execution = PipelineExecutionResult::new(self.name.clone());

        info!("🚀 Starting pipeline '{}' (run {})", self.name, execution.run_id);
        info!(
            "📋 {} steps in {} layers, {} attempt(s) per step",
            self.dag.nodes().len(),
            layers.len(),
            self.policy.max_attempts()
        );

        let mut halted = false;
        for (index, layer) in layers.iter().enumerate() {
            if halted {
                for kind in layer {
                    warn!("⏭️ Skipping step '{}': an upstream step failed", kind);
                    execution.add_step_outcome(*kind, StepOutcome::skipped());
                }
                continue;
            }

            let names: Vec<&str> = layer.iter().map(|k| k.step_name()).collect();
            info!("🔄 Executing layer {}/{}: {}", index + 1, layers.len(), names.join(", "));

            let mut running = JoinSet::new();
            for kind in layer {
                let step = self.step(*kind)?;
                running.spawn(run_with_retry(
                    step,
                    self.layout.clone(),
                    self.policy,
                    self.notifier.clone(),
                    self.name.clone(),
                    self.contact.clone(),
                ));
            }

            while let Some(joined) = running.join_next().await {
                let (kind, outcome) = joined
                    .map_err(|e| EtlError::Dag(format!("step task could not be joined: {}", e)))?;
                if outcome.status != StepStatus::Succeeded {
                    halted = true;
                }
                execution.add_step_outcome(kind, outcome);
            }

            if halted {
                error!("❌ Stopping pipeline '{}' after layer {}", self.name, index + 1);
            }
        }

        execution.success = execution
            .step_results
            .get(StepKind::Transform.step_name())
            .is_some_and(|o| o.status == StepStatus::Succeeded);
        if execution.success {
            execution.final_output = Some(self.layout.transformed.clone());
        }
        execution.complete();

        let duration_secs = execution.duration().map(|d| d.num_milliseconds() as f64 / 1000.0).unwrap_or(0.0);
        RunMetrics::record_run(execution.success, duration_secs);

        if execution.success {
            info!(
                "🎉 Pipeline '{}' completed successfully: {}",
                self.name,
                self.layout.transformed.display()
            );
        } else {
            error!("💥 Pipeline '{}' failed", self.name);
        }

        Ok(execution)
    }

    /// Run a single step with the run's retry policy, regardless of whether
    /// its upstream steps have run.
    pub async fn run_step(&self, kind: StepKind) -> Result<StepOutcome> {
        info!("🔄 Running single step '{}'", kind);
        let step = self.step(kind)?;
        let (_, outcome) = run_with_retry(
            step,
            self.layout.clone(),
            self.policy,
            self.notifier.clone(),
            self.name.clone(),
            self.contact.clone(),
        )
        .await;
        Ok(outcome)
    }
}

/// Why a single attempt did not succeed.
enum AttemptFailure {
    Step(EtlError),
    TimedOut(Duration),
    Panicked(String),
}

impl AttemptFailure {
    fn kind(&self) -> Option<ErrorKind> {
        match self {
            AttemptFailure::Step(e) => Some(e.kind()),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        self.kind().map_or(true, ErrorKind::is_retryable)
    }

    fn message(&self) -> String {
        match self {
            AttemptFailure::Step(e) => e.to_string(),
            AttemptFailure::TimedOut(limit) => format!("timed out after {:?}", limit),
            AttemptFailure::Panicked(msg) => format!("step panicked: {}", msg),
        }
    }
}

async fn run_attempt(
    step: Arc<dyn PipelineStep>,
    layout: Arc<FileLayout>,
    timeout: Duration,
) -> std::result::Result<StepResult, AttemptFailure> {
    let name = step.step_name();
    let mut task = tokio::task::spawn_blocking(move || step.execute(&layout));
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(e))) => Err(AttemptFailure::Step(e)),
        Ok(Err(join_error)) => Err(AttemptFailure::Panicked(join_error.to_string())),
        Err(_) => {
            // A blocking task cannot be cancelled. Wait for it so no retry or
            // downstream step sees its outputs half written.
            warn!("⏳ Step '{}' exceeded {:?}; waiting for the attempt to stop", name, timeout);
            if let Err(join_error) = task.await {
                warn!("Timed-out attempt of step '{}' panicked: {}", name, join_error);
            }
            Err(AttemptFailure::TimedOut(timeout))
        }
    }
}

async fn run_with_retry(
    step: Arc<dyn PipelineStep>,
    layout: Arc<FileLayout>,
    policy: RunPolicy,
    notifier: Arc<dyn Notifier>,
    pipeline: String,
    contact: OperatorContact,
) -> (StepKind, StepOutcome) {
    let kind = step.kind();
    let name = step.step_name();
    let max_attempts = policy.max_attempts();
    let started_at = Utc::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        RunMetrics::record_attempt(name);

        let failure = match run_attempt(step.clone(), layout.clone(), policy.step_timeout).await {
            Ok(result) => {
                info!("✅ Step '{}' completed: {}", name, result.message);
                return (kind, StepOutcome::succeeded(attempt, started_at, result));
            }
            Err(failure) => failure,
        };
        RunMetrics::record_failure(name);

        let will_retry = failure.is_retryable() && attempt < max_attempts;
        let alert = Alert {
            kind: if will_retry { AlertKind::Retry } else { AlertKind::Failure },
            pipeline: pipeline.clone(),
            step: name,
            attempt,
            max_attempts,
            error: failure.message(),
            recipient: contact.clone(),
        };

        if will_retry {
            warn!("⚠️ Step '{}' failed on attempt {}/{}: {}", name, attempt, max_attempts, alert.error);
            if policy.notify_on_retry {
                send_alert(notifier.as_ref(), &alert).await;
            }
            tokio::time::sleep(policy.retry_delay).await;
            continue;
        }

        if !failure.is_retryable() {
            error!("❌ Step '{}' failed with a non-retryable error: {}", name, alert.error);
        } else {
            error!("❌ Step '{}' failed after {} attempt(s): {}", name, attempt, alert.error);
        }
        if policy.notify_on_failure {
            send_alert(notifier.as_ref(), &alert).await;
        }
        return (kind, StepOutcome::failed(attempt, started_at, failure.kind(), alert.error));
    }
}

async fn send_alert(notifier: &dyn Notifier, alert: &Alert) {
    if let Err(e) = notifier.notify(alert).await {
        warn!("Failed to deliver {:?} alert for step '{}': {}", alert.kind, alert.step, e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Not run because an upstream step failed.
    Skipped,
}

/// Final state of one step in a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub attempts: u32,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
    pub result: Option<StepResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepOutcome {
    fn succeeded(attempts: u32, started_at: DateTime<Utc>, result: StepResult) -> Self {
        Self {
            status: StepStatus::Succeeded,
            attempts,
            message: result.message.clone(),
            error_kind: None,
            result: Some(result),
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    fn failed(
        attempts: u32,
        started_at: DateTime<Utc>,
        error_kind: Option<ErrorKind>,
        message: String,
    ) -> Self {
        Self {
            status: StepStatus::Failed,
            attempts,
            message,
            error_kind,
            result: None,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    fn skipped() -> Self {
        Self {
            status: StepStatus::Skipped,
            attempts: 0,
            message: "skipped: upstream step failed".to_string(),
            error_kind: None,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Result of executing a complete pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineExecutionResult {
    pub run_id: Uuid,
    pub pipeline_name: String,
    /// True only when the transformed record set was written.
    pub success: bool,
    pub final_output: Option<PathBuf>,
    pub step_results: BTreeMap<String, StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineExecutionResult {
    pub fn new(pipeline_name: String) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name,
            success: false,
            final_output: None,
            step_results: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn add_step_outcome(&mut self, kind: StepKind, outcome: StepOutcome) {
        self.step_results.insert(kind.step_name().to_string(), outcome);
    }

    pub fn outcome(&self, kind: StepKind) -> Option<&StepOutcome> {
        self.step_results.get(kind.step_name())
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}
