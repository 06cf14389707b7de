// Pipeline orchestration: the step graph, step adapters and the executor

pub mod dag;
pub mod notify;
pub mod orchestrator;
pub mod steps;

pub use dag::{PipelineDag, StepKind};
pub use notify::{Alert, AlertKind, Notifier, OperatorContact, TracingNotifier};
pub use orchestrator::{PipelineExecutionResult, PipelineOrchestrator, RunPolicy, StepOutcome, StepStatus};
pub use steps::{ConsolidateStep, ExpandStep, ExtractStep, PipelineStep, StepResult, TransformStep};
