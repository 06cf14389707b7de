//! Stage metrics.
//!
//! Counters and histograms are emitted through the `metrics` facade. No
//! exporter is installed by this crate; when no recorder is registered the
//! macros are no-ops.

use std::time::Instant;

macro_rules! stage_metric {
    (counter, $name:literal) => {
        concat!("toll_etl_", $name, "_total")
    };
    (histogram, $name:literal) => {
        concat!("toll_etl_", $name)
    };
}

/// Metrics recorded by the stage functions.
pub struct StageMetrics;

impl StageMetrics {
    pub fn record_rows_read(stage: &'static str, rows: usize) {
        ::metrics::counter!(stage_metric!(counter, "rows_read"), "stage" => stage).increment(rows as u64);
    }

    pub fn record_rows_written(stage: &'static str, rows: usize) {
        ::metrics::counter!(stage_metric!(counter, "rows_written"), "stage" => stage)
            .increment(rows as u64);
    }

    pub fn record_members_extracted(members: usize) {
        ::metrics::counter!(stage_metric!(counter, "archive_members")).increment(members as u64);
    }

    pub fn record_rows_truncated(rows: usize) {
        ::metrics::counter!(stage_metric!(counter, "merge_rows_truncated")).increment(rows as u64);
    }
}

/// Metrics recorded by the orchestrator.
pub struct RunMetrics;

impl RunMetrics {
    pub fn record_attempt(step: &'static str) {
        ::metrics::counter!(stage_metric!(counter, "step_attempts"), "step" => step).increment(1);
    }

    pub fn record_failure(step: &'static str) {
        ::metrics::counter!(stage_metric!(counter, "step_failures"), "step" => step).increment(1);
    }

    pub fn record_run(success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        ::metrics::counter!(stage_metric!(counter, "runs"), "outcome" => outcome).increment(1);
        ::metrics::histogram!(stage_metric!(histogram, "run_duration_seconds")).record(duration_secs);
    }
}

/// Records the stage duration histogram when dropped.
pub struct TimingGuard {
    start: Instant,
    stage: &'static str,
}

impl TimingGuard {
    pub fn new(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(stage_metric!(histogram, "stage_duration_seconds"), "stage" => self.stage)
            .record(duration);
    }
}

pub fn time_stage(stage: &'static str) -> TimingGuard {
    TimingGuard::new(stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(stage_metric!(counter, "rows_read"), "toll_etl_rows_read_total");
        assert_eq!(stage_metric!(histogram, "run_duration_seconds"), "toll_etl_run_duration_seconds");
    }
}
