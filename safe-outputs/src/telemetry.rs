use std::time::Duration;

use tracing::info;

use crate::collect::Batch;

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Emit a telemetry log for a completed collection pass.
pub fn record_collection(batch: &Batch, lines: usize, duration: Duration) {
    let success = batch.check().is_ok();
    info!(
        target: "gh_aw::telemetry",
        event = "safe_outputs_collect",
        lines,
        items = batch.items().len(),
        errors = batch.errors().len(),
        redacted = batch.redacted_domains().len(),
        output_types = %batch.output_types(),
        success,
        duration_ms = millis(duration),
    );
}

/// Emit a telemetry log for a job spec compilation.
pub fn record_compilation(workflow: &str, jobs: usize, duration: Duration) {
    info!(
        target: "gh_aw::telemetry",
        event = "safe_outputs_compile",
        workflow,
        jobs,
        duration_ms = millis(duration),
    );
}
