use tracing::trace;

// Counters are emitted as trace events; there is no exporter in this binary.

pub fn attempt(phase: &'static str, outcome: &'static str) {
    trace!(
        target: "remains.metrics",
        phase = phase,
        outcome = outcome,
        "attempts_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target: "remains.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn tenant_finished(outcome: &'static str) {
    trace!(
        target: "remains.metrics",
        outcome = outcome,
        "tenants_total_inc"
    );
}
