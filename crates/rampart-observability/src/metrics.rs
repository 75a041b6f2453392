//! Metric registration for Rampart.
//!
//! The engine emits counters through the `metrics` facade; this module
//! registers their descriptions once at startup so whatever exporter the
//! host process installs can expose them with help text.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Registers descriptions for every metric the engine emits.
pub fn register_metrics() {
    describe_counter!(
        "rampart_executions_total",
        "Playbook executions driven to a terminal configuration"
    );
    describe_counter!(
        "rampart_tasks_succeeded_total",
        "Tasks that reached the succeeded state"
    );
    describe_counter!(
        "rampart_tasks_failed_total",
        "Tasks that failed terminally"
    );
    describe_counter!(
        "rampart_tasks_skipped_total",
        "Tasks skipped by branch selection or failure propagation"
    );
    describe_counter!(
        "rampart_task_retries_total",
        "Failed attempts re-scheduled within a task's retry budget"
    );
    describe_counter!(
        "rampart_standing_risks_total",
        "Containment failures raised for analyst acknowledgment"
    );
    describe_counter!(
        "rampart_events_published_total",
        "Execution events published on the event bus"
    );

    describe_gauge!(
        "rampart_incidents_open",
        "Incidents not yet closed"
    );
    describe_histogram!(
        "rampart_task_duration_seconds",
        "Wall-clock duration of task attempts"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        // Describe macros tolerate repeated registration
        register_metrics();
        register_metrics();
    }
}
