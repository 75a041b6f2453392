//! Host isolation containment task.

use async_trait::async_trait;
use rampart_connectors::{call_with_timeout, ContainmentConnector};
use rampart_core::fields::schema::names;
use rampart_core::playbook::ransomware::actions;
use rampart_core::registry::{TaskContext, TaskError, TaskHandler, TaskReport};
use std::sync::Arc;
use tracing::{info, instrument};

/// Isolates every host in the Hosts list field from the network.
///
/// Isolation is idempotent at the connector, so a re-attempt after a
/// partial failure re-issues the calls for all hosts.
pub struct IsolateHostsHandler {
    connector: Arc<dyn ContainmentConnector>,
}

impl IsolateHostsHandler {
    /// Creates a new isolation handler.
    pub fn new(connector: Arc<dyn ContainmentConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl TaskHandler for IsolateHostsHandler {
    fn name(&self) -> &str {
        actions::ISOLATE_HOSTS
    }

    fn description(&self) -> &str {
        "Isolates the affected hosts from the network"
    }

    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id))]
    async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        let hostnames = record_names(&ctx, names::HOSTS)?;
        if hostnames.is_empty() {
            return Ok(TaskReport::message("no hosts listed; nothing to isolate")
                .with_output("isolated", serde_json::json!(0)));
        }

        let writer = ctx.writer();
        for hostname in &hostnames {
            call_with_timeout(ctx.connector_timeout, self.connector.isolate_host(hostname))
                .await?;
            ctx.fields.merge_record(
                names::HOSTS,
                hostname,
                &serde_json::json!({"isolated": true}),
                &writer,
            )?;
            info!(hostname, "host isolated");
        }

        Ok(
            TaskReport::message(format!("isolated {} host(s)", hostnames.len()))
                .with_output("isolated", serde_json::json!(hostnames.len())),
        )
    }
}

/// The `name` keys of a record-list field.
pub(crate) fn record_names(ctx: &TaskContext, field: &str) -> Result<Vec<String>, TaskError> {
    Ok(ctx
        .fields
        .get(field)?
        .and_then(|value| {
            value.as_records().map(|records| {
                records
                    .iter()
                    .filter_map(|r| r.get("name").and_then(|n| n.as_str()).map(str::to_string))
                    .collect()
            })
        })
        .unwrap_or_default())
}
