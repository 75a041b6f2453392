//! User enrichment task.

use async_trait::async_trait;
use rampart_connectors::{with_retry, EnrichmentConnector, RetryConfig, SubjectKind};
use rampart_core::fields::schema::names;
use rampart_core::playbook::ransomware::actions;
use rampart_core::registry::{TaskContext, TaskError, TaskHandler, TaskReport};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Resolves identity context for every entry in the Users list field and
/// merges the payload into the matching record.
pub struct EnrichUsersHandler {
    connector: Arc<dyn EnrichmentConnector>,
    retry: RetryConfig,
}

impl EnrichUsersHandler {
    /// Creates a handler with the default connector retry policy.
    pub fn new(connector: Arc<dyn EnrichmentConnector>) -> Self {
        Self {
            connector,
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the connector retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl TaskHandler for EnrichUsersHandler {
    fn name(&self) -> &str {
        actions::ENRICH_USERS
    }

    fn description(&self) -> &str {
        "Resolves directory context for the affected users"
    }

    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id))]
    async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        enrich_list_field(
            &ctx,
            names::USERS,
            SubjectKind::User,
            self.connector.as_ref(),
            &self.retry,
        )
        .await
    }
}

/// Shared enrichment loop for the Users and Hosts record lists.
///
/// A lookup miss is tolerated per subject (the record simply stays
/// unenriched); transient connector failures that outlive the retry budget
/// fail the whole task so the executor can re-attempt it.
pub(crate) async fn enrich_list_field(
    ctx: &TaskContext,
    field: &str,
    kind: SubjectKind,
    connector: &dyn EnrichmentConnector,
    retry: &RetryConfig,
) -> Result<TaskReport, TaskError> {
    let records = match ctx.fields.get(field)? {
        Some(value) => value.as_records().map(<[serde_json::Value]>::to_vec),
        None => None,
    };
    let records = match records {
        Some(records) if !records.is_empty() => records,
        _ => {
            return Ok(
                TaskReport::message(format!("no entries in {field}; nothing to enrich"))
                    .with_output("enriched", serde_json::json!(0)),
            )
        }
    };

    let writer = ctx.writer();
    let mut enriched = 0usize;
    let mut missing = 0usize;
    for record in &records {
        let subject = match record.get("name").and_then(|n| n.as_str()) {
            Some(name) => name,
            None => continue,
        };

        let result = with_retry(retry, ctx.connector_timeout, "enrich", || {
            connector.enrich(kind, subject)
        })
        .await;

        match result {
            Ok(payload) => {
                let patch = serde_json::json!({
                    "enrichment": payload.attributes,
                    "enrichment_source": payload.source,
                });
                ctx.fields.merge_record(field, subject, &patch, &writer)?;
                enriched += 1;
            }
            Err(rampart_connectors::ConnectorError::NotFound(_)) => {
                warn!(subject, %kind, "subject not known to the enrichment source");
                missing += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(field, enriched, missing, "enrichment pass complete");
    Ok(TaskReport::message(format!(
        "enriched {enriched} of {} entr(ies) in {field}",
        records.len()
    ))
    .with_output("enriched", serde_json::json!(enriched))
    .with_output("missing", serde_json::json!(missing)))
}
