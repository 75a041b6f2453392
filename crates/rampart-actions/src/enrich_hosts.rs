//! Host enrichment task.

use crate::enrich_users::enrich_list_field;
use async_trait::async_trait;
use rampart_connectors::{EnrichmentConnector, RetryConfig, SubjectKind};
use rampart_core::fields::schema::names;
use rampart_core::playbook::ransomware::actions;
use rampart_core::registry::{TaskContext, TaskError, TaskHandler, TaskReport};
use std::sync::Arc;
use tracing::instrument;

/// Resolves endpoint context for every entry in the Hosts list field.
pub struct EnrichHostsHandler {
    connector: Arc<dyn EnrichmentConnector>,
    retry: RetryConfig,
}

impl EnrichHostsHandler {
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
impl TaskHandler for EnrichHostsHandler {
    fn name(&self) -> &str {
        actions::ENRICH_HOSTS
    }

    fn description(&self) -> &str {
        "Resolves endpoint context for the affected hosts"
    }

    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id))]
    async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        enrich_list_field(
            &ctx,
            names::HOSTS,
            SubjectKind::Host,
            self.connector.as_ref(),
            &self.retry,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_connectors::MockEnrichmentConnector;
    use rampart_core::fields::{ransomware_schema, FieldStore};
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_enriches_known_hosts() {
        let fields = Arc::new(FieldStore::new(ransomware_schema()));
        fields
            .append_record(
                names::HOSTS,
                serde_json::json!({"name": "ws-finance-01"}),
                "intake",
            )
            .unwrap();
        fields
            .append_record(
                names::HOSTS,
                serde_json::json!({"name": "srv-files-02"}),
                "intake",
            )
            .unwrap();

        let connector = Arc::new(MockEnrichmentConnector::with_sample_data("mock-edr"));
        let handler = EnrichHostsHandler::new(connector);
        let ctx = TaskContext {
            incident_id: Uuid::new_v4(),
            task_id: "enrich-hosts".to_string(),
            parameters: serde_json::Value::Null,
            fields: Arc::clone(&fields),
            connector_timeout: Duration::from_secs(5),
        };

        let report = handler.run(ctx).await.unwrap();
        assert_eq!(report.output["enriched"], serde_json::json!(2));

        let hosts = fields.get(names::HOSTS).unwrap().unwrap();
        let records = hosts.as_records().unwrap();
        assert_eq!(
            records[0]["enrichment"]["os"],
            serde_json::json!("Windows 10 Enterprise")
        );
        assert_eq!(
            records[1]["enrichment"]["criticality"],
            serde_json::json!("high")
        );
    }
}
