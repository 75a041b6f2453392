//! Credential revocation containment task.

use crate::isolate_hosts::record_names;
use async_trait::async_trait;
use rampart_connectors::{call_with_timeout, ContainmentConnector};
use rampart_core::fields::schema::names;
use rampart_core::playbook::ransomware::actions;
use rampart_core::registry::{TaskContext, TaskError, TaskHandler, TaskReport};
use std::sync::Arc;
use tracing::{info, instrument};

/// Revokes credentials and sessions for every user in the Users list field.
pub struct RevokeUsersHandler {
    connector: Arc<dyn ContainmentConnector>,
}

impl RevokeUsersHandler {
    /// Creates a new revocation handler.
    pub fn new(connector: Arc<dyn ContainmentConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl TaskHandler for RevokeUsersHandler {
    fn name(&self) -> &str {
        actions::REVOKE_USERS
    }

    fn description(&self) -> &str {
        "Revokes credentials and sessions of the affected users"
    }

    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id))]
    async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        let usernames = record_names(&ctx, names::USERS)?;
        if usernames.is_empty() {
            return Ok(TaskReport::message("no users listed; nothing to revoke")
                .with_output("revoked", serde_json::json!(0)));
        }

        let writer = ctx.writer();
        for username in &usernames {
            call_with_timeout(ctx.connector_timeout, self.connector.revoke_user(username))
                .await?;
            ctx.fields.merge_record(
                names::USERS,
                username,
                &serde_json::json!({"revoked": true}),
                &writer,
            )?;
            info!(username, "credentials revoked");
        }

        Ok(
            TaskReport::message(format!("revoked {} user(s)", usernames.len()))
                .with_output("revoked", serde_json::json!(usernames.len())),
        )
    }
}
