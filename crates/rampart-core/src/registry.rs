//! Action registry for automated and containment tasks.
//!
//! The executor resolves each automated task's `action` name against this
//! registry and invokes the handler with a [`TaskContext`]. Handlers own
//! their connector references; the context carries the field store, the
//! task's parameters, and the per-call connector timeout.

use crate::fields::{FieldError, FieldStore};
use async_trait::async_trait;
use rampart_connectors::ConnectorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors a task handler can produce.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("action not registered: {0}")]
    UnknownAction(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("field error: {0}")]
    Field(#[from] FieldError),

    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl TaskError {
    /// Whether the executor may re-attempt the task after this error.
    ///
    /// Field type mismatches and bad parameters are configuration bugs:
    /// they are surfaced immediately and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Connector(err) => err.is_retryable(),
            TaskError::ExecutionFailed(_) => true,
            TaskError::UnknownAction(_)
            | TaskError::InvalidParameters(_)
            | TaskError::Field(_) => false,
        }
    }
}

/// Context handed to a handler for a single attempt.
#[derive(Clone)]
pub struct TaskContext {
    /// Incident the task belongs to.
    pub incident_id: Uuid,
    /// Id of the running task.
    pub task_id: String,
    /// Parameters from the task definition.
    pub parameters: serde_json::Value,
    /// The incident's field store.
    pub fields: Arc<FieldStore>,
    /// Bound for each connector call made by the handler.
    pub connector_timeout: Duration,
}

impl TaskContext {
    /// Reads a required string parameter.
    pub fn require_str(&self, key: &str) -> Result<&str, TaskError> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| TaskError::InvalidParameters(format!("missing parameter {key}")))
    }

    /// Reads an optional string parameter.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    /// Identity string recorded as the writer on field updates.
    pub fn writer(&self) -> String {
        format!("task:{}", self.task_id)
    }
}

/// What a handler reports back on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Human-readable result message.
    pub message: String,
    /// Structured output for downstream inspection.
    #[serde(default)]
    pub output: HashMap<String, serde_json::Value>,
}

impl TaskReport {
    /// Creates a report with just a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: HashMap::new(),
        }
    }

    /// Adds an output entry.
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }
}

/// A registered task action.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The action name tasks reference.
    fn name(&self) -> &str;

    /// Short description for listings.
    fn description(&self) -> &str {
        ""
    }

    /// Runs one attempt of the task.
    async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError>;
}

/// Maps action names to handlers.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its own name. Replaces any previous
    /// handler with the same name.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Looks up a handler.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Whether an action is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ransomware_schema;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError> {
            let text = ctx.require_str("text")?;
            Ok(TaskReport::message(text).with_output("echoed", serde_json::json!(true)))
        }
    }

    fn context(parameters: serde_json::Value) -> TaskContext {
        TaskContext {
            incident_id: Uuid::new_v4(),
            task_id: "t1".to_string(),
            parameters,
            fields: Arc::new(FieldStore::new(ransomware_schema())),
            connector_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(EchoHandler));

        let handler = registry.get("echo").unwrap();
        let report = handler
            .run(context(serde_json::json!({"text": "hello"})))
            .await
            .unwrap();
        assert_eq!(report.message, "hello");
        assert_eq!(report.output["echoed"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_not_retryable() {
        let handler = EchoHandler;
        let err = handler
            .run(context(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidParameters(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TaskError::Connector(ConnectorError::Timeout(30)).is_retryable());
        assert!(TaskError::ExecutionFailed("flaky".into()).is_retryable());
        assert!(!TaskError::Connector(ConnectorError::NotFound("x".into())).is_retryable());
        assert!(!TaskError::UnknownAction("x".into()).is_retryable());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(EchoHandler));
        assert_eq!(registry.names(), vec!["echo"]);
        assert!(registry.contains("echo"));
        assert!(!registry.contains("nope"));
    }
}
