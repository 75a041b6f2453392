//! Mock connectors for testing.
//!
//! Configurable in-memory implementations of the enrichment and containment
//! traits with failure injection and call recording, used by executor tests
//! and the CLI demo.

use crate::traits::{
    Connector, ConnectorError, ConnectorHealth, ConnectorResult, ContainmentConnector,
    EnrichmentConnector, EnrichmentPayload, SubjectKind,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Behavior configuration for failure injection.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Normal operation.
    #[default]
    Normal,
    /// Always fail with the given error.
    AlwaysFail(ConnectorError),
    /// Fail the first N calls, then succeed.
    FailFirst { failures: u64, error: ConnectorError },
    /// Fail once the call count exceeds N.
    FailAfter { calls: u64, error: ConnectorError },
}

impl MockBehavior {
    fn check(&self, call_number: u64) -> ConnectorResult<()> {
        match self {
            MockBehavior::Normal => Ok(()),
            MockBehavior::AlwaysFail(err) => Err(err.clone()),
            MockBehavior::FailFirst { failures, error } => {
                if call_number <= *failures {
                    Err(error.clone())
                } else {
                    Ok(())
                }
            }
            MockBehavior::FailAfter { calls, error } => {
                if call_number > *calls {
                    Err(error.clone())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Record of a call for test verification.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub operation: String,
    pub subject: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub success: bool,
}

/// Mock enrichment connector backed by a static directory.
pub struct MockEnrichmentConnector {
    name: String,
    directory: Arc<RwLock<HashMap<(SubjectKind, String), HashMap<String, serde_json::Value>>>>,
    behavior: Arc<RwLock<MockBehavior>>,
    call_count: AtomicU64,
    history: Arc<RwLock<Vec<CallRecord>>>,
}

impl MockEnrichmentConnector {
    /// Creates an empty mock connector.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            directory: Arc::new(RwLock::new(HashMap::new())),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            call_count: AtomicU64::new(0),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Creates a mock connector pre-loaded with sample users and hosts.
    pub fn with_sample_data(name: &str) -> Self {
        let mut directory = HashMap::new();

        directory.insert(
            (SubjectKind::User, "jdoe".to_string()),
            HashMap::from([
                ("display_name".to_string(), serde_json::json!("Jane Doe")),
                ("department".to_string(), serde_json::json!("Finance")),
                (
                    "email".to_string(),
                    serde_json::json!("jdoe@example.com"),
                ),
                ("privileged".to_string(), serde_json::json!(false)),
            ]),
        );
        directory.insert(
            (SubjectKind::User, "asmith".to_string()),
            HashMap::from([
                ("display_name".to_string(), serde_json::json!("Alex Smith")),
                ("department".to_string(), serde_json::json!("IT")),
                (
                    "email".to_string(),
                    serde_json::json!("asmith@example.com"),
                ),
                ("privileged".to_string(), serde_json::json!(true)),
            ]),
        );
        directory.insert(
            (SubjectKind::Host, "ws-finance-01".to_string()),
            HashMap::from([
                ("os".to_string(), serde_json::json!("Windows 10 Enterprise")),
                ("ip".to_string(), serde_json::json!("192.168.1.100")),
                ("agent_version".to_string(), serde_json::json!("6.42.0")),
                ("criticality".to_string(), serde_json::json!("medium")),
            ]),
        );
        directory.insert(
            (SubjectKind::Host, "srv-files-02".to_string()),
            HashMap::from([
                ("os".to_string(), serde_json::json!("Windows Server 2019")),
                ("ip".to_string(), serde_json::json!("10.0.0.50")),
                ("agent_version".to_string(), serde_json::json!("6.42.0")),
                ("criticality".to_string(), serde_json::json!("high")),
            ]),
        );

        Self {
            name: name.to_string(),
            directory: Arc::new(RwLock::new(directory)),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            call_count: AtomicU64::new(0),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Adds a directory entry.
    pub async fn insert(
        &self,
        kind: SubjectKind,
        identifier: &str,
        attributes: HashMap<String, serde_json::Value>,
    ) {
        self.directory
            .write()
            .await
            .insert((kind, identifier.to_string()), attributes);
    }

    /// Sets the failure-injection behavior.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// Returns the number of calls made.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns the call history.
    pub async fn history(&self) -> Vec<CallRecord> {
        self.history.read().await.clone()
    }

    async fn record(&self, operation: &str, subject: &str, success: bool) {
        self.history.write().await.push(CallRecord {
            operation: operation.to_string(),
            subject: subject.to_string(),
            timestamp: Utc::now(),
            success,
        });
    }
}

#[async_trait]
impl Connector for MockEnrichmentConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(err) => Ok(ConnectorHealth::Unhealthy(err.to_string())),
            _ => Ok(ConnectorHealth::Healthy),
        }
    }
}

#[async_trait]
impl EnrichmentConnector for MockEnrichmentConnector {
    async fn enrich(
        &self,
        kind: SubjectKind,
        identifier: &str,
    ) -> ConnectorResult<EnrichmentPayload> {
        let call_number = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(err) = self.behavior.read().await.check(call_number) {
            self.record("enrich", identifier, false).await;
            return Err(err);
        }

        let directory = self.directory.read().await;
        match directory.get(&(kind, identifier.to_string())) {
            Some(attributes) => {
                self.record("enrich", identifier, true).await;
                Ok(EnrichmentPayload {
                    subject: identifier.to_string(),
                    kind,
                    attributes: attributes.clone(),
                    source: self.name.clone(),
                    retrieved_at: Utc::now(),
                })
            }
            None => {
                self.record("enrich", identifier, false).await;
                Err(ConnectorError::NotFound(format!("{kind} {identifier}")))
            }
        }
    }
}

/// Mock containment connector tracking isolation and revocation state.
pub struct MockContainmentConnector {
    name: String,
    isolated_hosts: Arc<RwLock<HashSet<String>>>,
    revoked_users: Arc<RwLock<HashSet<String>>>,
    behavior: Arc<RwLock<MockBehavior>>,
    call_count: AtomicU64,
    history: Arc<RwLock<Vec<CallRecord>>>,
}

impl MockContainmentConnector {
    /// Creates a new mock containment connector.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            isolated_hosts: Arc::new(RwLock::new(HashSet::new())),
            revoked_users: Arc::new(RwLock::new(HashSet::new())),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            call_count: AtomicU64::new(0),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Sets the failure-injection behavior.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// Whether a host is currently isolated.
    pub async fn is_isolated(&self, host_id: &str) -> bool {
        self.isolated_hosts.read().await.contains(host_id)
    }

    /// Whether a user's credentials were revoked.
    pub async fn is_revoked(&self, user_id: &str) -> bool {
        self.revoked_users.read().await.contains(user_id)
    }

    /// Returns the number of calls made.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns the call history.
    pub async fn history(&self) -> Vec<CallRecord> {
        self.history.read().await.clone()
    }

    async fn record(&self, operation: &str, subject: &str, success: bool) {
        self.history.write().await.push(CallRecord {
            operation: operation.to_string(),
            subject: subject.to_string(),
            timestamp: Utc::now(),
            success,
        });
    }

    async fn gate(&self) -> ConnectorResult<()> {
        let call_number = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.behavior.read().await.check(call_number)
    }
}

#[async_trait]
impl Connector for MockContainmentConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(err) => Ok(ConnectorHealth::Unhealthy(err.to_string())),
            _ => Ok(ConnectorHealth::Healthy),
        }
    }
}

#[async_trait]
impl ContainmentConnector for MockContainmentConnector {
    async fn isolate_host(&self, host_id: &str) -> ConnectorResult<()> {
        if let Err(err) = self.gate().await {
            self.record("isolate_host", host_id, false).await;
            return Err(err);
        }
        self.isolated_hosts.write().await.insert(host_id.to_string());
        self.record("isolate_host", host_id, true).await;
        Ok(())
    }

    async fn revoke_user(&self, user_id: &str) -> ConnectorResult<()> {
        if let Err(err) = self.gate().await {
            self.record("revoke_user", user_id, false).await;
            return Err(err);
        }
        self.revoked_users.write().await.insert(user_id.to_string());
        self.record("revoke_user", user_id, true).await;
        Ok(())
    }
}
