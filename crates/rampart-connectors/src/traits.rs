//! Connector trait definitions for Rampart.
//!
//! This module defines the interfaces the execution engine uses to reach
//! external systems. The engine never implements these capabilities itself:
//! enrichment (identity and threat context) and containment (isolation,
//! credential revocation) are boundaries crossed through the traits below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ConnectorError {
    /// Whether a retry is worth attempting for this error.
    ///
    /// Timeouts and outages are transient; a lookup miss is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::Timeout(_) | ConnectorError::Unavailable(_)
        )
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// What kind of subject an enrichment lookup is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// A user account (maps from a "Username" observable).
    User,
    /// An endpoint (maps from a "Hostname" observable).
    Host,
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectKind::User => write!(f, "user"),
            SubjectKind::Host => write!(f, "host"),
        }
    }
}

/// Enrichment data returned for a user or host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentPayload {
    /// The identifier that was looked up.
    pub subject: String,
    /// Kind of subject.
    pub kind: SubjectKind,
    /// Provider-specific attributes (OS, department, last logon, ...).
    pub attributes: HashMap<String, serde_json::Value>,
    /// Source system that produced the payload.
    pub source: String,
    /// When the payload was retrieved.
    pub retrieved_at: DateTime<Utc>,
}

impl EnrichmentPayload {
    /// Creates a payload for the given subject with no attributes.
    pub fn new(subject: impl Into<String>, kind: SubjectKind, source: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            kind,
            attributes: HashMap::new(),
            source: source.into(),
            retrieved_at: Utc::now(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Health status of a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    /// Connector is healthy and operational.
    Healthy,
    /// Connector is degraded but still functional.
    Degraded(String),
    /// Connector is unhealthy and not operational.
    Unhealthy(String),
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Checks the health of the connector.
    async fn health_check(&self) -> ConnectorResult<ConnectorHealth>;
}

/// Resolves identity and threat context for users and hosts.
#[async_trait]
pub trait EnrichmentConnector: Connector {
    /// Looks up enrichment data for the given subject.
    async fn enrich(
        &self,
        kind: SubjectKind,
        identifier: &str,
    ) -> ConnectorResult<EnrichmentPayload>;
}

/// Executes containment actions against endpoints and accounts.
#[async_trait]
pub trait ContainmentConnector: Connector {
    /// Isolates a host from the network.
    async fn isolate_host(&self, host_id: &str) -> ConnectorResult<()>;

    /// Revokes a user's credentials and active sessions.
    async fn revoke_user(&self, user_id: &str) -> ConnectorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ConnectorError::Timeout(30).is_retryable());
        assert!(ConnectorError::Unavailable("503".into()).is_retryable());
        assert!(!ConnectorError::NotFound("ghost".into()).is_retryable());
    }

    #[test]
    fn test_payload_builder() {
        let payload = EnrichmentPayload::new("ws-01", SubjectKind::Host, "mock-edr")
            .with_attribute("os", serde_json::json!("Windows 11"));

        assert_eq!(payload.subject, "ws-01");
        assert_eq!(payload.kind, SubjectKind::Host);
        assert_eq!(payload.attributes["os"], serde_json::json!("Windows 11"));
    }

    #[test]
    fn test_subject_kind_serialization() {
        let json = serde_json::to_string(&SubjectKind::Host).unwrap();
        assert_eq!(json, "\"host\"");
        let back: SubjectKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SubjectKind::Host);
    }
}
