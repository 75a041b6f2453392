//! # rampart-connectors
//!
//! External capability boundaries for the Rampart execution engine.
//!
//! The engine consumes two capabilities it does not implement: enrichment
//! (resolving user/host identity and threat context) and containment
//! (endpoint isolation, credential revocation). This crate defines those
//! traits, the shared error taxonomy, a bounded retry/timeout wrapper, and
//! mock implementations for tests and demos.

pub mod mock;
pub mod retry;
pub mod traits;

pub use mock::{CallRecord, MockBehavior, MockContainmentConnector, MockEnrichmentConnector};
pub use retry::{call_with_timeout, with_retry, RetryConfig};
pub use traits::{
    Connector, ConnectorError, ConnectorHealth, ConnectorResult, ContainmentConnector,
    EnrichmentConnector, EnrichmentPayload, SubjectKind,
};
