//! # rampart-actions
//!
//! Built-in task handlers for the ransomware investigation playbook. Each
//! handler implements `rampart_core::TaskHandler` against the connector
//! traits and registers under the action name the playbook references.

pub mod enrich_hosts;
pub mod enrich_users;
pub mod extract_indicators;
pub mod isolate_hosts;
pub mod revoke_users;

pub use enrich_hosts::EnrichHostsHandler;
pub use enrich_users::EnrichUsersHandler;
pub use extract_indicators::ExtractIndicatorsHandler;
pub use isolate_hosts::IsolateHostsHandler;
pub use revoke_users::RevokeUsersHandler;

use rampart_connectors::{ContainmentConnector, EnrichmentConnector};
use rampart_core::ActionRegistry;
use std::sync::Arc;

/// Builds a registry with every built-in handler wired to the given
/// connectors.
pub fn builtin_registry(
    enrichment: Arc<dyn EnrichmentConnector>,
    containment: Arc<dyn ContainmentConnector>,
) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(ExtractIndicatorsHandler::new()));
    registry.register(Arc::new(EnrichUsersHandler::new(Arc::clone(&enrichment))));
    registry.register(Arc::new(EnrichHostsHandler::new(enrichment)));
    registry.register(Arc::new(IsolateHostsHandler::new(Arc::clone(
        &containment,
    ))));
    registry.register(Arc::new(RevokeUsersHandler::new(containment)));
    registry
}
