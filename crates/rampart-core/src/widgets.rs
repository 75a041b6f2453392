//! Derived display values for the external layout renderer.
//!
//! Widgets are pure functions of a field store snapshot: rendering mutates
//! nothing and tolerates partially populated fields, showing "Unknown"
//! where enrichment has not landed yet. A caching variant invalidates
//! itself through field subscriptions.

use crate::fields::schema::names;
use crate::fields::{FieldStore, FieldValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const UNKNOWN: &str = "Unknown";

/// Encryption status summary: the status enumeration plus the blast radius.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptionStatusWidget {
    pub status: String,
    pub strain: String,
    /// Parsed from the approximate-endpoints field when it holds a number.
    pub encrypted_endpoints: Option<u64>,
    pub affected_users: usize,
    pub affected_hosts: usize,
}

/// One row of the host impact widget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostImpactRow {
    pub hostname: String,
    pub os: String,
    pub criticality: String,
    /// None until a containment task has reported either way.
    pub isolated: Option<bool>,
    pub enriched: bool,
}

/// Aggregated host impact across the Hosts list field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostImpactWidget {
    pub rows: Vec<HostImpactRow>,
    pub total: usize,
    pub enriched_count: usize,
    pub isolated_count: usize,
}

/// The widget set produced for one incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentWidgets {
    pub incident_id: Uuid,
    pub encryption_status: EncryptionStatusWidget,
    pub host_impact: HostImpactWidget,
}

/// Stateless widget renderer.
pub struct WidgetRenderer;

impl WidgetRenderer {
    /// Renders both widgets from the store's current state.
    pub fn render(incident_id: Uuid, fields: &FieldStore) -> IncidentWidgets {
        IncidentWidgets {
            incident_id,
            encryption_status: Self::encryption_status(fields),
            host_impact: Self::host_impact(fields),
        }
    }

    fn scalar_or_unknown(fields: &FieldStore, name: &str) -> String {
        fields
            .get(name)
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn list_len(fields: &FieldStore, name: &str) -> usize {
        match fields.get(name).ok().flatten() {
            Some(FieldValue::RecordList(records)) => records.len(),
            Some(FieldValue::StringList(items)) => items.len(),
            _ => 0,
        }
    }

    fn encryption_status(fields: &FieldStore) -> EncryptionStatusWidget {
        let encrypted_endpoints = fields
            .get(names::ENCRYPTED_ENDPOINTS)
            .ok()
            .flatten()
            .and_then(|v| v.as_str().and_then(|s| s.trim().parse::<u64>().ok()));

        EncryptionStatusWidget {
            status: Self::scalar_or_unknown(fields, names::ENCRYPTION_STATUS),
            strain: Self::scalar_or_unknown(fields, names::STRAIN),
            encrypted_endpoints,
            affected_users: Self::list_len(fields, names::USERS),
            affected_hosts: Self::list_len(fields, names::HOSTS),
        }
    }

    fn host_impact(fields: &FieldStore) -> HostImpactWidget {
        let records = match fields.get(names::HOSTS).ok().flatten() {
            Some(FieldValue::RecordList(records)) => records,
            _ => Vec::new(),
        };

        let rows: Vec<HostImpactRow> = records
            .iter()
            .map(|record| {
                let enrichment = record.get("enrichment").and_then(|e| e.as_object());
                let attr = |key: &str| {
                    enrichment
                        .and_then(|e| e.get(key))
                        .and_then(|v| v.as_str())
                        .unwrap_or(UNKNOWN)
                        .to_string()
                };
                HostImpactRow {
                    hostname: record
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or(UNKNOWN)
                        .to_string(),
                    os: attr("os"),
                    criticality: attr("criticality"),
                    isolated: record.get("isolated").and_then(|v| v.as_bool()),
                    enriched: enrichment.is_some(),
                }
            })
            .collect();

        HostImpactWidget {
            total: rows.len(),
            enriched_count: rows.iter().filter(|r| r.enriched).count(),
            isolated_count: rows.iter().filter(|r| r.isolated == Some(true)).count(),
            rows,
        }
    }
}

/// Widget renderer with a subscription-invalidated cache.
///
/// Field writes flip a dirty flag; [`CachedWidgetRenderer::current`]
/// recomputes only when something changed since the last render.
pub struct CachedWidgetRenderer {
    incident_id: Uuid,
    fields: Arc<FieldStore>,
    dirty: Arc<AtomicBool>,
    cache: Mutex<Option<IncidentWidgets>>,
}

impl CachedWidgetRenderer {
    /// Creates a cached renderer subscribed to every declared field.
    pub fn new(incident_id: Uuid, fields: Arc<FieldStore>) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let field_names: Vec<String> =
            fields.schema().iter().map(|f| f.name.clone()).collect();
        for name in field_names {
            let flag = Arc::clone(&dirty);
            // Subscribing to a declared field cannot fail
            let _ = fields.subscribe(&name, move |_, _| {
                flag.store(true, Ordering::Release);
            });
        }
        Self {
            incident_id,
            fields,
            dirty,
            cache: Mutex::new(None),
        }
    }

    /// The current widgets, recomputed only if a field changed.
    pub fn current(&self) -> IncidentWidgets {
        let mut cache = self.cache.lock().expect("widget cache poisoned");
        let stale = self.dirty.swap(false, Ordering::AcqRel);
        if stale || cache.is_none() {
            *cache = Some(WidgetRenderer::render(self.incident_id, &self.fields));
        }
        cache.clone().expect("filled above")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ransomware_schema;

    fn store() -> FieldStore {
        FieldStore::new(ransomware_schema())
    }

    #[test]
    fn test_empty_store_renders_unknown() {
        let fields = store();
        let widgets = WidgetRenderer::render(Uuid::new_v4(), &fields);

        assert_eq!(widgets.encryption_status.status, "Unknown");
        assert_eq!(widgets.encryption_status.strain, "Unknown");
        assert_eq!(widgets.encryption_status.encrypted_endpoints, None);
        assert_eq!(widgets.encryption_status.affected_users, 0);
        assert!(widgets.host_impact.rows.is_empty());
    }

    #[test]
    fn test_populated_encryption_summary() {
        let fields = store();
        fields
            .set(
                names::ENCRYPTION_STATUS,
                FieldValue::enumeration("Confirmed"),
                "t",
            )
            .unwrap();
        fields
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "t")
            .unwrap();
        fields
            .set(names::ENCRYPTED_ENDPOINTS, FieldValue::scalar("45"), "t")
            .unwrap();
        fields
            .append_record(names::USERS, serde_json::json!({"name": "jdoe"}), "t")
            .unwrap();

        let widgets = WidgetRenderer::render(Uuid::new_v4(), &fields);
        assert_eq!(widgets.encryption_status.status, "Confirmed");
        assert_eq!(widgets.encryption_status.strain, "LockFile");
        assert_eq!(widgets.encryption_status.encrypted_endpoints, Some(45));
        assert_eq!(widgets.encryption_status.affected_users, 1);
    }

    #[test]
    fn test_non_numeric_endpoint_count_renders_none() {
        let fields = store();
        fields
            .set(
                names::ENCRYPTED_ENDPOINTS,
                FieldValue::scalar("dozens"),
                "t",
            )
            .unwrap();

        let widgets = WidgetRenderer::render(Uuid::new_v4(), &fields);
        assert_eq!(widgets.encryption_status.encrypted_endpoints, None);
    }

    #[test]
    fn test_host_impact_tolerates_partial_enrichment() {
        let fields = store();
        fields
            .append_record(
                names::HOSTS,
                serde_json::json!({
                    "name": "ws-finance-01",
                    "enrichment": {"os": "Windows 10", "criticality": "medium"},
                    "isolated": true
                }),
                "t",
            )
            .unwrap();
        fields
            .append_record(names::HOSTS, serde_json::json!({"name": "srv-files-02"}), "t")
            .unwrap();

        let widgets = WidgetRenderer::render(Uuid::new_v4(), &fields);
        let impact = &widgets.host_impact;
        assert_eq!(impact.total, 2);
        assert_eq!(impact.enriched_count, 1);
        assert_eq!(impact.isolated_count, 1);

        assert_eq!(impact.rows[0].os, "Windows 10");
        assert_eq!(impact.rows[0].isolated, Some(true));
        assert_eq!(impact.rows[1].os, "Unknown");
        assert_eq!(impact.rows[1].isolated, None);
        assert!(!impact.rows[1].enriched);
    }

    #[test]
    fn test_rendering_does_not_mutate_fields() {
        let fields = store();
        fields
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "t")
            .unwrap();

        let before = fields.snapshot();
        let _ = WidgetRenderer::render(Uuid::new_v4(), &fields);
        assert_eq!(fields.snapshot(), before);
    }

    #[test]
    fn test_cached_renderer_invalidates_on_write() {
        let fields = Arc::new(store());
        let renderer = CachedWidgetRenderer::new(Uuid::new_v4(), Arc::clone(&fields));

        let first = renderer.current();
        assert_eq!(first.encryption_status.strain, "Unknown");

        fields
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "t")
            .unwrap();
        let second = renderer.current();
        assert_eq!(second.encryption_status.strain, "LockFile");

        // No write in between: same values again
        assert_eq!(renderer.current(), second);
    }
}
