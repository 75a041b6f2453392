//! Incident model.
//!
//! An incident owns its field store and execution state exclusively. The
//! phase lifecycle only moves forward: Open, Investigating, Contained,
//! Closed. Closing is refused while the graph has not settled or while a
//! failed containment task awaits analyst acknowledgment.

use crate::executor::{ExecutionReport, ExecutionStatus};
use crate::fields::{ransomware_schema, FieldSchemaSet, FieldStore};
use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Incident type this crate ships a playbook for.
pub const INCIDENT_TYPE_RANSOMWARE: &str = "Post Intrusion Ransomware";

/// Errors from incident lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IncidentError {
    #[error("execution has not reached a terminal configuration")]
    ExecutionNotFinished,

    #[error("{0} unacknowledged containment failure(s) require review before close")]
    UnacknowledgedRisks(usize),

    #[error("no standing risk recorded for task {0}")]
    RiskNotFound(String),

    #[error("risk for task {0} is already acknowledged")]
    RiskAlreadyAcknowledged(String),

    #[error("incident is already closed")]
    AlreadyClosed,
}

/// Incident lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPhase {
    Open,
    Investigating,
    Contained,
    Closed,
}

impl std::fmt::Display for IncidentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentPhase::Open => write!(f, "Open"),
            IncidentPhase::Investigating => write!(f, "Investigating"),
            IncidentPhase::Contained => write!(f, "Contained"),
            IncidentPhase::Closed => write!(f, "Closed"),
        }
    }
}

/// A terminally failed containment task that an analyst must acknowledge
/// before the incident can close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingRisk {
    pub task_id: String,
    pub error: String,
    pub raised_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl StandingRisk {
    /// Records a new, unacknowledged risk.
    pub fn new(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            error: error.into(),
            raised_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    /// Whether an analyst has signed off on this risk.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_by.is_some()
    }
}

/// Actions recorded in the incident audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    IncidentOpened,
    PhaseChanged(IncidentPhase),
    RiskAcknowledged { task_id: String },
}

/// One audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    fn new(action: AuditAction, actor: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            actor: actor.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A security incident under investigation.
pub struct Incident {
    /// Unique identifier.
    pub id: Uuid,
    /// Incident type name.
    pub incident_type: String,
    /// Current phase.
    pub phase: IncidentPhase,
    /// Typed attribute store, owned by this incident.
    fields: Arc<FieldStore>,
    /// Report from the most recent execution, if any.
    pub report: Option<ExecutionReport>,
    /// Containment failures awaiting acknowledgment.
    pub standing_risks: Vec<StandingRisk>,
    /// Audit trail of lifecycle changes.
    pub audit_log: Vec<AuditEntry>,
    /// When the incident was created.
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Creates an incident with the given type and field schema.
    pub fn new(incident_type: impl Into<String>, schema: FieldSchemaSet) -> Self {
        gauge!("rampart_incidents_open").increment(1.0);
        Self {
            id: Uuid::new_v4(),
            incident_type: incident_type.into(),
            phase: IncidentPhase::Open,
            fields: Arc::new(FieldStore::new(schema)),
            report: None,
            standing_risks: Vec::new(),
            audit_log: vec![AuditEntry::new(AuditAction::IncidentOpened, "system")],
            created_at: Utc::now(),
        }
    }

    /// Creates a "Post Intrusion Ransomware" incident with its standard
    /// field schema.
    pub fn ransomware() -> Self {
        Self::new(INCIDENT_TYPE_RANSOMWARE, ransomware_schema())
    }

    /// The incident's field store.
    pub fn fields(&self) -> Arc<FieldStore> {
        Arc::clone(&self.fields)
    }

    /// Marks the start of playbook execution.
    pub fn begin_investigation(&mut self, actor: &str) {
        if self.phase == IncidentPhase::Open {
            self.set_phase(IncidentPhase::Investigating, actor);
        }
    }

    /// Absorbs an execution report, moving its standing risks onto the
    /// incident. A clean completion advances the phase to Contained.
    pub fn record_execution(&mut self, report: ExecutionReport, actor: &str) {
        self.standing_risks.extend(report.standing_risks.clone());
        let clean = report.status == ExecutionStatus::Completed && self.standing_risks.is_empty();
        self.report = Some(report);
        if clean && self.phase == IncidentPhase::Investigating {
            self.set_phase(IncidentPhase::Contained, actor);
        }
    }

    /// Acknowledges a standing risk by task id.
    pub fn acknowledge_risk(&mut self, task_id: &str, actor: &str) -> Result<(), IncidentError> {
        let risk = self
            .standing_risks
            .iter_mut()
            .find(|r| r.task_id == task_id)
            .ok_or_else(|| IncidentError::RiskNotFound(task_id.to_string()))?;
        if risk.is_acknowledged() {
            return Err(IncidentError::RiskAlreadyAcknowledged(task_id.to_string()));
        }
        risk.acknowledged_by = Some(actor.to_string());
        risk.acknowledged_at = Some(Utc::now());
        self.audit_log.push(AuditEntry::new(
            AuditAction::RiskAcknowledged {
                task_id: task_id.to_string(),
            },
            actor,
        ));
        info!(incident_id = %self.id, task_id, actor, "standing risk acknowledged");
        Ok(())
    }

    /// Number of risks still awaiting acknowledgment.
    pub fn unacknowledged_risks(&self) -> usize {
        self.standing_risks
            .iter()
            .filter(|r| !r.is_acknowledged())
            .count()
    }

    /// Closes the incident.
    ///
    /// Refused while the graph has not reached a terminal configuration or
    /// while any containment failure is unacknowledged.
    pub fn close(&mut self, actor: &str) -> Result<(), IncidentError> {
        if self.phase == IncidentPhase::Closed {
            return Err(IncidentError::AlreadyClosed);
        }
        if self.report.is_none() {
            return Err(IncidentError::ExecutionNotFinished);
        }
        let open_risks = self.unacknowledged_risks();
        if open_risks > 0 {
            warn!(
                incident_id = %self.id,
                open_risks,
                "close refused: containment failures need acknowledgment"
            );
            return Err(IncidentError::UnacknowledgedRisks(open_risks));
        }
        self.set_phase(IncidentPhase::Closed, actor);
        gauge!("rampart_incidents_open").decrement(1.0);
        Ok(())
    }

    fn set_phase(&mut self, phase: IncidentPhase, actor: &str) {
        info!(incident_id = %self.id, from = %self.phase, to = %phase, actor, "incident phase changed");
        self.phase = phase;
        self.audit_log
            .push(AuditEntry::new(AuditAction::PhaseChanged(phase), actor));
    }
}
