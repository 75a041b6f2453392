//! # rampart-core
//!
//! Core of the Rampart playbook execution engine: the incident model, the
//! typed field store, the indicator extractor, the task graph, the
//! executor, and the widget renderer. External capabilities (enrichment,
//! containment) are consumed through the `rampart-connectors` traits.

pub mod conditions;
pub mod events;
pub mod executor;
pub mod fields;
pub mod graph;
pub mod incident;
pub mod indicators;
pub mod playbook;
pub mod registry;
pub mod widgets;

pub use conditions::{CompareOp, Condition, ConditionEvaluator};
pub use events::{EventBus, ExecutionEvent};
pub use executor::{
    ExecutionConfig, ExecutionReport, ExecutionStatus, ExecutorError, ExecutorHandle,
    PlaybookExecutor, SkipReason, TaskOutcome, TaskRecord, TaskState,
};
pub use fields::{
    ransomware_schema, FieldError, FieldKind, FieldSchema, FieldSchemaSet, FieldStore, FieldValue,
    WriteOutcome,
};
pub use graph::{BranchArm, GraphError, Task, TaskGraph, TaskKind};
pub use incident::{
    AuditAction, AuditEntry, Incident, IncidentError, IncidentPhase, StandingRisk,
    INCIDENT_TYPE_RANSOMWARE,
};
pub use indicators::{AddressFormat, Indicator, IndicatorExtractor, IndicatorKind};
pub use playbook::Playbook;
pub use registry::{ActionRegistry, TaskContext, TaskError, TaskHandler, TaskReport};
pub use widgets::{
    CachedWidgetRenderer, EncryptionStatusWidget, HostImpactWidget, IncidentWidgets,
    WidgetRenderer,
};
