//! End-to-end tests for the shipped ransomware playbook: incident intake,
//! executor, built-in handlers, mock connectors, and widget rendering.

use rampart_actions::builtin_registry;
use rampart_connectors::{
    ConnectorError, MockBehavior, MockContainmentConnector, MockEnrichmentConnector,
};
use rampart_core::fields::schema::names;
use rampart_core::playbook::ransomware::{self, tasks};
use rampart_core::{
    EventBus, ExecutionConfig, ExecutionStatus, ExecutionEvent, FieldValue, Incident,
    IncidentError, IncidentPhase, PlaybookExecutor, SkipReason, TaskOutcome, TaskState,
    WidgetRenderer,
};
use std::sync::Arc;
use std::time::Duration;

const NOTE: &str = "Your network has been penetrated. All files are encrypted \
    with LockFile. To recover them send 3 BTC to \
    1BoatSLRHtKNngkdXEeobR76b53LETtpyT. Support portal: \
    http://exampleoniontoorurlabc234.onion - or email \
    lockfile-support@evil.example";

struct Scenario {
    incident: Incident,
    enrichment: Arc<MockEnrichmentConnector>,
    containment: Arc<MockContainmentConnector>,
    events: Arc<EventBus>,
}

impl Scenario {
    fn new() -> Self {
        let incident = Incident::ransomware();
        let fields = incident.fields();
        fields
            .set(names::RANSOM_NOTE, FieldValue::text(NOTE), "intake")
            .unwrap();
        fields
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "intake")
            .unwrap();
        fields
            .append_record(names::USERS, serde_json::json!({"name": "jdoe"}), "intake")
            .unwrap();
        for host in ["ws-finance-01", "srv-files-02"] {
            fields
                .append_record(names::HOSTS, serde_json::json!({"name": host}), "intake")
                .unwrap();
        }

        Self {
            incident,
            enrichment: Arc::new(MockEnrichmentConnector::with_sample_data("mock-idp")),
            containment: Arc::new(MockContainmentConnector::new("mock-edr")),
            events: Arc::new(EventBus::new(512)),
        }
    }

    fn confirm_encryption(&self) {
        self.incident
            .fields()
            .set(
                names::ENCRYPTION_STATUS,
                FieldValue::enumeration("Confirmed"),
                "edr-telemetry",
            )
            .unwrap();
    }

    fn executor(&self) -> PlaybookExecutor {
        let graph = ransomware::post_intrusion_ransomware()
            .build_graph()
            .unwrap();
        let registry = builtin_registry(
            Arc::clone(&self.enrichment) as Arc<dyn rampart_connectors::EnrichmentConnector>,
            Arc::clone(&self.containment) as Arc<dyn rampart_connectors::ContainmentConnector>,
        );
        PlaybookExecutor::new(
            self.incident.id,
            graph,
            self.incident.fields(),
            Arc::new(registry),
            Arc::clone(&self.events),
            ExecutionConfig {
                connector_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        )
        .unwrap()
    }
}

/// Spawns a stand-in analyst that resolves every manual task as it comes up.
fn auto_analyst(
    events: &EventBus,
    handle: rampart_core::ExecutorHandle,
) -> tokio::task::JoinHandle<Vec<String>> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let mut resolved = Vec::new();
        loop {
            match rx.recv().await {
                Ok(ExecutionEvent::ManualInputRequired { task_id, .. }) => {
                    resolved.push(task_id.clone());
                    let _ = handle.complete_manual_task(
                        task_id,
                        TaskOutcome::Succeeded,
                        Some("reviewed".into()),
                    );
                }
                Ok(ExecutionEvent::ExecutionFinished { .. }) => break resolved,
                Ok(_) => continue,
                Err(_) => break resolved,
            }
        }
    })
}

#[tokio::test]
async fn confirmed_encryption_runs_containment_end_to_end() {
    let mut scenario = Scenario::new();
    scenario.confirm_encryption();
    scenario.incident.begin_investigation("executor");

    let executor = scenario.executor();
    let analyst = auto_analyst(&scenario.events, executor.handle());

    let report = tokio::time::timeout(Duration::from_secs(30), executor.run())
        .await
        .expect("playbook must settle");
    assert_eq!(report.status, ExecutionStatus::Completed);

    // Branch picked the confirmed arm; the scoping review never ran
    assert_eq!(
        report.task(tasks::ENCRYPTION_TRIAGE).unwrap().selected_arm,
        Some("confirmed".to_string())
    );
    assert_eq!(
        report.task(tasks::CONFIRM_SCOPE).unwrap().state,
        TaskState::Skipped {
            reason: SkipReason::NotSelected
        }
    );

    // Indicators landed in the list fields
    let fields = scenario.incident.fields();
    let addresses = fields.get(names::CRYPTO_ADDRESS).unwrap().unwrap();
    assert_eq!(
        addresses.as_string_list().unwrap(),
        ["1BoatSLRHtKNngkdXEeobR76b53LETtpyT"]
    );
    let onions = fields.get(names::ONION_ADDRESS).unwrap().unwrap();
    assert_eq!(
        onions.as_string_list().unwrap(),
        ["http://exampleoniontoorurlabc234.onion"]
    );
    let emails = fields.get(names::EMAIL).unwrap().unwrap();
    assert_eq!(
        emails.as_string_list().unwrap(),
        ["lockfile-support@evil.example"]
    );

    // Containment actually reached the connector
    assert!(scenario.containment.is_isolated("ws-finance-01").await);
    assert!(scenario.containment.is_isolated("srv-files-02").await);
    assert!(scenario.containment.is_revoked("jdoe").await);

    // Both manual tasks on this path were resolved by the analyst
    let resolved = analyst.await.unwrap();
    assert!(resolved.contains(&tasks::RESEARCH_RECOVERY_TOOL.to_string()));
    assert!(resolved.contains(&tasks::CONFIRM_ERADICATION.to_string()));

    // Widgets reflect the final state
    let widgets = WidgetRenderer::render(scenario.incident.id, &fields);
    assert_eq!(widgets.encryption_status.status, "Confirmed");
    assert_eq!(widgets.encryption_status.strain, "LockFile");
    assert_eq!(widgets.host_impact.total, 2);
    assert_eq!(widgets.host_impact.enriched_count, 2);
    assert_eq!(widgets.host_impact.isolated_count, 2);

    // Clean completion: the incident can be contained and closed
    scenario.incident.record_execution(report, "executor");
    assert_eq!(scenario.incident.phase, IncidentPhase::Contained);
    scenario.incident.close("analyst").unwrap();
}

#[tokio::test]
async fn failed_isolation_blocks_close_until_acknowledged() {
    let mut scenario = Scenario::new();
    scenario.confirm_encryption();
    scenario.incident.begin_investigation("executor");
    scenario
        .containment
        .set_behavior(MockBehavior::AlwaysFail(ConnectorError::Unavailable(
            "edr agent unreachable".into(),
        )))
        .await;

    let executor = scenario.executor();
    let analyst = auto_analyst(&scenario.events, executor.handle());

    let report = tokio::time::timeout(Duration::from_secs(30), executor.run())
        .await
        .expect("playbook must settle");
    analyst.await.unwrap();

    assert_eq!(report.status, ExecutionStatus::CompletedWithFailures);

    // Both containment tasks exhausted their retry budget
    for id in [tasks::ISOLATE_HOSTS, tasks::REVOKE_USERS] {
        let record = report.task(id).unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.attempts, 3);
    }
    // Their joint dependent is unreachable
    assert_eq!(
        report.task(tasks::CONFIRM_ERADICATION).unwrap().state,
        TaskState::Skipped {
            reason: SkipReason::Blocked
        }
    );
    // The independent path still finished
    assert_eq!(
        report.task(tasks::RESEARCH_RECOVERY_TOOL).unwrap().state,
        TaskState::Succeeded
    );

    // Standing risks gate the close until an analyst signs off
    assert_eq!(report.standing_risks.len(), 2);
    scenario.incident.record_execution(report, "executor");
    assert_eq!(
        scenario.incident.close("analyst"),
        Err(IncidentError::UnacknowledgedRisks(2))
    );

    scenario
        .incident
        .acknowledge_risk(tasks::ISOLATE_HOSTS, "analyst")
        .unwrap();
    scenario
        .incident
        .acknowledge_risk(tasks::REVOKE_USERS, "analyst")
        .unwrap();
    scenario.incident.close("analyst").unwrap();
    assert_eq!(scenario.incident.phase, IncidentPhase::Closed);
}

#[tokio::test]
async fn unconfirmed_encryption_routes_to_scoping_review() {
    let mut scenario = Scenario::new();
    scenario.incident.begin_investigation("executor");
    // Encryption status left unset: the branch takes its default arm

    let executor = scenario.executor();
    let analyst = auto_analyst(&scenario.events, executor.handle());

    let report = tokio::time::timeout(Duration::from_secs(30), executor.run())
        .await
        .expect("playbook must settle");
    let resolved = analyst.await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(
        report.task(tasks::ENCRYPTION_TRIAGE).unwrap().selected_arm,
        Some("unconfirmed".to_string())
    );

    // Containment never ran, and nothing reached the connector
    for id in [tasks::ISOLATE_HOSTS, tasks::REVOKE_USERS] {
        assert_eq!(
            report.task(id).unwrap().state,
            TaskState::Skipped {
                reason: SkipReason::NotSelected
            }
        );
    }
    assert_eq!(scenario.containment.call_count(), 0);

    // Eradication is only reachable through containment
    assert_eq!(
        report.task(tasks::CONFIRM_ERADICATION).unwrap().state,
        TaskState::Skipped {
            reason: SkipReason::NotSelected
        }
    );

    assert!(resolved.contains(&tasks::CONFIRM_SCOPE.to_string()));
    assert!(resolved.contains(&tasks::RESEARCH_RECOVERY_TOOL.to_string()));

    // Widgets render the unknown status without failing
    let widgets = WidgetRenderer::render(scenario.incident.id, &scenario.incident.fields());
    assert_eq!(widgets.encryption_status.status, "Unknown");
    assert_eq!(widgets.host_impact.isolated_count, 0);
}
