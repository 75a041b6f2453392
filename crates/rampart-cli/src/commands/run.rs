//! The `run` command: drives the ransomware playbook end to end against
//! mock connectors, printing execution progress and the final widgets.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use colored::Colorize;
use rampart_actions::{builtin_registry, ExtractIndicatorsHandler};
use rampart_connectors::{
    ConnectorError, MockBehavior, MockContainmentConnector, MockEnrichmentConnector,
};
use rampart_core::fields::schema::names;
use rampart_core::playbook::ransomware;
use rampart_core::{
    EventBus, ExecutionEvent, ExecutionReport, FieldValue, Incident, IndicatorExtractor,
    PlaybookExecutor, TaskOutcome, TaskState, WidgetRenderer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const SAMPLE_NOTE: &str = "ALL YOUR FILES HAVE BEEN ENCRYPTED by LockFile. \
    Send 3 BTC to 1BoatSLRHtKNngkdXEeobR76b53LETtpyT within 72 hours. \
    Support: http://exampleoniontoorurlabc234.onion or \
    lockfile-support@evil.example";

/// Options for the run command.
pub struct RunOptions {
    /// File with the ransom note text; a sample note is used when absent.
    pub note: Option<PathBuf>,
    /// Seed the data encryption status as Confirmed, enabling containment.
    pub confirmed: bool,
    /// Inject a containment connector outage to demonstrate standing risks.
    pub fail_containment: bool,
}

/// Runs the shipped ransomware playbook against mock connectors.
pub async fn run_playbook(config: &AppConfig, options: RunOptions) -> Result<()> {
    let note = match &options.note {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read note file: {}", path.display()))?,
        None => SAMPLE_NOTE.to_string(),
    };

    let mut incident = Incident::ransomware();
    seed_incident(&incident, &note, options.confirmed)?;
    println!(
        "{} incident {} ({})",
        "opened".green().bold(),
        incident.id,
        incident.incident_type
    );

    let enrichment = Arc::new(MockEnrichmentConnector::with_sample_data("mock-idp"));
    let containment = Arc::new(MockContainmentConnector::new("mock-edr"));
    if options.fail_containment {
        containment
            .set_behavior(MockBehavior::AlwaysFail(ConnectorError::Unavailable(
                "edr agent unreachable".into(),
            )))
            .await;
        println!("{}", "containment connector outage injected".yellow());
    }

    let playbook = ransomware::post_intrusion_ransomware();
    let graph = playbook.build_graph().context("playbook failed validation")?;
    let mut registry = builtin_registry(enrichment, containment);
    let extra_formats = config.extra_formats();
    if !extra_formats.is_empty() {
        let extractor = extra_formats
            .into_iter()
            .fold(IndicatorExtractor::new(), |ex, format| ex.with_format(format));
        registry.register(Arc::new(ExtractIndicatorsHandler::with_extractor(extractor)));
    }
    let events = Arc::new(EventBus::new(512));

    let executor = PlaybookExecutor::new(
        incident.id,
        graph,
        incident.fields(),
        Arc::new(registry),
        Arc::clone(&events),
        config.execution_config(),
    )?;
    let handle = executor.handle();

    // Progress printer doubling as a stand-in analyst: every manual task is
    // acknowledged as soon as it asks for input.
    let printer = {
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ExecutionEvent::TaskStateChanged { task_id, state, .. }) => {
                        print_state(&task_id, &state);
                    }
                    Ok(ExecutionEvent::BranchSelected { task_id, arm, .. }) => {
                        println!("  {task_id}: {} {}", "branch".cyan(), arm.cyan().bold());
                    }
                    Ok(ExecutionEvent::ManualInputRequired {
                        task_id,
                        instructions,
                        ..
                    }) => {
                        println!(
                            "  {task_id}: {} {}",
                            "awaiting analyst".magenta(),
                            instructions.dimmed()
                        );
                        let _ = handle.complete_manual_task(
                            task_id,
                            TaskOutcome::Succeeded,
                            Some("acknowledged from CLI demo".into()),
                        );
                    }
                    Ok(ExecutionEvent::StandingRiskRaised { task_id, error, .. }) => {
                        println!(
                            "  {task_id}: {} {}",
                            "standing risk".red().bold(),
                            error.red()
                        );
                    }
                    Ok(ExecutionEvent::ExecutionFinished { .. }) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        })
    };

    incident.begin_investigation("rampart-cli");
    let report = executor.run().await;
    let _ = printer.await;

    print_report(&report);
    let widgets = WidgetRenderer::render(incident.id, &incident.fields());
    print_widgets(&widgets);

    incident.record_execution(report, "rampart-cli");
    for risk in incident
        .standing_risks
        .iter()
        .map(|r| r.task_id.clone())
        .collect::<Vec<_>>()
    {
        incident.acknowledge_risk(&risk, "rampart-cli")?;
        println!("{} risk on {risk} acknowledged", "note".yellow());
    }
    incident.close("rampart-cli")?;
    info!(incident_id = %incident.id, "incident closed");
    println!("{} incident {}", "closed".green().bold(), incident.id);
    Ok(())
}

fn seed_incident(incident: &Incident, note: &str, confirmed: bool) -> Result<()> {
    let fields = incident.fields();
    fields.set(names::RANSOM_NOTE, FieldValue::text(note), "intake")?;
    fields.set(names::STRAIN, FieldValue::scalar("LockFile"), "intake")?;
    fields.set(names::ENCRYPTED_ENDPOINTS, FieldValue::scalar("45"), "intake")?;
    fields.append_record(names::USERS, serde_json::json!({"name": "jdoe"}), "intake")?;
    for host in ["ws-finance-01", "srv-files-02"] {
        fields.append_record(names::HOSTS, serde_json::json!({"name": host}), "intake")?;
    }
    if confirmed {
        fields.set(
            names::ENCRYPTION_STATUS,
            FieldValue::enumeration("Confirmed"),
            "intake",
        )?;
    }
    Ok(())
}

fn print_state(task_id: &str, state: &TaskState) {
    let label = match state {
        TaskState::Running => "running".blue(),
        TaskState::Succeeded => "succeeded".green(),
        TaskState::Failed => "failed".red().bold(),
        TaskState::Skipped { .. } => "skipped".dimmed(),
        _ => return,
    };
    println!("  {task_id}: {label}");
}

fn print_report(report: &ExecutionReport) {
    println!();
    println!("{} {:?}", "execution".bold(), report.status);
    for task in &report.tasks {
        let state = format!("{:?}", task.state);
        println!(
            "  {:<28} {:<30} attempts={}",
            task.task_id, state, task.attempts
        );
    }
}

fn print_widgets(widgets: &rampart_core::IncidentWidgets) {
    println!();
    println!("{}", "encryption status".bold());
    println!(
        "  status={} strain={} endpoints={:?} users={} hosts={}",
        widgets.encryption_status.status,
        widgets.encryption_status.strain,
        widgets.encryption_status.encrypted_endpoints,
        widgets.encryption_status.affected_users,
        widgets.encryption_status.affected_hosts
    );
    println!("{}", "host impact".bold());
    for row in &widgets.host_impact.rows {
        println!(
            "  {:<16} os={:<24} criticality={:<8} isolated={:?}",
            row.hostname, row.os, row.criticality, row.isolated
        );
    }
}
