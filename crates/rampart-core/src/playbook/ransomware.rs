//! The shipped "Post Intrusion Ransomware" playbook.
//!
//! Investigation flow: scan the ransom note for indicators, enrich the
//! affected users and hosts in parallel, then branch on the data encryption
//! status. Confirmed encryption triggers containment (host isolation and
//! credential revocation) followed by a manual eradication check; anything
//! else routes to a manual scoping review. A recovery-tool research task
//! runs on its own path regardless of the branch.

use super::Playbook;
use crate::conditions::Condition;
use crate::fields::schema::names;
use crate::graph::{BranchArm, Task};
use crate::incident::INCIDENT_TYPE_RANSOMWARE;

/// Action names the playbook references; handlers register under these.
pub mod actions {
    pub const EXTRACT_INDICATORS: &str = "extract_indicators";
    pub const ENRICH_USERS: &str = "enrich_users";
    pub const ENRICH_HOSTS: &str = "enrich_hosts";
    pub const ISOLATE_HOSTS: &str = "isolate_hosts";
    pub const REVOKE_USERS: &str = "revoke_users";
}

/// Task ids, stable across playbook versions for external signals.
pub mod tasks {
    pub const SCAN_NOTE: &str = "scan-ransom-note";
    pub const ENRICH_USERS: &str = "enrich-users";
    pub const ENRICH_HOSTS: &str = "enrich-hosts";
    pub const ENCRYPTION_TRIAGE: &str = "encryption-triage";
    pub const ISOLATE_HOSTS: &str = "isolate-hosts";
    pub const REVOKE_USERS: &str = "revoke-users";
    pub const CONFIRM_SCOPE: &str = "confirm-scope";
    pub const RESEARCH_RECOVERY_TOOL: &str = "research-recovery-tool";
    pub const CONFIRM_ERADICATION: &str = "confirm-eradication";
}

/// Builds the standard ransomware investigation playbook.
pub fn post_intrusion_ransomware() -> Playbook {
    Playbook::new("post-intrusion-ransomware", INCIDENT_TYPE_RANSOMWARE)
        .with_description(
            "Investigates a ransomware intrusion: indicator extraction, \
             user/host enrichment, encryption triage, containment, and \
             analyst-driven recovery steps",
        )
        .with_task(Task::automated(
            tasks::SCAN_NOTE,
            "Scan ransom note for indicators",
            actions::EXTRACT_INDICATORS,
        ))
        .with_task(
            Task::automated(
                tasks::ENRICH_USERS,
                "Enrich affected users",
                actions::ENRICH_USERS,
            )
            .after(tasks::SCAN_NOTE),
        )
        .with_task(
            Task::automated(
                tasks::ENRICH_HOSTS,
                "Enrich affected hosts",
                actions::ENRICH_HOSTS,
            )
            .after(tasks::SCAN_NOTE),
        )
        .with_task(
            Task::branch(
                tasks::ENCRYPTION_TRIAGE,
                "Triage data encryption status",
                vec![
                    BranchArm::when(
                        "confirmed",
                        Condition::field_eq(names::ENCRYPTION_STATUS, "Confirmed"),
                        [tasks::ISOLATE_HOSTS, tasks::REVOKE_USERS],
                    ),
                    BranchArm::otherwise("unconfirmed", [tasks::CONFIRM_SCOPE]),
                ],
            )
            .after(tasks::ENRICH_USERS)
            .after(tasks::ENRICH_HOSTS),
        )
        .with_task(
            Task::containment(
                tasks::ISOLATE_HOSTS,
                "Isolate affected hosts",
                actions::ISOLATE_HOSTS,
            )
            .after(tasks::ENCRYPTION_TRIAGE)
            .with_retry_limit(2),
        )
        .with_task(
            Task::containment(
                tasks::REVOKE_USERS,
                "Revoke credentials of affected users",
                actions::REVOKE_USERS,
            )
            .after(tasks::ENCRYPTION_TRIAGE)
            .with_retry_limit(2),
        )
        .with_task(
            Task::manual(
                tasks::CONFIRM_SCOPE,
                "Confirm encryption scope",
                "Review endpoint telemetry and confirm whether data encryption \
                 actually occurred. Update the data encryption status field with \
                 your finding.",
            )
            .after(tasks::ENCRYPTION_TRIAGE),
        )
        .with_task(
            Task::manual(
                tasks::RESEARCH_RECOVERY_TOOL,
                "Research public recovery tool",
                "Search public decryptor databases (e.g. No More Ransom) for the \
                 identified strain and record any recovery tool in the incident.",
            )
            .after(tasks::SCAN_NOTE),
        )
        .with_task(
            Task::manual(
                tasks::CONFIRM_ERADICATION,
                "Confirm eradication",
                "Verify the isolated hosts show no further encryption activity \
                 and confirm the intrusion vector is closed.",
            )
            .after(tasks::ISOLATE_HOSTS)
            .after(tasks::REVOKE_USERS),
        )
}
