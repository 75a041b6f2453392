//! Execution event bus.
//!
//! The executor publishes task lifecycle events over a Tokio broadcast
//! channel so observers (the CLI, tests, a future API layer) can follow an
//! investigation without polling. A bounded history buffer keeps recent
//! events for late subscribers.

use crate::executor::{ExecutionStatus, TaskState};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Events published while a playbook executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    /// A task changed state.
    TaskStateChanged {
        incident_id: Uuid,
        task_id: String,
        state: TaskState,
    },

    /// An attempt failed; the task may still be retried.
    TaskAttemptFailed {
        incident_id: Uuid,
        task_id: String,
        attempt: u32,
        error: String,
    },

    /// A manual task is waiting for an analyst.
    ManualInputRequired {
        incident_id: Uuid,
        task_id: String,
        instructions: String,
    },

    /// A branch selected an arm.
    BranchSelected {
        incident_id: Uuid,
        task_id: String,
        arm: String,
    },

    /// A containment task failed terminally and needs acknowledgment
    /// before the incident can close.
    StandingRiskRaised {
        incident_id: Uuid,
        task_id: String,
        error: String,
    },

    /// The graph reached a terminal configuration.
    ExecutionFinished {
        incident_id: Uuid,
        status: ExecutionStatus,
    },
}

impl ExecutionEvent {
    /// The event type as a string for logging and metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::TaskStateChanged { .. } => "task_state_changed",
            ExecutionEvent::TaskAttemptFailed { .. } => "task_attempt_failed",
            ExecutionEvent::ManualInputRequired { .. } => "manual_input_required",
            ExecutionEvent::BranchSelected { .. } => "branch_selected",
            ExecutionEvent::StandingRiskRaised { .. } => "standing_risk_raised",
            ExecutionEvent::ExecutionFinished { .. } => "execution_finished",
        }
    }

    /// The incident the event belongs to.
    pub fn incident_id(&self) -> Uuid {
        match self {
            ExecutionEvent::TaskStateChanged { incident_id, .. }
            | ExecutionEvent::TaskAttemptFailed { incident_id, .. }
            | ExecutionEvent::ManualInputRequired { incident_id, .. }
            | ExecutionEvent::BranchSelected { incident_id, .. }
            | ExecutionEvent::StandingRiskRaised { incident_id, .. }
            | ExecutionEvent::ExecutionFinished { incident_id, .. } => *incident_id,
        }
    }
}

/// Broadcast bus for execution events.
pub struct EventBus {
    broadcast_tx: broadcast::Sender<ExecutionEvent>,
    history: RwLock<Vec<ExecutionEvent>>,
    history_size: usize,
}

impl EventBus {
    /// Creates a bus with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            broadcast_tx,
            history: RwLock::new(Vec::new()),
            history_size: 1000,
        }
    }

    /// Subscribes to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Publishes an event. Absence of receivers is not an error; events
    /// still land in the history buffer.
    pub async fn publish(&self, event: ExecutionEvent) {
        metrics::counter!("rampart_events_published_total").increment(1);
        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_size {
                history.remove(0);
            }
            history.push(event.clone());
        }
        let _ = self.broadcast_tx.send(event);
    }

    /// Recent events, oldest first, optionally limited to the most recent.
    pub async fn history(&self, limit: Option<usize>) -> Vec<ExecutionEvent> {
        let history = self.history.read().await;
        match limit {
            Some(n) if n < history.len() => history[history.len() - n..].to_vec(),
            _ => history.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let incident_id = Uuid::new_v4();

        bus.publish(ExecutionEvent::BranchSelected {
            incident_id,
            task_id: "decide".into(),
            arm: "confirmed".into(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "branch_selected");
        assert_eq!(event.incident_id(), incident_id);
    }

    #[tokio::test]
    async fn test_publish_without_receivers() {
        let bus = EventBus::new(16);
        bus.publish(ExecutionEvent::ExecutionFinished {
            incident_id: Uuid::new_v4(),
            status: ExecutionStatus::Completed,
        })
        .await;

        let history = bus.history(None).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_history_limit() {
        let bus = EventBus::new(16);
        for i in 0..5 {
            bus.publish(ExecutionEvent::BranchSelected {
                incident_id: Uuid::new_v4(),
                task_id: format!("t{i}"),
                arm: "x".into(),
            })
            .await;
        }

        assert_eq!(bus.history(Some(2)).await.len(), 2);
        assert_eq!(bus.history(None).await.len(), 5);
    }
}
