//! Playbook templates.
//!
//! A playbook is a named workflow template: a task list plus the incident
//! type it investigates. Instantiating a playbook validates the task list
//! into a [`TaskGraph`]; a structurally broken playbook never produces a
//! runnable graph.

pub mod ransomware;

use crate::graph::{GraphError, Task, TaskGraph};
use serde::{Deserialize, Serialize};

/// A declarative workflow template, instantiated per incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playbook {
    /// Template name.
    pub name: String,
    /// What the playbook does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Incident type this playbook investigates.
    pub incident_type: String,
    /// Task definitions.
    pub tasks: Vec<Task>,
}

impl Playbook {
    /// Creates an empty playbook.
    pub fn new(name: impl Into<String>, incident_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            incident_type: incident_type.into(),
            tasks: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a task.
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Validates the task list into an executable graph.
    pub fn build_graph(&self) -> Result<TaskGraph, GraphError> {
        TaskGraph::from_tasks(self.tasks.clone())
    }
}
