//! Task graph model and load-time validation.
//!
//! A playbook instantiates to a directed graph of typed tasks. Structural
//! problems (cycles, dangling dependencies, a missing or ambiguous entry
//! point) are fatal at load time: a workflow with a broken graph never
//! starts.

use crate::conditions::Condition;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Structural errors detected when a graph is loaded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("task graph is empty")]
    Empty,

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("expected exactly one entry task, found {0:?}")]
    EntryPoint(Vec<String>),

    #[error("circular dependency involving tasks {0:?}")]
    Cycle(Vec<String>),

    #[error("branch task {task} needs at least two arms")]
    TooFewArms { task: String },

    #[error("branch task {task} needs exactly one unconditional arm, found {found}")]
    DefaultArm { task: String, found: usize },

    #[error("branch task {task} arm {label} routes to {successor}, which does not depend on it")]
    InvalidBranchArm {
        task: String,
        label: String,
        successor: String,
    },
}

/// One labeled arm of a branch task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchArm {
    /// Label shown in reports and events.
    pub label: String,
    /// Predicate over the field store; `None` marks the default arm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Successor tasks activated when this arm is selected.
    pub successors: Vec<String>,
}

impl BranchArm {
    /// A conditional arm.
    pub fn when(
        label: impl Into<String>,
        condition: Condition,
        successors: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            label: label.into(),
            condition: Some(condition),
            successors: successors.into_iter().map(Into::into).collect(),
        }
    }

    /// The default arm, selected when no conditional arm matches.
    pub fn otherwise(
        label: impl Into<String>,
        successors: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            label: label.into(),
            condition: None,
            successors: successors.into_iter().map(Into::into).collect(),
        }
    }
}

/// The four task kinds the executor understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Runs a registered action handler.
    Automated {
        action: String,
        #[serde(default)]
        parameters: serde_json::Value,
    },
    /// Waits indefinitely for an analyst to report completion.
    Manual { instructions: String },
    /// Selects exactly one arm based on field store state.
    Branch { arms: Vec<BranchArm> },
    /// Like Automated, but a terminal failure raises a standing risk
    /// instead of only failing the task.
    Containment {
        action: String,
        #[serde(default)]
        parameters: serde_json::Value,
    },
}

impl TaskKind {
    /// The registered action name, for the kinds that run one.
    pub fn action(&self) -> Option<&str> {
        match self {
            TaskKind::Automated { action, .. } | TaskKind::Containment { action, .. } => {
                Some(action)
            }
            _ => None,
        }
    }

    /// Whether a terminal failure of this task must be acknowledged before
    /// incident close.
    pub fn is_containment(&self) -> bool {
        matches!(self, TaskKind::Containment { .. })
    }
}

/// A node in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Identifier, unique within the graph.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Kind-specific configuration.
    pub kind: TaskKind,
    /// Predecessor task ids; all must reach a terminal state before this
    /// task can run.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Bounded number of automatic re-attempts after failure.
    #[serde(default)]
    pub retry_limit: u32,
}

impl Task {
    /// Creates an automated task.
    pub fn automated(id: impl Into<String>, name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: TaskKind::Automated {
                action: action.into(),
                parameters: serde_json::Value::Null,
            },
            depends_on: Vec::new(),
            retry_limit: 0,
        }
    }

    /// Creates a containment task.
    pub fn containment(
        id: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: TaskKind::Containment {
                action: action.into(),
                parameters: serde_json::Value::Null,
            },
            depends_on: Vec::new(),
            retry_limit: 0,
        }
    }

    /// Creates a manual task.
    pub fn manual(
        id: impl Into<String>,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: TaskKind::Manual {
                instructions: instructions.into(),
            },
            depends_on: Vec::new(),
            retry_limit: 0,
        }
    }

    /// Creates a branch task.
    pub fn branch(id: impl Into<String>, name: impl Into<String>, arms: Vec<BranchArm>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: TaskKind::Branch { arms },
            depends_on: Vec::new(),
            retry_limit: 0,
        }
    }

    /// Adds a dependency.
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// Sets the retry limit.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets action parameters.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        match &mut self.kind {
            TaskKind::Automated { parameters: p, .. }
            | TaskKind::Containment { parameters: p, .. } => *p = parameters,
            _ => {}
        }
        self
    }
}

/// A validated, immutable task graph.
///
/// Only constructible through [`TaskGraph::from_tasks`], so structural
/// invariants hold for every instance.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
    /// Declaration order, for deterministic iteration.
    order: Vec<String>,
    /// Reverse edges: task id -> ids of tasks depending on it.
    dependents: HashMap<String, Vec<String>>,
}

impl TaskGraph {
    /// Builds and validates a graph from a task list.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, GraphError> {
        if tasks.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut map: HashMap<String, Task> = HashMap::new();
        let mut order = Vec::with_capacity(tasks.len());
        for task in tasks {
            if map.contains_key(&task.id) {
                return Err(GraphError::DuplicateTask(task.id));
            }
            order.push(task.id.clone());
            map.insert(task.id.clone(), task);
        }

        // Dangling dependencies and reverse edges
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for id in &order {
            let task = &map[id];
            for dependency in &task.depends_on {
                if !map.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        task: id.clone(),
                        dependency: dependency.clone(),
                    });
                }
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(id.clone());
            }
        }

        // Exactly one entry point
        let entries: Vec<String> = order
            .iter()
            .filter(|id| map[*id].depends_on.is_empty())
            .cloned()
            .collect();
        if entries.len() != 1 {
            return Err(GraphError::EntryPoint(entries));
        }

        Self::check_acyclic(&map, &order, &dependents)?;
        Self::check_branch_arms(&map, &dependents)?;

        Ok(Self {
            tasks: map,
            order,
            dependents,
        })
    }

    /// Kahn's algorithm; any unvisited remainder is part of a cycle.
    fn check_acyclic(
        map: &HashMap<String, Task>,
        order: &[String],
        dependents: &HashMap<String, Vec<String>>,
    ) -> Result<(), GraphError> {
        let mut in_degree: HashMap<&str, usize> = order
            .iter()
            .map(|id| (id.as_str(), map[id].depends_on.len()))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut visited = 0usize;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            if let Some(deps) = dependents.get(current) {
                for dep in deps {
                    let deg = in_degree.get_mut(dep.as_str()).expect("known task");
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dep.as_str());
                    }
                }
            }
        }

        if visited != order.len() {
            let mut stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(&id, _)| id.to_string())
                .collect();
            stuck.sort();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(())
    }

    /// Branch arms must route only to declared dependents, carry at least
    /// two arms, and have exactly one default arm so selection always
    /// resolves.
    fn check_branch_arms(
        map: &HashMap<String, Task>,
        dependents: &HashMap<String, Vec<String>>,
    ) -> Result<(), GraphError> {
        for (id, task) in map {
            let arms = match &task.kind {
                TaskKind::Branch { arms } => arms,
                _ => continue,
            };
            if arms.len() < 2 {
                return Err(GraphError::TooFewArms { task: id.clone() });
            }
            let defaults = arms.iter().filter(|a| a.condition.is_none()).count();
            if defaults != 1 {
                return Err(GraphError::DefaultArm {
                    task: id.clone(),
                    found: defaults,
                });
            }
            let direct: HashSet<&str> = dependents
                .get(id)
                .map(|d| d.iter().map(String::as_str).collect())
                .unwrap_or_default();
            for arm in arms {
                for successor in &arm.successors {
                    if !direct.contains(successor.as_str()) {
                        return Err(GraphError::InvalidBranchArm {
                            task: id.clone(),
                            label: arm.label.clone(),
                            successor: successor.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// The single task with no dependencies.
    pub fn entry(&self) -> &Task {
        self.order
            .iter()
            .map(|id| &self.tasks[id])
            .find(|t| t.depends_on.is_empty())
            .expect("validated at construction")
    }

    /// Tasks that depend on the given task.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Task ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Tasks in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().map(|id| &self.tasks[id])
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph is empty (never true for a validated graph).
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Condition;

    fn linear() -> Vec<Task> {
        vec![
            Task::automated("a", "A", "noop"),
            Task::automated("b", "B", "noop").after("a"),
            Task::automated("c", "C", "noop").after("b"),
        ]
    }

    // ========================================================================
    // Structural validation
    // ========================================================================

    #[test]
    fn test_valid_linear_chain() {
        let graph = TaskGraph::from_tasks(linear()).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.entry().id, "a");
        assert_eq!(graph.dependents_of("a"), &["b".to_string()]);
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(matches!(
            TaskGraph::from_tasks(vec![]),
            Err(GraphError::Empty)
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let tasks = vec![
            Task::automated("a", "A", "noop"),
            Task::automated("a", "A again", "noop"),
        ];
        assert!(matches!(
            TaskGraph::from_tasks(tasks),
            Err(GraphError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_dangling_dependency_rejected() {
        let tasks = vec![
            Task::automated("a", "A", "noop"),
            Task::automated("b", "B", "noop").after("ghost"),
        ];
        assert!(matches!(
            TaskGraph::from_tasks(tasks),
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_multiple_entries_rejected() {
        let tasks = vec![
            Task::automated("a", "A", "noop"),
            Task::automated("b", "B", "noop"),
        ];
        match TaskGraph::from_tasks(tasks) {
            Err(GraphError::EntryPoint(entries)) => assert_eq!(entries.len(), 2),
            other => panic!("expected EntryPoint error, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_rejected() {
        let tasks = vec![
            Task::automated("entry", "Entry", "noop"),
            Task::automated("a", "A", "noop").after("entry").after("c"),
            Task::automated("b", "B", "noop").after("a"),
            Task::automated("c", "C", "noop").after("b"),
        ];
        match TaskGraph::from_tasks(tasks) {
            Err(GraphError::Cycle(stuck)) => {
                assert_eq!(stuck, vec!["a", "b", "c"]);
            }
            other => panic!("expected Cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_cycle_rejected() {
        let tasks = vec![
            Task::automated("entry", "Entry", "noop"),
            Task::automated("a", "A", "noop").after("entry").after("a"),
        ];
        assert!(matches!(
            TaskGraph::from_tasks(tasks),
            Err(GraphError::Cycle(_))
        ));
    }

    // ========================================================================
    // Branch arm validation
    // ========================================================================

    fn branch_tasks(arms: Vec<BranchArm>) -> Vec<Task> {
        vec![
            Task::automated("start", "Start", "noop"),
            Task::branch("decide", "Decide", arms).after("start"),
            Task::automated("left", "Left", "noop").after("decide"),
            Task::automated("right", "Right", "noop").after("decide"),
        ]
    }

    #[test]
    fn test_valid_branch() {
        let graph = TaskGraph::from_tasks(branch_tasks(vec![
            BranchArm::when("confirmed", Condition::field_eq("Ransomware Strain", "LockFile"), ["left"]),
            BranchArm::otherwise("fallback", ["right"]),
        ]));
        assert!(graph.is_ok());
    }

    #[test]
    fn test_branch_with_one_arm_rejected() {
        let result = TaskGraph::from_tasks(branch_tasks(vec![BranchArm::otherwise(
            "only",
            ["left", "right"],
        )]));
        assert!(matches!(result, Err(GraphError::TooFewArms { .. })));
    }

    #[test]
    fn test_branch_without_default_arm_rejected() {
        let result = TaskGraph::from_tasks(branch_tasks(vec![
            BranchArm::when("x", Condition::IsSet("Users".into()), ["left"]),
            BranchArm::when("y", Condition::IsSet("Hosts".into()), ["right"]),
        ]));
        assert!(matches!(result, Err(GraphError::DefaultArm { found: 0, .. })));
    }

    #[test]
    fn test_branch_arm_to_non_dependent_rejected() {
        let tasks = vec![
            Task::automated("start", "Start", "noop"),
            Task::branch(
                "decide",
                "Decide",
                vec![
                    BranchArm::when("x", Condition::IsSet("Users".into()), ["elsewhere"]),
                    BranchArm::otherwise("fallback", ["left"]),
                ],
            )
            .after("start"),
            Task::automated("left", "Left", "noop").after("decide"),
            // depends on start, not on the branch
            Task::automated("elsewhere", "Elsewhere", "noop").after("start"),
        ];
        assert!(matches!(
            TaskGraph::from_tasks(tasks),
            Err(GraphError::InvalidBranchArm { .. })
        ));
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[test]
    fn test_task_serialization_roundtrip() {
        let task = Task::containment("isolate", "Isolate hosts", "isolate_hosts")
            .after("decide")
            .with_retry_limit(2)
            .with_parameters(serde_json::json!({"scope": "all"}));

        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
        assert!(back.kind.is_containment());
        assert_eq!(back.kind.action(), Some("isolate_hosts"));
    }

    #[test]
    fn test_graph_iteration_order_is_declaration_order() {
        let graph = TaskGraph::from_tasks(linear()).unwrap();
        let ids: Vec<&str> = graph.ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
