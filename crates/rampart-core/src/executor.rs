//! Playbook executor.
//!
//! Walks a validated [`TaskGraph`], dispatching runnable tasks onto a
//! bounded worker pool and tracking per-task outcomes until the graph
//! reaches a terminal configuration. The executor is the sole mutator of
//! task state: workers, branch decisions, and external analyst signals all
//! funnel through one signal channel consumed by the event loop.
//!
//! ## Suspension
//!
//! Manual tasks stay `Running` indefinitely without holding a worker slot;
//! they resolve only when a completion signal arrives through the
//! [`ExecutorHandle`]. Automated and containment tasks suspend only for the
//! duration of their connector calls.
//!
//! ## Cancellation
//!
//! Cancelling the graph flips a watch channel observed by every in-flight
//! worker. Workers abandon their futures; any results that still arrive are
//! discarded, never applied to the field store's task records.

use crate::conditions::ConditionEvaluator;
use crate::events::{EventBus, ExecutionEvent};
use crate::graph::{TaskGraph, TaskKind};
use crate::incident::StandingRisk;
use crate::registry::{ActionRegistry, TaskContext, TaskError, TaskReport};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a task was skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A branch selected a different arm.
    NotSelected,
    /// A predecessor failed terminally; no path to this task remains.
    Blocked,
}

/// State machine per task.
///
/// States only move forward; the single exception is `Running` back to
/// `Runnable` when a failed attempt is re-scheduled within the retry budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on predecessors.
    Pending,
    /// All predecessors terminal; eligible for dispatch.
    Runnable,
    /// Executing, or (for manual tasks) awaiting an analyst.
    Running,
    /// Terminal success.
    Succeeded,
    /// Terminal failure, retry budget exhausted.
    Failed,
    /// Terminal, never ran.
    Skipped { reason: SkipReason },
}

impl TaskState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped { .. }
        )
    }
}

/// Outcome reported for a manual task by the external signal channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

/// Terminal status of a whole execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every reachable task succeeded or was skipped by branch selection.
    Completed,
    /// The graph settled, but at least one task failed terminally.
    CompletedWithFailures,
    /// Execution was cancelled; non-terminal tasks were abandoned.
    Cancelled,
}

/// Per-task outcome in the execution report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub state: TaskState,
    /// Completed attempts (including the failed ones).
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Arm label, for branch tasks.
    pub selected_arm: Option<String>,
    /// Analyst note, for manual tasks.
    pub note: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(task_id: String) -> Self {
        Self {
            task_id,
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            selected_arm: None,
            note: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Result of driving a graph to a terminal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub incident_id: Uuid,
    pub status: ExecutionStatus,
    /// Task records in graph declaration order.
    pub tasks: Vec<TaskRecord>,
    /// Terminally failed containment tasks awaiting acknowledgment.
    pub standing_risks: Vec<StandingRisk>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Looks up a task record by id.
    pub fn task(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }
}

/// Errors from executor construction and signal delivery.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("task {task} references unregistered action {action}")]
    UnknownAction { task: String, action: String },

    #[error("execution has ended; signal not delivered")]
    ExecutionEnded,
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Worker pool size for automated and containment tasks.
    pub max_concurrency: usize,
    /// Bound applied to each connector call made by handlers.
    pub connector_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            connector_timeout: Duration::from_secs(30),
        }
    }
}

enum EngineSignal {
    /// A worker acquired a slot and began executing.
    Started { task_id: String },
    /// A worker attempt finished.
    Finished {
        task_id: String,
        result: Result<TaskReport, TaskError>,
    },
    /// An analyst resolved a manual task.
    ManualCompleted {
        task_id: String,
        outcome: TaskOutcome,
        note: Option<String>,
    },
    /// Cancel the whole graph.
    Cancel { reason: String },
}

/// Cloneable handle for signalling a running executor.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::UnboundedSender<EngineSignal>,
}

impl ExecutorHandle {
    /// Reports completion of a manual task. The signal is queued and
    /// applied by the executor's event loop, never on the caller's thread.
    pub fn complete_manual_task(
        &self,
        task_id: impl Into<String>,
        outcome: TaskOutcome,
        note: Option<String>,
    ) -> Result<(), ExecutorError> {
        self.tx
            .send(EngineSignal::ManualCompleted {
                task_id: task_id.into(),
                outcome,
                note,
            })
            .map_err(|_| ExecutorError::ExecutionEnded)
    }

    /// Cancels the whole graph. In-flight connector calls are asked to stop
    /// and their eventual results are discarded.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<(), ExecutorError> {
        self.tx
            .send(EngineSignal::Cancel {
                reason: reason.into(),
            })
            .map_err(|_| ExecutorError::ExecutionEnded)
    }
}

enum Disposition {
    Wait,
    Ready,
    Skip(SkipReason),
}

/// Drives one incident's task graph to a terminal configuration.
pub struct PlaybookExecutor {
    incident_id: Uuid,
    graph: TaskGraph,
    fields: Arc<crate::fields::FieldStore>,
    registry: Arc<ActionRegistry>,
    events: Arc<EventBus>,
    config: ExecutionConfig,
    records: HashMap<String, TaskRecord>,
    standing_risks: Vec<StandingRisk>,
    tx: mpsc::UnboundedSender<EngineSignal>,
    rx: mpsc::UnboundedReceiver<EngineSignal>,
    cancel_tx: watch::Sender<bool>,
    semaphore: Arc<Semaphore>,
    cancelled: bool,
    started_at: DateTime<Utc>,
}

impl PlaybookExecutor {
    /// Creates an executor for the given graph.
    ///
    /// Fails fast if any automated or containment task references an action
    /// missing from the registry; that is a configuration bug on par with a
    /// broken graph.
    pub fn new(
        incident_id: Uuid,
        graph: TaskGraph,
        fields: Arc<crate::fields::FieldStore>,
        registry: Arc<ActionRegistry>,
        events: Arc<EventBus>,
        config: ExecutionConfig,
    ) -> Result<Self, ExecutorError> {
        for task in graph.iter() {
            if let Some(action) = task.kind.action() {
                if !registry.contains(action) {
                    return Err(ExecutorError::UnknownAction {
                        task: task.id.clone(),
                        action: action.to_string(),
                    });
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, _) = watch::channel(false);
        let records = graph
            .iter()
            .map(|t| (t.id.clone(), TaskRecord::new(t.id.clone())))
            .collect();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        Ok(Self {
            incident_id,
            graph,
            fields,
            registry,
            events,
            config,
            records,
            standing_risks: Vec::new(),
            tx,
            rx,
            cancel_tx,
            semaphore,
            cancelled: false,
            started_at: Utc::now(),
        })
    }

    /// A handle for delivering external signals while the executor runs.
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Runs the graph to a terminal configuration.
    #[instrument(skip(self), fields(incident_id = %self.incident_id))]
    pub async fn run(mut self) -> ExecutionReport {
        info!(tasks = self.graph.len(), "starting playbook execution");
        self.started_at = Utc::now();
        self.bootstrap().await;

        while !self.cancelled && !self.settled() {
            match self.rx.recv().await {
                Some(signal) => self.apply(signal).await,
                // Unreachable while we hold a sender, but don't spin if the
                // runtime tears the channel down.
                None => break,
            }
        }

        self.finish().await
    }

    fn settled(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    fn state(&self, id: &str) -> TaskState {
        self.records
            .get(id)
            .map(|r| r.state.clone())
            .unwrap_or(TaskState::Pending)
    }

    async fn bootstrap(&mut self) {
        let entry_id = self.graph.entry().id.clone();
        let mut terminal = VecDeque::new();
        self.activate(entry_id, &mut terminal).await;
        self.drain(terminal).await;
    }

    /// Propagates terminal transitions: each dependent of a newly terminal
    /// task is re-evaluated exactly once per dependency-satisfaction event.
    async fn drain(&mut self, mut terminal: VecDeque<String>) {
        while let Some(done) = terminal.pop_front() {
            let dependents: Vec<String> = self.graph.dependents_of(&done).to_vec();
            for dependent in dependents {
                if self.state(&dependent) != TaskState::Pending {
                    continue;
                }
                match self.disposition(&dependent) {
                    Disposition::Wait => {}
                    Disposition::Skip(reason) => {
                        self.set_state(&dependent, TaskState::Skipped { reason })
                            .await;
                        terminal.push_back(dependent);
                    }
                    Disposition::Ready => {
                        self.activate(dependent, &mut terminal).await;
                    }
                }
            }
        }
    }

    /// Where a pending task stands once a predecessor settles.
    ///
    /// Any failed predecessor blocks the task. Otherwise one succeeded
    /// predecessor is an unblocked path and the task runs; if every
    /// predecessor was skipped, the skip propagates (blocked dominates
    /// not-selected).
    fn disposition(&self, id: &str) -> Disposition {
        let task = self.graph.get(id).expect("record implies known task");
        let mut any_failed = false;
        let mut any_succeeded = false;
        let mut any_blocked = false;
        for dep in &task.depends_on {
            match self.state(dep) {
                TaskState::Succeeded => any_succeeded = true,
                TaskState::Failed => any_failed = true,
                TaskState::Skipped {
                    reason: SkipReason::Blocked,
                } => any_blocked = true,
                TaskState::Skipped { .. } => {}
                _ => return Disposition::Wait,
            }
        }
        if any_failed {
            Disposition::Skip(SkipReason::Blocked)
        } else if any_succeeded || task.depends_on.is_empty() {
            Disposition::Ready
        } else if any_blocked {
            Disposition::Skip(SkipReason::Blocked)
        } else {
            Disposition::Skip(SkipReason::NotSelected)
        }
    }

    /// Moves a ready task out of `Pending`. Branches are decided inline
    /// (pure field store reads); manual tasks park in `Running`; the rest
    /// go to the worker pool.
    async fn activate(&mut self, id: String, terminal: &mut VecDeque<String>) {
        self.set_state(&id, TaskState::Runnable).await;
        let kind = self.graph.get(&id).expect("known task").kind.clone();
        match kind {
            TaskKind::Branch { arms } => {
                self.set_state(&id, TaskState::Running).await;

                let selected = arms
                    .iter()
                    .find(|arm| {
                        arm.condition
                            .as_ref()
                            .map(|c| ConditionEvaluator::evaluate(c, &self.fields))
                            .unwrap_or(false)
                    })
                    .or_else(|| arms.iter().find(|arm| arm.condition.is_none()))
                    .expect("graph validation guarantees a default arm");

                let selected_label = selected.label.clone();
                let chosen: HashSet<&String> = selected.successors.iter().collect();
                let mut to_skip: Vec<String> = Vec::new();
                for arm in &arms {
                    if arm.label == selected_label {
                        continue;
                    }
                    for successor in &arm.successors {
                        if !chosen.contains(successor) && !to_skip.contains(successor) {
                            to_skip.push(successor.clone());
                        }
                    }
                }

                debug!(task_id = %id, arm = %selected_label, "branch decided");
                if let Some(record) = self.records.get_mut(&id) {
                    record.selected_arm = Some(selected_label.clone());
                    record.attempts += 1;
                }
                self.events
                    .publish(ExecutionEvent::BranchSelected {
                        incident_id: self.incident_id,
                        task_id: id.clone(),
                        arm: selected_label,
                    })
                    .await;
                self.set_state(&id, TaskState::Succeeded).await;

                for skipped in to_skip {
                    if self.state(&skipped) == TaskState::Pending {
                        self.set_state(
                            &skipped,
                            TaskState::Skipped {
                                reason: SkipReason::NotSelected,
                            },
                        )
                        .await;
                        terminal.push_back(skipped);
                    }
                }
                terminal.push_back(id);
            }
            TaskKind::Manual { instructions } => {
                self.set_state(&id, TaskState::Running).await;
                self.events
                    .publish(ExecutionEvent::ManualInputRequired {
                        incident_id: self.incident_id,
                        task_id: id,
                        instructions,
                    })
                    .await;
            }
            TaskKind::Automated { .. } | TaskKind::Containment { .. } => {
                self.spawn_worker(&id);
            }
        }
    }

    /// Spawns one attempt of an automated or containment task. The worker
    /// acquires a pool slot, runs the handler, and reports back over the
    /// signal channel; it never touches task state directly.
    fn spawn_worker(&self, id: &str) {
        let task = self.graph.get(id).expect("known task");
        let (action, parameters) = match &task.kind {
            TaskKind::Automated { action, parameters }
            | TaskKind::Containment { action, parameters } => {
                (action.clone(), parameters.clone())
            }
            _ => unreachable!("only action tasks reach the worker pool"),
        };
        let handler = self
            .registry
            .get(&action)
            .expect("validated at construction");
        let ctx = TaskContext {
            incident_id: self.incident_id,
            task_id: id.to_string(),
            parameters,
            fields: Arc::clone(&self.fields),
            connector_timeout: self.config.connector_timeout,
        };
        let tx = self.tx.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let mut cancel_rx = self.cancel_tx.subscribe();
        let task_id = id.to_string();

        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if *cancel_rx.borrow() {
                return;
            }
            let _ = tx.send(EngineSignal::Started {
                task_id: task_id.clone(),
            });

            let result = tokio::select! {
                result = handler.run(ctx) => result,
                _ = cancel_rx.changed() => {
                    debug!(task_id = %task_id, "worker abandoned on cancellation");
                    return;
                }
            };
            drop(permit);
            let _ = tx.send(EngineSignal::Finished { task_id, result });
        });
    }

    async fn apply(&mut self, signal: EngineSignal) {
        match signal {
            EngineSignal::Started { task_id } => {
                if self.state(&task_id) == TaskState::Runnable {
                    self.set_state(&task_id, TaskState::Running).await;
                }
            }

            EngineSignal::Finished { task_id, result } => {
                if self.cancelled {
                    debug!(task_id = %task_id, "discarding result after cancellation");
                    return;
                }
                if self.state(&task_id) != TaskState::Running {
                    warn!(task_id = %task_id, "result for task not running; discarded");
                    return;
                }
                let attempts = {
                    let record = self.records.get_mut(&task_id).expect("known task");
                    record.attempts += 1;
                    record.attempts
                };
                match result {
                    Ok(report) => {
                        debug!(task_id = %task_id, message = %report.message, "task succeeded");
                        self.set_state(&task_id, TaskState::Succeeded).await;
                        self.drain(VecDeque::from([task_id])).await;
                    }
                    Err(err) => {
                        let error_text = err.to_string();
                        if let Some(record) = self.records.get_mut(&task_id) {
                            record.last_error = Some(error_text.clone());
                        }
                        self.events
                            .publish(ExecutionEvent::TaskAttemptFailed {
                                incident_id: self.incident_id,
                                task_id: task_id.clone(),
                                attempt: attempts,
                                error: error_text.clone(),
                            })
                            .await;

                        let retry_limit =
                            self.graph.get(&task_id).expect("known task").retry_limit;
                        if err.is_retryable() && attempts <= retry_limit {
                            warn!(
                                task_id = %task_id,
                                attempt = attempts,
                                retry_limit,
                                error = %error_text,
                                "attempt failed, re-scheduling"
                            );
                            counter!("rampart_task_retries_total").increment(1);
                            self.set_state(&task_id, TaskState::Runnable).await;
                            self.spawn_worker(&task_id);
                        } else {
                            warn!(task_id = %task_id, error = %error_text, "task failed terminally");
                            self.set_state(&task_id, TaskState::Failed).await;
                            if self
                                .graph
                                .get(&task_id)
                                .map(|t| t.kind.is_containment())
                                .unwrap_or(false)
                            {
                                self.raise_standing_risk(&task_id, &error_text).await;
                            }
                            self.drain(VecDeque::from([task_id])).await;
                        }
                    }
                }
            }

            EngineSignal::ManualCompleted {
                task_id,
                outcome,
                note,
            } => {
                let is_manual = matches!(
                    self.graph.get(&task_id).map(|t| &t.kind),
                    Some(TaskKind::Manual { .. })
                );
                if !is_manual || self.state(&task_id) != TaskState::Running {
                    warn!(task_id = %task_id, "ignoring completion signal for task not awaiting input");
                    return;
                }
                if let Some(record) = self.records.get_mut(&task_id) {
                    record.attempts += 1;
                    record.note = note;
                }
                let state = match outcome {
                    TaskOutcome::Succeeded => TaskState::Succeeded,
                    TaskOutcome::Failed => TaskState::Failed,
                };
                info!(task_id = %task_id, ?outcome, "manual task resolved");
                self.set_state(&task_id, state).await;
                self.drain(VecDeque::from([task_id])).await;
            }

            EngineSignal::Cancel { reason } => {
                info!(reason = %reason, "execution cancelled");
                self.cancelled = true;
                let _ = self.cancel_tx.send(true);
            }
        }
    }

    async fn raise_standing_risk(&mut self, task_id: &str, error: &str) {
        counter!("rampart_standing_risks_total").increment(1);
        self.standing_risks
            .push(StandingRisk::new(task_id, error));
        self.events
            .publish(ExecutionEvent::StandingRiskRaised {
                incident_id: self.incident_id,
                task_id: task_id.to_string(),
                error: error.to_string(),
            })
            .await;
    }

    async fn set_state(&mut self, id: &str, state: TaskState) {
        let now = Utc::now();
        if let Some(record) = self.records.get_mut(id) {
            if state == TaskState::Running && record.started_at.is_none() {
                record.started_at = Some(now);
            }
            if state.is_terminal() {
                record.finished_at = Some(now);
                if let Some(started) = record.started_at {
                    let elapsed = (now - started).num_milliseconds().max(0) as f64 / 1000.0;
                    histogram!("rampart_task_duration_seconds").record(elapsed);
                }
            }
            record.state = state.clone();
        }
        match &state {
            TaskState::Succeeded => counter!("rampart_tasks_succeeded_total").increment(1),
            TaskState::Failed => counter!("rampart_tasks_failed_total").increment(1),
            TaskState::Skipped { .. } => counter!("rampart_tasks_skipped_total").increment(1),
            _ => {}
        }
        self.events
            .publish(ExecutionEvent::TaskStateChanged {
                incident_id: self.incident_id,
                task_id: id.to_string(),
                state,
            })
            .await;
    }

    async fn finish(mut self) -> ExecutionReport {
        let status = if self.cancelled {
            ExecutionStatus::Cancelled
        } else if self
            .records
            .values()
            .any(|r| r.state == TaskState::Failed)
        {
            ExecutionStatus::CompletedWithFailures
        } else {
            ExecutionStatus::Completed
        };

        info!(?status, "execution reached terminal configuration");
        counter!("rampart_executions_total").increment(1);
        self.events
            .publish(ExecutionEvent::ExecutionFinished {
                incident_id: self.incident_id,
                status,
            })
            .await;

        ExecutionReport {
            incident_id: self.incident_id,
            status,
            tasks: self
                .graph
                .ids()
                .map(|id| self.records[id].clone())
                .collect(),
            standing_risks: std::mem::take(&mut self.standing_risks),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
