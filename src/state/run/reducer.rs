use super::reassembly::{ChunkOutcome, TaskOutputReassembler};
use super::state::{ConnectionStatus, Message, RunPhase, RunState, TaskProgress};
use crate::types::{
    ExecutePlanResponse, Plan, PlanData, PlanDraftResponse, PlanStatus, RunCompleteData, RunEvent,
    SyncRunResponse, TaskOutputData,
};
use tracing::{debug, info, warn};

pub const RUN_CANCELLED_MESSAGE: &str = "Run cancelled.";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error.";
pub const CANCEL_SUCCEEDED_MESSAGE: &str = "Agent run canceled successfully.";
pub const NO_ACTIVE_RUN_MESSAGE: &str = "No active run to cancel.";
pub const NO_PLAN_READY_MESSAGE: &str = "No plan is ready for execution.";
pub const MISSING_RUN_ID_MESSAGE: &str = "Missing run ID from server.";

const FAILED_RUN_STATUS: &str = "FAILED";

/// Result of offering one stream event to the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Stale, duplicate, or unrecognized; state is untouched.
    Ignored,
    Applied { close_connection: bool },
}

impl Reduction {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn closes_connection(self) -> bool {
        matches!(
            self,
            Self::Applied {
                close_connection: true
            }
        )
    }
}

/// Owns the run state and every transition applied to it, whether it comes from
/// a stream event or from the outcome of a boundary call.
#[derive(Debug, Default)]
pub struct RunReducer {
    state: RunState,
    reassembler: TaskOutputReassembler,
    /// Watermark held when the connection last dropped. The server replays from
    /// there, so ids at or below it were already applied.
    replay_floor: Option<u64>,
}

impl RunReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn reassembler(&self) -> &TaskOutputReassembler {
        &self.reassembler
    }

    /// Fresh state for a new top-level request, seeded with the user's message.
    pub fn begin_request(&mut self, message: &str) {
        self.reset();
        self.state.push_message(Message::user(message));
        self.state.is_working = true;
        self.state.phase = RunPhase::AwaitingPlan;
    }

    /// Points the reducer at `run_id`. Event ids are scoped per run, so switching
    /// runs drops the watermark and the replay floor.
    pub fn attach_run(&mut self, run_id: &str) {
        if self.state.active_run_id.as_deref() != Some(run_id) {
            self.state.last_event_id = 0;
            self.replay_floor = None;
            self.reassembler.clear();
        }
        self.state.active_run_id = Some(run_id.to_string());
        self.state.connection = ConnectionStatus::Connecting;
    }

    /// The live connection is gone for good; later events for it are stale.
    pub fn connection_closed(&mut self) {
        self.state.active_run_id = None;
        self.state.connection = ConnectionStatus::Closed;
    }

    /// Returns whether the indicator changed. A drop pins the replay floor to the
    /// current watermark.
    pub fn set_connection(&mut self, status: ConnectionStatus) -> bool {
        if matches!(status, ConnectionStatus::Reconnecting { .. }) {
            self.replay_floor = Some(self.state.last_event_id);
        }
        if self.state.connection == status {
            return false;
        }
        self.state.connection = status;
        true
    }

    pub fn apply_event(
        &mut self,
        run_id: &str,
        event_id: Option<u64>,
        event: &RunEvent,
    ) -> Reduction {
        if self.state.active_run_id.as_deref() != Some(run_id) {
            debug!(run_id, kind = event.kind(), "dropping event for superseded run");
            return Reduction::Ignored;
        }
        if self.state.phase.is_terminal() {
            debug!(run_id, kind = event.kind(), "dropping event after terminal state");
            return Reduction::Ignored;
        }
        if let RunEvent::Ignored { event_type } = event {
            debug!(run_id, event_type = %event_type, "ignoring unrecognized event type");
            return Reduction::Ignored;
        }
        if let Some(event_id) = event_id {
            if self.replay_floor.is_some_and(|floor| event_id <= floor) {
                debug!(run_id, event_id, "dropping replayed event");
                return Reduction::Ignored;
            }
            self.state.advance_watermark(event_id);
        }

        match event {
            RunEvent::Session(data) => {
                self.state.adopt_session(data.session_id.as_deref());
            }
            RunEvent::Status(data) => {
                self.state.status_message = data.message.clone();
            }
            RunEvent::Plan(data) => {
                self.replace_plan(data);
                self.plan_received(data);
            }
            RunEvent::PlanUpdate(data) => {
                self.merge_plan_update(data);
                self.plan_received(data);
            }
            RunEvent::TaskStart(data) => {
                if let Some(task_id) = data.task_id.as_deref() {
                    self.state.tasks_in_flight.insert(
                        task_id.to_string(),
                        TaskProgress {
                            role: data.role.clone(),
                            description: data.description.clone(),
                            finished: false,
                        },
                    );
                }
                if matches!(
                    self.state.phase,
                    RunPhase::AwaitingPlan | RunPhase::PlanReady
                ) {
                    self.state.phase = RunPhase::Executing;
                }
            }
            RunEvent::TaskOutput(data) => self.apply_task_output(run_id, data),
            RunEvent::TaskComplete(data) => {
                if let Some(task_id) = data.task_id.as_deref() {
                    self.state.tasks_in_flight.remove(task_id);
                }
            }
            RunEvent::Final(data) => {
                if let Some(answer) = data.final_answer.as_deref().filter(|a| !a.is_empty()) {
                    self.state.push_message(Message::agent(answer));
                }
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.advance_status(PlanStatus::Completed);
                }
                self.finish(run_id, RunPhase::Completed);
            }
            RunEvent::RunComplete(data) => {
                let phase = self.apply_run_complete(data);
                self.finish(run_id, phase);
            }
            RunEvent::RunCancel => {
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.advance_status(PlanStatus::Cancelled);
                }
                self.state.push_message(Message::system(RUN_CANCELLED_MESSAGE));
                self.finish(run_id, RunPhase::Cancelled);
            }
            RunEvent::Error(data) => {
                let message = data
                    .message
                    .as_deref()
                    .filter(|message| !message.is_empty())
                    .unwrap_or(UNKNOWN_ERROR_MESSAGE);
                self.state.push_message(Message::system(message));
                self.finish(run_id, RunPhase::Errored);
            }
            RunEvent::Ignored { .. } => return Reduction::Ignored,
        }

        Reduction::Applied {
            close_connection: event.is_terminal(),
        }
    }

    /// A synchronous run returns once the whole run is over.
    pub fn apply_sync_response(&mut self, response: &SyncRunResponse) {
        if let Some(sync_plan) = &response.plan {
            self.state.plan = Some(Plan {
                objective: sync_plan.objective.clone(),
                tasks: sync_plan.tasks.clone(),
                status: PlanStatus::Completed,
                ..Plan::default()
            });
        }
        if let Some(answer) = response.final_answer.as_deref().filter(|a| !a.is_empty()) {
            self.state.push_message(Message::agent(answer));
        }
        self.state.is_working = false;
        self.state.phase = RunPhase::Completed;
    }

    /// A drafted plan waits for `approve`/`revise`.
    pub fn apply_plan_draft(&mut self, response: &PlanDraftResponse) {
        self.state.is_working = false;
        self.state.adopt_session(response.session_id.as_deref());
        if response.has_plan() {
            self.state.plan = Some(response.to_plan());
            self.state.phase = RunPhase::PlanReady;
        } else {
            self.state.phase = RunPhase::Idle;
        }
    }

    pub fn has_reviewable_plan(&self) -> bool {
        self.state.phase == RunPhase::PlanReady
            && !self.state.is_working
            && self
                .state
                .plan
                .as_ref()
                .is_some_and(|plan| plan.status == PlanStatus::Draft)
    }

    /// Marks an approval in flight and returns the plan id to execute, or `None`
    /// when nothing is waiting for review.
    pub fn begin_execution_request(&mut self, feedback: Option<&str>) -> Option<String> {
        if !self.has_reviewable_plan() {
            return None;
        }
        let plan_id = self.state.plan.as_ref()?.plan_id.clone();
        if let Some(feedback) = feedback {
            self.state.push_message(Message::user(feedback));
        }
        self.state.is_working = true;
        Some(plan_id)
    }

    /// Applies an accepted execution. Returns the run id to stream when the
    /// server continues asynchronously.
    pub fn apply_execution(&mut self, response: &ExecutePlanResponse) -> Option<String> {
        if let Some(run_id) = response.run_id.as_deref().filter(|id| !id.is_empty()) {
            if let Some(plan) = self.state.plan.as_mut() {
                plan.advance_status(PlanStatus::Executing);
            }
            self.state.phase = RunPhase::Executing;
            self.state.is_working = true;
            self.attach_run(run_id);
            return Some(run_id.to_string());
        }

        if let Some(answer) = response.final_answer.as_deref().filter(|a| !a.is_empty()) {
            self.state.push_message(Message::agent(answer));
            if let Some(plan) = self.state.plan.as_mut() {
                plan.advance_status(PlanStatus::Completed);
            }
            self.state.is_working = false;
            self.state.phase = RunPhase::Completed;
            return None;
        }

        self.fail_request(MISSING_RUN_ID_MESSAGE);
        None
    }

    /// A boundary call failed before any run started. A drafted plan stays
    /// reviewable.
    pub fn fail_request(&mut self, message: &str) {
        self.state.push_message(Message::system(message));
        self.state.is_working = false;
        if self.state.phase == RunPhase::AwaitingPlan {
            self.state.phase = RunPhase::Errored;
        }
    }

    /// Optimistically stops the working indicator and returns the run to cancel.
    pub fn begin_cancel(&mut self) -> Option<String> {
        let run_id = self.state.active_run_id.clone()?;
        if !self.state.is_working {
            return None;
        }
        self.state.is_working = false;
        Some(run_id)
    }

    pub fn cancel_succeeded(&mut self) {
        self.state.plan = None;
        self.state.is_working = false;
        self.state.phase = RunPhase::Cancelled;
        self.state.tasks_in_flight.clear();
        self.reassembler.clear();
        self.connection_closed();
        self.state.push_message(Message::system(CANCEL_SUCCEEDED_MESSAGE));
    }

    /// The server refused or never answered; the run keeps going.
    pub fn cancel_failed(&mut self, message: &str) {
        self.state.is_working = true;
        self.state.push_message(Message::system(message));
    }

    pub fn note(&mut self, message: &str) {
        self.state.push_message(Message::system(message));
    }

    pub fn clear_chat(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.state = RunState::new();
        self.reassembler.clear();
        self.replay_floor = None;
    }

    fn finish(&mut self, run_id: &str, phase: RunPhase) {
        info!(run_id, phase = ?phase, "run reached terminal state");
        self.state.is_working = false;
        self.state.phase = phase;
        self.state.tasks_in_flight.clear();
        if self.reassembler.pending_tasks() > 0 {
            warn!(
                run_id,
                pending = self.reassembler.pending_tasks(),
                "discarding unfinished task output"
            );
        }
        self.reassembler.clear();
    }

    fn plan_received(&mut self, data: &PlanData) {
        self.state.adopt_session(data.session_id.as_deref());
        if matches!(self.state.phase, RunPhase::Idle | RunPhase::AwaitingPlan) {
            self.state.phase = RunPhase::PlanReady;
        }
    }

    fn replace_plan(&mut self, data: &PlanData) {
        let mut plan = data.to_plan();
        if let Some(previous) = &self.state.plan {
            plan.status = previous.status.advance(plan.status);
            if plan.plan_id.is_empty() {
                plan.plan_id = previous.plan_id.clone();
            }
        }
        self.state.plan = Some(plan);
    }

    fn merge_plan_update(&mut self, data: &PlanData) {
        let Some(plan) = self.state.plan.as_mut() else {
            self.replace_plan(data);
            return;
        };

        let objective = data.objective();
        if !objective.trim().is_empty() {
            plan.objective = objective.to_string();
        }
        plan.tasks.extend(data.tasks().iter().cloned());
        plan.findings.extend(data.findings.iter().cloned());
        if plan.plan_id.is_empty() {
            if let Some(plan_id) = data.plan_id.as_deref() {
                plan.plan_id = plan_id.to_string();
            }
        }
        if let Some(status) = data.plan_status() {
            plan.advance_status(status);
        }
    }

    fn apply_task_output(&mut self, run_id: &str, data: &TaskOutputData) {
        let Some(task_id) = data.task_id.as_deref().filter(|id| !id.is_empty()) else {
            debug!(run_id, "task output without task id");
            return;
        };

        let outcome = self.reassembler.apply(
            task_id,
            data.role.as_deref(),
            data.sequence.unwrap_or(0),
            data.chunk.as_deref().unwrap_or_default(),
            data.done,
        );
        let ChunkOutcome::Finalized { text, role, gaps } = outcome else {
            return;
        };

        if !gaps.is_empty() {
            warn!(run_id, task_id, missing = ?gaps, "task output finalized with missing chunks");
        }
        let content = match role {
            Some(role) => format!("**{role}**\n\n{text}"),
            None => text,
        };
        self.state.push_message(Message::agent(content));
        if let Some(progress) = self.state.tasks_in_flight.get_mut(task_id) {
            progress.finished = true;
        }
    }

    fn apply_run_complete(&mut self, data: &RunCompleteData) -> RunPhase {
        let Some(status) = data.status.as_deref() else {
            return RunPhase::Completed;
        };
        if status.trim().eq_ignore_ascii_case(FAILED_RUN_STATUS) {
            return RunPhase::Errored;
        }
        match PlanStatus::parse(status) {
            Some(plan_status) => {
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.advance_status(plan_status);
                }
                if plan_status == PlanStatus::Cancelled {
                    RunPhase::Cancelled
                } else {
                    RunPhase::Completed
                }
            }
            None => RunPhase::Completed,
        }
    }
}
