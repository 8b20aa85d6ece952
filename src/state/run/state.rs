use crate::types::Plan;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    User,
    Agent,
    System,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::User,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Agent,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            content: content.into(),
        }
    }
}

/// Where the current run sits in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunPhase {
    #[default]
    Idle,
    AwaitingPlan,
    PlanReady,
    Executing,
    Completed,
    Cancelled,
    Errored,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting {
        attempt: u32,
        retry_in_ms: u64,
    },
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskProgress {
    pub role: Option<String>,
    pub description: Option<String>,
    pub finished: bool,
}

/// Everything a view needs to render the current run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub session_id: Option<String>,
    pub plan: Option<Plan>,
    pub messages: Vec<Message>,
    pub is_working: bool,
    pub active_run_id: Option<String>,
    pub last_event_id: u64,
    pub phase: RunPhase,
    pub connection: ConnectionStatus,
    pub status_message: Option<String>,
    pub tasks_in_flight: BTreeMap<String, TaskProgress>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Raises the watermark; lower ids leave it unchanged.
    pub fn advance_watermark(&mut self, event_id: u64) {
        self.last_event_id = self.last_event_id.max(event_id);
    }

    pub fn adopt_session(&mut self, session_id: Option<&str>) {
        if self.session_id.is_some() {
            return;
        }
        if let Some(session_id) = session_id.filter(|id| !id.is_empty()) {
            self.session_id = Some(session_id.to_string());
        }
    }

    pub fn plan_markdown(&self) -> Option<String> {
        self.plan.as_ref().map(Plan::to_markdown)
    }
}
