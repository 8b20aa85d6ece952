use super::null_as_default;
use super::plan::{Finding, Plan, PlanStatus, Task};
use serde::Deserialize;
use serde_json::Value;

/// Raw stream message: `{ "type": ..., "data": {...}, "id": 42 }`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

impl EventEnvelope {
    /// Resumption id. Only non-negative integers count.
    pub fn event_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }
}

/// A decoded stream event together with its resumption id.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub id: Option<u64>,
    pub event: RunEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Session(SessionData),
    Status(StatusData),
    Plan(PlanData),
    PlanUpdate(PlanData),
    TaskStart(TaskStartData),
    TaskOutput(TaskOutputData),
    TaskComplete(TaskCompleteData),
    Final(FinalData),
    RunComplete(RunCompleteData),
    RunCancel,
    Error(ErrorData),
    /// Event types this client does not know about.
    Ignored { event_type: String },
}

impl RunEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Session(_) => "session",
            Self::Status(_) => "status",
            Self::Plan(_) => "plan",
            Self::PlanUpdate(_) => "plan-update",
            Self::TaskStart(_) => "task-start",
            Self::TaskOutput(_) => "task-output",
            Self::TaskComplete(_) => "task-complete",
            Self::Final(_) => "final",
            Self::RunComplete(_) => "run-complete",
            Self::RunCancel => "run-cancel",
            Self::Error(_) => "error",
            Self::Ignored { event_type } => event_type.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Final(_) | Self::RunComplete(_) | Self::RunCancel | Self::Error(_)
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StatusData {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PlanBody {
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

/// Payload of `plan` and `plan-update`. Accepts both the nested
/// `{plan: {objective, tasks}, planId, status}` shape and a flat `{objective, tasks}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanData {
    #[serde(default)]
    pub plan: Option<PlanBody>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl PlanData {
    pub fn objective(&self) -> &str {
        self.plan
            .as_ref()
            .and_then(|body| body.objective.as_deref())
            .or(self.objective.as_deref())
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> &[Task] {
        match (&self.plan, &self.tasks) {
            (Some(body), _) if !body.tasks.is_empty() => &body.tasks,
            (_, Some(tasks)) => tasks,
            (Some(body), None) => &body.tasks,
            (None, None) => &[],
        }
    }

    pub fn plan_status(&self) -> Option<PlanStatus> {
        self.status.as_deref().and_then(PlanStatus::parse)
    }

    /// Builds a standalone plan from this payload.
    pub fn to_plan(&self) -> Plan {
        Plan {
            objective: self.objective().to_string(),
            tasks: self.tasks().to_vec(),
            findings: self.findings.clone(),
            plan_id: self.plan_id.clone().unwrap_or_default(),
            status: self.plan_status().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStartData {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputData {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub sequence: Option<usize>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub done: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompleteData {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinalData {
    #[serde(default)]
    pub final_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RunCompleteData {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ErrorData {
    #[serde(default)]
    pub message: Option<String>,
}
