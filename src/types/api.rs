use super::null_as_default;
use super::plan::{Finding, Plan, PlanStatus, Task};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanExecuteRequest {
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamResponse {
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    #[serde(default, deserialize_with = "null_as_default")]
    pub objective: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResponse {
    #[serde(default)]
    pub plan: Option<SyncPlan>,
    #[serde(default)]
    pub final_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraftResponse {
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

impl PlanDraftResponse {
    /// True when the response carries something reviewable.
    pub fn has_plan(&self) -> bool {
        self.objective.is_some() || self.tasks.is_some()
    }

    pub fn to_plan(&self) -> Plan {
        Plan {
            objective: self.objective.clone().unwrap_or_default(),
            tasks: self.tasks.clone().unwrap_or_default(),
            findings: self.findings.clone(),
            plan_id: self.plan_id.clone().unwrap_or_default(),
            status: self
                .status
                .as_deref()
                .and_then(PlanStatus::parse)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePlanResponse {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub final_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelRunResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl CancelRunResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: Some("Run cancellation requested.".to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}
