use super::null_as_default;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    #[default]
    Draft,
    Executing,
    Completed,
    Cancelled,
}

impl PlanStatus {
    /// Lenient wire parsing. Statuses outside the plan lifecycle (for example the
    /// server's `FAILED` run status) yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "EXECUTING" | "RUNNING" => Some(Self::Executing),
            "COMPLETED" | "COMPLETE" => Some(Self::Completed),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Executing => 1,
            Self::Completed | Self::Cancelled => 2,
        }
    }

    /// Returns the status after observing `next`. Backward moves and moves between the
    /// two terminal statuses are refused.
    pub fn advance(self, next: Self) -> Self {
        if next.rank() > self.rank() {
            next
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub objective: String,
    pub tasks: Vec<Task>,
    pub findings: Vec<Finding>,
    pub plan_id: String,
    pub status: PlanStatus,
}

impl Plan {
    /// Advances `status` forward-only; returns whether it changed.
    pub fn advance_status(&mut self, next: PlanStatus) -> bool {
        let advanced = self.status.advance(next);
        let changed = advanced != self.status;
        self.status = advanced;
        changed
    }

    /// Markdown rendering used by the terminal front end.
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            "## Objective".to_string(),
            self.objective.clone(),
            String::new(),
            "## Tasks".to_string(),
        ];
        for (index, task) in self.tasks.iter().enumerate() {
            let role = if task.role.is_empty() {
                "role"
            } else {
                task.role.as_str()
            };
            lines.push(format!("- **{}. {}**: {}", index + 1, role, task.description));
        }
        lines.join("\n")
    }
}
