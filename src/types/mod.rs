mod api;
mod event;
mod plan;

pub use api::{
    CancelRunResponse, ChatRequest, ExecutePlanResponse, PlanDraftResponse, PlanExecuteRequest,
    StartStreamResponse, SyncPlan, SyncRunResponse,
};
pub use event::{
    DecodedEvent, ErrorData, EventEnvelope, FinalData, PlanBody, PlanData, RunCompleteData,
    RunEvent, SessionData, StatusData, TaskCompleteData, TaskOutputData, TaskStartData,
};
pub use plan::{Finding, Plan, PlanStatus, Task};

use serde::{Deserialize, Deserializer};

/// The server writes absent values as explicit `null`; treat those like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
