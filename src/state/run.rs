mod reassembly;
mod reducer;
mod state;

#[cfg(test)]
mod tests;

pub use reassembly::{ChunkOutcome, TaskOutputBuffer, TaskOutputReassembler};
pub use reducer::{
    Reduction, RunReducer, CANCEL_SUCCEEDED_MESSAGE, MISSING_RUN_ID_MESSAGE,
    NO_ACTIVE_RUN_MESSAGE, NO_PLAN_READY_MESSAGE, RUN_CANCELLED_MESSAGE, UNKNOWN_ERROR_MESSAGE,
};
pub use state::{ConnectionStatus, Message, MessageKind, RunPhase, RunState, TaskProgress};
