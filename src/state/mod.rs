pub mod run;

pub use run::{
    ChunkOutcome, ConnectionStatus, Message, MessageKind, Reduction, RunPhase, RunReducer,
    RunState, TaskOutputReassembler, TaskProgress,
};
