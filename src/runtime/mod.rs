pub mod backoff;
pub mod connection;

pub use backoff::ReconnectBackoff;
pub use connection::{CancelOutcome, ConnectionEvent, ConnectionManager};
