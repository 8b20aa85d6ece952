pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{RunController, RunMode, RunStateUpdate};
