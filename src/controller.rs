use crate::api::{ApiClient, RunApi};
use crate::config::Config;
use crate::error::{describe_failure, ClientError};
use crate::runtime::{CancelOutcome, ConnectionEvent, ConnectionManager};
use crate::state::run::{MISSING_RUN_ID_MESSAGE, NO_ACTIVE_RUN_MESSAGE, NO_PLAN_READY_MESSAGE};
use crate::state::{ConnectionStatus, RunReducer, RunState};
use crate::types::{ChatRequest, PlanExecuteRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};


/// How a top-level request is run on the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Start the run and follow it over the event stream.
    #[default]
    Stream,
    /// Block on a single request that returns the finished run.
    Sync,
    /// Draft a plan and wait for `approve_plan` or `revise_plan`.
    PlanOnly,
}

/// Snapshot published after every state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStateUpdate {
    pub revision: u64,
    pub state: RunState,
}

/// Facade the front end drives: it issues the boundary calls, owns the
/// connection, and funnels everything through one reducer.
pub struct RunController {
    api: Arc<dyn RunApi>,
    connection: ConnectionManager,
    reducer: RunReducer,
    provider: Option<String>,
    model: Option<String>,
    subscribers: Vec<mpsc::UnboundedSender<RunStateUpdate>>,
    revision: u64,
}

impl RunController {
    pub fn new(api: Arc<dyn RunApi>, connection: ConnectionManager) -> Self {
        Self {
            api,
            connection,
            reducer: RunReducer::new(),
            provider: None,
            model: None,
            subscribers: Vec::new(),
            revision: 0,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let api: Arc<dyn RunApi> = Arc::new(ApiClient::new(config));
        let connection = ConnectionManager::from_config(config, Arc::clone(&api))?;
        Ok(Self::new(api, connection).with_model(config.provider.clone(), config.model.clone()))
    }

    pub fn with_model(mut self, provider: Option<String>, model: Option<String>) -> Self {
        self.provider = provider;
        self.model = model;
        self
    }

    pub fn state(&self) -> &RunState {
        self.reducer.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RunStateUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Starts a new top-level request. Blank messages are ignored.
    pub async fn start_run(&mut self, message: &str, mode: RunMode) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }

        self.connection.close();
        self.reducer.begin_request(message);
        self.publish();

        let request = self.chat_request(message);
        info!(mode = ?mode, "starting run");
        match mode {
            RunMode::Stream => match self.api.start_stream(&request).await {
                Ok(response) => match response.run_id.filter(|id| !id.trim().is_empty()) {
                    Some(run_id) => self.open_stream(&run_id),
                    None => self.fail(MISSING_RUN_ID_MESSAGE),
                },
                Err(error) => self.fail(&describe_failure("Failed to start run", &error)),
            },
            RunMode::Sync => match self.api.start_sync(&request).await {
                Ok(response) => self.reducer.apply_sync_response(&response),
                Err(error) => self.fail(&describe_failure("Failed to run", &error)),
            },
            RunMode::PlanOnly => match self.api.start_plan(&request).await {
                Ok(response) => self.reducer.apply_plan_draft(&response),
                Err(error) => self.fail(&describe_failure("Failed to plan", &error)),
            },
        }
        self.publish();
    }

    pub async fn approve_plan(&mut self) {
        self.execute_plan(None).await;
    }

    /// Executes the drafted plan with reviewer feedback attached.
    pub async fn revise_plan(&mut self, feedback: &str) {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            self.execute_plan(None).await;
        } else {
            self.execute_plan(Some(feedback)).await;
        }
    }

    /// Cancels the active run. The working indicator drops immediately and is
    /// restored if the server does not accept the cancel.
    pub async fn cancel_run(&mut self) {
        let Some(run_id) = self.reducer.begin_cancel() else {
            self.reducer.note(NO_ACTIVE_RUN_MESSAGE);
            self.publish();
            return;
        };
        self.publish();

        match self.connection.cancel(&run_id).await {
            CancelOutcome::Cancelled { message } => {
                info!(run_id = %run_id, server_message = %message, "run cancelled");
                self.reducer.cancel_succeeded();
            }
            CancelOutcome::Rejected { message } => {
                warn!(run_id = %run_id, reason = %message, "cancel rejected");
                self.reducer.cancel_failed(&format!("Failed to cancel run: {message}"));
            }
            CancelOutcome::Failed(error) => {
                warn!(run_id = %run_id, error = %error, "cancel request failed");
                self.reducer.cancel_failed(&describe_failure("Failed to cancel run", &error));
            }
            CancelOutcome::NotActive => {
                self.reducer.note(NO_ACTIVE_RUN_MESSAGE);
            }
        }
        self.publish();
    }

    pub fn clear_chat(&mut self) {
        self.connection.close();
        self.reducer.clear_chat();
        self.publish();
    }

    /// Applies the next inbound connection event. Returns whether the state
    /// changed, or `None` once the connection channel is gone.
    pub async fn process_next(&mut self) -> Option<bool> {
        let event = self.connection.recv().await?;
        let changed = self.apply_connection_event(event);
        if changed {
            self.publish();
        }
        Some(changed)
    }

    /// Drives the reducer loop until the current run stops working or its
    /// connection is closed.
    pub async fn run_until_idle(&mut self) {
        while self.reducer.state().is_working && self.connection.is_connected() {
            if self.process_next().await.is_none() {
                break;
            }
        }
    }

    async fn execute_plan(&mut self, feedback: Option<&str>) {
        let Some(plan_id) = self.reducer.begin_execution_request(feedback) else {
            self.reducer.note(NO_PLAN_READY_MESSAGE);
            self.publish();
            return;
        };
        self.publish();

        let request = PlanExecuteRequest {
            plan_id,
            feedback: feedback.map(str::to_string),
            provider: self.provider.clone(),
            model: self.model.clone(),
        };
        match self.api.execute_plan(&request).await {
            Ok(response) => {
                if let Some(run_id) = self.reducer.apply_execution(&response) {
                    self.connection.connect(&run_id);
                }
            }
            Err(error) => self.fail(&describe_failure("Failed to execute plan", &error)),
        }
        self.publish();
    }

    fn apply_connection_event(&mut self, event: ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::Opened { run_id } => {
                if !self.is_current(&run_id) {
                    return false;
                }
                self.reducer.set_connection(ConnectionStatus::Open)
            }
            ConnectionEvent::Dropped {
                run_id,
                attempt,
                retry_in,
                ..
            } => {
                if !self.is_current(&run_id) {
                    return false;
                }
                self.reducer.set_connection(ConnectionStatus::Reconnecting {
                    attempt,
                    retry_in_ms: u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
                })
            }
            ConnectionEvent::Event { run_id, id, event } => {
                let reduction = self.reducer.apply_event(&run_id, id, &event);
                if reduction.closes_connection() {
                    self.connection.close();
                    self.reducer.connection_closed();
                }
                reduction.is_applied()
            }
        }
    }

    fn is_current(&self, run_id: &str) -> bool {
        self.connection.run_id() == Some(run_id)
            && self.reducer.state().active_run_id.as_deref() == Some(run_id)
    }

    fn open_stream(&mut self, run_id: &str) {
        self.reducer.attach_run(run_id);
        self.connection.connect(run_id);
    }

    fn fail(&mut self, message: &str) {
        warn!(message, "request failed");
        self.reducer.fail_request(message);
    }

    fn chat_request(&self, message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            provider: self.provider.clone(),
            model: self.model.clone(),
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        let update = RunStateUpdate {
            revision: self.revision,
            state: self.reducer.state().clone(),
        };
        self.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
        debug!(
            revision = self.revision,
            subscribers = self.subscribers.len(),
            "published run state"
        );
    }
}
