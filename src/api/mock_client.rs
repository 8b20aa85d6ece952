use super::client::RunApi;
use super::transport::{FrameStream, StreamTransport};
use crate::error::ClientError;
use crate::types::{
    CancelRunResponse, ChatRequest, ExecutePlanResponse, PlanDraftResponse, PlanExecuteRequest,
    StartStreamResponse, SyncRunResponse,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::Url;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Canned reply for one boundary call. `Status` and `Unreachable` become the
/// matching `ClientError`.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ok(T),
    Status(u16),
    Unreachable(String),
}

impl<T> MockReply<T> {
    fn into_result(self, url: &str) -> Result<T, ClientError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Status(status) => Err(ClientError::Status {
                url: url.to_string(),
                status,
            }),
            Self::Unreachable(message) => Err(ClientError::Connect {
                url: url.to_string(),
                message,
            }),
        }
    }
}

/// A recorded boundary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    StartStream(ChatRequest),
    StartSync(ChatRequest),
    StartPlan(ChatRequest),
    ExecutePlan(PlanExecuteRequest),
    Cancel(String),
}

#[derive(Default)]
struct MockApiState {
    start_stream: VecDeque<MockReply<StartStreamResponse>>,
    start_sync: VecDeque<MockReply<SyncRunResponse>>,
    start_plan: VecDeque<MockReply<PlanDraftResponse>>,
    execute_plan: VecDeque<MockReply<ExecutePlanResponse>>,
    cancel: VecDeque<MockReply<CancelRunResponse>>,
    calls: Vec<ApiCall>,
}

/// Scripted `RunApi`. Each endpoint replays its queued replies in order.
#[derive(Clone, Default)]
pub struct MockApiClient {
    state: Arc<Mutex<MockApiState>>,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream_run(self, run_id: &str) -> Self {
        self.with_start_stream(MockReply::Ok(StartStreamResponse {
            run_id: Some(run_id.to_string()),
        }))
    }

    pub fn with_start_stream(self, reply: MockReply<StartStreamResponse>) -> Self {
        self.state.lock().unwrap().start_stream.push_back(reply);
        self
    }

    pub fn with_start_sync(self, reply: MockReply<SyncRunResponse>) -> Self {
        self.state.lock().unwrap().start_sync.push_back(reply);
        self
    }

    pub fn with_start_plan(self, reply: MockReply<PlanDraftResponse>) -> Self {
        self.state.lock().unwrap().start_plan.push_back(reply);
        self
    }

    pub fn with_execute_plan(self, reply: MockReply<ExecutePlanResponse>) -> Self {
        self.state.lock().unwrap().execute_plan.push_back(reply);
        self
    }

    pub fn with_cancel(self, reply: MockReply<CancelRunResponse>) -> Self {
        self.state.lock().unwrap().cancel.push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

fn next_reply<T>(queue: &mut VecDeque<MockReply<T>>, endpoint: &str) -> Result<T, ClientError> {
    let url = format!("mock://{endpoint}");
    match queue.pop_front() {
        Some(reply) => reply.into_result(&url),
        None => Err(ClientError::Request {
            url,
            message: "MockApiClient: no more responses configured".to_string(),
        }),
    }
}

#[async_trait]
impl RunApi for MockApiClient {
    async fn start_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<StartStreamResponse, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::StartStream(request.clone()));
        next_reply(&mut state.start_stream, "start-stream")
    }

    async fn start_sync(&self, request: &ChatRequest) -> Result<SyncRunResponse, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::StartSync(request.clone()));
        next_reply(&mut state.start_sync, "start-sync")
    }

    async fn start_plan(&self, request: &ChatRequest) -> Result<PlanDraftResponse, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::StartPlan(request.clone()));
        next_reply(&mut state.start_plan, "start-plan")
    }

    async fn execute_plan(
        &self,
        request: &PlanExecuteRequest,
    ) -> Result<ExecutePlanResponse, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::ExecutePlan(request.clone()));
        next_reply(&mut state.execute_plan, "execute-plan")
    }

    async fn cancel_run(&self, run_id: &str) -> Result<CancelRunResponse, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Cancel(run_id.to_string()));
        next_reply(&mut state.cancel, "cancel")
    }
}

type FrameResult = Result<Bytes, ClientError>;

/// What a scripted connection does after its last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFrames {
    /// Stay open without sending anything else.
    Hold,
    /// Close, which the client treats as an unexpected disconnect.
    Close,
}

#[derive(Debug, Clone)]
pub enum MockConnection {
    Frames {
        frames: Vec<String>,
        after: AfterFrames,
    },
    Refuse(String),
}

impl MockConnection {
    pub fn hold(frames: Vec<String>) -> Self {
        Self::Frames {
            frames,
            after: AfterFrames::Hold,
        }
    }

    pub fn close_after(frames: Vec<String>) -> Self {
        Self::Frames {
            frames,
            after: AfterFrames::Close,
        }
    }
}

/// Scripted `StreamTransport`. Every `open` consumes the next scripted
/// connection; once the script runs out, connections are held open and silent.
#[derive(Clone, Default)]
pub struct MockTransport {
    connections: Arc<Mutex<VecDeque<MockConnection>>>,
    opened: Arc<Mutex<Vec<Url>>>,
}

impl MockTransport {
    pub fn new(connections: Vec<MockConnection>) -> Self {
        Self {
            connections: Arc::new(Mutex::new(connections.into())),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs passed to `open`, in order.
    pub fn opened_urls(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn open(&self, url: &Url) -> Result<FrameStream, ClientError> {
        self.opened.lock().unwrap().push(url.clone());
        let next = self.connections.lock().unwrap().pop_front();
        match next {
            Some(MockConnection::Refuse(message)) => Err(ClientError::Transport {
                url: url.to_string(),
                message,
            }),
            Some(MockConnection::Frames { frames, after }) => {
                let frames = stream::iter(
                    frames
                        .into_iter()
                        .map(|frame| FrameResult::Ok(Bytes::from(frame))),
                );
                match after {
                    AfterFrames::Hold => {
                        Ok(Box::pin(frames.chain(stream::pending::<FrameResult>())))
                    }
                    AfterFrames::Close => Ok(Box::pin(frames)),
                }
            }
            None => Ok(Box::pin(stream::pending::<FrameResult>())),
        }
    }
}
