use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::error::ClientError;
use crate::types::{
    CancelRunResponse, ChatRequest, ExecutePlanResponse, PlanDraftResponse, PlanExecuteRequest,
    StartStreamResponse, SyncRunResponse,
};
use crate::util::is_local_endpoint_url;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

const START_STREAM_PATH: &str = "/api/chat/stream";
const START_SYNC_PATH: &str = "/api/chat";
const START_PLAN_PATH: &str = "/api/chat/plan";
const EXECUTE_PLAN_PATH: &str = "/api/chat/plan/execute";

/// The REST calls that originate and control a run.
#[async_trait]
pub trait RunApi: Send + Sync {
    async fn start_stream(&self, request: &ChatRequest)
        -> Result<StartStreamResponse, ClientError>;

    async fn start_sync(&self, request: &ChatRequest) -> Result<SyncRunResponse, ClientError>;

    async fn start_plan(&self, request: &ChatRequest) -> Result<PlanDraftResponse, ClientError>;

    async fn execute_plan(
        &self,
        request: &PlanExecuteRequest,
    ) -> Result<ExecutePlanResponse, ClientError>;

    async fn cancel_run(&self, run_id: &str) -> Result<CancelRunResponse, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }

    fn request_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request_url = self.request_url(path);
        let mut request = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .json(body);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, body);
        }

        if let Some(api_key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {api_key}"));
        }

        debug!(url = %request_url, "boundary call");
        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: request_url,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))
    }
}

#[async_trait]
impl RunApi for ApiClient {
    async fn start_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<StartStreamResponse, ClientError> {
        self.post_json(START_STREAM_PATH, request).await
    }

    async fn start_sync(&self, request: &ChatRequest) -> Result<SyncRunResponse, ClientError> {
        self.post_json(START_SYNC_PATH, request).await
    }

    async fn start_plan(&self, request: &ChatRequest) -> Result<PlanDraftResponse, ClientError> {
        self.post_json(START_PLAN_PATH, request).await
    }

    async fn execute_plan(
        &self,
        request: &PlanExecuteRequest,
    ) -> Result<ExecutePlanResponse, ClientError> {
        self.post_json(EXECUTE_PLAN_PATH, request).await
    }

    async fn cancel_run(&self, run_id: &str) -> Result<CancelRunResponse, ClientError> {
        self.post_json(&cancel_path(run_id), &serde_json::json!({}))
            .await
    }
}

fn cancel_path(run_id: &str) -> String {
    let encoded: String = reqwest::Url::parse("http://placeholder/")
        .ok()
        .and_then(|mut url| {
            url.path_segments_mut().ok()?.push(run_id);
            Some(url.path().trim_start_matches('/').to_string())
        })
        .unwrap_or_else(|| run_id.to_string());
    format!("/api/chat/runs/{encoded}/cancel")
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> ClientError {
    let url = request_url.to_string();
    let message = error.to_string();
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return ClientError::LocalConnect { url, message };
    }
    if error.is_connect() {
        return ClientError::Connect { url, message };
    }
    if error.is_timeout() {
        return ClientError::Timeout { url, message };
    }
    if let Some(status) = error.status() {
        return ClientError::Status {
            url,
            status: status.as_u16(),
        };
    }
    ClientError::Request { url, message }
}
