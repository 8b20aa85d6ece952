use super::backoff::ReconnectBackoff;
use crate::api::{EventDecoder, RunApi, StreamTransport, WebSocketTransport};
use crate::config::Config;
use crate::error::ClientError;
use crate::types::RunEvent;
use crate::util::stream_url_for_run;
use futures::StreamExt;
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a live connection reports to the reducer loop. Every variant carries
/// the run id it belongs to so stale deliveries can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened {
        run_id: String,
    },
    Event {
        run_id: String,
        id: Option<u64>,
        event: RunEvent,
    },
    /// The connection went away unexpectedly; another attempt follows after
    /// `retry_in` unless the connection is closed first.
    Dropped {
        run_id: String,
        attempt: u32,
        retry_in: Duration,
        reason: String,
    },
}

impl ConnectionEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::Opened { run_id } | Self::Event { run_id, .. } | Self::Dropped { run_id, .. } => {
                run_id
            }
        }
    }
}

#[derive(Debug)]
pub enum CancelOutcome {
    Cancelled { message: String },
    /// The server answered with a status other than `success`.
    Rejected { message: String },
    Failed(ClientError),
    /// `run_id` is not the connected run.
    NotActive,
}

struct LiveConnection {
    run_id: String,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single live stream connection and the resume watermark.
pub struct ConnectionManager {
    transport: Arc<dyn StreamTransport>,
    api: Arc<dyn RunApi>,
    stream_url: Url,
    backoff: ReconnectBackoff,
    watermark: Arc<AtomicU64>,
    last_run_id: Option<String>,
    live: Option<LiveConnection>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        api: Arc<dyn RunApi>,
        stream_url: Url,
        backoff: ReconnectBackoff,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            api,
            stream_url,
            backoff,
            watermark: Arc::new(AtomicU64::new(0)),
            last_run_id: None,
            live: None,
            events_tx,
            events_rx,
        }
    }

    /// WebSocket transport against the configured stream endpoint.
    pub fn from_config(config: &Config, api: Arc<dyn RunApi>) -> Result<Self, ClientError> {
        let stream_url =
            Url::parse(config.stream_url.trim()).map_err(|error| ClientError::InvalidUrl {
                url: config.stream_url.clone(),
                message: error.to_string(),
            })?;
        Ok(Self::new(
            Arc::new(WebSocketTransport),
            api,
            stream_url,
            config.reconnect_backoff(),
        ))
    }

    /// Run id of the live connection, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.run_id.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Highest event id decoded for the current run.
    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::SeqCst)
    }

    pub fn backoff(&self) -> ReconnectBackoff {
        self.backoff
    }

    /// Opens a connection for `run_id`, replacing any live one. Event ids are
    /// per run, so a different run starts from zero.
    pub fn connect(&mut self, run_id: &str) {
        self.close();
        if self.last_run_id.as_deref() != Some(run_id) {
            self.watermark.store(0, Ordering::SeqCst);
            self.last_run_id = Some(run_id.to_string());
        }

        let shutdown = CancellationToken::new();
        let task = ConnectionTask {
            transport: Arc::clone(&self.transport),
            stream_url: self.stream_url.clone(),
            run_id: run_id.to_string(),
            backoff: self.backoff,
            watermark: Arc::clone(&self.watermark),
            events_tx: self.events_tx.clone(),
            shutdown: shutdown.clone(),
        };
        info!(run_id, since = self.watermark(), "connecting to run stream");
        let handle = tokio::spawn(task.run());
        self.live = Some(LiveConnection {
            run_id: run_id.to_string(),
            shutdown,
            handle,
        });
    }

    /// Tears down the live connection and any scheduled reconnect.
    pub fn close(&mut self) {
        if let Some(live) = self.live.take() {
            debug!(run_id = %live.run_id, "closing run stream");
            live.shutdown.cancel();
            live.handle.abort();
        }
    }

    /// Asks the server to cancel `run_id`. A successful cancel closes the
    /// connection right away.
    pub async fn cancel(&mut self, run_id: &str) -> CancelOutcome {
        if self.run_id() != Some(run_id) {
            return CancelOutcome::NotActive;
        }

        match self.api.cancel_run(run_id).await {
            Ok(response) if response.is_success() => {
                self.close();
                CancelOutcome::Cancelled {
                    message: response.message.unwrap_or_default(),
                }
            }
            Ok(response) => CancelOutcome::Rejected {
                message: response.message.unwrap_or(response.status),
            },
            Err(error) => CancelOutcome::Failed(error),
        }
    }

    /// Next inbound event, in arrival order.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.try_recv().ok()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

struct ConnectionTask {
    transport: Arc<dyn StreamTransport>,
    stream_url: Url,
    run_id: String,
    backoff: ReconnectBackoff,
    watermark: Arc<AtomicU64>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    shutdown: CancellationToken,
}

impl ConnectionTask {
    async fn run(self) {
        let mut decoder = EventDecoder::new();
        let mut attempt: u32 = 0;

        loop {
            let url = stream_url_for_run(
                &self.stream_url,
                &self.run_id,
                self.watermark.load(Ordering::SeqCst),
            );
            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                opened = self.transport.open(&url) => opened,
            };

            let reason = match opened {
                Ok(mut frames) => {
                    attempt = 0;
                    if !self.emit(ConnectionEvent::Opened {
                        run_id: self.run_id.clone(),
                    }) {
                        return;
                    }
                    loop {
                        let frame = tokio::select! {
                            _ = self.shutdown.cancelled() => return,
                            frame = frames.next() => frame,
                        };
                        match frame {
                            Some(Ok(bytes)) => {
                                let Some(decoded) = decoder.process(&bytes) else {
                                    continue;
                                };
                                if let Some(id) = decoded.id {
                                    self.watermark.fetch_max(id, Ordering::SeqCst);
                                }
                                if !self.emit(ConnectionEvent::Event {
                                    run_id: self.run_id.clone(),
                                    id: decoded.id,
                                    event: decoded.event,
                                }) {
                                    return;
                                }
                            }
                            Some(Err(error)) => break error.to_string(),
                            None => break "connection closed by server".to_string(),
                        }
                    }
                }
                Err(error) => error.to_string(),
            };

            let retry_in = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!(
                run_id = %self.run_id,
                attempt,
                retry_in_ms = retry_in.as_millis() as u64,
                reason = %reason,
                "run stream dropped"
            );
            if !self.emit(ConnectionEvent::Dropped {
                run_id: self.run_id.clone(),
                attempt,
                retry_in,
                reason,
            }) {
                return;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(retry_in) => {}
            }
        }
    }

    /// Returns false once nobody is listening.
    fn emit(&self, event: ConnectionEvent) -> bool {
        self.events_tx.send(event).is_ok()
    }
}
