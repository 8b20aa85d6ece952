use crate::error::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, Stream, StreamExt};
use reqwest::Url;
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Inbound frames of one live stream connection. The stream ending means the
/// connection closed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<FrameStream, ClientError>;
}

/// Server-push WebSocket transport. Text and binary frames are forwarded as-is;
/// control frames are handled by tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<FrameStream, ClientError> {
        let request_url = url.to_string();
        let (socket, response) = tokio_tungstenite::connect_async(request_url.as_str())
            .await
            .map_err(|error| ClientError::Transport {
                url: request_url.clone(),
                message: error.to_string(),
            })?;
        debug!(url = %request_url, status = %response.status(), "stream connection established");

        let frames = socket
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(move |message| {
                let frame = match message {
                    Ok(Message::Text(text)) => Some(Ok(Bytes::from(text))),
                    Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                    Ok(_) => None,
                    Err(error) => Some(Err(ClientError::Transport {
                        url: request_url.clone(),
                        message: error.to_string(),
                    })),
                };
                future::ready(frame)
            });
        Ok(Box::pin(frames))
    }
}
