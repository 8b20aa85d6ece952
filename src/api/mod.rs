pub mod client;
pub mod logging;
pub mod mock_client;
pub mod stream;
pub mod transport;

pub use client::{ApiClient, RunApi};
pub use stream::{decode_event, DecodeError, EventDecoder};
pub use transport::{FrameStream, StreamTransport, WebSocketTransport};
