use super::stream::DecodeError;
use crate::util::parse_bool_flag;
use serde::Serialize;
use tracing::{debug, warn};

const DEBUG_PAYLOAD_ENV: &str = "RUNSTREAM_DEBUG_PAYLOAD";
const MAX_LOGGED_FRAME_BYTES: usize = 2048;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload<T: Serialize + ?Sized>(request_url: &str, payload: &T) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    debug!(target: "runstream::api", url = %request_url, "request payload:\n{formatted_payload}");
}

pub fn emit_decode_error(frame: &[u8], error: &DecodeError) {
    warn!(target: "runstream::stream", %error, "dropping malformed stream message");
    debug!(
        target: "runstream::stream",
        "malformed message:\n{}",
        truncate_frame(frame)
    );
}

fn truncate_frame(frame: &[u8]) -> String {
    let text = String::from_utf8_lossy(frame);
    if text.len() <= MAX_LOGGED_FRAME_BYTES {
        return text.into_owned();
    }
    let mut end = MAX_LOGGED_FRAME_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes)", &text[..end], frame.len())
}
