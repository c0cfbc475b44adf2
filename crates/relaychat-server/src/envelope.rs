use prost_types::Timestamp;
use relaychat_proto::chat::v1 as pb;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Reserved sender name for join/leave notices.
pub const SYSTEM_SENDER: &str = "system";

pub fn timestamp_now() -> Timestamp {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Timestamp {
        seconds: now.as_secs() as i64,
        nanos: now.subsec_nanos() as i32,
    }
}

/// Stamp a chat message with a fresh id and the current time.
pub fn user_envelope(sender: &str, message: String) -> pb::Envelope {
    pb::Envelope {
        id: Uuid::new_v4().to_string(),
        message,
        sender: sender.to_string(),
        sent_at: Some(timestamp_now()),
    }
}

pub fn system_envelope(message: String) -> pb::Envelope {
    user_envelope(SYSTEM_SENDER, message)
}
