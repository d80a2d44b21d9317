//! Wire codec for the relay: inbound envelopes are decoded into typed,
//! pre-validated [`Frame`]s and broadcasts are encoded back to JSON text.
//! No I/O happens here.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActionKind, Broadcast, CommentPayload, ErrorReply, Frame, InboundEnvelope, NewComment,
    ReplyMessage,
};

/// Longest chat message accepted, in characters.
pub const MAX_CHAT_MESSAGE_LEN: usize = 150;

/// Recoverable protocol failures. The display text is what the sender sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON frame")]
    MalformedFrame,
    #[error("Missing action")]
    MissingAction,
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("{0}")]
    InvalidPayload(&'static str),
}

/// Collapse a raw client frame onto a single line.
pub fn normalize(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

/// Decode and validate one inbound frame.
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let envelope: InboundEnvelope =
        serde_json::from_slice(bytes).map_err(|_| ProtocolError::MalformedFrame)?;

    let action = match envelope.action.as_deref() {
        None | Some("") => return Err(ProtocolError::MissingAction),
        Some(action) => action,
    };
    let kind = ActionKind::parse(action)
        .ok_or_else(|| ProtocolError::UnknownAction(action.to_string()))?;

    match kind {
        ActionKind::ChatMessage => decode_chat_message(envelope.data),
        ActionKind::LikeChatMessage => decode_id(&envelope.data)
            .map(Frame::LikeChatMessage)
            .ok_or(ProtocolError::InvalidPayload("Invalid chat message id")),
        ActionKind::LikeComment => decode_id(&envelope.data)
            .map(Frame::LikeComment)
            .ok_or(ProtocolError::InvalidPayload("Invalid comment id")),
        ActionKind::Comment => decode_comment(envelope.data),
    }
}

fn decode_chat_message(data: serde_json::Value) -> Result<Frame, ProtocolError> {
    match data {
        serde_json::Value::String(text) if text.chars().count() <= MAX_CHAT_MESSAGE_LEN => {
            Ok(Frame::ChatMessage(text))
        }
        _ => Err(ProtocolError::InvalidPayload(
            "Chat message must be a string of at most 150 characters",
        )),
    }
}

fn decode_id(data: &serde_json::Value) -> Option<Uuid> {
    data.as_str().and_then(|id| Uuid::parse_str(id.trim()).ok())
}

fn decode_comment(data: serde_json::Value) -> Result<Frame, ProtocolError> {
    const INVALID: ProtocolError = ProtocolError::InvalidPayload(
        "Comment must have a non-empty message and a non-zero page_no",
    );

    let payload: CommentPayload = serde_json::from_value(data).map_err(|_| INVALID)?;
    if payload.message.trim().is_empty() || payload.page_no == 0 {
        return Err(INVALID);
    }

    let parent_id = match payload.parent_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(id) => Some(
            Uuid::parse_str(id)
                .map_err(|_| ProtocolError::InvalidPayload("Invalid comment parent_id"))?,
        ),
    };

    Ok(Frame::Comment(NewComment {
        message: payload.message,
        page_no: payload.page_no,
        parent_id,
    }))
}

/// Encode a broadcast exactly as every subscriber receives it.
pub fn encode(broadcast: &Broadcast) -> Result<String, serde_json::Error> {
    serde_json::to_string(broadcast)
}

/// Encode the error frame sent back to the originating session only.
pub fn encode_error(message: &str) -> String {
    let reply = ReplyMessage::Error(ErrorReply {
        message: message.to_string(),
    });
    serde_json::to_string(&reply)
        .unwrap_or_else(|_| r#"{"action":"error","message":"Something went wrong"}"#.to_string())
}
