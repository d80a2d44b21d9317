use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::{ChatMessage, Comment};

/// The closed set of actions a client may send over the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    ChatMessage,
    LikeChatMessage,
    Comment,
    LikeComment,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ChatMessage => "chatmessage",
            ActionKind::LikeChatMessage => "like_chatmessage",
            ActionKind::Comment => "comment",
            ActionKind::LikeComment => "like_comment",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "chatmessage" => Some(ActionKind::ChatMessage),
            "like_chatmessage" => Some(ActionKind::LikeChatMessage),
            "comment" => Some(ActionKind::Comment),
            "like_comment" => Some(ActionKind::LikeComment),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inbound envelope, before the payload is checked against its action.
#[derive(Deserialize, Debug)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Comment payload as sent by clients. Any user or club id in it is ignored.
#[derive(Deserialize, Debug)]
pub struct CommentPayload {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub page_no: i32,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Validated comment content.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub message: String,
    pub page_no: i32,
    pub parent_id: Option<Uuid>,
}

/// A decoded and validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ChatMessage(String),
    LikeChatMessage(Uuid),
    Comment(NewComment),
    LikeComment(Uuid),
}

impl Frame {
    pub fn action(&self) -> ActionKind {
        match self {
            Frame::ChatMessage(_) => ActionKind::ChatMessage,
            Frame::LikeChatMessage(_) => ActionKind::LikeChatMessage,
            Frame::Comment(_) => ActionKind::Comment,
            Frame::LikeComment(_) => ActionKind::LikeComment,
        }
    }
}

/// Canonical event published to every session watching a club.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action")]
pub enum Broadcast {
    #[serde(rename = "chatmessage")]
    ChatMessage { user_id: Uuid, data: ChatMessage },
    #[serde(rename = "like_chatmessage")]
    LikeChatMessage { user_id: Uuid, chatmessage_id: Uuid },
    #[serde(rename = "comment")]
    Comment { user_id: Uuid, data: Comment },
    #[serde(rename = "like_comment")]
    LikeComment { user_id: Uuid, comment_id: Uuid },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorReply {
    pub message: String,
}

/// Messages sent to a single session only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action")]
pub enum ReplyMessage {
    #[serde(rename = "error")]
    Error(ErrorReply),
}
