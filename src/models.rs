use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pager::Cursor;

/// Label used wherever a participant could not be resolved.
pub const UNKNOWN_PARTICIPANT: &str = "unknown participant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Message body. Every kind the dashboard understands is a variant here;
/// anything else the remote sends is kept as `Unsupported` with its wire kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text { text: String },
    Image { image_url: String },
    Unsupported { kind: String },
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Wire `type` tag for this payload.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Unsupported { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
    pub participant_id: String,
    pub payload: MessagePayload,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub integration: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participant_id: Option<String>,
    pub participant_name: Option<String>,
    /// Sorted ascending by `created_at`, unique by id.
    pub messages: Vec<Message>,
    /// `None` until the first message page of this conversation was fetched.
    pub message_cursor: Option<Cursor>,
    /// Size of the newest message page seen by the last poll.
    pub latest_page_len: usize,
}

impl Conversation {
    pub fn new(
        id: impl Into<String>,
        integration: impl Into<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            integration: integration.into(),
            created_at,
            updated_at,
            participant_id: None,
            participant_name: None,
            messages: Vec::new(),
            message_cursor: None,
            latest_page_len: 0,
        }
    }

    /// Most recent incoming message, scanning from the newest backwards.
    pub fn latest_incoming(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.direction == Direction::Incoming)
    }

    /// Participant id of the bot, learned from any outgoing message.
    pub fn bot_user_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.direction == Direction::Outgoing)
            .map(|m| m.participant_id.as_str())
    }

    pub fn has_older_messages(&self) -> bool {
        self.message_cursor.as_ref().map_or(true, Cursor::has_more)
    }

    pub fn display_name(&self) -> &str {
        self.participant_name.as_deref().unwrap_or(UNKNOWN_PARTICIPANT)
    }
}

/// The human counterpart of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub about: Option<String>,
}
