//! Messaging models shared across HamroKotha services.
//!
//! A conversation is a two-party thread (a chat room or a listing inquiry),
//! and a message belongs to exactly one conversation. Read state only moves
//! forward: once a message is read it stays read.

pub mod inquiry;

pub use inquiry::InquiryStatus;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                Uuid::from_slice(bytes).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Account identifier handed over by the session layer.
    UserId
);
uuid_id!(
    /// Identifier of a rental listing.
    PropertyId
);
uuid_id!(
    /// Unique identifier assigned to a conversation.
    ConversationId
);
uuid_id!(MessageId);

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Orders a participant pair so `(a, b)` and `(b, a)` map to the same value.
pub fn participant_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Trims a message body, rejecting blank input.
pub fn validate_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(MessagingError::EmptyBody);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Chat,
    Inquiry,
}

impl ConversationKind {
    /// Stable one-byte tag used when keying conversations by kind.
    pub fn tag(&self) -> u8 {
        match self {
            ConversationKind::Chat => b'c',
            ConversationKind::Inquiry => b'i',
        }
    }
}

/// A two-party thread. For inquiries `participant_a` is the tenant and
/// `participant_b` the listing owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub property_id: Option<PropertyId>,
    pub created_ms: i64,
    pub updated_ms: i64,
    pub last_message_ms: Option<i64>,
    /// Number of messages appended so far; doubles as the next message's sequence number.
    pub message_count: u64,
    pub inquiry_status: Option<InquiryStatus>,
}

impl Conversation {
    pub fn new(
        kind: ConversationKind,
        participant_a: UserId,
        participant_b: UserId,
        property_id: Option<PropertyId>,
    ) -> Self {
        let now = now_ms();
        let inquiry_status = match kind {
            ConversationKind::Inquiry => Some(InquiryStatus::Pending),
            ConversationKind::Chat => None,
        };
        Self {
            id: ConversationId::new(),
            kind,
            participant_a,
            participant_b,
            property_id,
            created_ms: now,
            updated_ms: now,
            last_message_ms: None,
            message_count: 0,
            inquiry_status,
        }
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        user == self.participant_a || user == self.participant_b
    }

    /// The other side of the thread, or `None` when `user` is not part of it.
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        if user == self.participant_a {
            Some(self.participant_b)
        } else if user == self.participant_b {
            Some(self.participant_a)
        } else {
            None
        }
    }

    /// Fills in the listing context if none is set yet. An existing link is never replaced.
    pub fn attach_property(&mut self, property_id: PropertyId) -> bool {
        if self.property_id.is_some() {
            return false;
        }
        self.property_id = Some(property_id);
        self.updated_ms = self.updated_ms.max(now_ms());
        true
    }

    /// Advances activity for a message sent by `sender` at `created_ms`.
    /// Returns the sequence number assigned to that message.
    pub fn record_message(&mut self, sender: UserId, created_ms: i64) -> u64 {
        let sequence = self.message_count;
        self.message_count += 1;
        self.last_message_ms = Some(self.last_message_ms.unwrap_or(created_ms).max(created_ms));
        self.updated_ms = self.updated_ms.max(created_ms);
        if let Some(status) = self.inquiry_status {
            self.inquiry_status = Some(status.after_message(sender == self.participant_b));
        }
        sequence
    }

    /// Latest message time, falling back to the last update.
    pub fn activity_ms(&self) -> i64 {
        self.last_message_ms.unwrap_or(self.updated_ms)
    }

    /// Owner-only close of an inquiry thread.
    pub fn close_inquiry(&mut self, by: UserId) -> Result<InquiryStatus> {
        let status = self.inquiry_status.ok_or(MessagingError::NotInquiry)?;
        if by != self.participant_b {
            return Err(MessagingError::NotOwner);
        }
        let next = status.close()?;
        self.inquiry_status = Some(next);
        self.updated_ms = self.updated_ms.max(now_ms());
        Ok(next)
    }

    /// Either party may reopen a closed inquiry.
    pub fn reopen_inquiry(&mut self, by: UserId) -> Result<InquiryStatus> {
        let status = self.inquiry_status.ok_or(MessagingError::NotInquiry)?;
        if !self.is_participant(by) {
            return Err(MessagingError::NotParticipant);
        }
        let next = status.reopen()?;
        self.inquiry_status = Some(next);
        self.updated_ms = self.updated_ms.max(now_ms());
        Ok(next)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub body: String,
    pub created_ms: i64,
    pub is_read: bool,
    pub read_ms: Option<i64>,
}

impl Message {
    /// Builds an unread message. Blank bodies are rejected.
    pub fn new(conversation_id: ConversationId, sender: UserId, body: &str) -> Result<Self> {
        let body = validate_body(body)?;
        Ok(Self {
            id: MessageId::new(),
            conversation_id,
            sender,
            body,
            created_ms: now_ms(),
            is_read: false,
            read_ms: None,
        })
    }

    /// Flips the read flag once. Returns whether anything changed.
    pub fn mark_read(&mut self, now_ms: i64) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_ms = Some(now_ms);
        true
    }

    pub fn is_unread_for(&self, user: UserId) -> bool {
        !self.is_read && self.sender != user
    }
}

/// Messaging-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    #[error("message cannot be empty")]
    EmptyBody,
    #[error("user is not a participant of this conversation")]
    NotParticipant,
    #[error("only the listing owner can do that")]
    NotOwner,
    #[error("conversation is not an inquiry")]
    NotInquiry,
    #[error("inquiry cannot move from {from} to {to}")]
    InvalidTransition {
        from: InquiryStatus,
        to: InquiryStatus,
    },
}

pub type Result<T> = std::result::Result<T, MessagingError>;
