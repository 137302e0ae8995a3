use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a chat room (`"general"`, `"alerts"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic per-session message token. Later appends always get larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Online,
    Away,
    Offline,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Presence::Online => "online",
            Presence::Away => "away",
            Presence::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// A known chat identity other than the local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: String,
    #[serde(default)]
    pub status: Presence,
    /// Rooms this participant tends to post in. Empty means "anywhere".
    #[serde(default)]
    pub favorite_rooms: Vec<RoomId>,
}

impl Participant {
    pub fn snapshot(&self) -> AuthorSnapshot {
        AuthorSnapshot {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// The local user, as handed over by the identity provider at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: String,
    #[serde(default)]
    pub is_premium: bool,
}

impl SelfIdentity {
    pub fn snapshot(&self) -> AuthorSnapshot {
        AuthorSnapshot {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Author details frozen at the moment a message was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Whether `self -> next` is a legal single step of the delivery lifecycle.
    ///
    /// Forward moves go one stage at a time along `sending -> sent -> delivered -> read`.
    /// `failed` is reachable from any stage before `read` and is terminal, as is `read`.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Sending, Sent)
                | (Sent, Delivered)
                | (Delivered, Read)
                | (Sending, Failed)
                | (Sent, Failed)
                | (Delivered, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A chat message. Everything but `status` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author: AuthorSnapshot,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub status: DeliveryStatus,
}

impl Message {
    pub fn author_id(&self) -> ParticipantId {
        self.author.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus::*;

    #[test]
    fn lifecycle_moves_one_stage_at_a_time() {
        assert!(Sending.can_advance_to(Sent));
        assert!(Sent.can_advance_to(Delivered));
        assert!(Delivered.can_advance_to(Read));

        assert!(!Sending.can_advance_to(Read));
        assert!(!Sending.can_advance_to(Delivered));
        assert!(!Sent.can_advance_to(Read));
    }

    #[test]
    fn lifecycle_never_moves_backward() {
        assert!(!Sent.can_advance_to(Sending));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Delivered.can_advance_to(Delivered));
    }

    #[test]
    fn failure_allowed_only_before_read() {
        assert!(Sending.can_advance_to(Failed));
        assert!(Sent.can_advance_to(Failed));
        assert!(Delivered.can_advance_to(Failed));
        assert!(!Read.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Sending));
        assert!(Failed.is_terminal() && Read.is_terminal());
    }
}
