use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::common::{
    AuthorSnapshot, ChatError, ChatResult, DeliveryStatus, Message, MessageId, MessageKind, RoomId,
};

/// Longest message body accepted, counted in characters after trimming.
pub const MAX_CONTENT_CHARS: usize = 500;

/// Trim `content` and check it against the composer limits.
pub fn normalize_content(content: &str) -> ChatResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyContent);
    }
    let len = trimmed.chars().count();
    if len > MAX_CONTENT_CHARS {
        return Err(ChatError::ContentTooLong {
            len,
            max: MAX_CONTENT_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Append-only per-room message log. Owns every message and its delivery status.
///
/// Each room's log is kept sorted by `(created_at, id)`. Live appends take a
/// timestamp no earlier than the room's newest message, so they always land at
/// the tail and never move anything already rendered.
#[derive(Debug, Default)]
pub struct MessageStore {
    rooms: HashMap<RoomId, Vec<Message>>,
    locations: HashMap<MessageId, RoomId>,
    next_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistic insert of a locally authored message, starting at `sending`.
    pub fn append_self(
        &mut self,
        room: &RoomId,
        author: AuthorSnapshot,
        content: &str,
    ) -> ChatResult<Message> {
        let content = normalize_content(content)?;
        Ok(self.push(room, author, content, MessageKind::Text, DeliveryStatus::Sending))
    }

    /// Message received from someone else. It has no local send lifecycle and
    /// enters directly at `delivered`.
    pub fn append_inbound(
        &mut self,
        room: &RoomId,
        author: AuthorSnapshot,
        content: &str,
        kind: MessageKind,
    ) -> ChatResult<Message> {
        let content = normalize_content(content)?;
        Ok(self.push(room, author, content, kind, DeliveryStatus::Delivered))
    }

    /// Backfill an older message at its sorted position.
    pub fn import_history(
        &mut self,
        room: &RoomId,
        author: AuthorSnapshot,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> ChatResult<Message> {
        let content = normalize_content(content)?;
        let message = Message {
            id: self.allocate_id(),
            room_id: room.clone(),
            author,
            content,
            created_at,
            kind: MessageKind::Text,
            status: DeliveryStatus::Delivered,
        };

        let log = self.rooms.entry(room.clone()).or_default();
        let at = log.partition_point(|m| (m.created_at, m.id) <= (created_at, message.id));
        log.insert(at, message.clone());
        self.locations.insert(message.id, room.clone());
        Ok(message)
    }

    /// Move a message one step along its delivery lifecycle.
    ///
    /// Returns the previous status. Illegal steps and unknown ids leave the
    /// store untouched.
    pub fn advance_status(
        &mut self,
        id: MessageId,
        next: DeliveryStatus,
    ) -> ChatResult<DeliveryStatus> {
        let message = self.get_mut(id).ok_or(ChatError::UnknownMessage(id))?;
        let current = message.status;
        if !current.can_advance_to(next) {
            return Err(ChatError::InvalidTransition {
                id,
                from: current,
                to: next,
            });
        }
        message.status = next;
        Ok(current)
    }

    pub fn messages_for_room(&self, room: &RoomId) -> &[Message] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        let room = self.locations.get(&id)?;
        self.rooms.get(room)?.iter().rev().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    fn push(
        &mut self,
        room: &RoomId,
        author: AuthorSnapshot,
        content: String,
        kind: MessageKind,
        status: DeliveryStatus,
    ) -> Message {
        let id = self.allocate_id();
        let log = self.rooms.entry(room.clone()).or_default();
        let now = Utc::now();
        let created_at = match log.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let message = Message {
            id,
            room_id: room.clone(),
            author,
            content,
            created_at,
            kind,
            status,
        };
        log.push(message.clone());
        self.locations.insert(id, room.clone());
        message
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let room = self.locations.get(&id)?;
        self.rooms.get_mut(room)?.iter_mut().rev().find(|m| m.id == id)
    }

    fn allocate_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId(self.next_id)
    }
}
