use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::Instant;

use crate::chat::{MessageStore, PresenceRegistry, RoomDirectory, TypingCoordinator, UnreadTracker};
use crate::common::{
    ChatError, ChatResult, ConnectionState, DeliveryStatus, Message, MessageId, MessageKind,
    Participant, ParticipantId, Presence, RoomId, SelfIdentity, SessionEvent,
};
use crate::config::{ChatConfig, TypingConfig};
use crate::network::{InboundSink, Roster};

/// All chat state of one session, with no timers attached.
///
/// This is the only place that knows who "self" is and which room is focused;
/// the stores underneath take participant and room ids explicitly.
pub(crate) struct SessionCore {
    identity: SelfIdentity,
    rooms: RoomDirectory,
    presence: PresenceRegistry,
    store: MessageStore,
    typing: TypingCoordinator,
    unread: UnreadTracker,
    focused: RoomId,
    connection: ConnectionState,
    typing_config: TypingConfig,
    events: Vec<SessionEvent>,
}

impl SessionCore {
    pub(crate) fn new(config: &ChatConfig) -> ChatResult<Self> {
        let identity = config.identity.clone();
        let rooms = RoomDirectory::new(config.rooms.iter().cloned());
        let presence = PresenceRegistry::new(config.participants.iter().filter(|p| {
            let is_self = p.id == identity.id;
            if is_self {
                log::warn!("Participant {} shares the local user's id; ignored", p.id);
            }
            !is_self
        }).cloned());

        let focused = if rooms.contains(&config.initial_room) {
            config.initial_room.clone()
        } else {
            let fallback = rooms
                .ids()
                .next()
                .cloned()
                .ok_or_else(|| ChatError::UnknownRoom(config.initial_room.clone()))?;
            log::warn!(
                "Initial room `{}` is not configured; focusing `{fallback}`",
                config.initial_room
            );
            fallback
        };

        let mut unread = UnreadTracker::new();
        unread.on_room_focused(&focused);

        let mut core = Self {
            identity,
            rooms,
            presence,
            store: MessageStore::new(),
            typing: TypingCoordinator::new(),
            unread,
            focused,
            connection: ConnectionState::Connecting,
            typing_config: config.typing,
            events: Vec::new(),
        };
        core.import_history(config);
        Ok(core)
    }

    fn import_history(&mut self, config: &ChatConfig) {
        let now = Utc::now();
        for entry in &config.history {
            if !self.rooms.contains(&entry.room) {
                log::warn!("History entry for unknown room `{}` skipped", entry.room);
                continue;
            }
            let Some(author) = self.presence.get(entry.author).map(Participant::snapshot) else {
                log::warn!("History entry by unknown participant {} skipped", entry.author);
                continue;
            };
            let Some(created_at) = i64::try_from(entry.age_secs)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .and_then(|age| now.checked_sub_signed(age))
            else {
                log::warn!(
                    "History entry in `{}` is {}s old, out of range; skipped",
                    entry.room,
                    entry.age_secs
                );
                continue;
            };
            if let Err(err) = self
                .store
                .import_history(&entry.room, author, &entry.content, created_at)
            {
                log::warn!("History entry in `{}` skipped: {err}", entry.room);
            }
        }
    }

    pub(crate) fn mark_connected(&mut self) {
        if self.connection == ConnectionState::Connected {
            return;
        }
        self.connection = ConnectionState::Connected;
        log::info!("Connected as {} ({})", self.identity.name, self.identity.id);
        self.events.push(SessionEvent::Connected);
    }

    pub(crate) fn append_self(&mut self, room: &RoomId, content: &str) -> ChatResult<Message> {
        if self.connection != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        self.require_room(room)?;
        let message = self
            .store
            .append_self(room, self.identity.snapshot(), content)?;
        let is_focused = &self.focused == room;
        self.unread.on_message_arrived(room, true, is_focused);
        self.events.push(SessionEvent::MessageAppended(message.clone()));
        Ok(message)
    }

    pub(crate) fn advance(&mut self, id: MessageId, status: DeliveryStatus) -> ChatResult<()> {
        self.store.advance_status(id, status)?;
        if let Some(message) = self.store.get(id) {
            self.events.push(SessionEvent::StatusChanged {
                id,
                room: message.room_id.clone(),
                status,
            });
        }
        Ok(())
    }

    pub(crate) fn focus(&mut self, room: &RoomId) -> ChatResult<()> {
        if !self.rooms.contains(room) {
            return Err(ChatError::UnknownRoom(room.clone()));
        }
        let cleared = self.unread.on_room_focused(room);
        if &self.focused != room {
            self.focused = room.clone();
            log::debug!("Focused room `{room}`");
            self.events.push(SessionEvent::FocusChanged(room.clone()));
        }
        if cleared > 0 {
            self.events.push(SessionEvent::UnreadChanged {
                room: room.clone(),
                count: 0,
            });
        }
        Ok(())
    }

    pub(crate) fn update_profile(
        &mut self,
        participant: ParticipantId,
        name: &str,
        avatar: &str,
    ) -> ChatResult<()> {
        self.presence.update_profile(participant, name, avatar)
    }

    pub(crate) fn start_self_typing(&mut self, now: Instant) {
        let room = self.focused.clone();
        if self
            .typing
            .start(&room, self.identity.id, self.typing_config.debounce(), now)
        {
            log::debug!("{} started typing in `{room}`", self.identity.name);
        }
    }

    pub(crate) fn stop_self_typing(&mut self, now: Instant) {
        let room = self.focused.clone();
        if self.typing.stop(&room, self.identity.id, now) {
            log::debug!("{} stopped typing in `{room}`", self.identity.name);
        }
    }

    pub(crate) fn sweep_typing(&mut self, now: Instant) {
        for room in self.typing.sweep(now, Some(self.identity.id)) {
            self.push_typing_changed(&room, now);
        }
    }

    pub(crate) fn next_typing_expiry(&self) -> Option<Instant> {
        self.typing.next_expiry()
    }

    pub(crate) fn roster(&self) -> Roster {
        Roster {
            rooms: self.rooms.ids().cloned().collect(),
            online: self.presence.online_except(self.identity.id).cloned().collect(),
        }
    }

    pub(crate) fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub(crate) fn identity(&self) -> &SelfIdentity {
        &self.identity
    }

    pub(crate) fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub(crate) fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub(crate) fn store(&self) -> &MessageStore {
        &self.store
    }

    pub(crate) fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    pub(crate) fn focused(&self) -> &RoomId {
        &self.focused
    }

    pub(crate) fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub(crate) fn is_self_typing(&self, now: Instant) -> bool {
        self.typing.is_active(&self.focused, self.identity.id, now)
    }

    /// Live non-self typists in `room`.
    pub(crate) fn typists_in(&self, room: &RoomId, now: Instant) -> Vec<Participant> {
        self.typing
            .active(room, now, Some(self.identity.id))
            .into_iter()
            .filter_map(|id| self.presence.get(id).cloned())
            .collect()
    }

    fn push_typing_changed(&mut self, room: &RoomId, now: Instant) {
        let typists = self.typists_in(room, now);
        self.events.push(SessionEvent::TypingChanged {
            room: room.clone(),
            typists,
        });
    }

    fn require_room(&self, room: &RoomId) -> ChatResult<()> {
        if self.rooms.contains(room) {
            Ok(())
        } else {
            Err(ChatError::UnknownRoom(room.clone()))
        }
    }

    fn require_self_authored(&self, id: MessageId) -> ChatResult<()> {
        let message = self.store.get(id).ok_or(ChatError::UnknownMessage(id))?;
        if message.author_id() == self.identity.id {
            Ok(())
        } else {
            log::debug!("Delivery report for {id} ignored: not our message");
            Err(ChatError::NotSelfAuthored(id))
        }
    }

    fn require_remote(&self, participant: ParticipantId) -> ChatResult<&Participant> {
        self.presence
            .get(participant)
            .ok_or(ChatError::UnknownParticipant(participant))
    }
}

impl InboundSink for SessionCore {
    fn inject_inbound_message(
        &mut self,
        room: &RoomId,
        author: ParticipantId,
        content: &str,
    ) -> ChatResult<Message> {
        self.require_room(room)?;
        let snapshot = self.require_remote(author)?.snapshot();
        let message = self
            .store
            .append_inbound(room, snapshot, content, MessageKind::Text)?;

        // Counter moves in the same step as the insert.
        let is_focused = &self.focused == room;
        let count = self.unread.on_message_arrived(room, false, is_focused);
        self.events.push(SessionEvent::MessageAppended(message.clone()));
        if let Some(count) = count {
            self.events.push(SessionEvent::UnreadChanged {
                room: room.clone(),
                count,
            });
        }
        Ok(message)
    }

    fn notify_typing_start(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()> {
        self.require_room(room)?;
        self.require_remote(participant)?;
        let now = Instant::now();
        if self
            .typing
            .start(room, participant, self.typing_config.remote_ttl(), now)
        {
            self.push_typing_changed(room, now);
        }
        Ok(())
    }

    fn notify_typing_stop(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()> {
        self.require_room(room)?;
        let now = Instant::now();
        if self.typing.stop(room, participant, now) {
            self.push_typing_changed(room, now);
        }
        Ok(())
    }

    fn notify_presence(&mut self, participant: ParticipantId, status: Presence) -> ChatResult<()> {
        if !self.presence.set_status(participant, status)? {
            return Ok(());
        }
        log::debug!("Participant {participant} is now {status}");
        self.events.push(SessionEvent::PresenceChanged {
            participant,
            status,
        });
        if status != Presence::Online {
            let now = Instant::now();
            for room in self.typing.clear_participant(participant, now) {
                self.push_typing_changed(&room, now);
            }
        }
        Ok(())
    }

    fn acknowledge(&mut self, id: MessageId, status: DeliveryStatus) -> ChatResult<()> {
        self.require_self_authored(id)?;
        self.advance(id, status)
    }

    fn report_delivery_failure(&mut self, id: MessageId) -> ChatResult<()> {
        self.require_self_authored(id)?;
        self.advance(id, DeliveryStatus::Failed)?;
        log::warn!("Delivery of {id} failed");
        Ok(())
    }
}
