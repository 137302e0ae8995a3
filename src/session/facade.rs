use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::{self, Instant};
use uuid::Uuid;

use super::state::SessionCore;
use super::SessionSnapshot;
use crate::chat::{
    AcknowledgedDelivery, DeliveryPolicy, FixedDelayDelivery, TimerEvent, TimerOwner, Timers,
};
use crate::common::{
    ChatError, ChatResult, ConnectionState, DeliveryStatus, Message, MessageId, Participant,
    ParticipantId, Presence, Room, RoomId, SelfIdentity, SessionEvent,
};
use crate::config::{ChatConfig, DeliveryMode};
use crate::network::{ActivitySynthesizer, InboundSink};

pub type SessionId = Uuid;

/// The one surface presentation code and transports talk to.
///
/// Actions (`send`, `switch_room`, typing) and inbound traffic all go through
/// here, one call at a time. Reads are plain projections of current state.
/// Timers are values held in the session's arena and only take effect when the
/// owner feeds them back through [`RoomSession::fire`], usually from
/// [`RoomSession::run_until`] or the session task.
pub struct RoomSession {
    id: SessionId,
    core: SessionCore,
    timers: Timers,
    delivery: Box<dyn DeliveryPolicy>,
    synth: ActivitySynthesizer,
    connect_delay: Duration,
    closed: bool,
}

impl RoomSession {
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        let delivery: Box<dyn DeliveryPolicy> = match config.delivery.mode {
            DeliveryMode::Fixed => Box::new(FixedDelayDelivery {
                sent_after: Duration::from_millis(config.delivery.sent_after_ms),
                read_after: Duration::from_millis(config.delivery.read_after_ms),
            }),
            DeliveryMode::Acknowledged => Box::new(AcknowledgedDelivery),
        };
        let session = Self {
            id: Uuid::new_v4(),
            core: SessionCore::new(config)?,
            timers: Timers::new(),
            delivery,
            synth: ActivitySynthesizer::new(
                config.synth.clone(),
                config.phrases.clone(),
                config.replies.clone(),
            ),
            connect_delay: config.connect_delay(),
            closed: false,
        };
        log::info!(
            "Session {} created for {} with {} rooms",
            session.id,
            session.core.identity().name,
            session.core.rooms().list().len()
        );
        Ok(session)
    }

    pub fn with_delivery_policy(mut self, policy: impl DeliveryPolicy + 'static) -> Self {
        self.delivery = Box::new(policy);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Start the connect sequence. The session flips to `connected` when the
    /// one-shot connect timer fires.
    pub fn connect(&mut self) -> ChatResult<()> {
        self.ensure_open()?;
        if self.core.connection() == ConnectionState::Connected
            || self.timers.pending(TimerOwner::Connection) > 0
        {
            return Ok(());
        }
        log::info!("Session {} connecting", self.id);
        self.timers
            .schedule(TimerOwner::Connection, self.connect_delay, TimerEvent::Connect);
        Ok(())
    }

    // ---- actions ----------------------------------------------------------

    /// Post `content` to the focused room as the local user.
    pub fn send(&mut self, content: &str) -> ChatResult<Message> {
        let room = self.core.focused().clone();
        self.post(&room, content)
    }

    fn post(&mut self, room: &RoomId, content: &str) -> ChatResult<Message> {
        self.ensure_open()?;
        let message = self.core.append_self(room, content)?;
        for step in self.delivery.plan(&message) {
            self.timers.schedule(
                TimerOwner::Delivery,
                step.after,
                TimerEvent::Deliver {
                    id: message.id,
                    steps: step.statuses,
                },
            );
        }
        self.core.stop_self_typing(Instant::now());

        let roster = self.core.roster();
        self.synth
            .on_self_message(&message.room_id, &roster, &mut self.timers, &mut self.core);
        self.rearm_typing_sweep();
        Ok(message)
    }

    /// Post the content of a failed message again, as a new message in the same
    /// room. The failed one stays `failed`.
    pub fn resend(&mut self, id: MessageId) -> ChatResult<Message> {
        self.ensure_open()?;
        let message = self
            .core
            .store()
            .get(id)
            .ok_or(ChatError::UnknownMessage(id))?;
        if message.author_id() != self.core.identity().id || message.status != DeliveryStatus::Failed {
            return Err(ChatError::InvalidTransition {
                id,
                from: message.status,
                to: DeliveryStatus::Sending,
            });
        }
        let (room, content) = (message.room_id.clone(), message.content.clone());
        self.post(&room, &content)
    }

    pub fn switch_room(&mut self, room: &RoomId) -> ChatResult<()> {
        self.ensure_open()?;
        if !self.core.rooms().contains(room) {
            return Err(ChatError::UnknownRoom(room.clone()));
        }
        if self.core.focused() != room {
            self.core.stop_self_typing(Instant::now());
        }
        self.core.focus(room)?;
        self.rearm_typing_sweep();
        Ok(())
    }

    /// The local user is composing in the focused room. Call on every keystroke;
    /// each call pushes the idle deadline out by one debounce window.
    pub fn start_typing(&mut self) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.start_self_typing(Instant::now());
        self.rearm_typing_sweep();
        Ok(())
    }

    pub fn stop_typing(&mut self) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.stop_self_typing(Instant::now());
        self.rearm_typing_sweep();
        Ok(())
    }

    /// Rename or re-avatar a participant. Messages already in the store keep
    /// the author details they were written with.
    pub fn update_profile(
        &mut self,
        participant: ParticipantId,
        name: &str,
        avatar: &str,
    ) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.update_profile(participant, name, avatar)
    }

    pub fn start_synthesizer(&mut self) -> ChatResult<bool> {
        self.ensure_open()?;
        let started = self.synth.start(&mut self.timers);
        if started {
            self.core.push_event(SessionEvent::SynthesizerStarted);
        }
        Ok(started)
    }

    /// Returns the number of synthesizer timers that were still pending.
    pub fn stop_synthesizer(&mut self) -> ChatResult<usize> {
        self.ensure_open()?;
        if !self.synth.is_running() {
            return Ok(0);
        }
        let cancelled = self.synth.stop(&mut self.timers, &mut self.core);
        self.core.push_event(SessionEvent::SynthesizerStopped);
        self.rearm_typing_sweep();
        Ok(cancelled)
    }

    /// Tear the session down. Every pending timer is dropped, so nothing can
    /// change state afterwards; unsent messages stay in `sending`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.synth.is_running() {
            self.synth.stop(&mut self.timers, &mut self.core);
        }
        self.timers.clear();
        self.closed = true;
        self.core.push_event(SessionEvent::Closed);
        log::info!("Session {} closed", self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ---- projections ------------------------------------------------------

    pub fn identity(&self) -> &SelfIdentity {
        self.core.identity()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.connection()
    }

    pub fn focused_room(&self) -> &RoomId {
        self.core.focused()
    }

    pub fn rooms_list(&self) -> &[Room] {
        self.core.rooms().list()
    }

    pub fn find_room(&self, room: &RoomId) -> Option<&Room> {
        self.core.rooms().find(room)
    }

    pub fn participants_list(&self) -> &[Participant] {
        self.core.presence().list()
    }

    pub fn current_room_messages(&self) -> &[Message] {
        self.core.store().messages_for_room(self.core.focused())
    }

    pub fn messages_for_room(&self, room: &RoomId) -> &[Message] {
        self.core.store().messages_for_room(room)
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.core.store().get(id)
    }

    /// Other participants composing in the focused room.
    pub fn typing_others(&self) -> Vec<Participant> {
        self.core.typists_in(self.core.focused(), Instant::now())
    }

    pub fn typists_in(&self, room: &RoomId) -> Vec<Participant> {
        self.core.typists_in(room, Instant::now())
    }

    pub fn is_self_typing(&self) -> bool {
        self.core.is_self_typing(Instant::now())
    }

    pub fn unread_by_room(&self) -> BTreeMap<RoomId, usize> {
        self.core
            .rooms()
            .ids()
            .map(|room| (room.clone(), self.core.unread().count_for(room)))
            .collect()
    }

    pub fn unread_count(&self, room: &RoomId) -> usize {
        self.core.unread().count_for(room)
    }

    pub fn synthesizer_running(&self) -> bool {
        self.synth.is_running()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            rooms: self.rooms_list().to_vec(),
            participants: self.participants_list().to_vec(),
            focused_room: self.focused_room().clone(),
            connection: self.connection_state(),
            current_room_messages: self.current_room_messages().to_vec(),
            typing_others: self.typing_others(),
            unread_by_room: self.unread_by_room(),
            synthesizer_running: self.synthesizer_running(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.core.drain_events()
    }

    pub fn pending_timers(&self, owner: TimerOwner) -> usize {
        self.timers.pending(owner)
    }

    // ---- scheduling -------------------------------------------------------

    /// Wait for the next due timer. Never resolves while nothing is scheduled.
    pub async fn next_timer(&mut self) -> (TimerOwner, TimerEvent) {
        self.timers.next().await
    }

    /// Apply one due timer.
    pub fn fire(&mut self, owner: TimerOwner, event: TimerEvent) {
        if self.closed {
            return;
        }
        match event {
            TimerEvent::Connect => self.core.mark_connected(),
            TimerEvent::Deliver { id, steps } => {
                for status in steps {
                    if let Err(err) = self.core.advance(id, status) {
                        log::debug!("Dropped delivery step for {id}: {err}");
                        break;
                    }
                }
            }
            TimerEvent::TypingSweep => self.core.sweep_typing(Instant::now()),
            TimerEvent::Synth(timer) => {
                let roster = self.core.roster();
                self.synth
                    .on_timer(timer, &roster, &mut self.timers, &mut self.core);
            }
        }
        log::trace!("Fired {owner:?} timer");
        self.rearm_typing_sweep();
    }

    /// Process every timer that comes due before `deadline`.
    pub async fn run_until(&mut self, deadline: Instant) {
        loop {
            tokio::select! {
                biased;
                (owner, event) = self.timers.next() => self.fire(owner, event),
                _ = time::sleep_until(deadline) => break,
            }
        }
    }

    pub async fn run_for(&mut self, duration: Duration) {
        self.run_until(Instant::now() + duration).await;
    }

    fn rearm_typing_sweep(&mut self) {
        self.timers.cancel_owner(TimerOwner::Typing);
        if self.closed {
            return;
        }
        if let Some(expires_at) = self.core.next_typing_expiry() {
            let after = expires_at.saturating_duration_since(Instant::now());
            self.timers
                .schedule(TimerOwner::Typing, after, TimerEvent::TypingSweep);
        }
    }

    fn ensure_open(&self) -> ChatResult<()> {
        if self.closed {
            Err(ChatError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl InboundSink for RoomSession {
    fn inject_inbound_message(
        &mut self,
        room: &RoomId,
        author: ParticipantId,
        content: &str,
    ) -> ChatResult<Message> {
        self.ensure_open()?;
        self.core.inject_inbound_message(room, author, content)
    }

    fn notify_typing_start(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.notify_typing_start(room, participant)?;
        self.rearm_typing_sweep();
        Ok(())
    }

    fn notify_typing_stop(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.notify_typing_stop(room, participant)?;
        self.rearm_typing_sweep();
        Ok(())
    }

    fn notify_presence(&mut self, participant: ParticipantId, status: Presence) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.notify_presence(participant, status)
    }

    fn acknowledge(&mut self, id: MessageId, status: DeliveryStatus) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.acknowledge(id, status)
    }

    fn report_delivery_failure(&mut self, id: MessageId) -> ChatResult<()> {
        self.ensure_open()?;
        self.core.report_delivery_failure(id)
    }
}
