use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use super::InboundSink;
use crate::chat::{TimerEvent, TimerOwner, Timers};
use crate::common::{Participant, ParticipantId, RoomId};
use crate::config::{RangeMs, SynthConfig};

const FALLBACK_REPLY_ROOM: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthTimer {
    MessageTick,
    TypingTick,
    /// End of a synthesized typing burst.
    TypingHold {
        room: RoomId,
        participant: ParticipantId,
    },
    /// A participant finishes "typing" an answer to the local user.
    Reply {
        room: RoomId,
        participant: ParticipantId,
    },
}

/// Read-only view of the session the synthesizer picks from on each tick.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub rooms: Vec<RoomId>,
    /// Online participants, never including the local user.
    pub online: Vec<Participant>,
}

/// Generates plausible inbound traffic while no real transport is attached.
///
/// It keeps no chat state: each tick reads a [`Roster`] and pushes messages and
/// typing signals through an [`InboundSink`], exactly like a transport would. All
/// of its timers are registered under [`TimerOwner::Synthesizer`], so `stop`
/// drops every pending tick, typing hold and reply in one call. Typing bursts
/// still open at that point are closed through the sink.
pub struct ActivitySynthesizer {
    config: SynthConfig,
    phrases: BTreeMap<RoomId, Vec<String>>,
    replies: BTreeMap<RoomId, Vec<String>>,
    rng: StdRng,
    running: bool,
    /// Typing started by us whose stop has not been sent yet.
    open_bursts: BTreeSet<(RoomId, ParticipantId)>,
}

impl ActivitySynthesizer {
    pub fn new(
        config: SynthConfig,
        phrases: BTreeMap<RoomId, Vec<String>>,
        replies: BTreeMap<RoomId, Vec<String>>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            phrases,
            replies,
            rng,
            running: false,
            open_bursts: BTreeSet::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Arm both tick loops. Returns `false` if already running.
    pub fn start(&mut self, timers: &mut Timers) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.schedule(timers, self.config.message_interval_ms, SynthTimer::MessageTick);
        self.schedule(timers, self.config.typing_interval_ms, SynthTimer::TypingTick);
        log::info!("Activity synthesizer started");
        true
    }

    /// Cancel every outstanding synthesizer timer and end any typing burst it
    /// left open. Returns how many timers were dropped.
    pub fn stop(&mut self, timers: &mut Timers, sink: &mut dyn InboundSink) -> usize {
        self.running = false;
        let cancelled = timers.cancel_owner(TimerOwner::Synthesizer);
        for (room, participant) in std::mem::take(&mut self.open_bursts) {
            close_burst(&room, participant, sink);
        }
        log::info!("Activity synthesizer stopped ({cancelled} pending timers cancelled)");
        cancelled
    }

    pub fn on_timer(
        &mut self,
        timer: SynthTimer,
        roster: &Roster,
        timers: &mut Timers,
        sink: &mut dyn InboundSink,
    ) {
        if !self.running {
            log::debug!("Synthesizer timer {timer:?} fired while stopped; ignored");
            return;
        }

        match timer {
            SynthTimer::MessageTick => {
                if self.chance(self.config.message_probability) {
                    self.emit_message(roster, sink);
                }
                self.schedule(timers, self.config.message_interval_ms, SynthTimer::MessageTick);
            }
            SynthTimer::TypingTick => {
                if self.chance(self.config.typing_probability) {
                    self.emit_typing(roster, timers, sink);
                }
                self.schedule(timers, self.config.typing_interval_ms, SynthTimer::TypingTick);
            }
            SynthTimer::TypingHold { room, participant } => {
                self.open_bursts.remove(&(room.clone(), participant));
                close_burst(&room, participant, sink);
            }
            SynthTimer::Reply { room, participant } => {
                self.open_bursts.remove(&(room.clone(), participant));
                close_burst(&room, participant, sink);
                self.emit_reply(&room, participant, sink);
            }
        }
    }

    /// Maybe answer a message the local user just sent in `room`.
    pub fn on_self_message(
        &mut self,
        room: &RoomId,
        roster: &Roster,
        timers: &mut Timers,
        sink: &mut dyn InboundSink,
    ) {
        if !self.running || !self.chance(self.config.reply_probability) {
            return;
        }
        let candidates = self.authors_for(room, roster);
        let Some(participant) = candidates.choose(&mut self.rng).map(|p| p.id) else {
            return;
        };
        if let Err(err) = sink.notify_typing_start(room, participant) {
            log::debug!("Synthesized reply typing rejected: {err}");
            return;
        }
        self.open_bursts.insert((room.clone(), participant));
        self.schedule(
            timers,
            self.config.reply_delay_ms,
            SynthTimer::Reply {
                room: room.clone(),
                participant,
            },
        );
    }

    fn emit_message(&mut self, roster: &Roster, sink: &mut dyn InboundSink) {
        let Some(room) = roster.rooms.choose(&mut self.rng) else {
            return;
        };
        let candidates = self.authors_for(room, roster);
        let Some(author) = candidates.choose(&mut self.rng).map(|p| p.id) else {
            log::debug!("No online author for room `{room}`; skipping tick");
            return;
        };
        let Some(content) = self
            .phrases
            .get(room)
            .and_then(|lines| lines.choose(&mut self.rng))
        else {
            log::debug!("No phrases configured for room `{room}`; skipping tick");
            return;
        };

        match sink.inject_inbound_message(room, author, content) {
            Ok(message) => log::debug!("Synthesized {} in `{room}` from {author}", message.id),
            Err(err) => log::warn!("Synthesized message rejected: {err}"),
        }
    }

    fn emit_typing(&mut self, roster: &Roster, timers: &mut Timers, sink: &mut dyn InboundSink) {
        let Some(typist) = roster.online.choose(&mut self.rng) else {
            return;
        };
        let room = if typist.favorite_rooms.is_empty() {
            roster.rooms.choose(&mut self.rng)
        } else {
            typist.favorite_rooms.choose(&mut self.rng)
        };
        let Some(room) = room.cloned() else {
            return;
        };

        if let Err(err) = sink.notify_typing_start(&room, typist.id) {
            log::debug!("Synthesized typing rejected: {err}");
            return;
        }
        self.open_bursts.insert((room.clone(), typist.id));
        self.schedule(
            timers,
            self.config.typing_hold_ms,
            SynthTimer::TypingHold {
                room,
                participant: typist.id,
            },
        );
    }

    fn emit_reply(&mut self, room: &RoomId, author: ParticipantId, sink: &mut dyn InboundSink) {
        let table = self
            .replies
            .get(room)
            .or_else(|| self.replies.get(&RoomId::from(FALLBACK_REPLY_ROOM)));
        let Some(content) = table.and_then(|lines| lines.choose(&mut self.rng)) else {
            return;
        };
        if let Err(err) = sink.inject_inbound_message(room, author, content) {
            log::warn!("Synthesized reply rejected: {err}");
        }
    }

    fn authors_for<'a>(&self, room: &RoomId, roster: &'a Roster) -> Vec<&'a Participant> {
        roster
            .online
            .iter()
            .filter(|p| !self.config.respect_favorites || p.favorite_rooms.contains(room))
            .collect()
    }

    fn chance(&mut self, probability: f64) -> bool {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        self.rng.random_bool(probability)
    }

    fn schedule(&mut self, timers: &mut Timers, range: RangeMs, timer: SynthTimer) {
        let (min, max) = range.bounds();
        let after = Duration::from_millis(self.rng.random_range(min..=max));
        timers.schedule(TimerOwner::Synthesizer, after, TimerEvent::Synth(timer));
    }
}

fn close_burst(room: &RoomId, participant: ParticipantId, sink: &mut dyn InboundSink) {
    if let Err(err) = sink.notify_typing_stop(room, participant) {
        log::debug!("Synthesized typing stop rejected: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{
        AuthorSnapshot, ChatError, ChatResult, DeliveryStatus, Message, MessageId, MessageKind,
        Presence,
    };
    use crate::config::ChatConfig;
    use chrono::Utc;

    #[derive(Debug, Default)]
    struct RecordingSink {
        messages: Vec<(RoomId, ParticipantId, String)>,
        typing: Vec<(RoomId, ParticipantId, bool)>,
    }

    impl InboundSink for RecordingSink {
        fn inject_inbound_message(
            &mut self,
            room: &RoomId,
            author: ParticipantId,
            content: &str,
        ) -> ChatResult<Message> {
            self.messages.push((room.clone(), author, content.to_string()));
            Ok(Message {
                id: MessageId(self.messages.len() as u64),
                room_id: room.clone(),
                author: AuthorSnapshot {
                    id: author,
                    name: String::new(),
                    avatar: String::new(),
                },
                content: content.to_string(),
                created_at: Utc::now(),
                kind: MessageKind::Text,
                status: DeliveryStatus::Delivered,
            })
        }

        fn notify_typing_start(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()> {
            self.typing.push((room.clone(), participant, true));
            Ok(())
        }

        fn notify_typing_stop(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()> {
            self.typing.push((room.clone(), participant, false));
            Ok(())
        }

        fn notify_presence(&mut self, _participant: ParticipantId, _status: Presence) -> ChatResult<()> {
            Ok(())
        }

        fn acknowledge(&mut self, id: MessageId, _status: DeliveryStatus) -> ChatResult<()> {
            Err(ChatError::UnknownMessage(id))
        }

        fn report_delivery_failure(&mut self, id: MessageId) -> ChatResult<()> {
            Err(ChatError::UnknownMessage(id))
        }
    }

    fn synthesizer(tweak: impl FnOnce(&mut SynthConfig)) -> ActivitySynthesizer {
        let defaults = ChatConfig::default();
        let mut config = defaults.synth.clone();
        config.seed = Some(42);
        tweak(&mut config);
        ActivitySynthesizer::new(config, defaults.phrases, defaults.replies)
    }

    fn roster() -> Roster {
        let defaults = ChatConfig::default();
        Roster {
            rooms: defaults.rooms.iter().map(|r| r.id.clone()).collect(),
            online: defaults
                .participants
                .into_iter()
                .filter(|p| p.status == Presence::Online)
                .collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_arms_both_loops_and_stop_cancels_them() {
        let mut timers = Timers::new();
        let mut synth = synthesizer(|_| {});

        assert!(synth.start(&mut timers));
        assert!(!synth.start(&mut timers));
        assert_eq!(timers.pending(TimerOwner::Synthesizer), 2);

        assert_eq!(synth.stop(&mut timers, &mut RecordingSink::default()), 2);
        assert!(!synth.is_running());
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn certain_message_tick_injects_a_room_phrase_from_an_online_author() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| c.message_probability = 1.0);
        let roster = roster();
        let phrases = ChatConfig::default().phrases;
        synth.start(&mut timers);

        for _ in 0..20 {
            synth.on_timer(SynthTimer::MessageTick, &roster, &mut timers, &mut sink);
        }

        assert_eq!(sink.messages.len(), 20);
        for (room, author, content) in &sink.messages {
            assert!(roster.online.iter().any(|p| p.id == *author));
            assert!(phrases[room].contains(content));
        }
        // Both loops plus one re-arm per tick.
        assert_eq!(timers.pending(TimerOwner::Synthesizer), 22);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_probability_never_injects_but_keeps_ticking() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| {
            c.message_probability = 0.0;
            c.typing_probability = 0.0;
        });
        synth.start(&mut timers);

        synth.on_timer(SynthTimer::MessageTick, &roster(), &mut timers, &mut sink);
        synth.on_timer(SynthTimer::TypingTick, &roster(), &mut timers, &mut sink);

        assert!(sink.messages.is_empty() && sink.typing.is_empty());
        assert_eq!(timers.pending(TimerOwner::Synthesizer), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_burst_is_closed_by_its_hold_timer() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| c.typing_probability = 1.0);
        let roster = roster();
        synth.start(&mut timers);
        synth.on_timer(SynthTimer::TypingTick, &roster, &mut timers, &mut sink);

        let (room, participant, started) = sink.typing[0].clone();
        assert!(started);
        let typist = roster.online.iter().find(|p| p.id == participant).unwrap();
        assert!(typist.favorite_rooms.contains(&room));

        synth.on_timer(
            SynthTimer::TypingHold {
                room: room.clone(),
                participant,
            },
            &roster,
            &mut timers,
            &mut sink,
        );
        assert_eq!(sink.typing[1], (room, participant, false));
    }

    #[tokio::test(start_paused = true)]
    async fn typist_without_favorites_types_in_some_room() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| c.typing_probability = 1.0);
        let mut roster = roster();
        for participant in &mut roster.online {
            participant.favorite_rooms.clear();
        }
        synth.start(&mut timers);
        synth.on_timer(SynthTimer::TypingTick, &roster, &mut timers, &mut sink);

        let (room, _, started) = &sink.typing[0];
        assert!(*started);
        assert!(roster.rooms.contains(room));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_bursts_whose_hold_was_cancelled() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| {
            c.typing_probability = 1.0;
            c.reply_probability = 1.0;
        });
        let roster = roster();
        let general = RoomId::from("general");
        synth.start(&mut timers);
        synth.on_timer(SynthTimer::TypingTick, &roster, &mut timers, &mut sink);
        synth.on_self_message(&general, &roster, &mut timers, &mut sink);
        let started: BTreeSet<_> = sink.typing.iter().map(|(r, p, _)| (r.clone(), *p)).collect();

        synth.stop(&mut timers, &mut sink);

        let stopped: BTreeSet<_> = sink
            .typing
            .iter()
            .filter(|(_, _, started)| !started)
            .map(|(r, p, _)| (r.clone(), *p))
            .collect();
        assert_eq!(stopped, started);
        assert!(timers.is_empty());

        // Nothing left to close a second time.
        let before = sink.typing.len();
        synth.stop(&mut timers, &mut sink);
        assert_eq!(sink.typing.len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn favorites_filter_can_leave_a_room_without_authors() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| {
            c.message_probability = 1.0;
            c.respect_favorites = true;
        });
        // Only Carol favours premium and she is away.
        let roster = Roster {
            rooms: vec![RoomId::from("premium")],
            ..roster()
        };
        synth.start(&mut timers);
        synth.on_timer(SynthTimer::MessageTick, &roster, &mut timers, &mut sink);

        assert!(sink.messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_synthesizer_ignores_stray_timers() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| c.message_probability = 1.0);
        synth.start(&mut timers);
        synth.stop(&mut timers, &mut sink);

        synth.on_timer(SynthTimer::MessageTick, &roster(), &mut timers, &mut sink);
        assert!(sink.messages.is_empty());
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_types_then_answers_in_the_same_room() {
        let mut timers = Timers::new();
        let mut sink = RecordingSink::default();
        let mut synth = synthesizer(|c| c.reply_probability = 1.0);
        let roster = roster();
        let trading = RoomId::from("trading");
        synth.start(&mut timers);

        synth.on_self_message(&trading, &roster, &mut timers, &mut sink);
        let (room, participant, started) = sink.typing[0].clone();
        assert_eq!(room, trading);
        assert!(started);
        assert_eq!(timers.pending(TimerOwner::Synthesizer), 3);

        synth.on_timer(
            SynthTimer::Reply {
                room: trading.clone(),
                participant,
            },
            &roster,
            &mut timers,
            &mut sink,
        );
        assert_eq!(sink.typing[1], (trading.clone(), participant, false));
        let (room, author, content) = &sink.messages[0];
        assert_eq!((room, *author), (&trading, participant));
        assert!(ChatConfig::default().replies[&trading].contains(content));
    }

    #[tokio::test(start_paused = true)]
    async fn same_seed_produces_the_same_traffic() {
        let run = || {
            let mut timers = Timers::new();
            let mut sink = RecordingSink::default();
            let mut synth = synthesizer(|c| c.message_probability = 0.5);
            synth.start(&mut timers);
            for _ in 0..30 {
                synth.on_timer(SynthTimer::MessageTick, &roster(), &mut timers, &mut sink);
            }
            sink.messages
        };

        assert_eq!(run(), run());
    }
}
