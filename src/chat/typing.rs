use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::common::{ParticipantId, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEntry {
    pub room: RoomId,
    pub participant: ParticipantId,
    pub expires_at: Instant,
}

/// Who is composing where. At most one entry per `(room, participant)`.
///
/// An entry is live while `now < expires_at`. Reads filter on that directly, and
/// `sweep` drops whatever has lapsed, so both paths agree on the same deadline.
#[derive(Debug, Default)]
pub struct TypingCoordinator {
    entries: BTreeMap<(RoomId, ParticipantId), Instant>,
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh an entry. Returns `true` if the participant was not
    /// already live in that room.
    pub fn start(&mut self, room: &RoomId, participant: ParticipantId, ttl: Duration, now: Instant) -> bool {
        let expires_at = now + ttl;
        match self.entries.insert((room.clone(), participant), expires_at) {
            Some(previous) => previous <= now,
            None => true,
        }
    }

    /// Remove an entry regardless of its expiry. Returns `true` if it was live.
    pub fn stop(&mut self, room: &RoomId, participant: ParticipantId, now: Instant) -> bool {
        self.entries
            .remove(&(room.clone(), participant))
            .is_some_and(|expires_at| expires_at > now)
    }

    pub fn is_active(&self, room: &RoomId, participant: ParticipantId, now: Instant) -> bool {
        self.entries
            .get(&(room.clone(), participant))
            .is_some_and(|expires_at| *expires_at > now)
    }

    pub fn entry(&self, room: &RoomId, participant: ParticipantId) -> Option<TypingEntry> {
        self.entries
            .get(&(room.clone(), participant))
            .map(|expires_at| TypingEntry {
                room: room.clone(),
                participant,
                expires_at: *expires_at,
            })
    }

    /// Live typists in `room`, ordered by participant id.
    pub fn active(&self, room: &RoomId, now: Instant, excluding: Option<ParticipantId>) -> Vec<ParticipantId> {
        self.entries
            .iter()
            .filter(|((entry_room, participant), expires_at)| {
                entry_room == room && **expires_at > now && Some(*participant) != excluding
            })
            .map(|((_, participant), _)| *participant)
            .collect()
    }

    /// Drop lapsed entries and report which rooms lost a typist other than
    /// `excluding`.
    pub fn sweep(&mut self, now: Instant, excluding: Option<ParticipantId>) -> Vec<RoomId> {
        let mut changed: Vec<RoomId> = Vec::new();
        self.entries.retain(|(room, participant), expires_at| {
            let live = *expires_at > now;
            if !live && Some(*participant) != excluding && !changed.contains(room) {
                changed.push(room.clone());
            }
            live
        });
        changed
    }

    /// Remove every entry of `participant`. Returns the rooms where it was live.
    pub fn clear_participant(&mut self, participant: ParticipantId, now: Instant) -> Vec<RoomId> {
        let mut changed: Vec<RoomId> = Vec::new();
        self.entries.retain(|(room, typist), expires_at| {
            if *typist != participant {
                return true;
            }
            if *expires_at > now {
                changed.push(room.clone());
            }
            false
        });
        changed
    }

    /// Earliest pending deadline, for scheduling the next sweep.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
