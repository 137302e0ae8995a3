use std::collections::HashMap;

use crate::common::RoomId;

/// Per-room unread counters. The focused room always reads zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnreadTracker {
    counts: HashMap<RoomId, usize>,
    focused: Option<RoomId>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival. Returns the room's new count when it changed.
    pub fn on_message_arrived(&mut self, room: &RoomId, is_self_authored: bool, is_focused: bool) -> Option<usize> {
        if is_focused || self.focused.as_ref() == Some(room) {
            return None;
        }
        if is_self_authored {
            return None;
        }
        let count = self.counts.entry(room.clone()).or_insert(0);
        *count += 1;
        Some(*count)
    }

    /// Focus `room` and clear its counter. Returns the count that was cleared.
    pub fn on_room_focused(&mut self, room: &RoomId) -> usize {
        self.focused = Some(room.clone());
        self.counts.remove(room).unwrap_or(0)
    }

    pub fn count_for(&self, room: &RoomId) -> usize {
        if self.focused.as_ref() == Some(room) {
            return 0;
        }
        self.counts.get(room).copied().unwrap_or(0)
    }

    pub fn focused(&self) -> Option<&RoomId> {
        self.focused.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Step {
        Arrive(&'static str, bool),
        Focus(&'static str),
    }

    fn replay(steps: &[Step]) -> UnreadTracker {
        let mut tracker = UnreadTracker::new();
        for step in steps {
            match step {
                Step::Arrive(room, is_self) => {
                    let room = RoomId::from(*room);
                    let focused = tracker.focused() == Some(&room);
                    tracker.on_message_arrived(&room, *is_self, focused);
                }
                Step::Focus(room) => {
                    tracker.on_room_focused(&RoomId::from(*room));
                }
            }
        }
        tracker
    }

    #[test]
    fn counts_only_inbound_outside_the_focused_room() {
        let mut tracker = UnreadTracker::new();
        let general = RoomId::from("general");
        let alerts = RoomId::from("alerts");
        tracker.on_room_focused(&general);

        assert_eq!(tracker.on_message_arrived(&alerts, false, false), Some(1));
        assert_eq!(tracker.on_message_arrived(&alerts, true, false), None);
        assert_eq!(tracker.on_message_arrived(&general, false, true), None);
        assert_eq!(tracker.on_message_arrived(&alerts, false, false), Some(2));

        assert_eq!(tracker.count_for(&alerts), 2);
        assert_eq!(tracker.count_for(&general), 0);
    }

    #[test]
    fn focusing_clears_and_keeps_room_at_zero() {
        let mut tracker = UnreadTracker::new();
        let alerts = RoomId::from("alerts");
        tracker.on_room_focused(&RoomId::from("general"));
        tracker.on_message_arrived(&alerts, false, false);
        tracker.on_message_arrived(&alerts, false, false);

        assert_eq!(tracker.on_room_focused(&alerts), 2);
        assert_eq!(tracker.count_for(&alerts), 0);

        tracker.on_message_arrived(&alerts, false, true);
        assert_eq!(tracker.count_for(&alerts), 0);
    }

    #[test]
    fn replaying_the_same_sequence_gives_the_same_counters() {
        let steps = [
            Step::Focus("general"),
            Step::Arrive("alerts", false),
            Step::Arrive("trading", false),
            Step::Arrive("general", false),
            Step::Arrive("alerts", true),
            Step::Focus("trading"),
            Step::Arrive("general", false),
            Step::Arrive("alerts", false),
            Step::Arrive("trading", false),
        ];

        let first = replay(&steps);
        let second = replay(&steps);
        assert_eq!(first, second);
        assert_eq!(first.count_for(&RoomId::from("alerts")), 2);
        assert_eq!(first.count_for(&RoomId::from("general")), 1);
        assert_eq!(first.count_for(&RoomId::from("trading")), 0);
    }
}
