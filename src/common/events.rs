use super::types::{DeliveryStatus, Message, MessageId, Participant, ParticipantId, Presence, RoomId};

/// Observable changes emitted by a session for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    MessageAppended(Message),
    StatusChanged {
        id: MessageId,
        room: RoomId,
        status: DeliveryStatus,
    },
    /// The full set of non-self typists now active in `room`.
    TypingChanged {
        room: RoomId,
        typists: Vec<Participant>,
    },
    UnreadChanged {
        room: RoomId,
        count: usize,
    },
    PresenceChanged {
        participant: ParticipantId,
        status: Presence,
    },
    FocusChanged(RoomId),
    SynthesizerStarted,
    SynthesizerStopped,
    Closed,
}
