use tokio::sync::oneshot;

use super::errors::ChatResult;
use super::types::{DeliveryStatus, Message, MessageId, ParticipantId, Presence, RoomId};
use crate::session::SessionSnapshot;

pub type Reply<T> = oneshot::Sender<ChatResult<T>>;

/// Requests a `SessionHandle` sends down to the session task. Each one is
/// handled as a single step and answered on its reply channel.
#[derive(Debug)]
pub enum SessionCommand {
    Send {
        content: String,
        reply: Reply<Message>,
    },
    Resend {
        id: MessageId,
        reply: Reply<Message>,
    },
    SwitchRoom {
        room: RoomId,
        reply: Reply<()>,
    },
    StartTyping {
        reply: Reply<()>,
    },
    StopTyping {
        reply: Reply<()>,
    },

    /// Transport surface: traffic arriving from other participants.
    InjectInbound {
        room: RoomId,
        author: ParticipantId,
        content: String,
        reply: Reply<Message>,
    },
    TypingStart {
        room: RoomId,
        participant: ParticipantId,
        reply: Reply<()>,
    },
    TypingStop {
        room: RoomId,
        participant: ParticipantId,
        reply: Reply<()>,
    },
    PresenceUpdate {
        participant: ParticipantId,
        status: Presence,
        reply: Reply<()>,
    },
    Acknowledge {
        id: MessageId,
        status: DeliveryStatus,
        reply: Reply<()>,
    },
    DeliveryFailed {
        id: MessageId,
        reply: Reply<()>,
    },

    StartSynthesizer {
        reply: Reply<bool>,
    },
    /// Answered only after every synthesizer timer has been cancelled.
    StopSynthesizer {
        reply: Reply<usize>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}
