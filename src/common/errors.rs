use super::types::{DeliveryStatus, MessageId, ParticipantId, RoomId};

pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced by the messaging core. None of them is fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message content is empty")]
    EmptyContent,

    #[error("message content is {len} characters, limit is {max}")]
    ContentTooLong { len: usize, max: usize },

    #[error("unknown room `{0}`")]
    UnknownRoom(RoomId),

    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    #[error("unknown message {0}")]
    UnknownMessage(MessageId),

    #[error("message {0} was not written by the local user")]
    NotSelfAuthored(MessageId),

    #[error("message {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: MessageId,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("session is not connected yet")]
    NotConnected,

    #[error("session has been closed")]
    SessionClosed,
}

impl ChatError {
    /// Validation failures are caller mistakes: shown inline, never logged as faults.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyContent
                | ChatError::ContentTooLong { .. }
                | ChatError::UnknownRoom(_)
                | ChatError::UnknownParticipant(_)
                | ChatError::NotSelfAuthored(_)
        )
    }
}
