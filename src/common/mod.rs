pub mod commands;
pub mod errors;
pub mod events;
pub mod types;

pub use commands::SessionCommand;
pub use errors::{ChatError, ChatResult};
pub use events::SessionEvent;
pub use types::{
    AuthorSnapshot, ConnectionState, DeliveryStatus, Message, MessageId, MessageKind,
    Participant, ParticipantId, Presence, Room, RoomId, SelfIdentity,
};
