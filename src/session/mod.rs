//! The room session: chat state, its timers, and the task that owns both.

mod state;
pub mod facade;
pub mod runtime;

use std::collections::BTreeMap;

use serde::Serialize;

pub use facade::{RoomSession, SessionId};
pub use runtime::{SessionHandle, SessionTask, spawn_session};

use crate::common::{ConnectionState, Message, Participant, Room, RoomId};

/// Everything a presentation layer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub rooms: Vec<Room>,
    pub participants: Vec<Participant>,
    pub focused_room: RoomId,
    pub connection: ConnectionState,
    pub current_room_messages: Vec<Message>,
    pub typing_others: Vec<Participant>,
    pub unread_by_room: BTreeMap<RoomId, usize>,
    pub synthesizer_running: bool,
}
