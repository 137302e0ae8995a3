pub mod chat;
pub mod common;
pub mod config;
pub mod network;
pub mod session;

pub use common::{ChatError, ChatResult, SessionEvent};
pub use config::{ChatConfig, load_config, save_config};
pub use network::InboundSink;
pub use session::{RoomSession, SessionHandle, SessionSnapshot, spawn_session};
