pub mod delivery;
pub mod presence;
pub mod rooms;
pub mod store;
pub mod timers;
pub mod typing;
pub mod unread;

pub use delivery::{AcknowledgedDelivery, DeliveryPolicy, DeliveryStep, FixedDelayDelivery};
pub use presence::PresenceRegistry;
pub use rooms::RoomDirectory;
pub use store::{MAX_CONTENT_CHARS, MessageStore};
pub use timers::{TimerEvent, TimerHandle, TimerOwner, Timers};
pub use typing::{TypingCoordinator, TypingEntry};
pub use unread::UnreadTracker;
