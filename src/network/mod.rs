//! Boundary between the messaging core and whatever feeds it remote traffic.
//!
//! [`InboundSink`] is the whole surface a transport gets. The
//! [`ActivitySynthesizer`] drives it with generated traffic; a real network client
//! would drive the same methods from decoded frames instead.

pub mod synth;

pub use synth::{ActivitySynthesizer, Roster, SynthTimer};

use crate::common::{ChatResult, DeliveryStatus, Message, MessageId, ParticipantId, Presence, RoomId};

pub trait InboundSink {
    /// A message from another participant arrived in `room`.
    fn inject_inbound_message(
        &mut self,
        room: &RoomId,
        author: ParticipantId,
        content: &str,
    ) -> ChatResult<Message>;

    fn notify_typing_start(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()>;

    fn notify_typing_stop(&mut self, room: &RoomId, participant: ParticipantId) -> ChatResult<()>;

    fn notify_presence(&mut self, participant: ParticipantId, status: Presence) -> ChatResult<()>;

    /// Acknowledgement frame for one of our own messages.
    fn acknowledge(&mut self, id: MessageId, status: DeliveryStatus) -> ChatResult<()>;

    fn report_delivery_failure(&mut self, id: MessageId) -> ChatResult<()>;
}
