use std::time::Duration;

use crate::common::{DeliveryStatus, Message};

/// One scheduled status change: after `after`, apply `statuses` in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryStep {
    pub after: Duration,
    pub statuses: Vec<DeliveryStatus>,
}

/// Decides how a freshly sent message moves through its lifecycle.
///
/// Whatever the policy, every change goes through the store's single
/// `advance_status` entry point, so the state machine stays the same whether
/// statuses come from fixed delays or from transport acknowledgements.
pub trait DeliveryPolicy: Send {
    fn plan(&self, message: &Message) -> Vec<DeliveryStep>;
}

/// Simulated network: `sent` after a short delay, then delivered and read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelayDelivery {
    pub sent_after: Duration,
    pub read_after: Duration,
}

impl Default for FixedDelayDelivery {
    fn default() -> Self {
        Self {
            sent_after: Duration::from_millis(500),
            read_after: Duration::from_millis(2000),
        }
    }
}

impl DeliveryPolicy for FixedDelayDelivery {
    fn plan(&self, _message: &Message) -> Vec<DeliveryStep> {
        // Two steps must not share a deadline or they could fire out of order.
        let read_after = self.read_after.max(self.sent_after + Duration::from_millis(1));
        vec![
            DeliveryStep {
                after: self.sent_after,
                statuses: vec![DeliveryStatus::Sent],
            },
            DeliveryStep {
                after: read_after,
                statuses: vec![DeliveryStatus::Delivered, DeliveryStatus::Read],
            },
        ]
    }
}

/// Nothing is scheduled; a transport calls `acknowledge` as frames arrive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcknowledgedDelivery;

impl DeliveryPolicy for AcknowledgedDelivery {
    fn plan(&self, _message: &Message) -> Vec<DeliveryStep> {
        Vec::new()
    }
}
