use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::time::{DelayQueue, delay_queue::Key};

use crate::common::{DeliveryStatus, MessageId};
use crate::network::SynthTimer;

/// Which part of the session registered a timer. Cancelling an owner cancels
/// every timer it still has outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerOwner {
    Connection,
    Delivery,
    Typing,
    Synthesizer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    Connect,
    /// Apply `steps` to the message in order.
    Deliver {
        id: MessageId,
        steps: Vec<DeliveryStatus>,
    },
    TypingSweep,
    Synth(SynthTimer),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerHandle {
    owner: TimerOwner,
    key: Key,
}

/// Arena of cancellable callbacks for one session.
///
/// Every timer is a plain `TimerEvent` value sitting in a delay queue; nothing
/// runs until the session pulls it out with [`Timers::next`], so a cancelled or
/// cleared timer can never touch state.
#[derive(Default)]
pub struct Timers {
    queue: DelayQueue<(TimerOwner, TimerEvent)>,
    outstanding: HashMap<TimerOwner, Vec<Key>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, owner: TimerOwner, after: Duration, event: TimerEvent) -> TimerHandle {
        let key = self.queue.insert((owner, event), after);
        self.outstanding.entry(owner).or_default().push(key.clone());
        TimerHandle { owner, key }
    }

    /// Returns `false` if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: &TimerHandle) -> bool {
        let Some(keys) = self.outstanding.get_mut(&handle.owner) else {
            return false;
        };
        let Some(at) = keys.iter().position(|key| *key == handle.key) else {
            return false;
        };
        keys.swap_remove(at);
        self.queue.remove(&handle.key);
        true
    }

    /// Cancel everything `owner` has pending. Returns how many timers were dropped.
    pub fn cancel_owner(&mut self, owner: TimerOwner) -> usize {
        let keys = self.outstanding.remove(&owner).unwrap_or_default();
        for key in &keys {
            self.queue.remove(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.outstanding.clear();
    }

    pub fn pending(&self, owner: TimerOwner) -> usize {
        self.outstanding.get(&owner).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Wait for the next timer to come due. Never resolves while the arena is empty.
    pub async fn next(&mut self) -> (TimerOwner, TimerEvent) {
        loop {
            if self.queue.is_empty() {
                std::future::pending::<()>().await;
            }
            if let Some(expired) = self.queue.next().await {
                let key = expired.key();
                let (owner, event) = expired.into_inner();
                if let Some(keys) = self.outstanding.get_mut(&owner) {
                    keys.retain(|pending| *pending != key);
                }
                return (owner, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{self, Instant};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order() {
        let mut timers = Timers::new();
        timers.schedule(TimerOwner::Typing, Duration::from_millis(300), TimerEvent::TypingSweep);
        timers.schedule(TimerOwner::Connection, Duration::from_millis(100), TimerEvent::Connect);

        let start = Instant::now();
        assert_eq!(timers.next().await, (TimerOwner::Connection, TimerEvent::Connect));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(timers.next().await, (TimerOwner::Typing, TimerEvent::TypingSweep));
        assert!(timers.is_empty());
        assert_eq!(timers.pending(TimerOwner::Typing), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let mut timers = Timers::new();
        let handle = timers.schedule(TimerOwner::Connection, Duration::from_millis(50), TimerEvent::Connect);
        timers.schedule(TimerOwner::Synthesizer, Duration::from_millis(10), TimerEvent::Synth(SynthTimer::MessageTick));
        timers.schedule(TimerOwner::Synthesizer, Duration::from_millis(20), TimerEvent::Synth(SynthTimer::TypingTick));

        assert!(timers.cancel(&handle));
        assert!(!timers.cancel(&handle));
        assert_eq!(timers.cancel_owner(TimerOwner::Synthesizer), 2);
        assert!(timers.is_empty());

        let waited = time::timeout(Duration::from_secs(60), timers.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fired_timers_are_no_longer_outstanding() {
        let mut timers = Timers::new();
        let handle = timers.schedule(TimerOwner::Connection, Duration::from_millis(5), TimerEvent::Connect);
        timers.next().await;

        assert_eq!(timers.pending(TimerOwner::Connection), 0);
        assert!(!timers.cancel(&handle));
    }
}
