//! In-process per-user event bus.
//!
//! Subscriptions are keyed by user id behind a single mutex; each holds a
//! bounded channel. Publishing never blocks: a subscription whose buffer is
//! full is evicted (closed and removed) instead of stalling the publisher.
//! The application reconnects frequently, so subscribing per user rather
//! than per topic keeps reconnects to a single registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::ports::{EventService, Subscription};
use crate::domain::{Error, Event, Principal, Result};

/// Buffer size of the delivery channel for each subscription.
pub const EVENT_BUFFER_SIZE: usize = 16;

type SubscriberMap = HashMap<i32, HashMap<u64, mpsc::Sender<Event>>>;

/// [`EventService`] implementation delivering events to in-process
/// subscribers.
#[derive(Clone, Default)]
pub struct InProcessEventService {
    subscribers: Arc<Mutex<SubscriberMap>>,
    next_id: Arc<AtomicU64>,
}

impl InProcessEventService {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventService for InProcessEventService {
    fn publish(&self, user_id: i32, event: Event) {
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        let Some(subs) = subscribers.get_mut(&user_id) else {
            return;
        };

        // Deliver without blocking. A full buffer means the subscriber has
        // stopped draining; evict it so one slow consumer cannot stall the
        // mutation that published the event.
        subs.retain(|id, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id, subscription = *id, "evicting slow event subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subs.is_empty() {
            subscribers.remove(&user_id);
        }
    }

    fn subscribe(&self, principal: &Principal) -> Result<Box<dyn Subscription>> {
        if principal.is_anonymous() {
            return Err(Error::unauthorized(
                "Must be logged in to subscribe to events.",
            ));
        }
        let user_id = principal.user_id();

        let (sender, receiver) = mpsc::channel(EVENT_BUFFER_SIZE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        subscribers.entry(user_id).or_default().insert(id, sender);

        Ok(Box::new(BusSubscription {
            id,
            user_id,
            receiver,
            subscribers: Arc::clone(&self.subscribers),
        }))
    }
}

/// A live subscription handed out by [`InProcessEventService`].
struct BusSubscription {
    id: u64,
    user_id: i32,
    receiver: mpsc::Receiver<Event>,
    subscribers: Arc<Mutex<SubscriberMap>>,
}

impl BusSubscription {
    fn unregister(&self) {
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        if let Some(subs) = subscribers.get_mut(&self.user_id) {
            subs.remove(&self.id);
            if subs.is_empty() {
                subscribers.remove(&self.user_id);
            }
        }
    }
}

#[async_trait]
impl Subscription for BusSubscription {
    async fn next_event(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    fn close(&mut self) {
        self.unregister();
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Event service that drops every publish and offers no subscriptions.
/// Useful for wiring contexts (batch tools, tests) that need no bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventService;

impl NoopEventService {
    /// Create a new no-op service.
    pub fn new() -> Self {
        Self
    }
}

impl EventService for NoopEventService {
    fn publish(&self, _user_id: i32, _event: Event) {}

    fn subscribe(&self, _principal: &Principal) -> Result<Box<dyn Subscription>> {
        Err(Error::not_implemented(
            "Event subscriptions are not supported by this service.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DialValueChangedPayload, ErrorCode, User};
    use std::time::Duration;
    use tokio::time::timeout;

    fn principal(id: i32) -> Principal {
        Principal::from_user(User::fixture(id, &format!("user-{id}")))
    }

    fn event(value: i32) -> Event {
        Event::DialValueChanged(DialValueChangedPayload { id: 1, value })
    }

    async fn expect_no_event(subscription: &mut Box<dyn Subscription>) {
        let outcome = timeout(Duration::from_millis(20), subscription.next_event()).await;
        assert!(outcome.is_err(), "expected no event to arrive");
    }

    #[tokio::test]
    async fn subscribe_requires_a_principal() {
        let bus = InProcessEventService::new();
        let error = bus
            .subscribe(&Principal::anonymous())
            .err()
            .expect("anonymous subscribe");
        assert_eq!(error.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_reaches_every_subscription_of_the_user_only() {
        let bus = InProcessEventService::new();
        let mut first = bus.subscribe(&principal(1)).expect("subscribe");
        let mut second = bus.subscribe(&principal(1)).expect("subscribe");
        let mut other = bus.subscribe(&principal(2)).expect("subscribe");

        bus.publish(1, event(25));

        assert_eq!(first.next_event().await, Some(event(25)));
        assert_eq!(second.next_event().await, Some(event(25)));
        expect_no_event(&mut other).await;
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = InProcessEventService::new();
        let mut subscription = bus.subscribe(&principal(1)).expect("subscribe");

        for value in [10, 20, 30] {
            bus.publish(1, event(value));
        }
        for value in [10, 20, 30] {
            assert_eq!(subscription.next_event().await, Some(event(value)));
        }
    }

    #[tokio::test]
    async fn overflow_evicts_the_slow_subscriber() {
        let bus = InProcessEventService::new();
        let mut subscription = bus.subscribe(&principal(1)).expect("subscribe");

        // One more than the buffer holds: the last publish evicts.
        for value in 0..=(EVENT_BUFFER_SIZE as i32) {
            bus.publish(1, event(value));
        }

        // The buffered events drain, then the stream ends.
        for value in 0..EVENT_BUFFER_SIZE as i32 {
            assert_eq!(subscription.next_event().await, Some(event(value)));
        }
        assert_eq!(subscription.next_event().await, None);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_the_stream() {
        let bus = InProcessEventService::new();
        let mut subscription = bus.subscribe(&principal(1)).expect("subscribe");
        bus.publish(1, event(5));

        subscription.close();
        subscription.close();

        // Buffered events still drain after close, then the stream ends.
        assert_eq!(subscription.next_event().await, Some(event(5)));
        assert_eq!(subscription.next_event().await, None);

        // Publishing to a user with no subscriptions is a no-op.
        bus.publish(1, event(6));
    }

    #[tokio::test]
    async fn dropped_subscriptions_unregister_themselves() {
        let bus = InProcessEventService::new();
        let subscription = bus.subscribe(&principal(1)).expect("subscribe");
        drop(subscription);
        bus.publish(1, event(1));
    }

    #[tokio::test]
    async fn noop_service_drops_publishes_and_refuses_subscriptions() {
        let bus = NoopEventService::new();
        bus.publish(1, event(1));
        let error = bus.subscribe(&principal(1)).err().expect("no subscriptions");
        assert_eq!(error.code(), ErrorCode::NotImplemented);
    }
}
