//! Event system for session observers.
//!
//! Observers see two kinds of events: session state transitions and decoded
//! readings. Transport and decode errors are never published.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::session::SessionState;
use crate::types::Reading;

/// Event types that can be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// A reading was decoded.
    Reading(Box<Reading>),
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone. Events lost to lag are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Dispatches events to subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<Event>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Callback interface for the presentation layer.
///
/// Callbacks run on the observer task spawned by [`spawn_observer`]; hopping
/// to a UI thread is the implementor's concern.
pub trait SessionObserver: Send + Sync + 'static {
    /// Called after every state transition.
    fn on_state_changed(&self, state: SessionState);

    /// Called once per decoded reading, in read order.
    fn on_reading(&self, reading: &Reading);
}

/// Forwards events from `subscription` to `observer` until the dispatcher closes.
pub fn spawn_observer<O>(mut subscription: Subscription, observer: Arc<O>) -> JoinHandle<()>
where
    O: SessionObserver + ?Sized,
{
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match event {
                Event::StateChanged(state) => observer.on_state_changed(state),
                Event::Reading(reading) => observer.on_reading(&reading),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::types::{Acceleration, GpsLocation};

    fn reading(heart_rate: i32) -> Reading {
        Reading {
            device_id: "ESP32-1".into(),
            heart_rate,
            temperature: 36.6,
            location: GpsLocation {
                latitude: 0.0,
                longitude: 0.0,
                altitude: None,
            },
            acceleration: Acceleration::default(),
            timestamp: None,
        }
    }

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<SessionState>>,
        heart_rates: Mutex<Vec<i32>>,
    }

    impl SessionObserver for Recorder {
        fn on_state_changed(&self, state: SessionState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_reading(&self, reading: &Reading) {
            self.heart_rates.lock().unwrap().push(reading.heart_rate);
        }
    }

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(Event::StateChanged(SessionState::Connecting));

        let event = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap();

        assert_eq!(event, Some(Event::StateChanged(SessionState::Connecting)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.dispatch(Event::Reading(Box::new(reading(70))));
    }

    #[tokio::test]
    async fn test_observer_receives_in_order() {
        let dispatcher = EventDispatcher::new(16);
        let recorder = Arc::new(Recorder::default());
        let task = spawn_observer(dispatcher.subscribe(), Arc::clone(&recorder));

        dispatcher.dispatch(Event::StateChanged(SessionState::Connected));
        dispatcher.dispatch(Event::Reading(Box::new(reading(61))));
        dispatcher.dispatch(Event::Reading(Box::new(reading(62))));
        dispatcher.dispatch(Event::StateChanged(SessionState::Disconnected));
        drop(dispatcher);

        task.await.unwrap();
        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![SessionState::Connected, SessionState::Disconnected]
        );
        assert_eq!(*recorder.heart_rates.lock().unwrap(), vec![61, 62]);
    }
}
