//! This module handles subscribers to "new session data" events.

use crate::TelemetrySample;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};
use tracing::debug;
use tracing_unwrap::ResultExt;

/// A callback that gets run with the first sample of every new session.
pub type SampleHandler = Arc<dyn Fn(&TelemetrySample) + Send + Sync>;

/// An opaque handle to a subscription, used to remove it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A list of subscribed handlers.
#[derive(Default)]
pub struct Subscribers {
    /// The ID to hand out next.
    next_id: AtomicU64,

    /// Every handler with its ID, in subscription order.
    handlers: RwLock<Vec<(SubscriptionId, SampleHandler)>>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Subscribers {
    /// Add a handler and return its ID.
    pub fn subscribe(&self, handler: SampleHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .expect_or_log("Should be able to write to the subscriber list")
            .push((id, handler));
        id
    }

    /// Remove the handler with the given ID. Returns false if there was no such handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .expect_or_log("Should be able to write to the subscriber list");
        let before = handlers.len();
        handlers.retain(|(other, _)| *other != id);
        handlers.len() != before
    }

    /// How many handlers are subscribed.
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .expect_or_log("Should be able to read the subscriber list")
            .len()
    }

    /// Are there no subscribed handlers?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every handler with the given sample.
    ///
    /// The lock is released before any handler runs, so handlers may subscribe or unsubscribe.
    pub fn emit(&self, sample: &TelemetrySample) {
        let handlers: Vec<SampleHandler> = self
            .handlers
            .read()
            .expect_or_log("Should be able to read the subscriber list")
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        debug!(
            session_num = sample.session_num,
            handlers = handlers.len(),
            "New session data"
        );
        for handler in handlers {
            handler(sample);
        }
    }
}

/// An iterator adaptor that emits a sample to its [`Subscribers`] whenever it starts a new
/// session. See [`announce_new_sessions`].
#[derive(Debug)]
pub struct SessionAnnouncer<I> {
    inner: I,
    subscribers: Arc<Subscribers>,
    last_session: Option<i32>,
}

/// Wrap a raw sample stream so that the first sample, and every sample whose session number
/// differs from the one before, gets emitted to the subscribers before it's yielded.
pub fn announce_new_sessions<I>(inner: I, subscribers: Arc<Subscribers>) -> SessionAnnouncer<I>
where
    I: Iterator<Item = TelemetrySample>,
{
    SessionAnnouncer {
        inner,
        subscribers,
        last_session: None,
    }
}

impl<I: Iterator<Item = TelemetrySample>> Iterator for SessionAnnouncer<I> {
    type Item = TelemetrySample;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.inner.next()?;
        if self.last_session != Some(sample.session_num) {
            self.last_session = Some(sample.session_num);
            self.subscribers.emit(&sample);
        }
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn session(session_num: i32) -> TelemetrySample {
        TelemetrySample {
            session_num,
            ..Default::default()
        }
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let subscribers = Subscribers::default();
        let a = subscribers.subscribe(Arc::new(|_: &TelemetrySample| {}));
        let b = subscribers.subscribe(Arc::new(|_: &TelemetrySample| {}));
        assert_ne!(a, b);
        assert_eq!(subscribers.len(), 2);

        assert!(subscribers.unsubscribe(a));
        assert!(!subscribers.unsubscribe(a));
        assert_eq!(subscribers.len(), 1);

        assert!(subscribers.unsubscribe(b));
        assert!(subscribers.is_empty());
    }

    #[test]
    fn emits_on_first_sample_and_session_changes() {
        let subscribers = Arc::new(Subscribers::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        subscribers.subscribe(Arc::new(move |sample: &TelemetrySample| {
            seen_clone.lock().unwrap().push(sample.session_num)
        }));

        let samples = [1, 1, 1, 2, 2, 1].map(session);
        let yielded: Vec<_> = announce_new_sessions(samples.into_iter(), subscribers)
            .map(|sample| sample.session_num)
            .collect();

        assert_eq!(yielded, vec![1, 1, 1, 2, 2, 1]);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }
}
