//! This module provides the cancellation signal shared by the background loops, and
//! [`LoopHandle`] for holding onto a running loop.

use std::thread::JoinHandle;
use tokio::sync::watch;

/// Create a linked [`CancelSignal`] and [`CancelToken`].
pub fn cancel_signal() -> (CancelSignal, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSignal(tx), CancelToken(rx))
}

/// The sending half, which asks a loop to stop.
#[derive(Debug)]
pub struct CancelSignal(watch::Sender<bool>);

impl CancelSignal {
    /// Ask the loop to stop. Calling this more than once does nothing extra.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Has [`cancel`](Self::cancel) been called?
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// The receiving half, which a loop checks to see if it should stop.
#[derive(Clone, Debug)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    /// Has the loop been asked to stop?
    ///
    /// If the [`CancelSignal`] has been dropped, nobody can stop the loop any more, so this
    /// counts as cancelled too.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Wait until the loop is asked to stop.
    pub async fn cancelled(&mut self) {
        // An error means the signal was dropped, which also counts
        let _ = self.0.wait_for(|&cancelled| cancelled).await;
    }
}

/// A background loop running in its own thread.
///
/// Dropping this does not stop or join the thread. Call [`cancel`](Self::cancel) first.
#[derive(Debug)]
pub struct LoopHandle {
    signal: CancelSignal,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    /// Hold onto a loop thread along with the signal that stops it.
    pub fn new(signal: CancelSignal, thread: JoinHandle<()>) -> Self {
        Self { signal, thread }
    }

    /// Is the loop still going, and not yet asked to stop?
    pub fn is_running(&self) -> bool {
        !self.signal.is_cancelled() && !self.thread.is_finished()
    }

    /// Ask the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.signal.cancel();
    }
}
