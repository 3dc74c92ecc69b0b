//! This crate provides the [`TelemetrySource`] trait, the [`TelemetrySample`] that sources
//! produce, and the normalisation stages in [`FeedExt`].

use std::io;
use thiserror::Error;

mod events;
mod feed;
mod flags;
mod replay;
mod sample;

#[cfg(all(windows, feature = "iracing"))]
mod iracing;

pub use self::{
    events::{announce_new_sessions, SampleHandler, SessionAnnouncer, Subscribers, SubscriptionId},
    feed::{CorrectedDistances, CorrectedPercentages, FeedExt, PitStopCounts},
    flags::SessionFlags,
    replay::ReplaySource,
    sample::TelemetrySample,
};

#[cfg(all(windows, feature = "iracing"))]
pub use self::iracing::IracingSource;

/// A blocking stream of samples. It ends when the source can't produce any more.
pub type DataFeed = Box<dyn Iterator<Item = TelemetrySample> + Send>;

/// An error from a telemetry source.
#[derive(Debug, Error)]
#[allow(missing_docs, reason = "the #[error] attributes document the variants")]
pub enum TelemetryError {
    #[error("IO error: `{0:?}`")]
    Io(#[from] io::Error),

    #[error("Error parsing samples: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("The replay has no samples")]
    EmptyReplay,

    #[error("Telemetry source unavailable: {0}")]
    Unavailable(&'static str),
}

/// The trait implemented by everything that can provide simulator telemetry.
pub trait TelemetrySource: Send + Sync {
    /// Is the simulator there to be read from?
    fn is_connected(&self) -> bool;

    /// Run the handler with the first sample of every new session that a feed from this
    /// source sees.
    fn subscribe(&self, handler: SampleHandler) -> SubscriptionId;

    /// Remove a handler. Returns false if it wasn't subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Open a new stream of samples.
    fn data_feed(&self) -> Result<DataFeed, TelemetryError>;
}
