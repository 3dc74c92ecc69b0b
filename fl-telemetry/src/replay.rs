//! This module provides [`ReplaySource`], which plays back recorded samples.

use crate::{
    announce_new_sessions, DataFeed, SampleHandler, Subscribers, SubscriptionId, TelemetryError,
    TelemetrySample, TelemetrySource,
};
use std::{fs, path::Path, sync::Arc, thread, time::Duration};
use tracing::{info, instrument};

/// A telemetry source that loops over a fixed list of samples, one per tick.
#[derive(Debug)]
pub struct ReplaySource {
    samples: Arc<[TelemetrySample]>,
    tick: Duration,
    subscribers: Arc<Subscribers>,
}

impl ReplaySource {
    /// Replay the given samples, waiting `tick` between each one.
    pub fn new(samples: Vec<TelemetrySample>, tick: Duration) -> Self {
        Self {
            samples: samples.into(),
            tick,
            subscribers: Arc::new(Subscribers::default()),
        }
    }

    /// Load a RON list of samples from a file.
    #[instrument]
    pub fn from_file(path: &Path, tick: Duration) -> Result<Self, TelemetryError> {
        let samples: Vec<TelemetrySample> = ron::from_str(&fs::read_to_string(path)?)?;
        info!(count = samples.len(), "Loaded replay samples");
        Ok(Self::new(samples, tick))
    }

    /// The samples being replayed.
    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }
}

impl TelemetrySource for ReplaySource {
    fn is_connected(&self) -> bool {
        !self.samples.is_empty()
    }

    fn subscribe(&self, handler: SampleHandler) -> SubscriptionId {
        self.subscribers.subscribe(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn data_feed(&self) -> Result<DataFeed, TelemetryError> {
        if self.samples.is_empty() {
            return Err(TelemetryError::EmptyReplay);
        }

        let samples = Arc::clone(&self.samples);
        let tick = self.tick;
        let raw = (0..).map(move |i: usize| {
            if i > 0 && !tick.is_zero() {
                thread::sleep(tick);
            }
            samples[i % samples.len()].clone()
        });

        Ok(Box::new(announce_new_sessions(
            raw,
            Arc::clone(&self.subscribers),
        )))
    }
}
