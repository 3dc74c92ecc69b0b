//! This module provides the normalisation stages that clean up a raw sample stream.
//!
//! Each stage is an iterator adaptor, and they're meant to be chained in this order:
//!
//! ```ignore
//! source
//!     .data_feed()?
//!     .with_corrected_percentages()
//!     .with_corrected_distances()
//!     .with_pit_stop_counts()
//! ```

use crate::TelemetrySample;

/// A lap fraction above this is considered to be approaching the start/finish line.
const NEAR_LINE_END: f32 = 0.9;

/// A lap fraction below this is considered to be just past the start/finish line.
const NEAR_LINE_START: f32 = 0.1;

/// Extension methods for any stream of [`TelemetrySample`]s.
pub trait FeedExt: Iterator<Item = TelemetrySample> + Sized {
    /// Repair the lap fraction of every sample.
    ///
    /// Off-track readings (negative or NaN) are replaced with the last good value, everything
    /// is clamped into `[0, 1]`, and a sample whose lap counter has advanced before its
    /// fraction has wrapped around gets a fraction of zero.
    fn with_corrected_percentages(self) -> CorrectedPercentages<Self> {
        CorrectedPercentages {
            inner: self,
            last: None,
        }
    }

    /// Fill in [`TelemetrySample::distance`] as the lap plus the lap fraction.
    ///
    /// If the fraction wraps around before the lap counter ticks over, the extra lap is
    /// counted straight away so that the distance doesn't jump backwards.
    fn with_corrected_distances(self) -> CorrectedDistances<Self> {
        CorrectedDistances {
            inner: self,
            last: None,
            wrapped_on_lap: None,
        }
    }

    /// Fill in [`TelemetrySample::pit_stop_count`] by counting entries to the pit lane.
    ///
    /// The count starts at zero and is reset whenever the session changes.
    fn with_pit_stop_counts(self) -> PitStopCounts<Self> {
        PitStopCounts {
            inner: self,
            last: None,
            count: 0,
        }
    }
}

impl<I: Iterator<Item = TelemetrySample>> FeedExt for I {}

/// See [`FeedExt::with_corrected_percentages`].
#[derive(Debug)]
pub struct CorrectedPercentages<I> {
    inner: I,

    /// The lap and corrected fraction of the previous sample.
    last: Option<(i32, f32)>,
}

impl<I: Iterator<Item = TelemetrySample>> Iterator for CorrectedPercentages<I> {
    type Item = TelemetrySample;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sample = self.inner.next()?;

        let mut pct = if sample.lap_dist_pct.is_nan() || sample.lap_dist_pct < 0. {
            self.last.map_or(0., |(_, pct)| pct)
        } else {
            sample.lap_dist_pct.min(1.)
        };

        if let Some((last_lap, _)) = self.last {
            if sample.lap > last_lap && pct > NEAR_LINE_END {
                pct = 0.;
            }
        }

        sample.lap_dist_pct = pct;
        self.last = Some((sample.lap, pct));
        Some(sample)
    }
}

/// See [`FeedExt::with_corrected_distances`].
#[derive(Debug)]
pub struct CorrectedDistances<I> {
    inner: I,

    /// The lap and fraction of the previous sample.
    last: Option<(i32, f32)>,

    /// The lap on which the fraction wrapped around without the lap counter moving.
    wrapped_on_lap: Option<i32>,
}

impl<I: Iterator<Item = TelemetrySample>> Iterator for CorrectedDistances<I> {
    type Item = TelemetrySample;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sample = self.inner.next()?;

        if let Some((last_lap, last_pct)) = self.last {
            if sample.lap != last_lap {
                self.wrapped_on_lap = None;
            } else if last_pct > NEAR_LINE_END && sample.lap_dist_pct < NEAR_LINE_START {
                self.wrapped_on_lap = Some(sample.lap);
            }
        }

        let extra_lap = if self.wrapped_on_lap == Some(sample.lap) {
            1.
        } else {
            0.
        };
        sample.distance = sample.lap.max(0) as f32 + sample.lap_dist_pct + extra_lap;

        self.last = Some((sample.lap, sample.lap_dist_pct));
        Some(sample)
    }
}

/// See [`FeedExt::with_pit_stop_counts`].
#[derive(Debug)]
pub struct PitStopCounts<I> {
    inner: I,

    /// The session number and pit road state of the previous sample.
    last: Option<(i32, bool)>,

    /// Pit lane entries so far this session.
    count: u32,
}

impl<I: Iterator<Item = TelemetrySample>> Iterator for PitStopCounts<I> {
    type Item = TelemetrySample;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sample = self.inner.next()?;

        match self.last {
            Some((session, was_on_pit_road)) if session == sample.session_num => {
                if sample.on_pit_road && !was_on_pit_road {
                    self.count += 1;
                }
            }
            _ => self.count = 0,
        }

        sample.pit_stop_count = self.count;
        self.last = Some((sample.session_num, sample.on_pit_road));
        Some(sample)
    }
}
