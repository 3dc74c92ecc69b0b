//! This module provides [`TelemetrySample`].

use crate::SessionFlags;
use serde::{Deserialize, Serialize};

/// One snapshot of the simulator's state for the player's car.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySample {
    /// Which session of the event this is. Practice, qualifying, and the race all have
    /// different numbers.
    pub session_num: i32,

    /// The flags being shown right now.
    pub session_flags: SessionFlags,

    /// Ground speed in metres per second.
    pub speed: f32,

    /// Fuel use in kilograms per hour.
    pub fuel_use_per_hour: f32,

    /// The lap the car is on.
    pub lap: i32,

    /// How far around the current lap the car is, from 0 to 1. Negative when the car is not
    /// on track.
    pub lap_dist_pct: f32,

    /// Is the car between the pit lane cones?
    pub on_pit_road: bool,

    /// The total distance covered, in laps. Filled in by
    /// [`with_corrected_distances`](crate::FeedExt::with_corrected_distances).
    pub distance: f32,

    /// How many times the car has entered the pit lane this session. Filled in by
    /// [`with_pit_stop_counts`](crate::FeedExt::with_pit_stop_counts).
    pub pit_stop_count: u32,
}

impl TelemetrySample {
    /// The speed in kilometres per hour.
    pub fn speed_kph(&self) -> f32 {
        self.speed * 3.6
    }
}
