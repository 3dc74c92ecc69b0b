//! This module provides [`FuelUsageLog`].

use std::sync::Mutex;
use tracing_unwrap::ResultExt;

/// Every fuel use reading taken so far, in kilograms per hour.
///
/// Any thread can append to this through a shared reference. Nothing is ever removed.
#[derive(Debug, Default)]
pub struct FuelUsageLog(Mutex<Vec<f32>>);

impl FuelUsageLog {
    /// Add a reading.
    pub fn push(&self, fuel_use_per_hour: f32) {
        self.0
            .lock()
            .expect_or_log("Should be able to lock the fuel usage log")
            .push(fuel_use_per_hour);
    }

    /// A copy of every reading.
    pub fn snapshot(&self) -> Vec<f32> {
        self.0
            .lock()
            .expect_or_log("Should be able to lock the fuel usage log")
            .clone()
    }

    /// How many readings there are.
    pub fn len(&self) -> usize {
        self.0
            .lock()
            .expect_or_log("Should be able to lock the fuel usage log")
            .len()
    }

    /// Are there no readings yet?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The mean of the readings, or `None` if there aren't any.
pub fn average(readings: &[f32]) -> Option<f32> {
    if readings.is_empty() {
        None
    } else {
        Some(readings.iter().sum::<f32>() / readings.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn concurrent_pushes_are_all_kept() {
        const PRODUCERS: usize = 8;
        const READINGS: usize = 1000;

        let log = Arc::new(FuelUsageLog::default());
        let threads: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..READINGS {
                        log.push((producer * READINGS + i) as f32);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(log.len(), PRODUCERS * READINGS);

        let mut readings: Vec<u32> = log.snapshot().into_iter().map(|x| x as u32).collect();
        readings.sort_unstable();
        assert_eq!(readings, (0..(PRODUCERS * READINGS) as u32).collect::<Vec<_>>());
    }

    #[test]
    fn average_test() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[1., 2., 3., 6.]), Some(3.));
    }
}
