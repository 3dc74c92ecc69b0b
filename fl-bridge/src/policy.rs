//! This module provides the [`ColourPolicy`] that decides what the lights should look like for a
//! given sample.

use fl_driver_trait::RGBArray;
use fl_telemetry::{SessionFlags, TelemetrySample};
use serde::{Deserialize, Serialize};

/// Which device mode to use for a [`Look`]. See [`ModeIndices`] for how these map to real modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeChoice {
    /// A steady colour.
    Static,

    /// A moving or breathing effect.
    Animated,

    /// Whatever the device does when nothing is happening.
    Baseline,

    /// Leave the device in whatever mode it's already in.
    Unchanged,
}

/// Which LEDs of each zone get the colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fill {
    /// Every LED.
    #[default]
    AllLeds,

    /// Only the first LED.
    SingleLed,
}

impl Fill {
    /// The colours to send to a zone of `led_count` LEDs.
    pub fn colours(self, colour: RGBArray, led_count: usize) -> Vec<RGBArray> {
        match self {
            Self::AllLeds => vec![colour; led_count],
            Self::SingleLed => vec![colour; led_count.min(1)],
        }
    }
}

/// What every device should look like.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Look {
    /// The colour to fill the LEDs with.
    pub colour: RGBArray,

    /// The mode to put the device into.
    pub mode: ModeChoice,

    /// Which LEDs to fill.
    #[serde(default)]
    pub fill: Fill,
}

impl Look {
    /// Fill every LED with the colour.
    pub const fn all(colour: RGBArray, mode: ModeChoice) -> Self {
        Self {
            colour,
            mode,
            fill: Fill::AllLeds,
        }
    }
}

/// Use this look when the sample has this flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRule {
    /// Matches when every bit of this is set. Usually a single flag.
    pub flag: SessionFlags,

    /// The look to use.
    pub look: Look,
}

/// Use this look when the car is faster than this.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedRule {
    /// Matches when the speed is strictly greater than this many kilometres per hour.
    pub above_kph: f32,

    /// The look to use.
    pub look: Look,
}

/// The mapping from telemetry to lights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs, reason = "the variant docs cover the fields")]
pub enum ColourPolicy {
    /// Check the flags against each rule in order, and use the first one that matches.
    FlagTable {
        rules: Vec<FlagRule>,
        fallback: Look,
    },

    /// Use the rule with the highest threshold that the speed is above.
    SpeedThresholds {
        rules: Vec<SpeedRule>,
        fallback: Look,
    },
}

impl Default for ColourPolicy {
    fn default() -> Self {
        Self::default_flag_table()
    }
}

impl ColourPolicy {
    /// The standard flag colours, with the highest priority flag first.
    pub fn default_flag_table() -> Self {
        use ModeChoice::*;

        const GREEN: RGBArray = [0, 255, 0];
        const CAUTION: RGBArray = [255, 255, 0];
        const YELLOW: RGBArray = [255, 215, 0];

        let rule = |flag, look| FlagRule { flag, look };

        Self::FlagTable {
            rules: vec![
                rule(SessionFlags::BLUE, Look::all([0, 0, 255], Static)),
                rule(SessionFlags::GREEN, Look::all(GREEN, Animated)),
                rule(SessionFlags::GREEN_HELD, Look::all(GREEN, Animated)),
                rule(SessionFlags::CAUTION, Look::all(CAUTION, Static)),
                rule(SessionFlags::CAUTION_WAVING, Look::all(CAUTION, Animated)),
                rule(SessionFlags::YELLOW, Look::all(YELLOW, Static)),
                rule(SessionFlags::YELLOW_WAVING, Look::all(YELLOW, Animated)),
                rule(SessionFlags::WHITE, Look::all([255, 255, 255], Static)),
                rule(
                    SessionFlags::START_GO,
                    Look {
                        colour: GREEN,
                        mode: Static,
                        fill: Fill::SingleLed,
                    },
                ),
                rule(SessionFlags::REPAIR, Look::all(GREEN, Unchanged)),
            ],
            fallback: Look::all([255, 0, 0], Baseline),
        }
    }

    /// Red when flat out, blue when quick, and green otherwise.
    pub fn default_speed_thresholds() -> Self {
        Self::SpeedThresholds {
            rules: vec![
                SpeedRule {
                    above_kph: 200.,
                    look: Look::all([255, 0, 0], ModeChoice::Static),
                },
                SpeedRule {
                    above_kph: 100.,
                    look: Look::all([0, 0, 255], ModeChoice::Static),
                },
            ],
            fallback: Look::all([0, 255, 0], ModeChoice::Static),
        }
    }

    /// Pick exactly one look for the sample.
    pub fn select(&self, sample: &TelemetrySample) -> &Look {
        match self {
            Self::FlagTable { rules, fallback } => rules
                .iter()
                .find(|rule| !rule.flag.is_empty() && sample.session_flags.contains(rule.flag))
                .map_or(fallback, |rule| &rule.look),
            Self::SpeedThresholds { rules, fallback } => {
                let kph = sample.speed_kph();
                rules
                    .iter()
                    .filter(|rule| kph > rule.above_kph)
                    .max_by(|a, b| a.above_kph.total_cmp(&b.above_kph))
                    .map_or(fallback, |rule| &rule.look)
            }
        }
    }
}

/// The index of the device mode to use for each [`ModeChoice`].
///
/// The same indices are used for every device, and devices which don't have a mode at some
/// index just keep their current mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeIndices {
    /// For [`ModeChoice::Baseline`].
    pub baseline_mode: usize,

    /// For [`ModeChoice::Static`].
    pub static_mode: usize,

    /// For [`ModeChoice::Animated`].
    pub animated_mode: usize,
}

impl Default for ModeIndices {
    fn default() -> Self {
        Self {
            baseline_mode: 0,
            static_mode: 2,
            animated_mode: 4,
        }
    }
}

impl ModeIndices {
    /// Get the mode index for the choice, or `None` for [`ModeChoice::Unchanged`].
    pub fn resolve(&self, choice: ModeChoice) -> Option<usize> {
        match choice {
            ModeChoice::Static => Some(self.static_mode),
            ModeChoice::Animated => Some(self.animated_mode),
            ModeChoice::Baseline => Some(self.baseline_mode),
            ModeChoice::Unchanged => None,
        }
    }
}
