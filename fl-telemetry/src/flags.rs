//! This module provides [`SessionFlags`], the flag bits that iRacing reports for the session.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// The flags currently being shown to the driver, as a bitfield.
    ///
    /// These are the same bit values that iRacing uses for its `SessionFlags` variable, so raw
    /// values from the simulator can be converted with [`SessionFlags::from_bits_retain`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SessionFlags: u32 {
        const CHECKERED = 0x0000_0001;
        const WHITE = 0x0000_0002;
        const GREEN = 0x0000_0004;
        const YELLOW = 0x0000_0008;
        const RED = 0x0000_0010;
        const BLUE = 0x0000_0020;
        const DEBRIS = 0x0000_0040;
        const CROSSED = 0x0000_0080;
        const YELLOW_WAVING = 0x0000_0100;
        const ONE_LAP_TO_GREEN = 0x0000_0200;
        const GREEN_HELD = 0x0000_0400;
        const TEN_TO_GO = 0x0000_0800;
        const FIVE_TO_GO = 0x0000_1000;
        const RANDOM_WAVING = 0x0000_2000;
        const CAUTION = 0x0000_4000;
        const CAUTION_WAVING = 0x0000_8000;

        // Driver black flags
        const BLACK = 0x0001_0000;
        const DISQUALIFY = 0x0002_0000;
        const SERVICIBLE = 0x0004_0000;
        const FURLED = 0x0008_0000;
        const REPAIR = 0x0010_0000;

        // Start lights
        const START_HIDDEN = 0x1000_0000;
        const START_READY = 0x2000_0000;
        const START_SET = 0x4000_0000;
        const START_GO = 0x8000_0000;
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_bits_are_retained() {
        let flags = SessionFlags::from_bits_retain(0x0000_0024 | 0x0400_0000);
        assert!(flags.contains(SessionFlags::BLUE));
        assert!(flags.contains(SessionFlags::GREEN));
        assert!(!flags.contains(SessionFlags::YELLOW));
        assert_eq!(flags.bits(), 0x0400_0024);
    }

    #[test]
    fn flags_are_written_by_name() {
        let flags = SessionFlags::YELLOW_WAVING | SessionFlags::CAUTION;
        let text = ron::to_string(&flags).unwrap();
        assert_eq!(text, "\"YELLOW_WAVING | CAUTION\"");
        assert_eq!(ron::from_str::<SessionFlags>(&text).unwrap(), flags);
    }
}
