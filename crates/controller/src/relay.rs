//! Relay bank with a single shared toggle guard.
//!
//! Relay boards on this rig are active-low: a relay that is logically ON has
//! its control line pulled LOW.  The guard timer is per bank, not per relay,
//! so it bounds how often the whole board switches (shared supply, shared
//! contact wear) at the cost of also throttling unrelated relays.

use crate::hal::OutputPins;
use crate::{RELAY_COUNT, RELAY_GUARD_MS};

pub struct RelayBank<O, const N: usize = RELAY_COUNT> {
    pins: O,
    states: [bool; N],
    /// Time of the last accepted toggle; `None` until the first one.
    last_toggle_ms: Option<u64>,
}

impl<O: OutputPins, const N: usize> RelayBank<O, N> {
    /// Take ownership of the output lines and force every relay OFF.
    pub fn new(mut pins: O) -> Self {
        for index in 0..N {
            pins.set_level(index, true); // active-low relay OFF
        }
        Self {
            pins,
            states: [false; N],
            last_toggle_ms: None,
        }
    }

    pub fn states(&self) -> [bool; N] {
        self.states
    }

    pub fn pins(&self) -> &O {
        &self.pins
    }

    /// Flip relay `index`.  Returns whether the toggle was accepted; an
    /// unknown index or a toggle inside the guard interval is a no-op.
    pub fn toggle(&mut self, index: usize, now_ms: u64) -> bool {
        if index >= N {
            tracing::debug!(index, "toggle ignored: no such relay");
            return false;
        }
        if let Some(last) = self.last_toggle_ms {
            if now_ms.wrapping_sub(last) < RELAY_GUARD_MS {
                tracing::debug!(index, "toggle ignored: inside guard interval");
                return false;
            }
        }

        let on = !self.states[index];
        self.states[index] = on;
        self.pins.set_level(index, !on);
        self.last_toggle_ms = Some(now_ms);

        tracing::info!(index, on, "relay toggled");
        true
    }

    /// Force every relay OFF regardless of the guard.  Used when the driver
    /// shuts down; the guard timer is left alone.
    pub fn all_off(&mut self) {
        for (index, state) in self.states.iter_mut().enumerate() {
            *state = false;
            self.pins.set_level(index, true);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPins;

    fn bank() -> RelayBank<RecordingPins, 3> {
        RelayBank::new(RecordingPins::default())
    }

    // -- Startup --------------------------------------------------------------

    #[test]
    fn new_bank_drives_every_line_high() {
        let bank = bank();
        assert_eq!(bank.states(), [false; 3]);
        assert_eq!(bank.pins().level(0), Some(true));
        assert_eq!(bank.pins().level(1), Some(true));
        assert_eq!(bank.pins().level(2), Some(true));
    }

    // -- Toggle ---------------------------------------------------------------

    #[test]
    fn toggle_on_pulls_line_low() {
        let mut bank = bank();
        assert!(bank.toggle(1, 5_000));
        assert_eq!(bank.states(), [false, true, false]);
        assert_eq!(bank.pins().level(1), Some(false));
    }

    #[test]
    fn first_toggle_after_boot_is_not_throttled() {
        let mut bank = bank();
        assert!(bank.toggle(0, 0));
    }

    #[test]
    fn second_toggle_inside_guard_is_ignored() {
        let mut bank = bank();
        assert!(bank.toggle(0, 1_000));
        assert!(!bank.toggle(0, 1_099));
        assert_eq!(bank.states(), [true, false, false]);
        assert_eq!(bank.pins().level(0), Some(false));
    }

    #[test]
    fn ignored_toggles_never_touch_the_pins() {
        let mut bank = bank();
        assert!(bank.toggle(1, 1_000));
        let settled = bank.pins().writes.len();

        assert!(!bank.toggle(2, 1_050)); // throttled
        assert!(!bank.toggle(7, 2_000)); // out of range
        assert_eq!(bank.pins().writes.len(), settled);
        assert_eq!(bank.pins().writes.last(), Some(&(1, false)));
    }

    #[test]
    fn toggle_after_guard_flips_back() {
        let mut bank = bank();
        assert!(bank.toggle(0, 1_000));
        assert!(bank.toggle(0, 1_100));
        assert_eq!(bank.states(), [false; 3]);
        assert_eq!(bank.pins().level(0), Some(true));
    }

    #[test]
    fn guard_is_shared_across_relays() {
        let mut bank = bank();
        assert!(bank.toggle(0, 1_000));
        assert!(!bank.toggle(2, 1_050));
        assert_eq!(bank.states(), [true, false, false]);
        assert!(bank.toggle(2, 1_150));
        assert_eq!(bank.states(), [true, false, true]);
    }

    #[test]
    fn rejected_toggle_does_not_restart_guard() {
        let mut bank = bank();
        assert!(bank.toggle(0, 1_000));
        assert!(!bank.toggle(1, 1_090));
        // Measured from the accepted toggle at 1000, not the rejected one.
        assert!(bank.toggle(1, 1_100));
    }

    #[test]
    fn guard_survives_clock_wrap() {
        let mut bank = bank();
        assert!(bank.toggle(0, u64::MAX - 10));
        assert!(!bank.toggle(0, 20));
        assert!(bank.toggle(0, 89));
    }

    #[test]
    fn unknown_relay_is_ignored() {
        let mut bank = bank();
        assert!(!bank.toggle(3, 1_000));
        assert!(!bank.toggle(usize::MAX, 1_000));
        assert_eq!(bank.states(), [false; 3]);
        // An ignored toggle does not arm the guard either.
        assert!(bank.toggle(0, 1_001));
    }

    // -- Shutdown -------------------------------------------------------------

    #[test]
    fn all_off_resets_everything() {
        let mut bank = bank();
        bank.toggle(0, 1_000);
        bank.toggle(2, 2_000);
        bank.all_off();
        assert_eq!(bank.states(), [false; 3]);
        for i in 0..3 {
            assert_eq!(bank.pins().level(i), Some(true));
        }
    }
}
