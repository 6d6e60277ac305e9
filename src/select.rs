//! Chip-select arbitration
//!
//! At most one device's select line may be asserted at any instant on a
//! shared bus. The arbiter tracks which line is asserted and which device,
//! if any, is sticky: a `cs_hold` device whose line intentionally stays
//! asserted across message boundaries.

use crate::device::{DeviceConfig, DeviceId};

pub(crate) struct Arbiter {
    asserted: Option<DeviceId>,
    sticky: Option<DeviceId>,
}

impl Arbiter {
    pub(crate) const fn new() -> Self {
        Arbiter {
            asserted: None,
            sticky: None,
        }
    }

    /// Assert `id`'s select line, releasing any other device's line first
    pub(crate) fn select(&mut self, id: DeviceId, devices: &[DeviceConfig]) {
        if let Some(previous) = self.asserted {
            if previous != id {
                devices[previous.0].set_select(false);
                if self.sticky == Some(previous) {
                    self.sticky = None;
                }
            }
        }
        devices[id.0].set_select(true);
        self.asserted = Some(id);
        if devices[id.0].cs_hold {
            self.sticky = Some(id);
        }
    }

    /// Release `id`'s select line and drop its stickiness
    pub(crate) fn deselect(&mut self, id: DeviceId, devices: &[DeviceConfig]) {
        if self.sticky == Some(id) {
            self.sticky = None;
        }
        if self.asserted == Some(id) {
            self.asserted = None;
        }
        devices[id.0].set_select(false);
    }

    /// The device whose line is currently asserted
    pub(crate) fn asserted(&self) -> Option<DeviceId> {
        self.asserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Electrical line levels observed by the fake pins. Tests mutate the
    // shared lines, so they serialize on GUARD and reset before running.
    static LINES: [AtomicBool; 3] = [
        AtomicBool::new(true),  // device 0: active low, idle high
        AtomicBool::new(false), // device 1: active high, idle low
        AtomicBool::new(true),  // device 2: active low, idle high
    ];
    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn reset_lines() {
        LINES[0].store(true, Ordering::Relaxed);
        LINES[1].store(false, Ordering::Relaxed);
        LINES[2].store(true, Ordering::Relaxed);
    }

    fn pin0(level: bool) {
        LINES[0].store(level, Ordering::Relaxed);
    }
    fn pin1(level: bool) {
        LINES[1].store(level, Ordering::Relaxed);
    }
    fn pin2(level: bool) {
        LINES[2].store(level, Ordering::Relaxed);
    }

    fn devices() -> [DeviceConfig; 3] {
        [
            DeviceConfig {
                set_cs: Some(pin0),
                ..DeviceConfig::default()
            },
            DeviceConfig {
                cs_active_high: true,
                cs_hold: true,
                set_cs: Some(pin1),
                ..DeviceConfig::default()
            },
            DeviceConfig {
                set_cs: Some(pin2),
                ..DeviceConfig::default()
            },
        ]
    }

    fn asserted_count(devices: &[DeviceConfig]) -> usize {
        devices
            .iter()
            .enumerate()
            .filter(|(i, d)| LINES[*i].load(Ordering::Relaxed) == d.cs_active_high)
            .count()
    }

    #[test]
    fn at_most_one_line_asserted() {
        let _guard = GUARD.lock().unwrap();
        reset_lines();
        let devices = devices();
        let mut arbiter = Arbiter::new();
        for step in 0..100 {
            let id = DeviceId(step % 3);
            if step % 7 < 4 {
                arbiter.select(id, &devices);
            } else {
                arbiter.deselect(id, &devices);
            }
            assert!(
                asserted_count(&devices) <= 1,
                "two select lines asserted after step {}",
                step
            );
        }
    }

    #[test]
    fn selecting_releases_the_sticky_device() {
        let _guard = GUARD.lock().unwrap();
        reset_lines();
        let devices = devices();
        let mut arbiter = Arbiter::new();

        // Device 1 holds its line across messages.
        arbiter.select(DeviceId(1), &devices);
        assert_eq!(arbiter.asserted(), Some(DeviceId(1)));
        assert!(LINES[1].load(Ordering::Relaxed));

        // A different device takes the bus; the sticky line must drop.
        arbiter.select(DeviceId(0), &devices);
        assert!(!LINES[1].load(Ordering::Relaxed));
        assert!(!LINES[0].load(Ordering::Relaxed)); // active low
        assert_eq!(asserted_count(&devices), 1);
    }

    #[test]
    fn deselect_clears_stickiness() {
        let _guard = GUARD.lock().unwrap();
        reset_lines();
        let devices = devices();
        let mut arbiter = Arbiter::new();
        arbiter.select(DeviceId(1), &devices);
        arbiter.deselect(DeviceId(1), &devices);
        assert_eq!(arbiter.asserted(), None);
        assert_eq!(asserted_count(&devices), 0);
    }
}
