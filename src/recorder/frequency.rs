// Per-frequency PTT / squelch activity table
//
// Several transmitters can key the same frequency at once and several radios
// can receive it; the recorder must only see the aggregate transitions. This
// table decides, for every incoming PTT or squelch edge, whether the
// frequency's externally visible state actually changed.

use std::collections::{HashMap, HashSet};

/// Best-signal selection reported with a squelch-on event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BssSelection {
    pub resource_id: String,
    pub method: String,
    pub quality_idx: u32,
}

#[derive(Debug, Default)]
struct FrequencyEntry {
    /// Devices currently keying PTT on this frequency.
    ptt_devices: HashSet<u32>,
    squelch: bool,
    bss: Option<BssSelection>,
}

impl FrequencyEntry {
    fn is_idle(&self) -> bool {
        self.ptt_devices.is_empty() && !self.squelch
    }
}

/// Tracks PTT and squelch activity per frequency literal.
///
/// Entries exist only while the frequency has some activity; a frequency
/// whose PTT set empties with squelch off is removed outright so the table
/// stays bounded by live traffic.
#[derive(Debug, Default)]
pub struct FrequencyActivityTracker {
    entries: HashMap<String, FrequencyEntry>,
}

impl FrequencyActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a PTT edge for one device.
    ///
    /// Returns true only when the aggregate any-device-keying state of the
    /// frequency flipped. A release from a device that was not holding the
    /// frequency is a no-op.
    pub fn set_ptt(&mut self, freq: &str, device: u32, on: bool) -> bool {
        if !on && !self.entries.contains_key(freq) {
            return false;
        }

        let entry = self.entries.entry(freq.to_string()).or_default();
        let was_active = !entry.ptt_devices.is_empty();

        if on {
            entry.ptt_devices.insert(device);
        } else {
            entry.ptt_devices.remove(&device);
        }

        let is_active = !entry.ptt_devices.is_empty();

        if entry.is_idle() {
            self.entries.remove(freq);
        }

        was_active != is_active
    }

    /// Record a squelch edge with its best-signal selection.
    ///
    /// While any device keys PTT on the frequency the transmission masks
    /// reception, so squelch is forced off regardless of `on`.
    ///
    /// Returns `(changed, bss_changed)`: whether the stored squelch state
    /// flipped, and whether the selected resource or method differs from the
    /// previous selection.
    pub fn set_squelch(
        &mut self,
        freq: &str,
        on: bool,
        resource_id: &str,
        method: &str,
        quality_idx: u32,
    ) -> (bool, bool) {
        let ptt_active = self
            .entries
            .get(freq)
            .map(|e| !e.ptt_devices.is_empty())
            .unwrap_or(false);
        let effective = on && !ptt_active;

        if !effective && !self.entries.contains_key(freq) {
            return (false, false);
        }

        let entry = self.entries.entry(freq.to_string()).or_default();
        let previous = entry.squelch;
        let previous_bss = entry.bss.take();

        entry.squelch = effective;
        entry.bss = effective.then(|| BssSelection {
            resource_id: resource_id.to_string(),
            method: method.to_string(),
            quality_idx,
        });

        // The quality index alone does not make a new selection
        let bss_changed = match (&previous_bss, &entry.bss) {
            (Some(a), Some(b)) => a.resource_id != b.resource_id || a.method != b.method,
            (None, None) => false,
            _ => true,
        };

        let changed = previous != effective;

        if entry.is_idle() {
            self.entries.remove(freq);
        }

        (changed, bss_changed)
    }

    /// Aggregate counts: frequencies with PTT active, frequencies with
    /// squelch active. Used by the radio Record/Pause admission rules.
    pub fn counts(&self) -> (usize, usize) {
        let ptt = self
            .entries
            .values()
            .filter(|e| !e.ptt_devices.is_empty())
            .count();
        let squ = self.entries.values().filter(|e| e.squelch).count();
        (ptt, squ)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
