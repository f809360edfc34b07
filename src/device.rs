/// Device observations and location records fed in by the scan pipeline.
///
/// The radio side (advertisement parsing, deduplication into per-address
/// records) lives outside this crate. What arrives here is one snapshot per
/// known device, plus the location samples the persistence layer associated
/// with it.
use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::defaults::LOCATION_FRESHNESS_MS;

/// A point-in-time snapshot of one detected BLE device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceObservation {
    /// Stable identifier, usually "AA:BB:CC:DD:EE:FF"
    pub address: String,
    /// Advertised local name, if any
    #[serde(default)]
    pub name: Option<String>,
    /// Bluetooth SIG company identifier from manufacturer-specific data
    #[serde(default)]
    pub manufacturer_id: Option<u16>,
    /// Company name resolved from `manufacturer_id`
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    /// Epoch milliseconds of the first detection
    pub first_detect_time_ms: i64,
    /// Epoch milliseconds of the most recent detection
    pub last_detect_time_ms: i64,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub detect_count: u32,
}

impl DeviceObservation {
    /// A device seen exactly once, at `time_ms`.
    pub fn new(address: &str, time_ms: i64) -> Self {
        Self {
            address: address.into(),
            name: None,
            manufacturer_id: None,
            manufacturer_name: None,
            first_detect_time_ms: time_ms,
            last_detect_time_ms: time_ms,
            favorite: false,
            detect_count: 1,
        }
    }

    /// Milliseconds since the device was last detected. Never negative.
    pub fn lost_time_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.last_detect_time_ms).max(0)
    }
}

/// Display ordering: most recently detected first, then most detected,
/// then named devices (alphabetically) before unnamed ones, then address.
pub fn compare_for_display(a: &DeviceObservation, b: &DeviceObservation) -> Ordering {
    b.last_detect_time_ms
        .cmp(&a.last_detect_time_ms)
        .then_with(|| b.detect_count.cmp(&a.detect_count))
        .then_with(|| match (&a.name, &b.name) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.address.cmp(&b.address))
}

/// One device-location association: the device was detected while the user
/// was at (`lat`, `lng`) at `time_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub time_ms: i64,
}

/// The user's location as reported by the platform, stamped with the time
/// it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    pub time_ms: i64,
}

impl LocationFix {
    /// A fix older than [`LOCATION_FRESHNESS_MS`] must not be associated
    /// with new detections.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.time_ms) < LOCATION_FRESHNESS_MS
    }

    /// Whether a detection at `time_ms` happened while this fix was
    /// current, i.e. within [`LOCATION_FRESHNESS_MS`] of it.
    pub fn covers(&self, time_ms: i64) -> bool {
        time_ms.abs_diff(self.time_ms) < LOCATION_FRESHNESS_MS as u64
    }

    /// The sample recorded for a device detected at `time_ms` while this
    /// fix was current.
    pub fn sample_at(&self, time_ms: i64) -> LocationSample {
        LocationSample {
            lat: self.lat,
            lng: self.lng,
            time_ms,
        }
    }
}
