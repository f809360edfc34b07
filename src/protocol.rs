/// NDJSON message protocol between the radar engine and its host.
///
/// Outgoing events (profile matches, following alerts, status) use
/// `heapless` types and serialize into a fixed buffer with
/// `serde_json_core`, so emitting an alert never allocates. Incoming host
/// messages carry whole device lists and profile rows and are parsed with
/// `serde_json`.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceObservation, LocationFix};
use crate::profile::{ProfileDetection, ProfileRow};

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length for profile names in events
pub type NameString = String<33>;

/// Addresses listed per profile match event; the `devices` count is exact.
pub const MAX_EVENT_ADDRESSES: usize = 8;

pub type AddressList = Vec<MacString, MAX_EVENT_ADDRESSES>;

/// Messages sent from the engine to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum RadarMessage<'a> {
    /// A radar profile matched devices of the latest batch
    #[serde(rename = "profile")]
    ProfileMatch {
        profile: &'a NameString,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        /// Total matched devices
        devices: u32,
        /// First matched addresses, up to [`MAX_EVENT_ADDRESSES`]
        addresses: &'a AddressList,
        /// Epoch milliseconds of the batch
        ts: i64,
    },
    /// A device appears to be travelling with the user
    #[serde(rename = "following")]
    Following { mac: &'a MacString, ts: i64 },
    /// Engine status report
    #[serde(rename = "status")]
    Status {
        profiles: u32,
        active: u32,
        /// Devices with location history
        devices: u32,
        version: &'static str,
    },
}

/// Owned fixed-size parts of a profile match event.
pub struct ProfileEvent {
    pub name: NameString,
    pub id: Option<i64>,
    pub devices: u32,
    pub addresses: AddressList,
}

impl ProfileEvent {
    pub fn from_detection(detection: &ProfileDetection) -> Self {
        let mut addresses = AddressList::new();
        for address in detection.addresses.iter().take(MAX_EVENT_ADDRESSES) {
            let _ = addresses.push(truncated(address));
        }
        Self {
            name: truncated(&detection.profile_name),
            id: detection.profile_id,
            devices: detection.addresses.len() as u32,
            addresses,
        }
    }

    pub fn message(&self, ts: i64) -> RadarMessage<'_> {
        RadarMessage::ProfileMatch {
            profile: &self.name,
            id: self.id,
            devices: self.devices,
            addresses: &self.addresses,
            ts,
        }
    }
}

/// Copy as much of `s` as fits, never splitting a character.
pub fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Messages sent from the host to the engine
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// A scan batch, with the user's location if one is known
    Batch {
        devices: std::vec::Vec<DeviceObservation>,
        #[serde(default)]
        location: Option<LocationFix>,
        /// Batch time; the host clock is used when absent
        #[serde(default)]
        now_ms: Option<i64>,
    },
    /// Replace the profile list
    Profiles { profiles: std::vec::Vec<ProfileRow> },
    /// Request a status report
    GetStatus,
    /// Adjust following thresholds; absent fields keep their value
    SetFollowing {
        #[serde(default)]
        min_distinct_locations: Option<usize>,
        #[serde(default)]
        min_span_ms: Option<i64>,
        #[serde(default)]
        proximity_radius_m: Option<f64>,
        /// Zero or negative keeps history forever
        #[serde(default)]
        max_history_age_ms: Option<i64>,
    },
}

/// Engine version reported in status messages
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized event
pub const MAX_MSG_LEN: usize = 512;

/// Serialize a message as one NDJSON line into `buf`.
/// Returns the number of bytes written, or None if it does not fit.
pub fn serialize_message(msg: &RadarMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Parse one line from the host. Blank and malformed lines yield None.
pub fn parse_host_message(line: &str) -> Option<HostMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(msg) => Some(msg),
        Err(e) => {
            log::warn!("Ignoring malformed host message: {}", e);
            None
        }
    }
}
