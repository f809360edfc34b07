/// Radar profiles and per-batch matching.
///
/// A profile is a named, saved filter. Each scan batch is checked against a
/// snapshot of the profile list: the caller lends the slice for the whole
/// pass, so no profile can change halfway through a batch.
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::device::DeviceObservation;
use crate::error::Result;
use crate::filter::{CheckContext, Filter};
use crate::following::{check_following, FollowingConfig, LocationHistory};

#[derive(Debug, Clone, PartialEq)]
pub struct RadarProfile {
    /// Storage id, `None` until first saved
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Root of the filter tree. A profile without one never matches.
    pub detect_filter: Option<Filter>,
}

impl RadarProfile {
    /// An active, unsaved profile.
    pub fn new(name: &str, detect_filter: Option<Filter>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            is_active: true,
            detect_filter,
        }
    }

    /// Whether this profile fires for `device`.
    pub fn matches(&self, device: &DeviceObservation, ctx: &CheckContext) -> bool {
        self.is_active
            && self
                .detect_filter
                .as_ref()
                .is_some_and(|f| f.matches(device, ctx))
    }

    /// Whether checking this profile needs the following verdict.
    pub fn uses_following(&self) -> bool {
        self.is_active && self.detect_filter.as_ref().is_some_and(Filter::uses_following)
    }

    pub fn to_row(&self) -> ProfileRow {
        ProfileRow {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
            detect_filter: self.detect_filter.as_ref().map(codec::encode),
        }
    }
}

impl From<ProfileRow> for RadarProfile {
    fn from(row: ProfileRow) -> Self {
        let detect_filter = row.detect_filter.as_deref().map(codec::decode);
        if detect_filter.as_ref().is_some_and(Filter::has_unknown) {
            log::warn!("Profile '{}' has filter nodes this version cannot read", row.name);
        }
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            detect_filter,
        }
    }
}

/// Stored form of a profile: the filter is one encoded string column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub detect_filter: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Read a JSON array of profile rows.
pub fn load_profiles<R: Read>(reader: R) -> Result<Vec<RadarProfile>> {
    let rows: Vec<ProfileRow> = serde_json::from_reader(reader)?;
    Ok(rows.into_iter().map(RadarProfile::from).collect())
}

/// Write profiles as a JSON array of rows.
pub fn save_profiles<W: Write>(writer: W, profiles: &[RadarProfile]) -> Result<()> {
    let rows: Vec<ProfileRow> = profiles.iter().map(RadarProfile::to_row).collect();
    serde_json::to_writer_pretty(writer, &rows)?;
    Ok(())
}

/// Devices of one batch that matched one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDetection {
    /// Index into the profile slice passed to [`check_batch`]
    pub profile_index: usize,
    pub profile_id: Option<i64>,
    pub profile_name: String,
    /// Matched device addresses, in batch order
    pub addresses: Vec<String>,
}

/// Outcome of checking one scan batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One entry per profile with at least one match, in profile order
    pub detections: Vec<ProfileDetection>,
    /// Addresses the following heuristic flagged, in batch order. Only
    /// devices that some active profile needed a verdict for are checked.
    pub following: Vec<String>,
}

/// Check a scan batch against every active profile.
///
/// Each (device, profile) pair is evaluated to completion in turn. The
/// following verdict for a device is computed on first use and reused for
/// every other profile in the batch.
pub fn check_batch<H: LocationHistory + ?Sized>(
    profiles: &[RadarProfile],
    devices: &[DeviceObservation],
    history: &H,
    config: &FollowingConfig,
    now_ms: i64,
) -> BatchReport {
    let mut following: Vec<Option<bool>> = vec![None; devices.len()];
    let mut report = BatchReport::default();

    for (profile_index, profile) in profiles.iter().enumerate() {
        if !profile.is_active || profile.detect_filter.is_none() {
            continue;
        }
        let needs_following = profile.uses_following();

        let mut addresses = Vec::new();
        for (device, verdict) in devices.iter().zip(following.iter_mut()) {
            let is_following = if needs_following {
                *verdict.get_or_insert_with(|| check_following(history, &device.address, config, now_ms))
            } else {
                false
            };
            let ctx = CheckContext::new(now_ms, is_following);
            if profile.matches(device, &ctx) {
                addresses.push(device.address.clone());
            }
        }

        if !addresses.is_empty() {
            log::info!("Profile '{}' matched {} device(s)", profile.name, addresses.len());
            report.detections.push(ProfileDetection {
                profile_index,
                profile_id: profile.id,
                profile_name: profile.name.clone(),
                addresses,
            });
        }
    }

    report.following = devices
        .iter()
        .zip(&following)
        .filter(|(_, verdict)| **verdict == Some(true))
        .map(|(device, _)| device.address.clone())
        .collect();

    log::debug!(
        "Batch of {} device(s) against {} profile(s): {} detection(s), {} following",
        devices.len(),
        profiles.len(),
        report.detections.len(),
        report.following.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LocationSample;
    use crate::error::Result;
    use core::cell::Cell;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const NOW: i64 = 10 * DAY_MS;

    /// History that reports every device as following and counts lookups.
    struct CountingHistory {
        calls: Cell<usize>,
    }

    impl CountingHistory {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl LocationHistory for CountingHistory {
        fn locations(&self, _address: &str) -> Result<Vec<LocationSample>> {
            self.calls.set(self.calls.get() + 1);
            Ok((0..4)
                .map(|i| LocationSample {
                    lat: 50.0 + i as f64 * 0.1,
                    lng: 8.0,
                    time_ms: NOW - 3 * DAY_MS + i * DAY_MS,
                })
                .collect())
        }
    }

    fn devices() -> Vec<DeviceObservation> {
        vec![
            DeviceObservation {
                name: Some("Pixel".into()),
                ..DeviceObservation::new("AA:01", NOW)
            },
            DeviceObservation {
                favorite: true,
                ..DeviceObservation::new("AA:02", NOW)
            },
            DeviceObservation::new("AA:03", NOW - DAY_MS),
        ]
    }

    // ── RadarProfile ────────────────────────────────────────────────

    #[test]
    fn inactive_profile_never_matches() {
        let mut profile = RadarProfile::new("all", Some(Filter::All(vec![])));
        let ctx = CheckContext::new(NOW, false);
        assert!(profile.matches(&devices()[0], &ctx));
        profile.is_active = false;
        assert!(!profile.matches(&devices()[0], &ctx));
    }

    #[test]
    fn profile_without_filter_never_matches() {
        let profile = RadarProfile::new("empty", None);
        assert!(!profile.matches(&devices()[0], &CheckContext::new(NOW, true)));
    }

    #[test]
    fn row_round_trip() {
        let profile = RadarProfile {
            id: Some(7),
            description: Some("tails".into()),
            ..RadarProfile::new("Tail", Some(Filter::all([Filter::IsFollowing, Filter::favorite(false)])))
        };
        let row = profile.to_row();
        assert_eq!(
            row.detect_filter.as_deref(),
            Some(r#"{"type":"all","filters":[{"type":"is_following"},{"type":"is_favorite","favorite":false}]}"#)
        );
        assert_eq!(RadarProfile::from(row), profile);
    }

    #[test]
    fn row_with_corrupt_filter_still_loads() {
        let row = ProfileRow {
            id: Some(1),
            name: "broken".into(),
            description: None,
            is_active: true,
            detect_filter: Some("not json".into()),
        };
        let profile = RadarProfile::from(row);
        assert_eq!(profile.name, "broken");
        assert!(matches!(profile.detect_filter, Some(Filter::Unknown(_))));
        assert!(!profile.matches(&devices()[0], &CheckContext::new(NOW, true)));
    }

    #[test]
    fn load_and_save_profiles() {
        let json = r#"[
            {"id": 1, "name": "Pixels", "detect_filter": "{\"type\":\"name_is\",\"name\":\"pixel\"}"},
            {"name": "Off", "is_active": false}
        ]"#;
        let profiles = load_profiles(json.as_bytes()).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].detect_filter, Some(Filter::name("pixel", true)));
        assert!(profiles[0].is_active);
        assert!(!profiles[1].is_active);

        let mut out = Vec::new();
        save_profiles(&mut out, &profiles).unwrap();
        assert_eq!(load_profiles(out.as_slice()).unwrap(), profiles);
    }

    #[test]
    fn load_profiles_rejects_bad_file() {
        assert!(load_profiles("{".as_bytes()).is_err());
    }

    // ── check_batch ─────────────────────────────────────────────────

    #[test]
    fn batch_detections_in_profile_order() {
        let profiles = vec![
            RadarProfile::new("favorites", Some(Filter::favorite(true))),
            RadarProfile::new("nobody", Some(Filter::Any(vec![]))),
            RadarProfile::new("pixels", Some(Filter::name("PIXEL", true))),
            RadarProfile::new("lost", Some(Filter::min_lost_time(DAY_MS))),
        ];
        let history = CountingHistory::new();
        let report = check_batch(&profiles, &devices(), &history, &FollowingConfig::new(), NOW);

        let summary: Vec<(usize, &str, Vec<&str>)> = report
            .detections
            .iter()
            .map(|d| (d.profile_index, d.profile_name.as_str(), d.addresses.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "favorites", vec!["AA:02"]),
                (2, "pixels", vec!["AA:01"]),
                (3, "lost", vec!["AA:03"]),
            ]
        );
        assert_eq!(history.calls.get(), 0, "no profile asked for following");
        assert!(report.following.is_empty());
    }

    #[test]
    fn following_computed_once_per_device() {
        let profiles = vec![
            RadarProfile::new("tail", Some(Filter::IsFollowing)),
            RadarProfile::new("tail, not favorite", Some(Filter::all([Filter::IsFollowing, Filter::favorite(false)]))),
            RadarProfile::new("negated", Some(Filter::negate(Filter::IsFollowing))),
        ];
        let devs = devices();
        let history = CountingHistory::new();
        let report = check_batch(&profiles, &devs, &history, &FollowingConfig::new(), NOW);

        assert_eq!(history.calls.get(), devs.len());
        assert_eq!(report.following, vec!["AA:01", "AA:02", "AA:03"]);
        assert_eq!(report.detections.len(), 2);
        assert_eq!(report.detections[1].addresses, vec!["AA:01", "AA:03"]);
    }

    #[test]
    fn inactive_following_profile_skips_lookup() {
        let mut tail = RadarProfile::new("tail", Some(Filter::IsFollowing));
        tail.is_active = false;
        let history = CountingHistory::new();
        let report = check_batch(&[tail], &devices(), &history, &FollowingConfig::new(), NOW);
        assert_eq!(history.calls.get(), 0);
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn empty_batch() {
        let profiles = vec![RadarProfile::new("tail", Some(Filter::IsFollowing))];
        let report = check_batch(&profiles, &[], &CountingHistory::new(), &FollowingConfig::new(), NOW);
        assert_eq!(report, BatchReport::default());
    }
}
