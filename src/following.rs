/// "Is this device following me" heuristic.
///
/// A device follows the user when it keeps being detected next to them at
/// several places that are far apart, over a long enough stretch of time.
/// One location never qualifies no matter how long the device stays there:
/// that is a neighbour, not a tail.
///
/// History comes from the persistence layer through [`LocationHistory`].
/// Reading it may be slow, so the batch checker asks at most once per device
/// per scan batch and only when some active profile uses `IsFollowing`.
use std::collections::HashMap;

use crate::defaults::{
    FOLLOWING_MAX_HISTORY_AGE_MS, FOLLOWING_MIN_DISTINCT_LOCATIONS, FOLLOWING_MIN_SPAN_MS,
    FOLLOWING_PROXIMITY_RADIUS_M, SAMPLE_MERGE_RADIUS_M,
};
use crate::device::{DeviceObservation, LocationFix, LocationSample};
use crate::error::Result;

/// Thresholds for the following heuristic. Adjustable at runtime by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowingConfig {
    /// Distinct locations required. Values below 2 are treated as 2.
    pub min_distinct_locations: usize,
    /// Minimum time between the earliest and latest sample
    pub min_span_ms: i64,
    /// Samples within this distance (meters) count as one location
    pub proximity_radius_m: f64,
    /// Ignore samples older than this, if set
    pub max_history_age_ms: Option<i64>,
}

impl FollowingConfig {
    pub const fn new() -> Self {
        Self {
            min_distinct_locations: FOLLOWING_MIN_DISTINCT_LOCATIONS,
            min_span_ms: FOLLOWING_MIN_SPAN_MS,
            proximity_radius_m: FOLLOWING_PROXIMITY_RADIUS_M,
            max_history_age_ms: Some(FOLLOWING_MAX_HISTORY_AGE_MS),
        }
    }
}

impl Default for FollowingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the heuristic saw for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowingAnalysis {
    pub distinct_locations: usize,
    pub span_ms: i64,
    pub is_following: bool,
}

/// Analyze one device's location samples.
///
/// Samples are clustered greedily in time order: a sample starts a new
/// location when it is farther than the proximity radius from every
/// location seen so far.
pub fn analyze(samples: &[LocationSample], config: &FollowingConfig, now_ms: i64) -> FollowingAnalysis {
    let cutoff = config.max_history_age_ms.map(|age| now_ms.saturating_sub(age));
    let mut recent: Vec<&LocationSample> = samples
        .iter()
        .filter(|s| cutoff.map_or(true, |c| s.time_ms >= c))
        .collect();
    recent.sort_by_key(|s| s.time_ms);

    let mut centers: Vec<(f64, f64)> = Vec::new();
    for s in &recent {
        let is_new = centers
            .iter()
            .all(|&(lat, lng)| haversine_m(lat, lng, s.lat, s.lng) > config.proximity_radius_m);
        if is_new {
            centers.push((s.lat, s.lng));
        }
    }

    let span_ms = match (recent.first(), recent.last()) {
        (Some(first), Some(last)) => last.time_ms.saturating_sub(first.time_ms),
        _ => 0,
    };
    let required = config.min_distinct_locations.max(2);

    FollowingAnalysis {
        distinct_locations: centers.len(),
        span_ms,
        is_following: centers.len() >= required && span_ms >= config.min_span_ms,
    }
}

/// Source of device-location associations.
pub trait LocationHistory {
    /// All samples recorded for the device with `address`.
    fn locations(&self, address: &str) -> Result<Vec<LocationSample>>;
}

/// Look up history and run the heuristic. A history failure is logged and
/// reported as "not following".
pub fn check_following<H: LocationHistory + ?Sized>(
    history: &H,
    address: &str,
    config: &FollowingConfig,
    now_ms: i64,
) -> bool {
    match history.locations(address) {
        Ok(samples) => {
            let analysis = analyze(&samples, config, now_ms);
            log::debug!(
                "{}: {} locations over {} ms, following={}",
                address,
                analysis.distinct_locations,
                analysis.span_ms,
                analysis.is_following
            );
            analysis.is_following
        }
        Err(e) => {
            log::warn!("Following check skipped: {}", e);
            false
        }
    }
}

/// In-memory location history keyed by device address.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    by_address: HashMap<String, Vec<LocationSample>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. When the device's last two samples and the new one
    /// all lie within [`SAMPLE_MERGE_RADIUS_M`] of each other, the newest
    /// sample is moved forward instead, so a stationary run keeps only its
    /// first and last sample.
    pub fn record(&mut self, address: &str, sample: LocationSample) {
        let samples = self.by_address.entry(address.into()).or_default();
        if let [.., prev, last] = samples.as_mut_slice() {
            if is_near(prev, &sample) && is_near(last, &sample) && last.time_ms <= sample.time_ms {
                *last = sample;
                return;
            }
        }
        samples.push(sample);
    }

    /// Associate the devices detected in this scan batch with the user's
    /// location.
    ///
    /// Does nothing when the fix is stale. Devices whose last detection is
    /// not close in time to the fix (lost devices carried in the batch) get
    /// no sample. Samples are stamped with the device's detection time.
    /// Returns the number of samples recorded.
    pub fn record_batch(&mut self, devices: &[DeviceObservation], fix: &LocationFix, now_ms: i64) -> usize {
        if !fix.is_fresh(now_ms) {
            log::debug!(
                "Location fix is {} ms old, not associating batch",
                now_ms.saturating_sub(fix.time_ms)
            );
            return 0;
        }
        let mut recorded = 0;
        for device in devices.iter().filter(|d| fix.covers(d.last_detect_time_ms)) {
            self.record(&device.address, fix.sample_at(device.last_detect_time_ms));
            recorded += 1;
        }
        recorded
    }

    /// Drop samples older than `cutoff_ms` and forget devices left empty.
    pub fn prune_before(&mut self, cutoff_ms: i64) {
        self.by_address.retain(|_, samples| {
            samples.retain(|s| s.time_ms >= cutoff_ms);
            !samples.is_empty()
        });
    }

    /// Number of devices with at least one sample.
    pub fn device_count(&self) -> usize {
        self.by_address.len()
    }
}

fn is_near(a: &LocationSample, b: &LocationSample) -> bool {
    haversine_m(a.lat, a.lng, b.lat, b.lng) <= SAMPLE_MERGE_RADIUS_M
}

impl LocationHistory for MemoryHistory {
    fn locations(&self, address: &str) -> Result<Vec<LocationSample>> {
        Ok(self.by_address.get(address).cloned().unwrap_or_default())
    }
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadarError;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn config() -> FollowingConfig {
        FollowingConfig {
            min_distinct_locations: 3,
            min_span_ms: DAY_MS,
            ..FollowingConfig::new()
        }
    }

    /// `count` samples about 5 km apart, evenly spread over `span_ms`.
    fn trail(count: usize, span_ms: i64) -> Vec<LocationSample> {
        (0..count)
            .map(|i| LocationSample {
                lat: 52.0 + 0.045 * i as f64,
                lng: 13.0,
                time_ms: if count > 1 { span_ms * i as i64 / (count as i64 - 1) } else { 0 },
            })
            .collect()
    }

    // ── Distance ────────────────────────────────────────────────────

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_m(52.5, 13.4, 52.5, 13.4) < 1e-6);
    }

    #[test]
    fn haversine_one_degree_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    // ── Heuristic ───────────────────────────────────────────────────

    #[test]
    fn five_locations_over_three_days_follows() {
        let a = analyze(&trail(5, 3 * DAY_MS), &config(), 3 * DAY_MS);
        assert_eq!(a.distinct_locations, 5);
        assert_eq!(a.span_ms, 3 * DAY_MS);
        assert!(a.is_following);
    }

    #[test]
    fn single_observation_never_follows() {
        for span in [0, DAY_MS, 30 * DAY_MS] {
            let samples = [LocationSample { lat: 1.0, lng: 1.0, time_ms: span }];
            assert!(!analyze(&samples, &config(), span).is_following);
        }
    }

    #[test]
    fn one_location_never_follows_even_with_low_threshold() {
        let samples: Vec<_> = (0..10)
            .map(|i| LocationSample { lat: 52.0, lng: 13.0, time_ms: i * DAY_MS })
            .collect();
        let permissive = FollowingConfig {
            min_distinct_locations: 1,
            min_span_ms: 0,
            ..config()
        };
        let a = analyze(&samples, &permissive, 10 * DAY_MS);
        assert_eq!(a.distinct_locations, 1);
        assert!(!a.is_following);
    }

    #[test]
    fn nearby_samples_merge_into_one_location() {
        // ~11 m apart, well inside the 100 m radius
        let samples: Vec<_> = (0..4)
            .map(|i| LocationSample { lat: 52.0 + 0.0001 * i as f64, lng: 13.0, time_ms: i * DAY_MS })
            .collect();
        assert_eq!(analyze(&samples, &config(), 0).distinct_locations, 1);
    }

    #[test]
    fn short_span_does_not_follow() {
        let a = analyze(&trail(5, DAY_MS / 2), &config(), DAY_MS);
        assert_eq!(a.distinct_locations, 5);
        assert!(!a.is_following);
    }

    #[test]
    fn too_few_locations_does_not_follow() {
        let a = analyze(&trail(2, 3 * DAY_MS), &config(), 3 * DAY_MS);
        assert!(!a.is_following);
    }

    #[test]
    fn unsorted_samples_same_result() {
        let mut samples = trail(5, 3 * DAY_MS);
        samples.reverse();
        assert!(analyze(&samples, &config(), 3 * DAY_MS).is_following);
    }

    #[test]
    fn history_age_limit_drops_old_samples() {
        let limited = FollowingConfig {
            max_history_age_ms: Some(DAY_MS),
            ..config()
        };
        let a = analyze(&trail(5, 3 * DAY_MS), &limited, 3 * DAY_MS);
        // Only the samples at 2.25 and 3 days remain
        assert_eq!(a.distinct_locations, 2);
        assert!(!a.is_following);
    }

    #[test]
    fn empty_history() {
        let a = analyze(&[], &config(), 0);
        assert_eq!(a, FollowingAnalysis { distinct_locations: 0, span_ms: 0, is_following: false });
    }

    // ── History ─────────────────────────────────────────────────────

    #[test]
    fn memory_history_feeds_check() {
        let mut history = MemoryHistory::new();
        for s in trail(5, 3 * DAY_MS) {
            history.record("AA:BB", s);
        }
        assert!(check_following(&history, "AA:BB", &config(), 3 * DAY_MS));
        assert!(!check_following(&history, "CC:DD", &config(), 3 * DAY_MS));
    }

    #[test]
    fn record_batch_requires_fresh_fix() {
        let mut history = MemoryHistory::new();
        let devices = [DeviceObservation::new("AA", 1_500), DeviceObservation::new("BB", 1_500)];
        let fix = LocationFix { lat: 1.0, lng: 2.0, time_ms: 1_000 };

        assert_eq!(history.record_batch(&devices, &fix, 1_000 + 3 * 60 * 1000), 0);
        assert_eq!(history.device_count(), 0);

        assert_eq!(history.record_batch(&devices, &fix, 2_000), 2);
        assert_eq!(history.locations("BB").unwrap(), vec![fix.sample_at(1_500)]);
    }

    #[test]
    fn record_batch_skips_lost_devices() {
        let mut history = MemoryHistory::new();
        let lost = DeviceObservation::new("LOST", 0);
        let seen = |t: i64| DeviceObservation::new("SEEN", t);

        // The user travels for four days; LOST was never detected again.
        for day in 0..4 {
            let now = (day + 1) * DAY_MS;
            let fix = LocationFix { lat: 50.0 + day as f64, lng: 8.0, time_ms: now };
            let recorded = history.record_batch(&[lost.clone(), seen(now)], &fix, now);
            assert_eq!(recorded, 1);
        }

        assert!(history.locations("LOST").unwrap().is_empty());
        assert!(!check_following(&history, "LOST", &config(), 4 * DAY_MS));
        assert!(check_following(&history, "SEEN", &config(), 4 * DAY_MS));
    }

    #[test]
    fn record_merges_stationary_run() {
        let mut history = MemoryHistory::new();
        for i in 0..100 {
            let jitter = if i % 2 == 0 { 0.0 } else { 0.00003 };
            history.record("AA", LocationSample { lat: 52.0 + jitter, lng: 13.0, time_ms: i * 1_000 });
        }
        let samples = history.locations("AA").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].time_ms, 0);
        assert_eq!(samples[1].time_ms, 99_000);

        // Moving away starts a new run.
        history.record("AA", LocationSample { lat: 53.0, lng: 13.0, time_ms: 100_000 });
        assert_eq!(history.locations("AA").unwrap().len(), 3);
    }

    #[test]
    fn default_config_limits_history_age() {
        let config = FollowingConfig::new();
        assert_eq!(config.max_history_age_ms, Some(FOLLOWING_MAX_HISTORY_AGE_MS));

        // A trail that ended long ago no longer counts.
        let old = trail(5, 3 * DAY_MS);
        let now = 3 * DAY_MS + FOLLOWING_MAX_HISTORY_AGE_MS + 1;
        assert!(analyze(&old, &config, 3 * DAY_MS).is_following);
        assert!(!analyze(&old, &config, now).is_following);
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let samples = [
            LocationSample { lat: 0.0, lng: 0.0, time_ms: i64::MIN },
            LocationSample { lat: 10.0, lng: 0.0, time_ms: i64::MAX },
        ];
        let unlimited = FollowingConfig { max_history_age_ms: None, ..config() };
        let a = analyze(&samples, &unlimited, i64::MAX);
        assert_eq!(a.span_ms, i64::MAX);
        let limited = FollowingConfig { max_history_age_ms: Some(i64::MAX), ..config() };
        analyze(&samples, &limited, i64::MIN);

        let mut history = MemoryHistory::new();
        let fix = LocationFix { lat: 0.0, lng: 0.0, time_ms: i64::MIN };
        assert_eq!(history.record_batch(&[DeviceObservation::new("AA", 0)], &fix, i64::MAX), 0);
    }

    #[test]
    fn prune_forgets_empty_devices() {
        let mut history = MemoryHistory::new();
        history.record("AA", LocationSample { lat: 0.0, lng: 0.0, time_ms: 10 });
        history.record("BB", LocationSample { lat: 0.0, lng: 0.0, time_ms: 100 });
        history.prune_before(50);
        assert_eq!(history.device_count(), 1);
        assert!(history.locations("AA").unwrap().is_empty());
    }

    struct BrokenHistory;

    impl LocationHistory for BrokenHistory {
        fn locations(&self, address: &str) -> Result<Vec<LocationSample>> {
            Err(RadarError::History {
                address: address.into(),
                reason: "storage unavailable".into(),
            })
        }
    }

    #[test]
    fn history_failure_means_not_following() {
        assert!(!check_following(&BrokenHistory, "AA", &config(), 0));
    }
}
