/// Default thresholds and reference data for the radar engine.
///
/// Following thresholds are starting values for [`crate::following::FollowingConfig`];
/// the host can override them at runtime.

/// Distinct locations a device must be seen at before it counts as following.
pub const FOLLOWING_MIN_DISTINCT_LOCATIONS: usize = 3;

/// Minimum time between the first and last co-located detection (1 day).
pub const FOLLOWING_MIN_SPAN_MS: i64 = 24 * 60 * 60 * 1000;

/// Two samples closer than this (meters) are the same location.
pub const FOLLOWING_PROXIMITY_RADIUS_M: f64 = 100.0;

/// Location samples older than this (30 days) are forgotten.
pub const FOLLOWING_MAX_HISTORY_AGE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Consecutive samples of one device closer than this (meters) are merged.
/// Kept well below the proximity radius so merging never hides a location.
pub const SAMPLE_MERGE_RADIUS_M: f64 = 10.0;

/// Minimum time between two following alerts for the same device (1 hour).
pub const FOLLOWING_ALERT_COOLDOWN_MS: i64 = 60 * 60 * 1000;

/// Minimum time between two alerts for the same profile and device (10 min).
pub const PROFILE_ALERT_COOLDOWN_MS: i64 = 10 * 60 * 1000;

/// A location fix older than this (2 min) is not associated with new
/// detections.
pub const LOCATION_FRESHNESS_MS: i64 = 2 * 60 * 1000;

/// Bluetooth SIG company identifiers commonly seen in consumer devices.
///
/// Used to fill in a manufacturer name when the scan pipeline only
/// delivered the id.
pub static KNOWN_MANUFACTURERS: &[(u16, &str)] = &[
    (0x0002, "Intel Corp."),
    (0x0006, "Microsoft"),
    (0x000D, "Texas Instruments Inc."),
    (0x000F, "Broadcom Corporation"),
    (0x004C, "Apple, Inc."),
    (0x0059, "Nordic Semiconductor ASA"),
    (0x0075, "Samsung Electronics Co. Ltd."),
    (0x0087, "Garmin International, Inc."),
    (0x00E0, "Google"),
];

/// Look up a manufacturer name by company id.
pub fn manufacturer_name(id: u16) -> Option<&'static str> {
    KNOWN_MANUFACTURERS
        .iter()
        .find(|&&(known, _)| known == id)
        .map(|&(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manufacturer_lookup() {
        assert_eq!(manufacturer_name(0x004C), Some("Apple, Inc."));
        assert_eq!(manufacturer_name(0xFFFF), None);
    }

    #[test]
    fn manufacturer_table_sorted_unique() {
        for pair in KNOWN_MANUFACTURERS.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{:#06x} out of order", pair[1].0);
        }
    }

    #[test]
    fn following_defaults_sane() {
        assert!(FOLLOWING_MIN_DISTINCT_LOCATIONS >= 2);
        assert!(FOLLOWING_MIN_SPAN_MS > 0);
        assert!(FOLLOWING_PROXIMITY_RADIUS_M > 0.0);
        assert!(FOLLOWING_MAX_HISTORY_AGE_MS > FOLLOWING_MIN_SPAN_MS);
        assert!(SAMPLE_MERGE_RADIUS_M < FOLLOWING_PROXIMITY_RADIUS_M);
    }

    #[test]
    fn alert_cooldowns_positive() {
        assert!(FOLLOWING_ALERT_COOLDOWN_MS > 0);
        assert!(PROFILE_ALERT_COOLDOWN_MS > 0);
    }
}
