/// Cooldowns for repeated alerts.
///
/// A device that keeps qualifying would raise the same alert on every scan
/// batch. The gate remembers when each device last alerted, per profile and
/// for following, and only lets a repeat through once its cooldown passed.
use std::collections::HashMap;
use std::hash::Hash;

use crate::defaults::{FOLLOWING_ALERT_COOLDOWN_MS, PROFILE_ALERT_COOLDOWN_MS};
use crate::profile::BatchReport;

/// Last alert time per key.
#[derive(Debug)]
pub struct AlertThrottle<K> {
    cooldown_ms: i64,
    last_alert: HashMap<K, i64>,
}

impl<K: Eq + Hash> AlertThrottle<K> {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            cooldown_ms,
            last_alert: HashMap::new(),
        }
    }

    /// Whether `key` may alert at `now_ms`. An allowed alert is recorded.
    pub fn allow(&mut self, key: K, now_ms: i64) -> bool {
        match self.last_alert.get(&key) {
            Some(&last) if now_ms.saturating_sub(last) < self.cooldown_ms => false,
            _ => {
                self.last_alert.insert(key, now_ms);
                true
            }
        }
    }

    /// Forget keys whose cooldown has run out.
    pub fn prune(&mut self, now_ms: i64) {
        let cooldown = self.cooldown_ms;
        self.last_alert
            .retain(|_, last| now_ms.saturating_sub(*last) < cooldown);
    }

    pub fn len(&self) -> usize {
        self.last_alert.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_alert.is_empty()
    }
}

/// Filters batch reports down to alerts not raised recently.
#[derive(Debug)]
pub struct AlertGate {
    following: AlertThrottle<String>,
    /// Keyed by (profile name, device address)
    profiles: AlertThrottle<(String, String)>,
}

impl AlertGate {
    pub fn new(following_cooldown_ms: i64, profile_cooldown_ms: i64) -> Self {
        Self {
            following: AlertThrottle::new(following_cooldown_ms),
            profiles: AlertThrottle::new(profile_cooldown_ms),
        }
    }

    /// Remove alerts still in cooldown from `report`.
    ///
    /// A profile detection keeps only the addresses that may alert, and is
    /// dropped when none are left.
    pub fn admit(&mut self, report: BatchReport, now_ms: i64) -> BatchReport {
        self.following.prune(now_ms);
        self.profiles.prune(now_ms);
        let offered = alert_count(&report);

        let profiles = &mut self.profiles;
        let detections = report
            .detections
            .into_iter()
            .filter_map(|mut detection| {
                let name = &detection.profile_name;
                detection
                    .addresses
                    .retain(|address| profiles.allow((name.clone(), address.clone()), now_ms));
                (!detection.addresses.is_empty()).then_some(detection)
            })
            .collect();

        let following = report
            .following
            .into_iter()
            .filter(|address| self.following.allow(address.clone(), now_ms))
            .collect();

        let admitted = BatchReport {
            detections,
            following,
        };
        let suppressed = offered - alert_count(&admitted);
        if suppressed > 0 {
            log::debug!("Suppressed {} repeat alert(s)", suppressed);
        }
        admitted
    }
}

fn alert_count(report: &BatchReport) -> usize {
    report.following.len() + report.detections.iter().map(|d| d.addresses.len()).sum::<usize>()
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(FOLLOWING_ALERT_COOLDOWN_MS, PROFILE_ALERT_COOLDOWN_MS)
    }
}
