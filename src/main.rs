//! metaradar — host daemon
//!
//! Reads NDJSON host messages on stdin, checks every scan batch against the
//! loaded radar profiles and writes profile matches and following alerts as
//! NDJSON on stdout. Logs go to stderr so they never mix with events.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;

use metaradar::{alert, defaults, device, following, profile, protocol};

use alert::AlertGate;
use following::{FollowingConfig, MemoryHistory};
use profile::{check_batch, load_profiles, RadarProfile};
use protocol::{HostMessage, MacString, ProfileEvent, RadarMessage, MAX_MSG_LEN, VERSION};

#[derive(Parser, Debug)]
#[command(name = "metaradar", version, about = "BLE radar profile engine")]
struct Args {
    /// JSON file with saved radar profiles
    #[arg(short, long)]
    profiles: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Distinct locations before a device counts as following
    #[arg(long, default_value_t = defaults::FOLLOWING_MIN_DISTINCT_LOCATIONS)]
    min_locations: usize,

    /// Minimum time span of co-located detections (ms)
    #[arg(long, default_value_t = defaults::FOLLOWING_MIN_SPAN_MS)]
    min_span_ms: i64,

    /// Samples closer than this count as one location (meters)
    #[arg(long, default_value_t = defaults::FOLLOWING_PROXIMITY_RADIUS_M)]
    radius_m: f64,

    /// Forget location samples older than this (ms); 0 keeps them forever
    #[arg(long, default_value_t = defaults::FOLLOWING_MAX_HISTORY_AGE_MS)]
    max_history_age_ms: i64,
}

impl Args {
    fn following_config(&self) -> FollowingConfig {
        FollowingConfig {
            min_distinct_locations: self.min_locations,
            min_span_ms: self.min_span_ms,
            proximity_radius_m: self.radius_m,
            max_history_age_ms: history_age(self.max_history_age_ms),
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────

fn init_logger(level: LevelFilter) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .target(Target::Stderr)
        .init();
}

fn get_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// A non-positive age disables the history limit.
fn history_age(age_ms: i64) -> Option<i64> {
    (age_ms > 0).then_some(age_ms)
}

fn epoch_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => {
            log::warn!("System clock is {:?} before the epoch, using 0", e.duration());
            0
        }
    }
}

// ── Engine state ─────────────────────────────────────────────────────

struct Radar {
    profiles: Vec<RadarProfile>,
    history: MemoryHistory,
    config: FollowingConfig,
    alerts: AlertGate,
}

impl Radar {
    fn new(profiles: Vec<RadarProfile>, config: FollowingConfig) -> Self {
        Self {
            profiles,
            history: MemoryHistory::new(),
            config,
            alerts: AlertGate::default(),
        }
    }

    fn handle<W: Write>(&mut self, msg: HostMessage, out: &mut W) -> io::Result<()> {
        match msg {
            HostMessage::Batch {
                mut devices,
                location,
                now_ms,
            } => {
                let now = now_ms.unwrap_or_else(epoch_millis);
                for device in &mut devices {
                    if device.manufacturer_name.is_none() {
                        device.manufacturer_name = device
                            .manufacturer_id
                            .and_then(defaults::manufacturer_name)
                            .map(String::from);
                    }
                }
                devices.sort_by(device::compare_for_display);

                if let Some(fix) = &location {
                    let recorded = self.history.record_batch(&devices, fix, now);
                    log::debug!("Recorded {} location sample(s)", recorded);
                }
                if let Some(age) = self.config.max_history_age_ms {
                    self.history.prune_before(now.saturating_sub(age));
                }

                let report = check_batch(&self.profiles, &devices, &self.history, &self.config, now);
                let report = self.alerts.admit(report, now);
                for detection in &report.detections {
                    let event = ProfileEvent::from_detection(detection);
                    emit(out, &event.message(now))?;
                }
                for address in &report.following {
                    let mac: MacString = protocol::truncated(address);
                    emit(out, &RadarMessage::Following { mac: &mac, ts: now })?;
                }
            }
            HostMessage::Profiles { profiles } => {
                self.profiles = profiles.into_iter().map(RadarProfile::from).collect();
                log::info!("Loaded {} profile(s) from host", self.profiles.len());
            }
            HostMessage::GetStatus => {
                let active = self.profiles.iter().filter(|p| p.is_active).count();
                emit(
                    out,
                    &RadarMessage::Status {
                        profiles: self.profiles.len() as u32,
                        active: active as u32,
                        devices: self.history.device_count() as u32,
                        version: VERSION,
                    },
                )?;
            }
            HostMessage::SetFollowing {
                min_distinct_locations,
                min_span_ms,
                proximity_radius_m,
                max_history_age_ms,
            } => {
                if let Some(v) = min_distinct_locations {
                    self.config.min_distinct_locations = v;
                }
                if let Some(v) = min_span_ms {
                    self.config.min_span_ms = v;
                }
                if let Some(v) = proximity_radius_m {
                    self.config.proximity_radius_m = v;
                }
                if let Some(v) = max_history_age_ms {
                    self.config.max_history_age_ms = history_age(v);
                }
                log::info!("Following thresholds now {:?}", self.config);
            }
        }
        out.flush()
    }
}

fn emit<W: Write>(out: &mut W, msg: &RadarMessage) -> io::Result<()> {
    let mut buf = [0u8; MAX_MSG_LEN];
    match protocol::serialize_message(msg, &mut buf) {
        Some(len) => out.write_all(&buf[..len]),
        None => {
            log::warn!("Event does not fit in {} bytes, dropped", MAX_MSG_LEN);
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(get_log_level(&args.log_level));

    log::info!("metaradar v{} starting", VERSION);

    let profiles = match &args.profiles {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            load_profiles(BufReader::new(file))
                .with_context(|| format!("reading profiles from {}", path.display()))?
        }
        None => Vec::new(),
    };
    log::info!("{} profile(s) loaded", profiles.len());

    let mut radar = Radar::new(profiles, args.following_config());

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if let Some(msg) = protocol::parse_host_message(&line) {
            radar.handle(msg, &mut out).context("writing event")?;
        }
    }

    log::info!("Input closed, exiting");
    Ok(())
}
