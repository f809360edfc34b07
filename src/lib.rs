//! metaradar — BLE radar profile engine.
//!
//! A radar profile is a named, persisted filter tree over observed Bluetooth
//! devices. This crate holds everything between a scan pipeline and an
//! alert sink: the filter model and its JSON codec, the editable draft form
//! used by profile editors, the "is this device following me" heuristic,
//! and the batch checker that runs every active profile over each scan.
//!
//! Modules:
//! - `device` — observed devices and location samples
//! - `filter` — the filter tree and its evaluator
//! - `codec` — lossless JSON encoding of filter trees
//! - `draft` — mutable filter drafts for editing
//! - `following` — following heuristic and location history
//! - `profile` — radar profiles, persistence and batch checking
//! - `alert` — cooldowns so a device does not re-alert every batch
//! - `protocol` — NDJSON messages to and from the host
//! - `defaults`, `error` — thresholds, reference tables and the error type
//!
//! The `metaradar` binary wires these together over stdin/stdout.

pub mod alert;
pub mod codec;
pub mod defaults;
pub mod device;
pub mod draft;
pub mod error;
pub mod filter;
pub mod following;
pub mod profile;
pub mod protocol;

pub use error::{RadarError, Result};
