//! `GainProfile` — persisted per-device gain state, owned by `AutoTuner`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a device's gain is currently being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainMode {
    Hardware,
    Digital,
    Unknown,
}

/// Current `profile_version` written by this build. Bump when adding fields
/// that must be backfilled on load from older payloads.
pub const CURRENT_PROFILE_VERSION: u32 = 1;

/// Per-device gain profile. Created by `AutoTuner`, updated in place on
/// re-tune, persisted and keyed by `device_id` through `ProfileStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GainProfile {
    pub device_id: String,
    pub device_name: String,
    pub mode: GainMode,
    pub gain_db: f32,
    pub digital_multiplier: f32,
    pub noise_floor_db: f32,
    pub peak_db: f32,
    pub rms_db: f32,
    pub snr_db: f32,
    pub sample_rate: u32,
    pub captured_at: DateTime<Utc>,
    pub confidence: f32,
    #[serde(default = "default_profile_version")]
    pub version: u32,
}

fn default_profile_version() -> u32 {
    // Payloads written before this field existed are version 0.
    0
}

impl GainProfile {
    pub fn db_to_multiplier(db: f32) -> f32 {
        10f32.powf(db / 20.0)
    }

    /// Backfill any field introduced after `version` with documented
    /// defaults, then bump `version` to `CURRENT_PROFILE_VERSION`.
    pub fn migrate(mut self) -> Self {
        if self.version < 1 {
            // v0 -> v1: snr_db was not recorded; derive from peak/noise floor.
            if self.snr_db == 0.0 {
                self.snr_db = self.peak_db - self.noise_floor_db;
            }
        }
        self.version = CURRENT_PROFILE_VERSION;
        self
    }
}
