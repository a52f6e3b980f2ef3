//! Persisted gain profiles, keyed by `device_id` (spec §6).
//!
//! Grounded in the teacher app's `settings::load_settings`/`save_settings`
//! (`dictum-app/src/settings.rs`): read-or-default on load, atomic
//! write-via-temp-then-rename on save. Unlike the teacher's single
//! `AppSettings` struct, the persisted payload here is a map of
//! `device_id -> GainProfile`, so a parse failure moves the whole file aside
//! rather than silently discarding one field.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::model::GainProfile;

/// Storage for per-device gain profiles. A real deployment persists to disk
/// through `FileProfileStore`; tests may swap in an in-memory fake.
pub trait ProfileStore: Send + Sync {
    fn load_all(&self) -> Result<HashMap<String, GainProfile>>;
    fn save(&self, profile: &GainProfile) -> Result<()>;
    fn delete(&self, device_id: &str) -> Result<()>;
    fn active(&self) -> Result<Option<String>>;
    fn set_active(&self, device_id: &str) -> Result<()>;
}

/// On-disk layout: one JSON file holding every device's profile plus which
/// device is currently active.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    profiles: HashMap<String, GainProfile>,
    #[serde(default)]
    active_device: Option<String>,
}

/// JSON-file-backed `ProfileStore`.
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// XDG-style default path, mirroring the teacher's
    /// `settings::default_settings_path` (`$XDG_DATA_HOME` or
    /// `$HOME/.local/share`, falling back to `/tmp`).
    pub fn default_path() -> PathBuf {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("voicetranslate")
            .join("profiles.json")
    }

    /// Read-or-default: missing file yields an empty state; a file that
    /// fails to parse is renamed to a `.bak` sibling and an empty state is
    /// loaded instead, so a corrupt payload never blocks startup.
    fn read_state(&self) -> PersistedState {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return PersistedState::default();
        };
        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => {
                let migrated: HashMap<String, GainProfile> = state
                    .profiles
                    .into_iter()
                    .map(|(id, profile)| (id, profile.migrate()))
                    .collect();
                PersistedState {
                    profiles: migrated,
                    active_device: state.active_device,
                }
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "profile store corrupt, moving aside");
                let backup = self.path.with_extension("json.bak");
                let _ = fs::rename(&self.path, &backup);
                PersistedState::default()
            }
        }
    }

    /// Atomic write: serialize to a sibling temp file, then rename over the
    /// target so a crash mid-write never leaves a half-written payload.
    fn write_state(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ProfileStore for FileProfileStore {
    fn load_all(&self) -> Result<HashMap<String, GainProfile>> {
        Ok(self.read_state().profiles)
    }

    fn save(&self, profile: &GainProfile) -> Result<()> {
        let mut state = self.read_state();
        state
            .profiles
            .insert(profile.device_id.clone(), profile.clone());
        self.write_state(&state)
    }

    fn delete(&self, device_id: &str) -> Result<()> {
        let mut state = self.read_state();
        state.profiles.remove(device_id);
        if state.active_device.as_deref() == Some(device_id) {
            state.active_device = None;
        }
        self.write_state(&state)
    }

    fn active(&self) -> Result<Option<String>> {
        Ok(self.read_state().active_device)
    }

    fn set_active(&self, device_id: &str) -> Result<()> {
        let mut state = self.read_state();
        state.active_device = Some(device_id.to_string());
        self.write_state(&state)
    }
}

fn profile_path(dir: &Path) -> PathBuf {
    dir.join("profiles.json")
}
