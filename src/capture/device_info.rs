//! Device enumeration metadata (spec §4.A `list_devices`).

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device, grounded in the teacher's
/// `audio::device::DeviceInfo` loopback/recommendation heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub is_loopback: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "what u hear",
    "loopback",
    "monitor of",
    "virtual output",
];

/// Best-effort heuristic for system-output-capture devices, matching the
/// teacher's `is_loopback_like_name`.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}
