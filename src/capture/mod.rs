//! `CaptureDevice` contract (spec §4.A) and a reference `cpal`-backed
//! implementation.
//!
//! The callback thread is owned by the collaborator; it must never block
//! longer than `chunk_ms / 2` and must not perform heavy work. This module's
//! job is to get samples off that thread and into the pipeline's input queue
//! as cheaply as possible — exactly the constraint the teacher's
//! `audio::AudioCapture` callback satisfies via a lock-free ring buffer.

pub mod cpal_device;
pub mod device_info;

use crate::error::Result;
use crate::model::Frame;

pub use device_info::DeviceInfo;

/// Errors specific to opening/using a capture device, distinct from the
/// pipeline-wide `CoreError` so collaborators can be implemented without
/// depending on pipeline internals.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u16),
    #[error("permission denied")]
    PermissionDenied,
}

/// Contract every capture backend must satisfy (spec §4.A, §6).
///
/// Implementations downmix multi-channel input to mono before invoking the
/// callback — the pipeline only ever sees mono frames.
pub trait CaptureDevice: Send {
    fn list_devices(&self) -> Vec<DeviceInfo>;

    /// Start capturing. `callback` is invoked on a dedicated capture thread
    /// at frame rate and must never block longer than `chunk_ms / 2`.
    fn start_capture(
        &mut self,
        device_id: Option<&str>,
        is_loopback: bool,
        callback: Box<dyn FnMut(Frame) + Send>,
    ) -> std::result::Result<(), CaptureError>;

    /// Idempotent: guarantees no callback invocations after it returns.
    fn stop_capture(&mut self);
}

/// A `CaptureError` surfaced as an engine-level event rather than thrown
/// across the capture-thread boundary (spec §4.A failure semantics).
#[derive(Debug, Clone)]
pub struct CaptureErrorEvent {
    pub message: String,
}

impl From<CaptureError> for crate::error::CoreError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::DeviceUnavailable(m) => crate::error::CoreError::CaptureDevice(m),
            CaptureError::UnsupportedSampleRate(r) => {
                crate::error::CoreError::Unsupported(format!("sample rate {r} Hz"))
            }
            CaptureError::UnsupportedChannels(c) => {
                crate::error::CoreError::Unsupported(format!("{c} channels"))
            }
            CaptureError::PermissionDenied => crate::error::CoreError::PermissionDenied,
        }
    }
}

/// Downmix an interleaved multi-channel `i16` buffer to mono.
///
/// Shared by every backend so channel-mixing behavior is consistent; grounded
/// in the teacher's `audio::mod` per-sample-format mixing loops.
pub fn downmix_to_mono(data: &[i16], channels: u16) -> Vec<i16> {
    let ch = channels as usize;
    if ch <= 1 {
        return data.to_vec();
    }
    let frames = data.len() / ch;
    let mut out = Vec::with_capacity(frames);
    for f in 0..frames {
        let base = f * ch;
        let sum: i64 = (0..ch).map(|c| data[base + c] as i64).sum();
        out.push((sum / ch as i64) as i16);
    }
    out
}

pub fn downmix_f32_to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    if ch <= 1 {
        return data.to_vec();
    }
    let frames = data.len() / ch;
    let mut out = Vec::with_capacity(frames);
    for f in 0..frames {
        let base = f * ch;
        let sum: f32 = (0..ch).map(|c| data[base + c]).sum();
        out.push(sum / ch as f32);
    }
    out
}

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|s| *s as f32 / 32768.0).collect()
}

/// Unused by any built `CaptureDevice`, but a convenience entry point mirroring
/// the teacher's module-level `list_input_devices()` helper.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    #[cfg(feature = "audio-cpal")]
    {
        Ok(cpal_device::enumerate_input_devices())
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_stereo_averages_channels() {
        let data = vec![0i16, 100, 200, 300]; // 2 frames, stereo
        let mono = downmix_to_mono(&data, 2);
        assert_eq!(mono, vec![50, 250]);
    }

    #[test]
    fn downmix_mono_passthrough() {
        let data = vec![1i16, 2, 3];
        assert_eq!(downmix_to_mono(&data, 1), data);
    }

    #[test]
    fn f32_i16_roundtrip_is_lossy_but_bounded() {
        let samples = vec![0.5f32, -0.5, 1.0, -1.0, 0.0];
        let i16s = f32_to_i16(&samples);
        let back = i16_to_f32(&i16s);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 0.01);
        }
    }
}
