//! Reference `CaptureDevice` implementation backed by `cpal`.
//!
//! Grounded directly in the teacher's `audio::AudioCapture`: the stream is
//! `!Send` on Windows/macOS (COM/CoreAudio thread affinity), so it must be
//! created and dropped on the same OS thread — callers typically do this
//! from a dedicated thread, not from an async task directly.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use tracing::{error, warn};

use super::{device_info::is_loopback_like_name, CaptureError, CaptureDevice, DeviceInfo};
use crate::model::Frame;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

/// `CaptureDevice` backed by the system default (or named) microphone.
pub struct CpalCaptureDevice {
    #[cfg(feature = "audio-cpal")]
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
    pub sample_rate: u32,
}

impl Default for CpalCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalCaptureDevice {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "audio-cpal")]
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            sample_rate: 0,
        }
    }
}

#[cfg(feature = "audio-cpal")]
pub fn enumerate_input_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo {
                    id: name.clone(),
                    is_loopback: is_loopback_like_name(&name),
                    name,
                    is_default,
                }
            })
            .collect(),
        Err(e) => {
            warn!("failed to enumerate input devices: {e}");
            vec![]
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn enumerate_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(feature = "audio-cpal")]
impl CaptureDevice for CpalCaptureDevice {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        enumerate_input_devices()
    }

    fn start_capture(
        &mut self,
        device_id: Option<&str>,
        _is_loopback: bool,
        mut callback: Box<dyn FnMut(Frame) + Send>,
    ) -> std::result::Result<(), CaptureError> {
        let host = cpal::default_host();
        let device = match device_id {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(name.to_string()))?,
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no default input".into()))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let stream = match supported.sample_format() {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    let mono = super::downmix_to_mono(data, channels);
                    callback(Frame::new(mono, sample_rate, Instant::now()));
                },
                |err| error!("capture stream error: {err}"),
                None,
            ),
            SampleFormat::F32 => {
                let running2 = Arc::clone(&self.running);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if !running2.load(Ordering::Relaxed) {
                            return;
                        }
                        let mono_f32 = super::downmix_f32_to_mono(data, channels);
                        let mono = super::f32_to_i16(&mono_f32);
                        callback(Frame::new(mono, sample_rate, Instant::now()));
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }
            fmt => return Err(CaptureError::UnsupportedSampleRate(sample_rate).tap_unsupported(fmt)),
        }
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        self.sample_rate = sample_rate;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.running.store(false, Ordering::Release);
        self.stream = None;
    }
}

#[cfg(feature = "audio-cpal")]
trait TapUnsupported {
    fn tap_unsupported(self, fmt: SampleFormat) -> CaptureError;
}

#[cfg(feature = "audio-cpal")]
impl TapUnsupported for CaptureError {
    fn tap_unsupported(self, fmt: SampleFormat) -> CaptureError {
        warn!("unsupported cpal sample format: {fmt:?}");
        self
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl CaptureDevice for CpalCaptureDevice {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        vec![]
    }

    fn start_capture(
        &mut self,
        _device_id: Option<&str>,
        _is_loopback: bool,
        _callback: Box<dyn FnMut(Frame) + Send>,
    ) -> std::result::Result<(), CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "compiled without audio-cpal feature".into(),
        ))
    }

    fn stop_capture(&mut self) {}
}
