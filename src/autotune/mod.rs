//! `AutoTuner` — the measure → compare → adjust → apply → settle → repeat
//! gain calibration loop (spec §4.J), grounded in
//! `original_source/src/audio/auto_tune/auto_tuner.py`'s `AudioAutoTuner`.

pub mod metrics;

use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;
use crate::gain::GainProcessor;
use crate::model::GainMode;

pub use metrics::LevelMetrics;

/// Captures a short measurement buffer for one device. A real implementation
/// reads from the live capture stream; out of scope per spec §1 as a
/// concrete collaborator.
pub trait AudioMeter: Send {
    fn measure(&mut self, device_id: &str) -> Result<Vec<f32>>;
}

/// Platform hardware gain control, e.g. ALSA mixer / CoreAudio / WASAPI
/// endpoint volume — an out-of-scope concrete collaborator per spec §1.
pub trait HardwareGainController: Send {
    fn supports_hardware_gain(&self, device_id: &str) -> bool;
    /// Apply `gain_db`, returning the gain actually applied (hardware gain
    /// is often quantized to discrete steps).
    fn set_gain(&mut self, device_id: &str, gain_db: f32) -> Result<f32>;
}

const CONVERGENCE_TOLERANCE_DB: f32 = 3.0;
const PEAK_OVERRIDE_THRESHOLD_DB: f32 = -3.0;
const HARDWARE_VERIFY_TOLERANCE_DB: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuneOutcome {
    Converged { iterations: u32, metrics: LevelMetrics },
    DidNotConverge { metrics: LevelMetrics },
}

pub struct AutoTuner {
    gain: std::sync::Arc<GainProcessor>,
    hardware: Option<Box<dyn HardwareGainController>>,
    target_peak_db: f32,
    target_rms_db: f32,
    max_iterations: u32,
    settle_time: Duration,
    /// Devices whose hardware gain failed round-trip verification once;
    /// they stay digital-only for the remainder of the process (spec §4.J /
    /// Open Question 3).
    hardware_downgraded: HashSet<String>,
}

impl AutoTuner {
    pub fn new(
        gain: std::sync::Arc<GainProcessor>,
        hardware: Option<Box<dyn HardwareGainController>>,
        target_peak_db: f32,
        target_rms_db: f32,
        max_iterations: u32,
        settle_time: Duration,
    ) -> Self {
        Self {
            gain,
            hardware,
            target_peak_db,
            target_rms_db,
            max_iterations: max_iterations.max(1),
            settle_time,
            hardware_downgraded: HashSet::new(),
        }
    }

    pub fn is_hardware_downgraded(&self, device_id: &str) -> bool {
        self.hardware_downgraded.contains(device_id)
    }

    /// Run the tuning loop for `device_id`, reading measurement buffers
    /// through `meter`.
    pub fn tune(&mut self, device_id: &str, meter: &mut dyn AudioMeter, sample_rate: u32) -> Result<TuneOutcome> {
        let mut last_metrics = LevelMetrics::default();

        for iteration in 1..=self.max_iterations {
            let buffer = meter.measure(device_id)?;
            let measured = metrics::analyze(&buffer, sample_rate);
            last_metrics = measured;

            if (measured.peak_db - self.target_peak_db).abs() < CONVERGENCE_TOLERANCE_DB
                && (measured.rms_db - self.target_rms_db).abs() < CONVERGENCE_TOLERANCE_DB
            {
                info!(device_id, iteration, "auto-tune converged");
                return Ok(TuneOutcome::Converged {
                    iterations: iteration,
                    metrics: measured,
                });
            }

            let mut delta_db = self.target_rms_db - measured.rms_db;
            if measured.peak_db > PEAK_OVERRIDE_THRESHOLD_DB {
                // Clipping risk dominates: override to bring the peak down
                // even if that undershoots the RMS target this round.
                delta_db = self.target_peak_db - measured.peak_db;
            }

            self.apply_gain(device_id, delta_db, measured, meter, sample_rate)?;
            std::thread::sleep(self.settle_time);
        }

        warn!(device_id, max_iterations = self.max_iterations, "auto-tune did not converge");
        Ok(TuneOutcome::DidNotConverge { metrics: last_metrics })
    }

    fn apply_gain(
        &mut self,
        device_id: &str,
        delta_db: f32,
        pre_metrics: LevelMetrics,
        meter: &mut dyn AudioMeter,
        sample_rate: u32,
    ) -> Result<()> {
        if !self.hardware_downgraded.contains(device_id) {
            if let Some(hardware) = self.hardware.as_mut() {
                if hardware.supports_hardware_gain(device_id) {
                    match hardware.set_gain(device_id, delta_db) {
                        Ok(applied) => {
                            self.gain.mark_hardware_mode(device_id, applied);
                            if let Ok(verify_buffer) = meter.measure(device_id) {
                                let verify = metrics::analyze(&verify_buffer, sample_rate);
                                let moved = (verify.rms_db - pre_metrics.rms_db).abs()
                                    > HARDWARE_VERIFY_TOLERANCE_DB;
                                if moved {
                                    return Ok(());
                                }
                                warn!(
                                    device_id,
                                    "hardware gain did not move measured level, downgrading to digital"
                                );
                                self.hardware_downgraded.insert(device_id.to_string());
                            } else {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            warn!(device_id, error = %e, "hardware gain failed, falling back to digital");
                        }
                    }
                }
            }
        }

        let noise_floor_db = pre_metrics.noise_floor_db;
        self.gain.set_gain(device_id, delta_db, Some(noise_floor_db));
        Ok(())
    }
}
