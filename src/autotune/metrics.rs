//! Level analysis feeding `AutoTuner`: peak/RMS in dBFS and a noise-floor
//! estimate from the 10th percentile of per-10ms frame energy, grounded in
//! `original_source/src/audio/auto_tune`'s level analyzer (referenced from
//! `auto_tuner.py` as `LevelAnalyzer`).

const FRAME_MS: usize = 10;
const FLOOR_DB: f32 = -120.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMetrics {
    pub peak_db: f32,
    pub rms_db: f32,
    pub noise_floor_db: f32,
}

impl Default for LevelMetrics {
    fn default() -> Self {
        Self {
            peak_db: FLOOR_DB,
            rms_db: FLOOR_DB,
            noise_floor_db: FLOOR_DB,
        }
    }
}

fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        FLOOR_DB
    } else {
        20.0 * amplitude.log10()
    }
}

/// Analyze a buffer of `[-1, 1]`-normalized samples at `sample_rate`.
pub fn analyze(samples: &[f32], sample_rate: u32) -> LevelMetrics {
    if samples.is_empty() {
        return LevelMetrics::default();
    }

    let peak = samples.iter().fold(0f32, |m, s| m.max(s.abs()));
    let rms = {
        let sum_sq: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        ((sum_sq / samples.len() as f64).sqrt()) as f32
    };

    let frame_len = ((sample_rate as usize * FRAME_MS) / 1000).max(1);
    let mut frame_energies_db: Vec<f32> = samples
        .chunks(frame_len)
        .map(|chunk| {
            let sum_sq: f64 = chunk.iter().map(|s| (*s as f64) * (*s as f64)).sum();
            let frame_rms = ((sum_sq / chunk.len() as f64).sqrt()) as f32;
            amplitude_to_db(frame_rms)
        })
        .collect();
    frame_energies_db.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let p10_idx = ((frame_energies_db.len() as f32 - 1.0) * 0.10).round() as usize;
    let noise_floor_db = frame_energies_db.get(p10_idx).copied().unwrap_or(FLOOR_DB);

    LevelMetrics {
        peak_db: amplitude_to_db(peak),
        rms_db: amplitude_to_db(rms),
        noise_floor_db,
    }
}
