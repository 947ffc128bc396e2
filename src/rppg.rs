//! Remote photoplethysmography over facial color traces.
//!
//! Consumes a window of per-frame mean face-region RGB values and recovers
//! heart rate and respiratory rate from the chrominance pulse signal.
//! CHROM is the default projection (De Haan and Jeanne, 2013); POS and a
//! green-channel fallback are available for low-saturation cameras.

use serde::{Deserialize, Serialize};

use crate::signal::{band_limit, detrend, Spectrum};

/// Pulse-extraction projection applied to the RGB trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RppgAlgorithm {
    /// Chrominance projection, robust to motion.
    Chrom,
    /// Plane-orthogonal-to-skin projection.
    Pos,
    /// Green channel only.
    Green,
}

impl Default for RppgAlgorithm {
    fn default() -> Self {
        Self::Chrom
    }
}

/// Vital-sign estimates recovered from one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalEstimate {
    /// Heart rate in beats per minute.
    pub heart_rate: f64,
    /// Respiratory rate in breaths per minute.
    pub respiratory_rate: f64,
    /// Fraction of pulse-signal energy inside the cardiac band, 0 to 1.
    pub signal_quality: f64,
    /// Prominence of the cardiac spectral peak, 0 to 1.
    pub hr_confidence: f64,
    /// Prominence of the respiratory spectral peak, 0 to 1.
    pub rr_confidence: f64,
}

/// Cardiac band in Hz (40 to 180 bpm).
const HR_BAND: (f64, f64) = (0.67, 3.0);
/// Respiratory band in Hz (8 to 30 breaths per minute).
const RR_BAND: (f64, f64) = (0.13, 0.5);
/// Band-limit range applied to the raw pulse projection.
const PULSE_BAND: (f64, f64) = (0.7, 3.0);

/// Stateless rPPG analysis over a window of mean RGB samples.
#[derive(Debug, Clone)]
pub struct RppgProcessor {
    algorithm: RppgAlgorithm,
    fps: f64,
    window_size: usize,
}

impl RppgProcessor {
    pub fn new(algorithm: RppgAlgorithm, fps: f64, window_size: usize) -> Self {
        Self {
            algorithm,
            fps,
            window_size,
        }
    }

    /// Frames required before [`process`](Self::process) can yield anything.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Estimate vital signs from a window of per-frame mean RGB values.
    ///
    /// Returns `None` when the window is shorter than the configured size
    /// or the trace is degenerate. Insufficient data is expected during
    /// warm-up and is not an error.
    pub fn process(&self, rgb_window: &[[f64; 3]]) -> Option<VitalEstimate> {
        if rgb_window.len() < self.window_size {
            return None;
        }

        let pulse = self.extract_pulse(rgb_window)?;
        let mut pulse = band_limit(&pulse, self.fps, PULSE_BAND.0, PULSE_BAND.1);
        detrend(&mut pulse);

        let spectrum = Spectrum::analyze(&pulse, self.fps)?;
        let (hr_freq, hr_mag) = spectrum.peak_in_band(HR_BAND.0, HR_BAND.1)?;
        let hr_mean = spectrum.mean_in_band(HR_BAND.0, HR_BAND.1);
        let hr_confidence = (hr_mag / (hr_mean + 1e-6) / 10.0).min(1.0);

        // Respiratory modulation rides on the low-frequency envelope of the
        // unfiltered projection.
        let raw_pulse = self.extract_pulse(rgb_window)?;
        let rr_signal = band_limit(&raw_pulse, self.fps, RR_BAND.0, RR_BAND.1);
        let rr_spectrum = Spectrum::analyze(&rr_signal, self.fps)?;
        let (rr_freq, rr_mag) = rr_spectrum.peak_in_band(RR_BAND.0, RR_BAND.1)?;
        let rr_mean = rr_spectrum.mean_in_band(RR_BAND.0, RR_BAND.1);
        let rr_confidence = (rr_mag / (rr_mean + 1e-6) / 5.0).min(1.0);

        Some(VitalEstimate {
            heart_rate: hr_freq * 60.0,
            respiratory_rate: rr_freq * 60.0,
            signal_quality: spectrum.band_energy_ratio(HR_BAND.0, HR_BAND.1),
            hr_confidence,
            rr_confidence,
        })
    }

    /// Project the RGB trace onto a pulse signal per the configured
    /// algorithm. Channels are mean-normalized first so illumination level
    /// cancels out.
    fn extract_pulse(&self, rgb_window: &[[f64; 3]]) -> Option<Vec<f64>> {
        let n = rgb_window.len() as f64;
        let mut means = [0.0f64; 3];
        for rgb in rgb_window {
            for c in 0..3 {
                means[c] += rgb[c];
            }
        }
        for m in means.iter_mut() {
            *m /= n;
        }
        if means.iter().any(|m| m.abs() < 1e-9) {
            return None;
        }

        let norm: Vec<[f64; 3]> = rgb_window
            .iter()
            .map(|rgb| [rgb[0] / means[0], rgb[1] / means[1], rgb[2] / means[2]])
            .collect();

        let pulse = match self.algorithm {
            RppgAlgorithm::Chrom => {
                let x: Vec<f64> = norm.iter().map(|c| 3.0 * c[0] - 2.0 * c[1]).collect();
                let y: Vec<f64> = norm
                    .iter()
                    .map(|c| 1.5 * c[0] + c[1] - 1.5 * c[2])
                    .collect();
                let alpha = std_dev(&x) / (std_dev(&y) + 1e-6);
                x.iter().zip(&y).map(|(x, y)| x - alpha * y).collect()
            }
            RppgAlgorithm::Pos => {
                let s1: Vec<f64> = norm.iter().map(|c| c[1] - c[2]).collect();
                let s2: Vec<f64> = norm.iter().map(|c| c[1] + c[2] - 2.0 * c[0]).collect();
                let alpha = std_dev(&s1) / (std_dev(&s2) + 1e-6);
                s1.iter().zip(&s2).map(|(a, b)| a + alpha * b).collect()
            }
            RppgAlgorithm::Green => norm.iter().map(|c| c[1]).collect(),
        };

        Some(pulse)
    }
}

fn std_dev(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    let var = signal.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / signal.len() as f64;
    var.sqrt()
}
