//! Spectral analysis shared by the periodicity-driven agents.
//!
//! Frequency estimation runs over short windows of unevenly arriving frame
//! samples treated as uniformly sampled at the nominal frame rate. Windows
//! are detrended, Hann-weighted, and zero-padded before the FFT so that
//! narrow physiological bands resolve cleanly at clinical window lengths.

use rustfft::{num_complex::Complex, FftPlanner};

/// Remove the mean from a signal in place.
pub fn detrend(signal: &mut [f64]) {
    if signal.is_empty() {
        return;
    }
    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    for s in signal.iter_mut() {
        *s -= mean;
    }
}

/// Apply a Hann window in place.
pub fn hann_window(signal: &mut [f64]) {
    let n = signal.len();
    if n < 2 {
        return;
    }
    for (i, s) in signal.iter_mut().enumerate() {
        let w = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos());
        *s *= w;
    }
}

/// One-sided magnitude spectrum of a real signal.
#[derive(Debug, Clone)]
pub struct Spectrum {
    magnitudes: Vec<f64>,
    freq_resolution_hz: f64,
}

impl Spectrum {
    /// Compute the spectrum of `signal` sampled at `sample_rate_hz`.
    ///
    /// The signal is detrended and Hann-weighted, then zero-padded to the
    /// next power of two (at least 256 points) before transforming. Returns
    /// `None` when the signal is too short to carry frequency content.
    pub fn analyze(signal: &[f64], sample_rate_hz: f64) -> Option<Self> {
        if signal.len() < 8 || sample_rate_hz <= 0.0 {
            return None;
        }

        let mut windowed = signal.to_vec();
        detrend(&mut windowed);
        hann_window(&mut windowed);

        let fft_size = windowed.len().next_power_of_two().max(256);
        let mut buffer: Vec<Complex<f64>> = windowed
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_size)
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        let magnitudes: Vec<f64> = buffer[..fft_size / 2].iter().map(|c| c.norm()).collect();

        Some(Self {
            magnitudes,
            freq_resolution_hz: sample_rate_hz / fft_size as f64,
        })
    }

    /// Frequency of bin `i` in Hz.
    pub fn bin_freq_hz(&self, i: usize) -> f64 {
        i as f64 * self.freq_resolution_hz
    }

    fn band_bins(&self, low_hz: f64, high_hz: f64) -> std::ops::Range<usize> {
        let lo = (low_hz / self.freq_resolution_hz).ceil() as usize;
        let hi = ((high_hz / self.freq_resolution_hz).floor() as usize + 1).min(self.magnitudes.len());
        lo.min(hi)..hi
    }

    /// Strongest spectral peak within `[low_hz, high_hz]`, as
    /// `(frequency_hz, magnitude)`. `None` when the band holds no bins.
    pub fn peak_in_band(&self, low_hz: f64, high_hz: f64) -> Option<(f64, f64)> {
        let bins = self.band_bins(low_hz, high_hz);
        let (best, mag) = bins
            .map(|i| (i, self.magnitudes[i]))
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        Some((self.bin_freq_hz(best), mag))
    }

    /// Mean magnitude within `[low_hz, high_hz]`.
    pub fn mean_in_band(&self, low_hz: f64, high_hz: f64) -> f64 {
        let bins = self.band_bins(low_hz, high_hz);
        let n = bins.len();
        if n == 0 {
            return 0.0;
        }
        bins.map(|i| self.magnitudes[i]).sum::<f64>() / n as f64
    }

    /// Fraction of total spectral energy (DC excluded) that falls inside
    /// `[low_hz, high_hz]`. Values near 1.0 indicate a clean periodic
    /// signal in the band.
    pub fn band_energy_ratio(&self, low_hz: f64, high_hz: f64) -> f64 {
        let total: f64 = self.magnitudes[1..].iter().map(|m| m * m).sum();
        if total <= f64::EPSILON {
            return 0.0;
        }
        let band: f64 = self
            .band_bins(low_hz, high_hz)
            .filter(|&i| i > 0)
            .map(|i| self.magnitudes[i] * self.magnitudes[i])
            .sum();
        band / total
    }
}

/// Zero all spectral content outside `[low_hz, high_hz]` and return the
/// band-limited time-domain signal, truncated to the input length.
pub fn band_limit(signal: &[f64], sample_rate_hz: f64, low_hz: f64, high_hz: f64) -> Vec<f64> {
    let n = signal.len();
    if n < 8 || sample_rate_hz <= 0.0 {
        return signal.to_vec();
    }

    let fft_size = n.next_power_of_two();
    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_size)
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    let resolution = sample_rate_hz / fft_size as f64;
    for (i, c) in buffer.iter_mut().enumerate() {
        // Mirror bins index the same frequency as fft_size - i.
        let freq = (i.min(fft_size - i)) as f64 * resolution;
        if freq < low_hz || freq > high_hz {
            *c = Complex::new(0.0, 0.0);
        }
    }

    let ifft = planner.plan_fft_inverse(fft_size);
    ifft.process(&mut buffer);

    buffer[..n].iter().map(|c| c.re / fft_size as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f64, sample_rate_hz: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sample_rate_hz).sin())
            .collect()
    }

    #[test]
    fn test_peak_recovers_sine_frequency() {
        let signal = sine(1.2, 30.0, 300);
        let spectrum = Spectrum::analyze(&signal, 30.0).unwrap();
        let (freq, _) = spectrum.peak_in_band(0.5, 3.0).unwrap();
        assert!((freq - 1.2).abs() < 0.1, "got {freq}");
    }

    #[test]
    fn test_peak_recovers_tremor_frequency() {
        let signal = sine(5.0, 30.0, 150);
        let spectrum = Spectrum::analyze(&signal, 30.0).unwrap();
        let (freq, _) = spectrum.peak_in_band(3.0, 10.0).unwrap();
        assert!((freq - 5.0).abs() < 0.2, "got {freq}");
    }

    #[test]
    fn test_band_energy_ratio_high_for_in_band_tone() {
        let signal = sine(1.5, 30.0, 300);
        let spectrum = Spectrum::analyze(&signal, 30.0).unwrap();
        assert!(spectrum.band_energy_ratio(0.7, 3.0) > 0.8);
        assert!(spectrum.band_energy_ratio(5.0, 10.0) < 0.1);
    }

    #[test]
    fn test_too_short_signal_rejected() {
        assert!(Spectrum::analyze(&[1.0; 4], 30.0).is_none());
        assert!(Spectrum::analyze(&[], 30.0).is_none());
    }

    #[test]
    fn test_band_limit_suppresses_out_of_band_tone() {
        let n = 512;
        let mixed: Vec<f64> = sine(1.0, 30.0, n)
            .iter()
            .zip(sine(8.0, 30.0, n))
            .map(|(a, b)| a + b)
            .collect();

        let filtered = band_limit(&mixed, 30.0, 0.7, 3.0);
        let spectrum = Spectrum::analyze(&filtered, 30.0).unwrap();
        let (_, in_band) = spectrum.peak_in_band(0.7, 3.0).unwrap();
        let (_, out_band) = spectrum.peak_in_band(6.0, 10.0).unwrap();
        assert!(in_band > out_band * 5.0);
    }

    #[test]
    fn test_detrend_removes_mean() {
        let mut signal = vec![10.0, 11.0, 12.0, 13.0];
        detrend(&mut signal);
        let mean: f64 = signal.iter().sum::<f64>() / signal.len() as f64;
        assert!(mean.abs() < 1e-12);
    }
}
