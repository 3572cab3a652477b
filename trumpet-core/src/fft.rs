//! # Fast Fourier Transform (FFT) Module
//!
//! FFT helpers for the pitch estimator. The estimator works in the time
//! domain, but computing its autocorrelation through a forward/inverse FFT
//! pair keeps every analysis tick at O(n log n) instead of O(n²).
//!
//! ## Features
//! - DC offset removal and Hann windowing
//! - Zero-padded (linear, not circular) autocorrelation using RustFFT
//! - FFT plans created once per window size and reused every tick

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant offset adds the same positive bias to every lag of the
/// autocorrelation and hides the zero crossing the peak search relies on.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer.
pub fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Computes `r(τ) = Σ x[j]·x[j+τ]` for τ in `0..window_size` through an FFT.
///
/// The input is zero-padded to at least twice the window so the circular
/// correlation of the FFT equals the linear one over the window.
pub struct Autocorrelator {
    window_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Autocorrelator {
    pub fn new(window_size: usize) -> Self {
        let padded = (window_size * 2).next_power_of_two().max(2);
        let mut planner = FftPlanner::new();
        Self {
            window_size,
            forward: planner.plan_fft_forward(padded),
            inverse: planner.plan_fft_inverse(padded),
            scratch: vec![Complex { re: 0.0, im: 0.0 }; padded],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Returns the autocorrelation of `signal` for lags `0..signal.len()`.
    ///
    /// Signals longer than the planned window are truncated to it.
    pub fn autocorrelate(&mut self, signal: &[f32]) -> Vec<f32> {
        let n = signal.len().min(self.window_size);
        let padded = self.scratch.len();

        for (slot, &sample) in self.scratch.iter_mut().zip(signal.iter().take(n)) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        for slot in self.scratch.iter_mut().skip(n) {
            *slot = Complex { re: 0.0, im: 0.0 };
        }

        self.forward.process(&mut self.scratch);
        for bin in self.scratch.iter_mut() {
            *bin = Complex { re: bin.norm_sqr(), im: 0.0 };
        }
        self.inverse.process(&mut self.scratch);

        // RustFFT leaves the inverse unnormalized.
        let scale = 1.0 / padded as f32;
        self.scratch.iter().take(n).map(|c| c.re * scale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_autocorrelation(signal: &[f32]) -> Vec<f32> {
        (0..signal.len())
            .map(|tau| {
                signal
                    .iter()
                    .zip(signal.iter().skip(tau))
                    .map(|(a, b)| a * b)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn matches_direct_computation() {
        let signal: Vec<f32> = (0..256)
            .map(|i| (i as f32 * 0.21).sin() + 0.3 * (i as f32 * 0.05).cos())
            .collect();
        let mut ac = Autocorrelator::new(signal.len());
        let fast = ac.autocorrelate(&signal);
        let slow = direct_autocorrelation(&signal);

        assert_eq!(fast.len(), slow.len());
        let tolerance = 1e-4 * slow[0];
        for (tau, (f, s)) in fast.iter().zip(slow.iter()).enumerate() {
            assert!((f - s).abs() < tolerance, "lag {tau}: {f} vs {s}");
        }
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![1.5, 2.5, 1.5, 2.5];
        remove_dc_offset(&mut signal);
        assert_eq!(signal, vec![-0.5, 0.5, -0.5, 0.5]);
    }

    #[test]
    fn hann_window_tapers_the_edges() {
        let mut buffer = vec![1.0; 9];
        apply_hann_window(&mut buffer);
        assert!(buffer[0].abs() < 1e-6);
        assert!(buffer[8].abs() < 1e-6);
        assert!((buffer[4] - 1.0).abs() < 1e-6);
    }
}
