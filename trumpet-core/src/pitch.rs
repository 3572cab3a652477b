//! # Pitch Detection Module
//!
//! Time-domain fundamental frequency estimation for live trumpet input.
//!
//! ## Features
//! - RMS noise gate to reject silence
//! - Normalized autocorrelation (NSDF) clarity curve computed through an FFT
//! - Octave error prevention by preferring the lowest strong peak
//! - Parabolic interpolation for sub-sample accuracy
//! - Rolling-buffer estimator that analyses at a fixed hop

use crate::fft::{self, Autocorrelator};
use std::collections::VecDeque;

/// A single fundamental frequency estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Estimated fundamental frequency in Hz.
    pub frequency: f32,
    /// Clarity of the estimate (0.0 to 1.0).
    pub confidence: f32,
}

/// Parameters of the estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub sample_rate: u32,
    /// Number of samples analysed per tick.
    pub window_size: usize,
    /// New samples required between two analysis ticks.
    pub hop_size: usize,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Minimum RMS for a window to be analysed at all.
    pub amplitude_threshold: f32,
    /// Estimates below this clarity are reported as "no pitch".
    pub min_confidence: f32,
    /// A lower-lag peak wins over the strongest one if it reaches this fraction of it.
    pub octave_tolerance: f32,
    pub apply_window: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            window_size: 2048,
            hop_size: 1024,
            min_frequency: 80.0,
            max_frequency: 1500.0,
            amplitude_threshold: 0.01,
            min_confidence: 0.5,
            octave_tolerance: 0.9,
            apply_window: false,
        }
    }
}

impl EstimatorConfig {
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    fn min_lag(&self) -> usize {
        ((self.sample_rate as f32 / self.max_frequency).floor() as usize).max(2)
    }

    fn max_lag(&self) -> usize {
        (self.sample_rate as f32 / self.min_frequency).ceil() as usize
    }
}

/// Estimates the fundamental frequency of `signal` by normalized autocorrelation.
///
/// # Arguments
/// * `signal` - Mono audio window
/// * `config` - Frequency range, gates and tolerances
/// * `autocorrelator` - FFT plans sized for `config.window_size`
///
/// # Returns
/// * `Some(sample)` - Frequency and clarity of a confident estimate
/// * `None` - Silence, noise, or no periodicity inside the frequency range
pub fn detect_pitch_autocorrelation(
    signal: &[f32],
    config: &EstimatorConfig,
    autocorrelator: &mut Autocorrelator,
) -> Option<PitchSample> {
    let frame_size = signal.len().min(autocorrelator.window_size());
    if frame_size < 4 {
        return None;
    }

    // --- Noise gate ---
    let rms = (signal[..frame_size].iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if rms < config.amplitude_threshold {
        return None;
    }

    let mut processed = signal[..frame_size].to_vec();
    fft::remove_dc_offset(&mut processed);
    if config.apply_window {
        fft::apply_hann_window(&mut processed);
    }

    let nsdf = normalized_square_difference(&processed, autocorrelator);

    // Lags past half the window compare too few samples to be trusted.
    let max_lag = config.max_lag().min(frame_size / 2);
    let min_lag = config.min_lag();
    if min_lag + 1 >= max_lag {
        return None;
    }

    // --- Skip the lag-0 lobe: start after the first negative-going zero crossing ---
    let first_negative = nsdf.iter().take(max_lag).position(|&v| v < 0.0)?;
    let search_start = first_negative.max(min_lag).max(1);

    // --- Collect local maxima above zero ---
    let peaks: Vec<usize> = (search_start..max_lag)
        .filter(|&tau| nsdf[tau] > 0.0 && nsdf[tau] > nsdf[tau - 1] && nsdf[tau] >= nsdf[tau + 1])
        .collect();
    let strongest = peaks.iter().map(|&tau| nsdf[tau]).fold(0.0f32, f32::max);
    if strongest <= 0.0 {
        return None;
    }

    // --- Octave error prevention: the lowest lag close enough to the strongest peak ---
    let period = *peaks
        .iter()
        .find(|&&tau| nsdf[tau] >= config.octave_tolerance * strongest)?;

    // --- Parabolic interpolation for better precision ---
    let y1 = nsdf[period - 1];
    let y2 = nsdf[period];
    let y3 = nsdf[period + 1];
    let curvature = y1 - 2.0 * y2 + y3;
    let (period_float, peak_value) = if curvature.abs() > 1e-9 {
        let shift = (y1 - y3) / (2.0 * curvature);
        (period as f32 + shift, y2 - 0.25 * (y1 - y3) * shift)
    } else {
        (period as f32, y2)
    };

    let confidence = peak_value.clamp(0.0, 1.0);
    if confidence < config.min_confidence {
        return None;
    }

    let frequency = config.sample_rate as f32 / period_float;
    if frequency.is_finite()
        && frequency >= config.min_frequency * 0.95
        && frequency <= config.max_frequency * 1.05
    {
        Some(PitchSample {
            frequency,
            confidence,
        })
    } else {
        None
    }
}

/// NSDF: `2·r(τ) / (Σ x[j]² + Σ x[j+τ]²)` over the overlapping part of the window.
///
/// Values lie in [-1, 1]; a perfectly periodic signal reaches 1 at its period.
fn normalized_square_difference(signal: &[f32], autocorrelator: &mut Autocorrelator) -> Vec<f32> {
    let n = signal.len();
    let acf = autocorrelator.autocorrelate(signal);

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f32);
    for &s in signal {
        let last = *prefix.last().unwrap_or(&0.0);
        prefix.push(last + s * s);
    }
    let total = prefix[n];

    acf.iter()
        .enumerate()
        .map(|(tau, &r)| {
            let m = prefix[n - tau] + (total - prefix[tau]);
            if m > f32::EPSILON { 2.0 * r / m } else { 0.0 }
        })
        .collect()
}

/// Outcome of pushing samples into the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Analysis {
    /// Not enough new samples for another tick.
    Waiting,
    /// A tick ran but found no confident pitch.
    NoPitch,
    Detected(PitchSample),
}

impl Analysis {
    pub fn sample(self) -> Option<PitchSample> {
        match self {
            Analysis::Detected(sample) => Some(sample),
            _ => None,
        }
    }
}

/// Rolling-buffer pitch estimator.
///
/// Keeps the most recent `window_size` samples and runs one analysis every
/// `hop_size` new samples. When several hops arrive at once only the newest
/// window is analysed: consumers only ever want the freshest estimate.
pub struct PitchEstimator {
    config: EstimatorConfig,
    buffer: VecDeque<f32>,
    pending: usize,
    autocorrelator: Autocorrelator,
}

impl PitchEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let window_size = config.window_size.max(4);
        let hop_size = config.hop_size.clamp(1, window_size);
        let config = EstimatorConfig {
            window_size,
            hop_size,
            ..config
        };
        Self {
            autocorrelator: Autocorrelator::new(window_size),
            buffer: VecDeque::with_capacity(window_size),
            pending: 0,
            config,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Appends samples and analyses the newest window if a hop has elapsed.
    pub fn push_samples(&mut self, samples: &[f32]) -> Analysis {
        let window_size = self.config.window_size;
        for &s in samples {
            if self.buffer.len() == window_size {
                self.buffer.pop_front();
            }
            self.buffer.push_back(s);
        }
        self.pending += samples.len();

        if self.buffer.len() < window_size || self.pending < self.config.hop_size {
            return Analysis::Waiting;
        }
        self.pending = 0;

        let window = self.buffer.make_contiguous();
        match detect_pitch_autocorrelation(window, &self.config, &mut self.autocorrelator) {
            Some(sample) => Analysis::Detected(sample),
            None => Analysis::NoPitch,
        }
    }

    /// Drops buffered audio, e.g. after a capture restart.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f32::consts::TAU;

    const SR: u32 = 44_100;

    fn tone(partials: &[(f32, f32)], len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                partials
                    .iter()
                    .map(|&(freq, amp)| amp * (TAU * freq * t).sin())
                    .sum()
            })
            .collect()
    }

    fn detect(signal: &[f32]) -> Option<PitchSample> {
        let config = EstimatorConfig::default();
        let mut ac = Autocorrelator::new(config.window_size);
        detect_pitch_autocorrelation(signal, &config, &mut ac)
    }

    #[test]
    fn detects_a_pure_sine() {
        let sample = detect(&tone(&[(440.0, 0.5)], 2048)).expect("pitch");
        assert!((sample.frequency - 440.0).abs() < 1.0, "{}", sample.frequency);
        assert!(sample.confidence > 0.9);
    }

    #[test]
    fn detects_low_and_high_trumpet_notes() {
        // Concert E3 (lowest written F#3 on Bb trumpet) and concert Bb5.
        for freq in [164.81, 932.33] {
            let sample = detect(&tone(&[(freq, 0.4)], 2048)).expect("pitch");
            let cents = 1200.0 * (sample.frequency / freq).log2();
            assert!(cents.abs() < 5.0, "{freq}: {}", sample.frequency);
        }
    }

    #[test]
    fn harmonic_rich_tone_reports_the_fundamental() {
        let signal = tone(
            &[(233.08, 0.5), (466.16, 0.45), (699.24, 0.3), (932.33, 0.2)],
            2048,
        );
        let sample = detect(&signal).expect("pitch");
        assert!((sample.frequency - 233.08).abs() < 2.0, "{}", sample.frequency);
    }

    #[test]
    fn strong_second_harmonic_does_not_cause_an_octave_jump() {
        let signal = tone(&[(220.0, 0.15), (440.0, 0.5)], 2048);
        let sample = detect(&signal).expect("pitch");
        assert!((sample.frequency - 220.0).abs() < 2.0, "{}", sample.frequency);
    }

    #[test]
    fn silence_yields_nothing() {
        assert_eq!(detect(&vec![0.0; 2048]), None);
        assert_eq!(detect(&tone(&[(440.0, 0.001)], 2048)), None);
    }

    #[test]
    fn white_noise_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(42);
        let noise: Vec<f32> = (0..2048).map(|_| rng.gen_range(-0.5..0.5)).collect();
        assert_eq!(detect(&noise), None);
    }

    #[test]
    fn estimator_waits_for_a_full_window_then_analyses_every_hop() {
        let mut estimator = PitchEstimator::new(EstimatorConfig::default());
        let signal = tone(&[(392.0, 0.5)], 4096);

        assert_eq!(estimator.push_samples(&signal[..1024]), Analysis::Waiting);
        let first = estimator.push_samples(&signal[1024..2048]);
        let sample = first.sample().expect("pitch after a full window");
        assert!((sample.frequency - 392.0).abs() < 1.0);

        assert_eq!(estimator.push_samples(&signal[2048..2560]), Analysis::Waiting);
        assert!(matches!(
            estimator.push_samples(&signal[2560..3072]),
            Analysis::Detected(_)
        ));
    }

    #[test]
    fn estimator_reports_no_pitch_for_silence() {
        let mut estimator = PitchEstimator::new(EstimatorConfig::default());
        assert_eq!(estimator.push_samples(&vec![0.0; 2048]), Analysis::NoPitch);
    }
}
