//! # Musical Tuning Module
//!
//! Converts detected frequencies into musical pitches against an adjustable
//! A4 reference, and smooths the cents reading for display.
//!
//! ## Features
//! - Tuning reference (A4 = 430..450 Hz, default 440)
//! - Frequency to nearest equal-tempered note with signed cents in (-50, +50]
//! - User calibration offset and written-pitch transposition
//! - Exponential cents smoothing with a slower relax toward neutral
//! - Symbolic confidence thresholds

use crate::pitch::PitchSample;
use crate::theory;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_REFERENCE_HZ: u16 = 440;
pub const MIN_REFERENCE_HZ: u16 = 430;
pub const MAX_REFERENCE_HZ: u16 = 450;

/// Minimum clarity for the tuner dial to leave its waiting state.
pub const TUNER_CONFIDENCE_FLOOR: f32 = 0.75;

/// Frequency assigned to A4, always inside `430..=450`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningReference(u16);

impl Default for TuningReference {
    fn default() -> Self {
        Self(DEFAULT_REFERENCE_HZ)
    }
}

impl TuningReference {
    /// Creates a reference, clamping out-of-range values.
    pub fn new(hz: u16) -> Self {
        Self(hz.clamp(MIN_REFERENCE_HZ, MAX_REFERENCE_HZ))
    }

    pub fn hz(self) -> u16 {
        self.0
    }

    pub fn set(&mut self, hz: u16) {
        *self = Self::new(hz);
    }

    /// Moves the reference by `delta` Hz, stopping at the range limits.
    pub fn nudge(&mut self, delta: i16) {
        let hz = (self.0 as i32 + delta as i32).clamp(MIN_REFERENCE_HZ as i32, MAX_REFERENCE_HZ as i32);
        self.0 = hz as u16;
    }

    pub fn reset(&mut self) {
        self.0 = DEFAULT_REFERENCE_HZ;
    }
}

impl fmt::Display for TuningReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A4 = {} Hz", self.0)
    }
}

/// A detected pitch expressed musically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchResult {
    /// Nearest MIDI note (after transposition, if any).
    pub midi: i32,
    /// Chromatic position, C = 0 .. B = 11.
    pub note_index: u8,
    pub octave: i32,
    /// Signed deviation from `midi` in cents, in (-50, +50].
    pub cents: f32,
    pub frequency: f32,
    pub confidence: f32,
}

impl PitchResult {
    /// Whether this result is confident enough to act on.
    pub fn is_active(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    pub fn note_name(&self, use_flats: bool) -> String {
        let names = if use_flats {
            &theory::NOTE_NAMES_FLAT
        } else {
            &theory::NOTE_NAMES_SHARP
        };
        format!("{}{}", names[self.note_index as usize], self.octave)
    }
}

/// Splits a fractional MIDI value into the nearest note and its cents offset.
///
/// The fold happens after narrowing to `f32`, so an offset that only rounds to
/// -50 in single precision still lands in (-50, +50].
fn split_midi_float(midi_float: f64) -> (i32, f32) {
    let nearest = midi_float.round();
    let cents = ((midi_float - nearest) * 100.0) as f32;
    if cents <= -50.0 {
        (nearest as i32 - 1, (cents + 100.0).min(50.0))
    } else {
        (nearest as i32, cents.min(50.0))
    }
}

/// Nearest note and cents for `frequency`, shifted by `offset_cents` first.
fn nearest_note(frequency: f32, reference_hz: f64, offset_cents: f64) -> Option<(i32, f32)> {
    if !(frequency.is_finite() && frequency > 0.0 && reference_hz > 0.0) {
        return None;
    }
    let midi_float = 69.0 + 12.0 * (frequency as f64 / reference_hz).log2() + offset_cents / 100.0;
    Some(split_midi_float(midi_float))
}

fn build_result(midi: i32, cents: f32, frequency: f32, confidence: f32) -> PitchResult {
    PitchResult {
        midi,
        note_index: midi.rem_euclid(12) as u8,
        octave: theory::octave_of(midi),
        cents,
        frequency,
        confidence,
    }
}

/// Maps a frequency to its nearest equal-tempered note under `reference_hz`.
///
/// # Returns
/// * `None` - for non-positive or non-finite frequencies
pub fn frequency_to_pitch(frequency: f32, reference_hz: f32) -> Option<PitchResult> {
    let (midi, cents) = nearest_note(frequency, reference_hz as f64, 0.0)?;
    Some(build_result(midi, cents, frequency, 1.0))
}

/// Equal-tempered frequency of a MIDI note.
pub fn midi_to_frequency(midi: i32, reference_hz: f32) -> f32 {
    reference_hz * 2.0_f32.powf((midi as f32 - 69.0) / 12.0)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat. Unlike the nearest-note
/// cents this is not folded into ±50.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Converts pitch samples into [`PitchResult`]s for one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchMapper {
    pub reference: TuningReference,
    /// Added to every cents estimate before choosing the nearest note.
    pub calibration_cents: f32,
    /// Semitones from sounding pitch to written pitch (+2 for B♭ trumpet).
    pub transposition: i32,
}

impl PitchMapper {
    pub fn new(reference: TuningReference) -> Self {
        Self {
            reference,
            ..Self::default()
        }
    }

    pub fn map(&self, sample: &PitchSample) -> Option<PitchResult> {
        let (midi, cents) = nearest_note(
            sample.frequency,
            self.reference.hz() as f64,
            self.calibration_cents as f64,
        )?;
        Some(build_result(
            midi + self.transposition,
            cents,
            sample.frequency,
            sample.confidence,
        ))
    }
}

/// Symbolic confidence setting exposed to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl ConfidenceLevel {
    pub const ALL: [ConfidenceLevel; 3] = [
        ConfidenceLevel::Low,
        ConfidenceLevel::Medium,
        ConfidenceLevel::High,
    ];

    /// Numeric clarity cutoff.
    pub fn threshold(self) -> f32 {
        match self {
            ConfidenceLevel::Low => 0.6,
            ConfidenceLevel::Medium => 0.75,
            ConfidenceLevel::High => 0.9,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::High => "High",
        })
    }
}

/// Exponential smoothing of the cents reading.
///
/// Approaches the raw value by `attack` of the remaining distance per tick
/// while a pitch is present, and relaxes toward 0 by `release` per tick when
/// it is not. Both factors lie in (0, 1], so the output never overshoots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentsSmoother {
    attack: f32,
    release: f32,
    value: f32,
}

impl Default for CentsSmoother {
    fn default() -> Self {
        Self::new(0.25, 0.08)
    }
}

impl CentsSmoother {
    pub fn new(attack: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.01, 1.0),
            release: release.clamp(0.01, 1.0),
            value: 0.0,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advances one tick with the latest raw cents, or `None` when no pitch is active.
    pub fn update(&mut self, raw_cents: Option<f32>) -> f32 {
        match raw_cents {
            Some(raw) if raw.is_finite() => self.value += (raw - self.value) * self.attack,
            _ => self.value -= self.value * self.release,
        }
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
