//! # Tuner Model
//!
//! Reactive state behind the tuner dial. Each display tick feeds the freshest
//! pitch sample (or nothing) into [`TunerState::update`] and draws the
//! returned [`TunerReading`].
//!
//! ## Features
//! - Adjustable A4 reference (430-450 Hz)
//! - Auto mode (nearest note) and manual mode (fixed target note)
//! - Confidence gating with a waiting state
//! - Smoothed needle that relaxes to center when the pitch drops out

use crate::pitch::PitchSample;
use crate::theory;
use crate::tuning::{
    CentsSmoother, PitchMapper, PitchResult, TUNER_CONFIDENCE_FLOOR, TuningReference,
    calculate_cents_deviation, midi_to_frequency,
};
use std::fmt;

/// Cents shown on either side of the dial center.
pub const DIAL_RANGE_CENTS: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TuningMode {
    /// Read against whichever note is nearest.
    #[default]
    Auto,
    /// Read against a fixed target note.
    Manual { midi: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerStatus {
    Waiting,
    Active,
}

/// Accuracy band used for coloring the needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningZone {
    InTune,
    Close,
    Off,
}

impl TuningZone {
    pub fn from_cents(cents: f32) -> Self {
        let deviation = cents.abs();
        if deviation < 5.0 {
            TuningZone::InTune
        } else if deviation < 20.0 {
            TuningZone::Close
        } else {
            TuningZone::Off
        }
    }
}

impl fmt::Display for TuningZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TuningZone::InTune => "In tune",
            TuningZone::Close => "Close",
            TuningZone::Off => "Off",
        };
        f.write_str(label)
    }
}

/// What the dial shows for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerReading {
    pub status: TunerStatus,
    /// Note the needle is read against, e.g. "A4".
    pub note_name: Option<String>,
    pub midi: Option<i32>,
    pub octave: Option<i32>,
    /// Unsmoothed deviation of this tick's pitch.
    pub raw_cents: Option<f32>,
    /// Needle position in cents; relaxes to 0 while waiting.
    pub smoothed_cents: f32,
    pub frequency: Option<f32>,
    pub zone: Option<TuningZone>,
}

impl TunerReading {
    pub fn is_active(&self) -> bool {
        self.status == TunerStatus::Active
    }
}

/// Tuner state owned by the tuner screen.
#[derive(Debug, Clone)]
pub struct TunerState {
    mapper: PitchMapper,
    smoother: CentsSmoother,
    mode: TuningMode,
    confidence_floor: f32,
    use_flats: bool,
    last_reading: Option<PitchResult>,
}

impl Default for TunerState {
    fn default() -> Self {
        Self::new(TuningReference::default())
    }
}

impl TunerState {
    pub fn new(reference: TuningReference) -> Self {
        Self {
            mapper: PitchMapper::new(reference),
            smoother: CentsSmoother::default(),
            mode: TuningMode::Auto,
            confidence_floor: TUNER_CONFIDENCE_FLOOR,
            use_flats: false,
            last_reading: None,
        }
    }

    pub fn reference(&self) -> TuningReference {
        self.mapper.reference
    }

    pub fn reference_mut(&mut self) -> &mut TuningReference {
        &mut self.mapper.reference
    }

    pub fn mode(&self) -> TuningMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TuningMode) {
        if self.mode != mode {
            self.mode = mode;
            self.smoother.reset();
        }
    }

    pub fn set_confidence_floor(&mut self, floor: f32) {
        self.confidence_floor = floor.clamp(0.0, 1.0);
    }

    pub fn set_calibration_cents(&mut self, cents: f32) {
        self.mapper.calibration_cents = cents;
    }

    pub fn set_use_flats(&mut self, use_flats: bool) {
        self.use_flats = use_flats;
    }

    /// Last accepted pitch, if any.
    pub fn last_pitch(&self) -> Option<&PitchResult> {
        self.last_reading.as_ref()
    }

    /// Frequency of the manual target under the current reference.
    pub fn target_frequency(&self) -> Option<f32> {
        match self.mode {
            TuningMode::Auto => None,
            TuningMode::Manual { midi } => {
                Some(midi_to_frequency(midi as i32, self.mapper.reference.hz() as f32))
            }
        }
    }

    /// Advances the dial by one tick.
    ///
    /// # Arguments
    /// * `sample` - Freshest pitch sample, or `None` if nothing current was detected
    pub fn update(&mut self, sample: Option<PitchSample>) -> TunerReading {
        let floor = self.confidence_floor;
        let result = sample
            .and_then(|s| self.mapper.map(&s))
            .filter(|r| r.is_active(floor));

        let Some(result) = result else {
            self.last_reading = None;
            let smoothed_cents = self.smoother.update(None);
            return TunerReading {
                status: TunerStatus::Waiting,
                note_name: None,
                midi: None,
                octave: None,
                raw_cents: None,
                smoothed_cents,
                frequency: None,
                zone: None,
            };
        };

        let (midi, raw_cents) = match self.mode {
            TuningMode::Auto => (result.midi, result.cents),
            TuningMode::Manual { midi } => {
                let target =
                    midi_to_frequency(midi as i32, self.mapper.reference.hz() as f32);
                let deviation = calculate_cents_deviation(result.frequency, target)
                    + self.mapper.calibration_cents;
                (midi as i32, deviation)
            }
        };

        let smoothed_cents = self
            .smoother
            .update(Some(raw_cents.clamp(-DIAL_RANGE_CENTS, DIAL_RANGE_CENTS)));
        self.last_reading = Some(result);

        let note_name = u8::try_from(midi)
            .ok()
            .map(|m| theory::midi_to_note_name(m, self.use_flats));

        TunerReading {
            status: TunerStatus::Active,
            note_name,
            midi: Some(midi),
            octave: Some(theory::octave_of(midi)),
            raw_cents: Some(raw_cents),
            smoothed_cents,
            frequency: Some(result.frequency),
            zone: Some(TuningZone::from_cents(raw_cents)),
        }
    }

    /// Clears the needle, e.g. when the tuner screen is left.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_reading = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frequency: f32) -> Option<PitchSample> {
        Some(PitchSample {
            frequency,
            confidence: 0.95,
        })
    }

    #[test]
    fn reads_slightly_sharp_a4() {
        let mut tuner = TunerState::default();
        let reading = tuner.update(sample(442.0));
        assert_eq!(reading.status, TunerStatus::Active);
        assert_eq!(reading.note_name.as_deref(), Some("A4"));
        assert_eq!(reading.midi, Some(69));
        let raw = reading.raw_cents.unwrap();
        assert!((raw - 7.85).abs() < 0.05, "{raw}");
        assert_eq!(reading.zone, Some(TuningZone::Close));
    }

    #[test]
    fn needle_settles_toward_the_reading() {
        let mut tuner = TunerState::default();
        let mut last = 0.0;
        for _ in 0..30 {
            let reading = tuner.update(sample(442.0));
            assert!(reading.smoothed_cents >= last);
            last = reading.smoothed_cents;
        }
        assert!((last - 7.85).abs() < 0.1, "{last}");
    }

    #[test]
    fn dropouts_show_waiting_and_relax_the_needle() {
        let mut tuner = TunerState::default();
        for _ in 0..30 {
            tuner.update(sample(446.0));
        }
        let before = tuner.update(sample(446.0)).smoothed_cents;
        let reading = tuner.update(None);
        assert_eq!(reading.status, TunerStatus::Waiting);
        assert_eq!(reading.note_name, None);
        assert!(reading.smoothed_cents > 0.0 && reading.smoothed_cents < before);
        assert!(tuner.last_pitch().is_none());
    }

    #[test]
    fn low_confidence_is_treated_as_silence() {
        let mut tuner = TunerState::default();
        let reading = tuner.update(Some(PitchSample {
            frequency: 440.0,
            confidence: 0.5,
        }));
        assert_eq!(reading.status, TunerStatus::Waiting);
    }

    #[test]
    fn reference_change_moves_the_reading() {
        let mut tuner = TunerState::default();
        tuner.reference_mut().set(442);
        let reading = tuner.update(sample(442.0));
        assert!(reading.raw_cents.unwrap().abs() < 0.01);
        assert_eq!(reading.zone, Some(TuningZone::InTune));
    }

    #[test]
    fn manual_mode_reads_against_the_target() {
        let mut tuner = TunerState::default();
        tuner.set_mode(TuningMode::Manual { midi: 70 });
        let reading = tuner.update(sample(440.0));
        assert_eq!(reading.midi, Some(70));
        assert!((reading.raw_cents.unwrap() + 100.0).abs() < 0.01);
        assert_eq!(reading.zone, Some(TuningZone::Off));
        // The needle pins at the edge of the dial.
        assert!(reading.smoothed_cents >= -DIAL_RANGE_CENTS);
        let target = tuner.target_frequency().unwrap();
        assert!((target - 466.16).abs() < 0.01);
    }

    #[test]
    fn zones_follow_cent_thresholds() {
        assert_eq!(TuningZone::from_cents(-4.9), TuningZone::InTune);
        assert_eq!(TuningZone::from_cents(5.0), TuningZone::Close);
        assert_eq!(TuningZone::from_cents(-19.9), TuningZone::Close);
        assert_eq!(TuningZone::from_cents(20.0), TuningZone::Off);
    }
}
