//! # Settings Panel
//!
//! Controls for every field of [`GameSettings`]. Each control emits a
//! [`SettingChange`]; the application applies it, sanitizes the result and
//! persists it.

use iced::widget::{checkbox, column, pick_list, row, slider, text};
use iced::{Alignment, Element, Length};
use std::fmt;
use trumpet_core::settings::{
    AccidentalMode, GameSettings, MAX_CALIBRATION_CENTS, MAX_START_SPEED, MAX_TRANSPOSITION,
    MIN_START_SPEED,
};
use trumpet_core::theory::{self, Key, ScaleType};
use trumpet_core::tuning::ConfidenceLevel;

/// Lowest and highest notes offered for the range pickers (F#3 to C6 plus margin).
const RANGE_CHOICES: std::ops::RangeInclusive<u8> = 48..=96;

#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    Key(Key),
    Scale(ScaleType),
    RangeMin(NoteChoice),
    RangeMax(NoteChoice),
    Accidentals(AccidentalMode),
    StartSpeed(f32),
    Confidence(ConfidenceLevel),
    Calibration(f32),
    Transposition(i32),
    Sfx(bool),
}

impl SettingChange {
    /// Applies the change to a copy of `settings`, sanitized.
    pub fn apply(self, settings: &GameSettings) -> GameSettings {
        let use_flats = settings.use_flats();
        let mut next = settings.clone();
        match self {
            SettingChange::Key(key) => next.key = key,
            SettingChange::Scale(scale) => next.scale_type = scale,
            SettingChange::RangeMin(note) => {
                next.range_min = theory::midi_to_note_name(note.0, use_flats)
            }
            SettingChange::RangeMax(note) => {
                next.range_max = theory::midi_to_note_name(note.0, use_flats)
            }
            SettingChange::Accidentals(mode) => next.accidental_mode = mode,
            SettingChange::StartSpeed(speed) => next.start_speed = speed,
            SettingChange::Confidence(level) => next.confidence_threshold = level,
            SettingChange::Calibration(cents) => next.calibration_cents = cents,
            SettingChange::Transposition(semitones) => next.transposition = semitones,
            SettingChange::Sfx(enabled) => next.sfx_enabled = enabled,
        }
        next.sanitized()
    }
}

/// A MIDI note offered in a pick list, shown by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteChoice(pub u8);

impl fmt::Display for NoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&theory::midi_to_note_name(self.0, false))
    }
}

fn labeled<'a>(
    label: &'a str,
    control: impl Into<Element<'a, crate::Message>>,
) -> Element<'a, crate::Message> {
    row![text(label).width(Length::Fixed(150.0)), control.into()]
        .spacing(10)
        .align_y(Alignment::Center)
        .into()
}

/// Creates the settings panel for the current settings.
pub fn view(settings: &GameSettings) -> Element<'_, crate::Message> {
    let msg = crate::Message::Setting;
    let (min, max) = settings.midi_range();
    let notes: Vec<NoteChoice> = RANGE_CHOICES.map(NoteChoice).collect();

    column![
        text("Settings").size(20),
        labeled(
            "Key",
            pick_list(Key::ALL, Some(settings.key), move |k| msg(SettingChange::Key(k))),
        ),
        labeled(
            "Scale",
            pick_list(ScaleType::ALL, Some(settings.scale_type), move |s| {
                msg(SettingChange::Scale(s))
            }),
        ),
        labeled(
            "Lowest note",
            pick_list(notes.clone(), Some(NoteChoice(min)), move |n| {
                msg(SettingChange::RangeMin(n))
            }),
        ),
        labeled(
            "Highest note",
            pick_list(notes, Some(NoteChoice(max)), move |n| {
                msg(SettingChange::RangeMax(n))
            }),
        ),
        labeled(
            "Accidentals",
            pick_list(AccidentalMode::ALL, Some(settings.accidental_mode), move |m| {
                msg(SettingChange::Accidentals(m))
            }),
        ),
        labeled(
            "Detection",
            pick_list(ConfidenceLevel::ALL, Some(settings.confidence_threshold), move |c| {
                msg(SettingChange::Confidence(c))
            }),
        ),
        labeled(
            "Start speed",
            row![
                slider(MIN_START_SPEED..=MAX_START_SPEED, settings.start_speed, move |v| {
                    msg(SettingChange::StartSpeed(v))
                })
                .step(0.1)
                .width(Length::Fixed(200.0)),
                text(format!("{:.1}x", settings.start_speed)),
            ]
            .spacing(10),
        ),
        labeled(
            "Calibration",
            row![
                slider(
                    -MAX_CALIBRATION_CENTS..=MAX_CALIBRATION_CENTS,
                    settings.calibration_cents,
                    move |v| msg(SettingChange::Calibration(v)),
                )
                .step(1.0)
                .width(Length::Fixed(200.0)),
                text(format!("{:+.0} cents", settings.calibration_cents)),
            ]
            .spacing(10),
        ),
        labeled(
            "Transposition",
            row![
                slider(
                    -MAX_TRANSPOSITION..=MAX_TRANSPOSITION,
                    settings.transposition,
                    move |v| msg(SettingChange::Transposition(v)),
                )
                .width(Length::Fixed(200.0)),
                text(format!("{:+} semitones", settings.transposition)),
            ]
            .spacing(10),
        ),
        checkbox("Sound effects", settings.sfx_enabled)
            .on_toggle(move |on| msg(SettingChange::Sfx(on))),
    ]
    .spacing(10)
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_changes_are_sanitized() {
        let settings = GameSettings::default();
        let next = SettingChange::RangeMin(NoteChoice(90)).apply(&settings);
        // C6 (84) is now below the new minimum, so the range is swapped.
        assert_eq!(next.midi_range(), (84, 90));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = GameSettings::default();
        let next = SettingChange::StartSpeed(9.0).apply(&settings);
        assert_eq!(next.start_speed, MAX_START_SPEED);
        let next = SettingChange::Transposition(40).apply(&next);
        assert_eq!(next.transposition, MAX_TRANSPOSITION);
    }

    #[test]
    fn note_choices_display_sharps() {
        assert_eq!(NoteChoice(66).to_string(), "F#4");
    }
}
