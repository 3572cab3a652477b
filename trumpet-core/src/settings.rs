//! # Settings Module
//!
//! Player-facing game configuration, its validation boundary, and the local
//! persistence of settings and best scores.
//!
//! Everything that enters a [`GameSettings`] from the outside (a file, a UI
//! control) passes through [`GameSettings::sanitized`], so the scheduler and
//! mapper never see out-of-range values.

use crate::theory::{self, Key, ScaleType};
use crate::tuning::ConfidenceLevel;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Lowest written note offered by default (F#3, the trumpet's lowest valve note).
pub const DEFAULT_RANGE_MIN: &str = "F#3";
/// Highest written note offered by default.
pub const DEFAULT_RANGE_MAX: &str = "C6";

pub const MIN_START_SPEED: f32 = 0.5;
pub const MAX_START_SPEED: f32 = 3.0;
pub const MAX_CALIBRATION_CENTS: f32 = 50.0;
pub const MAX_TRANSPOSITION: i32 = 12;

/// Number of score entries kept on disk.
pub const MAX_SCORES: usize = 20;

/// How accidentals are handled when generating notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccidentalMode {
    /// Only white-key notes are generated.
    Naturals,
    /// Spell with sharps or flats depending on the key.
    #[default]
    KeySignature,
    Sharps,
    Flats,
}

impl AccidentalMode {
    pub const ALL: [AccidentalMode; 4] = [
        AccidentalMode::Naturals,
        AccidentalMode::KeySignature,
        AccidentalMode::Sharps,
        AccidentalMode::Flats,
    ];

    /// Whether notes should be spelled with flats in `key`.
    pub fn use_flats(self, key: Key) -> bool {
        match self {
            AccidentalMode::Flats => true,
            AccidentalMode::Sharps => false,
            AccidentalMode::Naturals | AccidentalMode::KeySignature => key.prefers_flats(),
        }
    }
}

impl fmt::Display for AccidentalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccidentalMode::Naturals => "Naturals only",
            AccidentalMode::KeySignature => "Key signature",
            AccidentalMode::Sharps => "Sharps",
            AccidentalMode::Flats => "Flats",
        })
    }
}

/// Configuration read by the note scheduler and pitch mapper each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub key: Key,
    pub scale_type: ScaleType,
    /// Lowest written note, e.g. `"C4"`.
    pub range_min: String,
    /// Highest written note, e.g. `"C5"`.
    pub range_max: String,
    pub accidental_mode: AccidentalMode,
    /// Multiplier on the base scroll speed.
    pub start_speed: f32,
    pub confidence_threshold: ConfidenceLevel,
    /// Pitch correction added to every reading, in cents.
    pub calibration_cents: f32,
    pub sfx_enabled: bool,
    /// Semitones from sounding to written pitch (+2 for B♭ trumpet).
    pub transposition: i32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            key: Key::C,
            scale_type: ScaleType::Major,
            range_min: DEFAULT_RANGE_MIN.to_string(),
            range_max: DEFAULT_RANGE_MAX.to_string(),
            accidental_mode: AccidentalMode::KeySignature,
            start_speed: 1.0,
            confidence_threshold: ConfidenceLevel::Medium,
            calibration_cents: 0.0,
            sfx_enabled: true,
            transposition: 0,
        }
    }
}

impl GameSettings {
    /// Returns a copy with every field corrected into its valid range.
    ///
    /// - unparseable range names fall back to the defaults
    /// - an inverted range is swapped
    /// - range names are rewritten in canonical spelling
    /// - numeric fields are clamped, NaN resets to the default
    pub fn sanitized(&self) -> Self {
        let mut min = theory::parse_note_name(&self.range_min)
            .unwrap_or_else(|| theory::note_name_to_midi(DEFAULT_RANGE_MIN));
        let mut max = theory::parse_note_name(&self.range_max)
            .unwrap_or_else(|| theory::note_name_to_midi(DEFAULT_RANGE_MAX));
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        let use_flats = self.use_flats();

        let start_speed = if self.start_speed.is_finite() {
            self.start_speed.clamp(MIN_START_SPEED, MAX_START_SPEED)
        } else {
            1.0
        };
        let calibration_cents = if self.calibration_cents.is_finite() {
            self.calibration_cents
                .clamp(-MAX_CALIBRATION_CENTS, MAX_CALIBRATION_CENTS)
        } else {
            0.0
        };

        Self {
            key: self.key,
            scale_type: self.scale_type,
            range_min: theory::midi_to_note_name(min, use_flats),
            range_max: theory::midi_to_note_name(max, use_flats),
            accidental_mode: self.accidental_mode,
            start_speed,
            confidence_threshold: self.confidence_threshold,
            calibration_cents,
            sfx_enabled: self.sfx_enabled,
            transposition: self.transposition.clamp(-MAX_TRANSPOSITION, MAX_TRANSPOSITION),
        }
    }

    /// MIDI bounds of the playable range, ordered.
    pub fn midi_range(&self) -> (u8, u8) {
        let min = theory::note_name_to_midi(&self.range_min);
        let max = theory::note_name_to_midi(&self.range_max);
        (min.min(max), min.max(max))
    }

    pub fn use_flats(&self) -> bool {
        self.accidental_mode.use_flats(self.key)
    }

    /// Notes the scheduler may spawn.
    ///
    /// In naturals-only mode accidentals are removed unless that would leave
    /// nothing to play.
    pub fn candidate_notes(&self) -> Vec<u8> {
        let (min, max) = self.midi_range();
        let notes = theory::get_scale_notes(self.key, self.scale_type, min, max);
        if self.accidental_mode == AccidentalMode::Naturals {
            let naturals: Vec<u8> = notes.iter().copied().filter(|&m| theory::is_natural(m)).collect();
            if !naturals.is_empty() {
                return naturals;
            }
        }
        notes
    }

    pub fn confidence_cutoff(&self) -> f32 {
        self.confidence_threshold.threshold()
    }
}

/// One finished game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: u32,
    pub best_streak: u32,
    pub hits: u32,
    pub misses: u32,
    pub level: u32,
    pub key: Key,
    pub scale_type: ScaleType,
    pub duration_secs: f64,
    pub played_at: DateTime<Utc>,
}

/// Loads and saves [`GameSettings`].
pub trait SettingsStore {
    /// Never fails: missing or unreadable settings yield the defaults.
    fn load(&self) -> GameSettings;
    fn save(&self, settings: &GameSettings) -> Result<()>;
}

/// Receives the result of each finished session.
pub trait ScoreRecorder {
    fn record_score(&self, entry: &ScoreEntry) -> Result<()>;
}

/// JSON files in a single directory: `settings.json` and `scores.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    fn scores_path(&self) -> PathBuf {
        self.dir.join("scores.json")
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn read_settings(&self) -> Result<GameSettings> {
        let path = self.settings_path();
        let data = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let settings: GameSettings = serde_json::from_str(&data)?;
        Ok(settings)
    }

    /// Stored scores, best first.
    pub fn load_scores(&self) -> Result<Vec<ScoreEntry>> {
        let path = self.scores_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn best_score(&self) -> Option<u32> {
        self.load_scores()
            .ok()
            .and_then(|scores| scores.first().map(|entry| entry.score))
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> GameSettings {
        match self.read_settings() {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                log::info!("Using default settings: {e:#}");
                GameSettings::default()
            }
        }
    }

    fn save(&self, settings: &GameSettings) -> Result<()> {
        self.write_json(&self.settings_path(), &settings.sanitized())
    }
}

impl ScoreRecorder for JsonFileStore {
    fn record_score(&self, entry: &ScoreEntry) -> Result<()> {
        let mut scores = self.load_scores().unwrap_or_else(|e| {
            log::warn!("Discarding unreadable score file: {e:#}");
            Vec::new()
        });
        scores.push(entry.clone());
        scores.sort_by(|a, b| b.score.cmp(&a.score).then(b.played_at.cmp(&a.played_at)));
        scores.truncate(MAX_SCORES);
        self.write_json(&self.scores_path(), &scores)
    }
}
