// trumpet-core/src/lib.rs

//! The core logic for the trumpet tuner and note-reading game.
//! This crate is responsible for audio capture, pitch detection, music
//! theory, the game scheduler and the drawing of both screens onto an
//! abstract surface. It is completely headless and contains no GUI code.

pub mod audio;
pub mod capture;
pub mod fft;
pub mod game;
pub mod pitch;
pub mod render;
pub mod session;
pub mod settings;
pub mod sfx;
pub mod theory;
pub mod tuner;
pub mod tuning;

pub use audio::CaptureError;
pub use capture::{CaptureSession, PitchSlot};
pub use game::{GameEvent, GameNote, GameTuning, Particle, Scheduler, Scoreboard};
pub use pitch::{EstimatorConfig, PitchEstimator, PitchSample};
pub use session::{GameLoop, SessionSummary};
pub use settings::{GameSettings, JsonFileStore, ScoreEntry, ScoreRecorder, SettingsStore};
pub use tuner::{TunerReading, TunerState};
pub use tuning::{PitchMapper, PitchResult, TuningReference};
