//! # Trumpet Trainer - Tuner and Note-Reading Game
//!
//! This module contains the main GUI application. It hosts two screens that
//! listen to the microphone: a chromatic tuner and a note-reading game.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Capture Thread**: owned by a `CaptureSession` while the tuner or the
//!   game screen is open, released as soon as the screen is left. Opening
//!   the device is polled from the tick so a permission prompt never blocks
//!   the window
//! - **Communication**: the capture thread publishes into a single-slot pitch
//!   holder that every tick reads without waiting
//! - **Updates**: 60 FPS ticks via the subscription system, only while a
//!   listening screen is open

mod ui;

use anyhow::{Context, Result};
use iced::{Element, Subscription, Theme};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use trumpet_core::capture::{CaptureSession, PendingCapture};
use trumpet_core::game::{GameEvent, GameTuning};
use trumpet_core::pitch::{EstimatorConfig, PitchSample};
use trumpet_core::render::Hud;
use trumpet_core::session::{GameLoop, LoopState, SessionSummary, finish_session};
use trumpet_core::settings::{GameSettings, JsonFileStore, SettingsStore};
use trumpet_core::sfx::{Cue, SfxPlayer};
use trumpet_core::tuner::{TunerReading, TunerState, TuningMode};
use trumpet_core::tuning::PitchMapper;
use ui::settings_panel::{NoteChoice, SettingChange};

/// Directory name under the platform config directory.
const APP_DIR: &str = "trumpet-trainer";

/// Main entry point for the Trumpet Trainer application.
pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting Trumpet Trainer...");
    let result = iced::application("Trumpet Trainer", TrumpetApp::update, TrumpetApp::view)
        .subscription(TrumpetApp::subscription)
        .theme(TrumpetApp::theme)
        .run();
    log::info!("Application finished with result: {result:?}");
    result
}

/// Application message types.
#[derive(Debug, Clone)]
pub enum Message {
    // Navigation
    OpenTuner,
    OpenGame,
    GoHome,
    RetryCapture, // Explicit retry after the microphone failed to open

    // Tuner controls
    ReferenceNudge(i16),
    ReferenceReset,
    TunerAuto,
    TunerTarget(NoteChoice),

    // Game controls
    StartGame,
    TogglePause,
    StopGame,

    Setting(SettingChange),

    // Continuous update message
    Tick(Instant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Tuner,
    Game,
}

/// Main application state.
struct TrumpetApp {
    screen: Screen,
    store: JsonFileStore,
    settings: GameSettings,

    // Audio resources, alive only while a listening screen is open
    pending_capture: Option<PendingCapture>,
    capture: Option<CaptureSession>,
    capture_error: Option<String>,
    sfx: Option<SfxPlayer>,

    tuner: TunerState,
    reading: TunerReading,

    game: GameLoop,
    hud: Hud,
    last_summary: Option<SessionSummary>,
    best_score: Option<u32>,

    /// Zero point of the game clock.
    epoch: Instant,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
}

impl Default for TrumpetApp {
    fn default() -> Self {
        let store = JsonFileStore::new(config_dir());
        log::info!("Settings directory: {}", store.dir().display());
        let settings = store.load();
        let best_score = store.best_score();

        let mut tuner = TunerState::default();
        tuner.set_calibration_cents(settings.calibration_cents);
        tuner.set_use_flats(settings.use_flats());
        let reading = tuner.update(None);

        // No microphone until a listening screen opens one.
        let mut game = GameLoop::new(settings.clone(), GameTuning::default());
        game.set_input_available(false, 0.0);

        Self {
            screen: Screen::Home,
            game,
            store,
            settings,
            pending_capture: None,
            capture: None,
            capture_error: None,
            sfx: None,
            tuner,
            reading,
            hud: Hud::default(),
            last_summary: None,
            best_score,
            epoch: Instant::now(),
        }
    }
}

impl TrumpetApp {
    fn clock(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.epoch).as_secs_f64()
    }

    /// Starts opening the microphone; [`Self::poll_capture`] picks up the
    /// outcome. Failures are kept for the inline error banner; there is no
    /// automatic retry.
    fn start_capture(&mut self, now: Instant) {
        self.stop_capture(now);
        self.capture_error = None;
        match CaptureSession::spawn(EstimatorConfig::default()) {
            Ok(pending) => self.pending_capture = Some(pending),
            Err(e) => self.capture_failed(e.to_string()),
        }
    }

    fn capture_failed(&mut self, error: String) {
        log::error!("Microphone unavailable: {error}");
        self.capture_error = Some(error);
    }

    fn poll_capture(&mut self, now: Instant) {
        let Some(outcome) = self.pending_capture.as_mut().and_then(|p| p.poll()) else {
            return;
        };
        self.pending_capture = None;
        match outcome {
            Ok(session) => {
                self.capture = Some(session);
                let clock = self.clock(now);
                self.game.set_input_available(true, clock);
            }
            Err(e) => self.capture_failed(e.to_string()),
        }
    }

    /// Releases the microphone. A running game is held until it returns.
    fn stop_capture(&mut self, now: Instant) {
        self.pending_capture = None;
        if let Some(mut session) = self.capture.take() {
            session.stop();
        }
        let clock = self.clock(now);
        self.game.set_input_available(false, clock);
    }

    fn game_mapper(&self) -> PitchMapper {
        PitchMapper {
            reference: self.tuner.reference(),
            calibration_cents: self.settings.calibration_cents,
            transposition: self.settings.transposition,
        }
    }

    fn start_game(&mut self, now: Instant) {
        self.game.apply_settings(self.settings.clone());
        if self.settings.sfx_enabled && self.sfx.is_none() {
            match SfxPlayer::start() {
                Ok(player) => self.sfx = Some(player),
                Err(e) => log::warn!("Sound effects disabled: {e}"),
            }
        }
        self.last_summary = None;
        self.hud = Hud::default();
        let clock = self.clock(now);
        self.game.start(clock);
    }

    /// Stops a running or paused game and records its score.
    fn finish_game(&mut self, now: Instant) {
        let clock = self.clock(now);
        let Some(summary) = self.game.stop(clock) else {
            return;
        };
        if let Err(e) = self.record(&summary) {
            log::error!("{e:#}");
        }
        self.last_summary = Some(summary);
    }

    fn record(&mut self, summary: &SessionSummary) -> Result<()> {
        let entry = finish_session(summary, &self.settings, &self.store)
            .context("Failed to record score")?;
        if let Some(entry) = entry {
            log::info!("Recorded score {} (best streak {})", entry.score, entry.best_streak);
            self.best_score = self.store.best_score();
        }
        Ok(())
    }

    fn apply_setting(&mut self, change: SettingChange) {
        self.settings = change.apply(&self.settings);
        self.tuner.set_calibration_cents(self.settings.calibration_cents);
        self.tuner.set_use_flats(self.settings.use_flats());
        self.game.apply_settings(self.settings.clone());
        if !self.settings.sfx_enabled {
            self.sfx = None;
        }
        if let Err(e) = self
            .store
            .save(&self.settings)
            .context("Failed to save settings")
        {
            log::error!("{e:#}");
        }
    }

    fn tick_game(&mut self, now: Instant, sample: Option<PitchSample>) {
        let cutoff = self.settings.confidence_cutoff();
        let pitch = sample.and_then(|s| self.game_mapper().map(&s));
        let clock = self.clock(now);
        let events = self.game.tick(clock, pitch.as_ref());

        for event in &events {
            match event {
                GameEvent::Hit { midi, cents, .. } => log::debug!("Hit {midi} ({cents:+.1} cents)"),
                GameEvent::Missed { midi, .. } => log::debug!("Missed {midi}"),
                GameEvent::LevelUp { level } => log::info!("Reached level {level}"),
                GameEvent::Spawned { .. } => {}
            }
            if let (Some(sfx), Some(cue)) = (&self.sfx, Cue::for_event(event)) {
                sfx.play(cue);
            }
        }

        let board = self.game.scheduler().scoreboard();
        let use_flats = self.settings.use_flats();
        self.hud = Hud {
            score: board.score,
            streak: board.streak,
            best_streak: board.best_streak,
            level: board.level,
            detected: pitch
                .filter(|p| p.is_active(cutoff))
                .map(|p| p.note_name(use_flats)),
            paused: self.game.state() == LoopState::Paused,
        };
    }

    /// Handles application state updates based on incoming messages.
    fn update(&mut self, message: Message) {
        let now = Instant::now();
        match message {
            Message::OpenTuner => {
                log::info!("Opening tuner");
                self.screen = Screen::Tuner;
                self.tuner.reset();
                self.reading = self.tuner.update(None);
                self.start_capture(now);
            }
            Message::OpenGame => {
                log::info!("Opening game");
                self.screen = Screen::Game;
                // The session stays held until the microphone is open.
                self.start_capture(now);
                self.start_game(now);
            }
            Message::GoHome => {
                if self.screen == Screen::Game {
                    self.finish_game(now);
                }
                self.stop_capture(now);
                self.sfx = None;
                self.capture_error = None;
                self.screen = Screen::Home;
            }
            Message::RetryCapture => self.start_capture(now),

            Message::ReferenceNudge(delta) => {
                self.tuner.reference_mut().nudge(delta);
                log::info!("Reference set to {}", self.tuner.reference());
            }
            Message::ReferenceReset => self.tuner.reference_mut().reset(),
            Message::TunerAuto => self.tuner.set_mode(TuningMode::Auto),
            Message::TunerTarget(note) => {
                // Choosing the current target again switches back to auto.
                let mode = match self.tuner.mode() {
                    TuningMode::Manual { midi } if midi == note.0 => TuningMode::Auto,
                    _ => TuningMode::Manual { midi: note.0 },
                };
                self.tuner.set_mode(mode);
            }

            Message::StartGame => {
                self.finish_game(now);
                self.start_game(now);
            }
            Message::TogglePause => match self.game.state() {
                LoopState::Running => self.game.pause(),
                LoopState::Paused => self.game.resume(self.clock(now)),
                LoopState::Idle => {}
            },
            Message::StopGame => self.finish_game(now),

            Message::Setting(change) => self.apply_setting(change),

            Message::Tick(instant) => {
                self.poll_capture(instant);
                let sample = self
                    .capture
                    .as_ref()
                    .and_then(|c| c.slot().current(instant));
                match self.screen {
                    Screen::Tuner => self.reading = self.tuner.update(sample),
                    Screen::Game => self.tick_game(instant, sample),
                    Screen::Home => {}
                }
            }
        }
    }

    /// Renders the current screen.
    fn view(&self) -> Element<'_, Message> {
        let capture_error = self.capture_error.as_deref();
        match self.screen {
            Screen::Home => ui::main_display::home_view(
                &self.settings,
                self.best_score,
                self.last_summary.as_ref(),
            ),
            Screen::Tuner => ui::main_display::tuner_view(
                &self.reading,
                &self.tuner,
                self.settings.use_flats(),
                capture_error,
            ),
            Screen::Game => ui::main_display::game_view(
                &self.game,
                &self.hud,
                self.last_summary.as_ref(),
                capture_error,
            ),
        }
    }

    /// Ticks every 16ms (60 FPS) while a listening screen is open.
    fn subscription(&self) -> Subscription<Message> {
        if self.screen == Screen::Home {
            Subscription::none()
        } else {
            iced::time::every(Duration::from_millis(16)).map(Message::Tick)
        }
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
