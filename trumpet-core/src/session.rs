//! # Game Session Module
//!
//! Explicit start/stop controller around the [`Scheduler`]. The front-end
//! calls [`GameLoop::tick`] once per display frame; tests call it with a
//! synthetic clock to drive any number of deterministic frames.

use crate::game::{GameEvent, GameTuning, Scheduler, Scoreboard};
use crate::settings::{GameSettings, ScoreEntry, ScoreRecorder};
use crate::tuning::PitchResult;
use anyhow::Result;
use chrono::Utc;

/// Longest frame step fed to the scheduler; a stalled window should not
/// teleport notes past the judgment zone.
pub const MAX_FRAME_DT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
}

/// Statistics of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub scoreboard: Scoreboard,
    pub duration_secs: f64,
}

/// Owns the scheduler and decides when it runs.
pub struct GameLoop {
    scheduler: Scheduler,
    tuning: GameTuning,
    seed: Option<u64>,
    state: LoopState,
    last_tick: Option<f64>,
    started_at: f64,
    /// Seconds spent running, excluding pauses.
    elapsed: f64,
    /// Whether a pitch source is connected.
    input_available: bool,
    /// Paused because the pitch source went away, not by the player.
    held_for_input: bool,
}

impl GameLoop {
    pub fn new(settings: GameSettings, tuning: GameTuning) -> Self {
        Self::build(settings, tuning, None)
    }

    /// A loop whose note choices repeat for the same seed.
    pub fn with_seed(settings: GameSettings, tuning: GameTuning, seed: u64) -> Self {
        Self::build(settings, tuning, Some(seed))
    }

    fn build(settings: GameSettings, tuning: GameTuning, seed: Option<u64>) -> Self {
        Self {
            scheduler: Self::fresh_scheduler(settings, &tuning, seed),
            tuning,
            seed,
            state: LoopState::Idle,
            last_tick: None,
            started_at: 0.0,
            elapsed: 0.0,
            input_available: true,
            held_for_input: false,
        }
    }

    fn fresh_scheduler(settings: GameSettings, tuning: &GameTuning, seed: Option<u64>) -> Scheduler {
        match seed {
            Some(seed) => Scheduler::with_seed(settings, tuning.clone(), seed),
            None => Scheduler::new(settings, tuning.clone()),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Session time as seen by the scheduler (pauses excluded).
    pub fn game_time(&self) -> f64 {
        self.elapsed
    }

    pub fn input_available(&self) -> bool {
        self.input_available
    }

    /// True while the session is held until a pitch source returns.
    pub fn is_waiting_for_input(&self) -> bool {
        self.held_for_input
    }

    /// Starts a fresh session, discarding any previous notes and score.
    ///
    /// Without a pitch source the session starts held: nothing spawns and
    /// nothing is judged until [`GameLoop::set_input_available`] reports one.
    pub fn start(&mut self, now: f64) {
        let settings = self.scheduler.settings().clone();
        self.scheduler = Self::fresh_scheduler(settings, &self.tuning, self.seed);
        self.started_at = now;
        self.elapsed = 0.0;
        if self.input_available {
            self.state = LoopState::Running;
            self.last_tick = Some(now);
            self.held_for_input = false;
            log::info!("Game session started");
        } else {
            self.state = LoopState::Paused;
            self.last_tick = None;
            self.held_for_input = true;
            log::info!("Game session waiting for audio input");
        }
    }

    pub fn pause(&mut self) {
        if self.state == LoopState::Running {
            self.state = LoopState::Paused;
            self.last_tick = None;
        }
    }

    /// Continues a paused session. Has no effect without a pitch source.
    pub fn resume(&mut self, now: f64) {
        if self.state == LoopState::Paused && self.input_available {
            self.state = LoopState::Running;
            self.last_tick = Some(now);
            self.held_for_input = false;
        }
    }

    /// Records whether a pitch source is connected.
    ///
    /// Losing it holds a running session; getting it back resumes only a
    /// session that was held this way, never one the player paused.
    pub fn set_input_available(&mut self, available: bool, now: f64) {
        if self.input_available == available {
            return;
        }
        self.input_available = available;
        if !available && self.state == LoopState::Running {
            self.pause();
            self.held_for_input = true;
            log::warn!("Audio input lost, holding the session");
        } else if available && self.held_for_input {
            self.resume(now);
            log::info!("Audio input available, session resumed");
        }
    }

    /// Replaces the settings snapshot; the next tick sees it.
    pub fn apply_settings(&mut self, settings: GameSettings) {
        self.scheduler.apply_settings(settings);
    }

    /// Runs one frame if the loop is running.
    ///
    /// `pitch` must already be mapped to written pitch.
    pub fn tick(&mut self, now: f64, pitch: Option<&PitchResult>) -> Vec<GameEvent> {
        if self.state != LoopState::Running {
            return Vec::new();
        }
        let dt = self
            .last_tick
            .map_or(0.0, |last| (now - last).clamp(0.0, MAX_FRAME_DT));
        self.last_tick = Some(now);
        self.elapsed += dt;
        self.scheduler.tick(self.elapsed, dt as f32, pitch)
    }

    /// Ends the session. Returns `None` if no session was active.
    pub fn stop(&mut self, now: f64) -> Option<SessionSummary> {
        if self.state == LoopState::Idle {
            return None;
        }
        self.state = LoopState::Idle;
        self.last_tick = None;
        self.held_for_input = false;
        let summary = SessionSummary {
            scoreboard: self.scheduler.scoreboard(),
            duration_secs: self.elapsed,
        };
        log::info!(
            "Game session stopped: score {} after {:.1}s played ({:.1}s wall)",
            summary.scoreboard.score,
            summary.duration_secs,
            now - self.started_at
        );
        Some(summary)
    }
}

/// Builds the score entry for a finished session and hands it to `recorder`.
///
/// Sessions without a single resolved note are not recorded.
pub fn finish_session(
    summary: &SessionSummary,
    settings: &GameSettings,
    recorder: &dyn ScoreRecorder,
) -> Result<Option<ScoreEntry>> {
    let board = summary.scoreboard;
    if board.hits + board.misses == 0 {
        return Ok(None);
    }
    let entry = ScoreEntry {
        score: board.score,
        best_streak: board.best_streak,
        hits: board.hits,
        misses: board.misses,
        level: board.level,
        key: settings.key,
        scale_type: settings.scale_type,
        duration_secs: summary.duration_secs,
        played_at: Utc::now(),
    };
    recorder.record_score(&entry)?;
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MemoryRecorder {
        entries: RefCell<Vec<ScoreEntry>>,
    }

    impl ScoreRecorder for MemoryRecorder {
        fn record_score(&self, entry: &ScoreEntry) -> Result<()> {
            self.entries.borrow_mut().push(entry.clone());
            Ok(())
        }
    }

    fn tuning() -> GameTuning {
        GameTuning {
            first_spawn_delay: 0.5,
            ..GameTuning::default()
        }
    }

    #[test]
    fn idle_loop_does_nothing() {
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 1);
        assert!(game.tick(1.0, None).is_empty());
        assert!(game.scheduler().notes().is_empty());
        assert_eq!(game.stop(2.0), None);
    }

    #[test]
    fn paused_loop_freezes_the_playfield() {
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 1);
        game.start(10.0);
        let mut now = 10.0;
        while game.scheduler().notes().is_empty() {
            now += 1.0 / 60.0;
            game.tick(now, None);
        }
        game.pause();
        let frozen = game.scheduler().notes()[0].x;
        for _ in 0..30 {
            now += 1.0 / 60.0;
            assert!(game.tick(now, None).is_empty());
        }
        assert_eq!(game.scheduler().notes()[0].x, frozen);

        // A long pause must not count as one huge frame.
        now += 5.0;
        game.resume(now);
        now += 1.0 / 60.0;
        game.tick(now, None);
        let moved = frozen - game.scheduler().notes()[0].x;
        assert!(moved > 0.0 && moved < 0.01, "{moved}");
    }

    #[test]
    fn frame_steps_are_clamped() {
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 2);
        game.start(0.0);
        game.tick(3.0, None);
        assert!((game.game_time() - MAX_FRAME_DT).abs() < 1e-9);
    }

    #[test]
    fn restarting_clears_the_previous_session() {
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 3);
        game.start(0.0);
        let mut now = 0.0;
        for _ in 0..120 {
            now += 1.0 / 60.0;
            game.tick(now, None);
        }
        assert!(!game.scheduler().notes().is_empty());
        game.start(now);
        assert!(game.scheduler().notes().is_empty());
        assert_eq!(game.game_time(), 0.0);
    }

    #[test]
    fn session_without_input_is_held_and_not_recorded() {
        let recorder = MemoryRecorder::default();
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 4);
        game.set_input_available(false, 0.0);
        game.start(0.0);
        assert_eq!(game.state(), LoopState::Paused);
        assert!(game.is_waiting_for_input());

        let mut now = 0.0;
        for _ in 0..600 {
            now += 1.0 / 60.0;
            assert!(game.tick(now, None).is_empty());
        }
        game.resume(now);
        assert_eq!(game.state(), LoopState::Paused);
        assert!(game.scheduler().notes().is_empty());

        let summary = game.stop(now).unwrap();
        assert_eq!(summary.scoreboard.misses, 0);
        let settings = GameSettings::default();
        assert_eq!(finish_session(&summary, &settings, &recorder).unwrap(), None);
        assert!(recorder.entries.borrow().is_empty());
    }

    #[test]
    fn losing_input_holds_judgment_until_it_returns() {
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 5);
        game.set_input_available(false, 0.0);
        game.start(0.0);
        game.set_input_available(true, 1.0);
        assert_eq!(game.state(), LoopState::Running);
        assert!(!game.is_waiting_for_input());

        let mut now = 1.0;
        while game.scheduler().notes().is_empty() {
            now += 1.0 / 60.0;
            game.tick(now, None);
        }
        game.set_input_available(false, now);
        assert_eq!(game.state(), LoopState::Paused);
        let frozen = game.scheduler().notes()[0].x;
        for _ in 0..1200 {
            now += 1.0 / 60.0;
            assert!(game.tick(now, None).is_empty());
        }
        assert_eq!(game.scheduler().scoreboard().misses, 0);
        assert_eq!(game.scheduler().notes()[0].x, frozen);

        game.set_input_available(true, now);
        assert_eq!(game.state(), LoopState::Running);
    }

    #[test]
    fn returning_input_does_not_undo_a_player_pause() {
        let mut game = GameLoop::with_seed(GameSettings::default(), tuning(), 6);
        game.start(0.0);
        game.pause();
        game.set_input_available(false, 1.0);
        game.set_input_available(true, 2.0);
        assert_eq!(game.state(), LoopState::Paused);
        game.resume(3.0);
        assert_eq!(game.state(), LoopState::Running);
    }

    #[test]
    fn finished_sessions_are_recorded() {
        let recorder = MemoryRecorder::default();
        let summary = SessionSummary {
            scoreboard: Scoreboard {
                score: 40,
                streak: 1,
                best_streak: 3,
                hits: 4,
                misses: 2,
                level: 0,
            },
            duration_secs: 42.0,
        };
        let settings = GameSettings::default();
        let entry = finish_session(&summary, &settings, &recorder).unwrap().unwrap();
        assert_eq!(entry.score, 40);
        assert_eq!(entry.best_streak, 3);
        assert_eq!(recorder.entries.borrow().len(), 1);

        let empty = SessionSummary {
            scoreboard: Scoreboard::default(),
            duration_secs: 3.0,
        };
        assert_eq!(finish_session(&empty, &settings, &recorder).unwrap(), None);
        assert_eq!(recorder.entries.borrow().len(), 1);
    }
}
