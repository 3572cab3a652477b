//! # Note Scheduler Module
//!
//! State of the note-reading game: falling notes, particle effects, score and
//! level. One [`Scheduler::tick`] runs the four phases of a frame in a fixed
//! order: spawn, advance, judge, retire.
//!
//! Playfield coordinates: `x = 1.0` is the spawn edge, `x = 0.0` the judgment
//! zone, negative values are past it. Vertical positions are staff positions
//! (B4 = 0), see [`crate::theory::staff_position`].

use crate::settings::GameSettings;
use crate::theory::{self, Accidental};
use crate::tuning::PitchResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tunable constants of the game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameTuning {
    /// Playfield units per second at level 0 and start speed 1.0.
    pub base_speed: f32,
    pub speed_up_per_level: f32,
    /// Consecutive hits needed for each level-up.
    pub level_up_interval: u32,
    /// Playfield distance between consecutive spawns.
    pub spawn_spacing: f32,
    /// Quiet time before the first note of a session.
    pub first_spawn_delay: f64,
    pub spawn_x: f32,
    /// Notes can be hit while `hit_window.0 <= x <= hit_window.1`.
    pub hit_window: (f32, f32),
    /// Unresolved notes left of this are missed.
    pub miss_threshold: f32,
    pub hit_tolerance_cents: f32,
    /// Seconds a hit note stays visible while fading.
    pub hit_decay: f64,
    /// Seconds a missed note stays visible while fading.
    pub miss_decay: f64,
    /// Resolved notes left of this are removed immediately.
    pub retire_floor: f32,
    pub points_per_hit: u32,
    pub particles_per_hit: usize,
    /// Seconds a particle lives.
    pub particle_lifetime: f32,
    /// Downward acceleration in staff positions per second².
    pub particle_gravity: f32,
}

impl Default for GameTuning {
    fn default() -> Self {
        Self {
            base_speed: 0.25,
            speed_up_per_level: 0.03,
            level_up_interval: 10,
            spawn_spacing: 0.35,
            first_spawn_delay: 1.0,
            spawn_x: 1.0,
            hit_window: (-0.04, 0.12),
            miss_threshold: -0.04,
            hit_tolerance_cents: 40.0,
            hit_decay: 0.4,
            miss_decay: 0.6,
            retire_floor: -0.2,
            points_per_hit: 10,
            particles_per_hit: 12,
            particle_lifetime: 0.6,
            particle_gravity: -30.0,
        }
    }
}

/// One falling note.
#[derive(Debug, Clone, PartialEq)]
pub struct GameNote {
    pub id: u64,
    /// Written pitch the player must produce.
    pub midi: u8,
    pub x: f32,
    pub staff_position: i32,
    pub accidental: Option<Accidental>,
    pub hit: bool,
    pub hit_time: Option<f64>,
    pub missed: bool,
    pub missed_at: Option<f64>,
}

impl GameNote {
    pub fn is_resolved(&self) -> bool {
        self.hit || self.missed
    }

    /// 1.0 while the note is live, fading to 0.0 over its decay window once resolved.
    pub fn opacity(&self, now: f64, tuning: &GameTuning) -> f32 {
        let fade = |since: f64, decay: f64| (1.0 - (now - since) / decay).clamp(0.0, 1.0) as f32;
        match (self.hit_time, self.missed_at) {
            (Some(t), _) => fade(t, tuning.hit_decay),
            (None, Some(t)) => fade(t, tuning.miss_decay),
            (None, None) => 1.0,
        }
    }
}

/// RGB color with components in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

const PARTICLE_PALETTE: [Rgb; 4] = [
    Rgb::new(0.20, 0.86, 0.60),
    Rgb::new(1.00, 0.76, 0.00),
    Rgb::new(0.35, 0.70, 1.00),
    Rgb::new(1.00, 1.00, 1.00),
];

/// Short-lived hit effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f32,
    /// Staff-position units.
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub color: Rgb,
    /// Decays from 1.0 to 0.0.
    pub life: f32,
}

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Spawned { id: u64, midi: u8 },
    Hit { id: u64, midi: u8, cents: f32 },
    Missed { id: u64, midi: u8 },
    LevelUp { level: u32 },
}

/// Running totals of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scoreboard {
    pub score: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub hits: u32,
    pub misses: u32,
    pub level: u32,
}

/// Owner of the note and particle arrays.
pub struct Scheduler {
    settings: GameSettings,
    tuning: GameTuning,
    candidates: Vec<u8>,
    notes: Vec<GameNote>,
    particles: Vec<Particle>,
    scoreboard: Scoreboard,
    next_id: u64,
    next_spawn_at: Option<f64>,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(settings: GameSettings, tuning: GameTuning) -> Self {
        Self::with_rng(settings, tuning, StdRng::from_entropy())
    }

    /// Deterministic scheduler for tests and replays.
    pub fn with_seed(settings: GameSettings, tuning: GameTuning, seed: u64) -> Self {
        Self::with_rng(settings, tuning, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: GameSettings, tuning: GameTuning, rng: StdRng) -> Self {
        let settings = settings.sanitized();
        let candidates = settings.candidate_notes();
        if candidates.is_empty() {
            log::warn!(
                "No notes of {} {} between {} and {}",
                settings.key,
                settings.scale_type,
                settings.range_min,
                settings.range_max
            );
        }
        Self {
            settings,
            tuning,
            candidates,
            notes: Vec::new(),
            particles: Vec::new(),
            scoreboard: Scoreboard::default(),
            next_id: 0,
            next_spawn_at: None,
            rng,
        }
    }

    pub fn notes(&self) -> &[GameNote] {
        &self.notes
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn scoreboard(&self) -> Scoreboard {
        self.scoreboard
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn tuning(&self) -> &GameTuning {
        &self.tuning
    }

    /// Replaces the settings snapshot. Notes already on screen keep their pitch.
    pub fn apply_settings(&mut self, settings: GameSettings) {
        self.settings = settings.sanitized();
        self.candidates = self.settings.candidate_notes();
    }

    /// Current scroll speed in playfield units per second.
    pub fn speed(&self) -> f32 {
        self.tuning.base_speed * self.settings.start_speed
            + self.scoreboard.level as f32 * self.tuning.speed_up_per_level
    }

    /// Seconds between spawns at the current speed.
    pub fn spawn_interval(&self) -> f64 {
        (self.tuning.spawn_spacing / self.speed().max(f32::EPSILON)) as f64
    }

    /// Places a new note at the spawn edge.
    pub fn spawn_note(&mut self, midi: u8) -> u64 {
        let use_flats = self.settings.use_flats();
        let id = self.next_id;
        self.next_id += 1;
        self.notes.push(GameNote {
            id,
            midi,
            x: self.tuning.spawn_x,
            staff_position: theory::staff_position(midi, use_flats),
            accidental: theory::accidental(midi, use_flats),
            hit: false,
            hit_time: None,
            missed: false,
            missed_at: None,
        });
        id
    }

    /// Runs one frame: spawn, advance, judge, retire.
    ///
    /// # Arguments
    /// * `now` - Session time in seconds
    /// * `dt` - Seconds since the previous tick
    /// * `pitch` - Latest written-pitch reading, if any
    pub fn tick(&mut self, now: f64, dt: f32, pitch: Option<&PitchResult>) -> Vec<GameEvent> {
        let mut events = Vec::new();
        self.spawn_phase(now, &mut events);
        self.advance_phase(dt);
        self.judge_phase(now, pitch, &mut events);
        self.retire_phase(now);
        events
    }

    fn spawn_phase(&mut self, now: f64, events: &mut Vec<GameEvent>) {
        let due = *self
            .next_spawn_at
            .get_or_insert(now + self.tuning.first_spawn_delay);
        if now < due {
            return;
        }
        let key = self.settings.key;
        if let Some(midi) = theory::get_weighted_note(&mut self.rng, &self.candidates, key) {
            let id = self.spawn_note(midi);
            events.push(GameEvent::Spawned { id, midi });
        }
        self.next_spawn_at = Some(now + self.spawn_interval());
    }

    fn advance_phase(&mut self, dt: f32) {
        let step = self.speed() * dt;
        for note in &mut self.notes {
            note.x -= step;
        }

        let life_step = dt / self.tuning.particle_lifetime;
        let gravity = self.tuning.particle_gravity;
        for particle in &mut self.particles {
            particle.x += particle.vx * dt;
            particle.y += particle.vy * dt;
            particle.vy += gravity * dt;
            particle.life -= life_step;
        }
    }

    fn judge_phase(&mut self, now: f64, pitch: Option<&PitchResult>, events: &mut Vec<GameEvent>) {
        let threshold = self.settings.confidence_cutoff();
        let active = pitch.filter(|p| p.is_active(threshold));

        if let Some(pitch) = active {
            if let Some(index) = self.eligible_note(pitch) {
                self.register_hit(index, now, pitch.cents, events);
            }
        }

        let miss_threshold = self.tuning.miss_threshold;
        let mut missed = Vec::new();
        for note in &mut self.notes {
            if !note.is_resolved() && note.x < miss_threshold {
                note.missed = true;
                note.missed_at = Some(now);
                missed.push((note.id, note.midi));
            }
        }
        for (id, midi) in missed {
            self.scoreboard.streak = 0;
            self.scoreboard.misses += 1;
            events.push(GameEvent::Missed { id, midi });
        }
    }

    /// The unresolved note matching `pitch` inside the hit window.
    ///
    /// Ties go to the note closest to the judgment zone, then to the oldest.
    fn eligible_note(&self, pitch: &PitchResult) -> Option<usize> {
        let (lo, hi) = self.tuning.hit_window;
        self.notes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_resolved())
            .filter(|(_, n)| n.x >= lo && n.x <= hi)
            .filter(|(_, n)| n.midi as i32 == pitch.midi)
            .filter(|_| pitch.cents.abs() <= self.tuning.hit_tolerance_cents)
            .min_by(|(_, a), (_, b)| {
                a.x.abs()
                    .total_cmp(&b.x.abs())
                    .then(a.id.cmp(&b.id))
            })
            .map(|(i, _)| i)
    }

    fn register_hit(&mut self, index: usize, now: f64, cents: f32, events: &mut Vec<GameEvent>) {
        let (id, midi, x, y) = {
            let note = &mut self.notes[index];
            note.hit = true;
            note.hit_time = Some(now);
            (note.id, note.midi, note.x, note.staff_position as f32)
        };
        self.burst(x, y);

        let board = &mut self.scoreboard;
        board.score += self.tuning.points_per_hit;
        board.streak += 1;
        board.hits += 1;
        board.best_streak = board.best_streak.max(board.streak);
        events.push(GameEvent::Hit { id, midi, cents });

        let interval = self.tuning.level_up_interval;
        if interval > 0 && board.streak % interval == 0 {
            board.level += 1;
            let level = board.level;
            log::info!("Level up: {level}");
            events.push(GameEvent::LevelUp { level });
        }
    }

    fn burst(&mut self, x: f32, y: f32) {
        for _ in 0..self.tuning.particles_per_hit {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let speed = self.rng.gen_range(4.0..12.0);
            let color = PARTICLE_PALETTE[self.rng.gen_range(0..PARTICLE_PALETTE.len())];
            self.particles.push(Particle {
                x,
                y,
                // Horizontal speed in playfield units, vertical in staff positions.
                vx: angle.cos() * speed * 0.01,
                vy: angle.sin() * speed,
                size: self.rng.gen_range(0.5..1.0),
                color,
                life: 1.0,
            });
        }
    }

    fn retire_phase(&mut self, now: f64) {
        let tuning = &self.tuning;
        self.notes.retain(|note| {
            if note.x < tuning.retire_floor && note.is_resolved() {
                return false;
            }
            match (note.hit_time, note.missed_at) {
                (Some(t), _) => now - t < tuning.hit_decay,
                (None, Some(t)) => now - t < tuning.miss_decay,
                (None, None) => true,
            }
        });
        self.particles.retain(|p| p.life > 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::{PitchMapper, TuningReference, midi_to_frequency};
    use crate::pitch::PitchSample;

    const DT: f32 = 1.0 / 60.0;

    fn c_major() -> GameSettings {
        GameSettings {
            range_min: "C4".into(),
            range_max: "C5".into(),
            ..GameSettings::default()
        }
    }

    /// No automatic spawns, so only the notes a test places are on the staff.
    fn quiet() -> GameTuning {
        GameTuning {
            first_spawn_delay: 1e9,
            ..GameTuning::default()
        }
    }

    fn pitch_for(midi: i32) -> PitchResult {
        let sample = PitchSample {
            frequency: midi_to_frequency(midi, 440.0),
            confidence: 0.95,
        };
        PitchMapper::new(TuningReference::default()).map(&sample).unwrap()
    }

    /// Ticks without pitch until `id` enters the hit window.
    fn run_until_in_window(scheduler: &mut Scheduler, id: u64, now: &mut f64) {
        loop {
            let x = scheduler.notes().iter().find(|n| n.id == id).unwrap().x;
            if x <= scheduler.tuning().hit_window.1 {
                return;
            }
            *now += DT as f64;
            scheduler.tick(*now, DT, None);
        }
    }

    #[test]
    fn first_note_spawns_after_the_delay() {
        let mut scheduler = Scheduler::with_seed(c_major(), GameTuning::default(), 3);
        assert!(scheduler.tick(0.0, 0.0, None).is_empty());
        assert!(scheduler.tick(0.5, 0.5, None).is_empty());
        let events = scheduler.tick(1.0, 0.5, None);
        assert!(matches!(events.as_slice(), [GameEvent::Spawned { .. }]));

        let note = &scheduler.notes()[0];
        assert!(scheduler.settings().candidate_notes().contains(&note.midi));
        // Spawned at the edge and advanced in the same tick.
        assert!(note.x < 1.0 && note.x > 0.8);
    }

    #[test]
    fn spawn_cadence_follows_speed() {
        let mut scheduler = Scheduler::with_seed(c_major(), GameTuning::default(), 9);
        let mut now = 0.0;
        let mut spawned = 0;
        while now < 1.0 + 3.0 * scheduler.spawn_interval() - 0.01 {
            spawned += scheduler
                .tick(now, DT, None)
                .iter()
                .filter(|e| matches!(e, GameEvent::Spawned { .. }))
                .count();
            now += DT as f64;
        }
        assert_eq!(spawned, 3);
    }

    #[test]
    fn matching_pitch_in_the_window_scores_a_hit() {
        let mut scheduler = Scheduler::with_seed(c_major(), quiet(), 1);
        let mut now = 0.0;
        let id = scheduler.spawn_note(67);
        run_until_in_window(&mut scheduler, id, &mut now);

        now += DT as f64;
        let events = scheduler.tick(now, DT, Some(&pitch_for(67)));
        assert!(events.iter().any(|e| matches!(e, GameEvent::Hit { id: hit, midi: 67, .. } if *hit == id)));

        let note = scheduler.notes().iter().find(|n| n.id == id).unwrap();
        assert!(note.hit && !note.missed);
        assert_eq!(note.hit_time, Some(now));
        let board = scheduler.scoreboard();
        assert_eq!(board.score, GameTuning::default().points_per_hit);
        assert_eq!(board.streak, 1);
        assert_eq!(scheduler.particles().len(), GameTuning::default().particles_per_hit);
    }

    #[test]
    fn wrong_octave_or_low_confidence_does_not_hit() {
        let mut scheduler = Scheduler::with_seed(c_major(), quiet(), 1);
        let mut now = 0.0;
        let id = scheduler.spawn_note(67);
        run_until_in_window(&mut scheduler, id, &mut now);

        let mut quiet = pitch_for(67);
        quiet.confidence = 0.2;
        for pitch in [pitch_for(55), pitch_for(79), quiet] {
            now += DT as f64;
            let events = scheduler.tick(now, DT, Some(&pitch));
            assert!(!events.iter().any(|e| matches!(e, GameEvent::Hit { .. })));
        }
    }

    #[test]
    fn out_of_tolerance_cents_do_not_hit() {
        let tuning = GameTuning {
            hit_tolerance_cents: 20.0,
            ..quiet()
        };
        let mut scheduler = Scheduler::with_seed(c_major(), tuning, 1);
        let mut now = 0.0;
        let id = scheduler.spawn_note(67);
        run_until_in_window(&mut scheduler, id, &mut now);

        let mut sharp = pitch_for(67);
        sharp.cents = 35.0;
        now += DT as f64;
        let events = scheduler.tick(now, DT, Some(&sharp));
        assert!(!events.iter().any(|e| matches!(e, GameEvent::Hit { .. })));
    }

    #[test]
    fn unplayed_note_is_missed_exactly_once() {
        let mut scheduler = Scheduler::with_seed(c_major(), quiet(), 5);
        let mut now = 0.0;

        // Build a streak first.
        let first = scheduler.spawn_note(64);
        run_until_in_window(&mut scheduler, first, &mut now);
        now += DT as f64;
        scheduler.tick(now, DT, Some(&pitch_for(64)));
        assert_eq!(scheduler.scoreboard().streak, 1);

        let id = scheduler.spawn_note(72);
        let mut misses = 0;
        for _ in 0..600 {
            now += DT as f64;
            misses += scheduler
                .tick(now, DT, None)
                .iter()
                .filter(|e| matches!(e, GameEvent::Missed { id: m, .. } if *m == id))
                .count();
        }
        assert_eq!(misses, 1);
        assert_eq!(scheduler.scoreboard().streak, 0);
        assert!(scheduler.notes().iter().all(|n| n.id != id), "missed note retired");
    }

    #[test]
    fn tie_break_prefers_the_note_nearest_the_zone() {
        let mut scheduler = Scheduler::with_seed(c_major(), quiet(), 2);
        let mut now = 0.0;
        let early = scheduler.spawn_note(60);
        // Let the first note travel a little before its twin appears.
        for _ in 0..12 {
            now += DT as f64;
            scheduler.tick(now, DT, None);
        }
        let late = scheduler.spawn_note(60);
        run_until_in_window(&mut scheduler, late, &mut now);

        let early_x = scheduler.notes().iter().find(|n| n.id == early).unwrap().x;
        let late_x = scheduler.notes().iter().find(|n| n.id == late).unwrap().x;
        assert!(early_x >= -0.04, "early note still in the window");
        assert!(early_x.abs() < late_x.abs());

        now += DT as f64;
        let events = scheduler.tick(now, DT, Some(&pitch_for(60)));
        let hits: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::Hit { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(hits, vec![early]);
    }

    #[test]
    fn streak_levels_up_and_speeds_up() {
        let tuning = GameTuning {
            level_up_interval: 2,
            ..quiet()
        };
        let mut scheduler = Scheduler::with_seed(c_major(), tuning, 4);
        let base = scheduler.speed();
        let mut now = 0.0;
        let mut level_ups = 0;
        for midi in [60, 62] {
            let id = scheduler.spawn_note(midi);
            run_until_in_window(&mut scheduler, id, &mut now);
            now += DT as f64;
            level_ups += scheduler
                .tick(now, DT, Some(&pitch_for(midi as i32)))
                .iter()
                .filter(|e| matches!(e, GameEvent::LevelUp { level: 1 }))
                .count();
        }
        assert_eq!(level_ups, 1);
        assert_eq!(scheduler.scoreboard().level, 1);
        assert!(scheduler.speed() > base);
    }

    #[test]
    fn hit_notes_and_particles_fade_out() {
        let mut scheduler = Scheduler::with_seed(c_major(), quiet(), 8);
        let mut now = 0.0;
        let id = scheduler.spawn_note(65);
        run_until_in_window(&mut scheduler, id, &mut now);
        now += DT as f64;
        scheduler.tick(now, DT, Some(&pitch_for(65)));
        let hit_at = now;

        for _ in 0..60 {
            now += DT as f64;
            scheduler.tick(now, DT, None);
        }
        assert!(now - hit_at > scheduler.tuning().hit_decay);
        assert!(scheduler.notes().iter().all(|n| n.id != id));
        assert!(scheduler.particles().is_empty());
    }
}
