//! # Rendering Module
//!
//! Stateless drawing of the game playfield and the tuner dial onto an abstract
//! 2D [`Surface`]. The GUI implements the surface over its canvas; tests use a
//! recording surface.
//!
//! ## Features
//! - Five-line staff with clef, judgment line and hit window band
//! - Note heads with accidentals, ledger lines and hit/miss fading
//! - Particle bursts and a score HUD
//! - Tuner dial with color zones, glowing needle and a rotating note wheel

use crate::game::{GameNote, GameTuning, Particle, Rgb};
use crate::theory;
use crate::tuner::{DIAL_RANGE_CENTS, TunerReading, TuningZone};
use crate::tuning::TuningReference;
use std::f32::consts::{FRAC_PI_2, PI};

/// RGBA color with components in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }
}

impl From<Rgb> for Rgba {
    fn from(c: Rgb) -> Self {
        Self::new(c.r, c.g, c.b, 1.0)
    }
}

pub const BACKGROUND: Rgba = Rgba::from_rgb8(0x1E, 0x1E, 0x24);
pub const STAFF_INK: Rgba = Rgba::from_rgb8(0xD8, 0xD8, 0xD8);
pub const NOTE_INK: Rgba = Rgba::from_rgb8(0xF5, 0xF5, 0xF0);
pub const IN_TUNE: Rgba = Rgba::from_rgb8(0x34, 0xDB, 0x98);
pub const CLOSE: Rgba = Rgba::from_rgb8(0xFF, 0xC3, 0x00);
pub const OFF: Rgba = Rgba::from_rgb8(0xFF, 0x33, 0x33);
pub const MUTED: Rgba = Rgba::from_rgb8(0x80, 0x80, 0x88);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Immediate-mode 2D drawing target in logical pixels, y pointing down.
///
/// Angles are in radians, measured clockwise from the positive x axis.
pub trait Surface {
    fn fill_rect(&mut self, top_left: Point, width: f32, height: f32, color: Rgba);
    fn line(&mut self, from: Point, to: Point, width: f32, color: Rgba);
    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba);
    fn fill_ellipse(&mut self, center: Point, radii: (f32, f32), rotation: f32, color: Rgba);
    fn stroke_arc(
        &mut self,
        center: Point,
        radius: f32,
        angles: (f32, f32),
        width: f32,
        color: Rgba,
    );
    fn text(&mut self, content: &str, position: Point, size: f32, color: Rgba, align: TextAlign);
}

/// Maps staff positions and playfield x onto pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaffLayout {
    pub width: f32,
    pub height: f32,
    /// Pixel y of the middle staff line (B4, position 0).
    pub center_y: f32,
    /// Pixels per staff position (half a line spacing).
    pub step: f32,
    /// Pixel x of the judgment line (playfield x = 0).
    pub judgment_x: f32,
    /// Pixel x of the spawn edge (playfield x = 1).
    pub spawn_x: f32,
}

impl StaffLayout {
    pub fn new(width: f32, height: f32) -> Self {
        let step = (height / 28.0).clamp(3.0, 14.0);
        Self {
            width,
            height,
            center_y: height * 0.5,
            step,
            judgment_x: (width * 0.22).max(step * 10.0),
            spawn_x: width - step * 4.0,
        }
    }

    pub fn staff_y(&self, position: f32) -> f32 {
        self.center_y - position * self.step
    }

    pub fn note_x(&self, x: f32) -> f32 {
        self.judgment_x + x * (self.spawn_x - self.judgment_x)
    }

    /// Whether a note head centered at playfield `x` touches the canvas.
    pub fn is_visible(&self, x: f32) -> bool {
        let px = self.note_x(x);
        let margin = self.step * 4.0;
        px >= -margin && px <= self.width + margin
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hud {
    pub score: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub level: u32,
    /// Written note currently heard, if any.
    pub detected: Option<String>,
    pub paused: bool,
}

/// Everything the game renderer needs for one frame.
pub struct GameFrame<'a> {
    pub width: f32,
    pub height: f32,
    pub notes: &'a [GameNote],
    pub particles: &'a [Particle],
    pub now: f64,
    pub tuning: &'a GameTuning,
    pub hud: &'a Hud,
}

/// Paints one game frame. Has no effect on game state.
pub fn draw_game(surface: &mut dyn Surface, frame: &GameFrame<'_>) {
    let layout = StaffLayout::new(frame.width, frame.height);
    surface.fill_rect(Point::new(0.0, 0.0), frame.width, frame.height, BACKGROUND);

    draw_hit_window(surface, &layout, frame.tuning);
    draw_staff(surface, &layout);
    draw_clef(surface, &layout);

    for note in frame.notes {
        if !layout.is_visible(note.x) {
            continue;
        }
        draw_note(surface, &layout, note, note.opacity(frame.now, frame.tuning));
    }

    for particle in frame.particles {
        if particle.life <= 0.0 || !layout.is_visible(particle.x) {
            continue;
        }
        let center = Point::new(layout.note_x(particle.x), layout.staff_y(particle.y));
        let color = Rgba::from(particle.color).with_alpha(particle.life);
        surface.fill_circle(center, particle.size * layout.step * 0.6, color);
    }

    draw_hud(surface, &layout, frame.hud);
}

fn draw_hit_window(surface: &mut dyn Surface, layout: &StaffLayout, tuning: &GameTuning) {
    let (lo, hi) = tuning.hit_window;
    let left = layout.note_x(lo);
    let right = layout.note_x(hi);
    let top = layout.staff_y(12.0);
    surface.fill_rect(
        Point::new(left, top),
        right - left,
        layout.staff_y(-12.0) - top,
        IN_TUNE.with_alpha(0.08),
    );
    surface.line(
        Point::new(layout.judgment_x, top),
        Point::new(layout.judgment_x, layout.staff_y(-12.0)),
        2.0,
        IN_TUNE.with_alpha(0.7),
    );
}

fn draw_staff(surface: &mut dyn Surface, layout: &StaffLayout) {
    for position in [-4, -2, 0, 2, 4] {
        let y = layout.staff_y(position as f32);
        surface.line(
            Point::new(layout.step * 2.0, y),
            Point::new(layout.width - layout.step * 2.0, y),
            1.0,
            STAFF_INK,
        );
    }
}

/// Stylized treble clef curling around the G line.
fn draw_clef(surface: &mut dyn Surface, layout: &StaffLayout) {
    let x = layout.step * 5.0;
    let g_line = layout.staff_y(-2.0);
    surface.line(
        Point::new(x + layout.step * 0.6, layout.staff_y(7.0)),
        Point::new(x, layout.staff_y(-6.0)),
        2.0,
        STAFF_INK,
    );
    surface.stroke_arc(
        Point::new(x, g_line),
        layout.step * 1.6,
        (-FRAC_PI_2, PI * 1.3),
        2.0,
        STAFF_INK,
    );
    surface.stroke_arc(
        Point::new(x + layout.step * 0.3, layout.staff_y(3.5)),
        layout.step * 1.3,
        (PI * 0.6, PI * 1.9),
        2.0,
        STAFF_INK,
    );
    surface.fill_circle(
        Point::new(x - layout.step * 0.6, layout.staff_y(-6.0)),
        layout.step * 0.5,
        STAFF_INK,
    );
}

fn draw_note(surface: &mut dyn Surface, layout: &StaffLayout, note: &GameNote, opacity: f32) {
    if opacity <= 0.0 {
        return;
    }
    let cx = layout.note_x(note.x);
    let cy = layout.staff_y(note.staff_position as f32);
    let head_rx = layout.step * 1.3;

    let ink = if note.hit {
        IN_TUNE
    } else if note.missed {
        OFF
    } else {
        NOTE_INK
    };
    let ink = ink.with_alpha(opacity);

    for ledger in theory::get_ledger_lines(note.staff_position) {
        let y = layout.staff_y(ledger as f32);
        surface.line(
            Point::new(cx - head_rx * 1.6, y),
            Point::new(cx + head_rx * 1.6, y),
            1.0,
            STAFF_INK.with_alpha(opacity),
        );
    }

    surface.fill_ellipse(Point::new(cx, cy), (head_rx, layout.step * 0.95), -0.35, ink);

    if let Some(accidental) = note.accidental {
        surface.text(
            accidental.symbol(),
            Point::new(cx - head_rx * 1.8, cy),
            layout.step * 3.0,
            ink,
            TextAlign::Right,
        );
    }
}

fn draw_hud(surface: &mut dyn Surface, layout: &StaffLayout, hud: &Hud) {
    let size = (layout.step * 1.8).max(12.0);
    let margin = size;
    surface.text(
        &format!("Score {}", hud.score),
        Point::new(margin, margin),
        size,
        NOTE_INK,
        TextAlign::Left,
    );
    surface.text(
        &format!("Streak {} (best {})", hud.streak, hud.best_streak),
        Point::new(layout.width / 2.0, margin),
        size,
        NOTE_INK,
        TextAlign::Center,
    );
    surface.text(
        &format!("Level {}", hud.level),
        Point::new(layout.width - margin, margin),
        size,
        NOTE_INK,
        TextAlign::Right,
    );

    let bottom = layout.height - margin;
    let (label, x, color) = match (&hud.detected, hud.paused) {
        (_, true) => ("Paused", layout.width / 2.0, CLOSE),
        (Some(note), false) => (note.as_str(), layout.judgment_x, IN_TUNE),
        (None, false) => ("Listening...", layout.judgment_x, MUTED),
    };
    surface.text(label, Point::new(x, bottom), size, color, TextAlign::Center);
}

/// Everything the tuner dial needs for one frame.
pub struct TunerFrame<'a> {
    pub width: f32,
    pub height: f32,
    pub reading: &'a TunerReading,
    pub reference: TuningReference,
    pub use_flats: bool,
}

/// Dial angle for a cents value; 0 cents points straight up and the ends of
/// the dial range sit 60 degrees either side.
pub fn cents_to_angle(cents: f32) -> f32 {
    let clamped = cents.clamp(-DIAL_RANGE_CENTS, DIAL_RANGE_CENTS);
    -FRAC_PI_2 + clamped / DIAL_RANGE_CENTS * (PI / 3.0)
}

pub fn zone_color(zone: Option<TuningZone>) -> Rgba {
    match zone {
        Some(TuningZone::InTune) => IN_TUNE,
        Some(TuningZone::Close) => CLOSE,
        Some(TuningZone::Off) => OFF,
        None => MUTED,
    }
}

/// Cents bands of the dial face, left to right.
const DIAL_BANDS: [(f32, f32, TuningZone); 5] = [
    (-50.0, -20.0, TuningZone::Off),
    (-20.0, -5.0, TuningZone::Close),
    (-5.0, 5.0, TuningZone::InTune),
    (5.0, 20.0, TuningZone::Close),
    (20.0, 50.0, TuningZone::Off),
];

fn polar(center: Point, radius: f32, angle: f32) -> Point {
    Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
}

/// Paints the tuner dial, needle, note label, note wheel and reference label.
pub fn draw_tuner(surface: &mut dyn Surface, frame: &TunerFrame<'_>) {
    let reading = frame.reading;
    surface.fill_rect(Point::new(0.0, 0.0), frame.width, frame.height, BACKGROUND);

    let radius = (frame.width * 0.38).min(frame.height * 0.42).max(10.0);
    let center = Point::new(frame.width / 2.0, frame.height * 0.58);

    for (from, to, zone) in DIAL_BANDS {
        surface.stroke_arc(
            center,
            radius,
            (cents_to_angle(from), cents_to_angle(to)),
            radius * 0.06,
            zone_color(Some(zone)).with_alpha(0.55),
        );
    }

    for cents in (-50..=50).step_by(10) {
        let angle = cents_to_angle(cents as f32);
        let inner = if cents == 0 { 0.82 } else { 0.88 };
        surface.line(
            polar(center, radius * inner, angle),
            polar(center, radius * 0.95, angle),
            if cents == 0 { 2.5 } else { 1.2 },
            STAFF_INK,
        );
    }

    draw_note_wheel(surface, center, radius, frame);

    // Needle with a soft glow built from wide translucent strokes.
    let color = zone_color(reading.zone);
    let angle = cents_to_angle(reading.smoothed_cents);
    let tip = polar(center, radius * 0.9, angle);
    if reading.is_active() {
        for (width, alpha) in [(14.0, 0.06), (9.0, 0.12), (5.0, 0.25)] {
            surface.line(center, tip, width, color.with_alpha(alpha));
        }
    }
    surface.line(center, tip, 2.5, color);
    surface.fill_circle(center, radius * 0.04, color);

    let label = reading.note_name.as_deref().unwrap_or("--");
    surface.text(
        label,
        Point::new(center.x, center.y + radius * 0.22),
        radius * 0.3,
        if reading.is_active() { color } else { MUTED },
        TextAlign::Center,
    );

    let detail = match (reading.raw_cents, reading.frequency) {
        (Some(cents), Some(hz)) => format!("{cents:+.1} cents  {hz:.1} Hz"),
        _ => "Play a note".to_string(),
    };
    surface.text(
        &detail,
        Point::new(center.x, center.y + radius * 0.45),
        (radius * 0.09).max(11.0),
        MUTED,
        TextAlign::Center,
    );

    surface.text(
        &frame.reference.to_string(),
        Point::new(frame.width / 2.0, frame.height - 16.0),
        14.0,
        STAFF_INK,
        TextAlign::Center,
    );
}

/// Neighboring note names on a ring outside the dial, rotated so the heard
/// note sits at the top and drifts with the needle.
fn draw_note_wheel(surface: &mut dyn Surface, center: Point, radius: f32, frame: &TunerFrame<'_>) {
    let Some(midi) = frame.reading.midi else {
        return;
    };
    let step = PI / 6.0;
    let drift = -frame.reading.smoothed_cents / 100.0 * step;
    let size = (radius * 0.1).max(10.0);
    for offset in -2..=2 {
        let neighbor = midi + offset;
        let Ok(neighbor) = u8::try_from(neighbor) else {
            continue;
        };
        let angle = -FRAC_PI_2 + offset as f32 * step + drift;
        let name = theory::pitch_class_name(neighbor, frame.use_flats);
        let (ink, scale) = if offset == 0 {
            (zone_color(frame.reading.zone), 1.4)
        } else {
            (MUTED, 1.0)
        };
        surface.text(
            name,
            polar(center, radius * 1.14, angle),
            size * scale,
            ink,
            TextAlign::Center,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::TunerStatus;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Rect,
        Line(Point, Point),
        Circle,
        Ellipse(Point),
        Arc,
        Text(String),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl Recorder {
        fn ellipses(&self) -> Vec<Point> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Ellipse(p) => Some(*p),
                    _ => None,
                })
                .collect()
        }

        fn texts(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Text(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect()
        }

        fn horizontal_lines_at(&self, y: f32) -> usize {
            self.ops
                .iter()
                .filter(|op| {
                    matches!(op, Op::Line(a, b) if (a.y - y).abs() < 0.01 && (b.y - y).abs() < 0.01)
                })
                .count()
        }
    }

    impl Surface for Recorder {
        fn fill_rect(&mut self, _: Point, _: f32, _: f32, _: Rgba) {
            self.ops.push(Op::Rect);
        }
        fn line(&mut self, from: Point, to: Point, _: f32, _: Rgba) {
            self.ops.push(Op::Line(from, to));
        }
        fn fill_circle(&mut self, _: Point, _: f32, _: Rgba) {
            self.ops.push(Op::Circle);
        }
        fn fill_ellipse(&mut self, center: Point, _: (f32, f32), _: f32, _: Rgba) {
            self.ops.push(Op::Ellipse(center));
        }
        fn stroke_arc(&mut self, _: Point, _: f32, _: (f32, f32), _: f32, _: Rgba) {
            self.ops.push(Op::Arc);
        }
        fn text(&mut self, content: &str, _: Point, _: f32, _: Rgba, _: TextAlign) {
            self.ops.push(Op::Text(content.to_string()));
        }
    }

    fn note(id: u64, midi: u8, x: f32) -> GameNote {
        GameNote {
            id,
            midi,
            x,
            staff_position: theory::midi_to_staff_position(midi),
            accidental: theory::accidental(midi, false),
            hit: false,
            hit_time: None,
            missed: false,
            missed_at: None,
        }
    }

    fn render(notes: &[GameNote]) -> Recorder {
        let tuning = GameTuning::default();
        let hud = Hud::default();
        let mut recorder = Recorder::default();
        draw_game(
            &mut recorder,
            &GameFrame {
                width: 800.0,
                height: 400.0,
                notes,
                particles: &[],
                now: 0.0,
                tuning: &tuning,
                hud: &hud,
            },
        );
        recorder
    }

    #[test]
    fn layout_places_b4_on_the_middle_line() {
        let layout = StaffLayout::new(800.0, 400.0);
        assert_eq!(layout.staff_y(0.0), 200.0);
        assert!(layout.staff_y(2.0) < layout.staff_y(0.0));
        assert_eq!(layout.note_x(0.0), layout.judgment_x);
        assert_eq!(layout.note_x(1.0), layout.spawn_x);
    }

    #[test]
    fn offscreen_notes_are_skipped() {
        let notes = [note(0, 71, 0.5), note(1, 72, 5.0), note(2, 74, -3.0)];
        let recorder = render(&notes);
        let heads = recorder.ellipses();
        assert_eq!(heads.len(), 1);
        let layout = StaffLayout::new(800.0, 400.0);
        assert!((heads[0].x - layout.note_x(0.5)).abs() < 1e-3);
    }

    #[test]
    fn ledger_lines_are_drawn_outside_the_staff() {
        let layout = StaffLayout::new(800.0, 400.0);
        // Middle C sits on the first ledger line below the staff.
        let c4 = theory::midi_to_staff_position(60);
        assert_eq!(c4, -6);
        let recorder = render(&[note(0, 60, 0.5)]);
        assert_eq!(recorder.horizontal_lines_at(layout.staff_y(-6.0)), 1);

        // B4 needs none: only the staff line itself is drawn there.
        let recorder = render(&[note(0, 71, 0.5)]);
        assert_eq!(recorder.horizontal_lines_at(layout.staff_y(0.0)), 1);

        // High C6 stacks two ledger lines above the staff.
        let recorder = render(&[note(0, 84, 0.5)]);
        assert_eq!(recorder.horizontal_lines_at(layout.staff_y(6.0)), 1);
        assert_eq!(recorder.horizontal_lines_at(layout.staff_y(8.0)), 1);
    }

    #[test]
    fn accidentals_are_labelled() {
        let recorder = render(&[note(0, 66, 0.5)]);
        assert!(recorder.texts().contains(&"♯"));
    }

    #[test]
    fn faded_notes_are_not_drawn() {
        let mut gone = note(0, 71, 0.5);
        gone.hit = true;
        gone.hit_time = Some(-10.0);
        let recorder = render(&[gone]);
        assert!(recorder.ellipses().is_empty());
    }

    #[test]
    fn hud_shows_score_and_listening_state() {
        let recorder = render(&[]);
        let texts = recorder.texts();
        assert!(texts.contains(&"Score 0"));
        assert!(texts.contains(&"Level 0"));
        assert!(texts.contains(&"Listening..."));
    }

    fn waiting_reading() -> TunerReading {
        TunerReading {
            status: TunerStatus::Waiting,
            note_name: None,
            midi: None,
            octave: None,
            raw_cents: None,
            smoothed_cents: 0.0,
            frequency: None,
            zone: None,
        }
    }

    #[test]
    fn dial_angles_are_symmetric() {
        assert!((cents_to_angle(0.0) + FRAC_PI_2).abs() < 1e-6);
        let left = cents_to_angle(-50.0) + FRAC_PI_2;
        let right = cents_to_angle(50.0) + FRAC_PI_2;
        assert!((left + right).abs() < 1e-6);
        assert_eq!(cents_to_angle(400.0), cents_to_angle(50.0));
    }

    #[test]
    fn waiting_tuner_draws_placeholder() {
        let reading = waiting_reading();
        let mut recorder = Recorder::default();
        draw_tuner(
            &mut recorder,
            &TunerFrame {
                width: 400.0,
                height: 400.0,
                reading: &reading,
                reference: TuningReference::default(),
                use_flats: false,
            },
        );
        let texts = recorder.texts();
        assert!(texts.contains(&"--"));
        assert!(texts.contains(&"A4 = 440 Hz"));
        assert_eq!(recorder.ops.iter().filter(|op| **op == Op::Arc).count(), DIAL_BANDS.len());
    }

    #[test]
    fn active_tuner_draws_note_and_wheel() {
        let reading = TunerReading {
            status: TunerStatus::Active,
            note_name: Some("A4".to_string()),
            midi: Some(69),
            octave: Some(4),
            raw_cents: Some(7.85),
            smoothed_cents: 6.0,
            frequency: Some(442.0),
            zone: Some(TuningZone::Close),
        };
        let mut recorder = Recorder::default();
        draw_tuner(
            &mut recorder,
            &TunerFrame {
                width: 400.0,
                height: 400.0,
                reading: &reading,
                reference: TuningReference::default(),
                use_flats: true,
            },
        );
        let texts = recorder.texts();
        assert!(texts.contains(&"A4"));
        for name in ["G", "Ab", "A", "Bb", "B"] {
            assert!(texts.contains(&name), "missing {name}");
        }
        assert!(texts.contains(&"+7.8 cents  442.0 Hz") || texts.contains(&"+7.9 cents  442.0 Hz"));
    }
}
