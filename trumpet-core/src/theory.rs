//! # Music Theory Module
//!
//! Pure, stateless helpers shared by the tuner and the note-reading game.
//! Everything here is total: bad input degrades to a documented default
//! instead of failing.
//!
//! ## Features
//! - Note name <-> MIDI number conversion (sharp or flat spelling)
//! - Treble staff positions relative to B4 (the middle line)
//! - Ledger line calculation for notes outside the five-line staff
//! - Key and scale tables with range enumeration
//! - Weighted note choice biased toward tonic, third and fifth

use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// MIDI number returned by [`note_name_to_midi`] when the input cannot be parsed.
pub const FALLBACK_MIDI: u8 = 60;

/// Highest valid MIDI note number.
pub const MAX_MIDI: u8 = 127;

pub const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
pub const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Diatonic step (C = 0 .. B = 6) for each chromatic pitch class when spelled with sharps.
const DIATONIC_SHARP: [i32; 12] = [0, 0, 1, 1, 2, 3, 3, 4, 4, 5, 5, 6];
/// Same table for flat spelling: a flat shares the slot of the natural above it.
const DIATONIC_FLAT: [i32; 12] = [0, 1, 1, 2, 2, 3, 4, 4, 5, 5, 6, 6];

/// Absolute diatonic index of B4, the middle staff line.
const STAFF_REFERENCE: i32 = 4 * 7 + 6;

/// Outermost staff line positions (E4 and F5 sit at -4 and +4).
const STAFF_TOP_LINE: i32 = 4;
const STAFF_BOTTOM_LINE: i32 = -4;

/// Sharp and flat labels for every MIDI note, indexed by MIDI number.
static NOTE_LABELS: Lazy<Vec<[String; 2]>> = Lazy::new(|| {
    (0..=MAX_MIDI)
        .map(|midi| {
            let octave = octave_of(midi as i32);
            let class = (midi % 12) as usize;
            [
                format!("{}{}", NOTE_NAMES_SHARP[class], octave),
                format!("{}{}", NOTE_NAMES_FLAT[class], octave),
            ]
        })
        .collect()
});

/// Semitone offset of a natural letter.
fn letter_semitone(letter: char) -> Option<i32> {
    match letter {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Parses a note name such as `"C4"`, `"F#3"`, `"Bb5"` or `"C-1"`.
///
/// The letter is case-insensitive, the accidental is `#` or `b`, and the octave
/// follows scientific pitch notation (C4 = 60). Returns `None` when the name is
/// malformed or falls outside the MIDI range.
pub fn parse_note_name(name: &str) -> Option<u8> {
    let name = name.trim();
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base = letter_semitone(letter)?;

    let rest = chars.as_str();
    let (accidental, octave_str) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest),
    };

    let digits = octave_str.strip_prefix('-').unwrap_or(octave_str);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let octave: i32 = octave_str.parse().ok()?;

    let midi = (octave + 1) * 12 + base + accidental;
    if (0..=MAX_MIDI as i32).contains(&midi) {
        Some(midi as u8)
    } else {
        None
    }
}

/// Converts a note name to its MIDI number.
///
/// Unparseable names fall back to [`FALLBACK_MIDI`] (middle C) rather than
/// failing. Use [`parse_note_name`] when the caller needs to know.
pub fn note_name_to_midi(name: &str) -> u8 {
    parse_note_name(name).unwrap_or(FALLBACK_MIDI)
}

/// Formats a MIDI number as a note name, e.g. `69 -> "A4"`.
pub fn midi_to_note_name(midi: u8, use_flats: bool) -> String {
    match NOTE_LABELS.get(midi as usize) {
        Some(labels) => labels[use_flats as usize].clone(),
        None => format!("{}{}", pitch_class_name(midi, use_flats), octave_of(midi as i32)),
    }
}

/// The pitch-class part of a note name, without octave.
pub fn pitch_class_name(midi: u8, use_flats: bool) -> &'static str {
    let names = if use_flats { &NOTE_NAMES_FLAT } else { &NOTE_NAMES_SHARP };
    names[(midi % 12) as usize]
}

/// Scientific-pitch octave of a MIDI number (60 -> 4).
pub fn octave_of(midi: i32) -> i32 {
    midi.div_euclid(12) - 1
}

/// Returns true for the white keys.
pub fn is_natural(midi: u8) -> bool {
    DIATONIC_SHARP[(midi % 12) as usize] == DIATONIC_FLAT[(midi % 12) as usize]
}

/// Accidental glyph drawn next to a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accidental {
    Sharp,
    Flat,
}

impl Accidental {
    pub fn symbol(self) -> &'static str {
        match self {
            Accidental::Sharp => "♯",
            Accidental::Flat => "♭",
        }
    }
}

/// The accidental needed to spell `midi`, if any.
pub fn accidental(midi: u8, use_flats: bool) -> Option<Accidental> {
    if is_natural(midi) {
        None
    } else if use_flats {
        Some(Accidental::Flat)
    } else {
        Some(Accidental::Sharp)
    }
}

/// Treble staff position of a MIDI note, spelled with sharps.
///
/// B4 (MIDI 71) is position 0, each diatonic step adds one. Lines sit on even
/// positions, spaces on odd ones.
pub fn midi_to_staff_position(midi: u8) -> i32 {
    staff_position(midi, false)
}

/// Treble staff position with an explicit spelling preference.
pub fn staff_position(midi: u8, use_flats: bool) -> i32 {
    let table = if use_flats { &DIATONIC_FLAT } else { &DIATONIC_SHARP };
    let octave = octave_of(midi as i32);
    octave * 7 + table[(midi % 12) as usize] - STAFF_REFERENCE
}

/// Ledger lines required for a note at `staff_pos`.
///
/// Returns the line positions between the staff and the note, including the
/// note's own line when it sits on one. Empty for anything inside the staff.
pub fn get_ledger_lines(staff_pos: i32) -> Vec<i32> {
    if staff_pos >= STAFF_TOP_LINE + 2 {
        (STAFF_TOP_LINE + 2..=staff_pos).step_by(2).collect()
    } else if staff_pos <= STAFF_BOTTOM_LINE - 2 {
        let count = ((STAFF_BOTTOM_LINE - 2 - staff_pos) / 2 + 1) as usize;
        (0..count)
            .map(|i| STAFF_BOTTOM_LINE - 2 - 2 * i as i32)
            .collect()
    } else {
        Vec::new()
    }
}

/// Key signature root.
///
/// Deserializes through [`Key::parse`], so an unknown stored name reads as C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Key {
    #[default]
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::Db,
        Key::D,
        Key::Eb,
        Key::E,
        Key::F,
        Key::Gb,
        Key::G,
        Key::Ab,
        Key::A,
        Key::Bb,
        Key::B,
    ];

    /// Pitch class of the root (C = 0).
    pub fn root(self) -> u8 {
        self as u8
    }

    /// Parses a key name. Sharp aliases are accepted; unknown names give C.
    pub fn parse(name: &str) -> Key {
        let name = name.trim();
        let normalized = match name {
            "C#" => "Db",
            "D#" => "Eb",
            "F#" => "Gb",
            "G#" => "Ab",
            "A#" => "Bb",
            other => other,
        };
        Key::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(normalized))
            .unwrap_or(Key::C)
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES_FLAT[self.root() as usize]
    }

    /// Whether notes in this key read more naturally with flats.
    pub fn prefers_flats(self) -> bool {
        matches!(self, Key::F | Key::Bb | Key::Eb | Key::Ab | Key::Db | Key::Gb)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::parse(&name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale families available for exercises.
///
/// Deserializes through [`ScaleType::parse`]; unknown names read as chromatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ScaleType {
    #[default]
    Major,
    NaturalMinor,
    HarmonicMinor,
    MelodicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
    Chromatic,
}

impl ScaleType {
    pub const ALL: [ScaleType; 8] = [
        ScaleType::Major,
        ScaleType::NaturalMinor,
        ScaleType::HarmonicMinor,
        ScaleType::MelodicMinor,
        ScaleType::MajorPentatonic,
        ScaleType::MinorPentatonic,
        ScaleType::Blues,
        ScaleType::Chromatic,
    ];

    /// Semitone intervals above the root.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ScaleType::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleType::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleType::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleType::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            ScaleType::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleType::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleType::Blues => &[0, 3, 5, 6, 7, 10],
            ScaleType::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    /// Parses names like `"major"`, `"harmonic_minor"` or `"minor-pentatonic"`.
    /// Unknown names give [`ScaleType::Chromatic`].
    pub fn parse(name: &str) -> ScaleType {
        let key: String = name
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "major" => ScaleType::Major,
            "minor" | "naturalminor" => ScaleType::NaturalMinor,
            "harmonicminor" => ScaleType::HarmonicMinor,
            "melodicminor" => ScaleType::MelodicMinor,
            "majorpentatonic" | "pentatonic" => ScaleType::MajorPentatonic,
            "minorpentatonic" => ScaleType::MinorPentatonic,
            "blues" => ScaleType::Blues,
            _ => ScaleType::Chromatic,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScaleType::Major => "Major",
            ScaleType::NaturalMinor => "Natural minor",
            ScaleType::HarmonicMinor => "Harmonic minor",
            ScaleType::MelodicMinor => "Melodic minor",
            ScaleType::MajorPentatonic => "Major pentatonic",
            ScaleType::MinorPentatonic => "Minor pentatonic",
            ScaleType::Blues => "Blues",
            ScaleType::Chromatic => "Chromatic",
        }
    }
}

impl From<String> for ScaleType {
    fn from(name: String) -> Self {
        ScaleType::parse(&name)
    }
}

impl fmt::Display for ScaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Enumerates every MIDI number in `[min_midi, max_midi]` that belongs to the scale.
///
/// An inverted range yields an empty list.
pub fn get_scale_notes(key: Key, scale_type: ScaleType, min_midi: u8, max_midi: u8) -> Vec<u8> {
    let intervals = scale_type.intervals();
    let root = key.root();
    (min_midi..=max_midi)
        .filter(|&midi| {
            let degree = (midi + 12 - root) % 12;
            intervals.contains(&degree)
        })
        .collect()
}

/// Picks one note, giving tonic, third and fifth twice the weight of the rest.
///
/// Both the minor and the major third count, so the bias works for every
/// scale family. Returns `None` for an empty candidate list.
pub fn get_weighted_note<R: Rng + ?Sized>(rng: &mut R, scale_notes: &[u8], key: Key) -> Option<u8> {
    if scale_notes.is_empty() {
        return None;
    }
    let weights = scale_notes.iter().map(|&midi| degree_weight(midi, key));
    let dist = WeightedIndex::new(weights).ok()?;
    Some(scale_notes[dist.sample(rng)])
}

fn degree_weight(midi: u8, key: Key) -> u32 {
    match (midi + 12 - key.root()) % 12 {
        0 | 3 | 4 | 7 => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    #[test]
    fn note_names_use_the_requested_spelling() {
        assert_eq!(midi_to_note_name(61, false), "C#4");
        assert_eq!(midi_to_note_name(61, true), "Db4");
        assert_eq!(midi_to_note_name(0, false), "C-1");
        assert_eq!(midi_to_note_name(127, true), "G9");
        assert_eq!(midi_to_note_name(128, false), "G#9");
    }

    #[test]
    fn note_names_round_trip_for_every_midi_number() {
        for midi in 0..=MAX_MIDI {
            assert_eq!(note_name_to_midi(&midi_to_note_name(midi, false)), midi);
            assert_eq!(note_name_to_midi(&midi_to_note_name(midi, true)), midi);
        }
    }

    #[test]
    fn parses_common_names() {
        assert_eq!(parse_note_name("C4"), Some(60));
        assert_eq!(parse_note_name("A4"), Some(69));
        assert_eq!(parse_note_name("f#3"), Some(54));
        assert_eq!(parse_note_name("Bb3"), Some(58));
        assert_eq!(parse_note_name("C-1"), Some(0));
        assert_eq!(parse_note_name("G9"), Some(127));
    }

    #[test]
    fn unparseable_names_fall_back_to_middle_c() {
        for bad in ["", "H4", "C", "C#", "Cx4", "C4.5", "G#9", "C-2", "4C"] {
            assert_eq!(parse_note_name(bad), None, "{bad:?}");
            assert_eq!(note_name_to_midi(bad), FALLBACK_MIDI);
        }
    }

    #[test]
    fn staff_positions_are_relative_to_b4() {
        assert_eq!(midi_to_staff_position(71), 0);
        assert_eq!(midi_to_staff_position(83) - midi_to_staff_position(71), 7);
        assert_eq!(midi_to_staff_position(64), -4); // E4, bottom line
        assert_eq!(midi_to_staff_position(77), 4); // F5, top line
        assert_eq!(midi_to_staff_position(60), -6); // C4, first ledger line
        // F#4 shares the F slot; Gb4 shares the G slot.
        assert_eq!(staff_position(66, false), staff_position(65, false));
        assert_eq!(staff_position(66, true), staff_position(67, true));
    }

    #[test]
    fn no_ledger_lines_inside_the_staff() {
        for pos in -5..=5 {
            assert!(get_ledger_lines(pos).is_empty(), "position {pos}");
        }
    }

    #[test]
    fn ledger_lines_outside_the_staff() {
        assert_eq!(get_ledger_lines(6), vec![6]);
        assert_eq!(get_ledger_lines(7), vec![6]);
        assert_eq!(get_ledger_lines(8), vec![6, 8]);
        assert_eq!(get_ledger_lines(-6), vec![-6]);
        assert_eq!(get_ledger_lines(-7), vec![-6]);
        assert_eq!(get_ledger_lines(-10), vec![-6, -8, -10]);
    }

    #[test]
    fn c_major_over_one_octave() {
        assert_eq!(
            get_scale_notes(Key::C, ScaleType::Major, 60, 72),
            vec![60, 62, 64, 65, 67, 69, 71, 72]
        );
    }

    #[test]
    fn scale_notes_follow_the_key_root() {
        assert_eq!(
            get_scale_notes(Key::Bb, ScaleType::MajorPentatonic, 58, 70),
            vec![58, 60, 62, 65, 67, 70]
        );
        assert!(get_scale_notes(Key::C, ScaleType::Major, 72, 60).is_empty());
    }

    #[test]
    fn unknown_names_degrade_to_defaults() {
        assert_eq!(Key::parse("H"), Key::C);
        assert_eq!(Key::parse("F#"), Key::Gb);
        assert_eq!(Key::parse("bb"), Key::Bb);
        assert_eq!(ScaleType::parse("lydian"), ScaleType::Chromatic);
        assert_eq!(ScaleType::parse("harmonic_minor"), ScaleType::HarmonicMinor);
        assert_eq!(ScaleType::parse("Minor Pentatonic"), ScaleType::MinorPentatonic);
    }

    #[test]
    fn weighted_choice_favours_the_tonic_triad() {
        let notes = get_scale_notes(Key::C, ScaleType::Major, 60, 71);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: BTreeMap<u8, u32> = BTreeMap::new();
        for _ in 0..10_000 {
            let midi = get_weighted_note(&mut rng, &notes, Key::C).expect("non-empty");
            *counts.entry(midi).or_default() += 1;
        }

        let triad_min = [60, 64, 67].iter().map(|m| counts[m]).min().unwrap();
        let others_max = [62, 65, 69, 71].iter().map(|m| counts[m]).max().unwrap();
        assert!(
            triad_min as f32 > 1.5 * others_max as f32,
            "triad {triad_min} vs others {others_max}"
        );
    }

    #[test]
    fn weighted_choice_on_empty_input() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(get_weighted_note(&mut rng, &[], Key::C), None);
    }

    #[test]
    fn accidentals_follow_spelling() {
        assert!(is_natural(60));
        assert!(!is_natural(61));
        assert_eq!(accidental(61, false), Some(Accidental::Sharp));
        assert_eq!(accidental(61, true), Some(Accidental::Flat));
        assert_eq!(accidental(62, true), None);
    }
}
