//! # Main Display Module
//!
//! Layouts of the home, tuner and game screens.

use super::game_board::GameBoard;
use super::settings_panel::{self, NoteChoice};
use super::tuner_dial::TunerDial;
use crate::Message;
use iced::widget::{Space, button, column, container, horizontal_space, pick_list, row, text};
use iced::{Alignment, Color, Element, Length};
use trumpet_core::render::Hud;
use trumpet_core::session::{GameLoop, LoopState, SessionSummary};
use trumpet_core::settings::GameSettings;
use trumpet_core::tuner::{TunerReading, TunerState, TuningMode};

/// Target notes offered in manual tuner mode (E3 to D6, the trumpet's usual range).
const TUNER_TARGETS: std::ops::RangeInclusive<u8> = 52..=86;

const ERROR_COLOR: Color = Color::from_rgb(1.0, 0.4, 0.4);

/// Persistent inline message shown while the microphone is unavailable.
fn capture_banner(error: &str) -> Element<'_, Message> {
    container(
        row![
            text(format!("Microphone unavailable: {error}")).color(ERROR_COLOR),
            horizontal_space(),
            button("Retry").on_press(Message::RetryCapture),
        ]
        .spacing(10)
        .align_y(Alignment::Center),
    )
    .padding(10)
    .width(Length::Fill)
    .into()
}

fn header<'a>(title: &'a str) -> Element<'a, Message> {
    row![
        button("Back").on_press(Message::GoHome),
        Space::with_width(20),
        text(title).size(28),
    ]
    .align_y(Alignment::Center)
    .into()
}

fn summary_text(summary: &SessionSummary) -> String {
    let board = summary.scoreboard;
    format!(
        "Last game: {} points, {} hits, {} misses, best streak {}, level {} ({:.0}s)",
        board.score, board.hits, board.misses, board.best_streak, board.level, summary.duration_secs
    )
}

/// Creates the home screen: navigation, best score and settings.
pub fn home_view<'a>(
    settings: &'a GameSettings,
    best_score: Option<u32>,
    last: Option<&SessionSummary>,
) -> Element<'a, Message> {
    let best = match best_score {
        Some(score) => format!("Best score: {score}"),
        None => "No games played yet".to_string(),
    };
    let mut content = column![
        text("Trumpet Trainer").size(32),
        row![
            button(text("Tuner").size(20)).on_press(Message::OpenTuner).padding(12),
            button(text("Note Game").size(20)).on_press(Message::OpenGame).padding(12),
        ]
        .spacing(20),
        text(best),
    ]
    .spacing(20);

    if let Some(summary) = last {
        content = content.push(text(summary_text(summary)));
    }
    content = content.push(settings_panel::view(settings));

    container(content)
        .padding(20)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Creates the tuner screen: dial, reference controls and target selection.
pub fn tuner_view<'a>(
    reading: &TunerReading,
    tuner: &TunerState,
    use_flats: bool,
    capture_error: Option<&'a str>,
) -> Element<'a, Message> {
    let reference = tuner.reference();
    let reference_controls = row![
        button("-").on_press(Message::ReferenceNudge(-1)),
        text(reference.to_string()).size(18),
        button("+").on_press(Message::ReferenceNudge(1)),
        button("Reset").on_press(Message::ReferenceReset),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let targets: Vec<NoteChoice> = TUNER_TARGETS.map(NoteChoice).collect();
    let (selected, mode_label) = match tuner.mode() {
        TuningMode::Auto => (None, "Auto".to_string()),
        TuningMode::Manual { midi } => (Some(NoteChoice(midi)), "Manual".to_string()),
    };
    let mode_controls = row![
        text(mode_label),
        pick_list(targets, selected, Message::TunerTarget).placeholder("Target note"),
        button("Auto").on_press(Message::TunerAuto),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let mut content = column![header("Tuner")].spacing(15);
    if let Some(error) = capture_error {
        content = content.push(capture_banner(error));
    }
    content = content
        .push(
            container(TunerDial::new(reading.clone(), reference, use_flats).view())
                .width(Length::Fill)
                .height(Length::Fill),
        )
        .push(row![reference_controls, horizontal_space(), mode_controls]);

    container(content)
        .padding(20)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Creates the game screen: playfield and session controls.
pub fn game_view<'a>(
    game: &'a GameLoop,
    hud: &Hud,
    last: Option<&SessionSummary>,
    capture_error: Option<&'a str>,
) -> Element<'a, Message> {
    let controls = match game.state() {
        LoopState::Idle => row![button("Play again").on_press(Message::StartGame)],
        LoopState::Running => row![
            button("Pause").on_press(Message::TogglePause),
            button("Stop").on_press(Message::StopGame),
        ],
        LoopState::Paused if game.is_waiting_for_input() => row![
            text("Waiting for the microphone..."),
            button("Stop").on_press(Message::StopGame),
        ],
        LoopState::Paused => row![
            button("Resume")
                .on_press_maybe(game.input_available().then_some(Message::TogglePause)),
            button("Stop").on_press(Message::StopGame),
        ],
    }
    .spacing(10);

    let mut content = column![header("Note Game")].spacing(15);
    if let Some(error) = capture_error {
        content = content.push(capture_banner(error));
    }
    if let (LoopState::Idle, Some(summary)) = (game.state(), last) {
        content = content.push(text(summary_text(summary)).size(18));
    }
    content = content
        .push(
            container(GameBoard::new(game.scheduler(), game.game_time(), hud.clone()).view())
                .width(Length::Fill)
                .height(Length::Fill),
        )
        .push(controls);

    container(content)
        .padding(20)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}
