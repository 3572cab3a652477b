//! # UI Module
//!
//! This module contains all UI components of the Trumpet Trainer application.

pub mod game_board;
pub mod main_display;
pub mod settings_panel;
pub mod surface;
pub mod tuner_dial;
