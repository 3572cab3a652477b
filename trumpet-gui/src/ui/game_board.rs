//! # Game Board Widget
//!
//! Canvas widget drawing one frame of the note-reading game. Borrows the
//! scheduler's notes and particles for the duration of the view.

use super::surface::FrameSurface;
use iced::widget::canvas::{self, Geometry};
use iced::{Element, Length, Rectangle, Renderer, Theme, mouse};
use trumpet_core::game::Scheduler;
use trumpet_core::render::{self, GameFrame, Hud};

pub struct GameBoard<'a> {
    scheduler: &'a Scheduler,
    now: f64,
    hud: Hud,
}

impl<'a> GameBoard<'a> {
    pub fn new(scheduler: &'a Scheduler, now: f64, hud: Hud) -> Self {
        Self { scheduler, now, hud }
    }

    pub fn view(self) -> Element<'a, crate::Message> {
        canvas::Canvas::new(self)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }
}

impl<Message> canvas::Program<Message> for GameBoard<'_> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        if bounds.width.is_finite() && bounds.height.is_finite() {
            render::draw_game(
                &mut FrameSurface::new(&mut frame),
                &GameFrame {
                    width: bounds.width,
                    height: bounds.height,
                    notes: self.scheduler.notes(),
                    particles: self.scheduler.particles(),
                    now: self.now,
                    tuning: self.scheduler.tuning(),
                    hud: &self.hud,
                },
            );
        }
        vec![frame.into_geometry()]
    }
}
