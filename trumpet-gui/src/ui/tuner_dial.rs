//! # Tuner Dial Widget
//!
//! Canvas widget showing the smoothed cent deviation on a dial with
//! color-coded zones, a glowing needle and a rotating note wheel.

use super::surface::FrameSurface;
use iced::widget::canvas::{self, Geometry};
use iced::{Element, Length, Rectangle, Renderer, Theme, mouse};
use trumpet_core::render::{self, TunerFrame};
use trumpet_core::tuner::TunerReading;
use trumpet_core::tuning::TuningReference;

pub struct TunerDial {
    reading: TunerReading,
    reference: TuningReference,
    use_flats: bool,
}

impl TunerDial {
    pub fn new(reading: TunerReading, reference: TuningReference, use_flats: bool) -> Self {
        Self {
            reading,
            reference,
            use_flats,
        }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        canvas::Canvas::new(self)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }
}

impl<Message> canvas::Program<Message> for TunerDial {
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
            render::draw_tuner(
                &mut FrameSurface::new(&mut frame),
                &TunerFrame {
                    width: bounds.width,
                    height: bounds.height,
                    reading: &self.reading,
                    reference: self.reference,
                    use_flats: self.use_flats,
                },
            );
        }
        vec![frame.into_geometry()]
    }
}
