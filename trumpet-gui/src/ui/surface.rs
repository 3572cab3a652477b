//! # Canvas Surface
//!
//! Adapts an Iced canvas [`Frame`] to the core renderer's drawing surface,
//! so the tuner dial and the game playfield are drawn by `trumpet_core::render`.

use iced::alignment;
use iced::widget::canvas::path::{Arc, Builder, arc::Elliptical};
use iced::widget::canvas::{Frame, Path, Stroke, Text};
use iced::widget::text::Shaping;
use iced::{Color, Point, Radians, Size, Vector};
use trumpet_core::render::{self, Rgba, Surface, TextAlign};

fn color(c: Rgba) -> Color {
    Color::from_rgba(c.r, c.g, c.b, c.a)
}

fn point(p: render::Point) -> Point {
    Point::new(p.x, p.y)
}

fn stroke(width: f32, c: Rgba) -> Stroke<'static> {
    Stroke::default().with_width(width).with_color(color(c))
}

/// Borrowed canvas frame implementing [`Surface`].
pub struct FrameSurface<'a> {
    frame: &'a mut Frame,
}

impl<'a> FrameSurface<'a> {
    pub fn new(frame: &'a mut Frame) -> Self {
        Self { frame }
    }
}

impl Surface for FrameSurface<'_> {
    fn fill_rect(&mut self, top_left: render::Point, width: f32, height: f32, c: Rgba) {
        self.frame
            .fill_rectangle(point(top_left), Size::new(width, height), color(c));
    }

    fn line(&mut self, from: render::Point, to: render::Point, width: f32, c: Rgba) {
        let path = Path::line(point(from), point(to));
        self.frame.stroke(&path, stroke(width, c));
    }

    fn fill_circle(&mut self, center: render::Point, radius: f32, c: Rgba) {
        self.frame.fill(&Path::circle(point(center), radius), color(c));
    }

    fn fill_ellipse(&mut self, center: render::Point, radii: (f32, f32), rotation: f32, c: Rgba) {
        let path = Path::new(|b: &mut Builder| {
            b.ellipse(Elliptical {
                center: point(center),
                radii: Vector::new(radii.0, radii.1),
                rotation: Radians(rotation),
                start_angle: Radians(0.0),
                end_angle: Radians(std::f32::consts::TAU),
            });
        });
        self.frame.fill(&path, color(c));
    }

    fn stroke_arc(
        &mut self,
        center: render::Point,
        radius: f32,
        angles: (f32, f32),
        width: f32,
        c: Rgba,
    ) {
        let path = Path::new(|b: &mut Builder| {
            b.arc(Arc {
                center: point(center),
                radius,
                start_angle: Radians(angles.0),
                end_angle: Radians(angles.1),
            });
        });
        self.frame.stroke(&path, stroke(width, c));
    }

    fn text(&mut self, content: &str, position: render::Point, size: f32, c: Rgba, align: TextAlign) {
        let horizontal_alignment = match align {
            TextAlign::Left => alignment::Horizontal::Left,
            TextAlign::Center => alignment::Horizontal::Center,
            TextAlign::Right => alignment::Horizontal::Right,
        };
        self.frame.fill_text(Text {
            content: content.to_string(),
            position: point(position),
            color: color(c),
            size: size.into(),
            horizontal_alignment,
            vertical_alignment: alignment::Vertical::Center,
            // Accidental glyphs need font fallback.
            shaping: Shaping::Advanced,
            ..Text::default()
        });
    }
}
