//! Drawing primitives that operate on [`Frame`]s.
//!
//! Every function in this module returns a guard object that performs the actual drawing
//! operation when dropped. The guards have builder methods that can customize the operation
//! before it is performed.

use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{iso_8859_1::FONT_10X20, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::image::{Color, Frame};

struct Target<'a>(&'a mut Frame);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(
            Point::zero(),
            Size::new(self.0.width(), self.0.height()),
        )
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = (self.0.width() as i32, self.0.height() as i32);
        for Pixel(coord, color) in pixels {
            // Out-of-bounds pixels are silently skipped, so that shapes can extend past the
            // frame borders.
            if (0..width).contains(&coord.x) && (0..height).contains(&coord.y) {
                self.0.set(coord.x as u32, coord.y as u32, color);
            }
        }
        Ok(())
    }
}

/// Guard returned by [`line`]; draws the line when dropped.
#[must_use]
pub struct DrawLine<'a> {
    frame: &'a mut Frame,
    start: Point,
    end: Point,
    color: Color,
    width: u32,
}

impl DrawLine<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        Line::new(self.start, self.end)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.width))
            .draw(&mut Target(self.frame))
            .ok();
    }
}

/// Guard returned by [`circle`]; draws the circle when dropped.
#[must_use]
pub struct DrawCircle<'a> {
    frame: &'a mut Frame,
    center: Point,
    diameter: u32,
    color: Color,
    filled: bool,
}

impl DrawCircle<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Fills the circle instead of only drawing its outline.
    pub fn fill(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl Drop for DrawCircle<'_> {
    fn drop(&mut self) {
        let style = if self.filled {
            PrimitiveStyle::with_fill(self.color)
        } else {
            PrimitiveStyle::with_stroke(self.color, 1)
        };
        Circle::with_center(self.center, self.diameter)
            .into_styled(style)
            .draw(&mut Target(self.frame))
            .ok();
    }
}

/// Guard returned by [`marker`]; draws the marker when dropped.
#[must_use]
pub struct DrawMarker<'a> {
    frame: &'a mut Frame,
    pos: Point,
    color: Color,
    size: u32,
}

impl DrawMarker<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the width and height of the marker (must be an uneven number).
    pub fn size(&mut self, size: u32) -> &mut Self {
        assert!(size % 2 == 1, "marker size must be uneven (is {size})");
        self.size = size;
        self
    }
}

impl Drop for DrawMarker<'_> {
    fn drop(&mut self) {
        let offset = (self.size / 2) as i32;
        let style = PrimitiveStyle::with_stroke(self.color, 1);
        Line::new(
            Point::new(self.pos.x - offset, self.pos.y),
            Point::new(self.pos.x + offset, self.pos.y),
        )
        .into_styled(style)
        .draw(&mut Target(self.frame))
        .ok();
        Line::new(
            Point::new(self.pos.x, self.pos.y - offset),
            Point::new(self.pos.x, self.pos.y + offset),
        )
        .into_styled(style)
        .draw(&mut Target(self.frame))
        .ok();
    }
}

/// Guard returned by [`text`]; draws the text when dropped.
#[must_use]
pub struct DrawText<'a> {
    frame: &'a mut Frame,
    pos: Point,
    text: &'a str,
    color: Color,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Aligns the left edge of the text with the anchor point.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }

    /// Aligns the top edge of the text with the anchor point.
    pub fn align_top(&mut self) -> &mut Self {
        self.baseline = Baseline::Top;
        self
    }

    /// Aligns the bottom edge of the text with the anchor point.
    pub fn align_bottom(&mut self) -> &mut Self {
        self.baseline = Baseline::Bottom;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        Text::with_text_style(
            self.text,
            self.pos,
            MonoTextStyle::new(&FONT_10X20, self.color),
            style,
        )
        .draw(&mut Target(self.frame))
        .ok();
    }
}

/// Draws a line onto a frame.
pub fn line(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32) -> DrawLine<'_> {
    DrawLine {
        frame,
        start: Point::new(x0, y0),
        end: Point::new(x1, y1),
        color: Color::GREEN,
        width: 1,
    }
}

/// Draws a circle with the given center and diameter onto a frame.
pub fn circle(frame: &mut Frame, x: i32, y: i32, diameter: u32) -> DrawCircle<'_> {
    DrawCircle {
        frame,
        center: Point::new(x, y),
        diameter,
        color: Color::GREEN,
        filled: false,
    }
}

/// Draws a crosshair marker at the given position.
pub fn marker(frame: &mut Frame, x: i32, y: i32) -> DrawMarker<'_> {
    DrawMarker {
        frame,
        pos: Point::new(x, y),
        color: Color::RED,
        size: 5,
    }
}

/// Draws a text string onto a frame.
///
/// By default the text is centered on the anchor point.
pub fn text<'a>(frame: &'a mut Frame, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        frame,
        pos: Point::new(x, y),
        text,
        color: Color::RED,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}
