//! Image buffers and pixel types.
//!
//! [`Frame`] is the owned RGBA raster that the pipeline stages pass around.
//! [`Resolution`] and [`Color`] are the small value types that go with it;
//! [`Color`] doubles as the pixel type for the drawing functions in
//! [`crate::draw`].

use std::{fmt, path::Path};

use anyhow::{bail, Context};
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

#[derive(Debug, Clone, Copy)]
enum FrameFormat {
    Jpeg,
    Png,
}

impl FrameFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => bail!("unsupported image extension in '{}'", path.display()),
        }
    }
}

/// A frame of the input stream, stored as an owned RGBA image with 8 bits per
/// channel.
#[derive(Clone)]
pub struct Frame {
    // RGBA8 so that the buffer can be uploaded to a wgpu texture without conversion.
    pub(crate) buf: RgbaImage,
}

impl Frame {
    /// Creates an empty frame of the given size.
    ///
    /// The frame starts out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates a frame from raw RGBA data in row-major order.
    ///
    /// # Panics
    ///
    /// `data` must contain exactly `width * height * 4` bytes.
    pub fn from_rgba8(res: Resolution, data: &[u8]) -> Self {
        assert_eq!(data.len() as u64, res.num_pixels() * 4);
        Self {
            buf: ImageBuffer::from_raw(res.width(), res.height(), data.to_vec())
                .expect("buffer length was checked above"),
        }
    }

    /// Loads a frame from a `jpg`/`jpeg` or `png` file.
    ///
    /// The format is picked from the file extension.
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = match FrameFormat::from_path(path)? {
            FrameFormat::Jpeg => image::ImageFormat::Jpeg,
            FrameFormat::Png => image::ImageFormat::Png,
        };
        let data =
            std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        let buf = image::load_from_memory_with_format(&data, format)
            .with_context(|| format!("failed to decode '{}'", path.display()))?
            .to_rgba8();
        Ok(Self { buf })
    }

    /// Decodes a JPEG image, including the frames of a webcam MJPG stream.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Saves the frame to a `jpg`/`jpeg` or `png` file, picked from the file
    /// extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        FrameFormat::from_path(path.as_ref())?;
        Ok(self.buf.save(path)?)
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Width and height as a [`Resolution`].
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Reads the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics when `(x, y)` lies outside the frame.
    #[cfg(test)]
    pub(crate) fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Overwrites the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics when `(x, y)` lies outside the frame.
    #[inline]
    pub(crate) fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Fills the whole frame with `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Frame", self.width(), self.height())
    }
}

/// An integer width and height, shared by frames, windows and camera modes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a resolution from a width and height in pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An RGBA color with 8 bits per channel.
///
/// Values are non-premultiplied sRGB, matching the [`Frame`] pixel layout.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    pub const BLACK: Self = Self::from_rgb8(0, 0, 0);
    pub const WHITE: Self = Self::from_rgb8(255, 255, 255);
    pub const RED: Self = Self::from_rgb8(255, 0, 0);
    pub const GREEN: Self = Self::from_rgb8(0, 255, 0);
    pub const BLUE: Self = Self::from_rgb8(0, 0, 255);
    pub const YELLOW: Self = Self::from_rgb8(255, 255, 0);
    pub const CYAN: Self = Self::from_rgb8(0, 255, 255);

    /// Creates a fully opaque color from red, green and blue components.
    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_frame_is_blank() {
        let frame = Frame::new(4, 2);
        assert_eq!(frame.resolution(), Resolution::new(4, 2));
        assert_eq!(frame.get(3, 1), Color([0, 0, 0, 0]));
    }

    #[test]
    fn set_get_roundtrip() {
        let mut frame = Frame::new(2, 2);
        frame.set(1, 0, Color::CYAN);
        assert_eq!(frame.get(1, 0), Color::CYAN);
        assert_eq!(frame.get(0, 0), Color([0, 0, 0, 0]));
    }

    #[test]
    fn clear_overwrites_every_pixel() {
        let mut frame = Frame::new(3, 3);
        frame.clear(Color::RED);
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(frame.get(x, y), Color::RED);
            }
        }
    }

    #[test]
    fn from_rgba8_layout() {
        let data = [
            1, 2, 3, 255, //
            4, 5, 6, 255,
        ];
        let frame = Frame::from_rgba8(Resolution::new(2, 1), &data);
        assert_eq!(frame.get(0, 0), Color([1, 2, 3, 255]));
        assert_eq!(frame.get(1, 0), Color([4, 5, 6, 255]));
    }
}
