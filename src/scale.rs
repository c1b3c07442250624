//! Aspect ratio preserving frame scaling.

use anyhow::bail;
use image::imageops::FilterType;

use crate::image::Frame;

/// A [`Frame`] scaled to the network input height, along with the applied scale factor.
pub struct ScaledImage {
    pub image: Frame,
    /// Factor the source frame was multiplied by. Divide network output coordinates by this to
    /// map them back into the source frame.
    pub input_scale: f32,
}

/// Scales `frame` to be `target_height` pixels tall, preserving its aspect ratio.
///
/// The resulting width is rounded to the nearest pixel (but is always at least 1). Scaling uses
/// bilinear filtering in both directions.
pub fn scale_to_height(frame: &Frame, target_height: u32) -> anyhow::Result<ScaledImage> {
    if target_height == 0 {
        bail!("cannot scale to a height of 0 pixels");
    }
    if frame.height() == 0 {
        bail!("cannot scale an empty frame (resolution {})", frame.resolution());
    }

    let input_scale = target_height as f32 / frame.height() as f32;
    let width = ((frame.width() as f32 * input_scale).round() as u32).max(1);
    let buf = image::imageops::resize(&frame.buf, width, target_height, FilterType::Triangle);
    Ok(ScaledImage {
        image: Frame { buf },
        input_scale,
    })
}
