//! Frame acquisition.
//!
//! [`FrameSource`] abstracts over the three supported stream types: V4L2 webcams ([`Webcam`]),
//! GIF/APNG animations decoded up-front ([`Animation`]), and lazily decoded lists of still
//! images ([`ImageList`]). [`classify`] decides which one a set of `--input` values refers to,
//! and [`open`] constructs it.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    vec,
};

use anyhow::{bail, Context};
use image::{
    codecs::{gif::GifDecoder, png::PngDecoder},
    AnimationDecoder,
};
use linuxvideo::{
    format::{FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    image::{Frame, Resolution},
    timer::Timer,
};

/// A stream of frames to run the pipeline on.
pub trait FrameSource {
    /// Pulls the next frame, blocking until one is available.
    ///
    /// Returns `None` once the stream is exhausted. Sources that never end (cameras) always
    /// return `Some`.
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>>;

    /// Whether frames form a continuous recording of one scene.
    ///
    /// Temporal pose tracking only makes sense for continuous sources, and the pipeline waits
    /// for input after every frame of a non-continuous source instead of running freely.
    fn is_continuous(&self) -> bool;

    /// Profiling timers of this source, logged alongside the decoder timers.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

/// A classified set of `--input` values.
#[derive(Debug, PartialEq, Eq)]
pub enum InputKind {
    /// A V4L2 capture device index.
    Camera(u32),
    /// A single animation file.
    Animation(PathBuf),
    /// One or more still images.
    Images(Vec<PathBuf>),
}

/// Decides what kind of source a set of inputs refers to.
///
/// A single non-negative integer selects a camera, a single `.gif` path an animation, and any
/// number of `.jpg`/`.jpeg`/`.png` paths an image list. Anything else (no inputs, a camera
/// index mixed with paths, unsupported extensions, missing files) is a configuration error.
pub fn classify(inputs: &[String]) -> anyhow::Result<InputKind> {
    if inputs.is_empty() {
        bail!("no inputs given (expected a camera index or image/animation paths)");
    }

    if let [single] = inputs {
        if let Ok(index) = single.parse::<u32>() {
            return Ok(InputKind::Camera(index));
        }
    }

    let mut paths = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.parse::<u32>().is_ok() {
            bail!("camera index '{input}' cannot be combined with other inputs");
        }

        let path = PathBuf::from(input);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg" | "png") => {}
            Some("gif") => {
                if inputs.len() != 1 {
                    bail!("animation '{input}' cannot be combined with other inputs");
                }
            }
            _ => bail!(
                "unsupported input '{input}' (expected a camera index or .jpg/.jpeg/.png/.gif paths)"
            ),
        }
        if !path.exists() {
            bail!("input path '{input}' does not exist");
        }
        paths.push(path);
    }

    if paths.len() == 1 && paths[0].extension().map_or(false, |ext| ext == "gif") {
        return Ok(InputKind::Animation(paths.remove(0)));
    }

    Ok(InputKind::Images(paths))
}

/// Opens the frame source a classified input refers to.
pub fn open(kind: InputKind) -> anyhow::Result<Box<dyn FrameSource>> {
    match kind {
        InputKind::Camera(index) => Ok(Box::new(Webcam::open(index)?)),
        InputKind::Animation(path) => Ok(Box::new(Animation::from_path(path)?)),
        InputKind::Images(paths) => {
            // A lone PNG can secretly be an animation.
            if paths.len() == 1 && is_apng(&paths[0])? {
                return Ok(Box::new(Animation::from_path(&paths[0])?));
            }
            Ok(Box::new(ImageList::new(paths)))
        }
    }
}

fn is_apng(path: &Path) -> anyhow::Result<bool> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
        return Ok(false);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(PngDecoder::new(reader)?.is_apng())
}

/// A V4L2 webcam yielding an endless stream of frames.
///
/// Only `VIDEO_CAPTURE` devices delivering JFIF JPEG or Motion JPEG frames are supported.
pub struct Webcam {
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the capture device with the given index (`/dev/video<index>`).
    ///
    /// This can block for a significant amount of time while the camera initializes (on the
    /// order of hundreds of milliseconds).
    pub fn open(index: u32) -> anyhow::Result<Self> {
        let path = PathBuf::from(format!("/dev/video{index}"));
        let dev = Device::open(&path)
            .with_context(|| format!("failed to open camera '{}'", path.display()))?;

        let caps = dev.capabilities()?;
        let cap_flags = caps.device_capabilities();
        log::debug!(
            "probing {} ({}), capabilities {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );
        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            bail!("device '{}' does not support video capture", path.display());
        }

        let pixfmt = negotiate_format(&dev)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());

        // Ask for an absurd frame rate so that the driver clamps it to its fastest mode.
        let actual = capture.set_frame_interval(Fract::new(1, 200))?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream(2)?;

        Ok(Self {
            stream,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }

    /// Reads the next frame, blocking until the camera delivers one.
    fn read(&mut self) -> anyhow::Result<Frame> {
        let dequeue_guard = self.t_dequeue.start();
        let resolution = self.resolution;
        let t_decode = &mut self.t_decode;
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let frame = match t_decode.time(|| Frame::decode_jpeg(&buf)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // Even high-quality webcams occasionally deliver a corrupted MJPG
                        // frame. Substitute a blank frame so that the cycle still completes.
                        log::error!("failed to decode webcam frame: {e}");
                        Frame::new(resolution.width(), resolution.height())
                    }
                };
                Ok(frame)
            })
            .map_err(Into::into)
    }
}

impl FrameSource for Webcam {
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>> {
        Some(self.read())
    }

    fn is_continuous(&self) -> bool {
        true
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

/// Picks the JPEG/MJPG pixel format with the largest discrete frame size the device offers.
fn negotiate_format(dev: &Device) -> anyhow::Result<PixFormat> {
    let mut pixel_format = None;
    for format in dev.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found (device must deliver JPEG or MJPG)");
    };

    let sizes = match dev.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => sizes,
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous camera resolutions are not supported");
        }
    };
    let size = sizes
        .iter()
        .max_by_key(|size| u64::from(size.width()) * u64::from(size.height()))
        .context("camera reports no frame sizes")?;

    Ok(PixFormat::new(size.width(), size.height(), pixel_format))
}

/// A finite sequence of frames decoded up-front from a GIF or animated PNG.
pub struct Animation {
    frames: vec::IntoIter<Frame>,
}

impl Animation {
    /// Loads an animation from a `.gif` or (animated) `.png` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
        let reader = BufReader::new(file);
        let raw = match path.extension().and_then(|ext| ext.to_str()) {
            Some("gif") => GifDecoder::new(reader)?.into_frames().collect_frames(),
            Some("png") => PngDecoder::new(reader)?.apng().into_frames().collect_frames(),
            _ => bail!(
                "animation path '{}' must have a .gif or .png extension",
                path.display()
            ),
        };
        let frames = raw
            .with_context(|| format!("failed to decode animation '{}'", path.display()))?
            .into_iter()
            .map(|frame| Frame {
                buf: frame.into_buffer(),
            })
            .collect::<Vec<_>>();
        if frames.is_empty() {
            bail!("animation '{}' contains no frames", path.display());
        }

        log::info!(
            "loaded animation '{}': {} frames at {}",
            path.display(),
            frames.len(),
            frames[0].resolution(),
        );

        Ok(Self {
            frames: frames.into_iter(),
        })
    }
}

impl FrameSource for Animation {
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>> {
        self.frames.next().map(Ok)
    }

    fn is_continuous(&self) -> bool {
        true
    }
}

/// Streams a list of still images, decoding each one lazily when it is pulled.
pub struct ImageList {
    paths: vec::IntoIter<PathBuf>,
}

impl ImageList {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }
}

impl FrameSource for ImageList {
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>> {
        self.paths.next().map(Frame::load)
    }

    fn is_continuous(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lightpose-source-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn lone_integer_is_a_camera_index() {
        assert_eq!(classify(&["3".into()]).unwrap(), InputKind::Camera(3));
    }

    #[test]
    fn camera_index_cannot_be_combined() {
        assert!(classify(&["0".into(), "a.png".into()]).is_err());
        assert!(classify(&["0".into(), "1".into()]).is_err());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(classify(&[]).is_err());
    }

    #[test]
    fn missing_paths_are_rejected() {
        assert!(classify(&["/definitely/not/here.png".into()]).is_err());
    }

    #[test]
    fn unsupported_inputs_are_rejected() {
        // Extensions are checked before path existence, so no files are needed here.
        assert!(classify(&["video.mp4".into()]).is_err());
        assert!(classify(&["-1".into()]).is_err());
    }

    #[test]
    fn single_gif_is_an_animation() {
        let path = temp_path("classify.gif");
        std::fs::write(&path, b"GIF89a").unwrap();
        assert_eq!(
            classify(&[path.display().to_string()]).unwrap(),
            InputKind::Animation(path),
        );
    }

    #[test]
    fn images_classify_as_list_in_order() {
        let a = temp_path("list_a.jpg");
        let b = temp_path("list_b.png");
        std::fs::write(&a, b"").unwrap();
        std::fs::write(&b, b"").unwrap();
        assert_eq!(
            classify(&[a.display().to_string(), b.display().to_string()]).unwrap(),
            InputKind::Images(vec![a, b]),
        );
    }

    #[test]
    fn gif_animation_yields_every_frame_once() {
        use image::codecs::gif::GifEncoder;

        let path = temp_path("anim.gif");
        let mut encoder = GifEncoder::new(File::create(&path).unwrap());
        for value in [10u8, 200] {
            let mut buf = RgbaImage::new(2, 2);
            buf.pixels_mut().for_each(|pix| *pix = Rgba([value, 0, 0, 255]));
            encoder.encode_frame(image::Frame::new(buf)).unwrap();
        }
        drop(encoder);

        let mut anim = Animation::from_path(&path).unwrap();
        assert!(anim.is_continuous());
        let first = anim.next_frame().unwrap().unwrap();
        assert_eq!(first.resolution(), Resolution::new(2, 2));
        let second = anim.next_frame().unwrap().unwrap();
        assert!(anim.next_frame().is_none());
        // GIF quantizes colors, so only check that red dominates where it should.
        assert!(first.get(0, 0).r() < 128);
        assert!(second.get(0, 0).r() > 128);
    }

    #[test]
    fn image_list_is_lazy_and_ordered() {
        let a = temp_path("lazy_a.png");
        let b = temp_path("lazy_b.png");
        Frame::new(3, 1).save(&a).unwrap();
        Frame::new(1, 3).save(&b).unwrap();

        let mut list = ImageList::new(vec![a, b, PathBuf::from("/missing/c.png")]);
        assert!(!list.is_continuous());
        let first = list.next_frame().unwrap().unwrap();
        assert_eq!(first.resolution(), Resolution::new(3, 1));
        let second = list.next_frame().unwrap().unwrap();
        assert_eq!(second.resolution(), Resolution::new(1, 3));
        // The missing path only fails once it is actually pulled.
        assert!(list.next_frame().unwrap().is_err());
        assert!(list.next_frame().is_none());
    }

    #[test]
    fn still_png_opens_as_image_list() {
        let path = temp_path("still.png");
        Frame::new(2, 2).save(&path).unwrap();
        let source = open(InputKind::Images(vec![path])).unwrap();
        assert!(!source.is_continuous());
    }
}
