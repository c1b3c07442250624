//! The per-frame processing loop.

use crate::{
    decode::PoseDecoder,
    nn::Infer,
    playback::Controller,
    render::Render,
    scale::scale_to_height,
    source::FrameSource,
    timer::{CycleTimer, FpsCounter},
};

/// Drives frames from a source through inference, decoding, and rendering.
///
/// Owns every stage of the loop: the frame source, the inference engine, the pose decoder, the
/// renderer, and the playback controller that decides when the next cycle may begin.
pub struct Pipeline {
    source: Box<dyn FrameSource>,
    engine: Box<dyn Infer>,
    decoder: PoseDecoder,
    viewer: Box<dyn Render>,
    controller: Controller,
    timer: CycleTimer,
    fps: FpsCounter,
    height_size: u32,
    fx: Option<f32>,
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// `fx` is the focal length used for the 3D back-projection; when `None` it is derived from
    /// the first frame once the pipeline runs.
    pub fn new(
        source: Box<dyn FrameSource>,
        engine: Box<dyn Infer>,
        decoder: PoseDecoder,
        viewer: Box<dyn Render>,
        controller: Controller,
        height_size: u32,
        fx: Option<f32>,
    ) -> Self {
        Self {
            source,
            engine,
            decoder,
            viewer,
            controller,
            timer: CycleTimer::new(),
            fps: FpsCounter::new("pipeline"),
            height_size,
            fx,
        }
    }

    /// The focal length in use, if it has been configured or derived already.
    pub fn focal_length(&self) -> Option<f32> {
        self.fx
    }

    /// Runs the loop until the source is exhausted or the user quits.
    ///
    /// Inference and decoding errors abort the run. Returns the number of completed cycles.
    pub fn run(&mut self) -> anyhow::Result<u64> {
        let continuous = self.source.is_continuous();
        let mut cycles = 0;
        while let Some(frame) = self.source.next_frame() {
            let frame = frame?;
            self.timer.start();

            // Derived at most once per run, even when later frame sizes differ.
            let fx = *self.fx.get_or_insert_with(|| {
                let fx = 0.8 * frame.width() as f32;
                log::debug!("focal length not configured, derived {fx} from the frame width");
                fx
            });

            let scaled = scale_to_height(&frame, self.height_size)?;
            let outputs = self.engine.run(&scaled.image)?;
            let poses = self
                .decoder
                .decode(&outputs, scaled.input_scale, fx, continuous)?;

            let mut annotated = frame;
            self.viewer.draw_overlay(&mut annotated, &poses);
            self.timer.stop();
            self.viewer.draw_fps(&mut annotated, self.timer.display_fps());
            self.viewer.present(&annotated);
            self.viewer.present_scene(&poses);

            cycles += 1;
            self.fps
                .tick_with(self.decoder.timers().chain(self.source.timers()));

            // The idle callback keeps the 3D view orbitable while playback is paused.
            let Self {
                controller, viewer, ..
            } = self;
            if !controller.proceed(continuous, || viewer.present_scene(&poses)) {
                log::debug!("quit requested after {cycles} cycles");
                break;
            }
        }
        Ok(cycles)
    }
}
