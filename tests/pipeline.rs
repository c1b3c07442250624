//! End-to-end pipeline runs with stubbed inference and rendering.

use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use lightpose::decode::PoseDecoder;
use lightpose::image::Frame;
use lightpose::nn::{Infer, Outputs, Tensor};
use lightpose::pipeline::Pipeline;
use lightpose::playback::{AutoStep, Command, ControlSource, Controller};
use lightpose::pose::Pose;
use lightpose::render::Render;
use lightpose::source::FrameSource;

/// Hands out a fixed list of frames, like a directory of still images would.
struct FrameList {
    frames: VecDeque<Frame>,
}

impl FrameList {
    fn new<I: IntoIterator<Item = (u32, u32)>>(sizes: I) -> Self {
        Self {
            frames: sizes
                .into_iter()
                .map(|(w, h)| Frame::new(w, h))
                .collect(),
        }
    }
}

impl FrameSource for FrameList {
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>> {
        self.frames.pop_front().map(Ok)
    }

    fn is_continuous(&self) -> bool {
        false
    }
}

/// Returns empty (all-zero) network outputs and counts how often it ran.
struct StubEngine {
    runs: Rc<RefCell<u32>>,
    fail_on_run: Option<u32>,
}

impl StubEngine {
    fn new(runs: Rc<RefCell<u32>>) -> Self {
        Self {
            runs,
            fail_on_run: None,
        }
    }
}

impl Infer for StubEngine {
    fn run(&mut self, _image: &Frame) -> anyhow::Result<Outputs> {
        *self.runs.borrow_mut() += 1;
        if Some(*self.runs.borrow()) == self.fail_on_run {
            anyhow::bail!("synthetic inference failure");
        }

        let zeros = |channels: usize| Tensor::from_shape_fn([1, channels, 8, 8], |_| 0.0);
        Ok(Outputs::from(vec![zeros(57), zeros(19), zeros(38)]))
    }
}

#[derive(Default)]
struct Counts {
    overlays: u32,
    fps_texts: u32,
    presents: u32,
    scenes: u32,
}

/// Records how often each rendering operation was invoked.
struct CountingRenderer {
    counts: Rc<RefCell<Counts>>,
}

impl Render for CountingRenderer {
    fn draw_overlay(&mut self, _frame: &mut Frame, _poses: &[Pose]) {
        self.counts.borrow_mut().overlays += 1;
    }

    fn draw_fps(&mut self, _frame: &mut Frame, _fps: f32) {
        self.counts.borrow_mut().fps_texts += 1;
    }

    fn present(&mut self, _frame: &Frame) {
        self.counts.borrow_mut().presents += 1;
    }

    fn present_scene(&mut self, _poses: &[Pose]) {
        self.counts.borrow_mut().scenes += 1;
    }
}

/// Replays a fixed list of commands.
struct Script {
    commands: VecDeque<Command>,
}

impl ControlSource for Script {
    fn poll(&mut self, _timeout: Duration) -> Option<Command> {
        self.commands.pop_front()
    }
}

fn pipeline(
    sizes: Vec<(u32, u32)>,
    engine: StubEngine,
    controller: Controller,
    fx: Option<f32>,
) -> (Pipeline, Rc<RefCell<Counts>>) {
    let counts = Rc::new(RefCell::new(Counts::default()));
    let renderer = CountingRenderer {
        counts: counts.clone(),
    };
    let pipeline = Pipeline::new(
        Box::new(FrameList::new(sizes)),
        Box::new(engine),
        PoseDecoder::new(8, None),
        Box::new(renderer),
        controller,
        100,
        fx,
    );
    (pipeline, counts)
}

#[test]
fn runs_every_frame_of_a_discrete_source() {
    let runs = Rc::new(RefCell::new(0));
    let (mut pipeline, counts) = pipeline(
        vec![(640, 480); 3],
        StubEngine::new(runs.clone()),
        Controller::new(Box::new(AutoStep)),
        None,
    );

    let cycles = pipeline.run().unwrap();

    assert_eq!(cycles, 3);
    assert_eq!(*runs.borrow(), 3);
    let counts = counts.borrow();
    assert_eq!(counts.overlays, 3);
    assert_eq!(counts.fps_texts, 3);
    assert_eq!(counts.presents, 3);
    // The scene is also re-rendered while waiting for input, so only a lower bound holds.
    assert!(counts.scenes >= 3);
}

#[test]
fn focal_length_is_derived_from_the_first_frame_only() {
    let runs = Rc::new(RefCell::new(0));
    let (mut pipeline, _) = pipeline(
        vec![(640, 480), (800, 600)],
        StubEngine::new(runs.clone()),
        Controller::new(Box::new(AutoStep)),
        None,
    );

    assert_eq!(pipeline.focal_length(), None);
    pipeline.run().unwrap();
    // 0.8 * 640; the 800 px second frame must not change it.
    assert_eq!(pipeline.focal_length(), Some(512.0));
}

#[test]
fn configured_focal_length_is_kept() {
    let runs = Rc::new(RefCell::new(0));
    let (mut pipeline, _) = pipeline(
        vec![(640, 480)],
        StubEngine::new(runs.clone()),
        Controller::new(Box::new(AutoStep)),
        Some(123.0),
    );

    pipeline.run().unwrap();
    assert_eq!(pipeline.focal_length(), Some(123.0));
}

#[test]
fn quit_stops_the_run_mid_stream() {
    let runs = Rc::new(RefCell::new(0));
    let script = Script {
        commands: [Command::Quit].into(),
    };
    let (mut pipeline, _) = pipeline(
        vec![(640, 480); 3],
        StubEngine::new(runs.clone()),
        Controller::new(Box::new(script)),
        None,
    );

    let cycles = pipeline.run().unwrap();

    // The first cycle completes, then the wait loop sees the quit command.
    assert_eq!(cycles, 1);
    assert_eq!(*runs.borrow(), 1);
}

#[test]
fn inference_errors_abort_the_run() {
    let runs = Rc::new(RefCell::new(0));
    let mut engine = StubEngine::new(runs.clone());
    engine.fail_on_run = Some(2);
    let (mut pipeline, counts) = pipeline(
        vec![(640, 480); 3],
        engine,
        Controller::new(Box::new(AutoStep)),
        None,
    );

    let err = pipeline.run().unwrap_err();
    assert!(err.to_string().contains("synthetic inference failure"));
    // The first cycle was rendered, the failing one was not.
    assert_eq!(counts.borrow().presents, 1);
}
