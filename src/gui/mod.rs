//! Windowing and user input.
//!
//! The native event loop has to run on the main thread, so [`run`] hands the application logic
//! to a worker thread and parks the event loop on the calling thread. Images are displayed
//! with [`show_image`], and user input (playback keys and mouse orbiting) is consumed through
//! [`GuiInput`].

mod renderer;

use std::{
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex, OnceLock,
    },
    time::{Duration, Instant},
};

use winit::{
    event::{ElementState, Event, MouseButton, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopClosed, EventLoopProxy},
    window::WindowId,
};

use crate::{
    image::{Frame, Resolution},
    playback::{Command, ControlSource},
    plot::Orbit,
};

use self::renderer::{Gpu, Renderer, Window};

struct Gui {
    gpu: &'static Gpu,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
    input: Sender<InputEvent>,
}

impl Gui {
    fn new(input: Sender<InputEvent>) -> Self {
        Self {
            gpu: Gpu::get(),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
            input,
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(msg) => match msg {
                    Msg::Image { key, res, data } => {
                        let renderer = self.windows.entry(key.clone()).or_insert_with(|| {
                            log::debug!("opening '{key}' window at {res}");

                            let win = Window::open(target, &key, res).unwrap();
                            let win_id = win.win.id();
                            let renderer = Renderer::new(win, self.gpu).unwrap();

                            self.win_id_to_key.insert(win_id, key.clone());

                            renderer
                        });

                        renderer.update_texture(res, &data);
                        renderer.window().request_redraw();
                    }
                },
                Event::WindowEvent { event, .. } => {
                    // The app thread may have exited already; nothing to do then.
                    let forward = |ev| drop(self.input.send(ev));
                    match event {
                        WindowEvent::CloseRequested => forward(InputEvent::CloseRequested),
                        WindowEvent::KeyboardInput { input, .. } => {
                            if input.state == ElementState::Pressed {
                                if let Some(key) = input.virtual_keycode {
                                    forward(InputEvent::Key(key));
                                }
                            }
                        }
                        WindowEvent::CursorMoved { position, .. } => forward(InputEvent::Pointer {
                            x: position.x,
                            y: position.y,
                        }),
                        WindowEvent::MouseInput {
                            state,
                            button: MouseButton::Left,
                            ..
                        } => forward(InputEvent::Drag {
                            pressed: state == ElementState::Pressed,
                        }),
                        _ => {}
                    }
                }
                Event::RedrawRequested(window) => {
                    let key = &self.win_id_to_key[&window];
                    self.windows.get_mut(key).unwrap().redraw();
                }
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

#[derive(Debug)]
enum InputEvent {
    Key(VirtualKeyCode),
    Pointer { x: f64, y: f64 },
    Drag { pressed: bool },
    CloseRequested,
}

struct Display {
    proxy: Mutex<EventLoopProxy<Msg>>,
    input: Mutex<Option<Receiver<InputEvent>>>,
}

impl Display {
    fn get() -> &'static Display {
        DISPLAY.get().expect("GUI thread is not running")
    }
}

static DISPLAY: OnceLock<Display> = OnceLock::new();

fn send(msg: Msg) {
    Display::get()
        .proxy
        .lock()
        .unwrap()
        .send_event(msg)
        .map_err(|_closed| EventLoopClosed(()))
        .unwrap();
}

/// Initializes the GUI and invokes `cb` on a worker thread. Never returns.
///
/// The process exits when `cb` does, with an exit status derived from its return value.
pub fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    let proxy = event_loop.create_proxy();
    let (input_tx, input_rx) = mpsc::channel();
    let display = Display {
        proxy: Mutex::new(proxy),
        input: Mutex::new(Some(input_rx)),
    };
    DISPLAY
        .set(display)
        .ok()
        .expect("gui::run may only be called once");

    // The event loop needs the calling thread, so the application body gets its own.
    std::thread::spawn(move || {
        match catch_unwind(AssertUnwindSafe(cb)) {
            Ok(r) if r.is_success() => process::exit(0),
            Ok(r) => {
                r.report(); // prints the error for `Result` returns
                process::exit(1);
            }
            Err(_payload) => {
                // The panic hook already printed the message, use the same exit code as libstd.
                process::exit(101);
            }
        }
    });

    let gui = Gui::new(input_tx);
    gui.run(event_loop);
}

/// Shows `frame` in the window named `key`.
///
/// The window is created on first use and sized to the frame. Later frames of a different
/// resolution are scaled to fit.
pub fn show_image(key: impl Into<String>, frame: &Frame) {
    // Frame data is RGBA8 internally so that no conversion before GPU upload is needed.
    let data = frame.data().to_vec();

    send(Msg::Image {
        key: key.into(),
        res: frame.resolution(),
        data,
    });
}

/// Playback commands and orbit control from the GUI windows.
pub struct GuiInput {
    events: Receiver<InputEvent>,
    orbit: Arc<Mutex<Orbit>>,
    cursor: (f64, f64),
}

impl GuiInput {
    /// Claims the GUI event stream.
    ///
    /// # Panics
    ///
    /// Panics when called more than once, or outside of the closure passed to [`run`].
    pub fn new(orbit: Arc<Mutex<Orbit>>) -> Self {
        let events = Display::get()
            .input
            .lock()
            .unwrap()
            .take()
            .expect("GUI input was already claimed");
        Self {
            events,
            orbit,
            cursor: (0.0, 0.0),
        }
    }
}

impl ControlSource for GuiInput {
    fn poll(&mut self, timeout: Duration) -> Option<Command> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.events.recv_timeout(remaining) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => return None,
                // The event loop is gone, shut down.
                Err(RecvTimeoutError::Disconnected) => return Some(Command::Quit),
            };
            match event {
                InputEvent::Key(VirtualKeyCode::Escape) => return Some(Command::Quit),
                InputEvent::Key(VirtualKeyCode::P) => return Some(Command::PauseToggle),
                InputEvent::Key(VirtualKeyCode::Space) => return Some(Command::Step),
                // All other keys are ignored.
                InputEvent::Key(_) => {}
                InputEvent::Pointer { x, y } => {
                    self.cursor = (x, y);
                    self.orbit.lock().unwrap().drag_to(x, y);
                }
                InputEvent::Drag { pressed: true } => {
                    let (x, y) = self.cursor;
                    self.orbit.lock().unwrap().begin_drag(x, y);
                }
                InputEvent::Drag { pressed: false } => self.orbit.lock().unwrap().end_drag(),
                InputEvent::CloseRequested => return Some(Command::Quit),
            }
        }
    }
}

/// Values that the closure passed to [`run`] may return.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T, E: fmt::Debug> Termination for Result<T, E>
where
    Result<T, E>: process::Termination,
{
    fn is_success(&self) -> bool {
        self.is_ok()
    }
}
