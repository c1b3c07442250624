//! Playback control.
//!
//! The pipeline calls [`Controller::proceed`] after every cycle. Depending on the playback
//! state this either returns immediately (running) or blocks until the user resumes, steps or
//! quits (paused). Commands come from a [`ControlSource`], usually the GUI event stream.

use std::time::Duration;

/// A command emitted by a [`ControlSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Toggle between running and paused playback.
    PauseToggle,
    /// Advance by a single cycle, then pause again.
    Step,
    /// Shut the pipeline down.
    Quit,
}

/// Playback state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Frames are processed as fast as the source delivers them.
    Running,
    /// The pipeline blocks until the user resumes or steps.
    Paused,
    /// One cycle is processed, then the state returns to [`PlaybackState::Paused`].
    Stepping,
}

/// Produces playback commands, typically from user input.
pub trait ControlSource {
    /// Waits up to `timeout` for the next command.
    ///
    /// Returns `None` if no command arrived in time.
    fn poll(&mut self, timeout: Duration) -> Option<Command>;
}

/// A [`ControlSource`] that steps through every cycle without waiting.
///
/// Used when running without a GUI, where nothing would ever produce input and a discrete
/// source would otherwise block forever.
pub struct AutoStep;

impl ControlSource for AutoStep {
    fn poll(&mut self, _timeout: Duration) -> Option<Command> {
        Some(Command::Step)
    }
}

/// Input poll interval between cycles while running.
const RUN_POLL: Duration = Duration::from_millis(1);
/// Input poll interval while blocked in pause.
const PAUSE_POLL: Duration = Duration::from_millis(33);

/// Tracks playback state and applies user commands between pipeline cycles.
pub struct Controller {
    state: PlaybackState,
    source: Box<dyn ControlSource>,
}

impl Controller {
    /// Creates a controller in the [`PlaybackState::Running`] state.
    pub fn new(source: Box<dyn ControlSource>) -> Self {
        Self {
            state: PlaybackState::Running,
            source,
        }
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Processes user input after a cycle. Returns `false` when the pipeline should shut down.
    ///
    /// Discrete sources (`continuous == false`) block after every cycle, regardless of
    /// playback state. While blocked, `idle` is invoked before each poll so the caller can
    /// keep its output responsive (the 3D plot can be orbited during pause).
    pub fn proceed(&mut self, continuous: bool, mut idle: impl FnMut()) -> bool {
        // A step has finished once the cycle it enabled is complete.
        if self.state == PlaybackState::Stepping {
            self.state = PlaybackState::Paused;
        }

        if self.state == PlaybackState::Running {
            match self.source.poll(RUN_POLL) {
                Some(Command::Quit) => return false,
                Some(Command::PauseToggle) => self.state = PlaybackState::Paused,
                // Stepping only has meaning while paused.
                Some(Command::Step) | None => {}
            }
        }

        if self.state == PlaybackState::Paused || !continuous {
            loop {
                idle();
                match self.source.poll(PAUSE_POLL) {
                    Some(Command::Quit) => return false,
                    Some(Command::PauseToggle) => {
                        self.state = PlaybackState::Running;
                        break;
                    }
                    Some(Command::Step) => {
                        self.state = PlaybackState::Stepping;
                        break;
                    }
                    None => {}
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    use super::*;

    /// Replays a fixed list of poll results while recording the requested timeouts.
    struct Script {
        replies: VecDeque<Option<Command>>,
        polls: Rc<RefCell<Vec<Duration>>>,
    }

    fn controller(
        replies: impl IntoIterator<Item = Option<Command>>,
    ) -> (Controller, Rc<RefCell<Vec<Duration>>>) {
        let polls = Rc::new(RefCell::new(Vec::new()));
        let source = Script {
            replies: replies.into_iter().collect(),
            polls: polls.clone(),
        };
        (Controller::new(Box::new(source)), polls)
    }

    impl ControlSource for Script {
        fn poll(&mut self, timeout: Duration) -> Option<Command> {
            self.polls.borrow_mut().push(timeout);
            self.replies.pop_front().unwrap_or(None)
        }
    }

    #[test]
    fn running_without_input_does_not_block() {
        let (mut ctrl, polls) = controller([None]);
        assert!(ctrl.proceed(true, || ()));
        assert_eq!(ctrl.state(), PlaybackState::Running);
        assert_eq!(*polls.borrow(), [RUN_POLL]);
    }

    #[test]
    fn step_while_running_is_ignored() {
        let (mut ctrl, polls) = controller([Some(Command::Step)]);
        assert!(ctrl.proceed(true, || ()));
        assert_eq!(ctrl.state(), PlaybackState::Running);
        assert_eq!(*polls.borrow(), [RUN_POLL]);
    }

    #[test]
    fn quit_while_running() {
        let (mut ctrl, _) = controller([Some(Command::Quit)]);
        assert!(!ctrl.proceed(true, || ()));
    }

    #[test]
    fn pause_blocks_until_resumed() {
        let (mut ctrl, polls) = controller([
            Some(Command::PauseToggle),
            None,
            None,
            Some(Command::PauseToggle),
        ]);
        assert!(ctrl.proceed(true, || ()));
        assert_eq!(ctrl.state(), PlaybackState::Running);
        assert_eq!(*polls.borrow(), [RUN_POLL, PAUSE_POLL, PAUSE_POLL, PAUSE_POLL]);
    }

    #[test]
    fn quit_wins_over_a_pending_step() {
        let (mut ctrl, polls) = controller([
            Some(Command::PauseToggle),
            Some(Command::Quit),
            Some(Command::Step),
        ]);
        assert!(!ctrl.proceed(true, || ()));
        // The queued step is never consumed.
        assert_eq!(*polls.borrow(), [RUN_POLL, PAUSE_POLL]);
    }

    #[test]
    fn step_advances_exactly_one_cycle() {
        let (mut ctrl, polls) = controller([
            Some(Command::PauseToggle), // running poll: pause
            Some(Command::Step),        // pause wait: step out
            Some(Command::Quit),        // next cycle's pause wait
        ]);
        assert!(ctrl.proceed(true, || ()));
        assert_eq!(ctrl.state(), PlaybackState::Stepping);
        assert!(!ctrl.proceed(true, || ()));
        assert_eq!(
            *polls.borrow(),
            [RUN_POLL, PAUSE_POLL, PAUSE_POLL],
            "a step must drop back into the pause wait, not the running poll",
        );
    }

    #[test]
    fn discrete_sources_wait_after_every_cycle() {
        let (mut ctrl, polls) = controller([None, Some(Command::Step)]);
        assert!(ctrl.proceed(false, || ()));
        assert_eq!(*polls.borrow(), [RUN_POLL, PAUSE_POLL]);
        assert_eq!(ctrl.state(), PlaybackState::Stepping);
    }

    #[test]
    fn idle_runs_before_every_pause_poll() {
        let (mut ctrl, _) = controller([
            Some(Command::PauseToggle),
            None,
            None,
            Some(Command::Quit),
        ]);
        let mut idles = 0;
        assert!(!ctrl.proceed(true, || idles += 1));
        assert_eq!(idles, 3);
    }

    #[test]
    fn auto_step_never_blocks() {
        let mut ctrl = Controller::new(Box::new(AutoStep));
        for _ in 0..10 {
            assert!(ctrl.proceed(false, || ()));
        }
    }
}
