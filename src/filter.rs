//! Temporal filters for smoothing noisy measurements.

/// A stateless filter definition for values of type `V`.
///
/// The filter parameters live in the implementing type, while the per-signal history lives in the
/// associated [`Filter::State`]. This split allows one set of parameters to be shared across many
/// filtered signals (every keypoint coordinate of every tracked pose, for example).
pub trait Filter<V> {
    /// Per-signal filter state.
    type State: Default;

    /// Feeds a new raw value into the filter, returning the filtered value.
    fn filter(&self, state: &mut Self::State, value: V) -> V;
}

/// Exponentially weighted moving average over a scalar signal.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
}

impl Ema {
    /// Creates a filter with smoothing factor `alpha`.
    ///
    /// `alpha` defines how strongly the most recent value is weighted. Values close to 1.0 track
    /// the input almost directly, values close to 0.0 change slowly.
    ///
    /// # Panics
    ///
    /// Panics when `alpha` lies outside of `0.0..=1.0`.
    pub fn new(alpha: f32) -> Self {
        assert!((0.0..=1.0).contains(&alpha));
        Self { alpha }
    }
}

/// Running state of one [`Ema`]-smoothed signal.
///
/// The first value fed into an [`Ema`] with fresh state is returned unchanged and becomes the
/// initial average.
#[derive(Debug, Default, Clone)]
pub struct EmaState {
    last: Option<f32>,
}

impl Filter<f32> for Ema {
    type State = EmaState;

    fn filter(&self, state: &mut EmaState, value: f32) -> f32 {
        let avg = match state.last {
            Some(last) => self.alpha * value + (1.0 - self.alpha) * last,
            None => value,
        };
        state.last = Some(avg);
        avg
    }
}

/// A [`Filter`] bundled with its [`Filter::State`].
///
/// Convenient when only a single signal is filtered.
#[derive(Debug)]
pub struct SimpleFilter<F: Filter<V>, V> {
    filter: F,
    state: F::State,
}

impl<F: Filter<V>, V> SimpleFilter<F, V> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            state: Default::default(),
        }
    }

    pub fn filter(&mut self, value: V) -> V {
        self.filter.filter(&mut self.state, value)
    }
}
