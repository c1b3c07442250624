//! Small numeric helpers.

use std::cmp::Ordering;

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
///
/// Useful for sorting scored candidates without bubbling `partial_cmp` panics through the sort.
#[derive(Clone, Copy, Debug)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The logistic function, mapping any input into `0.0..1.0`.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}
