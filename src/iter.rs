//! Iterator helpers.

use std::iter::Zip;

/// Zips two iterators, panicking when their lengths differ.
///
/// [`Iterator::zip`] silently stops at the shorter of the two iterators, which hides bugs when
/// both sides are expected to correspond element-for-element (keypoint slots and filter states,
/// pixel rows and tensor rows). Use this function when a length mismatch is a programming error.
#[track_caller]
pub fn zip_exact<A, B>(a: A, b: B) -> Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    B: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "cannot `zip_exact` iterators of different lengths"
    );

    a.zip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_lengths() {
        let pairs: Vec<_> = zip_exact([1, 2, 3], ['a', 'b', 'c']).collect();
        assert_eq!(pairs, [(1, 'a'), (2, 'b'), (3, 'c')]);
    }

    #[test]
    #[should_panic]
    fn unequal_lengths() {
        let _ = zip_exact([1, 2, 3], ['a', 'b']);
    }
}
