//! Extensions for `Range<T>`.
//!
//! [RangeExt] adds overlap and containment checks to the standard range type, and [span]
//! builds a range from a start and a length without overflowing.

use core::ops::Range;

pub trait RangeExt<T>
where
    Self: Sized,
    T: Copy + PartialOrd,
{
    /// Check if this range overlaps with another range.
    ///
    /// Always return false if either range is empty.
    fn overlap(&self, another: &Self) -> bool;

    /// Check if `inner` lies entirely within this range.
    ///
    /// An empty `inner` is covered when its start lies within `[start, end]`.
    fn covers(&self, inner: &Self) -> bool;
}

impl<T> RangeExt<T> for Range<T>
where
    T: Copy + Ord,
{
    #[inline(always)]
    fn overlap(&self, another: &Range<T>) -> bool {
        if self.is_empty() || another.is_empty() {
            return false;
        }
        self.start < another.end && another.start < self.end
    }

    #[inline(always)]
    fn covers(&self, inner: &Range<T>) -> bool {
        if inner.start > inner.end {
            return false;
        }
        self.start <= inner.start && inner.end <= self.end
    }
}

/// Build `[start, start + len)`, or `None` if the end does not fit in `T`.
pub fn span<T>(start: T, len: T) -> Option<Range<T>>
where
    T: Copy + CheckedAdd,
{
    Some(start..start.checked_add(len)?)
}

/// Overflow-checked addition for the integer types used as addresses.
pub trait CheckedAdd: Sized {
    fn checked_add(self, rhs: Self) -> Option<Self>;
}

macro_rules! impl_checked_add {
    ($($type: ty),*) => {
        $(
            impl CheckedAdd for $type {
                #[inline(always)]
                fn checked_add(self, rhs: Self) -> Option<Self> {
                    <$type>::checked_add(self, rhs)
                }
            }
        )*
    };
}

impl_checked_add!(u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_ignores_touching_and_empty_ranges() {
        assert!((0..10).overlap(&(5..15)));
        assert!(!(0..10).overlap(&(10..20)));
        assert!(!(0..10).overlap(&(3..3)));
    }

    #[test]
    fn covers_checks_both_ends() {
        assert!((0x1000..0x2000).covers(&(0x1000..0x2000)));
        assert!((0x1000..0x2000).covers(&(0x1800..0x1800)));
        assert!(!(0x1000..0x2000).covers(&(0x1800..0x2001)));
        assert!(!(0x1000..0x2000).covers(&(0x0fff..0x1001)));
    }

    #[test]
    fn span_detects_overflow() {
        assert_eq!(span(0x10usize, 0x20), Some(0x10..0x30));
        assert_eq!(span(usize::MAX, 1), None);
    }
}
