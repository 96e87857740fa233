//! Intervals over fixed-precision modular arithmetic.
//!
//! An interval `[lo, hi)` denotes the values reached by counting upwards from `lo`, wrapping at
//! `2^BITS`, and stopping just before `hi`; `hi == 0` therefore means the interval extends to the
//! top of the range. `Free` places no restriction and `Empty` admits nothing.

use crate::fixplex::word::Word;

#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum ModInterval<W> {
    Free,
    Range { lo: W, hi: W },
    Empty,
}

impl<W: Word> ModInterval<W> {
    /// The interval `[lo, hi)`. Coinciding endpoints denote the full range.
    pub(crate) fn new(lo: W, hi: W) -> Self {
        if lo == hi {
            ModInterval::Free
        } else {
            ModInterval::Range { lo, hi }
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        matches!(self, ModInterval::Free)
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, ModInterval::Empty)
    }

    pub(crate) fn contains(&self, n: &W) -> bool {
        match self {
            ModInterval::Free => true,
            ModInterval::Empty => false,
            ModInterval::Range { lo, hi } => {
                if lo < hi {
                    lo <= n && n < hi
                } else {
                    lo <= n || n < hi
                }
            }
        }
    }

    /// The single admitted value, if the interval is a singleton.
    pub(crate) fn fixed_value(&self) -> Option<&W> {
        match self {
            ModInterval::Range { lo, hi } => {
                if lo.wrapping_add(&W::one()) == *hi {
                    Some(lo)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Some value admitted by the interval, if any.
    pub(crate) fn witness(&self) -> Option<W> {
        match self {
            ModInterval::Free => Some(W::zero()),
            ModInterval::Empty => None,
            ModInterval::Range { lo, .. } => Some(lo.clone()),
        }
    }

    /// Inclusive bounds `(lo, hi)` when the interval does not wrap around; `None` for wrapping
    /// intervals, on which bound propagation is not attempted.
    pub(crate) fn unwrapped(&self) -> Option<(W, W)> {
        match self {
            ModInterval::Free => Some((W::zero(), W::max_value())),
            ModInterval::Empty => None,
            ModInterval::Range { lo, hi } => {
                if hi.is_zero() {
                    Some((lo.clone(), W::max_value()))
                } else if lo < hi {
                    Some((lo.clone(), hi.wrapping_sub(&W::one())))
                } else {
                    None
                }
            }
        }
    }

    /// The interval admitting exactly `lo..=hi` (no wraparound).
    pub(crate) fn from_inclusive(lo: W, hi: W) -> Self {
        if lo.is_zero() && hi.is_max() {
            ModInterval::Free
        } else if lo > hi {
            ModInterval::Empty
        } else {
            ModInterval::Range {
                lo,
                hi: hi.wrapping_add(&W::one()),
            }
        }
    }

    pub(crate) fn intersect(&self, other: &Self) -> Self {
        if self.is_free() || other.is_empty() {
            return other.clone();
        }
        if other.is_free() || self.is_empty() {
            return self.clone();
        }
        let (ModInterval::Range { lo, hi }, ModInterval::Range { lo: olo, hi: ohi }) =
            (self, other)
        else {
            unreachable!("free and empty intervals are handled above");
        };
        let l = if self.contains(olo) {
            olo.clone()
        } else if other.contains(lo) {
            lo.clone()
        } else {
            return ModInterval::Empty;
        };
        let h = if self.contains(&ohi.wrapping_sub(&W::one())) {
            ohi.clone()
        } else if other.contains(&hi.wrapping_sub(&W::one())) {
            hi.clone()
        } else {
            return ModInterval::Empty;
        };
        ModInterval::new(l, h)
    }
}

#[cfg(test)]
mod tests {
    use super::ModInterval;

    type Iv = ModInterval<u32>;

    #[test]
    fn contains_respects_wraparound() {
        let wrapping = Iv::new(u32::MAX - 1, 3);
        assert!(wrapping.contains(&u32::MAX));
        assert!(wrapping.contains(&0));
        assert!(wrapping.contains(&2));
        assert!(!wrapping.contains(&3));
        assert!(!wrapping.contains(&100));
    }

    #[test]
    fn hi_zero_extends_to_the_top_of_range() {
        let nonzero = Iv::new(1, 0);
        assert!(!nonzero.contains(&0));
        assert!(nonzero.contains(&1));
        assert!(nonzero.contains(&u32::MAX));
        assert_eq!(nonzero.unwrapped(), Some((1, u32::MAX)));
    }

    #[test]
    fn intersection_of_overlapping_ranges() {
        let a = Iv::new(2, 10);
        let b = Iv::new(5, 20);
        assert_eq!(a.intersect(&b), Iv::new(5, 10));

        let disjoint = Iv::new(12, 20);
        assert!(a.intersect(&disjoint).is_empty());
    }

    #[test]
    fn singleton_detection() {
        assert_eq!(Iv::new(7, 8).fixed_value(), Some(&7));
        assert_eq!(Iv::new(u32::MAX, 0).fixed_value(), Some(&u32::MAX));
        assert_eq!(Iv::new(7, 9).fixed_value(), None);
    }

    #[test]
    fn intersecting_with_free_and_empty() {
        let a = Iv::new(2, 10);
        assert_eq!(a.intersect(&Iv::Free), a);
        assert!(a.intersect(&Iv::Empty).is_empty());
    }
}
