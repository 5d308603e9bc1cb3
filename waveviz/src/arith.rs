// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Bounds-checked integer helpers used by every time <-> pixel computation.
// None of these ever wrap: an out-of-range result is reported as `None`
// and it is up to the caller to decide on a sentinel.

use std::num::NonZeroU64;

/// Multiplies `a` and `b`, returning `None` if the product overflows or
/// exceeds `limit`.
#[inline]
pub fn bounded_mul(a: u64, b: u64, limit: u64) -> Option<u64> {
    a.checked_mul(b).filter(|&product| product <= limit)
}

/// Integer division that cannot fail: the divisor is non-zero by construction.
#[inline]
pub fn div(a: u64, divisor: NonZeroU64) -> u64 {
    a / divisor.get()
}

/// Adds `offset` to `base`, returning `None` if the sum exceeds `limit`.
#[inline]
pub fn bounded_add(base: u64, offset: u64, limit: u64) -> Option<u64> {
    base.checked_add(offset).filter(|&sum| sum <= limit)
}

/// Replaces a failed bounded computation with a saturated sentinel.
#[inline]
pub fn saturate(value: Option<u64>) -> u64 {
    value.unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bounded_mul() {
        assert_eq!(bounded_mul(3, 4, 100), Some(12));
        assert_eq!(bounded_mul(10, 10, 100), Some(100));
        assert_eq!(bounded_mul(10, 11, 100), None);
        assert_eq!(bounded_mul(u64::MAX, 2, u64::MAX), None);
        assert_eq!(bounded_mul(0, u64::MAX, 0), Some(0));
    }

    #[test]
    fn test_bounded_add() {
        assert_eq!(bounded_add(5, 5, 10), Some(10));
        assert_eq!(bounded_add(5, 6, 10), None);
        assert_eq!(bounded_add(u64::MAX, 1, u64::MAX), None);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(Some(3)), 3);
        assert_eq!(saturate(None), u64::MAX);
    }

    proptest! {
        #[test]
        fn bounded_mul_never_wraps(a in any::<u64>(), b in any::<u64>(), limit in any::<u64>()) {
            match bounded_mul(a, b, limit) {
                Some(product) => {
                    prop_assert!(product <= limit);
                    prop_assert_eq!(a as u128 * b as u128, product as u128);
                }
                None => prop_assert!(a as u128 * b as u128 > limit as u128),
            }
        }
    }
}
