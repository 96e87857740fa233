//! Fixed-width modular words backing the per-width feasibility engines.
//!
//! A concrete representation exists for 32- and 64-bit native words and for a 256-bit extended
//! word; the width dispatch in the router rejects every other width.

use std::fmt::Debug;
use std::hash::Hash;

use num_bigint::BigUint;
use num_traits::One;
use num_traits::ToPrimitive;
use num_traits::Zero;

/// Arithmetic over `[0, 2^BITS)` with wraparound semantics.
pub(crate) trait Word: Clone + Eq + Ord + Hash + Debug {
    const BITS: u32;

    fn zero() -> Self;
    fn one() -> Self;
    fn max_value() -> Self;
    fn wrapping_add(&self, rhs: &Self) -> Self;
    fn wrapping_sub(&self, rhs: &Self) -> Self;
    fn wrapping_mul(&self, rhs: &Self) -> Self;
    /// Conversion from an unbounded numeral, reduced mod `2^BITS`.
    fn from_biguint(value: &BigUint) -> Self;
    fn to_biguint(&self) -> BigUint;

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn is_max(&self) -> bool {
        *self == Self::max_value()
    }
}

macro_rules! native_word {
    ($ty:ty, $bits:expr) => {
        impl Word for $ty {
            const BITS: u32 = $bits;

            fn zero() -> Self {
                0
            }

            fn one() -> Self {
                1
            }

            fn max_value() -> Self {
                <$ty>::MAX
            }

            fn wrapping_add(&self, rhs: &Self) -> Self {
                <$ty>::wrapping_add(*self, *rhs)
            }

            fn wrapping_sub(&self, rhs: &Self) -> Self {
                <$ty>::wrapping_sub(*self, *rhs)
            }

            fn wrapping_mul(&self, rhs: &Self) -> Self {
                <$ty>::wrapping_mul(*self, *rhs)
            }

            fn from_biguint(value: &BigUint) -> Self {
                let modulus = BigUint::one() << ($bits as u32);
                (value % modulus)
                    .to_u64()
                    .expect("reduced value fits in 64 bits") as $ty
            }

            fn to_biguint(&self) -> BigUint {
                BigUint::from(*self)
            }
        }
    };
}

native_word!(u32, 32);
native_word!(u64, 64);

/// The 256-bit extended word, kept reduced mod `2^256` at all times.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub(crate) struct U256(BigUint);

impl U256 {
    fn modulus() -> BigUint {
        BigUint::one() << 256
    }

    fn reduced(value: BigUint) -> Self {
        U256(value % Self::modulus())
    }
}

impl Word for U256 {
    const BITS: u32 = 256;

    fn zero() -> Self {
        U256(BigUint::zero())
    }

    fn one() -> Self {
        U256(BigUint::one())
    }

    fn max_value() -> Self {
        U256(Self::modulus() - BigUint::one())
    }

    fn wrapping_add(&self, rhs: &Self) -> Self {
        Self::reduced(&self.0 + &rhs.0)
    }

    fn wrapping_sub(&self, rhs: &Self) -> Self {
        Self::reduced(Self::modulus() + &self.0 - &rhs.0)
    }

    fn wrapping_mul(&self, rhs: &Self) -> Self {
        Self::reduced(&self.0 * &rhs.0)
    }

    fn from_biguint(value: &BigUint) -> Self {
        Self::reduced(value.clone())
    }

    fn to_biguint(&self) -> BigUint {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use num_traits::One;

    use super::Word;
    use super::U256;

    #[test]
    fn native_words_reduce_on_conversion() {
        let big = (BigUint::one() << 40u32) + BigUint::from(7u32);
        assert_eq!(u32::from_biguint(&big), 7);
        assert_eq!(u64::from_biguint(&big), (1u64 << 40) + 7);
    }

    #[test]
    fn extended_word_wraps_mod_2_to_256() {
        let max = U256::max_value();
        assert_eq!(max.wrapping_add(&U256::one()), U256::zero());
        assert_eq!(U256::zero().wrapping_sub(&U256::one()), max);
    }
}
