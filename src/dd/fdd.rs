//! Finite-domain layer over the diagram manager: a bit-vector variable of one fixed width,
//! encoded MSB-first so that value searches walk the diagram top-down.
//!
//! One instance exists per distinct bit width; the viable domain tracker instantiates them
//! lazily. All arithmetic is modulo `2^num_bits`.

use num_bigint::BigUint;
use num_traits::One;
use num_traits::Zero;

use super::Bdd;
use super::NodeRef;

#[derive(Debug)]
pub(crate) struct Fdd {
    num_bits: u32,
    /// Diagram variables for the bits of `x`, least-significant first. Bit `i` is decision
    /// variable `num_bits - i`, placing the most significant bit at the root.
    bits: Vec<NodeRef>,
}

impl Fdd {
    pub(crate) fn new(bdd: &Bdd, num_bits: u32) -> Self {
        let bits = (0..num_bits).map(|i| bdd.mk_var(num_bits - i)).collect();
        Fdd { num_bits, bits }
    }

    fn const_bits(&self, bdd: &Bdd, value: &BigUint) -> Vec<NodeRef> {
        (0..self.num_bits)
            .map(|i| {
                if value.bit(u64::from(i)) {
                    bdd.one()
                } else {
                    bdd.zero()
                }
            })
            .collect()
    }

    /// Ripple-carry addition of two bit vectors, discarding the final carry (mod `2^num_bits`).
    fn add_vectors(&self, bdd: &Bdd, lhs: &[NodeRef], rhs: &[NodeRef]) -> Vec<NodeRef> {
        let mut carry = bdd.zero();
        let mut sum = Vec::with_capacity(lhs.len());
        for (&a, &b) in lhs.iter().zip(rhs) {
            let a_xor_b = bdd.apply_xor(a, b);
            sum.push(bdd.apply_xor(a_xor_b, carry));
            let and_ab = bdd.apply_and(a, b);
            let and_carry = bdd.apply_and(carry, a_xor_b);
            carry = bdd.apply_or(and_ab, and_carry);
        }
        sum
    }

    /// The bits of `a * x + b` over the variable's bit encoding, via shift-and-add.
    pub(crate) fn affine(&self, bdd: &Bdd, a: &BigUint, b: &BigUint) -> Vec<NodeRef> {
        let mut result = self.const_bits(bdd, b);
        for shift in 0..self.num_bits {
            if !a.bit(u64::from(shift)) {
                continue;
            }
            // x << shift, truncated to num_bits.
            let mut shifted = vec![bdd.zero(); shift as usize];
            shifted.extend_from_slice(&self.bits[..(self.num_bits - shift) as usize]);
            result = self.add_vectors(bdd, &result, &shifted);
        }
        result
    }

    /// Unsigned `lhs <= rhs` over two bit vectors.
    pub(crate) fn ule(&self, bdd: &Bdd, lhs: &[NodeRef], rhs: &[NodeRef]) -> NodeRef {
        let mut le = bdd.one();
        for (&l, &r) in lhs.iter().zip(rhs) {
            let lt = bdd.apply_and(bdd.apply_not(l), r);
            let eq = bdd.apply_iff(l, r);
            le = bdd.apply_or(lt, bdd.apply_and(eq, le));
        }
        le
    }

    pub(crate) fn eq_zero(&self, bdd: &Bdd, bits: &[NodeRef]) -> NodeRef {
        bits.iter().fold(bdd.one(), |acc, &bit| {
            bdd.apply_and(acc, bdd.apply_not(bit))
        })
    }

    /// The indicator function of `x == value`.
    pub(crate) fn eq_const(&self, bdd: &Bdd, value: &BigUint) -> NodeRef {
        self.bits
            .iter()
            .enumerate()
            .fold(bdd.one(), |acc, (i, &bit)| {
                let literal = if value.bit(i as u64) {
                    bit
                } else {
                    bdd.apply_not(bit)
                };
                bdd.apply_and(acc, literal)
            })
    }

    pub(crate) fn geq_const(&self, bdd: &Bdd, value: &BigUint) -> NodeRef {
        let constant = self.const_bits(bdd, value);
        self.ule(bdd, &constant, &self.bits)
    }

    pub(crate) fn leq_const(&self, bdd: &Bdd, value: &BigUint) -> NodeRef {
        let constant = self.const_bits(bdd, value);
        self.ule(bdd, &self.bits, &constant)
    }

    /// Whether `value` is in the set denoted by `f`.
    pub(crate) fn contains(&self, bdd: &Bdd, f: NodeRef, value: &BigUint) -> bool {
        bdd.evaluate(f, |variable| value.bit(u64::from(self.num_bits - variable)))
    }

    /// The smallest value `>= start` in the set denoted by `f`, if one exists.
    pub(crate) fn min_sat_geq(&self, bdd: &Bdd, f: NodeRef, start: &BigUint) -> Option<BigUint> {
        self.search_min(bdd, f, 1, start, true)
    }

    /// The largest value `<= start` in the set denoted by `f`, if one exists.
    pub(crate) fn max_sat_leq(&self, bdd: &Bdd, f: NodeRef, start: &BigUint) -> Option<BigUint> {
        self.search_max(bdd, f, 1, start, true)
    }

    pub(crate) fn min_sat(&self, bdd: &Bdd, f: NodeRef) -> Option<BigUint> {
        self.min_sat_geq(bdd, f, &BigUint::zero())
    }

    pub(crate) fn max_sat(&self, bdd: &Bdd, f: NodeRef) -> Option<BigUint> {
        let top = (BigUint::one() << self.num_bits) - BigUint::one();
        self.max_sat_leq(bdd, f, &top)
    }

    /// Walk levels top-down (MSB first), preferring the 0-branch. While `tight`, the chosen
    /// prefix equals the corresponding prefix of `start`; leaving it through the 1-branch makes
    /// every completion larger, after which the cheapest completion wins.
    fn search_min(
        &self,
        bdd: &Bdd,
        f: NodeRef,
        level: u32,
        start: &BigUint,
        tight: bool,
    ) -> Option<BigUint> {
        if level > self.num_bits {
            return if bdd.is_one(f) {
                Some(BigUint::zero())
            } else {
                None
            };
        }
        let (f0, f1) = bdd.cofactors(f, level);
        let weight = u64::from(self.num_bits - level);
        let start_bit = start.bit(weight);
        let with_bit = |value: BigUint| value + (BigUint::one() << weight);
        if tight {
            if start_bit {
                self.search_min(bdd, f1, level + 1, start, true).map(with_bit)
            } else {
                self.search_min(bdd, f0, level + 1, start, true)
                    .or_else(|| {
                        self.search_min(bdd, f1, level + 1, start, false)
                            .map(with_bit)
                    })
            }
        } else {
            self.search_min(bdd, f0, level + 1, start, false)
                .or_else(|| {
                    self.search_min(bdd, f1, level + 1, start, false)
                        .map(with_bit)
                })
        }
    }

    fn search_max(
        &self,
        bdd: &Bdd,
        f: NodeRef,
        level: u32,
        start: &BigUint,
        tight: bool,
    ) -> Option<BigUint> {
        if level > self.num_bits {
            return if bdd.is_one(f) {
                Some(BigUint::zero())
            } else {
                None
            };
        }
        let (f0, f1) = bdd.cofactors(f, level);
        let weight = u64::from(self.num_bits - level);
        let start_bit = start.bit(weight);
        let with_bit = |value: BigUint| value + (BigUint::one() << weight);
        if tight {
            if start_bit {
                self.search_max(bdd, f1, level + 1, start, true)
                    .map(with_bit)
                    .or_else(|| self.search_max(bdd, f0, level + 1, start, false))
            } else {
                self.search_max(bdd, f0, level + 1, start, true)
            }
        } else {
            self.search_max(bdd, f1, level + 1, start, false)
                .map(with_bit)
                .or_else(|| self.search_max(bdd, f0, level + 1, start, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use num_traits::One;

    use super::Bdd;
    use super::Fdd;

    fn big(value: u64) -> BigUint {
        BigUint::from(value)
    }

    #[test]
    fn affine_comparison_matches_direct_modular_arithmetic() {
        let bdd = Bdd::default();
        let width = 4u32;
        let fdd = Fdd::new(&bdd, width);
        let modulus = 1u64 << width;

        // 3x + 2 <= 5x + 9 (mod 16)
        let lhs = fdd.affine(&bdd, &big(3), &big(2));
        let rhs = fdd.affine(&bdd, &big(5), &big(9));
        let le = fdd.ule(&bdd, &lhs, &rhs);

        for x in 0..modulus {
            let expected = (3 * x + 2) % modulus <= (5 * x + 9) % modulus;
            assert_eq!(fdd.contains(&bdd, le, &big(x)), expected, "x = {x}");
        }
    }

    #[test]
    fn eq_zero_of_even_coefficient_equality() {
        let bdd = Bdd::default();
        let width = 4u32;
        let fdd = Fdd::new(&bdd, width);
        let modulus = 1u64 << width;

        // 2x + 0 == 0 (mod 16) holds exactly for x in {0, 8}.
        let lhs = fdd.affine(&bdd, &big(2), &big(0));
        let eq = fdd.eq_zero(&bdd, &lhs);

        for x in 0..modulus {
            let expected = (2 * x) % modulus == 0;
            assert_eq!(fdd.contains(&bdd, eq, &big(x)), expected, "x = {x}");
        }
    }

    #[test]
    fn value_searches_walk_the_diagram() {
        let bdd = Bdd::default();
        let fdd = Fdd::new(&bdd, 4);

        // {3, 7, 12}
        let f = [3u64, 7, 12]
            .into_iter()
            .fold(bdd.zero(), |acc, v| {
                bdd.apply_or(acc, fdd.eq_const(&bdd, &big(v)))
            });

        assert_eq!(fdd.min_sat(&bdd, f), Some(big(3)));
        assert_eq!(fdd.max_sat(&bdd, f), Some(big(12)));
        assert_eq!(fdd.min_sat_geq(&bdd, f, &big(4)), Some(big(7)));
        assert_eq!(fdd.min_sat_geq(&bdd, f, &big(13)), None);
        assert_eq!(fdd.max_sat_leq(&bdd, f, &big(11)), Some(big(7)));
        assert_eq!(fdd.max_sat_leq(&bdd, f, &big(2)), None);
        assert_eq!(fdd.min_sat(&bdd, bdd.zero()), None);
    }

    #[test]
    fn bound_constraints_against_constants() {
        let bdd = Bdd::default();
        let fdd = Fdd::new(&bdd, 4);

        let between = bdd.apply_and(fdd.geq_const(&bdd, &big(2)), fdd.leq_const(&bdd, &big(5)));
        for x in 0u64..16 {
            assert_eq!(fdd.contains(&bdd, between, &big(x)), (2..=5).contains(&x));
        }
    }
}
