//! Constraint operands as opaque sums of monomials.
//!
//! The surrounding solver describes each operand as an ordered sequence of
//! `(coefficient, monomial)` pairs over problem variables, tagged with a fixed bit width. This
//! core only iterates the sequence; it never rewrites or normalizes the polynomial algebra
//! beyond reducing coefficients into `[0, 2^width)`.

use num_bigint::BigUint;
use num_traits::One;
use num_traits::Zero;

use crate::basic_types::Pvar;

/// One `coefficient * product-of-pvars` term. An empty product denotes the constant monomial.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Term {
    pub coeff: BigUint,
    pub pvars: Vec<Pvar>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Polynomial {
    width: u32,
    terms: Vec<Term>,
}

impl Polynomial {
    pub fn new(width: u32) -> Self {
        Polynomial {
            width,
            terms: Vec::new(),
        }
    }

    /// Append `coeff * pvars[0] * ... * pvars[n-1]`. The coefficient is reduced mod `2^width`;
    /// a vanishing coefficient drops the term.
    pub fn term(mut self, coeff: BigUint, pvars: Vec<Pvar>) -> Self {
        let coeff = coeff % (BigUint::one() << self.width);
        if !coeff.is_zero() {
            self.terms.push(Term { coeff, pvars });
        }
        self
    }

    pub fn constant(width: u32, value: BigUint) -> Self {
        Polynomial::new(width).term(value, Vec::new())
    }

    /// The polynomial `1 * v`.
    pub fn variable(width: u32, pvar: Pvar) -> Self {
        Polynomial::new(width).term(BigUint::one(), vec![pvar])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    /// The constant value of the polynomial, if it mentions no problem variable.
    pub fn as_value(&self) -> Option<BigUint> {
        match self.terms.as_slice() {
            [] => Some(BigUint::zero()),
            [term] if term.pvars.is_empty() => Some(term.coeff.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::Polynomial;
    use crate::basic_types::Pvar;

    #[test]
    fn coefficients_are_reduced_modulo_the_width() {
        let v = Pvar::new(0);
        let p = Polynomial::new(4).term(BigUint::from(19u32), vec![v]);
        let term = p.terms().next().unwrap();
        assert_eq!(term.coeff, BigUint::from(3u32));
    }

    #[test]
    fn constant_recognition() {
        assert_eq!(
            Polynomial::constant(8, BigUint::from(5u32)).as_value(),
            Some(BigUint::from(5u32))
        );
        assert_eq!(Polynomial::new(8).as_value(), Some(BigUint::from(0u32)));
        assert_eq!(Polynomial::variable(8, Pvar::new(1)).as_value(), None);
    }
}
