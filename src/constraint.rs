//! Constraint descriptions exchanged with the surrounding solver.
//!
//! A constraint is *registered* once, when created, under its boolean-literal identity; its
//! polarity is only known later, each time the search asserts the literal and the constraint is
//! *activated*.

use crate::basic_types::BoolVar;
use crate::polynomial::Polynomial;
use crate::quokka_assert_simple;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ConstraintKind {
    /// `p == 0`.
    Eq(Polynomial),
    /// Unsigned `lhs <= rhs`.
    Ule(Polynomial, Polynomial),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Constraint {
    bool_var: BoolVar,
    kind: ConstraintKind,
}

impl Constraint {
    pub fn equality(bool_var: BoolVar, p: Polynomial) -> Self {
        Constraint {
            bool_var,
            kind: ConstraintKind::Eq(p),
        }
    }

    pub fn unsigned_less_equal(bool_var: BoolVar, lhs: Polynomial, rhs: Polynomial) -> Self {
        quokka_assert_simple!(
            lhs.width() == rhs.width(),
            "both operands of an ordering constraint must share one bit width"
        );
        Constraint {
            bool_var,
            kind: ConstraintKind::Ule(lhs, rhs),
        }
    }

    pub fn bool_var(&self) -> BoolVar {
        self.bool_var
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn width(&self) -> u32 {
        match &self.kind {
            ConstraintKind::Eq(p) => p.width(),
            ConstraintKind::Ule(lhs, _) => lhs.width(),
        }
    }
}
