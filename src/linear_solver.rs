//! Routing of polynomial constraints onto per-width feasibility engines.
//!
//! Registration is split from activation: `register` linearizes a constraint once, interning its
//! monomials and (when needed) a defining row, while `activate` later asserts the constraint
//! under a concrete polarity. Registration effects are trailed; the registration lookup table
//! itself is not, since re-registering under the same boolean literal simply overwrites the
//! entry.
//!
//! Engines exist per bit width and are created lazily. Widths 32 and 64 run on native words,
//! width 256 on the extended word; every other width is rejected.

use fnv::FnvHashMap;
use log::debug;
use num_bigint::BigUint;
use num_traits::One;
use num_traits::Zero;

use crate::basic_types::BoolVar;
use crate::basic_types::Pvar;
use crate::basic_types::SolveStatus;
use crate::basic_types::SolverError;
use crate::basic_types::Var;
use crate::constraint::Constraint;
use crate::constraint::ConstraintKind;
use crate::fixplex::word::U256;
use crate::fixplex::Fixplex;
use crate::fixplex::FixplexBase;
use crate::polynomial::Polynomial;
use crate::quokka_assert_simple;
use crate::trail::Trail;

/// A monomial is a product of problem variables at one width; the empty product stands for the
/// constant monomial of that width.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct MonoKey {
    width: u32,
    pvars: Vec<Pvar>,
}

#[derive(Clone, Debug)]
enum LinearUndo {
    VarAdded { width: u32 },
    MonoAdded,
    BoundSet { width: u32 },
    RowAdded { var: Var, width: u32 },
    IneqAdded { width: u32 },
}

#[derive(Default, Debug)]
pub(crate) struct LinearSolver {
    trail: Trail<LinearUndo>,
    /// Next fresh engine variable, per width.
    num_vars: FnvHashMap<u32, u32>,
    /// Interned monomials in creation order, mirroring `mono_vars` for undo.
    monomials: Vec<MonoKey>,
    mono_vars: FnvHashMap<MonoKey, Var>,
    /// Engines in creation order; `check` visits them in this order.
    engines: Vec<(u32, Box<dyn FixplexBase>)>,
    engine_index: FnvHashMap<u32, usize>,
    /// Engine variables a registered constraint asserts over: `(v, v)` for an equality,
    /// `(lhs, rhs)` for an ordering.
    activations: FnvHashMap<BoolVar, (Var, Var)>,
}

impl LinearSolver {
    fn engine(&mut self, width: u32) -> Result<&mut dyn FixplexBase, SolverError> {
        if !self.engine_index.contains_key(&width) {
            let engine: Box<dyn FixplexBase> = match width {
                32 => Box::new(Fixplex::<u32>::default()),
                64 => Box::new(Fixplex::<u64>::default()),
                256 => Box::new(Fixplex::<U256>::default()),
                _ => return Err(SolverError::UnsupportedWidth(width)),
            };
            debug!("created width-{width} feasibility engine");
            let _ = self.engine_index.insert(width, self.engines.len());
            self.engines.push((width, engine));
        }
        let index = self.engine_index[&width];
        Ok(self.engines[index].1.as_mut())
    }

    /// Engine access on the undo path, where lazy creation would be a logic error.
    fn existing_engine(&mut self, width: u32) -> &mut dyn FixplexBase {
        let index = self.engine_index[&width];
        self.engines[index].1.as_mut()
    }

    fn fresh_var(&mut self, width: u32) -> Var {
        let counter = self.num_vars.entry(width).or_insert(0);
        let var = Var(*counter);
        *counter += 1;
        self.trail.push(LinearUndo::VarAdded { width });
        var
    }

    /// The engine variable standing for a monomial, interned on first sight. The constant
    /// monomial is pinned to 1 so that rows mentioning it stay fully determined.
    fn mono_var(&mut self, width: u32, pvars: &[Pvar]) -> Result<Var, SolverError> {
        let key = MonoKey {
            width,
            pvars: pvars.to_vec(),
        };
        if let Some(&var) = self.mono_vars.get(&key) {
            return Ok(var);
        }
        let var = self.fresh_var(width);
        if pvars.is_empty() {
            self.engine(width)?.set_value(var, &BigUint::one());
            self.trail.push(LinearUndo::BoundSet { width });
        }
        let _ = self.mono_vars.insert(key.clone(), var);
        self.monomials.push(key);
        self.trail.push(LinearUndo::MonoAdded);
        Ok(var)
    }

    fn pvar_var(&mut self, width: u32, pvar: Pvar) -> Result<Var, SolverError> {
        self.mono_var(width, &[pvar])
    }

    /// Reduce a polynomial to one engine variable. A lone coefficient-1 monomial is its own
    /// variable; anything else gets a fresh variable `v` defined by the row `p - v == 0`, with
    /// `-1` encoded as `2^width - 1`.
    fn internalize(&mut self, p: &Polynomial) -> Result<Var, SolverError> {
        let width = p.width();
        if let Some(value) = p.as_value() {
            // A constant operand becomes a variable pinned to its value.
            let v = self.fresh_var(width);
            self.engine(width)?.set_value(v, &value);
            self.trail.push(LinearUndo::BoundSet { width });
            return Ok(v);
        }
        let mut terms: Vec<(Var, BigUint)> = Vec::new();
        for term in p.terms() {
            let var = self.mono_var(width, &term.pvars)?;
            terms.push((var, term.coeff.clone()));
        }
        if let [(var, coeff)] = terms.as_slice() {
            if coeff.is_one() {
                return Ok(*var);
            }
        }
        let v = self.fresh_var(width);
        let minus_one = (BigUint::one() << width) - BigUint::one();
        terms.push((v, minus_one));
        self.engine(width)?.add_row(v, terms);
        self.trail.push(LinearUndo::RowAdded { var: v, width });
        Ok(v)
    }

    /// Linearize a constraint and remember which engine variables its later activations talk
    /// about.
    pub(crate) fn register(&mut self, c: &Constraint) -> Result<(), SolverError> {
        let pair = match c.kind() {
            ConstraintKind::Eq(p) => {
                let v = self.internalize(p)?;
                (v, v)
            }
            ConstraintKind::Ule(lhs, rhs) => {
                let v = self.internalize(lhs)?;
                let w = self.internalize(rhs)?;
                (v, w)
            }
        };
        let _ = self.activations.insert(c.bool_var(), pair);
        Ok(())
    }

    /// Assert a registered constraint under the given polarity. Exactly one trail entry records
    /// the engine mutation.
    pub(crate) fn activate(
        &mut self,
        c: &Constraint,
        is_positive: bool,
    ) -> Result<(), SolverError> {
        quokka_assert_simple!(
            self.activations.contains_key(&c.bool_var()),
            "constraint {} activated before registration",
            c.bool_var()
        );
        match c.kind() {
            ConstraintKind::Eq(_) => self.assert_eq(c, is_positive),
            ConstraintKind::Ule(lhs, rhs) => self.assert_le(c, lhs, rhs, is_positive),
        }
    }

    /// `p == 0` pins the defining variable to zero; the negation only records "nonzero" as the
    /// wrap-around range `[1, 0)`.
    fn assert_eq(&mut self, c: &Constraint, is_positive: bool) -> Result<(), SolverError> {
        let (v, _) = self.activations[&c.bool_var()];
        let width = c.width();
        let fp = self.engine(width)?;
        if is_positive {
            fp.set_value(v, &BigUint::zero());
        } else {
            fp.set_bounds(v, &BigUint::one(), &BigUint::zero());
        }
        self.trail.push(LinearUndo::BoundSet { width });
        Ok(())
    }

    fn assert_le(
        &mut self,
        c: &Constraint,
        lhs: &Polynomial,
        rhs: &Polynomial,
        is_positive: bool,
    ) -> Result<(), SolverError> {
        let (v, w) = self.activations[&c.bool_var()];
        let width = c.width();
        let zero = BigUint::zero();
        let max = (BigUint::one() << width) - BigUint::one();

        if let Some(r) = rhs.as_value() {
            let fp = self.engine(width)?;
            if is_positive {
                // v <= r, as [0, r + 1) with r + 1 reduced mod 2^width.
                let hi = if r == max { zero.clone() } else { &r + 1u32 };
                fp.set_bounds(v, &zero, &hi);
            } else if r == max {
                return Err(SolverError::Unimplemented(
                    "conflict on negated comparison with the maximum value",
                ));
            } else {
                // r < v.
                fp.set_bounds(v, &(&r + 1u32), &zero);
            }
            self.trail.push(LinearUndo::BoundSet { width });
            return Ok(());
        }

        if let Some(l) = lhs.as_value() {
            let fp = self.engine(width)?;
            if is_positive {
                // w >= l.
                fp.set_bounds(w, &l, &zero);
            } else if l.is_zero() {
                return Err(SolverError::Unimplemented(
                    "conflict on negated comparison against zero",
                ));
            } else {
                // w < l.
                fp.set_bounds(w, &zero, &l);
            }
            self.trail.push(LinearUndo::BoundSet { width });
            return Ok(());
        }

        let fp = self.engine(width)?;
        if is_positive {
            fp.add_le(v, w);
        } else {
            fp.add_lt(w, v);
        }
        self.trail.push(LinearUndo::IneqAdded { width });
        Ok(())
    }

    /// Fix a problem variable to a value, as a trailed bound.
    pub(crate) fn set_value(
        &mut self,
        pvar: Pvar,
        width: u32,
        value: &BigUint,
    ) -> Result<(), SolverError> {
        let var = self.pvar_var(width, pvar)?;
        self.engine(width)?.set_value(var, value);
        self.trail.push(LinearUndo::BoundSet { width });
        Ok(())
    }

    /// Constrain a problem variable to the wrap-around range `[lo, hi)`.
    pub(crate) fn set_bound(
        &mut self,
        pvar: Pvar,
        width: u32,
        lo: &BigUint,
        hi: &BigUint,
    ) -> Result<(), SolverError> {
        let var = self.pvar_var(width, pvar)?;
        self.engine(width)?.set_bounds(var, lo, hi);
        self.trail.push(LinearUndo::BoundSet { width });
        Ok(())
    }

    /// Run the engines in creation order. The first infeasible partition decides the verdict;
    /// otherwise any engine answering `Unknown` degrades the result.
    pub(crate) fn check(&mut self) -> (SolveStatus, Option<u32>) {
        let mut result = SolveStatus::Feasible;
        for (width, engine) in &self.engines {
            match engine.make_feasible() {
                SolveStatus::Infeasible => {
                    debug!("width-{width} partition is infeasible");
                    return (SolveStatus::Infeasible, Some(*width));
                }
                SolveStatus::Unknown => result = SolveStatus::Unknown,
                SolveStatus::Feasible => {}
            }
        }
        (result, None)
    }

    /// Best-effort witness for a problem variable under the current bounds. `None` when the
    /// variable never reached an engine.
    pub(crate) fn value(&mut self, pvar: Pvar, width: u32) -> Option<BigUint> {
        let key = MonoKey {
            width,
            pvars: vec![pvar],
        };
        let var = *self.mono_vars.get(&key)?;
        let index = *self.engine_index.get(&width)?;
        Some(self.engines[index].1.value(var))
    }

    pub(crate) fn unsat_core(&self) -> Result<Vec<BoolVar>, SolverError> {
        Err(SolverError::Unimplemented("unsat core extraction"))
    }

    pub(crate) fn push(&mut self) {
        self.trail.mark();
    }

    pub(crate) fn pop(&mut self, n: usize) {
        let mut trail = std::mem::take(&mut self.trail);
        trail.pop_levels(n, |op| match op {
            LinearUndo::VarAdded { width } => {
                let counter = self
                    .num_vars
                    .get_mut(&width)
                    .expect("undo of a variable at a width that allocated none");
                *counter -= 1;
            }
            LinearUndo::MonoAdded => {
                let key = self
                    .monomials
                    .pop()
                    .expect("undo of a monomial with an empty intern stack");
                let _ = self.mono_vars.remove(&key);
            }
            LinearUndo::BoundSet { width } => self.existing_engine(width).restore_bound(),
            LinearUndo::RowAdded { var, width } => self.existing_engine(width).del_row(var),
            LinearUndo::IneqAdded { width } => self.existing_engine(width).restore_ineq(),
        });
        self.trail = trail;
    }

    #[cfg(test)]
    fn num_trail_entries(&self) -> usize {
        self.trail.num_entries()
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::LinearSolver;
    use crate::basic_types::BoolVar;
    use crate::basic_types::Pvar;
    use crate::basic_types::SolveStatus;
    use crate::basic_types::SolverError;
    use crate::constraint::Constraint;
    use crate::polynomial::Polynomial;

    fn big(value: u64) -> BigUint {
        BigUint::from(value)
    }

    #[test]
    fn monomials_are_interned_once() {
        let mut solver = LinearSolver::default();
        let x = Pvar::new(0);
        let b0 = BoolVar::new(0);
        let b1 = BoolVar::new(1);

        let p = Polynomial::variable(64, x);
        solver.register(&Constraint::equality(b0, p.clone())).unwrap();
        let entries = solver.num_trail_entries();

        // A second registration over the same lone monomial allocates nothing new.
        solver.register(&Constraint::equality(b1, p)).unwrap();
        assert_eq!(solver.num_trail_entries(), entries);
    }

    #[test]
    fn unsupported_widths_are_rejected() {
        let mut solver = LinearSolver::default();
        let x = Pvar::new(0);
        let p = Polynomial::new(128)
            .term(big(2), vec![x])
            .term(big(1), Vec::new());
        let result = solver.register(&Constraint::equality(BoolVar::new(0), p));
        assert!(matches!(result, Err(SolverError::UnsupportedWidth(128))));
    }

    #[test]
    fn equality_over_fixed_variables_is_decided() {
        let mut solver = LinearSolver::default();
        let (x, y) = (Pvar::new(0), Pvar::new(1));
        let b = BoolVar::new(0);

        // x + y == 0 (mod 2^64)
        let p = Polynomial::new(64).term(big(1), vec![x]).term(big(1), vec![y]);
        let c = Constraint::equality(b, p);
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();

        solver.push();
        solver.set_value(x, 64, &big(3)).unwrap();
        solver.set_value(y, 64, &BigUint::from(u64::MAX - 2)).unwrap();
        assert_eq!(solver.check().0, SolveStatus::Feasible);
        solver.pop(1);

        solver.set_value(x, 64, &big(3)).unwrap();
        solver.set_value(y, 64, &big(5)).unwrap();
        let (status, width) = solver.check();
        assert_eq!(status, SolveStatus::Infeasible);
        assert_eq!(width, Some(64));
    }

    #[test]
    fn constant_comparison_becomes_a_bound() {
        let mut solver = LinearSolver::default();
        let x = Pvar::new(0);
        let b = BoolVar::new(0);

        // x <= 5
        let c = Constraint::unsigned_less_equal(
            b,
            Polynomial::variable(32, x),
            Polynomial::constant(32, big(5)),
        );
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
        assert_eq!(solver.check().0, SolveStatus::Feasible);

        solver.push();
        solver.set_value(x, 32, &big(9)).unwrap();
        assert_eq!(solver.check().0, SolveStatus::Infeasible);
        solver.pop(1);

        solver.set_value(x, 32, &big(4)).unwrap();
        assert_eq!(solver.check().0, SolveStatus::Feasible);
        assert_eq!(solver.value(x, 32), Some(big(4)));
    }

    #[test]
    fn negated_comparison_with_the_top_value_is_reported() {
        let mut solver = LinearSolver::default();
        let x = Pvar::new(0);
        let c = Constraint::unsigned_less_equal(
            BoolVar::new(0),
            Polynomial::variable(32, x),
            Polynomial::constant(32, BigUint::from(u32::MAX)),
        );
        solver.register(&c).unwrap();
        let result = solver.activate(&c, false);
        assert!(matches!(result, Err(SolverError::Unimplemented(_))));
    }

    #[test]
    fn ordering_between_variables_uses_the_inequality_graph() {
        let mut solver = LinearSolver::default();
        let (x, y) = (Pvar::new(0), Pvar::new(1));

        // x <= y
        let c = Constraint::unsigned_less_equal(
            BoolVar::new(0),
            Polynomial::variable(64, x),
            Polynomial::variable(64, y),
        );
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();

        solver.set_value(x, 64, &big(10)).unwrap();
        solver.set_value(y, 64, &big(4)).unwrap();
        assert_eq!(solver.check().0, SolveStatus::Infeasible);
    }

    #[test]
    fn popping_unwinds_registration_effects() {
        let mut solver = LinearSolver::default();
        let (x, y) = (Pvar::new(0), Pvar::new(1));

        solver.push();
        // 3x + y == 0 forces a fresh variable and a defining row.
        let p = Polynomial::new(64).term(big(3), vec![x]).term(big(1), vec![y]);
        let c = Constraint::equality(BoolVar::new(0), p);
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
        assert!(solver.num_trail_entries() > 0);

        solver.pop(1);
        assert_eq!(solver.num_trail_entries(), 0);
        assert_eq!(solver.check().0, SolveStatus::Feasible);
    }

    #[test]
    fn unsat_core_is_not_yet_available() {
        let solver = LinearSolver::default();
        assert!(matches!(
            solver.unsat_core(),
            Err(SolverError::Unimplemented(_))
        ));
    }
}
