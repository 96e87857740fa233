//! Per-width feasibility engines.
//!
//! Each engine reasons about one bit-width partition: variable bounds over wrap-around
//! intervals, definition rows of the form `sum coeff_i * var_i == 0`, and directed inequality
//! edges. The router owns width selection and undo routing; the engine only has to keep its own
//! bound/edge history so that `restore_bound`/`restore_ineq` can be replayed in exact LIFO order
//! against the trail.
//!
//! `make_feasible` is deliberately incomplete: it performs bound propagation over the inequality
//! graph and checks fully-determined rows, answering `Unknown` whenever that reasoning cannot
//! decide the partition. It never mutates trailed state; the propagation works on a scratch copy
//! of the bounds.

pub(crate) mod word;

use std::fmt::Debug;

use fnv::FnvHashMap;
use log::trace;
use num_bigint::BigUint;

use crate::basic_types::SolveStatus;
use crate::basic_types::Var;
use crate::interval::ModInterval;
use crate::quokka_assert_simple;
use word::Word;

/// Rounds of inequality-edge propagation before the engine gives up with `Unknown`.
const MAX_PROPAGATION_ROUNDS: usize = 64;

/// The contract the linear constraint router consumes. Mutations arrive in trail order and the
/// `restore_*` counterparts in exact reverse order.
pub(crate) trait FixplexBase: Debug {
    /// Register the row `sum coeff_i * var_i == 0`; `v` identifies the row for deletion.
    fn add_row(&mut self, v: Var, terms: Vec<(Var, BigUint)>);
    fn del_row(&mut self, v: Var);
    /// Intersect `v`'s bounds with the wrap-around interval `[lo, hi)`, saving the previous
    /// bounds for `restore_bound`.
    fn set_bounds(&mut self, v: Var, lo: &BigUint, hi: &BigUint);
    fn set_value(&mut self, v: Var, value: &BigUint);
    /// Directed edge `v <= w`.
    fn add_le(&mut self, v: Var, w: Var);
    /// Directed edge `v < w`.
    fn add_lt(&mut self, v: Var, w: Var);
    /// Undo the most recent not-yet-restored `set_bounds`/`set_value`.
    fn restore_bound(&mut self);
    /// Undo the most recent not-yet-restored `add_le`/`add_lt`.
    fn restore_ineq(&mut self);
    fn make_feasible(&self) -> SolveStatus;
    /// Best-effort witness value for `v` under the current bounds.
    fn value(&self, v: Var) -> BigUint;
}

#[derive(Clone, Debug)]
struct Ineq {
    v: Var,
    w: Var,
    strict: bool,
}

#[derive(Debug)]
pub(crate) struct Fixplex<W> {
    bounds: FnvHashMap<Var, ModInterval<W>>,
    /// Previous bounds in assertion order; `None` records that the variable was unbounded.
    saved_bounds: Vec<(Var, Option<ModInterval<W>>)>,
    rows: FnvHashMap<Var, Vec<(Var, W)>>,
    ineqs: Vec<Ineq>,
}

impl<W: Word> Default for Fixplex<W> {
    fn default() -> Self {
        Fixplex {
            bounds: FnvHashMap::default(),
            saved_bounds: Vec::default(),
            rows: FnvHashMap::default(),
            ineqs: Vec::default(),
        }
    }
}

impl<W: Word> Fixplex<W> {
    fn intersect_bounds(&mut self, v: Var, interval: ModInterval<W>) {
        let old = self.bounds.get(&v).cloned();
        let new = match &old {
            Some(current) => current.intersect(&interval),
            None => interval,
        };
        self.saved_bounds.push((v, old));
        let _ = self.bounds.insert(v, new);
    }

    /// One pass over the inequality edges against the scratch bounds. Returns whether any bound
    /// changed, or `None` when an edge touches a wrapping interval the propagation cannot order.
    fn propagate_edges(&self, scratch: &mut FnvHashMap<Var, ModInterval<W>>) -> Option<bool> {
        let mut changed = false;
        for ineq in &self.ineqs {
            let v_bounds = scratch.get(&ineq.v).cloned().unwrap_or(ModInterval::Free);
            let w_bounds = scratch.get(&ineq.w).cloned().unwrap_or(ModInterval::Free);
            if v_bounds.is_empty() || w_bounds.is_empty() {
                continue;
            }
            let (v_lo, v_hi) = v_bounds.unwrapped()?;
            let (w_lo, w_hi) = w_bounds.unwrapped()?;

            // v <= w (or v < w): raise w's lower bound, cap v's upper bound.
            let (w_floor, v_ceil) = if ineq.strict {
                if v_lo.is_max() || w_hi.is_zero() {
                    let _ = scratch.insert(ineq.w, ModInterval::Empty);
                    return Some(true);
                }
                (
                    v_lo.wrapping_add(&W::one()),
                    w_hi.wrapping_sub(&W::one()),
                )
            } else {
                (v_lo.clone(), w_hi.clone())
            };
            if w_floor > w_lo {
                let _ = scratch.insert(
                    ineq.w,
                    ModInterval::from_inclusive(w_floor, w_hi.clone()),
                );
                changed = true;
            }
            if v_ceil < v_hi {
                let _ = scratch.insert(ineq.v, ModInterval::from_inclusive(v_lo, v_ceil));
                changed = true;
            }
        }
        Some(changed)
    }

    /// Check rows whose variables are all fixed; undetermined rows degrade the verdict.
    fn check_rows(&self, scratch: &FnvHashMap<Var, ModInterval<W>>) -> SolveStatus {
        let mut status = SolveStatus::Feasible;
        for (row_var, terms) in &self.rows {
            let mut sum = W::zero();
            let mut determined = true;
            for (var, coeff) in terms {
                match scratch.get(var).and_then(|b| b.fixed_value()) {
                    Some(value) => sum = sum.wrapping_add(&coeff.wrapping_mul(value)),
                    None => {
                        determined = false;
                        break;
                    }
                }
            }
            if !determined {
                status = SolveStatus::Unknown;
            } else if !sum.is_zero() {
                trace!("row {row_var} sums to a nonzero value under fixed bounds");
                return SolveStatus::Infeasible;
            }
        }
        status
    }
}

impl<W: Word> FixplexBase for Fixplex<W> {
    fn add_row(&mut self, v: Var, terms: Vec<(Var, BigUint)>) {
        let terms = terms
            .into_iter()
            .map(|(var, coeff)| (var, W::from_biguint(&coeff)))
            .collect();
        let previous = self.rows.insert(v, terms);
        quokka_assert_simple!(previous.is_none(), "row {v} is already defined");
    }

    fn del_row(&mut self, v: Var) {
        let removed = self.rows.remove(&v);
        quokka_assert_simple!(removed.is_some(), "cannot delete unknown row {v}");
    }

    fn set_bounds(&mut self, v: Var, lo: &BigUint, hi: &BigUint) {
        let interval = ModInterval::new(W::from_biguint(lo), W::from_biguint(hi));
        self.intersect_bounds(v, interval);
    }

    fn set_value(&mut self, v: Var, value: &BigUint) {
        let value = W::from_biguint(value);
        let hi = value.wrapping_add(&W::one());
        self.intersect_bounds(v, ModInterval::Range { lo: value, hi });
    }

    fn add_le(&mut self, v: Var, w: Var) {
        self.ineqs.push(Ineq {
            v,
            w,
            strict: false,
        });
    }

    fn add_lt(&mut self, v: Var, w: Var) {
        self.ineqs.push(Ineq { v, w, strict: true });
    }

    fn restore_bound(&mut self) {
        let (v, old) = self
            .saved_bounds
            .pop()
            .expect("restore_bound without a matching set_bounds");
        match old {
            Some(interval) => {
                let _ = self.bounds.insert(v, interval);
            }
            None => {
                let _ = self.bounds.remove(&v);
            }
        }
    }

    fn restore_ineq(&mut self) {
        let popped = self.ineqs.pop();
        quokka_assert_simple!(
            popped.is_some(),
            "restore_ineq without a matching add_le/add_lt"
        );
    }

    fn make_feasible(&self) -> SolveStatus {
        if self.bounds.values().any(|b| b.is_empty()) {
            return SolveStatus::Infeasible;
        }

        let mut scratch = self.bounds.clone();
        let mut rounds = 0;
        loop {
            match self.propagate_edges(&mut scratch) {
                // A wrapping interval participates in the inequality graph; this engine cannot
                // order it.
                None => return SolveStatus::Unknown,
                Some(false) => break,
                Some(true) => {
                    if scratch.values().any(|b| b.is_empty()) {
                        return SolveStatus::Infeasible;
                    }
                    rounds += 1;
                    if rounds >= MAX_PROPAGATION_ROUNDS {
                        trace!("inequality propagation did not converge");
                        return SolveStatus::Unknown;
                    }
                }
            }
        }

        self.check_rows(&scratch)
    }

    fn value(&self, v: Var) -> BigUint {
        self.bounds
            .get(&v)
            .and_then(|b| b.witness())
            .map(|w| w.to_biguint())
            .unwrap_or_default()
    }

}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::Fixplex;
    use super::FixplexBase;
    use crate::basic_types::SolveStatus;
    use crate::basic_types::Var;

    fn big(value: u64) -> BigUint {
        BigUint::from(value)
    }

    #[test]
    fn conflicting_bounds_are_infeasible() {
        let mut fp: Fixplex<u64> = Fixplex::default();
        let v = Var(0);
        fp.set_bounds(v, &big(0), &big(5));
        assert_eq!(fp.make_feasible(), SolveStatus::Feasible);

        fp.set_bounds(v, &big(10), &big(20));
        assert_eq!(fp.make_feasible(), SolveStatus::Infeasible);

        fp.restore_bound();
        assert_eq!(fp.make_feasible(), SolveStatus::Feasible);
    }

    #[test]
    fn inequality_edges_propagate_bounds() {
        let mut fp: Fixplex<u64> = Fixplex::default();
        let (v, w) = (Var(0), Var(1));
        fp.set_bounds(v, &big(10), &big(21));
        fp.set_bounds(w, &big(0), &big(10));
        // v <= w with lo(v) = 10 and hi(w) = 9 is contradictory.
        fp.add_le(v, w);
        assert_eq!(fp.make_feasible(), SolveStatus::Infeasible);

        fp.restore_ineq();
        assert_eq!(fp.make_feasible(), SolveStatus::Feasible);
    }

    #[test]
    fn strict_cycle_is_detected() {
        let mut fp: Fixplex<u32> = Fixplex::default();
        let (v, w) = (Var(0), Var(1));
        fp.set_bounds(v, &big(0), &big(20));
        fp.set_bounds(w, &big(0), &big(20));
        fp.add_lt(v, w);
        fp.add_lt(w, v);
        assert_eq!(fp.make_feasible(), SolveStatus::Infeasible);
    }

    #[test]
    fn fully_fixed_rows_are_checked_exactly() {
        let mut fp: Fixplex<u64> = Fixplex::default();
        let (x, y, v) = (Var(0), Var(1), Var(2));
        // v == 3x + y, encoded as 3x + y - v == 0.
        let minus_one = u64::MAX;
        fp.add_row(
            v,
            vec![(x, big(3)), (y, big(1)), (v, BigUint::from(minus_one))],
        );

        fp.set_value(x, &big(5));
        fp.set_value(y, &big(2));
        assert_eq!(fp.make_feasible(), SolveStatus::Unknown);

        fp.set_value(v, &big(17));
        assert_eq!(fp.make_feasible(), SolveStatus::Feasible);

        fp.restore_bound();
        fp.set_value(v, &big(18));
        assert_eq!(fp.make_feasible(), SolveStatus::Infeasible);
    }

    #[test]
    fn make_feasible_leaves_bounds_untouched() {
        let mut fp: Fixplex<u32> = Fixplex::default();
        let (v, w) = (Var(0), Var(1));
        fp.set_bounds(v, &big(5), &big(10));
        fp.add_le(v, w);
        let before = fp.value(w);
        assert_eq!(fp.make_feasible(), SolveStatus::Feasible);
        assert_eq!(fp.value(w), before);
    }
}
