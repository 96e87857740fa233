//! The facade tying the subsystems together.
//!
//! [`TheorySolver`] owns the linear constraint router and the viable domain tracker, keeps the
//! per-variable value assignments used as search hints, and reports conflicts through an
//! injected [`ConflictHandler`]. The handler is invoked synchronously, at the point the conflict
//! is detected, and at most once per conflict.
//!
//! Widths the router has no engine for (anything other than 32, 64 and 256) are still fully
//! tracked by the viable side; value and bound notifications simply skip the router there.
//! Constraint registration, which must build rows inside an engine, stays loud and fails with
//! [`SolverError::UnsupportedWidth`].

use std::fmt::Debug;
use std::fmt::Formatter;

use fnv::FnvHashSet;
use log::debug;
use num_bigint::BigUint;
use num_traits::Zero;

use crate::basic_types::BoolVar;
use crate::basic_types::FindResult;
use crate::basic_types::NarrowOutcome;
use crate::basic_types::Pvar;
use crate::basic_types::SolveStatus;
use crate::basic_types::SolverError;
use crate::constraint::Constraint;
use crate::linear_solver::LinearSolver;
use crate::trail::Trail;
use crate::viable::Viable;

/// What went wrong, as reported to the [`ConflictHandler`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Conflict {
    /// A variable has no viable values left.
    EmptyDomain(Pvar),
    /// A bit-width partition of the linear engines admits no joint assignment.
    InfeasiblePartition(u32),
}

/// Injected capability notified when propagation derives a conflict. Called synchronously from
/// within the mutating operation, never deferred.
pub trait ConflictHandler {
    fn on_conflict(&mut self, conflict: Conflict);
}

#[derive(Clone, Debug)]
enum SolverUndo {
    VarAdded,
    ValueSet(Pvar, BigUint),
}

pub struct TheorySolver {
    /// Current value assignment per variable, used as the hint for value queries.
    values: Vec<BigUint>,
    viable: Viable,
    linear: LinearSolver,
    trail: Trail<SolverUndo>,
    conflict_handler: Box<dyn ConflictHandler>,
    /// Widths whose infeasibility has already been reported; cleared on pop so the handler fires
    /// once per conflict per bracket, not once per `check` call.
    reported_partitions: FnvHashSet<u32>,
}

impl Debug for TheorySolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TheorySolver")
            .field("num_variables", &self.values.len())
            .finish()
    }
}

/// Widths the router can host an engine for; everything else is viable-tracker-only.
fn router_supports(width: u32) -> bool {
    matches!(width, 32 | 64 | 256)
}

impl TheorySolver {
    pub fn new(conflict_handler: Box<dyn ConflictHandler>) -> Self {
        TheorySolver {
            values: Vec::default(),
            viable: Viable::default(),
            linear: LinearSolver::default(),
            trail: Trail::default(),
            conflict_handler,
            reported_partitions: FnvHashSet::default(),
        }
    }

    /// Allocate a variable of the given bit width, with a full value domain and value 0.
    pub fn new_variable(&mut self, width: u32) -> Pvar {
        let pvar = Pvar::new(self.values.len() as u32);
        self.values.push(BigUint::zero());
        self.viable.new_variable(width);
        self.trail.push(SolverUndo::VarAdded);
        pvar
    }

    pub fn width(&self, v: Pvar) -> u32 {
        self.viable.num_bits(v)
    }

    /// Record a value assignment. The value becomes the hint for [`Self::find_value_near_hint`]
    /// and, where an engine exists for the width, a trailed bound in the router.
    pub fn set_value(&mut self, v: Pvar, value: BigUint) -> Result<(), SolverError> {
        let old = std::mem::replace(&mut self.values[v.index()], value.clone());
        self.trail.push(SolverUndo::ValueSet(v, old));
        let width = self.width(v);
        if router_supports(width) {
            self.linear.set_value(v, width, &value)?;
        }
        Ok(())
    }

    /// Constrain a variable to the wrap-around range `[lo, hi)` in the router.
    pub fn set_bound(&mut self, v: Pvar, lo: &BigUint, hi: &BigUint) -> Result<(), SolverError> {
        let width = self.width(v);
        if router_supports(width) {
            self.linear.set_bound(v, width, lo, hi)?;
        }
        Ok(())
    }

    /// Linearize a constraint once, under its boolean-literal identity.
    pub fn register(&mut self, c: &Constraint) -> Result<(), SolverError> {
        self.linear.register(c)
    }

    /// Assert a registered constraint with a polarity.
    pub fn activate(&mut self, c: &Constraint, is_positive: bool) -> Result<(), SolverError> {
        self.linear.activate(c, is_positive)
    }

    /// Feasibility of all engine partitions. An infeasible partition is reported to the conflict
    /// handler before returning, once per bracket even when `check` is called repeatedly.
    pub fn check(&mut self) -> SolveStatus {
        let (status, width) = self.linear.check();
        if status == SolveStatus::Infeasible {
            let width = width.expect("infeasible verdicts name their partition");
            if self.reported_partitions.insert(width) {
                self.conflict_handler
                    .on_conflict(Conflict::InfeasiblePartition(width));
            }
        }
        status
    }

    /// Best-effort value for a variable: the router's witness when one exists, otherwise the
    /// recorded assignment.
    pub fn value(&mut self, v: Pvar) -> BigUint {
        let width = self.width(v);
        self.linear
            .value(v, width)
            .unwrap_or_else(|| self.values[v.index()].clone())
    }

    pub fn unsat_core(&self) -> Result<Vec<BoolVar>, SolverError> {
        self.linear.unsat_core()
    }

    pub fn push(&mut self) {
        self.trail.mark();
        self.linear.push();
        self.viable.push();
    }

    pub fn pop(&mut self, n: usize) {
        self.reported_partitions.clear();
        self.linear.pop(n);
        self.viable.pop(n);
        let mut trail = std::mem::take(&mut self.trail);
        trail.pop_levels(n, |op| match op {
            SolverUndo::VarAdded => {
                let _ = self.values.pop();
            }
            SolverUndo::ValueSet(v, old) => self.values[v.index()] = old,
        });
        self.trail = trail;
    }

    pub fn has_viable(&self, v: Pvar) -> bool {
        self.viable.has_viable(v)
    }

    pub fn is_viable(&self, v: Pvar, value: &BigUint) -> bool {
        self.viable.is_viable(v, value)
    }

    /// A viable value for `v`, preferring the recorded assignment.
    pub fn find_value_near_hint(&self, v: Pvar) -> FindResult {
        self.viable.find_viable(v, &self.values[v.index()])
    }

    /// Remove one value from the domain of `v`.
    pub fn exclude_value(&mut self, v: Pvar, value: &BigUint) {
        let was_viable = self.viable.has_viable(v);
        self.viable.set_ne(v, value);
        self.notify_if_emptied(v, was_viable);
    }

    /// Intersect the domain of `v` with `a*v + b == 0` (or its negation).
    pub fn intersect_equality(
        &mut self,
        a: &BigUint,
        v: Pvar,
        b: &BigUint,
        is_positive: bool,
    ) -> NarrowOutcome {
        let was_viable = self.viable.has_viable(v);
        let outcome = self.viable.intersect_eq(a, v, b, is_positive);
        self.notify_if_emptied(v, was_viable);
        outcome
    }

    /// Intersect the domain of `v` with `a*v + b <= c*v + d` (or its negation).
    pub fn intersect_ordering(
        &mut self,
        v: Pvar,
        a: &BigUint,
        b: &BigUint,
        c: &BigUint,
        d: &BigUint,
        is_positive: bool,
    ) -> NarrowOutcome {
        let was_viable = self.viable.has_viable(v);
        let outcome = self.viable.intersect_ule(v, a, b, c, d, is_positive);
        self.notify_if_emptied(v, was_viable);
        outcome
    }

    /// Fire the conflict handler exactly on the transition into emptiness.
    fn notify_if_emptied(&mut self, v: Pvar, was_viable: bool) {
        if was_viable && !self.viable.has_viable(v) {
            debug!("domain of {v} became empty");
            self.conflict_handler.on_conflict(Conflict::EmptyDomain(v));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use num_bigint::BigUint;

    use super::Conflict;
    use super::ConflictHandler;
    use super::TheorySolver;
    use crate::basic_types::BoolVar;
    use crate::basic_types::FindResult;
    use crate::basic_types::SolveStatus;
    use crate::basic_types::SolverError;
    use crate::constraint::Constraint;
    use crate::polynomial::Polynomial;

    fn big(value: u64) -> BigUint {
        BigUint::from(value)
    }

    #[derive(Clone, Default)]
    struct RecordingHandler {
        conflicts: Rc<RefCell<Vec<Conflict>>>,
    }

    impl ConflictHandler for RecordingHandler {
        fn on_conflict(&mut self, conflict: Conflict) {
            self.conflicts.borrow_mut().push(conflict);
        }
    }

    fn solver_with_recorder() -> (TheorySolver, Rc<RefCell<Vec<Conflict>>>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let handler = RecordingHandler::default();
        let conflicts = Rc::clone(&handler.conflicts);
        (TheorySolver::new(Box::new(handler)), conflicts)
    }

    #[test]
    fn pinning_then_excluding_conflicts_exactly_once() {
        let (mut solver, conflicts) = solver_with_recorder();
        let v = solver.new_variable(4);

        // v + 13 == 0 (mod 16) pins v to 3.
        let _ = solver.intersect_equality(&big(1), v, &big(13), true);
        assert!(solver.is_viable(v, &big(3)));
        assert_eq!(solver.find_value_near_hint(v), FindResult::Singleton(big(3)));
        assert!(conflicts.borrow().is_empty());

        solver.exclude_value(v, &big(3));
        assert!(!solver.has_viable(v));
        assert_eq!(*conflicts.borrow(), vec![Conflict::EmptyDomain(v)]);

        // Further narrowing of an already-empty domain does not re-fire the handler.
        solver.exclude_value(v, &big(1));
        let _ = solver.intersect_equality(&big(1), v, &big(0), true);
        assert_eq!(conflicts.borrow().len(), 1);
        assert_eq!(solver.find_value_near_hint(v), FindResult::Empty);
    }

    #[test]
    fn bounded_domain_with_hints() {
        let (mut solver, conflicts) = solver_with_recorder();
        let v = solver.new_variable(8);

        // 2 <= v <= 5. The width has no router engine; the tracker carries the reasoning.
        let _ = solver.intersect_ordering(v, &big(1), &big(0), &big(0), &big(5), true);
        let _ = solver.intersect_ordering(v, &big(0), &big(2), &big(1), &big(0), true);

        solver.set_value(v, big(4)).unwrap();
        assert_eq!(solver.find_value_near_hint(v), FindResult::Multiple(big(4)));

        solver.set_value(v, big(9)).unwrap();
        assert_eq!(solver.find_value_near_hint(v), FindResult::Multiple(big(2)));
        assert_eq!(solver.value(v), big(9));
        assert!(conflicts.borrow().is_empty());
    }

    #[test]
    fn infeasible_partition_is_reported_with_its_width() {
        let (mut solver, conflicts) = solver_with_recorder();
        let v = solver.new_variable(64);

        let c = Constraint::unsigned_less_equal(
            BoolVar::new(0),
            Polynomial::variable(64, v),
            Polynomial::constant(64, big(5)),
        );
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
        solver.set_value(v, big(9)).unwrap();

        assert_eq!(solver.check(), SolveStatus::Infeasible);
        assert_eq!(
            *conflicts.borrow(),
            vec![Conflict::InfeasiblePartition(64)]
        );
    }

    #[test]
    fn repeated_checks_report_an_infeasible_partition_once() {
        let (mut solver, conflicts) = solver_with_recorder();
        let v = solver.new_variable(64);

        solver.push();
        let c = Constraint::unsigned_less_equal(
            BoolVar::new(0),
            Polynomial::variable(64, v),
            Polynomial::constant(64, big(5)),
        );
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
        solver.set_value(v, big(9)).unwrap();

        assert_eq!(solver.check(), SolveStatus::Infeasible);
        assert_eq!(solver.check(), SolveStatus::Infeasible);
        assert_eq!(conflicts.borrow().len(), 1);

        solver.pop(1);
        assert_eq!(solver.check(), SolveStatus::Feasible);

        // A conflict derived in a later bracket is reported again.
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
        solver.set_value(v, big(9)).unwrap();
        assert_eq!(solver.check(), SolveStatus::Infeasible);
        assert_eq!(conflicts.borrow().len(), 2);
    }

    #[test]
    fn push_pop_restores_registration_and_domains() {
        let (mut solver, _) = solver_with_recorder();
        let x = solver.new_variable(64);
        let y = solver.new_variable(64);

        solver.push();
        let p = Polynomial::new(64)
            .term(big(3), vec![x])
            .term(big(1), vec![y]);
        let c = Constraint::equality(BoolVar::new(0), p.clone());
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
        solver.set_value(x, big(1)).unwrap();
        let _ = solver.intersect_ordering(x, &big(1), &big(0), &big(0), &big(7), true);
        assert!(!solver.is_viable(x, &big(12)));
        solver.pop(1);

        assert!(solver.is_viable(x, &big(12)));
        assert_eq!(solver.value(x), big(0));
        assert_eq!(solver.check(), SolveStatus::Feasible);

        // Registration can be replayed after the pop.
        solver.register(&c).unwrap();
        solver.activate(&c, true).unwrap();
    }

    #[test]
    fn unsupported_width_registration_fails_loudly() {
        let (mut solver, _) = solver_with_recorder();
        let v = solver.new_variable(128);

        let p = Polynomial::new(128)
            .term(big(2), vec![v])
            .term(big(1), Vec::new());
        let result = solver.register(&Constraint::equality(BoolVar::new(0), p));
        assert!(matches!(result, Err(SolverError::UnsupportedWidth(128))));

        assert!(matches!(
            solver.unsat_core(),
            Err(SolverError::Unimplemented(_))
        ));
    }

    #[test]
    fn values_are_restored_on_pop() {
        let (mut solver, _) = solver_with_recorder();
        let v = solver.new_variable(32);

        solver.set_value(v, big(7)).unwrap();
        solver.push();
        solver.set_value(v, big(11)).unwrap();
        let w = solver.new_variable(32);
        assert_eq!(solver.width(w), 32);
        solver.pop(1);

        assert_eq!(solver.value(v), big(7));
        // The variable allocated inside the bracket is gone; the next allocation reuses its id.
        let w2 = solver.new_variable(16);
        assert_eq!(w.id, w2.id);
        assert_eq!(solver.width(w2), 16);
    }
}
