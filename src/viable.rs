//! Viable value domains, one per problem variable.
//!
//! A domain starts as the full range `[0, 2^w)` and only narrows within a push/pop bracket.
//! Cheap interval reasoning handles the common constraint shapes; when it cannot, endpoint
//! narrowing with a small budget is tried, and as a last resort the domain switches to an exact
//! decision-diagram representation built from cached constraint templates.
//!
//! Every mutation stores the whole prior domain object on a trail, so popping restores the exact
//! representation, interval or diagram. The template cache is the one piece of state exempt from
//! push/pop; it is shared across variables and evicted by activity when it grows too large.

use fnv::FnvHashMap;
use log::debug;
use log::trace;
use num_bigint::BigUint;
use num_traits::One;
use num_traits::Zero;

use crate::basic_types::FindResult;
use crate::basic_types::NarrowOutcome;
use crate::basic_types::Pvar;
use crate::dd::fdd::Fdd;
use crate::dd::Bdd;
use crate::dd::NodeRef;
use crate::quokka_assert_simple;
use crate::trail::Trail;

/// Endpoint-narrowing steps allowed per constraint before falling back to diagrams.
const NARROW_BUDGET: u32 = 10;

/// Template cache size that triggers activity-based eviction.
const CACHE_CAPACITY: usize = 1024;

#[derive(Clone, PartialEq, Eq, Debug)]
enum DomainRepr {
    Free,
    /// The wrap-around interval `[lo, hi)`; `hi == 0` extends to the top of the range. Interval
    /// domains never wrap: either `lo < hi` or `hi == 0`.
    Range { lo: BigUint, hi: BigUint },
    Empty,
    Diagram(NodeRef),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct ViableSet {
    num_bits: u32,
    repr: DomainRepr,
}

impl ViableSet {
    fn free(num_bits: u32) -> Self {
        ViableSet {
            num_bits,
            repr: DomainRepr::Free,
        }
    }

    fn max_value(&self) -> BigUint {
        (BigUint::one() << self.num_bits) - BigUint::one()
    }

    fn is_empty(&self) -> bool {
        matches!(self.repr, DomainRepr::Empty)
    }

    /// `(lo, hi)` of the interval representations, with `Free` as `(0, 0)`. `None` for empty and
    /// diagram domains, which interval reasoning must not touch.
    fn interval_bounds(&self) -> Option<(BigUint, BigUint)> {
        match &self.repr {
            DomainRepr::Free => Some((BigUint::zero(), BigUint::zero())),
            DomainRepr::Range { lo, hi } => Some((lo.clone(), hi.clone())),
            DomainRepr::Empty | DomainRepr::Diagram(_) => None,
        }
    }

    /// The least value of an interval domain.
    fn interval_lo(&self) -> Option<BigUint> {
        self.interval_bounds().map(|(lo, _)| lo)
    }

    /// The greatest value of an interval domain.
    fn interval_last(&self) -> Option<BigUint> {
        let (_, hi) = self.interval_bounds()?;
        if hi.is_zero() {
            Some(self.max_value())
        } else {
            Some(hi - BigUint::one())
        }
    }

    fn contains_interval(&self, n: &BigUint) -> bool {
        match &self.repr {
            DomainRepr::Free => true,
            DomainRepr::Empty => false,
            DomainRepr::Range { lo, hi } => {
                if lo < hi {
                    lo <= n && n < hi
                } else {
                    lo <= n || n < hi
                }
            }
            DomainRepr::Diagram(_) => {
                unreachable!("diagram domains are queried through the manager")
            }
        }
    }

    fn is_singleton(&self) -> bool {
        match self.interval_bounds() {
            Some((lo, hi)) => {
                &lo + 1u32 == hi || (hi.is_zero() && lo == self.max_value())
            }
            None => false,
        }
    }

    /// Constrain to `x >= b`.
    fn set_lo(&mut self, b: BigUint) {
        let Some((lo, hi)) = self.interval_bounds() else {
            return;
        };
        if !hi.is_zero() && hi <= b {
            self.repr = DomainRepr::Empty;
        } else if matches!(self.repr, DomainRepr::Free) {
            if !b.is_zero() {
                self.repr = DomainRepr::Range {
                    lo: b,
                    hi: BigUint::zero(),
                };
            }
        } else if lo < b {
            self.repr = DomainRepr::Range { lo: b, hi };
        }
    }

    /// Constrain to `x <= d`.
    fn set_hi(&mut self, d: BigUint) {
        let Some((lo, hi)) = self.interval_bounds() else {
            return;
        };
        if d == self.max_value() {
            return;
        }
        if lo > d {
            self.repr = DomainRepr::Empty;
            return;
        }
        let new_hi = &d + 1u32;
        if hi.is_zero() || new_hi < hi {
            self.repr = DomainRepr::Range { lo, hi: new_hi };
        }
    }

    /// Constrain to `x == value` exactly.
    fn intersect_fixed(&mut self, value: BigUint) {
        if !self.contains_interval(&value) {
            self.repr = DomainRepr::Empty;
            return;
        }
        let hi = if value == self.max_value() {
            BigUint::zero()
        } else {
            &value + 1u32
        };
        self.repr = DomainRepr::Range { lo: value, hi };
    }

    /// Remove `value` when an interval can express the result: endpoint removals and the
    /// singleton case. Returns `false` for interior removals, which need the diagram form.
    fn intersect_diff(&mut self, value: &BigUint) -> bool {
        let Some((lo, hi)) = self.interval_bounds() else {
            return true;
        };
        if !self.contains_interval(value) {
            return true;
        }
        if self.is_singleton() {
            self.repr = DomainRepr::Empty;
            return true;
        }
        let max = self.max_value();
        if *value == lo {
            self.repr = DomainRepr::Range {
                lo: value + 1u32,
                hi,
            };
            true
        } else if !hi.is_zero() && value + 1u32 == hi {
            self.repr = DomainRepr::Range {
                lo,
                hi: value.clone(),
            };
            true
        } else if hi.is_zero() && *value == max {
            self.repr = DomainRepr::Range { lo, hi: max };
            true
        } else {
            false
        }
    }

    /// Shift the interval endpoints past values failing `eval`, spending at most `budget` steps.
    /// Values between the endpoints are never inspected; the result over-approximates.
    fn narrow(&mut self, eval: &dyn Fn(&BigUint) -> bool, budget: &mut u32) {
        while *budget > 0 {
            let Some(lo) = self.interval_lo() else {
                return;
            };
            if eval(&lo) {
                break;
            }
            *budget -= 1;
            if lo == self.max_value() {
                self.repr = DomainRepr::Empty;
                return;
            }
            self.set_lo(&lo + 1u32);
        }
        while *budget > 0 {
            let Some(last) = self.interval_last() else {
                return;
            };
            if eval(&last) {
                break;
            }
            *budget -= 1;
            if last.is_zero() {
                self.repr = DomainRepr::Empty;
                return;
            }
            self.set_hi(last - BigUint::one());
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum TemplateOp {
    Eq,
    Ule,
}

/// Constraint templates are per-shape, not per-variable: `a*x + b (op) c*x + d` at one width.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct TemplateKey {
    op: TemplateOp,
    width: u32,
    a: BigUint,
    b: BigUint,
    c: BigUint,
    d: BigUint,
}

#[derive(Debug)]
struct CacheEntry {
    repr: NodeRef,
    activity: u32,
}

#[derive(Clone, Debug)]
enum ViableUndo {
    VarAdded,
    DomainChanged(Pvar, ViableSet),
}

#[derive(Default, Debug)]
pub(crate) struct Viable {
    bdd: Bdd,
    /// One bit view per distinct width, created lazily.
    bits: FnvHashMap<u32, Fdd>,
    domains: Vec<ViableSet>,
    templates: FnvHashMap<TemplateKey, CacheEntry>,
    trail: Trail<ViableUndo>,
}

impl Viable {
    pub(crate) fn new_variable(&mut self, width: u32) {
        self.domains.push(ViableSet::free(width));
        self.trail.push(ViableUndo::VarAdded);
    }

    pub(crate) fn num_bits(&self, v: Pvar) -> u32 {
        self.domains[v.index()].num_bits
    }

    fn modulus(width: u32) -> BigUint {
        BigUint::one() << width
    }

    /// Store the prior domain so a pop restores it bit for bit.
    fn save(&mut self, v: Pvar) {
        let prior = self.domains[v.index()].clone();
        self.trail.push(ViableUndo::DomainChanged(v, prior));
    }

    fn ensure_bits(&mut self, width: u32) {
        if !self.bits.contains_key(&width) {
            let fdd = Fdd::new(&self.bdd, width);
            let _ = self.bits.insert(width, fdd);
        }
    }

    /// The diagram of the polarized template, computed once per shape and cached. Eviction
    /// halves activities and drops the cold entries.
    fn template(
        &mut self,
        op: TemplateOp,
        width: u32,
        a: &BigUint,
        b: &BigUint,
        c: &BigUint,
        d: &BigUint,
    ) -> NodeRef {
        let key = TemplateKey {
            op,
            width,
            a: a.clone(),
            b: b.clone(),
            c: c.clone(),
            d: d.clone(),
        };
        if let Some(entry) = self.templates.get_mut(&key) {
            entry.activity += 1;
            return entry.repr;
        }
        trace!("template miss: {key:?}");
        self.ensure_bits(width);
        let fdd = &self.bits[&width];
        let repr = match op {
            TemplateOp::Eq => {
                let lhs = fdd.affine(&self.bdd, a, b);
                fdd.eq_zero(&self.bdd, &lhs)
            }
            TemplateOp::Ule => {
                let lhs = fdd.affine(&self.bdd, a, b);
                let rhs = fdd.affine(&self.bdd, c, d);
                fdd.ule(&self.bdd, &lhs, &rhs)
            }
        };
        if self.templates.len() >= CACHE_CAPACITY {
            debug!("evicting cold constraint templates");
            self.templates.retain(|_, entry| {
                entry.activity /= 2;
                entry.activity > 0
            });
        }
        let _ = self.templates.insert(key, CacheEntry { repr, activity: 1 });
        repr
    }

    /// The diagram denoting the same set as an interval domain.
    fn interval_node(&self, set: &ViableSet) -> NodeRef {
        let fdd = &self.bits[&set.num_bits];
        match &set.repr {
            DomainRepr::Free => self.bdd.one(),
            DomainRepr::Empty => self.bdd.zero(),
            DomainRepr::Diagram(node) => *node,
            DomainRepr::Range { lo, hi } => {
                if hi.is_zero() {
                    fdd.geq_const(&self.bdd, lo)
                } else {
                    let below = fdd.leq_const(&self.bdd, &(hi - BigUint::one()));
                    if lo.is_zero() {
                        below
                    } else if lo < hi {
                        self.bdd.apply_and(fdd.geq_const(&self.bdd, lo), below)
                    } else {
                        self.bdd.apply_or(fdd.geq_const(&self.bdd, lo), below)
                    }
                }
            }
        }
    }

    fn normalized(&self, node: NodeRef) -> DomainRepr {
        if self.bdd.is_zero(node) {
            DomainRepr::Empty
        } else if self.bdd.is_one(node) {
            DomainRepr::Free
        } else {
            DomainRepr::Diagram(node)
        }
    }

    /// Replace the domain with `domain ∧ node`, in diagram form.
    fn conjoin(&mut self, v: Pvar, node: NodeRef) {
        let current = self.interval_node(&self.domains[v.index()]);
        let conjoined = self.bdd.apply_and(current, node);
        self.domains[v.index()].repr = self.normalized(conjoined);
    }

    /// Intersect the domain of `v` with `a*v + b == 0` (or its negation).
    pub(crate) fn intersect_eq(
        &mut self,
        a: &BigUint,
        v: Pvar,
        b: &BigUint,
        is_positive: bool,
    ) -> NarrowOutcome {
        let width = self.num_bits(v);
        let modulus = Self::modulus(width);
        let a = a % &modulus;
        let b = b % &modulus;
        if self.domains[v.index()].is_empty() {
            return NarrowOutcome::Complete;
        }
        self.save(v);

        if a.is_zero() {
            // A constant constraint: empty the domain iff it does not hold.
            if b.is_zero() != is_positive {
                self.domains[v.index()].repr = DomainRepr::Empty;
            }
            return NarrowOutcome::Complete;
        }

        if matches!(self.domains[v.index()].repr, DomainRepr::Diagram(_)) {
            let t = self.template(TemplateOp::Eq, width, &a, &b, &BigUint::zero(), &BigUint::zero());
            let polarized = if is_positive { t } else { self.bdd.apply_not(t) };
            self.conjoin(v, polarized);
            return NarrowOutcome::Complete;
        }

        if a.bit(0) {
            // Odd coefficients are invertible: the equality pins a single point.
            let inverse = mod_inverse(&a, width);
            let value = (inverse * ((&modulus - &b) % &modulus)) % &modulus;
            let domain = &mut self.domains[v.index()];
            if is_positive {
                domain.intersect_fixed(value);
            } else if !domain.intersect_diff(&value) {
                // Interior removal: go exact.
                self.ensure_bits(width);
                let fdd = &self.bits[&width];
                let excluded = self.bdd.apply_not(fdd.eq_const(&self.bdd, &value));
                self.conjoin(v, excluded);
            }
            return NarrowOutcome::Complete;
        }

        // Even, non-invertible coefficient: narrow the endpoints, and compute the exact diagram
        // when the budget runs out.
        let mut budget = NARROW_BUDGET;
        {
            let modulus = modulus.clone();
            let a = a.clone();
            let b = b.clone();
            let eval = move |x: &BigUint| is_positive == ((&a * x + &b) % &modulus).is_zero();
            self.domains[v.index()].narrow(&eval, &mut budget);
        }
        if self.domains[v.index()].is_empty() {
            return NarrowOutcome::Complete;
        }
        if budget == 0 {
            debug!("narrowing budget exhausted on {v}, switching to diagram form");
            let t = self.template(TemplateOp::Eq, width, &a, &b, &BigUint::zero(), &BigUint::zero());
            let polarized = if is_positive { t } else { self.bdd.apply_not(t) };
            self.conjoin(v, polarized);
            return NarrowOutcome::Complete;
        }
        NarrowOutcome::Incomplete
    }

    /// Intersect the domain of `v` with `a*v + b <= c*v + d` (or its negation).
    pub(crate) fn intersect_ule(
        &mut self,
        v: Pvar,
        a: &BigUint,
        b: &BigUint,
        c: &BigUint,
        d: &BigUint,
        is_positive: bool,
    ) -> NarrowOutcome {
        let width = self.num_bits(v);
        let modulus = Self::modulus(width);
        let a = a % &modulus;
        let b = b % &modulus;
        let c = c % &modulus;
        let d = d % &modulus;
        if self.domains[v.index()].is_empty() {
            return NarrowOutcome::Complete;
        }
        self.save(v);

        if matches!(self.domains[v.index()].repr, DomainRepr::Diagram(_)) {
            let t = self.template(TemplateOp::Ule, width, &a, &b, &c, &d);
            let polarized = if is_positive { t } else { self.bdd.apply_not(t) };
            self.conjoin(v, polarized);
            return NarrowOutcome::Complete;
        }

        let max = self.domains[v.index()].max_value();

        // a*v <= 0 with odd a is the equality v == 0.
        if a.bit(0) && b.is_zero() && c.is_zero() && d.is_zero() {
            let domain = &mut self.domains[v.index()];
            if is_positive {
                domain.intersect_fixed(BigUint::zero());
            } else {
                let handled = domain.intersect_diff(&BigUint::zero());
                quokka_assert_simple!(handled, "zero is never interior to an interval domain");
            }
            return NarrowOutcome::Complete;
        }

        // v <= d.
        if a.is_one() && b.is_zero() && c.is_zero() {
            let domain = &mut self.domains[v.index()];
            if is_positive {
                domain.set_hi(d);
            } else if d == max {
                domain.repr = DomainRepr::Empty;
            } else {
                domain.set_lo(&d + 1u32);
            }
            return NarrowOutcome::Complete;
        }

        // b <= v.
        if a.is_zero() && c.is_one() && d.is_zero() {
            let domain = &mut self.domains[v.index()];
            if is_positive {
                domain.set_lo(b);
            } else if b.is_zero() {
                domain.repr = DomainRepr::Empty;
            } else {
                domain.set_hi(b - BigUint::one());
            }
            return NarrowOutcome::Complete;
        }

        let mut budget = NARROW_BUDGET;
        {
            let modulus = modulus.clone();
            let (a, b, c, d) = (a.clone(), b.clone(), c.clone(), d.clone());
            let eval = move |x: &BigUint| {
                is_positive == ((&a * x + &b) % &modulus <= (&c * x + &d) % &modulus)
            };
            self.domains[v.index()].narrow(&eval, &mut budget);
        }
        if self.domains[v.index()].is_empty() {
            return NarrowOutcome::Complete;
        }
        if budget > 0 {
            return NarrowOutcome::Incomplete;
        }

        // Budget exhausted: derive a sound lower bound from the diagram. The matching upper
        // bound derivation is still open, so the outcome stays incomplete.
        debug!("narrowing budget exhausted on {v}, deriving a diagram lower bound");
        let t = self.template(TemplateOp::Ule, width, &a, &b, &c, &d);
        let polarized = if is_positive { t } else { self.bdd.apply_not(t) };
        let domain = &mut self.domains[v.index()];
        if let Some(lo) = domain.interval_lo() {
            let fdd = &self.bits[&width];
            match fdd.min_sat_geq(&self.bdd, polarized, &lo) {
                Some(bound) => domain.set_lo(bound),
                None => domain.repr = DomainRepr::Empty,
            }
        }
        NarrowOutcome::Incomplete
    }

    /// Remove a single value from the domain of `v`. No-op when the value is already excluded.
    pub(crate) fn set_ne(&mut self, v: Pvar, value: &BigUint) {
        let width = self.num_bits(v);
        let value = value % Self::modulus(width);
        if self.domains[v.index()].is_empty() {
            return;
        }
        if !self.is_viable(v, &value) {
            return;
        }
        self.save(v);
        if let DomainRepr::Diagram(node) = &self.domains[v.index()].repr {
            let node = *node;
            self.ensure_bits(width);
            let fdd = &self.bits[&width];
            let excluded = self.bdd.apply_not(fdd.eq_const(&self.bdd, &value));
            let remaining = self.bdd.apply_and(node, excluded);
            self.domains[v.index()].repr = self.normalized(remaining);
            return;
        }
        if !self.domains[v.index()].intersect_diff(&value) {
            trace!("interior removal of {value} from {v}, switching to diagram form");
            self.ensure_bits(width);
            let fdd = &self.bits[&width];
            let excluded = self.bdd.apply_not(fdd.eq_const(&self.bdd, &value));
            self.conjoin(v, excluded);
        }
    }

    pub(crate) fn has_viable(&self, v: Pvar) -> bool {
        !self.domains[v.index()].is_empty()
    }

    pub(crate) fn is_viable(&self, v: Pvar, value: &BigUint) -> bool {
        let domain = &self.domains[v.index()];
        let value = value % Self::modulus(domain.num_bits);
        match &domain.repr {
            DomainRepr::Diagram(node) => {
                let width = domain.num_bits;
                self.bdd
                    .evaluate(*node, |variable| value.bit(u64::from(width - variable)))
            }
            _ => domain.contains_interval(&value),
        }
    }

    /// A viable value for `v`, preferring `hint` (reduced mod `2^w`) when it is still admitted.
    pub(crate) fn find_viable(&self, v: Pvar, hint: &BigUint) -> FindResult {
        let domain = &self.domains[v.index()];
        let hint = hint % Self::modulus(domain.num_bits);
        match &domain.repr {
            DomainRepr::Empty => FindResult::Empty,
            DomainRepr::Free | DomainRepr::Range { .. } => {
                let value = if domain.contains_interval(&hint) {
                    hint
                } else {
                    domain
                        .interval_lo()
                        .expect("interval domains expose a low endpoint")
                };
                if domain.is_singleton() {
                    FindResult::Singleton(value)
                } else {
                    FindResult::Multiple(value)
                }
            }
            DomainRepr::Diagram(node) => {
                let fdd = &self.bits[&domain.num_bits];
                let min = fdd
                    .min_sat(&self.bdd, *node)
                    .expect("diagram domains are normalized away from the zero terminal");
                let value = if self.is_viable(v, &hint) {
                    hint
                } else {
                    min.clone()
                };
                if fdd.max_sat(&self.bdd, *node).as_ref() == Some(&min) {
                    FindResult::Singleton(value)
                } else {
                    FindResult::Multiple(value)
                }
            }
        }
    }

    pub(crate) fn push(&mut self) {
        self.trail.mark();
    }

    pub(crate) fn pop(&mut self, n: usize) {
        let mut trail = std::mem::take(&mut self.trail);
        trail.pop_levels(n, |op| match op {
            ViableUndo::VarAdded => {
                let _ = self.domains.pop();
            }
            ViableUndo::DomainChanged(v, set) => self.domains[v.index()] = set,
        });
        self.trail = trail;
    }

    #[cfg(test)]
    fn num_templates(&self) -> usize {
        self.templates.len()
    }
}

/// The multiplicative inverse of an odd `a` modulo `2^width`, by lifting the trivial inverse
/// mod 2 one doubling of precision at a time.
fn mod_inverse(a: &BigUint, width: u32) -> BigUint {
    quokka_assert_simple!(a.bit(0), "only odd residues are invertible mod 2^w");
    let modulus = BigUint::one() << width;
    let two = BigUint::from(2u32);
    let mut inverse = BigUint::one();
    let mut precision = 1u32;
    while precision < width {
        let product = (a * &inverse) % &modulus;
        inverse = (&inverse * ((&two + &modulus - product) % &modulus)) % &modulus;
        precision *= 2;
    }
    inverse
}
