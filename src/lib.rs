//! A theory propagation core for fixed-width bit-vector constraints.
//!
//! The crate tracks, for each problem variable, the set of values it can still take, and routes
//! polynomial equality/ordering constraints onto per-bit-width feasibility engines. It is meant
//! to sit inside a larger search: the surrounding solver registers constraints once, activates
//! them with a polarity as the search asserts their literals, asks for feasibility verdicts and
//! candidate values, and backtracks through push/pop brackets that restore all internal state
//! exactly.
//!
//! The two propagation pillars are:
//! - the *linear constraint router* ([`TheorySolver::register`]/[`TheorySolver::activate`]/
//!   [`TheorySolver::check`]), which linearizes polynomials over interned monomials and keeps
//!   bounds, definition rows and inequality edges in per-width engines;
//! - the *viable domain tracker* ([`TheorySolver::intersect_equality`],
//!   [`TheorySolver::intersect_ordering`], [`TheorySolver::exclude_value`] and the query
//!   surface), which narrows wrap-around value intervals and falls back to exact decision
//!   diagrams when intervals cannot express a domain.
//!
//! Conflicts (an empty domain, an infeasible width partition) are reported synchronously through
//! an injected [`ConflictHandler`].

pub mod asserts;

mod basic_types;
mod constraint;
mod dd;
mod fixplex;
mod interval;
mod linear_solver;
mod polynomial;
mod solver;
mod trail;
mod viable;

pub use basic_types::BoolVar;
pub use basic_types::FindResult;
pub use basic_types::NarrowOutcome;
pub use basic_types::Pvar;
pub use basic_types::SolveStatus;
pub use basic_types::SolverError;
pub use constraint::Constraint;
pub use constraint::ConstraintKind;
pub use polynomial::Polynomial;
pub use polynomial::Term;
pub use solver::Conflict;
pub use solver::ConflictHandler;
pub use solver::TheorySolver;
