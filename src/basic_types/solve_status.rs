/// Verdict of a feasibility check, for one bit-width partition or for the aggregate over all of
/// them. `Unknown` indicates incomplete reasoning (e.g. inequality-graph propagation that did not
/// converge) and is never to be treated as `Infeasible`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SolveStatus {
    Feasible,
    Infeasible,
    Unknown,
}
