use thiserror::Error;

/// Fatal conditions surfaced by the theory core. Neither variant is ever folded into a
/// feasibility verdict; callers must handle them separately from [`SolveStatus`].
///
/// [`SolveStatus`]: crate::basic_types::SolveStatus
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum SolverError {
    /// The requested bit width has no concrete modular-arithmetic word representation. The
    /// operation is aborted; a different width is never substituted silently.
    #[error("bit-width {0} has no concrete word representation")]
    UnsupportedWidth(u32),

    /// A reasoning path that the core deliberately does not implement was reached, e.g. the
    /// wraparound-constant conflict cases or unsat-core extraction.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}
