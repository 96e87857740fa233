mod error;
mod find_result;
mod solve_status;
mod variables;

pub use error::SolverError;
pub use find_result::FindResult;
pub use find_result::NarrowOutcome;
pub use solve_status::SolveStatus;
pub use variables::BoolVar;
pub use variables::Pvar;
pub(crate) use variables::Var;
