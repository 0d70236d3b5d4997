use thiserror::Error;

use peso_game::GraphError;
use peso_pbes::RewriteError;

/// Errors raised by the instantiation algorithms and the solve driver.
#[derive(Error, Debug)]
pub enum SolveError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("undefined propositional variable {0}")]
    UndefinedVariable(String),

    #[error("the limit of {0} generated BES equations has been exceeded")]
    EquationLimitExceeded(usize),

    #[error("invalid optimisation: {0}")]
    InvalidOptimisation(String),

    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}
