use thiserror::Error;

/// Errors raised while building or solving structure graphs.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("encountered unsupported expression {0} during structure graph construction")]
    UnsupportedExpression(String),

    #[error("strategy invariant violation: {0}")]
    StrategyInvariantViolation(String),

    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}
