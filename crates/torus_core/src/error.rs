use thiserror::Error;

/// Failure kinds surfaced by the library.
///
/// Callers can tell apart bad inputs (`Config`), solver non-convergence
/// (`Numerical`), and code paths that are deliberately not implemented for
/// the requested configuration (`Unsupported`). Numerical procedures are
/// deterministic for identical inputs, so none of these are retryable
/// without changing parameters.
#[derive(Debug, Error)]
pub enum DynamicsError {
    /// Invalid constructor input, malformed options, or a violated
    /// precondition such as a bracket without a sign change.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A root search, quadrature, or ODE step controller failed to converge
    /// within its iteration budget.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// The requested quantity has no implementation for this configuration.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DynamicsError>;
