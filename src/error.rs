//! Error types for the whole-body controller.

use thiserror::Error;

/// Errors raised by certificate construction and per-tick control.
///
/// Both classes are fatal by design: a missing certificate means no
/// stability guarantee exists, and a failed tick must not be papered
/// over with a stale or zero torque.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The error-dynamics pair $(F, G)$ is not stabilizable, so no
    /// stabilizing Riccati solution exists for the chosen weights.
    #[error("error-dynamics pair (F, G) is not stabilizable for the chosen weights")]
    NotStabilizable,

    /// The Riccati solution came back non-positive-definite (numerical
    /// failure of the iterative solver).
    #[error("Riccati solution is not positive-definite (min eigenvalue {0})")]
    IndefiniteCertificate(f64),

    /// The per-tick QP did not reach an optimal solution. Carries the
    /// solver status for the supervisor; the caller must treat this as
    /// a safety event, not retry with the same inputs.
    #[error("whole-body QP solve failed: {0}")]
    SolveFailed(String),

    /// A LAPACK-backed computation failed.
    #[error("linear algebra error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
}
