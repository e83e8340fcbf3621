//! The offline Lyapunov stability certificate.
//!
//! The task-space tracking error $\tilde{x}$ obeys the double-integrator
//! template $\dot{\eta} = F\eta + G\nu$ with $\eta = [\tilde{x}; \dot{\tilde{x}}]$
//! and $\nu$ the task-space acceleration error. Solving the CARE for this
//! template yields $P \succ 0$ such that $V = \eta^\text{T} P \eta$ is a
//! control Lyapunov function with guaranteed decay rate
//! $\gamma = \lambda_\text{min}(Q) / \lambda_\text{max}(P)$.

use ndarray::{s, Array2, Axis};
use tracing::info;

use crate::error::ControlError;
use crate::riccati;

/// CARE integration step used at construction. The template's fastest
/// closed-loop mode sits near 10 rad/s, so 0.01 is well inside the Euler
/// stability region while converging in a few thousand iterations.
const CARE_DT: f64 = 0.01;
const CARE_TOL: f64 = 1.0e-9;
const CARE_ITER_MAX: usize = 200_000;

/// The constant stability certificate, computed once at controller
/// construction and immutable afterwards.
///
/// Built for the maximum task dimension (6 body coordinates plus 3 per
/// foot); [`LyapunovCertificate::reduced`] extracts the sub-certificate
/// for the task dimension active on a given tick.
#[derive(Debug, Clone)]
pub struct LyapunovCertificate {
    /// Error-dynamics state matrix, $2d \times 2d$.
    pub f_mat: Array2<f64>,
    /// Error-dynamics input matrix, $2d \times d$.
    pub g_mat: Array2<f64>,
    /// State penalty $Q = q_w I$.
    pub q_mat: Array2<f64>,
    /// Input penalty $R = r_w I$.
    pub r_mat: Array2<f64>,
    /// Stabilizing CARE solution, symmetric positive-definite.
    pub p_mat: Array2<f64>,
    /// Certified decay rate $\gamma > 0$.
    pub gamma: f64,
    task_dim: usize,
}

/// The slice of the certificate acting on the task coordinates live this
/// tick (dimension $d = 6 + 3 \cdot n_\text{swing}$).
///
/// Valid because $Q$ and $R$ are scalar multiples of the identity: the
/// CARE decouples coordinate-wise, $P$ is built from scalar-times-identity
/// blocks, and the leading $d$-slices of each block solve the reduced
/// CARE exactly. $\gamma$ is dimension-independent.
#[derive(Debug, Clone)]
pub struct ReducedCertificate {
    pub p_mat: Array2<f64>,
    pub f_mat: Array2<f64>,
    pub g_mat: Array2<f64>,
    pub gamma: f64,
}

impl ReducedCertificate {
    /// Evaluate $V = \eta^\text{T} P \eta$.
    pub fn lyapunov(&self, eta: &ndarray::Array1<f64>) -> f64 {
        eta.dot(&self.p_mat.dot(eta))
    }
}

impl LyapunovCertificate {
    /// Build the certificate for `task_dim` task coordinates.
    ///
    /// `q_weight` and `r_weight` are the (positive) scalar state and
    /// input penalties; the reference deployment uses 100 and 1.
    ///
    /// Fails with [`ControlError::NotStabilizable`] if the template pair
    /// $(F, G)$ is not stabilizable for the chosen weights, and with
    /// [`ControlError::IndefiniteCertificate`] if the returned $P$ is not
    /// positive-definite. Either failure means no decay rate can be
    /// certified and the controller must not start.
    pub fn new(task_dim: usize, q_weight: f64, r_weight: f64) -> Result<Self, ControlError> {
        assert!(task_dim > 0, "certificate needs at least one task coordinate");
        assert!(
            q_weight > 0. && r_weight > 0.,
            "certificate weights must be positive-definite"
        );
        let d = task_dim;

        // eta_dot = F*eta + G*nu with eta = [x_tilde; xd_tilde]:
        // position error driven by velocity error, velocity error driven
        // directly by the acceleration error nu.
        let mut f_mat = Array2::zeros((2 * d, 2 * d));
        f_mat.slice_mut(s![0..d, d..2 * d]).assign(&Array2::eye(d));
        let mut g_mat = Array2::zeros((2 * d, d));
        g_mat.slice_mut(s![d..2 * d, ..]).assign(&Array2::eye(d));

        let q_mat = Array2::eye(2 * d) * q_weight;
        let r_mat = Array2::eye(d) * r_weight;

        if !riccati::controllable(&f_mat, &g_mat)? {
            return Err(ControlError::NotStabilizable);
        }

        let p_mat = riccati::care_iterative(
            &f_mat,
            &g_mat,
            &q_mat,
            &r_mat,
            Some(CARE_DT),
            Some(CARE_TOL),
            Some(CARE_ITER_MAX),
        )?;

        let (p_min, p_max) = riccati::symmetric_eig_bounds(&p_mat)?;
        if p_min <= 0. {
            return Err(ControlError::IndefiniteCertificate(p_min));
        }

        let (q_min, _) = riccati::symmetric_eig_bounds(&q_mat)?;
        let gamma = q_min / p_max;

        info!(task_dim = d, gamma, "Lyapunov certificate constructed");

        Ok(LyapunovCertificate {
            f_mat,
            g_mat,
            q_mat,
            r_mat,
            p_mat,
            gamma,
            task_dim: d,
        })
    }

    /// Maximum task dimension the certificate was built for.
    pub fn task_dim(&self) -> usize {
        self.task_dim
    }

    /// Extract the sub-certificate for `task_dim` active coordinates.
    ///
    /// The active coordinates are always the leading ones of each block
    /// (body first, swing feet in ascending foot order), so the slice is
    /// index selection on $[0, d) \cup [d_\text{max}, d_\text{max} + d)$.
    pub fn reduced(&self, task_dim: usize) -> ReducedCertificate {
        let d = task_dim;
        let d_max = self.task_dim;
        assert!(d >= 6 && d <= d_max, "active task dimension out of range");

        let idx: Vec<usize> = (0..d).chain(d_max..d_max + d).collect();
        let p_mat = self.p_mat.select(Axis(0), &idx).select(Axis(1), &idx);
        let f_mat = self.f_mat.select(Axis(0), &idx).select(Axis(1), &idx);
        let g_mat = self
            .g_mat
            .select(Axis(0), &idx)
            .slice(s![.., 0..d])
            .to_owned();

        ReducedCertificate {
            p_mat,
            f_mat,
            g_mat,
            gamma: self.gamma,
        }
    }
}
