//! Offline Riccati machinery backing the Lyapunov certificate.
//!
//! Everything here runs once at controller construction, never inside
//! the control tick.

use ndarray::{s, Array2};
use ndarray_linalg::{Eigh, Inverse, SVD, UPLO};

use crate::error::ControlError;

/// Determine the rank of a matrix (using the SVD).
///
/// Singular values below `eps`-scaled machine tolerance are treated as
/// zero, mirroring the numpy `matrix_rank` convention.
pub fn rank(mat: &Array2<f64>, eps: Option<f64>) -> Result<usize, ControlError> {
    let (_, singular_values, _) = mat.svd(false, false)?;
    let sv_max = singular_values
        .iter()
        .cloned()
        .fold(0.0_f64, f64::max);
    let max_dim = mat.nrows().max(mat.ncols());
    let eps = eps.unwrap_or(f64::EPSILON);
    let tol = sv_max * max_dim as f64 * eps;
    Ok(singular_values.iter().filter(|&&sv| sv >= tol).count())
}

/// Calculate a matrix power (integer only)
fn pow(mat: &Array2<f64>, exponent: u32) -> Array2<f64> {
    assert_eq!(mat.nrows(), mat.ncols());
    match exponent {
        0 => Array2::eye(mat.ncols()),
        1 => mat.clone(),
        exponent => {
            let mut result = mat.clone();
            for _i in 2..=exponent {
                result = result.dot(mat);
            }
            result
        }
    }
}

/// Calculate the controllability matrix for the matrix pair ($A$, $B$).
///
/// The matrix pair are such that $A\in\mathbb{R}^{n\times n}$ and
/// $B\in\mathbb{R}^{n\times m}$.
/// Constructs the controllability matrix as
/// $\begin{bmatrix}B & AB & A^2B & \dots & A^{n-1}B\end{bmatrix}$.
pub fn controllability_matrix(a_mat: &Array2<f64>, b_mat: &Array2<f64>) -> Array2<f64> {
    let n = a_mat.ncols();
    let mut controllability = Array2::zeros((b_mat.nrows(), n * b_mat.ncols()));
    for i in 0..n {
        let col_start = i * b_mat.ncols();
        let col_end = col_start + b_mat.ncols();
        controllability
            .slice_mut(s![.., col_start..col_end])
            .assign(&pow(a_mat, i.try_into().unwrap()).dot(b_mat));
    }
    controllability
}

/// Determine if the pair of matrices ($A$, $B$) is controllable.
///
/// The pair is controllable if and only if the controllability matrix
/// has full row rank. Controllability implies stabilizability, which is
/// the property the certificate actually needs.
///
/// # Examples
/// ```
/// use ndarray::array;
/// use clf_control::riccati::controllable;
///
/// let a_mat = array![[0., 1.], [0., 0.]];
/// let b_mat = array![[0.], [1.]];
///
/// assert!(controllable(&a_mat, &b_mat).unwrap());
/// ```
pub fn controllable(a_mat: &Array2<f64>, b_mat: &Array2<f64>) -> Result<bool, ControlError> {
    let controllability = controllability_matrix(a_mat, b_mat);
    Ok(rank(&controllability, Default::default())? == controllability.nrows())
}

/// Solve the Continuous Algebraic Riccati Equation (CARE) iteratively.
///
/// With $Q\succ 0$ and $R\succ 0$ the CARE is
/// $PA + A^\text{T}P - PBR^{-1}B^{\text{T}}P + Q = 0$ where
/// $P=P^{\text{T}}$ is the desired solution. The iterative method treats
/// the equation as the matrix differential equation
/// $\dot{P} = PA + A^\text{T}P - PBR^{-1}B^\text{T}P + Q$ and integrates
/// (Euler) from $P(0)=Q$ until equilibrium, i.e., $\dot{P}=0$.
///
/// This is the simplest CARE method and can be slow or numerically
/// delicate in general, but the double-integrator error templates solved
/// here are well inside its comfort zone; stability can be traded for
/// time with a smaller `dt` and/or larger `iter_max`.
///
/// # Examples
/// ```
/// use ndarray::{array, Array2};
/// use clf_control::riccati::care_iterative;
///
/// let a_mat = array![[0., 1.], [0., 0.]];
/// let b_mat = array![[0., 0.], [1., 1.]];
/// let q_mat = Array2::eye(2);
/// let r_mat = Array2::eye(2);
/// let p_mat = care_iterative(
///     &a_mat,
///     &b_mat,
///     &q_mat,
///     &r_mat,
///     Default::default(), // default `dt` is 0.001
///     Default::default(), // default `tol` is 1E-10
///     Default::default(), // default `iter_max` is 100000
/// )
/// .unwrap();
/// assert!(p_mat.abs_diff_eq(
///     // "Truth" value obtained from Matlab's `icare` function.
///     &array![
///         [1.553773974030038, 0.707106781186548],
///         [0.707106781186548, 1.098684113467811]
///     ],
///     1.0e-7
/// ));
/// ```
pub fn care_iterative(
    a_mat: &Array2<f64>,
    b_mat: &Array2<f64>,
    q_mat: &Array2<f64>,
    r_mat: &Array2<f64>,
    dt: Option<f64>,
    tol: Option<f64>,
    iter_max: Option<usize>,
) -> Result<Array2<f64>, ControlError> {
    let dt = dt.unwrap_or(0.001);
    let tol = tol.unwrap_or(1.0e-10);
    let iter_max = iter_max.unwrap_or(100_000);

    let mut p_mat = q_mat.clone();

    let a_transpose = a_mat.t();
    let b_transpose = b_mat.t();
    let r_inverse = Array2::inv(r_mat)?;

    for _i in 0..iter_max {
        let p_next = &p_mat
            + (p_mat.dot(a_mat) + a_transpose.dot(&p_mat)
                - p_mat
                    .dot(b_mat)
                    .dot(&r_inverse)
                    .dot(&b_transpose)
                    .dot(&p_mat)
                + q_mat)
                * dt;
        let diff = (&p_next - &p_mat).iter().map(|&v| v * v).sum::<f64>().sqrt();
        if diff < tol {
            return Ok(p_next);
        }
        p_mat = p_next;
    }
    Ok(p_mat)
}

/// The extreme eigenvalues $(\lambda_\text{min}, \lambda_\text{max})$ of
/// a symmetric matrix.
pub fn symmetric_eig_bounds(mat: &Array2<f64>) -> Result<(f64, f64), ControlError> {
    // eigh returns eigenvalues in ascending order.
    let (eigs, _) = mat.eigh(UPLO::Lower)?;
    Ok((eigs[0], eigs[eigs.len() - 1]))
}
