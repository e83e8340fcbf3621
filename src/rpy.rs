//! Roll-pitch-yaw rate conversions.
//!
//! One convention is used everywhere orientation rates appear: intrinsic
//! roll-pitch-yaw $(r, p, y)$ with rotation $R = R_z(y) R_y(p) R_x(r)$,
//! and angular velocity expressed in the parent frame. This matches the
//! angular rows of the body Jacobian supplied by the dynamics provider.

use ndarray::{array, Array1, Array2};

/// The map $N(r,p,y)$ with $\omega = N \cdot \dot{(r,p,y)}$, angular
/// velocity expressed in the parent frame.
fn rate_map(rpy: &Array1<f64>) -> Array2<f64> {
    let (p, y) = (rpy[1], rpy[2]);
    array![
        [p.cos() * y.cos(), -y.sin(), 0.],
        [p.cos() * y.sin(), y.cos(), 0.],
        [-p.sin(), 0., 1.],
    ]
}

/// Convert roll-pitch-yaw rates to parent-frame angular velocity.
///
/// # Examples
/// ```
/// use ndarray::array;
/// use clf_control::rpy::angular_velocity_from_rpy_rates;
///
/// // At zero attitude the map is the identity.
/// let omega = angular_velocity_from_rpy_rates(&array![0., 0., 0.], &array![0.1, 0.2, 0.3]);
/// assert!(omega.abs_diff_eq(&array![0.1, 0.2, 0.3], 1e-12));
/// ```
pub fn angular_velocity_from_rpy_rates(rpy: &Array1<f64>, rpy_rates: &Array1<f64>) -> Array1<f64> {
    rate_map(rpy).dot(rpy_rates)
}

/// Convert parent-frame angular velocity to roll-pitch-yaw rates.
///
/// Singular at $\cos p = 0$ (gimbal lock); callers are expected to keep
/// body pitch away from $\pm\pi/2$, as the reference trajectories do.
pub fn rpy_rates_from_angular_velocity(rpy: &Array1<f64>, omega: &Array1<f64>) -> Array1<f64> {
    let (p, y) = (rpy[1], rpy[2]);
    let inv = array![
        [y.cos() / p.cos(), y.sin() / p.cos(), 0.],
        [-y.sin(), y.cos(), 0.],
        [y.cos() * p.tan(), y.sin() * p.tan(), 1.],
    ];
    inv.dot(omega)
}
