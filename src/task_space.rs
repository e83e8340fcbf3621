//! Per-tick task-space quantities: setpoints, foot partition, stacked
//! errors and Jacobians.
//!
//! The task vector is the fixed-order stack
//! $x = [\text{body rpy}; \text{body position}; \text{swing-foot positions}]$
//! with dimension $d = 6 + 3 \cdot n_\text{swing}$. Velocity stacks carry
//! angular velocity (not rpy rates) in the orientation slots, matching
//! the angular rows of the body Jacobian; nominal rpy rates are converted
//! through [`crate::rpy`] with the measured attitude.

use ndarray::{s, Array1, Array2};

use crate::dynamics::{DynamicsProvider, RobotState};
use crate::rpy;

/// Desired floating-base motion for one tick.
#[derive(Debug, Clone)]
pub struct BodySetpoint {
    pub rpy: Array1<f64>,
    pub rpy_rate: Array1<f64>,
    pub rpy_accel: Array1<f64>,
    pub position: Array1<f64>,
    pub velocity: Array1<f64>,
    pub acceleration: Array1<f64>,
}

impl BodySetpoint {
    /// Hold a fixed pose: zero desired rates and accelerations.
    pub fn hold(rpy: Array1<f64>, position: Array1<f64>) -> Self {
        BodySetpoint {
            rpy,
            rpy_rate: Array1::zeros(3),
            rpy_accel: Array1::zeros(3),
            position,
            velocity: Array1::zeros(3),
            acceleration: Array1::zeros(3),
        }
    }
}

/// Desired motion and contact flag for one foot.
#[derive(Debug, Clone)]
pub struct FootSetpoint {
    pub position: Array1<f64>,
    pub velocity: Array1<f64>,
    pub acceleration: Array1<f64>,
    /// True when the contact schedule pins this foot to the ground.
    pub in_contact: bool,
}

impl FootSetpoint {
    /// A stance foot pinned at `position`.
    pub fn contact_at(position: Array1<f64>) -> Self {
        FootSetpoint {
            position,
            velocity: Array1::zeros(3),
            acceleration: Array1::zeros(3),
            in_contact: true,
        }
    }

    /// A swing foot tracking the given trajectory sample.
    pub fn swing(position: Array1<f64>, velocity: Array1<f64>, acceleration: Array1<f64>) -> Self {
        FootSetpoint {
            position,
            velocity,
            acceleration,
            in_contact: false,
        }
    }
}

/// The externally supplied trajectory sample for one control tick.
///
/// Read-only inside the tick; the contact plan is part of the input, the
/// controller never infers it.
#[derive(Debug, Clone)]
pub struct TrajectorySetpoint {
    pub body: BodySetpoint,
    pub feet: Vec<FootSetpoint>,
}

impl TrajectorySetpoint {
    /// Indices of feet following a trajectory off the ground.
    pub fn swing_feet(&self) -> Vec<usize> {
        self.feet
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.in_contact)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of feet assumed fixed to the ground.
    pub fn contact_feet(&self) -> Vec<usize> {
        self.feet
            .iter()
            .enumerate()
            .filter(|(_, f)| f.in_contact)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Stacked task-space errors, Jacobians and nominal accelerations for
/// one tick, plus the per-contact-foot quantities the dynamics and
/// contact constraints need.
#[derive(Debug, Clone)]
pub struct TaskSpace {
    pub swing_feet: Vec<usize>,
    pub contact_feet: Vec<usize>,
    /// $\tilde{x} = x - x_\text{nom}$, dimension $d$.
    pub x_tilde: Array1<f64>,
    /// $\dot{\tilde{x}} = \dot{x} - \dot{x}_\text{nom}$.
    pub xd_tilde: Array1<f64>,
    /// Stacked nominal task acceleration $\ddot{x}_\text{nom}$.
    pub xdd_nom: Array1<f64>,
    /// Stacked task Jacobian, $d \times n_v$ (body rows first).
    pub jacobian: Array2<f64>,
    /// Stacked bias acceleration $\dot{J} v$.
    pub bias_accel: Array1<f64>,
    /// One $3 \times n_v$ Jacobian per contact foot, ascending foot order.
    pub contact_jacobians: Vec<Array2<f64>>,
    /// One $\dot{J}_c v$ per contact foot.
    pub contact_bias_accels: Vec<Array1<f64>>,
}

impl TaskSpace {
    /// Assemble the tick's task-space quantities from the dynamics
    /// provider's kinematics and the trajectory setpoint.
    pub fn build(
        provider: &dyn DynamicsProvider,
        state: &RobotState,
        setpoint: &TrajectorySetpoint,
    ) -> Self {
        assert_eq!(
            setpoint.feet.len(),
            provider.n_feet(),
            "setpoint must carry one entry per foot"
        );
        let nv = provider.n_velocities();
        let swing_feet = setpoint.swing_feet();
        let contact_feet = setpoint.contact_feet();
        let d = 6 + 3 * swing_feet.len();

        let body = provider.body_kinematics(state);
        let body_task_vel = body.jacobian.dot(&state.velocities);
        let omega = body_task_vel.slice(s![0..3]).to_owned();
        let body_vel = body_task_vel.slice(s![3..6]).to_owned();

        // Nominal orientation rates enter as angular velocity, converted
        // with the measured attitude so both sides of the error share the
        // same rate map.
        let omega_nom = rpy::angular_velocity_from_rpy_rates(&body.rpy, &setpoint.body.rpy_rate);
        let omega_dot_nom =
            rpy::angular_velocity_from_rpy_rates(&body.rpy, &setpoint.body.rpy_accel);

        let mut x = Array1::zeros(d);
        let mut x_nom = Array1::zeros(d);
        let mut xd = Array1::zeros(d);
        let mut xd_nom = Array1::zeros(d);
        let mut xdd_nom = Array1::zeros(d);
        let mut jacobian = Array2::zeros((d, nv));
        let mut bias_accel = Array1::zeros(d);

        x.slice_mut(s![0..3]).assign(&body.rpy);
        x.slice_mut(s![3..6]).assign(&body.position);
        x_nom.slice_mut(s![0..3]).assign(&setpoint.body.rpy);
        x_nom.slice_mut(s![3..6]).assign(&setpoint.body.position);
        xd.slice_mut(s![0..3]).assign(&omega);
        xd.slice_mut(s![3..6]).assign(&body_vel);
        xd_nom.slice_mut(s![0..3]).assign(&omega_nom);
        xd_nom.slice_mut(s![3..6]).assign(&setpoint.body.velocity);
        xdd_nom.slice_mut(s![0..3]).assign(&omega_dot_nom);
        xdd_nom.slice_mut(s![3..6]).assign(&setpoint.body.acceleration);
        jacobian.slice_mut(s![0..6, ..]).assign(&body.jacobian);
        bias_accel.slice_mut(s![0..6]).assign(&body.bias_accel);

        for (slot, &foot) in swing_feet.iter().enumerate() {
            let kin = provider.foot_kinematics(foot, state);
            let sp = &setpoint.feet[foot];
            let rows = 6 + 3 * slot..6 + 3 * (slot + 1);
            x.slice_mut(s![rows.clone()]).assign(&kin.position);
            x_nom.slice_mut(s![rows.clone()]).assign(&sp.position);
            xd.slice_mut(s![rows.clone()])
                .assign(&kin.jacobian.dot(&state.velocities));
            xd_nom.slice_mut(s![rows.clone()]).assign(&sp.velocity);
            xdd_nom.slice_mut(s![rows.clone()]).assign(&sp.acceleration);
            jacobian.slice_mut(s![rows.clone(), ..]).assign(&kin.jacobian);
            bias_accel.slice_mut(s![rows]).assign(&kin.bias_accel);
        }

        let mut contact_jacobians = Vec::with_capacity(contact_feet.len());
        let mut contact_bias_accels = Vec::with_capacity(contact_feet.len());
        for &foot in &contact_feet {
            let kin = provider.foot_kinematics(foot, state);
            contact_jacobians.push(kin.jacobian);
            contact_bias_accels.push(kin.bias_accel);
        }

        TaskSpace {
            swing_feet,
            contact_feet,
            x_tilde: &x - &x_nom,
            xd_tilde: &xd - &xd_nom,
            xdd_nom,
            jacobian,
            bias_accel,
            contact_jacobians,
            contact_bias_accels,
        }
    }

    /// Active task dimension $d = 6 + 3 \cdot n_\text{swing}$.
    pub fn task_dim(&self) -> usize {
        self.x_tilde.len()
    }

    /// The certificate state $\eta = [\tilde{x}; \dot{\tilde{x}}]$.
    pub fn eta(&self) -> Array1<f64> {
        let d = self.task_dim();
        let mut eta = Array1::zeros(2 * d);
        eta.slice_mut(s![0..d]).assign(&self.x_tilde);
        eta.slice_mut(s![d..2 * d]).assign(&self.xd_tilde);
        eta
    }
}
