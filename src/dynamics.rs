//! The rigid-body dynamics seam.
//!
//! The controller never computes mass matrices or Jacobians itself; it
//! consumes them through [`DynamicsProvider`], implemented downstream on
//! top of whatever rigid-body engine models the robot. This keeps the
//! control law testable against analytic models and independent of any
//! particular dynamics library.

use ndarray::{Array1, Array2};

/// Joint positions and velocities, snapshotted once per tick.
#[derive(Debug, Clone)]
pub struct RobotState {
    pub positions: Array1<f64>,
    pub velocities: Array1<f64>,
}

impl RobotState {
    pub fn new(positions: Array1<f64>, velocities: Array1<f64>) -> Self {
        RobotState {
            positions,
            velocities,
        }
    }
}

/// Joint-space dynamics quantities evaluated at the current state:
/// $M \dot{v} + C v + g = S^\text{T} \tau + \sum J_c^\text{T} f_c$.
#[derive(Debug, Clone)]
pub struct JointSpaceModel {
    /// Mass matrix $M$, symmetric positive-definite, $n_v \times n_v$.
    pub mass_matrix: Array2<f64>,
    /// Velocity-dependent bias forces $C v$.
    pub bias_forces: Array1<f64>,
    /// Gravity generalized forces $g$ (left-hand-side sign convention).
    pub gravity_forces: Array1<f64>,
    /// Actuation selection matrix $S$, $n_a \times n_v$.
    pub selection_matrix: Array2<f64>,
}

/// Floating-base kinematics: pose, 6-row Jacobian (angular rows first,
/// parent-frame convention), and bias acceleration $\dot{J} v$.
#[derive(Debug, Clone)]
pub struct BodyKinematics {
    pub rpy: Array1<f64>,
    pub position: Array1<f64>,
    pub jacobian: Array2<f64>,
    pub bias_accel: Array1<f64>,
}

/// Point-frame kinematics for one foot: position, 3-row translational
/// Jacobian, and bias acceleration $\dot{J} v$.
#[derive(Debug, Clone)]
pub struct FootKinematics {
    pub position: Array1<f64>,
    pub jacobian: Array2<f64>,
    pub bias_accel: Array1<f64>,
}

/// Interface to the external rigid-body dynamics engine.
///
/// All quantities are evaluated at the supplied [`RobotState`]; the
/// provider holds the robot model but no per-tick controller state.
pub trait DynamicsProvider {
    /// Dimension of the generalized-velocity space $n_v$.
    fn n_velocities(&self) -> usize;
    /// Number of actuators $n_a$.
    fn n_actuators(&self) -> usize;
    /// Number of tracked feet.
    fn n_feet(&self) -> usize;

    /// Mass matrix, bias, gravity and selection at the current state.
    fn joint_space_model(&self, state: &RobotState) -> JointSpaceModel;
    /// Floating-base frame kinematics at the current state.
    fn body_kinematics(&self, state: &RobotState) -> BodyKinematics;
    /// Kinematics of foot `foot` (0-based) at the current state.
    fn foot_kinematics(&self, foot: usize, state: &RobotState) -> FootKinematics;
}

/// An analytic point-foot quadruped used throughout the crate's tests.
///
/// The floating base carries roll-pitch-yaw plus position; each foot
/// hangs on three prismatic world-axis joints, so every Jacobian is
/// constant and the bias accelerations vanish. Deliberately simple, but
/// dynamically consistent: gravity must be carried through the contact
/// forces and the actuated leg joints exactly as on a real machine.
#[cfg(test)]
pub(crate) mod test_model {
    use ndarray::s;

    use super::*;

    pub const GRAVITY: f64 = 9.81;

    pub struct PointFootQuadruped {
        pub body_mass: f64,
        pub leg_mass: f64,
        pub body_inertia: f64,
        /// Nominal foot attachment offsets from the body origin.
        pub attachments: Vec<Array1<f64>>,
    }

    impl PointFootQuadruped {
        pub fn new() -> Self {
            PointFootQuadruped {
                body_mass: 10.,
                leg_mass: 0.5,
                body_inertia: 0.4,
                attachments: vec![
                    ndarray::array![0.3, 0.2, -0.5],
                    ndarray::array![0.3, -0.2, -0.5],
                    ndarray::array![-0.3, 0.2, -0.5],
                    ndarray::array![-0.3, -0.2, -0.5],
                ],
            }
        }

        /// Body level at height 0.5, legs at their nominal offsets, at rest.
        pub fn stance_state(&self) -> RobotState {
            let mut q = Array1::zeros(self.n_velocities());
            q[5] = 0.5;
            RobotState::new(q, Array1::zeros(self.n_velocities()))
        }
    }

    impl DynamicsProvider for PointFootQuadruped {
        fn n_velocities(&self) -> usize {
            6 + 3 * self.attachments.len()
        }

        fn n_actuators(&self) -> usize {
            3 * self.attachments.len()
        }

        fn n_feet(&self) -> usize {
            self.attachments.len()
        }

        fn joint_space_model(&self, _state: &RobotState) -> JointSpaceModel {
            let nv = self.n_velocities();
            let na = self.n_actuators();

            let mut mass_matrix = Array2::zeros((nv, nv));
            for i in 0..3 {
                mass_matrix[[i, i]] = self.body_inertia;
                mass_matrix[[3 + i, 3 + i]] = self.body_mass;
            }
            for i in 6..nv {
                mass_matrix[[i, i]] = self.leg_mass;
            }

            let mut gravity_forces = Array1::zeros(nv);
            gravity_forces[5] = self.body_mass * GRAVITY;
            for foot in 0..self.attachments.len() {
                gravity_forces[6 + 3 * foot + 2] = self.leg_mass * GRAVITY;
            }

            let mut selection_matrix = Array2::zeros((na, nv));
            for i in 0..na {
                selection_matrix[[i, 6 + i]] = 1.;
            }

            JointSpaceModel {
                mass_matrix,
                bias_forces: Array1::zeros(nv),
                gravity_forces,
                selection_matrix,
            }
        }

        fn body_kinematics(&self, state: &RobotState) -> BodyKinematics {
            let nv = self.n_velocities();
            let mut jacobian = Array2::zeros((6, nv));
            for i in 0..6 {
                jacobian[[i, i]] = 1.;
            }
            BodyKinematics {
                rpy: state.positions.slice(s![0..3]).to_owned(),
                position: state.positions.slice(s![3..6]).to_owned(),
                jacobian,
                bias_accel: Array1::zeros(6),
            }
        }

        fn foot_kinematics(&self, foot: usize, state: &RobotState) -> FootKinematics {
            let nv = self.n_velocities();
            let leg = 6 + 3 * foot;
            let mut jacobian = Array2::zeros((3, nv));
            for i in 0..3 {
                jacobian[[i, 3 + i]] = 1.;
                jacobian[[i, leg + i]] = 1.;
            }
            let position = state.positions.slice(s![3..6]).to_owned()
                + &self.attachments[foot]
                + state.positions.slice(s![leg..leg + 3]).to_owned();
            FootKinematics {
                position,
                jacobian,
                bias_accel: Array1::zeros(3),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_model::*;
    use super::*;

    #[test]
    fn test_point_foot_model_dimensions() {
        let robot = PointFootQuadruped::new();
        assert_eq!(robot.n_velocities(), 18);
        assert_eq!(robot.n_actuators(), 12);
        assert_eq!(robot.n_feet(), 4);

        let state = robot.stance_state();
        let model = robot.joint_space_model(&state);
        assert_eq!(model.mass_matrix.shape(), &[18, 18]);
        assert_eq!(model.selection_matrix.shape(), &[12, 18]);
    }

    #[test]
    fn test_point_foot_model_stance_geometry() {
        let robot = PointFootQuadruped::new();
        let state = robot.stance_state();
        // Feet on the ground plane at the nominal stance.
        for foot in 0..4 {
            let kin = robot.foot_kinematics(foot, &state);
            assert!(kin.position[2].abs() < 1e-12);
        }
        let body = robot.body_kinematics(&state);
        assert_eq!(body.position[2], 0.5);
        assert_eq!(body.jacobian.shape(), &[6, 18]);
    }

    #[test]
    fn test_foot_jacobian_maps_velocities() {
        let robot = PointFootQuadruped::new();
        let state = robot.stance_state();
        let kin = robot.foot_kinematics(1, &state);
        // Body translation and the foot's own leg joints both move the foot.
        let mut v = Array1::zeros(18);
        v[4] = 1.0; // body y velocity
        v[6 + 3 + 1] = 0.5; // foot 1 leg y rate
        let pdot = kin.jacobian.dot(&v);
        assert_eq!(pdot[0], 0.);
        assert_eq!(pdot[1], 1.5);
        assert_eq!(pdot[2], 0.);
    }
}
