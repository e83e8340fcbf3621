//! Whole-body torque control for legged robots via a control-Lyapunov
//! quadratic program.
//!
//! Each control tick assembles a convex QP over generalized
//! accelerations, actuator torques, contact forces and a stability
//! slack, subject to the full rigid-body dynamics, friction pyramids,
//! contact no-slip and a Lyapunov decrease condition certified offline
//! by a Riccati equation.
//!
//! The controller module defines the per-tick control law, with the
//! other modules supporting it. The most commonly used functionality is
//! re-exported to the top level for ease-of-use.

pub mod certificate;
pub mod constraints;
pub mod controller;
pub mod dynamics;
pub mod error;
pub mod qp;
pub mod riccati;
pub mod rpy;
pub mod task_space;

pub use certificate::LyapunovCertificate;
pub use controller::{ClfController, ControllerConfig, Solution};
pub use dynamics::{
    BodyKinematics, DynamicsProvider, FootKinematics, JointSpaceModel, RobotState,
};
pub use error::ControlError;
pub use task_space::{BodySetpoint, FootSetpoint, TrajectorySetpoint};
