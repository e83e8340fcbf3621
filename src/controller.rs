//! The per-tick CLF-QP whole-body control law.
//!
//! Every tick solves
//! $$
//! \min_{v_d, \tau, f, \delta}
//!     \lVert J v_d + \dot{J}v - \ddot{x}_\text{nom} \rVert^2
//!     + w \, \dot{V}(v_d)
//! $$
//! subject to the CLF decrease condition
//! $\dot{V} \le -\gamma V + \delta$ with $\delta \le 0$, the equations of
//! motion, friction pyramids and contact no-slip. The certificate ties
//! the decrease condition to the decision variables directly, so
//! stability is enforced inside the optimization rather than checked
//! after the fact.

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::certificate::LyapunovCertificate;
use crate::constraints;
use crate::dynamics::{DynamicsProvider, RobotState};
use crate::error::ControlError;
use crate::qp::{QuadraticProgram, VariableLayout};
use crate::task_space::{TaskSpace, TrajectorySetpoint};

/// Tuning for the whole-body controller. Defaults are the reference
/// deployment's values.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Certificate state penalty $Q = q_w I$.
    pub q_weight: f64,
    /// Certificate input penalty $R = r_w I$.
    pub r_weight: f64,
    /// Weight on the tracking cost.
    pub tracking_weight: f64,
    /// Weight on the $\dot{V}$ linear cost term.
    pub clf_weight: f64,
    /// Static friction coefficient of the linearized Coulomb pyramid.
    pub friction_coeff: f64,
    /// First-order gain driving contact-point velocity to zero in the
    /// no-slip constraint; 0 disables the bias.
    pub contact_damping: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            q_weight: 100.,
            r_weight: 1.,
            tracking_weight: 1.,
            clf_weight: 1.,
            friction_coeff: 0.7,
            contact_damping: 10.,
        }
    }
}

/// The accepted per-tick solution: the torque command plus diagnostics
/// recomputed from the optimizer's answer.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Commanded actuator torques, one per actuator.
    pub tau: Array1<f64>,
    /// Optimal generalized accelerations.
    pub vd: Array1<f64>,
    /// One contact force per contact foot, ascending foot order.
    pub contact_forces: Vec<Array1<f64>>,
    /// CLF relaxation slack $\delta \le 0$.
    pub slack: f64,
    /// $V = \eta^\text{T} P \eta$ at the measured state.
    pub lyapunov: f64,
    /// $\dot{V}$ implied by the accepted accelerations.
    pub lyapunov_rate: f64,
    /// $\lVert \tilde{x} \rVert$ at the measured state.
    pub tracking_error: f64,
}

/// Whole-body CLF-QP controller.
///
/// Owns the dynamics provider and the certificate; everything else is
/// rebuilt from scratch inside [`ClfController::control`], so a single
/// instance is safe to tick forever and separate robots simply own
/// separate instances.
pub struct ClfController<D: DynamicsProvider> {
    provider: D,
    certificate: LyapunovCertificate,
    config: ControllerConfig,
}

impl<D: DynamicsProvider> ClfController<D> {
    /// Construct the controller, solving the offline Riccati problem.
    ///
    /// Fails if no stability certificate exists for the configured
    /// weights; a controller without a certified decay rate must not be
    /// started.
    pub fn new(provider: D, config: ControllerConfig) -> Result<Self, ControlError> {
        let max_task_dim = 6 + 3 * provider.n_feet();
        let certificate =
            LyapunovCertificate::new(max_task_dim, config.q_weight, config.r_weight)?;
        Ok(ClfController {
            provider,
            certificate,
            config,
        })
    }

    pub fn provider(&self) -> &D {
        &self.provider
    }

    pub fn certificate(&self) -> &LyapunovCertificate {
        &self.certificate
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one control tick.
    ///
    /// Builds the task-space errors for the tick's contact plan,
    /// assembles and solves the whole-body QP, and extracts the torque
    /// command. A solver failure is fatal for the tick: no stale or
    /// zero torque is ever substituted.
    pub fn control(
        &self,
        state: &RobotState,
        setpoint: &TrajectorySetpoint,
    ) -> Result<Solution, ControlError> {
        let model = self.provider.joint_space_model(state);
        let task = TaskSpace::build(&self.provider, state, setpoint);
        let cert = self.certificate.reduced(task.task_dim());
        let eta = task.eta();

        let layout = VariableLayout::new(
            self.provider.n_velocities(),
            self.provider.n_actuators(),
            task.contact_feet.len(),
        );
        let mut qp = QuadraticProgram::new(layout.n_total());

        // min || J*vd + Jd*v - xdd_nom ||^2
        constraints::add_tracking_cost(
            &mut qp,
            &layout,
            &task.jacobian,
            &task.bias_accel,
            &task.xdd_nom,
            self.config.tracking_weight,
        );

        // min w * Vdot: the vd-dependent part of Vdot is affine,
        // 2*eta'*P*G*J * vd, so it enters as a linear cost.
        let eta_pg = eta.dot(&cert.p_mat.dot(&cert.g_mat));
        let eta_pg_j = eta_pg.dot(&task.jacobian);
        qp.add_linear_cost(layout.vd(), &(&eta_pg_j * (2. * self.config.clf_weight)));

        // s.t. Vdot <= -gamma*V + delta, with nu = J*vd + Jd*v - xdd_nom
        // substituted and all vd terms moved to the left.
        let lyapunov = cert.lyapunov(&eta);
        let eta_pf_eta_2 = 2. * eta.dot(&cert.p_mat.dot(&cert.f_mat.dot(&eta)));
        let drift = &task.bias_accel - &task.xdd_nom;
        let mut clf_row = Array2::zeros((1, layout.n_total()));
        for (i, &coeff) in eta_pg_j.iter().enumerate() {
            clf_row[[0, i]] = 2. * coeff;
        }
        clf_row[[0, layout.delta()]] = -1.;
        let clf_rhs = -cert.gamma * lyapunov - eta_pf_eta_2 - 2. * eta_pg.dot(&drift);
        qp.add_inequality(&clf_row, &ndarray::array![clf_rhs]);

        // s.t. delta <= 0: the relaxation may only loosen the decrease
        // requirement, never strengthen it.
        let mut slack_row = Array2::zeros((1, layout.n_total()));
        slack_row[[0, layout.delta()]] = 1.;
        qp.add_inequality(&slack_row, &ndarray::array![0.]);

        // s.t. M*vd + Cv + g = S'*tau + sum(J_c'*f_c)
        constraints::add_dynamics_constraint(&mut qp, &layout, &model, &task.contact_jacobians);

        if !task.contact_feet.is_empty() {
            // s.t. f_c in friction pyramids
            constraints::add_friction_pyramid(&mut qp, &layout, self.config.friction_coeff);
            // s.t. J_c*vd + Jd_c*v = -kd*J_c*v
            constraints::add_no_slip(
                &mut qp,
                &layout,
                &task.contact_jacobians,
                &task.contact_bias_accels,
                &state.velocities,
                self.config.contact_damping,
            );
        }

        let z = qp.solve()?;

        let vd = z.slice(ndarray::s![layout.vd()]).to_owned();
        let tau = z.slice(ndarray::s![layout.tau()]).to_owned();
        let contact_forces: Vec<Array1<f64>> = (0..layout.n_contacts)
            .map(|j| z.slice(ndarray::s![layout.contact_force(j)]).to_owned())
            .collect();
        let slack = z[layout.delta()];

        // Diagnostics from the accepted solution.
        let nu = task.jacobian.dot(&vd) + &task.bias_accel - &task.xdd_nom;
        let lyapunov_rate = eta_pf_eta_2 + 2. * eta_pg.dot(&nu);
        let tracking_error = task.x_tilde.dot(&task.x_tilde).sqrt();

        debug!(
            lyapunov,
            lyapunov_rate,
            tracking_error,
            slack,
            n_contact = task.contact_feet.len(),
            "whole-body QP tick solved"
        );

        Ok(Solution {
            tau,
            vd,
            contact_forces,
            slack,
            lyapunov,
            lyapunov_rate,
            tracking_error,
        })
    }
}
