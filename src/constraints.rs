//! Reusable QP-term builders.
//!
//! Stateless free functions: each writes one cost or constraint block
//! into the tick's [`QuadraticProgram`] through the [`VariableLayout`],
//! parametric in the number of contact feet. Nothing here persists
//! across ticks.

use ndarray::{s, Array1, Array2};

use crate::dynamics::JointSpaceModel;
use crate::qp::{QuadraticProgram, VariableLayout};

/// Tracking cost $w \lVert J v_d + \dot{J}v - \ddot{x}_\text{nom} \rVert^2$.
pub fn add_tracking_cost(
    qp: &mut QuadraticProgram,
    layout: &VariableLayout,
    jacobian: &Array2<f64>,
    bias_accel: &Array1<f64>,
    xdd_nom: &Array1<f64>,
    weight: f64,
) {
    let target = xdd_nom - bias_accel;
    qp.add_least_squares(layout.vd(), jacobian, &target, weight);
}

/// Equations of motion,
/// $M v_d + C v + g = S^\text{T} \tau + \sum_j J_{c_j}^\text{T} f_{c_j}$,
/// as $n_v$ equality rows. The contact sum is parametric in the current
/// contact plan; with no contact feet the force terms are simply absent.
pub fn add_dynamics_constraint(
    qp: &mut QuadraticProgram,
    layout: &VariableLayout,
    model: &JointSpaceModel,
    contact_jacobians: &[Array2<f64>],
) {
    assert_eq!(contact_jacobians.len(), layout.n_contacts);
    let nv = layout.n_velocities;
    let mut a_mat = Array2::zeros((nv, layout.n_total()));

    a_mat
        .slice_mut(s![.., layout.vd()])
        .assign(&model.mass_matrix);
    a_mat
        .slice_mut(s![.., layout.tau()])
        .assign(&(-&model.selection_matrix.t()));
    for (j, jac) in contact_jacobians.iter().enumerate() {
        a_mat
            .slice_mut(s![.., layout.contact_force(j)])
            .assign(&(-&jac.t()));
    }

    let rhs = -(&model.bias_forces + &model.gravity_forces);
    qp.add_equality(&a_mat, &rhs);
}

/// Linearized Coulomb friction pyramid for every contact force:
/// $\pm f_x \le \mu f_z$, $\pm f_y \le \mu f_z$, $f_z \ge 0$
/// (5 facets per foot). Callers skip this entirely when no foot is in
/// contact.
pub fn add_friction_pyramid(qp: &mut QuadraticProgram, layout: &VariableLayout, mu: f64) {
    let n = layout.n_total();
    for j in 0..layout.n_contacts {
        let f = layout.contact_force(j);
        let (fx, fy, fz) = (f.start, f.start + 1, f.start + 2);
        let mut a_mat = Array2::zeros((5, n));
        // +-fx <= mu*fz
        a_mat[[0, fx]] = 1.;
        a_mat[[0, fz]] = -mu;
        a_mat[[1, fx]] = -1.;
        a_mat[[1, fz]] = -mu;
        // +-fy <= mu*fz
        a_mat[[2, fy]] = 1.;
        a_mat[[2, fz]] = -mu;
        a_mat[[3, fy]] = -1.;
        a_mat[[3, fz]] = -mu;
        // unilateral normal: -fz <= 0
        a_mat[[4, fz]] = -1.;
        qp.add_inequality(&a_mat, &Array1::zeros(5));
    }
}

/// No-slip constraint for every contact foot:
/// $J_{c_j} v_d + \dot{J}_{c_j} v = -k_d \, J_{c_j} v$,
/// i.e. zero contact-point acceleration, optionally biased toward zero
/// relative velocity by the damping gain $k_d \ge 0$ (`damping`); 0
/// disables the bias.
pub fn add_no_slip(
    qp: &mut QuadraticProgram,
    layout: &VariableLayout,
    contact_jacobians: &[Array2<f64>],
    contact_bias_accels: &[Array1<f64>],
    velocities: &Array1<f64>,
    damping: f64,
) {
    assert_eq!(contact_jacobians.len(), layout.n_contacts);
    assert_eq!(contact_bias_accels.len(), layout.n_contacts);
    let n = layout.n_total();
    for (jac, bias) in contact_jacobians.iter().zip(contact_bias_accels.iter()) {
        let mut a_mat = Array2::zeros((3, n));
        a_mat.slice_mut(s![.., layout.vd()]).assign(jac);
        let rhs = -bias - jac.dot(velocities) * damping;
        qp.add_equality(&a_mat, &rhs);
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array1, Array2};

    use super::*;
    use crate::dynamics::test_model::{PointFootQuadruped, GRAVITY};
    use crate::dynamics::DynamicsProvider;

    fn stance_contacts(robot: &PointFootQuadruped) -> (Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let state = robot.stance_state();
        let mut jacs = Vec::new();
        let mut biases = Vec::new();
        for foot in 0..robot.n_feet() {
            let kin = robot.foot_kinematics(foot, &state);
            jacs.push(kin.jacobian);
            biases.push(kin.bias_accel);
        }
        (jacs, biases)
    }

    #[test]
    fn test_friction_row_count() {
        let layout = VariableLayout::new(18, 12, 4);
        let mut qp = QuadraticProgram::new(layout.n_total());
        add_friction_pyramid(&mut qp, &layout, 0.7);
        assert_eq!(qp.n_inequalities(), 20);
        assert_eq!(qp.n_equalities(), 0);
    }

    #[test]
    fn test_friction_projects_into_pyramid() {
        // Pull one force toward a point far outside the cone; the
        // solution must land on a facet.
        let layout = VariableLayout::new(0, 0, 1);
        let mut qp = QuadraticProgram::new(layout.n_total());
        qp.add_least_squares(
            layout.contact_force(0),
            &Array2::eye(3),
            &array![10., 0., 1.],
            1.0,
        );
        // Keep delta fixed so the program is fully determined.
        let mut pin = Array2::zeros((1, layout.n_total()));
        pin[[0, layout.delta()]] = 1.;
        qp.add_equality(&pin, &array![0.]);
        let mu = 0.7;
        add_friction_pyramid(&mut qp, &layout, mu);
        let z = qp.solve().unwrap();
        let f = z.slice(s![layout.contact_force(0).start..layout.contact_force(0).start + 3]);
        assert!(f[2] >= -1e-6);
        assert!(f[0].abs() <= mu * f[2] + 1e-5, "fx={} fz={}", f[0], f[2]);
        assert!(f[1].abs() <= mu * f[2] + 1e-5);
    }

    #[test]
    fn test_dynamics_rows_balance_at_stance() {
        let robot = PointFootQuadruped::new();
        let state = robot.stance_state();
        let model = robot.joint_space_model(&state);
        let (jacs, _) = stance_contacts(&robot);
        let layout = VariableLayout::new(18, 12, 4);

        let mut qp = QuadraticProgram::new(layout.n_total());
        // Prefer zero acceleration; the equality rows then force torque
        // and contact forces to carry gravity.
        qp.add_least_squares(layout.vd(), &Array2::eye(18), &Array1::zeros(18), 1.0);
        add_dynamics_constraint(&mut qp, &layout, &model, &jacs);
        add_friction_pyramid(&mut qp, &layout, 0.7);
        assert_eq!(qp.n_equalities(), 18);

        let z = qp.solve().unwrap();
        let vd = Array1::from_iter(z.iter().copied().take(18));
        let tau = Array1::from_iter(z.iter().copied().skip(18).take(12));
        let forces: Vec<Array1<f64>> = (0..4)
            .map(|j| {
                let r = layout.contact_force(j);
                Array1::from_iter(z.iter().copied().skip(r.start).take(3))
            })
            .collect();

        // Recompute the residual of M*vd + Cv + g - S'tau - sum(J'f).
        let mut residual =
            model.mass_matrix.dot(&vd) + &model.bias_forces + &model.gravity_forces
                - model.selection_matrix.t().dot(&tau);
        for (j, f) in forces.iter().enumerate() {
            residual = residual - jacs[j].t().dot(f);
        }
        assert!(residual.iter().all(|r| r.abs() < 1e-5));

        // Normal forces collectively carry the body weight.
        let total_fz: f64 = forces.iter().map(|f| f[2]).sum();
        assert!((total_fz - robot.body_mass * GRAVITY).abs() < 1e-3);
    }

    #[test]
    fn test_no_slip_zeroes_contact_acceleration() {
        let robot = PointFootQuadruped::new();
        let mut state = robot.stance_state();
        state.velocities[3] = 0.2; // body sliding in x
        let (jacs, biases) = stance_contacts(&robot);
        let layout = VariableLayout::new(18, 12, 4);
        let damping = 10.;

        let mut qp = QuadraticProgram::new(layout.n_total());
        qp.add_least_squares(layout.vd(), &Array2::eye(18), &Array1::zeros(18), 1.0);
        add_no_slip(&mut qp, &layout, &jacs, &biases, &state.velocities, damping);
        assert_eq!(qp.n_equalities(), 12);

        let z = qp.solve().unwrap();
        let vd = Array1::from_iter(z.iter().copied().take(18));
        for (jac, bias) in jacs.iter().zip(biases.iter()) {
            let accel = jac.dot(&vd) + bias;
            let expected = jac.dot(&state.velocities) * -damping;
            for (a, e) in accel.iter().zip(expected.iter()) {
                assert!((a - e).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_tracking_cost_reaches_target() {
        let robot = PointFootQuadruped::new();
        let state = robot.stance_state();
        let body = robot.body_kinematics(&state);
        let layout = VariableLayout::new(18, 0, 0);

        let mut qp = QuadraticProgram::new(layout.n_total());
        let xdd_nom = array![0., 0., 0., 0.5, 0., -0.3];
        add_tracking_cost(&mut qp, &layout, &body.jacobian, &body.bias_accel, &xdd_nom, 1.0);
        // Regularize the unobserved directions so the optimum is unique.
        qp.add_least_squares(layout.vd(), &Array2::eye(18), &Array1::zeros(18), 1e-6);
        let mut pin = Array2::zeros((1, layout.n_total()));
        pin[[0, layout.delta()]] = 1.;
        qp.add_equality(&pin, &array![0.]);

        let z = qp.solve().unwrap();
        let vd = Array1::from_iter(z.iter().copied().take(18));
        let achieved = body.jacobian.dot(&vd) + &body.bias_accel;
        for (a, e) in achieved.iter().zip(xdd_nom.iter()) {
            assert!((a - e).abs() < 1e-4);
        }
    }
}
