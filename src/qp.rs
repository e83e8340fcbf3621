//! The per-tick quadratic program.
//!
//! A [`QuadraticProgram`] is created fresh every tick, filled by the
//! constraint builders, solved once through Clarabel, and dropped; no
//! solver workspace survives a tick. [`VariableLayout`] is the explicit
//! index map over the tick's decision vector
//! $z = [v_d \,|\, \tau \,|\, f_0 \dots f_{c-1} \,|\, \delta]$, whose
//! size follows the current contact plan.

use std::ops::Range;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use ndarray::{s, Array1, Array2};

use crate::error::ControlError;

/// Index layout of the decision vector for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    pub n_velocities: usize,
    pub n_actuators: usize,
    pub n_contacts: usize,
}

impl VariableLayout {
    pub fn new(n_velocities: usize, n_actuators: usize, n_contacts: usize) -> Self {
        VariableLayout {
            n_velocities,
            n_actuators,
            n_contacts,
        }
    }

    /// Generalized accelerations $v_d$.
    pub fn vd(&self) -> Range<usize> {
        0..self.n_velocities
    }

    /// Actuator torques $\tau$.
    pub fn tau(&self) -> Range<usize> {
        self.n_velocities..self.n_velocities + self.n_actuators
    }

    /// The 3-vector contact force of contact slot `j` (one slot per
    /// contact foot, ascending foot order).
    pub fn contact_force(&self, j: usize) -> Range<usize> {
        assert!(j < self.n_contacts, "contact slot out of range");
        let start = self.n_velocities + self.n_actuators + 3 * j;
        start..start + 3
    }

    /// The scalar CLF relaxation slack $\delta$.
    pub fn delta(&self) -> usize {
        self.n_velocities + self.n_actuators + 3 * self.n_contacts
    }

    /// Total decision-vector dimension.
    pub fn n_total(&self) -> usize {
        self.delta() + 1
    }
}

/// Dense accumulator for one tick's convex QP
/// $\min \tfrac{1}{2} z^\text{T} P z + q^\text{T} z$ subject to linear
/// equalities and inequalities.
pub struct QuadraticProgram {
    n: usize,
    hessian: Array2<f64>,
    gradient: Array1<f64>,
    eq_rows: Vec<Array1<f64>>,
    eq_rhs: Vec<f64>,
    ineq_rows: Vec<Array1<f64>>,
    ineq_rhs: Vec<f64>,
}

impl QuadraticProgram {
    pub fn new(n: usize) -> Self {
        QuadraticProgram {
            n,
            hessian: Array2::zeros((n, n)),
            gradient: Array1::zeros(n),
            eq_rows: Vec::new(),
            eq_rhs: Vec::new(),
            ineq_rows: Vec::new(),
            ineq_rhs: Vec::new(),
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of equality rows added so far.
    pub fn n_equalities(&self) -> usize {
        self.eq_rows.len()
    }

    /// Number of inequality rows added so far.
    pub fn n_inequalities(&self) -> usize {
        self.ineq_rows.len()
    }

    /// Add $w \, \lVert A z_\text{cols} - b \rVert^2$ to the cost.
    pub fn add_least_squares(
        &mut self,
        cols: Range<usize>,
        a_mat: &Array2<f64>,
        b: &Array1<f64>,
        weight: f64,
    ) {
        assert_eq!(a_mat.ncols(), cols.len());
        assert_eq!(a_mat.nrows(), b.len());
        let ata = a_mat.t().dot(a_mat) * (2. * weight);
        let atb = a_mat.t().dot(b) * (2. * weight);
        let mut h = self.hessian.slice_mut(s![cols.clone(), cols.clone()]);
        h += &ata;
        let mut g = self.gradient.slice_mut(s![cols]);
        g -= &atb;
    }

    /// Add $g^\text{T} z_\text{cols}$ to the cost.
    pub fn add_linear_cost(&mut self, cols: Range<usize>, g: &Array1<f64>) {
        assert_eq!(g.len(), cols.len());
        let mut grad = self.gradient.slice_mut(s![cols]);
        grad += g;
    }

    /// Add equality rows $A z = b$ (full-width $A$).
    pub fn add_equality(&mut self, a_mat: &Array2<f64>, b: &Array1<f64>) {
        assert_eq!(a_mat.ncols(), self.n);
        assert_eq!(a_mat.nrows(), b.len());
        for (row, &rhs) in a_mat.rows().into_iter().zip(b.iter()) {
            self.eq_rows.push(row.to_owned());
            self.eq_rhs.push(rhs);
        }
    }

    /// Add inequality rows $A z \le b$ (full-width $A$).
    pub fn add_inequality(&mut self, a_mat: &Array2<f64>, b: &Array1<f64>) {
        assert_eq!(a_mat.ncols(), self.n);
        assert_eq!(a_mat.nrows(), b.len());
        for (row, &rhs) in a_mat.rows().into_iter().zip(b.iter()) {
            self.ineq_rows.push(row.to_owned());
            self.ineq_rhs.push(rhs);
        }
    }

    /// Solve and consume the program.
    ///
    /// Anything short of an optimal (or almost-optimal) Clarabel status
    /// is surfaced as [`ControlError::SolveFailed`]; there is no partial
    /// answer to return.
    pub fn solve(self) -> Result<Array1<f64>, ControlError> {
        let n_eq = self.eq_rows.len();
        let n_ineq = self.ineq_rows.len();

        let mut a_all = Array2::zeros((n_eq + n_ineq, self.n));
        let mut b_all = Vec::with_capacity(n_eq + n_ineq);
        for (i, row) in self.eq_rows.iter().chain(self.ineq_rows.iter()).enumerate() {
            a_all.row_mut(i).assign(row);
        }
        b_all.extend_from_slice(&self.eq_rhs);
        b_all.extend_from_slice(&self.ineq_rhs);

        let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_ineq > 0 {
            cones.push(NonnegativeConeT(n_ineq));
        }

        let p_csc = to_csc_upper_tri(&self.hessian);
        let a_csc = to_csc(&a_all);
        let q: Vec<f64> = self.gradient.iter().copied().collect();

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .build()
            .expect("valid solver settings");

        let mut solver = DefaultSolver::new(&p_csc, &q, &a_csc, &b_all, &cones, settings)
            .map_err(|e| ControlError::SolveFailed(format!("{e:?}")))?;
        solver.solve();

        match solver.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                Ok(Array1::from_vec(solver.solution.x.clone()))
            }
            status => Err(ControlError::SolveFailed(format!("{status:?}"))),
        }
    }
}

/// Convert a dense matrix to Clarabel CSC form (all entries).
fn to_csc(m: &Array2<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.dim();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[[i, j]];
            if v != 0. {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Convert a symmetric dense matrix to upper-triangular CSC form, as
/// Clarabel expects for the cost Hessian.
fn to_csc_upper_tri(m: &Array2<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.dim();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[[i, j]];
            if v != 0. {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
