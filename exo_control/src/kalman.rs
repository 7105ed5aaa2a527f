//! Linear Kalman filter for per-actuator motion estimation.
//!
//! N states (the four control variables), M measurements (one per fused
//! sensor). The transition matrix starts as identity and is
//! reparameterized every control tick with the measured time delta; the
//! measurement map is sparse one-hot, fixed at construction from each
//! sensor's declared variable.
//!
//! Every matrix, vector and scratch buffer is allocated at construction:
//! `predict`/`update` run allocation-free inside the control thread. A
//! singular innovation covariance skips the correction for that tick and
//! leaves the prediction standing; NaN is never propagated.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

/// Covariance diagonal after reset (uninformative prior).
const INITIAL_COVARIANCE: f64 = 1000.0;

/// Process noise diagonal.
const PROCESS_NOISE: f64 = 1e-6;

/// Pivot magnitude below which the innovation covariance counts as
/// singular.
const SINGULARITY_EPS: f64 = 1e-12;

/// Fixed-dimension linear Kalman filter.
pub struct KalmanFilter {
    states: usize,
    measures: usize,

    x: DVector<f64>,
    p: DMatrix<f64>,
    a: DMatrix<f64>,
    a_t: DMatrix<f64>,
    q: DMatrix<f64>,
    h: DMatrix<f64>,
    r: DMatrix<f64>,
    z: DVector<f64>,

    // Scratch buffers for the hot path.
    x_prior: DVector<f64>,
    ap: DMatrix<f64>,
    p_next: DMatrix<f64>,
    p_t: DMatrix<f64>,
    hx: DVector<f64>,
    y: DVector<f64>,
    hp: DMatrix<f64>,
    ph_t: DMatrix<f64>,
    s: DMatrix<f64>,
    s_inv: DMatrix<f64>,
    k: DMatrix<f64>,
    kh: DMatrix<f64>,
    i_kh: DMatrix<f64>,
}

impl KalmanFilter {
    /// Filter with `states` state entries and `measures` measurement rows.
    pub fn new(states: usize, measures: usize) -> Self {
        Self {
            states,
            measures,
            x: DVector::zeros(states),
            p: DMatrix::identity(states, states) * INITIAL_COVARIANCE,
            a: DMatrix::identity(states, states),
            a_t: DMatrix::identity(states, states),
            q: DMatrix::identity(states, states) * PROCESS_NOISE,
            h: DMatrix::zeros(measures, states),
            r: DMatrix::identity(measures, measures),
            z: DVector::zeros(measures),
            x_prior: DVector::zeros(states),
            ap: DMatrix::zeros(states, states),
            p_next: DMatrix::zeros(states, states),
            p_t: DMatrix::zeros(states, states),
            hx: DVector::zeros(measures),
            y: DVector::zeros(measures),
            hp: DMatrix::zeros(measures, states),
            ph_t: DMatrix::zeros(states, measures),
            s: DMatrix::zeros(measures, measures),
            s_inv: DMatrix::zeros(measures, measures),
            k: DMatrix::zeros(states, measures),
            kh: DMatrix::zeros(states, states),
            i_kh: DMatrix::zeros(states, states),
        }
    }

    /// Number of state entries.
    pub fn states_number(&self) -> usize {
        self.states
    }

    /// Number of measurement rows.
    pub fn measures_number(&self) -> usize {
        self.measures
    }

    /// Bind measurement row `measure` to state `state` with standard
    /// deviation `deviation`: `H[measure,state] = 1`, `R[m,m] = σ²`.
    pub fn set_measure_weight(&mut self, measure: usize, state: usize, deviation: f64) {
        if measure >= self.measures || state >= self.states {
            return;
        }
        for column in 0..self.states {
            self.h[(measure, column)] = 0.0;
        }
        self.h[(measure, state)] = 1.0;
        self.r[(measure, measure)] = deviation * deviation;
    }

    /// Set `A[i,j]` for this tick (and keep `Aᵀ` in step).
    pub fn set_transition_factor(&mut self, i: usize, j: usize, value: f64) {
        if i >= self.states || j >= self.states {
            return;
        }
        self.a[(i, j)] = value;
        self.a_t[(j, i)] = value;
    }

    /// Stage measurement `value` for row `measure`.
    pub fn set_measure(&mut self, measure: usize, value: f64) {
        if measure < self.measures {
            self.z[measure] = value;
        }
    }

    /// Time update: `x ← Ax`, `P ← APAᵀ + Q`. Writes the predicted state
    /// to `out`.
    pub fn predict(&mut self, out: &mut [f64]) {
        self.x_prior.gemm(1.0, &self.a, &self.x, 0.0);
        self.x.copy_from(&self.x_prior);

        self.ap.gemm(1.0, &self.a, &self.p, 0.0);
        self.p_next.gemm(1.0, &self.ap, &self.a_t, 0.0);
        self.p.copy_from(&self.p_next);
        self.p += &self.q;

        self.export(out);
    }

    /// Measurement update from the staged measurement vector. Writes the
    /// posterior state to `out` and returns true; on a singular innovation
    /// covariance (or a non-finite result) the correction is skipped, the
    /// prediction is kept and false is returned.
    pub fn update(&mut self, out: &mut [f64]) -> bool {
        if self.measures == 0 {
            self.export(out);
            return true;
        }

        // Innovation y = z - Hx.
        self.hx.gemm(1.0, &self.h, &self.x, 0.0);
        self.y.copy_from(&self.z);
        self.y -= &self.hx;

        // S = H P Hᵀ + R, with P Hᵀ = (H P)ᵀ by symmetry of P.
        self.hp.gemm(1.0, &self.h, &self.p, 0.0);
        self.hp.transpose_to(&mut self.ph_t);
        self.s.copy_from(&self.r);
        self.s.gemm(1.0, &self.h, &self.ph_t, 1.0);

        if !invert_in_place(&mut self.s, &mut self.s_inv) {
            warn!("singular innovation covariance, skipping correction");
            self.export(out);
            return false;
        }

        // K = P Hᵀ S⁻¹.
        self.k.gemm(1.0, &self.ph_t, &self.s_inv, 0.0);

        // x ← x + Ky, guarded against numerical blow-up.
        self.x_prior.copy_from(&self.x);
        self.x.gemm(1.0, &self.k, &self.y, 1.0);
        if self.x.iter().any(|value| !value.is_finite()) {
            warn!("non-finite state after correction, keeping prediction");
            self.x.copy_from(&self.x_prior);
            self.export(out);
            return false;
        }

        // P ← (I - KH) P, re-symmetrized.
        self.kh.gemm(1.0, &self.k, &self.h, 0.0);
        self.i_kh.fill_with_identity();
        self.i_kh -= &self.kh;
        self.p_next.gemm(1.0, &self.i_kh, &self.p, 0.0);
        self.p.copy_from(&self.p_next);
        self.p.transpose_to(&mut self.p_t);
        self.p += &self.p_t;
        self.p *= 0.5;

        self.export(out);
        true
    }

    /// Zero the state, restore the uninformative covariance, clear staged
    /// measurements.
    pub fn reset(&mut self) {
        self.x.fill(0.0);
        self.z.fill(0.0);
        self.p.fill(0.0);
        self.p.fill_diagonal(INITIAL_COVARIANCE);
    }

    /// Current state estimate.
    pub fn state(&self) -> &DVector<f64> {
        &self.x
    }

    /// Current covariance.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.p
    }

    fn export(&self, out: &mut [f64]) {
        let n = out.len().min(self.states);
        out[..n].copy_from_slice(&self.x.as_slice()[..n]);
    }
}

/// Gauss-Jordan inversion with partial pivoting; `a` is destroyed, the
/// inverse lands in `inv`. Returns false on a singular pivot.
fn invert_in_place(a: &mut DMatrix<f64>, inv: &mut DMatrix<f64>) -> bool {
    let n = a.nrows();
    inv.fill(0.0);
    inv.fill_diagonal(1.0);
    for column in 0..n {
        let mut pivot_row = column;
        let mut best = a[(column, column)].abs();
        for row in (column + 1)..n {
            let magnitude = a[(row, column)].abs();
            if magnitude > best {
                best = magnitude;
                pivot_row = row;
            }
        }
        if best < SINGULARITY_EPS || !best.is_finite() {
            return false;
        }
        if pivot_row != column {
            a.swap_rows(pivot_row, column);
            inv.swap_rows(pivot_row, column);
        }
        let pivot = a[(column, column)];
        for j in 0..n {
            a[(column, j)] /= pivot;
            inv[(column, j)] /= pivot;
        }
        for row in 0..n {
            if row == column {
                continue;
            }
            let factor = a[(row, column)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[(row, j)] -= factor * a[(column, j)];
                inv[(row, j)] -= factor * inv[(column, j)];
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_common::types::CONTROL_VARS_NUMBER;

    const POSITION: usize = 0;
    const VELOCITY: usize = 1;
    const ACCELERATION: usize = 2;

    fn position_filter() -> KalmanFilter {
        let mut filter = KalmanFilter::new(CONTROL_VARS_NUMBER, 1);
        filter.set_measure_weight(0, POSITION, 0.1);
        filter
    }

    fn step(filter: &mut KalmanFilter, dt: f64, measurement: f64, out: &mut [f64]) -> bool {
        filter.set_transition_factor(POSITION, VELOCITY, dt);
        filter.set_transition_factor(POSITION, ACCELERATION, dt * dt / 2.0);
        filter.set_transition_factor(VELOCITY, ACCELERATION, dt);
        filter.set_measure(0, measurement);
        filter.predict(out);
        filter.update(out)
    }

    #[test]
    fn converges_to_constant_measurement() {
        let mut filter = position_filter();
        let mut out = [0.0; CONTROL_VARS_NUMBER];
        for _ in 0..500 {
            assert!(step(&mut filter, 0.005, 2.0, &mut out));
        }
        assert!((out[POSITION] - 2.0).abs() < 1e-2, "position {}", out[POSITION]);
        assert!(out[VELOCITY].abs() < 0.5, "velocity {}", out[VELOCITY]);
    }

    #[test]
    fn estimates_velocity_from_position_ramp() {
        let mut filter = position_filter();
        let mut out = [0.0; CONTROL_VARS_NUMBER];
        let dt = 0.005;
        for i in 0..2000 {
            let t = i as f64 * dt;
            step(&mut filter, dt, 3.0 * t, &mut out);
        }
        assert!((out[VELOCITY] - 3.0).abs() < 0.2, "velocity {}", out[VELOCITY]);
    }

    #[test]
    fn covariance_stays_symmetric_psd() {
        let mut filter = position_filter();
        let mut out = [0.0; CONTROL_VARS_NUMBER];
        for i in 0..200 {
            step(&mut filter, 0.003 + 0.001 * (i % 3) as f64, (i as f64).sin(), &mut out);
            let p = filter.covariance();
            for i in 0..CONTROL_VARS_NUMBER {
                for j in 0..CONTROL_VARS_NUMBER {
                    assert!((p[(i, j)] - p[(j, i)]).abs() < 1e-9, "asymmetric at ({i},{j})");
                }
                assert!(p[(i, i)] >= -1e-9, "negative variance at {i}");
            }
            // Quadratic form spot checks.
            for probe in [[1.0, 0.0, 0.0, 0.0], [1.0, -1.0, 0.5, 0.25]] {
                let v = DVector::from_row_slice(&probe);
                let quad = (v.transpose() * p * &v)[(0, 0)];
                assert!(quad >= -1e-6, "indefinite covariance: {quad}");
            }
        }
    }

    #[test]
    fn singular_innovation_skips_correction() {
        // Two exact duplicate observations of the same state make S rank
        // deficient once the covariance collapses to zero noise.
        let mut filter = KalmanFilter::new(2, 2);
        filter.set_measure_weight(0, 0, 0.0);
        filter.set_measure_weight(1, 0, 0.0);
        // Zero covariance: S = HPHᵀ + R = 0.
        filter.p.fill(0.0);
        filter.set_measure(0, 1.0);
        filter.set_measure(1, 1.0);
        let mut out = [0.0; 2];
        assert!(!filter.update(&mut out));
        // Prediction (zero state) is left standing.
        assert_eq!(out, [0.0; 2]);
    }

    #[test]
    fn reset_restores_initial_conditions() {
        let mut filter = position_filter();
        let mut out = [0.0; CONTROL_VARS_NUMBER];
        for _ in 0..50 {
            step(&mut filter, 0.005, 5.0, &mut out);
        }
        filter.reset();
        assert!(filter.state().iter().all(|v| *v == 0.0));
        let p = filter.covariance();
        assert_eq!(p[(0, 0)], INITIAL_COVARIANCE);
        assert_eq!(p[(0, 1)], 0.0);
    }

    #[test]
    fn zero_measure_filter_predicts_only() {
        let mut filter = KalmanFilter::new(CONTROL_VARS_NUMBER, 0);
        let mut out = [0.0; CONTROL_VARS_NUMBER];
        filter.predict(&mut out);
        assert!(filter.update(&mut out));
        assert_eq!(out, [0.0; CONTROL_VARS_NUMBER]);
    }

    #[test]
    fn measurement_weight_is_one_hot() {
        let mut filter = KalmanFilter::new(4, 2);
        filter.set_measure_weight(0, 1, 0.5);
        filter.set_measure_weight(0, 3, 0.5);
        assert_eq!(filter.h[(0, 1)], 0.0);
        assert_eq!(filter.h[(0, 3)], 1.0);
        assert_eq!(filter.r[(0, 0)], 0.25);
    }
}
