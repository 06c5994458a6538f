use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    error::{ExpopropError, OperatorError},
    scalar::scalar,
    DenseMatrix, OperatorState, Scalar, StateVector,
};

/// Accuracy and subspace size of the exponential-action kernel.
///
/// A tolerance of exactly zero selects the dense fallback: the snapshot is assembled as a dense
/// matrix and exponentiated with a Pade approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpmvConfig {
    pub tol: f64,
    pub m: usize,
}

impl Default for ExpmvConfig {
    fn default() -> Self {
        Self { tol: 1e-12, m: 30 }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExpmvStatistics {
    pub number_of_calls: usize,
    pub number_of_substeps: usize,
    pub number_of_dense_exponentials: usize,
}

/// Preallocated storage for the Krylov kernel: `m + 1` basis vectors, one work vector and the
/// `(m + 1) x m` Hessenberg matrix. Allocated once per stepper and never resized.
#[derive(Debug, Clone)]
pub struct KrylovWorkspace {
    config: ExpmvConfig,
    basis: Vec<StateVector>,
    w: StateVector,
    h: DenseMatrix,
    statistics: ExpmvStatistics,
}

impl KrylovWorkspace {
    pub fn new(n: usize, config: ExpmvConfig) -> Self {
        let m = config.m.min(n).max(1);
        Self {
            config,
            basis: vec![StateVector::zeros(n); m + 1],
            w: StateVector::zeros(n),
            h: DenseMatrix::zeros(m + 1, m),
            statistics: ExpmvStatistics::default(),
        }
    }

    pub fn config(&self) -> &ExpmvConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.w.len()
    }

    pub fn statistics(&self) -> &ExpmvStatistics {
        &self.statistics
    }
}

const BREAKDOWN_TOL: f64 = 1e-12;
const MIN_SUBSTEP_FRACTION: f64 = 1e-12;

/// Compute `y = exp(z A) x` for a snapshot `A`; see [expmv_inplace].
pub fn expmv<S: OperatorState + ?Sized>(
    y: &mut StateVector,
    z: f64,
    state: &S,
    x: &StateVector,
    ws: &mut KrylovWorkspace,
) -> Result<(), ExpopropError> {
    y.copy_from(x);
    expmv_inplace(z, state, y, ws)
}

/// Overwrite `v` with `exp(z A) v`, where `z` is a real (possibly negative) step and `A` a
/// snapshot.
///
/// The action is approximated by the Arnoldi method in a Krylov subspace of at most `m`
/// vectors. The a posteriori estimate `beta * h_{k+1,k} * tau * |[exp(tau H_k) e_1]_k|` is held
/// below `tol * beta * tau / |z|`; if the full step fails, `z` is split into sub-steps. A lucky
/// breakdown of the Arnoldi process gives the exact result for the sub-step. With `tol == 0`
/// the dense matrix exponential is used instead.
pub fn expmv_inplace<S: OperatorState + ?Sized>(
    z: f64,
    state: &S,
    v: &mut StateVector,
    ws: &mut KrylovWorkspace,
) -> Result<(), ExpopropError> {
    state.check_dimension(v)?;
    if ws.dimension() != v.len() {
        return Err(ExpopropError::from(OperatorError::DimensionMismatch {
            expected: v.len(),
            found: ws.dimension(),
        }));
    }
    ws.statistics.number_of_calls += 1;
    if z == 0.0 {
        return Ok(());
    }
    if ws.config.tol == 0.0 {
        ws.statistics.number_of_dense_exponentials += 1;
        debug!(n = v.len(), z, "dense matrix exponential");
        let e = (state.matrix() * scalar(z)).exp();
        let y = e * &*v;
        v.copy_from(&y);
        return Ok(());
    }

    let KrylovWorkspace {
        config,
        basis,
        w,
        h,
        statistics,
    } = ws;
    let m = basis.len() - 1;
    let tol = config.tol;
    let t_final = z.abs();
    let sign = z.signum();
    let mut t_now = 0.0;
    let mut tau = t_final;

    while t_now < t_final {
        let beta = v.norm();
        if beta == 0.0 {
            break;
        }
        if !beta.is_finite() {
            return Err(ExpopropError::from(OperatorError::NonFiniteExponential {
                time: t_now,
                z,
            }));
        }
        statistics.number_of_substeps += 1;

        // Arnoldi
        basis[0].copy_from(v);
        basis[0] *= scalar(1.0 / beta);
        h.fill(Scalar::zero());
        let mut k = m;
        let mut breakdown = false;
        for j in 0..m {
            state.apply_inplace(&basis[j], w);
            let wnorm = w.norm();
            for i in 0..=j {
                let hij = basis[i].dotc(w);
                h[(i, j)] = hij;
                w.axpy(-hij, &basis[i], scalar(1.0));
            }
            let hnext = w.norm();
            if hnext <= BREAKDOWN_TOL * wnorm {
                k = j + 1;
                breakdown = true;
                break;
            }
            h[(j + 1, j)] = scalar(hnext);
            basis[j + 1].copy_from(w);
            basis[j + 1] *= scalar(1.0 / hnext);
        }
        let hk = h.view((0, 0), (k, k)).into_owned();
        let h_last = if breakdown { 0.0 } else { h[(k, k - 1)].re };
        if !(h_last.is_finite() && hk.iter().all(|x| x.is_finite())) {
            return Err(ExpopropError::from(OperatorError::NonFiniteExponential {
                time: t_now,
                z,
            }));
        }

        // shrink the sub-step until the error estimate is met
        let remaining = t_final - t_now;
        tau = tau.min(remaining);
        let (e1, accepted_tau) = loop {
            let f = (hk.clone() * scalar(sign * tau)).exp();
            let err = beta * h_last * tau * f[(k - 1, 0)].norm();
            if !err.is_finite() {
                return Err(ExpopropError::from(OperatorError::NonFiniteExponential {
                    time: t_now,
                    z,
                }));
            }
            let allowed = tol * beta * tau / t_final;
            if err <= allowed {
                let grow = if err == 0.0 {
                    2.0
                } else {
                    (0.9 * (allowed / err).powf(1.0 / k as f64)).min(2.0)
                };
                let e1 = f.column(0).into_owned();
                let accepted = tau;
                tau = (tau * grow).max(accepted);
                break (e1, accepted);
            }
            if tau <= MIN_SUBSTEP_FRACTION * t_final {
                warn!(tau, err, allowed, "Krylov sub-step underflow, accepting step");
                let e1 = f.column(0).into_owned();
                break (e1, tau);
            }
            let shrink = (0.9 * (allowed / err).powf(1.0 / k as f64)).clamp(0.1, 0.9);
            tau *= shrink;
        };
        trace!(t_now, tau = accepted_tau, k, "Krylov sub-step");

        v.fill(Scalar::zero());
        for (i, b) in basis.iter().take(k).enumerate() {
            v.axpy(e1[i] * beta, b, scalar(1.0));
        }
        t_now += accepted_tau;
        if t_final - t_now <= f64::EPSILON * t_final {
            break;
        }
    }
    Ok(())
}
