//! Defect-based local error estimators.
//!
//! For a step composed of exponentials `E_j = exp(dt B_j)`, the defect of the numerical flow
//! is integrated with a Hermite quadrature whose only non-vanishing term is at the end of the
//! step. The building blocks here act on one exponential factor at a time; the schemes chain
//! them over their factors and finish with [finish].

use crate::{
    error::{ExpopropError, SchemeError},
    expmv::{expmv_inplace, KrylovWorkspace},
    scalar::scalar,
    OperatorState, StateVector, TimeDependentOperator,
};

/// Highest order supported by the Gamma estimator.
pub const MAX_GAMMA_ORDER: usize = 6;

/// Scratch vectors needed by [gamma_factor] and [trapezoidal_factor].
pub const DEFECT_SCRATCH: usize = 5;

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Coefficients `dt^(k+1) / (k+1)!` of the truncated Gamma series, and its length.
///
/// The modified variants extend orders 2 and 4 by one term with the coefficient replaced by
/// `dt^3 / 4` and `dt^5 / 144` respectively.
fn gamma_coefficients(
    order: usize,
    dt: f64,
    modified: bool,
) -> Result<([f64; MAX_GAMMA_ORDER], usize), ExpopropError> {
    if order > MAX_GAMMA_ORDER {
        return Err(ExpopropError::from(SchemeError::DefectOrderTooHigh {
            order,
        }));
    }
    let mut coefficients = [0.0; MAX_GAMMA_ORDER];
    let mut term = 1.0;
    for (k, c) in coefficients.iter_mut().enumerate() {
        term *= dt / (k + 1) as f64;
        *c = term;
    }
    let q = match (order, modified) {
        (2, true) => {
            coefficients[2] = dt.powi(3) / 4.0;
            3
        }
        (4, true) => {
            coefficients[4] = dt.powi(5) / 144.0;
            5
        }
        _ => order,
    };
    Ok((coefficients, q))
}

/// `r = Gamma v`, the truncated series
///
/// $$
/// B v + \sum_{k=0}^{q-1} \frac{dt^{k+1}}{(k+1)!} \sum_{i=0}^{k} (-1)^i \binom{k}{i} B^{k-i} B' B^i v
/// $$
///
/// evaluated per `i` by Horner's rule in `B`. `scratch` needs four vectors.
#[allow(clippy::too_many_arguments)]
pub fn gamma<B: OperatorState, D: OperatorState>(
    r: &mut StateVector,
    b: &B,
    bd: &D,
    v: &StateVector,
    order: usize,
    dt: f64,
    modified: bool,
    scratch: &mut [StateVector],
) -> Result<(), ExpopropError> {
    let (coefficients, q) = gamma_coefficients(order, dt, modified)?;
    let found = scratch.len();
    let [s, w, u, tmp, ..] = scratch else {
        return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
            required: 4,
            found,
        }));
    };
    let one = scalar(1.0);
    b.apply_inplace(v, r);
    s.copy_from(v);
    for i in 0..q {
        if i > 0 {
            b.apply_inplace(s, tmp);
            std::mem::swap(s, tmp);
        }
        bd.apply_inplace(s, w);
        let top = q - 1 - i;
        u.copy_from(w);
        *u *= scalar(coefficients[top + i] * binomial(top + i, i));
        for m in (0..top).rev() {
            b.apply_inplace(u, tmp);
            tmp.axpy(scalar(coefficients[m + i] * binomial(m + i, i)), w, one);
            std::mem::swap(u, tmp);
        }
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        r.axpy(scalar(sign), u, one);
    }
    Ok(())
}

/// `r = (B v + dt B' v) / 2 + sign dt^2 / 12 (B B' v - B' B v)`, the end-point term of the
/// trapezoidal rule with its first derivative correction. `scratch` needs three vectors.
#[allow(clippy::too_many_arguments)]
pub fn trapezoidal<B: OperatorState, D: OperatorState>(
    r: &mut StateVector,
    b: &B,
    bd: &D,
    v: &StateVector,
    dt: f64,
    sign: f64,
    scratch: &mut [StateVector],
) -> Result<(), ExpopropError> {
    let found = scratch.len();
    let [t1, t2, t3, ..] = scratch else {
        return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
            required: 3,
            found,
        }));
    };
    let one = scalar(1.0);
    let c = sign * dt * dt / 12.0;
    b.apply_inplace(v, t1);
    bd.apply_inplace(v, t2);
    r.copy_from(t1);
    r.axpy(scalar(0.5 * dt), t2, scalar(0.5));
    b.apply_inplace(t2, t3);
    r.axpy(scalar(c), t3, one);
    bd.apply_inplace(t1, t3);
    r.axpy(scalar(-c), t3, one);
    Ok(())
}

/// Advance `psi` and `psi_est` through one exponential factor and accumulate its Gamma term.
///
/// `first` marks the first factor, for which `psi_est` is still zero.
#[allow(clippy::too_many_arguments)]
pub(crate) fn gamma_factor<B: OperatorState, D: OperatorState>(
    b: &B,
    bd: &D,
    psi: &mut StateVector,
    psi_est: &mut StateVector,
    first: bool,
    order: usize,
    dt: f64,
    modified: bool,
    krylov: &mut KrylovWorkspace,
    scratch: &mut [StateVector],
) -> Result<(), ExpopropError> {
    if !first {
        expmv_inplace(dt, b, psi_est, krylov)?;
    }
    expmv_inplace(dt, b, psi, krylov)?;
    let (r, rest) = split_first(scratch)?;
    gamma(r, b, bd, psi, order, dt, modified, rest)?;
    psi_est.axpy(scalar(1.0), r, scalar(1.0));
    Ok(())
}

/// Advance `psi` and `psi_est` through one exponential factor with the trapezoidal rule: the
/// start-point term is added before the exponential, the end-point term after it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn trapezoidal_factor<B: OperatorState, D: OperatorState>(
    b: &B,
    bd: &D,
    psi: &mut StateVector,
    psi_est: &mut StateVector,
    dt: f64,
    krylov: &mut KrylovWorkspace,
    scratch: &mut [StateVector],
) -> Result<(), ExpopropError> {
    let one = scalar(1.0);
    let (r, rest) = split_first(scratch)?;
    trapezoidal(r, b, bd, psi, dt, -1.0, rest)?;
    psi_est.axpy(one, r, one);
    expmv_inplace(dt, b, psi_est, krylov)?;
    expmv_inplace(dt, b, psi, krylov)?;
    trapezoidal(r, b, bd, psi, dt, 1.0, rest)?;
    psi_est.axpy(one, r, one);
    Ok(())
}

/// `psi_est = dt / (p + 1) (psi_est - A(t + dt) psi)`
pub(crate) fn finish<H: TimeDependentOperator>(
    op: &H,
    t: f64,
    dt: f64,
    order: usize,
    psi: &StateVector,
    psi_est: &mut StateVector,
    r: &mut StateVector,
) -> Result<(), ExpopropError> {
    op.evaluate(t + dt)?.apply_inplace(psi, r);
    psi_est.axpy(scalar(-1.0), r, scalar(1.0));
    *psi_est *= scalar(dt / (order + 1) as f64);
    Ok(())
}

pub(crate) fn split_first(
    scratch: &mut [StateVector],
) -> Result<(&mut StateVector, &mut [StateVector]), ExpopropError> {
    let found = scratch.len();
    scratch.split_first_mut().ok_or_else(|| {
        ExpopropError::from(SchemeError::WorkspaceTooSmall {
            required: DEFECT_SCRATCH,
            found,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_models::random_linear, DenseMatrix, TimeDependentOperator};

    fn pow(b: &DenseMatrix, k: usize) -> DenseMatrix {
        (0..k).fold(DenseMatrix::identity(b.nrows(), b.ncols()), |acc, _| acc * b)
    }

    #[test]
    fn binomials() {
        assert_eq!(binomial(4, 0), 1.0);
        assert_eq!(binomial(4, 2), 6.0);
        assert_eq!(binomial(5, 5), 1.0);
    }

    #[test]
    fn gamma_matches_dense_series() {
        let op = random_linear::operator(4);
        let b = op.evaluate_combination(0.1, &[0.0, 0.2], &[0.6, 0.4]).unwrap();
        let bd = op
            .evaluate_derivative_combination(0.1, &[0.0, 0.2], &[0.0, 0.4])
            .unwrap();
        let (bm, bdm) = (b.matrix(), bd.matrix());
        let dt: f64 = 0.3;
        let v = random_linear::initial_state(4);
        for order in 1..=MAX_GAMMA_ORDER {
            let mut expect = &bm * &v;
            let mut fact = 1.0;
            for k in 0..order {
                fact *= (k + 1) as f64;
                let mut term = DenseMatrix::zeros(4, 4);
                for i in 0..=k {
                    let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                    term += pow(&bm, k - i) * &bdm * pow(&bm, i)
                        * scalar(sign * binomial(k, i));
                }
                expect += term * &v * scalar(dt.powi(k as i32 + 1) / fact);
            }
            let mut r = StateVector::zeros(4);
            let mut scratch = vec![StateVector::zeros(4); 4];
            gamma(&mut r, &b, &bd, &v, order, dt, false, &mut scratch).unwrap();
            assert!((r - expect).norm() < 1e-13, "order {order}");
        }
    }

    #[test]
    fn modified_gamma_replaces_last_coefficient() {
        let (c, q) = gamma_coefficients(2, 0.5, true).unwrap();
        assert_eq!(q, 3);
        assert_eq!(c[0], 0.5);
        assert_eq!(c[1], 0.125);
        assert_eq!(c[2], 0.125 / 4.0);
        let (c, q) = gamma_coefficients(4, 1.0, true).unwrap();
        assert_eq!(q, 5);
        assert_eq!(c[4], 1.0 / 144.0);
        let (_, q) = gamma_coefficients(3, 1.0, true).unwrap();
        assert_eq!(q, 3);
    }

    #[test]
    fn gamma_above_order_six_is_a_configuration_error() {
        let err = gamma_coefficients(7, 0.1, false).err().unwrap();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn trapezoidal_matches_dense_formula() {
        let op = random_linear::operator(3);
        let b = op.evaluate(0.4).unwrap();
        let bd = op.evaluate_derivative_combination(0.4, &[0.0], &[0.5]).unwrap();
        let (bm, bdm) = (b.matrix(), bd.matrix());
        let v = random_linear::initial_state(3);
        let dt = 0.2;
        let expect = (&bm * &v + &bdm * &v * scalar(dt)) * scalar(0.5)
            + (&bm * &bdm - &bdm * &bm) * &v * scalar(dt * dt / 12.0);
        let mut r = StateVector::zeros(3);
        let mut scratch = vec![StateVector::zeros(3); 3];
        trapezoidal(&mut r, &b, &bd, &v, dt, 1.0, &mut scratch).unwrap();
        assert!((r - expect).norm() < 1e-14);
    }
}
