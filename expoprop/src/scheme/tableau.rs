use nalgebra::{DMatrix, DVector};

use crate::error::{ExpopropError, SchemeError};

/// A butcher tableau for an explicit embedded Runge-Kutta method.
///
/// The tableau is defined by the matrix `a`, the vectors `b`, `c` and `d` and the order of the
/// method. For a 3-stage method it is depicted as
///
/// ```text
/// c1 | 0   0   0
/// c2 | a21 0   0
/// c3 | a31 a32 0
/// -------------------
///    | b1  b2  b3
///    | be1 be2 be3
/// -------------------
///    | d1  d2  d3
/// ```
///
/// where `be` is the embedded method for error control and `d = b - be` is the difference
/// between the main and embedded method.
#[derive(Debug, Clone)]
pub struct Tableau {
    a: DMatrix<f64>,
    b: DVector<f64>,
    c: DVector<f64>,
    d: DVector<f64>,
    order: usize,
}

impl Tableau {
    /// Dormand-Prince 5(4)
    /// from J.R. Dormand and P.J. Prince, A family of embedded Runge-Kutta formulae, J. Comp. Appl. Math. 6 (1980) 19-26.
    pub fn dopri5() -> Self {
        let c = DVector::from_vec(vec![
            0.0,
            1.0 / 5.0,
            3.0 / 10.0,
            4.0 / 5.0,
            8.0 / 9.0,
            1.0,
            1.0,
        ]);

        let b = DVector::from_vec(vec![
            35.0 / 384.0,
            0.0,
            500.0 / 1113.0,
            125.0 / 192.0,
            -2187.0 / 6784.0,
            11.0 / 84.0,
            0.0,
        ]);

        let b_hat = DVector::from_vec(vec![
            5179.0 / 57600.0,
            0.0,
            7571.0 / 16695.0,
            393.0 / 640.0,
            -92097.0 / 339200.0,
            187.0 / 2100.0,
            1.0 / 40.0,
        ]);
        let d = &b - &b_hat;

        let mut a = DMatrix::zeros(7, 7);
        a[(1, 0)] = 1.0 / 5.0;
        a[(2, 0)] = 3.0 / 40.0;
        a[(2, 1)] = 9.0 / 40.0;
        a[(3, 0)] = 44.0 / 45.0;
        a[(3, 1)] = -56.0 / 15.0;
        a[(3, 2)] = 32.0 / 9.0;
        a[(4, 0)] = 19372.0 / 6561.0;
        a[(4, 1)] = -25360.0 / 2187.0;
        a[(4, 2)] = 64448.0 / 6561.0;
        a[(4, 3)] = -212.0 / 729.0;
        a[(5, 0)] = 9017.0 / 3168.0;
        a[(5, 1)] = -355.0 / 33.0;
        a[(5, 2)] = 46732.0 / 5247.0;
        a[(5, 3)] = 49.0 / 176.0;
        a[(5, 4)] = -5103.0 / 18656.0;
        for j in 0..6 {
            a[(6, j)] = b[j];
        }

        Self::new(a, b, c, d, 5)
    }

    /// Tsitouras 5(4)
    /// from Ch. Tsitouras, Runge-Kutta pairs of order 5(4) satisfying only the first column simplifying assumption, Comput. Math. Appl. 62 (2011) 770-775.
    pub fn tsit45() -> Self {
        let c = DVector::from_vec(vec![
            0.0,
            0.161,
            0.327,
            0.9,
            0.9800255409045097,
            1.0,
            1.0,
        ]);

        let b = DVector::from_vec(vec![
            0.09646076681806523,
            0.01,
            0.4798896504144996,
            1.379008574103742,
            -3.290069515436081,
            2.324710524099774,
            0.0,
        ]);

        let d = DVector::from_vec(vec![
            -0.001_780_011_052_225_777,
            -0.0008164344596567469,
            0.007880878010261995,
            -0.1447110071732629,
            0.5823571654525552,
            -0.45808210592918697,
            0.015151515151515152,
        ]);

        let mut a = DMatrix::zeros(7, 7);
        a[(2, 1)] = 0.335_480_655_492_357;
        a[(3, 1)] = -6.359448489975075;
        a[(4, 1)] = -11.74888356406283;
        a[(5, 1)] = -12.92096931784711;
        a[(3, 2)] = 4.362295432869581;
        a[(4, 2)] = 7.495539342889836;
        a[(5, 2)] = 8.159367898576159;
        a[(4, 3)] = -0.09249506636175525;
        a[(5, 3)] = -0.071_584_973_281_401;
        a[(5, 4)] = -0.02826905039406838;
        for i in 1..6 {
            let a_sum: f64 = (1..i).map(|j| a[(i, j)]).sum();
            a[(i, 0)] = c[i] - a_sum;
        }
        for j in 0..6 {
            a[(6, j)] = b[j];
        }

        Self::new(a, b, c, d, 5)
    }

    pub fn new(a: DMatrix<f64>, b: DVector<f64>, c: DVector<f64>, d: DVector<f64>, order: usize) -> Self {
        let s = c.len();
        assert_eq!(a.ncols(), s, "Invalid number of rows in a, expected {s}");
        assert_eq!(a.nrows(), s, "Invalid number of columns in a, expected {s}",);
        assert_eq!(b.len(), s, "Invalid number of elements in b, expected {s}",);
        assert_eq!(d.len(), s, "Invalid number of elements in d, expected {s}",);
        Self { a, b, c, d, order }
    }

    /// Fail unless `a` is strictly lower triangular and all coefficients are finite.
    pub fn check_explicit(&self) -> Result<(), ExpopropError> {
        let s = self.s();
        for i in 0..s {
            for j in i..s {
                if self.a[(i, j)] != 0.0 {
                    return Err(crate::scheme_error!(
                        InvalidTableau,
                        format!("a[{i}, {j}] = {} makes the method implicit", self.a[(i, j)])
                    ));
                }
            }
        }
        let finite = self
            .a
            .iter()
            .chain(self.b.iter())
            .chain(self.c.iter())
            .chain(self.d.iter())
            .all(|x| x.is_finite());
        if !finite {
            return Err(crate::scheme_error!(InvalidTableau, "coefficients must be finite"));
        }
        Ok(())
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn s(&self) -> usize {
        self.c.len()
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn c(&self) -> &DVector<f64> {
        &self.c
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_consistency(tableau: &Tableau) {
        let s = tableau.s();
        assert!((tableau.b().sum() - 1.0).abs() < 1e-12);
        assert!(tableau.d().sum().abs() < 1e-12);
        for i in 0..s {
            let row: f64 = tableau.a().row(i).sum();
            assert!((row - tableau.c()[i]).abs() < 1e-12, "row {i}");
        }
        // quadrature conditions of the main method up to its order
        for k in 1..=tableau.order() {
            let moment: f64 = (0..s)
                .map(|i| tableau.b()[i] * tableau.c()[i].powi(k as i32 - 1))
                .sum();
            assert!((moment - 1.0 / k as f64).abs() < 1e-12, "moment {k}");
        }
        tableau.check_explicit().unwrap();
    }

    #[test]
    fn presets_are_consistent() {
        check_consistency(&Tableau::dopri5());
        check_consistency(&Tableau::tsit45());
    }

    #[test]
    fn implicit_tableau_is_rejected() {
        let mut a = DMatrix::zeros(2, 2);
        a[(0, 0)] = 0.5;
        a[(1, 0)] = 0.5;
        a[(1, 1)] = 0.5;
        let b = DVector::from_vec(vec![0.5, 0.5]);
        let c = DVector::from_vec(vec![0.5, 1.0]);
        let d = DVector::zeros(2);
        let tableau = Tableau::new(a, b, c, d, 2);
        assert!(tableau.check_explicit().err().unwrap().is_configuration_error());
    }
}
