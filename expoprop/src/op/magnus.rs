use std::cell::{RefCell, RefMut};

use crate::{
    error::{ExpopropError, OperatorError, SchemeError},
    scalar::scalar,
    ElementType, Op, OperatorState, StateVector,
};

/// Commutator coefficient of the fourth-order Magnus exponent.
pub const MAGNUS4_COMMUTATOR: f64 = 0.144_337_567_297_406_44; // sqrt(3) / 12

/// Number of scratch vectors borrowed by [Magnus4State] and [Magnus4DerivativeState].
pub const MAGNUS4_SCRATCH: usize = 5;

fn check_scratch(scratch: &RefCell<Vec<StateVector>>, n: usize) -> Result<(), ExpopropError> {
    let scratch = scratch.borrow();
    if scratch.len() < MAGNUS4_SCRATCH {
        return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
            required: MAGNUS4_SCRATCH,
            found: scratch.len(),
        }));
    }
    if let Some(v) = scratch.iter().find(|v| v.len() != n) {
        return Err(ExpopropError::from(OperatorError::DimensionMismatch {
            expected: n,
            found: v.len(),
        }));
    }
    Ok(())
}

/// Borrow the scratch vectors, regrowing them if they were shrunk after construction.
fn borrow_scratch(
    scratch: &RefCell<Vec<StateVector>>,
    n: usize,
) -> RefMut<'_, Vec<StateVector>> {
    let mut scratch = scratch.borrow_mut();
    if scratch.len() < MAGNUS4_SCRATCH {
        scratch.resize(MAGNUS4_SCRATCH, StateVector::zeros(n));
    }
    scratch
}

/// The fourth-order Magnus exponent built from two snapshots `A1 = A(t + c1 dt)` and
/// `A2 = A(t + c2 dt)` at the Gauss nodes
///
/// $$
/// \Omega/dt = \frac{1}{2}(A_1 + A_2) + \frac{\sqrt{3}}{12} dt (A_2 A_1 - A_1 A_2)
/// $$
///
/// Each application costs four sub-applications and two scratch vectors borrowed from the
/// stepper workspace.
pub struct Magnus4State<'w, S: OperatorState> {
    a1: S,
    a2: S,
    dt: f64,
    scratch: &'w RefCell<Vec<StateVector>>,
}

impl<'w, S: OperatorState> Magnus4State<'w, S> {
    pub fn new(
        a1: S,
        a2: S,
        dt: f64,
        scratch: &'w RefCell<Vec<StateVector>>,
    ) -> Result<Self, ExpopropError> {
        check_scratch(scratch, a1.nstates())?;
        Ok(Self {
            a1,
            a2,
            dt,
            scratch,
        })
    }
}

impl<S: OperatorState> Op for Magnus4State<'_, S> {
    fn nstates(&self) -> usize {
        self.a1.nstates()
    }
    fn nout(&self) -> usize {
        self.a1.nout()
    }
    fn element_type(&self) -> ElementType {
        self.a1.element_type()
    }
}

impl<S: OperatorState> OperatorState for Magnus4State<'_, S> {
    fn apply_inplace(&self, x: &StateVector, y: &mut StateVector) {
        let f = MAGNUS4_COMMUTATOR * self.dt;
        let mut scratch = borrow_scratch(self.scratch, x.len());
        let [t1, t2, ..] = scratch.as_mut_slice() else {
            unreachable!("scratch holds at least {MAGNUS4_SCRATCH} vectors");
        };
        self.a1.apply_inplace(x, t1);
        self.a2.apply_inplace(x, t2);
        // y = -f A1 A2 x + (t1 + t2) / 2
        self.a1.apply_inplace(t2, y);
        *y *= scalar(-f);
        y.axpy(scalar(0.5), t1, scalar(1.0));
        y.axpy(scalar(0.5), t2, scalar(1.0));
        // y += f A2 A1 x
        self.a2.apply_inplace(t1, t2);
        y.axpy(scalar(f), t2, scalar(1.0));
    }
}

/// Time derivative (with respect to the step size) of the scaled Magnus exponent
/// `Omega(dt) / dt`.
///
/// With `D_k = c_k A'(t + c_k dt)` this is
///
/// $$
/// \frac{1}{2}(D_1 + D_2) + f (A_2 A_1 - A_1 A_2) + f dt (D_2 A_1 + A_2 D_1 - D_1 A_2 - A_1 D_2)
/// $$
///
/// evaluated with eight sub-applications and five scratch vectors.
pub struct Magnus4DerivativeState<'w, S: OperatorState> {
    a1: S,
    a2: S,
    d1: S,
    d2: S,
    dt: f64,
    scratch: &'w RefCell<Vec<StateVector>>,
}

impl<'w, S: OperatorState> Magnus4DerivativeState<'w, S> {
    /// `d1` and `d2` must already carry the node factors `c_k`.
    pub fn new(
        a1: S,
        a2: S,
        d1: S,
        d2: S,
        dt: f64,
        scratch: &'w RefCell<Vec<StateVector>>,
    ) -> Result<Self, ExpopropError> {
        check_scratch(scratch, a1.nstates())?;
        Ok(Self {
            a1,
            a2,
            d1,
            d2,
            dt,
            scratch,
        })
    }
}

impl<S: OperatorState> Op for Magnus4DerivativeState<'_, S> {
    fn nstates(&self) -> usize {
        self.a1.nstates()
    }
    fn nout(&self) -> usize {
        self.a1.nout()
    }
    fn element_type(&self) -> ElementType {
        self.a1.element_type()
    }
}

impl<S: OperatorState> OperatorState for Magnus4DerivativeState<'_, S> {
    fn apply_inplace(&self, x: &StateVector, y: &mut StateVector) {
        let f = MAGNUS4_COMMUTATOR;
        let dt = scalar(self.dt);
        let one = scalar(1.0);
        let mut scratch = borrow_scratch(self.scratch, x.len());
        let [a, b, da, db, tmp, ..] = scratch.as_mut_slice() else {
            unreachable!("scratch holds at least {MAGNUS4_SCRATCH} vectors");
        };
        self.a1.apply_inplace(x, a);
        self.a2.apply_inplace(x, b);
        self.d1.apply_inplace(x, da);
        self.d2.apply_inplace(x, db);
        y.copy_from(da);
        y.axpy(scalar(0.5), db, scalar(0.5));
        // da = a + dt da, db = b + dt db
        da.axpy(one, a, dt);
        db.axpy(one, b, dt);
        self.a2.apply_inplace(da, tmp);
        y.axpy(scalar(f), tmp, one);
        self.a1.apply_inplace(db, tmp);
        y.axpy(scalar(-f), tmp, one);
        self.d2.apply_inplace(a, tmp);
        y.axpy(scalar(f * self.dt), tmp, one);
        self.d1.apply_inplace(b, tmp);
        y.axpy(scalar(-f * self.dt), tmp, one);
    }
}
