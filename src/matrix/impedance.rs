//! Impedance matrix by dense inversion, used by the composite identifier's
//! electrical-distance computation.
//!
//! Unlike the Kron reduction's `Y_nn` (which can be the whole network and
//! must stay sparse), the impedance matrix is only ever computed over the
//! already-reduced generator-bus admittance matrix, which is small by
//! construction (one row/column per generator). A direct dense inverse is
//! the idiomatic choice here, the same way `nalgebra`'s dense solvers get
//! reached for once a matrix is small enough to not need sparse machinery
//! (`basic/solver` only wraps sparse solvers for the full Ybus).

use nalgebra::{Complex, DMatrix};

use crate::error::{DomainError, DomainResult, NumericalError};

#[derive(Debug, Clone)]
pub struct ImpedanceMatrix {
    pub z: DMatrix<Complex<f64>>,
}

impl ImpedanceMatrix {
    pub fn from_admittance(y: &DMatrix<Complex<f64>>) -> DomainResult<Self> {
        let z = y.clone().try_inverse().ok_or(DomainError::Numerical(NumericalError::SingularYnn))?;
        Ok(Self { z })
    }

    /// Electrical distance between generator buses `i` and `j`:
    /// `|Z_ii + Z_jj - Z_ij - Z_ji|`.
    pub fn electrical_distance(&self, i: usize, j: usize) -> f64 {
        (self.z[(i, i)] + self.z[(j, j)] - self.z[(i, j)] - self.z[(j, i)]).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn electrical_distance_to_self_is_zero() {
        let y = DMatrix::from_row_slice(
            2,
            2,
            &[
                Complex::new(2.0, -4.0),
                Complex::new(-1.0, 2.0),
                Complex::new(-1.0, 2.0),
                Complex::new(2.0, -4.0),
            ],
        );
        let z = ImpedanceMatrix::from_admittance(&y).unwrap();
        assert!(z.electrical_distance(0, 0) < 1e-9);
    }
}
