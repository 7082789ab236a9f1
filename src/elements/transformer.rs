//! Transformer records and their exact admittance contribution formulas.
//!
//! The existing tap-transformer conversion
//! (`io/pandapower/network_converter.rs::trafo_to_admit`) only needs a
//! magnitude tap ratio for load flow and folds the magnetizing branch in
//! separately; the transient-stability admittance matrix instead needs the
//! general complex-ratio (phase-shifter) formulation, so this module
//! implements that formula directly rather than reusing the simplified one.

use nalgebra::Complex;

use crate::error::{DomainError, DomainResult, TopologyError};

/// Transformer type code; `8` denotes a complex-ratio phase-shifter, any
/// other value a plain magnitude-ratio regulator.
pub const PHASE_SHIFTER_TYPE_CODE: i32 = 8;

#[derive(Debug, Clone)]
pub struct Transformer {
    pub name: String,
    pub r: f64,
    pub x: f64,
    pub shunt_g: f64,
    pub shunt_b: f64,
    pub type_code: i32,
    pub ratio_magnitude: f64,
    pub ratio_phase_rad: f64,
    pub closed_at_primary: bool,
    pub closed_at_secondary: bool,
}

/// The four admittance-matrix contributions a branch element adds between
/// its two endpoint buses `i` (primary/sending) and `j` (secondary/receiving).
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchContribution {
    pub y_ii: Complex<f64>,
    pub y_jj: Complex<f64>,
    pub y_ij: Complex<f64>,
    pub y_ji: Complex<f64>,
}

impl Transformer {
    pub fn new(name: impl Into<String>, r: f64, x: f64, shunt_g: f64, shunt_b: f64) -> Self {
        Self {
            name: name.into(),
            r,
            x,
            shunt_g,
            shunt_b,
            type_code: 0,
            ratio_magnitude: 1.0,
            ratio_phase_rad: 0.0,
            closed_at_primary: true,
            closed_at_secondary: true,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at_primary && self.closed_at_secondary
    }

    fn ratio(&self) -> Complex<f64> {
        Complex::from_polar(self.ratio_magnitude, self.ratio_phase_rad)
    }

    /// Computes the admittance-matrix contribution. Returns
    /// `TopologyError::ZeroImpedanceTransformer` for `z == 0`.
    pub fn contribution(&self) -> DomainResult<BranchContribution> {
        let z = Complex::new(self.r, self.x);
        if z.norm() == 0.0 {
            return Err(DomainError::Topology(TopologyError::ZeroImpedanceTransformer {
                name: self.name.clone(),
            }));
        }
        if !self.is_closed() {
            return Ok(BranchContribution::default());
        }
        let y = Complex::new(1.0, 0.0) / z;
        let y_sh = Complex::new(self.shunt_g, self.shunt_b);
        let r = self.ratio();

        if self.type_code == PHASE_SHIFTER_TYPE_CODE {
            let sending_shunt = r.conj() * (r - Complex::new(1.0, 0.0)) / z + y_sh * r.norm_sqr();
            let receiving_shunt = (Complex::new(1.0, 0.0) - r) / z;
            let mutual_ij = -y * r.conj();
            let mutual_ji = -y * r;
            Ok(BranchContribution {
                y_ii: y * r.conj() + sending_shunt,
                y_jj: y * r + receiving_shunt,
                y_ij: mutual_ij,
                y_ji: mutual_ji,
            })
        } else {
            let rm = Complex::new(self.ratio_magnitude, 0.0);
            let y_eff = y * rm;
            let sending_shunt = rm * (rm - Complex::new(1.0, 0.0)) / z;
            let receiving_shunt = (Complex::new(1.0, 0.0) - rm) / z + y_sh;
            Ok(BranchContribution {
                y_ii: y_eff + sending_shunt,
                y_jj: y_eff + receiving_shunt,
                y_ij: -y_eff,
                y_ji: -y_eff,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_impedance_is_an_error() {
        let t = Transformer::new("T1", 0.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            t.contribution(),
            Err(DomainError::Topology(TopologyError::ZeroImpedanceTransformer { .. }))
        ));
    }

    #[test]
    fn unity_ratio_regulator_reduces_to_a_plain_series_admittance() {
        let t = Transformer::new("T1", 0.01, 0.1, 0.0, 0.0);
        let c = t.contribution().unwrap();
        let y = Complex::new(1.0, 0.0) / Complex::new(0.01, 0.1);
        assert!((c.y_ij + y).norm() < 1e-9);
        assert!((c.y_ii - y).norm() < 1e-9);
    }

    #[test]
    fn open_transformer_contributes_nothing() {
        let mut t = Transformer::new("T1", 0.01, 0.1, 0.0, 0.0);
        t.closed_at_secondary = false;
        let c = t.contribution().unwrap();
        assert_eq!(c.y_ii, Complex::new(0.0, 0.0));
    }
}
