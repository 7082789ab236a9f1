//! Line records.
//!
//! Follows `io/pandapower/network_converter.rs::line_to_admit`, which derives
//! a half-pi-model shunt and a series admittance from R/X/G/B parameters;
//! this module keeps that same pi-model shape but works directly in per-unit
//! (the topology input already supplies R/X/G/B in p.u.) and tracks
//! independent breaker state at each end, which a load-flow-only model does
//! not need.

use nalgebra::Complex;

#[derive(Debug, Clone)]
pub struct Line {
    pub name: String,
    pub r: f64,
    pub x: f64,
    pub shunt_g: f64,
    pub shunt_b: f64,
    pub closed_at_first_bus: bool,
    pub closed_at_second_bus: bool,
    pub metal_short_circuit: bool,
}

impl Line {
    pub fn new(name: impl Into<String>, r: f64, x: f64, shunt_g: f64, shunt_b: f64) -> Self {
        Self {
            name: name.into(),
            r,
            x,
            shunt_g,
            shunt_b,
            closed_at_first_bus: true,
            closed_at_second_bus: true,
            metal_short_circuit: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at_first_bus || self.closed_at_second_bus
    }

    pub fn is_closed_both_ends(&self) -> bool {
        self.closed_at_first_bus && self.closed_at_second_bus
    }

    /// Series admittance `1/(R+jX)`. Zero when metal-short-circuited or
    /// fully open.
    pub fn series_admittance(&self) -> Complex<f64> {
        if self.metal_short_circuit || !self.is_closed_both_ends() {
            return Complex::new(0.0, 0.0);
        }
        Complex::new(1.0, 0.0) / Complex::new(self.r, self.x)
    }

    /// Half-shunt admittance, contributed at each closed end.
    pub fn half_shunt_admittance(&self) -> Complex<f64> {
        Complex::new(self.shunt_g, self.shunt_b) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_at_one_end_keeps_only_the_closed_half_shunt() {
        let mut line = Line::new("L1", 0.01, 0.1, 0.0, 0.02);
        line.closed_at_second_bus = false;
        assert_eq!(line.series_admittance(), Complex::new(0.0, 0.0));
        assert!(line.half_shunt_admittance().im > 0.0);
    }

    #[test]
    fn metal_short_circuit_contributes_nothing() {
        let mut line = Line::new("L1", 0.01, 0.1, 0.0, 0.0);
        line.metal_short_circuit = true;
        assert_eq!(line.series_admittance(), Complex::new(0.0, 0.0));
    }
}
