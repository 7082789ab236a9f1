//! Load, capacitor bank and fictive-load records.
//!
//! Follows `io/pandapower/network_converter.rs::shunt_to_admit` and
//! `load_to_pqnode`, which convert a load/shunt to a complex
//! admittance/power injection from bus voltage (`Y = conj(S_pu) / |V|^2`).

use nalgebra::Complex;

#[derive(Debug, Clone)]
pub struct Load {
    pub name: String,
    /// Complex power (p.u.) drawn by the load when connected.
    pub power: Complex<f64>,
    pub connected: bool,
    admittance: Complex<f64>,
}

impl Load {
    pub fn new(name: impl Into<String>, power: Complex<f64>) -> Self {
        Self {
            name: name.into(),
            power,
            connected: true,
            admittance: Complex::new(0.0, 0.0),
        }
    }

    /// `Y = conj(S_pu) / |V|^2`; disconnected loads contribute nothing.
    pub fn recompute_admittance(&mut self, bus_voltage: Complex<f64>) {
        self.admittance = if self.connected {
            let v2 = bus_voltage.norm_sqr();
            if v2 > 0.0 { self.power.conj() / v2 } else { Complex::new(0.0, 0.0) }
        } else {
            Complex::new(0.0, 0.0)
        };
    }

    pub fn admittance(&self) -> Complex<f64> {
        self.admittance
    }
}

#[derive(Debug, Clone)]
pub struct CapacitorBank {
    pub name: String,
    pub power: Complex<f64>,
    pub connected: bool,
    admittance: Complex<f64>,
}

impl CapacitorBank {
    pub fn new(name: impl Into<String>, power: Complex<f64>) -> Self {
        Self {
            name: name.into(),
            power,
            connected: true,
            admittance: Complex::new(0.0, 0.0),
        }
    }

    pub fn recompute_admittance(&mut self, bus_voltage: Complex<f64>) {
        self.admittance = if self.connected {
            let v2 = bus_voltage.norm_sqr();
            if v2 > 0.0 { self.power.conj() / v2 } else { Complex::new(0.0, 0.0) }
        } else {
            Complex::new(0.0, 0.0)
        };
    }

    pub fn admittance(&self) -> Complex<f64> {
        self.admittance
    }
}

/// A synthetic shunt admittance injected at a bus to model a short-circuit.
/// Unlike [`Load`]/[`CapacitorBank`] the admittance is supplied directly
/// rather than derived from bus voltage and power: a short-circuit is a
/// fixed impedance, not a constant-power withdrawal.
#[derive(Debug, Clone)]
pub struct FictiveLoad {
    pub name: String,
    pub admittance: Complex<f64>,
}

impl FictiveLoad {
    /// Builds the fictive load for a bus short-circuit of impedance `r + jx`.
    /// A zero resistance is replaced by a machine epsilon to keep the
    /// admittance finite.
    pub fn from_short_circuit_impedance(name: impl Into<String>, r: f64, x: f64) -> Self {
        let r = if r == 0.0 { f64::EPSILON } else { r };
        Self {
            name: name.into(),
            admittance: Complex::new(1.0, 0.0) / Complex::new(r, x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_load_has_zero_admittance() {
        let mut load = Load::new("L1", Complex::new(1.0, 0.5));
        load.connected = false;
        load.recompute_admittance(Complex::new(1.0, 0.0));
        assert_eq!(load.admittance(), Complex::new(0.0, 0.0));
    }

    #[test]
    fn zero_resistance_short_circuit_uses_epsilon() {
        let fl = FictiveLoad::from_short_circuit_impedance("F1", 0.0, 0.0);
        assert!(fl.admittance.norm().is_finite());
    }
}
