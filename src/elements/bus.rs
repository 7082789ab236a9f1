//! Bus records.
//!
//! Modeled as an owned object graph (network owns buses, buses own their
//! attached elements by value) following the plain-struct `Bus`/`Gen` shape
//! (`io/pandapower/file_io.rs`) rather than an ECS-component layout.
//!
//! A bus never owns its branches. Branches live in a single list on
//! [`crate::network::Network`] and reference bus endpoints by name; this
//! avoids an ownership cycle between buses and branches.

use nalgebra::Complex;

use crate::elements::generator::Generator;
use crate::elements::load::{CapacitorBank, FictiveLoad, Load};
use crate::error::{DomainError, DomainResult, TopologyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BusType {
    PQ,
    PV,
    Slack,
    GeneratorInternalVoltage,
}

impl BusType {
    /// Ranking used to pick the dominant type over a coupled group
    /// (Slack > PV > PQ). `GeneratorInternalVoltage` buses are synthetic
    /// and never coupled, so
    /// they rank above everything only to make the total order total; they
    /// never actually compete with a raw PQ/PV/Slack bus in practice.
    fn rank(self) -> u8 {
        match self {
            BusType::PQ => 0,
            BusType::PV => 1,
            BusType::Slack => 2,
            BusType::GeneratorInternalVoltage => 3,
        }
    }

    pub fn dominant(self, other: BusType) -> BusType {
        if self.rank() >= other.rank() { self } else { other }
    }
}

/// A bus (node) in the network.
#[derive(Debug, Clone)]
pub struct Bus {
    pub name: String,
    pub nominal_voltage_kv: f64,
    voltage: Option<Complex<f64>>,
    pub bus_type: BusType,
    pub generators: Vec<Generator>,
    pub loads: Vec<Load>,
    pub capacitor_banks: Vec<CapacitorBank>,
    /// Zero-impedance shunts injected by short-circuit events. Kept
    /// separate from [`Self::capacitor_banks`] since
    /// their admittance is fixed at creation, not derived from bus voltage.
    pub fictive_loads: Vec<FictiveLoad>,
}

impl Bus {
    pub fn new(name: impl Into<String>, nominal_voltage_kv: f64, bus_type: BusType) -> Self {
        Self {
            name: name.into(),
            nominal_voltage_kv,
            voltage: None,
            bus_type,
            generators: Vec::new(),
            loads: Vec::new(),
            capacitor_banks: Vec::new(),
            fictive_loads: Vec::new(),
        }
    }

    /// Reads the bus voltage. Fails if the bus has no voltage defined.
    pub fn voltage(&self) -> DomainResult<Complex<f64>> {
        self.voltage.ok_or_else(|| {
            DomainError::Topology(TopologyError::UndefinedVoltage { name: self.name.clone() })
        })
    }

    pub fn has_voltage(&self) -> bool {
        self.voltage.is_some()
    }

    /// Updates the bus voltage and recomputes every attached load, bank and
    /// generator admittance/internal-voltage derivation.
    pub fn set_voltage(&mut self, voltage: Complex<f64>) {
        self.voltage = Some(voltage);
        for load in &mut self.loads {
            load.recompute_admittance(voltage);
        }
        for bank in &mut self.capacitor_banks {
            bank.recompute_admittance(voltage);
        }
        for gen in &mut self.generators {
            gen.recompute_internal_voltage(voltage);
        }
    }

    pub fn merge_from(&mut self, other: &Bus) -> DomainResult<()> {
        if let (Ok(a), Ok(b)) = (self.voltage(), other.voltage()) {
            if (a - b).norm() > 1e-9 {
                return Err(DomainError::Topology(TopologyError::InconsistentCoupledVoltage {
                    first: self.name.clone(),
                    second: other.name.clone(),
                }));
            }
        } else if other.voltage.is_some() && self.voltage.is_none() {
            self.voltage = other.voltage;
        }
        self.bus_type = self.bus_type.dominant(other.bus_type);
        self.generators.extend(other.generators.iter().cloned());
        self.loads.extend(other.loads.iter().cloned());
        self.capacitor_banks.extend(other.capacitor_banks.iter().cloned());
        self.fictive_loads.extend(other.fictive_loads.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_type_follows_slack_pv_pq_order() {
        assert_eq!(BusType::Slack.dominant(BusType::PV), BusType::Slack);
        assert_eq!(BusType::PQ.dominant(BusType::PV), BusType::PV);
        assert_eq!(BusType::PQ.dominant(BusType::PQ), BusType::PQ);
    }

    #[test]
    fn reading_voltage_before_it_is_set_fails() {
        let bus = Bus::new("B1", 110.0, BusType::PQ);
        assert!(bus.voltage().is_err());
    }

    #[test]
    fn setting_voltage_recomputes_attached_elements() {
        let mut bus = Bus::new("B1", 110.0, BusType::PQ);
        bus.loads.push(Load::new("L1", Complex::new(1.0, 0.2)));
        bus.set_voltage(Complex::new(1.0, 0.0));
        assert!(bus.loads[0].admittance().norm() > 0.0);
    }
}
