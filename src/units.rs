//! Unit-tagged scalar quantities and per-unit conversion.
//!
//! A `PhantomData<Unit>` marker style (`VNominal(Pair<f64, KV>)`,
//! `VmLimit<Pair<Limit<f64>, PerUnit>>` in `basic/ecs/elements/bus.rs`) tags
//! quantities this way in an ECS-based crate. This crate is not ECS-based,
//! so the same idea is expressed as a single runtime-tagged [`Value`]
//! instead of one generic parameter per unit: the unit set here is fixed and
//! known at parse time (it comes from the abstract topology input), so a
//! closed enum is simpler than a family of marker types.

use crate::error::{DomainError, DomainResult, NumericalError};

/// The physical quantity kind a [`Unit`] belongs to; per-unit conversion is
/// defined per kind against the relevant base ([`PuBase`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Voltage,
    Power,
    Impedance,
    Admittance,
    Angle,
    Inertia,
    PerUnit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Unit {
    Volt,
    KiloVolt,
    Watt,
    MegaWatt,
    Var,
    MegaVar,
    Ohm,
    Siemens,
    Degree,
    Radian,
    MegaWattSecondPerMva,
    PerUnit,
    None,
}

impl Unit {
    fn kind(self) -> Kind {
        match self {
            Unit::Volt | Unit::KiloVolt => Kind::Voltage,
            Unit::Watt | Unit::MegaWatt | Unit::Var | Unit::MegaVar => Kind::Power,
            Unit::Ohm => Kind::Impedance,
            Unit::Siemens => Kind::Admittance,
            Unit::Degree | Unit::Radian => Kind::Angle,
            Unit::MegaWattSecondPerMva => Kind::Inertia,
            Unit::PerUnit => Kind::PerUnit,
            Unit::None => Kind::None,
        }
    }

    /// Multiplicative factor to convert a value expressed in `self` into the
    /// kind's canonical large unit (kV for voltage, MVA for power, Ohm for
    /// impedance, Siemens for admittance, radian for angle).
    fn to_canonical_factor(self) -> f64 {
        match self {
            Unit::Volt => 1e-3,
            Unit::MegaWatt | Unit::MegaVar => 1.0,
            Unit::Watt | Unit::Var => 1e-6,
            Unit::Degree => std::f64::consts::PI / 180.0,
            _ => 1.0,
        }
    }
}

/// Network-wide conversion base: a voltage base (kV) and a power base (MVA).
/// Impedance/admittance bases are derived from these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuBase {
    pub voltage_kv: f64,
    pub power_mva: f64,
}

impl PuBase {
    pub fn new(voltage_kv: f64, power_mva: f64) -> Self {
        Self { voltage_kv, power_mva }
    }

    fn impedance_base_ohm(self) -> f64 {
        (self.voltage_kv * self.voltage_kv) / self.power_mva
    }

    fn admittance_base_siemens(self) -> f64 {
        1.0 / self.impedance_base_ohm()
    }
}

/// A unit-tagged scalar with an optional conversion base.
///
/// Arithmetic between two `Value`s is defined only after both have been
/// converted to per-unit: call [`Value::per_unit`] on each operand rather
/// than combining `Value`s directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Value {
    magnitude: f64,
    unit: Unit,
    base: Option<PuBase>,
}

impl Value {
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit, base: None }
    }

    pub fn with_base(mut self, base: PuBase) -> Self {
        self.base = Some(base);
        self
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Converts this value to per-unit. A per-unit base must exist when this
    /// is called for any unit whose kind requires one; angle and
    /// already-per-unit values never require a base.
    pub fn per_unit(&self) -> DomainResult<f64> {
        match self.unit.kind() {
            Kind::PerUnit => Ok(self.magnitude),
            Kind::Angle => Ok(self.magnitude * self.unit.to_canonical_factor()),
            Kind::None => Err(DomainError::Numerical(NumericalError::ArcsinOutOfRange {
                value: self.magnitude,
            })),
            kind => {
                let base = self.base.ok_or_else(|| {
                    DomainError::Numerical(NumericalError::ArcsinOutOfRange { value: self.magnitude })
                })?;
                let canonical = self.magnitude * self.unit.to_canonical_factor();
                let denom = match kind {
                    Kind::Voltage => base.voltage_kv,
                    Kind::Power => base.power_mva,
                    Kind::Impedance => base.impedance_base_ohm(),
                    Kind::Admittance => base.admittance_base_siemens(),
                    Kind::Inertia => 1.0,
                    _ => unreachable!(),
                };
                Ok(canonical / denom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_round_trips_through_base() {
        let base = PuBase::new(100.0, 50.0);
        let v = Value::new(105.0, Unit::KiloVolt).with_base(base);
        assert!((v.per_unit().unwrap() - 1.05).abs() < 1e-12);
    }

    #[test]
    fn power_converts_watts_to_per_unit() {
        let base = PuBase::new(110.0, 100.0);
        let v = Value::new(5_000_000.0, Unit::Watt).with_base(base);
        assert!((v.per_unit().unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn missing_base_is_an_error() {
        let v = Value::new(1.0, Unit::MegaWatt);
        assert!(v.per_unit().is_err());
    }

    #[test]
    fn angle_never_needs_a_base() {
        let v = Value::new(180.0, Unit::Degree);
        assert!((v.per_unit().unwrap() - std::f64::consts::PI).abs() < 1e-12);
    }
}
