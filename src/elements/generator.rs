//! Generator, dynamic generator and generator-cluster records.
//!
//! The Thévenin internal-voltage derivation generalizes the
//! `io/pandapower/network_converter.rs::gen_to_pvnode`-style conversion from
//! power-flow quantities to injected node models to the complex internal EMF
//! behind the transient reactance (`E = V + j X'd * I`, `I = conj(S)/conj(V)`).

use std::collections::BTreeMap;

use nalgebra::Complex;

use crate::error::{DomainError, DomainResult, TopologyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GeneratorType {
    PV,
    PQ,
    Slack,
}

/// Primary energy source, consulted only by the `tso_customization` filters
/// of the critical-cluster identifier (`NO_HYDRO` excludes small hydro units,
/// `NUCLEAR` keeps only nuclear ones); otherwise unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum GeneratorSource {
    Hydro,
    Nuclear,
    #[default]
    Other,
}

/// The network state a dynamic generator's trajectory sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NetworkState {
    PreFault,
    DuringFault,
    PostFault,
}

#[derive(Debug, Clone)]
pub struct Generator {
    pub name: String,
    pub host_bus: String,
    pub generator_type: GeneratorType,
    /// Direct transient reactance X'd, p.u.
    pub x_transient: f64,
    /// Inertia constant H, MW*s/MVA.
    pub inertia_h: f64,
    pub p: f64,
    pub p_min: f64,
    pub p_max: f64,
    pub q: f64,
    pub q_min: f64,
    pub q_max: f64,
    pub voltage_target: f64,
    pub connected: bool,
    pub source: GeneratorSource,
    internal_voltage: Option<Complex<f64>>,
}

impl Generator {
    pub fn new(
        name: impl Into<String>,
        host_bus: impl Into<String>,
        generator_type: GeneratorType,
        x_transient: f64,
        inertia_h: f64,
    ) -> Self {
        Self {
            name: name.into(),
            host_bus: host_bus.into(),
            generator_type,
            x_transient,
            inertia_h,
            p: 0.0,
            p_min: f64::MIN,
            p_max: f64::MAX,
            q: 0.0,
            q_min: f64::MIN,
            q_max: f64::MAX,
            voltage_target: 1.0,
            connected: true,
            source: GeneratorSource::Other,
            internal_voltage: None,
        }
    }

    pub fn complex_power(&self) -> Complex<f64> {
        Complex::new(self.p, self.q)
    }

    /// Recomputes the Thévenin internal voltage `E = V + j X'd I` with
    /// `I = conj(S)/conj(V)` from a (possibly just-updated) bus voltage.
    ///
    /// When the host bus is itself the generator's internal node
    /// (`BusType::GeneratorInternalVoltage`), callers should use
    /// [`Self::set_internal_voltage_directly`] instead.
    pub fn recompute_internal_voltage(&mut self, bus_voltage: Complex<f64>) {
        if !self.connected || bus_voltage.norm() == 0.0 {
            return;
        }
        let current = self.complex_power().conj() / bus_voltage.conj();
        let e = bus_voltage + Complex::new(0.0, self.x_transient) * current;
        self.internal_voltage = Some(e);
    }

    pub fn set_internal_voltage_directly(&mut self, voltage: Complex<f64>) {
        self.internal_voltage = Some(voltage);
    }

    pub fn internal_voltage(&self) -> DomainResult<Complex<f64>> {
        self.internal_voltage.ok_or_else(|| {
            DomainError::Topology(TopologyError::UndefinedVoltage { name: self.name.clone() })
        })
    }

    pub fn rotor_angle(&self) -> DomainResult<f64> {
        Ok(self.internal_voltage()?.argument())
    }

    /// Mechanical power, p.u. (equal to `P` at the moment the pre-fault
    /// equilibrium is frozen).
    pub fn mechanical_power(&self) -> f64 {
        self.p
    }

    /// Inertia coefficient `M = H * S_base`, expressed directly in
    /// seconds-radians units consistent with the swing equation
    /// `M d^2(delta)/dt^2 = omega (P_m - P_e)` once `s_base` is folded in by
    /// the caller (kept as a pure multiplier here so the generator record
    /// stays base-power-agnostic).
    pub fn inertia_coefficient(&self, s_base_mva: f64) -> f64 {
        self.inertia_h * s_base_mva
    }
}

/// Wraps a [`Generator`] with time-keyed rotor-angle / angular-speed /
/// network-state trajectories.
#[derive(Debug, Clone)]
pub struct DynamicGenerator {
    pub generator: Generator,
    rotor_angle: BTreeMap<ordered_float::OrderedFloat<f64>, f64>,
    angular_speed: BTreeMap<ordered_float::OrderedFloat<f64>, f64>,
    network_state: BTreeMap<ordered_float::OrderedFloat<f64>, NetworkState>,
}

impl DynamicGenerator {
    pub fn new(generator: Generator) -> DomainResult<Self> {
        let delta0 = generator.rotor_angle()?;
        let mut rotor_angle = BTreeMap::new();
        let mut angular_speed = BTreeMap::new();
        let mut network_state = BTreeMap::new();
        rotor_angle.insert(ordered_float::OrderedFloat(0.0), delta0);
        angular_speed.insert(ordered_float::OrderedFloat(0.0), 0.0);
        network_state.insert(ordered_float::OrderedFloat(0.0), NetworkState::PreFault);
        Ok(Self { generator, rotor_angle, angular_speed, network_state })
    }

    pub fn name(&self) -> &str {
        &self.generator.name
    }

    /// Wipes every observation but `t=0`.
    pub fn reset(&mut self) {
        let delta0 = *self.rotor_angle.get(&ordered_float::OrderedFloat(0.0)).unwrap();
        self.rotor_angle.clear();
        self.angular_speed.clear();
        self.network_state.clear();
        self.rotor_angle.insert(ordered_float::OrderedFloat(0.0), delta0);
        self.angular_speed.insert(ordered_float::OrderedFloat(0.0), 0.0);
        self.network_state.insert(ordered_float::OrderedFloat(0.0), NetworkState::PreFault);
    }

    pub fn record(&mut self, t: f64, angle: f64, speed: f64, state: NetworkState) {
        let key = ordered_float::OrderedFloat(t);
        self.rotor_angle.insert(key, angle);
        self.angular_speed.insert(key, speed);
        self.network_state.insert(key, state);
    }

    pub fn rotor_angle_at(&self, t: f64) -> DomainResult<f64> {
        self.rotor_angle
            .get(&ordered_float::OrderedFloat(t))
            .copied()
            .ok_or_else(|| {
                DomainError::Topology(TopologyError::UndefinedVoltage { name: self.name().to_string() })
            })
    }

    pub fn angular_speed_at(&self, t: f64) -> DomainResult<f64> {
        self.angular_speed
            .get(&ordered_float::OrderedFloat(t))
            .copied()
            .ok_or_else(|| {
                DomainError::Topology(TopologyError::UndefinedVoltage { name: self.name().to_string() })
            })
    }

    pub fn network_state_at(&self, t: f64) -> DomainResult<NetworkState> {
        self.network_state
            .get(&ordered_float::OrderedFloat(t))
            .copied()
            .ok_or_else(|| {
                DomainError::Topology(TopologyError::UndefinedVoltage { name: self.name().to_string() })
            })
    }

    /// Observation times recorded so far, sorted ascending.
    pub fn observation_times(&self) -> Vec<f64> {
        self.rotor_angle.keys().map(|k| k.0).collect()
    }
}

/// A non-empty set of [`DynamicGenerator`]s forming either the critical or
/// non-critical cluster of an OMIB reduction.
#[derive(Debug, Clone)]
pub struct GeneratorCluster {
    members: Vec<usize>,
}

impl GeneratorCluster {
    pub fn new(members: Vec<usize>) -> Self {
        debug_assert!(!members.is_empty(), "a generator cluster must be non-empty");
        Self { members }
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn total_inertia(&self, generators: &[DynamicGenerator], s_base_mva: f64) -> f64 {
        self.members
            .iter()
            .map(|&i| generators[i].generator.inertia_coefficient(s_base_mva))
            .sum()
    }

    pub fn total_mechanical_power(&self, generators: &[DynamicGenerator]) -> f64 {
        self.members.iter().map(|&i| generators[i].generator.mechanical_power()).sum()
    }

    /// Partial center of angle `PCOA(t, state) = sum(Mi * delta_i(t)) / sum(Mi)`.
    pub fn pcoa(&self, generators: &[DynamicGenerator], t: f64, s_base_mva: f64) -> DomainResult<f64> {
        let total_m = self.total_inertia(generators, s_base_mva);
        if total_m == 0.0 {
            return Err(DomainError::Numerical(crate::error::NumericalError::ZeroTotalInertia));
        }
        let mut acc = 0.0;
        for &i in &self.members {
            let gen = &generators[i];
            let m = gen.generator.inertia_coefficient(s_base_mva);
            acc += m * gen.rotor_angle_at(t)?;
        }
        Ok(acc / total_m)
    }

    /// Deviation of one member's rotor angle from the cluster's PCOA at `t`:
    /// `theta_i = delta_i(t) - PCOA(t)`.
    pub fn angular_deviation(
        &self,
        member_index: usize,
        generators: &[DynamicGenerator],
        t: f64,
        s_base_mva: f64,
    ) -> DomainResult<f64> {
        let pcoa = self.pcoa(generators, t, s_base_mva)?;
        Ok(generators[member_index].rotor_angle_at(t)? - pcoa)
    }

    pub fn contains_member(&self, index: usize) -> bool {
        self.members.contains(&index)
    }
}

/// A non-synchronous injector (wind/PV/HVDC) contributing constant complex
/// power but no swing dynamics.
#[derive(Debug, Clone)]
pub struct NonSynchronousInjector {
    pub name: String,
    pub host_bus: String,
    pub power: Complex<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_generator() -> Generator {
        let mut g = Generator::new("G1", "B1", GeneratorType::PV, 0.3, 5.0);
        g.p = 1.0;
        g.q = 0.2;
        g.recompute_internal_voltage(Complex::new(1.0, 0.0));
        g
    }

    #[test]
    fn internal_voltage_leads_bus_voltage_for_positive_power() {
        let g = sample_generator();
        let delta = g.rotor_angle().unwrap();
        assert!(delta > 0.0, "exporting generator should have a positive rotor angle");
    }

    #[test]
    fn dynamic_generator_seeds_t0_from_static_angle() {
        let g = sample_generator();
        let dyn_g = DynamicGenerator::new(g.clone()).unwrap();
        assert!((dyn_g.rotor_angle_at(0.0).unwrap() - g.rotor_angle().unwrap()).abs() < 1e-12);
        assert_eq!(dyn_g.angular_speed_at(0.0).unwrap(), 0.0);
    }

    #[test]
    fn reset_wipes_everything_but_t0() {
        let mut dyn_g = DynamicGenerator::new(sample_generator()).unwrap();
        dyn_g.record(0.1, 0.5, 0.01, NetworkState::DuringFault);
        dyn_g.reset();
        assert_eq!(dyn_g.observation_times(), vec![0.0]);
    }

    #[test]
    fn cluster_pcoa_is_inertia_weighted_mean() {
        let mut g1 = sample_generator();
        g1.name = "G1".into();
        g1.inertia_h = 1.0;
        let mut g2 = sample_generator();
        g2.name = "G2".into();
        g2.inertia_h = 3.0;
        let mut d1 = DynamicGenerator::new(g1).unwrap();
        let mut d2 = DynamicGenerator::new(g2).unwrap();
        d1.record(1.0, 1.0, 0.0, NetworkState::DuringFault);
        d2.record(1.0, 2.0, 0.0, NetworkState::DuringFault);
        let generators = vec![d1, d2];
        let cluster = GeneratorCluster::new(vec![0, 1]);
        let pcoa = cluster.pcoa(&generators, 1.0, 1.0).unwrap();
        assert!((pcoa - 1.75).abs() < 1e-9);
    }
}
