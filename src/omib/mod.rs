//! One-Machine-Infinite-Bus reduction: collapses a critical and a
//! non-critical generator cluster onto a single equivalent swing equation
//! `P_e(delta) = P_c + P_max * sin(delta - psi)`.
//!
//! The three variants (zero/constant/dynamic-offset) differ only in how the
//! per-generator angular deviation theta_i feeding the double-sum below is
//! obtained; everything else (coefficient combination, initial angle, swing
//! direction) is shared, so they are modeled as one struct parameterized by
//! [`OmibVariant`] rather than three separate types.

use std::cell::RefCell;
use std::collections::HashMap;

use nalgebra::Complex;
use ordered_float::OrderedFloat;

use crate::elements::generator::{DynamicGenerator, GeneratorCluster};
use crate::elements::NonSynchronousInjector;
use crate::error::{DomainError, DomainResult, NumericalError};
use crate::matrix::kron_reduce;
use crate::network::simplify::INTERNAL_VOLTAGE_PREFIX;
use crate::network::{FaultState, Network};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OmibVariant {
    Zoomib,
    Coomib,
    Domib,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingState {
    Forward,
    Backward,
}

impl SwingState {
    pub fn factor(self) -> f64 {
        match self {
            SwingState::Forward => 1.0,
            SwingState::Backward => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    Unknown,
    AlwaysStable,
    AlwaysUnstable,
    PotentiallyStable,
}

/// The three curve coefficients at one (state, update-time) pair.
#[derive(Debug, Clone, Copy)]
pub struct OmibCoefficients {
    pub angle_shift: f64,
    pub constant_electric_power: f64,
    pub maximum_electric_power: f64,
}

impl OmibCoefficients {
    pub fn electric_power(&self, angle: f64) -> f64 {
        self.constant_electric_power + self.maximum_electric_power * (angle - self.angle_shift).sin()
    }
}

pub struct Omib {
    pub variant: OmibVariant,
    pub revised: bool,
    pub critical: GeneratorCluster,
    pub non_critical: GeneratorCluster,
    s_base_mva: f64,
    pub swing_state: SwingState,
    pub stability_state: StabilityState,
    pub mechanical_power: f64,
    pub initial_rotor_angle: f64,
    coomib_deviations: HashMap<usize, f64>,
    coefficients_cache: RefCell<HashMap<(FaultStateKey, OrderedFloat<f64>), OmibCoefficients>>,
    update_schedule: RefCell<Vec<(f64, f64)>>,
}

// FaultState doesn't implement Hash with a stable discriminant guarantee we
// want to lean on outside `network`, so coefficients are keyed by this local
// copy instead of reaching into `network::FaultState` internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FaultStateKey {
    Pre,
    During,
    Post,
}

impl From<FaultState> for FaultStateKey {
    fn from(s: FaultState) -> Self {
        match s {
            FaultState::PreFault => FaultStateKey::Pre,
            FaultState::DuringFault => FaultStateKey::During,
            FaultState::PostFault => FaultStateKey::Post,
        }
    }
}

impl Omib {
    pub fn new(
        variant: OmibVariant,
        revised: bool,
        critical: GeneratorCluster,
        non_critical: GeneratorCluster,
        s_base_mva: f64,
        generators: &mut [DynamicGenerator],
        network: &Network,
    ) -> DomainResult<Self> {
        if matches!(variant, OmibVariant::Zoomib | OmibVariant::Coomib) {
            for &i in critical.members().iter().chain(non_critical.members().iter()) {
                generators[i].reset();
            }
        }

        let total_inertia = critical.total_inertia(generators, s_base_mva)
            + non_critical.total_inertia(generators, s_base_mva);
        if total_inertia == 0.0 {
            return Err(DomainError::Numerical(NumericalError::ZeroTotalInertia));
        }
        let m_c = critical.total_inertia(generators, s_base_mva);
        let m_n = non_critical.total_inertia(generators, s_base_mva);
        let mechanical_power =
            (m_n * critical.total_mechanical_power(generators) - m_c * non_critical.total_mechanical_power(generators))
                / total_inertia;

        let mut coomib_deviations = HashMap::new();
        if matches!(variant, OmibVariant::Coomib) {
            for &i in critical.members() {
                coomib_deviations.insert(i, critical.angular_deviation(i, generators, 0.0, s_base_mva)?);
            }
            for &i in non_critical.members() {
                coomib_deviations.insert(i, non_critical.angular_deviation(i, generators, 0.0, s_base_mva)?);
            }
        }

        let mut omib = Self {
            variant,
            revised,
            critical,
            non_critical,
            s_base_mva,
            swing_state: SwingState::Forward,
            stability_state: StabilityState::Unknown,
            mechanical_power,
            initial_rotor_angle: 0.0,
            coomib_deviations,
            coefficients_cache: RefCell::new(HashMap::new()),
            update_schedule: RefCell::new(Vec::new()),
        };

        let pre = omib.properties_at_time(FaultState::PreFault, 0.0, generators, network)?;
        omib.initial_rotor_angle = if revised {
            omib.critical.pcoa(generators, 0.0, s_base_mva)? - omib.non_critical.pcoa(generators, 0.0, s_base_mva)?
        } else {
            if pre.maximum_electric_power == 0.0 {
                return Err(DomainError::Numerical(NumericalError::ZeroTotalInertia));
            }
            let arg = (mechanical_power - pre.constant_electric_power) / pre.maximum_electric_power;
            if !(-1.0..=1.0).contains(&arg) {
                return Err(DomainError::Numerical(NumericalError::ArcsinOutOfRange { value: arg }));
            }
            arg.asin() + pre.angle_shift
        };

        let during = omib.properties_at_time(FaultState::DuringFault, 0.0, generators, network)?;
        let p_elec_during_delta0 = during.electric_power(omib.initial_rotor_angle);
        omib.swing_state = if mechanical_power < p_elec_during_delta0 { SwingState::Backward } else { SwingState::Forward };

        Ok(omib)
    }

    /// Deviation theta_i of member `index` (belonging to whichever cluster
    /// contains it) at time `t`, state `state`.
    fn angular_deviation(
        &self,
        index: usize,
        generators: &[DynamicGenerator],
        t: f64,
    ) -> DomainResult<f64> {
        match self.variant {
            OmibVariant::Zoomib => Ok(0.0),
            OmibVariant::Coomib => Ok(*self.coomib_deviations.get(&index).unwrap_or(&0.0)),
            OmibVariant::Domib => {
                let cluster =
                    if self.critical.contains_member(index) { &self.critical } else { &self.non_critical };
                cluster.angular_deviation(index, generators, t, self.s_base_mva)
            }
        }
    }

    /// Recomputes the DOMIB update-angle schedule from one representative
    /// generator's recorded observation times, keeping only the entries that
    /// are strictly monotone in the swing direction.
    pub fn refresh_update_schedule(&self, representative: &DynamicGenerator, generators: &[DynamicGenerator]) -> DomainResult<()> {
        if !matches!(self.variant, OmibVariant::Domib) {
            return Ok(());
        }
        let mut times = representative.observation_times();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let factor = self.swing_state.factor();
        let mut schedule = Vec::new();
        let mut previous: Option<f64> = None;
        for t in times {
            let angle = self.critical.pcoa(generators, t, self.s_base_mva)?
                - self.non_critical.pcoa(generators, t, self.s_base_mva)?;
            if let Some(prev) = previous {
                if factor * angle <= factor * prev {
                    continue;
                }
            }
            previous = Some(angle);
            schedule.push((angle, t));
        }
        *self.update_schedule.borrow_mut() = schedule;
        Ok(())
    }

    pub(crate) fn update_time_for_angle(&self, angle: f64) -> f64 {
        if !matches!(self.variant, OmibVariant::Domib) {
            return 0.0;
        }
        let schedule = self.update_schedule.borrow();
        let factor = self.swing_state.factor();
        let mut best = 0.0;
        for &(a, t) in schedule.iter() {
            if factor * a <= factor * angle {
                best = t;
            } else {
                break;
            }
        }
        best
    }

    /// `P_e(angle)` using the curve valid at `angle`'s matching update point.
    pub fn electric_power(
        &self,
        angle: f64,
        state: FaultState,
        generators: &[DynamicGenerator],
        network: &Network,
    ) -> DomainResult<f64> {
        let t = self.update_time_for_angle(angle);
        let coeffs = self.properties_at_time(state, t, generators, network)?;
        Ok(coeffs.electric_power(angle))
    }

    /// Equivalent OMIB inertia `M = M_C*M_N / (M_C+M_N)`.
    pub fn equivalent_inertia(&self, generators: &[DynamicGenerator]) -> f64 {
        let m_c = self.critical.total_inertia(generators, self.s_base_mva);
        let m_n = self.non_critical.total_inertia(generators, self.s_base_mva);
        m_c * m_n / (m_c + m_n)
    }

    pub fn properties_at_time(
        &self,
        state: FaultState,
        time: f64,
        generators: &[DynamicGenerator],
        network: &Network,
    ) -> DomainResult<OmibCoefficients> {
        let key = (FaultStateKey::from(state), OrderedFloat(time));
        if let Some(c) = self.coefficients_cache.borrow().get(&key) {
            return Ok(*c);
        }
        let computed = self.compute_coefficients(state, time, generators, network)?;
        self.coefficients_cache.borrow_mut().insert(key, computed);
        Ok(computed)
    }

    fn compute_coefficients(
        &self,
        state: FaultState,
        time: f64,
        generators: &[DynamicGenerator],
        network: &Network,
    ) -> DomainResult<OmibCoefficients> {
        let total_inertia_c = self.critical.total_inertia(generators, self.s_base_mva);
        let total_inertia_n = self.non_critical.total_inertia(generators, self.s_base_mva);
        let total = total_inertia_c + total_inertia_n;
        if total == 0.0 {
            return Err(DomainError::Numerical(NumericalError::ZeroTotalInertia));
        }
        let critical_ratio = total_inertia_c / total;
        let noncritical_ratio = total_inertia_n / total;

        let simplified = network.simplified(state)?;
        let kron = kron_reduce(&simplified.admittance, simplified.n_generators())?;
        let mut row_of: HashMap<String, usize> = HashMap::new();
        for (row, name) in simplified.generator_names.iter().enumerate() {
            let short = name.strip_prefix(INTERNAL_VOLTAGE_PREFIX).unwrap_or(name);
            row_of.insert(short.to_string(), row);
        }

        let voltage_magnitude = |i: usize| -> DomainResult<f64> { Ok(generators[i].generator.internal_voltage()?.norm()) };
        let row_of_gen = |i: usize| -> Option<usize> { row_of.get(generators[i].name()).copied() };

        let mut constant_power_terms = [0.0f64; 3];
        let mut first_constant_terms = [0.0f64; 3];
        let mut second_constant_terms = [0.0f64; 3];

        // Same-cluster families (C x C, N x N): full double sum including the
        // diagonal, where off-diagonal susceptance terms cancel pairwise.
        for (cluster, slot) in [(&self.critical, 0usize), (&self.non_critical, 1usize)] {
            for &i in cluster.members() {
                let (Some(ri), ei) = (row_of_gen(i), voltage_magnitude(i)?) else { continue };
                let theta_i = self.angular_deviation(i, generators, time)?;
                for &j in cluster.members() {
                    let Some(rj) = row_of_gen(j) else { continue };
                    let ej = voltage_magnitude(j)?;
                    let theta_j = self.angular_deviation(j, generators, time)?;
                    let y = kron.y_reduced[(ri, rj)];
                    let a = ei * ej;
                    let delta_theta = theta_i - theta_j;
                    constant_power_terms[slot] +=
                        delta_theta.cos() * a * y.re + delta_theta.sin() * a * y.im;
                }
            }
        }

        // Cross family (C x N).
        for &i in self.critical.members() {
            let Some(ri) = row_of_gen(i) else { continue };
            let ei = voltage_magnitude(i)?;
            let theta_i = self.angular_deviation(i, generators, time)?;
            for &j in self.non_critical.members() {
                let Some(rj) = row_of_gen(j) else { continue };
                let ej = voltage_magnitude(j)?;
                let theta_j = self.angular_deviation(j, generators, time)?;
                let y = kron.y_reduced[(ri, rj)];
                let a = ei * ej;
                let delta_theta = theta_i - theta_j;
                first_constant_terms[0] += delta_theta.sin() * a * y.im;
                first_constant_terms[1] += delta_theta.cos() * a * y.re;
                second_constant_terms[0] += delta_theta.cos() * a * y.im;
                second_constant_terms[1] += delta_theta.sin() * a * y.re;
            }
        }

        if !network.non_synchronous_injectors.is_empty() {
            self.accumulate_ren_terms(
                state,
                time,
                generators,
                network,
                &network.non_synchronous_injectors,
                &mut constant_power_terms,
                &mut first_constant_terms,
                &mut second_constant_terms,
            )?;
        }

        let inertia_ratio_difference = noncritical_ratio - critical_ratio;
        let first_constant = first_constant_terms[0]
            + first_constant_terms[1] * inertia_ratio_difference
            + first_constant_terms[2] * noncritical_ratio;
        let second_constant = second_constant_terms[0]
            - second_constant_terms[1] * inertia_ratio_difference
            + second_constant_terms[2] * noncritical_ratio;
        let maximum_electric_power = (first_constant.powi(2) + second_constant.powi(2)).sqrt();
        let angle_shift = -first_constant.atan2(second_constant);
        let constant_electric_power = noncritical_ratio * constant_power_terms[0]
            - critical_ratio * (constant_power_terms[1] + constant_power_terms[2]);

        Ok(OmibCoefficients { angle_shift, constant_electric_power, maximum_electric_power })
    }

    /// Contribution of non-synchronous injectors (wind/PV/HVDC), using the
    /// un-reduced simplified admittance between a generator's internal-voltage
    /// bus and the injector's host bus directly (the injector never gets a
    /// Kron-eliminated node of its own).
    #[allow(clippy::too_many_arguments)]
    fn accumulate_ren_terms(
        &self,
        state: FaultState,
        time: f64,
        generators: &[DynamicGenerator],
        network: &Network,
        injectors: &[NonSynchronousInjector],
        constant_power_terms: &mut [f64; 3],
        first_constant_terms: &mut [f64; 3],
        second_constant_terms: &mut [f64; 3],
    ) -> DomainResult<()> {
        let simplified = network.simplified(state)?;
        for injector in injectors {
            let Some(col) = simplified.bus_index.get(&injector.host_bus) else { continue };
            let host_voltage = simplified.bus(&injector.host_bus).and_then(|b| b.voltage().ok());
            let current_magnitude = match host_voltage {
                Some(v) if v.norm() > 0.0 => injector.power.norm() / v.norm(),
                _ => injector.power.norm(),
            };
            let angle_r = injector.power.im.atan2(injector.power.re);

            for (cluster, is_critical) in [(&self.critical, true), (&self.non_critical, false)] {
                for &i in cluster.members() {
                    let Some(row) = simplified
                        .bus_index
                        .get(&format!("{INTERNAL_VOLTAGE_PREFIX}{}", generators[i].name()))
                    else {
                        continue;
                    };
                    let ei = voltage_magnitude_at(generators, i)?;
                    let theta_i = self.angular_deviation(i, generators, time)?;
                    let y = admittance_entry(&simplified.admittance, row, col);
                    let a = ei * current_magnitude;
                    let delta_theta = theta_i - angle_r;
                    if is_critical {
                        first_constant_terms[2] += delta_theta.cos() * a * y.re + delta_theta.sin() * a * y.im;
                        second_constant_terms[2] += delta_theta.cos() * a * y.im - delta_theta.sin() * a * y.re;
                    } else {
                        constant_power_terms[2] += delta_theta.cos() * a * y.re + delta_theta.sin() * a * y.im;
                    }
                }
            }
        }
        Ok(())
    }
}

fn voltage_magnitude_at(generators: &[DynamicGenerator], i: usize) -> DomainResult<f64> {
    Ok(generators[i].generator.internal_voltage()?.norm())
}

fn admittance_entry(y: &crate::matrix::AdmittanceMatrix, row: usize, col: usize) -> Complex<f64> {
    for (r, c, value) in y.y.triplet_iter() {
        if r == row && c == col {
            return *value;
        }
    }
    Complex::new(0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::branch::BranchElement;
    use crate::elements::bus::BusType;
    use crate::elements::generator::{Generator, GeneratorType};
    use crate::elements::line::Line;
    use crate::elements::{Branch, Bus};

    fn two_generator_network() -> (Network, Vec<DynamicGenerator>) {
        let mut slack = Bus::new("SLACK", 110.0, BusType::Slack);
        slack.set_voltage(Complex::new(1.0, 0.0));
        let mut pv1 = Bus::new("PV1", 110.0, BusType::PV);
        pv1.set_voltage(Complex::new(1.0, 0.0));
        let mut gen1 = Generator::new("G1", "PV1", GeneratorType::PV, 0.3, 5.0);
        gen1.p = 0.5;
        gen1.recompute_internal_voltage(Complex::new(1.0, 0.0));
        pv1.generators.push(gen1);

        let mut pv2 = Bus::new("PV2", 110.0, BusType::PV);
        pv2.set_voltage(Complex::new(1.0, 0.0));
        let mut gen2 = Generator::new("G2", "PV2", GeneratorType::PV, 0.3, 8.0);
        gen2.p = 0.8;
        gen2.recompute_internal_voltage(Complex::new(1.0, 0.0));
        pv2.generators.push(gen2);

        let mut network = Network::new(100.0, 50.0);
        network.buses.push(slack);
        network.buses.push(pv1);
        network.buses.push(pv2);
        let mut b1 = Branch::new("SLACK", "PV1");
        b1.insert(0, BranchElement::Line(Line::new("L1", 0.01, 0.1, 0.0, 0.0)));
        network.branches.push(b1);
        let mut b2 = Branch::new("SLACK", "PV2");
        b2.insert(0, BranchElement::Line(Line::new("L2", 0.01, 0.12, 0.0, 0.0)));
        network.branches.push(b2);

        let dyn_gens = network
            .buses
            .iter()
            .flat_map(|b| b.generators.iter())
            .map(|g| DynamicGenerator::new(g.clone()).unwrap())
            .collect();
        (network, dyn_gens)
    }

    #[test]
    fn mechanical_power_matches_the_inertia_weighted_formula() {
        let (network, mut generators) = two_generator_network();
        let critical = GeneratorCluster::new(vec![0]);
        let non_critical = GeneratorCluster::new(vec![1]);
        let omib =
            Omib::new(OmibVariant::Zoomib, false, critical, non_critical, 100.0, &mut generators, &network).unwrap();
        let m_c = omib.critical.total_inertia(&generators, 100.0);
        let m_n = omib.non_critical.total_inertia(&generators, 100.0);
        let expected = (m_n * omib.critical.total_mechanical_power(&generators)
            - m_c * omib.non_critical.total_mechanical_power(&generators))
            / (m_c + m_n);
        assert!((omib.mechanical_power - expected).abs() < 1e-9);
    }

    #[test]
    fn zoomib_has_zero_angular_deviation_everywhere() {
        let (network, mut generators) = two_generator_network();
        let critical = GeneratorCluster::new(vec![0]);
        let non_critical = GeneratorCluster::new(vec![1]);
        let omib =
            Omib::new(OmibVariant::Zoomib, false, critical, non_critical, 100.0, &mut generators, &network).unwrap();
        assert_eq!(omib.angular_deviation(0, &generators, 0.0).unwrap(), 0.0);
        assert_eq!(omib.angular_deviation(1, &generators, 5.0).unwrap(), 0.0);
    }
}
