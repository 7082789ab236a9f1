//! Critical-cluster identifiers: each takes the full set of post-fault
//! dynamic generators and produces an ordered list of `(critical,
//! non_critical)` cluster candidates, most-critical-first.
//!
//! Implemented as reusable materialized vectors with a cursor rather than a
//! one-shot iterator, so the execution-tree evaluator can read the candidate
//! list more than once without re-running the identifier.

use std::collections::HashSet;

use crate::elements::generator::{DynamicGenerator, GeneratorCluster, GeneratorSource};
use crate::error::{DomainError, DomainResult, InputValidationError};
use crate::matrix::ImpedanceMatrix;
use crate::network::{Event, EventKind, FaultState, Network};
use crate::trajectory::generator_taylor::{during_fault_angle_derivatives, electrical_power_per_generator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IdentifierType {
    Acceleration,
    Composite,
    Constrained,
    Trajectory,
    DuringFaultTrajectory,
}

/// TSO-specific variant of the generator-source filter applied inside an
/// identifier run. `Rte` is a meta-value handled entirely in [`identify`]:
/// it is never passed down to a single identification pass, which only ever
/// sees `Default`, `NoHydro` or `Nuclear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TsoCustomization {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "RTE")]
    Rte,
    #[serde(rename = "NO_HYDRO")]
    NoHydro,
    #[serde(rename = "NUCLEAR")]
    Nuclear,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdentifierConfig {
    pub identifier_type: IdentifierType,
    pub threshold: f64,
    pub threshold_decrement: f64,
    pub max_number_candidates: usize,
    pub min_cluster_power_mw: f64,
    pub never_critical_generators: Vec<String>,
    pub try_all_combinations: bool,
    /// Ordered critical-generator names, used only by `Constrained`.
    pub constrained_generator_names: Vec<String>,
    /// nth observation time of the already-updated trajectories, used only by
    /// `Trajectory`.
    pub observation_index: usize,
    /// Small time step (ms), used only by `DuringFaultTrajectory`.
    pub during_fault_time_step_ms: u64,
    pub significant_angle_variation_threshold_rad: Option<f64>,
    /// TSO-specific generator-source filter. `Rte` runs the identifier twice
    /// (`NoHydro` then `Nuclear`) and merges the candidates; see [`identify`].
    #[serde(default)]
    pub tso_customization: TsoCustomization,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            identifier_type: IdentifierType::Acceleration,
            threshold: 0.8,
            threshold_decrement: 0.05,
            max_number_candidates: usize::MAX,
            min_cluster_power_mw: 0.0,
            never_critical_generators: Vec::new(),
            try_all_combinations: false,
            constrained_generator_names: Vec::new(),
            observation_index: 0,
            during_fault_time_step_ms: 1,
            significant_angle_variation_threshold_rad: None,
            tso_customization: TsoCustomization::Default,
        }
    }
}

/// A materialized, multi-pass list of `(critical, non_critical)` cluster
/// candidates, ordered largest-critical-cluster-first.
#[derive(Debug, Clone, Default)]
pub struct ClusterCandidates {
    pairs: Vec<(GeneratorCluster, GeneratorCluster)>,
}

impl ClusterCandidates {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&(GeneratorCluster, GeneratorCluster)> {
        self.pairs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(GeneratorCluster, GeneratorCluster)> {
        self.pairs.iter()
    }
}

/// Builds cluster candidates for every generator index not in
/// `never_critical`, given a ranked (most-critical-first) list of indices.
fn enumerate_candidates(ranked: &[usize], all: usize, config: &IdentifierConfig) -> ClusterCandidates {
    let all_indices: HashSet<usize> = (0..all).collect();
    let mut pairs = Vec::new();

    if config.try_all_combinations {
        let n = ranked.len();
        for mask in (1u64..(1u64 << n)).rev() {
            let critical: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).map(|i| ranked[i]).collect();
            if critical.is_empty() {
                continue;
            }
            let critical_set: HashSet<usize> = critical.iter().copied().collect();
            let non_critical: Vec<usize> = all_indices.difference(&critical_set).copied().collect();
            if non_critical.is_empty() {
                continue;
            }
            pairs.push((GeneratorCluster::new(critical), GeneratorCluster::new(non_critical)));
            if pairs.len() >= config.max_number_candidates {
                break;
            }
        }
        return ClusterCandidates { pairs };
    }

    // Default: truncate from the right. First candidate = full ranked list,
    // then drop the least-critical member each step.
    for end in (1..=ranked.len()).rev() {
        let critical: Vec<usize> = ranked[..end].to_vec();
        let critical_set: HashSet<usize> = critical.iter().copied().collect();
        let non_critical: Vec<usize> = all_indices.difference(&critical_set).copied().collect();
        if non_critical.is_empty() {
            continue;
        }
        pairs.push((GeneratorCluster::new(critical), GeneratorCluster::new(non_critical)));
        if pairs.len() >= config.max_number_candidates {
            break;
        }
    }
    ClusterCandidates { pairs }
}

/// Runs the threshold-decrement filter: keep generators whose `|criterion|`
/// clears `threshold * max|criterion|`; if the aggregated mechanical power of
/// the kept set falls short of `min_cluster_power_mw`, lower the threshold
/// and retry.
fn threshold_filter(
    criterion: &[(usize, f64)],
    never_critical: &HashSet<usize>,
    generators: &[DynamicGenerator],
    s_base_mva: f64,
    config: &IdentifierConfig,
) -> Vec<usize> {
    let eligible: Vec<(usize, f64)> =
        criterion.iter().filter(|(i, _)| !never_critical.contains(i)).cloned().collect();
    let max_abs = eligible.iter().map(|(_, c)| c.abs()).fold(0.0_f64, f64::max);
    if max_abs == 0.0 {
        return Vec::new();
    }

    let mut threshold = config.threshold;
    let mut last: Vec<(usize, f64)> = Vec::new();
    while threshold > 0.0 {
        let kept: Vec<(usize, f64)> =
            eligible.iter().filter(|(_, c)| c.abs() > threshold * max_abs).cloned().collect();
        if !kept.is_empty() {
            let aggregated: f64 = kept.iter().map(|(i, _)| generators[*i].generator.mechanical_power().abs()).sum();
            last = kept.clone();
            if aggregated * s_base_mva >= config.min_cluster_power_mw {
                break;
            }
        }
        threshold -= config.threshold_decrement;
    }

    let mut ranked = last;
    ranked.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap());
    ranked.into_iter().map(|(i, _)| i).collect()
}

fn acceleration_criterion(
    generators: &[DynamicGenerator],
    network: &Network,
    s_base_mva: f64,
) -> DomainResult<Vec<(usize, f64)>> {
    let p_e = electrical_power_per_generator(network, FaultState::DuringFault, generators, 0.0, s_base_mva)?;
    Ok(generators
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let m = g.generator.inertia_coefficient(s_base_mva);
            (i, network.pulse * (g.generator.mechanical_power() - p_e[i]) / m)
        })
        .collect())
}

fn single_failure_bus(network: &Network) -> DomainResult<String> {
    if network.failure_events.len() != 1 {
        return Err(DomainError::InputValidation(InputValidationError::CompositeRequiresSingleFailure {
            count: network.failure_events.len(),
        }));
    }
    Ok(fault_bus_name(&network.failure_events[0]))
}

/// Nearest bus to the fault, used as the reference point for the
/// electrical-distance criterion. For a line fault this is whichever end the
/// fault sits closer to, not always the branch key's first bus.
fn fault_bus_name(event: &Event) -> String {
    match &event.kind {
        EventKind::BusShortCircuit { bus, .. } => bus.clone(),
        EventKind::LineShortCircuit { branch, position, .. } => {
            if *position <= 0.5 { branch.first_bus.clone() } else { branch.second_bus.clone() }
        }
        _ => String::new(),
    }
}

fn composite_criterion(
    generators: &[DynamicGenerator],
    network: &Network,
    s_base_mva: f64,
) -> DomainResult<Vec<(usize, f64)>> {
    let fault_bus = single_failure_bus(network)?;
    let acceleration = acceleration_criterion(generators, network, s_base_mva)?;

    let mut distance = vec![0.0; generators.len()];
    for state in [FaultState::PreFault, FaultState::PostFault] {
        let simplified = network.simplified(state)?;
        let Some(f) = simplified.bus_index.get(&fault_bus) else { continue };
        let dense = nalgebra_sparse::convert::serial::convert_csr_dense(&simplified.admittance.y);
        let z = ImpedanceMatrix::from_admittance(&dense)?;
        for (i, g) in generators.iter().enumerate() {
            let bus_name = format!("{}{}", crate::network::simplify::INTERNAL_VOLTAGE_PREFIX, g.name());
            let Some(gi) = simplified.bus_index.get(&bus_name) else { continue };
            distance[i] += z.electrical_distance(gi, f);
        }
    }

    Ok(acceleration
        .into_iter()
        .map(|(i, a)| {
            let d = distance[i];
            (i, if d.abs() > 1e-12 { a / d } else { 0.0 })
        })
        .collect())
}

fn constrained_criterion(
    generators: &[DynamicGenerator],
    config: &IdentifierConfig,
) -> DomainResult<Vec<(usize, f64)>> {
    let mut unknown = Vec::new();
    let mut criterion = vec![(0usize, 0.0); generators.len()];
    for (i, g) in generators.iter().enumerate() {
        criterion[i] = (i, if config.constrained_generator_names.iter().any(|n| n == g.name()) { 1.0 } else { 0.0 });
    }
    for name in &config.constrained_generator_names {
        if !generators.iter().any(|g| g.name() == name) {
            unknown.push(name.clone());
        }
    }
    if !unknown.is_empty() {
        return Err(DomainError::InputValidation(InputValidationError::UnknownConstrainedGenerators { names: unknown }));
    }
    Ok(criterion)
}

/// Gap-based selection: sort values, find the widest gap, return the indices
/// beyond it (most-extreme first), reversed onto the backswing side if the
/// gap itself sits in negative territory.
fn gap_select(mut values: Vec<(usize, f64)>) -> Vec<usize> {
    if values.len() < 2 {
        return values.into_iter().map(|(i, _)| i).collect();
    }
    values.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    let mut widest_gap = 0.0;
    let mut gap_index = 0;
    for w in 1..values.len() {
        let gap = values[w].1 - values[w - 1].1;
        if gap > widest_gap {
            widest_gap = gap;
            gap_index = w;
        }
    }
    let (backward, forward) = values.split_at(gap_index);
    if values[gap_index].1 < 0.0 {
        backward.iter().rev().map(|(i, _)| *i).collect()
    } else {
        forward.iter().map(|(i, _)| *i).collect()
    }
}

fn trajectory_criterion(generators: &[DynamicGenerator], config: &IdentifierConfig) -> Vec<(usize, f64)> {
    generators
        .iter()
        .enumerate()
        .filter_map(|(i, g)| {
            let times = g.observation_times();
            let t_obs = *times.get(config.observation_index)?;
            let delta0 = g.rotor_angle_at(0.0).ok()?;
            let delta_obs = g.rotor_angle_at(t_obs).ok()?;
            Some((i, delta_obs - delta0))
        })
        .collect()
}

fn during_fault_trajectory_criterion(
    generators: &[DynamicGenerator],
    network: &Network,
    s_base_mva: f64,
    config: &IdentifierConfig,
) -> DomainResult<Vec<(usize, f64)>> {
    let t = config.during_fault_time_step_ms as f64 / 1000.0;
    let (d2, d4) = during_fault_angle_derivatives(network, generators, s_base_mva)?;
    Ok((0..generators.len())
        .map(|i| {
            // Two-term Taylor expansion of the during-fault swing.
            let delta_angle = d2[i] * t.powi(2) / 2.0 + d4[i] * t.powi(4) / 24.0;
            (i, delta_angle)
        })
        .collect())
}

/// Identifies critical-cluster candidates per `config.identifier_type`.
///
/// When `config.tso_customization` is `Rte`, this runs the identifier twice —
/// once with the generator-source filter forced to `NoHydro`, once to
/// `Nuclear` — concatenates the two candidate lists (`NoHydro` first),
/// deduplicates by critical-cluster generator-name set (first occurrence
/// wins), stable-sorts the survivors ascending by critical-cluster size, and
/// truncates to `max_number_candidates` if it is set.
pub fn identify(
    config: &IdentifierConfig,
    generators: &[DynamicGenerator],
    network: &Network,
    s_base_mva: f64,
) -> DomainResult<ClusterCandidates> {
    if config.tso_customization != TsoCustomization::Rte {
        return identify_single(config, generators, network, s_base_mva, config.tso_customization);
    }

    let no_hydro = identify_single(config, generators, network, s_base_mva, TsoCustomization::NoHydro)?;
    let nuclear = identify_single(config, generators, network, s_base_mva, TsoCustomization::Nuclear)?;

    let mut seen: HashSet<Vec<&str>> = HashSet::new();
    let mut merged: Vec<(GeneratorCluster, GeneratorCluster)> = Vec::new();
    for (critical, non_critical) in no_hydro.pairs.into_iter().chain(nuclear.pairs.into_iter()) {
        let mut names: Vec<&str> = critical.members().iter().map(|&i| generators[i].name()).collect();
        names.sort_unstable();
        if !seen.insert(names) {
            continue;
        }
        merged.push((critical, non_critical));
    }
    merged.sort_by_key(|(critical, _)| critical.members().len());
    if config.max_number_candidates > 0 && merged.len() > config.max_number_candidates {
        merged.truncate(config.max_number_candidates);
    }
    Ok(ClusterCandidates { pairs: merged })
}

/// Runs a single identification pass with an explicit generator-source
/// filter (never `Rte`, which [`identify`] handles by running this twice).
fn identify_single(
    config: &IdentifierConfig,
    generators: &[DynamicGenerator],
    network: &Network,
    s_base_mva: f64,
    customization: TsoCustomization,
) -> DomainResult<ClusterCandidates> {
    if generators.is_empty() {
        return Err(DomainError::InputValidation(InputValidationError::NoGenerator));
    }
    if !(0.0..=1.0).contains(&config.threshold) && matches!(
        config.identifier_type,
        IdentifierType::Acceleration | IdentifierType::Composite
    ) {
        return Err(DomainError::InputValidation(InputValidationError::InvalidThreshold { value: config.threshold }));
    }

    let never_critical: HashSet<usize> = generators
        .iter()
        .enumerate()
        .filter(|(_, g)| {
            if config.never_critical_generators.iter().any(|n| n == g.name()) {
                return true;
            }
            match customization {
                TsoCustomization::NoHydro => {
                    g.generator.source == GeneratorSource::Hydro && g.generator.p_max.abs() < 1.0
                }
                TsoCustomization::Nuclear => g.generator.source != GeneratorSource::Nuclear,
                TsoCustomization::Default | TsoCustomization::Rte => false,
            }
        })
        .map(|(i, _)| i)
        .collect();

    let ranked = match config.identifier_type {
        IdentifierType::Acceleration => {
            let criterion = acceleration_criterion(generators, network, s_base_mva)?;
            threshold_filter(&criterion, &never_critical, generators, s_base_mva, config)
        }
        IdentifierType::Composite => {
            let criterion = composite_criterion(generators, network, s_base_mva)?;
            threshold_filter(&criterion, &never_critical, generators, s_base_mva, config)
        }
        IdentifierType::Constrained => {
            let criterion = constrained_criterion(generators, config)?;
            let mut ranked: Vec<usize> =
                criterion.iter().filter(|(i, c)| *c > 0.0 && !never_critical.contains(i)).map(|(i, _)| *i).collect();
            ranked.sort();
            ranked
        }
        IdentifierType::Trajectory => {
            let variation = trajectory_criterion(generators, config);
            let threshold = config.significant_angle_variation_threshold_rad;
            if let Some(limit) = threshold {
                let max_abs = variation.iter().map(|(_, v)| v.abs()).fold(0.0_f64, f64::max);
                if max_abs < limit {
                    return Ok(enumerate_candidates(&[variation.first().map(|(i, _)| *i).unwrap_or(0)], generators.len(), config));
                }
            }
            gap_select(variation.into_iter().filter(|(i, _)| !never_critical.contains(i)).collect())
        }
        IdentifierType::DuringFaultTrajectory => {
            let variation = during_fault_trajectory_criterion(generators, network, s_base_mva, config)?;
            let threshold = config.significant_angle_variation_threshold_rad;
            if let Some(limit) = threshold {
                let max_abs = variation.iter().map(|(_, v)| v.abs()).fold(0.0_f64, f64::max);
                if max_abs < limit {
                    return Ok(enumerate_candidates(&[variation.first().map(|(i, _)| *i).unwrap_or(0)], generators.len(), config));
                }
            }
            gap_select(variation.into_iter().filter(|(i, _)| !never_critical.contains(i)).collect())
        }
    };

    Ok(enumerate_candidates(&ranked, generators.len(), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_select_picks_the_widest_break() {
        let values = vec![(0, 0.1), (1, 0.2), (2, 5.0), (3, 5.2)];
        let selected = gap_select(values);
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&2));
        assert!(selected.contains(&3));
    }

    #[test]
    fn truncate_from_right_produces_nested_candidates() {
        // With 3 generators total, the full ranked set has no non-critical
        // complement left, so the widest valid candidate drops the weakest one.
        let config = IdentifierConfig::default();
        let candidates = enumerate_candidates(&[2, 1, 0], 3, &config);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates.get(0).unwrap().0.members(), &[2, 1]);
        assert_eq!(candidates.get(1).unwrap().0.members(), &[2]);
    }

    fn rte_test_network_and_generators() -> (Network, Vec<DynamicGenerator>) {
        use crate::builder::NetworkBuilder;
        use crate::elements::generator::{Generator, GeneratorType};
        use crate::elements::{Bus, BusType, Line};
        use nalgebra::Complex;

        let mut slack = Bus::new("SLACK", 110.0, BusType::Slack);
        slack.set_voltage(Complex::new(1.0, 0.0));

        let mut make_bus = |name: &str| {
            let mut b = Bus::new(name, 110.0, BusType::PV);
            b.set_voltage(Complex::new(1.0, 0.0));
            b
        };

        let mut hydro_bus = make_bus("HYDRO");
        let mut hydro = Generator::new("G1", "HYDRO", GeneratorType::PV, 0.3, 5.0);
        hydro.source = GeneratorSource::Hydro;
        hydro.p = 0.2;
        hydro.p_max = 0.5;
        hydro.recompute_internal_voltage(Complex::new(1.0, 0.0));
        hydro_bus.generators.push(hydro);

        let mut nuclear_bus = make_bus("NUCLEAR");
        let mut nuclear = Generator::new("G2", "NUCLEAR", GeneratorType::PV, 0.3, 8.0);
        nuclear.source = GeneratorSource::Nuclear;
        nuclear.p = 0.8;
        nuclear.recompute_internal_voltage(Complex::new(1.0, 0.0));
        nuclear_bus.generators.push(nuclear);

        let mut other_bus = make_bus("OTHER");
        let mut other = Generator::new("G3", "OTHER", GeneratorType::PV, 0.3, 6.0);
        other.p = 0.4;
        other.recompute_internal_voltage(Complex::new(1.0, 0.0));
        other_bus.generators.push(other);

        let network = NetworkBuilder::new(100.0, 50.0)
            .add_bus(slack)
            .add_bus(hydro_bus)
            .add_bus(nuclear_bus)
            .add_bus(other_bus)
            .add_line("SLACK", "HYDRO", Line::new("L1", 0.01, 0.1, 0.0, 0.0))
            .add_line("SLACK", "NUCLEAR", Line::new("L2", 0.01, 0.1, 0.0, 0.0))
            .add_line("SLACK", "OTHER", Line::new("L3", 0.01, 0.1, 0.0, 0.0))
            .build();

        let generators = network
            .buses
            .iter()
            .flat_map(|b| b.generators.iter())
            .map(|g| DynamicGenerator::new(g.clone()).unwrap())
            .collect();
        (network, generators)
    }

    #[test]
    fn rte_customization_runs_twice_dedupes_and_sorts_ascending_by_size() {
        let (network, generators) = rte_test_network_and_generators();
        let config = IdentifierConfig {
            identifier_type: IdentifierType::Constrained,
            constrained_generator_names: vec!["G1".to_string(), "G2".to_string(), "G3".to_string()],
            tso_customization: TsoCustomization::Rte,
            ..IdentifierConfig::default()
        };

        let candidates = identify(&config, &generators, &network, 100.0).unwrap();

        // NO_HYDRO excludes G1 (small hydro), leaving {G2,G3} and {G2} as
        // nested candidates; NUCLEAR excludes everyone but G2, producing a
        // single {G2} candidate that is a duplicate of NO_HYDRO's {G2} one
        // and must be dropped. The survivors are sorted smallest-first.
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates.get(0).unwrap().0.members(), &[1]);
        assert_eq!(candidates.get(1).unwrap().0.members(), &[1, 2]);
    }
}
