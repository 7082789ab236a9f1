//! Simplified-network construction: coupling, generator-internal-voltage
//! buses, connectivity pruning, and the final admittance assembly.
//!
//! A base `PFNetwork`-style model is already "simplified" by construction
//! (no coupling, no Kron reduction, no generator-internal-voltage buses), so
//! this stage is built from scratch, reusing the sparse-admittance assembly
//! style (`basic/system/system.rs::create_ybus`) for the final step.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::elements::branch::BranchElement;
use crate::elements::bus::BusType;
use crate::elements::line::Line;
use crate::elements::{Branch, Bus};
use crate::error::{DomainError, DomainResult, TopologyError};
use crate::matrix::admittance::AdmittanceMatrix;
use crate::network::coupling::compute_coupling;
use crate::network::events::Event;
use crate::network::{Breaker, FaultState, Network};

/// Bus-name -> matrix-row/col lookup, shared by [`AdmittanceMatrix`] and the
/// composite identifier's electrical-distance computation.
#[derive(Debug, Clone, Default)]
pub struct BusIndex {
    index: HashMap<String, usize>,
}

impl BusIndex {
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self { index: names.into_iter().enumerate().map(|(i, n)| (n.to_string(), i)).collect() }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

pub const INTERNAL_VOLTAGE_PREFIX: &str = "INTERNAL_VOLTAGE_";

#[derive(Debug)]
pub struct SimplifiedNetwork {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub bus_index: BusIndex,
    /// Matrix row/col indices of the generator-internal-voltage buses, in
    /// the same order as [`Self::generator_names`] (these buses sort last).
    pub generator_bus_indices: Vec<usize>,
    pub generator_names: Vec<String>,
    pub admittance: AdmittanceMatrix,
    /// Buses dropped during connectivity pruning, retained so an
    /// Islanding-status computation outside this crate can diff pre/during/post
    /// without recomputing it.
    pub disconnected_buses: Vec<String>,
}

impl SimplifiedNetwork {
    pub fn bus(&self, name: &str) -> Option<&Bus> {
        self.bus_index.get(name).map(|i| &self.buses[i])
    }

    pub fn n_generators(&self) -> usize {
        self.generator_bus_indices.len()
    }
}

/// Builds the simplified network for `network` at `state`.
pub fn build(network: &Network, state: FaultState) -> DomainResult<SimplifiedNetwork> {
    let mut buses = network.buses.clone();
    let mut branches = network.branches.clone();
    let mut breakers = network.breakers.clone();

    apply_events_for_state(network, state, &mut buses, &mut branches, &mut breakers)?;

    let (mut buses, mut branches) = couple_buses(buses, branches, &breakers)?;
    insert_generator_internal_voltage_buses(&mut buses, &mut branches);

    let disconnected = prune_disconnected(&mut buses, &mut branches)?;

    // Stable sort: GeneratorInternalVoltage buses last.
    buses.sort_by_key(|b| matches!(b.bus_type, BusType::GeneratorInternalVoltage) as u8);

    let names: Vec<&str> = buses.iter().map(|b| b.name.as_str()).collect();
    let bus_index = BusIndex::from_names(names.iter().copied());

    let generator_names: Vec<String> = buses
        .iter()
        .filter(|b| matches!(b.bus_type, BusType::GeneratorInternalVoltage))
        .map(|b| b.name.clone())
        .collect();
    let generator_bus_indices: Vec<usize> =
        generator_names.iter().map(|n| bus_index.get(n).expect("just inserted")).collect();

    let admittance = AdmittanceMatrix::assemble(&buses, &branches, &bus_index)?;

    Ok(SimplifiedNetwork {
        buses,
        branches,
        bus_index,
        generator_bus_indices,
        generator_names,
        admittance,
        disconnected_buses: disconnected,
    })
}

fn apply_events_for_state(
    network: &Network,
    state: FaultState,
    buses: &mut [Bus],
    branches: &mut Vec<Branch>,
    breakers: &mut Vec<Breaker>,
) -> DomainResult<()> {
    if matches!(state, FaultState::PreFault) {
        return Ok(());
    }
    let mut events: Vec<&Event> = network.failure_events.iter().collect();
    events.sort_by_key(|e| e.time_ms);
    if matches!(state, FaultState::PostFault) {
        let mut mitigations: Vec<&Event> = network.mitigation_events.iter().collect();
        mitigations.sort_by_key(|e| e.time_ms);
        events.extend(mitigations);
    }
    // Events mutate a scratch `Network` wired to the cloned bus/branch/breaker
    // state so `Event::apply_to_network` can be reused unchanged.
    let mut scratch = Network::from_parts(
        buses.to_vec(),
        branches.clone(),
        breakers.clone(),
        network.non_synchronous_injectors.clone(),
        network.base_power_mva,
        network.pulse,
    );
    for event in events {
        event.apply_to_network(&mut scratch)?;
    }
    buses.clone_from_slice(&scratch.buses);
    *branches = scratch.branches;
    *breakers = scratch.breakers;
    Ok(())
}

fn couple_buses(buses: Vec<Bus>, branches: Vec<Branch>, breakers: &[Breaker]) -> DomainResult<(Vec<Bus>, Vec<Branch>)> {
    let names: Vec<String> = buses.iter().map(|b| b.name.clone()).collect();
    let coupling = compute_coupling(&names, breakers);
    if coupling.groups.is_empty() {
        return Ok((buses, branches));
    }

    let mut by_merged: HashMap<String, Bus> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for bus in buses {
        let merged_name = coupling.merged_name(&bus.name).to_string();
        if let Some(existing) = by_merged.get_mut(&merged_name) {
            existing.merge_from(&bus)?;
        } else {
            let mut merged = bus.clone();
            merged.name = merged_name.clone();
            by_merged.insert(merged_name.clone(), merged);
            order.push(merged_name);
        }
    }
    let new_buses: Vec<Bus> = order.into_iter().map(|n| by_merged.remove(&n).unwrap()).collect();

    let slack_groups: Vec<&str> = new_buses
        .iter()
        .filter(|b| matches!(b.bus_type, BusType::Slack))
        .map(|b| b.name.as_str())
        .collect();
    if slack_groups.len() > 1 {
        return Err(DomainError::Topology(TopologyError::MultipleSlackBus));
    }

    let new_branches: Vec<Branch> = branches
        .into_iter()
        .filter_map(|mut b| {
            let new_first = coupling.merged_name(&b.first_bus).to_string();
            let new_second = coupling.merged_name(&b.second_bus).to_string();
            if new_first == new_second {
                // Self-loop after coupling: drop.
                return None;
            }
            b.first_bus = new_first;
            b.second_bus = new_second;
            Some(b)
        })
        .collect();

    Ok((new_buses, new_branches))
}

fn insert_generator_internal_voltage_buses(buses: &mut Vec<Bus>, branches: &mut Vec<Branch>) {
    let mut new_buses = Vec::new();
    let mut new_branches = Vec::new();
    for bus in buses.iter_mut() {
        if matches!(bus.bus_type, BusType::GeneratorInternalVoltage) {
            continue;
        }
        let moved: Vec<_> = bus
            .generators
            .iter()
            .filter(|g| g.connected)
            .cloned()
            .collect();
        if moved.is_empty() {
            continue;
        }
        bus.generators.retain(|g| !g.connected);
        for mut gen in moved {
            let internal_name = format!("{INTERNAL_VOLTAGE_PREFIX}{}", gen.name);
            let mut internal_bus = Bus::new(&internal_name, bus.nominal_voltage_kv, BusType::GeneratorInternalVoltage);
            let e = gen.internal_voltage().unwrap_or(nalgebra::Complex::new(1.0, 0.0));
            internal_bus.set_voltage(e);
            gen.host_bus = internal_name.clone();
            internal_bus.generators.push(gen.clone());
            new_buses.push(internal_bus);

            let mut branch = Branch::new(internal_name.clone(), bus.name.clone());
            branch.insert(0, BranchElement::Line(Line::new(format!("XD_{}", gen.name), 0.0, gen.x_transient, 0.0, 0.0)));
            new_branches.push(branch);
        }
    }
    buses.extend(new_buses);
    branches.extend(new_branches);
}

fn prune_disconnected(buses: &mut Vec<Bus>, branches: &mut Vec<Branch>) -> DomainResult<Vec<String>> {
    let slack_idx = buses
        .iter()
        .position(|b| matches!(b.bus_type, BusType::Slack))
        .ok_or(DomainError::Topology(TopologyError::NoSlackBus))?;

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for branch in branches.iter().filter(|b| b.is_closed()) {
        adjacency.entry(branch.first_bus.as_str()).or_default().push(branch.second_bus.as_str());
        adjacency.entry(branch.second_bus.as_str()).or_default().push(branch.first_bus.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(buses[slack_idx].name.as_str());
    visited.insert(buses[slack_idx].name.as_str());
    while let Some(current) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(current) {
            for &n in neighbors {
                if visited.insert(n) {
                    queue.push_back(n);
                }
            }
        }
    }

    let disconnected: Vec<String> =
        buses.iter().filter(|b| !visited.contains(b.name.as_str())).map(|b| b.name.clone()).collect();
    let disconnected_set: HashSet<&str> = disconnected.iter().map(|s| s.as_str()).collect();

    buses.retain(|b| !disconnected_set.contains(b.name.as_str()));
    branches.retain(|b| {
        !disconnected_set.contains(b.first_bus.as_str()) && !disconnected_set.contains(b.second_bus.as_str())
    });

    Ok(disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::generator::{Generator, GeneratorType};
    use nalgebra::Complex;

    fn tiny_network() -> Network {
        let mut slack = Bus::new("SLACK", 110.0, BusType::Slack);
        slack.set_voltage(Complex::new(1.0, 0.0));
        let mut pv = Bus::new("PV1", 110.0, BusType::PV);
        pv.set_voltage(Complex::new(1.0, 0.0));
        let mut gen = Generator::new("G1", "PV1", GeneratorType::PV, 0.3, 5.0);
        gen.p = 0.5;
        gen.recompute_internal_voltage(Complex::new(1.0, 0.0));
        pv.generators.push(gen);

        let mut network = Network::new(100.0, 50.0);
        network.buses.push(slack);
        network.buses.push(pv);
        let mut branch = Branch::new("SLACK", "PV1");
        branch.insert(0, BranchElement::Line(Line::new("L1", 0.01, 0.1, 0.0, 0.0)));
        network.branches.push(branch);
        network
    }

    #[test]
    fn generator_internal_voltage_buses_sort_last() {
        let net = tiny_network();
        let simplified = build(&net, FaultState::PreFault).unwrap();
        let last = simplified.buses.last().unwrap();
        assert!(matches!(last.bus_type, BusType::GeneratorInternalVoltage));
        assert_eq!(simplified.n_generators(), 1);
    }

    #[test]
    fn no_slack_bus_is_an_error() {
        let mut net = tiny_network();
        net.buses[0].bus_type = BusType::PQ;
        assert!(matches!(build(&net, FaultState::PreFault), Err(DomainError::Topology(TopologyError::NoSlackBus))));
    }
}
