//! Failure and mitigation events.
//!
//! A base load-flow model has nothing equivalent to reuse directly here, so
//! the shape (a discriminated payload plus a millisecond timestamp, applied
//! in order to a cloned network) is built from scratch.

use nalgebra::Complex;

use crate::elements::branch::BranchElement;
use crate::elements::load::FictiveLoad;
use crate::error::{DomainError, DomainResult, EventError};
use crate::network::Network;

/// Unordered bus-pair identity for a branch, matched regardless of storage
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BranchKey {
    pub first_bus: String,
    pub second_bus: String,
}

impl BranchKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self { first_bus: a.into(), second_bus: b.into() }
    }

    pub fn matches(&self, first: &str, second: &str) -> bool {
        (self.first_bus == first && self.second_bus == second)
            || (self.first_bus == second && self.second_bus == first)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    LineShortCircuit { branch: BranchKey, parallel_id: i64, position: f64 },
    BusShortCircuit { bus: String, r: f64, x: f64 },
    LineShortCircuitClearing { branch: BranchKey, parallel_id: i64 },
    BusShortCircuitClearing { bus: String },
    /// Opens or closes one side of a parallel element. Closing an open
    /// branch element is refused.
    BranchEvent { branch: BranchKey, parallel_id: i64, at_first_bus: bool, closed: bool },
    /// Toggles a breaker's closed state; invalidates the coupling map.
    BreakerEvent { breaker_id: i64, closed: bool },
}

impl EventKind {
    pub fn is_failure(&self) -> bool {
        matches!(self, EventKind::LineShortCircuit { .. } | EventKind::BusShortCircuit { .. })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub time_ms: u64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(time_ms: u64, kind: EventKind) -> DomainResult<Self> {
        if let EventKind::LineShortCircuit { position, .. } = &kind {
            if *position <= 0.0 || *position >= 1.0 {
                return Err(DomainError::Event(EventError::InvalidFaultPosition { position: *position }));
            }
        }
        Ok(Self { time_ms, kind })
    }

    /// Applies this event's effect to `network` in place.
    ///
    /// Returns `Ok(false)` (not an error) when the event targets a
    /// disconnected element; the caller is expected to classify the whole
    /// contingency as an irrelevant fault from that signal, not this crate.
    pub fn apply_to_network(&self, network: &mut Network) -> DomainResult<bool> {
        match &self.kind {
            EventKind::LineShortCircuit { branch, parallel_id, position } => {
                apply_line_short_circuit(network, branch, *parallel_id, *position)
            }
            EventKind::BusShortCircuit { bus, r, x } => apply_bus_short_circuit(network, bus, *r, *x),
            EventKind::LineShortCircuitClearing { branch, parallel_id } => {
                clear_line_short_circuit(network, branch, *parallel_id)
            }
            EventKind::BusShortCircuitClearing { bus } => clear_bus_short_circuit(network, bus),
            EventKind::BranchEvent { branch, parallel_id, at_first_bus, closed } => {
                apply_branch_event(network, branch, *parallel_id, *at_first_bus, *closed)
            }
            EventKind::BreakerEvent { breaker_id, closed } => apply_breaker_event(network, *breaker_id, *closed),
        }
    }
}

fn find_branch_mut<'a>(network: &'a mut Network, key: &BranchKey) -> Option<&'a mut crate::elements::Branch> {
    network
        .branches
        .iter_mut()
        .find(|b| key.matches(&b.first_bus, &b.second_bus))
}

fn apply_line_short_circuit(
    network: &mut Network,
    branch: &BranchKey,
    parallel_id: i64,
    position: f64,
) -> DomainResult<bool> {
    let Some(b) = find_branch_mut(network, branch) else {
        return Ok(false);
    };
    if !b.is_closed() {
        return Ok(false);
    }
    let first_bus = b.first_bus.clone();
    let second_bus = b.second_bus.clone();
    let element = b.element_mut(parallel_id)?;
    let BranchElement::Line(line) = element else {
        return Err(DomainError::InputValidation(crate::error::InputValidationError::UnknownParallelId {
            branch: (branch.first_bus.clone(), branch.second_bus.clone()),
            parallel_id,
        }));
    };
    if !line.is_closed() {
        return Ok(false);
    }
    // Impedant faults (r != 0) are refused outright: only a metal
    // short-circuit (r == x == 0 at the fault point) is modeled, but the
    // fault's electrical position still splits the line's own admittance
    // between the two fictive loads rather than injecting a bolted short at
    // both ends regardless of where along the line the fault sits.
    let line_admittance = Complex::new(1.0, 0.0) / Complex::new(line.r, line.x);
    let closed_at_first = line.closed_at_first_bus;
    let closed_at_second = line.closed_at_second_bus;
    line.metal_short_circuit = true;

    // The event's branch key may name the pair in the opposite order from
    // how the branch itself stores first/second bus; flip the position so
    // it still measures distance from `branch.first_bus`.
    let position = if first_bus == branch.first_bus { position } else { 1.0 - position };

    if closed_at_first {
        let near =
            FictiveLoad { name: format!("SC@{first_bus}#{parallel_id}"), admittance: line_admittance / position };
        network.add_fictive_load(&first_bus, near);
    }
    if closed_at_second {
        let far = FictiveLoad {
            name: format!("SC@{second_bus}#{parallel_id}"),
            admittance: line_admittance / (1.0 - position),
        };
        network.add_fictive_load(&second_bus, far);
    }
    if !closed_at_first || !closed_at_second {
        tracing::warn!(%first_bus, %second_bus, "line short-circuit: one end already open, proceeding with a single fictive load");
    }
    Ok(true)
}

fn apply_bus_short_circuit(network: &mut Network, bus: &str, r: f64, x: f64) -> DomainResult<bool> {
    if r != 0.0 {
        return Err(DomainError::Event(EventError::ImpedantFaultRefused { r, x }));
    }
    if network.find_bus(bus).is_none() {
        return Ok(false);
    }
    let fl = FictiveLoad::from_short_circuit_impedance(format!("SC@{bus}"), r, x);
    network.add_fictive_load(bus, fl);
    Ok(true)
}

fn clear_line_short_circuit(network: &mut Network, branch: &BranchKey, parallel_id: i64) -> DomainResult<bool> {
    let (first_bus, second_bus) = {
        let Some(b) = find_branch_mut(network, branch) else {
            return Ok(false);
        };
        let first_bus = b.first_bus.clone();
        let second_bus = b.second_bus.clone();
        if let Ok(BranchElement::Line(line)) = b.element_mut(parallel_id) {
            line.metal_short_circuit = false;
        }
        (first_bus, second_bus)
    };
    network.remove_fictive_loads_matching(&format!("SC@{first_bus}#{parallel_id}"));
    network.remove_fictive_loads_matching(&format!("SC@{second_bus}#{parallel_id}"));
    Ok(true)
}

fn clear_bus_short_circuit(network: &mut Network, bus: &str) -> DomainResult<bool> {
    network.remove_fictive_loads_matching(&format!("SC@{bus}"));
    Ok(true)
}

fn apply_branch_event(
    network: &mut Network,
    branch: &BranchKey,
    parallel_id: i64,
    at_first_bus: bool,
    closed: bool,
) -> DomainResult<bool> {
    let Some(b) = find_branch_mut(network, branch) else {
        return Ok(false);
    };
    let was_closed = b.is_closed();
    let element = b.element_mut(parallel_id)?;
    let element_closed = element.is_closed();
    if closed && !element_closed {
        return Err(DomainError::Event(EventError::ClosingNotImplemented));
    }
    match element {
        BranchElement::Line(line) => {
            if at_first_bus {
                line.closed_at_first_bus = closed;
            } else {
                line.closed_at_second_bus = closed;
            }
        }
        BranchElement::Transformer(t) => {
            if at_first_bus {
                t.closed_at_primary = closed;
            } else {
                t.closed_at_secondary = closed;
            }
        }
    }
    if !was_closed {
        return Ok(false);
    }
    Ok(true)
}

fn apply_breaker_event(network: &mut Network, breaker_id: i64, closed: bool) -> DomainResult<bool> {
    let Some(breaker) = network.breakers.iter_mut().find(|b| b.id == breaker_id) else {
        return Ok(false);
    };
    breaker.closed = closed;
    network.invalidate_coupling();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_short_circuit_rejects_boundary_positions() {
        let key = BranchKey::new("A", "B");
        assert!(Event::new(0, EventKind::LineShortCircuit { branch: key.clone(), parallel_id: 1, position: 0.0 }).is_err());
        assert!(Event::new(0, EventKind::LineShortCircuit { branch: key.clone(), parallel_id: 1, position: 1.0 }).is_err());
        assert!(Event::new(0, EventKind::LineShortCircuit { branch: key, parallel_id: 1, position: 0.5 }).is_ok());
    }

    #[test]
    fn branch_key_matches_regardless_of_order() {
        let key = BranchKey::new("A", "B");
        assert!(key.matches("B", "A"));
        assert!(!key.matches("A", "C"));
    }
}
