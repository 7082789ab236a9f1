//! The network: buses, branches, breakers, non-synchronous injectors and the
//! event sequence applied to them, plus the memoized simplified-network cache.
//!
//! Follows the plain-struct `PFNetwork` (`basic/system/system.rs`) shape as
//! an owned collection of buses and branches, generalized with the event
//! sequence and simplified-network cache a load-flow-only model has no use
//! for.

pub mod coupling;
pub mod events;
pub mod simplify;

pub use coupling::{Breaker, CouplingMap};
pub use events::{BranchKey, Event, EventKind};
pub use simplify::{BusIndex, SimplifiedNetwork};

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::elements::load::FictiveLoad;
use crate::elements::{Branch, Bus, NonSynchronousInjector};
use crate::error::DomainResult;

/// Which point in the event sequence a simplified network is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultState {
    PreFault,
    DuringFault,
    PostFault,
}

#[derive(Debug)]
pub struct Network {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub breakers: Vec<Breaker>,
    pub non_synchronous_injectors: Vec<NonSynchronousInjector>,
    pub base_power_mva: f64,
    /// Nominal angular frequency `omega_0 = 2 * pi * f`, rad/s.
    pub pulse: f64,
    pub protection_delay_ms: u64,
    pub failure_events: Vec<Event>,
    pub mitigation_events: Vec<Event>,
    simplified_cache: RefCell<HashMap<FaultState, Rc<SimplifiedNetwork>>>,
}

impl Network {
    pub fn new(base_power_mva: f64, frequency_hz: f64) -> Self {
        Self {
            buses: Vec::new(),
            branches: Vec::new(),
            breakers: Vec::new(),
            non_synchronous_injectors: Vec::new(),
            base_power_mva,
            pulse: 2.0 * std::f64::consts::PI * frequency_hz,
            protection_delay_ms: 0,
            failure_events: Vec::new(),
            mitigation_events: Vec::new(),
            simplified_cache: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn from_parts(
        buses: Vec<Bus>,
        branches: Vec<Branch>,
        breakers: Vec<Breaker>,
        non_synchronous_injectors: Vec<NonSynchronousInjector>,
        base_power_mva: f64,
        pulse: f64,
    ) -> Self {
        Self {
            buses,
            branches,
            breakers,
            non_synchronous_injectors,
            base_power_mva,
            pulse,
            protection_delay_ms: 0,
            failure_events: Vec::new(),
            mitigation_events: Vec::new(),
            simplified_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn find_bus(&self, name: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.name == name)
    }

    pub fn find_bus_mut(&mut self, name: &str) -> Option<&mut Bus> {
        self.buses.iter_mut().find(|b| b.name == name)
    }

    pub fn add_fictive_load(&mut self, bus_name: &str, load: FictiveLoad) {
        if let Some(bus) = self.find_bus_mut(bus_name) {
            bus.fictive_loads.push(load);
        }
        self.invalidate_coupling();
    }

    pub fn remove_fictive_loads_matching(&mut self, name: &str) {
        for bus in &mut self.buses {
            bus.fictive_loads.retain(|f| f.name != name);
        }
        self.invalidate_coupling();
    }

    /// Drops every memoized simplified network. Called whenever topology,
    /// events or breaker state change.
    pub fn invalidate_coupling(&mut self) {
        self.simplified_cache.borrow_mut().clear();
    }

    pub fn provide_events(&mut self, failure_events: Vec<Event>, mitigation_events: Vec<Event>) {
        self.failure_events = failure_events;
        self.mitigation_events = mitigation_events;
        self.invalidate_coupling();
    }

    /// Returns the memoized simplified network at `state`, building and
    /// caching it on first use.
    pub fn simplified(&self, state: FaultState) -> DomainResult<Rc<SimplifiedNetwork>> {
        if let Some(cached) = self.simplified_cache.borrow().get(&state) {
            return Ok(Rc::clone(cached));
        }
        let built = Rc::new(simplify::build(self, state)?);
        self.simplified_cache.borrow_mut().insert(state, Rc::clone(&built));
        Ok(built)
    }

    /// A clean copy sharing no memoization beyond the pre-fault simplified
    /// network: independent contingency runs must not share during/post-fault
    /// caches.
    pub fn duplicate(&self) -> Self {
        let mut cache = HashMap::new();
        if let Some(pre) = self.simplified_cache.borrow().get(&FaultState::PreFault) {
            cache.insert(FaultState::PreFault, Rc::clone(pre));
        }
        Self {
            buses: self.buses.clone(),
            branches: self.branches.clone(),
            breakers: self.breakers.clone(),
            non_synchronous_injectors: self.non_synchronous_injectors.clone(),
            base_power_mva: self.base_power_mva,
            pulse: self.pulse,
            protection_delay_ms: self.protection_delay_ms,
            failure_events: self.failure_events.clone(),
            mitigation_events: self.mitigation_events.clone(),
            simplified_cache: RefCell::new(cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::bus::BusType;

    #[test]
    fn duplicate_carries_only_the_pre_fault_cache() {
        let mut net = Network::new(100.0, 50.0);
        let mut slack = Bus::new("SLACK", 110.0, BusType::Slack);
        slack.set_voltage(nalgebra::Complex::new(1.0, 0.0));
        net.buses.push(slack);
        let _ = net.simplified(FaultState::PreFault).unwrap();

        let dup = net.duplicate();
        assert!(dup.simplified_cache.borrow().contains_key(&FaultState::PreFault));
        assert!(!dup.simplified_cache.borrow().contains_key(&FaultState::DuringFault));
    }

    #[test]
    fn invalidate_coupling_clears_every_cached_state() {
        let mut net = Network::new(100.0, 50.0);
        let mut slack = Bus::new("SLACK", 110.0, BusType::Slack);
        slack.set_voltage(nalgebra::Complex::new(1.0, 0.0));
        net.buses.push(slack);
        let _ = net.simplified(FaultState::PreFault).unwrap();
        net.invalidate_coupling();
        assert!(net.simplified_cache.borrow().is_empty());
    }
}
