//! Bus coupling through closed breakers.
//!
//! A small union-find over bus indices, since a base load-flow model's buses
//! never couple and there's nothing equivalent to reuse. Kept as its own
//! module since both simplified-network construction and the composite
//! identifier's electrical-distance computation need the coupled-group
//! lookup.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Breaker {
    pub id: i64,
    pub first_bus: String,
    pub second_bus: String,
    pub closed: bool,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Maps each bus name to the (possibly merged) bus name it belongs to after
/// coupling, and lists the members of every group of size >= 2.
#[derive(Debug, Clone, Default)]
pub struct CouplingMap {
    representative: HashMap<String, String>,
    pub groups: Vec<Vec<String>>,
}

impl CouplingMap {
    /// The merged bus name a given raw bus name maps to (itself, if it was
    /// never coupled).
    pub fn merged_name<'a>(&'a self, bus_name: &'a str) -> &'a str {
        self.representative.get(bus_name).map(|s| s.as_str()).unwrap_or(bus_name)
    }
}

/// Computes the coupling map from bus names and the closed-breaker graph:
/// two buses connected by at least one closed breaker form a coupled group.
pub fn compute_coupling(bus_names: &[String], breakers: &[Breaker]) -> CouplingMap {
    let index: HashMap<&str, usize> = bus_names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
    let mut uf = UnionFind::new(bus_names.len());
    for breaker in breakers.iter().filter(|b| b.closed) {
        if let (Some(&a), Some(&b)) = (index.get(breaker.first_bus.as_str()), index.get(breaker.second_bus.as_str())) {
            uf.union(a, b);
        }
    }
    let mut members_by_root: HashMap<usize, Vec<String>> = HashMap::new();
    for (i, name) in bus_names.iter().enumerate() {
        let root = uf.find(i);
        members_by_root.entry(root).or_default().push(name.clone());
    }
    let mut map = CouplingMap::default();
    for mut members in members_by_root.into_values() {
        if members.len() < 2 {
            continue;
        }
        members.sort();
        let merged_name = members.join("+");
        for m in &members {
            map.representative.insert(m.clone(), merged_name.clone());
        }
        map.groups.push(members);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitively_coupled_buses_form_one_group() {
        let buses = vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()];
        let breakers = vec![
            Breaker { id: 1, first_bus: "A".into(), second_bus: "B".into(), closed: true },
            Breaker { id: 2, first_bus: "B".into(), second_bus: "C".into(), closed: true },
            Breaker { id: 3, first_bus: "C".into(), second_bus: "D".into(), closed: false },
        ];
        let map = compute_coupling(&buses, &breakers);
        assert_eq!(map.merged_name("A"), map.merged_name("C"));
        assert_ne!(map.merged_name("A"), map.merged_name("D"));
        assert_eq!(map.groups.len(), 1);
        assert_eq!(map.groups[0], vec!["A", "B", "C"]);
    }

    #[test]
    fn ungrouped_bus_maps_to_itself() {
        let buses = vec!["A".to_string()];
        let map = compute_coupling(&buses, &[]);
        assert_eq!(map.merged_name("A"), "A");
    }
}
