//! Fluent builders for assembling a [`Network`], its event sequence, and an
//! [`ExecutionTree`] without a concrete file-format parser.
//!
//! Loading Eurostag `.ech` topology and a JSON tree document is out of
//! scope; this module is the in-scope equivalent: programmatic
//! construction of the same abstract data shapes, plus a `serde` mirror
//! of the tree document ([`TreeDocument`]) that [`ExecutionTree::from_document`]
//! turns into a validated tree.

use crate::elements::generator::NonSynchronousInjector;
use crate::elements::{Branch, BranchElement, Bus, Line, Transformer};
use crate::error::{DomainError, DomainResult, InputValidationError};
use crate::identifier::IdentifierConfig;
use crate::network::coupling::Breaker;
use crate::network::{Event, EventKind, Network};
use crate::tree::node::{
    EacNodeConfig, GeneratorTrajectoryConfig, NodeConfig, OmibNodeConfig, OmibTrajectoryConfig,
    SelectorConfig, TreeNode,
};
use crate::tree::ExecutionTree;

/// Assembles a [`Network`] bus by bus, the way a loader would after parsing
/// a topology file. No validation runs here; [`Network::simplified`] is
/// where missing slack buses, singular admittance matrices and the like
/// surface.
#[derive(Debug)]
pub struct NetworkBuilder {
    network: Network,
}

impl NetworkBuilder {
    pub fn new(base_power_mva: f64, frequency_hz: f64) -> Self {
        Self { network: Network::new(base_power_mva, frequency_hz) }
    }

    pub fn protection_delay_ms(mut self, ms: u64) -> Self {
        self.network.protection_delay_ms = ms;
        self
    }

    pub fn add_bus(mut self, bus: Bus) -> Self {
        self.network.buses.push(bus);
        self
    }

    pub fn add_branch(mut self, branch: Branch) -> Self {
        self.network.branches.push(branch);
        self
    }

    /// Convenience for the common case of a single-element branch: wraps
    /// `line` in a new [`Branch`] at parallel id 1.
    pub fn add_line(mut self, first_bus: impl Into<String>, second_bus: impl Into<String>, line: Line) -> Self {
        let mut branch = Branch::new(first_bus, second_bus);
        branch.insert(1, BranchElement::Line(line));
        self.network.branches.push(branch);
        self
    }

    pub fn add_transformer(
        mut self,
        first_bus: impl Into<String>,
        second_bus: impl Into<String>,
        transformer: Transformer,
    ) -> Self {
        let mut branch = Branch::new(first_bus, second_bus);
        branch.insert(1, BranchElement::Transformer(transformer));
        self.network.branches.push(branch);
        self
    }

    pub fn add_breaker(mut self, breaker: Breaker) -> Self {
        self.network.breakers.push(breaker);
        self
    }

    pub fn add_non_synchronous_injector(mut self, injector: NonSynchronousInjector) -> Self {
        self.network.non_synchronous_injectors.push(injector);
        self
    }

    pub fn build(self) -> Network {
        self.network
    }
}

/// Assembles the failure and mitigation event sequences a contingency run
/// applies to a [`Network`] copy, the way a loader would after parsing a
/// contingency definition.
#[derive(Debug, Default)]
pub struct EventSequenceBuilder {
    failure_events: Vec<Event>,
    mitigation_events: Vec<Event>,
}

impl EventSequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_failure(mut self, time_ms: u64, kind: EventKind) -> DomainResult<Self> {
        self.failure_events.push(Event::new(time_ms, kind)?);
        Ok(self)
    }

    pub fn add_mitigation(mut self, time_ms: u64, kind: EventKind) -> DomainResult<Self> {
        self.mitigation_events.push(Event::new(time_ms, kind)?);
        Ok(self)
    }

    pub fn build(self) -> (Vec<Event>, Vec<Event>) {
        (self.failure_events, self.mitigation_events)
    }
}

/// Assembles an [`ExecutionTree`] from a root [`TreeNode`] built either by
/// hand or via [`ExecutionTree::from_document`].
#[derive(Debug, Default)]
pub struct ExecutionTreeBuilder {
    root: Option<TreeNode>,
}

impl ExecutionTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, node: TreeNode) -> Self {
        self.root = Some(node);
        self
    }

    pub fn build(self) -> DomainResult<ExecutionTree> {
        let root = self.root.ok_or(DomainError::InputValidation(InputValidationError::NoTreeRoot))?;
        ExecutionTree::new(root)
    }
}

/// A `serde`-deserializable mirror of one node in an execution-tree JSON
/// document: `type` picks the [`NodeConfig`] variant, `config` is that
/// variant's per-kind configuration still as a generic JSON value.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TreeDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub children: Vec<TreeDocument>,
    #[serde(default)]
    pub evaluation_root: Option<Box<TreeDocument>>,
}

impl ExecutionTree {
    /// Builds and validates an [`ExecutionTree`] from its JSON document
    /// shape: recursively turns each [`TreeDocument`] into a [`TreeNode`] by
    /// matching `node_type` to a [`NodeConfig`] variant and deserializing
    /// `config` into that variant's struct.
    pub fn from_document(doc: &TreeDocument) -> DomainResult<Self> {
        let root = build_node(doc)?;
        Self::new(root)
    }
}

fn build_node(doc: &TreeDocument) -> DomainResult<TreeNode> {
    let config = match doc.node_type.as_str() {
        "CriticalClustersIdentifier" => NodeConfig::CriticalClustersIdentifier(parse_config::<IdentifierConfig>(doc)?),
        "CriticalClusterSelector" => NodeConfig::CriticalClusterSelector(parse_config::<SelectorConfig>(doc)?),
        "GeneratorTrajectoryCalculator" => {
            NodeConfig::GeneratorTrajectoryCalculator(parse_config::<GeneratorTrajectoryConfig>(doc)?)
        }
        "Omib" => NodeConfig::Omib(parse_config::<OmibNodeConfig>(doc)?),
        "Eac" => NodeConfig::Eac(parse_config::<EacNodeConfig>(doc)?),
        "OmibTrajectoryCalculator" => {
            NodeConfig::OmibTrajectoryCalculator(parse_config::<OmibTrajectoryConfig>(doc)?)
        }
        "CriticalClustersEvaluator" => {
            let sub = doc
                .evaluation_root
                .as_deref()
                .ok_or_else(|| DomainError::InputValidation(InputValidationError::MissingEvaluationRoot { id: doc.id.clone() }))?;
            NodeConfig::CriticalClustersEvaluator { evaluation_root: Box::new(build_node(sub)?) }
        }
        other => {
            return Err(DomainError::InputValidation(InputValidationError::UnknownNodeType {
                id: doc.id.clone(),
                node_type: other.to_string(),
            }))
        }
    };

    let children =
        doc.children.iter().map(build_node).collect::<DomainResult<Vec<_>>>()?;
    Ok(TreeNode::new(doc.id.clone(), doc.name.clone(), config).with_children(children))
}

fn parse_config<T: serde::de::DeserializeOwned>(doc: &TreeDocument) -> DomainResult<T> {
    serde_json::from_value(doc.config.clone()).map_err(|e| {
        DomainError::InputValidation(InputValidationError::InvalidNodeConfig {
            id: doc.id.clone(),
            message: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::bus::BusType;

    #[test]
    fn network_builder_assembles_buses_and_lines() {
        let network = NetworkBuilder::new(100.0, 50.0)
            .add_bus(Bus::new("B1", 400.0, BusType::Slack))
            .add_bus(Bus::new("B2", 400.0, BusType::PQ))
            .add_line("B1", "B2", Line::new("L1", 0.01, 0.1, 0.0, 0.0))
            .build();
        assert_eq!(network.buses.len(), 2);
        assert_eq!(network.branches.len(), 1);
    }

    #[test]
    fn event_sequence_builder_rejects_invalid_fault_position() {
        let key = crate::network::events::BranchKey::new("B1", "B2");
        let result = EventSequenceBuilder::new().add_failure(
            0,
            EventKind::LineShortCircuit { branch: key, parallel_id: 1, position: 1.0 },
        );
        assert!(result.is_err());
    }

    #[test]
    fn from_document_rejects_unknown_node_type() {
        let doc = TreeDocument {
            id: "n1".to_string(),
            name: None,
            node_type: "NotARealNode".to_string(),
            config: serde_json::json!({}),
            children: Vec::new(),
            evaluation_root: None,
        };
        let result = ExecutionTree::from_document(&doc);
        assert!(matches!(
            result,
            Err(DomainError::InputValidation(InputValidationError::UnknownNodeType { .. }))
        ));
    }

    #[test]
    fn from_document_builds_a_selector_leaf() {
        let doc = TreeDocument {
            id: "sel".to_string(),
            name: None,
            node_type: "CriticalClusterSelector".to_string(),
            config: serde_json::json!({ "criterion": "MinimumCriticalTime" }),
            children: Vec::new(),
            evaluation_root: None,
        };
        let tree = ExecutionTree::from_document(&doc).unwrap();
        assert_eq!(tree.root.id, "sel");
    }
}
