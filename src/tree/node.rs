//! Typed execution-tree nodes: the seven node kinds, their declared
//! input/output type sets, and per-kind configuration.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::elements::generator::{DynamicGenerator, GeneratorCluster};
use crate::identifier::IdentifierConfig;
use crate::network::Network;
use crate::omib::{Omib, OmibVariant, StabilityState, SwingState};
use crate::result::ClusterResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeIoType {
    Network,
    DynamicGenerators,
    CriticalCluster,
    NonCriticalCluster,
    ClustersIterator,
    CriticalAngle,
    CriticalTime,
    MaximumAngle,
    MaximumTime,
    Omib,
    OmibStabilityState,
    OmibSwingState,
    ClusterResults,
    ClusterResultsIterator,
    OutputDir,
}

/// One typed value flowing between nodes. Cheap to clone: aggregates that
/// might be large (`Network`, candidate lists, result lists) are `Rc`-shared
/// rather than copied at every edge.
#[derive(Clone)]
pub enum IoValue {
    Network(Rc<Network>),
    DynamicGenerators(Rc<Vec<DynamicGenerator>>),
    CriticalCluster(GeneratorCluster),
    NonCriticalCluster(GeneratorCluster),
    ClustersIterator(Rc<Vec<(GeneratorCluster, GeneratorCluster)>>),
    CriticalAngle(f64),
    CriticalTime(f64),
    MaximumAngle(f64),
    MaximumTime(f64),
    Omib(Rc<RefCell<Omib>>),
    OmibStabilityState(StabilityState),
    OmibSwingState(SwingState),
    ClusterResults(Rc<ClusterResult>),
    ClusterResultsIterator(Rc<Vec<ClusterResult>>),
    OutputDir(Rc<String>),
}

pub type IoMap = std::collections::HashMap<NodeIoType, IoValue>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GeneratorTrajectoryConfig {
    pub number_during_fault_intervals: usize,
    pub number_post_fault_intervals: usize,
    pub critical_time_shift_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrajectoryCalculatorType {
    Taylor,
    Numerical,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OmibNodeConfig {
    pub variant: OmibVariant,
    pub revised: bool,
    pub s_base_mva: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct EacNodeConfig {
    pub angle_increment_rad: f64,
    pub max_integration_angle_rad: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct OmibTrajectoryConfig {
    pub calculator_type: TrajectoryCalculatorType,
    pub critical_angle_shift_rad: f64,
    pub s_base_mva: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SelectionCriterion {
    /// Pick the candidate with the smallest critical clearing time.
    MinimumCriticalTime,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SelectorConfig {
    pub criterion: SelectionCriterion,
}

/// Per-kind node configuration. `CriticalClustersEvaluator` carries its
/// evaluation sequence as a nested chain of [`TreeNode`]s, not a separate
/// tree type, since the sequence is itself walked the same way.
pub enum NodeConfig {
    CriticalClustersIdentifier(IdentifierConfig),
    CriticalClustersEvaluator { evaluation_root: Box<TreeNode> },
    CriticalClusterSelector(SelectorConfig),
    GeneratorTrajectoryCalculator(GeneratorTrajectoryConfig),
    Omib(OmibNodeConfig),
    Eac(EacNodeConfig),
    OmibTrajectoryCalculator(OmibTrajectoryConfig),
}

impl NodeConfig {
    pub fn input_types(&self) -> HashSet<NodeIoType> {
        use NodeIoType::*;
        match self {
            NodeConfig::CriticalClustersIdentifier(_) => [Network, DynamicGenerators, OutputDir].into(),
            NodeConfig::CriticalClustersEvaluator { .. } => [Network, ClustersIterator, OutputDir].into(),
            NodeConfig::CriticalClusterSelector(_) => [ClusterResultsIterator, OutputDir].into(),
            NodeConfig::GeneratorTrajectoryCalculator(_) => [Network, ClusterResults, OutputDir].into(),
            NodeConfig::Omib(_) => [Network, CriticalCluster, NonCriticalCluster, OutputDir].into(),
            NodeConfig::Eac(_) => [Omib, OutputDir].into(),
            NodeConfig::OmibTrajectoryCalculator(_) => [CriticalAngle, MaximumAngle, Omib, OutputDir].into(),
        }
    }

    pub fn output_types(&self) -> HashSet<NodeIoType> {
        use NodeIoType::*;
        match self {
            NodeConfig::CriticalClustersIdentifier(_) => [ClustersIterator].into(),
            NodeConfig::CriticalClustersEvaluator { .. } => [ClusterResultsIterator].into(),
            NodeConfig::CriticalClusterSelector(_) => [ClusterResults].into(),
            NodeConfig::GeneratorTrajectoryCalculator(_) => [CriticalCluster, NonCriticalCluster, DynamicGenerators].into(),
            NodeConfig::Omib(_) => [Omib].into(),
            NodeConfig::Eac(_) => [Omib, CriticalAngle, MaximumAngle].into(),
            NodeConfig::OmibTrajectoryCalculator(_) => [ClusterResults].into(),
        }
    }
}

/// A node's run-time lifecycle state (`new` is implicit: a node with no
/// recorded status has never run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Running,
    Ok,
    Failed,
    Cancelled,
}

pub struct TreeNode {
    pub id: String,
    pub name: Option<String>,
    pub config: NodeConfig,
    pub children: Vec<TreeNode>,
    cancel_reason: RefCell<Option<String>>,
    status: Cell<Option<NodeStatus>>,
}

impl TreeNode {
    pub fn new(id: impl Into<String>, name: Option<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            name,
            config,
            children: Vec::new(),
            cancel_reason: RefCell::new(None),
            status: Cell::new(None),
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    pub fn complete_id(&self) -> String {
        match &self.name {
            Some(n) => format!("{}_{}", self.id, n),
            None => self.id.clone(),
        }
    }

    pub fn input_types(&self) -> HashSet<NodeIoType> {
        self.config.input_types()
    }

    pub fn output_types(&self) -> HashSet<NodeIoType> {
        self.config.output_types()
    }

    /// Only terminal-result-producing nodes may end a branch without children.
    pub fn can_be_leaf(&self) -> bool {
        let out = self.output_types();
        out.contains(&NodeIoType::ClusterResults) || out.contains(&NodeIoType::ClusterResultsIterator)
    }

    /// Marks this node for cooperative cancellation. Checked at the node's
    /// next `run()` entry; the node itself never observes intermediate
    /// state, only whether it was cancelled before it got a chance to run.
    pub fn cancel(&self, reason: impl Into<String>) {
        *self.cancel_reason.borrow_mut() = Some(reason.into());
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.borrow().clone()
    }

    pub fn status(&self) -> Option<NodeStatus> {
        self.status.get()
    }

    pub(crate) fn mark(&self, status: NodeStatus) {
        self.status.set(Some(status));
    }

    /// Marks this node and its whole subtree (including a nested evaluation
    /// sub-tree) `Cancelled`, the way a failed or cancelled parent propagates
    /// the skip down to its children.
    pub(crate) fn propagate_cancellation(&self) {
        self.mark(NodeStatus::Cancelled);
        for child in &self.children {
            child.propagate_cancellation();
        }
        if let NodeConfig::CriticalClustersEvaluator { evaluation_root } = &self.config {
            evaluation_root.propagate_cancellation();
        }
    }
}
