//! Domain error taxonomy for the EEAC engine.
//!
//! A single top-level [`DomainError`] enum whose variants group by family
//! (input validation, topology, numerical, event handling, node lifecycle).
//! Many power-flow crates propagate `Result<_, &'static str>` at their
//! leaves; this crate needs a structured taxonomy instead, so it follows the
//! `thiserror` convention used elsewhere in this same power-systems domain
//! (`gat-algo`).

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("input validation: {0}")]
    InputValidation(#[from] InputValidationError),

    #[error("topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("numerical: {0}")]
    Numerical(#[from] NumericalError),

    #[error("event: {0}")]
    Event(#[from] EventError),

    #[error("node lifecycle: {0}")]
    NodeLifecycle(#[from] NodeLifecycleError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputValidationError {
    #[error("unknown element named {name:?}")]
    UnknownElement { name: String },

    #[error("no element at parallel id {parallel_id} on branch {branch:?}")]
    UnknownParallelId { branch: (String, String), parallel_id: i64 },

    #[error("invalid threshold {value}: must lie in [0, 1]")]
    InvalidThreshold { value: f64 },

    #[error("network has no generators")]
    NoGenerator,

    #[error("unknown generators in constrained identifier: {names:?}")]
    UnknownConstrainedGenerators { names: Vec<String> },

    #[error("duplicate execution-tree node id {id}")]
    DuplicateTreeId { id: String },

    #[error("composite identifier requires exactly one failure event, found {count}")]
    CompositeRequiresSingleFailure { count: usize },

    #[error("node {id} has no children and cannot be a leaf")]
    NodeCannotBeLeaf { id: String },

    #[error("execution-tree builder has no root node")]
    NoTreeRoot,

    #[error("node {id} of type {node_type:?} is not a known execution-tree node kind")]
    UnknownNodeType { id: String, node_type: String },

    #[error("node {id} config failed to deserialize: {message}")]
    InvalidNodeConfig { id: String, message: String },

    #[error("node {id} is a CriticalClustersEvaluator with no evaluation_root")]
    MissingEvaluationRoot { id: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TopologyError {
    #[error("no slack bus found in network")]
    NoSlackBus,

    #[error("multiple slack buses found in disjoint coupled groups")]
    MultipleSlackBus,

    #[error("coupled buses {first} and {second} have inconsistent voltages")]
    InconsistentCoupledVoltage { first: String, second: String },

    #[error("transformer {name} has zero impedance")]
    ZeroImpedanceTransformer { name: String },

    #[error("generator {name} has zero transient reactance")]
    ZeroReactanceGenerator { name: String },

    #[error("bus {name} has no voltage defined")]
    UndefinedVoltage { name: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NumericalError {
    #[error("OMIB has zero total inertia")]
    ZeroTotalInertia,

    #[error("arcsin argument {value} out of [-1, 1]")]
    ArcsinOutOfRange { value: f64 },

    #[error("no positive real root found for the degree-4 rotor-angle polynomial")]
    PolynomialRootNotFound,

    #[error("Kron reduction failed: Y_nn is singular")]
    SingularYnn,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    #[error("impedant fault refused: R={r}, X={x}")]
    ImpedantFaultRefused { r: f64, x: f64 },

    #[error("line short circuit position {position} must lie in (0, 1)")]
    InvalidFaultPosition { position: f64 },

    #[error("cannot close an open branch element: not implemented")]
    ClosingNotImplemented,

    #[error("event targets a disconnected element")]
    DisconnectedElement,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeLifecycleError {
    #[error("node {id} is missing required input {input}")]
    MissingInput { id: String, input: String },

    #[error("node {id} received input of the wrong type: expected {expected}, found {found}")]
    InputTypeMismatch { id: String, expected: String, found: String },

    #[error("node {id} outputs were read before the node ran")]
    OutputsReadBeforeRun { id: String },

    #[error("child {child} inputs {inputs:?} are not a subset of parent {parent} outputs")]
    IncompatibleChildInputs {
        parent: String,
        child: String,
        inputs: Vec<String>,
    },

    #[error("node {id} was cancelled: {reason}")]
    Cancelled { id: String, reason: String },
}

/// Accumulates multiple [`DomainError`]s during a bulk operation (tree
/// validation, network assembly) and reports them all at once instead of
/// failing fast on the first one.
#[derive(Debug, Default, Clone)]
pub struct DomainErrorCollector {
    errors: Vec<DomainError>,
}

impl DomainErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<DomainError>) {
        self.errors.push(error.into());
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = DomainError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[DomainError] {
        &self.errors
    }

    /// Consumes the collector, returning `Ok(())` if no error was
    /// accumulated, or the first error otherwise (callers that need the
    /// full list should inspect [`Self::errors`] before calling this).
    pub fn into_result(self) -> DomainResult<()> {
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
