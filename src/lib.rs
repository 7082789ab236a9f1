//! Extended Equal Area Criterion transient-stability engine: reduces a
//! faulted multi-machine network to an equivalent one-machine-infinite-bus
//! system, runs the Equal Area Criterion search, and refines the result with
//! Taylor-series or numerical trajectory calculators, all driven by a typed
//! execution tree.

pub mod builder;
pub mod eac;
pub mod elements;
pub mod error;
pub mod identifier;
pub mod matrix;
pub mod network;
pub mod omib;
pub mod result;
pub mod tools;
pub mod trajectory;
pub mod tree;
pub mod units;

pub mod prelude {
    pub use crate::builder::{EventSequenceBuilder, ExecutionTreeBuilder, NetworkBuilder};
    pub use crate::elements::{
        Branch, BranchElement, Bus, BusType, DynamicGenerator, Generator, GeneratorCluster,
        GeneratorSource, GeneratorType, Line, Load, NetworkState, NonSynchronousInjector, Transformer,
    };
    pub use crate::error::{DomainError, DomainResult};
    pub use crate::identifier::{IdentifierConfig, IdentifierType, TsoCustomization};
    pub use crate::network::{Event, EventKind, FaultState, Network};
    pub use crate::omib::{Omib, OmibVariant, StabilityState, SwingState};
    pub use crate::result::{ClusterResult, ContingencyResult};
    pub use crate::tree::{ExecutionTree, TreeNode};
}
