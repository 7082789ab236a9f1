//! Electrical primitives: buses, branches, lines, transformers, loads,
//! capacitor banks and generators.

pub mod branch;
pub mod bus;
pub mod generator;
pub mod line;
pub mod load;
pub mod transformer;

pub use branch::{Branch, BranchElement};
pub use bus::{Bus, BusType};
pub use generator::{
    DynamicGenerator, Generator, GeneratorCluster, GeneratorSource, GeneratorType, NetworkState,
    NonSynchronousInjector,
};
pub use line::Line;
pub use load::{CapacitorBank, FictiveLoad, Load};
pub use transformer::Transformer;
