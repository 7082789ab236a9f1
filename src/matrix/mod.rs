//! Admittance assembly, Kron reduction and impedance-matrix inversion.

pub mod admittance;
pub mod impedance;
pub mod kron;

pub use admittance::AdmittanceMatrix;
pub use impedance::ImpedanceMatrix;
pub use kron::{reduce as kron_reduce, KronReduction};
