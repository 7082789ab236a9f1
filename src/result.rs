//! Per-candidate and per-contingency result shapes.

use crate::elements::generator::GeneratorCluster;
use crate::omib::{StabilityState, SwingState};

/// The outcome of running the evaluation sequence (OMIB -> EAC ->
/// OMIBTrajectoryCalculator) on a single candidate cluster pair.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    pub critical_angle: f64,
    pub critical_time: f64,
    pub maximum_angle: f64,
    pub maximum_time: f64,
    pub critical_cluster: GeneratorCluster,
    pub non_critical_cluster: GeneratorCluster,
    pub omib_stability_state: StabilityState,
    pub omib_swing_state: SwingState,
}

/// Final per-contingency status, one of the five shapes a caller consumes.
#[derive(Debug, Clone)]
pub enum ContingencyResult {
    DegradedProtection { interval_ms: u64 },
    ImpedantFault,
    Islanding {
        production_loss_mw: f64,
        disconnected_production: Vec<String>,
        consumption_loss_mw: f64,
        disconnected_consumption: Vec<String>,
    },
    Stability {
        status: StabilityState,
        swing_state: SwingState,
        critical_cluster: Vec<String>,
        node_id: String,
        critical_clearing_time_s: Option<f64>,
    },
    IrrelevantFault,
    Error { message: String },
}
