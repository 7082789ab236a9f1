//! Execution-tree scheduler: validates and walks the typed node DAG that
//! drives one contingency (identify candidates -> evaluate each -> select ->
//! optionally refine with a DOMIB generator-trajectory pass).

pub mod node;

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::elements::generator::DynamicGenerator;
use crate::error::{
    DomainError, DomainErrorCollector, DomainResult, InputValidationError, NodeLifecycleError,
};
use crate::identifier;
use crate::network::{FaultState, Network};
use crate::omib::Omib;
use crate::result::ClusterResult;
use crate::{eac, trajectory};

pub use node::{
    EacNodeConfig, GeneratorTrajectoryConfig, IoMap, IoValue, NodeConfig, NodeIoType, NodeStatus,
    OmibNodeConfig, OmibTrajectoryConfig, SelectionCriterion, SelectorConfig, TrajectoryCalculatorType,
    TreeNode,
};

pub struct ExecutionTree {
    pub root: TreeNode,
}

impl ExecutionTree {
    pub fn new(root: TreeNode) -> DomainResult<Self> {
        let mut ids = HashSet::new();
        let mut collector = DomainErrorCollector::new();
        validate_node(&root, None, &mut ids, &mut collector);
        collector.into_result()?;
        Ok(Self { root })
    }

    /// Walks the tree for one contingency, returning every `ClusterResults`
    /// produced along the executed chain (normally exactly one, from the
    /// final `CriticalClusterSelector`, or the evaluator's full list if the
    /// tree ends there).
    pub fn run(
        &self,
        network: Rc<Network>,
        generators: Vec<DynamicGenerator>,
        output_dir: Option<String>,
    ) -> DomainResult<Vec<ClusterResult>> {
        let ctx = Context { network, generators: RefCell::new(generators), output_dir: output_dir.map(Rc::new) };
        let io = run_chain(&self.root, &ctx, IoMap::new())?;
        if let Some(results) = match io.get(&NodeIoType::ClusterResults) {
            Some(IoValue::ClusterResults(r)) => Some(vec![(**r).clone()]),
            _ => match io.get(&NodeIoType::ClusterResultsIterator) {
                Some(IoValue::ClusterResultsIterator(r)) => Some((**r).clone()),
                _ => None,
            },
        } {
            return Ok(results);
        }
        // No terminal result was produced. If the whole chain was skipped by
        // cancellation, reading "the" result is a lifecycle error, not an
        // empty-but-valid outcome.
        if self.root.status() == Some(node::NodeStatus::Cancelled) {
            return Err(DomainError::NodeLifecycle(NodeLifecycleError::OutputsReadBeforeRun {
                id: self.root.complete_id(),
            }));
        }
        Ok(Vec::new())
    }
}

fn validate_node(
    node: &TreeNode,
    parent: Option<(&str, &HashSet<NodeIoType>)>,
    ids: &mut HashSet<String>,
    collector: &mut DomainErrorCollector,
) {
    if !ids.insert(node.id.clone()) {
        collector.push(InputValidationError::DuplicateTreeId { id: node.id.clone() });
    }

    if let Some((parent_id, parent_outputs)) = parent {
        let allowed: HashSet<NodeIoType> =
            parent_outputs.iter().copied().chain([NodeIoType::Network, NodeIoType::OutputDir]).collect();
        let unmapped: Vec<String> =
            node.input_types().difference(&allowed).map(|t| format!("{t:?}")).collect();
        if !unmapped.is_empty() {
            collector.push(NodeLifecycleError::IncompatibleChildInputs {
                parent: parent_id.to_string(),
                child: node.complete_id(),
                inputs: unmapped,
            });
        }
    }

    if node.children.is_empty() && !node.can_be_leaf() {
        collector.push(InputValidationError::NodeCannotBeLeaf { id: node.id.clone() });
    }

    let own_outputs = node.output_types();
    for child in &node.children {
        validate_node(child, Some((&node.id, &own_outputs)), ids, collector);
    }

    if let NodeConfig::CriticalClustersEvaluator { evaluation_root } = &node.config {
        validate_node(evaluation_root, None, ids, collector);
    }
}

struct Context {
    network: Rc<Network>,
    generators: RefCell<Vec<DynamicGenerator>>,
    output_dir: Option<Rc<String>>,
}

fn run_chain(start: &TreeNode, ctx: &Context, seed: IoMap) -> DomainResult<IoMap> {
    let mut io = seed;
    if let Some(dir) = &ctx.output_dir {
        io.entry(NodeIoType::OutputDir).or_insert_with(|| IoValue::OutputDir(Rc::clone(dir)));
    }
    let mut current = Some(start);
    while let Some(node) = current {
        if let Some(reason) = node.cancel_reason() {
            // The node's cancel() marker is checked at this, its next
            // run() entry: raise Cancelled, catch it immediately, and
            // convert it into a skipped status that propagates to the
            // whole remaining subtree. No timeout is involved.
            let cancelled = NodeLifecycleError::Cancelled { id: node.complete_id(), reason };
            tracing::info!(id = %node.complete_id(), error = %cancelled, "node cancelled, skipping its subtree");
            node.propagate_cancellation();
            break;
        }
        node.mark(node::NodeStatus::Running);
        let outputs = match execute_single(node, ctx, &io) {
            Ok(outputs) => outputs,
            Err(e) => {
                node.mark(node::NodeStatus::Failed);
                return Err(e);
            }
        };
        node.mark(node::NodeStatus::Ok);
        io.extend(outputs);
        current = node.children.first();
    }
    Ok(io)
}

fn execute_single(node: &TreeNode, ctx: &Context, io: &IoMap) -> DomainResult<IoMap> {
    match &node.config {
        NodeConfig::CriticalClustersIdentifier(cfg) => run_identifier(cfg, ctx),
        NodeConfig::CriticalClustersEvaluator { evaluation_root } => run_evaluator(evaluation_root, ctx, io),
        NodeConfig::CriticalClusterSelector(cfg) => run_selector(cfg, io),
        NodeConfig::GeneratorTrajectoryCalculator(cfg) => run_generator_trajectory(cfg, ctx, io),
        NodeConfig::Omib(cfg) => run_omib(cfg, ctx, io),
        NodeConfig::Eac(cfg) => run_eac(cfg, ctx, io),
        NodeConfig::OmibTrajectoryCalculator(cfg) => run_omib_trajectory(cfg, ctx, io),
    }
}

fn missing(node_input: NodeIoType) -> DomainError {
    DomainError::NodeLifecycle(NodeLifecycleError::MissingInput {
        id: "execution-tree".to_string(),
        input: format!("{node_input:?}"),
    })
}

/// Raised when a key is present in the io map but holds a different
/// `IoValue` variant than the one `expected` names — distinct from
/// `missing`, which covers the key being absent altogether. Each
/// `NodeIoType` is only ever written with its own matching `IoValue`
/// variant, so this is a defensive check against a future wiring bug
/// rather than a condition reachable through normal tree validation.
fn type_mismatch(expected: NodeIoType, found: &IoValue) -> DomainError {
    DomainError::NodeLifecycle(NodeLifecycleError::InputTypeMismatch {
        id: "execution-tree".to_string(),
        expected: format!("{expected:?}"),
        found: io_value_kind(found).to_string(),
    })
}

fn io_value_kind(value: &IoValue) -> &'static str {
    match value {
        IoValue::Network(_) => "Network",
        IoValue::DynamicGenerators(_) => "DynamicGenerators",
        IoValue::CriticalCluster(_) => "CriticalCluster",
        IoValue::NonCriticalCluster(_) => "NonCriticalCluster",
        IoValue::ClustersIterator(_) => "ClustersIterator",
        IoValue::CriticalAngle(_) => "CriticalAngle",
        IoValue::CriticalTime(_) => "CriticalTime",
        IoValue::MaximumAngle(_) => "MaximumAngle",
        IoValue::MaximumTime(_) => "MaximumTime",
        IoValue::Omib(_) => "Omib",
        IoValue::OmibStabilityState(_) => "OmibStabilityState",
        IoValue::OmibSwingState(_) => "OmibSwingState",
        IoValue::ClusterResults(_) => "ClusterResults",
        IoValue::ClusterResultsIterator(_) => "ClusterResultsIterator",
        IoValue::OutputDir(_) => "OutputDir",
    }
}

fn run_identifier(cfg: &identifier::IdentifierConfig, ctx: &Context) -> DomainResult<IoMap> {
    let generators = ctx.generators.borrow();
    let candidates = identifier::identify(cfg, &generators, &ctx.network, ctx.network.base_power_mva)?;
    let pairs: Vec<_> = candidates.iter().cloned().collect();
    let mut out = IoMap::new();
    out.insert(NodeIoType::ClustersIterator, IoValue::ClustersIterator(Rc::new(pairs)));
    Ok(out)
}

fn run_evaluator(evaluation_root: &TreeNode, ctx: &Context, io: &IoMap) -> DomainResult<IoMap> {
    let pairs = match io.get(&NodeIoType::ClustersIterator) {
        Some(IoValue::ClustersIterator(p)) => Rc::clone(p),
        Some(other) => return Err(type_mismatch(NodeIoType::ClustersIterator, other)),
        None => return Err(missing(NodeIoType::ClustersIterator)),
    };

    let mut results = Vec::new();
    let mut failed_clusters = Vec::new();
    for (critical, non_critical) in pairs.iter() {
        let mut seed = IoMap::new();
        seed.insert(NodeIoType::CriticalCluster, IoValue::CriticalCluster(critical.clone()));
        seed.insert(NodeIoType::NonCriticalCluster, IoValue::NonCriticalCluster(non_critical.clone()));
        match run_chain(evaluation_root, ctx, seed) {
            Ok(candidate_io) => {
                if let Some(IoValue::ClusterResults(r)) = candidate_io.get(&NodeIoType::ClusterResults) {
                    results.push((**r).clone());
                }
            }
            Err(e @ (DomainError::Numerical(_) | DomainError::Topology(_))) => {
                failed_clusters.push(e);
            }
            Err(e) => return Err(e),
        }
    }
    if results.is_empty() && !pairs.is_empty() {
        return Err(failed_clusters.into_iter().next().expect("at least one candidate failed"));
    }

    let mut out = IoMap::new();
    out.insert(NodeIoType::ClusterResultsIterator, IoValue::ClusterResultsIterator(Rc::new(results)));
    Ok(out)
}

fn run_selector(cfg: &SelectorConfig, io: &IoMap) -> DomainResult<IoMap> {
    let results = match io.get(&NodeIoType::ClusterResultsIterator) {
        Some(IoValue::ClusterResultsIterator(r)) => r,
        Some(other) => return Err(type_mismatch(NodeIoType::ClusterResultsIterator, other)),
        None => return Err(missing(NodeIoType::ClusterResultsIterator)),
    };
    let chosen = match cfg.criterion {
        SelectionCriterion::MinimumCriticalTime => results
            .iter()
            .min_by(|a, b| a.critical_time.partial_cmp(&b.critical_time).unwrap())
            .cloned(),
    };
    let chosen = chosen.ok_or_else(|| missing(NodeIoType::ClusterResultsIterator))?;
    let mut out = IoMap::new();
    out.insert(NodeIoType::ClusterResults, IoValue::ClusterResults(Rc::new(chosen)));
    Ok(out)
}

/// Re-advances every generator's trajectory from the selected candidate's
/// critical time through its maximum time using the multi-machine Taylor
/// calculator, for a subsequent DOMIB refinement pass.
fn run_generator_trajectory(cfg: &GeneratorTrajectoryConfig, ctx: &Context, io: &IoMap) -> DomainResult<IoMap> {
    let selected = match io.get(&NodeIoType::ClusterResults) {
        Some(IoValue::ClusterResults(r)) => Rc::clone(r),
        Some(other) => return Err(type_mismatch(NodeIoType::ClusterResults, other)),
        None => return Err(missing(NodeIoType::ClusterResults)),
    };

    let critical_time = selected.critical_time + cfg.critical_time_shift_ms as f64 / 1000.0;
    {
        let mut generators = ctx.generators.borrow_mut();
        let during_step = critical_time / cfg.number_during_fault_intervals.max(1) as f64;
        let mut t = 0.0;
        for _ in 0..cfg.number_during_fault_intervals {
            trajectory::advance_generators(
                &mut generators,
                &ctx.network,
                FaultState::DuringFault,
                t,
                during_step,
                crate::elements::generator::NetworkState::DuringFault,
                ctx.network.base_power_mva,
            )?;
            t += during_step;
        }
        let post_span = (selected.maximum_time - critical_time).max(0.0);
        let post_step = post_span / cfg.number_post_fault_intervals.max(1) as f64;
        for _ in 0..cfg.number_post_fault_intervals {
            trajectory::advance_generators(
                &mut generators,
                &ctx.network,
                FaultState::PostFault,
                t,
                post_step,
                crate::elements::generator::NetworkState::PostFault,
                ctx.network.base_power_mva,
            )?;
            t += post_step;
        }
    }

    let mut out = IoMap::new();
    out.insert(NodeIoType::CriticalCluster, IoValue::CriticalCluster(selected.critical_cluster.clone()));
    out.insert(NodeIoType::NonCriticalCluster, IoValue::NonCriticalCluster(selected.non_critical_cluster.clone()));
    out.insert(NodeIoType::DynamicGenerators, IoValue::DynamicGenerators(Rc::new(ctx.generators.borrow().clone())));
    Ok(out)
}

fn run_omib(cfg: &OmibNodeConfig, ctx: &Context, io: &IoMap) -> DomainResult<IoMap> {
    let critical = match io.get(&NodeIoType::CriticalCluster) {
        Some(IoValue::CriticalCluster(c)) => c.clone(),
        Some(other) => return Err(type_mismatch(NodeIoType::CriticalCluster, other)),
        None => return Err(missing(NodeIoType::CriticalCluster)),
    };
    let non_critical = match io.get(&NodeIoType::NonCriticalCluster) {
        Some(IoValue::NonCriticalCluster(c)) => c.clone(),
        Some(other) => return Err(type_mismatch(NodeIoType::NonCriticalCluster, other)),
        None => return Err(missing(NodeIoType::NonCriticalCluster)),
    };

    let mut generators = ctx.generators.borrow_mut();
    let omib = Omib::new(cfg.variant, cfg.revised, critical, non_critical, cfg.s_base_mva, &mut generators, &ctx.network)?;
    let mut out = IoMap::new();
    out.insert(NodeIoType::Omib, IoValue::Omib(Rc::new(RefCell::new(omib))));
    Ok(out)
}

fn run_eac(cfg: &EacNodeConfig, ctx: &Context, io: &IoMap) -> DomainResult<IoMap> {
    let omib_cell = match io.get(&NodeIoType::Omib) {
        Some(IoValue::Omib(o)) => Rc::clone(o),
        Some(other) => return Err(type_mismatch(NodeIoType::Omib, other)),
        None => return Err(missing(NodeIoType::Omib)),
    };
    let generators = ctx.generators.borrow();
    let eac_config = eac::EacConfig {
        angle_increment_rad: cfg.angle_increment_rad,
        integration_ceiling_rad: cfg.max_integration_angle_rad,
        ..eac::EacConfig::default()
    };
    let result = {
        let mut omib = omib_cell.borrow_mut();
        eac::run(&mut omib, &ctx.network, &generators, &eac_config)?
    };

    let mut out = IoMap::new();
    out.insert(NodeIoType::Omib, IoValue::Omib(omib_cell));
    out.insert(NodeIoType::CriticalAngle, IoValue::CriticalAngle(result.critical_angle));
    out.insert(NodeIoType::MaximumAngle, IoValue::MaximumAngle(result.maximum_angle));
    Ok(out)
}

fn run_omib_trajectory(cfg: &OmibTrajectoryConfig, ctx: &Context, io: &IoMap) -> DomainResult<IoMap> {
    let omib_cell = match io.get(&NodeIoType::Omib) {
        Some(IoValue::Omib(o)) => Rc::clone(o),
        Some(other) => return Err(type_mismatch(NodeIoType::Omib, other)),
        None => return Err(missing(NodeIoType::Omib)),
    };
    let critical_angle = match io.get(&NodeIoType::CriticalAngle) {
        Some(IoValue::CriticalAngle(a)) => *a + cfg.critical_angle_shift_rad,
        Some(other) => return Err(type_mismatch(NodeIoType::CriticalAngle, other)),
        None => return Err(missing(NodeIoType::CriticalAngle)),
    };
    let maximum_angle = match io.get(&NodeIoType::MaximumAngle) {
        Some(IoValue::MaximumAngle(a)) => *a,
        Some(other) => return Err(type_mismatch(NodeIoType::MaximumAngle, other)),
        None => return Err(missing(NodeIoType::MaximumAngle)),
    };

    let generators = ctx.generators.borrow();
    let omib = omib_cell.borrow();

    let critical_time = calculate_time(
        cfg,
        &omib,
        &ctx.network,
        &generators,
        0.0,
        omib.initial_rotor_angle,
        0.0,
        FaultState::DuringFault,
        critical_angle,
    )?;
    let omega_at_clearing = eac::speed_at(&omib, &ctx.network, &generators, FaultState::DuringFault, critical_angle)?;
    let maximum_time = calculate_time(
        cfg,
        &omib,
        &ctx.network,
        &generators,
        critical_time,
        critical_angle,
        omega_at_clearing,
        FaultState::PostFault,
        maximum_angle,
    )?;

    let mut stability_state = omib.stability_state;
    let critical_cluster = omib.critical.clone();
    let non_critical_cluster = omib.non_critical.clone();
    let swing_state = omib.swing_state;
    drop(omib);
    drop(generators);

    if critical_time > FORCE_STABLE_CRITICAL_TIME_CEILING_S {
        stability_state = crate::omib::StabilityState::AlwaysStable;
        omib_cell.borrow_mut().stability_state = stability_state;
    }

    let result = ClusterResult {
        critical_angle,
        critical_time,
        maximum_angle,
        maximum_time,
        critical_cluster,
        non_critical_cluster,
        omib_stability_state: stability_state,
        omib_swing_state: swing_state,
    };

    let mut out = IoMap::new();
    out.insert(NodeIoType::ClusterResults, IoValue::ClusterResults(Rc::new(result)));
    Ok(out)
}

/// A candidate whose clearing time exceeds this ceiling is forced to
/// `AlwaysStable` after its trajectory recomputation has run to completion,
/// rather than short-circuiting the recomputation itself (which might
/// legitimately resolve to `AlwaysStable` on its own).
const FORCE_STABLE_CRITICAL_TIME_CEILING_S: f64 = 1.0;

#[allow(clippy::too_many_arguments)]
fn calculate_time(
    cfg: &OmibTrajectoryConfig,
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    t_from: f64,
    delta_from: f64,
    omega_from: f64,
    state_from: FaultState,
    delta_to: f64,
) -> DomainResult<f64> {
    match cfg.calculator_type {
        TrajectoryCalculatorType::Taylor => {
            trajectory::time_at_taylor(omib, network, generators, t_from, delta_from, omega_from, state_from, delta_to)
        }
        TrajectoryCalculatorType::Numerical => {
            trajectory::time_at_numerical(omib, network, generators, t_from, delta_from, omega_from, state_from, delta_to)
        }
    }
}
