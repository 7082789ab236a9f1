//! End-to-end test of the execution tree: identify candidates, evaluate each
//! through OMIB/EAC/trajectory, select the minimum-critical-time candidate.

use eeac::builder::NetworkBuilder;
use eeac::elements::generator::{Generator, GeneratorType};
use eeac::elements::{Bus, BusType, DynamicGenerator, Line};
use eeac::identifier::{IdentifierConfig, IdentifierType, TsoCustomization};
use eeac::network::Network;
use eeac::omib::OmibVariant;
use eeac::tree::{
    EacNodeConfig, ExecutionTree, NodeConfig, OmibNodeConfig, OmibTrajectoryConfig,
    SelectionCriterion, SelectorConfig, TrajectoryCalculatorType, TreeNode,
};
use nalgebra::Complex;
use std::rc::Rc;

fn build_network() -> (Network, Vec<DynamicGenerator>) {
    let mut slack = Bus::new("SLACK", 110.0, BusType::Slack);
    slack.set_voltage(Complex::new(1.0, 0.0));

    let mut pv1 = Bus::new("PV1", 110.0, BusType::PV);
    pv1.set_voltage(Complex::new(1.0, 0.0));
    let mut gen1 = Generator::new("G1", "PV1", GeneratorType::PV, 0.3, 5.0);
    gen1.p = 0.5;
    gen1.recompute_internal_voltage(Complex::new(1.0, 0.0));
    pv1.generators.push(gen1);

    let mut pv2 = Bus::new("PV2", 110.0, BusType::PV);
    pv2.set_voltage(Complex::new(1.0, 0.0));
    let mut gen2 = Generator::new("G2", "PV2", GeneratorType::PV, 0.3, 8.0);
    gen2.p = 0.8;
    gen2.recompute_internal_voltage(Complex::new(1.0, 0.0));
    pv2.generators.push(gen2);

    let network = NetworkBuilder::new(100.0, 50.0)
        .add_bus(slack)
        .add_bus(pv1)
        .add_bus(pv2)
        .add_line("SLACK", "PV1", Line::new("L1", 0.01, 0.1, 0.0, 0.0))
        .add_line("SLACK", "PV2", Line::new("L2", 0.01, 0.12, 0.0, 0.0))
        .build();

    let generators = network
        .buses
        .iter()
        .flat_map(|b| b.generators.iter())
        .map(|g| DynamicGenerator::new(g.clone()).unwrap())
        .collect();
    (network, generators)
}

fn evaluation_chain() -> TreeNode {
    let traj = TreeNode::new(
        "traj",
        None,
        NodeConfig::OmibTrajectoryCalculator(OmibTrajectoryConfig {
            calculator_type: TrajectoryCalculatorType::Taylor,
            critical_angle_shift_rad: 0.0,
            s_base_mva: 100.0,
        }),
    );
    let eac_node = TreeNode::new(
        "eac",
        None,
        NodeConfig::Eac(EacNodeConfig {
            angle_increment_rad: 1.0_f64.to_radians(),
            max_integration_angle_rad: 2.0 * std::f64::consts::PI,
        }),
    )
    .with_children(vec![traj]);
    TreeNode::new(
        "omib",
        None,
        NodeConfig::Omib(OmibNodeConfig { variant: OmibVariant::Zoomib, revised: false, s_base_mva: 100.0 }),
    )
    .with_children(vec![eac_node])
}

fn build_tree() -> ExecutionTree {
    let selector = TreeNode::new(
        "selector",
        None,
        NodeConfig::CriticalClusterSelector(SelectorConfig { criterion: SelectionCriterion::MinimumCriticalTime }),
    );
    let evaluator = TreeNode::new(
        "evaluator",
        None,
        NodeConfig::CriticalClustersEvaluator { evaluation_root: Box::new(evaluation_chain()) },
    )
    .with_children(vec![selector]);
    let identifier_config = IdentifierConfig {
        identifier_type: IdentifierType::Constrained,
        threshold: 0.0,
        threshold_decrement: 0.0,
        max_number_candidates: 10,
        min_cluster_power_mw: 0.0,
        never_critical_generators: Vec::new(),
        try_all_combinations: false,
        constrained_generator_names: vec!["G1".to_string()],
        observation_index: 0,
        during_fault_time_step_ms: 0,
        significant_angle_variation_threshold_rad: None,
        tso_customization: TsoCustomization::Default,
    };
    let root = TreeNode::new("identifier", None, NodeConfig::CriticalClustersIdentifier(identifier_config))
        .with_children(vec![evaluator]);
    ExecutionTree::new(root).unwrap()
}

#[test]
fn tree_runs_identify_evaluate_select_chain_to_one_result() {
    let (network, generators) = build_network();
    let tree = build_tree();
    let results = tree.run(Rc::new(network), generators, None).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].critical_time >= 0.0);
    assert!(results[0].maximum_time >= results[0].critical_time);
}

#[test]
fn a_node_with_children_that_declares_unmapped_inputs_is_rejected() {
    // An Eac node plugged directly under the identifier: it needs Omib, which
    // the identifier never produces.
    let eac_node = TreeNode::new(
        "eac",
        None,
        NodeConfig::Eac(EacNodeConfig { angle_increment_rad: 0.01, max_integration_angle_rad: 6.28 }),
    );
    let identifier_config = IdentifierConfig::default();
    let root = TreeNode::new("identifier", None, NodeConfig::CriticalClustersIdentifier(identifier_config))
        .with_children(vec![eac_node]);
    let result = ExecutionTree::new(root);
    assert!(result.is_err());
}
