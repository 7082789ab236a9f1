//! Builds an execution tree from a JSON document fixture (the in-scope
//! equivalent of a loaded tree-document file) and runs it against a network
//! assembled through the builder API.

use eeac::builder::{NetworkBuilder, TreeDocument};
use eeac::elements::generator::{Generator, GeneratorType};
use eeac::elements::{Bus, BusType, DynamicGenerator, Line};
use eeac::network::Network;
use eeac::tree::ExecutionTree;
use nalgebra::Complex;
use std::rc::Rc;

const FIXTURE: &str = include_str!("fixtures/identify_evaluate_select.json");

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

#[test]
fn tree_document_fixture_parses_validates_and_runs() {
    let doc: TreeDocument = serde_json::from_str(FIXTURE).unwrap();
    let tree = ExecutionTree::from_document(&doc).unwrap();
    assert_eq!(tree.root.id, "identifier");
    assert_eq!(tree.root.children.len(), 1);
    assert_eq!(tree.root.children[0].id, "evaluator");

    let (network, generators) = build_network();
    let results = tree.run(Rc::new(network), generators, None).unwrap();
    assert_eq!(results.len(), 1);
}
