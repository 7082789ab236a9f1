//! Invariant tests for the OMIB reduction and the Equal Area Criterion
//! search, built on a small two-generator network assembled through the
//! public builder API.

use eeac::elements::generator::{Generator, GeneratorType};
use eeac::elements::{Branch, BranchElement, Bus, BusType, DynamicGenerator, GeneratorCluster, Line};
use eeac::error::{DomainError, InputValidationError};
use eeac::identifier::{self, IdentifierConfig, IdentifierType};
use eeac::network::{FaultState, Network};
use eeac::omib::{Omib, OmibVariant, StabilityState};
use eeac::{builder::NetworkBuilder, eac};
use nalgebra::Complex;

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

fn constrained_config(names: Vec<String>) -> IdentifierConfig {
    IdentifierConfig {
        identifier_type: IdentifierType::Constrained,
        threshold: 0.0,
        threshold_decrement: 0.0,
        max_number_candidates: 10,
        min_cluster_power_mw: 0.0,
        never_critical_generators: Vec::new(),
        try_all_combinations: false,
        constrained_generator_names: names,
        observation_index: 0,
        during_fault_time_step_ms: 0,
        significant_angle_variation_threshold_rad: None,
        tso_customization: identifier::TsoCustomization::Default,
    }
}

// Invariant 3: the OMIB equivalent's mechanical power equals
// (M_N*P_C - M_C*P_N) / M_total, for any variant.
#[test]
fn mechanical_power_matches_inertia_weighted_formula() {
    for variant in [OmibVariant::Zoomib, OmibVariant::Coomib, OmibVariant::Domib] {
        let (network, mut generators) = build_network();
        let critical = GeneratorCluster::new(vec![0]);
        let non_critical = GeneratorCluster::new(vec![1]);
        let omib = Omib::new(variant, false, critical, non_critical, 100.0, &mut generators, &network).unwrap();
        let m_c = omib.critical.total_inertia(&generators, 100.0);
        let m_n = omib.non_critical.total_inertia(&generators, 100.0);
        let expected = (m_n * omib.critical.total_mechanical_power(&generators)
            - m_c * omib.non_critical.total_mechanical_power(&generators))
            / (m_c + m_n);
        approx::assert_abs_diff_eq!(omib.mechanical_power, expected, epsilon = 1e-9);
    }
}

// Invariant 7: DOMIB with zero-offset deviations (single-member clusters at
// t=0, so theta_i is trivially zero for every variant) produces the same
// coefficients as ZOOMIB at the same update time.
#[test]
fn domib_matches_zoomib_coefficients_when_deviations_are_zero() {
    let (network, mut generators) = build_network();

    let zoomib = Omib::new(
        OmibVariant::Zoomib,
        false,
        GeneratorCluster::new(vec![0]),
        GeneratorCluster::new(vec![1]),
        100.0,
        &mut generators,
        &network,
    )
    .unwrap();
    let zoomib_coeffs = zoomib.properties_at_time(FaultState::PreFault, 0.0, &generators, &network).unwrap();

    let domib = Omib::new(
        OmibVariant::Domib,
        false,
        GeneratorCluster::new(vec![0]),
        GeneratorCluster::new(vec![1]),
        100.0,
        &mut generators,
        &network,
    )
    .unwrap();
    let domib_coeffs = domib.properties_at_time(FaultState::PreFault, 0.0, &generators, &network).unwrap();

    approx::assert_abs_diff_eq!(zoomib_coeffs.angle_shift, domib_coeffs.angle_shift, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(
        zoomib_coeffs.constant_electric_power,
        domib_coeffs.constant_electric_power,
        epsilon = 1e-9
    );
    approx::assert_abs_diff_eq!(
        zoomib_coeffs.maximum_electric_power,
        domib_coeffs.maximum_electric_power,
        epsilon = 1e-9
    );
}

// Invariant 8: the critical and non-critical clusters partition the
// post-fault generator set exactly, with no overlap.
#[test]
fn identifier_candidates_partition_the_generator_set() {
    let (network, generators) = build_network();
    let config = constrained_config(vec!["G1".to_string()]);
    let candidates = identifier::identify(&config, &generators, &network, 100.0).unwrap();
    assert!(!candidates.is_empty());

    for (critical, non_critical) in candidates.iter() {
        let mut critical_set: Vec<usize> = critical.members().to_vec();
        let mut non_critical_set: Vec<usize> = non_critical.members().to_vec();
        critical_set.sort();
        non_critical_set.sort();
        assert!(critical_set.iter().all(|i| !non_critical_set.contains(i)), "clusters must not overlap");
        let mut union: Vec<usize> = critical_set.iter().chain(non_critical_set.iter()).copied().collect();
        union.sort();
        assert_eq!(union, (0..generators.len()).collect::<Vec<_>>());
    }
}

// Invariant 6: stability classification is exhaustive; the EAC search
// always returns exactly one of the three named states.
#[test]
fn eac_classification_is_always_one_of_the_three_named_states() {
    let (network, mut generators) = build_network();
    let mut omib = Omib::new(
        OmibVariant::Zoomib,
        false,
        GeneratorCluster::new(vec![0]),
        GeneratorCluster::new(vec![1]),
        100.0,
        &mut generators,
        &network,
    )
    .unwrap();
    let result = eac::run(&mut omib, &network, &generators, &eac::EacConfig::default()).unwrap();
    assert!(matches!(
        result.stability_state,
        StabilityState::AlwaysStable | StabilityState::AlwaysUnstable | StabilityState::PotentiallyStable
    ));
    assert_eq!(omib.stability_state, result.stability_state);
}

// Boundary behavior: a constrained identifier naming an unknown generator
// fails with the full list of unknown names, not a silent no-op.
#[test]
fn constrained_identifier_rejects_unknown_generator_names() {
    let (network, generators) = build_network();
    let config = constrained_config(vec!["GHOST".to_string()]);
    let result = identifier::identify(&config, &generators, &network, 100.0);
    match result {
        Err(DomainError::InputValidation(InputValidationError::UnknownConstrainedGenerators { names })) => {
            assert_eq!(names, vec!["GHOST".to_string()]);
        }
        other => panic!("expected UnknownConstrainedGenerators, got {other:?}"),
    }
}

// Boundary behavior: a branch with at least one closed element reports
// closed even if a parallel element is fully open (invariant 1 depends on
// this holding before admittance assembly runs).
#[test]
fn branch_with_any_closed_element_is_closed() {
    let mut branch = Branch::new("A", "B");
    let mut l1 = Line::new("L1", 0.01, 0.1, 0.0, 0.0);
    l1.closed_at_first_bus = false;
    l1.closed_at_second_bus = false;
    branch.insert(1, BranchElement::Line(l1));
    assert!(!branch.is_closed());
    branch.insert(2, BranchElement::Line(Line::new("L2", 0.01, 0.1, 0.0, 0.0)));
    assert!(branch.is_closed());
}
