//! Multi-machine Taylor series: advances every generator's own rotor angle
//! and angular speed forward by one time step from a known observation time,
//! using the reduced admittance matrix of the relevant network state.

use nalgebra::{Complex, DMatrix};

use crate::elements::generator::{DynamicGenerator, NetworkState};
use crate::error::DomainResult;
use crate::matrix::kron_reduce;
use crate::network::simplify::INTERNAL_VOLTAGE_PREFIX;
use crate::network::{FaultState, Network};

struct Snapshot {
    masses: Vec<f64>,
    p_mech: Vec<f64>,
    e: Vec<f64>,
    y: DMatrix<Complex<f64>>,
}

fn snapshot(network: &Network, state: FaultState, generators: &[DynamicGenerator], s_base_mva: f64) -> DomainResult<Snapshot> {
    let simplified = network.simplified(state)?;
    let kron = kron_reduce(&simplified.admittance, simplified.n_generators())?;
    let mut row_of = std::collections::HashMap::new();
    for (row, name) in simplified.generator_names.iter().enumerate() {
        let short = name.strip_prefix(INTERNAL_VOLTAGE_PREFIX).unwrap_or(name);
        row_of.insert(short.to_string(), row);
    }

    let n = generators.len();
    let mut masses = vec![0.0; n];
    let mut p_mech = vec![0.0; n];
    let mut e = vec![0.0; n];
    let mut y = DMatrix::<Complex<f64>>::from_element(n, n, Complex::new(0.0, 0.0));
    for (i, g) in generators.iter().enumerate() {
        masses[i] = g.generator.inertia_coefficient(s_base_mva);
        p_mech[i] = g.generator.mechanical_power();
        e[i] = g.generator.internal_voltage()?.norm();
    }
    for (i, gi) in generators.iter().enumerate() {
        let Some(&ri) = row_of.get(gi.name()) else { continue };
        for (j, gj) in generators.iter().enumerate() {
            let Some(&rj) = row_of.get(gj.name()) else { continue };
            y[(i, j)] = kron.y_reduced[(ri, rj)];
        }
    }
    Ok(Snapshot { masses, p_mech, e, y })
}

fn ab_matrices(snapshot: &Snapshot, deltas: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = deltas.len();
    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let y = snapshot.y[(i, j)];
            let y_mag = y.norm();
            let y_ang = y.arg();
            // i == j included: the generator's own shunt within the reduced
            // admittance contributes E_i^2 * Re(Y_ii) to its electrical power.
            let phase = deltas[i] - deltas[j] - y_ang;
            let amplitude = snapshot.e[i] * snapshot.e[j] * y_mag;
            a[(i, j)] = amplitude * phase.cos();
            b[(i, j)] = amplitude * phase.sin();
        }
    }
    (a, b)
}

fn second_derivative(snapshot: &Snapshot, a: &DMatrix<f64>, pulse: f64) -> Vec<f64> {
    let n = snapshot.masses.len();
    (0..n)
        .map(|i| {
            let sum: f64 = (0..n).map(|j| a[(i, j)]).sum();
            pulse * (snapshot.p_mech[i] - sum) / snapshot.masses[i]
        })
        .collect()
}

fn third_derivative(snapshot: &Snapshot, b: &DMatrix<f64>, d2: &[f64], pulse: f64) -> Vec<f64> {
    let n = snapshot.masses.len();
    (0..n)
        .map(|i| {
            let sum: f64 = (0..n).map(|j| b[(i, j)] * (d2[i] - d2[j])).sum();
            pulse * sum / snapshot.masses[i]
        })
        .collect()
}

fn fourth_derivative(snapshot: &Snapshot, a: &DMatrix<f64>, b: &DMatrix<f64>, omegas: &[f64], d2: &[f64], pulse: f64) -> Vec<f64> {
    let n = snapshot.masses.len();
    (0..n)
        .map(|i| {
            let sum: f64 = (0..n)
                .map(|j| {
                    let delta_omega = omegas[i] - omegas[j];
                    a[(i, j)] * delta_omega.powi(2) + b[(i, j)] * (d2[i] - d2[j])
                })
                .sum();
            pulse * sum / snapshot.masses[i]
        })
        .collect()
}

fn fifth_derivative(
    snapshot: &Snapshot,
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    omegas: &[f64],
    d2: &[f64],
    d3: &[f64],
    pulse: f64,
) -> Vec<f64> {
    let n = snapshot.masses.len();
    (0..n)
        .map(|i| {
            let sum: f64 = (0..n)
                .map(|j| {
                    let delta_omega = omegas[i] - omegas[j];
                    let delta_d2 = d2[i] - d2[j];
                    let delta_d3 = d3[i] - d3[j];
                    3.0 * a[(i, j)] * delta_omega * delta_d2 + b[(i, j)] * (delta_d3 - delta_omega.powi(3))
                })
                .sum();
            pulse * sum / snapshot.masses[i]
        })
        .collect()
}

/// Second- and fourth-order angle-acceleration terms at fault inception
/// (`t = 0`, zero initial speed), used by the during-fault trajectory
/// critical-cluster criterion to extrapolate the early swing without
/// advancing any generator's recorded trajectory.
pub(crate) fn during_fault_angle_derivatives(
    network: &Network,
    generators: &[DynamicGenerator],
    s_base_mva: f64,
) -> DomainResult<(Vec<f64>, Vec<f64>)> {
    let snap = snapshot(network, FaultState::DuringFault, generators, s_base_mva)?;
    let deltas: Vec<f64> = generators.iter().map(|g| g.rotor_angle_at(0.0)).collect::<DomainResult<_>>()?;
    let omegas = vec![0.0; generators.len()];
    let (a, b) = ab_matrices(&snap, &deltas);
    let pulse = network.pulse;
    let d2 = second_derivative(&snap, &a, pulse);
    let d4 = fourth_derivative(&snap, &a, &b, &omegas, &d2, pulse);
    Ok((d2, d4))
}

/// Electrical power injected by each generator alone at its current recorded
/// rotor angle, `P_e_i = sum_j A_ij` over the reduced admittance matrix,
/// used by the acceleration-based critical-cluster criterion.
pub fn electrical_power_per_generator(
    network: &Network,
    state: FaultState,
    generators: &[DynamicGenerator],
    t: f64,
    s_base_mva: f64,
) -> DomainResult<Vec<f64>> {
    let snap = snapshot(network, state, generators, s_base_mva)?;
    let deltas: Vec<f64> = generators.iter().map(|g| g.rotor_angle_at(t)).collect::<DomainResult<_>>()?;
    let (a, _b) = ab_matrices(&snap, &deltas);
    let n = generators.len();
    Ok((0..n).map(|i| (0..n).map(|j| a[(i, j)]).sum()).collect())
}

/// Advances every generator by `dt` from `t_from`, recording the new
/// `(angle, speed)` pair tagged with `to_state`.
pub fn advance_generators(
    generators: &mut [DynamicGenerator],
    network: &Network,
    state: FaultState,
    t_from: f64,
    dt: f64,
    to_state: NetworkState,
    s_base_mva: f64,
) -> DomainResult<()> {
    let snap = snapshot(network, state, generators, s_base_mva)?;
    let deltas: Vec<f64> = generators.iter().map(|g| g.rotor_angle_at(t_from)).collect::<DomainResult<_>>()?;
    let omegas: Vec<f64> = generators.iter().map(|g| g.angular_speed_at(t_from)).collect::<DomainResult<_>>()?;

    let (a, b) = ab_matrices(&snap, &deltas);
    let pulse = network.pulse;
    let d2 = second_derivative(&snap, &a, pulse);
    let d3 = third_derivative(&snap, &b, &d2, pulse);
    let d4 = fourth_derivative(&snap, &a, &b, &omegas, &d2, pulse);
    let d5 = fifth_derivative(&snap, &a, &b, &omegas, &d2, &d3, pulse);

    let t_new = t_from + dt;
    for i in 0..generators.len() {
        let delta_new = deltas[i]
            + omegas[i] * dt
            + d2[i] * dt.powi(2) / 2.0
            + d3[i] * dt.powi(3) / 6.0
            + d4[i] * dt.powi(4) / 24.0;
        let omega_new =
            omegas[i] + d2[i] * dt + d3[i] * dt.powi(2) / 2.0 + d4[i] * dt.powi(3) / 6.0 + d5[i] * dt.powi(4) / 24.0;
        generators[i].record(t_new, delta_new, omega_new, to_state);
    }
    Ok(())
}
