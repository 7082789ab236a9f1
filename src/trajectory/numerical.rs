//! Alternative to the Taylor-series angle->time calculator: a fixed-step
//! RK4 integration of the swing equation with a terminal `delta - target = 0`
//! event, capped at a 10 second integration ceiling.

use crate::elements::generator::DynamicGenerator;
use crate::error::{DomainError, DomainResult, NumericalError};
use crate::network::{FaultState, Network};
use crate::omib::Omib;

const INTEGRATION_CEILING_S: f64 = 10.0;
const STEP_S: f64 = 1e-3;

fn derivatives(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    state: FaultState,
    delta: f64,
    omega: f64,
) -> DomainResult<(f64, f64)> {
    let m = omib.equivalent_inertia(generators);
    let coeffs = omib.properties_at_time(state, omib.update_time_for_angle(delta), generators, network)?;
    let p_e = coeffs.electric_power(delta);
    Ok((omega, network.pulse * (omib.mechanical_power - p_e) / m))
}

/// Integrates from `(delta_from, omega_from)` at `t_from` under `state_from`
/// until `delta` crosses `delta_to` in the swing direction, returning the
/// (linearly interpolated) crossing time.
pub fn time_at_numerical(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    t_from: f64,
    delta_from: f64,
    omega_from: f64,
    state_from: FaultState,
    delta_to: f64,
) -> DomainResult<f64> {
    let factor = omib.swing_state.factor();
    let mut t = t_from;
    let mut delta = delta_from;
    let mut omega = omega_from;

    if factor * (delta - delta_to) >= 0.0 {
        return Ok(t_from);
    }

    while t - t_from < INTEGRATION_CEILING_S {
        let previous_delta = delta;
        let previous_t = t;

        let (k1_d, k1_w) = derivatives(omib, network, generators, state_from, delta, omega)?;
        let (k2_d, k2_w) =
            derivatives(omib, network, generators, state_from, delta + 0.5 * STEP_S * k1_d, omega + 0.5 * STEP_S * k1_w)?;
        let (k3_d, k3_w) =
            derivatives(omib, network, generators, state_from, delta + 0.5 * STEP_S * k2_d, omega + 0.5 * STEP_S * k2_w)?;
        let (k4_d, k4_w) = derivatives(omib, network, generators, state_from, delta + STEP_S * k3_d, omega + STEP_S * k3_w)?;

        delta += STEP_S / 6.0 * (k1_d + 2.0 * k2_d + 2.0 * k3_d + k4_d);
        omega += STEP_S / 6.0 * (k1_w + 2.0 * k2_w + 2.0 * k3_w + k4_w);
        t += STEP_S;

        if factor * (delta - delta_to) >= 0.0 {
            let span = delta - previous_delta;
            let fraction = if span.abs() > 1e-12 { (delta_to - previous_delta) / span } else { 1.0 };
            return Ok(previous_t + STEP_S * fraction.clamp(0.0, 1.0));
        }
    }

    Err(DomainError::Numerical(NumericalError::PolynomialRootNotFound))
}
