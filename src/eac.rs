//! Equal Area Criterion search: finds the critical clearing angle/time pair
//! (delta_c, delta_max) at which the acceleration area picked up during the
//! fault is exactly canceled by the deceleration area available post-fault.

use crate::elements::generator::DynamicGenerator;
use crate::error::DomainResult;
use crate::network::{FaultState, Network};
use crate::omib::{Omib, StabilityState};

/// Analytic primitive of `P_m - P_c - P_max*sin(delta - psi)` over `[a, b]`.
fn area(p_m: f64, p_c: f64, p_max: f64, psi: f64, a: f64, b: f64) -> f64 {
    (p_m - p_c) * (b - a) + p_max * ((b - psi).cos() - (a - psi).cos())
}

/// Net area `A_acc(delta0 -> delta) + A_dec(delta -> delta_max)`, splitting at
/// every DOMIB update point the interval crosses so each sub-interval uses
/// its own curve.
fn signed_area(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    state: FaultState,
    from: f64,
    to: f64,
) -> DomainResult<f64> {
    let factor = omib.swing_state.factor();
    let (lo, hi) = if factor > 0.0 { (from, to) } else { (to, from) };
    let coeffs = omib.properties_at_time(state, omib.update_time_for_angle(lo), generators, network)?;
    Ok(factor * area(omib.mechanical_power, coeffs.constant_electric_power, coeffs.maximum_electric_power, coeffs.angle_shift, lo, hi))
}

pub struct EacResult {
    pub stability_state: StabilityState,
    pub critical_angle: f64,
    pub maximum_angle: f64,
}

pub struct EacConfig {
    pub angle_increment_rad: f64,
    pub coarse_factor: f64,
    pub integration_ceiling_rad: f64,
}

impl Default for EacConfig {
    fn default() -> Self {
        Self { angle_increment_rad: 1.0_f64.to_radians(), coarse_factor: 18.0, integration_ceiling_rad: 2.0 * std::f64::consts::PI }
    }
}

/// Runs the nested-sweep search described for the Equal Area Criterion and
/// updates `omib.stability_state` with the outcome.
pub fn run(
    omib: &mut Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    config: &EacConfig,
) -> DomainResult<EacResult> {
    let factor = omib.swing_state.factor();
    let delta0 = omib.initial_rotor_angle;
    let coarse_step = config.angle_increment_rad * config.coarse_factor;
    let fine_step = config.angle_increment_rad;
    let ceiling = delta0 + factor * config.integration_ceiling_rad;

    let mut best: Option<(f64, f64)> = None;
    let mut delta = delta0;
    loop {
        if factor * (delta - ceiling) > 0.0 {
            break;
        }
        if let Some((_delta_c, delta_max)) = find_deceleration_crossing(omib, network, generators, delta0, delta, coarse_step, fine_step, ceiling)? {
            let p_e_post = omib.electric_power(delta_max, FaultState::PostFault, generators, network)?;
            if p_e_post <= omib.mechanical_power + 1e-9 || factor * (delta_max - ceiling) >= 0.0 {
                best = Some((delta, delta_max));
            }
        }
        delta += factor * coarse_step;
    }

    let result = match best {
        None => {
            omib.stability_state = StabilityState::AlwaysUnstable;
            EacResult { stability_state: StabilityState::AlwaysUnstable, critical_angle: delta0, maximum_angle: delta0 }
        }
        Some((delta_c, delta_max)) => {
            if factor * (delta_max - ceiling) >= 0.0 {
                omib.stability_state = StabilityState::AlwaysStable;
                EacResult { stability_state: StabilityState::AlwaysStable, critical_angle: ceiling, maximum_angle: ceiling }
            } else {
                omib.stability_state = StabilityState::PotentiallyStable;
                EacResult { stability_state: StabilityState::PotentiallyStable, critical_angle: delta_c, maximum_angle: delta_max }
            }
        }
    };
    Ok(result)
}

/// For a trial clearing angle `delta`, advances `delta_max` until the net
/// area flips sign (coarse step), then refines with single-step increments.
#[allow(clippy::too_many_arguments)]
fn find_deceleration_crossing(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    delta0: f64,
    delta: f64,
    coarse_step: f64,
    fine_step: f64,
    ceiling: f64,
) -> DomainResult<Option<(f64, f64)>> {
    let factor = omib.swing_state.factor();
    let acc_area = signed_area(omib, network, generators, FaultState::DuringFault, delta0, delta)?;

    let mut previous_total = acc_area;
    let mut previous_angle = delta;
    let mut probe = delta + factor * coarse_step;
    while factor * (probe - ceiling) <= 0.0 {
        let dec_area = signed_area(omib, network, generators, FaultState::PostFault, delta, probe)?;
        let total = acc_area + dec_area;
        if total.signum() != previous_total.signum() || total == 0.0 {
            return Ok(Some(refine(omib, network, generators, delta0, delta, previous_angle, probe, fine_step)?));
        }
        previous_total = total;
        previous_angle = probe;
        probe += factor * coarse_step;
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn refine(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    delta0: f64,
    delta_c: f64,
    mut lo: f64,
    hi: f64,
    fine_step: f64,
) -> DomainResult<(f64, f64)> {
    let factor = omib.swing_state.factor();
    let acc_area = signed_area(omib, network, generators, FaultState::DuringFault, delta0, delta_c)?;
    let mut probe = lo;
    loop {
        let dec_area = signed_area(omib, network, generators, FaultState::PostFault, delta_c, probe)?;
        if (acc_area + dec_area).abs() <= 1e-6 || factor * (probe - hi) >= 0.0 {
            return Ok((delta_c, probe));
        }
        lo = probe;
        probe += factor * fine_step;
    }
}

/// Speed magnitude at `angle`, from energy conservation starting at rest
/// (`omega = 0`) at `omib.initial_rotor_angle` under the curve valid for
/// `state`: `(1/2) M omega^2 = pulse * signed_area(delta0 -> angle)`.
pub(crate) fn speed_at(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    state: FaultState,
    angle: f64,
) -> DomainResult<f64> {
    let delta0 = omib.initial_rotor_angle;
    let net = signed_area(omib, network, generators, state, delta0, angle)?;
    let m = omib.equivalent_inertia(generators);
    let magnitude_sq = 2.0 * network.pulse * net.max(0.0) / m;
    Ok(omib.swing_state.factor() * magnitude_sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_of_a_flat_curve_is_rectangular() {
        let a = area(1.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(a.abs() < 1e-12);
    }
}
