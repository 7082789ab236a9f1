//! OMIB Taylor series: angle -> time, by Taylor-expanding the rotor speed at
//! the starting point and solving the resulting degree-4 polynomial in `dt`.

use nalgebra::DMatrix;

use crate::elements::generator::DynamicGenerator;
use crate::error::{DomainError, DomainResult, NumericalError};
use crate::network::{FaultState, Network};
use crate::omib::Omib;

/// First four time-derivatives of the rotor speed at `(delta_from, omega_from)`
/// under the curve valid for `state_from`, closed-form from the swing
/// equation `M*delta'' = pulse*(P_m - P_e(delta))`.
fn speed_derivatives(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    delta_from: f64,
    omega_from: f64,
    state_from: FaultState,
) -> DomainResult<[f64; 4]> {
    let m = omib.equivalent_inertia(generators);
    if m == 0.0 {
        return Err(DomainError::Numerical(NumericalError::ZeroTotalInertia));
    }
    let coeffs = omib.properties_at_time(state_from, omib.update_time_for_angle(delta_from), generators, network)?;
    let pulse = network.pulse;
    let p_e = coeffs.electric_power(delta_from);
    let phase = delta_from - coeffs.angle_shift;

    let omega_dot = pulse * (omib.mechanical_power - p_e) / m;
    let omega_ddot = -pulse * coeffs.maximum_electric_power * phase.cos() * omega_from / m;
    let omega_dddot = pulse * coeffs.maximum_electric_power
        * (phase.sin() * omega_from.powi(2) - phase.cos() * omega_dot)
        / m;
    Ok([omega_from, omega_dot, omega_ddot, omega_dddot])
}

/// Real, positive roots of `a4*dt^4 + a3*dt^3 + a2*dt^2 + a1*dt + a0 = 0` via
/// the companion matrix's eigenvalues.
fn positive_real_roots(a0: f64, a1: f64, a2: f64, a3: f64, a4: f64) -> Vec<f64> {
    if a4.abs() < 1e-14 {
        return positive_real_roots_cubic(a0, a1, a2, a3);
    }
    let c = [a0 / a4, a1 / a4, a2 / a4, a3 / a4];
    let mut companion = DMatrix::<f64>::zeros(4, 4);
    for i in 0..3 {
        companion[(i + 1, i)] = 1.0;
    }
    for i in 0..4 {
        companion[(i, 3)] = -c[i];
    }
    let eigen = companion.complex_eigenvalues();
    eigen
        .iter()
        .filter(|e| e.im.abs() < 1e-6 && e.re > 1e-12)
        .map(|e| e.re)
        .collect()
}

fn positive_real_roots_cubic(a0: f64, a1: f64, a2: f64, a3: f64) -> Vec<f64> {
    if a3.abs() < 1e-14 {
        // Falls back to a linear/quadratic solve; quadratic formula covers
        // both since a3==a2==0 degenerates further to linear with b=0.
        if a2.abs() < 1e-14 {
            if a1.abs() < 1e-14 {
                return Vec::new();
            }
            let root = -a0 / a1;
            return if root > 1e-12 { vec![root] } else { Vec::new() };
        }
        let disc = a1 * a1 - 4.0 * a2 * a0;
        if disc < 0.0 {
            return Vec::new();
        }
        let sqrt_disc = disc.sqrt();
        return [(-a1 + sqrt_disc) / (2.0 * a2), (-a1 - sqrt_disc) / (2.0 * a2)]
            .into_iter()
            .filter(|r| *r > 1e-12)
            .collect();
    }
    let c = [a0 / a3, a1 / a3, a2 / a3];
    let mut companion = DMatrix::<f64>::zeros(3, 3);
    for i in 0..2 {
        companion[(i + 1, i)] = 1.0;
    }
    for i in 0..3 {
        companion[(i, 2)] = -c[i];
    }
    companion
        .complex_eigenvalues()
        .iter()
        .filter(|e| e.im.abs() < 1e-6 && e.re > 1e-12)
        .map(|e| e.re)
        .collect()
}

/// Time needed to go from `(delta_from, omega_from)` at `t_from` to
/// `delta_to`, under the curve that applies at `state_from`.
pub fn time_at_taylor(
    omib: &Omib,
    network: &Network,
    generators: &[DynamicGenerator],
    t_from: f64,
    delta_from: f64,
    omega_from: f64,
    state_from: FaultState,
    delta_to: f64,
) -> DomainResult<f64> {
    let [w, wd, wdd, wddd] = speed_derivatives(omib, network, generators, delta_from, omega_from, state_from)?;
    let target = delta_to - delta_from;

    // delta(dt) = w*dt + wd*dt^2/2 + wdd*dt^3/6 + wddd*dt^4/24 - target = 0
    let a4 = wddd / 24.0;
    let a3 = wdd / 6.0;
    let a2 = wd / 2.0;
    let a1 = w;
    let a0 = -target;

    let full_roots = positive_real_roots(a0, a1, a2, a3, a4);
    // Lower-order disambiguation: the same polynomial truncated to the
    // quadratic term, used only to pick among multiple quartic roots.
    let reference_roots = positive_real_roots_cubic(a0, a1, a2, 0.0);

    let chosen = if full_roots.len() <= 1 {
        full_roots.into_iter().next()
    } else if let Some(&reference) = reference_roots.first() {
        full_roots.into_iter().min_by(|a, b| (a - reference).abs().partial_cmp(&(b - reference).abs()).unwrap())
    } else {
        full_roots.into_iter().reduce(f64::min)
    };

    chosen.map(|dt| t_from + dt).ok_or(DomainError::Numerical(NumericalError::PolynomialRootNotFound))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_speed_linear_motion_solves_exactly() {
        // delta(dt) = 2*dt, target 4 -> dt=2.
        let roots = positive_real_roots(-4.0, 2.0, 0.0, 0.0, 0.0);
        assert_eq!(roots.len(), 1);
        assert!((roots[0] - 2.0).abs() < 1e-9);
    }
}
