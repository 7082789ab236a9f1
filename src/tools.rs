//! Small numeric helpers shared by the EAC search, the Taylor waypoint walk
//! and the DOMIB monotone filter.
//!
//! Covers angle normalization and swing-direction-aware comparisons,
//! reimplemented here rather than inlined at each call site.

use std::f64::consts::PI;

/// Orientation of the angle sweep: `Forward` (+1) or `Backward` (-1), fixed
/// at OMIB construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SwingDirection {
    Forward,
    Backward,
}

impl SwingDirection {
    pub fn factor(self) -> f64 {
        match self {
            SwingDirection::Forward => 1.0,
            SwingDirection::Backward => -1.0,
        }
    }
}

/// Normalizes an angle (radians) into `(-pi, pi]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// `true` iff `a` occurs strictly before `b` when walking in `direction`.
pub fn is_before(a: f64, b: f64, direction: SwingDirection) -> bool {
    direction.factor() * a < direction.factor() * b
}

/// `true` iff `a` occurs at or before `b` when walking in `direction`.
pub fn is_before_or_eq(a: f64, b: f64, direction: SwingDirection) -> bool {
    direction.factor() * a <= direction.factor() * b
}

/// Returns the largest element of `sorted_in_swing_order` that is `<= query`
/// in swing-direction order, or `None` if `query` precedes every element.
///
/// `sorted_in_swing_order` must already be sorted in swing-direction order
/// (ascending for `Forward`, descending for `Backward`).
pub fn last_at_or_before(
    sorted_in_swing_order: &[f64],
    query: f64,
    direction: SwingDirection,
) -> Option<f64> {
    sorted_in_swing_order
        .iter()
        .copied()
        .filter(|&x| is_before_or_eq(x, query, direction))
        .last()
}

/// Inserts `waypoint` into `angles` (sorted in swing-direction order),
/// keeping the list sorted and free of duplicates within `eps`.
pub fn insert_waypoint_sorted(angles: &mut Vec<f64>, waypoint: f64, direction: SwingDirection, eps: f64) {
    if angles.iter().any(|&a| (a - waypoint).abs() < eps) {
        return;
    }
    let pos = angles
        .iter()
        .position(|&a| is_before(waypoint, a, direction))
        .unwrap_or(angles.len());
    angles.insert(pos, waypoint);
}

/// Filters `values` (assumed ordered by increasing observation time) so that
/// only entries strictly monotone increasing in swing-direction order
/// survive (the DOMIB update-angle monotone filter).
pub fn keep_monotone_in_swing_direction(values: &[f64], direction: SwingDirection) -> Vec<f64> {
    let mut kept: Vec<f64> = Vec::with_capacity(values.len());
    for &v in values {
        if kept.last().is_none_or(|&last| is_before(last, v, direction)) {
            kept.push(v);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_into_range() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn swing_direction_ordering() {
        assert!(is_before(1.0, 2.0, SwingDirection::Forward));
        assert!(!is_before(1.0, 2.0, SwingDirection::Backward));
        assert!(is_before(2.0, 1.0, SwingDirection::Backward));
    }

    #[test]
    fn monotone_filter_drops_non_increasing() {
        let values = [0.1, 0.3, 0.2, 0.5, 0.4, 0.6];
        let kept = keep_monotone_in_swing_direction(&values, SwingDirection::Forward);
        assert_eq!(kept, vec![0.1, 0.3, 0.5, 0.6]);
    }

    #[test]
    fn waypoint_insertion_keeps_sorted_order() {
        let mut angles = vec![0.0, 1.0, 2.0];
        insert_waypoint_sorted(&mut angles, 1.5, SwingDirection::Forward, 1e-9);
        assert_eq!(angles, vec![0.0, 1.0, 1.5, 2.0]);
        insert_waypoint_sorted(&mut angles, 1.5, SwingDirection::Forward, 1e-9);
        assert_eq!(angles.len(), 4, "duplicate waypoint must not be inserted twice");
    }

    #[test]
    fn last_at_or_before_picks_largest_reachable() {
        let updates = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(last_at_or_before(&updates, 2.5, SwingDirection::Forward), Some(2.0));
        assert_eq!(last_at_or_before(&updates, -1.0, SwingDirection::Forward), None);
    }
}
