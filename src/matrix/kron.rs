//! Kron reduction of the full admittance matrix down to the
//! generator-internal-voltage buses.
//!
//! Follows the `basic/solver/faer.rs` `FaerSolver` shape: the same
//! `SymbolicLu`/`Lu` sparse-factorization pair, generalized from a single
//! real-valued right-hand side to a complex matrix of right-hand sides (one
//! column per retained bus), so that `Y_nn` is factorized once and solved
//! against every column of `Y_ng` instead of ever being inverted explicitly.

use nalgebra::{Complex, DMatrix};

use crate::error::{DomainError, DomainResult, NumericalError};
use crate::matrix::admittance::AdmittanceMatrix;

#[derive(Debug, Clone)]
pub struct KronReduction {
    /// The reduced admittance matrix over the `n_g` retained buses.
    pub y_reduced: DMatrix<Complex<f64>>,
}

/// Eliminates every bus except the last `n_g` (the generator-internal-voltage
/// buses, sorted last by [`crate::network::simplify::build`]) via the Schur
/// complement `Y_reduced = Y_gg - Y_gn * (Y_nn^-1 * Y_ng)`.
pub fn reduce(full: &AdmittanceMatrix, n_g: usize) -> DomainResult<KronReduction> {
    let n = full.dim();
    let n_n = n - n_g;

    if n_n == 0 {
        return Ok(KronReduction { y_reduced: extract_dense(full, 0, n, 0, n) });
    }

    let y_ng = extract_dense(full, 0, n_n, n_n, n);
    let y_gn = extract_dense(full, n_n, n, 0, n_n);
    let y_gg = extract_dense(full, n_n, n, n_n, n);

    let x = solve_against_y_nn(full, n_n, &y_ng)?;
    Ok(KronReduction { y_reduced: y_gg - y_gn * x })
}

fn extract_dense(
    full: &AdmittanceMatrix,
    row_start: usize,
    row_end: usize,
    col_start: usize,
    col_end: usize,
) -> DMatrix<Complex<f64>> {
    let mut m = DMatrix::from_element(row_end - row_start, col_end - col_start, Complex::new(0.0, 0.0));
    for (row, col, value) in full.y.triplet_iter() {
        if row >= row_start && row < row_end && col >= col_start && col < col_end {
            m[(row - row_start, col - col_start)] = *value;
        }
    }
    m
}

#[cfg(feature = "faer")]
fn solve_against_y_nn(
    full: &AdmittanceMatrix,
    n_n: usize,
    rhs: &DMatrix<Complex<f64>>,
) -> DomainResult<DMatrix<Complex<f64>>> {
    use faer::c64;
    use faer::linalg::solvers::Solve;
    use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
    use faer::sparse::{SparseColMatRef, SymbolicSparseColMatRef};
    use faer::{Mat, MatMut};

    // Column-major CSC assembly of Y_nn from the full matrix's triplets.
    let mut columns: Vec<Vec<(usize, Complex<f64>)>> = vec![Vec::new(); n_n];
    for (row, col, value) in full.y.triplet_iter() {
        if row < n_n && col < n_n {
            columns[col].push((row, *value));
        }
    }
    for column in &mut columns {
        column.sort_by_key(|(row, _)| *row);
    }

    let mut col_ptrs = Vec::with_capacity(n_n + 1);
    let mut row_indices = Vec::new();
    let mut values = Vec::new();
    col_ptrs.push(0usize);
    for column in &columns {
        for &(row, value) in column {
            row_indices.push(row);
            values.push(c64::new(value.re, value.im));
        }
        col_ptrs.push(row_indices.len());
    }

    let symbolic_pattern =
        unsafe { SymbolicSparseColMatRef::new_unchecked(n_n, n_n, &col_ptrs, None, &row_indices) };
    let y_nn = SparseColMatRef::new(symbolic_pattern, &values);
    let symbolic = SymbolicLu::try_new(symbolic_pattern)
        .map_err(|_| DomainError::Numerical(NumericalError::SingularYnn))?;
    let lu = Lu::try_new_with_symbolic(symbolic, y_nn)
        .map_err(|_| DomainError::Numerical(NumericalError::SingularYnn))?;

    let k = rhs.ncols();
    let mut b: Vec<c64> = Vec::with_capacity(n_n * k);
    for col in 0..k {
        for row in 0..n_n {
            let v = rhs[(row, col)];
            b.push(c64::new(v.re, v.im));
        }
    }
    let mut b_mat: Mat<c64> = Mat::from_fn(n_n, k, |r, c| b[c * n_n + r]);
    lu.solve_in_place(MatMut::from(b_mat.as_mut()));

    let mut out = DMatrix::from_element(n_n, k, Complex::new(0.0, 0.0));
    for col in 0..k {
        for row in 0..n_n {
            let v = b_mat[(row, col)];
            out[(row, col)] = Complex::new(v.re, v.im);
        }
    }
    Ok(out)
}

/// Dense fallback used when the `faer` feature is disabled. Still a single
/// LU factorization shared across every right-hand-side column, just backed
/// by `nalgebra`'s dense decomposition instead of a sparse one.
#[cfg(not(feature = "faer"))]
fn solve_against_y_nn(
    full: &AdmittanceMatrix,
    n_n: usize,
    rhs: &DMatrix<Complex<f64>>,
) -> DomainResult<DMatrix<Complex<f64>>> {
    let y_nn = extract_dense(full, 0, n_n, 0, n_n);
    let lu = y_nn.lu();
    lu.solve(rhs).ok_or(DomainError::Numerical(NumericalError::SingularYnn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::branch::BranchElement;
    use crate::elements::bus::BusType;
    use crate::elements::line::Line;
    use crate::elements::{Branch, Bus};
    use crate::network::simplify::BusIndex;

    #[test]
    fn reducing_to_every_bus_is_a_no_op() {
        let buses = vec![Bus::new("A", 110.0, BusType::Slack), Bus::new("B", 110.0, BusType::PQ)];
        let bus_index = BusIndex::from_names(["A", "B"]);
        let mut branch = Branch::new("A", "B");
        branch.insert(1, BranchElement::Line(Line::new("L1", 0.01, 0.1, 0.0, 0.0)));
        let full = AdmittanceMatrix::assemble(&buses, &[branch], &bus_index).unwrap();
        let reduced = reduce(&full, 2).unwrap();
        assert_eq!(reduced.y_reduced.nrows(), 2);
    }

    #[test]
    fn three_bus_radial_reduces_to_two_source_buses() {
        let buses = vec![
            Bus::new("G1", 110.0, BusType::GeneratorInternalVoltage),
            Bus::new("MID", 110.0, BusType::PQ),
            Bus::new("G2", 110.0, BusType::GeneratorInternalVoltage),
        ];
        let bus_index = BusIndex::from_names(["MID", "G1", "G2"]);
        let mut b1 = Branch::new("G1", "MID");
        b1.insert(1, BranchElement::Line(Line::new("L1", 0.0, 0.1, 0.0, 0.0)));
        let mut b2 = Branch::new("MID", "G2");
        b2.insert(1, BranchElement::Line(Line::new("L2", 0.0, 0.1, 0.0, 0.0)));
        let ordered = vec![
            Bus::new("MID", 110.0, BusType::PQ),
            Bus::new("G1", 110.0, BusType::GeneratorInternalVoltage),
            Bus::new("G2", 110.0, BusType::GeneratorInternalVoltage),
        ];
        let full = AdmittanceMatrix::assemble(&ordered, &[b1, b2], &bus_index).unwrap();
        let reduced = reduce(&full, 2).unwrap();
        assert_eq!(reduced.y_reduced.nrows(), 2);
        assert_eq!(reduced.y_reduced.ncols(), 2);
        let _ = buses;
    }
}
