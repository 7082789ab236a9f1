//! Nodal admittance matrix assembly.
//!
//! Follows `basic/system/system.rs::create_ybus`: same `nalgebra_sparse`
//! `CooMatrix` -> `CsrMatrix` pipeline, but pushed directly from each
//! branch's four-entry contribution instead of via an incidence-matrix
//! product, since branch contributions here already come out of
//! [`crate::elements::transformer::Transformer::contribution`] and a line's
//! series/shunt admittances rather than a single scalar per element.

use nalgebra::Complex;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::elements::branch::BranchElement;
use crate::elements::transformer::BranchContribution;
use crate::elements::{Branch, Bus};
use crate::error::DomainResult;
use crate::network::simplify::BusIndex;

#[derive(Debug, Clone)]
pub struct AdmittanceMatrix {
    pub y: CsrMatrix<Complex<f64>>,
}

impl AdmittanceMatrix {
    pub fn dim(&self) -> usize {
        self.y.nrows()
    }

    /// Assembles Y from bus shunts (loads, capacitor banks, fictive loads)
    /// and branch contributions, indexed by `bus_index`.
    pub fn assemble(buses: &[Bus], branches: &[Branch], bus_index: &BusIndex) -> DomainResult<Self> {
        let n = buses.len();
        let mut coo = CooMatrix::new(n, n);

        for (i, bus) in buses.iter().enumerate() {
            let mut shunt = Complex::new(0.0, 0.0);
            for load in &bus.loads {
                shunt += load.admittance();
            }
            for bank in &bus.capacitor_banks {
                shunt += bank.admittance();
            }
            for fictive in &bus.fictive_loads {
                shunt += fictive.admittance;
            }
            if shunt != Complex::new(0.0, 0.0) {
                coo.push(i, i, shunt);
            }
        }

        for branch in branches {
            let Some(i) = bus_index.get(&branch.first_bus) else { continue };
            let Some(j) = bus_index.get(&branch.second_bus) else { continue };
            for element in branch.elements() {
                let c = element_contribution(element)?;
                if c.y_ii != Complex::new(0.0, 0.0) {
                    coo.push(i, i, c.y_ii);
                }
                if c.y_jj != Complex::new(0.0, 0.0) {
                    coo.push(j, j, c.y_jj);
                }
                if c.y_ij != Complex::new(0.0, 0.0) {
                    coo.push(i, j, c.y_ij);
                }
                if c.y_ji != Complex::new(0.0, 0.0) {
                    coo.push(j, i, c.y_ji);
                }
            }
        }

        Ok(Self { y: CsrMatrix::from(&coo) })
    }
}

fn element_contribution(element: &BranchElement) -> DomainResult<BranchContribution> {
    match element {
        BranchElement::Line(line) => {
            let y_series = line.series_admittance();
            let y_sh = line.half_shunt_admittance();
            let y_ii = if line.closed_at_first_bus { y_series + y_sh } else { Complex::new(0.0, 0.0) };
            let y_jj = if line.closed_at_second_bus { y_series + y_sh } else { Complex::new(0.0, 0.0) };
            Ok(BranchContribution { y_ii, y_jj, y_ij: -y_series, y_ji: -y_series })
        }
        BranchElement::Transformer(t) => t.contribution(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::bus::BusType;
    use crate::elements::line::Line;

    #[test]
    fn a_single_line_produces_a_symmetric_2x2_matrix() {
        let buses = vec![Bus::new("A", 110.0, BusType::Slack), Bus::new("B", 110.0, BusType::PQ)];
        let bus_index = BusIndex::from_names(["A", "B"]);
        let mut branch = Branch::new("A", "B");
        branch.insert(1, BranchElement::Line(Line::new("L1", 0.01, 0.1, 0.0, 0.0)));
        let y = AdmittanceMatrix::assemble(&buses, &[branch], &bus_index).unwrap();
        let y_dense = nalgebra_sparse::convert::serial::convert_csr_dense(&y.y);
        assert!((y_dense[(0, 1)] - y_dense[(1, 0)]).norm() < 1e-12);
    }
}
