//! Branch records.
//!
//! An unordered pair of bus names plus an ordered `parallel_id -> element`
//! map, following the `AdmittanceBranch { y, port, v_base }` shape
//! (`basic/system/system.rs`) but keeping the raw `Line`/`Transformer`
//! element (rather than a pre-reduced admittance) so that event application
//! (opening one side, metal short-circuiting one element) can mutate it in
//! place.

use crate::elements::line::Line;
use crate::elements::transformer::Transformer;
use crate::error::{DomainError, DomainResult, InputValidationError};

#[derive(Debug, Clone)]
pub enum BranchElement {
    Line(Line),
    Transformer(Transformer),
}

impl BranchElement {
    pub fn is_closed(&self) -> bool {
        match self {
            BranchElement::Line(l) => l.is_closed(),
            BranchElement::Transformer(t) => t.is_closed(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub first_bus: String,
    pub second_bus: String,
    elements: Vec<(i64, BranchElement)>,
}

impl Branch {
    pub fn new(first_bus: impl Into<String>, second_bus: impl Into<String>) -> Self {
        Self { first_bus: first_bus.into(), second_bus: second_bus.into(), elements: Vec::new() }
    }

    pub fn insert(&mut self, parallel_id: i64, element: BranchElement) {
        self.elements.push((parallel_id, element));
    }

    pub fn element(&self, parallel_id: i64) -> DomainResult<&BranchElement> {
        self.elements
            .iter()
            .find(|(id, _)| *id == parallel_id)
            .map(|(_, e)| e)
            .ok_or_else(|| {
                DomainError::InputValidation(InputValidationError::UnknownParallelId {
                    branch: (self.first_bus.clone(), self.second_bus.clone()),
                    parallel_id,
                })
            })
    }

    pub fn element_mut(&mut self, parallel_id: i64) -> DomainResult<&mut BranchElement> {
        let first = self.first_bus.clone();
        let second = self.second_bus.clone();
        self.elements
            .iter_mut()
            .find(|(id, _)| *id == parallel_id)
            .map(|(_, e)| e)
            .ok_or(DomainError::InputValidation(InputValidationError::UnknownParallelId {
                branch: (first, second),
                parallel_id,
            }))
    }

    pub fn elements(&self) -> impl Iterator<Item = &BranchElement> {
        self.elements.iter().map(|(_, e)| e)
    }

    /// A branch is closed iff at least one element is closed at both ends.
    pub fn is_closed(&self) -> bool {
        self.elements.iter().any(|(_, e)| e.is_closed())
    }

    pub fn connects(&self, bus_name: &str) -> bool {
        self.first_bus == bus_name || self.second_bus == bus_name
    }

    /// The bus at the other end of this branch from `bus_name`, if it
    /// connects to it.
    pub fn other_end(&self, bus_name: &str) -> Option<&str> {
        if self.first_bus == bus_name {
            Some(&self.second_bus)
        } else if self.second_bus == bus_name {
            Some(&self.first_bus)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_iff_any_element_closed_at_both_ends() {
        let mut branch = Branch::new("A", "B");
        let mut l1 = Line::new("L1", 0.01, 0.1, 0.0, 0.0);
        l1.closed_at_second_bus = false;
        branch.insert(1, BranchElement::Line(l1));
        assert!(!branch.is_closed());

        let l2 = Line::new("L2", 0.01, 0.1, 0.0, 0.0);
        branch.insert(2, BranchElement::Line(l2));
        assert!(branch.is_closed());
    }

    #[test]
    fn unknown_parallel_id_is_an_error() {
        let branch = Branch::new("A", "B");
        assert!(branch.element(99).is_err());
    }
}
