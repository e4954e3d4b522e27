use serde::{Deserialize, Serialize};

use crate::fem::dof_map::DofMap;
use crate::linalg::check_size;
use crate::Error;

/// Complete solution state at the end of a time step.
///
/// The state is a plain value: checkpoints store it as is and a restore replaces it wholesale.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    /// Number of completed steps.
    pub step: u64,
    pub time: f64,
    /// Displacement.
    pub u: Vec<f64>,
    /// Velocity.
    pub v: Vec<f64>,
    /// Acceleration.
    pub a: Vec<f64>,
}

impl State {
    /// Resting state at time zero.
    pub fn zeros(num_dofs: usize) -> Self {
        State {
            step: 0,
            time: 0.0,
            u: vec![0.0; num_dofs],
            v: vec![0.0; num_dofs],
            a: vec![0.0; num_dofs],
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.u.len()
    }

    /// Checks that all three vectors have `num_dofs` entries.
    pub fn check_size(&self, num_dofs: usize) -> Result<(), Error> {
        check_size(num_dofs, self.u.len())?;
        check_size(num_dofs, self.v.len())?;
        check_size(num_dofs, self.a.len())
    }

    /// Displacement of the given node.
    pub fn displacement(&self, node: usize) -> [f64; 3] {
        [
            self.u[DofMap::dof(node, 0)],
            self.u[DofMap::dof(node, 1)],
            self.u[DofMap::dof(node, 2)],
        ]
    }

    /// Displacements of the first `num_nodes` nodes.
    pub fn displacements(&self, num_nodes: usize) -> Vec<[f64; 3]> {
        (0..num_nodes).map(|node| self.displacement(node)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_displacements() {
        let mut state = State::zeros(6);
        state.u = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(state.displacement(1), [4.0, 5.0, 6.0]);
        assert_eq!(state.displacements(2).len(), 2);
        assert!(state.check_size(6).is_ok());
        state.a.pop();
        assert!(matches!(
            state.check_size(6),
            Err(Error::SizeMismatch {
                expected: 6,
                actual: 5
            })
        ));
    }
}
