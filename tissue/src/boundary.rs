//! Boundary condition sets.
//!
//! Conditions are attached to boundary face tags. Point constraints and point forces read from a
//! boundary data file are resolved against mesh vertices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::mesh::{Mesh, MeshError};

/// Direction in which a positive Neumann pressure acts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// Force follows the outward normal.
    Outward,
    /// Force follows the inward normal.
    Inward,
}

impl Default for Polarity {
    fn default() -> Self {
        Polarity::Outward
    }
}

impl Polarity {
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Outward => 1.0,
            Polarity::Inward => -1.0,
        }
    }
}

/// Condition attached to a boundary tag.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Prescribed displacement of every node on the tagged faces.
    Dirichlet { displacement: [f64; 3] },
    /// Pressure load on the tagged faces.
    Neumann { pressure: f64, polarity: Polarity },
}

/// Displacement prescribed at a single mesh vertex.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointConstraint {
    pub node: usize,
    pub displacement: [f64; 3],
}

/// Force applied at a single mesh vertex.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointForce {
    pub node: usize,
    pub force: [f64; 3],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundaryConditions {
    tags: BTreeMap<i32, Constraint>,
    point_constraints: Vec<PointConstraint>,
    point_forces: Vec<PointForce>,
}

impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, tag: i32, constraint: Constraint) -> Result<&mut Self, ConfigError> {
        if let Some(existing) = self.tags.get(&tag) {
            if std::mem::discriminant(existing) != std::mem::discriminant(&constraint) {
                return Err(ConfigError::ConflictingTag { tag });
            }
            log::warn!("Boundary tag {} is specified twice; using the last value", tag);
        }
        self.tags.insert(tag, constraint);
        Ok(self)
    }

    pub fn add_dirichlet(
        &mut self,
        tag: i32,
        displacement: [f64; 3],
    ) -> Result<&mut Self, ConfigError> {
        self.insert(tag, Constraint::Dirichlet { displacement })
    }

    pub fn add_neumann(
        &mut self,
        tag: i32,
        pressure: f64,
        polarity: Polarity,
    ) -> Result<&mut Self, ConfigError> {
        self.insert(tag, Constraint::Neumann { pressure, polarity })
    }

    pub fn add_point_constraint(&mut self, node: usize, displacement: [f64; 3]) -> &mut Self {
        self.point_constraints.push(PointConstraint { node, displacement });
        self
    }

    pub fn add_point_force(&mut self, node: usize, force: [f64; 3]) -> &mut Self {
        self.point_forces.push(PointForce { node, force });
        self
    }

    pub fn get(&self, tag: i32) -> Option<&Constraint> {
        self.tags.get(&tag)
    }

    /// Tagged conditions in increasing tag order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Constraint)> {
        self.tags.iter().map(|(&tag, c)| (tag, c))
    }

    pub fn point_constraints(&self) -> &[PointConstraint] {
        &self.point_constraints
    }

    pub fn point_forces(&self) -> &[PointForce] {
        &self.point_forces
    }

    /// Returns `true` if no displacement is prescribed anywhere.
    pub fn is_unconstrained(&self) -> bool {
        self.point_constraints.is_empty()
            && !self
                .tags
                .values()
                .any(|c| matches!(c, Constraint::Dirichlet { .. }))
    }

    /// Checks that every tag is carried by the mesh and every point refers to a vertex.
    pub fn validate(&self, mesh: &Mesh) -> Result<(), MeshError> {
        for &tag in self.tags.keys() {
            if !mesh.has_tag(tag) {
                return Err(MeshError::UnknownTag { tag });
            }
        }
        let num_nodes = mesh.num_nodes();
        let nodes = self
            .point_constraints
            .iter()
            .map(|p| p.node)
            .chain(self.point_forces.iter().map(|p| p.node));
        for (index, node) in nodes.enumerate() {
            if node >= num_nodes {
                return Err(MeshError::NodeOutOfRange {
                    entity: "point condition",
                    index,
                    node,
                    num_nodes,
                });
            }
        }
        Ok(())
    }

    /// Resolves the point blocks of a boundary data file against the vertices of `mesh`.
    ///
    /// Each point snaps to the nearest vertex within `tolerance`.
    pub fn add_bc_data(
        &mut self,
        data: &BcData,
        mesh: &Mesh,
        tolerance: f64,
    ) -> Result<&mut Self, Error> {
        for (point, value) in data.constrained_points() {
            let node = mesh.nearest_node(vector3(point)?, tolerance)?;
            self.add_point_constraint(node, vector3(value)?);
        }
        if let Some(block) = &data.force_or_pressure {
            for (point, value) in block.points.iter().zip(block.values.iter()) {
                let node = mesh.nearest_node(vector3(point)?, tolerance)?;
                self.add_point_force(node, vector3(value)?);
            }
        }
        log::debug!(
            "Boundary data: {} constrained points, {} force points",
            self.point_constraints.len(),
            self.point_forces.len()
        );
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Mesh(#[from] MeshError),
}

impl From<Error> for crate::Error {
    fn from(err: Error) -> crate::Error {
        match err {
            Error::Config(source) => source.into(),
            Error::Mesh(source) => source.into(),
        }
    }
}

fn vector3(v: &[f64]) -> Result<[f64; 3], ConfigError> {
    match *v {
        [x, y, z] => Ok([x, y, z]),
        _ => Err(ConfigError::Invalid {
            path: "bc_data".to_string(),
            message: format!("The vector {:?} does not have exactly 3 components", v),
        }),
    }
}

/// A block of points with one vector value per point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointBlock {
    /// Declared number of points.
    pub count: usize,
    pub points: Vec<Vec<f64>>,
    pub values: Vec<Vec<f64>>,
}

/// Contents of a boundary data file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BcData {
    /// Points held in place. Values are the (usually zero) displacements.
    pub fixed_constraints: Option<PointBlock>,
    /// Points moved by a prescribed displacement.
    pub displacement_constraints: Option<PointBlock>,
    /// Points loaded by a nodal force.
    pub force_or_pressure: Option<PointBlock>,
}

impl BcData {
    fn constrained_points(&self) -> impl Iterator<Item = (&Vec<f64>, &Vec<f64>)> {
        self.fixed_constraints
            .iter()
            .chain(self.displacement_constraints.iter())
            .flat_map(|b| b.points.iter().zip(b.values.iter()))
    }

    /// Named blocks in file order.
    pub fn blocks(&self) -> [(&'static str, Option<&PointBlock>); 3] {
        [
            ("fixed_constraints", self.fixed_constraints.as_ref()),
            (
                "displacement_constraints",
                self.displacement_constraints.as_ref(),
            ),
            ("force_or_pressure", self.force_or_pressure.as_ref()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn tag_kinds_are_exclusive() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_dirichlet(1, [0.0; 3]).unwrap();
        assert!(matches!(
            bcs.add_neumann(1, 10.0, Polarity::Outward),
            Err(ConfigError::ConflictingTag { tag: 1 })
        ));
        // Same kind overrides.
        bcs.add_dirichlet(1, [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(
            bcs.get(1),
            Some(&Constraint::Dirichlet {
                displacement: [1.0, 0.0, 0.0]
            })
        );
        assert!(!bcs.is_unconstrained());
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let mesh = make_unit_cube();
        let mut bcs = clamp_and_push(1.0);
        assert!(bcs.validate(&mesh).is_ok());
        bcs.add_neumann(999, 1.0, Polarity::Inward).unwrap();
        assert!(matches!(
            bcs.validate(&mesh),
            Err(MeshError::UnknownTag { tag: 999 })
        ));
    }

    #[test]
    fn bc_data_points_snap_to_vertices() {
        let mesh = make_unit_cube();
        let data = BcData {
            fixed_constraints: Some(PointBlock {
                count: 1,
                points: vec![vec![0.0, 0.0, 0.0]],
                values: vec![vec![0.0, 0.0, 0.0]],
            }),
            displacement_constraints: None,
            force_or_pressure: Some(PointBlock {
                count: 1,
                points: vec![vec![1.0, 1.0, 1.0 + 1e-9]],
                values: vec![vec![0.0, 0.0, -2.0]],
            }),
        };
        let mut bcs = BoundaryConditions::new();
        bcs.add_bc_data(&data, &mesh, 1e-6).unwrap();
        assert_eq!(
            bcs.point_constraints(),
            &[PointConstraint {
                node: 0,
                displacement: [0.0; 3]
            }]
        );
        assert_eq!(
            bcs.point_forces(),
            &[PointForce {
                node: 7,
                force: [0.0, 0.0, -2.0]
            }]
        );

        let far = BcData {
            displacement_constraints: Some(PointBlock {
                count: 1,
                points: vec![vec![0.5, 0.5, 0.5]],
                values: vec![vec![0.0, 0.0, 0.1]],
            }),
            ..Default::default()
        };
        assert!(matches!(
            BoundaryConditions::new().add_bc_data(&far, &mesh, 1e-6),
            Err(Error::Mesh(MeshError::PointNotFound { .. }))
        ));
    }
}
