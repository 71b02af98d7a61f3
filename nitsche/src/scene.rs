//! A serializable description of a complete contact problem.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contact::ContactPair;
use crate::fem::nl::linsolve::LinearSolverOptions;
use crate::fem::nl::NewtonOptions;
use crate::fem::{self, DirichletCondition, Solution};
use crate::material::{NitscheParameters, PhysicalParameters};
use crate::mesh::builder::{self, TwoBlocks};
use crate::mesh::{Mesh, MeshTags};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("IO Error")]
    IO(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Deserialize(#[from] ron::error::SpannedError),
    #[error("Failed to write configuration: {0}")]
    Serialize(#[from] ron::Error),
    #[error("Solver error")]
    Solver(#[from] crate::Error),
}

fn default_quadrature_degree() -> u32 {
    3
}

/// Two blocks pressed into each other through displacements of their outer sides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub geometry: TwoBlocks,
    pub physical: PhysicalParameters,
    pub nitsche: NitscheParameters,
    pub contact: Vec<ContactPair>,
    #[serde(default)]
    pub dirichlet: Vec<DirichletCondition>,
    #[serde(default = "default_quadrature_degree")]
    pub quadrature_degree: u32,
    #[serde(default)]
    pub newton: NewtonOptions,
    #[serde(default)]
    pub linear_solver: LinearSolverOptions,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig::two_blocks(TwoBlocks::default(), 0.01)
    }
}

impl SceneConfig {
    /// Blocks compressed by moving each outer side by `displacement` towards the other
    /// block, with unbiased contact between the inner sides.
    pub fn two_blocks(geometry: TwoBlocks, displacement: f64) -> Self {
        SceneConfig {
            geometry,
            physical: PhysicalParameters::new(1e3, 0.1),
            nitsche: NitscheParameters::new(10.0, 1.0),
            contact: vec![ContactPair::unbiased(
                builder::LOWER_CONTACT,
                builder::UPPER_CONTACT,
            )],
            dirichlet: vec![
                DirichletCondition {
                    tag: builder::LOWER_DIRICHLET,
                    displacement: [0.0, displacement],
                },
                DirichletCondition {
                    tag: builder::UPPER_DIRICHLET,
                    displacement: [0.0, -displacement],
                },
            ],
            quadrature_degree: default_quadrature_degree(),
            newton: NewtonOptions::default(),
            linear_solver: LinearSolverOptions::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let f = std::fs::File::open(path)?;
        Ok(ron::de::from_reader(f)?)
    }

    pub fn from_ron_str(s: &str) -> Result<Self, SceneError> {
        Ok(ron::de::from_str(s)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let f = std::fs::File::create(path)?;
        ron::ser::to_writer_pretty(f, self, ron::ser::PrettyConfig::new())?;
        Ok(())
    }

    pub fn write_as_ron<W: std::io::Write>(&self, w: W) -> Result<(), SceneError> {
        ron::ser::to_writer_pretty(w, self, ron::ser::PrettyConfig::new())?;
        Ok(())
    }

    pub fn build_mesh(&self) -> Result<(Mesh, MeshTags), SceneError> {
        Ok(self.geometry.build()?)
    }

    /// Solves the configured problem from a zero initial guess.
    pub fn run(&self) -> Result<Solution, SceneError> {
        let (mesh, tags) = self.build_mesh()?;
        self.run_on(&mesh, &tags)
    }

    /// Solves the configured problem on a mesh built beforehand with [`build_mesh`].
    ///
    /// [`build_mesh`]: SceneConfig::build_mesh
    pub fn run_on(&self, mesh: &Mesh, tags: &MeshTags) -> Result<Solution, SceneError> {
        Ok(fem::solve(
            mesh,
            tags,
            &self.contact,
            &self.physical,
            &self.nitsche,
            &self.dirichlet,
            self.quadrature_degree,
            &self.newton,
            &self.linear_solver,
            None,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ron_round_trip() {
        let mut config = SceneConfig::default();
        config.newton.max_it = Some(7);
        config
            .linear_solver
            .insert("ksp_type".to_string(), "bicgstab".to_string());
        let mut buf = Vec::new();
        config.write_as_ron(&mut buf).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert_eq!(SceneConfig::from_ron_str(&s).unwrap(), config);
    }

    #[test]
    fn optional_fields_take_defaults() {
        let s = r#"(
            geometry: (width: 1.0, height: 0.5, gap: 0.0, divisions: (4, 2)),
            physical: (youngs_modulus: Some(1000.0), poisson_ratio: Some(0.3)),
            nitsche: (gamma: Some(10.0), theta: Some(1.0)),
            contact: [(surface: 2, opposite: 3)],
        )"#;
        let config = SceneConfig::from_ron_str(s).unwrap();
        assert_eq!(config.quadrature_degree, 3);
        assert!(config.dirichlet.is_empty());
        assert_eq!(config.newton, NewtonOptions::default());
        assert!(config.physical.plane_strain);
        let pair = &config.contact[0];
        assert!(pair.two_sided);
        assert_eq!(pair.gap, crate::GapModel::Variable);
    }

    #[test]
    fn parse_errors_are_reported() {
        assert!(matches!(
            SceneConfig::from_ron_str("(geometry: 3)"),
            Err(SceneError::Deserialize(_))
        ));
    }
}
