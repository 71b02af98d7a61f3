use serde::{Deserialize, Serialize};

use crate::Error;

/// Parameters determining the elastic behaviour of a solid.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElasticityParameters {
    /// First Lame parameter. Measured in Pa = N/m² = kg/(ms²).
    pub lambda: f64,
    /// Second Lame parameter. Measured in Pa = N/m² = kg/(ms²).
    pub mu: f64,
}

impl ElasticityParameters {
    /// Bulk modulus measures the material's resistance to expansion and compression, i.e. its
    /// incompressibility. The larger the value, the more incompressible the material is.
    /// Shear modulus measures the material's resistance to shear deformation. The larger the
    /// value, the more it resists changes in shape.
    pub fn from_bulk_shear(bulk: f64, shear: f64) -> Self {
        ElasticityParameters {
            lambda: bulk - 2.0 * shear / 3.0,
            mu: shear,
        }
    }

    /// Lame parameters for plane strain (and 3D) from Young's modulus and Poisson ratio.
    pub fn from_young_poisson(young: f64, poisson: f64) -> Self {
        ElasticityParameters {
            lambda: young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson)),
            mu: young / (2.0 * (1.0 + poisson)),
        }
    }

    /// Lame parameters for plane stress from Young's modulus and Poisson ratio.
    ///
    /// The first parameter is the plane strain one condensed over the out of plane
    /// direction: `2μλ/(λ + 2μ)`.
    pub fn from_young_poisson_plane_stress(young: f64, poisson: f64) -> Self {
        let ElasticityParameters { lambda, mu } = Self::from_young_poisson(young, poisson);
        ElasticityParameters {
            lambda: 2.0 * mu * lambda / (lambda + 2.0 * mu),
            mu,
        }
    }

    /// Cauchy stress for the given displacement gradient `grad[(i, j)] = ∂uᵢ/∂xⱼ`.
    pub fn stress(&self, grad: &na::Matrix2<f64>) -> na::Matrix2<f64> {
        let strain = (grad + grad.transpose()) * 0.5;
        na::Matrix2::identity() * (self.lambda * strain.trace()) + strain * (2.0 * self.mu)
    }
}

/// Physical parameters as given in a problem description.
///
/// Missing values are reported when the parameters are converted into a [`Material`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalParameters {
    /// Young's modulus `E`.
    pub youngs_modulus: Option<f64>,
    /// Poisson ratio `ν`.
    pub poisson_ratio: Option<f64>,
    /// Use plane strain if `true`, plane stress otherwise.
    #[serde(default = "default_plane_strain")]
    pub plane_strain: bool,
}

fn default_plane_strain() -> bool {
    true
}

impl Default for PhysicalParameters {
    fn default() -> Self {
        PhysicalParameters {
            youngs_modulus: None,
            poisson_ratio: None,
            plane_strain: true,
        }
    }
}

impl PhysicalParameters {
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Self {
        PhysicalParameters {
            youngs_modulus: Some(youngs_modulus),
            poisson_ratio: Some(poisson_ratio),
            plane_strain: true,
        }
    }

    pub fn with_plane_strain(self, plane_strain: bool) -> Self {
        PhysicalParameters {
            plane_strain,
            ..self
        }
    }

    /// Validates the parameters and produces the material used by the solver.
    pub fn material(&self) -> Result<Material, Error> {
        let young = self.youngs_modulus.ok_or_else(|| Error::MissingParameter {
            name: "youngs_modulus".to_string(),
        })?;
        let poisson = self.poisson_ratio.ok_or_else(|| Error::MissingParameter {
            name: "poisson_ratio".to_string(),
        })?;
        if !(young.is_finite() && young > 0.0) {
            return Err(Error::InvalidParameter {
                name: "youngs_modulus".to_string(),
            });
        }
        if !(poisson > -1.0 && poisson < 0.5) {
            return Err(Error::InvalidParameter {
                name: "poisson_ratio".to_string(),
            });
        }
        let elasticity = if self.plane_strain {
            ElasticityParameters::from_young_poisson(young, poisson)
        } else {
            ElasticityParameters::from_young_poisson_plane_stress(young, poisson)
        };
        Ok(Material {
            youngs_modulus: young,
            elasticity,
        })
    }
}

/// Validated material used throughout assembly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Material {
    /// Young's modulus, which scales the Nitsche penalty.
    pub youngs_modulus: f64,
    pub elasticity: ElasticityParameters,
}

/// Nitsche parameters as given in a problem description.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NitscheParameters {
    /// Penalty parameter, scaled by Young's modulus during assembly.
    pub gamma: Option<f64>,
    /// Symmetry parameter: `1` symmetric, `0` penalty-like, `-1` skew-symmetric.
    pub theta: Option<f64>,
}

impl NitscheParameters {
    pub fn new(gamma: f64, theta: f64) -> Self {
        NitscheParameters {
            gamma: Some(gamma),
            theta: Some(theta),
        }
    }

    pub fn validate(&self) -> Result<Nitsche, Error> {
        let gamma = self.gamma.ok_or_else(|| Error::MissingParameter {
            name: "gamma".to_string(),
        })?;
        let theta = self.theta.ok_or_else(|| Error::MissingParameter {
            name: "theta".to_string(),
        })?;
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "gamma".to_string(),
            });
        }
        if ![-1.0, 0.0, 1.0].contains(&theta) {
            return Err(Error::InvalidParameter {
                name: "theta".to_string(),
            });
        }
        Ok(Nitsche { gamma, theta })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Nitsche {
    pub gamma: f64,
    pub theta: f64,
}

impl Nitsche {
    /// Kernel constants `[γE, θ]`.
    pub fn constants(&self, material: &Material) -> [f64; 2] {
        [self.gamma * material.youngs_modulus, self.theta]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lame_parameters() {
        let strain = ElasticityParameters::from_young_poisson(1e3, 0.25);
        assert_relative_eq!(strain.mu, 400.0);
        assert_relative_eq!(strain.lambda, 400.0);

        let stress = ElasticityParameters::from_young_poisson_plane_stress(1e3, 0.25);
        assert_relative_eq!(stress.mu, 400.0);
        assert_relative_eq!(stress.lambda, 1e3 * 0.25 / (1.0 - 0.25 * 0.25));

        let bs = ElasticityParameters::from_bulk_shear(
            strain.lambda + 2.0 * strain.mu / 3.0,
            strain.mu,
        );
        assert_relative_eq!(bs.lambda, strain.lambda, max_relative = 1e-12);
    }

    #[test]
    fn missing_physical_parameters() {
        let params = PhysicalParameters {
            youngs_modulus: Some(1.0),
            ..Default::default()
        };
        match params.material() {
            Err(Error::MissingParameter { name }) => assert_eq!(name, "poisson_ratio"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(NitscheParameters::default().validate().is_err());
        assert!(NitscheParameters::new(10.0, 0.5).validate().is_err());
        assert!(NitscheParameters::new(10.0, -1.0).validate().is_ok());
    }

    #[test]
    fn uniaxial_stress() {
        let params = ElasticityParameters { lambda: 2.0, mu: 3.0 };
        let grad = na::Matrix2::new(0.1, 0.0, 0.0, 0.0);
        let s = params.stress(&grad);
        assert_relative_eq!(s[(0, 0)], 2.0 * 0.1 + 6.0 * 0.1);
        assert_relative_eq!(s[(1, 1)], 0.2);
        assert_relative_eq!(s[(0, 1)], 0.0);
    }
}
