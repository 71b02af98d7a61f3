//! Gauss-Legendre quadrature on facets.

use crate::Error;

/// Points and weights on `[-1, 1]` indexed by the number of points minus one.
const GAUSS_LEGENDRE: [&[(f64, f64)]; 5] = [
    &[(0.0, 2.0)],
    &[(-0.577_350_269_189_625_8, 1.0), (0.577_350_269_189_625_8, 1.0)],
    &[
        (-0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
        (0.0, 0.888_888_888_888_888_9),
        (0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
    ],
    &[
        (-0.861_136_311_594_052_6, 0.347_854_845_137_453_8),
        (-0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
        (0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
        (0.861_136_311_594_052_6, 0.347_854_845_137_453_8),
    ],
    &[
        (-0.906_179_845_938_664, 0.236_926_885_056_189_1),
        (-0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
        (0.0, 0.568_888_888_888_888_9),
        (0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
        (0.906_179_845_938_664, 0.236_926_885_056_189_1),
    ],
];

/// Quadrature rule on the reference facet `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct FacetQuadrature {
    /// Parametric coordinates of the points.
    pub points: Vec<f64>,
    /// Weights summing to one.
    pub weights: Vec<f64>,
    pub degree: u32,
}

impl FacetQuadrature {
    /// Gauss-Legendre rule integrating polynomials up to `degree` exactly.
    pub fn new(degree: u32) -> Result<FacetQuadrature, Error> {
        let n = degree as usize / 2 + 1;
        let rule = GAUSS_LEGENDRE
            .get(n - 1)
            .ok_or_else(|| Error::InvalidParameter {
                name: "quadrature_degree".to_string(),
            })?;
        let (points, weights) = rule.iter().map(|&(x, w)| (0.5 * (x + 1.0), 0.5 * w)).unzip();
        Ok(FacetQuadrature {
            points,
            weights,
            degree,
        })
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn polynomial_exactness() {
        for degree in 0..10u32 {
            let q = FacetQuadrature::new(degree).unwrap();
            assert_eq!(q.num_points(), degree as usize / 2 + 1);
            for p in 0..=degree as i32 {
                let integral: f64 = q
                    .points
                    .iter()
                    .zip(q.weights.iter())
                    .map(|(&s, &w)| w * s.powi(p))
                    .sum();
                assert_relative_eq!(integral, 1.0 / (p as f64 + 1.0), max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn unsupported_degree() {
        assert!(FacetQuadrature::new(10).is_err());
    }
}
