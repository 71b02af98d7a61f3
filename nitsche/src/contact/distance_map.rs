use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mesh::{outward_normal, Mesh, Point, SurfaceMesh, GDIM};
use crate::quadrature::FacetQuadrature;
use crate::{Error, Index};

/// Tolerance on the parametric coordinate of a ray hit.
const RAY_HIT_TOL: f64 = 1e-12;

/// Strategy for finding the opposing point of a surface quadrature point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Closest point on the opposing deformed surface. The contact normal is the outward
    /// normal of the opposing facet.
    ClosestPoint,
    /// First hit of a ray cast along the deformed outward normal. The contact normal is
    /// the flipped outward normal of the own facet.
    Raytracing,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::ClosestPoint
    }
}

/// The fixed line `{y : n·y = offset}` bounding a rigid obstacle, with the normal `n`
/// pointing out of the obstacle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidPlane {
    pub normal: [f64; 2],
    pub offset: f64,
}

impl RigidPlane {
    /// The line `y = height` with the obstacle below it.
    pub fn horizontal(height: f64) -> Self {
        RigidPlane {
            normal: [0.0, 1.0],
            offset: height,
        }
    }

    /// The same plane described with a unit normal.
    pub fn normalized(&self) -> Result<RigidPlane, Error> {
        let len = Point::from(self.normal).norm();
        if !(len > 0.0 && len.is_finite() && self.offset.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "plane".to_string(),
            });
        }
        Ok(RigidPlane {
            normal: [self.normal[0] / len, self.normal[1] / len],
            offset: self.offset / len,
        })
    }

    #[inline]
    pub fn unit_normal(&self) -> Point {
        Point::from(self.normal)
    }

    /// Signed distance of `x` from a normalized plane, negative inside the obstacle.
    #[inline]
    pub fn distance(&self, x: &Point) -> f64 {
        self.unit_normal().dot(x) - self.offset
    }

    /// Displacement translating all of `mesh` along the plane normal such that the deepest
    /// vertex of the boundary `facets` lies `depth` inside the obstacle.
    pub fn initial_guess(&self, mesh: &Mesh, facets: &[usize], depth: f64) -> Result<Vec<f64>, Error> {
        let plane = self.normalized()?;
        let mut u = vec![0.0; mesh.num_dofs()];
        let closest = facets
            .iter()
            .flat_map(|&f| mesh.facet_points(f))
            .map(|x| plane.distance(&x))
            .fold(f64::INFINITY, f64::min);
        if !closest.is_finite() {
            return Ok(u);
        }
        let shift = plane.unit_normal() * -(closest + depth);
        for uv in u.chunks_exact_mut(GDIM) {
            uv.copy_from_slice(shift.as_slice());
        }
        Ok(u)
    }
}

/// The opposing point of a single quadrature point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Correspondence {
    /// Facet of the opposing surface mesh, invalid if no opposing point was found.
    pub facet: Index,
    /// Parametric coordinate of the opposing point on `facet`.
    pub xi: f64,
    /// Deformed position of the quadrature point.
    pub point: Point,
    /// Deformed position of the opposing point.
    pub opposite_point: Point,
    /// Contact normal.
    pub normal: Point,
    /// `true` if the opposing point is an orthogonal projection onto the interior of
    /// `facet`, in which case it moves smoothly with the opposing facet.
    pub projected: bool,
}

impl Correspondence {
    /// Marker for a quadrature point without an opposing point.
    pub fn none() -> Correspondence {
        Correspondence {
            facet: Index::INVALID,
            xi: 0.0,
            point: Point::zeros(),
            opposite_point: Point::zeros(),
            normal: Point::zeros(),
            projected: false,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.facet.is_valid()
    }

    /// Gap vector from the quadrature point to its opposing point.
    #[inline]
    pub fn gap(&self) -> Point {
        self.opposite_point - self.point
    }

    /// Signed normal gap, negative when the surfaces interpenetrate.
    #[inline]
    pub fn normal_gap(&self) -> f64 {
        -self.gap().dot(&self.normal)
    }
}

/// Per quadrature point correspondences of one surface onto an opposing surface.
///
/// The map remembers the displacement generation it was built for, so consumers can
/// detect when it is out of date.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMap {
    num_points: usize,
    correspondences: Vec<Correspondence>,
    search: SearchMode,
    generation: Option<u64>,
}

impl DistanceMap {
    pub fn new(num_facets: usize, num_points: usize) -> DistanceMap {
        DistanceMap {
            num_points,
            correspondences: vec![Correspondence::none(); num_facets * num_points],
            search: SearchMode::ClosestPoint,
            generation: None,
        }
    }

    /// Search used for the last update.
    #[inline]
    pub fn search_mode(&self) -> SearchMode {
        self.search
    }

    /// Generation of the displacement this map was built from, `None` if never built.
    #[inline]
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    #[inline]
    pub fn get(&self, facet: usize, point: usize) -> &Correspondence {
        &self.correspondences[facet * self.num_points + point]
    }

    pub fn facet(&self, facet: usize) -> &[Correspondence] {
        &self.correspondences[facet * self.num_points..(facet + 1) * self.num_points]
    }

    pub fn correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    pub fn num_invalid(&self) -> usize {
        self.correspondences.iter().filter(|c| !c.is_valid()).count()
    }

    /// Rebuilds all correspondences between the current deformed configurations of `own`
    /// and `opposite`.
    ///
    /// Points farther than `radius` from any opposing point are marked invalid. Returns the
    /// number of invalid points.
    pub fn update(
        &mut self,
        own: &SurfaceMesh,
        opposite: &SurfaceMesh,
        quadrature: &FacetQuadrature,
        mode: SearchMode,
        radius: f64,
        generation: u64,
    ) -> usize {
        let nq = quadrature.num_points();
        debug_assert_eq!(nq, self.num_points);
        (0..own.num_facets() * nq)
            .into_par_iter()
            .map(|i| {
                let [a, b] = own.deformed_facet(i / nq);
                let s = quadrature.points[i % nq];
                let x = a + (b - a) * s;
                match mode {
                    SearchMode::ClosestPoint => closest_point(&x, opposite, radius),
                    SearchMode::Raytracing => {
                        raytrace(&x, &outward_normal(&a, &b), opposite, radius)
                    }
                }
            })
            .collect_into_vec(&mut self.correspondences);
        self.search = mode;
        self.generation = Some(generation);
        self.num_invalid()
    }

    /// Rebuilds all correspondences of the deformed `own` surface onto a rigid `plane` by
    /// orthogonal projection.
    ///
    /// Points inside the obstacle are always valid. Points farther than `radius` outside
    /// of it are marked invalid. Returns the number of invalid points.
    pub fn update_plane(
        &mut self,
        own: &SurfaceMesh,
        plane: &RigidPlane,
        quadrature: &FacetQuadrature,
        radius: f64,
        generation: u64,
    ) -> usize {
        let nq = quadrature.num_points();
        debug_assert_eq!(nq, self.num_points);
        let n = plane.unit_normal();
        (0..own.num_facets() * nq)
            .into_par_iter()
            .map(|i| {
                let [a, b] = own.deformed_facet(i / nq);
                let x = a + (b - a) * quadrature.points[i % nq];
                let dist = plane.distance(&x);
                if dist >= radius {
                    return Correspondence::none();
                }
                Correspondence {
                    facet: Index::new(0),
                    xi: 0.0,
                    point: x,
                    opposite_point: x - n * dist,
                    normal: n,
                    projected: false,
                }
            })
            .collect_into_vec(&mut self.correspondences);
        self.search = SearchMode::ClosestPoint;
        self.generation = Some(generation);
        self.num_invalid()
    }
}

/// Exhaustive closest point search over the deformed opposing facets.
fn closest_point(x: &Point, opposite: &SurfaceMesh, radius: f64) -> Correspondence {
    let mut best = Correspondence::none();
    let mut best_dist = radius;
    for f in 0..opposite.num_facets() {
        let [c, d] = opposite.deformed_facet(f);
        let e = d - c;
        let len_sq = e.norm_squared();
        if len_sq <= 0.0 {
            continue;
        }
        let t = (x - c).dot(&e) / len_sq;
        let xi = t.clamp(0.0, 1.0);
        let y = c + e * xi;
        let dist = (x - y).norm();
        if dist < best_dist || (dist == best_dist && !best.is_valid()) {
            best_dist = dist;
            best = Correspondence {
                facet: Index::new(f),
                xi,
                point: *x,
                opposite_point: y,
                normal: outward_normal(&c, &d),
                projected: t > 0.0 && t < 1.0,
            };
        }
    }
    best
}

/// Nearest intersection of the line through `x` along `n` with the deformed opposing
/// facets, in either direction.
fn raytrace(x: &Point, n: &Point, opposite: &SurfaceMesh, radius: f64) -> Correspondence {
    let mut best = Correspondence::none();
    let mut best_dist = radius;
    for f in 0..opposite.num_facets() {
        let [c, d] = opposite.deformed_facet(f);
        let e = d - c;
        // Solve x + s n = c + t e.
        let det = e.x * n.y - n.x * e.y;
        if det.abs() <= f64::EPSILON * e.norm() {
            continue;
        }
        let r = c - x;
        let s = (e.x * r.y - r.x * e.y) / det;
        let t = (n.x * r.y - n.y * r.x) / det;
        if !(-RAY_HIT_TOL..=1.0 + RAY_HIT_TOL).contains(&t) {
            continue;
        }
        if s.abs() < best_dist || (s.abs() == best_dist && !best.is_valid()) {
            best_dist = s.abs();
            best = Correspondence {
                facet: Index::new(f),
                xi: t.clamp(0.0, 1.0),
                point: *x,
                opposite_point: x + n * s,
                normal: -n,
                projected: false,
            };
        }
    }
    best
}

type Jacobian = na::SMatrix<f64, 2, 8>;
type Gradient = na::SVector<f64, 8>;
type Hessian = na::SMatrix<f64, 8, 8>;

/// Normal gap of a ray hit with its first and second derivatives.
///
/// The ray starts at `x = a + s (b - a)` on the facet `(a, b)` and follows its outward
/// normal to the line through `c` and `d`. Derivatives are taken with respect to the
/// stacked coordinates `[a, b, c, d]`, so they account for both the moving hit point and
/// the rotation of the ray direction with the own facet.
#[derive(Clone, Debug, PartialEq)]
pub struct RayGap {
    pub gap: f64,
    pub gradient: Gradient,
    pub hessian: Hessian,
}

/// Jacobian of `Σ wₖ zₖ` with respect to the stacked points `z`.
fn linear_jacobian(w: [f64; 4]) -> Jacobian {
    let mut jac = Jacobian::zeros();
    for (k, &wk) in w.iter().enumerate() {
        jac[(0, 2 * k)] = wk;
        jac[(1, 2 * k + 1)] = wk;
    }
    jac
}

/// `p × q` for points `p`, `q` depending linearly on the stacked coordinates, with its
/// gradient and Hessian.
fn cross(p: &Point, dp: &Jacobian, q: &Point, dq: &Jacobian) -> (f64, Gradient, Hessian) {
    let rot = na::Matrix2::new(0.0, 1.0, -1.0, 0.0);
    let value = p.x * q.y - p.y * q.x;
    let gradient = dp.transpose() * (rot * q) + dq.transpose() * (rot.transpose() * p);
    let hessian = dp.transpose() * rot * dq;
    (value, gradient, hessian + hessian.transpose())
}

impl RayGap {
    /// Returns `None` for a degenerate own facet or a ray parallel to the line.
    pub fn new(s: f64, [a, b, c, d]: [Point; 4]) -> Option<RayGap> {
        let t = b - a;
        let e = d - c;
        let len = t.norm();
        let x = a + t * s;
        // Outward normal scaled by the facet length.
        let w = Point::new(t.y, -t.x);

        let dt = linear_jacobian([-1.0, 1.0, 0.0, 0.0]);
        let de = linear_jacobian([0.0, 0.0, -1.0, 1.0]);
        let dr = linear_jacobian([s - 1.0, -s, 1.0, 0.0]);
        let dw = na::Matrix2::new(0.0, 1.0, -1.0, 0.0) * dt;

        let (den, dden, d2den) = cross(&e, &de, &w, &dw);
        if len <= 0.0 || den.abs() <= f64::EPSILON * len * e.norm() {
            return None;
        }
        let (num, dnum, d2num) = cross(&e, &de, &(c - x), &dr);

        // Distance along the unit normal is len * num / den.
        let q = num / den;
        let dq = (dnum - dden * q) / den;
        let d2q = (d2num - dq * dden.transpose() - dden * dq.transpose() - d2den * q) / den;

        let tn = t / len;
        let dlen = dt.transpose() * tn;
        let d2len = dt.transpose() * (na::Matrix2::identity() - tn * tn.transpose()) * dt / len;

        Some(RayGap {
            gap: len * q,
            gradient: dlen * q + dq * len,
            hessian: d2len * q + dlen * dq.transpose() + dq * dlen.transpose() + d2q * len,
        })
    }
}
