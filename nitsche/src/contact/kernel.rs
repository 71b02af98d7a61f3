//! Local contact integrals of the unbiased Nitsche formulation.
//!
//! For a quadrature point `x` on the own surface with opposing point `y`, the contact
//! pressure is `P = R₋(σₙ(u) + γₕ gₙ(u))` where `γₕ = γE/h`, `σₙ` is the normal stress
//! on the own side and `gₙ = -(y - x)·n` is the normal gap. The residual contribution is
//!
//! ```verbatim
//!     w/γₕ P (θ σₙ(v) + γₕ δgₙ[v])
//! ```
//!
//! and the Jacobian is its consistent derivative. With the variable gap, `δgₙ` itself
//! depends on the displacement through the opposing facet, which contributes the
//! second variation `w P δ²gₙ[du, v]`. For ray hits the gap also follows the rotation of
//! the own facet, so both variations come from [`RayGap`].

use serde::{Deserialize, Serialize};

use super::coefficients::{Block, CoefficientLayout};
use super::distance_map::{RayGap, SearchMode};
use crate::material::ElasticityParameters;
use crate::mesh::{Mesh, Point, GDIM};
use crate::quadrature::FacetQuadrature;
use crate::Index;

/// Dofs of the cell owning a contact facet.
pub const NUM_CELL_DOFS: usize = 3 * GDIM;
/// Dofs of an opposing facet.
pub const NUM_FACET_DOFS: usize = 2 * GDIM;
const NUM_ACTIVE: usize = NUM_CELL_DOFS + NUM_FACET_DOFS;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelType {
    Rhs,
    Jacobian,
}

/// How the normal gap depends on the displacement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapModel {
    /// The correspondence is found once in the reference configuration and the gap is
    /// linearized around it.
    Fixed,
    /// The correspondence is rebuilt on the deformed surfaces for every displacement.
    Variable,
}

impl Default for GapModel {
    fn default() -> Self {
        GapModel::Variable
    }
}

/// Negative part `min(x, 0)`.
#[inline]
pub fn r_minus(x: f64) -> f64 {
    0.5 * (x - x.abs())
}

/// Derivative of [`r_minus`].
#[inline]
pub fn dr_minus(x: f64) -> f64 {
    if x < 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Reference geometry of a contact facet and its owning cell.
#[derive(Clone, Debug, PartialEq)]
pub struct FacetGeometry {
    /// Reference outward unit normal.
    pub normal: Point,
    pub length: f64,
    /// Gradients of the owning cell basis functions.
    pub grads: [Point; 3],
    /// Local index of the facet in the owning cell.
    pub local: usize,
}

impl FacetGeometry {
    /// Geometry of boundary facet `f` of `mesh`.
    pub fn new(mesh: &Mesh, f: usize) -> Self {
        let facet = mesh.facet(f);
        FacetGeometry {
            normal: mesh.facet_normal(f),
            length: mesh.facet_length(f),
            grads: mesh.shape_gradients(facet.cell),
            local: facet.local,
        }
    }

    /// Values of the owning cell basis functions at facet coordinate `s`.
    #[inline]
    pub fn basis(&self, s: f64) -> [f64; 3] {
        let mut phi = [0.0; 3];
        phi[(self.local + 1) % 3] = 1.0 - s;
        phi[(self.local + 2) % 3] = s;
        phi
    }
}

/// Inputs of a single kernel evaluation.
#[derive(Copy, Clone, Debug)]
pub struct KernelData<'a> {
    /// One coefficient buffer row.
    pub coefficients: &'a [f64],
    /// Opposing facet per quadrature point.
    pub opposite_facets: &'a [Index],
    pub geometry: &'a FacetGeometry,
}

/// A local integral over a contact facet.
///
/// Local dofs are the dofs of the owning cell followed by the dofs of the opposing facet
/// of each quadrature point in turn.
pub trait Kernel {
    fn kernel_type(&self) -> KernelType;
    fn num_local_dofs(&self) -> usize;
    /// Adds the local vector (`Rhs`) or row-major local matrix (`Jacobian`) to `out`.
    fn evaluate(&self, data: &KernelData, out: &mut [f64]);
}

/// Everything needed at one quadrature point with a valid opposing point.
///
/// Per dof arrays are indexed by active dofs: the cell dofs followed by the dofs of the
/// opposing facet of this point.
struct PointTerms {
    /// Integration weight including the facet length and pair weight.
    weight: f64,
    gamma_h: f64,
    /// Argument of the negative part, `σₙ(u) + γₕ gₙ(u)`.
    pressure_arg: f64,
    gap: f64,
    /// `σₙ` of each basis function.
    sn: [f64; NUM_ACTIVE],
    /// First variation of the normal gap.
    dg: [f64; NUM_ACTIVE],
    /// Variation of the opposing facet edge projected onto the contact normal.
    nde: [f64; NUM_ACTIVE],
    /// Relative displacement projected onto the opposing tangent over the facet length.
    edxy: [f64; NUM_ACTIVE],
    inv_len: f64,
    /// Second variation of the gap of a ray hit, replacing the projection terms above.
    ray_hessian: Option<na::SMatrix<f64, NUM_ACTIVE, NUM_ACTIVE>>,
}

impl PointTerms {
    #[inline]
    fn d2g(&self, i: usize, j: usize) -> f64 {
        if let Some(hessian) = &self.ray_hessian {
            return hessian[(i, j)];
        }
        -self.nde[j] * self.edxy[i]
            - self.nde[i] * self.edxy[j]
            - self.gap * self.inv_len * self.inv_len * self.nde[i] * self.nde[j]
    }
}

/// Position of active dof `a` at quadrature point `q` among the local dofs.
#[inline]
fn local_dof(q: usize, a: usize) -> usize {
    if a < NUM_CELL_DOFS {
        a
    } else {
        NUM_CELL_DOFS + NUM_FACET_DOFS * q + (a - NUM_CELL_DOFS)
    }
}

/// Active dofs of the points `[a, b, c, d]` of a [`RayGap`], where `(a, b)` is the own
/// facet with local index `local` and `(c, d)` the opposing facet.
fn ray_dofs(local: usize) -> [usize; 4 * GDIM] {
    let vertex = [
        GDIM * ((local + 1) % 3),
        GDIM * ((local + 2) % 3),
        NUM_CELL_DOFS,
        NUM_CELL_DOFS + GDIM,
    ];
    let mut dofs = [0; 4 * GDIM];
    for (k, dof) in dofs.iter_mut().enumerate() {
        *dof = vertex[k / GDIM] + k % GDIM;
    }
    dofs
}

#[inline]
fn vec2(c: &[f64], offset: usize) -> Point {
    Point::new(c[offset], c[offset + 1])
}

/// Contact kernel for one side of an unbiased pair.
#[derive(Clone, Debug)]
pub struct NitscheKernel {
    kernel_type: KernelType,
    gap_model: GapModel,
    search: SearchMode,
    layout: CoefficientLayout,
    quadrature: FacetQuadrature,
    /// `[γE, θ]`
    constants: [f64; 2],
    /// Pair weight, `½` for two-sided pairs.
    weight: f64,
}

impl NitscheKernel {
    pub fn new(
        kernel_type: KernelType,
        gap_model: GapModel,
        layout: CoefficientLayout,
        quadrature: FacetQuadrature,
        constants: [f64; 2],
        weight: f64,
    ) -> Self {
        debug_assert_eq!(layout.num_points(), quadrature.num_points());
        NitscheKernel {
            kernel_type,
            gap_model,
            search: SearchMode::ClosestPoint,
            layout,
            quadrature,
            constants,
            weight,
        }
    }

    /// Kernel for correspondences found with `search`.
    pub fn with_search(self, search: SearchMode) -> Self {
        NitscheKernel { search, ..self }
    }

    pub fn gap_model(&self) -> GapModel {
        self.gap_model
    }

    /// Normal gap at quadrature point `q`.
    fn normal_gap(&self, c: &[f64], normal: &Point, q: usize) -> f64 {
        let l = &self.layout;
        let gap = vec2(c, l.at(Block::Gap, q));
        match self.gap_model {
            GapModel::Variable => -gap.dot(normal),
            GapModel::Fixed => {
                let u = vec2(c, l.at(Block::Displacement, q));
                let uy = vec2(c, l.at(Block::OppositeDisplacement, q));
                -gap.dot(normal) + normal.dot(&(u - uy))
            }
        }
    }

    fn point_terms(&self, data: &KernelData, q: usize) -> Option<PointTerms> {
        data.opposite_facets[q].into_option()?;
        let c = data.coefficients;
        let l = &self.layout;
        let geo = data.geometry;
        let n_x = &geo.normal;

        let mu = c[l.offset(Block::Material)];
        let lambda = c[l.offset(Block::Material) + 1];
        let gamma_h = self.constants[0] / c[l.offset(Block::CellSize)];

        let g = l.at(Block::DisplacementGradient, q);
        let grad = na::Matrix2::new(c[g], c[g + 1], c[g + 2], c[g + 3]);
        let sigma = ElasticityParameters { lambda, mu }.stress(&grad);
        let normal = vec2(c, l.at(Block::Normal, q));
        let gap = self.normal_gap(c, &normal, q);
        let pressure_arg = n_x.dot(&(sigma * n_x)) + gamma_h * gap;

        let phi = geo.basis(self.quadrature.points[q]);
        let tf = vec2(c, l.at(Block::TestFunctions, q));
        let sd = l.at(Block::SurfaceDerivative, q);
        let tangent = vec2(c, sd);

        let mut terms = PointTerms {
            weight: self.weight * self.quadrature.weights[q] * geo.length,
            gamma_h,
            pressure_arg,
            gap,
            sn: [0.0; NUM_ACTIVE],
            dg: [0.0; NUM_ACTIVE],
            nde: [0.0; NUM_ACTIVE],
            edxy: [0.0; NUM_ACTIVE],
            inv_len: c[sd + 2],
            ray_hessian: None,
        };

        for (k, grad_phi) in geo.grads.iter().enumerate() {
            let dn = grad_phi.dot(n_x);
            for comp in 0..GDIM {
                let i = GDIM * k + comp;
                terms.sn[i] = lambda * grad_phi[comp] + 2.0 * mu * n_x[comp] * dn;
                terms.dg[i] = phi[k] * normal[comp];
                terms.edxy[i] = phi[k] * tangent[comp];
            }
        }
        for m in 0..2 {
            let sign = if m == 0 { -1.0 } else { 1.0 };
            for comp in 0..GDIM {
                let i = NUM_CELL_DOFS + GDIM * m + comp;
                terms.dg[i] = -tf[m] * normal[comp];
                terms.edxy[i] = -tf[m] * tangent[comp];
                terms.nde[i] = sign * normal[comp];
            }
        }

        if self.gap_model == GapModel::Variable && self.search == SearchMode::Raytracing {
            let o = l.at(Block::RayFacets, q);
            let z = [0, 1, 2, 3].map(|k| vec2(c, o + GDIM * k));
            if let Some(ray) = RayGap::new(self.quadrature.points[q], z) {
                let dofs = ray_dofs(geo.local);
                let mut hessian = na::SMatrix::<f64, NUM_ACTIVE, NUM_ACTIVE>::zeros();
                terms.dg = [0.0; NUM_ACTIVE];
                for (k, &i) in dofs.iter().enumerate() {
                    terms.dg[i] = ray.gradient[k];
                    for (m, &j) in dofs.iter().enumerate() {
                        hessian[(i, j)] = ray.hessian[(k, m)];
                    }
                }
                terms.ray_hessian = Some(hessian);
            }
        }
        Some(terms)
    }

    /// Contact pressure `R₋(σₙ(u) + γₕ gₙ(u))` at every quadrature point, `None` where no
    /// opposing point was found.
    pub fn contact_pressure(&self, data: &KernelData) -> Vec<Option<f64>> {
        (0..self.layout.num_points())
            .map(|q| self.point_terms(data, q).map(|t| r_minus(t.pressure_arg)))
            .collect()
    }
}

impl Kernel for NitscheKernel {
    fn kernel_type(&self) -> KernelType {
        self.kernel_type
    }

    fn num_local_dofs(&self) -> usize {
        NUM_CELL_DOFS + NUM_FACET_DOFS * self.layout.num_points()
    }

    fn evaluate(&self, data: &KernelData, out: &mut [f64]) {
        let n = self.num_local_dofs();
        let theta = self.constants[1];
        for q in 0..self.layout.num_points() {
            let t = match self.point_terms(data, q) {
                Some(t) => t,
                None => continue,
            };
            let scale = t.weight / t.gamma_h;
            let p = r_minus(t.pressure_arg);
            let test = |i: usize| theta * t.sn[i] + t.gamma_h * t.dg[i];

            match self.kernel_type {
                KernelType::Rhs => {
                    debug_assert_eq!(out.len(), n);
                    for i in 0..NUM_ACTIVE {
                        out[local_dof(q, i)] += scale * p * test(i);
                    }
                }
                KernelType::Jacobian => {
                    debug_assert_eq!(out.len(), n * n);
                    let h = dr_minus(t.pressure_arg);
                    let second_order = self.gap_model == GapModel::Variable && p != 0.0;
                    for i in 0..NUM_ACTIVE {
                        let row = local_dof(q, i) * n;
                        let ti = test(i);
                        for j in 0..NUM_ACTIVE {
                            let mut v = scale * h * ti * (t.sn[j] + t.gamma_h * t.dg[j]);
                            if second_order {
                                v += t.weight * p * t.d2g(i, j);
                            }
                            out[row + local_dof(q, j)] += v;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::coefficients::{CoefficientBuffer, Packer};
    use crate::contact::distance_map::{DistanceMap, SearchMode};
    use crate::mesh::builder::{TwoBlocks, LOWER_CONTACT, UPPER_CONTACT};
    use crate::mesh::SurfaceMesh;
    use approx::assert_relative_eq;

    #[test]
    fn negative_part() {
        assert_eq!(r_minus(2.0), 0.0);
        assert_eq!(r_minus(-3.0), -3.0);
        assert_eq!(dr_minus(-1e-16), 1.0);
        assert_eq!(dr_minus(0.0), 0.0);
    }

    #[test]
    fn basis_on_facet() {
        let (mesh, tags) = TwoBlocks::default().build().unwrap();
        for f in tags.find(LOWER_CONTACT) {
            let geo = FacetGeometry::new(&mesh, f);
            let [a, b] = mesh.facet_points(f);
            let s = 0.3;
            let phi = geo.basis(s);
            let cell = mesh.cell_points(mesh.facet(f).cell);
            let x: Point = (0..3).map(|k| cell[k] * phi[k]).sum();
            assert_relative_eq!((x - (a + (b - a) * s)).norm(), 0.0, epsilon = 1e-14);
        }
    }

    /// Lower block surface of two blocks overlapping by `overlap`, with packed
    /// coefficients for zero displacement.
    fn packed(
        overlap: f64,
        gap_model: GapModel,
        search: SearchMode,
    ) -> (Vec<FacetGeometry>, CoefficientBuffer, NitscheKernel, NitscheKernel) {
        let (mesh, tags) = TwoBlocks {
            gap: -overlap,
            divisions: [2, 2],
            ..Default::default()
        }
        .build()
        .unwrap();
        let own = SurfaceMesh::new(&mesh, &tags.find(LOWER_CONTACT));
        let opp = SurfaceMesh::new(&mesh, &tags.find(UPPER_CONTACT));
        let q = FacetQuadrature::new(2).unwrap();
        let layout = CoefficientLayout::new(q.num_points());
        let mut map = DistanceMap::new(own.num_facets(), q.num_points());
        let generation = match gap_model {
            GapModel::Variable => 1,
            GapModel::Fixed => 0,
        };
        map.update(&own, &opp, &q, search, 1.0, generation);
        let mut buf = CoefficientBuffer::new(layout.clone(), own.num_facets());
        let params = ElasticityParameters::from_young_poisson(1e3, 0.1);
        let u = vec![0.0; mesh.num_dofs()];
        Packer::new(layout.clone())
            .pack(&mesh, &own, Some(&opp), &map, &q, &params, gap_model, &u, generation, &mut buf)
            .unwrap();
        let geometry = own.parent_facets.iter().map(|&f| FacetGeometry::new(&mesh, f)).collect();
        let constants = [10.0 * 1e3, 1.0];
        let rhs = NitscheKernel::new(KernelType::Rhs, gap_model, layout.clone(), q.clone(), constants, 0.5)
            .with_search(search);
        let jac = NitscheKernel::new(KernelType::Jacobian, gap_model, layout, q, constants, 0.5)
            .with_search(search);
        (geometry, buf, rhs, jac)
    }

    #[test]
    fn touching_surfaces_have_no_contact_force() {
        let (geometry, buf, rhs, _) = packed(0.0, GapModel::Variable, SearchMode::ClosestPoint);
        for (f, geo) in geometry.iter().enumerate() {
            let data = KernelData {
                coefficients: buf.row(f),
                opposite_facets: buf.opposite_facets(f),
                geometry: geo,
            };
            let mut out = vec![0.0; rhs.num_local_dofs()];
            rhs.evaluate(&data, &mut out);
            assert!(out.iter().all(|&x| x == 0.0));
            assert!(rhs.contact_pressure(&data).iter().all(|p| *p == Some(0.0)));
        }
    }

    #[test]
    fn penetration_pressure_and_symmetry() {
        for (gap_model, search) in [
            (GapModel::Variable, SearchMode::ClosestPoint),
            (GapModel::Fixed, SearchMode::ClosestPoint),
            (GapModel::Variable, SearchMode::Raytracing),
        ] {
            let overlap = 0.01;
            let (geometry, buf, rhs, jac) = packed(overlap, gap_model, search);
            let gamma_h = 1e4 / (0.25f64 + 0.25).sqrt();
            for (f, geo) in geometry.iter().enumerate() {
                let data = KernelData {
                    coefficients: buf.row(f),
                    opposite_facets: buf.opposite_facets(f),
                    geometry: geo,
                };
                for p in rhs.contact_pressure(&data) {
                    assert_relative_eq!(p.unwrap(), -gamma_h * overlap, max_relative = 1e-10);
                }

                let n = jac.num_local_dofs();
                let mut mat = vec![0.0; n * n];
                jac.evaluate(&data, &mut mat);
                for i in 0..n {
                    for j in 0..n {
                        assert_relative_eq!(mat[i * n + j], mat[j * n + i], max_relative = 1e-10, epsilon = 1e-8);
                    }
                }

                // Pushing the own surface down is resisted.
                let mut out = vec![0.0; n];
                rhs.evaluate(&data, &mut out);
                let own_vertical: f64 = (0..3).map(|k| out[2 * k + 1]).sum();
                assert!(own_vertical > 0.0);
            }
        }
    }

    #[test]
    fn flat_ray_hits_match_projection_residual() {
        let (geometry, proj, proj_rhs, proj_jac) =
            packed(0.01, GapModel::Variable, SearchMode::ClosestPoint);
        let (_, ray, ray_rhs, ray_jac) = packed(0.01, GapModel::Variable, SearchMode::Raytracing);
        let n = proj_rhs.num_local_dofs();
        fn data<'a>(buf: &'a CoefficientBuffer, f: usize, geometry: &'a FacetGeometry) -> KernelData<'a> {
            KernelData {
                coefficients: buf.row(f),
                opposite_facets: buf.opposite_facets(f),
                geometry,
            }
        }
        for (f, geo) in geometry.iter().enumerate() {
            let mut a = vec![0.0; n];
            let mut b = vec![0.0; n];
            proj_rhs.evaluate(&data(&proj, f, geo), &mut a);
            ray_rhs.evaluate(&data(&ray, f, geo), &mut b);
            for (a, b) in a.iter().zip(b.iter()) {
                assert_relative_eq!(*a, *b, max_relative = 1e-10, epsilon = 1e-10);
            }

            // The tangents differ: a ray follows the rotation of the own facet.
            let mut a = vec![0.0; n * n];
            let mut b = vec![0.0; n * n];
            proj_jac.evaluate(&data(&proj, f, geo), &mut a);
            ray_jac.evaluate(&data(&ray, f, geo), &mut b);
            assert!(a.iter().zip(b.iter()).any(|(a, b)| (a - b).abs() > 1e-6));
        }
    }

    #[test]
    fn ray_dofs_follow_facet_orientation() {
        assert_eq!(ray_dofs(0), [2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(ray_dofs(2), [0, 1, 2, 3, 6, 7, 8, 9]);
    }
}
