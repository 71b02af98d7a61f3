//! Packing of per facet kernel inputs.
//!
//! Every facet of a contact surface owns one row of a [`CoefficientBuffer`]. A row is the
//! concatenation of the blocks listed in [`Block::ALL`], in that order. The kernel reads
//! rows through the same [`CoefficientLayout`], so block order is the only contract
//! between the packer and the kernel.

use lazycell::LazyCell;
use rayon::prelude::*;

use super::distance_map::{DistanceMap, SearchMode};
use super::kernel::GapModel;
use crate::material::ElasticityParameters;
use crate::mesh::{Mesh, Point, SurfaceMesh, GDIM};
use crate::quadrature::FacetQuadrature;
use crate::{Error, Index};

/// Generation of distance maps built once from the reference configuration.
pub const REFERENCE_GENERATION: u64 = 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Block {
    /// Lame parameters `[μ, λ]`, once per facet.
    Material,
    /// Diameter of the cell owning the facet, once per facet.
    CellSize,
    /// Vector from the quadrature point to its opposing point.
    Gap,
    /// Contact normal.
    Normal,
    /// Values of the opposing facet basis functions at the opposing point.
    TestFunctions,
    /// Displacement at the quadrature point.
    Displacement,
    /// Row-major displacement gradient in the owning cell.
    DisplacementGradient,
    /// Displacement at the opposing point.
    OppositeDisplacement,
    /// Tangent of the deformed opposing facet divided by its length, followed by the
    /// inverse length. Zero unless the opposing point is an interior projection.
    SurfaceDerivative,
    /// Deformed own facet followed by the deformed opposing facet. Zero unless the
    /// opposing point is a ray hit with the variable gap.
    RayFacets,
}

impl Block {
    pub const ALL: [Block; 10] = [
        Block::Material,
        Block::CellSize,
        Block::Gap,
        Block::Normal,
        Block::TestFunctions,
        Block::Displacement,
        Block::DisplacementGradient,
        Block::OppositeDisplacement,
        Block::SurfaceDerivative,
        Block::RayFacets,
    ];

    /// Number of values stored for each quadrature point, or for the facet if the block
    /// is not [`per_point`](Block::per_point).
    pub fn size(self) -> usize {
        match self {
            Block::Material => 2,
            Block::CellSize => 1,
            Block::Gap | Block::Normal | Block::Displacement | Block::OppositeDisplacement => GDIM,
            Block::TestFunctions => 2,
            Block::DisplacementGradient => GDIM * GDIM,
            Block::SurfaceDerivative => GDIM + 1,
            Block::RayFacets => 4 * GDIM,
        }
    }

    pub fn per_point(self) -> bool {
        !matches!(self, Block::Material | Block::CellSize)
    }
}

/// Offsets of each block within a facet row.
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientLayout {
    num_points: usize,
    offsets: [usize; 10],
    width: usize,
}

impl CoefficientLayout {
    pub fn new(num_points: usize) -> Self {
        let mut offsets = [0; 10];
        let mut width = 0;
        for (offset, block) in offsets.iter_mut().zip(Block::ALL.iter()) {
            *offset = width;
            width += if block.per_point() {
                block.size() * num_points
            } else {
                block.size()
            };
        }
        CoefficientLayout {
            num_points,
            offsets,
            width,
        }
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Number of values in a facet row.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn offset(&self, block: Block) -> usize {
        self.offsets[block as usize]
    }

    /// Offset of the values of `block` at quadrature point `q`.
    #[inline]
    pub fn at(&self, block: Block, q: usize) -> usize {
        debug_assert!(block.per_point());
        self.offset(block) + q * block.size()
    }
}

/// Packed kernel inputs for all facets of one contact surface.
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientBuffer {
    layout: CoefficientLayout,
    data: Vec<f64>,
    /// Opposing facet of every quadrature point.
    opposite_facets: Vec<Index>,
    generation: Option<u64>,
}

impl CoefficientBuffer {
    pub fn new(layout: CoefficientLayout, num_facets: usize) -> Self {
        CoefficientBuffer {
            data: vec![0.0; layout.width() * num_facets],
            opposite_facets: vec![Index::INVALID; layout.num_points() * num_facets],
            generation: None,
            layout,
        }
    }

    pub fn layout(&self) -> &CoefficientLayout {
        &self.layout
    }

    pub fn num_facets(&self) -> usize {
        self.opposite_facets.len() / self.layout.num_points().max(1)
    }

    /// Displacement generation the buffer was packed for.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn row(&self, facet: usize) -> &[f64] {
        let w = self.layout.width();
        &self.data[facet * w..(facet + 1) * w]
    }

    pub fn opposite_facets(&self, facet: usize) -> &[Index] {
        let nq = self.layout.num_points();
        &self.opposite_facets[facet * nq..(facet + 1) * nq]
    }

    /// Number of quadrature points without an opposing facet.
    pub fn num_invalid(&self) -> usize {
        self.opposite_facets.iter().filter(|i| !i.is_valid()).count()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Fills [`CoefficientBuffer`]s for one contact surface.
///
/// Material and cell size blocks only depend on the reference mesh and are computed once.
pub struct Packer {
    layout: CoefficientLayout,
    material: LazyCell<Vec<[f64; 2]>>,
    cell_size: LazyCell<Vec<f64>>,
}

impl Packer {
    pub fn new(layout: CoefficientLayout) -> Self {
        Packer {
            layout,
            material: LazyCell::new(),
            cell_size: LazyCell::new(),
        }
    }

    pub fn layout(&self) -> &CoefficientLayout {
        &self.layout
    }

    /// Packs the coefficients of every facet of `own` into `out`.
    ///
    /// A missing `opposite` surface stands for a motionless rigid obstacle, which has no
    /// displacement and no basis functions.
    ///
    /// Fails if `map` was not built for the expected generation: the current `generation`
    /// for the variable gap and [`REFERENCE_GENERATION`] for the fixed gap.
    #[allow(clippy::too_many_arguments)]
    pub fn pack(
        &self,
        mesh: &Mesh,
        own: &SurfaceMesh,
        opposite: Option<&SurfaceMesh>,
        map: &DistanceMap,
        quadrature: &FacetQuadrature,
        elasticity: &ElasticityParameters,
        gap_model: GapModel,
        u: &[f64],
        generation: u64,
        out: &mut CoefficientBuffer,
    ) -> Result<(), Error> {
        let expected = match gap_model {
            GapModel::Variable => generation,
            GapModel::Fixed => REFERENCE_GENERATION,
        };
        if map.generation() != Some(expected) {
            return Err(Error::StaleDistanceMap);
        }
        if u.len() != mesh.num_dofs() || out.layout != self.layout {
            return Err(Error::SizeMismatch);
        }

        let material = self.material.borrow_with(|| {
            own.parent_facets
                .iter()
                .map(|_| [elasticity.mu, elasticity.lambda])
                .collect()
        });
        let cell_size = self.cell_size.borrow_with(|| {
            own.parent_facets
                .iter()
                .map(|&f| mesh.cell_diameter(mesh.facet(f).cell))
                .collect()
        });

        let layout = &self.layout;
        let nq = layout.num_points();
        let ray_facets = gap_model == GapModel::Variable && map.search_mode() == SearchMode::Raytracing;
        let width = layout.width();
        let disp = |v: usize| Point::new(u[GDIM * v], u[GDIM * v + 1]);

        out.data
            .par_chunks_mut(width)
            .zip(out.opposite_facets.par_chunks_mut(nq))
            .enumerate()
            .for_each(|(f, (row, opposite_facets))| {
                row.iter_mut().for_each(|x| *x = 0.0);
                let facet = mesh.facet(own.parent_facets[f]);

                row[layout.offset(Block::Material)..][..2].copy_from_slice(&material[f]);
                row[layout.offset(Block::CellSize)] = cell_size[f];

                let cell = &mesh.cells()[facet.cell];
                let grads = mesh.shape_gradients(facet.cell);
                let mut grad = na::Matrix2::zeros();
                for (&v, g) in cell.iter().zip(grads.iter()) {
                    grad += disp(v) * g.transpose();
                }

                let [v0, v1] = facet.vertices.map(disp);
                let own_facet = own.deformed_facet(f);
                for (q, (&s, corr)) in quadrature
                    .points
                    .iter()
                    .zip(map.facet(f).iter())
                    .enumerate()
                {
                    let ux = v0 * (1.0 - s) + v1 * s;
                    row[layout.at(Block::Displacement, q)..][..2].copy_from_slice(ux.as_slice());
                    let o = layout.at(Block::DisplacementGradient, q);
                    for i in 0..GDIM {
                        for j in 0..GDIM {
                            row[o + GDIM * i + j] = grad[(i, j)];
                        }
                    }

                    opposite_facets[q] = corr.facet;
                    let opp = match corr.facet.into_option() {
                        Some(opp) => opp,
                        None => continue,
                    };

                    row[layout.at(Block::Gap, q)..][..2].copy_from_slice(corr.gap().as_slice());
                    row[layout.at(Block::Normal, q)..][..2].copy_from_slice(corr.normal.as_slice());
                    // Rigid obstacles leave the remaining blocks zero.
                    let opposite = match opposite {
                        Some(opposite) => opposite,
                        None => continue,
                    };

                    let xi = corr.xi;
                    row[layout.at(Block::TestFunctions, q)..][..2].copy_from_slice(&[1.0 - xi, xi]);
                    let [c, d] = opposite.facet_parent_vertices(opp);
                    let uy = disp(c) * (1.0 - xi) + disp(d) * xi;
                    row[layout.at(Block::OppositeDisplacement, q)..][..2]
                        .copy_from_slice(uy.as_slice());

                    let opposite_facet = opposite.deformed_facet(opp);
                    if gap_model == GapModel::Variable && corr.projected {
                        let [a, b] = opposite_facet;
                        let e = b - a;
                        let inv_len = 1.0 / e.norm();
                        let o = layout.at(Block::SurfaceDerivative, q);
                        row[o] = e.x * inv_len * inv_len;
                        row[o + 1] = e.y * inv_len * inv_len;
                        row[o + 2] = inv_len;
                    }
                    if ray_facets {
                        let o = layout.at(Block::RayFacets, q);
                        for (k, p) in own_facet.iter().chain(opposite_facet.iter()).enumerate() {
                            row[o + GDIM * k..][..GDIM].copy_from_slice(p.as_slice());
                        }
                    }
                }
            });
        out.generation = Some(generation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::distance_map::RigidPlane;
    use crate::mesh::builder::{TwoBlocks, LOWER_CONTACT, UPPER_CONTACT};
    use approx::assert_relative_eq;

    #[test]
    fn layout_offsets() {
        let layout = CoefficientLayout::new(3);
        assert_eq!(layout.offset(Block::Material), 0);
        assert_eq!(layout.offset(Block::CellSize), 2);
        assert_eq!(layout.offset(Block::Gap), 3);
        assert_eq!(layout.offset(Block::Normal), 9);
        assert_eq!(layout.at(Block::Normal, 2), 13);
        assert_eq!(layout.offset(Block::SurfaceDerivative), 3 + 3 * (2 + 2 + 2 + 2 + 4 + 2));
        assert_eq!(layout.offset(Block::RayFacets), 3 + 3 * 17);
        assert_eq!(layout.width(), 3 + 3 * 25);
    }

    fn setup(gap: f64) -> (Mesh, SurfaceMesh, SurfaceMesh, FacetQuadrature) {
        let (mesh, tags) = TwoBlocks {
            gap,
            divisions: [3, 2],
            ..Default::default()
        }
        .build()
        .unwrap();
        let lower = SurfaceMesh::new(&mesh, &tags.find(LOWER_CONTACT));
        let upper = SurfaceMesh::new(&mesh, &tags.find(UPPER_CONTACT));
        (mesh, lower, upper, FacetQuadrature::new(3).unwrap())
    }

    #[test]
    fn stale_map_is_rejected() {
        let (mesh, lower, upper, q) = setup(0.0);
        let layout = CoefficientLayout::new(q.num_points());
        let packer = Packer::new(layout.clone());
        let mut map = DistanceMap::new(lower.num_facets(), q.num_points());
        let mut out = CoefficientBuffer::new(layout, lower.num_facets());
        let params = ElasticityParameters::from_young_poisson(1.0, 0.3);
        let u = vec![0.0; mesh.num_dofs()];
        map.update(&lower, &upper, &q, SearchMode::ClosestPoint, 1.0, 1);
        let result = packer.pack(
            &mesh, &lower, Some(&upper), &map, &q, &params, GapModel::Variable, &u, 2, &mut out,
        );
        assert!(matches!(result, Err(Error::StaleDistanceMap)));
    }

    #[test]
    fn packed_blocks() {
        let (mesh, mut lower, mut upper, q) = setup(0.0);
        let layout = CoefficientLayout::new(q.num_points());
        let packer = Packer::new(layout.clone());
        let params = ElasticityParameters::from_young_poisson(1.0, 0.3);

        // Uniform vertical stretch u = (0, 0.1 y).
        let u: Vec<f64> = mesh
            .vertices()
            .iter()
            .flat_map(|p| [0.0, 0.1 * p.y])
            .collect();
        lower.deform(&u);
        upper.deform(&u);
        let mut map = DistanceMap::new(lower.num_facets(), q.num_points());
        map.update(&lower, &upper, &q, SearchMode::ClosestPoint, 1.0, 4);
        let mut out = CoefficientBuffer::new(layout.clone(), lower.num_facets());
        packer
            .pack(&mesh, &lower, Some(&upper), &map, &q, &params, GapModel::Variable, &u, 4, &mut out)
            .unwrap();
        assert_eq!(out.generation(), Some(4));

        for f in 0..out.num_facets() {
            let row = out.row(f);
            assert_relative_eq!(row[layout.offset(Block::Material)], params.mu);
            assert_relative_eq!(row[layout.offset(Block::CellSize)], (1.0f64 / 9.0 + 0.25).sqrt());
            for qp in 0..q.num_points() {
                let g = layout.at(Block::DisplacementGradient, qp);
                assert_relative_eq!(row[g + 3], 0.1, epsilon = 1e-12);
                assert_relative_eq!(row[g], 0.0, epsilon = 1e-12);
                let n = layout.at(Block::Normal, qp);
                assert_relative_eq!(row[n + 1], -1.0);
                let tf = layout.at(Block::TestFunctions, qp);
                assert_relative_eq!(row[tf] + row[tf + 1], 1.0);
                let sd = layout.at(Block::SurfaceDerivative, qp);
                assert_relative_eq!(row[sd + 2], 3.0, max_relative = 1e-12);
                assert!(out.opposite_facets(f)[qp].is_valid());
            }
        }

        // Packing again with unchanged inputs is bit-for-bit reproducible.
        let mut again = CoefficientBuffer::new(layout, lower.num_facets());
        packer
            .pack(&mesh, &lower, Some(&upper), &map, &q, &params, GapModel::Variable, &u, 4, &mut again)
            .unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn ray_and_plane_blocks() {
        let (mesh, lower, upper, q) = setup(0.1);
        let layout = CoefficientLayout::new(q.num_points());
        let packer = Packer::new(layout.clone());
        let params = ElasticityParameters::from_young_poisson(1.0, 0.3);
        let u = vec![0.0; mesh.num_dofs()];
        let mut map = DistanceMap::new(lower.num_facets(), q.num_points());
        map.update(&lower, &upper, &q, SearchMode::Raytracing, 1.0, 1);
        let mut out = CoefficientBuffer::new(layout.clone(), lower.num_facets());
        packer
            .pack(&mesh, &lower, Some(&upper), &map, &q, &params, GapModel::Variable, &u, 1, &mut out)
            .unwrap();
        for f in 0..out.num_facets() {
            let row = out.row(f);
            let [a, b] = lower.deformed_facet(f);
            for qp in 0..q.num_points() {
                let o = layout.at(Block::RayFacets, qp);
                assert_eq!(&row[o..o + 4], &[a.x, a.y, b.x, b.y]);
                assert_relative_eq!(row[o + 5], 0.1);
                assert_relative_eq!(row[o + 7], 0.1);
                let sd = layout.at(Block::SurfaceDerivative, qp);
                assert!(row[sd..sd + 3].iter().all(|&x| x == 0.0));
            }
        }

        // Rigid plane at y = 0.1 bounding an obstacle above the lower block.
        let plane = RigidPlane {
            normal: [0.0, -1.0],
            offset: -0.1,
        };
        map.update_plane(&lower, &plane, &q, 1.0, 2);
        packer
            .pack(&mesh, &lower, None, &map, &q, &params, GapModel::Variable, &u, 2, &mut out)
            .unwrap();
        for f in 0..out.num_facets() {
            let row = out.row(f);
            for qp in 0..q.num_points() {
                assert!(out.opposite_facets(f)[qp].is_valid());
                assert_relative_eq!(row[layout.at(Block::Gap, qp) + 1], 0.1, epsilon = 1e-14);
                let tf = layout.at(Block::TestFunctions, qp);
                assert_eq!(&row[tf..tf + 2], &[0.0, 0.0]);
                let o = layout.at(Block::RayFacets, qp);
                assert!(row[o..o + 8].iter().all(|&x| x == 0.0));
            }
        }
    }
}
