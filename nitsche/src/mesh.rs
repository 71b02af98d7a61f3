//! Triangle meshes with tagged boundary facets.
//!
//! Only first order (P1) geometry is supported. Cells are stored counter-clockwise so
//! that the outward normal of a facet `[a, b]` is the tangent `b - a` rotated clockwise.

pub mod builder;

use ahash::AHashMap;

use crate::Error;

pub type Point = na::Vector2<f64>;

/// Number of displacement components per vertex.
pub const GDIM: usize = 2;

/// A boundary facet identified by its owning cell and the local index of the facet
/// within that cell.
///
/// Local facet `l` is opposite to local vertex `l`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Facet {
    pub cell: usize,
    pub local: usize,
    /// Vertices oriented consistently with the owning cell.
    pub vertices: [usize; 2],
}

/// Vertices of local facet `local` of `cell`.
#[inline]
pub fn facet_vertices(cell: &[usize; 3], local: usize) -> [usize; 2] {
    [cell[(local + 1) % 3], cell[(local + 2) % 3]]
}

/// Unit outward normal of an edge `[a, b]` belonging to a counter-clockwise cell.
#[inline]
pub fn outward_normal(a: &Point, b: &Point) -> Point {
    let t = b - a;
    Point::new(t.y, -t.x) / t.norm()
}

#[derive(Clone, Debug)]
pub struct Mesh {
    vertices: Vec<Point>,
    cells: Vec<[usize; 3]>,
    boundary: Vec<Facet>,
}

impl Mesh {
    /// Builds a mesh from vertex positions and triangles.
    ///
    /// Clockwise triangles are reoriented. Zero-area triangles are reported as an error.
    pub fn new(vertices: Vec<[f64; 2]>, mut cells: Vec<[usize; 3]>) -> Result<Mesh, Error> {
        let vertices: Vec<Point> = vertices.into_iter().map(Point::from).collect();
        if cells.iter().flatten().any(|&v| v >= vertices.len()) {
            return Err(Error::SizeMismatch);
        }

        let mut degens = Vec::new();
        for (i, cell) in cells.iter_mut().enumerate() {
            let [a, b, c] = cell.map(|v| vertices[v]);
            let area2 = (b - a).perp(&(c - a));
            if area2.abs() <= f64::EPSILON * (b - a).norm_squared().max((c - a).norm_squared()) {
                degens.push(i);
            } else if area2 < 0.0 {
                cell.swap(1, 2);
            }
        }
        if !degens.is_empty() {
            return Err(Error::DegenerateReferenceElement { degens });
        }

        // Facets referenced by exactly one cell are on the boundary.
        let mut edges: AHashMap<[usize; 2], (usize, usize, u32)> = AHashMap::new();
        for (c, cell) in cells.iter().enumerate() {
            for l in 0..3 {
                let [a, b] = facet_vertices(cell, l);
                let key = [a.min(b), a.max(b)];
                edges.entry(key).or_insert((c, l, 0)).2 += 1;
            }
        }
        let mut boundary: Vec<Facet> = edges
            .into_values()
            .filter(|&(_, _, count)| count == 1)
            .map(|(cell, local, _)| Facet {
                cell,
                local,
                vertices: facet_vertices(&cells[cell], local),
            })
            .collect();
        boundary.sort_by_key(|f| (f.cell, f.local));

        Ok(Mesh {
            vertices,
            cells,
            boundary,
        })
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of displacement degrees of freedom.
    #[inline]
    pub fn num_dofs(&self) -> usize {
        GDIM * self.vertices.len()
    }

    #[inline]
    pub fn vertex(&self, v: usize) -> Point {
        self.vertices[v]
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    pub fn boundary_facets(&self) -> &[Facet] {
        &self.boundary
    }

    pub fn facet(&self, f: usize) -> &Facet {
        &self.boundary[f]
    }

    pub fn cell_points(&self, c: usize) -> [Point; 3] {
        self.cells[c].map(|v| self.vertices[v])
    }

    pub fn cell_area(&self, c: usize) -> f64 {
        let [a, b, c] = self.cell_points(c);
        0.5 * (b - a).perp(&(c - a))
    }

    /// Largest distance between two vertices of the cell.
    pub fn cell_diameter(&self, c: usize) -> f64 {
        let [a, b, c] = self.cell_points(c);
        (b - a).norm().max((c - b).norm()).max((a - c).norm())
    }

    /// Gradients of the three P1 basis functions of the cell.
    pub fn shape_gradients(&self, c: usize) -> [Point; 3] {
        let p = self.cell_points(c);
        let area2 = (p[1] - p[0]).perp(&(p[2] - p[0]));
        let mut grads = [Point::zeros(); 3];
        for (i, g) in grads.iter_mut().enumerate() {
            let pj = p[(i + 1) % 3];
            let pk = p[(i + 2) % 3];
            *g = Point::new(pj.y - pk.y, pk.x - pj.x) / area2;
        }
        grads
    }

    /// Global dofs of a cell ordered vertex-major: `[v0x, v0y, v1x, v1y, v2x, v2y]`.
    pub fn cell_dofs(&self, c: usize) -> [usize; 6] {
        let [a, b, c] = self.cells[c];
        [
            GDIM * a,
            GDIM * a + 1,
            GDIM * b,
            GDIM * b + 1,
            GDIM * c,
            GDIM * c + 1,
        ]
    }

    pub fn facet_points(&self, f: usize) -> [Point; 2] {
        self.boundary[f].vertices.map(|v| self.vertices[v])
    }

    pub fn facet_normal(&self, f: usize) -> Point {
        let [a, b] = self.facet_points(f);
        outward_normal(&a, &b)
    }

    pub fn facet_length(&self, f: usize) -> f64 {
        let [a, b] = self.facet_points(f);
        (b - a).norm()
    }

    pub fn facet_midpoint(&self, f: usize) -> Point {
        let [a, b] = self.facet_points(f);
        (a + b) * 0.5
    }

    /// Tags boundary facets whose midpoint satisfies one of the given markers.
    ///
    /// Markers are tried in order and the first match wins.
    pub fn tag_boundary_facets(&self, markers: &[(i32, &dyn Fn(&Point) -> bool)]) -> MeshTags {
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for f in 0..self.boundary.len() {
            let mid = self.facet_midpoint(f);
            if let Some((tag, _)) = markers.iter().find(|(_, m)| m(&mid)) {
                indices.push(f);
                values.push(*tag);
            }
        }
        MeshTags { indices, values }
    }
}

/// Integer markers attached to boundary facets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshTags {
    indices: Vec<usize>,
    values: Vec<i32>,
}

impl MeshTags {
    /// Creates tags from boundary facet indices and their values.
    pub fn new(indices: Vec<usize>, values: Vec<i32>) -> Result<MeshTags, Error> {
        if indices.len() != values.len() {
            return Err(Error::SizeMismatch);
        }
        let mut order: Vec<_> = (0..indices.len()).collect();
        order.sort_by_key(|&i| indices[i]);
        Ok(MeshTags {
            indices: order.iter().map(|&i| indices[i]).collect(),
            values: order.iter().map(|&i| values[i]).collect(),
        })
    }

    /// Boundary facets marked with `tag`.
    pub fn find(&self, tag: i32) -> Vec<usize> {
        self.indices
            .iter()
            .zip(self.values.iter())
            .filter(|(_, &v)| v == tag)
            .map(|(&i, _)| i)
            .collect()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Fails with [`Error::SizeMismatch`] if any index is not a boundary facet of `mesh`.
    pub fn check(&self, mesh: &Mesh) -> Result<(), Error> {
        // Indices are sorted.
        match self.indices.last() {
            Some(&f) if f >= mesh.boundary_facets().len() => Err(Error::SizeMismatch),
            _ => Ok(()),
        }
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }
}

/// A geometric copy of a set of boundary facets which can be moved by a displacement
/// field independently of the parent mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceMesh {
    /// Parent mesh vertex of every surface vertex.
    pub parent_vertices: Vec<usize>,
    /// Boundary facet index in the parent mesh of every surface facet.
    pub parent_facets: Vec<usize>,
    /// Facets in terms of surface vertices, oriented like their parent facets.
    pub facets: Vec<[usize; 2]>,
    reference: Vec<Point>,
    deformed: Vec<Point>,
}

impl SurfaceMesh {
    pub fn new(mesh: &Mesh, facets: &[usize]) -> SurfaceMesh {
        let mut local: AHashMap<usize, usize> = AHashMap::new();
        let mut parent_vertices = Vec::new();
        let surface_facets = facets
            .iter()
            .map(|&f| {
                mesh.facet(f).vertices.map(|v| {
                    *local.entry(v).or_insert_with(|| {
                        parent_vertices.push(v);
                        parent_vertices.len() - 1
                    })
                })
            })
            .collect();
        let reference: Vec<Point> = parent_vertices.iter().map(|&v| mesh.vertex(v)).collect();
        SurfaceMesh {
            parent_vertices,
            parent_facets: facets.to_vec(),
            facets: surface_facets,
            deformed: reference.clone(),
            reference,
        }
    }

    #[inline]
    pub fn num_facets(&self) -> usize {
        self.facets.len()
    }

    /// Moves the surface vertices to `x + u(x)`.
    pub fn deform(&mut self, u: &[f64]) {
        for ((d, r), &v) in self
            .deformed
            .iter_mut()
            .zip(self.reference.iter())
            .zip(self.parent_vertices.iter())
        {
            *d = r + Point::new(u[GDIM * v], u[GDIM * v + 1]);
        }
    }

    pub fn deformed_facet(&self, f: usize) -> [Point; 2] {
        self.facets[f].map(|v| self.deformed[v])
    }

    pub fn reference_facet(&self, f: usize) -> [Point; 2] {
        self.facets[f].map(|v| self.reference[v])
    }

    /// Parent mesh vertices of a surface facet.
    pub fn facet_parent_vertices(&self, f: usize) -> [usize; 2] {
        self.facets[f].map(|v| self.parent_vertices[v])
    }

    pub fn deformed_points(&self) -> &[Point] {
        &self.deformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Mesh {
        // Second triangle is given clockwise on purpose.
        let verts = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        Mesh::new(verts, vec![[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    #[test]
    fn boundary_facets_of_square() {
        let mesh = unit_square();
        assert_eq!(mesh.boundary_facets().len(), 4);
        for f in 0..4 {
            let n = mesh.facet_normal(f);
            let mid = mesh.facet_midpoint(f);
            // Outward normals point away from the center.
            assert!(n.dot(&(mid - Point::new(0.5, 0.5))) > 0.0);
            assert_relative_eq!(mesh.facet_length(f), 1.0);
        }
        assert!(mesh.cell_area(1) > 0.0);
    }

    #[test]
    fn shape_gradients_sum_to_zero() {
        let mesh = unit_square();
        for c in 0..mesh.num_cells() {
            let g = mesh.shape_gradients(c);
            let sum = g[0] + g[1] + g[2];
            assert_relative_eq!(sum.norm(), 0.0, epsilon = 1e-14);
            // Gradients reproduce the linear function x.
            let p = mesh.cell_points(c);
            let dx: Point = (0..3).map(|i| g[i] * p[i].x).sum();
            assert_relative_eq!(dx.x, 1.0, epsilon = 1e-14);
            assert_relative_eq!(dx.y, 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn degenerate_cells_are_rejected() {
        let verts = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        assert!(matches!(
            Mesh::new(verts, vec![[0, 1, 2]]),
            Err(Error::DegenerateReferenceElement { .. })
        ));
    }

    #[test]
    fn tagging_and_surface_extraction() {
        let mesh = unit_square();
        let bottom = |p: &Point| p.y < 1e-12;
        let top = |p: &Point| p.y > 1.0 - 1e-12;
        let tags = mesh.tag_boundary_facets(&[(1, &bottom), (2, &top)]);
        assert_eq!(tags.find(1).len(), 1);
        assert_eq!(tags.find(2).len(), 1);
        assert!(tags.find(3).is_empty());
        assert!(tags.check(&mesh).is_ok());
        let stray = MeshTags::new(vec![1, 4], vec![1, 2]).unwrap();
        assert!(matches!(stray.check(&mesh), Err(Error::SizeMismatch)));

        let mut surface = SurfaceMesh::new(&mesh, &tags.find(2));
        assert_eq!(surface.parent_vertices.len(), 2);
        let mut u = vec![0.0; mesh.num_dofs()];
        u.iter_mut().skip(1).step_by(2).for_each(|uy| *uy = 0.5);
        surface.deform(&u);
        for p in surface.deformed_points() {
            assert_relative_eq!(p.y, 1.5);
        }
    }
}
