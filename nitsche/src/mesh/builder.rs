//! Structured meshes for block contact configurations.

use serde::{Deserialize, Serialize};

use super::{Mesh, MeshTags, Point};
use crate::Error;

/// Facet tag of the bottom (Dirichlet) side of the lower block.
pub const LOWER_DIRICHLET: i32 = 1;
/// Facet tag of the top (contact) side of the lower block.
pub const LOWER_CONTACT: i32 = 2;
/// Facet tag of the bottom (contact) side of the upper block.
pub const UPPER_CONTACT: i32 = 3;
/// Facet tag of the top (Dirichlet) side of the upper block.
pub const UPPER_DIRICHLET: i32 = 4;

/// Vertices and triangles of an axis aligned rectangle split into `nx × ny` quads, each
/// cut along the same diagonal.
pub fn rectangle(
    origin: [f64; 2],
    size: [f64; 2],
    [nx, ny]: [usize; 2],
) -> (Vec<[f64; 2]>, Vec<[usize; 3]>) {
    let mut verts = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            verts.push([
                origin[0] + size[0] * i as f64 / nx as f64,
                origin[1] + size[1] * j as f64 / ny as f64,
            ]);
        }
    }
    let idx = |i: usize, j: usize| j * (nx + 1) + i;
    let mut cells = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            cells.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
            cells.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }
    (verts, cells)
}

/// Two stacked rectangular blocks separated by a vertical gap.
///
/// The upper block is the mirror image of the lower block about the middle of the gap,
/// so the configuration is symmetric when both blocks are loaded symmetrically.
/// The blocks share no vertices even when the gap is zero.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TwoBlocks {
    pub width: f64,
    pub height: f64,
    /// Signed distance between the blocks. Negative values produce overlapping blocks.
    pub gap: f64,
    /// Number of subdivisions along the width and height of each block.
    pub divisions: [usize; 2],
}

impl Default for TwoBlocks {
    fn default() -> Self {
        TwoBlocks {
            width: 1.0,
            height: 1.0,
            gap: 0.0,
            divisions: [8, 8],
        }
    }
}

impl TwoBlocks {
    /// Builds the mesh and tags the top, bottom and contact sides with [`LOWER_DIRICHLET`],
    /// [`LOWER_CONTACT`], [`UPPER_CONTACT`] and [`UPPER_DIRICHLET`].
    pub fn build(&self) -> Result<(Mesh, MeshTags), Error> {
        let TwoBlocks {
            width,
            height,
            gap,
            divisions,
        } = *self;
        if !(width > 0.0 && height > 0.0) || divisions.contains(&0) {
            return Err(Error::InvalidParameter {
                name: "TwoBlocks".to_string(),
            });
        }

        let (lower_verts, lower_cells) = rectangle([0.0, -height], [width, height], divisions);
        let offset = lower_verts.len();

        let mut verts = lower_verts.clone();
        verts.extend(lower_verts.iter().map(|&[x, y]| [x, gap - y]));

        // Reflection flips orientation, which is restored by swapping two vertices.
        let mut cells = lower_cells.clone();
        cells.extend(
            lower_cells
                .iter()
                .map(|&[a, b, c]| [a + offset, c + offset, b + offset]),
        );

        let mesh = Mesh::new(verts, cells)?;

        let tol = 1e-8 * height;
        let lower_bottom = |p: &Point| (p.y + height).abs() < tol;
        let upper_top = |p: &Point| (p.y - gap - height).abs() < tol;
        // Contact sides are told apart by which block owns the facet, since the two sides
        // coincide when the gap is zero.
        let num_lower_cells = lower_cells.len();
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (f, facet) in mesh.boundary_facets().iter().enumerate() {
            let mid = mesh.facet_midpoint(f);
            let lower = facet.cell < num_lower_cells;
            let tag = if lower && lower_bottom(&mid) {
                LOWER_DIRICHLET
            } else if !lower && upper_top(&mid) {
                UPPER_DIRICHLET
            } else if lower && mid.y.abs() < tol {
                LOWER_CONTACT
            } else if !lower && (mid.y - gap).abs() < tol {
                UPPER_CONTACT
            } else {
                continue;
            };
            indices.push(f);
            values.push(tag);
        }
        let tags = MeshTags::new(indices, values)?;
        Ok((mesh, tags))
    }
}
