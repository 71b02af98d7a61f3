//! The linear part of the contact problem.
//!
//! Bulk elasticity, Nitsche Dirichlet conditions and the stress consistency term on
//! contact surfaces are all linear in the displacement. They are assembled once into a
//! matrix `K` and load `f`, giving the residual `K u - f`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::material::{ElasticityParameters, Material, Nitsche};
use crate::matrix::{GlobalMatrix, SparsityPattern};
use crate::mesh::{Mesh, MeshTags, Point, GDIM};
use crate::Error;

/// Prescribed displacement on a tagged boundary, imposed weakly.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirichletCondition {
    pub tag: i32,
    pub displacement: [f64; 2],
}

type ElementMatrix = ([usize; 6], [f64; 36]);

/// Traction `σ(φ e_d) n` of the vector basis function of cell vertex `m` along `d`.
fn traction(params: &ElasticityParameters, grad: &Point, d: usize, n: &Point) -> Point {
    let mut e = Point::zeros();
    e[d] = 1.0;
    n * (params.lambda * grad[d]) + (e * grad.dot(n) + grad * n[d]) * params.mu
}

/// Tractions of all six cell basis functions on a facet with normal `n`.
fn tractions(params: &ElasticityParameters, grads: &[Point; 3], n: &Point) -> [Point; 6] {
    let mut t = [Point::zeros(); 6];
    for (m, g) in grads.iter().enumerate() {
        for d in 0..GDIM {
            t[GDIM * m + d] = traction(params, g, d, n);
        }
    }
    t
}

/// Bulk stiffness of one cell.
fn bulk_element(mesh: &Mesh, params: &ElasticityParameters, cell: usize) -> ElementMatrix {
    let area = mesh.cell_area(cell);
    let g = mesh.shape_gradients(cell);
    let ElasticityParameters { lambda, mu } = *params;
    let mut local = [0.0; 36];
    for k in 0..3 {
        for c in 0..GDIM {
            for m in 0..3 {
                for d in 0..GDIM {
                    let mut v = lambda * g[k][c] * g[m][d] + mu * g[m][c] * g[k][d];
                    if c == d {
                        v += mu * g[k].dot(&g[m]);
                    }
                    local[(GDIM * k + c) * 6 + GDIM * m + d] = area * v;
                }
            }
        }
    }
    (mesh.cell_dofs(cell), local)
}

/// Integral of each cell basis function over facet `f`, and the facet mass matrix in
/// terms of cell vertices.
fn facet_integrals(mesh: &Mesh, f: usize) -> ([f64; 3], [[f64; 3]; 3]) {
    let facet = mesh.facet(f);
    let len = mesh.facet_length(f);
    let on_facet = [(facet.local + 1) % 3, (facet.local + 2) % 3];
    let mut m = [0.0; 3];
    let mut mm = [[0.0; 3]; 3];
    for &a in on_facet.iter() {
        m[a] = 0.5 * len;
        for &b in on_facet.iter() {
            mm[a][b] = if a == b { len / 3.0 } else { len / 6.0 };
        }
    }
    (m, mm)
}

pub struct StandardForm {
    matrix: GlobalMatrix,
    load: Vec<f64>,
}

impl StandardForm {
    /// Assembles the linear forms.
    ///
    /// `contact_surfaces` lists the facets of every integrated contact surface along with
    /// the pair weight.
    pub fn new<'a>(
        mesh: &Mesh,
        tags: &MeshTags,
        material: &Material,
        nitsche: &Nitsche,
        dirichlet: &[DirichletCondition],
        contact_surfaces: impl IntoIterator<Item = (&'a [usize], f64)>,
    ) -> Result<StandardForm, Error> {
        tags.check(mesh)?;
        let params = material.elasticity;
        let [gamma, theta] = nitsche.constants(material);
        let n = mesh.num_dofs();

        let mut pattern = SparsityPattern::new(n);
        Self::insert_sparsity(mesh, &mut pattern);
        let mut matrix = pattern.build();
        let mut load = vec![0.0; n];

        let bulk: Vec<ElementMatrix> = (0..mesh.num_cells())
            .into_par_iter()
            .map(|c| bulk_element(mesh, &params, c))
            .collect();
        for (dofs, local) in bulk.iter() {
            matrix.add_local(&dofs.map(Some), local)?;
        }

        for bc in dirichlet.iter() {
            let facets = tags.find(bc.tag);
            if facets.is_empty() {
                return Err(Error::EmptySurface { tag: bc.tag });
            }
            let u_d = Point::from(bc.displacement);
            for f in facets {
                let cell = mesh.facet(f).cell;
                let gamma_h = gamma / mesh.cell_diameter(cell);
                let normal = mesh.facet_normal(f);
                let len = mesh.facet_length(f);
                let t = tractions(&params, &mesh.shape_gradients(cell), &normal);
                let (m, mm) = facet_integrals(mesh, f);
                let dofs = mesh.cell_dofs(cell);
                let mut local = [0.0; 36];
                for a in 0..6 {
                    let (k, c) = (a / GDIM, a % GDIM);
                    for b in 0..6 {
                        let (l, d) = (b / GDIM, b % GDIM);
                        let mut v = -t[b][c] * m[k] - theta * t[a][d] * m[l];
                        if c == d {
                            v += gamma_h * mm[k][l];
                        }
                        local[a * 6 + b] = v;
                    }
                    load[dofs[a]] += -theta * t[a].dot(&u_d) * len + gamma_h * u_d[c] * m[k];
                }
                matrix.add_local(&dofs.map(Some), &local)?;
            }
        }

        for (facets, weight) in contact_surfaces {
            for &f in facets.iter() {
                let cell = mesh.facet(f).cell;
                let gamma_h = gamma / mesh.cell_diameter(cell);
                let normal = mesh.facet_normal(f);
                let scale = -weight * theta / gamma_h * mesh.facet_length(f);
                let t = tractions(&params, &mesh.shape_gradients(cell), &normal);
                let mut local = [0.0; 36];
                for a in 0..6 {
                    for b in 0..6 {
                        local[a * 6 + b] = scale * t[a].dot(&t[b]);
                    }
                }
                matrix.add_local(&mesh.cell_dofs(cell).map(Some), &local)?;
            }
        }

        Ok(StandardForm { matrix, load })
    }

    /// Couples all dofs within each cell.
    pub fn insert_sparsity(mesh: &Mesh, pattern: &mut SparsityPattern) {
        for c in 0..mesh.num_cells() {
            let dofs = mesh.cell_dofs(c);
            pattern.insert_block(&dofs, &dofs);
        }
    }

    pub fn matrix(&self) -> &GlobalMatrix {
        &self.matrix
    }

    pub fn load(&self) -> &[f64] {
        &self.load
    }

    /// Adds `K u - f` to `r`.
    pub fn add_residual(&self, u: &[f64], r: &mut [f64]) {
        let mut ku = vec![0.0; r.len()];
        self.matrix.mul_vec(u, &mut ku);
        for ((r, ku), f) in r.iter_mut().zip(ku).zip(self.load.iter()) {
            *r += ku - f;
        }
    }

    /// Adds `K` to `jac`.
    pub fn add_jacobian(&self, jac: &mut GlobalMatrix) -> Result<(), Error> {
        jac.add_matrix(&self.matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{NitscheParameters, PhysicalParameters};
    use crate::mesh::builder::rectangle;
    use approx::assert_relative_eq;

    fn block() -> (Mesh, MeshTags) {
        let (verts, cells) = rectangle([0.0, 0.0], [2.0, 1.0], [4, 3]);
        let mesh = Mesh::new(verts, cells).unwrap();
        let bottom = |p: &Point| p.y.abs() < 1e-12;
        let top = |p: &Point| (p.y - 1.0).abs() < 1e-12;
        let tags = mesh.tag_boundary_facets(&[(1, &bottom), (2, &top)]);
        (mesh, tags)
    }

    fn material() -> (Material, Nitsche) {
        (
            PhysicalParameters::new(1e3, 0.3).material().unwrap(),
            NitscheParameters::new(10.0, 1.0).validate().unwrap(),
        )
    }

    #[test]
    fn symmetric_for_symmetric_nitsche() {
        let (mesh, tags) = block();
        let (material, nitsche) = material();
        let bcs = [DirichletCondition {
            tag: 1,
            displacement: [0.0, 0.0],
        }];
        let top = tags.find(2);
        let form = StandardForm::new(
            &mesh,
            &tags,
            &material,
            &nitsche,
            &bcs,
            [(top.as_slice(), 0.5)],
        )
        .unwrap();
        let k = form.matrix().to_dense();
        assert_relative_eq!(k.clone(), k.transpose(), max_relative = 1e-12, epsilon = 1e-9);
        assert!(form.load().iter().all(|&f| f == 0.0));
    }

    #[test]
    fn prescribed_translation_is_exact() {
        let (mesh, _) = block();
        let (material, nitsche) = material();
        let everywhere = |_: &Point| true;
        let tags = mesh.tag_boundary_facets(&[(1, &everywhere)]);
        let shift = [0.02, -0.01];
        let bcs = [DirichletCondition {
            tag: 1,
            displacement: shift,
        }];
        let form = StandardForm::new(&mesh, &tags, &material, &nitsche, &bcs, std::iter::empty()).unwrap();
        assert!(crate::inf_norm(form.load().iter().copied()) > 0.0);

        let u: Vec<f64> = (0..mesh.num_vertices()).flat_map(|_| shift).collect();
        let mut r = vec![0.0; mesh.num_dofs()];
        form.add_residual(&u, &mut r);
        let scale = crate::inf_norm(form.load().iter().copied());
        for ri in r {
            assert_relative_eq!(ri, 0.0, epsilon = 1e-12 * scale);
        }
    }
}
