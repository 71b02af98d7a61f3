use std::time::Instant;

use ahash::AHashSet;

use super::nl::timing::{add_time, Timings};
use super::nl::NonlinearProblem;
use super::standard_form::{DirichletCondition, StandardForm};
use crate::contact::{Contact, ContactPair, ContactPressure};
use crate::material::{Material, Nitsche};
use crate::matrix::{GlobalMatrix, SparsityPattern};
use crate::mesh::{Mesh, MeshTags};
use crate::quadrature::FacetQuadrature;
use crate::{nullspace, Error};

/// Elastic bodies with weakly imposed Dirichlet conditions and Nitsche contact.
///
/// The residual is the contact contribution of every contact surface followed by the
/// linear standard form.
pub struct ContactProblem<'a> {
    mesh: &'a Mesh,
    contact: Contact,
    standard: StandardForm,
    timings: Timings,
}

impl<'a> ContactProblem<'a> {
    pub fn new(
        mesh: &'a Mesh,
        tags: &MeshTags,
        pairs: &[ContactPair],
        material: &Material,
        nitsche: &Nitsche,
        dirichlet: &[DirichletCondition],
        quadrature: FacetQuadrature,
    ) -> Result<ContactProblem<'a>, Error> {
        let contact = Contact::new(mesh, tags, pairs, material, nitsche, quadrature)?;

        // Each tag may only be used by one boundary condition or contact surface.
        let mut used: AHashSet<i32> = contact.surface_tags().into_iter().collect();
        for pair in pairs.iter().filter(|p| !p.two_sided && p.plane.is_none()) {
            used.insert(pair.opposite);
        }
        for bc in dirichlet.iter() {
            if !used.insert(bc.tag) {
                return Err(Error::OverlappingSurfaces { tag: bc.tag });
            }
        }

        let standard = StandardForm::new(
            mesh,
            tags,
            material,
            nitsche,
            dirichlet,
            contact.weighted_surfaces(),
        )?;

        log::debug!(
            "Contact problem with {} dofs, {} contact quadrature points",
            mesh.num_dofs(),
            contact.num_points()
        );

        Ok(ContactProblem {
            mesh,
            contact,
            standard,
            timings: Timings::default(),
        })
    }

    pub fn mesh(&self) -> &Mesh {
        self.mesh
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn standard_form(&self) -> &StandardForm {
        &self.standard
    }

    /// Contact pressure for the displacement of the last coefficient update.
    pub fn contact_pressure(&self) -> Result<Vec<ContactPressure>, Error> {
        self.contact.contact_pressure(self.mesh)
    }
}

impl NonlinearProblem for ContactProblem<'_> {
    fn num_variables(&self) -> usize {
        self.mesh.num_dofs()
    }

    fn update_coefficients(&mut self, x: &[f64]) -> Result<(), Error> {
        self.contact.update(self.mesh, x, &mut self.timings)
    }

    fn residual(&mut self, x: &[f64], r: &mut [f64]) -> Result<(), Error> {
        if x.len() != r.len() || r.len() != self.mesh.num_dofs() {
            return Err(Error::SizeMismatch);
        }
        let t_begin = Instant::now();
        let t_start = t_begin;
        r.iter_mut().for_each(|r| *r = 0.0);
        self.contact.add_residual(self.mesh, r)?;
        let t_begin = add_time(&mut self.timings.residual.contact, t_begin);
        self.standard.add_residual(x, r);
        let t_end = add_time(&mut self.timings.residual.standard, t_begin);
        self.timings.residual.total += t_end - t_start;
        Ok(())
    }

    fn jacobian(&mut self, _x: &[f64], jac: &mut GlobalMatrix) -> Result<(), Error> {
        let t_begin = Instant::now();
        let t_start = t_begin;
        jac.zero();
        self.contact.add_jacobian(self.mesh, jac)?;
        let t_begin = add_time(&mut self.timings.jacobian.contact, t_begin);
        self.standard.add_jacobian(jac)?;
        let t_end = add_time(&mut self.timings.jacobian.standard, t_begin);
        self.timings.jacobian.total += t_end - t_start;
        Ok(())
    }

    fn new_jacobian(&self) -> GlobalMatrix {
        let mut pattern = SparsityPattern::new(self.mesh.num_dofs());
        StandardForm::insert_sparsity(self.mesh, &mut pattern);
        self.contact.insert_sparsity(self.mesh, &mut pattern);
        pattern.build()
    }

    fn near_null_space(&self) -> Vec<Vec<f64>> {
        nullspace::rigid_motions(self.mesh)
    }

    fn timings(&mut self) -> &mut Timings {
        &mut self.timings
    }
}
