//! Unbiased Nitsche contact between tagged boundary surfaces.
//!
//! Each [`ContactPair`] integrates the contact kernels over one or both of its surfaces.
//! A pair may also press a single surface against a [`RigidPlane`].
//! Before any assembly, [`Contact::update`] deforms the surface copies, rebuilds the
//! distance maps and packs kernel coefficients for the current displacement.

pub mod coefficients;
pub mod distance_map;
pub mod kernel;

use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use coefficients::{Block, CoefficientBuffer, CoefficientLayout, Packer};
pub use distance_map::{Correspondence, DistanceMap, RayGap, RigidPlane, SearchMode};
pub use kernel::{FacetGeometry, GapModel, Kernel, KernelData, KernelType, NitscheKernel};

use crate::fem::nl::timing::{add_time, Timings};
use crate::material::{ElasticityParameters, Material, Nitsche};
use crate::matrix::{GlobalMatrix, SparsityPattern};
use crate::mesh::{Mesh, MeshTags, Point, SurfaceMesh, GDIM};
use crate::quadrature::FacetQuadrature;
use crate::{Error, Index};

/// Two tagged boundary surfaces that may come into contact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactPair {
    /// Tag of the first surface.
    pub surface: i32,
    /// Tag of the opposing surface.
    pub opposite: i32,
    /// Integrate over both surfaces with weight `½` each. Otherwise only `surface` is
    /// integrated with weight `1`.
    #[serde(default = "default_two_sided")]
    pub two_sided: bool,
    #[serde(default)]
    pub gap: GapModel,
    #[serde(default)]
    pub search: SearchMode,
    /// Distance beyond which no opposing point is reported. Defaults to the largest cell
    /// diameter adjacent to either surface.
    #[serde(default)]
    pub search_radius: Option<f64>,
    /// Rigid obstacle taking the place of the `opposite` surface, which is then unused.
    /// Always found by projection and only valid for one-sided pairs.
    #[serde(default)]
    pub plane: Option<RigidPlane>,
}

fn default_two_sided() -> bool {
    true
}

impl ContactPair {
    /// Two-sided pair with a variable gap.
    pub fn unbiased(surface: i32, opposite: i32) -> Self {
        ContactPair {
            surface,
            opposite,
            two_sided: true,
            gap: GapModel::Variable,
            search: SearchMode::ClosestPoint,
            search_radius: None,
            plane: None,
        }
    }

    /// Contact of `surface` against an opposing surface that is held in place, with the gap
    /// fixed to its reference configuration.
    pub fn one_sided(surface: i32, opposite: i32) -> Self {
        ContactPair {
            two_sided: false,
            gap: GapModel::Fixed,
            ..ContactPair::unbiased(surface, opposite)
        }
    }

    /// Contact of `surface` against a rigid `plane`.
    pub fn plane(surface: i32, plane: RigidPlane) -> Self {
        ContactPair {
            two_sided: false,
            plane: Some(plane),
            ..ContactPair::unbiased(surface, surface)
        }
    }

    pub fn with_search(self, search: SearchMode) -> Self {
        ContactPair { search, ..self }
    }

    pub fn with_search_radius(self, radius: f64) -> Self {
        ContactPair {
            search_radius: Some(radius),
            ..self
        }
    }
}

/// Contact pressure at the quadrature points of one contact surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactPressure {
    pub tag: i32,
    /// Reference positions of the quadrature points.
    pub points: Vec<[f64; 2]>,
    /// Pressure per point, `None` where no opposing point was found.
    pub values: Vec<Option<f64>>,
    /// Opposing facet within the opposing surface per point, `-1` where none was found.
    pub opposite_facets: Vec<i64>,
}

/// What an integrated surface is pressed against.
#[derive(Copy, Clone, Debug)]
enum Opposite {
    Surface(usize),
    /// Normalized plane.
    Plane(RigidPlane),
}

/// One integrated surface of a contact pair.
struct ContactSide {
    surface: usize,
    opposite: Opposite,
    tag: i32,
    weight: f64,
    gap_model: GapModel,
    search: SearchMode,
    radius: f64,
    distance_map: DistanceMap,
    packer: Packer,
    coefficients: CoefficientBuffer,
    geometry: Vec<FacetGeometry>,
    rhs: NitscheKernel,
    jacobian: NitscheKernel,
}

pub struct Contact {
    surfaces: Vec<SurfaceMesh>,
    sides: Vec<ContactSide>,
    quadrature: FacetQuadrature,
    elasticity: ElasticityParameters,
    /// Number of displacement updates so far.
    generation: u64,
}

impl Contact {
    pub fn new(
        mesh: &Mesh,
        tags: &MeshTags,
        pairs: &[ContactPair],
        material: &Material,
        nitsche: &Nitsche,
        quadrature: FacetQuadrature,
    ) -> Result<Contact, Error> {
        tags.check(mesh)?;
        let mut surface_index: AHashMap<i32, usize> = AHashMap::new();
        let mut surfaces = Vec::new();
        let mut used_facets = AHashSet::new();
        let mut surface_of = |tag: i32, surfaces: &mut Vec<SurfaceMesh>| -> Result<usize, Error> {
            if surface_index.contains_key(&tag) {
                return Err(Error::OverlappingSurfaces { tag });
            }
            let facets = tags.find(tag);
            if facets.is_empty() {
                return Err(Error::EmptySurface { tag });
            }
            if !facets.iter().all(|&f| used_facets.insert(f)) {
                return Err(Error::OverlappingSurfaces { tag });
            }
            surfaces.push(SurfaceMesh::new(mesh, &facets));
            surface_index.insert(tag, surfaces.len() - 1);
            Ok(surfaces.len() - 1)
        };

        let indices = pairs
            .iter()
            .map(|pair| {
                let own = surface_of(pair.surface, &mut surfaces)?;
                let opposite = match pair.plane {
                    Some(_) if pair.two_sided => {
                        return Err(Error::InvalidParameter {
                            name: "two_sided".to_string(),
                        })
                    }
                    Some(plane) => Opposite::Plane(plane.normalized()?),
                    None => Opposite::Surface(surface_of(pair.opposite, &mut surfaces)?),
                };
                Ok((own, opposite))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let constants = nitsche.constants(material);
        let layout = CoefficientLayout::new(quadrature.num_points());
        let mut sides = Vec::new();
        for (pair, &(a, b)) in pairs.iter().zip(indices.iter()) {
            let radius = match pair.search_radius {
                Some(r) if r > 0.0 => r,
                Some(_) => {
                    return Err(Error::InvalidParameter {
                        name: "search_radius".to_string(),
                    })
                }
                None => match b {
                    Opposite::Surface(b) => max_adjacent_diameter(mesh, &surfaces[a])
                        .max(max_adjacent_diameter(mesh, &surfaces[b])),
                    Opposite::Plane(_) => max_adjacent_diameter(mesh, &surfaces[a]),
                },
            };
            // Planes are always found by projection.
            let search = match b {
                Opposite::Surface(_) => pair.search,
                Opposite::Plane(_) => SearchMode::ClosestPoint,
            };
            match b {
                Opposite::Surface(_) => log::debug!(
                    "Contact pair {} -> {}: {:?} gap, {:?} search with radius {:.3e}",
                    pair.surface,
                    pair.opposite,
                    pair.gap,
                    search,
                    radius
                ),
                Opposite::Plane(plane) => log::debug!(
                    "Contact pair {} -> plane {:?}: {:?} gap with radius {:.3e}",
                    pair.surface,
                    plane,
                    pair.gap,
                    radius
                ),
            }

            let (weight, directed) = match b {
                Opposite::Surface(b) if pair.two_sided => (
                    0.5,
                    vec![
                        (a, Opposite::Surface(b), pair.surface),
                        (b, Opposite::Surface(a), pair.opposite),
                    ],
                ),
                _ => (1.0, vec![(a, b, pair.surface)]),
            };
            for (own, opp, tag) in directed {
                let num_facets = surfaces[own].num_facets();
                let mut distance_map = DistanceMap::new(num_facets, quadrature.num_points());
                if pair.gap == GapModel::Fixed {
                    let invalid = update_distance_map(
                        &mut distance_map,
                        &surfaces,
                        own,
                        opp,
                        &quadrature,
                        search,
                        radius,
                        coefficients::REFERENCE_GENERATION,
                    );
                    if invalid > 0 {
                        log::debug!(
                            "Surface {}: {} reference quadrature points without an opposing point",
                            tag,
                            invalid
                        );
                    }
                }
                let kernel = |kernel_type| {
                    NitscheKernel::new(
                        kernel_type,
                        pair.gap,
                        layout.clone(),
                        quadrature.clone(),
                        constants,
                        weight,
                    )
                    .with_search(search)
                };
                sides.push(ContactSide {
                    surface: own,
                    opposite: opp,
                    tag,
                    weight,
                    gap_model: pair.gap,
                    search,
                    radius,
                    distance_map,
                    packer: Packer::new(layout.clone()),
                    coefficients: CoefficientBuffer::new(layout.clone(), num_facets),
                    geometry: surfaces[own]
                        .parent_facets
                        .iter()
                        .map(|&f| FacetGeometry::new(mesh, f))
                        .collect(),
                    rhs: kernel(KernelType::Rhs),
                    jacobian: kernel(KernelType::Jacobian),
                });
            }
        }

        Ok(Contact {
            surfaces,
            sides,
            quadrature,
            elasticity: material.elasticity,
            generation: coefficients::REFERENCE_GENERATION,
        })
    }

    /// Number of displacement updates seen so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Facet tags used by contact surfaces.
    pub fn surface_tags(&self) -> Vec<i32> {
        self.sides.iter().map(|s| s.tag).collect()
    }

    /// Number of quadrature points without an opposing point over all integrated surfaces.
    pub fn num_invalid_points(&self) -> usize {
        self.sides
            .iter()
            .map(|s| s.coefficients.num_invalid())
            .sum()
    }

    /// Total number of quadrature points over all integrated surfaces.
    pub fn num_points(&self) -> usize {
        self.sides
            .iter()
            .map(|s| s.geometry.len() * self.quadrature.num_points())
            .sum()
    }

    /// Integrated surfaces as parent facets with their pair weight.
    pub fn weighted_surfaces(&self) -> impl Iterator<Item = (&[usize], f64)> + '_ {
        self.sides
            .iter()
            .map(move |s| (self.surfaces[s.surface].parent_facets.as_slice(), s.weight))
    }

    /// Moves all contact surfaces by `u` and repacks the kernel coefficients.
    pub fn update(&mut self, mesh: &Mesh, u: &[f64], timings: &mut Timings) -> Result<(), Error> {
        if u.len() != mesh.num_dofs() {
            return Err(Error::SizeMismatch);
        }
        let t_begin = Instant::now();
        let Contact {
            surfaces,
            sides,
            quadrature,
            elasticity,
            generation,
        } = self;

        surfaces.iter_mut().for_each(|s| s.deform(u));
        *generation += 1;

        for side in sides
            .iter_mut()
            .filter(|s| s.gap_model == GapModel::Variable)
        {
            let invalid = update_distance_map(
                &mut side.distance_map,
                surfaces,
                side.surface,
                side.opposite,
                quadrature,
                side.search,
                side.radius,
                *generation,
            );
            if invalid > 0 {
                log::debug!(
                    "Surface {}: {} of {} quadrature points without an opposing point",
                    side.tag,
                    invalid,
                    side.distance_map.correspondences().len()
                );
            }
        }
        let t_begin = add_time(&mut timings.geometry_update, t_begin);

        for side in sides.iter_mut() {
            side.packer.pack(
                mesh,
                &surfaces[side.surface],
                opposite_surface(surfaces, side.opposite),
                &side.distance_map,
                quadrature,
                elasticity,
                side.gap_model,
                u,
                *generation,
                &mut side.coefficients,
            )?;
        }
        add_time(&mut timings.packing, t_begin);
        Ok(())
    }

    /// Couples the cells owning each integrated surface with all vertices of the opposing
    /// surface.
    pub fn insert_sparsity(&self, mesh: &Mesh, pattern: &mut SparsityPattern) {
        for side in self.sides.iter() {
            let opposite = match opposite_surface(&self.surfaces, side.opposite) {
                Some(opposite) => opposite,
                None => continue,
            };
            let opposite_dofs: Vec<usize> = opposite
                .parent_vertices
                .iter()
                .flat_map(|&v| [GDIM * v, GDIM * v + 1])
                .collect();
            for &f in self.surfaces[side.surface].parent_facets.iter() {
                let cell_dofs = mesh.cell_dofs(mesh.facet(f).cell);
                pattern.insert_block(&cell_dofs, &opposite_dofs);
                pattern.insert_block(&opposite_dofs, &cell_dofs);
            }
        }
    }

    fn check_generation(&self, side: &ContactSide) -> Result<(), Error> {
        if side.coefficients.generation() != Some(self.generation) {
            return Err(Error::StaleDistanceMap);
        }
        Ok(())
    }

    /// Evaluates `kernel` on every facet of `side` in parallel.
    fn local_contributions(
        &self,
        mesh: &Mesh,
        side: &ContactSide,
        kernel: &NitscheKernel,
    ) -> Result<Vec<(Vec<Option<usize>>, Vec<f64>)>, Error> {
        self.check_generation(side)?;
        let own = &self.surfaces[side.surface];
        let opposite = opposite_surface(&self.surfaces, side.opposite);
        let coefficients = &side.coefficients;
        let geometry = &side.geometry;
        let n = kernel.num_local_dofs();
        let size = match kernel.kernel_type() {
            KernelType::Rhs => n,
            KernelType::Jacobian => n * n,
        };
        Ok((0..geometry.len())
            .into_par_iter()
            .map(|f| {
                let data = KernelData {
                    coefficients: coefficients.row(f),
                    opposite_facets: coefficients.opposite_facets(f),
                    geometry: &geometry[f],
                };
                let mut out = vec![0.0; size];
                kernel.evaluate(&data, &mut out);
                let dofs = local_dofs(mesh, own, opposite, data.opposite_facets, f);
                (dofs, out)
            })
            .collect())
    }

    /// Adds the contact residual to `r`.
    pub fn add_residual(&self, mesh: &Mesh, r: &mut [f64]) -> Result<(), Error> {
        for side in self.sides.iter() {
            for (dofs, local) in self.local_contributions(mesh, side, &side.rhs)? {
                for (dof, v) in dofs.iter().zip(local) {
                    if let Some(dof) = dof {
                        r[*dof] += v;
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds the contact Jacobian to `jac`.
    pub fn add_jacobian(&self, mesh: &Mesh, jac: &mut GlobalMatrix) -> Result<(), Error> {
        for side in self.sides.iter() {
            for (dofs, local) in self.local_contributions(mesh, side, &side.jacobian)? {
                jac.add_local(&dofs, &local)?;
            }
        }
        Ok(())
    }

    /// Contact pressure at the quadrature points of every integrated surface.
    pub fn contact_pressure(&self, mesh: &Mesh) -> Result<Vec<ContactPressure>, Error> {
        self.sides
            .iter()
            .map(|side| {
                self.check_generation(side)?;
                let mut points = Vec::new();
                let mut values = Vec::new();
                let mut opposite_facets = Vec::new();
                for (f, (&parent, geometry)) in self.surfaces[side.surface]
                    .parent_facets
                    .iter()
                    .zip(side.geometry.iter())
                    .enumerate()
                {
                    let [a, b] = mesh.facet_points(parent);
                    points.extend(self.quadrature.points.iter().map(|&s| {
                        let x: Point = a + (b - a) * s;
                        [x.x, x.y]
                    }));
                    let data = KernelData {
                        coefficients: side.coefficients.row(f),
                        opposite_facets: side.coefficients.opposite_facets(f),
                        geometry,
                    };
                    values.extend(side.rhs.contact_pressure(&data));
                    opposite_facets.extend(data.opposite_facets.iter().map(|i| i.to_signed()));
                }
                Ok(ContactPressure {
                    tag: side.tag,
                    points,
                    values,
                    opposite_facets,
                })
            })
            .collect()
    }
}

fn opposite_surface(surfaces: &[SurfaceMesh], opposite: Opposite) -> Option<&SurfaceMesh> {
    match opposite {
        Opposite::Surface(s) => Some(&surfaces[s]),
        Opposite::Plane(_) => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn update_distance_map(
    map: &mut DistanceMap,
    surfaces: &[SurfaceMesh],
    own: usize,
    opposite: Opposite,
    quadrature: &FacetQuadrature,
    search: SearchMode,
    radius: f64,
    generation: u64,
) -> usize {
    match opposite {
        Opposite::Surface(opp) => map.update(
            &surfaces[own],
            &surfaces[opp],
            quadrature,
            search,
            radius,
            generation,
        ),
        Opposite::Plane(plane) => {
            map.update_plane(&surfaces[own], &plane, quadrature, radius, generation)
        }
    }
}

/// Global dofs of the local kernel dofs of own facet `f`. Rigid obstacles have no dofs.
fn local_dofs(
    mesh: &Mesh,
    own: &SurfaceMesh,
    opposite: Option<&SurfaceMesh>,
    opposite_facets: &[Index],
    f: usize,
) -> Vec<Option<usize>> {
    let cell = mesh.facet(own.parent_facets[f]).cell;
    let mut dofs: Vec<Option<usize>> = mesh.cell_dofs(cell).iter().map(|&d| Some(d)).collect();
    for opp in opposite_facets {
        match opposite.zip(opp.into_option()) {
            Some((opposite, opp)) => {
                let [c, d] = opposite.facet_parent_vertices(opp);
                dofs.extend([
                    Some(GDIM * c),
                    Some(GDIM * c + 1),
                    Some(GDIM * d),
                    Some(GDIM * d + 1),
                ]);
            }
            None => dofs.extend([None; 4]),
        }
    }
    dofs
}

/// Largest diameter of the cells owning the facets of `surface`.
fn max_adjacent_diameter(mesh: &Mesh, surface: &SurfaceMesh) -> f64 {
    surface
        .parent_facets
        .iter()
        .map(|&f| mesh.cell_diameter(mesh.facet(f).cell))
        .fold(0.0, f64::max)
}
