mod test_utils;

use approx::*;
use nitsche::nl::NonlinearProblem;
use nitsche::quadrature::FacetQuadrature;
use nitsche::*;
use rand::{Rng, SeedableRng};
use test_utils::*;

fn problem<'a>(
    mesh: &'a Mesh,
    tags: &MeshTags,
    pair: ContactPair,
    theta: f64,
) -> Result<ContactProblem<'a>, Error> {
    ContactProblem::new(
        mesh,
        tags,
        &[pair],
        &physical_params().material()?,
        &nitsche_params(theta).validate()?,
        &compression(0.01),
        FacetQuadrature::new(3)?,
    )
}

fn random_displacement(n: usize, amplitude: f64, seed: u64) -> Vec<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

#[test]
fn variable_gap_jacobian_matches_finite_differences() -> Result<(), Error> {
    init_logger();
    let (mesh, tags) = make_two_blocks(-0.01, 3);
    let x = random_displacement(mesh.num_dofs(), 1e-4, 42);
    for search in [SearchMode::ClosestPoint, SearchMode::Raytracing] {
        for theta in [-1.0, 0.0, 1.0] {
            let pair = unbiased_pair().with_search(search);
            let mut problem = problem(&mesh, &tags, pair, theta)?;
            let (err, scale) = jacobian_fd_error(&mut problem, &x, 1e-6);
            assert!(
                err < 1e-6 * scale,
                "{:?}, theta = {}: {} vs {}",
                search,
                theta,
                err,
                scale
            );
        }
    }
    Ok(())
}

/// Ray hits on tilted surfaces move with the rotation of the own facet.
#[test]
fn raytraced_gap_jacobian_on_tilted_surfaces() -> Result<(), Error> {
    init_logger();
    let (mesh, tags) = make_two_blocks(-0.01, 3);
    // Shear the blocks in opposite directions so the contact sides tilt against each other.
    let half = mesh.num_vertices() / 2;
    let mut x: Vec<f64> = mesh
        .vertices()
        .iter()
        .enumerate()
        .flat_map(|(v, p)| {
            let sign = if v < half { 1.0 } else { -1.0 };
            [0.0, sign * 0.02 * p.x * (1.0 - p.y.abs())]
        })
        .collect();
    for (xi, r) in x.iter_mut().zip(random_displacement(mesh.num_dofs(), 1e-4, 5)) {
        *xi += r;
    }
    let pair = unbiased_pair().with_search(SearchMode::Raytracing);
    let mut problem = problem(&mesh, &tags, pair, 1.0)?;
    let (err, scale) = jacobian_fd_error(&mut problem, &x, 1e-6);
    assert!(err < 1e-6 * scale, "{} vs {}", err, scale);
    assert_eq!(problem.contact().num_invalid_points(), 0);
    Ok(())
}

#[test]
fn fixed_gap_jacobian_matches_finite_differences() -> Result<(), Error> {
    init_logger();
    let (mesh, tags) = make_two_blocks(-0.01, 3);
    let x = random_displacement(mesh.num_dofs(), 1e-4, 7);
    let pair = ContactPair::one_sided(mesh::builder::LOWER_CONTACT, mesh::builder::UPPER_CONTACT);
    let mut problem = problem(&mesh, &tags, pair, 1.0)?;
    let (err, scale) = jacobian_fd_error(&mut problem, &x, 1e-6);
    assert!(err < 1e-6 * scale, "{} vs {}", err, scale);
    Ok(())
}

#[test]
fn symmetric_jacobian_for_symmetric_nitsche() -> Result<(), Error> {
    init_logger();
    let (mesh, tags) = make_two_blocks(-0.01, 3);
    let x = random_displacement(mesh.num_dofs(), 1e-3, 3);
    let mut problem = problem(&mesh, &tags, unbiased_pair(), 1.0)?;
    let jac = eval_jacobian(&mut problem, &x).to_dense();
    let scale = jac.amax();
    assert_relative_eq!(jac.clone(), jac.transpose(), epsilon = 1e-12 * scale);
    Ok(())
}

#[test]
fn touching_blocks_exert_no_force_at_rest() -> Result<(), Error> {
    let (mesh, tags) = make_two_blocks(0.0, 3);
    let mut problem = problem(&mesh, &tags, unbiased_pair(), 1.0)?;
    let x = vec![0.0; mesh.num_dofs()];
    problem.update_coefficients(&x)?;
    let mut r = vec![0.0; mesh.num_dofs()];
    problem.contact().add_residual(&mesh, &mut r)?;
    assert!(r.iter().all(|&v| v == 0.0));
    assert_eq!(problem.contact().num_invalid_points(), 0);
    for pressure in problem.contact_pressure()? {
        assert!(pressure.values.iter().all(|&p| p == Some(0.0)));
    }
    Ok(())
}

#[test]
fn repeated_updates_are_idempotent() -> Result<(), Error> {
    let (mesh, tags) = make_two_blocks(-0.01, 2);
    let mut problem = problem(&mesh, &tags, unbiased_pair(), 1.0)?;
    let x = random_displacement(mesh.num_dofs(), 1e-3, 11);
    let r1 = eval_residual(&mut problem, &x);
    let p1 = problem.contact_pressure()?;
    let generation = problem.contact().generation();
    let r2 = eval_residual(&mut problem, &x);
    assert_eq!(problem.contact().generation(), generation + 1);
    assert_eq!(r1, r2);
    assert_eq!(p1, problem.contact_pressure()?);
    Ok(())
}

#[test]
fn assembly_before_update_is_rejected() -> Result<(), Error> {
    let (mesh, tags) = make_two_blocks(0.0, 2);
    let mut problem = problem(&mesh, &tags, unbiased_pair(), 1.0)?;
    let x = vec![0.0; mesh.num_dofs()];
    let mut r = vec![0.0; mesh.num_dofs()];
    assert!(matches!(
        problem.residual(&x, &mut r),
        Err(Error::StaleDistanceMap)
    ));
    let mut jac = problem.new_jacobian();
    assert!(matches!(
        problem.jacobian(&x, &mut jac),
        Err(Error::StaleDistanceMap)
    ));
    Ok(())
}

#[test]
fn raytracing_agrees_with_closest_point_on_flat_surfaces() -> Result<(), Error> {
    let (mesh, tags) = make_two_blocks(-0.005, 3);
    let x = vec![0.0; mesh.num_dofs()];
    let mut closest = problem(&mesh, &tags, unbiased_pair(), 1.0)?;
    let mut raytrace = problem(
        &mesh,
        &tags,
        unbiased_pair().with_search(SearchMode::Raytracing),
        1.0,
    )?;
    let a = eval_residual(&mut closest, &x);
    let b = eval_residual(&mut raytrace, &x);
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    for (a, b) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10 * scale);
    }
    Ok(())
}
