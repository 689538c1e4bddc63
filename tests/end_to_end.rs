mod common;

use srr_volume::{Orientation, Psf, ReconstructionConfig, RegularizationType};

use common::{acquisition_grids, rmse, simulate, smooth_phantom, zeros_like};

/// Reconstruct an `n³` phantom from an axial and a coronal stack of 3 mm
/// slices with first-order Tikhonov, starting from zero.
fn two_stack_reconstruction(n: usize, alpha: f64, iter_max: usize) {
    let truth = smooth_phantom(n);
    let grids = acquisition_grids(
        n,
        &[Orientation::Axial, Orientation::Coronal],
        3.0,
        Psf::Gaussian,
    );
    let stacks = simulate(&truth, &grids);
    let initial = zeros_like(&truth);

    let config = ReconstructionConfig {
        regularization: RegularizationType::TK1,
        alpha,
        iter_max,
        ..Default::default()
    };
    let mut solver = config.build_solver(stacks, initial.clone()).unwrap();
    let initial_residual = solver.compute_statistics().unwrap().data_residual_norm;
    assert!(initial_residual > 0.0);

    solver.run().unwrap();
    let statistics = solver.compute_statistics().unwrap();

    assert!(
        statistics.data_residual_norm < 0.01 * initial_residual,
        "residual {} of initial {}",
        statistics.data_residual_norm,
        initial_residual
    );

    let truth = truth.to_vector();
    let before = rmse(&initial.to_vector(), &truth);
    let after = rmse(&solver.reconstruction().to_vector(), &truth);
    assert!(after < 0.5 * before, "rmse {after} (initial {before})");
}

#[test]
fn test_two_stack_phantom_small() {
    two_stack_reconstruction(24, 0.01, 20);
}

#[test]
#[ignore = "slow in debug builds; run with --ignored"]
fn test_two_stack_phantom_64() {
    two_stack_reconstruction(64, 0.01, 20);
}
