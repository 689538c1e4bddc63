mod common;

use ndarray::Array3;

use srr_volume::solvers::NumericalNonConvergence;
use srr_volume::{
    ADMMSolver, DataLoss, Minimizer, Orientation, Psf, ReconstructionConfig, ReconstructionError,
    ReconstructionSolver, RegularizationType, Stack, TikhonovSolver, Volume,
};

use common::{
    acquisition_grids, random_vector, rmse, simulate, simulate_noisy, smooth_phantom, unit_grid,
    zeros_like,
};

#[test]
fn test_identity_recovery_single_slice() {
    // One slice through a single-voxel-thick volume: A is an in-plane blur
    let n = 12;
    let truth = Volume::new(
        Array3::from_shape_fn((1, n, n), |(_, j, i)| {
            let (x, y) = (i as f64 - 5.5, j as f64 - 5.5);
            (-(x * x + y * y) / 18.0).exp()
        }),
        unit_grid(),
    )
    .unwrap();
    let grid = Stack::from_volume("single", &truth, Psf::Gaussian).unwrap();
    let stacks = simulate(&truth, &[grid]);

    let initial = zeros_like(&truth);
    let mut solver = TikhonovSolver::new(stacks, initial, RegularizationType::TK0)
        .unwrap();
    solver.set_alpha(1e-12);
    solver.set_iter_max(500);
    solver.run().unwrap();

    let recovered = solver.reconstruction().to_vector();
    let error = recovered
        .iter()
        .zip(truth.to_vector().iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(error < 1e-5, "max error {error}");
    assert!(solver.statistics().unwrap().non_convergence.is_none());
}

#[test]
fn test_regularization_is_monotone_in_alpha() {
    let n = 6;
    let samples = random_vector(n * n * n, 42);
    let data = Array3::from_shape_vec((n, n, n), samples).unwrap();
    let truth = Volume::new(data, unit_grid()).unwrap();
    let grids = acquisition_grids(
        n,
        &[
            Orientation::Axial,
            Orientation::Coronal,
            Orientation::Sagittal,
        ],
        1.0,
        Psf::Gaussian,
    );
    let stacks = simulate_noisy(&truth, &grids, 0.2, 7);

    let mut values = Vec::new();
    for alpha in [0.0, 0.01, 0.1, 1.0, 10.0] {
        let initial = zeros_like(&truth);
        let mut solver = TikhonovSolver::new(stacks.clone(), initial, RegularizationType::TK1)
            .unwrap();
        solver.set_alpha(alpha);
        solver.set_iter_max(2000);
        solver.run().unwrap();
        let statistics = solver.statistics().unwrap();
        values.push(statistics.regularization_value);
    }

    for pair in values.windows(2) {
        assert!(
            pair[1] <= pair[0] * (1.0 + 1e-6) + 1e-9,
            "regularization grew with alpha: {values:?}"
        );
    }
    assert!(values[4] < values[0]);
}

fn admm_problem(n: usize) -> (Vec<Stack>, Volume) {
    let truth = smooth_phantom(n);
    let grids = acquisition_grids(
        n,
        &[Orientation::Axial, Orientation::Coronal],
        2.0,
        Psf::Gaussian,
    );
    let data = Array3::from_elem(truth.dim(), 0.2);
    let initial = Volume::new(data, unit_grid()).unwrap();
    (simulate(&truth, &grids), initial)
}

#[test]
fn test_admm_zero_iterations_is_identity() {
    let (stacks, initial) = admm_problem(6);
    let mut solver = ADMMSolver::new(stacks, initial.clone());
    solver.set_admm_iterations(0);
    solver.run().unwrap();
    assert_eq!(solver.reconstruction(), &initial);
}

#[test]
fn test_capped_inner_solves_are_reported_not_fatal() {
    let (stacks, initial) = admm_problem(8);

    let mut admm = ADMMSolver::new(stacks.clone(), initial.clone());
    admm.set_iter_max(1);
    admm.set_admm_iterations(3);
    assert!(admm.run().is_ok());
    assert_eq!(
        admm.statistics().unwrap().non_convergence,
        Some(NumericalNonConvergence {
            capped_solves: 3,
            iteration_cap: 1,
        })
    );

    let mut tikhonov = TikhonovSolver::new(stacks, initial, RegularizationType::TK1)
        .unwrap();
    tikhonov.set_iter_max(1);
    assert!(tikhonov.run().is_ok());
    assert_eq!(
        tikhonov.statistics().unwrap().non_convergence,
        Some(NumericalNonConvergence {
            capped_solves: 1,
            iteration_cap: 1,
        })
    );
}

#[test]
fn test_admm_continuation_through_config() {
    let (stacks, initial) = admm_problem(8);
    let config = |iterations| ReconstructionConfig {
        regularization: RegularizationType::TV,
        alpha: 0.02,
        iter_max: 4,
        admm_iterations: iterations,
        ..Default::default()
    };

    let mut split = config(3)
        .build_solver(stacks.clone(), initial.clone())
        .unwrap();
    split.run().unwrap();
    split.run().unwrap();

    let mut single = config(6).build_solver(stacks, initial).unwrap();
    single.run().unwrap();

    let a = split.reconstruction().to_vector();
    let b = single.reconstruction().to_vector();
    assert!(rmse(&a, &b) < 1e-12, "rmse {}", rmse(&a, &b));
}

#[test]
fn test_unsupported_configurations() {
    let (stacks, initial) = admm_problem(4);

    let mut solver = TikhonovSolver::new(stacks.clone(), initial.clone(), RegularizationType::TK1)
        .unwrap();
    solver.set_data_loss(DataLoss::SoftL1);
    assert!(matches!(
        solver.run(),
        Err(ReconstructionError::UnsupportedConfiguration(_))
    ));

    let config = ReconstructionConfig {
        regularization: RegularizationType::TV,
        minimizer: Minimizer::BoundedNonlinear,
        ..Default::default()
    };
    assert!(matches!(
        config.build_solver(stacks, initial),
        Err(ReconstructionError::UnsupportedConfiguration(_))
    ));

    assert!("TK2".parse::<RegularizationType>().is_err());
}

#[test]
fn test_configuration_descriptions_are_distinct() {
    let (stacks, initial) = admm_problem(4);
    let variants = [
        ReconstructionConfig::default(),
        ReconstructionConfig {
            alpha: 0.2,
            ..Default::default()
        },
        ReconstructionConfig {
            iter_max: 6,
            ..Default::default()
        },
        ReconstructionConfig {
            regularization: RegularizationType::TK0,
            ..Default::default()
        },
        ReconstructionConfig {
            minimizer: Minimizer::BoundedNonlinear,
            data_loss: DataLoss::Huber,
            ..Default::default()
        },
        ReconstructionConfig {
            alpha_cut: 2.0,
            ..Default::default()
        },
        ReconstructionConfig {
            regularization: RegularizationType::TV,
            ..Default::default()
        },
        ReconstructionConfig {
            regularization: RegularizationType::TV,
            rho: 1.0,
            ..Default::default()
        },
    ];
    let descriptions: Vec<String> = variants
        .iter()
        .map(|config| {
            config
                .build_solver(stacks.clone(), initial.clone())
                .unwrap()
                .describe_configuration()
        })
        .collect();

    for (i, a) in descriptions.iter().enumerate() {
        assert!(a.starts_with("SRR_stacks2_"), "{a}");
        assert!(!a.contains('.'), "{a}");
        for b in &descriptions[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_reconstruct_stack_leaves_solver_untouched() {
    let (stacks, initial) = admm_problem(8);
    let mut solver = TikhonovSolver::new(stacks.clone(), initial.clone(), RegularizationType::TK1)
        .unwrap();
    solver.set_iter_max(5);

    let native = stacks[0].to_volume().unwrap();
    let volume = solver.reconstruct_stack(&stacks[0]).unwrap();

    // Native grid of the 2 mm stack: 4 slices of 8x8 pixels
    assert_eq!(volume.geometry(), native.geometry());
    assert!((volume.geometry().spacing.z - 2.0).abs() < 1e-12);
    assert_eq!(volume.dim(), (4, 8, 8));
    assert!(volume.data().iter().any(|&v| v != 0.0));
    assert_eq!(solver.reconstruction(), &initial);
    assert_eq!(solver.stacks().len(), 2);
    assert!(solver.statistics().is_none());
}
