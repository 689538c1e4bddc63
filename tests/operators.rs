mod common;

use ndarray::{Array2, Array3};

use srr_volume::operators::{AcquisitionOptions, dot, shrink};
use srr_volume::{
    DeconvolutionMode, Geometry, GradientOperator, LinearOperator, Orientation, Psf,
    RigidTransform, Slice, SliceAcquisitionOperator, Stack, Volume,
};

use common::{acquisition_grids, random_vector, smooth_phantom, unit_grid};

/// Stack of tilted, partially masked slices crossing a 10×9×8 grid.
fn moving_stack(psf: Psf, seed: u64) -> Stack {
    let slices = (0..5)
        .map(|k| {
            let geometry = Geometry::new([-1.0, -0.5, 1.0 + 1.7 * k as f64], [1.3, 1.1, 2.5]);
            let pixels = random_vector(72, seed + k as u64);
            let data = Array2::from_shape_vec((8, 9), pixels).unwrap();
            let mask = Array2::from_shape_fn((8, 9), |(r, c)| (r + c + k) % 4 != 0);
            let motion = RigidTransform::from_euler_angles(
                [0.1 * k as f64, -0.2, 0.05],
                [0.3, -0.2 * k as f64, 0.4],
            );
            Slice::new(data, geometry, k)
                .with_mask(mask)
                .with_motion(motion)
        })
        .collect();
    Stack::new(format!("moving-{seed}"), slices, psf).unwrap()
}

fn assert_adjoint(op: &dyn LinearOperator, seed: u64) {
    let x = random_vector(op.domain_len(), seed);
    let r = random_vector(op.range_len(), seed + 1000);
    let lhs = dot(&op.apply(&x), &r);
    let rhs = dot(&x, &op.apply_adjoint(&r));
    assert!(
        (lhs - rhs).abs() <= 1e-10 * lhs.abs().max(rhs.abs()).max(1e-12),
        "<Ax, r> = {lhs}, <x, A*r> = {rhs}"
    );
}

#[test]
fn test_acquisition_adjointness_with_motion_and_masks() {
    let stacks = vec![moving_stack(Psf::Gaussian, 1), moving_stack(Psf::Box, 2)];
    let grid = Geometry::new([0.0; 3], [0.8, 1.0, 1.2]);
    let options = AcquisitionOptions::default();
    let op = SliceAcquisitionOperator::build(&stacks, &grid, (8, 9, 10), &options)
        .unwrap();
    let predicted = op.apply(&vec![1.0; op.domain_len()]);
    assert!(predicted.iter().any(|&v| v != 0.0));
    assert_adjoint(&op, 3);
}

#[test]
fn test_acquisition_adjointness_for_deconvolution_modes() {
    let stacks = acquisition_grids(
        7,
        &[Orientation::Coronal, Orientation::Sagittal],
        2.0,
        Psf::Gaussian,
    );
    let grid = unit_grid();
    for mode in [
        DeconvolutionMode::OnlyInPlane,
        DeconvolutionMode::PredefinedCovariance([0.4, 0.3, 1.5]),
    ] {
        let options = AcquisitionOptions {
            alpha_cut: 2.5,
            deconvolution_mode: mode,
        };
        let op = SliceAcquisitionOperator::build(&stacks, &grid, (7, 7, 7), &options)
            .unwrap();
        assert_adjoint(&op, 17);
    }
}

#[test]
fn test_gradient_adjointness() {
    let op = GradientOperator::new((6, 5, 7), [0.7, 1.0, 2.5]).unwrap();
    assert_adjoint(&op, 5);
}

#[test]
fn test_constant_volume_predicts_constant_slices() {
    let data = Array3::from_elem((8, 8, 8), 2.5);
    let volume = Volume::new(data, unit_grid()).unwrap();
    let stacks = acquisition_grids(
        8,
        &[Orientation::Axial, Orientation::Coronal],
        2.0,
        Psf::Gaussian,
    );
    let options = AcquisitionOptions::default();
    let op = SliceAcquisitionOperator::for_volume(&stacks, &volume, &options)
        .unwrap();
    for v in op.apply(&volume.to_vector()) {
        assert!((v - 2.5).abs() < 1e-12, "{v}");
    }
}

#[test]
fn test_simulated_stacks_are_reproducible() {
    let truth = smooth_phantom(8);
    let grids = acquisition_grids(8, &[Orientation::Sagittal], 2.0, Psf::Box);
    let first = common::simulate(&truth, &grids);
    let second = common::simulate(&truth, &grids);
    assert_eq!(first, second);
    assert_eq!(first[0].number_of_slices(), 4);
}

#[test]
fn test_shrinkage_values() {
    assert_eq!(shrink(5.0, 2.0), 3.0);
    assert_eq!(shrink(1.0, 2.0), 0.0);
    assert_eq!(shrink(-3.5, 0.5), -3.0);
}
