//! Common test utilities for srr-volume integration tests
#![allow(dead_code)]

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use srr_volume::operators::AcquisitionOptions;
use srr_volume::{Geometry, Orientation, Psf, SliceAcquisitionOperator, Stack, Volume};

/// Compute RMSE between two arrays
pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum_sq / a.len() as f64).sqrt()
}

/// Seeded uniform samples in [-1, 1)
pub fn random_vector(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Isotropic 1 mm spacing with the origin at zero
pub fn unit_grid() -> Geometry {
    Geometry::new([0.0; 3], [1.0; 3])
}

/// Centre of an `n³` `unit_grid()` in physical coordinates
pub fn grid_centre(n: usize) -> [f64; 3] {
    let c = (n as f64 - 1.0) / 2.0;
    [c, c, c]
}

/// Sum of two Gaussian blobs, smooth enough to be well captured by thick
/// slices.
pub fn smooth_phantom(n: usize) -> Volume {
    let c = (n as f64 - 1.0) / 2.0;
    let (s1, s2) = (n as f64 / 6.0, n as f64 / 10.0);
    let offset = n as f64 / 6.0;
    let data = Array3::from_shape_fn((n, n, n), |(k, j, i)| {
        let (x, y, z) = (i as f64 - c, j as f64 - c, k as f64 - c);
        let r1 = x * x + y * y + z * z;
        let r2 = (x - offset).powi(2) + (y + offset).powi(2) + z * z;
        (-r1 / (2.0 * s1 * s1)).exp() + 0.5 * (-r2 / (2.0 * s2 * s2)).exp()
    });
    Volume::new(data, unit_grid()).unwrap()
}

/// Empty stacks centred on an `n³` `unit_grid()`, one per orientation, with
/// 1 mm in-plane resolution and the given slice thickness.
pub fn acquisition_grids(
    n: usize,
    orientations: &[Orientation],
    thickness: f64,
    psf: Psf,
) -> Vec<Stack> {
    let slices = ((n as f64 / thickness).floor() as usize).max(1);
    orientations
        .iter()
        .map(|&orientation| {
            Stack::empty_acquisition(
                format!("{orientation:?}"),
                orientation,
                grid_centre(n),
                (slices, n, n),
                [1.0, 1.0, thickness],
                psf,
            )
            .unwrap()
        })
        .collect()
}

/// Stacks holding A(x) of `truth`.
pub fn simulate(truth: &Volume, grids: &[Stack]) -> Vec<Stack> {
    let options = AcquisitionOptions::default();
    let op = SliceAcquisitionOperator::for_volume(grids, truth, &options)
        .unwrap();
    op.simulate_stacks(grids, &truth.to_vector()).unwrap()
}

/// Stacks holding A(x) of `truth` plus seeded noise of amplitude `noise`.
pub fn simulate_noisy(truth: &Volume, grids: &[Stack], noise: f64, seed: u64) -> Vec<Stack> {
    simulate(truth, grids)
        .into_iter()
        .enumerate()
        .map(|(s, stack)| {
            let values: Vec<f64> = stack
                .slices()
                .iter()
                .flat_map(|slice| slice.data().iter().copied().collect::<Vec<_>>())
                .zip(random_vector(stack.pixel_count(), seed + s as u64))
                .map(|(v, r)| v + noise * r)
                .collect();
            stack.with_intensities(&values).unwrap()
        })
        .collect()
}

/// Zero volume on the grid of `like`
pub fn zeros_like(like: &Volume) -> Volume {
    Volume::zeros(like.dim(), like.geometry().clone()).unwrap()
}
