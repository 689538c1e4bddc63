use srr_volume::{
    Geometry, Orientation, Psf, ReconstructionConfig, SliceAcquisitionOperator, Stack, Volume,
    operators::AcquisitionOptions,
};

use ndarray::Array3;

/// Two ellipsoids on a weak background
fn phantom(n: usize) -> Volume {
    let c = (n as f64 - 1.0) / 2.0;
    let data = Array3::from_shape_fn((n, n, n), |(k, j, i)| {
        let (x, y, z) = (i as f64 - c, j as f64 - c, k as f64 - c);
        let outer = (x / (0.4 * n as f64)).powi(2)
            + (y / (0.3 * n as f64)).powi(2)
            + (z / (0.35 * n as f64)).powi(2);
        let inner = ((x - 0.1 * n as f64) / (0.1 * n as f64)).powi(2)
            + (y / (0.12 * n as f64)).powi(2)
            + (z / (0.1 * n as f64)).powi(2);
        match (outer <= 1.0, inner <= 1.0) {
            (_, true) => 1.0,
            (true, false) => 0.6,
            _ => 0.05,
        }
    });
    let geometry = Geometry::new([0.0; 3], [1.0; 3]);
    Volume::new(data, geometry)
        .expect("should have created phantom")
}

fn main() {
    let n = 64;
    let truth = phantom(n);
    let c = (n as f64 - 1.0) / 2.0;

    let empty: Vec<Stack> = [Orientation::Axial, Orientation::Coronal]
        .into_iter()
        .map(|orientation| {
            Stack::empty_acquisition(
                format!("{orientation:?}"),
                orientation,
                [c, c, c],
                (n / 4, n, n),
                [1.0, 1.0, 4.0],
                Psf::Gaussian,
            )
            .expect("should have created acquisition grid")
        })
        .collect();
    let options = AcquisitionOptions::default();
    let acquisition = SliceAcquisitionOperator::for_volume(&empty, &truth, &options)
        .expect("should have built acquisition operator");
    let stacks = acquisition
        .simulate_stacks(&empty, &truth.to_vector())
        .expect("should have simulated stacks");

    let initial = Volume::zeros(truth.dim(), truth.geometry().clone())
        .expect("should have created grid");
    let config = ReconstructionConfig {
        alpha: 0.01,
        iter_max: 20,
        ..Default::default()
    };
    let mut solver = config
        .build_solver(stacks, initial)
        .expect("should have built solver");
    solver.run().expect("should have reconstructed volume");

    let statistics = solver
        .compute_statistics()
        .expect("should have computed statistics");
    println!("{}", solver.describe_configuration());
    let residual = statistics.data_residual_norm;
    let regularization = statistics.regularization_value;
    println!(
        "residual {residual:.4e}, regularization {regularization:.4e}, time {:?}",
        statistics.computational_time
    );
}
