//! # SRR-volume library
//!
//! This crate reconstructs a high-resolution 3D volume from several
//! low-resolution, thick-slice 2D stacks acquired in different orientations
//! (super-resolution reconstruction).
//!
//! Each acquired slice is modelled as the high-resolution volume seen through
//! an oriented point-spread function placed at the slice's motion-corrected
//! pose. Reconstruction solves the resulting regularized inverse problem:
//!  - Tikhonov (TK0: ‖x‖², TK1: ‖∇x‖²) by conjugate gradients on the
//!    normal equations, or by a bounded quasi-Newton method for robust losses
//!  - Total variation (‖∇x‖₁) by ADMM
//!
//! Forward and adjoint operators are evaluated matrix-free; slices are
//! processed in parallel using rayon.
//!
//! Registration, image I/O and bias-field correction are left to the caller:
//! stacks arrive with their motion estimates already attached.
//!
//! # Examples
//!
//! ## Reconstructing from two orthogonal stacks
//!
//! ```no_run
//! # use srr_volume::{Orientation, Psf, ReconstructionConfig, Stack, Volume};
//! # use srr_volume::geometry::Geometry;
//! # fn acquired(name: &str, orientation: Orientation) -> Stack {
//! #     Stack::empty_acquisition(name, orientation, [31.5; 3], (16, 64, 64), [1.0, 1.0, 4.0], Psf::Gaussian).unwrap()
//! # }
//! let stacks = vec![
//!     acquired("axial", Orientation::Axial),
//!     acquired("coronal", Orientation::Coronal),
//! ];
//! let initial = Volume::zeros((64, 64, 64), Geometry::new([0.0; 3], [1.0; 3]))
//!     .expect("should have created the reconstruction grid");
//!
//! let config = ReconstructionConfig::default();
//! let mut solver = config
//!     .build_solver(stacks, initial)
//!     .expect("should have accepted the default configuration");
//! solver.run().expect("should have reconstructed the volume");
//! config.final_pass(solver.as_mut());
//! solver.run().expect("should have refined the volume");
//!
//! let statistics = solver.compute_statistics().expect("should have computed statistics");
//! println!("{}: {:?}", solver.describe_configuration(), statistics);
//! ```

pub mod config;
pub mod enums;
pub mod error;
pub mod geometry;
mod interpolator;
pub mod operators;
pub mod solvers;
pub mod stack;
pub mod volume;

pub use config::ReconstructionConfig;
pub use enums::{
    DataLoss, DeconvolutionMode, Interpolation, Minimizer, Orientation, Psf, RegularizationType,
};
pub use error::{ReconstructionError, Result};
pub use geometry::{Geometry, RigidTransform};
pub use operators::{GradientOperator, LinearOperator, SliceAcquisitionOperator};
pub use solvers::{ADMMSolver, ReconstructionSolver, Statistics, TikhonovSolver};
pub use stack::{Slice, Stack};
pub use volume::Volume;
