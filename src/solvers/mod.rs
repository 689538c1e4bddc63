//! Reconstruction solvers
//!
//! - `solver`: shared state, statistics and the `ReconstructionSolver` trait
//! - `tikhonov`: TK0/TK1 regularization
//! - `admm`: total variation by ADMM
//! - `cgls`, `lbfgs`: inner iterative solvers
//! - `loss`: robust data losses

pub mod admm;
pub mod cgls;
pub mod lbfgs;
pub mod loss;
pub mod solver;
pub mod tikhonov;

pub use admm::ADMMSolver;
pub use solver::{NumericalNonConvergence, ReconstructionSolver, SolverState, Statistics};
pub use tikhonov::TikhonovSolver;
