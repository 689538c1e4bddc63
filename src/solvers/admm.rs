//! Total-variation reconstruction by ADMM
//!
//! Minimizes `0.5 ‖A x − b‖² + α ‖D x‖₁` through the split `v = D x` with a
//! fixed penalty ρ:
//!
//! - x-update: least squares on `[A; √ρ D] x ≈ [b; √ρ (v − μ/ρ)]`
//! - v-update: `v = shrink(D x + μ/ρ, α/ρ)`
//! - dual update: `μ ← μ + ρ (D x − v)`
//!
//! The iterate `(x, v, μ)` survives between `run()` calls, so two runs of N
//! iterations equal one run of 2N.

use rayon::prelude::*;
use web_time::Instant;

use crate::enums::{DataLoss, Minimizer, RegularizationType};
use crate::error::{ReconstructionError, Result};
use crate::operators::{LinearOperator, StackedOperator, shrink};
use crate::solvers::cgls::cgls_solve;
use crate::solvers::solver::{
    Continuation, INNER_TOLERANCE, NumericalNonConvergence, ReconstructionSolver, SolverState,
    Statistics, data_residual_norm, intensity_scale, regularization_value,
};
use crate::stack::Stack;
use crate::volume::Volume;

pub struct ADMMSolver {
    state: SolverState,
    rho: f64,
    admm_iterations: usize,
}

impl ADMMSolver {
    pub fn new(stacks: Vec<Stack>, reconstruction: Volume) -> Self {
        Self {
            state: SolverState::new(stacks, reconstruction),
            rho: 0.5,
            admm_iterations: 10,
        }
    }

    pub fn set_rho(&mut self, rho: f64) {
        self.rho = rho;
    }

    pub fn set_admm_iterations(&mut self, iterations: usize) {
        self.admm_iterations = iterations;
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn admm_iterations(&self) -> usize {
        self.admm_iterations
    }

    fn validate(&self) -> Result<()> {
        self.state.validate()?;
        if !self.rho.is_finite() || self.rho <= 0.0 {
            return Err(ReconstructionError::UnsupportedConfiguration(format!(
                "ADMM penalty rho must be positive, got {}",
                self.rho
            )));
        }
        if self.state.minimizer != Minimizer::NormalEquations {
            return Err(ReconstructionError::UnsupportedConfiguration(format!(
                "ADMM solves its x-update with '{}', not '{}'",
                Minimizer::NormalEquations, self.state.minimizer
            )));
        }
        Ok(())
    }

    fn print_info(&self) {
        log::info!("Chosen regularization type: TV");
        log::info!(
            "Regularization parameter alpha: {}, rho: {}",
            self.state.alpha, self.rho
        );
        log::info!(
            "ADMM iterations: {}, iter_max per x-update: {}",
            self.admm_iterations, self.state.iter_max
        );
        if !self.state.data_loss.is_linear() {
            log::warn!(
                "Data loss '{}' is not supported by ADMM, using '{}'",
                self.state.data_loss, DataLoss::Linear
            );
        }
    }
}

impl ReconstructionSolver for ADMMSolver {
    fn state(&self) -> &SolverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SolverState {
        &mut self.state
    }

    fn regularization(&self) -> RegularizationType {
        RegularizationType::TV
    }

    fn run(&mut self) -> Result<()> {
        let start = Instant::now();
        self.validate()?;
        self.print_info();

        let state = &self.state;
        let rho = self.rho;
        let threshold = state.alpha / rho;
        let level = state.progress_level();

        let (continuation, capped_solves, residual, reg_value) = {
            let acquisition = state.acquisition_operator()?;
            let gradient = state.gradient_operator()?;
            let n = acquisition.domain_len();

            let mut iterate = match &state.continuation {
                Some(c) if c.x.len() == n => c.clone(),
                _ => {
                    let x0 = state.reconstruction.to_vector();
                    let x_scale = intensity_scale(&x0);
                    let x: Vec<f64> = x0.iter().map(|v| v / x_scale).collect();
                    let v = gradient.apply(&x);
                    Continuation {
                        x_scale,
                        mu: vec![0.0; v.len()],
                        x,
                        v,
                    }
                }
            };

            let b: Vec<f64> = acquisition
                .observed()
                .iter()
                .map(|v| v / iterate.x_scale)
                .collect();
            let stacked = StackedOperator::new(&acquisition, &gradient, rho.sqrt());
            let mut capped_solves = 0;

            for iteration in 0..self.admm_iterations {
                let mut rhs = b.clone();
                rhs.extend(
                    iterate
                        .v
                        .iter()
                        .zip(iterate.mu.iter())
                        .map(|(&v, &mu)| rho.sqrt() * (v - mu / rho)),
                );
                let solution = cgls_solve(
                    |x| stacked.apply(x),
                    |y| stacked.apply_adjoint(y),
                    &rhs,
                    &iterate.x,
                    INNER_TOLERANCE,
                    state.iter_max,
                );
                if !solution.converged {
                    capped_solves += 1;
                }
                iterate.x = solution.x;

                let dx = gradient.apply(&iterate.x);
                iterate
                    .v
                    .par_iter_mut()
                    .zip(dx.par_iter().zip(iterate.mu.par_iter()))
                    .for_each(|(v, (&d, &mu))| *v = shrink(d + mu / rho, threshold));
                iterate
                    .mu
                    .par_iter_mut()
                    .zip(dx.par_iter().zip(iterate.v.par_iter()))
                    .for_each(|(mu, (&d, &v))| *mu += rho * (d - v));

                log::log!(
                    level,
                    "ADMM iteration {}/{}: x-update took {} iterations",
                    iteration + 1,
                    self.admm_iterations,
                    solution.iterations
                );
            }

            let x: Vec<f64> = iterate.x.iter().map(|v| v * iterate.x_scale).collect();
            let residual = data_residual_norm(&acquisition, &x);
            let reg_value = regularization_value(RegularizationType::TV, &x, &gradient);
            (iterate, capped_solves, residual, reg_value)
        };

        // Zero iterations leave the volume bit-identical
        if self.admm_iterations > 0 {
            let x: Vec<f64> = continuation
                .x
                .iter()
                .map(|v| v * continuation.x_scale)
                .collect();
            self.state.reconstruction.assign_vector(&x)?;
            self.state.continuation = Some(continuation);
        }

        let non_convergence = (capped_solves > 0).then(|| {
            log::debug!(
                "{} of {} x-updates hit the iteration cap {}",
                capped_solves, self.admm_iterations, self.state.iter_max
            );
            NumericalNonConvergence {
                capped_solves,
                iteration_cap: self.state.iter_max,
            }
        });

        let computational_time = start.elapsed();
        log::info!("Computational time: {:?}", computational_time);
        self.state.statistics = Some(Statistics {
            data_residual_norm: residual,
            regularization_value: reg_value,
            computational_time,
            non_convergence,
        });
        Ok(())
    }

    fn describe_configuration(&self) -> String {
        let state = &self.state;
        // Decimal points become 'p'
        let description = format!(
            "SRR_stacks{}_TV_ADMM_{}_{}_alpha{}_itermax{}_rho{}_ADMMiterations{}_alphacut{}_{}",
            state.stacks.len(),
            Minimizer::NormalEquations,
            DataLoss::Linear,
            state.alpha,
            state.iter_max,
            self.rho,
            self.admm_iterations,
            state.acquisition.alpha_cut,
            state.acquisition.deconvolution_mode,
        );
        description.replace('.', "p")
    }
}
