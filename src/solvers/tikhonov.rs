//! Tikhonov-regularized reconstruction
//!
//! Minimizes `0.5 Σ ρ(rᵢ²) + 0.5 α ‖L x‖²` with `r = A x − b` and `L` the
//! identity (TK0) or the gradient (TK1). With the linear loss the problem is
//! linear least squares on `[A; √α L] x ≈ [b; 0]`; robust losses go through
//! the bounded quasi-Newton minimizer with `x ≥ 0`.

use web_time::Instant;

use crate::enums::{DataLoss, Minimizer, RegularizationType};
use crate::error::{ReconstructionError, Result};
use crate::operators::{IdentityOperator, LinearOperator, StackedOperator};
use crate::solvers::cgls::{IterativeSolution, cgls_solve};
use crate::solvers::lbfgs::projected_lbfgs;
use crate::solvers::solver::{
    INNER_TOLERANCE, NumericalNonConvergence, ReconstructionSolver, SolverState, Statistics,
    data_residual_norm, intensity_scale, regularization_value,
};
use crate::stack::Stack;
use crate::volume::Volume;

pub struct TikhonovSolver {
    state: SolverState,
    regularization: RegularizationType,
}

impl TikhonovSolver {
    /// # Errors
    ///
    /// `UnsupportedConfiguration` for a regularization other than TK0 or TK1.
    pub fn new(
        stacks: Vec<Stack>,
        reconstruction: Volume,
        regularization: RegularizationType,
    ) -> Result<Self> {
        if regularization == RegularizationType::TV {
            return Err(ReconstructionError::UnsupportedConfiguration(
                "TV regularization is solved by ADMM".to_string(),
            ));
        }
        Ok(Self {
            state: SolverState::new(stacks, reconstruction),
            regularization,
        })
    }

    fn validate(&self) -> Result<()> {
        self.state.validate()?;
        if !self.state.data_loss.is_linear() && self.state.minimizer == Minimizer::NormalEquations {
            return Err(ReconstructionError::UnsupportedConfiguration(format!(
                "data loss '{}' requires the '{}' minimizer",
                self.state.data_loss, Minimizer::BoundedNonlinear
            )));
        }
        Ok(())
    }

    fn print_info(&self) {
        log::info!("Chosen regularization type: {}", self.regularization);
        log::info!(
            "Regularization parameter alpha: {}, iter_max: {}",
            self.state.alpha, self.state.iter_max
        );
        log::info!(
            "Minimizer: {}, loss: {}",
            self.state.minimizer, self.state.data_loss
        );
    }
}

/// Scaled linear least-squares solve `[A; √α L] x ≈ [b; 0]`
fn solve_normal_equations(
    acquisition: &dyn LinearOperator,
    regularizer: &dyn LinearOperator,
    alpha: f64,
    b: &[f64],
    x0: &[f64],
    iter_max: usize,
) -> IterativeSolution {
    let stacked = StackedOperator::new(acquisition, regularizer, alpha.sqrt());
    let mut rhs = b.to_vec();
    rhs.resize(stacked.range_len(), 0.0);
    cgls_solve(
        |v| stacked.apply(v),
        |v| stacked.apply_adjoint(v),
        &rhs,
        x0,
        INNER_TOLERANCE,
        iter_max,
    )
}

/// Bounded minimization of `0.5 Σ ρ(r²) + 0.5 α ‖L x‖²` over `x ≥ 0`
fn solve_bounded_nonlinear(
    acquisition: &dyn LinearOperator,
    regularizer: &dyn LinearOperator,
    alpha: f64,
    loss: DataLoss,
    b: &[f64],
    x0: &[f64],
    iter_max: usize,
) -> Result<IterativeSolution> {
    let objective = |x: &[f64]| -> (f64, Vec<f64>) {
        let ax = acquisition.apply(x);
        let mut value = 0.0;
        let weighted: Vec<f64> = ax
            .iter()
            .zip(b.iter())
            .map(|(&axi, &bi)| {
                let r = axi - bi;
                let z = r * r;
                value += 0.5 * loss.rho(z);
                loss.rho_prime(z) * r
            })
            .collect();
        let mut gradient = acquisition.apply_adjoint(&weighted);

        let lx = regularizer.apply(x);
        value += 0.5 * alpha * lx.iter().map(|v| v * v).sum::<f64>();
        let ltlx = regularizer.apply_adjoint(&lx);
        gradient
            .iter_mut()
            .zip(ltlx.iter())
            .for_each(|(g, &v)| *g += alpha * v);
        (value, gradient)
    };
    projected_lbfgs(objective, x0, 0.0, INNER_TOLERANCE, iter_max)
}

impl ReconstructionSolver for TikhonovSolver {
    fn state(&self) -> &SolverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SolverState {
        &mut self.state
    }

    fn regularization(&self) -> RegularizationType {
        self.regularization
    }

    fn run(&mut self) -> Result<()> {
        let start = Instant::now();
        self.validate()?;
        self.print_info();

        let state = &self.state;
        let (x, solution, residual, reg_value) = {
            let acquisition = state.acquisition_operator()?;
            let gradient = state.gradient_operator()?;
            let identity = IdentityOperator {
                n: acquisition.domain_len(),
            };
            let regularizer: &dyn LinearOperator = match self.regularization {
                RegularizationType::TK0 => &identity,
                _ => &gradient,
            };

            let x0 = state.reconstruction.to_vector();
            let x_scale = intensity_scale(&x0);
            let b: Vec<f64> = acquisition.observed().iter().map(|v| v / x_scale).collect();
            let x0: Vec<f64> = x0.iter().map(|v| v / x_scale).collect();

            let solution = match state.minimizer {
                Minimizer::NormalEquations => solve_normal_equations(
                    &acquisition,
                    regularizer,
                    state.alpha,
                    &b,
                    &x0,
                    state.iter_max,
                ),
                Minimizer::BoundedNonlinear => solve_bounded_nonlinear(
                    &acquisition,
                    regularizer,
                    state.alpha,
                    state.data_loss,
                    &b,
                    &x0,
                    state.iter_max,
                )?,
            };
            log::log!(
                state.progress_level(),
                "{} finished after {} iterations",
                state.minimizer,
                solution.iterations
            );

            let x: Vec<f64> = solution.x.iter().map(|v| v * x_scale).collect();
            let residual = data_residual_norm(&acquisition, &x);
            let reg_value = regularization_value(self.regularization, &x, &gradient);
            (x, solution, residual, reg_value)
        };

        let non_convergence = if solution.converged {
            None
        } else {
            log::warn!(
                "{} stopped at its iteration cap ({}) before converging",
                self.state.minimizer, self.state.iter_max
            );
            Some(NumericalNonConvergence {
                capped_solves: 1,
                iteration_cap: self.state.iter_max,
            })
        };

        self.state.reconstruction.assign_vector(&x)?;
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
            "SRR_stacks{}_{}_{}_{}_alpha{}_itermax{}_alphacut{}_{}",
            state.stacks.len(),
            self.regularization,
            state.minimizer,
            state.data_loss,
            state.alpha,
            state.iter_max,
            state.acquisition.alpha_cut,
            state.acquisition.deconvolution_mode,
        );
        description.replace('.', "p")
    }
}
