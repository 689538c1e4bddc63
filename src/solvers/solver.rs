//! State and behaviour shared by all reconstruction solvers

use std::time::Duration;

use log::Level;

use crate::enums::{DataLoss, Minimizer, RegularizationType};
use crate::error::{ReconstructionError, Result};
use crate::operators::{
    AcquisitionOptions, GradientOperator, LinearOperator, SliceAcquisitionOperator, dot, norm,
};
use crate::stack::Stack;
use crate::volume::Volume;

/// Relative tolerance of every inner iterative solve
pub(crate) const INNER_TOLERANCE: f64 = 1e-10;

/// An inner solve stopped at its iteration cap before meeting its tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericalNonConvergence {
    /// Inner solves that hit the cap during the last `run()`
    pub capped_solves: usize,
    pub iteration_cap: usize,
}

/// Diagnostics of the current reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// ‖A x − b‖₂
    pub data_residual_norm: f64,
    /// ‖x‖² (TK0), ‖Dx‖² (TK1) or ‖Dx‖₁ (TV)
    pub regularization_value: f64,
    /// Wall-clock time of the last `run()`
    pub computational_time: Duration,
    pub non_convergence: Option<NumericalNonConvergence>,
}

/// ADMM iterate kept between runs: `(x_scale, x / x_scale, v, μ)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Continuation {
    pub x_scale: f64,
    pub x: Vec<f64>,
    pub v: Vec<f64>,
    pub mu: Vec<f64>,
}

/// Inputs, parameters and outputs of a solver.
#[derive(Debug, Clone)]
pub struct SolverState {
    pub(crate) stacks: Vec<Stack>,
    pub(crate) reconstruction: Volume,
    pub(crate) alpha: f64,
    pub(crate) iter_max: usize,
    pub(crate) minimizer: Minimizer,
    pub(crate) data_loss: DataLoss,
    pub(crate) acquisition: AcquisitionOptions,
    pub(crate) verbose: bool,
    pub(crate) statistics: Option<Statistics>,
    pub(crate) continuation: Option<Continuation>,
}

impl SolverState {
    pub fn new(stacks: Vec<Stack>, reconstruction: Volume) -> Self {
        Self {
            stacks,
            reconstruction,
            alpha: 0.03,
            iter_max: 10,
            minimizer: Minimizer::default(),
            data_loss: DataLoss::default(),
            acquisition: AcquisitionOptions::default(),
            verbose: false,
            statistics: None,
            continuation: None,
        }
    }

    /// Same parameters on new inputs, without statistics or continuation
    fn with_inputs(&self, stacks: Vec<Stack>, reconstruction: Volume) -> Self {
        Self {
            stacks,
            reconstruction,
            alpha: self.alpha,
            iter_max: self.iter_max,
            minimizer: self.minimizer,
            data_loss: self.data_loss,
            acquisition: self.acquisition,
            verbose: self.verbose,
            statistics: None,
            continuation: None,
        }
    }

    /// Checks shared by every solver, run before any operator is built.
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(ReconstructionError::UnsupportedConfiguration(format!(
                "regularization parameter must be non-negative, got {}",
                self.alpha
            )));
        }
        if self.iter_max == 0 {
            return Err(ReconstructionError::UnsupportedConfiguration(
                "iter_max must be positive".to_string(),
            ));
        }
        if self.stacks.is_empty() {
            return Err(ReconstructionError::DimensionMismatch(
                "no stacks to reconstruct from".to_string(),
            ));
        }
        self.acquisition.validate()?;
        self.reconstruction.geometry().validate()?;
        for stack in &self.stacks {
            for slice in stack.slices() {
                slice.validate()?;
            }
        }
        Ok(())
    }

    pub(crate) fn acquisition_operator(&self) -> Result<SliceAcquisitionOperator<'_>> {
        SliceAcquisitionOperator::for_volume(&self.stacks, &self.reconstruction, &self.acquisition)
    }

    pub(crate) fn gradient_operator(&self) -> Result<GradientOperator> {
        let spacing = self.reconstruction.geometry().spacing;
        GradientOperator::new(self.reconstruction.dim(), [spacing.x, spacing.y, spacing.z])
    }

    /// Level of per-iteration progress messages
    pub(crate) fn progress_level(&self) -> Level {
        if self.verbose { Level::Info } else { Level::Debug }
    }
}

/// `max(x)`, or 1 when the estimate carries no positive intensity.
pub(crate) fn intensity_scale(x: &[f64]) -> f64 {
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() && max > 0.0 { max } else { 1.0 }
}

pub(crate) fn regularization_value(
    regularization: RegularizationType,
    x: &[f64],
    gradient: &GradientOperator,
) -> f64 {
    match regularization {
        RegularizationType::TK0 => dot(x, x),
        RegularizationType::TK1 => {
            let dx = gradient.apply(x);
            dot(&dx, &dx)
        }
        RegularizationType::TV => gradient.apply(x).iter().map(|v| v.abs()).sum(),
    }
}

/// ‖A x − b‖₂
pub(crate) fn data_residual_norm(acquisition: &SliceAcquisitionOperator, x: &[f64]) -> f64 {
    let residual: Vec<f64> = acquisition
        .apply(x)
        .iter()
        .zip(acquisition.observed().iter())
        .map(|(&ax, &b)| ax - b)
        .collect();
    norm(&residual)
}

/// Shared solver contract: configure, `run()`, inspect.
pub trait ReconstructionSolver {
    fn state(&self) -> &SolverState;

    fn state_mut(&mut self) -> &mut SolverState;

    fn regularization(&self) -> RegularizationType;

    /// Minimize the solver's objective starting from the current
    /// reconstruction and overwrite it with the result.
    ///
    /// # Errors
    ///
    /// Configuration and geometry are validated before any operator is built.
    fn run(&mut self) -> Result<()>;

    /// Deterministic identifier of all active parameters.
    fn describe_configuration(&self) -> String;

    fn set_alpha(&mut self, alpha: f64) {
        self.state_mut().alpha = alpha;
    }

    fn set_iter_max(&mut self, iter_max: usize) {
        self.state_mut().iter_max = iter_max;
    }

    fn set_stacks(&mut self, stacks: Vec<Stack>) {
        let state = self.state_mut();
        state.stacks = stacks;
        state.continuation = None;
    }

    fn set_reconstruction(&mut self, reconstruction: Volume) {
        let state = self.state_mut();
        state.reconstruction = reconstruction;
        state.continuation = None;
    }

    fn set_minimizer(&mut self, minimizer: Minimizer) {
        self.state_mut().minimizer = minimizer;
    }

    fn set_data_loss(&mut self, data_loss: DataLoss) {
        self.state_mut().data_loss = data_loss;
    }

    fn set_acquisition_options(&mut self, options: AcquisitionOptions) {
        self.state_mut().acquisition = options;
    }

    fn set_verbose(&mut self, verbose: bool) {
        self.state_mut().verbose = verbose;
    }

    fn alpha(&self) -> f64 {
        self.state().alpha
    }

    fn iter_max(&self) -> usize {
        self.state().iter_max
    }

    fn stacks(&self) -> &[Stack] {
        &self.state().stacks
    }

    fn reconstruction(&self) -> &Volume {
        &self.state().reconstruction
    }

    /// Move the reconstruction out, leaving an empty volume behind.
    fn take_reconstruction(&mut self) -> Volume {
        let state = self.state_mut();
        state.continuation = None;
        std::mem::take(&mut state.reconstruction)
    }

    /// Statistics of the last `run()` or `compute_statistics()`
    fn statistics(&self) -> Option<&Statistics> {
        self.state().statistics.as_ref()
    }

    /// Residual and regularization value of the current reconstruction.
    /// Timing and convergence information of the last run are kept.
    fn compute_statistics(&mut self) -> Result<Statistics> {
        let regularization = self.regularization();
        let statistics = {
            let state = self.state();
            let x = state.reconstruction.to_vector();
            let acquisition = state.acquisition_operator()?;
            let gradient = state.gradient_operator()?;
            let (computational_time, non_convergence) = state
                .statistics
                .as_ref()
                .map(|s| (s.computational_time, s.non_convergence))
                .unwrap_or_default();

            Statistics {
                data_residual_norm: data_residual_norm(&acquisition, &x),
                regularization_value: regularization_value(regularization, &x, &gradient),
                computational_time,
                non_convergence,
            }
        };
        self.state_mut().statistics = Some(statistics.clone());
        Ok(statistics)
    }

    /// Reconstruct a single stack on its own native grid, starting from its
    /// own intensities. The solver's inputs, result and statistics are
    /// restored afterwards.
    fn reconstruct_stack(&mut self, stack: &Stack) -> Result<Volume> {
        let initial = stack.to_volume()?;
        let isolated = self.state().with_inputs(vec![stack.clone()], initial);
        let saved = std::mem::replace(self.state_mut(), isolated);
        log::info!("Reconstruct stack '{}'", stack.name());
        let outcome = self.run();
        let finished = std::mem::replace(self.state_mut(), saved);
        outcome.map(|()| finished.reconstruction)
    }
}
