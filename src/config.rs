use crate::enums::{DataLoss, DeconvolutionMode, Minimizer, RegularizationType};
use crate::error::{ReconstructionError, Result};
use crate::operators::AcquisitionOptions;
use crate::solvers::{ADMMSolver, ReconstructionSolver, TikhonovSolver};
use crate::stack::Stack;
use crate::volume::Volume;

/// Parameters of a reconstruction run and of its final, higher-accuracy pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionConfig {
    pub regularization: RegularizationType,
    pub alpha: f64,
    /// Regularization parameter of the final pass
    pub alpha_final: f64,
    pub iter_max: usize,
    /// Iteration cap of the final pass
    pub iter_max_final: usize,
    pub minimizer: Minimizer,
    pub data_loss: DataLoss,
    /// ADMM penalty (TV only)
    pub rho: f64,
    /// Outer ADMM iterations (TV only)
    pub admm_iterations: usize,
    pub alpha_cut: f64,
    pub deconvolution_mode: DeconvolutionMode,
    pub verbose: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            regularization: RegularizationType::TK1,
            alpha: 0.1,
            alpha_final: 0.03,
            iter_max: 5,
            iter_max_final: 10,
            minimizer: Minimizer::NormalEquations,
            data_loss: DataLoss::Linear,
            rho: 0.5,
            admm_iterations: 10,
            alpha_cut: 3.0,
            deconvolution_mode: DeconvolutionMode::Full3D,
            verbose: false,
        }
    }
}

impl ReconstructionConfig {
    pub fn acquisition_options(&self) -> AcquisitionOptions {
        AcquisitionOptions {
            alpha_cut: self.alpha_cut,
            deconvolution_mode: self.deconvolution_mode,
        }
    }

    /// # Errors
    ///
    /// `UnsupportedConfiguration` for out-of-range parameters and for
    /// regularization, minimizer and loss combinations no solver implements.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("alpha", self.alpha), ("alpha_final", self.alpha_final)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReconstructionError::UnsupportedConfiguration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.iter_max == 0 || self.iter_max_final == 0 {
            return Err(ReconstructionError::UnsupportedConfiguration(
                "iteration caps must be positive".to_string(),
            ));
        }
        self.acquisition_options().validate()?;

        match self.regularization {
            RegularizationType::TV => {
                if !self.rho.is_finite() || self.rho <= 0.0 {
                    return Err(ReconstructionError::UnsupportedConfiguration(format!(
                        "rho must be positive, got {}",
                        self.rho
                    )));
                }
                if self.admm_iterations == 0 {
                    return Err(ReconstructionError::UnsupportedConfiguration(
                        "ADMM iterations must be positive".to_string(),
                    ));
                }
                if self.minimizer != Minimizer::NormalEquations {
                    return Err(ReconstructionError::UnsupportedConfiguration(format!(
                        "TV regularization does not support the '{}' minimizer",
                        self.minimizer
                    )));
                }
            }
            RegularizationType::TK0 | RegularizationType::TK1 => {
                if !self.data_loss.is_linear() && self.minimizer == Minimizer::NormalEquations {
                    return Err(ReconstructionError::UnsupportedConfiguration(format!(
                        "data loss '{}' requires the '{}' minimizer",
                        self.data_loss, Minimizer::BoundedNonlinear
                    )));
                }
            }
        }
        Ok(())
    }

    /// Solver for the configured regularization, parameterized for the
    /// regular (non-final) passes.
    pub fn build_solver(
        &self,
        stacks: Vec<Stack>,
        reconstruction: Volume,
    ) -> Result<Box<dyn ReconstructionSolver>> {
        self.validate()?;
        let mut solver: Box<dyn ReconstructionSolver> = match self.regularization {
            RegularizationType::TV => {
                let mut admm = ADMMSolver::new(stacks, reconstruction);
                admm.set_rho(self.rho);
                admm.set_admm_iterations(self.admm_iterations);
                Box::new(admm)
            }
            regularization => {
                Box::new(TikhonovSolver::new(stacks, reconstruction, regularization)?)
            }
        };
        solver.set_alpha(self.alpha);
        solver.set_iter_max(self.iter_max);
        solver.set_minimizer(self.minimizer);
        solver.set_data_loss(self.data_loss);
        solver.set_acquisition_options(self.acquisition_options());
        solver.set_verbose(self.verbose);
        Ok(solver)
    }

    /// Switch a solver to the final-pass parameters.
    pub fn final_pass(&self, solver: &mut dyn ReconstructionSolver) {
        solver.set_alpha(self.alpha_final);
        solver.set_iter_max(self.iter_max_final);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn empty_volume() -> Volume {
        Volume::zeros((2, 2, 2), Geometry::default()).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ReconstructionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.regularization, RegularizationType::TK1);
        assert_eq!(config.alpha_final, 0.03);
    }

    #[test]
    fn test_incompatible_combinations() {
        let robust = ReconstructionConfig {
            data_loss: DataLoss::SoftL1,
            ..Default::default()
        };
        assert!(matches!(
            robust.validate(),
            Err(ReconstructionError::UnsupportedConfiguration(_))
        ));

        let bounded_tv = ReconstructionConfig {
            regularization: RegularizationType::TV,
            minimizer: Minimizer::BoundedNonlinear,
            ..Default::default()
        };
        assert!(bounded_tv.validate().is_err());

        let robust_bounded = ReconstructionConfig {
            data_loss: DataLoss::Huber,
            minimizer: Minimizer::BoundedNonlinear,
            ..Default::default()
        };
        assert!(robust_bounded.validate().is_ok());
    }

    #[test]
    fn test_build_solver_dispatches_on_regularization() {
        let tv = ReconstructionConfig {
            regularization: RegularizationType::TV,
            alpha: 0.02,
            ..Default::default()
        };
        let solver = tv.build_solver(vec![], empty_volume()).unwrap();
        assert_eq!(solver.regularization(), RegularizationType::TV);
        assert_eq!(solver.alpha(), 0.02);
        let description = solver.describe_configuration();
        assert!(description.contains("_rho0p5_ADMMiterations10"));

        let tk0 = ReconstructionConfig {
            regularization: RegularizationType::TK0,
            ..Default::default()
        };
        let solver = tk0.build_solver(vec![], empty_volume()).unwrap();
        assert_eq!(solver.regularization(), RegularizationType::TK0);
        assert_eq!(solver.iter_max(), 5);
    }

    #[test]
    fn test_final_pass() {
        let config = ReconstructionConfig::default();
        let mut solver = config.build_solver(vec![], empty_volume()).unwrap();
        config.final_pass(solver.as_mut());
        assert_eq!(solver.alpha(), 0.03);
        assert_eq!(solver.iter_max(), 10);
    }
}
