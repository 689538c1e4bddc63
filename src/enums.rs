use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};

use crate::error::ReconstructionError;

/// Acquisition plane of a slice stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    /// Direction matrix of a stack acquired in this plane. The third column
    /// is the slice normal; all matrices are proper rotations.
    pub fn direction(&self) -> Matrix3<f64> {
        let (x, y, z) = (Vector3::x(), Vector3::y(), Vector3::z());
        match self {
            Orientation::Axial => Matrix3::identity(),
            // in-plane x, z; normal along -y
            Orientation::Coronal => Matrix3::from_columns(&[x, z, -y]),
            // in-plane y, z; normal along x
            Orientation::Sagittal => Matrix3::from_columns(&[y, z, x]),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    NearestNeighbor,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegularizationType {
    /// R(x) = ||x||²
    TK0,
    /// R(x) = ||Dx||²
    #[default]
    TK1,
    /// R(x) = ||Dx||₁
    TV,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Minimizer {
    #[default]
    NormalEquations,
    BoundedNonlinear,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DataLoss {
    #[default]
    Linear,
    SoftL1,
    Huber,
}

/// Point-spread function shape shared by the slices of a stack.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Psf {
    #[default]
    Gaussian,
    Box,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum DeconvolutionMode {
    #[default]
    Full3D,
    OnlyInPlane,
    /// Slice-frame variances (x, y, through-plane) in mm²
    PredefinedCovariance([f64; 3]),
}

impl fmt::Display for RegularizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegularizationType::TK0 => write!(f, "TK0"),
            RegularizationType::TK1 => write!(f, "TK1"),
            RegularizationType::TV => write!(f, "TV"),
        }
    }
}

impl fmt::Display for Minimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Minimizer::NormalEquations => write!(f, "normal-equations"),
            Minimizer::BoundedNonlinear => write!(f, "bounded-nonlinear"),
        }
    }
}

impl fmt::Display for DataLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLoss::Linear => write!(f, "linear"),
            DataLoss::SoftL1 => write!(f, "soft_l1"),
            DataLoss::Huber => write!(f, "huber"),
        }
    }
}

impl fmt::Display for DeconvolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeconvolutionMode::Full3D => write!(f, "full_3D"),
            DeconvolutionMode::OnlyInPlane => write!(f, "only_in_plane"),
            DeconvolutionMode::PredefinedCovariance([x, y, z]) => {
                write!(f, "predefined_covariance({x},{y},{z})")
            }
        }
    }
}

fn unsupported(kind: &str, value: &str) -> ReconstructionError {
    ReconstructionError::UnsupportedConfiguration(format!("unknown {kind} '{value}'"))
}

impl FromStr for RegularizationType {
    type Err = ReconstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TK0" => Ok(RegularizationType::TK0),
            "TK1" => Ok(RegularizationType::TK1),
            "TV" => Ok(RegularizationType::TV),
            _ => Err(unsupported("regularization type", s)),
        }
    }
}

impl FromStr for Minimizer {
    type Err = ReconstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal-equations" => Ok(Minimizer::NormalEquations),
            "bounded-nonlinear" => Ok(Minimizer::BoundedNonlinear),
            _ => Err(unsupported("minimizer", s)),
        }
    }
}

impl FromStr for DataLoss {
    type Err = ReconstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(DataLoss::Linear),
            "soft_l1" => Ok(DataLoss::SoftL1),
            "huber" => Ok(DataLoss::Huber),
            _ => Err(unsupported("data loss", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_directions_are_rotations() {
        for orientation in [
            Orientation::Axial,
            Orientation::Coronal,
            Orientation::Sagittal,
        ] {
            let d = orientation.direction();
            assert!((d.determinant() - 1.0).abs() < 1e-12);
            assert!((d.transpose() * d - Matrix3::identity()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_names_round_trip() {
        for loss in [DataLoss::Linear, DataLoss::SoftL1, DataLoss::Huber] {
            assert_eq!(loss.to_string().parse::<DataLoss>().unwrap(), loss);
        }
        for minimizer in [Minimizer::NormalEquations, Minimizer::BoundedNonlinear] {
            let parsed: Minimizer = minimizer.to_string().parse().unwrap();
            assert_eq!(parsed, minimizer);
        }
        assert_eq!(
            "TV".parse::<RegularizationType>().unwrap(),
            RegularizationType::TV
        );
        assert!("TK2".parse::<RegularizationType>().is_err());
    }
}
