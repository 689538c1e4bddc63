//! Physical placement of sampled grids and rigid slice motion.
//!
//! Index `(i, j, k)` addresses the `(x, y, z)` axes of a grid. Arrays are stored
//! `(depth, height, width)`, so the element for index `(i, j, k)` lives at
//! `array[[k, j, i]]`.

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::error::{ReconstructionError, Result};

const DEGENERATE_DETERMINANT: f64 = 1e-9;
const ROTATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub origin: Vector3<f64>,
    pub spacing: Vector3<f64>,
    /// Columns are the physical directions of the x, y and z index axes
    pub direction: Matrix3<f64>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new([0.0; 3], [1.0; 3])
    }
}

impl Geometry {
    pub fn new(origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self {
            origin: Vector3::from(origin),
            spacing: Vector3::from(spacing),
            direction: Matrix3::identity(),
        }
    }

    pub fn with_direction(mut self, direction: Matrix3<f64>) -> Self {
        self.direction = direction;
        self
    }

    /// Check that the grid can be inverted: positive finite spacing and a
    /// non-degenerate direction matrix.
    pub fn validate(&self) -> Result<()> {
        if self.spacing.iter().any(|&s| !s.is_finite() || s <= 0.0) {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "spacing must be positive, got ({}, {}, {})",
                self.spacing.x, self.spacing.y, self.spacing.z
            )));
        }
        if self.origin.iter().any(|o| !o.is_finite()) {
            return Err(ReconstructionError::InvalidGeometry(
                "origin must be finite".to_string(),
            ));
        }
        let det = self.direction.determinant();
        if !det.is_finite() || det.abs() < DEGENERATE_DETERMINANT {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "direction matrix is degenerate (determinant {det})"
            )));
        }
        Ok(())
    }

    /// Matrix mapping continuous index offsets to physical offsets
    #[inline]
    pub fn index_to_physical_matrix(&self) -> Matrix3<f64> {
        self.direction * Matrix3::from_diagonal(&self.spacing)
    }

    #[inline]
    pub fn index_to_physical(&self, index: &Vector3<f64>) -> Vector3<f64> {
        self.origin + self.index_to_physical_matrix() * index
    }

    /// Continuous index of a physical point. Requires a valid geometry.
    pub fn physical_to_index(&self, point: &Vector3<f64>) -> Option<Vector3<f64>> {
        self.index_to_physical_matrix()
            .try_inverse()
            .map(|inv| inv * (point - self.origin))
    }

    /// Geometry as seen after moving the grid rigidly with `transform`.
    pub fn transformed(&self, transform: &RigidTransform) -> Geometry {
        Geometry {
            origin: transform.apply_point(&self.origin),
            spacing: self.spacing,
            direction: transform.rotation.matrix() * self.direction,
        }
    }
}

/// Rigid motion `p ↦ R p + t` in physical space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Rotation from roll/pitch/yaw angles in radians followed by a translation.
    pub fn from_euler_angles(angles: [f64; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation: Rotation3::from_euler_angles(angles[0], angles[1], angles[2]),
            translation: Vector3::from(translation),
        }
    }

    /// Build from an explicit matrix, rejecting anything that is not a proper
    /// rotation.
    pub fn from_matrix(matrix: Matrix3<f64>, translation: [f64; 3]) -> Result<Self> {
        let orthogonality = (matrix.transpose() * matrix - Matrix3::identity()).norm();
        let det = matrix.determinant();
        if !orthogonality.is_finite()
            || orthogonality > ROTATION_TOLERANCE
            || (det - 1.0).abs() > ROTATION_TOLERANCE
        {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "transform matrix is not a proper rotation (determinant {det})"
            )));
        }
        Ok(Self {
            rotation: Rotation3::from_matrix_unchecked(matrix),
            translation: Vector3::from(translation),
        })
    }

    #[inline]
    pub fn apply_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * *point + self.translation
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn inverse(&self) -> RigidTransform {
        let rotation = self.rotation.inverse();
        RigidTransform {
            rotation,
            translation: -(rotation * self.translation),
        }
    }
}
