use crate::enums::{Interpolation, Orientation};
use crate::error::{ReconstructionError, Result};
use crate::geometry::Geometry;
use crate::interpolator::Interpolator;

use nalgebra::Vector3;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Zip;
use ndarray::s;
use rayon::prelude::*;

/// Regularly sampled scalar field placed in physical space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    data: Array3<f64>,
    geometry: Geometry,
    mask: Option<Array3<bool>>,
}

impl Volume {
    pub fn new(data: Array3<f64>, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;
        if data.is_empty() {
            return Err(ReconstructionError::InvalidGeometry(
                "volume must contain at least one voxel".to_string(),
            ));
        }
        Ok(Self {
            data: data.as_standard_layout().into_owned(),
            geometry,
            mask: None,
        })
    }

    pub fn zeros(dim: (usize, usize, usize), geometry: Geometry) -> Result<Self> {
        Self::new(Array3::zeros(dim), geometry)
    }

    pub fn with_mask(mut self, mask: Array3<bool>) -> Result<Self> {
        if mask.dim() != self.data.dim() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "volume mask {:?} does not match volume {:?}",
                mask.dim(),
                self.data.dim()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn mask(&self) -> Option<&Array3<bool>> {
        self.mask.as_ref()
    }

    pub fn voxel_count(&self) -> usize {
        self.data.len()
    }

    /// Samples flattened in (z, y, x) row-major order
    pub fn to_vector(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Replace the sample content, keeping geometry and mask.
    pub(crate) fn assign_vector(&mut self, x: &[f64]) -> Result<()> {
        if x.len() != self.data.len() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "vector of length {} cannot fill volume of {} voxels",
                x.len(),
                self.data.len()
            )));
        }
        self.data
            .iter_mut()
            .zip(x.iter())
            .for_each(|(dst, &src)| *dst = src);
        Ok(())
    }

    /// Copy with intensities outside the mask set to zero.
    pub fn masked(&self) -> Volume {
        let mut out = self.clone();
        if let Some(mask) = &self.mask {
            Zip::from(&mut out.data).and(mask).par_for_each(|v, &m| {
                if !m {
                    *v = 0.0;
                }
            });
        }
        out
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, f64>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data().slice(s![index, .., ..]),
            Orientation::Coronal => self.data().slice(s![.., index, ..]),
            Orientation::Sagittal => self.data().slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    /// Resample onto an isotropic grid with the same origin and orientation
    /// covering the same field of view. `spacing` defaults to the smallest
    /// current spacing. Voxels mapping outside the source grid are zero.
    pub fn isotropically_resampled(
        &self,
        spacing: Option<f64>,
        interpolation: Interpolation,
    ) -> Result<Volume> {
        let current = self.geometry.spacing;
        let target = spacing.unwrap_or(current.min());
        if !target.is_finite() || target <= 0.0 {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "isotropic spacing must be positive, got {target}"
            )));
        }

        let dim = Interpolator::get_isotropic_dimensions(
            (current.x, current.y, current.z),
            self.dim(),
            target,
        );
        let geometry = Geometry {
            origin: self.geometry.origin,
            spacing: Vector3::repeat(target),
            direction: self.geometry.direction,
        };
        let scale = Vector3::repeat(target).component_div(&current);

        let (_, height, width) = dim;
        let values: Vec<f64> = (0..dim.0 * height * width)
            .into_par_iter()
            .map(|flat| {
                let i = flat % width;
                let j = (flat / width) % height;
                let k = flat / (width * height);
                Interpolator::sample(
                    &self.data,
                    i as f64 * scale.x,
                    j as f64 * scale.y,
                    k as f64 * scale.z,
                    interpolation,
                )
                .unwrap_or(0.0)
            })
            .collect();

        let data = Array3::from_shape_vec(dim, values)
            .map_err(|e| ReconstructionError::DimensionMismatch(e.to_string()))?;
        let mut resampled = Volume::new(data, geometry)?;

        if let Some(mask) = &self.mask {
            let source = mask.mapv(|m| if m { 1.0 } else { 0.0 });
            let resampled_mask = Array3::from_shape_fn(dim, |(k, j, i)| {
                Interpolator::sample(
                    &source,
                    i as f64 * scale.x,
                    j as f64 * scale.y,
                    k as f64 * scale.z,
                    Interpolation::NearestNeighbor,
                )
                .is_some_and(|v| v > 0.5)
            });
            resampled = resampled.with_mask(resampled_mask)?;
        }
        Ok(resampled)
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_shape_mismatch() {
        let volume = Volume::zeros((2, 3, 4), Geometry::default()).unwrap();
        let result = volume.with_mask(Array3::from_elem((2, 3, 3), true));
        assert!(matches!(
            result,
            Err(ReconstructionError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_invalid_spacing_rejected() {
        let geometry = Geometry::new([0.0; 3], [1.0, 1.0, 0.0]);
        assert!(matches!(
            Volume::zeros((2, 2, 2), geometry),
            Err(ReconstructionError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_masked_zeroes_outside() {
        let volume = Volume::new(Array3::from_elem((1, 2, 2), 5.0), Geometry::default())
            .unwrap()
            .with_mask(Array3::from_shape_fn((1, 2, 2), |(_, j, i)| i == j))
            .unwrap();
        let masked = volume.masked();
        assert_eq!(masked.data()[[0, 0, 0]], 5.0);
        assert_eq!(masked.data()[[0, 0, 1]], 0.0);
        assert_eq!(masked.data()[[0, 1, 1]], 5.0);
    }

    #[test]
    fn test_isotropic_resampling_of_thick_slices() {
        let data = Array3::from_shape_fn((4, 6, 6), |(k, _, _)| k as f64);
        let geometry = Geometry::new([0.0; 3], [1.0, 1.0, 3.0]);
        let volume = Volume::new(data, geometry).unwrap();

        let resampled = volume
            .isotropically_resampled(None, Interpolation::Linear)
            .unwrap();
        assert_eq!(resampled.dim(), (12, 6, 6));
        assert_eq!(resampled.geometry().spacing, Vector3::repeat(1.0));
        // physical z = 3 mm sits exactly on source slice 1
        assert!((resampled.data()[[3, 2, 2]] - 1.0).abs() < 1e-12);
        // linear ramp in between
        assert!((resampled.data()[[4, 2, 2]] - 4.0 / 3.0).abs() < 1e-12);
        // beyond the last source slice
        assert_eq!(resampled.data()[[11, 2, 2]], 0.0);
    }

    #[test]
    fn test_get_slice_from_axis() {
        let data = Array3::from_shape_fn((2, 3, 4), |(k, j, i)| (100 * k + 10 * j + i) as f64);
        let volume = Volume::new(data, Geometry::default()).unwrap();
        let slice = volume.get_slice_from_axis(1, &Orientation::Axial);
        assert_eq!(slice.map(|s| s.dim()), Some((3, 4)));
        assert_eq!(slice.map(|s| s[[2, 3]]), Some(123.0));
        let outside = volume.get_slice_from_axis(4, &Orientation::Sagittal);
        assert!(outside.is_none());
    }
}
