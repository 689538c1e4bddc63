use ndarray::Array3;

use crate::enums::Interpolation;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Grid size covering the same extent as `original_dim` voxels of
    /// `spacing` when resampled to `target_spacing`.
    ///
    /// `spacing` and `target_spacing` are (x, y, z); `original_dim` and the
    /// result are (depth, height, width) corresponding to (z, y, x).
    pub(crate) fn get_isotropic_dimensions(
        spacing: (f64, f64, f64),
        original_dim: (usize, usize, usize),
        target_spacing: f64,
    ) -> (usize, usize, usize) {
        let (x_spacing, y_spacing, z_spacing) = spacing;
        let inv_target = 1.0 / target_spacing; // Multiply instead of divide

        let extent = |n: usize, s: f64| ((n as f64 * s * inv_target).round() as usize).max(1);

        (
            extent(original_dim.0, z_spacing),
            extent(original_dim.1, y_spacing),
            extent(original_dim.2, x_spacing),
        )
    }

    /// Sample `data` at continuous index (x, y, z). Positions outside the
    /// sampled region return `None` instead of being clamped.
    pub(crate) fn sample(
        data: &Array3<f64>,
        x: f64,
        y: f64,
        z: f64,
        interpolation: Interpolation,
    ) -> Option<f64> {
        let (depth, height, width) = data.dim();
        let eps = 1e-9;
        let inside = |v: f64, n: usize| v >= -eps && v <= (n as f64 - 1.0) + eps;
        if !(inside(x, width) && inside(y, height) && inside(z, depth)) {
            return None;
        }

        match interpolation {
            Interpolation::NearestNeighbor => {
                let i = (x.round() as usize).min(width - 1);
                let j = (y.round() as usize).min(height - 1);
                let k = (z.round() as usize).min(depth - 1);
                Some(data[[k, j, i]])
            }
            Interpolation::Linear => Some(Self::trilinear_interpolate(data, x, y, z)),
        }
    }

    #[inline]
    fn trilinear_interpolate(data: &Array3<f64>, x: f64, y: f64, z: f64) -> f64 {
        let (depth, height, width) = data.dim();
        let x = x.clamp(0.0, (width - 1) as f64);
        let y = y.clamp(0.0, (height - 1) as f64);
        let z = z.clamp(0.0, (depth - 1) as f64);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let z1 = (z0 + 1).min(depth - 1);

        let dx = x - x0 as f64;
        let dy = y - y0 as f64;
        let dz = z - z0 as f64;

        let bilinear = |k: usize| {
            let v00 = data[[k, y0, x0]];
            let v01 = data[[k, y0, x1]];
            let v10 = data[[k, y1, x0]];
            let v11 = data[[k, y1, x1]];
            let v0 = v00.mul_add(1.0 - dx, v01 * dx);
            let v1 = v10.mul_add(1.0 - dx, v11 * dx);
            v0.mul_add(1.0 - dy, v1 * dy)
        };

        bilinear(z0).mul_add(1.0 - dz, bilinear(z1) * dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isotropic_dimensions() {
        let dim = Interpolator::get_isotropic_dimensions((1.0, 1.0, 3.0), (10, 32, 32), 1.0);
        assert_eq!(dim, (30, 32, 32));

        let dim = Interpolator::get_isotropic_dimensions((0.5, 0.5, 2.0), (4, 8, 8), 1.0);
        assert_eq!(dim, (8, 4, 4));
    }

    #[test]
    fn test_trilinear_reproduces_linear_ramp() {
        let data = Array3::from_shape_fn((4, 4, 4), |(k, j, i)| {
            i as f64 + 2.0 * j as f64 + 3.0 * k as f64
        });
        let value = Interpolator::sample(&data, 1.25, 2.5, 0.75, Interpolation::Linear);
        assert!((value.unwrap() - (1.25 + 5.0 + 2.25)).abs() < 1e-12);
    }

    #[test]
    fn test_outside_returns_none() {
        let data = Array3::<f64>::ones((3, 3, 3));
        let before = Interpolator::sample(&data, -0.5, 1.0, 1.0, Interpolation::Linear);
        assert_eq!(before, None);
        let beyond = Interpolator::sample(&data, 1.0, 1.0, 2.5, Interpolation::NearestNeighbor);
        assert_eq!(beyond, None);
        assert_eq!(
            Interpolator::sample(&data, 2.0, 2.0, 2.0, Interpolation::NearestNeighbor),
            Some(1.0)
        );
    }
}
