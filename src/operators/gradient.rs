//! Forward-difference gradient with Neumann boundary
//!
//! `D x` holds three channels, concatenated as `[∂x, ∂y, ∂z]`, each laid out
//! like the volume. The difference at the last voxel of an axis is zero.
//! `D* z` is the negative backward divergence with the matching boundary, so
//! `<D x, z> = <x, D* z>` holds exactly.

use ndarray::{ArrayView3, ArrayViewMut3, Axis, Zip};

use crate::error::{ReconstructionError, Result};
use crate::operators::LinearOperator;

#[derive(Debug, Clone, PartialEq)]
pub struct GradientOperator {
    /// (depth, height, width)
    dim: (usize, usize, usize),
    /// (x, y, z)
    spacing: [f64; 3],
}

impl GradientOperator {
    pub fn new(dim: (usize, usize, usize), spacing: [f64; 3]) -> Result<Self> {
        if spacing.iter().any(|&h| !h.is_finite() || h <= 0.0) {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "gradient spacing must be positive, got {spacing:?}"
            )));
        }
        if dim.0 == 0 || dim.1 == 0 || dim.2 == 0 {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "gradient grid {dim:?} has no voxels"
            )));
        }
        Ok(Self { dim, spacing })
    }

    fn voxel_count(&self) -> usize {
        self.dim.0 * self.dim.1 * self.dim.2
    }

    /// Array axis for spatial channel `c` (x → 2, y → 1, z → 0)
    #[inline]
    fn axis_of(channel: usize) -> Axis {
        Axis(2 - channel)
    }

    fn forward_difference(x: &ArrayView3<f64>, mut out: ArrayViewMut3<f64>, axis: Axis, h: f64) {
        let n = x.len_of(axis);
        if n < 2 {
            return;
        }
        let inv_h = 1.0 / h;
        let head = x.slice_axis(axis, (..n - 1).into());
        let tail = x.slice_axis(axis, (1..).into());
        Zip::from(out.slice_axis_mut(axis, (..n - 1).into()))
            .and(&head)
            .and(&tail)
            .for_each(|o, &a, &b| *o = (b - a) * inv_h);
    }

    fn add_negative_backward_difference(
        g: &ArrayView3<f64>,
        mut out: ArrayViewMut3<f64>,
        axis: Axis,
        h: f64,
    ) {
        let n = g.len_of(axis);
        if n < 2 {
            return;
        }
        let inv_h = 1.0 / h;
        // g at the last voxel is zero by construction of D, so only the first
        // n - 1 entries enter the transpose.
        let g = g.slice_axis(axis, (..n - 1).into());
        Zip::from(out.slice_axis_mut(axis, (..n - 1).into()))
            .and(&g)
            .for_each(|o, &v| *o -= v * inv_h);
        Zip::from(out.slice_axis_mut(axis, (1..).into()))
            .and(&g)
            .for_each(|o, &v| *o += v * inv_h);
    }

    fn as_volume<'v>(&self, v: &'v [f64]) -> ArrayView3<'v, f64> {
        ArrayView3::from_shape(self.dim, v)
            .expect("vector length checked against grid size")
    }
}

impl LinearOperator for GradientOperator {
    fn domain_len(&self) -> usize {
        self.voxel_count()
    }

    fn range_len(&self) -> usize {
        3 * self.voxel_count()
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.domain_len(), "volume vector length");
        let n = self.voxel_count();
        let x = self.as_volume(x);
        let mut z = vec![0.0; 3 * n];
        for (c, chunk) in z.chunks_mut(n).enumerate() {
            let out = ArrayViewMut3::from_shape(self.dim, chunk)
                .expect("channel length equals grid size");
            Self::forward_difference(&x, out, Self::axis_of(c), self.spacing[c]);
        }
        z
    }

    fn apply_adjoint(&self, z: &[f64]) -> Vec<f64> {
        assert_eq!(z.len(), self.range_len(), "gradient vector length");
        let n = self.voxel_count();
        let mut x = vec![0.0; n];
        for c in 0..3 {
            let g = self.as_volume(&z[c * n..(c + 1) * n]);
            let out = ArrayViewMut3::from_shape(self.dim, &mut x[..])
                .expect("vector length equals grid size");
            Self::add_negative_backward_difference(&g, out, Self::axis_of(c), self.spacing[c]);
        }
        x
    }
}

/// Elementwise soft threshold `sign(v) · max(|v| − t, 0)`
#[inline]
pub fn shrink(v: f64, threshold: f64) -> f64 {
    if v > threshold {
        v - threshold
    } else if v < -threshold {
        v + threshold
    } else {
        0.0
    }
}
