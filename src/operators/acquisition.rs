//! Slice acquisition forward model
//!
//! Each observed slice pixel is modelled as a weighted average of the
//! reconstruction voxels around its motion-corrected physical position. The
//! weights come from an oriented point-spread function expressed in the slice
//! frame:
//!
//! - Gaussian: in-plane FWHM of 1.2 × pixel spacing, through-plane FWHM equal
//!   to the slice thickness, truncated at `alpha_cut` standard deviations
//! - Box: uniform over one pixel footprint and the slice thickness
//!
//! Weights are normalized by their sum over the voxels inside the grid, so a
//! pixel whose kernel misses the grid predicts zero. The adjoint recomputes the
//! same weights and scatters residuals back, which keeps `<Ax, r> = <x, A*r>`
//! exact up to round-off.

use nalgebra::{Matrix3, Vector3};
use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::enums::{DeconvolutionMode, Psf};
use crate::error::{ReconstructionError, Result};
use crate::geometry::Geometry;
use crate::operators::LinearOperator;
use crate::stack::{Slice, Stack};
use crate::volume::Volume;

/// Parallel jobs of the adjoint, each owning one volume-sized accumulator.
const ADJOINT_JOBS: usize = 16;

/// FWHM = 2 sqrt(2 ln 2) σ
const FWHM_TO_VARIANCE: f64 = 8.0 * std::f64::consts::LN_2;

const IN_PLANE_FWHM_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionOptions {
    /// Kernel cut-off in standard deviations (Gaussian PSF)
    pub alpha_cut: f64,
    pub deconvolution_mode: DeconvolutionMode,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            alpha_cut: 3.0,
            deconvolution_mode: DeconvolutionMode::Full3D,
        }
    }
}

impl AcquisitionOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.alpha_cut.is_finite() || self.alpha_cut <= 0.0 {
            return Err(ReconstructionError::UnsupportedConfiguration(format!(
                "alpha_cut must be positive, got {}",
                self.alpha_cut
            )));
        }
        if let DeconvolutionMode::PredefinedCovariance(variances) = self.deconvolution_mode {
            if variances.iter().any(|&v| !v.is_finite() || v <= 0.0) {
                return Err(ReconstructionError::UnsupportedConfiguration(format!(
                    "predefined PSF variances must be positive, got {variances:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Reconstruction grid as seen by the kernels.
#[derive(Debug, Clone)]
struct GridFrame {
    origin: Vector3<f64>,
    index_to_physical: Matrix3<f64>,
    physical_to_index: Matrix3<f64>,
    /// (depth, height, width)
    dim: (usize, usize, usize),
}

impl GridFrame {
    fn new(geometry: &Geometry, dim: (usize, usize, usize)) -> Result<Self> {
        geometry.validate()?;
        if dim.0 == 0 || dim.1 == 0 || dim.2 == 0 {
            return Err(ReconstructionError::InvalidGeometry(format!(
                "reconstruction grid {dim:?} has no voxels"
            )));
        }
        let index_to_physical = geometry.index_to_physical_matrix();
        let Some(physical_to_index) = index_to_physical.try_inverse() else {
            return Err(ReconstructionError::InvalidGeometry(
                "reconstruction grid is not invertible".to_string(),
            ));
        };
        Ok(Self {
            origin: geometry.origin,
            index_to_physical,
            physical_to_index,
            dim,
        })
    }

    fn voxel_count(&self) -> usize {
        self.dim.0 * self.dim.1 * self.dim.2
    }

    fn smallest_spacing(&self) -> f64 {
        (0..3)
            .map(|a| self.index_to_physical.column(a).norm())
            .fold(f64::INFINITY, f64::min)
    }
}

/// Per-slice geometry frozen at build time.
#[derive(Debug, Clone)]
struct SliceKernel<'a> {
    offset: usize,
    height: usize,
    width: usize,
    mask: Option<ArrayView2<'a, bool>>,
    /// Physical centre of pixel (0, 0) and per-pixel steps
    origin: Vector3<f64>,
    step_x: Vector3<f64>,
    step_y: Vector3<f64>,
    /// Physical offsets to slice-frame offsets
    physical_to_slice: Matrix3<f64>,
    /// Grid index offsets to slice-frame offsets
    voxel_to_slice: Matrix3<f64>,
    psf: Psf,
    /// Gaussian: standard deviations. Box: half widths.
    extent: Vector3<f64>,
    cutoff_sq: f64,
    /// Half widths of the kernel bounding box in grid index units
    index_half_width: Vector3<f64>,
}

impl<'a> SliceKernel<'a> {
    fn new(
        slice: &'a Slice,
        psf: Psf,
        offset: usize,
        grid: &GridFrame,
        options: &AcquisitionOptions,
    ) -> Self {
        let geometry = slice.motion_corrected_geometry();
        let (height, width) = slice.dim();
        let spacing = geometry.spacing;
        let axes = geometry.direction;

        let variance = match options.deconvolution_mode {
            DeconvolutionMode::Full3D => Vector3::new(
                (IN_PLANE_FWHM_FACTOR * spacing.x).powi(2),
                (IN_PLANE_FWHM_FACTOR * spacing.y).powi(2),
                spacing.z.powi(2),
            ) / FWHM_TO_VARIANCE,
            DeconvolutionMode::OnlyInPlane => Vector3::new(
                (IN_PLANE_FWHM_FACTOR * spacing.x).powi(2),
                (IN_PLANE_FWHM_FACTOR * spacing.y).powi(2),
                grid.smallest_spacing().powi(2),
            ) / FWHM_TO_VARIANCE,
            DeconvolutionMode::PredefinedCovariance(v) => Vector3::from(v),
        };

        let (extent, support) = match psf {
            Psf::Gaussian => {
                let sigma = variance.map(f64::sqrt);
                (sigma, sigma * options.alpha_cut)
            }
            Psf::Box => {
                let half = match options.deconvolution_mode {
                    DeconvolutionMode::Full3D => spacing * 0.5,
                    DeconvolutionMode::OnlyInPlane => {
                        Vector3::new(spacing.x, spacing.y, grid.smallest_spacing()) * 0.5
                    }
                    // box with the requested variance: w² / 12 = σ²
                    DeconvolutionMode::PredefinedCovariance(_) => {
                        variance.map(|v| (3.0 * v).sqrt())
                    }
                };
                (half, half)
            }
        };

        let physical_to_slice = axes.transpose();
        let voxel_to_slice = physical_to_slice * grid.index_to_physical;
        let slice_to_voxel = grid.physical_to_index * axes;
        let index_half_width = slice_to_voxel.abs() * support;

        Self {
            offset,
            height,
            width,
            mask: slice.mask().map(|m| m.view()),
            origin: geometry.origin,
            step_x: axes.column(0) * spacing.x,
            step_y: axes.column(1) * spacing.y,
            physical_to_slice,
            voxel_to_slice,
            psf,
            extent,
            cutoff_sq: options.alpha_cut * options.alpha_cut,
            index_half_width,
        }
    }

    fn pixel_count(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    fn is_observed(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().is_none_or(|m| m[[row, col]])
    }

    /// Normalized kernel weights `(flat voxel index, weight)` of one pixel.
    fn pixel_weights(&self, row: usize, col: usize, grid: &GridFrame, buf: &mut Vec<(usize, f64)>) {
        buf.clear();
        let centre = self.origin + self.step_x * col as f64 + self.step_y * row as f64;
        let c = grid.physical_to_index * (centre - grid.origin);
        let (depth, height, width) = grid.dim;

        let range = |axis: usize, n: usize| -> Option<(usize, usize)> {
            let reach = self.index_half_width[axis];
            let lo = (c[axis] - reach).ceil().max(0.0);
            let hi = (c[axis] + reach).floor().min(n as f64 - 1.0);
            (lo <= hi).then_some((lo as usize, hi as usize))
        };
        let (Some((i0, i1)), Some((j0, j1)), Some((k0, k1))) =
            (range(0, width), range(1, height), range(2, depth))
        else {
            return;
        };

        let d0 = self.physical_to_slice * (grid.origin - centre);
        let ax = self.voxel_to_slice.column(0).into_owned();
        let ay = self.voxel_to_slice.column(1).into_owned();
        let az = self.voxel_to_slice.column(2).into_owned();

        let mut total = 0.0;
        for k in k0..=k1 {
            let dk = d0 + az * k as f64;
            for j in j0..=j1 {
                let dj = dk + ay * j as f64;
                let row_offset = (k * height + j) * width;
                for i in i0..=i1 {
                    let d = dj + ax * i as f64;
                    if let Some(w) = self.weight(&d) {
                        buf.push((row_offset + i, w));
                        total += w;
                    }
                }
            }
        }

        if total > 0.0 {
            let inv = 1.0 / total;
            buf.iter_mut().for_each(|(_, w)| *w *= inv);
        } else {
            buf.clear();
        }
    }

    #[inline]
    fn weight(&self, d: &Vector3<f64>) -> Option<f64> {
        match self.psf {
            Psf::Gaussian => {
                let q = d.component_div(&self.extent).norm_squared();
                (q <= self.cutoff_sq).then(|| (-0.5 * q).exp())
            }
            Psf::Box => {
                let eps = 1e-9;
                let inside = d.x.abs() <= self.extent.x + eps
                    && d.y.abs() <= self.extent.y + eps
                    && d.z.abs() <= self.extent.z + eps;
                inside.then_some(1.0)
            }
        }
    }

    fn project(&self, x: &[f64], grid: &GridFrame) -> Vec<f64> {
        let mut out = vec![0.0; self.pixel_count()];
        let mut buf = Vec::new();
        for row in 0..self.height {
            for col in 0..self.width {
                if !self.is_observed(row, col) {
                    continue;
                }
                self.pixel_weights(row, col, grid, &mut buf);
                out[row * self.width + col] = buf.iter().map(|&(v, w)| w * x[v]).sum();
            }
        }
        out
    }

    fn backproject(
        &self,
        residual: &[f64],
        grid: &GridFrame,
        acc: &mut [f64],
        buf: &mut Vec<(usize, f64)>,
    ) {
        for row in 0..self.height {
            for col in 0..self.width {
                let r = residual[row * self.width + col];
                if r == 0.0 || !self.is_observed(row, col) {
                    continue;
                }
                self.pixel_weights(row, col, grid, buf);
                for &(v, w) in buf.iter() {
                    acc[v] += w * r;
                }
            }
        }
    }
}

/// Forward operator A and adjoint A* for a fixed set of motion-corrected
/// slices. Output order is stack order, then slice order, then row-major
/// pixels.
#[derive(Debug, Clone)]
pub struct SliceAcquisitionOperator<'a> {
    grid: GridFrame,
    kernels: Vec<SliceKernel<'a>>,
    observed: Vec<f64>,
}

impl<'a> SliceAcquisitionOperator<'a> {
    /// # Errors
    ///
    /// `InvalidGeometry` for a degenerate grid or slice pose,
    /// `DimensionMismatch` for slice masks that do not match their slice, and
    /// `UnsupportedConfiguration` for invalid kernel options.
    pub fn build(
        stacks: &'a [Stack],
        grid: &Geometry,
        dim: (usize, usize, usize),
        options: &AcquisitionOptions,
    ) -> Result<Self> {
        let grid = GridFrame::new(grid, dim)?;
        options.validate()?;

        let mut kernels = Vec::new();
        let mut observed = Vec::new();
        for stack in stacks {
            for slice in stack.slices() {
                slice.validate()?;
                let kernel = SliceKernel::new(slice, stack.psf(), observed.len(), &grid, options);
                kernels.push(kernel);
                match slice.mask() {
                    Some(mask) => observed.extend(
                        slice
                            .data()
                            .iter()
                            .zip(mask.iter())
                            .map(|(&v, &m)| if m { v } else { 0.0 }),
                    ),
                    None => observed.extend(slice.data().iter().copied()),
                }
            }
        }

        log::debug!(
            "Built acquisition operator: {} slices, {} observations, {} voxels",
            kernels.len(),
            observed.len(),
            grid.voxel_count()
        );

        Ok(Self {
            grid,
            kernels,
            observed,
        })
    }

    /// Build for the grid of an existing volume.
    pub fn for_volume(
        stacks: &'a [Stack],
        volume: &Volume,
        options: &AcquisitionOptions,
    ) -> Result<Self> {
        Self::build(stacks, volume.geometry(), volume.dim(), options)
    }

    /// Observed intensities b, zero outside slice masks
    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn slice_count(&self) -> usize {
        self.kernels.len()
    }

    /// Copies of `stacks` holding A(x) instead of the acquired intensities.
    /// `stacks` must be the stacks the operator was built from.
    pub fn simulate_stacks(&self, stacks: &[Stack], x: &[f64]) -> Result<Vec<Stack>> {
        if x.len() != self.domain_len() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "volume vector of length {} for a grid of {} voxels",
                x.len(),
                self.domain_len()
            )));
        }
        let total: usize = stacks.iter().map(Stack::pixel_count).sum();
        if total != self.range_len() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "stacks hold {total} pixels, operator predicts {}",
                self.range_len()
            )));
        }

        let predicted = self.apply(x);
        let mut offset = 0;
        stacks
            .iter()
            .map(|stack| {
                let n = stack.pixel_count();
                let simulated = stack.with_intensities(&predicted[offset..offset + n]);
                offset += n;
                simulated
            })
            .collect()
    }
}

/// Slices per adjoint job, so that at most `ADJOINT_JOBS` accumulators exist.
fn adjoint_job_size(slices: usize) -> usize {
    slices.div_ceil(ADJOINT_JOBS).max(1)
}

impl LinearOperator for SliceAcquisitionOperator<'_> {
    fn domain_len(&self) -> usize {
        self.grid.voxel_count()
    }

    fn range_len(&self) -> usize {
        self.observed.len()
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.domain_len(), "volume vector length");
        let per_slice: Vec<Vec<f64>> = self
            .kernels
            .par_iter()
            .map(|kernel| kernel.project(x, &self.grid))
            .collect();
        per_slice.concat()
    }

    fn apply_adjoint(&self, y: &[f64]) -> Vec<f64> {
        assert_eq!(y.len(), self.range_len(), "slice vector length");
        let n = self.domain_len();

        // Fixed chunking keeps the summation order independent of scheduling.
        // The job count is fixed so peak memory does not grow with slice count.
        let job_size = adjoint_job_size(self.kernels.len());
        let partial: Vec<Vec<f64>> = self
            .kernels
            .par_chunks(job_size)
            .map(|chunk| {
                let mut acc = vec![0.0; n];
                let mut buf = Vec::new();
                for kernel in chunk {
                    let residual = &y[kernel.offset..kernel.offset + kernel.pixel_count()];
                    kernel.backproject(residual, &self.grid, &mut acc, &mut buf);
                }
                acc
            })
            .collect();

        let mut out = vec![0.0; n];
        out.par_iter_mut().enumerate().for_each(|(v, o)| {
            *o = partial.iter().map(|acc| acc[v]).sum();
        });
        out
    }
}
