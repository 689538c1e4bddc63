use crate::enums::{Orientation, Psf};
use crate::error::{ReconstructionError, Result};
use crate::geometry::{Geometry, RigidTransform};
use crate::volume::Volume;

use half::f16;
use nalgebra::Vector3;
use ndarray::{Array2, Array3, Axis};

/// Single acquired image plane.
///
/// `geometry.spacing` holds (in-plane x, in-plane y, slice thickness); the
/// third direction column is the slice normal. `motion` is the rigid
/// correction estimated upstream, applied on top of the acquisition pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    data: Array2<f64>,
    mask: Option<Array2<bool>>,
    geometry: Geometry,
    motion: RigidTransform,
    slice_number: usize,
}

impl Slice {
    pub fn new(data: Array2<f64>, geometry: Geometry, slice_number: usize) -> Self {
        Self {
            data,
            mask: None,
            geometry,
            motion: RigidTransform::identity(),
            slice_number,
        }
    }

    /// Low-precision intensities are widened to `f64` on entry.
    pub fn from_half(data: &Array2<f16>, geometry: Geometry, slice_number: usize) -> Self {
        Self::new(data.mapv(f64::from), geometry, slice_number)
    }

    /// Attach a mask. Its shape is checked when operators are built.
    pub fn with_mask(mut self, mask: Array2<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_motion(mut self, motion: RigidTransform) -> Self {
        self.motion = motion;
        self
    }

    /// Get the dimensions of the slice (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.mask.as_ref()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn motion(&self) -> &RigidTransform {
        &self.motion
    }

    pub fn slice_number(&self) -> usize {
        self.slice_number
    }

    pub fn thickness(&self) -> f64 {
        self.geometry.spacing.z
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    /// Pose of the slice in reconstruction space after motion correction.
    pub fn motion_corrected_geometry(&self) -> Geometry {
        self.geometry.transformed(&self.motion)
    }

    /// Compose a new registration estimate onto the current motion.
    pub fn update_motion_correction(&mut self, transform: &RigidTransform) {
        self.motion = transform.compose(&self.motion);
    }

    /// Shape and geometry checks performed before operators are built.
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "slice {} has no pixels",
                self.slice_number
            )));
        }
        if let Some(mask) = &self.mask {
            if mask.dim() != self.data.dim() {
                return Err(ReconstructionError::DimensionMismatch(format!(
                    "slice {} mask {:?} does not match intensities {:?}",
                    self.slice_number,
                    mask.dim(),
                    self.data.dim()
                )));
            }
        }
        self.geometry.validate()
    }

    fn with_data(&self, data: Array2<f64>) -> Self {
        Self {
            data,
            mask: self.mask.clone(),
            geometry: self.geometry.clone(),
            motion: self.motion,
            slice_number: self.slice_number,
        }
    }
}

/// Ordered slices sharing acquisition parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    name: String,
    slices: Vec<Slice>,
    psf: Psf,
}

impl Stack {
    /// Slices must share in-plane spacing and thickness.
    pub fn new(name: impl Into<String>, slices: Vec<Slice>, psf: Psf) -> Result<Self> {
        let name = name.into();
        if let Some(first) = slices.first() {
            let spacing = first.geometry.spacing;
            if slices
                .iter()
                .any(|s| (s.geometry.spacing - spacing).abs().max() > 1e-9)
            {
                return Err(ReconstructionError::DimensionMismatch(format!(
                    "slices of stack '{name}' do not share spacing and thickness"
                )));
            }
        }
        Ok(Self { name, slices, psf })
    }

    /// Split an acquired volume into its slices along the third index axis.
    /// Volume mask planes become slice masks.
    pub fn from_volume(name: impl Into<String>, volume: &Volume, psf: Psf) -> Result<Self> {
        let geometry = volume.geometry();
        let (depth, _, _) = volume.dim();
        let slices = (0..depth)
            .map(|k| {
                let plane = volume
                    .get_slice_from_axis(k, &Orientation::Axial)
                    .ok_or_else(|| {
                        ReconstructionError::DimensionMismatch(format!("missing plane {k}"))
                    })?;
                let offset = Vector3::new(0.0, 0.0, k as f64);
                let slice_geometry = Geometry {
                    origin: geometry.index_to_physical(&offset),
                    spacing: geometry.spacing,
                    direction: geometry.direction,
                };
                let mut slice = Slice::new(plane.to_owned(), slice_geometry, k);
                if let Some(mask) = volume.mask() {
                    slice = slice.with_mask(mask.index_axis(Axis(0), k).to_owned());
                }
                Ok(slice)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, slices, psf)
    }

    /// Reassemble the slices into a volume on the stack's nominal grid.
    /// The third spacing is the distance between consecutive slice origins,
    /// or the thickness for a single slice. Motion estimates are ignored.
    pub fn to_volume(&self) -> Result<Volume> {
        let Some(first) = self.slices.first() else {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "stack '{}' has no slices",
                self.name
            )));
        };
        let (height, width) = first.dim();
        if self.slices.iter().any(|s| s.dim() != (height, width)) {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "slices of stack '{}' differ in size",
                self.name
            )));
        }

        let step = match self.slices.get(1) {
            Some(second) => (second.geometry.origin - first.geometry.origin).norm(),
            None => first.thickness(),
        };
        let geometry = Geometry {
            origin: first.geometry.origin,
            spacing: Vector3::new(first.geometry.spacing.x, first.geometry.spacing.y, step),
            direction: first.geometry.direction,
        };

        let depth = self.slices.len();
        let mut data = Array3::zeros((depth, height, width));
        for (k, slice) in self.slices.iter().enumerate() {
            data.index_axis_mut(Axis(0), k).assign(slice.data());
        }
        let volume = Volume::new(data, geometry)?;

        if self
            .slices
            .iter()
            .all(|s| s.mask().is_some_and(|m| m.dim() == (height, width)))
        {
            let mut mask = Array3::from_elem((depth, height, width), false);
            for (k, slice) in self.slices.iter().enumerate() {
                if let Some(slice_mask) = slice.mask() {
                    mask.index_axis_mut(Axis(0), k).assign(slice_mask);
                }
            }
            return volume.with_mask(mask);
        }
        Ok(volume)
    }

    /// Axis-aligned synthetic acquisition grid in a given plane, with zero
    /// intensities: `size` slices of `width × height` pixels centred on
    /// `centre`.
    pub fn empty_acquisition(
        name: impl Into<String>,
        orientation: Orientation,
        centre: [f64; 3],
        size: (usize, usize, usize),
        spacing: [f64; 3],
        psf: Psf,
    ) -> Result<Self> {
        let (slices, height, width) = size;
        let direction = orientation.direction();
        let half_extent = Vector3::new(
            (width as f64 - 1.0) * spacing[0],
            (height as f64 - 1.0) * spacing[1],
            (slices as f64 - 1.0) * spacing[2],
        ) * 0.5;
        let origin = Vector3::from(centre) - direction * half_extent;
        let geometry = Geometry::new([origin.x, origin.y, origin.z], spacing)
            .with_direction(direction);
        let volume = Volume::new(Array3::zeros(size), geometry)?;
        Self::from_volume(name, &volume, psf)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn psf(&self) -> Psf {
        self.psf
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn slices_mut(&mut self) -> &mut [Slice] {
        &mut self.slices
    }

    pub fn get_slice(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)
    }

    pub fn number_of_slices(&self) -> usize {
        self.slices.len()
    }

    pub fn pixel_count(&self) -> usize {
        self.slices.iter().map(Slice::pixel_count).sum()
    }

    /// Copy of the stack with slice intensities replaced by consecutive
    /// chunks of `values` (slice order).
    pub fn with_intensities(&self, values: &[f64]) -> Result<Self> {
        if values.len() != self.pixel_count() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "stack '{}' has {} pixels, got {} values",
                self.name,
                self.pixel_count(),
                values.len()
            )));
        }
        let mut offset = 0;
        let slices = self
            .slices
            .iter()
            .map(|slice| {
                let n = slice.pixel_count();
                let chunk = values[offset..offset + n].to_vec();
                let data = Array2::from_shape_vec(slice.dim(), chunk)
                    .map_err(|e| ReconstructionError::DimensionMismatch(e.to_string()))?;
                offset += n;
                Ok(slice.with_data(data))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: self.name.clone(),
            slices,
            psf: self.psf,
        })
    }
}
