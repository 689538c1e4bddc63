//! Linear operators of the slice acquisition model
//!
//! - `acquisition`: forward model A mapping a volume to predicted slice
//!   intensities, and its adjoint
//! - `gradient`: forward-difference gradient D and its adjoint
//!
//! Operators are applied on demand and never stored as matrices.

pub mod acquisition;
pub mod gradient;

pub use acquisition::*;
pub use gradient::*;

/// Matrix-free linear map with an exact adjoint.
pub trait LinearOperator: Sync {
    /// Length of the input vector
    fn domain_len(&self) -> usize;

    /// Length of the output vector
    fn range_len(&self) -> usize;

    fn apply(&self, x: &[f64]) -> Vec<f64>;

    fn apply_adjoint(&self, y: &[f64]) -> Vec<f64>;
}

/// Identity on vectors of length `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityOperator {
    pub n: usize,
}

impl LinearOperator for IdentityOperator {
    fn domain_len(&self) -> usize {
        self.n
    }

    fn range_len(&self) -> usize {
        self.n
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        x.to_vec()
    }

    fn apply_adjoint(&self, y: &[f64]) -> Vec<f64> {
        y.to_vec()
    }
}

/// Vertical concatenation `[upper; weight · lower]` of two operators sharing a domain.
pub struct StackedOperator<'o> {
    upper: &'o dyn LinearOperator,
    lower: &'o dyn LinearOperator,
    weight: f64,
}

impl<'o> StackedOperator<'o> {
    pub fn new(upper: &'o dyn LinearOperator, lower: &'o dyn LinearOperator, weight: f64) -> Self {
        assert_eq!(
            upper.domain_len(),
            lower.domain_len(),
            "stacked operator domains"
        );
        Self {
            upper,
            lower,
            weight,
        }
    }
}

impl LinearOperator for StackedOperator<'_> {
    fn domain_len(&self) -> usize {
        self.upper.domain_len()
    }

    fn range_len(&self) -> usize {
        self.upper.range_len() + self.lower.range_len()
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        let mut y = self.upper.apply(x);
        let lower = self.lower.apply(x);
        y.extend(lower.into_iter().map(|v| self.weight * v));
        y
    }

    fn apply_adjoint(&self, y: &[f64]) -> Vec<f64> {
        assert_eq!(y.len(), self.range_len(), "stacked range length");
        let (top, bottom) = y.split_at(self.upper.range_len());
        let mut x = self.upper.apply_adjoint(top);
        let lower = self.lower.apply_adjoint(bottom);
        x.iter_mut()
            .zip(lower.iter())
            .for_each(|(xi, &li)| *xi += self.weight * li);
        x
    }
}

/// Sequential dot product, so repeated solves see identical round-off.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

#[inline]
pub fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
