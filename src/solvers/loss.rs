//! Robust data losses applied to squared residuals `z = r²`.

use crate::enums::DataLoss;

impl DataLoss {
    /// ρ(z)
    #[inline]
    pub fn rho(&self, z: f64) -> f64 {
        match self {
            DataLoss::Linear => z,
            DataLoss::SoftL1 => 2.0 * ((1.0 + z).sqrt() - 1.0),
            DataLoss::Huber => {
                if z <= 1.0 {
                    z
                } else {
                    2.0 * z.sqrt() - 1.0
                }
            }
        }
    }

    /// ρ'(z)
    #[inline]
    pub fn rho_prime(&self, z: f64) -> f64 {
        match self {
            DataLoss::Linear => 1.0,
            DataLoss::SoftL1 => 1.0 / (1.0 + z).sqrt(),
            DataLoss::Huber => {
                if z <= 1.0 {
                    1.0
                } else {
                    1.0 / z.sqrt()
                }
            }
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, DataLoss::Linear)
    }
}
