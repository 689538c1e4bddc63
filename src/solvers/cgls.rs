//! Conjugate gradient for least squares (CGLS)
//!
//! Solves min ||Ax - b||₂ by running conjugate gradients on the normal
//! equations AᵀA x = Aᵀb without forming AᵀA, warm-started from `x0`.

use crate::operators::dot;

/// Result of an iterative solve capped at a number of iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct IterativeSolution {
    pub x: Vec<f64>,
    pub iterations: usize,
    /// Tolerance met before the iteration cap
    pub converged: bool,
}

/// CGLS solver
///
/// # Arguments
/// * `a_op` - Closure that computes A*x
/// * `at_op` - Closure that computes Aᵀ*y
/// * `b` - Right-hand side vector
/// * `x0` - Initial guess
/// * `tol` - Relative tolerance on the normal-equation residual ||Aᵀ(b - Ax)||
/// * `max_iter` - Maximum iterations
pub fn cgls_solve<F, G>(
    a_op: F,
    at_op: G,
    b: &[f64],
    x0: &[f64],
    tol: f64,
    max_iter: usize,
) -> IterativeSolution
where
    F: Fn(&[f64]) -> Vec<f64>,
    G: Fn(&[f64]) -> Vec<f64>,
{
    let mut x = x0.to_vec();

    // r = b - A*x
    let ax = a_op(&x);
    let mut r: Vec<f64> = b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect();

    let mut s = at_op(&r);
    let mut p = s.clone();
    let mut gamma = dot(&s, &s);
    let threshold = tol * gamma.sqrt();

    let mut iterations = 0;
    let mut converged = gamma.sqrt() <= threshold || gamma == 0.0;

    while !converged && iterations < max_iter {
        let q = a_op(&p);
        let delta = dot(&q, &q);
        if delta <= f64::MIN_POSITIVE {
            converged = true;
            break;
        }
        let alpha = gamma / delta;

        // x = x + alpha * p, r = r - alpha * q
        x.iter_mut().zip(&p).for_each(|(xi, pi)| *xi += alpha * pi);
        r.iter_mut().zip(&q).for_each(|(ri, qi)| *ri -= alpha * qi);

        s = at_op(&r);
        let gamma_new = dot(&s, &s);
        iterations += 1;

        if gamma_new.sqrt() <= threshold {
            converged = true;
            break;
        }

        let beta = gamma_new / gamma;
        p.iter_mut()
            .zip(&s)
            .for_each(|(pi, si)| *pi = si + beta * *pi);
        gamma = gamma_new;
    }

    IterativeSolution {
        x,
        iterations,
        converged,
    }
}
