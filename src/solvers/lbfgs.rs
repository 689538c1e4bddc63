//! Projected limited-memory BFGS for bound-constrained minimization
//!
//! Minimizes a smooth objective subject to `x ≥ lower`. argmin's L-BFGS has no
//! box constraints, so the quasi-Newton direction comes from a two-loop
//! recursion here and components that would push an active bound further out
//! are frozen. Each step is an argmin backtracking line search under the
//! Armijo condition, evaluated on the projection onto the feasible set.

use std::collections::VecDeque;

use argmin::core::{CostFunction, Error, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::{BacktrackingLineSearch, LineSearch};

use crate::error::Result;
use crate::operators::{dot, norm};
use crate::solvers::cgls::IterativeSolution;

/// Number of curvature pairs kept
const MEMORY: usize = 10;
/// Armijo sufficient-decrease constant
const ARMIJO: f64 = 1e-4;
/// Step contraction per backtrack
const CONTRACTION: f64 = 0.5;
const MAX_BACKTRACKS: u64 = 40;

/// Objective seen through the projection onto `x ≥ lower`.
struct Projected<'f, F> {
    objective: &'f F,
    lower: f64,
}

impl<F> Projected<'_, F>
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    fn evaluate(&self, p: &[f64]) -> (f64, Vec<f64>) {
        let mut x = p.to_vec();
        project(&mut x, self.lower);
        (self.objective)(&x)
    }
}

impl<F> CostFunction for Projected<'_, F>
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(self.evaluate(p).0)
    }
}

impl<F> Gradient for Projected<'_, F>
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, p: &Self::Param) -> std::result::Result<Self::Gradient, Error> {
        Ok(self.evaluate(p).1)
    }
}

/// Armijo backtracking from `x` along `d`. Returns the projected point it
/// accepts, or `None` when every backtrack fails.
fn line_search<F>(
    problem: Projected<'_, F>,
    x: &[f64],
    f: f64,
    g: &[f64],
    d: Vec<f64>,
    step: f64,
) -> Result<Option<Vec<f64>>>
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    let lower = problem.lower;
    let condition = ArmijoCondition::new(ARMIJO)?;
    let mut search: BacktrackingLineSearch<Vec<f64>, Vec<f64>, ArmijoCondition<f64>, f64> =
        BacktrackingLineSearch::new(condition).rho(CONTRACTION)?;
    search.search_direction(d);
    search.initial_step_length(step)?;

    let result = Executor::new(problem, search)
        .configure(|state| {
            state
                .param(x.to_vec())
                .gradient(g.to_vec())
                .cost(f)
                .max_iters(MAX_BACKTRACKS)
        })
        .ctrlc(false)
        .run()?;

    let state = result.state();
    if state.get_termination_reason() != Some(&TerminationReason::SolverConverged) {
        return Ok(None);
    }
    Ok(state.get_param().map(|p| {
        let mut accepted = p.clone();
        project(&mut accepted, lower);
        accepted
    }))
}

/// Minimize `f` over `x ≥ lower`.
///
/// # Arguments
/// * `objective` - Closure returning the value and gradient at `x`
/// * `x0` - Initial guess, projected onto the bound before use
/// * `lower` - Elementwise lower bound
/// * `tol` - Relative tolerance on the projected gradient norm
/// * `max_iter` - Maximum iterations
pub fn projected_lbfgs<F>(
    objective: F,
    x0: &[f64],
    lower: f64,
    tol: f64,
    max_iter: usize,
) -> Result<IterativeSolution>
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    let mut x = x0.to_vec();
    project(&mut x, lower);
    let (mut f, mut g) = objective(&x);

    let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(MEMORY);
    let initial_norm = projected_gradient_norm(&x, &g, lower);
    let threshold = tol * initial_norm.max(f64::MIN_POSITIVE);

    let mut iterations = 0;
    let mut converged = initial_norm <= threshold;

    while !converged && iterations < max_iter {
        let mut d = two_loop(&g, &history);
        freeze_bound(&mut d, &x, lower);
        if dot(&g, &d) >= 0.0 {
            history.clear();
            d = g.iter().map(|gi| -gi).collect();
            freeze_bound(&mut d, &x, lower);
        }

        let step = if history.is_empty() {
            (1.0 / norm(&d).max(f64::MIN_POSITIVE)).min(1.0)
        } else {
            1.0
        };

        let problem = Projected {
            objective: &objective,
            lower,
        };
        // Line search stalled: no descent left at working precision
        let Some(x_new) = line_search(problem, &x, f, &g, d, step)? else {
            break;
        };
        let (f_new, g_new) = objective(&x_new);
        iterations += 1;

        let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(&a, &b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(&a, &b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-12 * norm(&s) * norm(&y) {
            if history.len() == MEMORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        x = x_new;
        f = f_new;
        g = g_new;
        converged = projected_gradient_norm(&x, &g, lower) <= threshold;
    }

    Ok(IterativeSolution {
        x,
        iterations,
        converged,
    })
}

fn project(v: &mut [f64], lower: f64) {
    v.iter_mut().for_each(|vi| *vi = vi.max(lower));
}

/// Zero the components that would push variables pinned at the bound below it
fn freeze_bound(d: &mut [f64], x: &[f64], lower: f64) {
    for (di, &xi) in d.iter_mut().zip(x) {
        if xi <= lower && *di < 0.0 {
            *di = 0.0;
        }
    }
}

/// Norm of the gradient restricted to directions that stay feasible
fn projected_gradient_norm(x: &[f64], g: &[f64], lower: f64) -> f64 {
    x.iter()
        .zip(g.iter())
        .filter(|&(&xi, &gi)| xi > lower || gi <= 0.0)
        .map(|(_, &gi)| gi * gi)
        .sum::<f64>()
        .sqrt()
}

/// Two-loop recursion returning `-H g`
fn two_loop(g: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let a = rho * dot(s, &q);
        q.iter_mut().zip(y).for_each(|(qi, yi)| *qi -= a * yi);
        alphas.push(a);
    }
    if let Some((s, y, _)) = history.back() {
        let gamma = dot(s, y) / dot(y, y);
        q.iter_mut().for_each(|qi| *qi *= gamma);
    }
    for ((s, y, rho), a) in history.iter().zip(alphas.iter().rev()) {
        let b = rho * dot(y, &q);
        q.iter_mut().zip(s).for_each(|(qi, si)| *qi += (a - b) * si);
    }
    q.iter_mut().for_each(|qi| *qi = -*qi);
    q
}
