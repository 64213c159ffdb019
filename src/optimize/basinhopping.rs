//! Basin hopping over bounded quasi-Newton local searches
//!
//! Each hop perturbs the current point by a uniform step, clips it into the
//! box, and runs L-BFGS (More–Thuente line search) on a logistic
//! reparametrization of the box, so the local search never leaves the
//! bounds. Hops are accepted with the Metropolis criterion; the step size
//! adapts every `interval` hops towards a 50 % acceptance rate.

use argmin::{
    core::{CostFunction, Error, Executor, Gradient},
    solver::{linesearch::MoreThuenteLineSearch, quasinewton::LBFGS},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Keeps logit arguments away from 0 and 1 when a start point sits on a bound
const BOUND_MARGIN: f64 = 1e-9;
const TARGET_ACCEPT_RATE: f64 = 0.5;
const STEP_FACTOR: f64 = 0.9;
/// Correction pairs kept by L-BFGS
const LBFGS_MEMORY: usize = 10;

/// Basin hopping configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinHoppingOptions {
    /// Number of hops after the initial local search (default: 100)
    pub niter: usize,
    /// Metropolis temperature (default: 1.0)
    pub temperature: f64,
    /// Initial maximum displacement per coordinate (default: 0.5)
    pub stepsize: f64,
    /// Hops between step size updates (default: 50)
    pub interval: usize,
    /// Seed of the random step generator; row `i` uses `seed + i` (default: 0)
    pub seed: u64,
    /// Iteration limit of each local search (default: 200)
    pub local_max_iters: u64,
    /// Gradient norm tolerance of the local search (default: 1e-10)
    pub tol_grad: f64,
    /// Cost change tolerance of the local search (default: 1e-14)
    pub tol_cost: f64,
}

impl Default for BasinHoppingOptions {
    fn default() -> Self {
        Self {
            niter: 100,
            temperature: 1.0,
            stepsize: 0.5,
            interval: 50,
            seed: 0,
            local_max_iters: 200,
            tol_grad: 1e-10,
            tol_cost: 1e-14,
        }
    }
}

impl BasinHoppingOptions {
    pub fn with_niter(mut self, niter: usize) -> Self {
        self.niter = niter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stepsize(mut self, stepsize: f64) -> Self {
        self.stepsize = stepsize;
        self
    }

    pub fn with_local_max_iters(mut self, iters: u64) -> Self {
        self.local_max_iters = iters;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.stepsize > 0.0 && self.stepsize.is_finite()) {
            return Err(format!("stepsize must be positive, got {}", self.stepsize));
        }
        if !(self.temperature > 0.0) {
            return Err(format!("temperature must be positive, got {}", self.temperature));
        }
        if self.interval == 0 {
            return Err("interval must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Outcome of a basin hopping run
#[derive(Debug, Clone)]
pub struct BasinHoppingResult {
    /// Best point found, inside the bounds
    pub x: Vec<f64>,
    /// Objective value at `x`
    pub cost: f64,
    /// Accepted hops
    pub accepted: usize,
    /// Local searches that ended in an error
    pub local_failures: usize,
}

/// Global minimizer of `objective` over the box `bounds`
pub struct BasinHopping<'a, F> {
    objective: F,
    bounds: &'a [(f64, f64)],
    options: &'a BasinHoppingOptions,
}

impl<'a, F> BasinHopping<'a, F>
where
    F: Fn(&[f64]) -> f64,
{
    pub fn new(objective: F, bounds: &'a [(f64, f64)], options: &'a BasinHoppingOptions) -> Self {
        Self {
            objective,
            bounds,
            options,
        }
    }

    /// Run from `x0` with the random stream `seed`
    pub fn minimize(&self, x0: &[f64], seed: u64) -> BasinHoppingResult {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut local_failures = 0;

        let (mut x, mut cost) = self.local_search(&self.clip(x0.to_vec()), &mut local_failures);
        let mut best = (x.clone(), cost);

        let mut stepsize = self.options.stepsize;
        let mut accepted = 0;
        let mut accepted_in_interval = 0;

        for hop in 1..=self.options.niter {
            let trial: Vec<f64> = x
                .iter()
                .map(|xi| xi + rng.random_range(-stepsize..stepsize))
                .collect();
            let (x_new, cost_new) = self.local_search(&self.clip(trial), &mut local_failures);

            let accept = cost_new < cost || {
                let p = (-(cost_new - cost) / self.options.temperature).exp();
                rng.random::<f64>() < p
            };
            if accept && cost_new.is_finite() {
                x = x_new;
                cost = cost_new;
                accepted += 1;
                accepted_in_interval += 1;
                if cost < best.1 {
                    best = (x.clone(), cost);
                }
            }

            if hop % self.options.interval == 0 {
                let rate = accepted_in_interval as f64 / self.options.interval as f64;
                if rate > TARGET_ACCEPT_RATE {
                    stepsize /= STEP_FACTOR;
                } else {
                    stepsize *= STEP_FACTOR;
                }
                accepted_in_interval = 0;
                tracing::trace!(hop, stepsize, best_cost = best.1, "basin hopping step update");
            }
        }

        BasinHoppingResult {
            x: best.0,
            cost: best.1,
            accepted,
            local_failures,
        }
    }

    fn clip(&self, mut x: Vec<f64>) -> Vec<f64> {
        for (xi, &(lo, hi)) in x.iter_mut().zip(self.bounds) {
            *xi = xi.clamp(lo, hi);
        }
        x
    }

    /// L-BFGS in the unbounded logistic space; falls back to the start point
    /// if the solver errors
    fn local_search(&self, start: &[f64], failures: &mut usize) -> (Vec<f64>, f64) {
        let problem = BoxedProblem {
            objective: &self.objective,
            bounds: self.bounds,
        };
        let z0 = problem.to_unbounded(start);

        match self.run_lbfgs(problem, z0) {
            Ok((z, cost)) => {
                let problem = BoxedProblem {
                    objective: &self.objective,
                    bounds: self.bounds,
                };
                (problem.to_box(&z), cost)
            }
            Err(e) => {
                tracing::trace!("local search failed: {}", e);
                *failures += 1;
                (start.to_vec(), (self.objective)(start))
            }
        }
    }

    fn run_lbfgs(&self, problem: BoxedProblem<'_, F>, z0: Vec<f64>) -> Result<(Vec<f64>, f64), Error> {
        let linesearch: MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64> =
            MoreThuenteLineSearch::new();
        let solver: LBFGS<_, Vec<f64>, Vec<f64>, f64> = LBFGS::new(linesearch, LBFGS_MEMORY)
            .with_tolerance_grad(self.options.tol_grad)?
            .with_tolerance_cost(self.options.tol_cost)?;
        let max_iters = self.options.local_max_iters;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(z0).max_iters(max_iters))
            .run()?;

        let z = res
            .state
            .best_param
            .ok_or_else(|| Error::msg("local search returned no parameters"))?;
        Ok((z, res.state.best_cost))
    }
}

/// Objective expressed in logistic coordinates `x = lo + (hi - lo) / (1 + e^-z)`
struct BoxedProblem<'a, F> {
    objective: &'a F,
    bounds: &'a [(f64, f64)],
}

impl<F> BoxedProblem<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    fn to_box(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .zip(self.bounds)
            .map(|(&zi, &(lo, hi))| lo + (hi - lo) / (1.0 + (-zi).exp()))
            .collect()
    }

    fn to_unbounded(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.bounds)
            .map(|(&xi, &(lo, hi))| {
                let u = ((xi - lo) / (hi - lo)).clamp(BOUND_MARGIN, 1.0 - BOUND_MARGIN);
                (u / (1.0 - u)).ln()
            })
            .collect()
    }

    fn energy(&self, z: &[f64]) -> f64 {
        let e = (self.objective)(&self.to_box(z));
        if e.is_nan() {
            f64::INFINITY
        } else {
            e
        }
    }
}

impl<F> CostFunction for BoxedProblem<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.energy(z))
    }
}

impl<F> Gradient for BoxedProblem<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// Central differences
    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, Error> {
        let step = f64::EPSILON.cbrt();
        let mut probe = z.clone();
        let grad = (0..z.len())
            .map(|i| {
                let h = step * z[i].abs().max(1.0);
                probe[i] = z[i] + h;
                let up = self.energy(&probe);
                probe[i] = z[i] - h;
                let down = self.energy(&probe);
                probe[i] = z[i];
                (up - down) / (2.0 * h)
            })
            .collect();
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_interior_minimum() {
        let bounds = [(0.0, 10.0), (0.0, 10.0)];
        let options = BasinHoppingOptions::default().with_niter(5);
        let objective = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] - 1.5).powi(2);
        let res = BasinHopping::new(objective, &bounds, &options).minimize(&[1.0, 1.0], 0);
        assert!((res.x[0] - 3.0).abs() < 1e-4, "{:?}", res.x);
        assert!((res.x[1] - 1.5).abs() < 1e-4, "{:?}", res.x);
        assert!(res.cost < 1e-8);
    }

    #[test]
    fn stays_inside_bounds() {
        let bounds = [(0.0, 2.0)];
        let options = BasinHoppingOptions::default().with_niter(5);
        let objective = |x: &[f64]| (x[0] + 1.0).powi(2);
        let res = BasinHopping::new(objective, &bounds, &options).minimize(&[1.0], 0);
        assert!(res.x[0] >= 0.0 && res.x[0] < 1e-3, "{:?}", res.x);
    }

    #[test]
    fn same_seed_same_result() {
        let bounds = [(-5.0, 5.0)];
        let options = BasinHoppingOptions::default()
            .with_niter(60)
            .with_stepsize(3.0);
        // Two basins, x ≈ 2 and the deeper x ≈ -2
        let objective = |x: &[f64]| (x[0] * x[0] - 4.0).powi(2) + 0.5 * x[0];
        let a = BasinHopping::new(objective, &bounds, &options).minimize(&[4.0], 7);
        let b = BasinHopping::new(objective, &bounds, &options).minimize(&[4.0], 7);
        assert_eq!(a.x, b.x);
        assert!(a.x[0] < 0.0, "global basin is on the negative side: {:?}", a.x);
    }

    #[test]
    fn rejects_zero_stepsize() {
        assert!(BasinHoppingOptions::default().with_stepsize(0.0).validate().is_err());
    }
}
