//! Limited-memory BFGS minimizer for the training objectives.
//!
//! Two-loop recursion over an `m`-deep curvature history with a
//! backtracking (Armijo) line search. The caller folds L2 regularization
//! into its objective closure.

/// Optimizer parameters. The defaults mirror the values the trainer has
/// always run with.
#[derive(Debug, Clone)]
pub struct LbfgsParams {
    /// Curvature pairs kept for the inverse-Hessian approximation.
    pub m: usize,
    /// Gradient-norm convergence threshold: ||g|| / max(1, ||x||) < epsilon.
    pub epsilon: f64,
    /// Window length for the objective-improvement test.
    pub past: usize,
    /// Minimum relative objective improvement over the window.
    pub delta: f64,
    /// Hard iteration cap.
    pub max_iterations: usize,
    /// Line-search step halvings before giving up.
    pub max_linesearch: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        Self {
            m: 6,
            epsilon: 1e-5,
            past: 10,
            delta: 1e-5,
            max_iterations: 100,
            max_linesearch: 20,
        }
    }
}

/// Result of a minimization run. `converged == false` means the iteration
/// cap or a stalled line search ended the run; `x` is still the best point
/// visited and is usable.
#[derive(Debug)]
pub struct Solution {
    pub x: Vec<f64>,
    pub fx: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// L2 regularization: adds `2 * c2 * x` to the gradient and returns the
/// penalty term `c2 * ||x||^2` to add to the objective.
pub fn l2_penalty(c2: f64, x: &[f64], g: &mut [f64]) -> f64 {
    if c2 <= 0.0 {
        return 0.0;
    }
    let c22 = c2 * 2.0;
    let mut norm = 0.0;
    for (gi, xi) in g.iter_mut().zip(x) {
        *gi += c22 * xi;
        norm += xi * xi;
    }
    c2 * norm
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Minimizes `f`, starting at `x0`. The closure evaluates the objective at
/// `x` and writes the gradient into its second argument.
pub fn minimize<F>(mut f: F, x0: Vec<f64>, params: &LbfgsParams) -> Solution
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0;
    let mut g = vec![0.0; n];
    let mut fx = f(&x, &mut g);

    // Objective history for the past/delta test.
    let mut history = vec![fx];
    // Curvature pairs (s, y) = (x_{k+1} - x_k, g_{k+1} - g_k).
    let mut s_list: Vec<Vec<f64>> = Vec::new();
    let mut y_list: Vec<Vec<f64>> = Vec::new();

    let mut best_x = x.clone();
    let mut best_fx = fx;

    for k in 0..params.max_iterations {
        if norm(&g) / norm(&x).max(1.0) < params.epsilon {
            return Solution {
                x: best_x,
                fx: best_fx,
                iterations: k,
                converged: true,
            };
        }

        // Two-loop recursion: d = -H g.
        let mut d: Vec<f64> = g.iter().map(|v| -v).collect();
        let mut alphas = vec![0.0; s_list.len()];
        for i in (0..s_list.len()).rev() {
            let rho = 1.0 / dot(&y_list[i], &s_list[i]);
            let alpha = rho * dot(&s_list[i], &d);
            alphas[i] = alpha;
            for (dv, yv) in d.iter_mut().zip(&y_list[i]) {
                *dv -= alpha * yv;
            }
        }
        if let (Some(s), Some(y)) = (s_list.last(), y_list.last()) {
            let gamma = dot(s, y) / dot(y, y);
            for dv in d.iter_mut() {
                *dv *= gamma;
            }
        }
        for i in 0..s_list.len() {
            let rho = 1.0 / dot(&y_list[i], &s_list[i]);
            let beta = rho * dot(&y_list[i], &d);
            for (dv, sv) in d.iter_mut().zip(&s_list[i]) {
                *dv += (alphas[i] - beta) * sv;
            }
        }

        let dg = dot(&d, &g);
        if dg >= 0.0 {
            // Not a descent direction; restart from steepest descent.
            s_list.clear();
            y_list.clear();
            d = g.iter().map(|v| -v).collect();
        }
        let dg = dot(&d, &g);

        // Backtracking line search with the Armijo condition.
        let mut step = if k == 0 { 1.0 / norm(&d).max(1.0) } else { 1.0 };
        let mut g_new = vec![0.0; n];
        let mut x_new = vec![0.0; n];
        let mut fx_new = f64::INFINITY;
        let mut ok = false;
        for _ in 0..params.max_linesearch {
            for i in 0..n {
                x_new[i] = x[i] + step * d[i];
            }
            fx_new = f(&x_new, &mut g_new);
            if fx_new.is_finite() && fx_new <= fx + 1e-4 * step * dg {
                ok = true;
                break;
            }
            step *= 0.5;
        }
        if !ok {
            log::warn!("line search failed at iteration {k}; keeping best parameters so far");
            return Solution {
                x: best_x,
                fx: best_fx,
                iterations: k,
                converged: false,
            };
        }

        // Curvature update.
        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        if dot(&s, &y) > 1e-10 {
            if s_list.len() == params.m {
                s_list.remove(0);
                y_list.remove(0);
            }
            s_list.push(s);
            y_list.push(y);
        }

        x = x_new;
        g = g_new;
        fx = fx_new;
        if fx < best_fx {
            best_fx = fx;
            best_x = x.clone();
        }

        // Objective-window convergence test.
        history.push(fx);
        if history.len() > params.past {
            let past_fx = history[history.len() - 1 - params.past];
            if (past_fx - fx) / fx.abs().max(1.0) < params.delta {
                return Solution {
                    x: best_x,
                    fx: best_fx,
                    iterations: k + 1,
                    converged: true,
                };
            }
        }
    }

    Solution {
        x: best_x,
        fx: best_fx,
        iterations: params.max_iterations,
        converged: false,
    }
}
