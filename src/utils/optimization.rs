//! Bounded Nelder-Mead simplex search for smoothing-parameter estimation.

use crate::error::{ForecastError, Result};
use std::cmp::Ordering;

/// Result of a simplex search.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// Best point found.
    pub optimal_point: Vec<f64>,
    /// Objective value at the best point.
    pub optimal_value: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Whether the simplex collapsed below tolerance before the cap.
    pub converged: bool,
}

/// Configuration for Nelder-Mead optimization.
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Iteration cap; the search always stops here.
    pub max_iter: usize,
    /// Convergence tolerance on the spread of objective values.
    pub tolerance: f64,
    /// Initial simplex step as a fraction of each bound's width.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 600,
            tolerance: 1e-8,
            initial_step: 0.1,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `objective` inside the box `bounds`, starting from `initial`.
///
/// Fails when no vertex ever produced a finite objective value; hitting the
/// iteration cap is reported through `converged` instead.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &NelderMeadConfig,
) -> Result<NelderMeadResult>
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 || bounds.len() != n {
        return Err(ForecastError::DimensionMismatch {
            expected: n,
            got: bounds.len(),
        });
    }

    let clamp = |p: &mut Vec<f64>| {
        for (x, &(lo, hi)) in p.iter_mut().zip(bounds.iter()) {
            *x = x.clamp(lo, hi);
        }
    };
    let eval = |p: &[f64]| {
        let v = objective(p);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut start = initial.to_vec();
    clamp(&mut start);
    let mut simplex = vec![start.clone()];
    for i in 0..n {
        let mut vertex = start.clone();
        let width = bounds[i].1 - bounds[i].0;
        let step = config.initial_step * width.max(1e-6);
        // Step inward when the start sits on the upper bound.
        if vertex[i] + step > bounds[i].1 {
            vertex[i] -= step;
        } else {
            vertex[i] += step;
        }
        clamp(&mut vertex);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));
        let (best, worst, second) = (order[0], order[n], order[n - 1]);

        if values[best].is_finite() && (values[worst] - values[best]).abs() < config.tolerance {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| {
                simplex
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != worst)
                    .map(|(_, v)| v[j])
                    .sum::<f64>()
                    / n as f64
            })
            .collect();
        let toward = |from: &[f64], coef: f64| -> Vec<f64> {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(from.iter())
                .map(|(c, f)| c + coef * (f - c))
                .collect();
            clamp(&mut p);
            p
        };

        let reflected = toward(&simplex[worst], -REFLECT);
        let f_reflected = eval(&reflected);

        if f_reflected < values[best] {
            let expanded = toward(&reflected, EXPAND);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[second] {
            simplex[worst] = reflected;
            values[worst] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[worst] {
            let c = toward(&reflected, CONTRACT);
            let f = eval(&c);
            (c, f)
        } else {
            let c = toward(&simplex[worst], CONTRACT);
            let f = eval(&c);
            (c, f)
        };
        if f_contracted < values[worst].min(f_reflected) {
            simplex[worst] = contracted;
            values[worst] = f_contracted;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let mut shrunk: Vec<f64> = anchor
                .iter()
                .zip(simplex[i].iter())
                .map(|(a, p)| a + SHRINK * (p - a))
                .collect();
            clamp(&mut shrunk);
            values[i] = eval(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal))
        .unwrap_or(0);

    if !values[best].is_finite() {
        return Err(ForecastError::NonConvergence {
            iterations,
            context: "simplex search never reached a finite objective".into(),
        });
    }

    Ok(NelderMeadResult {
        optimal_point: simplex[best].clone(),
        optimal_value: values[best],
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn finds_interior_minimum() {
        let result = nelder_mead(
            |x| (x[0] - 0.3).powi(2) + (x[1] - 0.7).powi(2),
            &[0.5, 0.5],
            &[(0.0, 1.0), (0.0, 1.0)],
            &NelderMeadConfig::default(),
        )
        .unwrap();

        assert!(result.converged);
        assert_relative_eq!(result.optimal_point[0], 0.3, epsilon = 1e-3);
        assert_relative_eq!(result.optimal_point[1], 0.7, epsilon = 1e-3);
    }

    #[test]
    fn respects_bounds() {
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[0.5],
            &[(0.0, 1.0)],
            &NelderMeadConfig::default(),
        )
        .unwrap();

        assert!(result.optimal_point[0] <= 1.0);
        assert_relative_eq!(result.optimal_point[0], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn stops_at_iteration_cap() {
        let config = NelderMeadConfig {
            max_iter: 3,
            tolerance: 0.0,
            ..Default::default()
        };
        let result = nelder_mead(|x| x[0].powi(2), &[0.9], &[(-1.0, 1.0)], &config).unwrap();
        assert_eq!(result.iterations, 3);
        assert!(!result.converged);
    }

    #[test]
    fn non_finite_objective_fails_fast() {
        let err = nelder_mead(|_| f64::NAN, &[0.5], &[(0.0, 1.0)], &NelderMeadConfig::default());
        assert!(matches!(err, Err(ForecastError::NonConvergence { .. })));
    }
}
