//! BG/NBD model fitting and prediction.
//!
//! The four parameters {r, alpha, a, b} are estimated by maximizing the
//! Fader–Hardie (2005) log-likelihood with a deterministic Nelder–Mead
//! search over the log-parameters, so identical input and penalizer always
//! produce identical fits. Prediction is pure closed-form evaluation; no
//! fitting happens there.

use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use tracing::debug;

use crate::error::Error;
use crate::summary::CustomerSummary;

/// Iteration budget for the optimizer. A fit that has not converged by then
/// is surfaced as [`Error::Convergence`], never silently accepted.
pub const MAX_ITERATIONS: usize = 5_000;

/// Convergence threshold on the objective spread across the simplex.
const F_TOLERANCE: f64 = 1e-9;

/// Objective value substituted for non-finite evaluations so the search
/// steps away from degenerate parameter regions.
const PENALTY_VALUE: f64 = 1e300;

/// Fitted BG/NBD parameters plus the penalizer used during fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
    pub penalizer_coef: f64,
}

/// Forward-looking prediction for one customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub customer_id: String,
    pub predicted_purchases: f64,
    pub probability_alive: f64,
}

/// A fitted BG/NBD model.
#[derive(Debug, Clone)]
pub struct BgNbdModel {
    pub params: ModelParameters,
    /// Optimizer iterations consumed (0 when rebuilt from exported params).
    pub iterations: usize,
    /// Total unpenalized log-likelihood at the optimum.
    pub log_likelihood: f64,
}

impl BgNbdModel {
    /// Fit the model to aggregated customer summaries.
    ///
    /// The search runs over log-parameters (keeping all four constrained
    /// positive) with an L2 penalty of `penalizer_coef * sum(log_param^2)`
    /// to stabilize ill-conditioned fits.
    pub fn fit(summaries: &[CustomerSummary], penalizer_coef: f64) -> crate::Result<Self> {
        if summaries.len() < 2 {
            return Err(Error::EmptyInput);
        }
        if penalizer_coef < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "penalizer coefficient must be non-negative (got {penalizer_coef})"
            )));
        }

        let data: Vec<(f64, f64, f64)> = summaries
            .iter()
            .map(|s| (s.frequency as f64, s.recency, s.t))
            .collect();

        let objective =
            |log_params: &[f64; 4]| penalized_nll(&data, log_params, penalizer_coef);
        let (optimum, iterations) = nelder_mead(&objective, [0.0; 4])?;

        let [r, alpha, a, b] = optimum.map(f64::exp);
        let log_likelihood: f64 = data
            .iter()
            .map(|&(x, t_x, t)| log_likelihood_one(r, alpha, a, b, x, t_x, t))
            .sum();

        debug!(r, alpha, a, b, iterations, log_likelihood, "BG/NBD fit converged");
        Ok(BgNbdModel {
            params: ModelParameters { r, alpha, a, b, penalizer_coef },
            iterations,
            log_likelihood,
        })
    }

    /// Rebuild a fitted model from an exported parameter set.
    pub fn from_params(params: ModelParameters) -> Self {
        BgNbdModel { params, iterations: 0, log_likelihood: f64::NAN }
    }

    /// Expected number of purchases in the next `horizon` time units for a
    /// customer with history (frequency, recency, T).
    pub fn expected_purchases(
        &self,
        horizon: f64,
        frequency: f64,
        recency: f64,
        t: f64,
    ) -> f64 {
        if horizon == 0.0 {
            return 0.0;
        }
        let ModelParameters { r, alpha, a, b, .. } = self.params;
        let x = frequency;

        let z = horizon / (alpha + t + horizon);
        let hyp = hyp2f1(r + x, b + x, a + b + x - 1.0, z);
        let discount = ((alpha + t) / (alpha + t + horizon)).powf(r + x);
        let numerator = (a + b + x - 1.0) / (a - 1.0) * (1.0 - discount * hyp);

        numerator / (1.0 + dropout_odds(r, alpha, a, b, x, recency, t))
    }

    /// Probability the customer is still active given (frequency, recency, T).
    ///
    /// A customer with no repeat purchases has probability 1 under this
    /// model (the dropout process only triggers after a repeat).
    pub fn probability_alive(&self, frequency: f64, recency: f64, t: f64) -> f64 {
        let ModelParameters { r, alpha, a, b, .. } = self.params;
        1.0 / (1.0 + dropout_odds(r, alpha, a, b, frequency, recency, t))
    }

    /// Predict expected purchases and probability-alive for every customer,
    /// preserving input order.
    pub fn predict(
        &self,
        summaries: &[CustomerSummary],
        horizon: f64,
    ) -> crate::Result<Vec<PredictionRow>> {
        if horizon < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "prediction horizon must be non-negative (got {horizon})"
            )));
        }

        Ok(summaries
            .iter()
            .map(|s| {
                let x = s.frequency as f64;
                PredictionRow {
                    customer_id: s.customer_id.clone(),
                    predicted_purchases: self.expected_purchases(horizon, x, s.recency, s.t),
                    probability_alive: self.probability_alive(x, s.recency, s.t),
                }
            })
            .collect())
    }
}

/// Odds that the customer dropped out after the last observed purchase:
/// `(a / (b + x - 1)) * ((alpha + T) / (alpha + t_x))^(r + x)` for x > 0,
/// zero otherwise.
fn dropout_odds(r: f64, alpha: f64, a: f64, b: f64, x: f64, t_x: f64, t: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    a / (b + x - 1.0) * ((alpha + t) / (alpha + t_x)).powf(r + x)
}

/// Log-likelihood of one customer under parameters (r, alpha, a, b).
fn log_likelihood_one(r: f64, alpha: f64, a: f64, b: f64, x: f64, t_x: f64, t: f64) -> f64 {
    let ln_a1 = ln_gamma(r + x) - ln_gamma(r) + r * alpha.ln();
    let ln_a2 = ln_gamma(a + b) + ln_gamma(b + x) - ln_gamma(b) - ln_gamma(a + b + x);
    let ln_a3 = -(r + x) * (alpha + t).ln();

    let tail = if x > 0.0 {
        let ln_a4 = a.ln() - (b + x - 1.0).ln() - (r + x) * (alpha + t_x).ln();
        log_sum_exp(ln_a3, ln_a4)
    } else {
        ln_a3
    };

    ln_a1 + ln_a2 + tail
}

/// Mean negative log-likelihood plus the L2 penalty on the log-parameters.
fn penalized_nll(data: &[(f64, f64, f64)], log_params: &[f64; 4], penalizer: f64) -> f64 {
    let [r, alpha, a, b] = log_params.map(f64::exp);
    if ![r, alpha, a, b].iter().all(|v| v.is_finite() && *v > 0.0) {
        return PENALTY_VALUE;
    }

    let total: f64 = data
        .iter()
        .map(|&(x, t_x, t)| log_likelihood_one(r, alpha, a, b, x, t_x, t))
        .sum();
    let penalty = penalizer * log_params.iter().map(|v| v * v).sum::<f64>();
    let value = -total / data.len() as f64 + penalty;

    if value.is_finite() {
        value
    } else {
        PENALTY_VALUE
    }
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// Gaussian hypergeometric 2F1(p, q; s; z) by its power series. The BG/NBD
/// expressions only evaluate it at z in [0, 1), where the series converges.
fn hyp2f1(p: f64, q: f64, s: f64, z: f64) -> f64 {
    let mut term = 1.0;
    let mut sum = 1.0;
    for j in 0..1_000 {
        let j = j as f64;
        term *= (p + j) * (q + j) / ((s + j) * (j + 1.0)) * z;
        sum += term;
        if term.abs() < 1e-12 * sum.abs() {
            break;
        }
    }
    sum
}

/// Deterministic Nelder–Mead minimization over four dimensions. Fixed
/// initial simplex, standard reflection/expansion/contraction/shrink
/// coefficients, no randomness anywhere.
fn nelder_mead<F>(objective: &F, start: [f64; 4]) -> crate::Result<([f64; 4], usize)>
where
    F: Fn(&[f64; 4]) -> f64,
{
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;
    const STEP: f64 = 0.1;

    let mut simplex: Vec<([f64; 4], f64)> = Vec::with_capacity(5);
    simplex.push((start, objective(&start)));
    for i in 0..4 {
        let mut point = start;
        point[i] += STEP;
        simplex.push((point, objective(&point)));
    }

    for iteration in 1..=MAX_ITERATIONS {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        if (simplex[4].1 - simplex[0].1).abs() < F_TOLERANCE {
            return Ok((simplex[0].0, iteration));
        }

        let mut centroid = [0.0; 4];
        for (point, _) in &simplex[..4] {
            for i in 0..4 {
                centroid[i] += point[i] / 4.0;
            }
        }
        let worst = simplex[4].0;
        let along = |coef: f64| {
            let mut point = [0.0; 4];
            for i in 0..4 {
                point[i] = centroid[i] + coef * (centroid[i] - worst[i]);
            }
            point
        };

        let reflected = along(REFLECT);
        let f_reflected = objective(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = along(EXPAND);
            let f_expanded = objective(&expanded);
            simplex[4] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[3].1 {
            simplex[4] = (reflected, f_reflected);
        } else {
            let contracted = if f_reflected < simplex[4].1 {
                along(CONTRACT)
            } else {
                along(-CONTRACT)
            };
            let f_contracted = objective(&contracted);
            if f_contracted < f_reflected.min(simplex[4].1) {
                simplex[4] = (contracted, f_contracted);
            } else {
                let best = simplex[0].0;
                for vertex in simplex.iter_mut().skip(1) {
                    let mut point = [0.0; 4];
                    for i in 0..4 {
                        point[i] = best[i] + SHRINK * (vertex.0[i] - best[i]);
                    }
                    *vertex = (point, objective(&point));
                }
            }
        }
    }

    Err(Error::Convergence { iterations: MAX_ITERATIONS })
}
