//! Modified-polynomial ("modpoly") baseline estimation.
//!
//! The baseline is a least-squares polynomial that is refitted against a
//! signal clipped to the previous fit, so peaks are progressively ignored
//! and the fit settles under the spectrum.

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::model::{CorrectedSpectrum, RawSpectrum};
use crate::error::{PipelineError, Result};

pub const DEFAULT_POLY_ORDER: usize = 5;
/// Relative change of the fit below which iteration stops.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;
pub const DEFAULT_MAX_ITER: usize = 250;

/// Parameters of the modpoly fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModPoly {
    pub poly_order: usize,
    pub tolerance: f64,
    pub max_iter: usize,
}

impl Default for ModPoly {
    fn default() -> Self {
        Self {
            poly_order: DEFAULT_POLY_ORDER,
            tolerance: DEFAULT_TOLERANCE,
            max_iter: DEFAULT_MAX_ITER,
        }
    }
}

impl ModPoly {
    pub fn with_order(poly_order: usize) -> Self {
        Self {
            poly_order,
            ..Self::default()
        }
    }

    /// Estimate the baseline of `y` sampled at `x`.
    ///
    /// `x` and `y` must have the same length, at least `poly_order + 1`.
    pub fn fit(&self, x: &[f64], y: &[f64], file: &str) -> Result<Vec<f64>> {
        let n = y.len();
        let n_coef = self.poly_order + 1;
        if n < n_coef || x.len() != n {
            return Err(PipelineError::InsufficientData {
                file: file.to_string(),
                points: n.min(x.len()),
                order: self.poly_order,
            });
        }

        let vander = vandermonde(&scale_to_unit(x), n_coef);
        let pinv = vander.clone().pseudo_inverse(1e-12).map_err(|e| {
            PipelineError::InsufficientData {
                file: format!("{file} ({e})"),
                points: n,
                order: self.poly_order,
            }
        })?;

        let mut signal = DVector::from_column_slice(y);
        let mut baseline = &vander * (&pinv * &signal);

        for iter in 0..self.max_iter {
            signal.zip_apply(&baseline, |s, b| *s = (*s).min(b));
            let next = &vander * (&pinv * &signal);
            let change = relative_difference(&baseline, &next);
            baseline = next;
            if change < self.tolerance {
                debug!("{file}: modpoly converged after {} iteration(s)", iter + 1);
                break;
            }
        }

        Ok(baseline.iter().copied().collect())
    }
}

/// Subtract a modpoly baseline of the given order from a parsed spectrum.
pub fn correct(raw: RawSpectrum, poly_order: usize) -> Result<CorrectedSpectrum> {
    let baseline = ModPoly::with_order(poly_order).fit(&raw.raman_shift, &raw.intensity, &raw.file)?;
    let corrected = raw
        .intensity
        .iter()
        .zip(&baseline)
        .map(|(y, b)| y - b)
        .collect();
    Ok(CorrectedSpectrum {
        raw,
        baseline,
        corrected,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map `x` linearly onto [-1, 1] to keep the Vandermonde matrix well
/// conditioned. A constant axis maps to zeros.
fn scale_to_unit(x: &[f64]) -> Vec<f64> {
    let min = x.iter().copied().fold(f64::INFINITY, f64::min);
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range.abs() < f64::EPSILON {
        return vec![0.0; x.len()];
    }
    x.iter().map(|&v| 2.0 * (v - min) / range - 1.0).collect()
}

fn vandermonde(x: &[f64], n_coef: usize) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), n_coef, |i, j| x[i].powi(j as i32))
}

fn relative_difference(old: &DVector<f64>, new: &DVector<f64>) -> f64 {
    let denom = old.norm().max(f64::MIN_POSITIVE);
    (new - old).norm() / denom
}
