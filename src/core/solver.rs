//! Ensemble LAD solver.
//!
//! Collapses the per-scan-angle penetration and contact probabilities into
//! two depth-indexed sequences (Eq. 8a/8b of Detto et al., 2015), fills
//! no-coverage gaps according to the configured policy, and runs the
//! layer-recursive inversion (Eq. 6) for the LAD profile.

use crate::types::{DepthProfile, GapPolicy, LadError, LadResult, ReturnTensor};
use ndarray::Array1;
use std::f64::consts::PI;

use super::histogram::ScanAngleIndex;
use super::penetration::Probabilities;

/// Solves the forward layer recursion for a given gap policy.
#[derive(Debug, Clone, Copy)]
pub struct EnsembleSolver {
    gap_policy: GapPolicy,
}

impl EnsembleSolver {
    pub fn new(gap_policy: GapPolicy) -> Self {
        Self { gap_policy }
    }

    /// Compute the LAD profile `u[M]` from the probability tensors.
    ///
    /// Fails with [`LadError::EmptyCanopy`] when no layer holds a single
    /// first return, since the recursion then has no starting depth. The
    /// returned profile is non-negative and finite by construction.
    ///
    /// A covered layer whose contact rate is exactly zero (e.g. one holding
    /// only higher-order returns) gets `u = 0` and the recursion continues
    /// through the layers below it, under either gap policy. The original
    /// interpolating formulation instead divided through and zeroed every
    /// deeper layer once the quotient went non-finite; that truncation is
    /// not reproduced here.
    pub fn solve(
        &self,
        probabilities: &Probabilities,
        histogram: &ReturnTensor,
        angles: &ScanAngleIndex,
        dz: f64,
    ) -> LadResult<DepthProfile> {
        let (m, s, k_max) = histogram.dim();
        if k_max == 0 || s != angles.len() {
            return Err(LadError::DimensionMismatch(format!(
                "histogram of shape {}x{}x{} does not match {} scan angles",
                m,
                s,
                k_max,
                angles.len()
            )));
        }

        let jj = first_canopy_layer(histogram).ok_or(LadError::EmptyCanopy)?;
        log::debug!("First layer with first returns: {} of {}", jj, m);

        let (mut alpha, mut beta) = self.ensemble_terms(probabilities, angles, jj, m);

        match self.gap_policy {
            GapPolicy::ZeroFill => {
                alpha.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
                beta.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
            }
            GapPolicy::Interpolate => {
                interpolate_gaps(&mut alpha);
                interpolate_gaps(&mut beta);
            }
        }

        // Eq. 6: strictly sequential forward recursion; each layer depends
        // on every shallower resolved layer.
        let mut u = Array1::<f64>::zeros(m);
        let mut absorbed = 0.0;
        for i in jj..m {
            if beta[i].is_finite() && beta[i] != 0.0 {
                u[i] = ((alpha[i] - absorbed) / (beta[i] * dz)).max(0.0);
            }
            if beta[i].is_finite() {
                absorbed += beta[i] * u[i] * dz;
            }
        }
        u.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
        Ok(u)
    }

    /// Ensemble interception (alpha) and contact-rate (beta) terms.
    ///
    /// Layers shallower than `jj` get `alpha = 0` and `beta = U0`, the
    /// all-angle fallback projection term. Layers with no controlled angle
    /// stay NaN for the gap policy to resolve.
    fn ensemble_terms(
        &self,
        probabilities: &Probabilities,
        angles: &ScanAngleIndex,
        jj: usize,
        m: usize,
    ) -> (Array1<f64>, Array1<f64>) {
        let n0 = &probabilities.first_return_totals;
        let n0_total: f64 = n0.sum();
        let s = angles.len();

        let inverse_cos: Vec<f64> = angles
            .angles()
            .iter()
            .map(|a| 1.0 / (a * PI / 180.0).cos().abs())
            .collect();

        let mut alpha = Array1::<f64>::from_elem(m, f64::NAN);
        let mut beta = Array1::<f64>::from_elem(m, f64::NAN);

        for i in 0..m {
            // Fallback term weighted by every angle's share of first returns
            let mut u0 = f64::NAN;
            if n0_total > 0.0 {
                u0 = 0.0;
                for j in 0..s {
                    u0 += probabilities.projection[[i, j]] * inverse_cos[j] * n0[j] / n0_total;
                }
            }

            let controlled: Vec<usize> = (0..s).filter(|&j| probabilities.control[[i, j]]).collect();
            let weight_total: f64 = controlled.iter().map(|&j| n0[j]).sum();
            if !controlled.is_empty() && weight_total > 0.0 {
                // Eq. 8a
                let mut a = 0.0;
                // Eq. 8b
                let mut b = 0.0;
                for &j in &controlled {
                    let w = n0[j] / weight_total;
                    a += probabilities.interception[[i, j, 0]] * w;
                    b += probabilities.contact[[i, j, 0]]
                        * probabilities.projection[[i, j]]
                        * inverse_cos[j]
                        * w;
                }
                alpha[i] = 1.0 - a;
                beta[i] = b;
            }

            if i < jj {
                alpha[i] = 0.0;
                beta[i] = u0;
            }
        }

        (alpha, beta)
    }
}

/// Index of the shallowest layer with any first return across all angles
fn first_canopy_layer(histogram: &ReturnTensor) -> Option<usize> {
    let (m, s, _) = histogram.dim();
    (0..m).find(|&i| (0..s).map(|j| histogram[[i, j, 0]]).sum::<f64>() > 0.0)
}

/// Linear interpolation across non-finite entries, matching numpy's interp
/// semantics over the finite samples: values before the first finite sample
/// clamp to it, values past the last finite sample are left undefined (NaN)
/// rather than extrapolated.
fn interpolate_gaps(values: &mut Array1<f64>) {
    let finite: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
    if finite.is_empty() {
        return;
    }
    let first = finite[0];
    let last = finite[finite.len() - 1];

    for i in 0..values.len() {
        if values[i].is_finite() {
            continue;
        }
        if i < first {
            values[i] = values[first];
        } else if i > last {
            values[i] = f64::NAN;
        } else {
            let lo = *finite.iter().rev().find(|&&f| f < i).unwrap_or(&first);
            let hi = *finite.iter().find(|&&f| f > i).unwrap_or(&last);
            let t = (i - lo) as f64 / (hi - lo) as f64;
            values[i] = values[lo] + t * (values[hi] - values[lo]);
        }
    }
}
