//! Return-count attenuation correction.
//!
//! Pulses intercepted high in the canopy often never produce a 2nd or 3rd
//! return, so raw higher-return counts understate foliage at depth. The
//! correction rescales each return-number slice of the histogram by the
//! cumulative empirical transition ratio between successive return numbers,
//! following the DTM-adjusted variant of the Detto scheme.

use crate::types::{ReturnPoint, ReturnTensor};
use ndarray::Array1;

/// Empirical transition ratios `CF[k]` for return numbers 1..=k_max.
///
/// `CF[0] = 1` always (first returns need no correction). For k >= 2,
/// `CF[k-1]` is the ratio of vegetation-classified returns of order k-1 to
/// all returns of order k, computed over the *full* point set so the ratio
/// reflects whole-beam physics independent of the current max-return cutoff.
///
/// A return-number bin with zero occurrences would leave the ratio
/// undefined; the corrector falls back to `CF = 1` for that bin and logs a
/// warning, so the slice passes through unscaled.
pub fn correction_factors(points: &[ReturnPoint], k_max: usize) -> Array1<f64> {
    let mut cf = Array1::<f64>::ones(k_max);
    for k in 2..=k_max {
        let veg_prev = points
            .iter()
            .filter(|p| usize::from(p.return_number) == k - 1 && p.is_vegetation())
            .count() as f64;
        let total_k = points
            .iter()
            .filter(|p| usize::from(p.return_number) == k)
            .count() as f64;
        if total_k > 0.0 {
            cf[k - 1] = veg_prev / total_k;
        } else {
            log::warn!(
                "No returns of order {} in the full point set; attenuation factor left at 1",
                k
            );
        }
    }
    cf
}

/// Scale each return-number slice k of the histogram by the cumulative
/// product `CF[0] * .. * CF[k]`. Returns a new tensor; the input histogram
/// is left untouched.
pub fn apply_correction(histogram: &ReturnTensor, factors: &Array1<f64>) -> ReturnTensor {
    let mut corrected = histogram.clone();
    let k_max = histogram.dim().2.min(factors.len());
    let mut cumulative = 1.0;
    for k in 0..k_max {
        cumulative *= factors[k];
        if k > 0 {
            let mut slice = corrected.slice_mut(ndarray::s![.., .., k]);
            slice.mapv_inplace(|v| v * cumulative);
        }
    }
    corrected
}
