//! Penetration and contact probability estimation.
//!
//! From the return histogram this derives, per (depth layer, scan angle,
//! return number): the probability that a beam has intercepted fewer than k
//! leaves by a given depth (I), and the conditional probability that a
//! return at that depth is the k-th contact along the beam (U), together
//! with the G projection matrix and the coverage control mask consumed by
//! the ensemble solver.

use crate::core::gfunction;
use crate::types::{AngleField, LadError, LadResult, LeafAngleDistribution, ReturnPoint, ReturnTensor};
use ndarray::{Array1, Array2, Array3};

use super::histogram::ScanAngleIndex;

/// Probability tensors derived from one histogram
#[derive(Debug, Clone)]
pub struct Probabilities {
    /// I[M, S, K]: probability of fewer than k+1 interceptions by depth i
    pub interception: ReturnTensor,
    /// U[M, S, K]: conditional contact-order probability
    pub contact: ReturnTensor,
    /// G[M, S]: angular projection coefficients
    pub projection: AngleField,
    /// control[M, S]: true where angle j recorded any return in layer i
    pub control: Array2<bool>,
    /// n0[S]: first-return count per scan angle over the full point set
    pub first_return_totals: Array1<f64>,
}

/// Per-angle intermediate, merged into the output tensors after the
/// (independent) per-angle computations.
struct AngleColumn {
    interception: Array2<f64>,
    contact: Array2<f64>,
    control: Vec<bool>,
    n0: f64,
}

/// Computes penetration/contact probabilities for a fixed leaf angle model.
#[derive(Debug, Clone, Copy)]
pub struct PenetrationModel {
    model: LeafAngleDistribution,
}

impl PenetrationModel {
    pub fn new(model: LeafAngleDistribution) -> Self {
        Self { model }
    }

    /// Derive I, U, G, the control mask and per-angle first-return totals.
    ///
    /// `points` is the full (unfiltered) point set: the first-return
    /// denominator n0 represents every beam launched at an angle, not just
    /// the returns that survived the max-return cutoff. An angle with no
    /// first returns at all cannot normalize its interception column; its
    /// control mask is forced false for every layer so the ensemble skips it
    /// instead of propagating non-finite values.
    pub fn estimate(
        &self,
        points: &[ReturnPoint],
        histogram: &ReturnTensor,
        angles: &ScanAngleIndex,
    ) -> LadResult<Probabilities> {
        let (m, s, k_max) = histogram.dim();
        if s != angles.len() {
            return Err(LadError::DimensionMismatch(format!(
                "histogram has {} angle columns but the angle index has {}",
                s,
                angles.len()
            )));
        }

        log::debug!(
            "Estimating penetration functions for {} scan angles ({} model)",
            s,
            self.model
        );

        let columns = self.compute_columns(points, histogram, angles);

        let mut interception = Array3::<f64>::zeros((m, s, k_max));
        let mut contact = Array3::<f64>::zeros((m, s, k_max));
        let mut control = Array2::<bool>::from_elem((m, s), false);
        let mut n0 = Array1::<f64>::zeros(s);

        for (j, column) in columns.into_iter().enumerate() {
            interception
                .slice_mut(ndarray::s![.., j, ..])
                .assign(&column.interception);
            contact
                .slice_mut(ndarray::s![.., j, ..])
                .assign(&column.contact);
            for (i, &c) in column.control.iter().enumerate() {
                control[[i, j]] = c;
            }
            n0[j] = column.n0;
        }

        let projection = gfunction::projection_matrix(self.model, angles.angles(), m);

        Ok(Probabilities {
            interception,
            contact,
            projection,
            control,
            first_return_totals: n0,
        })
    }

    #[cfg(feature = "parallel")]
    fn compute_columns(
        &self,
        points: &[ReturnPoint],
        histogram: &ReturnTensor,
        angles: &ScanAngleIndex,
    ) -> Vec<AngleColumn> {
        use rayon::prelude::*;

        (0..angles.len())
            .into_par_iter()
            .map(|j| compute_angle_column(points, histogram, angles.angles()[j], j))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_columns(
        &self,
        points: &[ReturnPoint],
        histogram: &ReturnTensor,
        angles: &ScanAngleIndex,
    ) -> Vec<AngleColumn> {
        (0..angles.len())
            .map(|j| compute_angle_column(points, histogram, angles.angles()[j], j))
            .collect()
    }
}

/// Penetration functions for a single scan angle. Writes only its own
/// column, so angles can run concurrently without synchronization.
fn compute_angle_column(
    points: &[ReturnPoint],
    histogram: &ReturnTensor,
    angle: f64,
    j: usize,
) -> AngleColumn {
    let (m, _, k_max) = histogram.dim();
    let mut interception = Array2::<f64>::zeros((m, k_max));
    let mut contact = Array2::<f64>::zeros((m, k_max));

    // All beams launched at this angle: first returns in the full point set
    let n0 = points
        .iter()
        .filter(|p| p.return_number == 1 && p.abs_scan_angle() == angle)
        .count() as f64;

    // Per-layer totals across return numbers
    let mut layer_totals = vec![0.0f64; m];
    for i in 0..m {
        for k in 0..k_max {
            layer_totals[i] += histogram[[i, j, k]];
        }
    }

    if n0 > 0.0 {
        for k in 0..k_max {
            let mut cumulative = 0.0;
            for i in 0..m {
                cumulative += histogram[[i, j, k]];
                interception[[i, k]] = 1.0 - cumulative / n0;
            }
        }
    } else {
        log::debug!("Scan angle {} has no first returns; masking its layers", angle);
    }

    for i in 0..m {
        if layer_totals[i] > 0.0 {
            for k in 0..k_max {
                contact[[i, k]] = histogram[[i, j, k]] / layer_totals[i];
            }
        }
    }

    // Boundary correction: first-contact probabilities are undercounted when
    // return numbers are truncated at K, so rescale by the penetration at K.
    for i in 0..m {
        contact[[i, 0]] *= interception[[i, k_max - 1]];
    }

    let control: Vec<bool> = layer_totals
        .iter()
        .map(|&t| t > 0.0 && n0 > 0.0)
        .collect();

    AngleColumn {
        interception,
        contact,
        control,
        n0,
    }
}
