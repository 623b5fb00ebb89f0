//! Return histogram construction: 3D counts of LiDAR returns per depth
//! layer, scan angle and return number.

use crate::types::{DepthGrid, LadError, LadResult, ReturnPoint, ReturnTensor};
use ndarray::Array3;

/// Explicit mapping from absolute scan-angle values to tensor column
/// indices. Built once per estimate and threaded through every derived
/// tensor, so angle binning can never silently drift between stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAngleIndex {
    angles: Vec<f64>,
}

impl ScanAngleIndex {
    /// Collect the sorted-unique absolute scan angles of all points with
    /// `return_number <= max_return`.
    pub fn from_points(points: &[ReturnPoint], max_return: u8) -> Self {
        let mut angles: Vec<f64> = points
            .iter()
            .filter(|p| p.return_number <= max_return)
            .map(ReturnPoint::abs_scan_angle)
            .collect();
        angles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        angles.dedup();
        Self { angles }
    }

    /// Number of distinct scan angles S
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Sorted-unique angle values in index order
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Column index of an exact angle value, if present
    pub fn index_of(&self, abs_angle: f64) -> Option<usize> {
        self.angles
            .binary_search_by(|a| a.partial_cmp(&abs_angle).unwrap_or(std::cmp::Ordering::Less))
            .ok()
    }
}

/// Builds the return histogram `n[M, S, K]` from a filtered point array.
#[derive(Debug, Clone)]
pub struct HistogramBuilder {
    max_return: u8,
}

impl HistogramBuilder {
    pub fn new(max_return: u8) -> LadResult<Self> {
        if max_return == 0 {
            return Err(LadError::Processing(
                "maximum return number must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_return })
    }

    /// Largest return number actually present among kept points, capped at
    /// the configured maximum. At least 1, so an empty input still yields a
    /// well-formed (all-zero) tensor.
    pub fn observed_max_return(&self, points: &[ReturnPoint]) -> usize {
        points
            .iter()
            .filter(|p| p.return_number <= self.max_return)
            .map(|p| usize::from(p.return_number))
            .max()
            .unwrap_or(1)
            .max(1)
    }

    /// Build the count tensor in a single pass over the points.
    ///
    /// Depth binning uses the half-open interval
    /// `edge[i] <= depth < edge[i] + dz`; scan angles bin by exact value
    /// through `angles`; return numbers 1..=K map to the last axis. Points
    /// outside the depth grid or with an angle not present in the index are
    /// skipped.
    pub fn build(
        &self,
        points: &[ReturnPoint],
        grid: &DepthGrid,
        angles: &ScanAngleIndex,
    ) -> LadResult<ReturnTensor> {
        let m = grid.num_layers();
        let s = angles.len();
        let k_max = self.observed_max_return(points);
        let mut n = Array3::<f64>::zeros((m, s, k_max));

        log::debug!(
            "Binning {} points into {}x{}x{} return histogram",
            points.len(),
            m,
            s,
            k_max
        );

        for point in points {
            if point.return_number == 0 || point.return_number > self.max_return {
                continue;
            }
            let depth = grid.depth_of(point.z);
            let Some(i) = grid.layer_of(depth) else {
                continue;
            };
            let Some(j) = angles.index_of(point.abs_scan_angle()) else {
                continue;
            };
            let k = usize::from(point.return_number) - 1;
            n[[i, j, k]] += 1.0;
        }

        Ok(n)
    }
}

/// First-return gap fill: for every (layer, angle) cell with returns present
/// but no first return, inject a single synthetic first return.
///
/// Without this a layer known to contain foliage (it produced 2nd/3rd
/// returns) would carry a zero contact-rate denominator and surface as a
/// non-finite LAD value. The injected count trades a small positive bias for
/// a defined estimate; the rule is part of the revised estimator variant.
pub fn fill_first_return_gaps(n: &mut ReturnTensor) -> usize {
    let (m, s, _) = n.dim();
    let mut injected = 0;
    for i in 0..m {
        for j in 0..s {
            let total: f64 = n.slice(ndarray::s![i, j, ..]).sum();
            if total > 0.0 && n[[i, j, 0]] == 0.0 {
                n[[i, j, 0]] = 1.0;
                injected += 1;
            }
        }
    }
    if injected > 0 {
        log::debug!("Gap fill injected synthetic first returns into {} cells", injected);
    }
    injected
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn point(z: f64, return_number: u8, scan_angle: f64) -> ReturnPoint {
        ReturnPoint::new(0.0, 0.0, z, return_number, 1, scan_angle)
    }

    fn grid_3_layers() -> DepthGrid {
        DepthGrid::new(Array1::from_vec(vec![0.0, 1.0, 2.0])).unwrap()
    }

    #[test]
    fn test_angle_index_sorted_unique_abs() {
        let points = vec![
            point(1.0, 1, -5.0),
            point(1.0, 1, 5.0),
            point(1.0, 1, 0.0),
            point(1.0, 2, 12.0),
        ];
        let idx = ScanAngleIndex::from_points(&points, 3);
        assert_eq!(idx.angles(), &[0.0, 5.0, 12.0]);
        assert_eq!(idx.index_of(5.0), Some(1));
        assert_eq!(idx.index_of(7.0), None);
    }

    #[test]
    fn test_angle_index_respects_max_return() {
        let points = vec![point(1.0, 1, 0.0), point(1.0, 3, 9.0)];
        let idx = ScanAngleIndex::from_points(&points, 2);
        assert_eq!(idx.angles(), &[0.0]);
    }

    #[test]
    fn test_single_pass_binning() {
        // grid tops out at z = 2; depth = 2 - z
        let points = vec![
            point(1.5, 1, 0.0), // depth 0.5 -> layer 0
            point(1.5, 1, 0.0),
            point(1.5, 2, 0.0),
            point(0.5, 1, 0.0), // depth 1.5 -> layer 1
            point(0.5, 2, 0.0),
        ];
        let grid = grid_3_layers();
        let angles = ScanAngleIndex::from_points(&points, 2);
        let builder = HistogramBuilder::new(2).unwrap();
        let n = builder.build(&points, &grid, &angles).unwrap();

        assert_eq!(n.dim(), (3, 1, 2));
        assert_eq!(n[[0, 0, 0]], 2.0);
        assert_eq!(n[[0, 0, 1]], 1.0);
        assert_eq!(n[[1, 0, 0]], 1.0);
        assert_eq!(n[[1, 0, 1]], 1.0);
        assert_eq!(n.slice(ndarray::s![2, .., ..]).sum(), 0.0);
    }

    #[test]
    fn test_max_return_filter_and_boundaries() {
        let points = vec![
            point(2.0, 1, 0.0), // depth 0, top edge -> layer 0
            point(0.0, 1, 0.0), // depth 2, exactly the grid maximum -> last layer
            point(1.5, 3, 0.0), // above max_return, dropped
            point(2.5, 1, 0.0), // above the grid top, dropped
        ];
        let grid = grid_3_layers();
        let angles = ScanAngleIndex::from_points(&points, 2);
        let builder = HistogramBuilder::new(2).unwrap();
        let n = builder.build(&points, &grid, &angles).unwrap();

        assert_eq!(n[[0, 0, 0]], 1.0);
        assert_eq!(n[[2, 0, 0]], 1.0);
        assert_eq!(n.sum(), 2.0);
    }

    #[test]
    fn test_empty_input_builds_zero_tensor() {
        let grid = grid_3_layers();
        let angles = ScanAngleIndex::from_points(&[], 3);
        let builder = HistogramBuilder::new(3).unwrap();
        let n = builder.build(&[], &grid, &angles).unwrap();
        assert_eq!(n.dim(), (3, 0, 1));
        assert_eq!(n.sum(), 0.0);
    }

    #[test]
    fn test_gap_fill_injects_single_first_return() {
        let mut n = Array3::<f64>::zeros((2, 1, 2));
        n[[0, 0, 1]] = 3.0; // second returns only
        n[[1, 0, 0]] = 2.0; // already has first returns
        let injected = fill_first_return_gaps(&mut n);
        assert_eq!(injected, 1);
        assert_eq!(n[[0, 0, 0]], 1.0);
        assert_eq!(n[[0, 0, 1]], 3.0);
        assert_eq!(n[[1, 0, 0]], 2.0);
    }

    #[test]
    fn test_gap_fill_skips_empty_cells() {
        let mut n = Array3::<f64>::zeros((2, 1, 2));
        assert_eq!(fill_first_return_gaps(&mut n), 0);
        assert_eq!(n.sum(), 0.0);
    }
}
