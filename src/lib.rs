//! canopy-lad: A Fast, Modular Radiative-Transfer Leaf Area Density Estimator
//!
//! This library estimates the vertical distribution of Leaf Area Density (LAD)
//! within a forest canopy from multi-return LiDAR point clouds, using the
//! stochastic radiative-transfer inversion of Detto, Asner, Sonnentag and
//! Muller-Landau (2015, Journal of Geophysical Research).
//!
//! The caller supplies an already-filtered, already-classified array of
//! [`ReturnPoint`]s and a [`DepthGrid`]; the estimator bins returns per depth
//! layer, scan angle and return number, derives penetration and contact
//! probabilities, projects them through the Ross G-function for the chosen
//! leaf angle distribution, and solves the layer-recursive inversion for the
//! LAD profile.
//!
//! ```
//! use canopy_lad::{DepthGrid, LadEstimator, ReturnPoint};
//!
//! let points = vec![
//!     ReturnPoint::new(0.0, 0.0, 1.5, 1, 1, 0.0),
//!     ReturnPoint::new(0.0, 0.0, 1.5, 2, 1, 0.0),
//!     ReturnPoint::new(0.0, 0.0, 0.5, 1, 1, 0.0),
//! ];
//! let grid = DepthGrid::from_resolution(1.0, 3).unwrap();
//! let estimate = LadEstimator::new().estimate(&points, &grid).unwrap();
//! assert_eq!(estimate.lad.len(), 3);
//! ```

pub mod types;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AngleField, DepthGrid, DepthProfile, GapPolicy, LadError, LadResult, LeafAngleDistribution,
    ReturnPoint, ReturnTensor,
};

pub use core::{EstimatorParams, LadEstimate, LadEstimator, ScanAngleIndex};
