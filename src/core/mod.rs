//! Core LAD estimation modules

pub mod gfunction;
pub mod histogram;
pub mod attenuation;
pub mod penetration;
pub mod solver;
pub mod estimator;

// Re-export main types
pub use gfunction::{gfunction, projection_matrix};
pub use histogram::{fill_first_return_gaps, HistogramBuilder, ScanAngleIndex};
pub use attenuation::{apply_correction, correction_factors};
pub use penetration::{PenetrationModel, Probabilities};
pub use solver::EnsembleSolver;
pub use estimator::{EstimatorParams, LadEstimate, LadEstimator};
