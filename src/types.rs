use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 3D count/probability tensor (depth layer x scan angle x return number)
pub type ReturnTensor = Array3<f64>;

/// 2D per-layer, per-angle field (e.g. the G projection matrix)
pub type AngleField = Array2<f64>;

/// Depth-indexed profile (e.g. the LAD output)
pub type DepthProfile = Array1<f64>;

/// Point classification value treated as vegetation by the attenuation
/// corrector. Upstream filtering is expected to assign this class to
/// canopy returns before handing points to the core.
pub const VEGETATION_CLASS: u8 = 1;

/// A single LiDAR return, already spatially clipped and classified by the
/// caller. The core reads these, never mutates them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    /// Easting (meters)
    pub x: f64,
    /// Northing (meters)
    pub y: f64,
    /// Height above ground (meters)
    pub z: f64,
    /// Ordinal position along the beam path (1 = first return)
    pub return_number: u8,
    /// Point classification flag
    pub classification: u8,
    /// Off-nadir scan angle (degrees); the core uses its absolute value
    pub scan_angle: f64,
}

impl ReturnPoint {
    pub fn new(
        x: f64,
        y: f64,
        z: f64,
        return_number: u8,
        classification: u8,
        scan_angle: f64,
    ) -> Self {
        Self {
            x,
            y,
            z,
            return_number,
            classification,
            scan_angle,
        }
    }

    /// Absolute scan angle in degrees
    pub fn abs_scan_angle(&self) -> f64 {
        self.scan_angle.abs()
    }

    pub fn is_vegetation(&self) -> bool {
        self.classification == VEGETATION_CLASS
    }
}

/// Leaf angle distribution models supported by the Ross G-function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafAngleDistribution {
    /// Mostly horizontal leaves, f = (2/pi)(1 + cos 2theta)
    Planophile,
    /// Mostly vertical leaves, f = (2/pi)(1 - cos 2theta)
    Erectophile,
    /// Uniformly distributed leaf normals, G = 0.5 for all zenith angles
    Spherical,
}

impl std::fmt::Display for LeafAngleDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeafAngleDistribution::Planophile => write!(f, "planophile"),
            LeafAngleDistribution::Erectophile => write!(f, "erectophile"),
            LeafAngleDistribution::Spherical => write!(f, "spherical"),
        }
    }
}

impl FromStr for LeafAngleDistribution {
    type Err = LadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planophile" => Ok(LeafAngleDistribution::Planophile),
            "erectophile" => Ok(LeafAngleDistribution::Erectophile),
            "spherical" => Ok(LeafAngleDistribution::Spherical),
            _ => Err(LadError::InvalidModel(s.to_string())),
        }
    }
}

/// How the ensemble solver treats canopy layers with no scan-angle coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapPolicy {
    /// Legacy behavior: linearly interpolate alpha/beta across no-data gaps
    /// using finite neighbors; never extrapolate past the last finite sample.
    Interpolate,
    /// Treat no-data layers as zero leaf area (alpha = beta = 0).
    ZeroFill,
}

/// A validated, uniformly spaced grid of depth-layer boundaries.
///
/// Each entry is the lower depth edge of one layer, so M entries define M
/// layers of thickness `dz` and the grid covers depths
/// `[edge[0], edge[M-1] + dz)`. The grid is stored shallow-to-deep: index 0
/// is the canopy top. A strictly decreasing input sequence is accepted and
/// reversed on construction.
#[derive(Debug, Clone)]
pub struct DepthGrid {
    edges: Array1<f64>,
    dz: f64,
    max_height: f64,
}

impl DepthGrid {
    /// Build a depth grid from layer boundary heights.
    ///
    /// Requires at least two entries, strictly monotonic order, uniform
    /// spacing and finite values.
    pub fn new(heights: Array1<f64>) -> LadResult<Self> {
        if heights.len() < 2 {
            return Err(LadError::InvalidGrid(format!(
                "depth grid needs at least 2 boundaries, got {}",
                heights.len()
            )));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(LadError::InvalidGrid(
                "depth grid contains non-finite values".to_string(),
            ));
        }

        let ascending = heights[1] > heights[0];
        let edges = if ascending {
            heights
        } else {
            heights.slice(ndarray::s![..;-1]).to_owned()
        };

        let dz = edges[1] - edges[0];
        if dz <= 0.0 {
            return Err(LadError::InvalidGrid(
                "depth grid boundaries must be strictly monotonic".to_string(),
            ));
        }
        let values = edges.to_vec();
        for w in values.windows(2) {
            let step = w[1] - w[0];
            if step <= 0.0 || (step - dz).abs() > 1e-9 * dz.max(1.0) {
                return Err(LadError::InvalidGrid(
                    "depth grid boundaries must be strictly monotonic with uniform spacing"
                        .to_string(),
                ));
            }
        }

        let max_height = edges[edges.len() - 1];
        Ok(Self {
            edges,
            dz,
            max_height,
        })
    }

    /// Build a grid of `num_layers` layers with lower edges
    /// `[0, dz, .., (num_layers - 1) * dz]`.
    pub fn from_resolution(dz: f64, num_layers: usize) -> LadResult<Self> {
        if dz <= 0.0 || !dz.is_finite() {
            return Err(LadError::InvalidGrid(format!(
                "layer thickness must be positive, got {}",
                dz
            )));
        }
        if num_layers < 2 {
            return Err(LadError::InvalidGrid(
                "depth grid needs at least two layers".to_string(),
            ));
        }
        let edges = Array1::from_iter((0..num_layers).map(|i| i as f64 * dz));
        Self::new(edges)
    }

    /// Number of depth layers M
    pub fn num_layers(&self) -> usize {
        self.edges.len()
    }

    /// Layer thickness
    pub fn dz(&self) -> f64 {
        self.dz
    }

    /// Height of the top of the grid; depth is measured downwards from here
    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Lower depth edge of layer `i`
    pub fn layer_edge(&self, i: usize) -> f64 {
        self.edges[i]
    }

    /// Depth below the top of the grid for a point at height `z`
    pub fn depth_of(&self, z: f64) -> f64 {
        self.max_height - z
    }

    /// Layer index for a given depth, using the half-open interval
    /// `edge[i] <= depth < edge[i] + dz`. A depth exactly equal to the grid
    /// maximum therefore falls in the deepest layer.
    pub fn layer_of(&self, depth: f64) -> Option<usize> {
        if !depth.is_finite() {
            return None;
        }
        let offset = depth - self.edges[0];
        if offset < 0.0 {
            return None;
        }
        let i = (offset / self.dz).floor() as usize;
        (i < self.num_layers()).then_some(i)
    }
}

/// Error types for LAD estimation
#[derive(Debug, thiserror::Error)]
pub enum LadError {
    #[error("Unsupported leaf angle distribution: {0}")]
    InvalidModel(String),

    #[error("Invalid depth grid: {0}")]
    InvalidGrid(String),

    #[error("No canopy layer contains first returns; the layer recursion has no starting depth")]
    EmptyCanopy,

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for LAD operations
pub type LadResult<T> = Result<T, LadError>;
