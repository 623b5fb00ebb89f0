//! Ross G-function: angular projection coefficient relating leaf orientation
//! statistics to beam-path interception geometry (Ross-Nilson formulation,
//! as used by Detto et al., 2015).

use crate::types::{AngleField, LeafAngleDistribution};
use ndarray::Array2;
use std::f64::consts::PI;

/// Number of leaf-inclination quadrature nodes on [~0, pi/2]
const THETA_SAMPLES: usize = 101;

/// Lower bound of the inclination grid; strictly positive so cot(theta)
/// stays finite at the first node.
const THETA_MIN: f64 = 1e-8;

/// Compute the Ross G-function for a beam at `zenith_deg` degrees off nadir.
///
/// The projection integrand A(theta) equals `cos(ze) * cos(theta)` where the
/// leaf never self-shadows the beam (`|cot(theta) * cot(ze)| > 1`), and
/// otherwise picks up the mutual-shadowing term
/// `(2/pi) * (tan(phi) - phi)` with `phi = arccos(cot(theta) * cot(ze))`.
/// The result is the trapezoidal quadrature of `A(theta) * f(theta)` over a
/// fixed 101-point inclination grid, except for the spherical distribution
/// which has the closed form G = 0.5.
///
/// Purely functional: results are identical regardless of call order, so the
/// function is safe to evaluate in parallel across scan angles.
pub fn gfunction(model: LeafAngleDistribution, zenith_deg: f64) -> f64 {
    if model == LeafAngleDistribution::Spherical {
        return 0.5;
    }

    let ze = zenith_deg.abs() * PI / 180.0;
    let step = (PI / 2.0 - THETA_MIN) / (THETA_SAMPLES - 1) as f64;
    let cot_ze = 1.0 / ze.tan();

    let mut integrand = [0.0f64; THETA_SAMPLES];
    for (i, a) in integrand.iter_mut().enumerate() {
        let th = THETA_MIN + i as f64 * step;
        let j = cot_ze / th.tan();
        *a = if j.abs() <= 1.0 {
            let phi = j.acos();
            th.cos() * ze.cos() * (1.0 + (2.0 / PI) * (phi.tan() - phi))
        } else {
            ze.cos() * th.cos()
        };
        let f = match model {
            LeafAngleDistribution::Planophile => 2.0 / PI * (1.0 + (2.0 * th).cos()),
            LeafAngleDistribution::Erectophile => 2.0 / PI * (1.0 - (2.0 * th).cos()),
            LeafAngleDistribution::Spherical => unreachable!(),
        };
        *a *= f;
    }

    trapezoid(&integrand, step)
}

/// Per-layer, per-angle projection matrix G[M, S].
///
/// Constant across depth for the supported leaf angle distributions, but kept
/// two-dimensional so depth-varying distributions slot in without touching
/// the solver.
pub fn projection_matrix(
    model: LeafAngleDistribution,
    angles_deg: &[f64],
    num_layers: usize,
) -> AngleField {
    let mut g = Array2::<f64>::zeros((num_layers, angles_deg.len()));
    for (j, &angle) in angles_deg.iter().enumerate() {
        let value = gfunction(model, angle);
        g.column_mut(j).fill(value);
    }
    g
}

/// Trapezoidal quadrature over uniformly spaced samples
fn trapezoid(values: &[f64], step: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let interior: f64 = values[1..values.len() - 1].iter().sum();
    step * (0.5 * values[0] + interior + 0.5 * values[values.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spherical_is_exactly_half() {
        for angle in [-30.0, 0.0, 7.5, 15.0, 45.0, 89.0] {
            assert_eq!(gfunction(LeafAngleDistribution::Spherical, angle), 0.5);
        }
    }

    #[test]
    fn test_nadir_beam_closed_forms() {
        // At nadir cot(ze) diverges, so A(theta) = cos(theta) everywhere and
        // the integrals reduce to 8/(3*pi) and 4/(3*pi) respectively.
        let g_plano = gfunction(LeafAngleDistribution::Planophile, 0.0);
        let g_erecto = gfunction(LeafAngleDistribution::Erectophile, 0.0);
        assert_relative_eq!(g_plano, 8.0 / (3.0 * PI), epsilon = 1e-3);
        assert_relative_eq!(g_erecto, 4.0 / (3.0 * PI), epsilon = 1e-3);
    }

    #[test]
    fn test_sign_of_zenith_is_ignored() {
        for model in [
            LeafAngleDistribution::Planophile,
            LeafAngleDistribution::Erectophile,
        ] {
            let pos = gfunction(model, 12.0);
            let neg = gfunction(model, -12.0);
            assert_eq!(pos.to_bits(), neg.to_bits());
        }
    }

    #[test]
    fn test_deterministic_across_calls() {
        let a = gfunction(LeafAngleDistribution::Planophile, 23.0);
        let b = gfunction(LeafAngleDistribution::Planophile, 23.0);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_values_are_physical() {
        for model in [
            LeafAngleDistribution::Planophile,
            LeafAngleDistribution::Erectophile,
        ] {
            for angle in [0.0, 5.0, 15.0, 30.0, 60.0] {
                let g = gfunction(model, angle);
                assert!(g.is_finite());
                assert!(g > 0.0 && g < 1.5, "G = {} out of range", g);
            }
        }
    }

    #[test]
    fn test_projection_matrix_constant_over_depth() {
        let g = projection_matrix(LeafAngleDistribution::Erectophile, &[0.0, 10.0], 5);
        assert_eq!(g.dim(), (5, 2));
        for j in 0..2 {
            let top = g[[0, j]];
            for i in 1..5 {
                assert_eq!(g[[i, j]], top);
            }
        }
        assert_relative_eq!(g[[0, 0]], gfunction(LeafAngleDistribution::Erectophile, 0.0));
    }
}
