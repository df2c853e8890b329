use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

/// An instrumental magnitude with its propagated uncertainty.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Magnitude {
    pub value: f64,
    pub error: f64,
}

/// Convert a flux measurement to an instrumental magnitude.
///
/// m = -2.5 log10(flux); the error follows standard logarithmic
/// propagation, (2.5 / ln 10) * (flux_error / flux).
pub fn instrumental_magnitude(flux: f64, flux_error: f64) -> Result<Magnitude> {
    if !(flux > 0.0) {
        bail!("Flux {:.4e} is not positive, magnitude is undefined", flux);
    }
    let value = -2.5 * flux.log10();
    let error = 2.5 / std::f64::consts::LN_10 * (flux_error / flux);
    Ok(Magnitude { value, error })
}

/// Linear color-term transformation:
/// m1 + beta * (m1 - m2) + gamma.
pub fn color_term(m1: f64, m2: f64, beta: f64, gamma: f64) -> f64 {
    m1 + beta * (m1 - m2) + gamma
}

/// Quadrature error of the color-term transformation.
///
/// Terms: the direct m1 error, the beta-scaled band errors, the
/// beta-uncertainty contribution of each magnitude, and the zero-point
/// error.
pub fn color_term_error(
    m1: f64,
    m2: f64,
    beta: f64,
    m1_error: f64,
    m2_error: f64,
    beta_error: f64,
    gamma_error: f64,
) -> f64 {
    (m1_error.powi(2)
        + (beta * m1_error).powi(2)
        + (beta_error * m1).powi(2)
        + (beta * m2_error).powi(2)
        + (beta_error * m2).powi(2)
        + gamma_error.powi(2))
    .sqrt()
}

/// One calibration point: instrumental magnitudes in two bands, the
/// reference magnitude, and the per-point weight (its sigma).
#[derive(Debug, Clone, Copy)]
pub struct CalibrationPoint {
    pub m1: f64,
    pub m2: f64,
    pub reference: f64,
    pub weight: f64,
}

/// Weighted residual of one point against the color-term model, for
/// consumption by a least-squares solver (which squares and sums).
pub fn residual(beta: f64, gamma: f64, point: &CalibrationPoint) -> f64 {
    (point.reference - color_term(point.m1, point.m2, beta, gamma)) / point.weight
}

/// Fitted color-term coefficients with parameter uncertainties.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ColorTermFit {
    pub beta: f64,
    pub gamma: f64,
    pub beta_error: f64,
    pub gamma_error: f64,
    /// Root mean square of the weighted residuals.
    pub rms: f64,
}

/// Fit beta and gamma by weighted linear least squares.
///
/// The model y - m1 = beta * (m1 - m2) + gamma is linear in the
/// parameters, so the normal equations solve it directly; parameter
/// errors come from the covariance (A^T A)^-1 of the weighted design
/// matrix.
pub fn fit_color_term(points: &[CalibrationPoint]) -> Result<ColorTermFit> {
    if points.len() < 2 {
        bail!(
            "Color-term fit needs at least 2 calibration points, got {}",
            points.len()
        );
    }
    for (i, point) in points.iter().enumerate() {
        if point.weight == 0.0 || !point.weight.is_finite() {
            bail!("Calibration point {} has unusable weight {}", i, point.weight);
        }
    }

    let design = DMatrix::from_fn(points.len(), 2, |row, col| {
        let p = &points[row];
        match col {
            0 => (p.m1 - p.m2) / p.weight,
            _ => 1.0 / p.weight,
        }
    });
    let target = DVector::from_fn(points.len(), |row, _| {
        let p = &points[row];
        (p.reference - p.m1) / p.weight
    });

    let nt = design.transpose() * &design;
    let normal = Matrix2::new(nt[(0, 0)], nt[(0, 1)], nt[(1, 0)], nt[(1, 1)]);
    let projected = design.transpose() * &target;
    let rhs = Vector2::new(projected[0], projected[1]);

    let covariance = match normal.try_inverse() {
        Some(inverse) => inverse,
        None => bail!("Color-term fit is degenerate: all points share one color index"),
    };
    let solution = covariance * rhs;

    let beta = solution[0];
    let gamma = solution[1];

    let rms = (points
        .iter()
        .map(|p| residual(beta, gamma, p).powi(2))
        .sum::<f64>()
        / points.len() as f64)
        .sqrt();

    Ok(ColorTermFit {
        beta,
        gamma,
        beta_error: covariance[(0, 0)].sqrt(),
        gamma_error: covariance[(1, 1)].sqrt(),
        rms,
    })
}
