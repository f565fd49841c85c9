//! Data Sanitization
//!
//! Probability validation and the defensive clamp applied after every
//! floating-point update.

use crate::error::AlgoError;

/// Whether `x` is a finite value in [0, 1]
pub fn is_probability(x: f64) -> bool {
    x.is_finite() && (0.0..=1.0).contains(&x)
}

/// Reject anything outside [0, 1] (NaN included)
pub fn ensure_probability(name: &'static str, x: f64) -> Result<f64, AlgoError> {
    if is_probability(x) {
        Ok(x)
    } else {
        Err(AlgoError::InvalidParameter { name, value: x })
    }
}

/// Reject negative, NaN or infinite rates
pub fn ensure_rate(name: &'static str, x: f64) -> Result<f64, AlgoError> {
    if x.is_finite() && x >= 0.0 {
        Ok(x)
    } else {
        Err(AlgoError::InvalidParameter { name, value: x })
    }
}

/// Clamp a computed probability back into [0, 1]
///
/// NaN maps to 0.0; it can only appear if an upstream check was skipped.
pub fn clamp_probability(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Check an ordered (low, high) band inside [0, 1]
pub fn ensure_band(name: &'static str, band: (f64, f64)) -> Result<(f64, f64), AlgoError> {
    let (low, high) = band;
    ensure_probability(name, low)?;
    ensure_probability(name, high)?;
    if low > high {
        return Err(AlgoError::InvalidParameter { name, value: low });
    }
    Ok(band)
}
