//! Small statistics helpers shared by the detectors.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation. Fewer than two values → 0.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// z-score of `value` against the sample, or None if the sample cannot
/// support one (fewer than two values or zero dispersion).
pub fn z_score(value: f64, sample: &[f64]) -> Option<f64> {
    let sd = std_dev(sample);
    if sd <= f64::EPSILON {
        return None;
    }
    Some((value - mean(sample)) / sd)
}

/// `num / den`, or `default` when the divisor is not strictly positive.
pub fn safe_ratio(num: f64, den: f64, default: f64) -> f64 {
    if den > 0.0 && den.is_finite() {
        num / den
    } else {
        default
    }
}
