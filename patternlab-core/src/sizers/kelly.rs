//! Kelly fraction for a binary win/lose payoff.

/// Fractional Kelly: `win_rate − (1 − win_rate) / win_loss_ratio`, clamped to
/// `[0, cap]`.
///
/// Returns `None` when the payoff ratio is unusable (≤ 0 or non-finite), so
/// the caller can fall back to a neutral multiplier instead of dividing by
/// zero.
pub fn kelly_fraction(win_rate: f64, win_loss_ratio: f64, cap: f64) -> Option<f64> {
    if !(win_loss_ratio.is_finite() && win_loss_ratio > 0.0) {
        return None;
    }
    let p = win_rate.clamp(0.0, 1.0);
    let raw = p - (1.0 - p) / win_loss_ratio;
    Some(raw.max(0.0).min(cap.max(0.0)))
}
