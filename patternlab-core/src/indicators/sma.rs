//! Simple Moving Average over plain slices.

/// SMA over the tail of a slice. None when too short.
pub fn sma_tail(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}
