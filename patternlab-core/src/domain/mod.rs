//! Domain types for PatternLab

pub mod bar;
pub mod ids;
pub mod pattern;
pub mod performance;
pub mod series;
pub mod trade;

pub use bar::Bar;
pub use ids::{ConfigHash, PatternId, Ticket};
pub use pattern::{Direction, PatternBook, PatternInstance, PatternKind, PatternStatus};
pub use performance::PerformanceSnapshot;
pub use series::{PriceSeries, SeriesError};
pub use trade::{r_multiple, ExitReason, TradeError, TradeRecord};

/// Build a bar with an hourly timestamp anchored at 2024-01-02 00:00.
#[cfg(test)]
pub fn make_bar(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Bar::new(ts, open, high, low, close, volume)
}

/// Build a series from `(open, high, low, close, volume)` tuples given
/// oldest-first. Timestamps advance one hour per bar.
#[cfg(test)]
pub fn series_of(data: &[(f64, f64, f64, f64, f64)]) -> PriceSeries {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    PriceSeries::from_bars(
        "TEST",
        data.iter().enumerate().map(|(i, &(o, h, l, c, v))| {
            Bar::new(base + chrono::Duration::hours(i as i64), o, h, l, c, v)
        }),
    )
}
