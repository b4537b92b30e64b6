//! Risk-adjusted position sizing.
//!
//! # Formula
//! ```text
//! risk_money = balance × risk% / 100
//!            × kelly_fraction            (if enabled)
//!            × clamp(baseline_atr / current_atr, 0.5, 2.0)   (if enabled)
//!            × drawdown / expectancy factors                (if enabled)
//! units      = risk_money / risk_per_unit
//! lots       = floor_to_step(clamp(units / contract_size, min, max)), re-clamped to min
//! ```
//!
//! Returns exactly 0 when `risk_per_unit ≤ 0`, when the account has no
//! balance, when risk money collapses to 0 (zero Kelly fraction), or when the
//! throttle is on and system expectancy is negative.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::PerformanceSnapshot;

use super::kelly::kelly_fraction;
use super::risk::{LotConstraints, RiskParameters, SizingConfig, SizingError};

/// Account and market state at sizing time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingContext {
    pub account_balance: f64,
    /// Current ATR; ≤ 0 disables the volatility factor.
    pub current_atr: f64,
}

/// Every intermediate of one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizingBreakdown {
    pub base_risk_money: f64,
    pub kelly_factor: f64,
    pub volatility_factor: f64,
    pub drawdown_factor: f64,
    pub expectancy_factor: f64,
    pub risk_money: f64,
    pub units: f64,
    pub volume: f64,
    /// Set when sizing refused the trade outright.
    pub refused: bool,
}

impl SizingBreakdown {
    fn refused(base_risk_money: f64) -> Self {
        Self {
            base_risk_money,
            kelly_factor: 1.0,
            volatility_factor: 1.0,
            drawdown_factor: 1.0,
            expectancy_factor: 1.0,
            refused: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    params: RiskParameters,
    lots: LotConstraints,
    /// `max_drawdown_percent` as configured, used until enough trades exist.
    configured_drawdown: f64,
    /// Latest external drawdown estimate; the throttle never sees less.
    drawdown_floor: Option<f64>,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Result<Self, SizingError> {
        config.validate()?;
        Ok(Self {
            configured_drawdown: config.risk.max_drawdown_percent,
            params: config.risk,
            lots: config.lots,
            drawdown_floor: None,
        })
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn lot_constraints(&self) -> &LotConstraints {
        &self.lots
    }

    /// Trade volume in lots for a stop `risk_per_unit` away from entry.
    pub fn size(&self, risk_per_unit: f64, ctx: &SizingContext) -> f64 {
        self.breakdown(risk_per_unit, ctx).volume
    }

    /// Size with every factor exposed.
    pub fn breakdown(&self, risk_per_unit: f64, ctx: &SizingContext) -> SizingBreakdown {
        let p = &self.params;
        let base = ctx.account_balance * p.risk_percent_per_trade / 100.0;

        if !(risk_per_unit.is_finite() && risk_per_unit > 0.0) {
            return SizingBreakdown::refused(base);
        }
        if !(base.is_finite() && base > 0.0) {
            return SizingBreakdown::refused(base);
        }

        let kelly_factor = if p.use_kelly_criterion {
            kelly_fraction(p.win_rate, p.win_loss_ratio, p.kelly_cap).unwrap_or(1.0)
        } else {
            1.0
        };

        let volatility_factor = if p.use_volatility_adjust
            && p.baseline_atr > 0.0
            && ctx.current_atr > 0.0
        {
            (p.baseline_atr / ctx.current_atr).clamp(0.5, 2.0)
        } else {
            1.0
        };

        let (drawdown_factor, expectancy_factor) = if p.use_drawdown_throttle {
            if p.system_expectancy < 0.0 {
                debug!(expectancy = p.system_expectancy, "negative expectancy, refusing trade");
                return SizingBreakdown::refused(base);
            }
            let dd = if p.max_drawdown_percent > p.drawdown_threshold_pct {
                (p.drawdown_threshold_pct / p.max_drawdown_percent).clamp(0.5, 1.0)
            } else {
                1.0
            };
            let boost = if p.system_expectancy > 0.0 {
                (1.0 + p.expectancy_boost_factor * p.system_expectancy)
                    .min(p.max_expectancy_boost)
                    .max(1.0)
            } else {
                1.0
            };
            (dd, boost)
        } else {
            (1.0, 1.0)
        };

        let risk_money =
            base * kelly_factor * volatility_factor * drawdown_factor * expectancy_factor;
        let mut out = SizingBreakdown {
            base_risk_money: base,
            kelly_factor,
            volatility_factor,
            drawdown_factor,
            expectancy_factor,
            risk_money,
            ..SizingBreakdown::default()
        };
        if risk_money <= 0.0 {
            out.refused = true;
            return out;
        }

        out.units = risk_money / risk_per_unit;
        let lots = out.units / self.lots.contract_size;
        let clamped = lots.clamp(p.min_position_size, p.max_position_size);
        out.volume = self.lots.floor_to_step(clamped).max(p.min_position_size);
        out
    }

    /// Replace the statistical inputs with tracker output.
    ///
    /// Takes `&mut self`, so it can never run concurrently with `size`.
    /// Win rate, payoff ratio and expectancy only change once the snapshot
    /// holds `min_trades_for_refresh` trades. An `expected_max_drawdown`
    /// applies immediately and stays as a floor under the drawdown input until
    /// the next estimate replaces it.
    pub fn refresh(&mut self, snapshot: &PerformanceSnapshot, expected_max_drawdown: Option<f64>) {
        if let Some(dd) = expected_max_drawdown.filter(|dd| dd.is_finite()) {
            self.drawdown_floor = Some(dd.max(0.0));
        }

        let enough = snapshot.trade_count >= self.params.min_trades_for_refresh;
        let drawdown = if enough {
            snapshot.max_drawdown_pct
        } else {
            self.configured_drawdown
        };
        self.params.max_drawdown_percent = match self.drawdown_floor {
            Some(floor) => drawdown.max(floor),
            None => drawdown,
        };

        if !enough {
            debug!(
                trades = snapshot.trade_count,
                needed = self.params.min_trades_for_refresh,
                max_drawdown_pct = self.params.max_drawdown_percent,
                "too few trades, keeping configured risk statistics"
            );
            return;
        }
        self.params.win_rate = snapshot.win_rate;
        self.params.win_loss_ratio = snapshot.win_loss_ratio();
        self.params.system_expectancy = snapshot.expectancy;
        info!(
            win_rate = self.params.win_rate,
            win_loss_ratio = self.params.win_loss_ratio,
            expectancy = self.params.system_expectancy,
            max_drawdown_pct = self.params.max_drawdown_percent,
            "risk parameters refreshed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SizingContext {
        SizingContext {
            account_balance: 10_000.0,
            current_atr: 0.0,
        }
    }

    fn sizer(risk: RiskParameters, lots: LotConstraints) -> PositionSizer {
        PositionSizer::new(SizingConfig { risk, lots }).unwrap()
    }

    fn fx_lots() -> LotConstraints {
        LotConstraints {
            lot_step: 0.01,
            contract_size: 100_000.0,
        }
    }

    #[test]
    fn scenario_plain_risk_sizing() {
        let s = sizer(RiskParameters::default(), fx_lots());
        let b = s.breakdown(0.0050, &ctx());
        assert_eq!(b.base_risk_money, 100.0);
        assert!((b.units - 20_000.0).abs() < 1e-6);
        assert_eq!(b.volume, 0.2);
        // Reproducible.
        assert_eq!(s.size(0.0050, &ctx()), s.size(0.0050, &ctx()));
    }

    #[test]
    fn units_clamped_to_max() {
        let s = sizer(RiskParameters::default(), LotConstraints::default());
        assert_eq!(s.size(0.0050, &ctx()), 100.0);
    }

    #[test]
    fn zero_or_negative_risk_distance_is_zero() {
        let s = sizer(RiskParameters::default(), fx_lots());
        assert_eq!(s.size(0.0, &ctx()), 0.0);
        assert_eq!(s.size(-1.0, &ctx()), 0.0);
        assert_eq!(s.size(f64::NAN, &ctx()), 0.0);
    }

    #[test]
    fn scenario_negative_expectancy_refuses() {
        let risk = RiskParameters {
            use_drawdown_throttle: true,
            system_expectancy: -0.3,
            use_kelly_criterion: true,
            win_rate: 0.9,
            win_loss_ratio: 3.0,
            ..RiskParameters::default()
        };
        let s = sizer(risk, fx_lots());
        let b = s.breakdown(0.0050, &ctx());
        assert!(b.refused);
        assert_eq!(b.volume, 0.0);
    }

    #[test]
    fn kelly_scales_risk_money() {
        let risk = RiskParameters {
            use_kelly_criterion: true,
            win_rate: 0.6,
            win_loss_ratio: 2.0,
            ..RiskParameters::default()
        };
        let b = sizer(risk, fx_lots()).breakdown(0.0050, &ctx());
        assert_eq!(b.kelly_factor, 0.25);
        assert_eq!(b.risk_money, 25.0);
        assert_eq!(b.volume, 0.05);
    }

    #[test]
    fn zero_kelly_yields_zero_volume() {
        let risk = RiskParameters {
            use_kelly_criterion: true,
            win_rate: 0.2,
            win_loss_ratio: 1.0,
            ..RiskParameters::default()
        };
        assert_eq!(sizer(risk, fx_lots()).size(0.0050, &ctx()), 0.0);
    }

    #[test]
    fn kelly_neutral_without_payoff_ratio() {
        let risk = RiskParameters {
            use_kelly_criterion: true,
            win_loss_ratio: 0.0,
            ..RiskParameters::default()
        };
        assert_eq!(sizer(risk, fx_lots()).breakdown(0.005, &ctx()).kelly_factor, 1.0);
    }

    #[test]
    fn volatility_factor_clamped() {
        let risk = RiskParameters {
            use_volatility_adjust: true,
            baseline_atr: 0.0010,
            ..RiskParameters::default()
        };
        let s = sizer(risk, fx_lots());
        let calm = SizingContext {
            current_atr: 0.0001,
            ..ctx()
        };
        assert_eq!(s.breakdown(0.005, &calm).volatility_factor, 2.0);
        let wild = SizingContext {
            current_atr: 0.0100,
            ..ctx()
        };
        assert_eq!(s.breakdown(0.005, &wild).volatility_factor, 0.5);
        assert_eq!(s.breakdown(0.005, &ctx()).volatility_factor, 1.0);
    }

    #[test]
    fn drawdown_throttle_and_boost() {
        let risk = RiskParameters {
            use_drawdown_throttle: true,
            max_drawdown_percent: 30.0,
            system_expectancy: 0.4,
            ..RiskParameters::default()
        };
        let b = sizer(risk, fx_lots()).breakdown(0.005, &ctx());
        assert!((b.drawdown_factor - 20.0 / 30.0).abs() < 1e-12);
        assert!((b.expectancy_factor - 1.2).abs() < 1e-12);

        let risk = RiskParameters {
            use_drawdown_throttle: true,
            max_drawdown_percent: 80.0,
            system_expectancy: 5.0,
            ..RiskParameters::default()
        };
        let b = sizer(risk, fx_lots()).breakdown(0.005, &ctx());
        assert_eq!(b.drawdown_factor, 0.5);
        assert_eq!(b.expectancy_factor, 1.5);
    }

    #[test]
    fn tiny_positions_clamp_up_to_minimum() {
        let s = sizer(RiskParameters::default(), fx_lots());
        // 100 / 10 = 10 units = 0.0001 lots.
        assert_eq!(s.size(10.0, &ctx()), 0.01);
    }

    #[test]
    fn refresh_needs_enough_trades() {
        let mut s = sizer(RiskParameters::default(), fx_lots());
        let snap = PerformanceSnapshot {
            trade_count: 5,
            win_rate: 0.2,
            expectancy: -1.0,
            avg_win: 10.0,
            avg_loss: 20.0,
            ..PerformanceSnapshot::default()
        };
        s.refresh(&snap, None);
        assert_eq!(s.params().win_rate, 0.5);
        assert_eq!(s.params().max_drawdown_percent, 0.0);

        let snap = PerformanceSnapshot {
            trade_count: 25,
            max_drawdown_pct: 12.0,
            ..snap
        };
        s.refresh(&snap, Some(35.0));
        assert_eq!(s.params().win_rate, 0.2);
        assert_eq!(s.params().win_loss_ratio, 0.5);
        assert_eq!(s.params().system_expectancy, -1.0);
        assert_eq!(s.params().max_drawdown_percent, 35.0);
    }

    #[test]
    fn drawdown_estimate_applies_before_enough_trades() {
        let mut s = sizer(RiskParameters::default(), fx_lots());
        let few = PerformanceSnapshot {
            trade_count: 5,
            ..PerformanceSnapshot::default()
        };
        s.refresh(&few, Some(35.0));
        assert_eq!(s.params().max_drawdown_percent, 35.0);
        assert_eq!(s.params().win_rate, 0.5);

        // A later close without an estimate keeps the floor.
        s.refresh(&few, None);
        assert_eq!(s.params().max_drawdown_percent, 35.0);
    }

    #[test]
    fn realized_drawdown_never_undercuts_estimate() {
        let mut s = sizer(RiskParameters::default(), fx_lots());
        let snap = PerformanceSnapshot {
            trade_count: 30,
            max_drawdown_pct: 12.0,
            ..PerformanceSnapshot::default()
        };
        s.refresh(&snap, Some(35.0));
        s.refresh(&snap, None);
        assert_eq!(s.params().max_drawdown_percent, 35.0);

        let deeper = PerformanceSnapshot {
            max_drawdown_pct: 40.0,
            ..snap
        };
        s.refresh(&deeper, None);
        assert_eq!(s.params().max_drawdown_percent, 40.0);

        // A fresh, smaller estimate replaces the old floor.
        s.refresh(&snap, Some(20.0));
        assert_eq!(s.params().max_drawdown_percent, 20.0);
    }
}
