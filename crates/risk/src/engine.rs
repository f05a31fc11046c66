// In crates/risk/src/engine.rs

use crate::rounding::{round_price, round_quantity};
use crate::types::{ComputedOrder, FieldPrecision, RiskSettings, Verdict};
use crate::{Error, Result};
use core_types::{Side, TradeSignal};
use rust_decimal::Decimal;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Computes TP/SL, position size and the liquidation safety verdict for a
/// signal.
///
/// This is a pure function: it reads nothing beyond its arguments. The caller
/// is responsible for resolving `entry` (from the signal or an alternate
/// price source) and `balance` before invoking it.
///
/// # Arguments
///
/// * `signal`: The delivered signal; only its side and ATR are used.
/// * `settings`: The risk settings as of this call.
/// * `entry`: The entry price, before rounding.
/// * `balance`: The account balance in quote currency.
/// * `precision`: Decimal places of the destination fields.
///
/// # Returns
///
/// * `Ok(ComputedOrder)` with `verdict == Rejected` when the stop is too close
///   to liquidation and unsafe orders are not allowed. The numbers are still
///   filled in for display.
/// * `Err(..)` when no sensible order can be computed at all.
pub fn compute_order_parameters(
    signal: &TradeSignal,
    settings: &RiskSettings,
    entry: Decimal,
    balance: Decimal,
    precision: &FieldPrecision,
) -> Result<ComputedOrder> {
    settings.validate()?;
    if entry <= Decimal::ZERO {
        return Err(Error::InvalidEntry(entry));
    }

    let side = signal.side();
    let atr = signal.atr();
    let mut notes = Vec::new();

    // --- 1. Entry, TP and SL ---
    let offset = checked(entry.checked_mul(settings.entry_offset_ratio), "entry offset")?;
    let entry = checked(entry.checked_add(side.direction() * offset), "entry")?;
    let entry = round_price(entry, precision.price);

    let tp_distance = checked(settings.atr_take_profit_multiple.checked_mul(atr), "take-profit distance")?;
    let sl_distance = checked(settings.atr_stop_loss_multiple.checked_mul(atr), "stop-loss distance")?;
    let (tp, sl) = match side {
        Side::Long => (entry.checked_add(tp_distance), entry.checked_sub(sl_distance)),
        Side::Short => (entry.checked_sub(tp_distance), entry.checked_add(sl_distance)),
    };
    let (tp, sl) = (checked(tp, "take-profit")?, checked(sl, "stop-loss")?);
    let tp = round_price(tp, precision.take_profit);
    let sl = round_price(sl, precision.stop_loss);

    // --- 2. Crossed-value guard ---
    let crossed = match side {
        Side::Long => tp <= entry || sl >= entry,
        Side::Short => tp >= entry || sl <= entry,
    };
    let (take_profit, stop_loss) = if crossed {
        if settings.reject_crossed_targets {
            return Err(Error::CrossedTargets {
                side,
                entry,
                take_profit: tp,
                stop_loss: sl,
            });
        }
        tracing::warn!(%side, %entry, %tp, %sl, "TP/SL crossed for side. Swapping TP/SL fields.");
        notes.push("tp/sl fields swapped".to_string());
        (sl, tp)
    } else {
        (tp, sl)
    };

    // --- 3. Position sizing by risk ---
    let distance_to_stop = checked(entry.checked_sub(sl), "stop distance")?.abs();
    if distance_to_stop <= Decimal::ZERO {
        return Err(Error::NonPositiveStopDistance {
            entry,
            stop_loss: sl,
        });
    }
    let risk_amount = checked(balance.checked_mul(settings.risk_percent_of_balance), "risk amount")? / HUNDRED;
    let quantity_by_risk = checked(risk_amount.checked_div(distance_to_stop), "quantity by risk")?;

    // --- 4. Leverage and notional caps ---
    let max_quantity_by_leverage = max_quantity(entry, balance, settings)?;
    let capped = match max_quantity_by_leverage {
        Some(cap) => quantity_by_risk.min(cap),
        None => quantity_by_risk,
    };
    if capped < quantity_by_risk {
        notes.push("cap L/notional".to_string());
    }
    let quantity = round_quantity(capped, precision.quantity);

    // --- 5. Liquidation safety ---
    let liquidation_estimate = liquidation_price(
        entry,
        side,
        settings.leverage,
        settings.maintenance_margin_rate,
    )?;
    let safety_buffer = checked(
        settings.liquidation_buffer_atr_multiple.checked_mul(atr),
        "safety buffer",
    )?;
    let distance_to_liquidation = match liquidation_estimate {
        Some(liq) => Some(checked(entry.checked_sub(liq), "liquidation distance")?.abs()),
        None => None,
    };
    let too_close_to_liquidation = match distance_to_liquidation {
        Some(distance) => {
            let safe_window = checked(distance.checked_sub(safety_buffer), "safe window")?;
            !(safe_window > Decimal::ZERO && distance_to_stop <= safe_window)
        }
        None => false,
    };

    let verdict = if !too_close_to_liquidation {
        Verdict::Safe
    } else if settings.allow_unsafe {
        notes.push("unsafe".to_string());
        Verdict::Unsafe
    } else {
        Verdict::Rejected
    };

    if too_close_to_liquidation {
        tracing::warn!(
            leverage = %settings.leverage,
            %distance_to_stop,
            ?distance_to_liquidation,
            %safety_buffer,
            ?liquidation_estimate,
            allowed = settings.allow_unsafe,
            "Stop-loss sits too close to the liquidation estimate."
        );
    }

    let reward = checked(tp.checked_sub(entry), "reward distance")?.abs();
    let risk_reward_ratio = checked(reward.checked_div(distance_to_stop), "risk/reward")?;

    Ok(ComputedOrder {
        side,
        entry,
        take_profit,
        stop_loss,
        quantity,
        quantity_by_risk,
        max_quantity_by_leverage,
        risk_reward_ratio,
        liquidation_estimate,
        distance_to_liquidation,
        distance_to_stop,
        safety_buffer,
        too_close_to_liquidation,
        fields_swapped: crossed,
        verdict,
        notes,
    })
}

/// Estimated liquidation price for an isolated position.
///
/// * Long: `entry * (1 - 1/L + mmr)`
/// * Short: `entry * (1 + 1/L - mmr)`
///
/// Returns `Ok(None)` for leverage of 1x or less, where no estimate
/// applies, and `Err(Error::Overflow)` when the estimate does not fit.
pub fn liquidation_price(
    entry: Decimal,
    side: Side,
    leverage: Decimal,
    maintenance_margin_rate: Decimal,
) -> Result<Option<Decimal>> {
    if leverage <= Decimal::ONE {
        return Ok(None);
    }
    let inverse = Decimal::ONE / leverage;
    let factor = match side {
        Side::Long => (Decimal::ONE - inverse).checked_add(maintenance_margin_rate),
        Side::Short => (Decimal::ONE + inverse).checked_sub(maintenance_margin_rate),
    };
    let factor = checked(factor, "liquidation factor")?;
    Ok(Some(checked(entry.checked_mul(factor), "liquidation price")?))
}

// The tighter of the leverage cap and the manual notional cap.
fn max_quantity(entry: Decimal, balance: Decimal, settings: &RiskSettings) -> Result<Option<Decimal>> {
    if entry <= Decimal::ZERO {
        return Ok(None);
    }
    let notional = checked(balance.checked_mul(settings.leverage), "leveraged notional")?;
    let by_leverage = checked(notional.checked_div(entry), "leverage cap")?;
    if settings.max_notional > Decimal::ZERO {
        let by_notional = checked(settings.max_notional.checked_div(entry), "notional cap")?;
        Ok(Some(by_leverage.min(by_notional)))
    } else {
        Ok(Some(by_leverage))
    }
}

// Decimal arithmetic panics on overflow; every step goes through here instead.
fn checked(value: Option<Decimal>, step: &'static str) -> Result<Decimal> {
    value.ok_or(Error::Overflow(step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(side: Side, atr: Decimal) -> TradeSignal {
        TradeSignal::new(side, None, atr, 0, "2").unwrap()
    }

    fn worked_settings() -> RiskSettings {
        RiskSettings {
            leverage: dec!(5),
            maintenance_margin_rate: dec!(0.005),
            liquidation_buffer_atr_multiple: dec!(0.5),
            risk_percent_of_balance: dec!(2),
            ..RiskSettings::default()
        }
    }

    #[test]
    fn test_worked_example_long() {
        let order = compute_order_parameters(
            &signal(Side::Long, dec!(2)),
            &worked_settings(),
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();

        assert_eq!(order.entry, dec!(100));
        assert_eq!(order.take_profit, dec!(104));
        assert_eq!(order.stop_loss, dec!(97));
        assert_eq!(order.quantity_by_risk.round_dp(3), dec!(6.667));
        assert_eq!(order.quantity, dec!(6.666));
        assert_eq!(order.max_quantity_by_leverage, Some(dec!(50)));
        assert_eq!(order.liquidation_estimate, Some(dec!(80.5)));
        assert_eq!(order.distance_to_liquidation, Some(dec!(19.5)));
        assert_eq!(order.safety_buffer, dec!(1));
        assert_eq!(order.distance_to_stop, dec!(3));
        assert!(!order.too_close_to_liquidation);
        assert_eq!(order.verdict, Verdict::Safe);
        assert!(!order.fields_swapped);
        assert!(order.notes.is_empty());
        assert_eq!(order.risk_reward_ratio.round_dp(4), dec!(1.3333));
    }

    #[test]
    fn test_short_targets_are_mirrored() {
        let order = compute_order_parameters(
            &signal(Side::Short, dec!(2)),
            &worked_settings(),
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();

        assert_eq!(order.take_profit, dec!(96));
        assert_eq!(order.stop_loss, dec!(103));
        assert!(order.stop_loss > order.entry && order.entry > order.take_profit);
        assert_eq!(order.liquidation_estimate, Some(dec!(119.5)));
        assert_eq!(order.verdict, Verdict::Safe);
    }

    #[test]
    fn test_targets_bracket_entry_for_both_sides() {
        let settings = RiskSettings::default();
        for atr in [dec!(0.01), dec!(0.5), dec!(3.25), dec!(40)] {
            for entry in [dec!(1.5), dec!(100), dec!(25000)] {
                let long = compute_order_parameters(
                    &signal(Side::Long, atr),
                    &settings,
                    entry,
                    dec!(5000),
                    &FieldPrecision::default(),
                )
                .unwrap();
                assert!(!long.fields_swapped);
                assert!(long.take_profit > long.entry);
                assert!(long.entry > long.stop_loss);
                let short = compute_order_parameters(
                    &signal(Side::Short, atr),
                    &settings,
                    entry,
                    dec!(5000),
                    &FieldPrecision::default(),
                )
                .unwrap();
                assert!(short.stop_loss > short.entry);
                assert!(short.entry > short.take_profit);
            }
        }
    }

    #[test]
    fn test_quantity_never_exceeds_leverage_or_notional_cap() {
        let settings = RiskSettings {
            leverage: dec!(3),
            max_notional: dec!(2000),
            risk_percent_of_balance: dec!(50),
            ..RiskSettings::default()
        };
        let balance = dec!(1000);
        let entry = dec!(10);
        let order = compute_order_parameters(
            &signal(Side::Long, dec!(0.01)),
            &settings,
            entry,
            balance,
            &FieldPrecision::default(),
        )
        .unwrap();

        assert!(order.quantity <= balance * settings.leverage / entry);
        assert!(order.quantity <= settings.max_notional / entry);
        assert_eq!(order.quantity, dec!(200));
        assert!(order.notes.contains(&"cap L/notional".to_string()));
    }

    #[test]
    fn test_too_close_is_rejected_unless_allowed() {
        // 20x puts liquidation 4.5 below entry; a 6.0 stop cannot fit.
        let mut settings = RiskSettings {
            leverage: dec!(20),
            ..worked_settings()
        };
        let rejected = compute_order_parameters(
            &signal(Side::Long, dec!(4)),
            &settings,
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();
        assert!(rejected.too_close_to_liquidation);
        assert_eq!(rejected.verdict, Verdict::Rejected);
        assert!(!rejected.is_executable());
        assert_eq!(rejected.take_profit, dec!(108));

        settings.allow_unsafe = true;
        let unsafe_order = compute_order_parameters(
            &signal(Side::Long, dec!(4)),
            &settings,
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();
        assert_eq!(unsafe_order.verdict, Verdict::Unsafe);
        assert!(unsafe_order.is_executable());
        assert!(unsafe_order.notes.contains(&"unsafe".to_string()));
    }

    #[test]
    fn test_crossed_targets_swap_fields() {
        // TP rounds to 0 decimals and collapses below the entry.
        let precision = FieldPrecision {
            price: Some(1),
            take_profit: Some(0),
            stop_loss: Some(3),
            quantity: Some(3),
        };
        let order = compute_order_parameters(
            &signal(Side::Long, dec!(0.1)),
            &RiskSettings::default(),
            dec!(100.2),
            dec!(1000),
            &precision,
        )
        .unwrap();

        assert!(order.fields_swapped);
        assert_eq!(order.take_profit, dec!(100.05));
        assert_eq!(order.stop_loss, dec!(100));
        assert_eq!(order.distance_to_stop, dec!(0.15));
        assert!(order.notes.contains(&"tp/sl fields swapped".to_string()));
    }

    #[test]
    fn test_crossed_targets_can_be_rejected() {
        let precision = FieldPrecision {
            price: Some(1),
            take_profit: Some(0),
            stop_loss: Some(3),
            quantity: Some(3),
        };
        let settings = RiskSettings {
            reject_crossed_targets: true,
            ..RiskSettings::default()
        };
        let result = compute_order_parameters(
            &signal(Side::Long, dec!(0.1)),
            &settings,
            dec!(100.2),
            dec!(1000),
            &precision,
        );
        assert!(matches!(result, Err(Error::CrossedTargets { .. })));
    }

    #[test]
    fn test_zero_stop_distance_fails() {
        let precision = FieldPrecision {
            price: Some(0),
            take_profit: Some(0),
            stop_loss: Some(0),
            quantity: Some(0),
        };
        let result = compute_order_parameters(
            &signal(Side::Long, dec!(0.1)),
            &RiskSettings::default(),
            dec!(100),
            dec!(1000),
            &precision,
        );
        assert!(matches!(result, Err(Error::NonPositiveStopDistance { .. })));
    }

    #[test]
    fn test_entry_offset_moves_against_the_trade() {
        let settings = RiskSettings {
            entry_offset_ratio: dec!(0.001),
            ..worked_settings()
        };
        let long = compute_order_parameters(
            &signal(Side::Long, dec!(2)),
            &settings,
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();
        assert_eq!(long.entry, dec!(100.1));

        let short = compute_order_parameters(
            &signal(Side::Short, dec!(2)),
            &settings,
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();
        assert_eq!(short.entry, dec!(99.9));
    }

    #[test]
    fn test_no_liquidation_estimate_without_leverage() {
        assert_eq!(liquidation_price(dec!(100), Side::Long, dec!(1), dec!(0.005)), Ok(None));

        let settings = RiskSettings {
            leverage: dec!(1),
            ..worked_settings()
        };
        let order = compute_order_parameters(
            &signal(Side::Long, dec!(2)),
            &settings,
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        )
        .unwrap();
        assert_eq!(order.liquidation_estimate, None);
        assert!(!order.too_close_to_liquidation);
        assert_eq!(order.max_quantity_by_leverage, Some(dec!(10)));
    }

    #[test]
    fn test_invalid_inputs_are_errors() {
        let result = compute_order_parameters(
            &signal(Side::Long, dec!(2)),
            &RiskSettings::default(),
            dec!(0),
            dec!(1000),
            &FieldPrecision::default(),
        );
        assert_eq!(result, Err(Error::InvalidEntry(dec!(0))));

        let settings = RiskSettings {
            risk_percent_of_balance: dec!(0),
            ..RiskSettings::default()
        };
        let result = compute_order_parameters(
            &signal(Side::Long, dec!(2)),
            &settings,
            dec!(100),
            dec!(1000),
            &FieldPrecision::default(),
        );
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn test_extreme_values_fail_instead_of_panicking() {
        let huge_atr = Decimal::from_scientific("3.5e28").unwrap();
        let huge_entry = Decimal::from_scientific("1e28").unwrap();
        let result = compute_order_parameters(
            &signal(Side::Long, huge_atr),
            &RiskSettings::default(),
            huge_entry,
            dec!(1000),
            &FieldPrecision::default(),
        );
        assert!(matches!(result, Err(Error::Overflow(_))), "{result:?}");

        let result = compute_order_parameters(
            &signal(Side::Short, dec!(2)),
            &RiskSettings::default(),
            dec!(100),
            Decimal::MAX,
            &FieldPrecision::default(),
        );
        assert_eq!(result, Err(Error::Overflow("risk amount")));

        assert_eq!(
            liquidation_price(Decimal::MAX, Side::Short, dec!(5), dec!(0.005)),
            Err(Error::Overflow("liquidation price"))
        );
    }
}
