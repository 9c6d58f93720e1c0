//! Pure transition logic for one order fill (spec.md §4.3). Grounded on the
//! teacher's `execution/executor.rs` commit-shape: the engine only computes
//! an outcome from its inputs, it never touches a repository or a clock of
//! its own; `FillObservation::observed_at` is handed in by the caller.

use rust_decimal::Decimal;

use crate::error::ExecutionError;
use crate::execution::types::{Fill, FillObservation, TransitionResult};
use crate::execution::ExecutionEvent;
use crate::planner::types::{CancelReason, Grid, GridStatus, Order, OrderSide, OrderState};

/// Computes the effect of observing `observation.observed_price` against a
/// single PENDING order. `cash_available`/`holding_available` are the
/// portfolio's current balances, read by the caller under the same
/// transaction that will later commit the result (spec.md §4.3 step 2).
///
/// Returns `Err` only for protocol violations (the order isn't PENDING, or
/// the grid isn't ACTIVE) — insufficient cash/holding is a normal business
/// outcome and surfaces as `TransitionResult::Cancelled`, not an error.
pub fn apply_transition(
    grid: &Grid,
    order: &Order,
    cash_available: Decimal,
    holding_available: Decimal,
    observation: &FillObservation,
) -> Result<TransitionResult, ExecutionError> {
    if order.state != OrderState::Pending {
        return Err(ExecutionError::NotPending(order.id));
    }
    if grid.status != GridStatus::Active {
        return Err(ExecutionError::GridNotActive(grid.id));
    }

    match order.side {
        OrderSide::Buy => apply_buy(grid, order, cash_available, observation),
        OrderSide::Sell => apply_sell(grid, order, holding_available, observation),
    }
}

fn apply_buy(
    grid: &Grid,
    order: &Order,
    cash_available: Decimal,
    observation: &FillObservation,
) -> Result<TransitionResult, ExecutionError> {
    let cost = order.quantity * order.level_price;
    if cash_available < cost {
        return Ok(TransitionResult::Cancelled {
            order_id: order.id,
            reason: CancelReason::InsufficientCash,
        });
    }

    let fill = Fill {
        order_id: order.id,
        grid_id: order.grid_id,
        side: OrderSide::Buy,
        level_index: order.level_index,
        quantity: order.quantity,
        price: order.level_price,
        trigger_price: observation.observed_price,
        filled_at: observation.observed_at,
        cash_delta: -cost,
        holding_delta: order.quantity,
        realised_profit: None,
    };

    // Cycle rule: a filled BUY recreates a SELL one level up, sized to the
    // quantity just bought (spec.md §4.3 step 3). At the top of the ladder
    // there is no level to recreate into; the bought inventory is parked.
    let (recreated_order, events) = match grid.next_level_price(order.level_index) {
        Some(next_price) => {
            let sell = Order::new_pending(
                grid.id,
                order.level_index + 1,
                next_price,
                OrderSide::Sell,
                order.quantity,
                Some(order.level_index),
            );
            (Some(sell), vec![ExecutionEvent::Filled(fill.clone())])
        }
        None => (
            None,
            vec![
                ExecutionEvent::Filled(fill.clone()),
                ExecutionEvent::Parked {
                    grid_id: grid.id,
                    level_index: order.level_index,
                    side: OrderSide::Buy,
                },
            ],
        ),
    };

    Ok(TransitionResult::Filled {
        fill,
        recreated_order,
        events,
    })
}

fn apply_sell(
    grid: &Grid,
    order: &Order,
    holding_available: Decimal,
    observation: &FillObservation,
) -> Result<TransitionResult, ExecutionError> {
    if holding_available < order.quantity {
        return Ok(TransitionResult::Cancelled {
            order_id: order.id,
            reason: CancelReason::InsufficientHolding,
        });
    }

    // Grid profit per completed cycle is the ladder spacing times quantity:
    // a SELL at level i is always paired with the BUY one level below, and
    // levels are evenly spaced, so this holds regardless of when the
    // matching BUY actually filled.
    let realised_profit = Some(order.quantity * grid.spacing());

    let fill = Fill {
        order_id: order.id,
        grid_id: order.grid_id,
        side: OrderSide::Sell,
        level_index: order.level_index,
        quantity: order.quantity,
        price: order.level_price,
        trigger_price: observation.observed_price,
        filled_at: observation.observed_at,
        cash_delta: order.quantity * order.level_price,
        holding_delta: -order.quantity,
        realised_profit,
    };

    // Cycle rule: a filled SELL recreates a BUY one level down, reinvesting
    // the same quantity at the lower price. At the bottom of the ladder
    // (level 0) there is nothing below to recreate into.
    let (recreated_order, events) = match order.level_index.checked_sub(1) {
        Some(lower_index) => {
            let lower_price = grid.level_price(lower_index);
            let buy = Order::new_pending(
                grid.id,
                lower_index,
                lower_price,
                OrderSide::Buy,
                order.quantity,
                Some(order.level_index),
            );
            (Some(buy), vec![ExecutionEvent::Filled(fill.clone())])
        }
        None => (
            None,
            vec![
                ExecutionEvent::Filled(fill.clone()),
                ExecutionEvent::Parked {
                    grid_id: grid.id,
                    level_index: order.level_index,
                    side: OrderSide::Sell,
                },
            ],
        ),
    };

    Ok(TransitionResult::Filled {
        fill,
        recreated_order,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn test_grid() -> Grid {
        Grid {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: "ACME".into(),
            name: "test".into(),
            lower_price: dec!(90),
            upper_price: dec!(110),
            level_count: 10,
            investment_amount: dec!(10000),
            status: GridStatus::Active,
            strategy_config: crate::planner::types::StrategyConfig::Static,
            created_at: Utc::now(),
            last_rebalanced_at: None,
            market: crate::market::Market::Us,
        }
    }

    fn observation(order_id: Uuid, price: Decimal) -> FillObservation {
        FillObservation {
            order_id,
            observed_price: price,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn buy_fill_recreates_sell_one_level_up() {
        let grid = test_grid();
        let order = Order::new_pending(grid.id, 3, dec!(96), OrderSide::Buy, dec!(10), None);
        let obs = observation(order.id, dec!(96));

        let result = apply_transition(&grid, &order, dec!(10000), dec!(0), &obs).unwrap();
        match result {
            TransitionResult::Filled {
                fill,
                recreated_order,
                ..
            } => {
                assert_eq!(fill.cash_delta, dec!(-960));
                assert_eq!(fill.holding_delta, dec!(10));
                assert_eq!(fill.price, dec!(96));
                assert_eq!(fill.trigger_price, dec!(96));
                let sell = recreated_order.unwrap();
                assert_eq!(sell.side, OrderSide::Sell);
                assert_eq!(sell.level_index, 4);
                assert_eq!(sell.level_price, dec!(98));
                assert_eq!(sell.quantity, dec!(10));
            }
            _ => panic!("expected fill"),
        }
    }

    #[test]
    fn buy_fill_uses_level_price_even_when_tick_gapped_past_it() {
        // The feed skipped straight past the level (gap-down), but the fill
        // still books at the deterministic ladder price, not the tick.
        let grid = test_grid();
        let order = Order::new_pending(grid.id, 3, dec!(96), OrderSide::Buy, dec!(10), None);
        let obs = observation(order.id, dec!(94));

        let result = apply_transition(&grid, &order, dec!(10000), dec!(0), &obs).unwrap();
        match result {
            TransitionResult::Filled { fill, .. } => {
                assert_eq!(fill.price, dec!(96));
                assert_eq!(fill.trigger_price, dec!(94));
                assert_eq!(fill.cash_delta, dec!(-960));
            }
            _ => panic!("expected fill"),
        }
    }

    #[test]
    fn buy_fill_at_top_of_ladder_is_parked() {
        let grid = test_grid();
        let order = Order::new_pending(grid.id, 9, dec!(108), OrderSide::Buy, dec!(5), None);
        let obs = observation(order.id, dec!(108));

        let result = apply_transition(&grid, &order, dec!(10000), dec!(0), &obs).unwrap();
        match result {
            TransitionResult::Filled {
                recreated_order,
                events,
                ..
            } => {
                assert!(recreated_order.is_none());
                assert!(events
                    .iter()
                    .any(|e| matches!(e, ExecutionEvent::Parked { .. })));
            }
            _ => panic!("expected fill"),
        }
    }

    #[test]
    fn buy_fill_without_cash_is_cancelled() {
        let grid = test_grid();
        let order = Order::new_pending(grid.id, 3, dec!(96), OrderSide::Buy, dec!(10), None);
        let obs = observation(order.id, dec!(96));

        let result = apply_transition(&grid, &order, dec!(1), dec!(0), &obs).unwrap();
        assert!(matches!(
            result,
            TransitionResult::Cancelled {
                reason: CancelReason::InsufficientCash,
                ..
            }
        ));
    }

    #[test]
    fn sell_fill_recreates_buy_one_level_down_and_realises_spacing_profit() {
        let grid = test_grid();
        let order = Order::new_pending(grid.id, 6, dec!(102), OrderSide::Sell, dec!(10), Some(5));
        let obs = observation(order.id, dec!(102));

        let result = apply_transition(&grid, &order, dec!(0), dec!(10), &obs).unwrap();
        match result {
            TransitionResult::Filled {
                fill,
                recreated_order,
                ..
            } => {
                assert_eq!(fill.realised_profit, Some(dec!(20))); // 10 * spacing(2)
                assert_eq!(fill.price, dec!(102));
                assert_eq!(fill.trigger_price, dec!(102));
                let buy = recreated_order.unwrap();
                assert_eq!(buy.side, OrderSide::Buy);
                assert_eq!(buy.level_index, 5);
                assert_eq!(buy.level_price, dec!(100));
            }
            _ => panic!("expected fill"),
        }
    }

    #[test]
    fn sell_fill_without_holding_is_cancelled() {
        let grid = test_grid();
        let order = Order::new_pending(grid.id, 6, dec!(102), OrderSide::Sell, dec!(10), Some(5));
        let obs = observation(order.id, dec!(102));

        let result = apply_transition(&grid, &order, dec!(0), dec!(1), &obs).unwrap();
        assert!(matches!(
            result,
            TransitionResult::Cancelled {
                reason: CancelReason::InsufficientHolding,
                ..
            }
        ));
    }

    #[test]
    fn non_pending_order_is_rejected() {
        let grid = test_grid();
        let mut order = Order::new_pending(grid.id, 3, dec!(96), OrderSide::Buy, dec!(10), None);
        order.state = OrderState::Filled;
        let obs = observation(order.id, dec!(96));

        let err = apply_transition(&grid, &order, dec!(10000), dec!(0), &obs).unwrap_err();
        assert!(matches!(err, ExecutionError::NotPending(_)));
    }

    #[test]
    fn inactive_grid_is_rejected() {
        let mut grid = test_grid();
        grid.status = GridStatus::Paused;
        let order = Order::new_pending(grid.id, 3, dec!(96), OrderSide::Buy, dec!(10), None);
        let obs = observation(order.id, dec!(96));

        let err = apply_transition(&grid, &order, dec!(10000), dec!(0), &obs).unwrap_err();
        assert!(matches!(err, ExecutionError::GridNotActive(_)));
    }
}
