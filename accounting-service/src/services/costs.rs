//! Cost aggregation over work-order lines.
//!
//! Everything here is pure. Sums are kept at full precision; rounding to
//! cents happens once, at the presentation or storage boundary, through
//! [`round_money`].

use crate::models::{LaborLine, MaterialLine, WorkOrder};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::Add;

/// Decimal places used for presented and stored money amounts.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

/// Round an amount to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Labor, material and combined totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub labor_total: Decimal,
    pub material_total: Decimal,
    pub total: Decimal,
}

impl CostBreakdown {
    pub fn from_lines(labor: &[LaborLine], materials: &[MaterialLine]) -> Self {
        let labor_total: Decimal = labor.iter().map(LaborLine::amount).sum();
        let material_total: Decimal = materials.iter().map(MaterialLine::amount).sum();
        Self {
            labor_total,
            material_total,
            total: labor_total + material_total,
        }
    }

    pub fn for_work_order(order: &WorkOrder) -> Self {
        Self::from_lines(&order.labor, &order.materials)
    }

    pub fn for_work_orders<'a>(orders: impl IntoIterator<Item = &'a WorkOrder>) -> Self {
        orders.into_iter().map(Self::for_work_order).sum()
    }

    /// Copy rounded to cents, for display.
    pub fn rounded(&self) -> Self {
        Self {
            labor_total: round_money(self.labor_total),
            material_total: round_money(self.material_total),
            total: round_money(self.total),
        }
    }
}

impl Add for CostBreakdown {
    type Output = CostBreakdown;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            labor_total: self.labor_total + rhs.labor_total,
            material_total: self.material_total + rhs.material_total,
            total: self.total + rhs.total,
        }
    }
}

impl Sum for CostBreakdown {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CostBreakdown::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn labor(hours: Decimal, rate: Decimal) -> LaborLine {
        LaborLine::new(Uuid::new_v4(), hours, rate).unwrap()
    }

    fn material(quantity: Decimal, price: Decimal) -> MaterialLine {
        MaterialLine::new(Uuid::new_v4(), quantity, price).unwrap()
    }

    fn order(labor: Vec<LaborLine>, materials: Vec<MaterialLine>) -> WorkOrder {
        WorkOrder::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            None,
            labor,
            materials,
        )
    }

    #[test]
    fn empty_lines_cost_nothing() {
        let costs = CostBreakdown::for_work_order(&order(vec![], vec![]));
        assert_eq!(costs, CostBreakdown::default());
        assert!(costs.total.is_zero());
    }

    #[test]
    fn total_is_labor_plus_materials() {
        let costs = CostBreakdown::for_work_order(&order(
            vec![labor(dec!(4), dec!(22.50)), labor(dec!(1.5), dec!(18))],
            vec![material(dec!(3), dec!(12.40))],
        ));

        assert_eq!(costs.labor_total, dec!(117.00));
        assert_eq!(costs.material_total, dec!(37.20));
        assert_eq!(costs.total, costs.labor_total + costs.material_total);
    }

    #[test]
    fn line_order_does_not_matter() {
        let lines = vec![
            labor(dec!(0.5), dec!(19.99)),
            labor(dec!(7.25), dec!(21.10)),
            labor(dec!(2), dec!(0.333)),
        ];
        let mut reversed = lines.clone();
        reversed.reverse();

        assert_eq!(
            CostBreakdown::from_lines(&lines, &[]),
            CostBreakdown::from_lines(&reversed, &[])
        );
    }

    #[test]
    fn sums_before_rounding() {
        // Three lines of 0.005 each: rounding per line would give 0.03,
        // rounding the sum gives 0.02.
        let lines: Vec<MaterialLine> = (0..3).map(|_| material(dec!(1), dec!(0.005))).collect();
        let costs = CostBreakdown::from_lines(&[], &lines);

        assert_eq!(costs.material_total, dec!(0.015));
        assert_eq!(costs.rounded().material_total, dec!(0.02));

        let rounded_per_line: Decimal = lines.iter().map(|l| round_money(l.amount())).sum();
        assert_eq!(rounded_per_line, dec!(0.03));
    }

    #[test]
    fn collections_sum_per_order_figures() {
        let orders = vec![
            order(vec![labor(dec!(10), dec!(30))], vec![]),
            order(vec![], vec![material(dec!(2), dec!(75))]),
            order(vec![], vec![]),
        ];

        let costs = CostBreakdown::for_work_orders(&orders);
        assert_eq!(costs.labor_total, dec!(300));
        assert_eq!(costs.material_total, dec!(150));
        assert_eq!(costs.total, dec!(450));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
    }
}
