use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::billing::add_months;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallmentPlan {
    pub amounts: Vec<Decimal>,
    pub due_dates: Vec<NaiveDate>,
}

/// Round to two decimal places, half away from zero, with the scale pinned to
/// exactly 2 so formatted values always carry their cents.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Split `total` into `count` monthly installments whose amounts sum to
/// `total` exactly. The rounding remainder (in either direction) is spread
/// one cent at a time from the first installment, wrapping.
pub fn plan(total: Decimal, count: u32, first_due: NaiveDate) -> Result<InstallmentPlan> {
    if count == 0 {
        return Err(EngineError::InvalidInput {
            field: "installment_count",
            message: "must be positive".to_string(),
        });
    }
    let total = round_money(total);
    let count_dec = Decimal::from(count);
    let base = round_money(total / count_dec);

    let mut amounts = vec![base; count as usize];
    let mut remainder = total - base * count_dec;
    let cent = Decimal::new(1, 2);
    let step = if remainder.is_sign_negative() { -cent } else { cent };
    let mut idx = 0usize;
    while !remainder.is_zero() {
        amounts[idx] += step;
        remainder -= step;
        idx += 1;
        if idx >= amounts.len() {
            idx = 0;
        }
    }

    let due_dates = (0..count).map(|i| add_months(first_due, i)).collect();
    Ok(InstallmentPlan { amounts, due_dates })
}

/// How the purchase total and per-installment value were derived from a
/// statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountBasis {
    /// Single-shot purchase: total and installment value are the same.
    SingleShot,
    /// An explicit purchase total was supplied; the installment value is
    /// total / count.
    ExplicitTotal,
    /// The statement line carries the per-installment value; the total is
    /// value x count.
    PerInstallment,
}

/// Derive (total, per-installment) from an imported line. Statements list the
/// installment amount billed that month, not the purchase total, so absent an
/// explicit total the line value is taken as the per-installment amount.
pub fn installment_values(
    amount: Decimal,
    count: u32,
    explicit_total: Option<Decimal>,
) -> (Decimal, Decimal, AmountBasis) {
    let count = count.max(1);
    let per_installment = round_money(amount);

    if count == 1 {
        return (per_installment, per_installment, AmountBasis::SingleShot);
    }

    if let Some(total) = explicit_total {
        let total = round_money(total);
        let per_installment = round_money(total / Decimal::from(count));
        return (total, per_installment, AmountBasis::ExplicitTotal);
    }

    let total = round_money(per_installment * Decimal::from(count));
    (total, per_installment, AmountBasis::PerInstallment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_plan_distributes_positive_remainder() {
        let p = plan(dec("100.00"), 3, ymd(2024, 5, 10)).unwrap();
        assert_eq!(p.amounts, vec![dec("33.34"), dec("33.33"), dec("33.33")]);
    }

    #[test]
    fn test_plan_distributes_negative_remainder() {
        // 100.00 / 6 rounds up to 16.67, overshooting by two cents
        let p = plan(dec("100.00"), 6, ymd(2024, 5, 10)).unwrap();
        assert_eq!(
            p.amounts,
            vec![dec("16.66"), dec("16.66"), dec("16.67"), dec("16.67"), dec("16.67"), dec("16.67")]
        );
    }

    #[test]
    fn test_plan_sums_exactly_for_many_inputs() {
        let totals = ["100.00", "0.01", "635.71", "1234.56", "999.99", "10.00", "0.05"];
        for total in totals {
            for count in 1..=13u32 {
                let p = plan(dec(total), count, ymd(2024, 1, 31)).unwrap();
                assert_eq!(p.amounts.len(), count as usize);
                let sum: Decimal = p.amounts.iter().sum();
                assert_eq!(sum, dec(total), "drift for {total} / {count}");
            }
        }
    }

    #[test]
    fn test_plan_due_dates_clamp_per_month() {
        let p = plan(dec("90.00"), 4, ymd(2025, 1, 31)).unwrap();
        assert_eq!(
            p.due_dates,
            vec![ymd(2025, 1, 31), ymd(2025, 2, 28), ymd(2025, 3, 31), ymd(2025, 4, 30)]
        );
    }

    #[test]
    fn test_plan_rejects_zero_count() {
        assert!(matches!(
            plan(dec("10.00"), 0, ymd(2024, 1, 1)),
            Err(EngineError::InvalidInput { field: "installment_count", .. })
        ));
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec("10.005")), dec("10.01"));
        assert_eq!(round_money(dec("10.004")), dec("10.00"));
        assert_eq!(round_money(dec("100")).to_string(), "100.00");
    }

    #[test]
    fn test_installment_values_single_shot() {
        let (total, per, basis) = installment_values(dec("50.00"), 1, None);
        assert_eq!(total, dec("50.00"));
        assert_eq!(per, dec("50.00"));
        assert_eq!(basis, AmountBasis::SingleShot);
    }

    #[test]
    fn test_installment_values_per_installment() {
        let (total, per, basis) = installment_values(dec("635.71"), 4, None);
        assert_eq!(total, dec("2542.84"));
        assert_eq!(per, dec("635.71"));
        assert_eq!(basis, AmountBasis::PerInstallment);
    }

    #[test]
    fn test_installment_values_explicit_total() {
        let (total, per, basis) = installment_values(dec("400.00"), 3, Some(dec("1200.00")));
        assert_eq!(total, dec("1200.00"));
        assert_eq!(per, dec("400.00"));
        assert_eq!(basis, AmountBasis::ExplicitTotal);
    }

    #[test]
    fn test_installment_values_zero_count_treated_as_one() {
        let (total, per, basis) = installment_values(dec("25.00"), 0, None);
        assert_eq!(total, dec("25.00"));
        assert_eq!(per, dec("25.00"));
        assert_eq!(basis, AmountBasis::SingleShot);
    }
}
