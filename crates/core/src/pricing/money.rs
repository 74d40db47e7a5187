//! Fixed-point money helpers.
//!
//! Amounts are `Decimal`s held at scale 2. Whenever a multiplication can
//! produce more than two decimal places (a percentage, a fractional
//! quantity) the result is rounded half away from zero immediately, so the
//! same inputs always produce the same cents on every platform.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::DomainError;

pub const MONEY_SCALE: u32 = 2;

/// Upper bound, in currency units, for a unit price, a fixed discount and
/// the line total of one article. Document sums built from bounded lines
/// stay far inside the `Decimal` range.
pub const MAX_LINE_AMOUNT: i64 = 1_000_000_000_000;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Zero at money scale (`0.00`).
pub fn zero() -> Decimal {
    Decimal::new(0, MONEY_SCALE)
}

/// Rounds half away from zero and pins the scale to two places, so equal
/// amounts also render identically (`60` becomes `60.00`).
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), DomainError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::validation(field, format!("must not be negative, got {value}")));
    }
    Ok(())
}

pub fn ensure_percent(field: &str, value: Decimal) -> Result<(), DomainError> {
    if value < Decimal::ZERO || value > ONE_HUNDRED {
        return Err(DomainError::validation(
            field,
            format!("must be between 0 and 100, got {value}"),
        ));
    }
    Ok(())
}

pub fn ensure_within_limit(field: &str, value: Decimal) -> Result<(), DomainError> {
    if value > Decimal::from(MAX_LINE_AMOUNT) {
        return Err(DomainError::validation(
            field,
            format!("must not exceed {MAX_LINE_AMOUNT}, got {value}"),
        ));
    }
    Ok(())
}

/// Rejects amounts finer than the currency minor unit.
pub fn ensure_minor_unit_precision(field: &str, value: Decimal) -> Result<(), DomainError> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(DomainError::validation(
            field,
            format!("must have at most {MONEY_SCALE} decimal places, got {value}"),
        ));
    }
    Ok(())
}

pub fn multiply_by_quantity(
    unit_price: Decimal,
    quantity: Decimal,
) -> Result<Decimal, DomainError> {
    ensure_non_negative("unit_price", unit_price)?;
    ensure_non_negative("quantity", quantity)?;
    let product = unit_price
        .checked_mul(quantity)
        .ok_or_else(|| DomainError::validation("quantity", "line amount is out of range"))?;
    Ok(round_money(product))
}

pub fn apply_percent(amount: Decimal, percent: Decimal) -> Result<Decimal, DomainError> {
    ensure_percent("percent", percent)?;
    let scaled = amount
        .checked_mul(percent)
        .ok_or_else(|| DomainError::validation("percent", "amount is out of range"))?;
    Ok(round_money(scaled / ONE_HUNDRED))
}

pub fn checked_add(field: &str, left: Decimal, right: Decimal) -> Result<Decimal, DomainError> {
    left.checked_add(right)
        .ok_or_else(|| DomainError::validation(field, "amount is out of range"))
}

pub fn sum<I>(amounts: I) -> Result<Decimal, DomainError>
where
    I: IntoIterator<Item = Decimal>,
{
    let total =
        amounts.into_iter().try_fold(zero(), |acc, amount| checked_add("sum", acc, amount))?;
    Ok(round_money(total))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{apply_percent, ensure_within_limit, multiply_by_quantity, round_money, sum};
    use crate::errors::DomainError;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1_005, 3)).to_string(), "1.01");
        assert_eq!(round_money(Decimal::new(1_015, 3)).to_string(), "1.02");
        assert_eq!(round_money(Decimal::new(-1_005, 3)).to_string(), "-1.01");
        assert_eq!(round_money(Decimal::from(60)).to_string(), "60.00");
    }

    #[test]
    fn multiplies_fractional_quantities_to_cents() {
        let amount = multiply_by_quantity(Decimal::new(3_333, 2), Decimal::new(15, 1))
            .expect("valid amounts");
        assert_eq!(amount, Decimal::new(5_000, 2));
        assert_eq!(amount.to_string(), "50.00");
    }

    #[test]
    fn applies_percent_with_rounding() {
        assert_eq!(
            apply_percent(Decimal::new(5_400, 2), Decimal::from(21)),
            Ok(Decimal::new(1_134, 2))
        );
        assert_eq!(
            apply_percent(Decimal::new(1_00, 2), Decimal::new(125, 1)),
            Ok(Decimal::new(13, 2))
        );
    }

    #[test]
    fn rejects_negative_inputs_and_out_of_range_percent() {
        assert!(matches!(
            multiply_by_quantity(Decimal::from(10), Decimal::from(-1)),
            Err(DomainError::Validation { ref field, .. }) if field == "quantity"
        ));
        assert!(matches!(
            multiply_by_quantity(Decimal::from(-10), Decimal::ONE),
            Err(DomainError::Validation { ref field, .. }) if field == "unit_price"
        ));
        assert!(apply_percent(Decimal::from(10), Decimal::from(101)).is_err());
        assert!(apply_percent(Decimal::from(10), Decimal::from(-1)).is_err());
    }

    #[test]
    fn sums_at_money_scale() {
        let total = sum([Decimal::new(1_10, 2), Decimal::new(2_20, 2), Decimal::from(3)])
            .expect("small amounts");
        assert_eq!(total.to_string(), "6.30");
        assert_eq!(sum(Vec::new()).expect("empty").to_string(), "0.00");
    }

    #[test]
    fn overflowing_sums_fail_instead_of_panicking() {
        assert!(matches!(
            sum([Decimal::MAX, Decimal::ONE]),
            Err(DomainError::Validation { ref field, .. }) if field == "sum"
        ));
    }

    #[test]
    fn amounts_above_the_line_limit_are_rejected() {
        assert!(ensure_within_limit("unit_price", Decimal::from(super::MAX_LINE_AMOUNT)).is_ok());
        assert!(ensure_within_limit("unit_price", Decimal::MAX).is_err());
    }
}
