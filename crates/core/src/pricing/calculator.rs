use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::pricing::money::{
    apply_percent, checked_add, ensure_minor_unit_precision, ensure_non_negative,
    ensure_percent, ensure_within_limit, multiply_by_quantity, round_money,
};

/// Priced inputs of a single article.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePricing {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub discount_percent: Decimal,
    pub discount_fixed: Decimal,
}

impl ArticlePricing {
    pub fn new(quantity: Decimal, unit_price: Decimal, vat_rate: Decimal) -> Self {
        Self {
            quantity,
            unit_price,
            vat_rate,
            discount_percent: Decimal::ZERO,
            discount_fixed: Decimal::ZERO,
        }
    }

    pub fn with_discount_percent(mut self, discount_percent: Decimal) -> Self {
        self.discount_percent = discount_percent;
        self
    }

    pub fn with_discount_fixed(mut self, discount_fixed: Decimal) -> Self {
        self.discount_fixed = discount_fixed;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        ensure_non_negative("quantity", self.quantity)?;
        ensure_non_negative("unit_price", self.unit_price)?;
        ensure_within_limit("unit_price", self.unit_price)?;
        ensure_minor_unit_precision("unit_price", self.unit_price)?;
        ensure_percent("vat_rate", self.vat_rate)?;
        ensure_percent("discount_percent", self.discount_percent)?;
        ensure_non_negative("discount_fixed", self.discount_fixed)?;
        ensure_within_limit("discount_fixed", self.discount_fixed)?;
        ensure_minor_unit_precision("discount_fixed", self.discount_fixed)?;
        Ok(())
    }
}

/// Result of pricing one article. All amounts are at money scale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBreakdown {
    pub line_total: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

/// Prices one article.
///
/// Order is fixed: line total, discount (percentage plus fixed, clamped to
/// the line total), taxable amount, VAT on the taxable amount, total. A line
/// total above [`crate::pricing::money::MAX_LINE_AMOUNT`] is rejected.
pub fn calculate_line(pricing: &ArticlePricing) -> Result<LineBreakdown, DomainError> {
    pricing.validate()?;

    let line_total = multiply_by_quantity(pricing.unit_price, pricing.quantity)?;
    ensure_within_limit("line_total", line_total)?;
    let percent_discount = apply_percent(line_total, pricing.discount_percent)?;
    let discount_amount =
        round_money(checked_add("discount_amount", percent_discount, pricing.discount_fixed)?)
            .min(line_total);
    let taxable_amount = round_money(line_total - discount_amount);
    let vat_amount = apply_percent(taxable_amount, pricing.vat_rate)?;
    let total = round_money(checked_add("total", taxable_amount, vat_amount)?);

    Ok(LineBreakdown { line_total, discount_amount, taxable_amount, vat_amount, total })
}
