use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::calculator::LineBreakdown;
use crate::pricing::money::{self, round_money};

/// Summed amounts of a section or a whole offer.
///
/// Inputs come from [`crate::pricing::calculate_line`], which caps every
/// line at [`crate::pricing::money::MAX_LINE_AMOUNT`]; plain addition cannot
/// leave the `Decimal` range for any document held in memory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
}

impl Default for DocumentTotals {
    fn default() -> Self {
        Self {
            subtotal: money::zero(),
            discount_total: money::zero(),
            vat_total: money::zero(),
            total: money::zero(),
        }
    }
}

impl DocumentTotals {
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a LineBreakdown>,
    {
        lines.into_iter().fold(Self::default(), |mut totals, line| {
            totals.add_line(line);
            totals
        })
    }

    pub fn add_line(&mut self, line: &LineBreakdown) {
        self.subtotal = round_money(self.subtotal + line.line_total);
        self.discount_total = round_money(self.discount_total + line.discount_amount);
        self.vat_total = round_money(self.vat_total + line.vat_amount);
        self.total = round_money(self.total + line.total);
    }

    pub fn merge(&mut self, other: &DocumentTotals) {
        self.subtotal = round_money(self.subtotal + other.subtotal);
        self.discount_total = round_money(self.discount_total + other.discount_total);
        self.vat_total = round_money(self.vat_total + other.vat_total);
        self.total = round_money(self.total + other.total);
    }

    /// `subtotal - discount_total + vat_total == total` holds for any sum of
    /// article breakdowns; a mismatch means the numbers were not produced by
    /// the calculator.
    pub fn is_balanced(&self) -> bool {
        self.subtotal - self.discount_total + self.vat_total == self.total
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::DocumentTotals;
    use crate::pricing::calculator::{calculate_line, ArticlePricing};

    fn line(quantity: i64, cents: i64, vat: i64, discount: i64) -> super::LineBreakdown {
        let pricing =
            ArticlePricing::new(Decimal::from(quantity), Decimal::new(cents, 2), Decimal::from(vat))
                .with_discount_percent(Decimal::from(discount));
        calculate_line(&pricing).expect("valid article")
    }

    #[test]
    fn sums_every_component() {
        let lines = [line(3, 2_000, 21, 10), line(1, 999, 9, 0), line(2, 1_505, 21, 5)];
        let totals = DocumentTotals::from_lines(lines.iter());

        let article_sum: Decimal = lines.iter().map(|line| line.total).sum();
        assert_eq!(totals.total, article_sum);
        assert_eq!(totals.subtotal, Decimal::new(6_000 + 999 + 3_010, 2));
        assert!(totals.is_balanced());
    }

    #[test]
    fn empty_document_is_zero_at_money_scale() {
        let totals = DocumentTotals::from_lines(std::iter::empty());
        assert_eq!(totals.total.to_string(), "0.00");
        assert!(totals.is_balanced());
    }

    #[test]
    fn merging_sections_equals_summing_all_lines() {
        let first = [line(3, 2_000, 21, 10)];
        let second = [line(5, 333, 19, 33), line(1, 100, 0, 0)];

        let mut merged = DocumentTotals::from_lines(first.iter());
        merged.merge(&DocumentTotals::from_lines(second.iter()));

        let flat = DocumentTotals::from_lines(first.iter().chain(second.iter()));
        assert_eq!(merged, flat);
    }
}
