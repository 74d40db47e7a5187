pub mod aggregate;
pub mod calculator;
pub mod money;

pub use aggregate::DocumentTotals;
pub use calculator::{calculate_line, ArticlePricing, LineBreakdown};
