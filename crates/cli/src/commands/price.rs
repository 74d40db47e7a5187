use std::fs;
use std::path::Path;

use offercraft_core::domain::offer::validate_currency;
use offercraft_core::errors::DomainError;
use offercraft_core::pricing::{calculate_line, ArticlePricing, DocumentTotals, LineBreakdown};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commands::{load_config, CommandResult};

/// A price sheet read from TOML (`.toml`) or JSON (anything else). Without a
/// `currency` the configured `offers.default_currency` applies.
#[derive(Debug, Deserialize)]
struct PriceSheet {
    currency: Option<String>,
    #[serde(default)]
    sections: Vec<SheetSection>,
}

#[derive(Debug, Deserialize)]
struct SheetSection {
    title: String,
    #[serde(default)]
    articles: Vec<SheetArticle>,
}

#[derive(Debug, Deserialize)]
struct SheetArticle {
    name: String,
    quantity: Decimal,
    unit_price: Decimal,
    vat_rate: Decimal,
    #[serde(default)]
    discount_percent: Decimal,
    #[serde(default)]
    discount_fixed: Decimal,
}

#[derive(Debug, Serialize)]
struct PricedLine {
    name: String,
    #[serde(flatten)]
    breakdown: LineBreakdown,
}

#[derive(Debug, Serialize)]
struct PricedSection {
    title: String,
    lines: Vec<PricedLine>,
    totals: DocumentTotals,
}

#[derive(Debug, Serialize)]
struct PriceReport {
    command: &'static str,
    status: &'static str,
    currency: String,
    sections: Vec<PricedSection>,
    totals: DocumentTotals,
}

pub fn run(path: &Path) -> CommandResult {
    let config = match load_config("price") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "price",
                "input",
                format!("could not read `{}`: {error}", path.display()),
                2,
            );
        }
    };

    let sheet = match parse_sheet(path, &raw) {
        Ok(sheet) => sheet,
        Err(message) => return CommandResult::failure("price", "input", message, 2),
    };

    let report = match price_sheet(sheet, &config.offers.default_currency) {
        Ok(report) => report,
        Err(error) => return CommandResult::failure("price", "validation", error.to_string(), 7),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("price", "serialization", error.to_string(), 1),
    }
}

fn parse_sheet(path: &Path, raw: &str) -> Result<PriceSheet, String> {
    let is_toml = path.extension().is_some_and(|extension| extension == "toml");
    if is_toml {
        toml::from_str(raw).map_err(|error| format!("invalid price sheet: {error}"))
    } else {
        serde_json::from_str(raw).map_err(|error| format!("invalid price sheet: {error}"))
    }
}

fn price_sheet(sheet: PriceSheet, default_currency: &str) -> Result<PriceReport, DomainError> {
    let currency = sheet
        .currency
        .map(|currency| currency.trim().to_string())
        .unwrap_or_else(|| default_currency.to_string());
    validate_currency(&currency)?;

    let mut totals = DocumentTotals::default();
    let mut sections = Vec::with_capacity(sheet.sections.len());
    for section in sheet.sections {
        let lines = section
            .articles
            .into_iter()
            .map(|article| {
                let pricing = ArticlePricing::new(
                    article.quantity,
                    article.unit_price,
                    article.vat_rate,
                )
                .with_discount_percent(article.discount_percent)
                .with_discount_fixed(article.discount_fixed);
                let breakdown = calculate_line(&pricing)?;
                Ok(PricedLine { name: article.name, breakdown })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let section_totals = DocumentTotals::from_lines(lines.iter().map(|line| &line.breakdown));
        totals.merge(&section_totals);
        sections.push(PricedSection { title: section.title, lines, totals: section_totals });
    }

    Ok(PriceReport { command: "price", status: "ok", currency, sections, totals })
}
