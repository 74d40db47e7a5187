use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_NUMBER_PREFIX: &str = "OFR";

/// Human-readable offer number, e.g. `OFR-202603-0003`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferNumber(pub String);

impl fmt::Display for OfferNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Calendar month an offer number sequence is scoped to (per tenant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NumberingPeriod {
    pub year: i32,
    pub month: u32,
}

impl NumberingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation("month", format!("must be 1..=12, got {month}")));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(
                "year",
                format!("must have four digits, got {year}"),
            ));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    /// Storage key of the sequence row, `YYYYMM`.
    pub fn key(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl OfferNumber {
    pub fn format(prefix: &str, period: NumberingPeriod, sequence: u32) -> Self {
        Self(format!("{prefix}-{}-{sequence:04}", period.key()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Result<ParsedOfferNumber, DomainError> {
        self.0.parse()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedOfferNumber {
    pub prefix: String,
    pub period: NumberingPeriod,
    pub sequence: u32,
}

impl FromStr for ParsedOfferNumber {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            DomainError::validation("offer_number", format!("`{value}` is not PREFIX-YYYYMM-NNNN"))
        };

        let mut parts = value.rsplitn(3, '-');
        let sequence_part = parts.next().ok_or_else(invalid)?;
        let period_part = parts.next().ok_or_else(invalid)?;
        let prefix = parts.next().filter(|prefix| !prefix.is_empty()).ok_or_else(invalid)?;

        let digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
        if period_part.len() != 6 || sequence_part.len() < 4 || !digits(period_part) {
            return Err(invalid());
        }
        let year = period_part[..4].parse::<i32>().map_err(|_| invalid())?;
        let month = period_part[4..].parse::<u32>().map_err(|_| invalid())?;
        let sequence = sequence_part.parse::<u32>().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }

        let period = NumberingPeriod::new(year, month)?;
        Ok(Self { prefix: prefix.to_string(), period, sequence })
    }
}
