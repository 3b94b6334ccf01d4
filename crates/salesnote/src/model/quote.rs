//! Quotes, their product lines and the quote arithmetic.
//!
//! A quote's subtotal is the sum of its line subtotals. The quote-level
//! discount comes off the subtotal, 10% VAT is added to what remains, and
//! the weighted revenue is the VAT-inclusive total times the probability.
//! Every rounded step rounds half up to whole won.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::opportunity::weighted;
use super::validate;
use crate::error::{Error, Result};

/// Probability of a quote when none is given.
pub const DEFAULT_QUOTE_PROBABILITY: u8 = 50;

/// A discount in hundredths of a percent (`1250` is 12.50%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountRate(u16);

impl DiscountRate {
    /// No discount.
    pub const ZERO: Self = Self(0);

    /// Largest rate: everything off.
    pub const FULL: Self = Self(10_000);

    /// Rate from hundredths of a percent.
    ///
    /// # Errors
    ///
    /// Returns a validation error above 100%.
    pub fn from_basis_points(basis_points: u16) -> Result<Self> {
        if basis_points > Self::FULL.0 {
            return Err(Error::validation(format!(
                "discount rate {}.{:02}% exceeds 100%",
                basis_points / 100,
                basis_points % 100
            )));
        }
        Ok(Self(basis_points))
    }

    /// Hundredths of a percent.
    #[must_use]
    pub fn basis_points(&self) -> u16 {
        self.0
    }

    /// Whether the rate takes anything off.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Discount on `amount`, rounded half up.
    #[must_use]
    pub fn discount_on(&self, amount: i64) -> i64 {
        validate::saturate(round_ratio(
            i128::from(amount) * i128::from(self.0),
            i128::from(Self::FULL.0),
        ))
    }
}

impl fmt::Display for DiscountRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}.{:02}%", self.0 / 100, self.0 % 100))
    }
}

impl FromStr for DiscountRate {
    type Err = Error;

    /// Parse a percentage with up to two decimals, e.g. `7`, `12.5`, `3.25%`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_value("discount rate", s);
        let digits = s.trim().trim_end_matches('%');
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() || fraction.len() > 2 {
            return Err(invalid());
        }
        let whole: u16 = whole.parse().map_err(|_| invalid())?;
        let fraction: u16 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u16>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };
        let basis_points = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(invalid)?;
        Self::from_basis_points(basis_points)
    }
}

/// Where a quote stands with the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStage {
    /// Being written.
    #[default]
    Draft,
    /// Sent to the customer.
    Sent,
    /// Under review by the customer.
    Review,
    /// Terms being negotiated.
    Negotiation,
    /// Accepted by the customer.
    Approved,
    /// Turned down.
    Rejected,
    /// Past its validity date.
    Expired,
    /// Turned into a delivery.
    Converted,
}

impl QuoteStage {
    /// Every stage in workflow order.
    pub const ALL: [Self; 8] = [
        Self::Draft,
        Self::Sent,
        Self::Review,
        Self::Negotiation,
        Self::Approved,
        Self::Rejected,
        Self::Expired,
        Self::Converted,
    ];

    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Review => "review",
            Self::Negotiation => "negotiation",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Converted => "converted",
        }
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "초안",
            Self::Sent => "발송완료",
            Self::Review => "검토중",
            Self::Negotiation => "협상중",
            Self::Approved => "승인",
            Self::Rejected => "거절",
            Self::Expired => "만료",
            Self::Converted => "계약전환",
        }
    }

    /// Whether the quote can still change: lines added, stage moved.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Rejected | Self::Expired | Self::Converted)
    }
}

impl fmt::Display for QuoteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for QuoteStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| Error::invalid_value("quote stage", s))
    }
}

/// Computed money fields of a quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTotals {
    /// Sum of line subtotals.
    pub subtotal: i64,
    /// Quote-level discount.
    pub discount_amount: i64,
    /// VAT on the discounted subtotal.
    pub tax_amount: i64,
    /// Discounted subtotal plus VAT.
    pub total_amount: i64,
    /// `total × probability / 100`, truncating.
    pub weighted_revenue: i64,
}

impl QuoteTotals {
    /// Totals for the given line subtotals.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the subtotal or the total exceeds the
    /// largest storable amount.
    pub fn compute(
        line_subtotals: impl IntoIterator<Item = i64>,
        discount_rate: DiscountRate,
        probability: u8,
    ) -> Result<Self> {
        let subtotal: i128 = line_subtotals.into_iter().map(i128::from).sum();
        let subtotal = validate::saturate(subtotal);
        validate::amount("quote subtotal", Some(subtotal))?;

        let discount_amount = discount_rate.discount_on(subtotal);
        let taxable = subtotal - discount_amount;
        let tax_amount = validate::saturate(round_ratio(i128::from(taxable), 10));
        let total_amount = taxable + tax_amount;
        validate::amount("quote total", Some(total_amount))?;

        Ok(Self {
            subtotal,
            discount_amount,
            tax_amount,
            total_amount,
            weighted_revenue: weighted(total_amount, probability),
        })
    }
}

/// A quote sent for a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Identifier.
    pub id: i64,
    /// Unique number, e.g. `Q-20240315-001`.
    pub quote_number: String,
    /// Schedule the quote was made for.
    pub schedule_id: i64,
    /// Customer quoted, taken from the schedule.
    pub customer_id: i64,
    /// Salesperson, taken from the schedule.
    pub owner: String,
    /// Day of issue.
    pub quote_date: NaiveDate,
    /// Last day the quote is valid.
    pub valid_until: NaiveDate,
    /// Workflow stage.
    pub stage: QuoteStage,
    /// Quote-level discount.
    pub discount_rate: DiscountRate,
    /// Computed money fields.
    #[serde(flatten)]
    pub totals: QuoteTotals,
    /// Win probability.
    pub probability: u8,
    /// Expected contract date.
    pub expected_close_date: Option<NaiveDate>,
    /// Whether a delivery was recorded for the quote.
    pub converted_to_delivery: bool,
    /// Delivery history the quote turned into.
    pub converted_history_id: Option<i64>,
    /// Notes.
    pub notes: Option<String>,
    /// What the customer said.
    pub customer_feedback: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Whether the quote is still open on a day after its validity.
    #[must_use]
    pub fn is_lapsed(&self, today: NaiveDate) -> bool {
        self.stage.is_open() && self.valid_until < today
    }

    /// Recompute the money fields from the line subtotals.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the result would not fit a money column.
    pub fn recompute(&mut self, line_subtotals: impl IntoIterator<Item = i64>) -> Result<()> {
        self.totals = QuoteTotals::compute(line_subtotals, self.discount_rate, self.probability)?;
        Ok(())
    }
}

/// Input for creating a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuote {
    /// Schedule the quote belongs to.
    pub schedule_id: i64,
    /// Number to use instead of a generated one.
    pub quote_number: Option<String>,
    /// Validity. Defaults to the configured number of days after issue.
    pub valid_until: Option<NaiveDate>,
    /// Quote-level discount.
    pub discount_rate: DiscountRate,
    /// Win probability, [`DEFAULT_QUOTE_PROBABILITY`] when unset.
    pub probability: Option<u8>,
    /// Expected contract date.
    pub expected_close_date: Option<NaiveDate>,
    /// Notes.
    pub notes: Option<String>,
}

impl NewQuote {
    /// A quote for `schedule_id` with defaults everywhere else.
    #[must_use]
    pub fn for_schedule(schedule_id: i64) -> Self {
        Self {
            schedule_id,
            quote_number: None,
            valid_until: None,
            discount_rate: DiscountRate::ZERO,
            probability: None,
            expected_close_date: None,
            notes: None,
        }
    }

    /// Check the quote before it is written.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank number or a probability above 100.
    pub fn validate(&self) -> Result<()> {
        if self
            .quote_number
            .as_deref()
            .is_some_and(|n| n.trim().is_empty())
        {
            return Err(Error::validation("quote number cannot be blank"));
        }
        validate::probability(self.probability)
    }
}

/// A product line on a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    /// Identifier.
    pub id: i64,
    /// Owning quote.
    pub quote_id: i64,
    /// Product quoted.
    pub product_id: i64,
    /// Quantity.
    pub quantity: u32,
    /// Price per unit before VAT.
    pub unit_price: i64,
    /// Line discount.
    pub discount_rate: DiscountRate,
    /// `unit_price × quantity` less the line discount, before VAT.
    pub subtotal: i64,
    /// Line description.
    pub description: Option<String>,
    /// Position on the quote.
    pub sort_order: i64,
}

/// Input for adding a line to a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuoteItem {
    /// Quote to extend.
    pub quote_id: i64,
    /// Product quoted.
    pub product_id: i64,
    /// Quantity.
    pub quantity: u32,
    /// Price per unit. The product's current price when unset.
    pub unit_price: Option<i64>,
    /// Line discount.
    pub discount_rate: DiscountRate,
    /// Line description.
    pub description: Option<String>,
}

impl NewQuoteItem {
    /// One unit of `product_id` at its current price.
    #[must_use]
    pub fn new(quote_id: i64, product_id: i64, quantity: u32) -> Self {
        Self {
            quote_id,
            product_id,
            quantity,
            unit_price: None,
            discount_rate: DiscountRate::ZERO,
            description: None,
        }
    }

    /// Check the line before it is priced.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero or oversized quantity and an
    /// out-of-range price.
    pub fn validate(&self) -> Result<()> {
        if self.quantity == 0 {
            return Err(Error::validation("quantity must be at least 1"));
        }
        validate::quantity(self.quantity)?;
        validate::amount("unit price", self.unit_price)
    }
}

/// `unit_price × quantity` less `discount_rate`, before VAT.
///
/// # Errors
///
/// Returns a validation error when the line exceeds the largest storable
/// amount.
pub fn line_subtotal(unit_price: i64, quantity: u32, discount_rate: DiscountRate) -> Result<i64> {
    let base = validate::saturate(i128::from(unit_price) * i128::from(quantity));
    let subtotal = base - discount_rate.discount_on(base);
    validate::amount("line subtotal", Some(subtotal))?;
    Ok(subtotal)
}

/// `value / divisor` rounded half up, for non-negative values.
fn round_ratio(value: i128, divisor: i128) -> i128 {
    (value + divisor / 2) / divisor
}
