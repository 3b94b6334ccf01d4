//! Products offered on quotes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::validate;
use crate::error::{Error, Result};

/// Product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    /// Instruments and machines.
    Equipment,
    /// Licences.
    Software,
    /// One-off service work.
    Service,
    /// Maintenance contracts.
    Maintenance,
    /// Consumables.
    Consumable,
    /// Anything else.
    #[default]
    Other,
}

impl ProductCategory {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Software => "software",
            Self::Service => "service",
            Self::Maintenance => "maintenance",
            Self::Consumable => "consumable",
            Self::Other => "other",
        }
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Equipment => "장비",
            Self::Software => "소프트웨어",
            Self::Service => "서비스",
            Self::Maintenance => "유지보수",
            Self::Consumable => "소모품",
            Self::Other => "기타",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equipment" => Ok(Self::Equipment),
            "software" => Ok(Self::Software),
            "service" => Ok(Self::Service),
            "maintenance" => Ok(Self::Maintenance),
            "consumable" => Ok(Self::Consumable),
            "other" => Ok(Self::Other),
            other => Err(Error::invalid_value("product category", other)),
        }
    }
}

/// A promotional price valid between two days, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Price while the promotion runs.
    pub price: i64,
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

impl Promotion {
    /// Whether the promotion applies on `day`.
    #[must_use]
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Check the price and the date range.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an out-of-range price or a range that
    /// ends before it starts.
    pub fn validate(&self) -> Result<()> {
        validate::amount("promotion price", Some(self.price))?;
        if self.end < self.start {
            return Err(Error::validation(format!(
                "promotion ends ({}) before it starts ({})",
                self.end, self.start
            )));
        }
        Ok(())
    }
}

/// A product in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Identifier.
    pub id: i64,
    /// Unique catalogue code.
    pub product_code: String,
    /// Name.
    pub name: String,
    /// Product line.
    pub category: ProductCategory,
    /// List price before VAT.
    pub standard_price: i64,
    /// Purchase cost.
    pub cost_price: Option<i64>,
    /// Running or planned promotion.
    pub promotion: Option<Promotion>,
    /// Whether the product can be quoted.
    pub is_active: bool,
    /// Description.
    pub description: Option<String>,
    /// Free-form specification sheet (a JSON object).
    pub specifications: serde_json::Value,
    /// Quote lines naming this product.
    pub total_quoted: i64,
    /// Converted quotes that sold this product.
    pub total_sold: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price that applies on `today`: the promotion price while a promotion
    /// with a non-zero price covers the day, else the list price.
    #[must_use]
    pub fn current_price(&self, today: NaiveDate) -> i64 {
        match self.promotion {
            Some(promo) if promo.price > 0 && promo.covers(today) => promo.price,
            _ => self.standard_price,
        }
    }

    /// Margin over cost at the list price, when the cost is known.
    #[must_use]
    pub fn margin(&self) -> Option<i64> {
        self.cost_price
            .map(|cost| self.standard_price.saturating_sub(cost))
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.product_code)
    }
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Unique catalogue code.
    pub product_code: String,
    /// Name.
    pub name: String,
    /// Product line.
    pub category: ProductCategory,
    /// List price before VAT.
    pub standard_price: i64,
    /// Purchase cost.
    pub cost_price: Option<i64>,
    /// Promotion.
    pub promotion: Option<Promotion>,
    /// Description.
    pub description: Option<String>,
    /// Specification sheet. `Null` is stored as an empty object.
    pub specifications: serde_json::Value,
}

impl NewProduct {
    /// A product with only the required fields.
    #[must_use]
    pub fn new(
        product_code: impl Into<String>,
        name: impl Into<String>,
        category: ProductCategory,
        standard_price: i64,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            name: name.into(),
            category,
            standard_price,
            cost_price: None,
            promotion: None,
            description: None,
            specifications: serde_json::Value::Null,
        }
    }

    /// Check the product before it is written.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank code or name, out-of-range
    /// prices, a bad promotion or a specification sheet that is not an
    /// object.
    pub fn validate(&self) -> Result<()> {
        if self.product_code.trim().is_empty() {
            return Err(Error::validation("product code cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("product name cannot be empty"));
        }
        validate::amount("standard price", Some(self.standard_price))?;
        validate::amount("cost price", self.cost_price)?;
        if let Some(promo) = &self.promotion {
            promo.validate()?;
        }
        if !(self.specifications.is_object() || self.specifications.is_null()) {
            return Err(Error::validation("specifications must be a JSON object"));
        }
        Ok(())
    }
}
