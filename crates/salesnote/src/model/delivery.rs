//! Delivery line items and VAT arithmetic.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::validate;
use crate::error::{Error, Result};

/// Unit used when none is given.
pub const DEFAULT_UNIT: &str = "개";

/// "name  [x] qty [unit]" with at least one space before the quantity.
static ITEM_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.*?\S)\s+[xX×]?\s*(?P<qty>\d+)\s*(?P<unit>[^\d\s]*)$")
        .expect("invalid item entry pattern")
});

/// A product line attached to a schedule or a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryItem {
    /// Identifier.
    pub id: i64,
    /// Owning schedule.
    pub schedule_id: Option<i64>,
    /// Owning history entry.
    pub history_id: Option<i64>,
    /// Product name.
    pub item_name: String,
    /// Quantity.
    pub quantity: u32,
    /// Unit of measure.
    pub unit: String,
    /// Price per unit, before VAT.
    pub unit_price: Option<i64>,
    /// Line total including VAT.
    pub total_price: Option<i64>,
    /// Whether a tax invoice was issued for the line.
    pub tax_invoice_issued: bool,
    /// Notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl DeliveryItem {
    /// Amount this line contributes to revenue.
    ///
    /// Falls back to `unit_price × quantity` plus VAT when no total was stored.
    #[must_use]
    pub fn line_total(&self) -> i64 {
        if let Some(total) = self.total_price {
            return total;
        }
        match self.unit_price {
            Some(price) if self.quantity > 0 => vat_total(price, self.quantity),
            _ => 0,
        }
    }
}

/// Input for adding a delivery item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeliveryItem {
    /// Owning schedule.
    pub schedule_id: Option<i64>,
    /// Owning history entry.
    pub history_id: Option<i64>,
    /// Product name.
    pub item_name: String,
    /// Quantity.
    pub quantity: u32,
    /// Unit of measure.
    pub unit: String,
    /// Price per unit, before VAT.
    pub unit_price: Option<i64>,
    /// Tax invoice issued.
    pub tax_invoice_issued: bool,
    /// Notes.
    pub notes: Option<String>,
}

impl NewDeliveryItem {
    /// An item for a schedule, in the default unit.
    #[must_use]
    pub fn for_schedule(
        schedule_id: i64,
        item_name: impl Into<String>,
        quantity: u32,
        unit_price: Option<i64>,
    ) -> Self {
        Self {
            schedule_id: Some(schedule_id),
            history_id: None,
            item_name: item_name.into(),
            quantity,
            unit: DEFAULT_UNIT.to_string(),
            unit_price,
            tax_invoice_issued: false,
            notes: None,
        }
    }

    /// An item for a history entry, in the default unit.
    #[must_use]
    pub fn for_history(
        history_id: i64,
        item_name: impl Into<String>,
        quantity: u32,
        unit_price: Option<i64>,
    ) -> Self {
        Self {
            schedule_id: None,
            history_id: Some(history_id),
            ..Self::for_schedule(0, item_name, quantity, unit_price)
        }
    }

    /// Check the item before it is written.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the item has no owner or no name, or
    /// when its price, quantity or line total is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.schedule_id.is_none() && self.history_id.is_none() {
            return Err(Error::validation(
                "delivery item must belong to a schedule or a history entry",
            ));
        }
        if self.item_name.trim().is_empty() {
            return Err(Error::validation("item name cannot be empty"));
        }
        validate::amount("unit price", self.unit_price)?;
        validate::quantity(self.quantity)?;
        validate::amount("line total", self.computed_total())
    }

    /// Total stored on creation: VAT-inclusive when a price and a non-zero
    /// quantity are present.
    #[must_use]
    pub fn computed_total(&self) -> Option<i64> {
        match self.unit_price {
            Some(price) if self.quantity > 0 => Some(vat_total(price, self.quantity)),
            _ => None,
        }
    }
}

/// `unit_price × quantity × 1.1`, rounded half up to whole won.
///
/// Saturates at the `i64` range.
#[must_use]
pub fn vat_total(unit_price: i64, quantity: u32) -> i64 {
    let subtotal = i128::from(unit_price) * i128::from(quantity);
    validate::saturate((subtotal * 11 + 5) / 10)
}

/// Sum amounts, saturating at the `i64` range.
pub fn sum_amounts(amounts: impl IntoIterator<Item = i64>) -> i64 {
    amounts.into_iter().fold(0, i64::saturating_add)
}

/// Render an amount with thousands separators, e.g. `1,234,000`.
#[must_use]
pub fn format_won(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// One entry parsed from a legacy item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    /// Product name.
    pub name: String,
    /// Quantity, 1 when the entry had none.
    pub quantity: u32,
    /// Unit, the default when the entry had none.
    pub unit: String,
}

/// Parse a legacy free-text item list such as `"제품A 10개, 제품B 5 box"`.
///
/// Entries are separated by commas or newlines. Blank entries are skipped.
#[must_use]
pub fn parse_items_text(text: &str) -> Vec<ParsedItem> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> ParsedItem {
    if let Some(caps) = ITEM_ENTRY.captures(entry) {
        if let Ok(quantity) = caps["qty"].parse::<u32>() {
            let unit = &caps["unit"];
            return ParsedItem {
                name: caps["name"].trim().to_string(),
                quantity,
                unit: if unit.is_empty() {
                    DEFAULT_UNIT.to_string()
                } else {
                    unit.to_string()
                },
            };
        }
    }
    ParsedItem {
        name: entry.to_string(),
        quantity: 1,
        unit: DEFAULT_UNIT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(unit_price: Option<i64>, quantity: u32, total: Option<i64>) -> DeliveryItem {
        DeliveryItem {
            id: 1,
            schedule_id: Some(1),
            history_id: None,
            item_name: "Pipette".into(),
            quantity,
            unit: DEFAULT_UNIT.into(),
            unit_price,
            total_price: total,
            tax_invoice_issued: false,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_vat_total() {
        assert_eq!(vat_total(100_000, 3), 330_000);
        assert_eq!(vat_total(15, 1), 17); // 16.5 rounds up
        assert_eq!(vat_total(14, 1), 15); // 15.4 rounds down
        assert_eq!(vat_total(0, 10), 0);
        assert_eq!(vat_total(validate::MAX_AMOUNT, 10_000), i64::MAX);
    }

    #[test]
    fn test_sum_amounts_saturates() {
        assert_eq!(sum_amounts([1_100, 2_200]), 3_300);
        assert_eq!(sum_amounts([i64::MAX, 1]), i64::MAX);
        assert_eq!(sum_amounts(Vec::new()), 0);
    }

    #[test]
    fn test_line_total_prefers_stored_total() {
        assert_eq!(item(Some(100), 2, Some(999)).line_total(), 999);
    }

    #[test]
    fn test_line_total_falls_back_to_price() {
        assert_eq!(item(Some(100), 2, None).line_total(), 220);
        assert_eq!(item(None, 2, None).line_total(), 0);
        assert_eq!(item(Some(100), 0, None).line_total(), 0);
    }

    #[test]
    fn test_computed_total() {
        let new = NewDeliveryItem::for_schedule(1, "Centrifuge", 2, Some(1_000_000));
        assert_eq!(new.computed_total(), Some(2_200_000));

        let no_price = NewDeliveryItem::for_schedule(1, "Centrifuge", 2, None);
        assert_eq!(no_price.computed_total(), None);

        let zero_qty = NewDeliveryItem::for_schedule(1, "Centrifuge", 0, Some(10));
        assert_eq!(zero_qty.computed_total(), None);
    }

    #[test]
    fn test_validate_requires_owner() {
        let mut new = NewDeliveryItem::for_history(4, "Tips", 1, Some(10));
        assert!(new.validate().is_ok());
        assert_eq!(new.schedule_id, None);

        new.history_id = None;
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_validate_name_and_price() {
        let mut new = NewDeliveryItem::for_schedule(1, "  ", 1, Some(10));
        assert!(new.validate().is_err());

        new.item_name = "Tips".into();
        new.unit_price = Some(-10);
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_validate_amount_limits() {
        // 90,909,090,909,090 × 10 plus VAT is exactly the largest amount.
        let fits = NewDeliveryItem::for_schedule(1, "Big", 10, Some(90_909_090_909_090));
        assert_eq!(fits.computed_total(), Some(999_999_999_999_990));
        assert!(fits.validate().is_ok());

        let huge = NewDeliveryItem::for_schedule(1, "Big", 10_000, Some(validate::MAX_AMOUNT));
        assert!(huge.validate().unwrap_err().is_validation());

        let many = NewDeliveryItem::for_schedule(1, "Tips", validate::MAX_QUANTITY + 1, Some(1));
        assert!(many.validate().is_err());

        let pricey = NewDeliveryItem::for_schedule(1, "Tips", 1, Some(validate::MAX_AMOUNT + 1));
        assert!(pricey.validate().is_err());
    }

    #[test]
    fn test_parse_items_text() {
        let items = parse_items_text("제품A 10개, 제품B 5 box\nGloves x 3");
        assert_eq!(
            items,
            vec![
                ParsedItem {
                    name: "제품A".into(),
                    quantity: 10,
                    unit: "개".into()
                },
                ParsedItem {
                    name: "제품B".into(),
                    quantity: 5,
                    unit: "box".into()
                },
                ParsedItem {
                    name: "Gloves".into(),
                    quantity: 3,
                    unit: DEFAULT_UNIT.into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_items_without_quantity() {
        let items = parse_items_text("Service contract, , ");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Service contract");
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[0].unit, DEFAULT_UNIT);
    }

    #[test]
    fn test_parse_items_empty() {
        assert!(parse_items_text("").is_empty());
    }

    #[test]
    fn test_format_won() {
        assert_eq!(format_won(0), "0");
        assert_eq!(format_won(999), "999");
        assert_eq!(format_won(1_000), "1,000");
        assert_eq!(format_won(12_345_678), "12,345,678");
        assert_eq!(format_won(-5_500_000), "-5,500,000");
    }
}
