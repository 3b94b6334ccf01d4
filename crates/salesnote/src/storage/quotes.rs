//! Quote and quote line persistence.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, Storage};
use crate::error::{to_sql_error, Error, Result};
use crate::model::{DiscountRate, Quote, QuoteItem, QuoteStage, QuoteTotals};

const QUOTE_COLUMNS: &str = "q.id, q.quote_number, q.schedule_id, q.customer_id, q.owner, \
     q.quote_date, q.valid_until, q.stage, q.discount_rate, q.subtotal, q.discount_amount, \
     q.tax_amount, q.total_amount, q.weighted_revenue, q.probability, q.expected_close_date, \
     q.converted_to_delivery, q.converted_history_id, q.notes, q.customer_feedback, \
     q.created_at, q.updated_at";

const QUOTE_ITEM_COLUMNS: &str = "id, quote_id, product_id, quantity, unit_price, \
     discount_rate, subtotal, description, sort_order";

/// Filter for [`Storage::list_quotes`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct QuoteFilter {
    /// Salesperson.
    pub owner: Option<String>,
    /// Customer.
    pub customer_id: Option<i64>,
    /// Stage.
    pub stage: Option<QuoteStage>,
}

impl Storage {
    /// Insert a quote and return its id. `quote.id` is ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a quote number that is already taken
    /// and `NotFound` for an unknown schedule.
    pub fn insert_quote(&self, quote: &Quote) -> Result<i64> {
        self.require_schedule(quote.schedule_id)?;
        if self.find_quote(&quote.quote_number)?.is_some() {
            return Err(Error::validation(format!(
                "quote number '{}' already exists",
                quote.quote_number
            )));
        }

        self.conn.execute(
            "INSERT INTO quotes (quote_number, schedule_id, customer_id, owner, quote_date,
                 valid_until, stage, discount_rate, subtotal, discount_amount, tax_amount,
                 total_amount, weighted_revenue, probability, expected_close_date,
                 converted_to_delivery, converted_history_id, notes, customer_feedback,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21)",
            params![
                quote.quote_number,
                quote.schedule_id,
                quote.customer_id,
                quote.owner,
                quote.quote_date,
                quote.valid_until,
                quote.stage.as_str(),
                quote.discount_rate.basis_points(),
                quote.totals.subtotal,
                quote.totals.discount_amount,
                quote.totals.tax_amount,
                quote.totals.total_amount,
                quote.totals.weighted_revenue,
                quote.probability,
                quote.expected_close_date,
                quote.converted_to_delivery,
                quote.converted_history_id,
                quote.notes,
                quote.customer_feedback,
                quote.created_at,
                quote.updated_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted quote {} ({})", id, quote.quote_number);
        Ok(id)
    }

    /// Overwrite every mutable column of a quote.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the quote does not exist.
    pub fn save_quote(&self, quote: &Quote) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE quotes SET valid_until = ?2, stage = ?3, discount_rate = ?4, subtotal = ?5,
                 discount_amount = ?6, tax_amount = ?7, total_amount = ?8,
                 weighted_revenue = ?9, probability = ?10, expected_close_date = ?11,
                 converted_to_delivery = ?12, converted_history_id = ?13, notes = ?14,
                 customer_feedback = ?15, updated_at = ?16
             WHERE id = ?1",
            params![
                quote.id,
                quote.valid_until,
                quote.stage.as_str(),
                quote.discount_rate.basis_points(),
                quote.totals.subtotal,
                quote.totals.discount_amount,
                quote.totals.tax_amount,
                quote.totals.total_amount,
                quote.totals.weighted_revenue,
                quote.probability,
                quote.expected_close_date,
                quote.converted_to_delivery,
                quote.converted_history_id,
                quote.notes,
                quote.customer_feedback,
                quote.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("quote", quote.id));
        }
        Ok(())
    }

    /// Get a quote by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_quote(&self, id: i64) -> Result<Option<Quote>> {
        let quote = self
            .conn
            .query_row(
                &format!("SELECT {QUOTE_COLUMNS} FROM quotes q WHERE q.id = ?1"),
                [id],
                row_to_quote,
            )
            .optional()?;
        Ok(quote)
    }

    /// Get a quote by id, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn require_quote(&self, id: i64) -> Result<Quote> {
        self.get_quote(id)?.ok_or_else(|| Error::not_found("quote", id))
    }

    /// Look up a quote by number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_quote(&self, quote_number: &str) -> Result<Option<Quote>> {
        let quote = self
            .conn
            .query_row(
                &format!("SELECT {QUOTE_COLUMNS} FROM quotes q WHERE q.quote_number = ?1"),
                [quote_number],
                row_to_quote,
            )
            .optional()?;
        Ok(quote)
    }

    /// Quotes matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_quotes(&self, filter: &QuoteFilter) -> Result<Vec<Quote>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes q
             WHERE (?1 IS NULL OR q.owner = ?1)
               AND (?2 IS NULL OR q.customer_id = ?2)
               AND (?3 IS NULL OR q.stage = ?3)
             ORDER BY q.quote_date DESC, q.id DESC"
        ))?;
        let quotes = stmt
            .query_map(
                params![filter.owner, filter.customer_id, filter.stage.map(|s| s.as_str())],
                row_to_quote,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(quotes)
    }

    /// Open quotes whose validity ended before `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn lapsed_quotes(&self, today: NaiveDate) -> Result<Vec<Quote>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes q
             WHERE q.valid_until < ?1
               AND q.stage NOT IN ('rejected', 'expired', 'converted')
             ORDER BY q.id"
        ))?;
        let quotes = stmt
            .query_map([today], row_to_quote)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(quotes)
    }

    /// First free number of the form `Q-YYYYMMDD-NNN` for `day`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn next_quote_number(&self, day: NaiveDate) -> Result<String> {
        let prefix = format!("Q-{}-", day.format("%Y%m%d"));
        let issued: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM quotes WHERE quote_number LIKE ?1 || '%'",
            [&prefix],
            |row| row.get(0),
        )?;
        let mut seq = issued + 1;
        loop {
            let number = format!("{prefix}{seq:03}");
            if self.find_quote(&number)?.is_none() {
                return Ok(number);
            }
            seq += 1;
        }
    }

    /// Append a line to a quote. `item.id` and `item.sort_order` are assigned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown quote or product.
    pub fn insert_quote_item(&self, item: &QuoteItem) -> Result<QuoteItem> {
        self.require_quote(item.quote_id)?;
        self.require_product(item.product_id)?;
        let sort_order: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM quote_items WHERE quote_id = ?1",
            [item.quote_id],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "INSERT INTO quote_items (quote_id, product_id, quantity, unit_price, discount_rate,
                 subtotal, description, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.quote_id,
                item.product_id,
                item.quantity,
                item.unit_price,
                item.discount_rate.basis_points(),
                item.subtotal,
                item.description,
                sort_order,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Added line {} to quote {}", id, item.quote_id);
        Ok(QuoteItem {
            id,
            sort_order,
            ..item.clone()
        })
    }

    /// Lines of a quote in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn items_for_quote(&self, quote_id: i64) -> Result<Vec<QuoteItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUOTE_ITEM_COLUMNS} FROM quote_items
             WHERE quote_id = ?1 ORDER BY sort_order, id"
        ))?;
        let items = stmt
            .query_map([quote_id], row_to_quote_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

fn discount_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DiscountRate> {
    DiscountRate::from_basis_points(row.get(idx)?).map_err(to_sql_error)
}

fn row_to_quote(row: &Row<'_>) -> rusqlite::Result<Quote> {
    Ok(Quote {
        id: row.get(0)?,
        quote_number: row.get(1)?,
        schedule_id: row.get(2)?,
        customer_id: row.get(3)?,
        owner: row.get(4)?,
        quote_date: row.get(5)?,
        valid_until: row.get(6)?,
        stage: parse_column(row, 7)?,
        discount_rate: discount_column(row, 8)?,
        totals: QuoteTotals {
            subtotal: row.get(9)?,
            discount_amount: row.get(10)?,
            tax_amount: row.get(11)?,
            total_amount: row.get(12)?,
            weighted_revenue: row.get(13)?,
        },
        probability: row.get(14)?,
        expected_close_date: row.get(15)?,
        converted_to_delivery: row.get(16)?,
        converted_history_id: row.get(17)?,
        notes: row.get(18)?,
        customer_feedback: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

fn row_to_quote_item(row: &Row<'_>) -> rusqlite::Result<QuoteItem> {
    Ok(QuoteItem {
        id: row.get(0)?,
        quote_id: row.get(1)?,
        product_id: row.get(2)?,
        quantity: row.get(3)?,
        unit_price: row.get(4)?,
        discount_rate: discount_column(row, 5)?,
        subtotal: row.get(6)?,
        description: row.get(7)?,
        sort_order: row.get(8)?,
    })
}
