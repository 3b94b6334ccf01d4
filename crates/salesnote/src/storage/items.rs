//! Delivery item persistence.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Storage;
use crate::error::{Error, Result};
use crate::model::{DeliveryItem, NewDeliveryItem};

const ITEM_COLUMNS: &str = "i.id, i.schedule_id, i.history_id, i.item_name, i.quantity, i.unit, \
     i.unit_price, i.total_price, i.tax_invoice_issued, i.notes, i.created_at";

/// The purchase a delivered line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PurchaseEvent {
    /// Bought through a schedule, directly or via one of its histories.
    Schedule(i64),
    /// Recorded only on a history entry.
    History(i64),
}

/// A delivered line tied to the purchase it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseLine {
    /// Purchase the line belongs to.
    pub event: PurchaseEvent,
    /// Day of the purchase.
    pub date: NaiveDate,
    /// VAT-inclusive line total.
    pub total: i64,
}

impl Storage {
    /// Insert a delivery item, storing its VAT-inclusive total.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad fields and `NotFound` for unknown
    /// schedule or history references.
    pub fn insert_delivery_item(
        &self,
        new: &NewDeliveryItem,
        now: DateTime<Utc>,
    ) -> Result<DeliveryItem> {
        new.validate()?;
        if let Some(schedule_id) = new.schedule_id {
            self.require_schedule(schedule_id)?;
        }
        if let Some(history_id) = new.history_id {
            if self.get_history(history_id)?.is_none() {
                return Err(Error::not_found("history", history_id));
            }
        }

        let unit = if new.unit.trim().is_empty() {
            crate::model::delivery::DEFAULT_UNIT
        } else {
            new.unit.trim()
        };

        self.conn.execute(
            "INSERT INTO delivery_items (schedule_id, history_id, item_name, quantity, unit,
                 unit_price, total_price, tax_invoice_issued, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.schedule_id,
                new.history_id,
                new.item_name.trim(),
                new.quantity,
                unit,
                new.unit_price,
                new.computed_total(),
                new.tax_invoice_issued,
                new.notes,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted delivery item {} ({})", id, new.item_name);

        self.get_delivery_item(id)?
            .ok_or_else(|| Error::internal(format!("delivery item {id} vanished after insert")))
    }

    /// Get a delivery item by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_delivery_item(&self, id: i64) -> Result<Option<DeliveryItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM delivery_items i WHERE i.id = ?1"),
                [id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Items attached directly to a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn items_for_schedule(&self, schedule_id: i64) -> Result<Vec<DeliveryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM delivery_items i WHERE i.schedule_id = ?1 ORDER BY i.id"
        ))?;
        let items = stmt
            .query_map([schedule_id], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Items attached to a history entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn items_for_history(&self, history_id: i64) -> Result<Vec<DeliveryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM delivery_items i WHERE i.history_id = ?1 ORDER BY i.id"
        ))?;
        let items = stmt
            .query_map([history_id], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Items attached to the histories of a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn items_for_schedule_histories(&self, schedule_id: i64) -> Result<Vec<DeliveryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM delivery_items i
             JOIN histories h ON i.history_id = h.id
             WHERE h.schedule_id = ?1
             ORDER BY i.id"
        ))?;
        let items = stmt
            .query_map([schedule_id], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Every priced line a customer has bought, from non-cancelled
    /// schedules and from history entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn purchase_lines(&self, customer_id: i64) -> Result<Vec<PurchaseLine>> {
        let mut lines = Vec::new();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}, s.visit_date FROM delivery_items i
             JOIN schedules s ON i.schedule_id = s.id
             WHERE s.customer_id = ?1 AND s.status != 'cancelled'"
        ))?;
        let rows = stmt.query_map([customer_id], |row| {
            Ok((row_to_item(row)?, row.get::<_, NaiveDate>(11)?))
        })?;
        for row in rows {
            let (item, date) = row?;
            let Some(schedule_id) = item.schedule_id else {
                continue;
            };
            lines.push(PurchaseLine {
                event: PurchaseEvent::Schedule(schedule_id),
                date,
                total: item.line_total(),
            });
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}, h.schedule_id, h.delivery_date, h.created_at
             FROM delivery_items i
             JOIN histories h ON i.history_id = h.id
             WHERE h.customer_id = ?1 AND i.schedule_id IS NULL"
        ))?;
        let rows = stmt.query_map([customer_id], |row| {
            Ok((
                row_to_item(row)?,
                row.get::<_, Option<i64>>(11)?,
                row.get::<_, Option<NaiveDate>>(12)?,
                row.get::<_, DateTime<Utc>>(13)?,
            ))
        })?;
        for row in rows {
            let (item, schedule_id, delivery_date, created_at) = row?;
            let event = match (schedule_id, item.history_id) {
                (Some(schedule_id), _) => PurchaseEvent::Schedule(schedule_id),
                (None, Some(history_id)) => PurchaseEvent::History(history_id),
                (None, None) => continue,
            };
            lines.push(PurchaseLine {
                event,
                date: delivery_date.unwrap_or_else(|| created_at.date_naive()),
                total: item.line_total(),
            });
        }

        lines.retain(|line| line.total > 0);
        Ok(lines)
    }

    /// Number of items created for a customer after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_items_created_since(&self, customer_id: i64, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM delivery_items i
             LEFT JOIN schedules s ON i.schedule_id = s.id
             LEFT JOIN histories h ON i.history_id = h.id
             WHERE (s.customer_id = ?1 OR h.customer_id = ?1) AND i.created_at > ?2",
            params![customer_id, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<DeliveryItem> {
    Ok(DeliveryItem {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        history_id: row.get(2)?,
        item_name: row.get(3)?,
        quantity: row.get(4)?,
        unit: row.get(5)?,
        unit_price: row.get(6)?,
        total_price: row.get(7)?,
        tax_invoice_issued: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
    })
}
