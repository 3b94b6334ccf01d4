//! History persistence. Entries are only ever inserted.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, parse_optional_column, sql_limit, Storage};
use crate::error::{Error, Result};
use crate::model::{ActionType, History, NewHistory};

const HISTORY_COLUMNS: &str = "id, owner, customer_id, schedule_id, parent_id, action_type, \
     service_status, content, delivery_amount, delivery_items_text, delivery_date, \
     meeting_date, tax_invoice_issued, created_by, created_at";

impl Storage {
    /// Insert a history entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad fields and `NotFound` for unknown
    /// customer, schedule or parent references.
    pub fn insert_history(&self, new: &NewHistory, now: DateTime<Utc>) -> Result<History> {
        new.validate()?;
        if let Some(customer_id) = new.customer_id {
            self.require_customer(customer_id)?;
        }
        if let Some(schedule_id) = new.schedule_id {
            self.require_schedule(schedule_id)?;
        }
        if let Some(parent_id) = new.parent_id {
            if self.get_history(parent_id)?.is_none() {
                return Err(Error::not_found("history", parent_id));
            }
        }

        self.conn.execute(
            "INSERT INTO histories (owner, customer_id, schedule_id, parent_id, action_type,
                 service_status, content, delivery_amount, delivery_items_text, delivery_date,
                 meeting_date, tax_invoice_issued, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                new.owner,
                new.customer_id,
                new.schedule_id,
                new.parent_id,
                new.action_type.as_str(),
                new.service_status.map(|s| s.as_str()),
                new.content,
                new.delivery_amount,
                new.delivery_items_text,
                new.delivery_date,
                new.meeting_date,
                new.tax_invoice_issued,
                new.created_by,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted {} history {}", new.action_type, id);

        self.get_history(id)?
            .ok_or_else(|| Error::internal(format!("history {id} vanished after insert")))
    }

    /// Get a history entry by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_history(&self, id: i64) -> Result<Option<History>> {
        let history = self
            .conn
            .query_row(
                &format!("SELECT {HISTORY_COLUMNS} FROM histories WHERE id = ?1"),
                [id],
                row_to_history,
            )
            .optional()?;
        Ok(history)
    }

    /// Entries reporting on a schedule, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn histories_for_schedule(&self, schedule_id: i64) -> Result<Vec<History>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM histories WHERE schedule_id = ?1 ORDER BY id"
        ))?;
        let histories = stmt
            .query_map([schedule_id], row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(histories)
    }

    /// A customer's entries, newest first, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn histories_for_customer(
        &self,
        customer_id: i64,
        action_type: Option<ActionType>,
        limit: Option<usize>,
    ) -> Result<Vec<History>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM histories
             WHERE customer_id = ?1 AND (?2 IS NULL OR action_type = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let histories = stmt
            .query_map(
                params![
                    customer_id,
                    action_type.map(|a| a.as_str()),
                    sql_limit(limit)
                ],
                row_to_history,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(histories)
    }
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<History> {
    Ok(History {
        id: row.get(0)?,
        owner: row.get(1)?,
        customer_id: row.get(2)?,
        schedule_id: row.get(3)?,
        parent_id: row.get(4)?,
        action_type: parse_column(row, 5)?,
        service_status: parse_optional_column(row, 6)?,
        content: row.get(7)?,
        delivery_amount: row.get(8)?,
        delivery_items_text: row.get(9)?,
        delivery_date: row.get(10)?,
        meeting_date: row.get(11)?,
        tax_invoice_issued: row.get(12)?,
        created_by: row.get(13)?,
        created_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::model::ServiceStatus;

    #[test]
    fn test_insert_and_get_history() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");

        let mut new = NewHistory::new("kim", ActionType::DeliverySchedule);
        new.customer_id = Some(customer.id);
        new.delivery_amount = Some(3_300_000);
        new.delivery_date = Some(date(2024, 4, 2));
        new.tax_invoice_issued = true;

        let history = storage.insert_history(&new, ts(2024, 4, 2)).unwrap();
        assert_eq!(history.action_type, ActionType::DeliverySchedule);
        assert_eq!(history.delivery_amount, Some(3_300_000));
        assert_eq!(history.delivery_date, Some(date(2024, 4, 2)));
        assert!(history.tax_invoice_issued);
        assert_eq!(storage.get_history(history.id).unwrap(), Some(history));
    }

    #[test]
    fn test_service_status_round_trip() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");

        let mut new = NewHistory::new("kim", ActionType::Service);
        new.customer_id = Some(customer.id);
        new.service_status = Some(ServiceStatus::InProgress);

        let history = storage.insert_history(&new, ts(2024, 4, 2)).unwrap();
        assert_eq!(history.service_status, Some(ServiceStatus::InProgress));
    }

    #[test]
    fn test_insert_history_unknown_references() {
        let storage = create_test_storage();

        let mut new = NewHistory::new("kim", ActionType::Memo);
        new.customer_id = Some(5);
        assert!(storage.insert_history(&new, ts(2024, 4, 2)).unwrap_err().is_not_found());

        new.customer_id = None;
        new.parent_id = Some(5);
        assert!(storage.insert_history(&new, ts(2024, 4, 2)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_reply_memo_round_trip() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");

        let mut parent = NewHistory::new("kim", ActionType::CustomerMeeting);
        parent.customer_id = Some(customer.id);
        let parent = storage.insert_history(&parent, ts(2024, 4, 1)).unwrap();

        let mut reply = NewHistory::new("kim", ActionType::Memo);
        reply.customer_id = Some(customer.id);
        reply.parent_id = Some(parent.id);
        reply.created_by = Some("park".into());
        let reply = storage.insert_history(&reply, ts(2024, 4, 2)).unwrap();

        assert!(reply.is_manager_memo());
        assert_eq!(reply.memo_author(), "park");
    }

    #[test]
    fn test_histories_for_customer_filter() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");

        for (action, day) in [
            (ActionType::CustomerMeeting, 1),
            (ActionType::Memo, 2),
            (ActionType::CustomerMeeting, 3),
        ] {
            let mut new = NewHistory::new("kim", action);
            new.customer_id = Some(customer.id);
            storage.insert_history(&new, ts(2024, 5, day)).unwrap();
        }

        let all = storage.histories_for_customer(customer.id, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].created_at, ts(2024, 5, 3));

        let meetings = storage
            .histories_for_customer(customer.id, Some(ActionType::CustomerMeeting), Some(1))
            .unwrap();
        assert_eq!(meetings.len(), 1);
    }
}
