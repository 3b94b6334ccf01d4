//! Schedule persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, sql_limit, Storage};
use crate::error::{Error, Result};
use crate::model::{ActivityType, NewSchedule, Schedule, ScheduleStatus};

const SCHEDULE_COLUMNS: &str = "id, owner, customer_id, opportunity_id, visit_date, visit_time, \
     location, status, activity_type, notes, expected_revenue, probability, \
     expected_close_date, created_at, updated_at";

/// Filter for [`Storage::list_schedules`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    /// Salesperson.
    pub owner: Option<String>,
    /// Customer.
    pub customer_id: Option<i64>,
    /// Status.
    pub status: Option<ScheduleStatus>,
    /// Activity type.
    pub activity_type: Option<ActivityType>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl Storage {
    /// Insert a schedule as given, including its opportunity link.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad fields and `NotFound` for an
    /// unknown customer.
    pub fn insert_schedule(&self, new: &NewSchedule, now: DateTime<Utc>) -> Result<Schedule> {
        new.validate()?;
        self.require_customer(new.customer_id)?;

        self.conn.execute(
            "INSERT INTO schedules (owner, customer_id, opportunity_id, visit_date, visit_time,
                 location, status, activity_type, notes, expected_revenue, probability,
                 expected_close_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                new.owner,
                new.customer_id,
                new.opportunity_id,
                new.visit_date,
                new.visit_time,
                new.location,
                new.status.as_str(),
                new.activity_type.as_str(),
                new.notes,
                new.expected_revenue,
                new.probability,
                new.expected_close_date,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted {} schedule {}", new.activity_type, id);

        self.require_schedule(id)
    }

    /// Get a schedule by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_schedule(&self, id: i64) -> Result<Option<Schedule>> {
        let schedule = self
            .conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                [id],
                row_to_schedule,
            )
            .optional()?;
        Ok(schedule)
    }

    /// Get a schedule by id, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn require_schedule(&self, id: i64) -> Result<Schedule> {
        self.get_schedule(id)?
            .ok_or_else(|| Error::not_found("schedule", id))
    }

    /// Overwrite every mutable column of a schedule.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the schedule does not exist.
    pub fn save_schedule(&self, schedule: &Schedule) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE schedules SET opportunity_id = ?2, visit_date = ?3, visit_time = ?4,
                 location = ?5, status = ?6, activity_type = ?7, notes = ?8,
                 expected_revenue = ?9, probability = ?10, expected_close_date = ?11,
                 updated_at = ?12
             WHERE id = ?1",
            params![
                schedule.id,
                schedule.opportunity_id,
                schedule.visit_date,
                schedule.visit_time,
                schedule.location,
                schedule.status.as_str(),
                schedule.activity_type.as_str(),
                schedule.notes,
                schedule.expected_revenue,
                schedule.probability,
                schedule.expected_close_date,
                schedule.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("schedule", schedule.id));
        }
        Ok(())
    }

    /// Point a schedule at an opportunity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn link_schedule(&self, schedule_id: i64, opportunity_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE schedules SET opportunity_id = ?2 WHERE id = ?1",
            params![schedule_id, opportunity_id],
        )?;
        Ok(())
    }

    /// Delete a schedule.
    ///
    /// Returns `true` if a schedule was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_schedule_row(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM schedules WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Schedules matching `filter`, newest visit first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE (?1 IS NULL OR owner = ?1)
               AND (?2 IS NULL OR customer_id = ?2)
               AND (?3 IS NULL OR status = ?3)
               AND (?4 IS NULL OR activity_type = ?4)
             ORDER BY visit_date DESC, visit_time DESC, id DESC
             LIMIT ?5"
        ))?;
        let schedules = stmt
            .query_map(
                params![
                    filter.owner,
                    filter.customer_id,
                    filter.status.map(|s| s.as_str()),
                    filter.activity_type.map(|a| a.as_str()),
                    sql_limit(filter.limit),
                ],
                row_to_schedule,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Schedules linked to an opportunity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn schedules_for_opportunity(&self, opportunity_id: i64) -> Result<Vec<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE opportunity_id = ?1
             ORDER BY visit_date, visit_time, id"
        ))?;
        let schedules = stmt
            .query_map([opportunity_id], row_to_schedule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Number of funnel schedules linked to an opportunity. Service
    /// schedules never keep an opportunity alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_schedules_for_opportunity(&self, opportunity_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM schedules WHERE opportunity_id = ?1 AND activity_type != 'service'",
            [opportunity_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Quote and delivery schedules with no opportunity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unlinked_pipeline_schedules(&self) -> Result<Vec<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE opportunity_id IS NULL AND activity_type IN ('quote', 'delivery')
             ORDER BY customer_id, visit_date, visit_time, id"
        ))?;
        let schedules = stmt
            .query_map([], row_to_schedule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Number of a customer's schedules created after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_schedules_created_since(
        &self,
        customer_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM schedules WHERE customer_id = ?1 AND created_at > ?2",
            params![customer_id, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        owner: row.get(1)?,
        customer_id: row.get(2)?,
        opportunity_id: row.get(3)?,
        visit_date: row.get(4)?,
        visit_time: row.get(5)?,
        location: row.get(6)?,
        status: parse_column(row, 7)?,
        activity_type: parse_column(row, 8)?,
        notes: row.get(9)?,
        expected_revenue: row.get(10)?,
        probability: row.get(11)?,
        expected_close_date: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_insert_and_get_schedule() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        let mut new = new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 4));
        new.expected_revenue = Some(5_000_000);
        new.probability = Some(40);

        let schedule = storage.insert_schedule(&new, ts(2024, 3, 1)).unwrap();

        assert_eq!(schedule.activity_type, ActivityType::Quote);
        assert_eq!(schedule.status, ScheduleStatus::Scheduled);
        assert_eq!(schedule.visit_date, date(2024, 3, 4));
        assert_eq!(schedule.visit_time, ten_am());
        assert_eq!(schedule.expected_revenue, Some(5_000_000));
        assert_eq!(schedule.probability, Some(40));
        assert_eq!(schedule.created_at, ts(2024, 3, 1));
        assert_eq!(storage.get_schedule(schedule.id).unwrap(), Some(schedule));
    }

    #[test]
    fn test_insert_schedule_unknown_customer() {
        let storage = create_test_storage();
        let new = new_schedule(77, ActivityType::Quote, date(2024, 3, 4));
        assert!(storage.insert_schedule(&new, ts(2024, 3, 1)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_save_schedule() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        let mut schedule = storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 4)),
                ts(2024, 3, 1),
            )
            .unwrap();

        schedule.status = ScheduleStatus::Completed;
        schedule.notes = Some("delivered".into());
        storage.save_schedule(&schedule).unwrap();

        let stored = storage.require_schedule(schedule.id).unwrap();
        assert_eq!(stored.status, ScheduleStatus::Completed);
        assert_eq!(stored.notes.as_deref(), Some("delivered"));
    }

    #[test]
    fn test_list_schedules_filters() {
        let storage = create_test_storage();
        let lee = create_customer(&storage, "kim", "Lee");
        let choi = create_customer(&storage, "park", "Choi");

        storage
            .insert_schedule(&new_schedule(lee.id, ActivityType::Quote, date(2024, 3, 1)), ts(2024, 3, 1))
            .unwrap();
        storage
            .insert_schedule(&new_schedule(lee.id, ActivityType::Delivery, date(2024, 3, 9)), ts(2024, 3, 1))
            .unwrap();
        let mut other = new_schedule(choi.id, ActivityType::Quote, date(2024, 3, 5));
        other.owner = "park".into();
        storage.insert_schedule(&other, ts(2024, 3, 1)).unwrap();

        let all = storage.list_schedules(&ScheduleFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].visit_date, date(2024, 3, 9));

        let quotes = storage
            .list_schedules(&ScheduleFilter {
                activity_type: Some(ActivityType::Quote),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(quotes.len(), 2);

        let kims = storage
            .list_schedules(&ScheduleFilter {
                owner: Some("kim".into()),
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(kims.len(), 1);
        assert_eq!(kims[0].customer_id, lee.id);
    }

    #[test]
    fn test_unlinked_pipeline_schedules_skip_meetings() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::CustomerMeeting, date(2024, 3, 1)),
                ts(2024, 3, 1),
            )
            .unwrap();
        storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 2)),
                ts(2024, 3, 1),
            )
            .unwrap();

        let unlinked = storage.unlinked_pipeline_schedules().unwrap();
        assert_eq!(unlinked.len(), 1);
        assert_eq!(unlinked[0].activity_type, ActivityType::Quote);
    }

    #[test]
    fn test_count_schedules_created_since() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)),
                ts(2024, 3, 1),
            )
            .unwrap();
        storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Quote, date(2024, 4, 1)),
                ts(2024, 4, 1),
            )
            .unwrap();

        assert_eq!(
            storage
                .count_schedules_created_since(customer.id, ts(2024, 3, 15))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_delete_schedule_row() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        let schedule = storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)),
                ts(2024, 3, 1),
            )
            .unwrap();

        assert!(storage.delete_schedule_row(schedule.id).unwrap());
        assert!(!storage.delete_schedule_row(schedule.id).unwrap());
        assert!(storage.get_schedule(schedule.id).unwrap().is_none());
    }
}
