//! Opportunity persistence.

use rusqlite::{params, types::Type, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, Storage};
use crate::error::{Error, Result};
use crate::model::{Opportunity, Stage, StageEntry};

const OPPORTUNITY_COLUMNS: &str = "o.id, o.customer_id, o.title, o.current_stage, \
     o.stage_entry_date, o.expected_revenue, o.weighted_revenue, o.backlog_amount, \
     o.probability, o.expected_close_date, o.stage_history, o.total_quotes_sent, \
     o.total_meetings, o.won_date, o.lost_date, o.lost_reason, o.actual_revenue, \
     o.created_at, o.updated_at";

/// Filter for [`Storage::list_opportunities`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct OpportunityFilter {
    /// Owner of the customer.
    pub owner: Option<String>,
    /// Customer.
    pub customer_id: Option<i64>,
    /// Current stage.
    pub stage: Option<Stage>,
    /// Only stages that are not won or lost.
    pub open_only: bool,
}

impl OpportunityFilter {
    /// Filter on the customer owner only.
    #[must_use]
    pub fn for_owner(owner: Option<&str>) -> Self {
        Self {
            owner: owner.map(str::to_string),
            ..Self::default()
        }
    }
}

impl Storage {
    /// Insert an opportunity and return its id. `opp.id` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown customer.
    pub fn insert_opportunity(&self, opp: &Opportunity) -> Result<i64> {
        self.require_customer(opp.customer_id)?;
        let history = serde_json::to_string(&opp.stage_history)?;

        self.conn.execute(
            "INSERT INTO opportunities (customer_id, title, current_stage, stage_entry_date,
                 expected_revenue, weighted_revenue, backlog_amount, probability,
                 expected_close_date, stage_history, total_quotes_sent, total_meetings,
                 won_date, lost_date, lost_reason, actual_revenue, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                opp.customer_id,
                opp.title,
                opp.current_stage.as_str(),
                opp.stage_entry_date,
                opp.expected_revenue,
                opp.weighted_revenue,
                opp.backlog_amount,
                opp.probability,
                opp.expected_close_date,
                history,
                opp.total_quotes_sent,
                opp.total_meetings,
                opp.won_date,
                opp.lost_date,
                opp.lost_reason,
                opp.actual_revenue,
                opp.created_at,
                opp.updated_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(
            "Inserted opportunity {} for customer {} at {}",
            id, opp.customer_id, opp.current_stage
        );
        Ok(id)
    }

    /// Overwrite every mutable column of an opportunity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the opportunity does not exist.
    pub fn save_opportunity(&self, opp: &Opportunity) -> Result<()> {
        let history = serde_json::to_string(&opp.stage_history)?;

        let affected = self.conn.execute(
            "UPDATE opportunities SET title = ?2, current_stage = ?3, stage_entry_date = ?4,
                 expected_revenue = ?5, weighted_revenue = ?6, backlog_amount = ?7,
                 probability = ?8, expected_close_date = ?9, stage_history = ?10,
                 total_quotes_sent = ?11, total_meetings = ?12, won_date = ?13,
                 lost_date = ?14, lost_reason = ?15, actual_revenue = ?16, updated_at = ?17
             WHERE id = ?1",
            params![
                opp.id,
                opp.title,
                opp.current_stage.as_str(),
                opp.stage_entry_date,
                opp.expected_revenue,
                opp.weighted_revenue,
                opp.backlog_amount,
                opp.probability,
                opp.expected_close_date,
                history,
                opp.total_quotes_sent,
                opp.total_meetings,
                opp.won_date,
                opp.lost_date,
                opp.lost_reason,
                opp.actual_revenue,
                opp.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("opportunity", opp.id));
        }
        Ok(())
    }

    /// Get an opportunity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_opportunity(&self, id: i64) -> Result<Option<Opportunity>> {
        let opp = self
            .conn
            .query_row(
                &format!("SELECT {OPPORTUNITY_COLUMNS} FROM opportunities o WHERE o.id = ?1"),
                [id],
                row_to_opportunity,
            )
            .optional()?;
        Ok(opp)
    }

    /// Get an opportunity by id, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn require_opportunity(&self, id: i64) -> Result<Opportunity> {
        self.get_opportunity(id)?
            .ok_or_else(|| Error::not_found("opportunity", id))
    }

    /// Delete an opportunity. Linked schedules are unlinked.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_opportunity(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM opportunities WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Opportunities matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_opportunities(&self, filter: &OpportunityFilter) -> Result<Vec<Opportunity>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities o
             JOIN customers c ON o.customer_id = c.id
             WHERE (?1 IS NULL OR c.owner = ?1)
               AND (?2 IS NULL OR o.customer_id = ?2)
               AND (?3 IS NULL OR o.current_stage = ?3)
               AND (?4 = 0 OR o.current_stage NOT IN ('won', 'lost', 'quote_lost'))
             ORDER BY o.id"
        ))?;
        let opps = stmt
            .query_map(
                params![
                    filter.owner,
                    filter.customer_id,
                    filter.stage.map(|s| s.as_str()),
                    filter.open_only,
                ],
                row_to_opportunity,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(opps)
    }

    /// The customer's most recently created open opportunity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_open_opportunity(&self, customer_id: i64) -> Result<Option<Opportunity>> {
        let opp = self
            .conn
            .query_row(
                &format!(
                    "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities o
                     WHERE o.customer_id = ?1
                       AND o.current_stage NOT IN ('won', 'lost', 'quote_lost')
                     ORDER BY o.created_at DESC, o.id DESC LIMIT 1"
                ),
                [customer_id],
                row_to_opportunity,
            )
            .optional()?;
        Ok(opp)
    }

    /// The customer's most recently created opportunity in any stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_opportunity(&self, customer_id: i64) -> Result<Option<Opportunity>> {
        let opp = self
            .conn
            .query_row(
                &format!(
                    "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities o
                     WHERE o.customer_id = ?1
                     ORDER BY o.created_at DESC, o.id DESC LIMIT 1"
                ),
                [customer_id],
                row_to_opportunity,
            )
            .optional()?;
        Ok(opp)
    }
}

fn row_to_opportunity(row: &Row<'_>) -> rusqlite::Result<Opportunity> {
    let history_json: String = row.get(10)?;
    let stage_history: Vec<StageEntry> = serde_json::from_str(&history_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(Opportunity {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        title: row.get(2)?,
        current_stage: parse_column(row, 3)?,
        stage_entry_date: row.get(4)?,
        expected_revenue: row.get(5)?,
        weighted_revenue: row.get(6)?,
        backlog_amount: row.get(7)?,
        probability: row.get(8)?,
        expected_close_date: row.get(9)?,
        stage_history,
        total_quotes_sent: row.get(11)?,
        total_meetings: row.get(12)?,
        won_date: row.get(13)?,
        lost_date: row.get(14)?,
        lost_reason: row.get(15)?,
        actual_revenue: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}
