//! Opportunities: one tracked deal moving through the funnel.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::stage::{Stage, StageEntry};

/// A pipeline record tracking a deal's stage and revenue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Identifier (0 until stored).
    pub id: i64,
    /// Owning customer.
    pub customer_id: i64,
    /// Short label, e.g. "견적 - 03/14".
    pub title: Option<String>,
    /// Stage the deal is in now.
    pub current_stage: Stage,
    /// Day `current_stage` was entered.
    pub stage_entry_date: NaiveDate,
    /// Expected deal value in won.
    pub expected_revenue: i64,
    /// `expected_revenue` weighted by `probability`.
    pub weighted_revenue: i64,
    /// Value of scheduled but not yet completed deliveries.
    pub backlog_amount: i64,
    /// Win probability in percent.
    pub probability: u8,
    /// Expected close date.
    pub expected_close_date: Option<NaiveDate>,
    /// Every stage visited, oldest first.
    pub stage_history: Vec<StageEntry>,
    /// Quotes sent over the life of the deal.
    pub total_quotes_sent: u32,
    /// Meetings held over the life of the deal.
    pub total_meetings: u32,
    /// Day the deal was won.
    pub won_date: Option<NaiveDate>,
    /// Day the deal was lost.
    pub lost_date: Option<NaiveDate>,
    /// Why the deal was lost.
    pub lost_reason: Option<String>,
    /// Delivered revenue, once known.
    pub actual_revenue: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Start a new, unsaved opportunity in `stage`.
    #[must_use]
    pub fn start(
        customer_id: i64,
        title: Option<String>,
        stage: Stage,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        let mut opp = Self {
            id: 0,
            customer_id,
            title,
            current_stage: stage,
            stage_entry_date: today,
            expected_revenue: 0,
            weighted_revenue: 0,
            backlog_amount: 0,
            probability: stage.default_probability(),
            expected_close_date: None,
            stage_history: vec![StageEntry::open(stage, today, None)],
            total_quotes_sent: 0,
            total_meetings: 0,
            won_date: None,
            lost_date: None,
            lost_reason: None,
            actual_revenue: None,
            created_at: now,
            updated_at: now,
        };
        opp.mark_outcome(stage, today);
        opp
    }

    /// Whether the deal is still in play.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.current_stage.is_closed()
    }

    /// Move the opportunity to `new_stage`.
    ///
    /// Returns `false` without touching anything when `new_stage` is the
    /// current stage.
    pub fn update_stage(&mut self, new_stage: Stage, today: NaiveDate, note: Option<String>) -> bool {
        if new_stage == self.current_stage {
            return false;
        }

        let old = self.current_stage;
        for entry in &mut self.stage_history {
            if entry.stage == old && entry.exited.is_none() {
                entry.exited = Some(today);
            }
        }
        self.stage_history
            .push(StageEntry::open(new_stage, today, note));

        self.current_stage = new_stage;
        self.stage_entry_date = today;
        self.probability = new_stage.default_probability();
        self.mark_outcome(new_stage, today);
        self.recompute_weighted();
        true
    }

    /// Advance to `target` only if it lies further down the funnel.
    pub fn advance_to(&mut self, target: Stage, today: NaiveDate, note: Option<String>) -> bool {
        if target.rank() <= self.current_stage.rank() {
            return false;
        }
        self.update_stage(target, today, note)
    }

    /// `weighted = expected × probability / 100`, truncating.
    pub fn recompute_weighted(&mut self) {
        self.weighted_revenue = weighted(self.expected_revenue, self.probability);
    }

    /// Whether the stage history ever reached `stage`.
    #[must_use]
    pub fn visited(&self, stage: Stage) -> bool {
        self.stage_history.iter().any(|e| e.stage == stage)
    }

    /// The entry for the current stage, if the history is consistent.
    #[must_use]
    pub fn open_entry(&self) -> Option<&StageEntry> {
        self.stage_history
            .iter()
            .rev()
            .find(|e| e.is_open() && e.stage == self.current_stage)
    }

    fn mark_outcome(&mut self, stage: Stage, today: NaiveDate) {
        match stage {
            Stage::Won if self.won_date.is_none() => self.won_date = Some(today),
            Stage::Lost | Stage::QuoteLost if self.lost_date.is_none() => {
                self.lost_date = Some(today);
            }
            _ => {}
        }
    }
}

/// Weight `amount` by a percentage, truncating toward zero.
#[must_use]
pub fn weighted(amount: i64, probability: u8) -> i64 {
    super::validate::saturate(i128::from(amount) * i128::from(probability) / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lead() -> Opportunity {
        Opportunity::start(1, None, Stage::Lead, date(2024, 1, 1), Utc::now())
    }

    #[test]
    fn test_start_opens_single_entry() {
        let opp = lead();
        assert_eq!(opp.stage_history.len(), 1);
        assert_eq!(opp.probability, 10);
        assert_eq!(opp.open_entry().unwrap().stage, Stage::Lead);
        assert!(opp.won_date.is_none());
    }

    #[test]
    fn test_start_won_sets_won_date() {
        let opp = Opportunity::start(1, None, Stage::Won, date(2024, 2, 2), Utc::now());
        assert_eq!(opp.won_date, Some(date(2024, 2, 2)));
        assert_eq!(opp.probability, 100);
    }

    #[test]
    fn test_update_stage_same_stage_is_noop() {
        let mut opp = lead();
        let before = opp.clone();
        assert!(!opp.update_stage(Stage::Lead, date(2024, 1, 5), None));
        assert_eq!(opp, before);
    }

    #[test]
    fn test_update_stage_closes_old_entry() {
        let mut opp = lead();
        opp.expected_revenue = 1_000_000;

        assert!(opp.update_stage(Stage::Quote, date(2024, 1, 5), Some("quote sent".into())));

        assert_eq!(opp.current_stage, Stage::Quote);
        assert_eq!(opp.stage_entry_date, date(2024, 1, 5));
        assert_eq!(opp.probability, 50);
        assert_eq!(opp.weighted_revenue, 500_000);
        assert_eq!(opp.stage_history[0].exited, Some(date(2024, 1, 5)));
        let open: Vec<_> = opp.stage_history.iter().filter(|e| e.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stage, Stage::Quote);
        assert_eq!(open[0].note.as_deref(), Some("quote sent"));
    }

    #[test]
    fn test_update_stage_closes_duplicate_open_entries() {
        let mut opp = lead();
        opp.stage_history
            .push(StageEntry::open(Stage::Lead, date(2024, 1, 2), None));

        opp.update_stage(Stage::Contact, date(2024, 1, 3), None);

        let open: Vec<_> = opp.stage_history.iter().filter(|e| e.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stage, Stage::Contact);
    }

    #[test]
    fn test_update_stage_lost_sets_lost_date_once() {
        let mut opp = lead();
        opp.update_stage(Stage::Lost, date(2024, 1, 9), None);
        assert_eq!(opp.lost_date, Some(date(2024, 1, 9)));
        assert_eq!(opp.probability, 0);

        opp.update_stage(Stage::QuoteLost, date(2024, 2, 9), None);
        assert_eq!(opp.lost_date, Some(date(2024, 1, 9)));
    }

    #[test]
    fn test_advance_to_never_moves_backwards() {
        let mut opp = lead();
        opp.update_stage(Stage::Closing, date(2024, 1, 5), None);

        assert!(!opp.advance_to(Stage::Quote, date(2024, 1, 6), None));
        assert_eq!(opp.current_stage, Stage::Closing);

        assert!(opp.advance_to(Stage::Won, date(2024, 1, 7), None));
        assert_eq!(opp.won_date, Some(date(2024, 1, 7)));
    }

    #[test]
    fn test_weighted_truncates() {
        assert_eq!(weighted(999, 50), 499);
        assert_eq!(weighted(0, 90), 0);
        assert_eq!(weighted(1_000_000, 100), 1_000_000);
        assert_eq!(weighted(i64::MAX, 100), i64::MAX);
        assert_eq!(weighted(i64::MAX, 50), i64::MAX / 2);
    }

    #[test]
    fn test_visited() {
        let mut opp = lead();
        opp.update_stage(Stage::Quote, date(2024, 1, 5), None);
        assert!(opp.visited(Stage::Lead));
        assert!(opp.visited(Stage::Quote));
        assert!(!opp.visited(Stage::Contact));
    }
}
