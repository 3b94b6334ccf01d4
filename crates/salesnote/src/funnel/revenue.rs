//! Revenue and backlog aggregation over delivery schedules.
//!
//! An opportunity's delivered (`actual_revenue`) and pending
//! (`backlog_amount`) values are derived from the delivery schedules linked
//! to it. A schedule's amount comes from the first non-zero of:
//!
//! 1. its own delivery items,
//! 2. items attached to history entries of the schedule,
//! 3. `delivery_amount` of its delivery history entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::FunnelEngine;
use crate::error::Result;
use crate::model::{
    sum_amounts, ActionType, ActivityType, DeliveryItem, Opportunity, Schedule, ScheduleStatus,
};
use crate::storage::Storage;

/// Amount contributed by one delivery schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleAmount {
    /// Schedule.
    pub schedule_id: i64,
    /// Schedule status.
    pub status: ScheduleStatus,
    /// VAT-inclusive amount.
    pub amount: i64,
}

/// Totals over an opportunity's delivery schedules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevenueTotals {
    /// Completed deliveries.
    pub actual: i64,
    /// Scheduled deliveries.
    pub backlog: i64,
    /// Non-cancelled delivery schedules seen.
    pub delivery_schedules: usize,
}

impl RevenueTotals {
    /// Sum schedule amounts. Cancelled schedules count nowhere.
    #[must_use]
    pub fn from_amounts(amounts: &[ScheduleAmount]) -> Self {
        amounts.iter().fold(Self::default(), |mut totals, a| {
            match a.status {
                ScheduleStatus::Completed => {
                    totals.actual = totals.actual.saturating_add(a.amount);
                    totals.delivery_schedules += 1;
                }
                ScheduleStatus::Scheduled => {
                    totals.backlog = totals.backlog.saturating_add(a.amount);
                    totals.delivery_schedules += 1;
                }
                ScheduleStatus::Cancelled => {}
            }
            totals
        })
    }

    /// Write the totals onto `opp`.
    ///
    /// `actual_revenue` is only touched when at least one delivery schedule
    /// exists, so a value recorded from a history entry survives.
    pub fn apply(&self, opp: &mut Opportunity) {
        opp.backlog_amount = self.backlog;
        if self.delivery_schedules > 0 {
            opp.actual_revenue = (self.actual > 0).then_some(self.actual);
        }
        if opp.expected_revenue == 0 {
            opp.expected_revenue = self.actual.saturating_add(self.backlog);
        }
        opp.recompute_weighted();
    }
}

/// Amount of one delivery schedule.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn schedule_amount(storage: &Storage, schedule: &Schedule) -> Result<i64> {
    let direct = sum_amounts(
        storage
            .items_for_schedule(schedule.id)?
            .iter()
            .map(DeliveryItem::line_total),
    );
    if direct > 0 {
        return Ok(direct);
    }

    let via_histories = sum_amounts(
        storage
            .items_for_schedule_histories(schedule.id)?
            .iter()
            .map(DeliveryItem::line_total),
    );
    if via_histories > 0 {
        return Ok(via_histories);
    }

    Ok(sum_amounts(
        storage
            .histories_for_schedule(schedule.id)?
            .iter()
            .filter(|h| h.action_type == ActionType::DeliverySchedule)
            .filter_map(|h| h.delivery_amount),
    ))
}

/// Amounts of every delivery schedule linked to an opportunity.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn schedule_amounts(storage: &Storage, opportunity_id: i64) -> Result<Vec<ScheduleAmount>> {
    storage
        .schedules_for_opportunity(opportunity_id)?
        .iter()
        .filter(|s| s.activity_type == ActivityType::Delivery)
        .map(|s| {
            Ok(ScheduleAmount {
                schedule_id: s.id,
                status: s.status,
                amount: schedule_amount(storage, s)?,
            })
        })
        .collect()
}

/// Recompute `opp`'s revenue fields from storage and save it.
pub(crate) fn refresh(storage: &Storage, opp: &mut Opportunity, now: DateTime<Utc>) -> Result<()> {
    let totals = RevenueTotals::from_amounts(&schedule_amounts(storage, opp.id)?);
    totals.apply(opp);
    opp.updated_at = now;
    storage.save_opportunity(opp)?;
    debug!(
        "Opportunity {}: actual={} backlog={} expected={} weighted={}",
        opp.id, totals.actual, totals.backlog, opp.expected_revenue, opp.weighted_revenue
    );
    Ok(())
}

impl FunnelEngine<'_> {
    /// Recompute an opportunity's backlog, actual, expected and weighted
    /// revenue from its delivery schedules.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown opportunity.
    pub fn update_revenue_amounts(&self, opportunity_id: i64) -> Result<Opportunity> {
        let storage = self.storage();
        let now = self.clock().now();
        storage.transaction(|s| {
            let mut opp = s.require_opportunity(opportunity_id)?;
            refresh(s, &mut opp, now)?;
            Ok(opp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::engine::test_support::*;
    use crate::model::{NewDeliveryItem, NewHistory, Stage};
    use crate::storage::test_support::*;

    fn amount(status: ScheduleStatus, amount: i64) -> ScheduleAmount {
        ScheduleAmount {
            schedule_id: 1,
            status,
            amount,
        }
    }

    #[test]
    fn test_totals_split_by_status() {
        let totals = RevenueTotals::from_amounts(&[
            amount(ScheduleStatus::Completed, 1_100),
            amount(ScheduleStatus::Scheduled, 2_200),
            amount(ScheduleStatus::Cancelled, 9_900),
            amount(ScheduleStatus::Completed, 330),
        ]);
        assert_eq!(totals.actual, 1_430);
        assert_eq!(totals.backlog, 2_200);
        assert_eq!(totals.delivery_schedules, 3);
    }

    #[test]
    fn test_apply_fills_expected_and_weighted() {
        let mut opp = Opportunity::start(1, None, Stage::Closing, date(2024, 1, 1), ts(2024, 1, 1));
        RevenueTotals {
            actual: 0,
            backlog: 1_000_000,
            delivery_schedules: 1,
        }
        .apply(&mut opp);

        assert_eq!(opp.backlog_amount, 1_000_000);
        assert_eq!(opp.expected_revenue, 1_000_000);
        assert_eq!(opp.weighted_revenue, 900_000);
        assert_eq!(opp.actual_revenue, None);
    }

    #[test]
    fn test_apply_keeps_history_actual_without_schedules() {
        let mut opp = Opportunity::start(1, None, Stage::Won, date(2024, 1, 1), ts(2024, 1, 1));
        opp.expected_revenue = 500;
        opp.actual_revenue = Some(700);

        RevenueTotals::default().apply(&mut opp);

        assert_eq!(opp.actual_revenue, Some(700));
        assert_eq!(opp.expected_revenue, 500);
        assert_eq!(opp.backlog_amount, 0);
    }

    #[test]
    fn test_schedule_amount_prefers_own_items() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let schedule = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 1)))
            .unwrap();
        engine
            .add_delivery_item(&NewDeliveryItem::for_schedule(schedule.id, "Pipette", 2, Some(50_000)))
            .unwrap();

        assert_eq!(schedule_amount(&storage, &schedule).unwrap(), 110_000);
    }

    #[test]
    fn test_schedule_amount_falls_back_to_history_amount() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        let schedule = storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 1)),
                ts(2024, 3, 1),
            )
            .unwrap();

        let mut history = NewHistory::new("kim", ActionType::DeliverySchedule);
        history.schedule_id = Some(schedule.id);
        history.delivery_amount = Some(330_000);
        storage.insert_history(&history, ts(2024, 3, 1)).unwrap();

        assert_eq!(schedule_amount(&storage, &schedule).unwrap(), 330_000);
    }

    #[test]
    fn test_schedule_amount_uses_history_items() {
        let storage = create_test_storage();
        let customer = create_customer(&storage, "kim", "Lee");
        let schedule = storage
            .insert_schedule(
                &new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 1)),
                ts(2024, 3, 1),
            )
            .unwrap();
        let mut history = NewHistory::new("kim", ActionType::DeliverySchedule);
        history.schedule_id = Some(schedule.id);
        history.delivery_amount = Some(1);
        let history = storage.insert_history(&history, ts(2024, 3, 1)).unwrap();
        storage
            .insert_delivery_item(
                &NewDeliveryItem::for_history(history.id, "Beaker", 10, Some(1_000)),
                ts(2024, 3, 1),
            )
            .unwrap();

        assert_eq!(schedule_amount(&storage, &schedule).unwrap(), 11_000);
    }

    #[test]
    fn test_update_revenue_amounts_backlog_then_actual() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let first = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 1)))
            .unwrap();
        engine
            .add_delivery_item(&NewDeliveryItem::for_schedule(first.id, "Pump", 1, Some(1_000_000)))
            .unwrap();
        let opp_id = first.opportunity_id.unwrap();

        let opp = engine.update_revenue_amounts(opp_id).unwrap();
        assert_eq!(opp.backlog_amount, 1_100_000);
        assert_eq!(opp.actual_revenue, None);

        let mut completed = storage.require_schedule(first.id).unwrap();
        completed.status = ScheduleStatus::Completed;
        storage.save_schedule(&completed).unwrap();

        let opp = engine.update_revenue_amounts(opp_id).unwrap();
        assert_eq!(opp.backlog_amount, 0);
        assert_eq!(opp.actual_revenue, Some(1_100_000));
    }

    #[test]
    fn test_update_revenue_amounts_unknown() {
        let storage = create_test_storage();
        let err = engine(&storage).update_revenue_amounts(42).unwrap_err();
        assert!(err.is_not_found());
    }
}
