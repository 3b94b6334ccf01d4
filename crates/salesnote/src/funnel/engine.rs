//! Stage-transition engine.
//!
//! Schedules and histories are written through the engine so the
//! opportunity they belong to follows along: a quote moves a deal to
//! `quote`, a completed delivery wins it, a cancelled quote loses it.
//! Each operation runs in a single transaction.

use tracing::{debug, info};

use super::{revenue, Clock};
use crate::config::FunnelConfig;
use crate::error::{Error, Result};
use crate::model::{
    opportunity, ActionType, ActivityType, DeliveryItem, History, NewDeliveryItem, NewHistory,
    NewSchedule, Opportunity, Schedule, ScheduleChanges, ScheduleStatus, Stage,
};
use crate::storage::{OpportunityFilter, Storage};

/// Probability used when neither the schedule nor the opportunity has one.
const FALLBACK_PROBABILITY: u8 = 50;

/// Drives opportunities from schedule and history changes.
#[derive(Debug)]
pub struct FunnelEngine<'a> {
    storage: &'a Storage,
    clock: Clock,
    config: FunnelConfig,
}

impl<'a> FunnelEngine<'a> {
    /// Engine over `storage` with the system clock and default settings.
    #[must_use]
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            clock: Clock::System,
            config: FunnelConfig::default(),
        }
    }

    /// Use `clock` for "now" and "today".
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Use the given funnel settings.
    #[must_use]
    pub fn with_config(mut self, config: &FunnelConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Underlying storage.
    #[must_use]
    pub fn storage(&self) -> &'a Storage {
        self.storage
    }

    /// Engine clock.
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Funnel settings.
    #[must_use]
    pub fn config(&self) -> &FunnelConfig {
        &self.config
    }

    /// Create a schedule and attach it to an opportunity.
    ///
    /// Service schedules are stored as given and never join an opportunity.
    /// Other schedules join the requested opportunity, which must belong to
    /// the same customer, else the customer's latest open one, else a
    /// new one started at the stage the activity implies. An existing
    /// opportunity only ever moves forward.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input and `NotFound` for unknown
    /// customer or opportunity references.
    pub fn create_schedule(&self, new: &NewSchedule) -> Result<Schedule> {
        let now = self.clock.now();
        let today = self.clock.today();

        self.storage.transaction(|s| {
            let mut schedule = s.insert_schedule(new, now)?;
            let Some(implied) = schedule.activity_type.implied_stage(schedule.status) else {
                debug!("Schedule {} is outside the funnel", schedule.id);
                return Ok(schedule);
            };

            let existing = match schedule.opportunity_id {
                Some(id) => {
                    let opp = s.require_opportunity(id)?;
                    if opp.customer_id != schedule.customer_id {
                        return Err(Error::validation(format!(
                            "opportunity {} belongs to customer {}, not {}",
                            opp.id, opp.customer_id, schedule.customer_id
                        )));
                    }
                    Some(opp)
                }
                None => s.latest_open_opportunity(schedule.customer_id)?,
            };
            let mut opp = match existing {
                Some(mut opp) => {
                    let from = opp.current_stage;
                    let note = format!("{} added (schedule {})", schedule.activity_type, schedule.id);
                    if opp.is_open() && opp.advance_to(implied, today, Some(note)) {
                        info!(
                            "Opportunity {}: {} -> {} (schedule {})",
                            opp.id, from, implied, schedule.id
                        );
                    }
                    opp
                }
                None => {
                    let title = format!(
                        "{} - {}",
                        schedule.activity_type.label(),
                        schedule.visit_date.format("%m/%d")
                    );
                    Opportunity::start(schedule.customer_id, Some(title), implied, today, now)
                }
            };

            match schedule.activity_type {
                ActivityType::CustomerMeeting => opp.total_meetings += 1,
                ActivityType::Quote => opp.total_quotes_sent += 1,
                ActivityType::Delivery | ActivityType::Service => {}
            }
            if let Some(revenue) = schedule.expected_revenue {
                opp.expected_revenue = revenue;
            }
            if let Some(probability) = schedule.probability {
                opp.probability = probability;
            }
            if let Some(close) = schedule.expected_close_date {
                opp.expected_close_date = Some(close);
            }
            opp.recompute_weighted();

            if opp.id == 0 {
                opp.id = s.insert_opportunity(&opp)?;
                info!(
                    "Opportunity {} started at {} for customer {} (schedule {})",
                    opp.id, opp.current_stage, opp.customer_id, schedule.id
                );
            }
            if schedule.opportunity_id != Some(opp.id) {
                s.link_schedule(schedule.id, opp.id)?;
                schedule.opportunity_id = Some(opp.id);
            }

            revenue::refresh(s, &mut opp, now)?;
            Ok(schedule)
        })
    }

    /// Apply `changes` to a schedule and move its opportunity accordingly.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input and `NotFound` for an
    /// unknown schedule.
    pub fn update_schedule(&self, id: i64, changes: &ScheduleChanges) -> Result<Schedule> {
        changes.validate()?;
        let now = self.clock.now();
        let today = self.clock.today();

        self.storage.transaction(|s| {
            let before = s.require_schedule(id)?;
            let after = changes.apply(&before, now);
            s.save_schedule(&after)?;

            let Some(opportunity_id) = after.opportunity_id.filter(|_| after.in_funnel()) else {
                return Ok(after);
            };
            let mut opp = s.require_opportunity(opportunity_id)?;

            // Totals first so the explicit weighting below is what gets saved.
            let totals =
                revenue::RevenueTotals::from_amounts(&revenue::schedule_amounts(s, opp.id)?);
            totals.apply(&mut opp);

            if after.expected_revenue != before.expected_revenue {
                if let Some(amount) = after.expected_revenue.filter(|a| *a > 0) {
                    let probability = after
                        .probability
                        .filter(|p| *p > 0)
                        .or(Some(opp.probability).filter(|p| *p > 0))
                        .unwrap_or(FALLBACK_PROBABILITY);
                    opp.expected_revenue = amount;
                    opp.weighted_revenue = opportunity::weighted(amount, probability);
                }
            }
            if after.probability != before.probability {
                if let Some(probability) = after.probability {
                    opp.probability = probability;
                    if opp.expected_revenue != 0 {
                        opp.recompute_weighted();
                    }
                }
            }
            if after.expected_close_date != before.expected_close_date {
                if let Some(close) = after.expected_close_date {
                    opp.expected_close_date = Some(close);
                }
            }

            let newly = |status: ScheduleStatus| after.status == status && before.status != status;
            let from = opp.current_stage;
            if after.activity_type == ActivityType::Delivery && newly(ScheduleStatus::Completed) {
                opp.update_stage(
                    Stage::Won,
                    today,
                    Some(format!("delivery completed (schedule {})", after.id)),
                );
            } else if after.activity_type == ActivityType::CustomerMeeting
                && before.status == ScheduleStatus::Scheduled
                && after.status == ScheduleStatus::Completed
                && opp.current_stage == Stage::Lead
            {
                opp.update_stage(
                    Stage::Contact,
                    today,
                    Some(format!("meeting completed (schedule {})", after.id)),
                );
            } else if after.activity_type == ActivityType::Quote
                && newly(ScheduleStatus::Cancelled)
                && opp.is_open()
            {
                opp.update_stage(
                    Stage::Lost,
                    today,
                    Some(format!("quote cancelled (schedule {})", after.id)),
                );
                opp.lost_reason = Some("quote cancelled".to_string());
            }
            if opp.current_stage != from {
                info!(
                    "Opportunity {}: {} -> {} (schedule {})",
                    opp.id, from, opp.current_stage, after.id
                );
            }

            opp.updated_at = now;
            s.save_opportunity(&opp)?;
            Ok(after)
        })
    }

    /// Delete a schedule. Its opportunity goes too when nothing else
    /// references it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown schedule.
    pub fn delete_schedule(&self, id: i64) -> Result<()> {
        let now = self.clock.now();

        self.storage.transaction(|s| {
            let schedule = s.require_schedule(id)?;
            s.delete_schedule_row(id)?;
            debug!("Deleted schedule {}", id);

            let Some(opportunity_id) = schedule.opportunity_id.filter(|_| schedule.in_funnel())
            else {
                return Ok(());
            };
            if s.count_schedules_for_opportunity(opportunity_id)? == 0 {
                s.delete_opportunity(opportunity_id)?;
                info!(
                    "Deleted opportunity {} with its last schedule {}",
                    opportunity_id, id
                );
            } else if let Some(mut opp) = s.get_opportunity(opportunity_id)? {
                revenue::refresh(s, &mut opp, now)?;
            }
            Ok(())
        })
    }

    /// Append a history entry.
    ///
    /// A delivery entry wins every open opportunity of its customer.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input and `NotFound` for unknown
    /// references.
    pub fn record_history(&self, new: &NewHistory) -> Result<History> {
        let now = self.clock.now();
        let today = self.clock.today();

        self.storage.transaction(|s| {
            let history = s.insert_history(new, now)?;

            if let (ActionType::DeliverySchedule, Some(customer_id)) =
                (history.action_type, history.customer_id)
            {
                let open = s.list_opportunities(&OpportunityFilter {
                    customer_id: Some(customer_id),
                    open_only: true,
                    ..OpportunityFilter::default()
                })?;
                for mut opp in open {
                    let from = opp.current_stage;
                    opp.update_stage(
                        Stage::Won,
                        today,
                        Some(format!("delivery recorded (history {})", history.id)),
                    );
                    if let Some(amount) = history.delivery_amount.filter(|a| *a > 0) {
                        opp.actual_revenue = Some(amount);
                    }
                    opp.won_date = Some(
                        history
                            .delivery_date
                            .unwrap_or_else(|| history.created_at.date_naive()),
                    );
                    opp.updated_at = now;
                    s.save_opportunity(&opp)?;
                    info!(
                        "Opportunity {}: {} -> won (history {})",
                        opp.id, from, history.id
                    );
                }
            }

            if let Some(schedule_id) = history.schedule_id {
                self.refresh_through_schedule(s, schedule_id)?;
            }
            Ok(history)
        })
    }

    /// Add a delivery item with its VAT-inclusive total.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input and `NotFound` for unknown
    /// schedule or history references.
    pub fn add_delivery_item(&self, new: &NewDeliveryItem) -> Result<DeliveryItem> {
        let now = self.clock.now();

        self.storage.transaction(|s| {
            let item = s.insert_delivery_item(new, now)?;

            let schedule_id = match (item.schedule_id, item.history_id) {
                (Some(schedule_id), _) => Some(schedule_id),
                (None, Some(history_id)) => s
                    .get_history(history_id)?
                    .and_then(|history| history.schedule_id),
                (None, None) => None,
            };
            if let Some(schedule_id) = schedule_id {
                self.refresh_through_schedule(s, schedule_id)?;
            }
            Ok(item)
        })
    }

    /// Move an opportunity to `stage` by hand.
    ///
    /// `lost_reason` is recorded only for lost stages.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown opportunity.
    pub fn set_stage(
        &self,
        opportunity_id: i64,
        stage: Stage,
        note: Option<String>,
        lost_reason: Option<String>,
    ) -> Result<Opportunity> {
        let now = self.clock.now();
        let today = self.clock.today();

        self.storage.transaction(|s| {
            let mut opp = s.require_opportunity(opportunity_id)?;
            let from = opp.current_stage;
            if !opp.update_stage(stage, today, note) {
                debug!("Opportunity {} already at {}", opp.id, stage);
                return Ok(opp);
            }
            if stage.is_lost() {
                opp.lost_reason = lost_reason;
            }
            opp.updated_at = now;
            s.save_opportunity(&opp)?;
            info!("Opportunity {}: {} -> {} (manual)", opp.id, from, stage);
            Ok(opp)
        })
    }

    fn refresh_through_schedule(&self, s: &Storage, schedule_id: i64) -> Result<()> {
        let schedule = s
            .get_schedule(schedule_id)?
            .ok_or_else(|| Error::not_found("schedule", schedule_id))?;
        if let Some(mut opp) = schedule
            .opportunity_id
            .map(|id| s.get_opportunity(id))
            .transpose()?
            .flatten()
        {
            revenue::refresh(s, &mut opp, self.clock.now())?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::engine;
    use super::*;
    use crate::model::validate::MAX_AMOUNT;
    use crate::storage::test_support::*;

    fn today() -> chrono::NaiveDate {
        date(2024, 3, 15)
    }

    fn assert_single_open_entry(opp: &Opportunity) {
        let open: Vec<_> = opp.stage_history.iter().filter(|e| e.is_open()).collect();
        assert_eq!(open.len(), 1, "history: {:?}", opp.stage_history);
        assert_eq!(open[0].stage, opp.current_stage);
    }

    #[test]
    fn test_meeting_starts_lead_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let schedule = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::CustomerMeeting, date(2024, 3, 14)))
            .unwrap();

        let opp = storage.require_opportunity(schedule.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Lead);
        assert_eq!(opp.title.as_deref(), Some("고객 미팅 - 03/14"));
        assert_eq!(opp.total_meetings, 1);
        assert_eq!(opp.stage_entry_date, today());
        assert_single_open_entry(&opp);
    }

    #[test]
    fn test_service_schedule_stays_outside_funnel() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let schedule = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Service, date(2024, 3, 14)))
            .unwrap();

        assert_eq!(schedule.opportunity_id, None);
        assert_eq!(storage.stats().unwrap().opportunities, 0);
    }

    #[test]
    fn test_quote_advances_existing_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let meeting = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::CustomerMeeting, date(2024, 3, 1)))
            .unwrap();
        let mut quote = new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 10));
        quote.expected_revenue = Some(2_000_000);
        let quote = engine.create_schedule(&quote).unwrap();

        assert_eq!(quote.opportunity_id, meeting.opportunity_id);
        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Quote);
        assert_eq!(opp.total_meetings, 1);
        assert_eq!(opp.total_quotes_sent, 1);
        assert_eq!(opp.expected_revenue, 2_000_000);
        assert_eq!(opp.weighted_revenue, 1_000_000);
        assert_single_open_entry(&opp);
    }

    #[test]
    fn test_meeting_never_moves_opportunity_backwards() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();
        let meeting = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::CustomerMeeting, date(2024, 3, 2)))
            .unwrap();

        let opp = storage.require_opportunity(meeting.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Quote);
        assert_eq!(opp.stage_history.len(), 1);
    }

    #[test]
    fn test_completed_delivery_starts_won() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let mut new = new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 1));
        new.status = ScheduleStatus::Completed;
        let schedule = engine.create_schedule(&new).unwrap();

        let opp = storage.require_opportunity(schedule.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Won);
        assert_eq!(opp.won_date, Some(today()));
    }

    #[test]
    fn test_won_opportunity_gets_a_new_one() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let mut done = new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 1));
        done.status = ScheduleStatus::Completed;
        let done = engine.create_schedule(&done).unwrap();
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 5)))
            .unwrap();

        assert_ne!(done.opportunity_id, quote.opportunity_id);
    }

    #[test]
    fn test_create_schedule_with_unknown_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let mut new = new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1));
        new.opportunity_id = Some(77);
        assert!(engine.create_schedule(&new).is_err());
        assert!(storage
            .list_schedules(&crate::storage::ScheduleFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_create_schedule_rejects_other_customers_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let lee = create_customer(&storage, "kim", "Lee");
        let park = create_customer(&storage, "kim", "Park");
        let quote = engine
            .create_schedule(&new_schedule(lee.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();

        let mut delivery = new_schedule(park.id, ActivityType::Delivery, date(2024, 3, 5));
        delivery.opportunity_id = quote.opportunity_id;
        let err = engine.create_schedule(&delivery).unwrap_err();
        assert!(err.is_validation());

        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Quote);
        assert!(storage
            .list_schedules(&crate::storage::ScheduleFilter {
                customer_id: Some(park.id),
                ..Default::default()
            })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_service_schedule_cannot_join_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();
        let opp_id = quote.opportunity_id.unwrap();

        let mut service = new_schedule(customer.id, ActivityType::Service, date(2024, 3, 2));
        service.opportunity_id = Some(opp_id);
        assert!(engine.create_schedule(&service).unwrap_err().is_validation());
        assert_eq!(storage.count_schedules_for_opportunity(opp_id).unwrap(), 1);

        engine.delete_schedule(quote.id).unwrap();
        assert!(storage.get_opportunity(opp_id).unwrap().is_none());
    }

    #[test]
    fn test_create_schedule_revenue_limits() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");

        let mut quote = new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1));
        quote.expected_revenue = Some(1_000_000_000_000_000_000);
        assert!(engine.create_schedule(&quote).unwrap_err().is_validation());
        assert_eq!(storage.stats().unwrap().schedules, 0);
        assert_eq!(storage.stats().unwrap().opportunities, 0);

        quote.expected_revenue = Some(MAX_AMOUNT);
        let quote = engine.create_schedule(&quote).unwrap();
        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.expected_revenue, MAX_AMOUNT);
        assert_eq!(opp.weighted_revenue, 499_999_999_999_999);
    }

    #[test]
    fn test_add_delivery_item_rejects_oversized_line() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let delivery = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 20)))
            .unwrap();

        let err = engine
            .add_delivery_item(&NewDeliveryItem::for_schedule(
                delivery.id,
                "Big",
                10_000,
                Some(MAX_AMOUNT),
            ))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(storage.items_for_schedule(delivery.id).unwrap().is_empty());

        let opp = storage.require_opportunity(delivery.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.backlog_amount, 0);
    }

    #[test]
    fn test_completing_delivery_wins() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let delivery = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 20)))
            .unwrap();

        engine
            .update_schedule(
                delivery.id,
                &ScheduleChanges {
                    status: Some(ScheduleStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        let opp = storage.require_opportunity(delivery.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Won);
        assert_eq!(opp.probability, 100);
        let entry = opp.open_entry().unwrap();
        assert_eq!(
            entry.note.as_deref(),
            Some(format!("delivery completed (schedule {})", delivery.id).as_str())
        );
        assert_single_open_entry(&opp);
    }

    #[test]
    fn test_completing_meeting_moves_lead_to_contact_only() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let meeting = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::CustomerMeeting, date(2024, 3, 14)))
            .unwrap();
        let complete = ScheduleChanges {
            status: Some(ScheduleStatus::Completed),
            ..Default::default()
        };

        engine.update_schedule(meeting.id, &complete).unwrap();
        let opp = storage.require_opportunity(meeting.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Contact);

        // A second meeting at a later stage changes nothing.
        engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 15)))
            .unwrap();
        let second = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::CustomerMeeting, date(2024, 3, 16)))
            .unwrap();
        engine.update_schedule(second.id, &complete).unwrap();
        let opp = storage.require_opportunity(second.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Quote);
    }

    #[test]
    fn test_cancelling_quote_loses() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 14)))
            .unwrap();

        engine
            .update_schedule(
                quote.id,
                &ScheduleChanges {
                    status: Some(ScheduleStatus::Cancelled),
                    ..Default::default()
                },
            )
            .unwrap();

        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Lost);
        assert_eq!(opp.lost_reason.as_deref(), Some("quote cancelled"));
        assert_eq!(opp.lost_date, Some(today()));
    }

    #[test]
    fn test_revenue_change_uses_schedule_probability() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let mut quote = new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 14));
        quote.probability = Some(70);
        let quote = engine.create_schedule(&quote).unwrap();

        engine
            .update_schedule(
                quote.id,
                &ScheduleChanges {
                    expected_revenue: Some(1_000_000),
                    ..Default::default()
                },
            )
            .unwrap();

        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.expected_revenue, 1_000_000);
        assert_eq!(opp.weighted_revenue, 700_000);
    }

    #[test]
    fn test_probability_change_recomputes_weighted() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let mut quote = new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 14));
        quote.expected_revenue = Some(400_000);
        quote.expected_close_date = Some(date(2024, 4, 30));
        let quote = engine.create_schedule(&quote).unwrap();

        engine
            .update_schedule(
                quote.id,
                &ScheduleChanges {
                    probability: Some(25),
                    expected_close_date: Some(date(2024, 5, 31)),
                    ..Default::default()
                },
            )
            .unwrap();

        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.probability, 25);
        assert_eq!(opp.weighted_revenue, 100_000);
        assert_eq!(opp.expected_close_date, Some(date(2024, 5, 31)));
    }

    #[test]
    fn test_update_schedule_rejects_bad_probability() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 14)))
            .unwrap();

        let err = engine
            .update_schedule(
                quote.id,
                &ScheduleChanges {
                    probability: Some(120),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_deleting_last_schedule_deletes_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 14)))
            .unwrap();
        let opp_id = quote.opportunity_id.unwrap();

        engine.delete_schedule(quote.id).unwrap();

        assert!(storage.get_schedule(quote.id).unwrap().is_none());
        assert!(storage.get_opportunity(opp_id).unwrap().is_none());
    }

    #[test]
    fn test_deleting_one_of_two_schedules_keeps_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 14)))
            .unwrap();
        let delivery = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 20)))
            .unwrap();
        engine
            .add_delivery_item(&NewDeliveryItem::for_schedule(delivery.id, "Oven", 1, Some(100_000)))
            .unwrap();

        engine.delete_schedule(delivery.id).unwrap();

        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.backlog_amount, 0);
    }

    #[test]
    fn test_delete_unknown_schedule() {
        let storage = create_test_storage();
        assert!(engine(&storage).delete_schedule(3).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delivery_history_wins_open_opportunities() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();
        let lost = engine
            .set_stage(quote.opportunity_id.unwrap(), Stage::Lost, None, Some("budget".into()))
            .unwrap();
        let open = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 2)))
            .unwrap();

        let mut history = NewHistory::new("kim", ActionType::DeliverySchedule);
        history.customer_id = Some(customer.id);
        history.delivery_amount = Some(5_500_000);
        history.delivery_date = Some(date(2024, 3, 12));
        engine.record_history(&history).unwrap();

        let won = storage.require_opportunity(open.opportunity_id.unwrap()).unwrap();
        assert_eq!(won.current_stage, Stage::Won);
        assert_eq!(won.actual_revenue, Some(5_500_000));
        assert_eq!(won.won_date, Some(date(2024, 3, 12)));

        let untouched = storage.require_opportunity(lost.id).unwrap();
        assert_eq!(untouched.current_stage, Stage::Lost);
        assert_eq!(untouched.lost_reason.as_deref(), Some("budget"));
    }

    #[test]
    fn test_delivery_history_leaves_quote_lost_alone() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();
        let opp_id = quote.opportunity_id.unwrap();
        engine
            .set_stage(opp_id, Stage::QuoteLost, None, Some("price".into()))
            .unwrap();

        let mut history = NewHistory::new("kim", ActionType::DeliverySchedule);
        history.customer_id = Some(customer.id);
        history.delivery_amount = Some(1_100_000);
        engine.record_history(&history).unwrap();

        let opp = storage.require_opportunity(opp_id).unwrap();
        assert_eq!(opp.current_stage, Stage::QuoteLost);
        assert_eq!(opp.actual_revenue, None);
        assert_eq!(opp.won_date, None);
        assert_eq!(opp.lost_reason.as_deref(), Some("price"));
    }

    #[test]
    fn test_memo_history_changes_nothing() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();

        let mut memo = NewHistory::new("kim", ActionType::Memo);
        memo.customer_id = Some(customer.id);
        engine.record_history(&memo).unwrap();

        let opp = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.current_stage, Stage::Quote);
    }

    #[test]
    fn test_history_item_refreshes_schedule_opportunity() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let delivery = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Delivery, date(2024, 3, 20)))
            .unwrap();
        let mut note = NewHistory::new("kim", ActionType::CustomerMeeting);
        note.customer_id = Some(customer.id);
        note.schedule_id = Some(delivery.id);
        let note = engine.record_history(&note).unwrap();

        let item = engine
            .add_delivery_item(&NewDeliveryItem::for_history(note.id, "Flask", 3, Some(10_000)))
            .unwrap();
        assert_eq!(item.total_price, Some(33_000));

        let opp = storage.require_opportunity(delivery.opportunity_id.unwrap()).unwrap();
        assert_eq!(opp.backlog_amount, 33_000);
        assert_eq!(opp.expected_revenue, 33_000);
    }

    #[test]
    fn test_set_stage_same_stage_is_noop() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();
        let before = storage.require_opportunity(quote.opportunity_id.unwrap()).unwrap();

        let after = engine.set_stage(before.id, Stage::Quote, None, None).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn test_set_stage_ignores_reason_for_open_stage() {
        let storage = create_test_storage();
        let engine = engine(&storage);
        let customer = create_customer(&storage, "kim", "Lee");
        let quote = engine
            .create_schedule(&new_schedule(customer.id, ActivityType::Quote, date(2024, 3, 1)))
            .unwrap();

        let opp = engine
            .set_stage(
                quote.opportunity_id.unwrap(),
                Stage::Closing,
                Some("PO expected".into()),
                Some("ignored".into()),
            )
            .unwrap();
        assert_eq!(opp.current_stage, Stage::Closing);
        assert_eq!(opp.probability, 90);
        assert_eq!(opp.lost_reason, None);
        assert_single_open_entry(&opp);
    }
}
