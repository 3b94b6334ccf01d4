//! Calendar entries for sales activities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;
use super::validate;
use crate::error::{Error, Result};

/// What a schedule is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    /// Customer visit or call.
    #[default]
    CustomerMeeting,
    /// Sending a quote.
    Quote,
    /// Delivering goods.
    Delivery,
    /// After-sales service. Never part of the funnel.
    Service,
}

impl ActivityType {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerMeeting => "customer_meeting",
            Self::Quote => "quote",
            Self::Delivery => "delivery",
            Self::Service => "service",
        }
    }

    /// Display label, also used for generated opportunity titles.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::CustomerMeeting => "고객 미팅",
            Self::Quote => "견적",
            Self::Delivery => "납품 일정",
            Self::Service => "서비스",
        }
    }

    /// Whether schedules of this type drive opportunities.
    #[must_use]
    pub fn is_funnel_activity(&self) -> bool {
        !matches!(self, Self::Service)
    }

    /// Stage implied by an activity in the given status.
    ///
    /// Returns `None` for service work.
    #[must_use]
    pub fn implied_stage(&self, status: ScheduleStatus) -> Option<Stage> {
        match (self, status) {
            (Self::CustomerMeeting, _) => Some(Stage::Lead),
            (Self::Quote, _) => Some(Stage::Quote),
            (Self::Delivery, ScheduleStatus::Completed) => Some(Stage::Won),
            (Self::Delivery, _) => Some(Stage::Closing),
            (Self::Service, _) => None,
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customer_meeting" => Ok(Self::CustomerMeeting),
            "quote" => Ok(Self::Quote),
            "delivery" => Ok(Self::Delivery),
            "service" => Ok(Self::Service),
            other => Err(Error::invalid_value("activity type", other)),
        }
    }
}

/// Lifecycle of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Planned.
    #[default]
    Scheduled,
    /// Done.
    Completed,
    /// Called off.
    Cancelled,
}

impl ScheduleStatus {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::invalid_value("schedule status", other)),
        }
    }
}

/// A calendar entry for a sales activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Identifier.
    pub id: i64,
    /// Salesperson.
    pub owner: String,
    /// Customer visited.
    pub customer_id: i64,
    /// Linked opportunity.
    pub opportunity_id: Option<i64>,
    /// Day of the activity.
    pub visit_date: NaiveDate,
    /// Time of the activity.
    pub visit_time: NaiveTime,
    /// Where it happens.
    pub location: Option<String>,
    /// Lifecycle state.
    pub status: ScheduleStatus,
    /// Kind of activity.
    pub activity_type: ActivityType,
    /// Notes.
    pub notes: Option<String>,
    /// Expected revenue entered on the schedule.
    pub expected_revenue: Option<i64>,
    /// Win probability entered on the schedule.
    pub probability: Option<u8>,
    /// Expected close date entered on the schedule.
    pub expected_close_date: Option<NaiveDate>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether this schedule takes part in funnel transitions.
    #[must_use]
    pub fn in_funnel(&self) -> bool {
        self.activity_type.is_funnel_activity() && self.opportunity_id.is_some()
    }
}

/// Input for creating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSchedule {
    /// Salesperson.
    pub owner: String,
    /// Customer visited.
    pub customer_id: i64,
    /// Attach to this opportunity instead of picking one.
    pub opportunity_id: Option<i64>,
    /// Day of the activity.
    pub visit_date: NaiveDate,
    /// Time of the activity.
    pub visit_time: NaiveTime,
    /// Where it happens.
    pub location: Option<String>,
    /// Initial state.
    pub status: ScheduleStatus,
    /// Kind of activity.
    pub activity_type: ActivityType,
    /// Notes.
    pub notes: Option<String>,
    /// Expected revenue.
    pub expected_revenue: Option<i64>,
    /// Win probability.
    pub probability: Option<u8>,
    /// Expected close date.
    pub expected_close_date: Option<NaiveDate>,
}

impl NewSchedule {
    /// A scheduled activity with no optional fields.
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        customer_id: i64,
        activity_type: ActivityType,
        visit_date: NaiveDate,
        visit_time: NaiveTime,
    ) -> Self {
        Self {
            owner: owner.into(),
            customer_id,
            opportunity_id: None,
            visit_date,
            visit_time,
            location: None,
            status: ScheduleStatus::Scheduled,
            activity_type,
            notes: None,
            expected_revenue: None,
            probability: None,
            expected_close_date: None,
        }
    }

    /// Check amounts and percentages.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank owner, an out-of-range revenue
    /// or probability, or a service schedule naming an opportunity.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(Error::validation("owner cannot be empty"));
        }
        if self.activity_type == ActivityType::Service && self.opportunity_id.is_some() {
            return Err(Error::validation(
                "service schedules cannot be linked to an opportunity",
            ));
        }
        validate::amount("expected revenue", self.expected_revenue)?;
        validate::probability(self.probability)
    }
}

/// A partial update of a schedule. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleChanges {
    /// New status.
    pub status: Option<ScheduleStatus>,
    /// New day.
    pub visit_date: Option<NaiveDate>,
    /// New time.
    pub visit_time: Option<NaiveTime>,
    /// New location.
    pub location: Option<String>,
    /// New notes.
    pub notes: Option<String>,
    /// New expected revenue.
    pub expected_revenue: Option<i64>,
    /// New probability.
    pub probability: Option<u8>,
    /// New expected close date.
    pub expected_close_date: Option<NaiveDate>,
}

impl ScheduleChanges {
    /// Check amounts and percentages.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an out-of-range revenue or probability.
    pub fn validate(&self) -> Result<()> {
        validate::amount("expected revenue", self.expected_revenue)?;
        validate::probability(self.probability)
    }

    /// Apply the changes to a copy of `schedule`.
    #[must_use]
    pub fn apply(&self, schedule: &Schedule, now: DateTime<Utc>) -> Schedule {
        let mut updated = schedule.clone();
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(date) = self.visit_date {
            updated.visit_date = date;
        }
        if let Some(time) = self.visit_time {
            updated.visit_time = time;
        }
        if let Some(location) = &self.location {
            updated.location = Some(location.clone());
        }
        if let Some(notes) = &self.notes {
            updated.notes = Some(notes.clone());
        }
        if self.expected_revenue.is_some() {
            updated.expected_revenue = self.expected_revenue;
        }
        if self.probability.is_some() {
            updated.probability = self.probability;
        }
        if self.expected_close_date.is_some() {
            updated.expected_close_date = self.expected_close_date;
        }
        updated.updated_at = now;
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schedule() -> Schedule {
        Schedule {
            id: 7,
            owner: "kim".into(),
            customer_id: 1,
            opportunity_id: Some(3),
            visit_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            visit_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            location: None,
            status: ScheduleStatus::Scheduled,
            activity_type: ActivityType::Quote,
            notes: None,
            expected_revenue: Some(1_000),
            probability: None,
            expected_close_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_implied_stage() {
        use ScheduleStatus::*;
        assert_eq!(ActivityType::CustomerMeeting.implied_stage(Scheduled), Some(Stage::Lead));
        assert_eq!(ActivityType::Quote.implied_stage(Completed), Some(Stage::Quote));
        assert_eq!(ActivityType::Delivery.implied_stage(Scheduled), Some(Stage::Closing));
        assert_eq!(ActivityType::Delivery.implied_stage(Completed), Some(Stage::Won));
        assert_eq!(ActivityType::Service.implied_stage(Completed), None);
    }

    #[test]
    fn test_service_not_in_funnel() {
        let mut schedule = sample_schedule();
        assert!(schedule.in_funnel());
        schedule.activity_type = ActivityType::Service;
        assert!(!schedule.in_funnel());
        schedule.activity_type = ActivityType::Quote;
        schedule.opportunity_id = None;
        assert!(!schedule.in_funnel());
    }

    #[test]
    fn test_parse_activity_and_status() {
        assert_eq!("delivery".parse::<ActivityType>().unwrap(), ActivityType::Delivery);
        assert_eq!("cancelled".parse::<ScheduleStatus>().unwrap(), ScheduleStatus::Cancelled);
        assert!("visit".parse::<ActivityType>().is_err());
    }

    #[test]
    fn test_changes_apply_only_set_fields() {
        let schedule = sample_schedule();
        let changes = ScheduleChanges {
            status: Some(ScheduleStatus::Completed),
            probability: Some(70),
            ..Default::default()
        };

        let updated = changes.apply(&schedule, Utc::now());
        assert_eq!(updated.status, ScheduleStatus::Completed);
        assert_eq!(updated.probability, Some(70));
        assert_eq!(updated.expected_revenue, Some(1_000));
        assert_eq!(updated.visit_date, schedule.visit_date);
    }

    #[test]
    fn test_new_schedule_validation() {
        let mut new = NewSchedule::new(
            "kim",
            1,
            ActivityType::Quote,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        );
        assert!(new.validate().is_ok());

        new.probability = Some(120);
        assert!(new.validate().is_err());

        new.probability = None;
        new.expected_revenue = Some(-5);
        assert!(new.validate().is_err());

        new.expected_revenue = Some(validate::MAX_AMOUNT + 1);
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_service_schedule_cannot_name_opportunity() {
        let mut new = NewSchedule::new(
            "kim",
            1,
            ActivityType::Service,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        );
        assert!(new.validate().is_ok());

        new.opportunity_id = Some(3);
        assert!(new.validate().unwrap_err().is_validation());
    }
}
