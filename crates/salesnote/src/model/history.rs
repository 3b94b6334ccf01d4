//! The append-only activity log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::validate;
use crate::error::{Error, Result};

/// Kind of logged activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A meeting took place.
    CustomerMeeting,
    /// A delivery was made.
    DeliverySchedule,
    /// Service work.
    Service,
    /// A note.
    Memo,
}

impl ActionType {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerMeeting => "customer_meeting",
            Self::DeliverySchedule => "delivery_schedule",
            Self::Service => "service",
            Self::Memo => "memo",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customer_meeting" => Ok(Self::CustomerMeeting),
            "delivery_schedule" => Ok(Self::DeliverySchedule),
            "service" => Ok(Self::Service),
            "memo" => Ok(Self::Memo),
            other => Err(Error::invalid_value("action type", other)),
        }
    }
}

/// Progress of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Logged.
    Received,
    /// Being worked on.
    InProgress,
    /// Dropped.
    Cancelled,
    /// Finished.
    Completed,
}

impl ServiceStatus {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::InProgress => "in_progress",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "received" => Ok(Self::Received),
            "in_progress" => Ok(Self::InProgress),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(Error::invalid_value("service status", other)),
        }
    }
}

/// An activity log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Identifier.
    pub id: i64,
    /// Salesperson the entry belongs to.
    pub owner: String,
    /// Customer concerned.
    pub customer_id: Option<i64>,
    /// Schedule the entry reports on.
    pub schedule_id: Option<i64>,
    /// Entry this one replies to.
    pub parent_id: Option<i64>,
    /// Kind of activity.
    pub action_type: ActionType,
    /// Service progress, for service entries.
    pub service_status: Option<ServiceStatus>,
    /// Free text.
    pub content: Option<String>,
    /// Delivered amount in won.
    pub delivery_amount: Option<i64>,
    /// Legacy free-text list of delivered items.
    pub delivery_items_text: Option<String>,
    /// Day of delivery.
    pub delivery_date: Option<NaiveDate>,
    /// Day of the meeting.
    pub meeting_date: Option<NaiveDate>,
    /// Whether a tax invoice was issued.
    pub tax_invoice_issued: bool,
    /// Author, when different from the owner.
    pub created_by: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl History {
    /// A memo written in reply to another entry.
    #[must_use]
    pub fn is_reply_memo(&self) -> bool {
        self.parent_id.is_some() && self.action_type == ActionType::Memo
    }

    /// A reply memo left by someone other than the owner.
    #[must_use]
    pub fn is_manager_memo(&self) -> bool {
        self.is_reply_memo()
            && self
                .created_by
                .as_deref()
                .is_some_and(|author| author != self.owner)
    }

    /// Who wrote the entry.
    #[must_use]
    pub fn memo_author(&self) -> &str {
        if self.is_manager_memo() {
            if let Some(author) = self.created_by.as_deref() {
                return author;
            }
        }
        &self.owner
    }
}

/// Input for recording a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHistory {
    /// Salesperson.
    pub owner: String,
    /// Customer concerned.
    pub customer_id: Option<i64>,
    /// Schedule reported on.
    pub schedule_id: Option<i64>,
    /// Entry replied to.
    pub parent_id: Option<i64>,
    /// Kind of activity.
    pub action_type: ActionType,
    /// Service progress.
    pub service_status: Option<ServiceStatus>,
    /// Free text.
    pub content: Option<String>,
    /// Delivered amount.
    pub delivery_amount: Option<i64>,
    /// Legacy item list.
    pub delivery_items_text: Option<String>,
    /// Day of delivery.
    pub delivery_date: Option<NaiveDate>,
    /// Day of the meeting.
    pub meeting_date: Option<NaiveDate>,
    /// Tax invoice issued.
    pub tax_invoice_issued: bool,
    /// Author.
    pub created_by: Option<String>,
}

impl NewHistory {
    /// An entry of `action_type` with everything else empty.
    #[must_use]
    pub fn new(owner: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            owner: owner.into(),
            customer_id: None,
            schedule_id: None,
            parent_id: None,
            action_type,
            service_status: None,
            content: None,
            delivery_amount: None,
            delivery_items_text: None,
            delivery_date: None,
            meeting_date: None,
            tax_invoice_issued: false,
            created_by: None,
        }
    }

    /// Check the entry before it is written.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank owner, a negative delivery
    /// amount, or a service status on a non-service entry.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(Error::validation("owner cannot be empty"));
        }
        validate::amount("delivery amount", self.delivery_amount)?;
        if self.service_status.is_some() && self.action_type != ActionType::Service {
            return Err(Error::validation(
                "service status only applies to service entries",
            ));
        }
        Ok(())
    }
}
