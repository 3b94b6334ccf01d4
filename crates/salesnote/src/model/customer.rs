//! Companies, departments and customers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validate;
use crate::error::{Error, Result};

/// A customer organisation (university, institute, company).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Identifier.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A department or lab inside a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Identifier.
    pub id: i64,
    /// Parent company.
    pub company_id: i64,
    /// Name, unique within the company.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Follow-up state of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    /// Being worked on.
    #[default]
    Active,
    /// Done.
    Completed,
    /// On hold.
    Paused,
}

impl CustomerStatus {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CustomerStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "paused" => Ok(Self::Paused),
            other => Err(Error::invalid_value("customer status", other)),
        }
    }
}

/// Follow-up horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Within a month.
    OneMonth,
    /// Within three months.
    ThreeMonths,
    /// No deadline.
    #[default]
    LongTerm,
}

impl Priority {
    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMonth => "one_month",
            Self::ThreeMonths => "three_months",
            Self::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one_month" => Ok(Self::OneMonth),
            "three_months" => Ok(Self::ThreeMonths),
            "long_term" => Ok(Self::LongTerm),
            other => Err(Error::invalid_value("priority", other)),
        }
    }
}

/// Customer grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// Score 90 and above.
    #[serde(rename = "A+")]
    APlus,
    /// Score 80 to 89.
    A,
    /// Score 60 to 79.
    B,
    /// Score 40 to 59.
    C,
    /// Below 40.
    D,
}

impl Grade {
    /// Map a 0..=100 score onto a grade.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::APlus,
            80..=89 => Self::A,
            60..=79 => Self::B,
            40..=59 => Self::C,
            _ => Self::D,
        }
    }

    /// Storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" => Ok(Self::APlus),
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(Error::invalid_value("grade", s)),
        }
    }
}

/// A customer contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Identifier.
    pub id: i64,
    /// Salesperson owning the record.
    pub owner: String,
    /// Contact person.
    pub customer_name: Option<String>,
    /// Company.
    pub company_id: i64,
    /// Department within the company.
    pub department_id: i64,
    /// Responsible manager on the customer side.
    pub manager: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// E-mail address.
    pub email: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Follow-up state.
    pub status: CustomerStatus,
    /// Follow-up horizon.
    pub priority: Priority,
    /// Last computed grade.
    pub grade: Option<Grade>,
    /// Score behind `grade`.
    pub grade_score: Option<u8>,
    /// Explanation of `grade`.
    pub grade_reasoning: Option<String>,
    /// When `grade` was computed.
    pub grade_updated_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Name to show in reports.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.customer_name
            .as_deref()
            .or(self.manager.as_deref())
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| format!("customer #{}", self.id), str::to_string)
    }
}

/// Input for creating a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    /// Salesperson owning the record.
    pub owner: String,
    /// Contact person.
    pub customer_name: Option<String>,
    /// Company.
    pub company_id: i64,
    /// Department within the company.
    pub department_id: i64,
    /// Responsible manager.
    pub manager: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// E-mail address.
    pub email: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Notes.
    pub notes: Option<String>,
    /// Follow-up state.
    pub status: CustomerStatus,
    /// Follow-up horizon.
    pub priority: Priority,
}

impl NewCustomer {
    /// Check field formats.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank owner or malformed contact fields.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(Error::validation("owner cannot be empty"));
        }
        validate::optional_email(self.email.as_deref())?;
        validate::optional_phone(self.phone.as_deref())?;
        Ok(())
    }
}
