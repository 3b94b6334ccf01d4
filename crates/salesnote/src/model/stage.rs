//! Funnel stages and stage history entries.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A stage of the sales funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First touch, nothing confirmed yet.
    Lead,
    /// A meeting has taken place.
    Contact,
    /// A quote has been sent.
    Quote,
    /// Delivery is scheduled, the deal is being closed.
    Closing,
    /// Delivered.
    Won,
    /// Lost after the fact.
    Lost,
    /// The quote was rejected.
    QuoteLost,
}

/// Static display and forecasting data for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    /// The stage this row describes.
    pub stage: Stage,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Position in the funnel.
    pub order: u8,
    /// Probability assigned on entering the stage.
    pub default_probability: u8,
    /// Expected average dwell time, in days.
    pub avg_duration_days: u32,
    /// Hex colour used by reports.
    pub color: &'static str,
}

const STAGE_TABLE: [StageInfo; 7] = [
    StageInfo {
        stage: Stage::Lead,
        display_name: "리드",
        order: 1,
        default_probability: 10,
        avg_duration_days: 7,
        color: "#94a3b8",
    },
    StageInfo {
        stage: Stage::Contact,
        display_name: "컨택",
        order: 2,
        default_probability: 30,
        avg_duration_days: 7,
        color: "#60a5fa",
    },
    StageInfo {
        stage: Stage::Quote,
        display_name: "견적",
        order: 3,
        default_probability: 50,
        avg_duration_days: 10,
        color: "#a78bfa",
    },
    StageInfo {
        stage: Stage::Closing,
        display_name: "클로징",
        order: 4,
        default_probability: 90,
        avg_duration_days: 7,
        color: "#f59e0b",
    },
    StageInfo {
        stage: Stage::Won,
        display_name: "수주",
        order: 5,
        default_probability: 100,
        avg_duration_days: 0,
        color: "#10b981",
    },
    StageInfo {
        stage: Stage::Lost,
        display_name: "실주",
        order: 6,
        default_probability: 0,
        avg_duration_days: 0,
        color: "#ef4444",
    },
    StageInfo {
        stage: Stage::QuoteLost,
        display_name: "견적실패",
        order: 7,
        default_probability: 0,
        avg_duration_days: 0,
        color: "#f87171",
    },
];

impl Stage {
    /// Every stage in funnel order.
    pub const ALL: [Stage; 7] = [
        Stage::Lead,
        Stage::Contact,
        Stage::Quote,
        Stage::Closing,
        Stage::Won,
        Stage::Lost,
        Stage::QuoteLost,
    ];

    /// Stages an opportunity can still move forward from.
    pub const OPEN: [Stage; 4] = [Stage::Lead, Stage::Contact, Stage::Quote, Stage::Closing];

    /// The storage/wire name of the stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Quote => "quote",
            Self::Closing => "closing",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::QuoteLost => "quote_lost",
        }
    }

    /// Static table row for this stage.
    #[must_use]
    pub fn info(&self) -> &'static StageInfo {
        let idx = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        &STAGE_TABLE[idx]
    }

    /// Probability assigned when an opportunity enters this stage.
    #[must_use]
    pub fn default_probability(&self) -> u8 {
        self.info().default_probability
    }

    /// Whether the deal is decided (won, lost or quote lost).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::QuoteLost)
    }

    /// Whether this stage counts as lost.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost | Self::QuoteLost)
    }

    /// Position used for forward-only advancement.
    ///
    /// Lost stages share the rank of `Won` so that nothing advances out of them.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Lead => 0,
            Self::Contact => 1,
            Self::Quote => 2,
            Self::Closing => 3,
            Self::Won | Self::Lost | Self::QuoteLost => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(Self::Lead),
            "contact" => Ok(Self::Contact),
            "quote" => Ok(Self::Quote),
            // negotiation was folded into closing
            "closing" | "negotiation" => Ok(Self::Closing),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            "quote_lost" => Ok(Self::QuoteLost),
            other => Err(Error::invalid_value("stage", other)),
        }
    }
}

/// One visit of an opportunity to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    /// The stage visited.
    #[serde(deserialize_with = "deserialize_stage")]
    pub stage: Stage,
    /// Day the stage was entered.
    pub entered: NaiveDate,
    /// Day the stage was left, `None` while current.
    #[serde(default)]
    pub exited: Option<NaiveDate>,
    /// Free-form reason for the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StageEntry {
    /// Open a new entry for `stage` on `entered`.
    #[must_use]
    pub fn open(stage: Stage, entered: NaiveDate, note: Option<String>) -> Self {
        Self {
            stage,
            entered,
            exited: None,
            note,
        }
    }

    /// Whether this entry is still current.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.exited.is_none()
    }

    /// Days spent in the stage, measuring open entries up to `today`.
    #[must_use]
    pub fn dwell_days(&self, today: NaiveDate) -> i64 {
        let end = self.exited.unwrap_or(today);
        (end - self.entered).num_days().max(0)
    }
}

// Stored histories may still carry "negotiation".
fn deserialize_stage<'de, D>(deserializer: D) -> Result<Stage, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_probabilities() {
        assert_eq!(Stage::Lead.default_probability(), 10);
        assert_eq!(Stage::Contact.default_probability(), 30);
        assert_eq!(Stage::Quote.default_probability(), 50);
        assert_eq!(Stage::Closing.default_probability(), 90);
        assert_eq!(Stage::Won.default_probability(), 100);
        assert_eq!(Stage::Lost.default_probability(), 0);
        assert_eq!(Stage::QuoteLost.default_probability(), 0);
    }

    #[test]
    fn test_stage_table_matches_order() {
        for (idx, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.info().stage, *stage);
            assert_eq!(usize::from(stage.info().order), idx + 1);
        }
    }

    #[test]
    fn test_is_closed() {
        assert!(!Stage::Lead.is_closed());
        assert!(!Stage::Closing.is_closed());
        assert!(Stage::Won.is_closed());
        assert!(Stage::Lost.is_closed());
        assert!(Stage::QuoteLost.is_closed());
        assert!(Stage::QuoteLost.is_lost());
        assert!(!Stage::Won.is_lost());
    }

    #[test]
    fn test_rank_is_forward_only() {
        assert!(Stage::Lead.rank() < Stage::Contact.rank());
        assert!(Stage::Quote.rank() < Stage::Closing.rank());
        assert!(Stage::Closing.rank() < Stage::Won.rank());
        assert_eq!(Stage::Lost.rank(), Stage::Won.rank());
    }

    #[test]
    fn test_parse_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_parse_legacy_negotiation() {
        assert_eq!("negotiation".parse::<Stage>().unwrap(), Stage::Closing);
    }

    #[test]
    fn test_parse_unknown_stage() {
        let err = "pending".parse::<Stage>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_stage_entry_json_shape() {
        let entry = StageEntry::open(Stage::Quote, date(2024, 3, 1), None);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"stage":"quote","entered":"2024-03-01","exited":null}"#
        );
    }

    #[test]
    fn test_stage_entry_reads_legacy_stage() {
        let json = r#"{"stage":"negotiation","entered":"2024-03-01","exited":"2024-03-05","note":"x"}"#;
        let entry: StageEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.stage, Stage::Closing);
        assert_eq!(entry.exited, Some(date(2024, 3, 5)));
        assert!(!entry.is_open());
    }

    #[test]
    fn test_dwell_days() {
        let mut entry = StageEntry::open(Stage::Lead, date(2024, 1, 1), None);
        assert_eq!(entry.dwell_days(date(2024, 1, 11)), 10);

        entry.exited = Some(date(2024, 1, 4));
        assert_eq!(entry.dwell_days(date(2024, 1, 11)), 3);
    }
}
