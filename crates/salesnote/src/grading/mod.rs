//! Customer grading.
//!
//! Grades come from a rule-based score over purchase history, recent
//! engagement and the open pipeline ([`rules`]), or from an external text
//! generator fed the same activity ([`ai`]). Both produce a
//! [`GradeResult`].

pub mod ai;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::config::GradingConfig;
use crate::funnel::Clock;
use crate::model::Grade;
use crate::storage::Storage;

pub use ai::{build_grade_prompt, parse_grade_response, CommandGenerator, TextGenerator};
pub use rules::{collect_activity, score_activity, CustomerActivity, GradeChange, OpenDeal, RegradeReport};

/// Sub-scores behind a grade, each 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeFactors {
    /// Meetings and quotes.
    pub engagement: u8,
    /// Likelihood of the next purchase.
    pub purchase_potential: u8,
    /// Depth of the purchase history.
    pub relationship: u8,
    /// How recently the customer was reached.
    pub responsiveness: u8,
}

/// A computed grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Letter grade.
    pub grade: Grade,
    /// Score, 0..=100.
    pub score: u8,
    /// Explanation.
    pub reasoning: String,
    /// Sub-scores.
    pub factors: GradeFactors,
    /// Suggested next steps.
    pub recommendations: Vec<String>,
}

impl GradeResult {
    /// Never grade a paying customer below C.
    pub fn apply_purchase_floor(&mut self, has_purchases: bool) {
        if has_purchases && self.grade > Grade::C {
            self.grade = Grade::C;
        }
    }
}

/// Grades customers against stored activity.
#[derive(Debug)]
pub struct Grader<'a> {
    storage: &'a Storage,
    clock: Clock,
    config: GradingConfig,
}

impl<'a> Grader<'a> {
    /// Grader over `storage` with the system clock and default settings.
    #[must_use]
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            clock: Clock::System,
            config: GradingConfig::default(),
        }
    }

    /// Use `clock` for "now".
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Use the given grading settings.
    #[must_use]
    pub fn with_config(mut self, config: &GradingConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub(crate) fn storage(&self) -> &'a Storage {
        self.storage
    }

    pub(crate) fn clock(&self) -> Clock {
        self.clock
    }

    pub(crate) fn config(&self) -> &GradingConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use super::Grader;
    use crate::funnel::Clock;
    use crate::storage::Storage;

    /// Grader frozen at 2024-03-15 09:00 UTC.
    pub fn grader(storage: &Storage) -> Grader<'_> {
        Grader::new(storage).with_clock(Clock::Fixed(
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(grade: Grade) -> GradeResult {
        GradeResult {
            grade,
            score: 10,
            reasoning: String::new(),
            factors: GradeFactors::default(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn test_purchase_floor_lifts_d_to_c() {
        let mut r = result(Grade::D);
        r.apply_purchase_floor(true);
        assert_eq!(r.grade, Grade::C);
    }

    #[test]
    fn test_purchase_floor_keeps_better_grades() {
        let mut r = result(Grade::A);
        r.apply_purchase_floor(true);
        assert_eq!(r.grade, Grade::A);

        let mut r = result(Grade::D);
        r.apply_purchase_floor(false);
        assert_eq!(r.grade, Grade::D);
    }

    #[test]
    fn test_grade_result_json_uses_letter() {
        let json = serde_json::to_value(result(Grade::APlus)).unwrap();
        assert_eq!(json["grade"], "A+");
    }
}
