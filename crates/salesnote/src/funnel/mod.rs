//! Sales funnel: stage transitions driven by schedules and histories,
//! revenue aggregation, maintenance repairs, pipeline analytics and the
//! quote workflow.
//!
//! Every mutating entry point lives on [`FunnelEngine`], which wraps a
//! [`Storage`](crate::storage::Storage) and a [`Clock`]. Analytics,
//! maintenance and quotes are further `impl FunnelEngine` blocks in the
//! submodules.

pub mod analytics;
pub(crate) mod engine;
pub mod maintenance;
mod quotes;
pub mod revenue;

use chrono::{DateTime, NaiveDate, Utc};

pub use analytics::{
    Bottleneck, ConversionRate, MonthForecast, PipelineSummary, Severity, StageSummary,
    WonLostSummary,
};
pub use engine::FunnelEngine;
pub use maintenance::{BackfillReport, CleanupReport, RepairReport};
pub use revenue::{RevenueTotals, ScheduleAmount};

/// Source of "now" for the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    /// Wall-clock time.
    #[default]
    System,
    /// A frozen instant.
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Current instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }

    /// Current calendar day (UTC).
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock() {
        let at = Utc.with_ymd_and_hms(2024, 3, 14, 23, 30, 0).unwrap();
        let clock = Clock::Fixed(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }

    #[test]
    fn test_system_clock_is_default() {
        assert_eq!(Clock::default(), Clock::System);
        let before = Utc::now();
        assert!(Clock::System.now() >= before);
    }
}
