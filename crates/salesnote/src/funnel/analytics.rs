//! Pipeline reports over stored opportunities.
//!
//! Every report takes an optional owner and then only counts that
//! salesperson's customers.

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use super::FunnelEngine;
use crate::error::Result;
use crate::model::{sum_amounts, Opportunity, Stage};
use crate::storage::OpportunityFilter;

/// Totals over open opportunities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    /// Open opportunities.
    pub count: usize,
    /// Σ expected revenue.
    pub expected_total: i64,
    /// Σ weighted revenue.
    pub weighted_total: i64,
    /// Mean probability, to one decimal.
    pub avg_probability: f64,
}

/// Totals for one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    /// Stage.
    pub stage: Stage,
    /// Display name.
    pub display_name: &'static str,
    /// Opportunities currently in the stage.
    pub count: usize,
    /// Σ expected revenue.
    pub expected_total: i64,
    /// Σ weighted revenue.
    pub weighted_total: i64,
    /// Mean probability, to one decimal.
    pub avg_probability: f64,
}

/// Expected closings in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthForecast {
    /// First day of the month.
    pub month: NaiveDate,
    /// Σ expected revenue.
    pub expected_total: i64,
    /// Σ weighted revenue.
    pub weighted_total: i64,
    /// Opportunities expected to close.
    pub count: usize,
}

/// Share of opportunities that went from one stage to the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRate {
    /// Earlier stage.
    pub from: Stage,
    /// Later stage.
    pub to: Stage,
    /// Opportunities that visited `from`.
    pub entered: usize,
    /// Of those, the ones that also visited `to`.
    pub converted: usize,
    /// `converted / entered` in percent, to one decimal.
    pub rate: f64,
}

/// How badly a stage is congested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Not a bottleneck.
    Low,
    /// A bottleneck.
    Medium,
    /// Deals stay more than twice as long as expected.
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Dwell-time analysis of one open stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bottleneck {
    /// Stage.
    pub stage: Stage,
    /// Opportunities currently in the stage.
    pub count: usize,
    /// Expected days in the stage.
    pub expected_days: u32,
    /// Observed mean days in the stage, to one decimal.
    pub actual_days: f64,
    /// Whether the stage is congested.
    pub is_bottleneck: bool,
    /// How badly.
    pub severity: Severity,
}

/// Closed deal counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WonLostSummary {
    /// Won opportunities.
    pub won: usize,
    /// Σ actual revenue of won opportunities.
    pub won_revenue: i64,
    /// Lost and quote-lost opportunities.
    pub lost: usize,
    /// `won / (won + lost)` in percent, to one decimal.
    pub win_rate: f64,
}

/// Stage pairs measured by [`FunnelEngine::conversion_rates`].
const CONVERSION_PATH: [Stage; 5] = [
    Stage::Lead,
    Stage::Contact,
    Stage::Quote,
    Stage::Closing,
    Stage::Won,
];

impl FunnelEngine<'_> {
    fn opportunities(&self, owner: Option<&str>) -> Result<Vec<Opportunity>> {
        self.storage()
            .list_opportunities(&OpportunityFilter::for_owner(owner))
    }

    /// Count and value of open opportunities.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn pipeline_summary(&self, owner: Option<&str>) -> Result<PipelineSummary> {
        let open: Vec<_> = self
            .opportunities(owner)?
            .into_iter()
            .filter(Opportunity::is_open)
            .collect();
        Ok(PipelineSummary {
            count: open.len(),
            expected_total: sum_amounts(open.iter().map(|o| o.expected_revenue)),
            weighted_total: sum_amounts(open.iter().map(|o| o.weighted_revenue)),
            avg_probability: mean_probability(&open),
        })
    }

    /// Totals for every stage, in funnel order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stage_breakdown(&self, owner: Option<&str>) -> Result<Vec<StageSummary>> {
        let opps = self.opportunities(owner)?;
        Ok(Stage::ALL
            .iter()
            .map(|&stage| {
                let in_stage: Vec<_> = opps
                    .iter()
                    .filter(|o| o.current_stage == stage)
                    .cloned()
                    .collect();
                StageSummary {
                    stage,
                    display_name: stage.info().display_name,
                    count: in_stage.len(),
                    expected_total: sum_amounts(in_stage.iter().map(|o| o.expected_revenue)),
                    weighted_total: sum_amounts(in_stage.iter().map(|o| o.weighted_revenue)),
                    avg_probability: mean_probability(&in_stage),
                }
            })
            .collect())
    }

    /// Expected closings per month, starting with the current month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn monthly_forecast(&self, owner: Option<&str>, months: u32) -> Result<Vec<MonthForecast>> {
        let opps = self.opportunities(owner)?;
        let today = self.clock().today();
        let Some(first) = today.with_day(1) else {
            return Ok(Vec::new());
        };

        Ok((0..months)
            .filter_map(|i| first.checked_add_months(Months::new(i)))
            .map(|month| {
                let closing: Vec<_> = opps
                    .iter()
                    .filter(|o| !o.current_stage.is_lost())
                    .filter(|o| {
                        o.expected_close_date.is_some_and(|d| {
                            d.year() == month.year() && d.month() == month.month()
                        })
                    })
                    .collect();
                MonthForecast {
                    month,
                    expected_total: sum_amounts(closing.iter().map(|o| o.expected_revenue)),
                    weighted_total: sum_amounts(closing.iter().map(|o| o.weighted_revenue)),
                    count: closing.len(),
                }
            })
            .collect())
    }

    /// Stage-to-stage conversion along lead → contact → quote → closing → won.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn conversion_rates(&self, owner: Option<&str>) -> Result<Vec<ConversionRate>> {
        let opps = self.opportunities(owner)?;
        Ok(CONVERSION_PATH
            .windows(2)
            .map(|pair| {
                let (from, to) = (pair[0], pair[1]);
                let entered: Vec<_> = opps.iter().filter(|o| o.visited(from)).collect();
                let converted = entered.iter().filter(|o| o.visited(to)).count();
                ConversionRate {
                    from,
                    to,
                    entered: entered.len(),
                    converted,
                    rate: percent(converted, entered.len()),
                }
            })
            .collect())
    }

    /// Dwell time per open stage, most crowded first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn bottlenecks(&self, owner: Option<&str>) -> Result<Vec<Bottleneck>> {
        let opps = self.opportunities(owner)?;
        let today = self.clock().today();
        let threshold = self.config().bottleneck_count_threshold;

        let mut report: Vec<_> = Stage::OPEN
            .iter()
            .map(|&stage| {
                let in_stage: Vec<_> = opps.iter().filter(|o| o.current_stage == stage).collect();
                let dwell: Vec<i64> = in_stage
                    .iter()
                    .flat_map(|o| o.stage_history.iter())
                    .filter(|e| e.stage == stage)
                    .map(|e| e.dwell_days(today))
                    .collect();
                #[allow(clippy::cast_precision_loss)]
                let actual = if dwell.is_empty() {
                    0.0
                } else {
                    dwell.iter().sum::<i64>() as f64 / dwell.len() as f64
                };

                let expected = stage.info().avg_duration_days;
                let is_bottleneck =
                    actual > f64::from(expected) * 1.5 || in_stage.len() > threshold;
                let severity = match (is_bottleneck, actual > f64::from(expected) * 2.0) {
                    (false, _) => Severity::Low,
                    (true, true) => Severity::High,
                    (true, false) => Severity::Medium,
                };
                Bottleneck {
                    stage,
                    count: in_stage.len(),
                    expected_days: expected,
                    actual_days: round1(actual),
                    is_bottleneck,
                    severity,
                }
            })
            .collect();
        report.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(report)
    }

    /// Highest weighted revenue first, lost deals excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn top_opportunities(&self, owner: Option<&str>, limit: usize) -> Result<Vec<Opportunity>> {
        let mut opps: Vec<_> = self
            .opportunities(owner)?
            .into_iter()
            .filter(|o| !o.current_stage.is_lost())
            .collect();
        opps.sort_by(|a, b| b.weighted_revenue.cmp(&a.weighted_revenue));
        opps.truncate(limit);
        Ok(opps)
    }

    /// Won and lost counts with the win rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn won_lost_summary(&self, owner: Option<&str>) -> Result<WonLostSummary> {
        let opps = self.opportunities(owner)?;
        let won: Vec<_> = opps
            .iter()
            .filter(|o| o.current_stage == Stage::Won)
            .collect();
        let lost = opps.iter().filter(|o| o.current_stage.is_lost()).count();
        Ok(WonLostSummary {
            won: won.len(),
            won_revenue: sum_amounts(won.iter().filter_map(|o| o.actual_revenue)),
            lost,
            win_rate: percent(won.len(), won.len() + lost),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_probability(opps: &[Opportunity]) -> f64 {
    if opps.is_empty() {
        return 0.0;
    }
    let total: u32 = opps.iter().map(|o| u32::from(o.probability)).sum();
    round1(f64::from(total) / opps.len() as f64)
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
