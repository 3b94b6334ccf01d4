//! Funnel data repairs.
//!
//! These bring stored opportunities back in line with the engine's rules
//! after imports, manual edits or bugs. Operations that take `dry_run` run
//! in a rolled-back transaction and report what they would have done.

use std::collections::HashMap;

use chrono::Datelike;
use serde::Serialize;
use tracing::{debug, info};

use super::{revenue, FunnelEngine};
use crate::error::Result;
use crate::model::{ActivityType, Opportunity, ScheduleStatus, Stage};
use crate::storage::{OpportunityFilter, Storage};

/// Outcome of [`FunnelEngine::repair_residue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Opportunities looked at.
    pub examined: usize,
    /// Opportunities whose revenue fields changed.
    pub fixed: usize,
    /// Opportunities deleted as invalid.
    pub deleted: Vec<i64>,
}

/// Outcome of [`FunnelEngine::cleanup_year`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Year cleaned.
    pub year: i32,
    /// Won opportunities removed.
    pub won: Vec<i64>,
    /// Quote-lost opportunities removed.
    pub quote_lost: Vec<i64>,
    /// Nothing was kept.
    pub dry_run: bool,
}

/// Outcome of [`FunnelEngine::backfill`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Schedules linked to an opportunity.
    pub linked: usize,
    /// Opportunities created for them.
    pub created: usize,
    /// Nothing was kept.
    pub dry_run: bool,
}

impl FunnelEngine<'_> {
    /// Delete opportunities that cannot be right and recompute the rest.
    ///
    /// Won or closing opportunities with neither a quote nor a delivery
    /// schedule go, as do won ones that only ever had quotes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn repair_residue(&self) -> Result<RepairReport> {
        let now = self.clock().now();

        self.storage().transaction(|s| {
            let mut report = RepairReport::default();
            for mut opp in s.list_opportunities(&OpportunityFilter::default())? {
                report.examined += 1;
                let schedules = s.schedules_for_opportunity(opp.id)?;
                let has_delivery = schedules
                    .iter()
                    .any(|sc| sc.activity_type == ActivityType::Delivery);
                let has_quote = schedules
                    .iter()
                    .any(|sc| sc.activity_type == ActivityType::Quote);

                let invalid = match opp.current_stage {
                    Stage::Won => !has_delivery,
                    Stage::Closing => !has_delivery && !has_quote,
                    _ => false,
                };
                if invalid {
                    s.delete_opportunity(opp.id)?;
                    info!(
                        "Deleted opportunity {} at {} without delivery{}",
                        opp.id,
                        opp.current_stage,
                        if has_quote { "" } else { " or quote" }
                    );
                    report.deleted.push(opp.id);
                    continue;
                }

                let before = revenue_fields(&opp);
                revenue::refresh(s, &mut opp, now)?;
                if revenue_fields(&opp) != before {
                    debug!("Recomputed revenue of opportunity {}", opp.id);
                    report.fixed += 1;
                }
            }
            info!(
                "Residue repair: {} examined, {} fixed, {} deleted",
                report.examined,
                report.fixed,
                report.deleted.len()
            );
            Ok(report)
        })
    }

    /// Remove one year's won and quote-lost opportunities.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cleanup_year(&self, year: i32, dry_run: bool) -> Result<CleanupReport> {
        let run = |s: &Storage| -> Result<CleanupReport> {
            let mut report = CleanupReport {
                year,
                dry_run,
                ..CleanupReport::default()
            };
            for opp in s.list_opportunities(&OpportunityFilter::default())? {
                let in_year = |d: Option<chrono::NaiveDate>| d.is_some_and(|d| d.year() == year);
                let bucket = match opp.current_stage {
                    Stage::Won if in_year(opp.won_date) => &mut report.won,
                    Stage::QuoteLost if in_year(opp.lost_date) => &mut report.quote_lost,
                    _ => continue,
                };
                s.delete_opportunity(opp.id)?;
                bucket.push(opp.id);
            }
            Ok(report)
        };

        let report = if dry_run {
            self.storage().rehearse(run)?
        } else {
            self.storage().transaction(run)?
        };
        info!(
            "{} cleanup{}: {} won, {} quote lost",
            year,
            if dry_run { " (dry run)" } else { "" },
            report.won.len(),
            report.quote_lost.len()
        );
        Ok(report)
    }

    /// Win every opportunity that has a completed delivery linked.
    ///
    /// `won_date` becomes the latest completed delivery's visit date.
    /// Returns the ids moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn sync_won(&self) -> Result<Vec<i64>> {
        let now = self.clock().now();
        let today = self.clock().today();

        self.storage().transaction(|s| {
            let mut moved = Vec::new();
            for mut opp in s.list_opportunities(&OpportunityFilter::default())? {
                if opp.current_stage == Stage::Won {
                    continue;
                }
                let completed = s
                    .schedules_for_opportunity(opp.id)?
                    .into_iter()
                    .filter(|sc| {
                        sc.activity_type == ActivityType::Delivery
                            && sc.status == ScheduleStatus::Completed
                    })
                    .max_by_key(|sc| sc.visit_date);
                let Some(latest) = completed else {
                    continue;
                };

                let from = opp.current_stage;
                opp.update_stage(
                    Stage::Won,
                    today,
                    Some(format!("delivery completed (schedule {})", latest.id)),
                );
                opp.won_date = Some(latest.visit_date);
                revenue::refresh(s, &mut opp, now)?;
                info!("Opportunity {}: {} -> won (sync)", opp.id, from);
                moved.push(opp.id);
            }
            Ok(moved)
        })
    }

    /// Link quote and delivery schedules that have no opportunity.
    ///
    /// Each joins its customer's latest opportunity. Customers without one
    /// get a new opportunity, at `quote` when the schedule is a quote and
    /// at `won` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn backfill(&self, dry_run: bool) -> Result<BackfillReport> {
        let now = self.clock().now();

        let run = |s: &Storage| -> Result<BackfillReport> {
            let mut report = BackfillReport {
                dry_run,
                ..BackfillReport::default()
            };
            let mut touched: HashMap<i64, Opportunity> = HashMap::new();

            for schedule in s.unlinked_pipeline_schedules()? {
                let mut opp = match s.latest_opportunity(schedule.customer_id)? {
                    Some(opp) => touched.remove(&opp.id).unwrap_or(opp),
                    None => {
                        let stage = if schedule.activity_type == ActivityType::Quote {
                            Stage::Quote
                        } else {
                            Stage::Won
                        };
                        let title = format!(
                            "{} - {}",
                            schedule.activity_type.label(),
                            schedule.visit_date.format("%m/%d")
                        );
                        let mut opp = Opportunity::start(
                            schedule.customer_id,
                            Some(title),
                            stage,
                            schedule.visit_date,
                            now,
                        );
                        opp.id = s.insert_opportunity(&opp)?;
                        report.created += 1;
                        opp
                    }
                };

                s.link_schedule(schedule.id, opp.id)?;
                if schedule.activity_type == ActivityType::Quote {
                    opp.total_quotes_sent += 1;
                }
                if opp.expected_revenue == 0 {
                    if let Some(amount) = schedule.expected_revenue {
                        opp.expected_revenue = amount;
                    }
                }
                report.linked += 1;
                debug!("Linked schedule {} to opportunity {}", schedule.id, opp.id);
                touched.insert(opp.id, opp);
            }

            for opp in touched.values_mut() {
                revenue::refresh(s, opp, now)?;
            }
            Ok(report)
        };

        let report = if dry_run {
            self.storage().rehearse(run)?
        } else {
            self.storage().transaction(run)?
        };
        info!(
            "Backfill{}: {} schedules linked, {} opportunities created",
            if dry_run { " (dry run)" } else { "" },
            report.linked,
            report.created
        );
        Ok(report)
    }

    /// Run [`update_revenue_amounts`](Self::update_revenue_amounts) over
    /// every opportunity. Returns how many were recomputed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recompute_all(&self) -> Result<usize> {
        let now = self.clock().now();
        self.storage().transaction(|s| {
            let mut count = 0;
            for mut opp in s.list_opportunities(&OpportunityFilter::default())? {
                revenue::refresh(s, &mut opp, now)?;
                count += 1;
            }
            info!("Recomputed revenue for {} opportunities", count);
            Ok(count)
        })
    }
}

fn revenue_fields(opp: &Opportunity) -> (i64, i64, i64, Option<i64>) {
    (
        opp.expected_revenue,
        opp.weighted_revenue,
        opp.backlog_amount,
        opp.actual_revenue,
    )
}
