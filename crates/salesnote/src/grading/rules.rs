//! Rule-based grading.
//!
//! The score adds up to 100 from four parts and then loses points for a
//! customer nobody has contacted in a while:
//!
//! | part | max |
//! |---|---|
//! | purchase volume (all time) | 35 |
//! | recent purchases (activity window) | 20 |
//! | engagement: meetings and quotes in the window | 25 |
//! | most advanced open opportunity | 20 |

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use super::{GradeFactors, GradeResult, Grader};
use crate::error::Result;
use crate::model::{
    format_won, sum_amounts, ActivityType, Customer, Grade, ScheduleStatus, Stage,
};
use crate::storage::{OpportunityFilter, ScheduleFilter, Storage};

/// An open opportunity as seen by grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenDeal {
    /// Opportunity.
    pub id: i64,
    /// Title.
    pub title: Option<String>,
    /// Current stage.
    pub stage: Stage,
    /// Expected revenue.
    pub expected_revenue: i64,
    /// Probability.
    pub probability: u8,
}

/// What a customer has done, as input to grading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerActivity {
    /// Length of the "recent" window in days.
    pub window_days: u32,
    /// Meetings in the window.
    pub meetings: usize,
    /// Quotes in the window.
    pub quotes: usize,
    /// Distinct purchases, all time.
    pub purchases: usize,
    /// Distinct purchases in the window.
    pub recent_purchases: usize,
    /// Σ purchase totals, all time.
    pub total_purchase: i64,
    /// Σ purchase totals in the window.
    pub recent_purchase_total: i64,
    /// Latest visit that already happened.
    pub last_contact: Option<NaiveDate>,
    /// Deals still in play.
    pub open_opportunities: Vec<OpenDeal>,
}

impl CustomerActivity {
    /// Whether the customer ever bought anything.
    #[must_use]
    pub fn has_purchases(&self) -> bool {
        self.purchases > 0
    }

    /// Whether there is nothing to grade on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meetings == 0
            && self.quotes == 0
            && self.purchases == 0
            && self.last_contact.is_none()
            && self.open_opportunities.is_empty()
    }

    /// Days since the last contact.
    #[must_use]
    pub fn days_since_contact(&self, today: NaiveDate) -> Option<i64> {
        self.last_contact.map(|d| (today - d).num_days())
    }
}

/// A grade computed by [`Grader::regrade_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeChange {
    /// Customer.
    pub customer_id: i64,
    /// Customer display name.
    pub name: String,
    /// Grade before.
    pub previous: Option<Grade>,
    /// Grade now.
    pub grade: Grade,
    /// Score now.
    pub score: u8,
}

impl GradeChange {
    /// Whether the letter grade moved.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != Some(self.grade)
    }
}

/// Outcome of [`Grader::regrade_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegradeReport {
    /// Customers graded.
    pub graded: Vec<GradeChange>,
    /// Customers whose grade was still current.
    pub up_to_date: usize,
    /// Customers without any activity.
    pub inactive: usize,
    /// Nothing was stored.
    pub dry_run: bool,
}

/// Gather a customer's activity as of `today`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn collect_activity(
    storage: &Storage,
    customer_id: i64,
    today: NaiveDate,
    window_days: u32,
) -> Result<CustomerActivity> {
    let since = today - Duration::days(i64::from(window_days));
    let in_window = |d: NaiveDate| d >= since && d <= today;

    let schedules = storage.list_schedules(&ScheduleFilter {
        customer_id: Some(customer_id),
        ..ScheduleFilter::default()
    })?;
    let live: Vec<_> = schedules
        .iter()
        .filter(|s| s.status != ScheduleStatus::Cancelled)
        .collect();
    let count = |activity: ActivityType| {
        live.iter()
            .filter(|s| s.activity_type == activity && in_window(s.visit_date))
            .count()
    };

    let lines = storage.purchase_lines(customer_id)?;
    let events: HashSet<_> = lines.iter().map(|l| l.event).collect();
    let recent_events: HashSet<_> = lines
        .iter()
        .filter(|l| in_window(l.date))
        .map(|l| l.event)
        .collect();

    let open_opportunities = storage
        .list_opportunities(&OpportunityFilter {
            customer_id: Some(customer_id),
            open_only: true,
            ..OpportunityFilter::default()
        })?
        .into_iter()
        .map(|o| OpenDeal {
            id: o.id,
            title: o.title,
            stage: o.current_stage,
            expected_revenue: o.expected_revenue,
            probability: o.probability,
        })
        .collect();

    Ok(CustomerActivity {
        window_days,
        meetings: count(ActivityType::CustomerMeeting),
        quotes: count(ActivityType::Quote),
        purchases: events.len(),
        recent_purchases: recent_events.len(),
        total_purchase: sum_amounts(lines.iter().map(|l| l.total)),
        recent_purchase_total: sum_amounts(
            lines.iter().filter(|l| in_window(l.date)).map(|l| l.total),
        ),
        last_contact: live
            .iter()
            .map(|s| s.visit_date)
            .filter(|d| *d <= today)
            .max(),
        open_opportunities,
    })
}

fn volume_points(total: i64) -> u32 {
    match total {
        t if t >= 50_000_000 => 25,
        t if t >= 20_000_000 => 20,
        t if t >= 5_000_000 => 14,
        t if t >= 1_000_000 => 8,
        t if t > 0 => 4,
        _ => 0,
    }
}

fn recent_points(total: i64) -> u32 {
    match total {
        t if t >= 10_000_000 => 8,
        t if t >= 3_000_000 => 5,
        t if t > 0 => 2,
        _ => 0,
    }
}

fn stage_points(stage: Stage) -> u32 {
    match stage {
        Stage::Lead => 5,
        Stage::Contact => 8,
        Stage::Quote => 12,
        Stage::Closing => 20,
        Stage::Won | Stage::Lost | Stage::QuoteLost => 0,
    }
}

fn capped(count: usize, each: u32, cap: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).saturating_mul(each).min(cap)
}

fn percent_of(points: u32, max: u32) -> u8 {
    u8::try_from((points * 100 / max).min(100)).unwrap_or(100)
}

/// Score a customer's activity.
#[must_use]
pub fn score_activity(activity: &CustomerActivity, today: NaiveDate) -> GradeResult {
    let volume = volume_points(activity.total_purchase) + capped(activity.purchases, 2, 10);
    let recent = if activity.recent_purchases == 0 {
        0
    } else {
        capped(activity.recent_purchases, 4, 12) + recent_points(activity.recent_purchase_total)
    };
    let engagement = capped(activity.meetings, 4, 15) + capped(activity.quotes, 5, 10);
    let pipeline = activity
        .open_opportunities
        .iter()
        .map(|d| stage_points(d.stage))
        .max()
        .unwrap_or(0);

    let since_contact = activity.days_since_contact(today);
    let penalty = match since_contact {
        None => 10,
        Some(d) if d > 180 => 15,
        Some(d) if d > 90 => 5,
        Some(_) => 0,
    };
    let score = (volume + recent + engagement + pipeline)
        .saturating_sub(penalty)
        .min(100);
    let score = u8::try_from(score).unwrap_or(100);

    let factors = GradeFactors {
        engagement: percent_of(engagement, 25),
        purchase_potential: percent_of(recent + pipeline, 40),
        relationship: percent_of(volume, 35),
        responsiveness: match since_contact {
            None => 0,
            Some(d) if d <= 30 => 100,
            Some(d) if d <= 90 => 70,
            Some(d) if d <= 180 => 40,
            Some(_) => 10,
        },
    };

    let mut result = GradeResult {
        grade: Grade::from_score(score),
        score,
        reasoning: reasoning(activity, since_contact),
        factors,
        recommendations: recommendations(activity, since_contact),
    };
    result.apply_purchase_floor(activity.has_purchases());
    result
}

fn reasoning(activity: &CustomerActivity, since_contact: Option<i64>) -> String {
    let mut parts = Vec::new();
    if activity.has_purchases() {
        parts.push(format!(
            "{} purchases totalling {} won, {} in the last {} days",
            activity.purchases,
            format_won(activity.total_purchase),
            activity.recent_purchases,
            activity.window_days
        ));
    } else {
        parts.push("no purchases yet".to_string());
    }
    parts.push(format!(
        "{} meetings and {} quotes in the last {} days",
        activity.meetings, activity.quotes, activity.window_days
    ));
    if !activity.open_opportunities.is_empty() {
        parts.push(format!(
            "{} open opportunities",
            activity.open_opportunities.len()
        ));
    }
    parts.push(match since_contact {
        Some(days) => format!("last contact {days} days ago"),
        None => "never contacted".to_string(),
    });
    parts.join("; ")
}

fn recommendations(activity: &CustomerActivity, since_contact: Option<i64>) -> Vec<String> {
    let mut out = Vec::new();
    match since_contact {
        None if !activity.has_purchases() => {
            out.push("Qualify the customer with a first meeting".to_string());
        }
        None => out.push("Schedule a visit".to_string()),
        Some(days) if days > 90 => {
            out.push(format!("Schedule a visit; last contact was {days} days ago"));
        }
        Some(_) => {}
    }
    if activity
        .open_opportunities
        .iter()
        .any(|d| d.stage == Stage::Quote)
    {
        out.push("Follow up on the open quote".to_string());
    }
    if activity.has_purchases() && activity.recent_purchases == 0 {
        out.push("Check reorder timing with past buyers in the lab".to_string());
    }
    out
}

impl Grader<'_> {
    /// Activity of one customer over the configured window.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn collect_activity(&self, customer_id: i64) -> Result<CustomerActivity> {
        collect_activity(
            self.storage(),
            customer_id,
            self.clock().today(),
            self.config().activity_window_days,
        )
    }

    /// Grade a customer by the rules and store the result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown customer.
    pub fn calculate_customer_grade(&self, customer_id: i64) -> Result<GradeResult> {
        let customer = self.storage().require_customer(customer_id)?;
        let activity = self.collect_activity(customer.id)?;
        let result = score_activity(&activity, self.clock().today());
        self.store(&customer, &result)?;
        Ok(result)
    }

    /// Whether a customer's grade is missing or stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn needs_regrade(&self, customer: &Customer) -> Result<bool> {
        let Some(graded_at) = customer.grade_updated_at else {
            return Ok(true);
        };
        if self.clock().now() - graded_at > self.config().regrade_after() {
            return Ok(true);
        }
        Ok(self.storage().count_schedules_created_since(customer.id, graded_at)? > 0
            || self.storage().count_items_created_since(customer.id, graded_at)? > 0)
    }

    /// Grade every customer with activity whose grade is stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn regrade_all(&self, owner: Option<&str>, dry_run: bool) -> Result<RegradeReport> {
        let mut report = RegradeReport {
            dry_run,
            ..RegradeReport::default()
        };

        for customer in self.storage().list_customers(owner)? {
            if !self.needs_regrade(&customer)? {
                report.up_to_date += 1;
                continue;
            }
            let activity = self.collect_activity(customer.id)?;
            if activity.is_empty() {
                debug!("Customer {} has no activity", customer.id);
                report.inactive += 1;
                continue;
            }

            let result = score_activity(&activity, self.clock().today());
            if !dry_run {
                self.store(&customer, &result)?;
            }
            report.graded.push(GradeChange {
                customer_id: customer.id,
                name: customer.display_name(),
                previous: customer.grade,
                grade: result.grade,
                score: result.score,
            });
        }

        info!(
            "Regraded {} customers ({} changed, {} up to date, {} inactive){}",
            report.graded.len(),
            report.graded.iter().filter(|c| c.changed()).count(),
            report.up_to_date,
            report.inactive,
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }

    pub(crate) fn store(&self, customer: &Customer, result: &GradeResult) -> Result<()> {
        self.storage().update_customer_grade(
            customer.id,
            result.grade,
            result.score,
            &result.reasoning,
            self.clock().now(),
        )?;
        info!(
            "Customer {} graded {} ({}){}",
            customer.id,
            result.grade,
            result.score,
            customer
                .grade
                .filter(|g| *g != result.grade)
                .map(|g| format!(", was {g}"))
                .unwrap_or_default()
        );
        Ok(())
    }
}
