//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{ArgGroup, Args, Subcommand, ValueEnum};

use crate::model::{
    ActionType, ActivityType, CustomerStatus, DiscountRate, Priority, ProductCategory,
    QuoteStage, ScheduleStatus, Stage,
};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Company commands.
#[derive(Debug, Subcommand)]
pub enum CompanyCommand {
    /// Register a company
    Add {
        /// Company name
        name: String,
    },

    /// List companies
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Department commands.
#[derive(Debug, Subcommand)]
pub enum DepartmentCommand {
    /// Register a department within a company
    Add {
        /// Company id
        company: i64,
        /// Department name
        name: String,
    },

    /// List departments
    List {
        /// Only departments of this company
        #[arg(long)]
        company: Option<i64>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Customer commands.
#[derive(Debug, Subcommand)]
pub enum CustomerCommand {
    /// Register a customer
    Add(CustomerAddArgs),

    /// List customers
    List {
        /// Only customers of this salesperson
        #[arg(short, long)]
        owner: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a customer with recent history
    Show {
        /// Customer id
        id: i64,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Grade one customer, or every stale one with --all
    #[command(group(ArgGroup::new("target").required(true).args(["id", "all"])))]
    Grade {
        /// Customer id
        id: Option<i64>,
        /// Grade every customer whose grade is stale
        #[arg(long)]
        all: bool,
        /// Only customers of this salesperson (with --all)
        #[arg(short, long, requires = "all")]
        owner: Option<String>,
        /// Ask the configured text generator instead of the rules
        #[arg(long, conflicts_with = "all")]
        ai: bool,
        /// Compute grades without storing them (with --all)
        #[arg(long, requires = "all")]
        dry_run: bool,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Arguments for `customer add`.
#[derive(Debug, Args)]
pub struct CustomerAddArgs {
    /// Salesperson owning the customer
    #[arg(short, long)]
    pub owner: String,
    /// Company id
    #[arg(long)]
    pub company: i64,
    /// Department id
    #[arg(long)]
    pub department: i64,
    /// Contact person
    #[arg(short, long)]
    pub name: Option<String>,
    /// Responsible manager
    #[arg(long)]
    pub manager: Option<String>,
    /// Phone number
    #[arg(long)]
    pub phone: Option<String>,
    /// E-mail address
    #[arg(long)]
    pub email: Option<String>,
    /// Postal address
    #[arg(long)]
    pub address: Option<String>,
    /// Notes
    #[arg(long)]
    pub notes: Option<String>,
    /// Follow-up state (active, completed, paused)
    #[arg(long, default_value = "active")]
    pub status: CustomerStatus,
    /// Follow-up horizon (one_month, three_months, long_term)
    #[arg(long, default_value = "long_term")]
    pub priority: Priority,
}

/// Schedule commands.
#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// Add a schedule; funnel activities open or advance an opportunity
    Add(ScheduleAddArgs),

    /// Change a schedule
    Update(ScheduleUpdateArgs),

    /// Mark a schedule completed
    Complete {
        /// Schedule id
        id: i64,
    },

    /// Mark a schedule cancelled
    Cancel {
        /// Schedule id
        id: i64,
    },

    /// Delete a schedule
    Delete {
        /// Schedule id
        id: i64,
    },

    /// List schedules
    List {
        /// Only schedules of this salesperson
        #[arg(short, long)]
        owner: Option<String>,
        /// Only schedules of this customer
        #[arg(long)]
        customer: Option<i64>,
        /// Only schedules in this status
        #[arg(long)]
        status: Option<ScheduleStatus>,
        /// Only this kind of activity
        #[arg(short = 't', long, value_enum)]
        activity: Option<ActivityArg>,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Arguments for `schedule add`.
#[derive(Debug, Args)]
pub struct ScheduleAddArgs {
    /// Salesperson
    #[arg(short, long)]
    pub owner: String,
    /// Customer id
    #[arg(long)]
    pub customer: i64,
    /// Kind of activity
    #[arg(short = 't', long, value_enum)]
    pub activity: ActivityArg,
    /// Day of the visit (YYYY-MM-DD)
    #[arg(short, long)]
    pub date: NaiveDate,
    /// Time of the visit (HH:MM:SS)
    #[arg(long, default_value = "09:00:00")]
    pub time: NaiveTime,
    /// Attach to this opportunity
    #[arg(long)]
    pub opportunity: Option<i64>,
    /// Where the visit happens
    #[arg(long)]
    pub location: Option<String>,
    /// Notes
    #[arg(long)]
    pub notes: Option<String>,
    /// Expected revenue in won
    #[arg(long)]
    pub revenue: Option<i64>,
    /// Win probability in percent
    #[arg(long)]
    pub probability: Option<u8>,
    /// Expected close date
    #[arg(long)]
    pub close_date: Option<NaiveDate>,
}

/// Arguments for `schedule update`.
#[derive(Debug, Args)]
pub struct ScheduleUpdateArgs {
    /// Schedule id
    pub id: i64,
    /// New status
    #[arg(long)]
    pub status: Option<ScheduleStatus>,
    /// New day
    #[arg(short, long)]
    pub date: Option<NaiveDate>,
    /// New time
    #[arg(long)]
    pub time: Option<NaiveTime>,
    /// New location
    #[arg(long)]
    pub location: Option<String>,
    /// New notes
    #[arg(long)]
    pub notes: Option<String>,
    /// New expected revenue
    #[arg(long)]
    pub revenue: Option<i64>,
    /// New win probability
    #[arg(long)]
    pub probability: Option<u8>,
    /// New expected close date
    #[arg(long)]
    pub close_date: Option<NaiveDate>,
}

/// History commands.
#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// Record an activity
    Add(HistoryAddArgs),
}

/// Arguments for `history add`.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("subject").required(true).multiple(true).args(["customer", "schedule"])))]
pub struct HistoryAddArgs {
    /// Salesperson
    #[arg(short, long)]
    pub owner: String,
    /// Kind of entry
    #[arg(short = 't', long, value_enum)]
    pub action: ActionArg,
    /// Customer id
    #[arg(long)]
    pub customer: Option<i64>,
    /// Schedule the entry reports on
    #[arg(long)]
    pub schedule: Option<i64>,
    /// Free text
    #[arg(long)]
    pub content: Option<String>,
    /// Delivered amount in won
    #[arg(long)]
    pub amount: Option<i64>,
    /// Legacy item list, e.g. "Pipette: 2개 (110,000원)"
    #[arg(long)]
    pub items: Option<String>,
    /// Day of delivery
    #[arg(long)]
    pub delivery_date: Option<NaiveDate>,
    /// Day of the meeting
    #[arg(long)]
    pub meeting_date: Option<NaiveDate>,
    /// Tax invoice issued
    #[arg(long)]
    pub tax_invoice: bool,
}

/// Delivery item commands.
#[derive(Debug, Subcommand)]
pub enum ItemCommand {
    /// Add a delivered line item to a schedule or history entry
    Add(ItemAddArgs),
}

/// Arguments for `item add`.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("parent").required(true).args(["schedule", "history"])))]
pub struct ItemAddArgs {
    /// Product name
    pub name: String,
    /// Schedule id
    #[arg(long)]
    pub schedule: Option<i64>,
    /// History id
    #[arg(long)]
    pub history: Option<i64>,
    /// Quantity
    #[arg(long, default_value = "1")]
    pub quantity: u32,
    /// Unit of measure
    #[arg(long)]
    pub unit: Option<String>,
    /// Price per unit before VAT
    #[arg(short, long)]
    pub price: Option<i64>,
    /// Tax invoice issued
    #[arg(long)]
    pub tax_invoice: bool,
    /// Notes
    #[arg(long)]
    pub notes: Option<String>,
}

/// Product catalogue commands.
#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Register a product
    Add(ProductAddArgs),

    /// List products
    List {
        /// Include retired products
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a product with its current price
    Show {
        /// Product id
        id: i64,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Set or clear a promotional price
    #[command(group(ArgGroup::new("promo").required(true).args(["price", "clear"])))]
    Promo {
        /// Product id
        id: i64,
        /// Promotional price before VAT
        #[arg(short, long, requires_all = ["from", "until"])]
        price: Option<i64>,
        /// First day of the promotion
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day of the promotion
        #[arg(long)]
        until: Option<NaiveDate>,
        /// Remove the promotion
        #[arg(long)]
        clear: bool,
    },

    /// Stop offering a product on new quotes
    Retire {
        /// Product id
        id: i64,
    },
}

/// Arguments for `product add`.
#[derive(Debug, Args)]
pub struct ProductAddArgs {
    /// Unique catalogue code
    pub code: String,
    /// Product name
    pub name: String,
    /// List price before VAT
    #[arg(short, long)]
    pub price: i64,
    /// Product line (equipment, software, service, maintenance, consumable, other)
    #[arg(long, default_value = "other")]
    pub category: ProductCategory,
    /// Purchase cost
    #[arg(long)]
    pub cost: Option<i64>,
    /// Description
    #[arg(long)]
    pub description: Option<String>,
    /// Specification sheet as a JSON object
    #[arg(long)]
    pub specs: Option<String>,
}

/// Quote commands.
#[derive(Debug, Subcommand)]
pub enum QuoteCommand {
    /// Open a quote for a schedule
    Create(QuoteCreateArgs),

    /// Add a product line to a quote
    Item(QuoteItemArgs),

    /// Show a quote with its lines
    Show {
        /// Quote id
        id: i64,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List quotes
    List {
        /// Only quotes of this salesperson
        #[arg(short, long)]
        owner: Option<String>,
        /// Only quotes of this customer
        #[arg(long)]
        customer: Option<i64>,
        /// Only quotes in this stage
        #[arg(short, long)]
        stage: Option<QuoteStage>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Move a quote to another stage
    Stage {
        /// Quote id
        id: i64,
        /// Target stage
        stage: QuoteStage,
        /// What the customer said
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Link a quote to the delivery it turned into
    Convert {
        /// Quote id
        id: i64,
        /// Delivery history id
        #[arg(long)]
        history: i64,
    },
}

/// Arguments for `quote create`.
#[derive(Debug, Args)]
pub struct QuoteCreateArgs {
    /// Schedule id
    pub schedule: i64,
    /// Quote number (generated when omitted)
    #[arg(long)]
    pub number: Option<String>,
    /// Last valid day (defaults to the configured validity)
    #[arg(long)]
    pub valid_until: Option<NaiveDate>,
    /// Quote-level discount in percent, e.g. 12.5
    #[arg(short, long, default_value = "0")]
    pub discount: DiscountRate,
    /// Win probability in percent
    #[arg(long)]
    pub probability: Option<u8>,
    /// Expected close date
    #[arg(long)]
    pub close_date: Option<NaiveDate>,
    /// Notes
    #[arg(long)]
    pub notes: Option<String>,
}

/// Arguments for `quote item`.
#[derive(Debug, Args)]
pub struct QuoteItemArgs {
    /// Quote id
    pub quote: i64,
    /// Product id
    pub product: i64,
    /// Quantity
    #[arg(long, default_value = "1")]
    pub quantity: u32,
    /// Price per unit (defaults to the product's current price)
    #[arg(short, long)]
    pub price: Option<i64>,
    /// Line discount in percent
    #[arg(short, long, default_value = "0")]
    pub discount: DiscountRate,
    /// Line description
    #[arg(long)]
    pub description: Option<String>,
}

/// Funnel commands.
#[derive(Debug, Subcommand)]
pub enum FunnelCommand {
    /// List opportunities
    List {
        /// Only customers of this salesperson
        #[arg(short, long)]
        owner: Option<String>,
        /// Only opportunities of this customer
        #[arg(long)]
        customer: Option<i64>,
        /// Only opportunities in this stage
        #[arg(short, long)]
        stage: Option<Stage>,
        /// Only opportunities not yet won or lost
        #[arg(long)]
        open: bool,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show an opportunity with its stage history and schedules
    Show {
        /// Opportunity id
        id: i64,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Move an opportunity to a stage
    Stage {
        /// Opportunity id
        id: i64,
        /// Target stage
        stage: Stage,
        /// Note recorded with the transition
        #[arg(short, long)]
        note: Option<String>,
        /// Why the deal was lost (lost stages only)
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Recompute revenue and backlog of an opportunity
    Refresh {
        /// Opportunity id
        id: i64,
    },

    /// Pipeline totals
    Summary(ReportArgs),

    /// Per-stage totals
    Stages(ReportArgs),

    /// Monthly revenue forecast
    Forecast {
        #[command(flatten)]
        report: ReportArgs,
        /// Months to cover (defaults to the configured value)
        #[arg(short, long)]
        months: Option<u32>,
    },

    /// Stage-to-stage conversion rates
    Conversion(ReportArgs),

    /// Stages where deals stall
    Bottlenecks(ReportArgs),

    /// Largest weighted open deals
    Top {
        #[command(flatten)]
        report: ReportArgs,
        /// Rows to show (defaults to the configured value)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Won versus lost deals
    WonLost(ReportArgs),
}

/// Common arguments of funnel reports.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Only customers of this salesperson
    #[arg(short, long)]
    pub owner: Option<String>,
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Maintenance commands.
#[derive(Debug, Subcommand)]
pub enum MaintCommand {
    /// Delete impossible won/closing opportunities and recompute the rest
    Repair,

    /// Remove won and quote-lost opportunities of a year
    CleanupYear {
        /// Year whose stage entries are cleaned
        year: i32,
        /// Report without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Mark opportunities won when their delivery is completed
    SyncWon,

    /// Create opportunities for quote and delivery schedules without one
    Backfill {
        /// Report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute revenue of every opportunity
    Recompute,

    /// Expire open quotes past their validity
    ExpireQuotes,
}

/// Backup commands.
#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Copy the database into the backup directory
    Create,

    /// List backups, newest first
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check a backup against its checksum
    Verify {
        /// Backup file name or path
        name: String,
    },

    /// Delete old backups
    Prune {
        /// Backups to keep (defaults to the configured value)
        #[arg(short, long)]
        keep: Option<usize>,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Activity type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActivityArg {
    /// Customer meeting
    Meeting,
    /// Quote submission
    Quote,
    /// Delivery
    Delivery,
    /// After-sales service
    Service,
}

impl From<ActivityArg> for ActivityType {
    fn from(arg: ActivityArg) -> Self {
        match arg {
            ActivityArg::Meeting => Self::CustomerMeeting,
            ActivityArg::Quote => Self::Quote,
            ActivityArg::Delivery => Self::Delivery,
            ActivityArg::Service => Self::Service,
        }
    }
}

/// History action argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    /// Customer meeting
    Meeting,
    /// Delivery
    Delivery,
    /// After-sales service
    Service,
    /// Memo
    Memo,
}

impl From<ActionArg> for ActionType {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Meeting => Self::CustomerMeeting,
            ActionArg::Delivery => Self::DeliverySchedule,
            ActionArg::Service => Self::Service,
            ActionArg::Memo => Self::Memo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_arg_conversion() {
        assert_eq!(
            ActivityType::from(ActivityArg::Meeting),
            ActivityType::CustomerMeeting
        );
        assert_eq!(ActivityType::from(ActivityArg::Quote), ActivityType::Quote);
        assert_eq!(
            ActivityType::from(ActivityArg::Delivery),
            ActivityType::Delivery
        );
        assert_eq!(ActivityType::from(ActivityArg::Service), ActivityType::Service);
    }

    #[test]
    fn test_action_arg_conversion() {
        assert_eq!(
            ActionType::from(ActionArg::Meeting),
            ActionType::CustomerMeeting
        );
        assert_eq!(
            ActionType::from(ActionArg::Delivery),
            ActionType::DeliverySchedule
        );
        assert_eq!(ActionType::from(ActionArg::Memo), ActionType::Memo);
    }

    #[test]
    fn test_status_command_debug() {
        let cmd = StatusCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
