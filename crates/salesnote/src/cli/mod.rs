//! Command-line interface for salesnote.
//!
//! This module provides the CLI structure for the `salesnote` binary. The
//! handlers live in the binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ActionArg, ActivityArg, BackupCommand, CompanyCommand, ConfigCommand, CustomerAddArgs,
    CustomerCommand, DepartmentCommand, FunnelCommand, HistoryAddArgs, HistoryCommand,
    ItemAddArgs, ItemCommand, MaintCommand, ProductAddArgs, ProductCommand, QuoteCommand,
    QuoteCreateArgs, QuoteItemArgs, ReportArgs, ScheduleAddArgs, ScheduleCommand,
    ScheduleUpdateArgs, StatusCommand,
};

/// salesnote - Track customers, schedules and the sales funnel
///
/// Records meetings, quotes and deliveries for B2B customers. Every funnel
/// activity moves an opportunity through lead, contact, quote, closing and
/// won or lost, and keeps its revenue and backlog current.
#[derive(Debug, Parser)]
#[command(name = "salesnote")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database
    Init,

    /// Show database status
    Status(StatusCommand),

    /// Manage companies
    #[command(subcommand)]
    Company(CompanyCommand),

    /// Manage departments
    #[command(subcommand)]
    Department(DepartmentCommand),

    /// Manage customers and their grades
    #[command(subcommand)]
    Customer(CustomerCommand),

    /// Manage schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Record activity history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Record delivered items
    #[command(subcommand)]
    Item(ItemCommand),

    /// Manage the product catalogue
    #[command(subcommand)]
    Product(ProductCommand),

    /// Write quotes and follow them up
    #[command(subcommand)]
    Quote(QuoteCommand),

    /// Opportunities and pipeline reports
    #[command(subcommand)]
    Funnel(FunnelCommand),

    /// Repair and clean up opportunity data
    #[command(subcommand)]
    Maint(MaintCommand),

    /// Manage database backups
    #[command(subcommand)]
    Backup(BackupCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                2 => crate::logging::Verbosity::Debug,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use crate::model::{ProductCategory, QuoteStage, ScheduleStatus, Stage};
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn with_flags(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "salesnote");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(with_flags(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(with_flags(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(with_flags(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(with_flags(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(with_flags(2, false).verbosity(), Verbosity::Debug);
        assert_eq!(with_flags(5, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = parse(&["salesnote", "-c", "/custom/config.toml", "-vv", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert_eq!(cli.verbose, 2);

        let cli = parse(&["salesnote", "status", "-q", "--json"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: true })));
    }

    #[test]
    fn test_parse_schedule_add() {
        let cli = parse(&[
            "salesnote", "schedule", "add", "-o", "kim", "--customer", "3", "-t", "quote",
            "-d", "2024-03-14", "--revenue", "1200000", "--probability", "60",
        ]);
        let Command::Schedule(ScheduleCommand::Add(args)) = cli.command else {
            panic!("expected schedule add");
        };
        assert_eq!(args.activity, ActivityArg::Quote);
        assert_eq!(args.date.to_string(), "2024-03-14");
        assert_eq!(args.time.to_string(), "09:00:00");
        assert_eq!(args.revenue, Some(1_200_000));
    }

    #[test]
    fn test_parse_schedule_update_status() {
        let cli = parse(&["salesnote", "schedule", "update", "7", "--status", "completed"]);
        let Command::Schedule(ScheduleCommand::Update(args)) = cli.command else {
            panic!("expected schedule update");
        };
        assert_eq!(args.status, Some(ScheduleStatus::Completed));

        assert!(Cli::try_parse_from(["salesnote", "schedule", "update", "7", "--status", "done"])
            .is_err());
    }

    #[test]
    fn test_parse_funnel_stage() {
        let cli = parse(&[
            "salesnote", "funnel", "stage", "4", "lost", "--reason", "budget cut",
        ]);
        let Command::Funnel(FunnelCommand::Stage { id, stage, reason, .. }) = cli.command else {
            panic!("expected funnel stage");
        };
        assert_eq!(id, 4);
        assert_eq!(stage, Stage::Lost);
        assert_eq!(reason.as_deref(), Some("budget cut"));
    }

    #[test]
    fn test_parse_funnel_reports() {
        let cli = parse(&["salesnote", "funnel", "forecast", "-o", "kim", "-m", "6", "--json"]);
        let Command::Funnel(FunnelCommand::Forecast { report, months }) = cli.command else {
            panic!("expected funnel forecast");
        };
        assert_eq!(report.owner.as_deref(), Some("kim"));
        assert!(report.json);
        assert_eq!(months, Some(6));

        assert!(matches!(
            parse(&["salesnote", "funnel", "won-lost"]).command,
            Command::Funnel(FunnelCommand::WonLost(_))
        ));
    }

    #[test]
    fn test_parse_customer_grade_targets() {
        assert!(matches!(
            parse(&["salesnote", "customer", "grade", "5", "--ai"]).command,
            Command::Customer(CustomerCommand::Grade { id: Some(5), ai: true, .. })
        ));
        assert!(matches!(
            parse(&["salesnote", "customer", "grade", "--all", "--dry-run"]).command,
            Command::Customer(CustomerCommand::Grade { all: true, dry_run: true, .. })
        ));

        assert!(Cli::try_parse_from(["salesnote", "customer", "grade"]).is_err());
        assert!(Cli::try_parse_from(["salesnote", "customer", "grade", "5", "--dry-run"]).is_err());
        assert!(Cli::try_parse_from(["salesnote", "customer", "grade", "--all", "--ai"]).is_err());
    }

    #[test]
    fn test_parse_item_needs_one_parent() {
        assert!(Cli::try_parse_from(["salesnote", "item", "add", "Tips"]).is_err());
        assert!(Cli::try_parse_from([
            "salesnote", "item", "add", "Tips", "--schedule", "1", "--history", "2"
        ])
        .is_err());

        let cli = parse(&["salesnote", "item", "add", "Tips", "--schedule", "1", "-p", "5000"]);
        let Command::Item(ItemCommand::Add(args)) = cli.command else {
            panic!("expected item add");
        };
        assert_eq!(args.quantity, 1);
        assert_eq!(args.price, Some(5_000));
    }

    #[test]
    fn test_parse_maint_cleanup_year() {
        assert!(matches!(
            parse(&["salesnote", "maint", "cleanup-year", "2023", "--dry-run"]).command,
            Command::Maint(MaintCommand::CleanupYear { year: 2023, dry_run: true })
        ));
    }

    #[test]
    fn test_parse_history_needs_subject() {
        assert!(Cli::try_parse_from(["salesnote", "history", "add", "-o", "kim", "-t", "memo"])
            .is_err());
        assert!(Cli::try_parse_from([
            "salesnote", "history", "add", "-o", "kim", "-t", "delivery", "--schedule", "3",
            "--amount", "550000"
        ])
        .is_ok());
    }

    #[test]
    fn test_parse_product_add_and_promo() {
        let cli = parse(&[
            "salesnote", "product", "add", "CF-200", "Centrifuge", "-p", "1200000",
            "--category", "equipment",
        ]);
        let Command::Product(ProductCommand::Add(args)) = cli.command else {
            panic!("expected product add");
        };
        assert_eq!(args.category, ProductCategory::Equipment);
        assert_eq!(args.price, 1_200_000);

        assert!(Cli::try_parse_from(["salesnote", "product", "promo", "1", "-p", "990000"])
            .is_err());
        assert!(Cli::try_parse_from(["salesnote", "product", "promo", "1"]).is_err());
        assert!(matches!(
            parse(&[
                "salesnote", "product", "promo", "1", "-p", "990000", "--from", "2024-03-01",
                "--until", "2024-03-31",
            ])
            .command,
            Command::Product(ProductCommand::Promo { price: Some(990_000), .. })
        ));
    }

    #[test]
    fn test_parse_quote_commands() {
        let cli = parse(&["salesnote", "quote", "create", "12", "-d", "12.5"]);
        let Command::Quote(QuoteCommand::Create(args)) = cli.command else {
            panic!("expected quote create");
        };
        assert_eq!(args.schedule, 12);
        assert_eq!(args.discount.basis_points(), 1_250);

        let cli = parse(&["salesnote", "quote", "item", "3", "8", "--quantity", "4"]);
        let Command::Quote(QuoteCommand::Item(args)) = cli.command else {
            panic!("expected quote item");
        };
        assert_eq!((args.quote, args.product, args.quantity), (3, 8, 4));
        assert!(args.discount.is_zero());

        assert!(matches!(
            parse(&["salesnote", "quote", "stage", "3", "negotiation"]).command,
            Command::Quote(QuoteCommand::Stage { stage: QuoteStage::Negotiation, .. })
        ));
        assert!(Cli::try_parse_from(["salesnote", "quote", "create", "1", "-d", "120"]).is_err());
        assert!(Cli::try_parse_from(["salesnote", "quote", "convert", "3"]).is_err());
        assert!(matches!(
            parse(&["salesnote", "maint", "expire-quotes"]).command,
            Command::Maint(MaintCommand::ExpireQuotes)
        ));
    }
}
