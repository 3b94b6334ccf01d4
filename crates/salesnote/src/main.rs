//! `salesnote` - CLI for salesnote
//!
//! This binary provides the command-line interface for recording sales
//! activity and reading the funnel.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tracing::warn;

use salesnote::cli::{
    BackupCommand, Cli, Command, CompanyCommand, ConfigCommand, CustomerAddArgs, CustomerCommand,
    DepartmentCommand, FunnelCommand, HistoryAddArgs, HistoryCommand, ItemAddArgs, ItemCommand,
    MaintCommand, ProductAddArgs, ProductCommand, QuoteCommand, QuoteCreateArgs, QuoteItemArgs,
    ScheduleAddArgs, ScheduleCommand, ScheduleUpdateArgs,
};
use salesnote::grading::{CommandGenerator, GradeResult};
use salesnote::model::{
    format_won, NewCustomer, NewDeliveryItem, NewHistory, NewProduct, NewQuote, NewQuoteItem,
    NewSchedule, Opportunity, Product, Promotion, Quote, Schedule, ScheduleChanges, ScheduleStatus,
};
use salesnote::storage::{OpportunityFilter, QuoteFilter, ScheduleFilter};
use salesnote::{init_logging, BackupStore, Config, FunnelEngine, Grader, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Init => handle_init(&config),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Company(cmd) => handle_company(&config, cmd),
        Command::Department(cmd) => handle_department(&config, cmd),
        Command::Customer(cmd) => handle_customer(&config, cmd).await,
        Command::Schedule(cmd) => handle_schedule(&config, cmd),
        Command::History(HistoryCommand::Add(args)) => handle_history(&config, args),
        Command::Item(ItemCommand::Add(args)) => handle_item(&config, args),
        Command::Product(cmd) => handle_product(&config, cmd),
        Command::Quote(cmd) => handle_quote(&config, cmd),
        Command::Funnel(cmd) => handle_funnel(&config, cmd),
        Command::Maint(cmd) => handle_maint(&config, cmd),
        Command::Backup(cmd) => handle_backup(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("cannot open database {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_init(config: &Config) -> Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    println!("Database ready: {}", storage.path().display());
    println!("Schema version: {}", stats.schema_version);
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    let backups = BackupStore::new(config.backup_dir()).list()?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "stats": stats,
            "backups": backups.len(),
            "latest_backup": backups.first().map(|b| b.created_at),
        });
        return print_json(&status);
    }

    println!("salesnote status");
    println!("----------------");
    println!("Database:       {}", storage.path().display());
    println!("Schema:         v{}", stats.schema_version);
    println!("Size:           {} bytes", stats.db_size_bytes);
    println!();
    println!("Companies:      {}", stats.companies);
    println!("Customers:      {}", stats.customers);
    println!("Schedules:      {}", stats.schedules);
    println!("History:        {}", stats.histories);
    println!("Items:          {}", stats.delivery_items);
    println!(
        "Opportunities:  {} ({} open)",
        stats.opportunities, stats.open_opportunities
    );
    println!("Products:       {}", stats.products);
    println!("Quotes:         {}", stats.quotes);
    println!();
    match backups.first() {
        Some(latest) => println!(
            "Backups:        {} (latest {})",
            backups.len(),
            latest.created_at.format("%Y-%m-%d %H:%M")
        ),
        None => println!("Backups:        none"),
    }
    Ok(())
}

fn handle_company(config: &Config, cmd: CompanyCommand) -> Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        CompanyCommand::Add { name } => {
            let company = storage.insert_company(&name, Utc::now())?;
            println!("Company {}: {}", company.id, company.name);
        }
        CompanyCommand::List { json } => {
            let companies = storage.list_companies()?;
            if json {
                return print_json(&companies);
            }
            for company in companies {
                println!("{:>5}  {}", company.id, company.name);
            }
        }
    }
    Ok(())
}

fn handle_department(config: &Config, cmd: DepartmentCommand) -> Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        DepartmentCommand::Add { company, name } => {
            let department = storage.insert_department(company, &name, Utc::now())?;
            println!(
                "Department {}: {} (company {})",
                department.id, department.name, department.company_id
            );
        }
        DepartmentCommand::List { company, json } => {
            let departments = storage.list_departments(company)?;
            if json {
                return print_json(&departments);
            }
            for department in departments {
                println!(
                    "{:>5}  {:<30} company {}",
                    department.id, department.name, department.company_id
                );
            }
        }
    }
    Ok(())
}

async fn handle_customer(config: &Config, cmd: CustomerCommand) -> Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        CustomerCommand::Add(args) => add_customer(&storage, args)?,
        CustomerCommand::List { owner, json } => {
            let customers = storage.list_customers(owner.as_deref())?;
            if json {
                return print_json(&customers);
            }
            for customer in customers {
                println!(
                    "{:>5}  {:<20} {:<10} {:<3} {}",
                    customer.id,
                    customer.display_name(),
                    customer.owner,
                    customer.grade.map_or("-", |g| g.as_str()),
                    customer
                        .grade_score
                        .map_or_else(String::new, |s| s.to_string())
                );
            }
        }
        CustomerCommand::Show { id, json } => {
            let customer = storage.require_customer(id)?;
            let company = storage.get_company(customer.company_id)?;
            let department = storage.get_department(customer.department_id)?;
            let opportunities = storage.list_opportunities(&OpportunityFilter {
                customer_id: Some(id),
                ..OpportunityFilter::default()
            })?;
            let history = storage.histories_for_customer(id, None, Some(10))?;

            if json {
                return print_json(&serde_json::json!({
                    "customer": customer,
                    "company": company,
                    "department": department,
                    "opportunities": opportunities,
                    "recent_history": history,
                }));
            }

            println!("{} (#{})", customer.display_name(), customer.id);
            println!(
                "  {} / {}",
                company.map_or_else(|| "-".to_string(), |c| c.name),
                department.map_or_else(|| "-".to_string(), |d| d.name)
            );
            println!("  Owner:    {}", customer.owner);
            println!("  Status:   {} ({})", customer.status, customer.priority);
            if let Some(grade) = customer.grade {
                println!(
                    "  Grade:    {grade} ({})",
                    customer.grade_score.unwrap_or_default()
                );
                if let Some(reasoning) = &customer.grade_reasoning {
                    println!("            {reasoning}");
                }
            }
            println!();
            println!("Opportunities:");
            for opp in &opportunities {
                print_opportunity_row(opp);
            }
            println!();
            println!("Recent history:");
            for entry in &history {
                println!(
                    "  {}  {:<18} {}",
                    entry.created_at.format("%Y-%m-%d"),
                    entry.action_type,
                    entry.content.as_deref().unwrap_or("")
                );
            }
        }
        CustomerCommand::Grade {
            id,
            all,
            owner,
            ai,
            dry_run,
            json,
        } => {
            let grader = Grader::new(&storage).with_config(&config.grading);
            if all {
                let report = grader.regrade_all(owner.as_deref(), dry_run)?;
                if json {
                    return print_json(&report);
                }
                for change in &report.graded {
                    println!(
                        "{:>5}  {:<20} {:>2} -> {:<2} ({})",
                        change.customer_id,
                        change.name,
                        change.previous.map_or("-", |g| g.as_str()),
                        change.grade,
                        change.score
                    );
                }
                println!(
                    "{} graded, {} up to date, {} without activity{}",
                    report.graded.len(),
                    report.up_to_date,
                    report.inactive,
                    if dry_run { " (dry run)" } else { "" }
                );
                return Ok(());
            }

            let id = id.context("a customer id or --all is required")?;
            let result = if ai {
                let generator = CommandGenerator::from_config(&config.grading)
                    .context("grading.ai_command is not configured")?;
                match grader.grade_with_ai(id, &generator).await {
                    Ok(result) => result,
                    Err(e) if e.is_not_found() => return Err(e.into()),
                    Err(e) => {
                        warn!("AI grading failed, using rules instead: {e}");
                        grader.calculate_customer_grade(id)?
                    }
                }
            } else {
                grader.calculate_customer_grade(id)?
            };

            if json {
                return print_json(&result);
            }
            print_grade(&result);
        }
    }
    Ok(())
}

fn add_customer(storage: &Storage, args: CustomerAddArgs) -> Result<()> {
    let customer = storage.insert_customer(
        &NewCustomer {
            owner: args.owner,
            customer_name: args.name,
            company_id: args.company,
            department_id: args.department,
            manager: args.manager,
            phone: args.phone,
            email: args.email,
            address: args.address,
            notes: args.notes,
            status: args.status,
            priority: args.priority,
        },
        Utc::now(),
    )?;
    println!("Customer {}: {}", customer.id, customer.display_name());
    Ok(())
}

fn print_grade(result: &GradeResult) {
    println!("Grade {} ({})", result.grade, result.score);
    println!("  {}", result.reasoning);
    println!(
        "  engagement {} / potential {} / relationship {} / responsiveness {}",
        result.factors.engagement,
        result.factors.purchase_potential,
        result.factors.relationship,
        result.factors.responsiveness
    );
    for recommendation in &result.recommendations {
        println!("  - {recommendation}");
    }
}

fn handle_schedule(config: &Config, cmd: ScheduleCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let engine = FunnelEngine::new(&storage).with_config(&config.funnel);

    match cmd {
        ScheduleCommand::Add(args) => add_schedule(&engine, args)?,
        ScheduleCommand::Update(args) => update_schedule(&engine, args)?,
        ScheduleCommand::Complete { id } => set_status(&engine, id, ScheduleStatus::Completed)?,
        ScheduleCommand::Cancel { id } => set_status(&engine, id, ScheduleStatus::Cancelled)?,
        ScheduleCommand::Delete { id } => {
            engine.delete_schedule(id)?;
            println!("Schedule {id} deleted");
        }
        ScheduleCommand::List {
            owner,
            customer,
            status,
            activity,
            limit,
            json,
        } => {
            let schedules = storage.list_schedules(&ScheduleFilter {
                owner,
                customer_id: customer,
                status,
                activity_type: activity.map(Into::into),
                limit,
            })?;
            if json {
                return print_json(&schedules);
            }
            for schedule in &schedules {
                print_schedule_row(schedule);
            }
        }
    }
    Ok(())
}

fn add_schedule(engine: &FunnelEngine<'_>, args: ScheduleAddArgs) -> Result<()> {
    let mut new = NewSchedule::new(
        args.owner,
        args.customer,
        args.activity.into(),
        args.date,
        args.time,
    );
    new.opportunity_id = args.opportunity;
    new.location = args.location;
    new.notes = args.notes;
    new.expected_revenue = args.revenue;
    new.probability = args.probability;
    new.expected_close_date = args.close_date;

    let schedule = engine.create_schedule(&new)?;
    print_schedule_saved(engine, &schedule)
}

fn update_schedule(engine: &FunnelEngine<'_>, args: ScheduleUpdateArgs) -> Result<()> {
    let changes = ScheduleChanges {
        status: args.status,
        visit_date: args.date,
        visit_time: args.time,
        location: args.location,
        notes: args.notes,
        expected_revenue: args.revenue,
        probability: args.probability,
        expected_close_date: args.close_date,
    };
    let schedule = engine.update_schedule(args.id, &changes)?;
    print_schedule_saved(engine, &schedule)
}

fn set_status(engine: &FunnelEngine<'_>, id: i64, status: ScheduleStatus) -> Result<()> {
    let changes = ScheduleChanges {
        status: Some(status),
        ..ScheduleChanges::default()
    };
    let schedule = engine.update_schedule(id, &changes)?;
    print_schedule_saved(engine, &schedule)
}

fn print_schedule_saved(engine: &FunnelEngine<'_>, schedule: &Schedule) -> Result<()> {
    println!(
        "Schedule {}: {} on {} ({})",
        schedule.id,
        schedule.activity_type.label(),
        schedule.visit_date,
        schedule.status
    );
    if let Some(opp_id) = schedule.opportunity_id {
        if let Some(opp) = engine.storage().get_opportunity(opp_id)? {
            print_opportunity_row(&opp);
        }
    }
    Ok(())
}

fn print_schedule_row(schedule: &Schedule) {
    println!(
        "{:>5}  {} {}  {:<8} {:<10} customer {:<5} {}",
        schedule.id,
        schedule.visit_date,
        schedule.visit_time.format("%H:%M"),
        schedule.activity_type.label(),
        schedule.status,
        schedule.customer_id,
        schedule
            .opportunity_id
            .map_or_else(String::new, |id| format!("opp {id}"))
    );
}

fn handle_history(config: &Config, args: HistoryAddArgs) -> Result<()> {
    let storage = open_storage(config)?;
    let engine = FunnelEngine::new(&storage).with_config(&config.funnel);

    let customer_id = match (args.customer, args.schedule) {
        (Some(id), _) => Some(id),
        (None, Some(schedule_id)) => Some(storage.require_schedule(schedule_id)?.customer_id),
        (None, None) => None,
    };

    let mut new = NewHistory::new(args.owner, args.action.into());
    new.customer_id = customer_id;
    new.schedule_id = args.schedule;
    new.content = args.content;
    new.delivery_amount = args.amount;
    new.delivery_items_text = args.items;
    new.delivery_date = args.delivery_date;
    new.meeting_date = args.meeting_date;
    new.tax_invoice_issued = args.tax_invoice;

    let history = engine.record_history(&new)?;
    println!("History {}: {}", history.id, history.action_type);
    Ok(())
}

fn handle_item(config: &Config, args: ItemAddArgs) -> Result<()> {
    let storage = open_storage(config)?;
    let engine = FunnelEngine::new(&storage).with_config(&config.funnel);

    let mut new = match (args.schedule, args.history) {
        (Some(schedule_id), _) => {
            NewDeliveryItem::for_schedule(schedule_id, args.name, args.quantity, args.price)
        }
        (None, Some(history_id)) => {
            NewDeliveryItem::for_history(history_id, args.name, args.quantity, args.price)
        }
        (None, None) => anyhow::bail!("either --schedule or --history is required"),
    };
    if let Some(unit) = args.unit {
        new.unit = unit;
    }
    new.tax_invoice_issued = args.tax_invoice;
    new.notes = args.notes;

    let item = engine.add_delivery_item(&new)?;
    println!(
        "Item {}: {} x{} {} = {} won",
        item.id,
        item.item_name,
        item.quantity,
        item.unit,
        format_won(item.line_total())
    );
    Ok(())
}

fn handle_product(config: &Config, cmd: ProductCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let today = Utc::now().date_naive();

    match cmd {
        ProductCommand::Add(args) => {
            let product = add_product(&storage, args)?;
            print_product_row(&product, today);
        }
        ProductCommand::List { all, json } => {
            let products = storage.list_products(!all)?;
            if json {
                return print_json(&products);
            }
            for product in &products {
                print_product_row(product, today);
            }
        }
        ProductCommand::Show { id, json } => {
            let product = storage.require_product(id)?;
            if json {
                return print_json(&serde_json::json!({
                    "product": product,
                    "current_price": product.current_price(today),
                }));
            }
            print_product_row(&product, today);
            if let Some(promo) = &product.promotion {
                println!(
                    "       promotion {} won, {} to {}",
                    format_won(promo.price),
                    promo.start,
                    promo.end
                );
            }
            if let Some(margin) = product.margin() {
                println!("       margin {} won", format_won(margin));
            }
            println!(
                "       quoted {} times, sold {} times",
                product.total_quoted, product.total_sold
            );
            if let Some(description) = &product.description {
                println!("       {description}");
            }
        }
        ProductCommand::Promo {
            id,
            price,
            from,
            until,
            clear: _,
        } => {
            let mut product = storage.require_product(id)?;
            product.promotion = match (price, from, until) {
                (Some(price), Some(start), Some(end)) => {
                    let promo = Promotion { price, start, end };
                    promo.validate()?;
                    Some(promo)
                }
                _ => None,
            };
            product.updated_at = Utc::now();
            storage.save_product(&product)?;
            print_product_row(&product, today);
        }
        ProductCommand::Retire { id } => {
            let mut product = storage.require_product(id)?;
            product.is_active = false;
            product.updated_at = Utc::now();
            storage.save_product(&product)?;
            println!("Product {product} retired");
        }
    }
    Ok(())
}

fn add_product(storage: &Storage, args: ProductAddArgs) -> Result<Product> {
    let mut new = NewProduct::new(args.code, args.name, args.category, args.price);
    new.cost_price = args.cost;
    new.description = args.description;
    if let Some(specs) = args.specs {
        new.specifications =
            serde_json::from_str(&specs).context("--specs must be a JSON object")?;
    }
    Ok(storage.insert_product(&new, Utc::now())?)
}

fn print_product_row(product: &Product, today: chrono::NaiveDate) {
    println!(
        "{:>5}  {:<12} {:<24} {:<8} {:>14} won{}",
        product.id,
        product.product_code,
        product.name,
        product.category.label(),
        format_won(product.current_price(today)),
        if product.is_active { "" } else { "  (retired)" }
    );
}

fn handle_quote(config: &Config, cmd: QuoteCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let engine = FunnelEngine::new(&storage).with_config(&config.funnel);

    match cmd {
        QuoteCommand::Create(args) => {
            let quote = create_quote(&engine, args)?;
            print_quote_row(&quote);
        }
        QuoteCommand::Item(args) => add_quote_item(&engine, args)?,
        QuoteCommand::Show { id, json } => {
            let quote = storage.require_quote(id)?;
            let items = storage.items_for_quote(id)?;
            if json {
                return print_json(&serde_json::json!({
                    "quote": quote,
                    "items": items,
                }));
            }
            print_quote_row(&quote);
            println!(
                "       valid until {}, discount {}, probability {}%",
                quote.valid_until, quote.discount_rate, quote.probability
            );
            for item in &items {
                let product = storage.require_product(item.product_id)?;
                println!(
                    "  {:>3}. {:<30} x{:<5} {:>14} {:>7}  = {:>14} won",
                    item.sort_order,
                    product.to_string(),
                    item.quantity,
                    format_won(item.unit_price),
                    item.discount_rate,
                    format_won(item.subtotal)
                );
            }
            println!("Subtotal:  {:>14} won", format_won(quote.totals.subtotal));
            println!("Discount:  {:>14} won", format_won(quote.totals.discount_amount));
            println!("VAT:       {:>14} won", format_won(quote.totals.tax_amount));
            println!("Total:     {:>14} won", format_won(quote.totals.total_amount));
            println!("Weighted:  {:>14} won", format_won(quote.totals.weighted_revenue));
            if let Some(feedback) = &quote.customer_feedback {
                println!("Feedback:  {feedback}");
            }
        }
        QuoteCommand::List {
            owner,
            customer,
            stage,
            json,
        } => {
            let quotes = storage.list_quotes(&QuoteFilter {
                owner,
                customer_id: customer,
                stage,
            })?;
            if json {
                return print_json(&quotes);
            }
            for quote in &quotes {
                print_quote_row(quote);
            }
        }
        QuoteCommand::Stage {
            id,
            stage,
            feedback,
        } => {
            let quote = engine.set_quote_stage(id, stage, feedback)?;
            print_quote_row(&quote);
        }
        QuoteCommand::Convert { id, history } => {
            let quote = engine.convert_quote(id, history)?;
            print_quote_row(&quote);
        }
    }
    Ok(())
}

fn create_quote(engine: &FunnelEngine<'_>, args: QuoteCreateArgs) -> Result<Quote> {
    let mut new = NewQuote::for_schedule(args.schedule);
    new.quote_number = args.number;
    new.valid_until = args.valid_until;
    new.discount_rate = args.discount;
    new.probability = args.probability;
    new.expected_close_date = args.close_date;
    new.notes = args.notes;
    Ok(engine.create_quote(&new)?)
}

fn add_quote_item(engine: &FunnelEngine<'_>, args: QuoteItemArgs) -> Result<()> {
    let mut new = NewQuoteItem::new(args.quote, args.product, args.quantity);
    new.unit_price = args.price;
    new.discount_rate = args.discount;
    new.description = args.description;

    let item = engine.add_quote_item(&new)?;
    let quote = engine.storage().require_quote(item.quote_id)?;
    println!(
        "Line {}: x{} at {} won = {} won",
        item.sort_order,
        item.quantity,
        format_won(item.unit_price),
        format_won(item.subtotal)
    );
    print_quote_row(&quote);
    Ok(())
}

fn print_quote_row(quote: &Quote) {
    println!(
        "{:>5}  {:<16} {} {:<8} customer {:<5} total {:>14}  weighted {:>14}",
        quote.id,
        quote.quote_number,
        quote.quote_date,
        quote.stage.label(),
        quote.customer_id,
        format_won(quote.totals.total_amount),
        format_won(quote.totals.weighted_revenue)
    );
}

fn print_opportunity_row(opp: &Opportunity) {
    println!(
        "{:>5}  {:<24} {:<6} {:>3}%  expected {:>14}  weighted {:>14}  backlog {:>12}",
        opp.id,
        opp.title.as_deref().unwrap_or("-"),
        opp.current_stage.info().display_name,
        opp.probability,
        format_won(opp.expected_revenue),
        format_won(opp.weighted_revenue),
        format_won(opp.backlog_amount)
    );
}

#[allow(clippy::too_many_lines)]
fn handle_funnel(config: &Config, cmd: FunnelCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let engine = FunnelEngine::new(&storage).with_config(&config.funnel);

    match cmd {
        FunnelCommand::List {
            owner,
            customer,
            stage,
            open,
            json,
        } => {
            let opportunities = storage.list_opportunities(&OpportunityFilter {
                owner,
                customer_id: customer,
                stage,
                open_only: open,
            })?;
            if json {
                return print_json(&opportunities);
            }
            for opp in &opportunities {
                print_opportunity_row(opp);
            }
        }
        FunnelCommand::Show { id, json } => {
            let opp = storage.require_opportunity(id)?;
            let schedules = storage.schedules_for_opportunity(id)?;
            if json {
                return print_json(&serde_json::json!({
                    "opportunity": opp,
                    "schedules": schedules,
                }));
            }

            print_opportunity_row(&opp);
            if let Some(actual) = opp.actual_revenue {
                println!("       actual revenue {} won", format_won(actual));
            }
            if let Some(reason) = &opp.lost_reason {
                println!("       lost: {reason}");
            }
            println!();
            println!("Stage history:");
            for entry in &opp.stage_history {
                println!(
                    "  {:<6} {} -> {}  {}",
                    entry.stage.info().display_name,
                    entry.entered,
                    entry
                        .exited
                        .map_or_else(|| "now".to_string(), |d| d.to_string()),
                    entry.note.as_deref().unwrap_or("")
                );
            }
            println!();
            println!("Schedules:");
            for schedule in &schedules {
                print_schedule_row(schedule);
            }
        }
        FunnelCommand::Stage {
            id,
            stage,
            note,
            reason,
        } => {
            let opp = engine.set_stage(id, stage, note, reason)?;
            print_opportunity_row(&opp);
        }
        FunnelCommand::Refresh { id } => {
            let opp = engine.update_revenue_amounts(id)?;
            print_opportunity_row(&opp);
        }
        FunnelCommand::Summary(report) => {
            let summary = engine.pipeline_summary(report.owner.as_deref())?;
            if report.json {
                return print_json(&summary);
            }
            println!("Open opportunities: {}", summary.count);
            println!("Expected revenue:   {} won", format_won(summary.expected_total));
            println!("Weighted revenue:   {} won", format_won(summary.weighted_total));
            println!("Mean probability:   {:.1}%", summary.avg_probability);
        }
        FunnelCommand::Stages(report) => {
            let stages = engine.stage_breakdown(report.owner.as_deref())?;
            if report.json {
                return print_json(&stages);
            }
            for stage in &stages {
                println!(
                    "{:<6} {:>5}  expected {:>14}  weighted {:>14}  {:>5.1}%",
                    stage.display_name,
                    stage.count,
                    format_won(stage.expected_total),
                    format_won(stage.weighted_total),
                    stage.avg_probability
                );
            }
        }
        FunnelCommand::Forecast { report, months } => {
            let months = months.unwrap_or(engine.config().forecast_months);
            let forecast = engine.monthly_forecast(report.owner.as_deref(), months)?;
            if report.json {
                return print_json(&forecast);
            }
            for month in &forecast {
                println!(
                    "{}  {:>3} deals  expected {:>14}  weighted {:>14}",
                    month.month.format("%Y-%m"),
                    month.count,
                    format_won(month.expected_total),
                    format_won(month.weighted_total)
                );
            }
        }
        FunnelCommand::Conversion(report) => {
            let rates = engine.conversion_rates(report.owner.as_deref())?;
            if report.json {
                return print_json(&rates);
            }
            for rate in &rates {
                println!(
                    "{:<6} -> {:<6} {:>4}/{:<4} {:>5.1}%",
                    rate.from.info().display_name,
                    rate.to.info().display_name,
                    rate.converted,
                    rate.entered,
                    rate.rate
                );
            }
        }
        FunnelCommand::Bottlenecks(report) => {
            let bottlenecks = engine.bottlenecks(report.owner.as_deref())?;
            if report.json {
                return print_json(&bottlenecks);
            }
            for b in &bottlenecks {
                println!(
                    "{:<6} {:>4} deals  {:>5.1} days (expected {})  {}{}",
                    b.stage.info().display_name,
                    b.count,
                    b.actual_days,
                    b.expected_days,
                    b.severity,
                    if b.is_bottleneck { "  BOTTLENECK" } else { "" }
                );
            }
        }
        FunnelCommand::Top { report, limit } => {
            let limit = limit.unwrap_or(engine.config().top_limit);
            let top = engine.top_opportunities(report.owner.as_deref(), limit)?;
            if report.json {
                return print_json(&top);
            }
            for opp in &top {
                print_opportunity_row(opp);
            }
        }
        FunnelCommand::WonLost(report) => {
            let summary = engine.won_lost_summary(report.owner.as_deref())?;
            if report.json {
                return print_json(&summary);
            }
            println!(
                "Won:  {} ({} won)",
                summary.won,
                format_won(summary.won_revenue)
            );
            println!("Lost: {}", summary.lost);
            println!("Win rate: {:.1}%", summary.win_rate);
        }
    }
    Ok(())
}

fn handle_maint(config: &Config, cmd: MaintCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let engine = FunnelEngine::new(&storage).with_config(&config.funnel);

    match cmd {
        MaintCommand::Repair => {
            let report = engine.repair_residue()?;
            println!(
                "Examined {}, fixed {}, deleted {}",
                report.examined,
                report.fixed,
                report.deleted.len()
            );
        }
        MaintCommand::CleanupYear { year, dry_run } => {
            let report = engine.cleanup_year(year, dry_run)?;
            println!(
                "{}: {} won and {} quote-lost opportunities {}",
                report.year,
                report.won.len(),
                report.quote_lost.len(),
                if report.dry_run { "would be removed" } else { "removed" }
            );
        }
        MaintCommand::SyncWon => {
            let won = engine.sync_won()?;
            println!("{} opportunities marked won", won.len());
        }
        MaintCommand::Backfill { dry_run } => {
            let report = engine.backfill(dry_run)?;
            println!(
                "{} schedules linked, {} opportunities created{}",
                report.linked,
                report.created,
                if report.dry_run { " (dry run)" } else { "" }
            );
        }
        MaintCommand::Recompute => {
            let count = engine.recompute_all()?;
            println!("{count} opportunities recomputed");
        }
        MaintCommand::ExpireQuotes => {
            let expired = engine.expire_quotes()?;
            println!("{} quotes expired", expired.len());
        }
    }
    Ok(())
}

fn handle_backup(config: &Config, cmd: BackupCommand) -> Result<()> {
    let store = BackupStore::new(config.backup_dir());
    match cmd {
        BackupCommand::Create => {
            let storage = open_storage(config)?;
            let manifest = store.create(&storage, Utc::now())?;
            println!(
                "Backup {} ({} bytes)",
                store.dir().join(&manifest.file).display(),
                manifest.size_bytes
            );
        }
        BackupCommand::List { json } => {
            let backups = store.list()?;
            if json {
                return print_json(&backups);
            }
            for backup in &backups {
                println!(
                    "{}  {:>10} bytes  {}",
                    backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                    backup.size_bytes,
                    backup.file
                );
            }
        }
        BackupCommand::Verify { name } => {
            let manifest = store.verify(&name)?;
            println!("{} is intact ({})", manifest.file, manifest.blake3);
        }
        BackupCommand::Prune { keep } => {
            let removed = store.prune(keep.unwrap_or(config.backup.keep))?;
            println!("{} backups removed", removed.len());
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                return print_json(config);
            }
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[Storage]");
            println!("  Database path:        {}", config.database_path().display());
            println!();
            println!("[Funnel]");
            println!(
                "  Bottleneck threshold: {}",
                config.funnel.bottleneck_count_threshold
            );
            println!("  Forecast months:      {}", config.funnel.forecast_months);
            println!("  Top limit:            {}", config.funnel.top_limit);
            println!();
            println!("[Grading]");
            println!(
                "  Activity window:      {} days",
                config.grading.activity_window_days
            );
            println!(
                "  Regrade after:        {} days",
                config.grading.regrade_after_days
            );
            println!(
                "  AI command:           {}",
                config.grading.ai_command.as_deref().unwrap_or("(none)")
            );
            println!();
            println!("[Backup]");
            println!("  Directory:            {}", config.backup_dir().display());
            println!("  Keep:                 {}", config.backup.keep);
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
