//! Domain types for salesnote.
//!
//! Records read from storage carry their `id`; the `New*` types are the
//! inputs accepted by storage and the funnel engine.

pub mod customer;
pub mod delivery;
pub mod history;
pub mod opportunity;
pub mod product;
pub mod quote;
pub mod schedule;
pub mod stage;
pub mod validate;

pub use customer::{Company, Customer, CustomerStatus, Department, Grade, NewCustomer, Priority};
pub use delivery::{
    format_won, parse_items_text, sum_amounts, vat_total, DeliveryItem, NewDeliveryItem, ParsedItem,
};
pub use history::{ActionType, History, NewHistory, ServiceStatus};
pub use opportunity::Opportunity;
pub use product::{NewProduct, Product, ProductCategory, Promotion};
pub use quote::{
    line_subtotal, DiscountRate, NewQuote, NewQuoteItem, Quote, QuoteItem, QuoteStage, QuoteTotals,
};
pub use schedule::{ActivityType, NewSchedule, Schedule, ScheduleChanges, ScheduleStatus};
pub use stage::{Stage, StageEntry, StageInfo};
