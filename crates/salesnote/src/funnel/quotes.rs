//! Quote workflow.
//!
//! Quotes hang off a schedule and carry product lines priced from the
//! catalogue. Adding a line recomputes the quote's money fields; turning a
//! quote into a delivery counts its products as sold.

use std::collections::BTreeSet;

use chrono::Days;
use tracing::{debug, info};

use super::FunnelEngine;
use crate::error::{Error, Result};
use crate::model::quote::{line_subtotal, DEFAULT_QUOTE_PROBABILITY};
use crate::model::{
    ActionType, ActivityType, NewQuote, NewQuoteItem, Quote, QuoteItem, QuoteStage, QuoteTotals,
};
use crate::storage::Storage;

impl FunnelEngine<'_> {
    /// Open a quote for a schedule.
    ///
    /// Customer and owner come from the schedule, as do the probability and
    /// expected close date when the input leaves them unset. Without a
    /// number one of the form `Q-YYYYMMDD-NNN` is issued.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or a service schedule and
    /// `NotFound` for an unknown schedule.
    pub fn create_quote(&self, new: &NewQuote) -> Result<Quote> {
        new.validate()?;
        let now = self.clock().now();
        let today = self.clock().today();
        let valid_days = u64::from(self.config().quote_valid_days);

        self.storage().transaction(|s| {
            let schedule = s.require_schedule(new.schedule_id)?;
            if schedule.activity_type == ActivityType::Service {
                return Err(Error::validation(format!(
                    "schedule {} is a service schedule and cannot carry a quote",
                    schedule.id
                )));
            }
            let valid_until = match new.valid_until {
                Some(day) => day,
                None => today
                    .checked_add_days(Days::new(valid_days))
                    .ok_or_else(|| Error::validation("quote validity is out of range"))?,
            };
            if valid_until < today {
                return Err(Error::validation(format!(
                    "quote cannot expire ({valid_until}) before it is issued ({today})"
                )));
            }
            let quote_number = match &new.quote_number {
                Some(number) => number.trim().to_string(),
                None => s.next_quote_number(today)?,
            };
            let probability = new
                .probability
                .or(schedule.probability)
                .unwrap_or(DEFAULT_QUOTE_PROBABILITY);

            let mut quote = Quote {
                id: 0,
                quote_number,
                schedule_id: schedule.id,
                customer_id: schedule.customer_id,
                owner: schedule.owner.clone(),
                quote_date: today,
                valid_until,
                stage: QuoteStage::Draft,
                discount_rate: new.discount_rate,
                totals: QuoteTotals::default(),
                probability,
                expected_close_date: new.expected_close_date.or(schedule.expected_close_date),
                converted_to_delivery: false,
                converted_history_id: None,
                notes: new.notes.clone(),
                customer_feedback: None,
                created_at: now,
                updated_at: now,
            };
            quote.id = s.insert_quote(&quote)?;
            info!(
                "Quote {} ({}) opened for schedule {}",
                quote.id, quote.quote_number, schedule.id
            );
            Ok(quote)
        })
    }

    /// Add a product line to an open quote and recompute its totals.
    ///
    /// Without a unit price the product's price on the current day applies.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, a closed quote, a retired
    /// product or totals that would not fit, and `NotFound` for unknown
    /// references.
    pub fn add_quote_item(&self, new: &NewQuoteItem) -> Result<QuoteItem> {
        new.validate()?;
        let now = self.clock().now();
        let today = self.clock().today();

        self.storage().transaction(|s| {
            let mut quote = open_quote(s, new.quote_id)?;
            let mut product = s.require_product(new.product_id)?;
            if !product.is_active {
                return Err(Error::validation(format!("product {product} is retired")));
            }

            let unit_price = new
                .unit_price
                .unwrap_or_else(|| product.current_price(today));
            let item = s.insert_quote_item(&QuoteItem {
                id: 0,
                quote_id: quote.id,
                product_id: product.id,
                quantity: new.quantity,
                unit_price,
                discount_rate: new.discount_rate,
                subtotal: line_subtotal(unit_price, new.quantity, new.discount_rate)?,
                description: new.description.clone(),
                sort_order: 0,
            })?;

            product.total_quoted += 1;
            product.updated_at = now;
            s.save_product(&product)?;

            refresh_totals(s, &mut quote)?;
            quote.updated_at = now;
            s.save_quote(&quote)?;
            debug!(
                "Quote {}: line {} for {}, total now {}",
                quote.id, item.id, product.product_code, quote.totals.total_amount
            );
            Ok(item)
        })
    }

    /// Move an open quote to another stage.
    ///
    /// Conversion goes through [`FunnelEngine::convert_quote`] instead.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a closed quote or a request to convert,
    /// and `NotFound` for an unknown quote.
    pub fn set_quote_stage(
        &self,
        quote_id: i64,
        stage: QuoteStage,
        feedback: Option<String>,
    ) -> Result<Quote> {
        if stage == QuoteStage::Converted {
            return Err(Error::validation(
                "quotes are converted by linking a delivery history",
            ));
        }
        let now = self.clock().now();

        self.storage().transaction(|s| {
            let mut quote = open_quote(s, quote_id)?;
            let from = quote.stage;
            quote.stage = stage;
            if feedback.is_some() {
                quote.customer_feedback = feedback;
            }
            quote.updated_at = now;
            s.save_quote(&quote)?;
            info!("Quote {}: {} -> {}", quote.id, from, stage);
            Ok(quote)
        })
    }

    /// Mark a quote as turned into the delivery recorded by `history_id`.
    ///
    /// Every distinct product on the quote counts one more sale.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a closed quote or a history that is not
    /// a delivery of the same customer, and `NotFound` for unknown ids.
    pub fn convert_quote(&self, quote_id: i64, history_id: i64) -> Result<Quote> {
        let now = self.clock().now();

        self.storage().transaction(|s| {
            let mut quote = open_quote(s, quote_id)?;
            let history = s
                .get_history(history_id)?
                .ok_or_else(|| Error::not_found("history", history_id))?;
            if history.action_type != ActionType::DeliverySchedule {
                return Err(Error::validation(format!(
                    "history {history_id} is a {}, not a delivery",
                    history.action_type
                )));
            }
            if history.customer_id != Some(quote.customer_id) {
                return Err(Error::validation(format!(
                    "history {history_id} belongs to another customer than quote {quote_id}"
                )));
            }

            let products: BTreeSet<i64> = s
                .items_for_quote(quote.id)?
                .iter()
                .map(|item| item.product_id)
                .collect();
            for product_id in products {
                let mut product = s.require_product(product_id)?;
                product.total_sold += 1;
                product.updated_at = now;
                s.save_product(&product)?;
            }

            quote.stage = QuoteStage::Converted;
            quote.converted_to_delivery = true;
            quote.converted_history_id = Some(history_id);
            quote.updated_at = now;
            s.save_quote(&quote)?;
            info!(
                "Quote {} converted into delivery history {}",
                quote.id, history_id
            );
            Ok(quote)
        })
    }

    /// Expire open quotes whose validity ended before today.
    ///
    /// Returns the ids of the expired quotes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn expire_quotes(&self) -> Result<Vec<i64>> {
        let now = self.clock().now();
        let today = self.clock().today();

        self.storage().transaction(|s| {
            let mut expired = Vec::new();
            for mut quote in s.lapsed_quotes(today)? {
                quote.stage = QuoteStage::Expired;
                quote.updated_at = now;
                s.save_quote(&quote)?;
                expired.push(quote.id);
            }
            if !expired.is_empty() {
                info!("Expired {} quotes", expired.len());
            }
            Ok(expired)
        })
    }
}

fn open_quote(s: &Storage, quote_id: i64) -> Result<Quote> {
    let quote = s.require_quote(quote_id)?;
    if !quote.stage.is_open() {
        return Err(Error::validation(format!(
            "quote {} is {} and can no longer change",
            quote.quote_number, quote.stage
        )));
    }
    Ok(quote)
}

fn refresh_totals(s: &Storage, quote: &mut Quote) -> Result<()> {
    let lines = s.items_for_quote(quote.id)?;
    quote.recompute(lines.iter().map(|item| item.subtotal))
}
