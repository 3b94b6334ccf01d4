//! Storage layer for salesnote.
//!
//! This module provides `SQLite`-based persistent storage for companies,
//! customers, schedules, histories, delivery items, opportunities, products
//! and quotes.
//! Entity-specific queries live in the submodules as further `impl Storage`
//! blocks.

mod customers;
mod histories;
mod items;
pub mod migrations;
mod opportunities;
mod products;
mod quotes;
mod schedules;
pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::{Connection, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{to_sql_error, Error, Result};

pub use items::{PurchaseEvent, PurchaseLine};
pub use opportunities::OpportunityFilter;
pub use quotes::QuoteFilter;
pub use schedules::ScheduleFilter;

/// Storage engine for sales records.
///
/// Wraps a single `SQLite` connection. Multi-statement operations go through
/// [`Storage::transaction`].
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this storage lives only in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a database error if the transaction
    /// cannot be started or committed.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` inside a transaction that is always rolled back.
    ///
    /// Used for dry runs: `f` sees its own writes, nothing is kept.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a database error if the transaction
    /// cannot be started or rolled back.
    pub fn rehearse<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.rollback()?;
        Ok(value)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |table: &str| -> Result<i64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(n)
        };

        let open_opportunities: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM opportunities
             WHERE current_stage NOT IN ('won', 'lost', 'quote_lost')",
            [],
            |row| row.get(0),
        )?;

        let db_size_bytes = if self.is_in_memory() {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            companies: count("companies")?,
            customers: count("customers")?,
            schedules: count("schedules")?,
            histories: count("histories")?,
            delivery_items: count("delivery_items")?,
            opportunities: count("opportunities")?,
            open_opportunities,
            products: count("products")?,
            quotes: count("quotes")?,
            schema_version: migrations::get_schema_version(&self.conn)?,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of companies.
    pub companies: i64,
    /// Number of customers.
    pub customers: i64,
    /// Number of schedules.
    pub schedules: i64,
    /// Number of history entries.
    pub histories: i64,
    /// Number of delivery items.
    pub delivery_items: i64,
    /// Number of opportunities.
    pub opportunities: i64,
    /// Opportunities not yet won or lost.
    pub open_opportunities: i64,
    /// Number of catalogue products.
    pub products: i64,
    /// Number of quotes.
    pub quotes: i64,
    /// Schema version recorded in the database.
    pub schema_version: i32,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Read a text column into a domain enum.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(to_sql_error)
}

/// Read an optional text column into a domain enum.
pub(crate) fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = Error>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(to_sql_error)).transpose()
}

/// Convert a `usize` limit into an SQL `LIMIT` value.
pub(crate) fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

    use super::Storage;
    use crate::model::{ActivityType, Customer, NewCustomer, NewSchedule};

    pub fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn ten_am() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap()
    }

    /// A customer at a fresh company and department.
    pub fn create_customer(storage: &Storage, owner: &str, name: &str) -> Customer {
        let now = ts(2024, 1, 1);
        let company = storage
            .insert_company(&format!("{name} University"), now)
            .unwrap();
        let department = storage.insert_department(company.id, "Chemistry", now).unwrap();
        storage
            .insert_customer(
                &NewCustomer {
                    owner: owner.to_string(),
                    customer_name: Some(name.to_string()),
                    company_id: company.id,
                    department_id: department.id,
                    ..Default::default()
                },
                now,
            )
            .unwrap()
    }

    pub fn new_schedule(customer_id: i64, activity: ActivityType, day: NaiveDate) -> NewSchedule {
        NewSchedule::new("kim", customer_id, activity, day, ten_am())
    }
}
