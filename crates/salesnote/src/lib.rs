//! `salesnote` - Sales activity notes and funnel tracking for B2B sales teams
//!
//! This library keeps customers, visit schedules, activity history and
//! delivered items in `SQLite`, and drives an opportunity through the sales
//! funnel from every funnel activity. It also aggregates revenue and backlog
//! per opportunity, prices quotes from a product catalogue, reports on the
//! pipeline and grades customers.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod funnel;
pub mod grading;
pub mod logging;
pub mod model;
pub mod storage;

pub use backup::{BackupManifest, BackupStore};
pub use config::Config;
pub use error::{Error, Result};
pub use funnel::{Clock, FunnelEngine};
pub use grading::{GradeResult, Grader};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
