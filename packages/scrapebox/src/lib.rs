//! Utilities for running scheduled collection jobs on a hosted scraping
//! box.
//!
//! Three pieces compose into a typical box:
//!
//! - [`JobGuard`] wraps a fallible job with failure logging, platform
//!   status reporting, and email alerting;
//! - [`run_or_schedule`] runs a job now and optionally keeps it on a
//!   daily schedule;
//! - [`populate`] bulk-loads extracted records into relational tables in
//!   bounded chunks, with replace-by-id or full-replace semantics and
//!   lazy table creation.
//!
//! ```ignore
//! let config = BoxConfig::from_env("alerts@example.com");
//! let guard = Arc::new(JobGuard::new(
//!     config.clone(),
//!     Arc::new(PlatformStatus::new(&config)),
//!     Arc::new(SmtpMailer::new(&config)),
//! ));
//!
//! run_or_schedule("collect", move || collect(pool.clone()), true, Some(guard), &config).await?;
//! ```

pub mod alert;
pub mod config;
pub mod error;
pub mod guard;
pub mod loader;
pub mod schedule;
pub mod status;
pub mod testing;

pub use alert::{compose_alert, AlertEmail, Mailer, SmtpMailer};
pub use config::BoxConfig;
pub use error::{AlertError, GuardError, LoaderError, SinkError, StatusError};
pub use guard::{JobFailure, JobGuard, JobOutcome};
pub use loader::{
    infer_columns, populate, sanitize_table_name, ColumnKind, ColumnSpec, LoadPlan, LoadReport,
    Payload, PostgresSink, Record, RecordSink, TableMode, TableReport, TableSpec,
};
pub use schedule::run_or_schedule;
pub use status::{BoxStatus, PlatformStatus, StatusApi};
