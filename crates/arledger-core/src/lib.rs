//! # arledger-core
//!
//! Accounts-receivable automation on top of the MYOB `AccountRight` API.
//!
//! This crate provides:
//! - Settings file loading and validation
//! - **API session** - authenticated requests with pagination, token refresh
//!   and reauthorization
//! - Overdue invoice query and per-customer summary
//! - **CRM alerts** - clearing and rewriting Syrinx customer alerts
//! - Tab-separated and Excel run logs
//! - Weekly log email

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod crm;
mod error;
pub mod overdue;
pub mod report;
pub mod service;

pub use api::{ApiSession, PendingRequest, RetryPolicy, SessionConfig};
pub use config::{Settings, ValidationError, ValidationResult, validate_settings};
pub use crm::{AlertUpdate, CustomerRecord, CustomerStore, DryRunStore, SqlServerStore};
pub use error::{Error, Result};
pub use overdue::{CustomerSummary, Invoice, OverdueQuery, Summary, build_overdue_url};
pub use report::ReportFiles;
pub use service::{OverdueRun, RunReport, send_if_due};
