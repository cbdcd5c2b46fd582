//! Workflows built from the API, CRM and report layers.

pub mod notify;
pub mod overdue;

pub use notify::{build_message, is_send_day, send_if_due, send_log};
pub use overdue::{OverdueRun, RunReport};
