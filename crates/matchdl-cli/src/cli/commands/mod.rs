//! CLI command handlers, one file per command.

mod fetch_daily;
mod status;

pub use fetch_daily::run_fetch_daily;
pub use status::run_status;

#[cfg(test)]
pub(crate) use fetch_daily::{execute, format_summary};
#[cfg(test)]
pub(crate) use status::format_status;
