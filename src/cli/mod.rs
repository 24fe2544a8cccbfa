//! CLI Module
//!
//! Exit codes for the headless host, so scripts can tell failures apart

pub mod exit_codes;

pub use exit_codes::{exit_code_description, exit_code_for, ExitCodes};
