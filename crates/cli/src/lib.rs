//! uiflow CLI
//!
//! Command-line front end: configuration layering, scenario listing and
//! validation, suite execution, and report output.

pub mod commands;
pub mod output;
