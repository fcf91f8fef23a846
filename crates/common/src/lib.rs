//! uiflow Common Library
//!
//! Configuration, fixture data, and identity types shared by the scenario
//! runner and the command-line front end.

pub mod config;
pub mod error;
pub mod fixture;
pub mod types;

pub use config::{A11yConfig, LoginConfig, PlaywrightSettings, RunConfig, WebDriverSettings};
pub use error::{Error, Result};
pub use fixture::{Address, Fixture, UserRecord};
pub use types::*;

/// uiflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
