//! uiflow Scenario Runner
//!
//! This crate drives browser acceptance scenarios against a remote web
//! application:
//! - Parses declarative YAML scenario groups
//! - Runs steps strictly in order against one page per scenario
//! - Reuses one authenticated session per credential
//! - Checks text, URL and count expectations with explicit tolerances
//! - Audits pages with axe-core
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SuiteRunner                              │
//! │    ├── plan(groups, filter) -> [Job]                        │
//! │    ├── SessionCache::get_or_create(credential) -> Session   │
//! │    ├── DriverFactory::open(viewport) -> PageDriver          │
//! │    └── ScenarioRunner::run(scenario, session, page)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioGroup (YAML)                                       │
//! │    ├── name, credential?, viewport?, before_each: [Step]    │
//! │    └── scenarios: [Scenario]                                │
//! │          ├── navigate { url }                               │
//! │          ├── fill / clear / click / select { target }       │
//! │          ├── wait_for_visible { target, timeout_ms? }       │
//! │          ├── assert_text / assert_url / assert_count        │
//! │          ├── read { source } -> ${bind}                     │
//! │          └── accessibility_scan { strict? }                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver backends                                        │
//! │    ├── PlaywrightPage (node bridge, JSON over stdio)        │
//! │    └── WebDriverPage (W3C WebDriver over HTTP)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod a11y;
pub mod assert;
pub mod bindings;
pub mod driver;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod session;
pub mod spec;
pub mod suite;
pub mod target;
pub mod webdriver;

pub use a11y::{AccessibilityPolicy, AccessibilityProbe, Violation};
pub use bindings::Bindings;
pub use driver::{factory_for, DriverFactory, ElementRef, PageDriver};
pub use error::{E2eError, E2eResult, FailureKind};
pub use runner::{FailedStep, Phase, ScenarioResult, ScenarioRunner, ScenarioStatus, StepResult};
pub use session::{Authenticator, FormLogin, Session, SessionCache};
pub use spec::{Locator, Pick, Scenario, ScenarioGroup, Step, Target};
pub use suite::{Job, SuiteFilter, SuiteReport, SuiteRunner};
