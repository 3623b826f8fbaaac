//! swiftcheck E2E conformance runner
//!
//! This crate drives a web-based Singlish to Sinhala transliterator through a
//! real browser and checks its output against a fixture table:
//! - Opens one isolated Playwright session per fixture
//! - Injects input in bulk or keystroke by keystroke
//! - Waits for the debounced output to stop changing before reading it
//! - Compares the read text to the expected output byte for byte
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 FixtureRunner<F: SessionFactory>            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run(&FixtureSet) -> RunReport                              │
//! │    ├── probe::wait_for_reachable()    (aborts the run)      │
//! │    └── workers pull fixtures, one session per execution     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver<P: BrowserPage>                                 │
//! │    ├── open / clear_input                                   │
//! │    ├── set_input_bulk / type_input_incremental              │
//! │    ├── await_output_settled  (settle::await_settled)        │
//! │    └── read_output                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserPage implementations                                │
//! │    ├── bridge::PlaywrightSession  (node + playwright)       │
//! │    └── fake::FakeTranslatorPage   (in-process, for tests)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod driver;
pub mod error;
pub mod fake;
pub mod page;
pub mod probe;
pub mod report;
pub mod runner;
pub mod settle;

pub use bridge::{PlaywrightSession, PlaywrightTarget};
pub use config::{Browser, HarnessConfig, Selectors, Timeouts};
pub use driver::{ObservedResult, PageDriver};
pub use error::{E2eError, E2eResult, FailureKind};
pub use fake::{FakeOptions, FakeTarget};
pub use page::{BrowserPage, SessionFactory};
pub use report::{FixtureOutcome, ReportFormat, RunReport};
pub use runner::FixtureRunner;
