//! Harness configuration
//!
//! Every wait in the harness is configurable. The defaults are the values
//! that proved sufficient against the public swifttranslator.com deployment;
//! they carry no meaning beyond that.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Page under test
    pub target_url: String,

    /// Directory for the JSON report
    pub output_dir: PathBuf,

    /// Wait and timeout settings
    pub timeouts: Timeouts,

    /// How the input and output regions are located
    pub selectors: Selectors,

    /// Browser backend settings
    pub browser: BrowserConfig,

    /// Run scheduling options
    pub run: RunOptions,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target_url: "https://www.swifttranslator.com/".to_string(),
            output_dir: PathBuf::from("test-results"),
            timeouts: Timeouts::default(),
            selectors: Selectors::default(),
            browser: BrowserConfig::default(),
            run: RunOptions::default(),
        }
    }
}

/// Wait settings, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Extra settle time after network-idle, for client-side hydration
    pub page_load_settle_ms: u64,

    /// Settle time after clearing the input
    pub after_clear_ms: u64,

    /// Quiescence window after output first becomes non-empty
    pub translation_quiescence_ms: u64,

    /// Cooldown between cases
    pub between_cases_ms: u64,

    /// Delay between keystrokes when typing incrementally
    pub keystroke_delay_ms: u64,

    /// Wait after typing the partial prefix of an incremental fixture
    pub partial_settle_ms: u64,

    /// Hard limit for output to appear at all
    pub output_wait_ms: u64,

    /// Navigation and network-idle limit
    pub navigation_ms: u64,

    /// Poll interval while waiting for output
    pub poll_interval_ms: u64,

    /// Budget for one whole case
    pub case_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load_settle_ms: 2000,
            after_clear_ms: 1000,
            translation_quiescence_ms: 3000,
            between_cases_ms: 2000,
            keystroke_delay_ms: 150,
            partial_settle_ms: 1500,
            output_wait_ms: 10_000,
            navigation_ms: 30_000,
            poll_interval_ms: 100,
            case_timeout_ms: 120_000,
        }
    }
}

impl Timeouts {
    pub fn page_load_settle(&self) -> Duration {
        Duration::from_millis(self.page_load_settle_ms)
    }

    pub fn after_clear(&self) -> Duration {
        Duration::from_millis(self.after_clear_ms)
    }

    pub fn translation_quiescence(&self) -> Duration {
        Duration::from_millis(self.translation_quiescence_ms)
    }

    pub fn between_cases(&self) -> Duration {
        Duration::from_millis(self.between_cases_ms)
    }

    pub fn keystroke_delay(&self) -> Duration {
        Duration::from_millis(self.keystroke_delay_ms)
    }

    pub fn partial_settle(&self) -> Duration {
        Duration::from_millis(self.partial_settle_ms)
    }

    pub fn output_wait(&self) -> Duration {
        Duration::from_millis(self.output_wait_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }
}

/// Element location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Accessible name of the text box (role `textbox`)
    pub input_name: String,

    /// CSS pattern shared by the output region(s). May also match the input.
    pub output_container: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            input_name: "Input Your Singlish Text Here.".to_string(),
            output_container:
                "div.w-full.h-80.p-3.rounded-lg.ring-1.ring-slate-300.whitespace-pre-wrap"
                    .to_string(),
        }
    }
}

/// Browser engine driven through Playwright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Playwright backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// `node_modules` directory that contains `playwright` (exported as NODE_PATH)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_path: Option<PathBuf>,

    /// Limit for a single bridge request to answer
    pub bridge_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_path: None,
            bridge_timeout_ms: 60_000,
        }
    }
}

impl BrowserConfig {
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }
}

/// Scheduling options for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Concurrent workers, each with its own sessions
    pub workers: usize,

    /// Executions per fixture; differing observations flag the fixture flaky
    pub repeat: u32,

    /// Clear and re-enter the input once more and require the same output
    pub check_idempotence: bool,

    /// Probe the target over HTTP before running any case
    pub preflight: bool,

    /// Probe attempts before the run is aborted
    pub preflight_attempts: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            repeat: 1,
            check_idempotence: false,
            preflight: true,
            preflight_attempts: 3,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !(self.target_url.starts_with("http://") || self.target_url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "target_url must be http(s): {}",
                self.target_url
            )));
        }
        if self.run.workers == 0 {
            return Err(E2eError::Config("workers must be at least 1".into()));
        }
        if self.run.repeat == 0 {
            return Err(E2eError::Config("repeat must be at least 1".into()));
        }
        if self.selectors.input_name.is_empty() || self.selectors.output_container.is_empty() {
            return Err(E2eError::Config("selectors must not be empty".into()));
        }
        Ok(())
    }

    /// Path of the JSON report inside the output directory
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("swiftcheck-report.json")
    }
}
