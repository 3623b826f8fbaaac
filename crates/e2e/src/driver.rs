//! Page driver for a debounced text-transformation UI
//!
//! Wraps a [`BrowserPage`] with the type / wait / read cycle the conformance
//! cases need. The input box and the output region share the same styling on
//! the target, so the output is located structurally: match the output
//! container pattern, then drop anything that is a text-entry element or is
//! the input handle itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::{Selectors, Timeouts};
use crate::error::{E2eError, E2eResult};
use crate::page::{BrowserPage, NodeHandle, NodeSnapshot};
use crate::settle::{await_settled, Probe, Settle, SettleOptions};

/// Text read from the output region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResult {
    /// Output text with leading/trailing whitespace removed
    pub text: String,

    /// Time since the last input injection
    pub elapsed_ms: u64,
}

/// Pick the first output candidate that is not the input control
pub fn select_output<'a>(
    candidates: &'a [NodeSnapshot],
    input: Option<&NodeHandle>,
) -> Option<&'a NodeSnapshot> {
    candidates
        .iter()
        .find(|node| !node.is_text_entry() && Some(&node.handle) != input)
}

/// First non-input candidate whose trimmed text is non-empty
fn qualifying_output<'a>(
    candidates: &'a [NodeSnapshot],
    input: Option<&NodeHandle>,
) -> Option<&'a NodeSnapshot> {
    candidates.iter().find(|node| {
        !node.is_text_entry() && Some(&node.handle) != input && !node.text.trim().is_empty()
    })
}

/// Polls the output region for qualifying text
struct OutputProbe<'a, P> {
    page: &'a mut P,
    selector: &'a str,
    input: Option<&'a NodeHandle>,
}

#[async_trait]
impl<'a, P: BrowserPage> Probe<NodeSnapshot> for OutputProbe<'a, P> {
    async fn probe(&mut self) -> E2eResult<Option<NodeSnapshot>> {
        let candidates = self.page.query_nodes(self.selector).await?;
        Ok(qualifying_output(&candidates, self.input).cloned())
    }
}

/// Drives one session of the target page
pub struct PageDriver<P: BrowserPage> {
    page: P,
    selectors: Selectors,
    timeouts: Timeouts,
    input: Option<NodeHandle>,
    output: Option<NodeHandle>,
    input_at: Option<Instant>,
}

impl<P: BrowserPage> PageDriver<P> {
    pub fn new(page: P, selectors: Selectors, timeouts: Timeouts) -> Self {
        Self {
            page,
            selectors,
            timeouts,
            input: None,
            output: None,
            input_at: None,
        }
    }

    /// Navigate, wait for network-idle, then wait the page-load settle delay
    pub async fn open(&mut self, target_url: &str) -> E2eResult<()> {
        debug!("Opening {}", target_url);
        let limit = self.timeouts.navigation();

        let navigation = self
            .page
            .goto(target_url, limit)
            .await
            .map_err(|e| navigation_error(target_url, e))?;

        if !navigation.is_success() {
            return Err(E2eError::Navigation {
                url: target_url.to_string(),
                reason: format!("HTTP {}", navigation.status.unwrap_or_default()),
            });
        }

        self.page
            .wait_for_network_idle(limit)
            .await
            .map_err(|e| navigation_error(target_url, e))?;

        sleep(self.timeouts.page_load_settle()).await;
        self.input = None;
        self.output = None;
        Ok(())
    }

    /// Clear the input box and wait the post-clear settle delay
    pub async fn clear_input(&mut self) -> E2eResult<()> {
        let input = self.locate_input().await?;
        self.page.clear(&input).await?;
        sleep(self.timeouts.after_clear()).await;
        Ok(())
    }

    /// Replace the input content in one operation
    pub async fn set_input_bulk(&mut self, text: &str) -> E2eResult<()> {
        let input = self.locate_input().await?;
        debug!(chars = text.chars().count(), "Filling input");
        self.input_at = Some(Instant::now());
        self.page.fill(&input, text).await
    }

    /// Type `text` key by key after the current content
    pub async fn type_input_incremental(&mut self, text: &str) -> E2eResult<()> {
        let input = self.locate_input().await?;
        debug!(chars = text.chars().count(), "Typing input");
        self.input_at = Some(Instant::now());
        self.page
            .press_sequentially(&input, text, self.timeouts.keystroke_delay())
            .await
    }

    /// Wait until non-input output is non-empty and stays so for one
    /// quiescence window. Returns the settled (untrimmed) text and remembers
    /// which region it came from for [`read_output`](Self::read_output).
    pub async fn await_output_settled(&mut self, timeout: Duration) -> E2eResult<String> {
        let options = SettleOptions {
            poll_interval: self.timeouts.poll_interval(),
            quiescence: self.timeouts.translation_quiescence(),
            timeout,
        };
        let mut probe = OutputProbe {
            page: &mut self.page,
            selector: &self.selectors.output_container,
            input: self.input.as_ref(),
        };
        let settled = await_settled(options, &mut probe).await?;

        match settled {
            Settle::Settled(node) => {
                self.output = Some(node.handle);
                Ok(node.text)
            }
            Settle::TimedOut { waited } => Err(E2eError::TranslationTimeout {
                waited_ms: waited.as_millis() as u64,
            }),
            Settle::Pending => Err(E2eError::TranslationTimeout {
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Current output text, trimmed at both ends only.
    ///
    /// Reads the region accepted by the last settle wait while it is still
    /// present. Otherwise reads the first non-input candidate, even if it is
    /// empty.
    pub async fn read_output(&mut self) -> E2eResult<ObservedResult> {
        let candidates = self.page.query_nodes(&self.selectors.output_container).await?;
        let settled = self
            .output
            .as_ref()
            .and_then(|handle| candidates.iter().find(|node| &node.handle == handle));
        let output = settled
            .or_else(|| select_output(&candidates, self.input.as_ref()))
            .ok_or_else(|| {
                E2eError::ElementNotFound(format!(
                    "output region matching {}",
                    self.selectors.output_container
                ))
            })?;

        let elapsed_ms = self
            .input_at
            .map(|at| at.elapsed().as_millis() as u64)
            .unwrap_or_default();

        Ok(ObservedResult {
            text: output.text.trim().to_string(),
            elapsed_ms,
        })
    }

    /// End the session
    pub async fn close(mut self) -> E2eResult<()> {
        self.page.close().await
    }

    async fn locate_input(&mut self) -> E2eResult<NodeHandle> {
        let handle = self
            .page
            .find_textbox(&self.selectors.input_name)
            .await?
            .ok_or_else(|| {
                E2eError::ElementNotFound(format!("textbox named {:?}", self.selectors.input_name))
            })?;
        self.input = Some(handle.clone());
        Ok(handle)
    }
}

fn navigation_error(url: &str, err: E2eError) -> E2eError {
    match err {
        E2eError::Navigation { .. } => err,
        other => E2eError::Navigation {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeOptions, FakeTranslatorPage};

    fn snapshot(handle: &str, tag: &str, role: Option<&str>, text: &str) -> NodeSnapshot {
        NodeSnapshot {
            handle: NodeHandle(handle.into()),
            tag: tag.into(),
            role: role.map(String::from),
            text: text.into(),
        }
    }

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            page_load_settle_ms: 10,
            after_clear_ms: 10,
            translation_quiescence_ms: 500,
            keystroke_delay_ms: 20,
            partial_settle_ms: 400,
            output_wait_ms: 2000,
            poll_interval_ms: 50,
            ..Timeouts::default()
        }
    }

    fn driver(options: FakeOptions) -> PageDriver<FakeTranslatorPage> {
        let page = FakeTranslatorPage::new(options);
        PageDriver::new(page, Selectors::default(), fast_timeouts())
    }

    #[test]
    fn test_select_output_skips_input_like_nodes() {
        let input = NodeHandle("in".into());
        let candidates = vec![
            snapshot("in", "DIV", None, "mama"),
            snapshot("ta", "TEXTAREA", None, "mama"),
            snapshot("rb", "DIV", Some("textbox"), "mama"),
            snapshot("out", "DIV", None, " මම "),
        ];

        let chosen = select_output(&candidates, Some(&input)).unwrap();
        assert_eq!(chosen.handle, NodeHandle("out".into()));
    }

    #[test]
    fn test_qualifying_output_requires_text() {
        let candidates = vec![
            snapshot("ta", "TEXTAREA", None, "mama"),
            snapshot("o1", "DIV", None, "  \n"),
            snapshot("o2", "DIV", None, "මම"),
        ];
        assert_eq!(qualifying_output(&candidates, None).unwrap().text, "මම");
        assert!(qualifying_output(&candidates[..2], None).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_cycle_reads_settled_output() {
        let mut driver = driver(FakeOptions::default().translate("mama iskoolee inne", "මම ඉස්කෝලේ ඉන්නේ"));

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.set_input_bulk("mama iskoolee inne").await.unwrap();
        driver.await_output_settled(Duration::from_secs(2)).await.unwrap();

        let observed = driver.read_output().await.unwrap();
        assert_eq!(observed.text, "මම ඉස්කෝලේ ඉන්නේ");
        assert!(observed.elapsed_ms >= 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_output_is_not_read_early() {
        // The fake first renders half of the translation, then the rest.
        let mut driver = driver(
            FakeOptions::default()
                .translate("mama gedhara inne", "මම ගෙදර ඉන්නේ")
                .streaming(true),
        );

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.set_input_bulk("mama gedhara inne").await.unwrap();
        let settled = driver.await_output_settled(Duration::from_secs(2)).await.unwrap();

        assert_eq!(settled, "මම ගෙදර ඉන්නේ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_internal_whitespace_is_preserved() {
        let mut driver = driver(
            FakeOptions::default().translate("mama heta gedhara naa \n enna epaa", "  මම හෙට ගෙදර නා \nඑන්න එපා \n"),
        );

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.set_input_bulk("mama heta gedhara naa \n enna epaa").await.unwrap();
        driver.await_output_settled(Duration::from_secs(2)).await.unwrap();

        assert_eq!(driver.read_output().await.unwrap().text, "මම හෙට ගෙදර නා \nඑන්න එපා");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_output_times_out() {
        let mut driver = driver(FakeOptions::default().silent(true));

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.set_input_bulk("mama").await.unwrap();

        let err = driver.await_output_settled(Duration::from_millis(800)).await.unwrap_err();
        assert!(matches!(err, E2eError::TranslationTimeout { waited_ms } if waited_ms >= 800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_textbox_is_element_not_found() {
        let mut driver = driver(FakeOptions::default().without_textbox());

        driver.open("https://fake.test/").await.unwrap();
        let err = driver.clear_input().await.unwrap_err();
        assert!(matches!(err, E2eError::ElementNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_is_navigation_error() {
        let mut driver = driver(FakeOptions::default().status(503));

        let err = driver.open("https://fake.test/").await.unwrap_err();
        assert!(matches!(err, E2eError::Navigation { ref reason, .. } if reason == "HTTP 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incremental_typing_appends() {
        let mut driver = driver(
            FakeOptions::default()
                .translate("mama kae", "මම කැ")
                .translate("mama kaeema kannavaa", "මම කෑම කන්නවා"),
        );

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.type_input_incremental("mama kae").await.unwrap();
        driver.await_output_settled(Duration::from_secs(2)).await.unwrap();
        assert_eq!(driver.read_output().await.unwrap().text, "මම කැ");

        driver.type_input_incremental("ema kannavaa").await.unwrap();
        driver.await_output_settled(Duration::from_secs(2)).await.unwrap();
        assert_eq!(driver.read_output().await.unwrap().text, "මම කෑම කන්නවා");
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_excluded_by_handle_identity() {
        // The input renders as a role-less DIV that also matches the output
        // selector and already holds non-empty text.
        let mut driver = driver(
            FakeOptions::default()
                .translate("mama", "මම")
                .editable_div_input(),
        );

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.set_input_bulk("mama").await.unwrap();
        let settled = driver.await_output_settled(Duration::from_secs(2)).await.unwrap();

        assert_eq!(settled, "මම");
        assert_eq!(driver.read_output().await.unwrap().text, "මම");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_follows_the_settled_region() {
        // An empty region matching the output selector precedes the real one.
        let mut driver = driver(
            FakeOptions::default()
                .translate("mama", "මම")
                .leading_empty_output(),
        );

        driver.open("https://fake.test/").await.unwrap();
        driver.clear_input().await.unwrap();
        driver.set_input_bulk("mama").await.unwrap();
        assert_eq!(driver.read_output().await.unwrap().text, "");

        let settled = driver.await_output_settled(Duration::from_secs(2)).await.unwrap();
        assert_eq!(settled, "මම");
        assert_eq!(driver.read_output().await.unwrap().text, "මම");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentry_is_idempotent() {
        let mut driver = driver(FakeOptions::default().translate("anee mandhaa", "අනේ මන්දා"));
        driver.open("https://fake.test/").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            driver.clear_input().await.unwrap();
            driver.set_input_bulk("anee mandhaa").await.unwrap();
            driver.await_output_settled(Duration::from_secs(2)).await.unwrap();
            seen.push(driver.read_output().await.unwrap().text);
        }

        assert_eq!(seen[0], "අනේ මන්දා");
        assert_eq!(seen[0], seen[1]);
    }
}
