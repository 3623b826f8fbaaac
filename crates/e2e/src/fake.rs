//! In-process stand-in for a debounced translator page
//!
//! Mirrors the markup quirks of the real target: the text box and the output
//! region carry the same class signature and both match the output selector.
//! Output is published only after a debounce, optionally streamed in two
//! halves. All timing uses `tokio::time`, so tests can run on a paused clock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::config::Selectors;
use crate::error::{E2eError, E2eResult};
use crate::page::{BrowserPage, Navigation, NodeHandle, NodeSnapshot, SessionFactory};

const INPUT_HANDLE: &str = "fake-input";
const OUTPUT_HANDLE: &str = "fake-output";
const PLACEHOLDER_HANDLE: &str = "fake-placeholder";

/// Behaviour of the fake target
#[derive(Debug, Clone)]
pub struct FakeOptions {
    translations: HashMap<String, Vec<String>>,
    debounce: Duration,
    streaming: bool,
    silent: bool,
    textbox: bool,
    editable_div_input: bool,
    leading_empty_output: bool,
    reentry_suffix: Option<String>,
    status: u16,
    selectors: Selectors,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            translations: HashMap::new(),
            debounce: Duration::from_millis(300),
            streaming: false,
            silent: false,
            textbox: true,
            editable_div_input: false,
            leading_empty_output: false,
            reentry_suffix: None,
            status: 200,
            selectors: Selectors::default(),
        }
    }
}

impl FakeOptions {
    /// Map an exact input value to an output. Unknown inputs are echoed.
    pub fn translate(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.translations.insert(input.into(), vec![output.into()]);
        self
    }

    /// Map an input to outputs that rotate with each new session
    pub fn translate_variants(mut self, input: impl Into<String>, outputs: Vec<String>) -> Self {
        self.translations.insert(input.into(), outputs);
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Render the first half of each translation one debounce before the rest
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Never render any output
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn without_textbox(mut self) -> Self {
        self.textbox = false;
        self
    }

    /// Render the text box as a plain `DIV` with no role attribute, so it can
    /// only be told apart from the output by handle identity
    pub fn editable_div_input(mut self) -> Self {
        self.editable_div_input = true;
        self
    }

    /// Render an always-empty region matching the output selector before
    /// the real output
    pub fn leading_empty_output(mut self) -> Self {
        self.leading_empty_output = true;
        self
    }

    /// Append `suffix` to every output once the input has been cleared more
    /// than once in the same page load
    pub fn drift_on_reentry(mut self, suffix: impl Into<String>) -> Self {
        self.reentry_suffix = Some(suffix.into());
        self
    }

    /// HTTP status reported for navigations
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Translate every fixture input to its expected output. Partial prefixes
    /// of incremental fixtures fall back to the echo, which is non-empty.
    pub fn from_fixtures<'a>(
        fixtures: impl IntoIterator<Item = &'a swiftcheck_common::Fixture>,
    ) -> Self {
        fixtures.into_iter().fold(Self::default(), |options, f| {
            options.translate(f.input.clone(), f.expected_output.clone())
        })
    }
}

/// One fake page session
#[derive(Debug)]
pub struct FakeTranslatorPage {
    options: Arc<FakeOptions>,
    session: usize,
    loaded: bool,
    closed: bool,
    clears: usize,
    value: String,
    committed: String,
    pending: Option<(Instant, String)>,
    on_close: Option<Arc<AtomicUsize>>,
}

impl FakeTranslatorPage {
    pub fn new(options: FakeOptions) -> Self {
        Self::for_session(Arc::new(options), 0, None)
    }

    fn for_session(options: Arc<FakeOptions>, session: usize, on_close: Option<Arc<AtomicUsize>>) -> Self {
        Self {
            options,
            session,
            loaded: false,
            closed: false,
            clears: 0,
            value: String::new(),
            committed: String::new(),
            pending: None,
            on_close,
        }
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Some(open) = &self.on_close {
                open.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn ensure_open(&self) -> E2eResult<()> {
        if self.closed {
            return Err(E2eError::Bridge("page already closed".into()));
        }
        Ok(())
    }

    fn ensure_input(&self, node: &NodeHandle) -> E2eResult<()> {
        self.ensure_open()?;
        if !self.loaded || node.0 != INPUT_HANDLE {
            return Err(E2eError::ElementNotFound(format!("stale handle {}", node)));
        }
        Ok(())
    }

    fn translate(&self, value: &str) -> String {
        if self.options.silent || value.is_empty() {
            return String::new();
        }
        let output = match self.options.translations.get(value) {
            Some(variants) if !variants.is_empty() => variants[self.session % variants.len()].clone(),
            _ => value.to_string(),
        };
        match &self.options.reentry_suffix {
            Some(suffix) if self.clears > 1 => output + suffix,
            _ => output,
        }
    }

    fn edited(&mut self) {
        let now = Instant::now();
        self.refresh(now);
        let output = self.translate(&self.value);
        self.pending = Some((now + self.options.debounce, output));
    }

    /// Output text visible at `now`
    fn refresh(&mut self, now: Instant) -> String {
        if let Some((due, full)) = &self.pending {
            if now >= *due {
                if self.options.streaming && now < *due + self.options.debounce {
                    let half = full.chars().count() / 2;
                    return full.chars().take(half.max(1)).collect();
                }
                self.committed = full.clone();
                self.pending = None;
            }
        }
        self.committed.clone()
    }
}

#[async_trait]
impl BrowserPage for FakeTranslatorPage {
    async fn goto(&mut self, _url: &str, _timeout: Duration) -> E2eResult<Navigation> {
        self.ensure_open()?;
        self.loaded = (200..300).contains(&self.options.status);
        self.clears = 0;
        self.value.clear();
        self.committed.clear();
        self.pending = None;
        Ok(Navigation {
            status: Some(self.options.status),
        })
    }

    async fn wait_for_network_idle(&mut self, _timeout: Duration) -> E2eResult<()> {
        self.ensure_open()
    }

    async fn find_textbox(&mut self, accessible_name: &str) -> E2eResult<Option<NodeHandle>> {
        self.ensure_open()?;
        let found = self.loaded
            && self.options.textbox
            && accessible_name == self.options.selectors.input_name;
        Ok(found.then(|| NodeHandle(INPUT_HANDLE.into())))
    }

    async fn clear(&mut self, node: &NodeHandle) -> E2eResult<()> {
        self.ensure_input(node)?;
        self.clears += 1;
        self.value.clear();
        self.committed.clear();
        self.pending = None;
        Ok(())
    }

    async fn fill(&mut self, node: &NodeHandle, text: &str) -> E2eResult<()> {
        self.ensure_input(node)?;
        self.value = text.to_string();
        self.edited();
        Ok(())
    }

    async fn press_sequentially(
        &mut self,
        node: &NodeHandle,
        text: &str,
        delay: Duration,
    ) -> E2eResult<()> {
        self.ensure_input(node)?;
        for ch in text.chars() {
            self.value.push(ch);
            self.edited();
            sleep(delay).await;
        }
        Ok(())
    }

    async fn query_nodes(&mut self, selector: &str) -> E2eResult<Vec<NodeSnapshot>> {
        self.ensure_open()?;
        if !self.loaded || selector != self.options.selectors.output_container {
            return Ok(Vec::new());
        }

        let output = self.refresh(Instant::now());
        let input_tag = if self.options.editable_div_input { "DIV" } else { "TEXTAREA" };

        let mut nodes = Vec::with_capacity(3);
        if self.options.textbox {
            nodes.push(NodeSnapshot {
                handle: NodeHandle(INPUT_HANDLE.into()),
                tag: input_tag.into(),
                role: None,
                text: self.value.clone(),
            });
        }
        if self.options.leading_empty_output {
            nodes.push(NodeSnapshot {
                handle: NodeHandle(PLACEHOLDER_HANDLE.into()),
                tag: "DIV".into(),
                role: None,
                text: String::new(),
            });
        }
        nodes.push(NodeSnapshot {
            handle: NodeHandle(OUTPUT_HANDLE.into()),
            tag: "DIV".into(),
            role: None,
            text: output,
        });
        Ok(nodes)
    }

    async fn close(&mut self) -> E2eResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for FakeTranslatorPage {
    fn drop(&mut self) {
        self.release();
    }
}

/// Session factory over the fake page
#[derive(Debug, Clone)]
pub struct FakeTarget {
    options: Arc<FakeOptions>,
    opened: Arc<AtomicUsize>,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

impl FakeTarget {
    pub fn new(options: FakeOptions) -> Self {
        Self {
            options: Arc::new(options),
            opened: Arc::new(AtomicUsize::new(0)),
            open_now: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions created so far
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions created but not yet closed
    pub fn sessions_open(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open sessions
    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeTarget {
    type Page = FakeTranslatorPage;

    async fn open_session(&self) -> E2eResult<FakeTranslatorPage> {
        let session = self.opened.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        Ok(FakeTranslatorPage::for_session(
            self.options.clone(),
            session,
            Some(self.open_now.clone()),
        ))
    }
}
