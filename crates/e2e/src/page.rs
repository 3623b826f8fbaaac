//! Browser seam
//!
//! The driver only needs a handful of page primitives. Playwright provides
//! them in production (see [`crate::bridge`]); the in-process fake in
//! [`crate::fake`] provides them in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::E2eResult;

/// Stable identity of a DOM element within one session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub String);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of an element matched by a selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub handle: NodeHandle,

    /// Upper-case tag name, e.g. `DIV`
    pub tag: String,

    /// Explicit ARIA role attribute, if any
    #[serde(default)]
    pub role: Option<String>,

    /// `textContent`, untrimmed
    #[serde(default)]
    pub text: String,
}

impl NodeSnapshot {
    /// True for anything that accepts typed text
    pub fn is_text_entry(&self) -> bool {
        self.tag.eq_ignore_ascii_case("TEXTAREA")
            || self.tag.eq_ignore_ascii_case("INPUT")
            || self
                .role
                .as_deref()
                .map(|r| r.eq_ignore_ascii_case("textbox"))
                .unwrap_or(false)
    }
}

/// Outcome of a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    /// Main-document HTTP status, when the browser reports one
    pub status: Option<u16>,
}

impl Navigation {
    pub fn is_success(&self) -> bool {
        self.status.map(|s| (200..300).contains(&s)).unwrap_or(true)
    }
}

/// One browser page bound to the target for the duration of a case
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<Navigation>;

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> E2eResult<()>;

    /// Element with role `textbox` and the given accessible name
    async fn find_textbox(&mut self, accessible_name: &str) -> E2eResult<Option<NodeHandle>>;

    async fn clear(&mut self, node: &NodeHandle) -> E2eResult<()>;

    /// Replace the element's value in one operation
    async fn fill(&mut self, node: &NodeHandle, text: &str) -> E2eResult<()>;

    /// Type `text` key by key, appending to the current value
    async fn press_sequentially(
        &mut self,
        node: &NodeHandle,
        text: &str,
        delay: Duration,
    ) -> E2eResult<()>;

    /// All elements currently matching a CSS selector, in document order
    async fn query_nodes(&mut self, selector: &str) -> E2eResult<Vec<NodeSnapshot>>;

    async fn close(&mut self) -> E2eResult<()>;
}

/// Creates isolated sessions, one per case execution
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Page: BrowserPage + 'static;

    async fn open_session(&self) -> E2eResult<Self::Page>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn node(tag: &str, role: Option<&str>) -> NodeSnapshot {
        NodeSnapshot {
            handle: NodeHandle("n1".into()),
            tag: tag.into(),
            role: role.map(String::from),
            text: String::new(),
        }
    }

    #[test_case("TEXTAREA", None, true ; "textarea")]
    #[test_case("input", None, true ; "lowercase input")]
    #[test_case("DIV", Some("textbox"), true ; "div with textbox role")]
    #[test_case("DIV", Some("region"), false ; "div with other role")]
    #[test_case("DIV", None, false ; "plain div")]
    fn test_is_text_entry(tag: &str, role: Option<&str>, expected: bool) {
        assert_eq!(node(tag, role).is_text_entry(), expected);
    }

    #[test]
    fn test_navigation_success() {
        assert!(Navigation { status: Some(204) }.is_success());
        assert!(Navigation { status: None }.is_success());
        assert!(!Navigation { status: Some(404) }.is_success());
    }
}
