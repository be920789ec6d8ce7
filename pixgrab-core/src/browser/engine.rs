use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::BrowserResult;

/// Launches browser processes. One implementation drives a real Chromium
/// over CDP; tests substitute in-memory fakes.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserHandle>>;
}

/// A connected browser process. Shared across concurrent extraction
/// attempts; sessions spawned from it are not.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Opens one isolated session: fresh context, fixed fingerprint,
    /// resource blocking installed, network capture hook armed.
    async fn open_session(&self) -> BrowserResult<Box<dyn PageSession>>;

    async fn close(&self) -> BrowserResult<()>;
}

/// Capability set one extraction attempt needs from its page. Exclusively
/// owned by the attempt; must be closed at attempt end regardless of
/// outcome.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    /// Evaluates an expression in the page, decoding the completion value.
    async fn evaluate(&self, script: &str) -> BrowserResult<Value>;

    /// Force-clicks the first element matched by the ordered selector
    /// list. `false` when nothing matched.
    async fn click_first(&self, selectors: &[String]) -> BrowserResult<bool>;

    /// Human-like email entry: focus the first matching input, clear it,
    /// type with a per-key delay, then tab out. `false` when no selector
    /// matched.
    async fn focus_and_type(
        &self,
        selectors: &[String],
        text: &str,
        key_delay: Duration,
    ) -> BrowserResult<bool>;

    /// Whether the given text currently appears in the visible document.
    async fn is_text_visible(&self, needle: &str) -> BrowserResult<bool>;

    /// Clicks the `index`-th visible element whose label matches the
    /// case-insensitive pattern. `false` when the index is out of range.
    async fn click_labeled(&self, pattern: &str, index: usize) -> BrowserResult<bool>;

    async fn read_clipboard(&self) -> BrowserResult<String>;

    /// Response bodies captured so far by the pre-navigation network hook.
    async fn captured_responses(&self) -> BrowserResult<Vec<String>>;

    /// Values and inner text of every visible input and textarea.
    async fn input_values(&self) -> BrowserResult<Vec<String>>;

    /// Visible text of the main document.
    async fn visible_text(&self) -> BrowserResult<String>;

    /// Visible text of every reachable child frame.
    async fn frame_texts(&self) -> BrowserResult<Vec<String>>;

    /// Full HTML snapshot, for diagnostics.
    async fn page_html(&self) -> BrowserResult<String>;

    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;

    async fn close(&self) -> BrowserResult<()>;
}
