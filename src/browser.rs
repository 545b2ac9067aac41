//! The seam between the agent and the concrete browser driver.
//!
//! WebClaw does not launch or speak to a browser itself; callers bring a
//! `BrowserSession` implementation (CDP, WebDriver, a recorded fixture, …).
//! The session is a single scoped resource exclusively owned by the agent
//! loop for the lifetime of one task and is closed on every exit path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::state::ScrollDirection;
use crate::errors::{DispatchError, WebClawResult};
use crate::perception::types::{Element, Rect};

/// A raw interactive-element candidate as reported by the driver, before the
/// locator filters, dedupes and numbers it.
///
/// Drivers enumerate DOM/accessibility nodes and report them in source order;
/// they do not filter beyond what the page itself exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    /// Lower-case tag name, e.g. "button", "a", "input".
    pub tag: String,
    /// Explicit ARIA role, if any.
    #[serde(default)]
    pub role: Option<String>,
    /// `type` attribute for `<input>` nodes.
    #[serde(default)]
    pub input_type: Option<String>,
    /// Node has a click handler or a focusable tabindex.
    #[serde(default)]
    pub clickable: bool,
    /// Visible text / accessible name, whitespace-collapsed.
    #[serde(default)]
    pub label: String,
    /// Bounding rectangle relative to the current viewport.
    pub bounds: Rect,
    /// `display:none`, `visibility:hidden` or zero opacity.
    #[serde(default)]
    pub hidden: bool,
    /// Depth in the DOM tree; lower means closer to the root.
    pub depth: u32,
    /// Position in document source order, for stable tie-breaks.
    pub source_index: u32,
}

/// One browser page session: the observation surface the locator scans plus
/// the action surface decisions are dispatched to.
///
/// Element-referencing operations receive the engine-resolved [`Element`],
/// never a bare id: ids are step-scoped arena indices and the engine
/// guarantees a stale id is intercepted before it reaches the driver.
/// Action-level idempotence is not assumed; after an ambiguous failure the
/// loop re-scans instead of re-issuing.
#[async_trait]
pub trait BrowserSession: Send {
    /// Enumerate interactive-node candidates in document order.
    /// Fails with `WebClawError::Scan` while the page is mid-navigation or
    /// the handle is detached; must be side-effect-free on the page.
    async fn collect_nodes(&mut self) -> WebClawResult<Vec<RawNode>>;

    /// Raster capture of the current viewport, PNG-encoded, unannotated.
    async fn screenshot(&mut self) -> WebClawResult<Vec<u8>>;

    fn current_url(&self) -> String;

    async fn goto(&mut self, url: &str) -> Result<String, DispatchError>;

    async fn click(&mut self, target: &Element) -> Result<String, DispatchError>;

    async fn type_text(&mut self, target: &Element, text: &str) -> Result<String, DispatchError>;

    async fn press(&mut self, key: &str) -> Result<String, DispatchError>;

    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: u32,
    ) -> Result<String, DispatchError>;

    /// Let the page settle; `hint_ms` is advisory.
    async fn wait(&mut self, hint_ms: u64) -> Result<String, DispatchError>;

    /// Release the underlying browser resources. Called exactly once by the
    /// engine on every non-resumable exit path.
    async fn close(&mut self);
}
