//! Turns the driver's raw node dump into the step's numbered action space:
//! allowlist mapping, visibility filtering, nested-element dedupe, reading
//! order, dense 1-based ids.

use crate::browser::{BrowserSession, RawNode};
use crate::config::Viewport;
use crate::errors::WebClawResult;
use crate::perception::types::{Element, ElementKind};

/// Reading-order rows are bucketed into horizontal bands of this height, so
/// elements on the same visual line sort left-to-right.
const ROW_BAND_PX: f32 = 50.0;

/// Bounds within this per-corner tolerance are treated as the same footprint
/// when collapsing nested interactive elements.
const DEDUPE_TOL_PX: f32 = 3.0;

pub struct ElementLocator {
    viewport: Viewport,
}

impl ElementLocator {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    /// Scan the page for interactive elements. Side-effect-free on the page;
    /// fails with `WebClawError::Scan` while the page is mid-navigation (the
    /// engine retries with backoff, this does not).
    pub async fn scan<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
    ) -> WebClawResult<Vec<Element>> {
        let nodes = session.collect_nodes().await?;
        let elements = self.resolve(nodes);
        tracing::debug!(count = elements.len(), "interactive elements located");
        Ok(elements)
    }

    /// The pure numbering pipeline. Deterministic: identical node sets yield
    /// identical ordered id→Element mappings.
    pub fn resolve(&self, nodes: Vec<RawNode>) -> Vec<Element> {
        let (vw, vh) = (self.viewport.width as f32, self.viewport.height as f32);

        // Allowlist + visibility + viewport intersection
        let mut candidates: Vec<(ElementKind, RawNode)> = nodes
            .into_iter()
            .filter(|n| !n.hidden && n.bounds.area() > 0.0)
            .filter(|n| {
                n.bounds.right() > 0.0 && n.bounds.bottom() > 0.0 && n.bounds.x < vw && n.bounds.y < vh
            })
            .filter_map(|n| classify(&n).map(|kind| (kind, n)))
            .collect();

        // Outermost-ancestor dedupe: visit outer nodes first so that the
        // shallower of two same-footprint elements is the one kept.
        candidates.sort_by(|(_, a), (_, b)| {
            a.depth.cmp(&b.depth).then(a.source_index.cmp(&b.source_index))
        });
        let mut kept: Vec<(ElementKind, RawNode)> = Vec::with_capacity(candidates.len());
        for (kind, node) in candidates {
            let duplicate = kept
                .iter()
                .any(|(_, k)| k.bounds.nearly_equal(&node.bounds, DEDUPE_TOL_PX));
            if !duplicate {
                kept.push((kind, node));
            }
        }

        // Reading order: top-to-bottom in row bands, then left-to-right,
        // ties broken by source position.
        kept.sort_by(|(_, a), (_, b)| {
            let band_a = (a.bounds.y / ROW_BAND_PX).floor() as i64;
            let band_b = (b.bounds.y / ROW_BAND_PX).floor() as i64;
            band_a
                .cmp(&band_b)
                .then(a.bounds.x.total_cmp(&b.bounds.x))
                .then(a.source_index.cmp(&b.source_index))
        });

        kept.into_iter()
            .enumerate()
            .map(|(i, (kind, node))| Element {
                id: i as u32 + 1,
                kind,
                bounds: node.bounds,
                label: node.label,
                visible: true,
            })
            .collect()
    }
}

/// Interactive-role allowlist. Explicit ARIA roles win over tag names;
/// `input type=hidden` is never a candidate.
fn classify(node: &RawNode) -> Option<ElementKind> {
    if let Some(role) = node.role.as_deref() {
        match role {
            "button" => return Some(ElementKind::Button),
            "link" => return Some(ElementKind::Link),
            "textbox" | "searchbox" => return Some(ElementKind::Input),
            "combobox" | "listbox" => return Some(ElementKind::Select),
            "menuitem" | "tab" | "checkbox" | "radio" | "switch" => {
                return Some(ElementKind::Other)
            }
            _ => {}
        }
    }

    match node.tag.as_str() {
        "button" => Some(ElementKind::Button),
        "a" => Some(ElementKind::Link),
        "input" => match node.input_type.as_deref() {
            Some("hidden") => None,
            Some("button") | Some("submit") | Some("reset") | Some("image") => {
                Some(ElementKind::Button)
            }
            Some("checkbox") | Some("radio") => Some(ElementKind::Other),
            _ => Some(ElementKind::Input),
        },
        "textarea" => Some(ElementKind::Input),
        "select" => Some(ElementKind::Select),
        _ if node.clickable => Some(ElementKind::Other),
        _ => None,
    }
}
