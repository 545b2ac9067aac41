use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in viewport pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// True when both rectangles share any area.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// True when all four corners are within `tol` pixels of each other.
    /// Used to collapse nested interactive elements with the same footprint.
    pub fn nearly_equal(&self, other: &Rect, tol: f32) -> bool {
        (self.x - other.x).abs() <= tol
            && (self.y - other.y).abs() <= tol
            && (self.right() - other.right()).abs() <= tol
            && (self.bottom() - other.bottom()).abs() <= tol
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    Link,
    Input,
    Select,
    /// Explicit interactive ARIA role, click handler, or focusable tabindex.
    Other,
}

impl ElementKind {
    /// Short tag used in the textual element digest, e.g. `<button>`.
    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::Button => "button",
            ElementKind::Link => "link",
            ElementKind::Input => "input",
            ElementKind::Select => "select",
            ElementKind::Other => "interactive",
        }
    }
}

/// A candidate interactive unit on the current page.
///
/// Ids are dense integers starting at 1 in reading order, and are valid only
/// within the step that produced them: every re-scan reassigns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: u32,
    pub kind: ElementKind,
    pub bounds: Rect,
    /// Best-effort visible text or accessible name; may be empty.
    pub label: String,
    pub visible: bool,
}

impl Element {
    pub fn center(&self) -> (f32, f32) {
        self.bounds.center()
    }

    /// One digest line, e.g. `[3] <button> "Submit"`.
    pub fn digest_line(&self) -> String {
        let label: String = self.label.chars().take(60).collect();
        if label.is_empty() {
            format!("[{}] <{}>", self.id, self.kind.tag())
        } else {
            format!("[{}] <{}> \"{}\"", self.id, self.kind.tag(), label)
        }
    }
}

/// The oracle-facing snapshot for one step: the annotated screenshot plus the
/// element arena its drawn numbers index into.
#[derive(Debug, Clone)]
pub struct Observation {
    /// PNG with the numbered markers burned in.
    pub screenshot_png: Vec<u8>,
    /// Same order as the drawn numbers; ids are indices into this arena.
    pub elements: Vec<Element>,
    pub url: String,
}

impl Observation {
    /// Resolve a step-scoped element id against this observation's arena.
    pub fn element(&self, id: u32) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }
}
