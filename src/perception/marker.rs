//! Set-of-Marks annotator: burns a numbered badge and bounding box for every
//! located element into the screenshot, so a vision model can refer to page
//! elements by number.
//!
//! Placement is deterministic (fixed corner priority, no randomness) and the
//! only pixels touched are the drawn annotations.

use crate::errors::{WebClawError, WebClawResult};
use crate::perception::types::{Element, ElementKind};

/// RGBA colour palette indexed by element kind.
fn kind_colour(kind: ElementKind) -> [u8; 4] {
    match kind {
        ElementKind::Button => [255, 68, 68, 255],  // red
        ElementKind::Link => [68, 68, 255, 255],    // blue
        ElementKind::Input => [68, 160, 68, 255],   // green
        ElementKind::Select => [170, 120, 0, 255],  // amber
        ElementKind::Other => [160, 68, 200, 255],  // purple
    }
}

const TEXT_COLOUR: [u8; 4] = [255, 255, 255, 255];

/// Annotate `src_png` with a numbered marker per element.
/// Returns PNG-encoded bytes; byte-identical output for identical input.
///
/// On high-resolution screenshots (width > 1600) badges are drawn at 2×
/// scale so the numbers stay readable for the vision model.
pub fn annotate(src_png: &[u8], elements: &[Element]) -> WebClawResult<Vec<u8>> {
    let img = image::load_from_memory(src_png)
        .map_err(|e| WebClawError::Marker(format!("screenshot decode: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();

    let scale: u32 = if w > 1600 { 2 } else { 1 };
    let thickness: i32 = if w > 1600 { 3 } else { 2 };

    let badges = place_labels(elements, w, h, scale);

    for (elem, badge) in elements.iter().zip(badges.iter()) {
        let col = kind_colour(elem.kind);
        let b = &elem.bounds;
        draw_rect(
            &mut canvas,
            b.x.round() as i32,
            b.y.round() as i32,
            b.right().round() as i32,
            b.bottom().round() as i32,
            col,
            thickness,
        );
        draw_badge(&mut canvas, badge, &elem.id.to_string(), col, scale);
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| WebClawError::Marker(format!("PNG encode: {e}")))?;
    Ok(out)
}

/// Text digest of the numbered elements for the oracle prompt.
pub fn element_list_text(elements: &[Element]) -> String {
    if elements.is_empty() {
        return "No interactive elements found on page.".to_string();
    }
    let mut lines = vec!["Interactive elements on page:".to_string()];
    for e in elements {
        lines.push(e.digest_line());
    }
    lines.join("\n")
}

/// Pixel rectangle of one placed badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BadgeRect {
    fn overlaps(&self, other: &BadgeRect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }

    fn inside(&self, w: u32, h: u32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x + self.w <= w as i32 && self.y + self.h <= h as i32
    }
}

/// Choose one badge rectangle per element, in element order.
///
/// Corners are tried in fixed priority (above-left, inside top-left,
/// below-left, above-right), taking the first position that fits inside the
/// image and does not overlap an already-placed badge. Falls back to inside
/// top-left clamped to the image.
pub fn place_labels(elements: &[Element], w: u32, h: u32, scale: u32) -> Vec<BadgeRect> {
    let mut placed: Vec<BadgeRect> = Vec::with_capacity(elements.len());

    for elem in elements {
        let (bw, bh) = badge_size(&elem.id.to_string(), scale);
        let x1 = elem.bounds.x.round() as i32;
        let y1 = elem.bounds.y.round() as i32;
        let x2 = elem.bounds.right().round() as i32;
        let y2 = elem.bounds.bottom().round() as i32;

        let candidates = [
            BadgeRect { x: x1, y: y1 - bh, w: bw, h: bh }, // above-left
            BadgeRect { x: x1, y: y1, w: bw, h: bh },      // inside top-left
            BadgeRect { x: x1, y: y2 + 1, w: bw, h: bh },  // below-left
            BadgeRect { x: x2 - bw, y: y1 - bh, w: bw, h: bh }, // above-right
        ];

        let chosen = candidates
            .into_iter()
            .find(|c| c.inside(w, h) && !placed.iter().any(|p| c.overlaps(p)))
            .unwrap_or(BadgeRect {
                x: x1.clamp(0, (w as i32 - bw).max(0)),
                y: y1.clamp(0, (h as i32 - bh).max(0)),
                w: bw,
                h: bh,
            });
        placed.push(chosen);
    }

    placed
}

fn badge_size(text: &str, scale: u32) -> (i32, i32) {
    let char_w = 5 * scale + 1;
    let pad = 2 * scale;
    let bw = text.len() as u32 * char_w + pad * 2;
    let bh = 5 * scale + pad * 2;
    (bw as i32, bh as i32)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);

    for t in 0..thickness {
        let ty = y1 + t;
        let by = y2 - t;
        for x in x1..=x2 {
            if x >= 0 && x < iw {
                if ty >= 0 && ty < ih {
                    set_pixel(canvas, x as u32, ty as u32, col);
                }
                if by >= 0 && by < ih {
                    set_pixel(canvas, x as u32, by as u32, col);
                }
            }
        }
    }
    for t in 0..thickness {
        let lx = x1 + t;
        let rx = x2 - t;
        for y in y1..=y2 {
            if y >= 0 && y < ih {
                if lx >= 0 && lx < iw {
                    set_pixel(canvas, lx as u32, y as u32, col);
                }
                if rx >= 0 && rx < iw {
                    set_pixel(canvas, rx as u32, y as u32, col);
                }
            }
        }
    }
}

/// Solid colour badge with the element number in white.
fn draw_badge(
    canvas: &mut image::RgbaImage,
    badge: &BadgeRect,
    text: &str,
    col: [u8; 4],
    scale: u32,
) {
    let (w, h) = canvas.dimensions();
    for dy in 0..badge.h {
        for dx in 0..badge.w {
            let px = badge.x + dx;
            let py = badge.y + dy;
            if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
                set_pixel(canvas, px as u32, py as u32, col);
            }
        }
    }

    let pad = (2 * scale) as i32;
    let step = 5 * scale + 1;
    for (i, c) in text.chars().enumerate() {
        let gx = badge.x + pad + (i as u32 * step) as i32;
        let gy = badge.y + pad;
        if gx < 0 || gy < 0 {
            continue;
        }
        draw_glyph(canvas, c, gx as u32, gy as u32, TEXT_COLOUR, scale);
    }
}

/// Minimal 5×5 digit renderer; `scale` gives multi-pixel glyphs on
/// high-DPI screenshots.
fn draw_glyph(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, col: [u8; 4], scale: u32) {
    let glyph = match c {
        '0'..='9' => DIGIT_FONT[(c as u8 - b'0') as usize],
        _ => return,
    };
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        set_pixel(canvas, x, y, col);
                    }
                }
            }
        }
    }
}

fn set_pixel(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    p[0] = (p[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    p[1] = (p[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    p[2] = (p[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    p[3] = 255;
}

/// 5×5 bitmap digits 0–9.
const DIGIT_FONT: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];
