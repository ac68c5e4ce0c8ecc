// src/render/mod.rs — Floor-plan diagrams
//
// Plan coordinates are metres from the south-west corner with y pointing
// north. SVG y points down, so rows are flipped when drawing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::core::types::{EntranceSide, LayoutPlan};
use crate::infra::errors::CopilotError;

const PALETTE: [&str; 12] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac", "#86bcb6", "#d37295",
];

const MAX_NOTES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    Svg,
}

impl DiagramFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            DiagramFormat::Svg => "image/svg+xml",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagram {
    pub format: DiagramFormat,
    pub bytes: Vec<u8>,
}

impl Diagram {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

pub trait DiagramRenderer: Send + Sync {
    fn render(&self, plan: &LayoutPlan) -> Result<Diagram, CopilotError>;
}

/// Draws zones, labels, the entrance arrow and compliance notes as SVG.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    px_per_m: f64,
    margin_px: f64,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            px_per_m: 40.0,
            margin_px: 60.0,
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Point on the entrance wall's midpoint, in plan metres.
pub fn entrance_midpoint(side: EntranceSide, length: f64, width: f64) -> (f64, f64) {
    match side {
        EntranceSide::South => (length / 2.0, 0.0),
        EntranceSide::North => (length / 2.0, width),
        EntranceSide::West => (0.0, width / 2.0),
        EntranceSide::East => (length, width / 2.0),
    }
}

/// "Name: p1, p2" or "Name: Empty".
pub fn zone_label(name: &str, products: &[String]) -> String {
    if products.is_empty() {
        format!("{name}: Empty")
    } else {
        let shown: Vec<&str> = products.iter().take(2).map(String::as_str).collect();
        format!("{name}: {}", shown.join(", "))
    }
}

impl SvgRenderer {
    pub fn new(px_per_m: f64, margin_px: f64) -> Self {
        Self { px_per_m, margin_px }
    }

    fn px(&self, plan: &LayoutPlan, x: f64, y: f64) -> (f64, f64) {
        (
            self.margin_px + x * self.px_per_m,
            self.margin_px + (plan.width() - y) * self.px_per_m,
        )
    }
}

impl DiagramRenderer for SvgRenderer {
    fn render(&self, plan: &LayoutPlan) -> Result<Diagram, CopilotError> {
        let (length, width) = plan.dimensions_m;
        if !(length > 0.0 && width > 0.0 && length.is_finite() && width.is_finite()) {
            return Err(CopilotError::Render(format!(
                "cannot draw a {length} x {width} m floor"
            )));
        }

        let notes: Vec<&String> = plan.compliance_notes.iter().take(MAX_NOTES).collect();
        let floor_w = length * self.px_per_m;
        let floor_h = width * self.px_per_m;
        let notes_h = if notes.is_empty() { 0.0 } else { 24.0 + 18.0 * notes.len() as f64 };
        let canvas_w = floor_w + 2.0 * self.margin_px;
        let canvas_h = floor_h + 2.0 * self.margin_px + notes_h;

        let mut svg: Vec<String> = Vec::new();
        svg.push(format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{canvas_w:.0}" height="{canvas_h:.0}" viewBox="0 0 {canvas_w:.0} {canvas_h:.0}" font-family="sans-serif">"##
        ));
        svg.push(r##"<rect width="100%" height="100%" fill="white"/>"##.to_string());
        svg.push(format!(
            r##"<text x="{:.1}" y="{:.1}" font-size="18" font-weight="bold">{}</text>"##,
            self.margin_px,
            self.margin_px / 2.0,
            escape(&format!("{} ({} x {} m)", plan.store_name, length, width))
        ));
        svg.push(format!(
            r##"<rect x="{:.1}" y="{:.1}" width="{floor_w:.1}" height="{floor_h:.1}" fill="#f7f7f7" stroke="black" stroke-width="2"/>"##,
            self.margin_px, self.margin_px
        ));

        for (i, zone) in plan.zones.iter().enumerate() {
            // clip to the floor
            let x0 = zone.x.max(0.0);
            let y0 = zone.y.max(0.0);
            let x1 = (zone.x + zone.width).min(length);
            let y1 = (zone.y + zone.height).min(width);
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            let (px, py) = self.px(plan, x0, y1);
            let (zw, zh) = ((x1 - x0) * self.px_per_m, (y1 - y0) * self.px_per_m);
            let colour = PALETTE[i % PALETTE.len()];
            svg.push(format!(
                r##"<rect x="{px:.1}" y="{py:.1}" width="{zw:.1}" height="{zh:.1}" fill="{colour}" fill-opacity="0.55" stroke="#333" stroke-width="1"/>"##
            ));
            svg.push(format!(
                r##"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle" dominant-baseline="middle">{}</text>"##,
                px + zw / 2.0,
                py + zh / 2.0,
                escape(&zone_label(&zone.name, &zone.products))
            ));
        }

        // entrance arrow points into the store from outside the wall
        let (ex, ey) = entrance_midpoint(plan.entrance_side, length, width);
        let (tx, ty) = self.px(plan, ex, ey);
        let reach = self.margin_px * 0.6;
        let (sx, sy) = match plan.entrance_side {
            EntranceSide::South => (tx, ty + reach),
            EntranceSide::North => (tx, ty - reach),
            EntranceSide::West => (tx - reach, ty),
            EntranceSide::East => (tx + reach, ty),
        };
        svg.push(
            r##"<defs><marker id="arrow" markerWidth="10" markerHeight="10" refX="8" refY="5" orient="auto"><path d="M0,0 L10,5 L0,10 z" fill="#c0392b"/></marker></defs>"##
                .to_string(),
        );
        svg.push(format!(
            r##"<line x1="{sx:.1}" y1="{sy:.1}" x2="{tx:.1}" y2="{ty:.1}" stroke="#c0392b" stroke-width="3" marker-end="url(#arrow)"/>"##
        ));
        svg.push(format!(
            r##"<text x="{sx:.1}" y="{sy:.1}" font-size="12" fill="#c0392b" text-anchor="middle" dy="-4">ENTRANCE</text>"##
        ));

        if !notes.is_empty() {
            let top = self.margin_px * 1.5 + floor_h;
            svg.push(format!(
                r##"<rect x="{:.1}" y="{top:.1}" width="{floor_w:.1}" height="{:.1}" fill="#fffbe6" stroke="#999"/>"##,
                self.margin_px,
                notes_h - 6.0
            ));
            for (i, note) in notes.iter().enumerate() {
                svg.push(format!(
                    r##"<text x="{:.1}" y="{:.1}" font-size="12">• {}</text>"##,
                    self.margin_px + 8.0,
                    top + 18.0 * (i as f64 + 1.0),
                    escape(note)
                ));
            }
        }

        svg.push("</svg>\n".to_string());
        Ok(Diagram {
            format: DiagramFormat::Svg,
            bytes: svg.join("\n").into_bytes(),
        })
    }
}
