//! Frozen page layout – the intermediate representation between the render
//! host and the rasterizer. One [`PageLayout`] holds everything that ends up
//! on one physical page, in CSS pixels relative to the page's top-left.

use serde::{Deserialize, Serialize};

/// A4 at 96 DPI: 210mm × 297mm.
pub const A4_WIDTH_PX: f32 = 794.0;
pub const A4_HEIGHT_PX: f32 = 1123.0;

/// CSS reference pixel density.
pub const CSS_DPI: f32 = 96.0;

/// One fully laid-out page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    /// Page width in CSS pixels.
    pub width_px: f32,
    /// Page height in CSS pixels.
    pub height_px: f32,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to the page top-left, in CSS pixels.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,
    /// Corner radius; `f32::INFINITY` means fully rounded (pill / circle).
    #[serde(default)]
    pub corner_radius: f32,
    /// Children are clipped to this box (`overflow: hidden`).
    #[serde(default)]
    pub clip_children: bool,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
    /// Which edges are drawn: top, right, bottom, left.
    pub sides: [bool; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped (and possibly clamped) lines of text.
    pub lines: Vec<TextLine>,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    pub underline: bool,
    /// List bullet prefix drawn in the left gutter.
    pub list_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageFit {
    /// Stretch to the box.
    #[default]
    Fill,
    /// Scale to cover the box, cropping the overflow.
    Cover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// A `data:` URI once the load gate has settled; anything else renders
    /// as a broken image.
    pub src: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub fit: ImageFit,
}

impl PageLayout {
    /// An empty A4 page.
    pub fn a4(page_index: usize) -> Self {
        Self {
            page_index,
            width_px: A4_WIDTH_PX,
            height_px: A4_HEIGHT_PX,
            boxes: Vec::new(),
        }
    }

    /// Visit every box on the page, depth first.
    pub fn visit(&self, f: &mut dyn FnMut(&LayoutBox)) {
        fn walk(b: &LayoutBox, f: &mut dyn FnMut(&LayoutBox)) {
            f(b);
            for c in &b.children {
                walk(c, f);
            }
        }
        for b in &self.boxes {
            walk(b, f);
        }
    }

    /// All text on the page, one entry per line, in paint order.
    pub fn text_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(&mut |b| {
            if let Some(t) = &b.text {
                out.extend(t.lines.iter().map(|l| l.text.clone()));
            }
        });
        out
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            corner_radius: 0.0,
            clip_children: false,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}
