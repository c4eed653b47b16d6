//! Rasterizer – paints a frozen [`PageLayout`] onto an opaque bitmap with
//! `tiny-skia`.
//!
//! Layout coordinates are CSS pixels with a top-left origin; the device
//! transform only scales them, so a scale of 2.0 yields a 192 DPI page.
//! Images are expected as `data:` URIs (the load gate embeds them); any
//! other source is painted as a broken-image placeholder.

use std::collections::HashMap;

use base64::Engine;
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};
use ttf_parser::OutlineBuilder;

use crate::error::{ItineraryError, Result};
use crate::fonts::FontManager;
use crate::layout_config::{ImageContent, ImageFit, LayoutBox, PageLayout, TextContent};

/// Placeholder colours for images that could not be loaded.
const BROKEN_FILL: [f32; 4] = [0.945, 0.961, 0.976, 1.0];
const BROKEN_STROKE: [f32; 4] = [0.796, 0.835, 0.882, 1.0];

/// One rasterized page, fully opaque.
#[derive(Debug)]
pub struct RasterPage {
    pub page_index: usize,
    pub pixmap: Pixmap,
}

impl RasterPage {
    pub fn width_px(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height_px(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA pixel data.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap.encode_png().map_err(|e| ItineraryError::Raster {
            page: self.page_index,
            reason: format!("PNG encoding failed: {e}"),
        })
    }
}

/// Paint one page at `scale` device pixels per CSS pixel.
pub fn rasterize(layout: &PageLayout, scale: f32, fonts: &FontManager) -> Result<RasterPage> {
    let page = layout.page_index;
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ItineraryError::Raster {
            page,
            reason: format!("invalid device scale {scale}"),
        });
    }
    let width = (layout.width_px * scale).round() as u32;
    let height = (layout.height_px * scale).round() as u32;
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| ItineraryError::Raster {
        page,
        reason: format!("cannot allocate a {width}x{height} bitmap"),
    })?;
    // Never hand a transparent capture to the assembler.
    pixmap.fill(tiny_skia::Color::WHITE);

    let mut painter = Painter {
        pixmap: &mut pixmap,
        transform: Transform::from_scale(scale, scale),
        fonts,
        images: HashMap::new(),
    };
    for b in &layout.boxes {
        painter.draw_box(b, None);
    }
    log::debug!("Rasterized page {page} at {width}x{height}");

    Ok(RasterPage {
        page_index: page,
        pixmap,
    })
}

struct Painter<'a> {
    pixmap: &'a mut Pixmap,
    transform: Transform,
    fonts: &'a FontManager,
    images: HashMap<String, Option<Pixmap>>,
}

impl Painter<'_> {
    fn draw_box(&mut self, b: &LayoutBox, clip: Option<&Mask>) {
        let outline = rounded_rect(b.x, b.y, b.width, b.height, b.corner_radius);

        if let (Some(color), Some(path)) = (b.background_color, outline.as_ref()) {
            self.fill(path, color, clip);
        }

        if let Some(image) = &b.image {
            self.draw_image(b, image, outline.as_ref(), clip);
        }

        if let Some(text) = &b.text {
            self.draw_text(b, text, clip);
        }

        if let Some(border) = &b.border {
            let w = border.width;
            let all_sides = border.sides.iter().all(|&s| s);
            if b.corner_radius > 0.0 && all_sides {
                let inset = rounded_rect(
                    b.x + w / 2.0,
                    b.y + w / 2.0,
                    b.width - w,
                    b.height - w,
                    (b.corner_radius - w / 2.0).max(0.0),
                );
                if let Some(path) = inset {
                    self.stroke(&path, border.color, w, clip);
                }
            } else {
                let [top, right, bottom, left] = border.sides;
                let edges = [
                    (top, b.x, b.y, b.width, w),
                    (right, b.x + b.width - w, b.y, w, b.height),
                    (bottom, b.x, b.y + b.height - w, b.width, w),
                    (left, b.x, b.y, w, b.height),
                ];
                for (on, x, y, ew, eh) in edges {
                    if let Some(path) = on.then(|| rect_path(x, y, ew, eh)).flatten() {
                        self.fill(&path, border.color, clip);
                    }
                }
            }
        }

        let child_clip = match (b.clip_children, outline.as_ref()) {
            (true, Some(path)) => self.clip_mask(path, clip),
            _ => None,
        };
        let clip = child_clip.as_ref().or(clip);
        for child in &b.children {
            self.draw_box(child, clip);
        }
    }

    fn draw_image(
        &mut self,
        b: &LayoutBox,
        image: &ImageContent,
        outline: Option<&Path>,
        clip: Option<&Mask>,
    ) {
        let Some(outline) = outline else {
            return;
        };
        if !self.images.contains_key(&image.src) {
            self.images
                .insert(image.src.clone(), load_image_pixmap(&image.src));
        }
        let loaded = self
            .images
            .get(&image.src)
            .is_some_and(|decoded| decoded.is_some());
        if !loaded {
            self.fill(outline, BROKEN_FILL, clip);
            self.stroke(outline, BROKEN_STROKE, 1.0, clip);
            return;
        }
        // Cropped to the box, and to any clipping ancestor.
        let Some(mask) = self.clip_mask(outline, clip) else {
            return;
        };
        let Some(source) = self.images.get(&image.src).and_then(Option::as_ref) else {
            return;
        };

        let (sw, sh) = (source.width() as f32, source.height() as f32);
        let (sx, sy) = match image.fit {
            ImageFit::Fill => (b.width / sw, b.height / sh),
            ImageFit::Cover => {
                let s = (b.width / sw).max(b.height / sh);
                (s, s)
            }
        };
        let tx = b.x + (b.width - sw * sx) / 2.0;
        let ty = b.y + (b.height - sh * sy) / 2.0;
        let placement = self
            .transform
            .pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, tx, ty));

        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, source.as_ref(), &paint, placement, Some(&mask));
    }

    fn draw_text(&mut self, b: &LayoutBox, text: &TextContent, clip: Option<&Mask>) {
        if let Some(marker) = &text.list_marker {
            if !marker.is_empty() {
                let r = (text.font_size * 0.15).max(1.0);
                let cx = b.x - text.font_size * 0.75;
                let cy = b.y + text.line_height / 2.0;
                if let Some(dot) = PathBuilder::from_circle(cx, cy, r) {
                    self.fill(&dot, text.color, clip);
                }
            }
        }

        let fonts = self.fonts;
        let data = fonts.get(text.bold, text.italic);
        let face = data.face();
        let ascender = fonts.ascender_px(text.font_size, text.bold, text.italic);
        let half_leading = (text.line_height - text.font_size) / 2.0;

        for line in &text.lines {
            if line.text.is_empty() {
                continue;
            }
            let x = b.x + line.x_offset;
            let top = b.y + line.y_offset + half_leading;
            let baseline = top + ascender;
            let width = fonts.measure_text_width(&line.text, text.font_size, text.bold, text.italic);

            match &face {
                Some(face) => {
                    let scale = text.font_size / data.units_per_em;
                    let mut pen = x;
                    for ch in line.text.chars() {
                        let Some(gid) = face.glyph_index(ch) else {
                            pen += text.font_size * 0.5;
                            continue;
                        };
                        let mut builder = GlyphPathBuilder::new(pen, baseline, scale);
                        if face.outline_glyph(gid, &mut builder).is_some() {
                            if let Some(path) = builder.finish() {
                                self.fill(&path, text.color, clip);
                            }
                        }
                        pen += face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
                    }
                }
                None => {
                    // No outlines available: greek the line as a faint bar of
                    // the measured width so the page structure stays visible.
                    let mut color = text.color;
                    color[3] *= 0.35;
                    let bar_h = text.font_size * 0.5;
                    if let Some(bar) = rect_path(x, baseline - bar_h, width, bar_h) {
                        self.fill(&bar, color, clip);
                    }
                }
            }

            if text.underline {
                let thickness = (text.font_size / 14.0).max(1.0);
                if let Some(u) = rect_path(x, baseline + thickness, width, thickness) {
                    self.fill(&u, text.color, clip);
                }
            }
        }
    }

    fn fill(&mut self, path: &Path, color: [f32; 4], clip: Option<&Mask>) {
        self.pixmap.fill_path(
            path,
            &paint(color),
            FillRule::Winding,
            self.transform,
            clip,
        );
    }

    fn stroke(&mut self, path: &Path, color: [f32; 4], width: f32, clip: Option<&Mask>) {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, &paint(color), &stroke, self.transform, clip);
    }

    /// A mask for `path`, intersected with the current clip.
    fn clip_mask(&self, path: &Path, current: Option<&Mask>) -> Option<Mask> {
        match current {
            Some(existing) => {
                let mut mask = existing.clone();
                mask.intersect_path(path, FillRule::Winding, true, self.transform);
                Some(mask)
            }
            None => {
                let mut mask = Mask::new(self.pixmap.width(), self.pixmap.height())?;
                mask.fill_path(path, FillRule::Winding, true, self.transform);
                Some(mask)
            }
        }
    }
}

fn paint(color: [f32; 4]) -> Paint<'static> {
    let [r, g, b, a] = color.map(|c| c.clamp(0.0, 1.0));
    let mut paint = Paint::default();
    paint.set_color(tiny_skia::Color::from_rgba(r, g, b, a).unwrap_or(tiny_skia::Color::BLACK));
    paint.anti_alias = true;
    paint
}

fn rect_path(x: f32, y: f32, w: f32, h: f32) -> Option<Path> {
    Rect::from_xywh(x, y, w, h).map(PathBuilder::from_rect)
}

/// Rectangle with circular corners; an infinite radius gives a pill or
/// circle.
fn rounded_rect(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let r = radius.min(w / 2.0).min(h / 2.0);
    if r <= 0.0 {
        return rect_path(x, y, w, h);
    }
    // Cubic approximation of a quarter circle.
    let k = r * 0.552_284_8;
    let (right, bottom) = (x + w, y + h);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Converts font outlines (y up, font units) into page paths (y down, px).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn load_image_pixmap(source: &str) -> Option<Pixmap> {
    let (_, data) = parse_data_uri(source)?;
    decode_image_to_pixmap(&data)
}

fn decode_image_to_pixmap(data: &[u8]) -> Option<Pixmap> {
    let decoded = match image::load_from_memory(data) {
        Ok(img) => img,
        Err(e) => {
            log::warn!("Undecodable image data: {e}");
            return None;
        }
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::{BorderStyle, TextLine};

    fn png_data_uri(w: u32, h: u32, rgba: [u8; 4]) -> String {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn pixel(page: &RasterPage, x: u32, y: u32) -> [u8; 4] {
        let p = page.pixmap.pixel(x, y).unwrap();
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    #[test]
    fn empty_page_is_opaque_white_at_scale() {
        let page = rasterize(&PageLayout::a4(0), 2.0, &FontManager::synthetic()).unwrap();
        assert_eq!(page.width_px(), 1588);
        assert_eq!(page.height_px(), 2246);
        assert!(page.pixels().chunks_exact(4).all(|p| p == [255, 255, 255, 255]));
    }

    #[test]
    fn background_is_painted() {
        let mut layout = PageLayout::a4(0);
        let mut b = LayoutBox::new(10.0, 10.0, 50.0, 50.0);
        b.background_color = Some([1.0, 0.0, 0.0, 1.0]);
        layout.boxes.push(b);
        let page = rasterize(&layout, 1.0, &FontManager::synthetic()).unwrap();
        assert_eq!(pixel(&page, 30, 30), [255, 0, 0, 255]);
        assert_eq!(pixel(&page, 5, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn embedded_image_is_drawn_and_clipped() {
        let mut layout = PageLayout::a4(0);
        let mut b = LayoutBox::new(100.0, 100.0, 40.0, 20.0);
        b.image = Some(ImageContent {
            src: png_data_uri(4, 4, [0, 0, 255, 255]),
            width: 40.0,
            height: 20.0,
            fit: ImageFit::Cover,
        });
        layout.boxes.push(b);
        let page = rasterize(&layout, 1.0, &FontManager::synthetic()).unwrap();
        assert_eq!(pixel(&page, 120, 110), [0, 0, 255, 255]);
        // Cover scaling overflows vertically but stays inside the box.
        assert_eq!(pixel(&page, 120, 95), [255, 255, 255, 255]);
        assert_eq!(pixel(&page, 120, 125), [255, 255, 255, 255]);
    }

    #[test]
    fn unloaded_image_renders_placeholder() {
        let mut layout = PageLayout::a4(0);
        let mut b = LayoutBox::new(0.0, 0.0, 40.0, 40.0);
        b.image = Some(ImageContent {
            src: "https://unreachable.example/x.jpg".into(),
            width: 40.0,
            height: 40.0,
            fit: ImageFit::Fill,
        });
        layout.boxes.push(b);
        let page = rasterize(&layout, 1.0, &FontManager::synthetic()).unwrap();
        assert_ne!(pixel(&page, 20, 20), [255, 255, 255, 255]);
    }

    #[test]
    fn synthetic_text_leaves_marks() {
        let mut layout = PageLayout::a4(0);
        let mut b = LayoutBox::new(10.0, 10.0, 200.0, 22.4);
        b.text = Some(TextContent {
            lines: vec![TextLine {
                text: "Overview".into(),
                x_offset: 0.0,
                y_offset: 0.0,
            }],
            font_family: "Helvetica".into(),
            font_size: 14.0,
            bold: false,
            italic: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 22.4,
            underline: false,
            list_marker: None,
        });
        layout.boxes.push(b);
        let page = rasterize(&layout, 1.0, &FontManager::synthetic()).unwrap();
        assert!(page.pixels().chunks_exact(4).any(|p| p[0] < 250));
    }

    #[test]
    fn clip_children_crops_overflow() {
        let mut layout = PageLayout::a4(0);
        let mut parent = LayoutBox::new(0.0, 0.0, 50.0, 50.0);
        parent.clip_children = true;
        parent.border = Some(BorderStyle {
            width: 1.0,
            color: [0.0, 0.0, 0.0, 0.0],
            sides: [true; 4],
        });
        let mut child = LayoutBox::new(0.0, 0.0, 200.0, 200.0);
        child.background_color = Some([0.0, 1.0, 0.0, 1.0]);
        parent.children.push(child);
        layout.boxes.push(parent);
        let page = rasterize(&layout, 1.0, &FontManager::synthetic()).unwrap();
        assert_eq!(pixel(&page, 25, 25), [0, 255, 0, 255]);
        assert_eq!(pixel(&page, 100, 100), [255, 255, 255, 255]);
    }

    #[test]
    fn png_encoding_roundtrips_dimensions() {
        let page = rasterize(&PageLayout::a4(3), 0.5, &FontManager::synthetic()).unwrap();
        let png = page.encode_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 397);
        assert_eq!(page.page_index, 3);
    }

    #[test]
    fn invalid_scale_is_a_raster_error() {
        let err = rasterize(&PageLayout::a4(0), 0.0, &FontManager::synthetic()).unwrap_err();
        assert!(matches!(err, ItineraryError::Raster { page: 0, .. }));
    }
}
