//! Layout engine – uses Taffy to lay a styled page fragment out on a fixed
//! page box, then converts the result into positioned boxes.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::dom::Tag;
use crate::error::{ItineraryError, Result};
use crate::fonts::{clamp_lines, wrap_text, FontManager};
use crate::style::{self, ComputedStyle, FontStyle as CssFontStyle, FontWeight, StyledNode};

// ---------------------------------------------------------------------------
// Intermediate layout tree
// ---------------------------------------------------------------------------

/// A positioned box in page coordinates.
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text { lines: Vec<String> },
    Image { src: String },
    /// List item marker
    ListItem { marker: String },
}

fn mount_err(e: taffy::TaffyError) -> ItineraryError {
    ItineraryError::Mount(format!("layout: {e}"))
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
        }
    }

    /// Collect all text content from an inline subtree (spans, text nodes).
    fn collect_inline_text(node: &StyledNode) -> String {
        match node {
            StyledNode::Text { text, .. } => text.clone(),
            StyledNode::Element { children, .. } => {
                children.iter().map(Self::collect_inline_text).collect()
            }
        }
    }

    /// True when every child is text or a display:inline element.
    fn all_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                style,
                children: gc,
                ..
            } => style.display == style::Display::Inline && Self::all_inline(gc),
        })
    }

    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> Result<NodeId> {
        match styled {
            StyledNode::Text { text, style } => self.build_text_node(text, style, parent_width, None),
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// A wrapped text leaf. `block` carries the box model of the paragraph
    /// element the text was merged from, if any.
    fn build_text_node(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        parent_width: f32,
        block: Option<&ComputedStyle>,
    ) -> Result<NodeId> {
        let bold = style.font_weight == FontWeight::Bold;
        let italic = style.font_style == CssFontStyle::Italic;
        let font_size = style.font_size;
        let line_height_px = self.fonts.line_height_px(font_size, style.line_height);

        let text = match style.text_transform {
            style::TextTransform::Uppercase => text.trim().to_uppercase(),
            style::TextTransform::None => text.trim().to_string(),
        };

        let (h_pad, v_pad) = block.map_or((0.0, 0.0), |b| {
            (
                b.padding_left + b.padding_right,
                b.padding_top + b.padding_bottom,
            )
        });
        let max_w = (parent_width - h_pad).max(1.0);
        let mut lines = wrap_text(&text, font_size, bold, italic, max_w, self.fonts);
        if let Some(max_lines) = style.max_lines {
            lines = clamp_lines(lines, max_lines, font_size, bold, italic, max_w, self.fonts);
        }

        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, font_size, bold, italic))
            .fold(0.0f32, f32::max);
        let text_height = lines.len() as f32 * line_height_px;

        // Aligned text spans the full line box so offsets can be computed.
        let width = if style.text_align == style::TextAlign::Left {
            text_width
        } else {
            max_w
        };

        let mut taffy_style = Style {
            size: Size {
                width: Dimension::Length(width + h_pad),
                height: Dimension::Length(text_height + v_pad),
            },
            flex_shrink: 0.0,
            ..Default::default()
        };
        if let Some(b) = block {
            taffy_style.margin = margin_rect(b);
            taffy_style.padding = padding_rect(b);
            taffy_style.border = border_rect(b);
        }

        let node = self.taffy.new_leaf(taffy_style).map_err(mount_err)?;
        self.node_styles
            .insert(node, block.cloned().unwrap_or_else(|| style.clone()));
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<NodeId> {
        // Paragraph-like elements whose children are all inline get their
        // text merged into a single wrapped text node so spans flow correctly.
        if tag.is_text_block() && !children.is_empty() && Self::all_inline(children) {
            let raw: String = children.iter().map(Self::collect_inline_text).collect();
            let combined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if !combined.is_empty() {
                let width = resolve_width(style, parent_width);
                return self.build_text_node(&combined, style, width, Some(style));
            }
        }

        let my_width = resolve_width(style, parent_width);
        let inner_width =
            my_width - style.padding_left - style.padding_right - 2.0 * style.border_width;

        // Estimate per-child width for flex rows and grids so that text is
        // word-wrapped to the right column width at build time.
        let in_flow: Vec<&StyledNode> = children
            .iter()
            .filter(|c| match c {
                StyledNode::Element { style, .. } => style.position != style::Position::Absolute,
                StyledNode::Text { .. } => true,
            })
            .collect();
        let is_flex_row = style.display == style::Display::Flex
            && style.flex_direction == style::FlexDirection::Row;
        let child_build_width = if style.display == style::Display::Grid {
            let columns = style.grid_columns.max(1);
            let gap_total = style.gap * (columns - 1) as f32;
            ((inner_width - gap_total) / columns as f32).max(1.0)
        } else if is_flex_row && in_flow.len() > 1 {
            // Fixed-width siblings keep their size; the rest share what is left.
            let mut fixed = style.gap * (in_flow.len() - 1) as f32;
            let mut flexible = 0usize;
            for child in &in_flow {
                match child {
                    StyledNode::Element { style: cs, .. } => match cs.width {
                        crate::style::Dimension::Px(w) => {
                            fixed += w + cs.margin_left + cs.margin_right
                        }
                        _ => flexible += 1,
                    },
                    StyledNode::Text { .. } => flexible += 1,
                }
            }
            ((inner_width - fixed) / flexible.max(1) as f32).max(1.0)
        } else {
            inner_width.max(1.0)
        };

        let mut child_nodes = Vec::new();
        for child in children {
            let is_li = matches!(child, StyledNode::Element { tag: Tag::Li, .. });
            let child_width = match child {
                StyledNode::Element { style: cs, .. } if cs.position == style::Position::Absolute => {
                    inner_width
                }
                _ => child_build_width,
            };
            let child_id = self.build_node(child, child_width)?;
            if is_li {
                self.node_content.insert(
                    child_id,
                    BoxContent::ListItem {
                        marker: "\u{2022}".to_string(),
                    },
                );
            }
            child_nodes.push(child_id);
        }

        let taffy_style = self.computed_to_taffy(style);
        let node = self
            .taffy
            .new_with_children(taffy_style, &child_nodes)
            .map_err(mount_err)?;
        self.node_styles.insert(node, style.clone());

        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            self.node_content.insert(node, BoxContent::Image { src });
        }

        Ok(node)
    }

    fn computed_to_taffy(&self, s: &ComputedStyle) -> Style {
        let mut ts = Style::default();

        match s.display {
            style::Display::Flex => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.flex_wrap = match s.flex_wrap {
                    style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                    style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Grid => {
                ts.display = taffy::Display::Grid;
                let cols = s.grid_columns.max(1);
                ts.grid_template_columns = vec![taffy::TrackSizingFunction::from_flex(1.0); cols];
            }
            style::Display::Block | style::Display::ListItem | style::Display::InlineBlock => {
                // Block-level elements stack vertically.
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
            }
            style::Display::Inline => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
        }

        if s.position == style::Position::Absolute {
            ts.position = taffy::Position::Absolute;
            let inset = |v: Option<f32>| v.map_or(LengthPercentageAuto::Auto, LengthPercentageAuto::Length);
            ts.inset = Rect {
                top: inset(s.inset_top),
                right: inset(s.inset_right),
                bottom: inset(s.inset_bottom),
                left: inset(s.inset_left),
            };
        }

        ts.size = Size {
            width: dim_to_taffy(s.width),
            height: dim_to_taffy(s.height),
        };
        ts.min_size = Size {
            width: Dimension::Length(0.0),
            height: Dimension::Auto,
        };
        ts.max_size = Size {
            width: dim_to_taffy(s.max_width),
            height: Dimension::Auto,
        };

        ts.flex_grow = s.flex_grow;
        ts.flex_shrink = s.flex_shrink;
        ts.margin = margin_rect(s);
        ts.padding = padding_rect(s);
        ts.border = border_rect(s);
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node).map_err(mount_err)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(mount_err)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style,
            content,
            children,
        })
    }
}

fn resolve_width(style: &ComputedStyle, parent_width: f32) -> f32 {
    match style.width {
        crate::style::Dimension::Px(w) => w,
        crate::style::Dimension::Percent(p) => parent_width * p / 100.0,
        crate::style::Dimension::Auto => parent_width,
    }
}

fn dim_to_taffy(d: crate::style::Dimension) -> taffy::Dimension {
    match d {
        crate::style::Dimension::Auto => taffy::Dimension::Auto,
        crate::style::Dimension::Px(v) => taffy::Dimension::Length(v),
        crate::style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    }
}

fn padding_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(s.padding_top),
        right: LengthPercentage::Length(s.padding_right),
        bottom: LengthPercentage::Length(s.padding_bottom),
        left: LengthPercentage::Length(s.padding_left),
    }
}

fn border_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    let side = |on: bool| LengthPercentage::Length(if on { s.border_width } else { 0.0 });
    Rect {
        top: side(s.border_sides[0]),
        right: side(s.border_sides[1]),
        bottom: side(s.border_sides[2]),
        left: side(s.border_sides[3]),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay a styled fragment out on a fixed `page_width × page_height` box and
/// return the top-level positioned boxes in page coordinates.
///
/// Content taller than the page is not split; it overflows and is clipped at
/// raster time. Keeping each page within capacity is the planner's job.
pub fn compute_page_layout(
    styled_nodes: &[StyledNode],
    page_width: f32,
    page_height: f32,
    fonts: &FontManager,
) -> Result<Vec<PositionedBox>> {
    let mut builder = LayoutBuilder::new(fonts);

    let child_ids = styled_nodes
        .iter()
        .map(|node| builder.build_node(node, page_width))
        .collect::<Result<Vec<_>>>()?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: Dimension::Length(page_width),
            height: Dimension::Length(page_height),
        },
        ..Default::default()
    };

    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(mount_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(page_width),
                height: AvailableSpace::Definite(page_height),
            },
        )
        .map_err(mount_err)?;

    Ok(builder.extract(root, 0.0, 0.0)?.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::build_styled_tree;

    fn layout(html: &str) -> Vec<PositionedBox> {
        let dom = parse_html(html);
        let styled = build_styled_tree(&dom, None);
        compute_page_layout(&styled, 794.0, 1123.0, &FontManager::synthetic()).unwrap()
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = layout("<p>Hello world</p>");
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].width > 0.0);
        assert!(boxes[0].height > 0.0);
    }

    #[test]
    fn page_root_fills_page() {
        let boxes = layout(r#"<div id="page-root" style="width: 794px; height: 1123px"></div>"#);
        assert_eq!(boxes[0].width, 794.0);
        assert_eq!(boxes[0].height, 1123.0);
    }

    #[test]
    fn absolute_footer_sits_at_bottom() {
        let boxes = layout(
            r#"<div style="width: 794px; height: 1123px">
                 <div class="absolute bottom-0 left-0 w-full h-[40px]"></div>
               </div>"#,
        );
        let footer = &boxes[0].children[0];
        assert!((footer.y + footer.height - 1123.0).abs() < 0.5, "footer y={}", footer.y);
    }

    #[test]
    fn clamped_paragraph_keeps_line_limit() {
        let long = "word ".repeat(400);
        let boxes = layout(&format!(r#"<p class="line-clamp-3 w-[200px]">{long}</p>"#));
        match &boxes[0].content {
            BoxContent::Text { lines } => assert_eq!(lines.len(), 3),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn uppercase_transform_applies_to_text() {
        let boxes = layout(r#"<p class="uppercase">overview</p>"#);
        match &boxes[0].content {
            BoxContent::Text { lines } => assert_eq!(lines, &vec!["OVERVIEW".to_string()]),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn list_items_get_markers() {
        let boxes = layout("<ul><li>Hotel</li><li>Breakfast</li></ul>");
        let markers = boxes[0]
            .children
            .iter()
            .filter(|c| matches!(c.content, BoxContent::ListItem { .. }))
            .count();
        assert_eq!(markers, 2);
    }
}
