//! Style resolver – maps inline styles and the Tailwind-like utility classes
//! used by the itinerary templates to a flat [`ComputedStyle`].

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};
use crate::layout_config::ImageFit;

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,
    pub grid_columns: usize,

    // Positioning
    pub position: Position,
    pub inset_top: Option<f32>,
    pub inset_right: Option<f32>,
    pub inset_bottom: Option<f32>,
    pub inset_left: Option<f32>,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub max_width: Dimension,

    // Spacing (px)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    /// top, right, bottom, left
    pub border_sides: [bool; 4],
    pub border_color: Color,
    pub border_radius: f32,
    pub overflow_hidden: bool,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    pub text_transform: TextTransform,
    /// `line-clamp-N`: wrapped text is cut to N lines with an ellipsis.
    pub max_lines: Option<usize>,

    // Background / replaced content
    pub background_color: Color,
    pub object_fit: ImageFit,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_columns: 0,
            position: Position::Static,
            inset_top: None,
            inset_right: None,
            inset_bottom: None,
            inset_left: None,
            width: Dimension::Auto,
            height: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_sides: [true; 4],
            border_color: Color::from_hex("#e2e8f0").unwrap_or(Color::BLACK),
            border_radius: 0.0,
            overflow_hidden: false,
            font_size: 14.0,
            font_weight: FontWeight::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.6,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            text_transform: TextTransform::None,
            max_lines: None,
            background_color: Color::TRANSPARENT,
            object_fit: ImageFit::Fill,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Static,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTransform {
    None,
    Uppercase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
                a: 1.0,
            }),
            3 => Some(Self {
                r: channel(&hex[0..1].repeat(2))?,
                g: channel(&hex[1..2].repeat(2))?,
                b: channel(&hex[2..3].repeat(2))?,
                a: 1.0,
            }),
            _ => None,
        }
    }
}

/// The palette subset the itinerary templates use.
fn tailwind_color(name: &str) -> Option<Color> {
    let hex = match name {
        "white" => "#ffffff",
        "black" => "#000000",
        "slate-50" => "#f8fafc",
        "slate-100" => "#f1f5f9",
        "slate-200" => "#e2e8f0",
        "slate-300" => "#cbd5e1",
        "slate-400" => "#94a3b8",
        "slate-500" => "#64748b",
        "slate-600" => "#475569",
        "slate-700" => "#334155",
        "slate-800" => "#1e293b",
        "slate-900" => "#0f172a",
        "gray-100" => "#f3f4f6",
        "gray-200" => "#e5e7eb",
        "gray-500" => "#6b7280",
        "gray-900" => "#111827",
        "blue-100" => "#dbeafe",
        "blue-400" => "#60a5fa",
        "blue-600" => "#2563eb",
        "blue-900" => "#1e3a8a",
        "red-100" => "#fee2e2",
        "red-400" => "#f87171",
        "red-600" => "#dc2626",
        "green-100" => "#dcfce7",
        "green-500" => "#22c55e",
        "green-600" => "#16a34a",
        _ => return None,
    };
    Color::from_hex(hex)
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = ComputedStyle::default();

    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.font_weight = p.font_weight;
        style.font_family = p.font_family.clone();
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.font_style = p.font_style;
        style.text_transform = p.text_transform;
    }
    apply_tag_defaults(&mut style, &element.tag);

    for class in element.classes() {
        apply_tailwind_class(&mut style, class);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }

    style
}

/// Tag semantics layered on top of the inherited text properties.
fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    match tag {
        Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 => s.font_weight = FontWeight::Bold,
        Tag::Ul => s.padding_left = 16.0,
        Tag::Li => s.display = Display::ListItem,
        Tag::Span => s.display = Display::Inline,
        Tag::Img => s.display = Display::InlineBlock,
        Tag::Div | Tag::P | Tag::Section | Tag::Body | Tag::Html => {}
        Tag::Head | Tag::Unknown(_) => s.display = Display::None,
    }
}

/// Apply a single Tailwind utility class.
fn apply_tailwind_class(s: &mut ComputedStyle, class: &str) {
    match class {
        // Display
        "flex" => s.display = Display::Flex,
        "grid" => s.display = Display::Grid,
        "block" => s.display = Display::Block,
        "inline" => s.display = Display::Inline,
        "inline-block" => s.display = Display::InlineBlock,
        "hidden" => s.display = Display::None,

        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" => s.flex_direction = FlexDirection::Column,
        "flex-wrap" => s.flex_wrap = FlexWrap::Wrap,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
        "grow" => s.flex_grow = 1.0,
        "shrink-0" => s.flex_shrink = 0.0,

        "justify-start" => s.justify_content = JustifyContent::Start,
        "justify-end" => s.justify_content = JustifyContent::End,
        "justify-center" => s.justify_content = JustifyContent::Center,
        "justify-between" => s.justify_content = JustifyContent::SpaceBetween,

        "items-start" => s.align_items = AlignItems::Start,
        "items-end" => s.align_items = AlignItems::End,
        "items-center" => s.align_items = AlignItems::Center,
        "items-stretch" => s.align_items = AlignItems::Stretch,

        // Positioning
        "relative" => s.position = Position::Static,
        "absolute" => s.position = Position::Absolute,
        "top-0" => s.inset_top = Some(0.0),
        "right-0" => s.inset_right = Some(0.0),
        "bottom-0" => s.inset_bottom = Some(0.0),
        "left-0" => s.inset_left = Some(0.0),

        // Typography
        "font-bold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "italic" => s.font_style = FontStyle::Italic,
        "not-italic" => s.font_style = FontStyle::Normal,
        "underline" => s.text_decoration = TextDecoration::Underline,
        "uppercase" => s.text_transform = TextTransform::Uppercase,
        "normal-case" => s.text_transform = TextTransform::None,
        "text-left" | "text-justify" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-xs" => s.font_size = 12.0,
        "text-sm" => s.font_size = 14.0,
        "text-base" => s.font_size = 16.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "text-3xl" => s.font_size = 30.0,
        "leading-tight" => s.line_height = 1.25,
        "leading-normal" => s.line_height = 1.5,
        "leading-relaxed" => s.line_height = 1.625,

        // Sizing
        "w-full" => s.width = Dimension::Percent(100.0),
        "h-full" => s.height = Dimension::Percent(100.0),
        "w-auto" => s.width = Dimension::Auto,
        "w-px" => s.width = Dimension::Px(1.0),
        "max-w-md" => s.max_width = Dimension::Px(448.0),

        // Borders and clipping
        "border" => set_border(s, 1.0, [true; 4]),
        "border-2" => set_border(s, 2.0, [true; 4]),
        "border-4" => set_border(s, 4.0, [true; 4]),
        "border-t" => set_border(s, 1.0, [true, false, false, false]),
        "border-b" => set_border(s, 1.0, [false, false, true, false]),
        "rounded-sm" => s.border_radius = 2.0,
        "rounded" => s.border_radius = 4.0,
        "rounded-lg" => s.border_radius = 8.0,
        "rounded-full" => s.border_radius = f32::INFINITY,
        "overflow-hidden" => s.overflow_hidden = true,
        "object-cover" => s.object_fit = ImageFit::Cover,

        _ => {
            // Dynamic patterns
            if let Some(n) = class.strip_prefix("line-clamp-") {
                s.max_lines = n.parse().ok();
            } else if let Some(n) = class.strip_prefix("grid-cols-") {
                s.grid_columns = n.parse().unwrap_or(s.grid_columns);
            } else if let Some(rest) = class.strip_prefix("space-y-") {
                // Vertical rhythm between stacked children.
                if let Ok(v) = rest.parse::<f32>() {
                    s.display = Display::Flex;
                    s.flex_direction = FlexDirection::Column;
                    s.gap = v * 4.0;
                }
            } else if let Some(rest) = class.strip_prefix("gap-") {
                if let Ok(v) = rest.parse::<f32>() {
                    s.gap = v * 4.0;
                }
            } else if !try_parse_arbitrary_class(s, class) && !try_parse_color_class(s, class) {
                try_parse_spacing_class(s, class);
                try_parse_size_class(s, class);
            }
        }
    }
}

fn set_border(s: &mut ComputedStyle, width: f32, sides: [bool; 4]) {
    s.border_width = width;
    s.border_sides = sides;
}

/// `h-[200px]`, `w-[90%]`, `text-[10px]`.
fn try_parse_arbitrary_class(s: &mut ComputedStyle, class: &str) -> bool {
    let Some((prefix, rest)) = class.split_once("-[") else {
        return false;
    };
    let Some(value) = rest.strip_suffix(']') else {
        return false;
    };
    let dim = parse_dimension(value);
    match prefix {
        "w" => s.width = dim,
        "h" => s.height = dim,
        "text" => {
            if let Some(px) = parse_px(value) {
                s.font_size = px;
            }
        }
        _ => return false,
    }
    true
}

fn try_parse_spacing_class(s: &mut ComputedStyle, class: &str) {
    // p-{n}, px-{n}, pt-{n}, m-{n}, -mt-{n}, ...  (1 unit = 4px)
    let (negative, class) = match class.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, class),
    };
    let Some((prefix, value_str)) = class.rsplit_once('-') else {
        return;
    };
    let value: f32 = match value_str.parse::<f32>() {
        Ok(v) if negative => -v * 4.0,
        Ok(v) => v * 4.0,
        Err(_) => return,
    };

    match prefix {
        "p" => {
            s.padding_top = value;
            s.padding_right = value;
            s.padding_bottom = value;
            s.padding_left = value;
        }
        "px" => {
            s.padding_left = value;
            s.padding_right = value;
        }
        "py" => {
            s.padding_top = value;
            s.padding_bottom = value;
        }
        "pt" => s.padding_top = value,
        "pr" => s.padding_right = value,
        "pb" => s.padding_bottom = value,
        "pl" => s.padding_left = value,
        "m" => {
            s.margin_top = value;
            s.margin_right = value;
            s.margin_bottom = value;
            s.margin_left = value;
        }
        "mx" => {
            s.margin_left = value;
            s.margin_right = value;
        }
        "my" => {
            s.margin_top = value;
            s.margin_bottom = value;
        }
        "mt" => s.margin_top = value,
        "mr" => s.margin_right = value,
        "mb" => s.margin_bottom = value,
        "ml" => s.margin_left = value,
        _ => {}
    }
}

fn try_parse_color_class(s: &mut ComputedStyle, class: &str) -> bool {
    if let Some(c) = class.strip_prefix("text-").and_then(tailwind_color) {
        s.color = c;
    } else if let Some(c) = class.strip_prefix("bg-").and_then(tailwind_color) {
        s.background_color = c;
    } else if let Some(c) = class.strip_prefix("border-").and_then(tailwind_color) {
        s.border_color = c;
    } else {
        return false;
    }
    true
}

fn try_parse_size_class(s: &mut ComputedStyle, class: &str) {
    if let Some(v) = class.strip_prefix("w-").and_then(|r| r.parse::<f32>().ok()) {
        s.width = Dimension::Px(v * 4.0);
    } else if let Some(v) = class.strip_prefix("h-").and_then(|r| r.parse::<f32>().ok()) {
        s.height = Dimension::Px(v * 4.0);
    }
}

// ---------------------------------------------------------------------------
// Inline style parsing (limited subset)
// ---------------------------------------------------------------------------

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        apply_css_property(s, prop.trim(), val.trim());
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "grid" => Display::Grid,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "position" => {
            s.position = match val {
                "absolute" => Position::Absolute,
                _ => Position::Static,
            }
        }
        "top" => s.inset_top = parse_px(val),
        "right" => s.inset_right = parse_px(val),
        "bottom" => s.inset_bottom = parse_px(val),
        "left" => s.inset_left = parse_px(val),
        "font-size" => {
            if let Some(px) = parse_px(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::from_hex(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::from_hex(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "margin" => apply_shorthand_spacing(
            val,
            &mut s.margin_top,
            &mut s.margin_right,
            &mut s.margin_bottom,
            &mut s.margin_left,
        ),
        "padding" => apply_shorthand_spacing(
            val,
            &mut s.padding_top,
            &mut s.padding_right,
            &mut s.padding_bottom,
            &mut s.padding_left,
        ),
        "overflow" => s.overflow_hidden = val == "hidden",
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_px(val) {
                s.line_height = px / s.font_size;
            }
        }
        "gap" => {
            if let Some(px) = parse_px(val) {
                s.gap = px;
            }
        }
        _ => {}
    }
}

fn parse_px(s: &str) -> Option<f32> {
    let s = s.trim().trim_end_matches("px");
    s.parse().ok()
}

fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

fn apply_shorthand_spacing(
    val: &str,
    top: &mut f32,
    right: &mut f32,
    bottom: &mut f32,
    left: &mut f32,
) {
    let parts: Vec<f32> = val.split_whitespace().filter_map(parse_px).collect();
    match parts.as_slice() {
        [all] => {
            *top = *all;
            *right = *all;
            *bottom = *all;
            *left = *all;
        }
        [vertical, horizontal] => {
            *top = *vertical;
            *bottom = *vertical;
            *right = *horizontal;
            *left = *horizontal;
        }
        [t, r, b, l] => {
            *top = *t;
            *right = *r;
            *bottom = *b;
            *left = *l;
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (image src, id, ...)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style);
                let children = build_styled_tree(&e.children, Some(&style));
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                // Text renders inline: only the inherited text properties
                // survive, box-model properties stay on the parent.
                let parent = parent_style.cloned().unwrap_or_default();
                let style = ComputedStyle {
                    font_size: parent.font_size,
                    font_weight: parent.font_weight,
                    font_family: parent.font_family,
                    color: parent.color,
                    text_align: parent.text_align,
                    line_height: parent.line_height,
                    text_decoration: parent.text_decoration,
                    font_style: parent.font_style,
                    text_transform: parent.text_transform,
                    max_lines: parent.max_lines,
                    ..ComputedStyle::default()
                };
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
        }
    }
    result
}
