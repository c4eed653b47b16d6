//! Pagination – decides which itinerary days land on which physical page,
//! and freezes one laid-out page into the [`PageLayout`] the rasterizer
//! consumes.
//!
//! The planner is capacity based rather than measurement based: the first
//! page carries the hero banner and overview so it holds fewer days, every
//! other page holds a fixed number, and the trailing trip-details section
//! only shares a page with days when that page is below capacity.

use std::ops::Range;

use serde::Serialize;

use crate::error::{ItineraryError, Result};
use crate::fonts::FontManager;
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::style;

/// Days per page. Both values must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageCapacity {
    pub first_page: usize,
    pub subsequent_pages: usize,
}

impl PageCapacity {
    pub fn new(first_page: usize, subsequent_pages: usize) -> Result<Self> {
        if first_page == 0 || subsequent_pages == 0 {
            return Err(ItineraryError::Config(format!(
                "page capacities must be positive (got {first_page}/{subsequent_pages})"
            )));
        }
        Ok(Self {
            first_page,
            subsequent_pages,
        })
    }

    fn for_page(&self, page_index: usize) -> usize {
        if page_index == 0 {
            self.first_page
        } else {
            self.subsequent_pages
        }
    }
}

impl Default for PageCapacity {
    fn default() -> Self {
        Self {
            first_page: 3,
            subsequent_pages: 4,
        }
    }
}

/// One physical page of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageDescriptor {
    pub page_index: usize,
    /// Contiguous slice of the itinerary, as indices.
    pub days: Range<usize>,
    pub is_first_page: bool,
    pub carries_details_section: bool,
}

impl PageDescriptor {
    /// 1-based number shown in the footer.
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }

    pub fn days<'a, T>(&self, itinerary: &'a [T]) -> &'a [T] {
        &itinerary[self.days.clone()]
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }
}

/// The finished page plan. The total page count is only known here, after
/// the details section has been placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagePlan {
    pub pages: Vec<PageDescriptor>,
}

impl PagePlan {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }
}

/// Assign `day_count` itinerary entries to pages.
pub fn plan_pages(day_count: usize, capacity: PageCapacity) -> Result<PagePlan> {
    // Re-validate: the fields are public.
    let capacity = PageCapacity::new(capacity.first_page, capacity.subsequent_pages)?;

    let mut pages = Vec::new();
    let first_end = day_count.min(capacity.first_page);
    pages.push(PageDescriptor {
        page_index: 0,
        days: 0..first_end,
        is_first_page: true,
        carries_details_section: false,
    });

    let mut start = first_end;
    while start < day_count {
        let end = (start + capacity.subsequent_pages).min(day_count);
        pages.push(PageDescriptor {
            page_index: pages.len(),
            days: start..end,
            is_first_page: false,
            carries_details_section: false,
        });
        start = end;
    }

    let needs_spill = match pages.last() {
        // An empty itinerary keeps its details on the cover page.
        Some(last) if day_count > 0 => last.day_count() >= capacity.for_page(last.page_index),
        _ => false,
    };
    if needs_spill {
        pages.push(PageDescriptor {
            page_index: pages.len(),
            days: day_count..day_count,
            is_first_page: false,
            carries_details_section: true,
        });
    } else if let Some(last) = pages.last_mut() {
        last.carries_details_section = true;
    }

    log::debug!(
        "Planned {} day(s) onto {} page(s) with capacity {}/{}",
        day_count,
        pages.len(),
        capacity.first_page,
        capacity.subsequent_pages
    );
    Ok(PagePlan { pages })
}

// ---------------------------------------------------------------------------
// Freezing a laid-out page
// ---------------------------------------------------------------------------

/// Convert the positioned boxes of one mounted page into a [`PageLayout`].
pub fn freeze_page(
    boxes: &[PositionedBox],
    page_index: usize,
    page_width: f32,
    page_height: f32,
    fonts: &FontManager,
) -> PageLayout {
    PageLayout {
        page_index,
        width_px: page_width,
        height_px: page_height,
        boxes: boxes.iter().map(|b| build_layout_box(b, fonts)).collect(),
    }
}

/// Recursively build a LayoutBox tree. `PositionedBox` coordinates are
/// already page-absolute, so they carry over unchanged.
fn build_layout_box(pbox: &PositionedBox, fonts: &FontManager) -> LayoutBox {
    let s = &pbox.style;
    let mut lb = LayoutBox::new(pbox.x, pbox.y, pbox.width, pbox.height);

    if !s.background_color.is_transparent() {
        lb.background_color = Some(s.background_color.to_array());
    }
    if s.border_width > 0.5 && s.border_sides.iter().any(|&on| on) {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: s.border_color.to_array(),
            sides: s.border_sides,
        });
    }
    lb.corner_radius = s.border_radius;
    lb.clip_children = s.overflow_hidden;

    let bold = s.font_weight == style::FontWeight::Bold;
    let italic = s.font_style == style::FontStyle::Italic;
    let line_height = fonts.line_height_px(s.font_size, s.line_height);

    match &pbox.content {
        BoxContent::Text { lines } => {
            let border = |i: usize| if s.border_sides[i] { s.border_width } else { 0.0 };
            let inner_left = s.padding_left + border(3);
            let inner_top = s.padding_top + border(0);
            let inner_width = pbox.width - inner_left - s.padding_right - border(1);

            let text_lines = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let w = fonts.measure_text_width(line, s.font_size, bold, italic);
                    let align = match s.text_align {
                        style::TextAlign::Left => 0.0,
                        style::TextAlign::Center => ((inner_width - w) / 2.0).max(0.0),
                        style::TextAlign::Right => (inner_width - w).max(0.0),
                    };
                    TextLine {
                        text: line.clone(),
                        x_offset: inner_left + align,
                        y_offset: inner_top + i as f32 * line_height,
                    }
                })
                .collect();

            lb.text = Some(TextContent {
                lines: text_lines,
                font_family: s.font_family.clone(),
                font_size: s.font_size,
                bold,
                italic,
                color: s.color.to_array(),
                line_height,
                underline: s.text_decoration == style::TextDecoration::Underline,
                list_marker: None,
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
                fit: s.object_fit,
            });
        }
        BoxContent::ListItem { marker } => {
            // The li's own text lives in its children; only the bullet is
            // drawn here, in the gutter to the left of the box.
            lb.text = Some(TextContent {
                lines: vec![],
                font_family: s.font_family.clone(),
                font_size: s.font_size,
                bold,
                italic: false,
                color: s.color.to_array(),
                line_height,
                underline: false,
                list_marker: Some(marker.clone()),
            });
        }
        BoxContent::None => {}
    }

    lb.children = pbox
        .children
        .iter()
        .map(|c| build_layout_box(c, fonts))
        .collect();
    lb
}
