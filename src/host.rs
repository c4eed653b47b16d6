//! Off-screen render host – a detached DOM that holds exactly one page while
//! it is loaded, laid out and frozen for the rasterizer.
//!
//! Nothing here is ever displayed. The host is cleared before every mount
//! and on drop, so no content can bleed from one page into the next and a
//! failed run leaves nothing behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dom::{find_by_id, parse_html, DomNode};
use crate::error::{ItineraryError, Result};
use crate::fonts::FontManager;
use crate::layout::compute_page_layout;
use crate::layout_config::PageLayout;
use crate::pagination::freeze_page;
use crate::style::build_styled_tree;
use crate::templates::PAGE_ROOT_ID;

pub struct RenderHost {
    width_px: f32,
    height_px: f32,
    dom: Vec<DomNode>,
    page_index: Option<usize>,
}

impl RenderHost {
    pub fn new(width_px: f32, height_px: f32) -> Self {
        Self {
            width_px,
            height_px,
            dom: Vec::new(),
            page_index: None,
        }
    }

    /// Replace the host content with one page's HTML. Fails when the page
    /// container is missing after parsing.
    pub fn mount(&mut self, page_index: usize, html: &str) -> Result<()> {
        self.clear();
        let dom = parse_html(html);
        if find_by_id(&dom, PAGE_ROOT_ID).is_none() {
            return Err(ItineraryError::Mount(format!(
                "page {page_index}: container #{PAGE_ROOT_ID} not found after mount"
            )));
        }
        self.dom = dom;
        self.page_index = Some(page_index);
        log::debug!("Mounted page {page_index} in render host");
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.page_index.is_some()
    }

    pub fn page_index(&self) -> Option<usize> {
        self.page_index
    }

    pub fn dom(&self) -> &[DomNode] {
        &self.dom
    }

    /// Mutable access for the load gate, which rewrites image sources.
    pub fn dom_mut(&mut self) -> &mut [DomNode] {
        &mut self.dom
    }

    /// Style and lay out the mounted page on the fixed page box.
    pub fn layout(&self, fonts: &FontManager) -> Result<PageLayout> {
        let page_index = self
            .page_index
            .ok_or_else(|| ItineraryError::Mount("layout requested on an empty host".into()))?;
        let styled = build_styled_tree(&self.dom, None);
        let boxes = compute_page_layout(&styled, self.width_px, self.height_px, fonts)?;
        Ok(freeze_page(
            &boxes,
            page_index,
            self.width_px,
            self.height_px,
            fonts,
        ))
    }

    pub fn clear(&mut self) {
        if let Some(index) = self.page_index.take() {
            log::debug!("Unmounted page {index} from render host");
        }
        self.dom.clear();
    }
}

impl Drop for RenderHost {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Single-tenant guard around the render host: a second generation while
/// one is in flight is rejected instead of queued.
#[derive(Debug, Clone, Default)]
pub struct HostSlot {
    busy: Arc<AtomicBool>,
}

impl HostSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Result<HostGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ItineraryError::Busy)?;
        Ok(HostGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the slot when dropped, on success and failure paths alike.
#[derive(Debug)]
pub struct HostGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
