//! Document assembler – places each raster page as one full-bleed image page
//! of a PDF using `printpdf` (v0.8 ops-based API).

use printpdf::*;

use crate::error::{ItineraryError, Result};
use crate::layout_config::CSS_DPI;
use crate::raster::RasterPage;

const MM_PER_INCH: f32 = 25.4;
const PT_PER_INCH: f32 = 72.0;

/// Accumulates pages in the order they are pushed; no reordering.
pub struct DocumentAssembler {
    doc: PdfDocument,
    pages: Vec<PdfPage>,
    page_w_pt: f32,
    page_h_pt: f32,
    warnings: Vec<PdfWarnMsg>,
}

impl DocumentAssembler {
    /// `width_px` × `height_px` is the page box in CSS pixels (96 DPI).
    pub fn new(title: &str, width_px: f32, height_px: f32) -> Self {
        Self {
            doc: PdfDocument::new(title),
            pages: Vec::new(),
            page_w_pt: width_px * PT_PER_INCH / CSS_DPI,
            page_h_pt: height_px * PT_PER_INCH / CSS_DPI,
            warnings: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Append one raster page. Pages must arrive in plan order.
    pub fn push(&mut self, raster: &RasterPage) -> Result<()> {
        if raster.page_index != self.pages.len() {
            return Err(ItineraryError::Assemble(format!(
                "page {} arrived out of order (expected {})",
                raster.page_index,
                self.pages.len()
            )));
        }
        let png = raster.encode_png()?;
        let image = RawImage::decode_from_bytes(&png, &mut self.warnings)
            .map_err(|e| ItineraryError::Assemble(format!("page {}: {e}", raster.page_index)))?;
        let xobj_id = self.doc.add_image(&image);

        // At dpi=72 printpdf maps 1 px to 1 pt, so scale = page_pt / px.
        let scale_x = self.page_w_pt / raster.width_px().max(1) as f32;
        let scale_y = self.page_h_pt / raster.height_px().max(1) as f32;
        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                dpi: Some(72.0),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                rotate: None,
            },
        }];

        let page_w = Mm(self.page_w_pt * MM_PER_INCH / PT_PER_INCH);
        let page_h = Mm(self.page_h_pt * MM_PER_INCH / PT_PER_INCH);
        self.pages.push(PdfPage::new(page_w, page_h, ops));
        log::debug!("Assembled page {}", raster.page_index);
        Ok(())
    }

    /// Serialize the document. An empty document is an error: a delivered
    /// file always has at least one page.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.pages.is_empty() {
            return Err(ItineraryError::Assemble("document has no pages".into()));
        }
        let pages = std::mem::take(&mut self.pages);
        self.doc.with_pages(pages);
        let bytes = self.doc.save(&PdfSaveOptions::default(), &mut self.warnings);
        if !self.warnings.is_empty() {
            log::debug!("printpdf reported {} warning(s)", self.warnings.len());
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontManager;
    use crate::layout_config::PageLayout;
    use crate::raster::rasterize;

    fn page(index: usize) -> RasterPage {
        rasterize(&PageLayout::a4(index), 0.25, &FontManager::synthetic()).unwrap()
    }

    #[test]
    fn assembles_pages_in_order() {
        let mut asm = DocumentAssembler::new("Trip", 794.0, 1123.0);
        asm.push(&page(0)).unwrap();
        asm.push(&page(1)).unwrap();
        assert_eq!(asm.page_count(), 2);
        let bytes = asm.finish().unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn rejects_out_of_order_page() {
        let mut asm = DocumentAssembler::new("Trip", 794.0, 1123.0);
        let err = asm.push(&page(1)).unwrap_err();
        assert!(matches!(err, ItineraryError::Assemble(_)));
    }

    #[test]
    fn empty_document_is_an_error() {
        let asm = DocumentAssembler::new("Trip", 794.0, 1123.0);
        assert!(asm.finish().is_err());
    }
}
