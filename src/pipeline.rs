//! Pipeline – ties together normalizing, planning, mounting, the load gate,
//! rasterization and assembly into one generation run.
//!
//! Pages are produced strictly one after another: page N+1 is not mounted
//! until page N has been rasterized and handed to the sink, so at most one
//! page of DOM and one bitmap are alive at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;

use crate::error::{ItineraryError, Result};
use crate::fonts::FontManager;
use crate::gate::{HttpImageLoader, ImageLoader, LoadGate, ProxyRewriter};
use crate::host::{HostSlot, RenderHost};
use crate::layout_config::{A4_HEIGHT_PX, A4_WIDTH_PX};
use crate::package::{normalize, AssetResolver, NormalizedPackage};
use crate::pagination::{plan_pages, PageCapacity, PagePlan};
use crate::raster::{rasterize, RasterPage};
use crate::render::DocumentAssembler;
use crate::templates::{render_page_html, Branding};

/// Configuration for a [`Generator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Page box in CSS pixels (default: A4 at 96 DPI, 794 × 1123).
    pub page_width_px: f32,
    pub page_height_px: f32,
    /// Device pixels per CSS pixel (default: 2.0, i.e. 192 DPI).
    pub scale: f32,
    pub capacity: PageCapacity,
    /// Pause after all images of a page settled (default: 300 ms).
    pub settle_delay: Duration,
    /// CMS base URL; asset ids resolve to `<asset_base>/assets/<id>`.
    pub asset_base: String,
    /// Image proxy base URL. `None` fetches images directly.
    pub proxy_base: Option<String>,
    /// Per-image fetch timeout for the HTTP loader (default: 15 s).
    pub image_timeout: Duration,
    pub branding: Branding,
    /// Font file used for every text style; system fonts otherwise.
    pub font_path: Option<PathBuf>,
    /// Year printed in the footer; the current year when `None`.
    pub footer_year: Option<i32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            page_width_px: A4_WIDTH_PX,
            page_height_px: A4_HEIGHT_PX,
            scale: 2.0,
            capacity: PageCapacity::default(),
            settle_delay: Duration::from_millis(300),
            asset_base: "http://localhost:8055".to_string(),
            proxy_base: None,
            image_timeout: Duration::from_secs(15),
            branding: Branding::default(),
            font_path: None,
            footer_year: None,
        }
    }
}

impl GeneratorConfig {
    /// Defaults overlaid with `ITINERARY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from `lookup` (an environment, or a map in tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base) = get("ITINERARY_ASSET_BASE").or_else(|| get("DIRECTUS_URL")) {
            self.asset_base = base;
        }
        if let Some(proxy) = get("ITINERARY_PROXY_BASE") {
            self.proxy_base = Some(proxy);
        }
        if let Some(ms) = get("ITINERARY_SETTLE_MS") {
            let ms = ms.trim().parse::<u64>().map_err(|e| {
                ItineraryError::Config(format!("ITINERARY_SETTLE_MS '{ms}': {e}"))
            })?;
            self.settle_delay = Duration::from_millis(ms);
        }
        if let Some(scale) = get("ITINERARY_SCALE") {
            self.scale = scale.trim().parse::<f32>().map_err(|e| {
                ItineraryError::Config(format!("ITINERARY_SCALE '{scale}': {e}"))
            })?;
        }
        if let Some(font) = get("ITINERARY_FONT") {
            self.font_path = Some(PathBuf::from(font));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        PageCapacity::new(self.capacity.first_page, self.capacity.subsequent_pages)?;
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ItineraryError::Config(format!(
                "device scale must be positive (got {})",
                self.scale
            )));
        }
        if self.page_width_px < 1.0 || self.page_height_px < 1.0 {
            return Err(ItineraryError::Config("page box must be at least 1px".into()));
        }
        Ok(())
    }

    /// Load the configured font file, or query the system fonts.
    pub fn load_fonts(&self) -> Result<FontManager> {
        match &self.font_path {
            Some(path) => FontManager::from_file(path).map_err(ItineraryError::Config),
            None => Ok(FontManager::from_system()),
        }
    }

    fn year(&self) -> i32 {
        self.footer_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}

/// Cooperative cancellation, checked before each page is mounted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Coarse busy indicator for the trigger surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    InProgress,
}

/// A finished document, ready to be written out.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    /// `<slug>-itinerary.pdf`
    pub file_name: String,
    /// Document title written to the PDF metadata.
    pub title: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub plan: PagePlan,
    /// Original URLs of images that rendered broken.
    pub broken_images: Vec<String>,
}

pub struct Generator {
    config: GeneratorConfig,
    assets: AssetResolver,
    loader: Arc<dyn ImageLoader>,
    fonts: FontManager,
    slot: HostSlot,
}

impl Generator {
    pub fn new(
        config: GeneratorConfig,
        loader: Arc<dyn ImageLoader>,
        fonts: FontManager,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            assets: AssetResolver::new(&config.asset_base),
            config,
            loader,
            fonts,
            slot: HostSlot::new(),
        })
    }

    /// A generator that fetches images over HTTP and uses the configured or
    /// system fonts.
    pub fn with_http(config: GeneratorConfig) -> Result<Self> {
        let loader = HttpImageLoader::new(config.image_timeout).map_err(ItineraryError::Config)?;
        let fonts = config.load_fonts()?;
        Self::new(config, Arc::new(loader), fonts)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn state(&self) -> GeneratorState {
        if self.slot.is_busy() {
            GeneratorState::InProgress
        } else {
            GeneratorState::Idle
        }
    }

    /// Normalize a record and plan its pages without rendering anything.
    pub fn plan_for(&self, record: &serde_json::Value) -> Result<(NormalizedPackage, PagePlan)> {
        let pkg = normalize(record, &self.assets);
        let plan = plan_pages(pkg.itinerary.len(), self.config.capacity)?;
        Ok((pkg, plan))
    }

    /// Produce the PDF for one package record. Any fatal error aborts the
    /// whole run; no partial document is returned.
    pub async fn generate(
        &self,
        record: &serde_json::Value,
        cancel: &CancelFlag,
    ) -> Result<GeneratedDocument> {
        let result = self.assemble(record, cancel).await;
        match &result {
            Ok(doc) => log::info!(
                "Generated {} ({} page(s), {} bytes)",
                doc.file_name,
                doc.page_count,
                doc.bytes.len()
            ),
            Err(ItineraryError::Busy) => log::warn!("Rejected generation: host busy"),
            Err(e) => log::error!("Itinerary generation failed: {e}"),
        }
        result
    }

    async fn assemble(
        &self,
        record: &serde_json::Value,
        cancel: &CancelFlag,
    ) -> Result<GeneratedDocument> {
        let _guard = self.slot.acquire()?;
        let (package, plan) = self.plan_for(record)?;
        let mut assembler = DocumentAssembler::new(
            &package.title,
            self.config.page_width_px,
            self.config.page_height_px,
        );
        let broken_images = self
            .render_planned(&package, &plan, cancel, &mut |raster: &RasterPage| {
                assembler.push(raster)
            })
            .await?;

        let page_count = assembler.page_count();
        let bytes = assembler.finish()?;
        Ok(GeneratedDocument {
            file_name: package.file_name(),
            title: package.title.clone(),
            bytes,
            page_count,
            plan,
            broken_images,
        })
    }

    /// Run the page loop, handing each raster page to `sink` in plan order.
    /// Holds the render host for the whole run; a concurrent call fails
    /// with [`ItineraryError::Busy`].
    pub async fn render_pages(
        &self,
        record: &serde_json::Value,
        cancel: &CancelFlag,
        sink: &mut dyn FnMut(&RasterPage) -> Result<()>,
    ) -> Result<RenderOutcome> {
        let _guard = self.slot.acquire()?;
        let (package, plan) = self.plan_for(record)?;
        let broken_images = self.render_planned(&package, &plan, cancel, sink).await?;
        Ok(RenderOutcome {
            package,
            plan,
            broken_images,
        })
    }

    /// The page loop proper. The caller holds the slot. Returns the original
    /// URLs of images that rendered broken.
    async fn render_planned(
        &self,
        package: &NormalizedPackage,
        plan: &PagePlan,
        cancel: &CancelFlag,
        sink: &mut dyn FnMut(&RasterPage) -> Result<()>,
    ) -> Result<Vec<String>> {
        let total = plan.total_pages();
        let year = self.config.year();
        log::debug!(
            "Rendering '{}': {} day(s) on {} page(s)",
            package.title,
            package.itinerary.len(),
            total
        );

        let mut host = RenderHost::new(self.config.page_width_px, self.config.page_height_px);
        let mut gate = LoadGate::new(
            ProxyRewriter::new(self.config.proxy_base.as_deref()),
            Arc::clone(&self.loader),
            self.config.settle_delay,
        );
        let mut broken_images = Vec::new();

        for page in &plan.pages {
            if cancel.is_cancelled() {
                log::debug!("Cancelled before page {}", page.page_index);
                return Err(ItineraryError::Cancelled);
            }

            let html = render_page_html(package, page, total, &self.config.branding, year);
            host.mount(page.page_index, &html)?;
            let report = gate.settle(&mut host).await;
            broken_images.extend(report.failed);
            let layout = host.layout(&self.fonts)?;
            host.clear();

            let fonts = self.fonts.clone();
            let scale = self.config.scale;
            let page_index = page.page_index;
            let raster = tokio::task::spawn_blocking(move || rasterize(&layout, scale, &fonts))
                .await
                .map_err(|e| ItineraryError::Raster {
                    page: page_index,
                    reason: format!("raster task failed: {e}"),
                })??;
            sink(&raster)?;
        }

        Ok(broken_images)
    }
}

/// What a completed page loop produced besides the pages themselves.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub package: NormalizedPackage,
    pub plan: PagePlan,
    pub broken_images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::StaticImageLoader;
    use serde_json::json;
    use std::collections::HashMap;

    fn generator() -> Generator {
        let config = GeneratorConfig {
            scale: 0.25,
            settle_delay: Duration::ZERO,
            footer_year: Some(2026),
            ..GeneratorConfig::default()
        };
        Generator::new(config, Arc::new(StaticImageLoader::new()), FontManager::synthetic()).unwrap()
    }

    #[test]
    fn env_overlay_reads_known_keys() {
        let vars: HashMap<&str, &str> = [
            ("DIRECTUS_URL", "https://cms.example.com"),
            ("ITINERARY_PROXY_BASE", "http://localhost:3000"),
            ("ITINERARY_SETTLE_MS", "50"),
            ("ITINERARY_SCALE", "1.5"),
        ]
        .into_iter()
        .collect();
        let mut config = GeneratorConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.asset_base, "https://cms.example.com");
        assert_eq!(config.proxy_base.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.settle_delay, Duration::from_millis(50));
        assert_eq!(config.scale, 1.5);
    }

    #[test]
    fn env_overlay_rejects_garbage() {
        let mut config = GeneratorConfig::default();
        let err = config
            .apply_env(|k| (k == "ITINERARY_SCALE").then(|| "big".to_string()))
            .unwrap_err();
        assert!(matches!(err, ItineraryError::Config(_)));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = GeneratorConfig {
            capacity: PageCapacity {
                first_page: 0,
                subsequent_pages: 4,
            },
            ..GeneratorConfig::default()
        };
        let res = Generator::new(config, Arc::new(StaticImageLoader::new()), FontManager::synthetic());
        assert!(matches!(res, Err(ItineraryError::Config(_))));
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn plan_for_uses_configured_capacity() {
        let gen = generator();
        let days: Vec<_> = (0..10).map(|i| json!({"title": format!("D{i}")})).collect();
        let (pkg, plan) = gen.plan_for(&json!({"title": "T", "itinerary_json": days})).unwrap();
        assert_eq!(pkg.itinerary.len(), 10);
        assert_eq!(plan.total_pages(), 3);
    }

    #[tokio::test]
    async fn generate_returns_pdf_and_resets_state() {
        let gen = generator();
        let record = json!({"title": "Lisbon Weekend", "itinerary_json": [{"title": "Arrive"}]});
        let doc = gen.generate(&record, &CancelFlag::new()).await.unwrap();
        assert_eq!(doc.file_name, "lisbon-weekend-itinerary.pdf");
        assert_eq!(doc.page_count, 1);
        assert_eq!(&doc.bytes[0..5], b"%PDF-");
        // The fallback hero is not registered with the static loader.
        assert_eq!(doc.broken_images.len(), 1);
        assert_eq!(gen.state(), GeneratorState::Idle);
    }

    #[tokio::test]
    async fn document_title_follows_normalized_package() {
        let gen = generator();
        let doc = gen
            .generate(&json!({"title": "  Porto Food Tour  "}), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(doc.title, "Porto Food Tour");

        let doc = gen
            .generate(&json!({"title": "   "}), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(doc.title, crate::package::DEFAULT_TITLE);
        assert_eq!(doc.file_name, "travel-package-itinerary.pdf");
    }

    #[tokio::test]
    async fn cancelled_run_delivers_nothing() {
        let gen = generator();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = gen.generate(&json!({}), &cancel).await.unwrap_err();
        assert!(matches!(err, ItineraryError::Cancelled));
        assert_eq!(gen.state(), GeneratorState::Idle);
    }

    #[tokio::test]
    async fn sink_failure_aborts_the_run() {
        let gen = generator();
        let days: Vec<_> = (0..8).map(|_| json!({})).collect();
        let mut seen = 0usize;
        let res = gen
            .render_pages(&json!({"itinerary_json": days}), &CancelFlag::new(), &mut |page: &RasterPage| {
                seen += 1;
                if page.page_index == 1 {
                    Err(ItineraryError::Raster {
                        page: 1,
                        reason: "boom".into(),
                    })
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(matches!(res, Err(ItineraryError::Raster { page: 1, .. })));
        assert_eq!(seen, 2);
        assert_eq!(gen.state(), GeneratorState::Idle);
    }
}
