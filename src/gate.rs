//! Image proxy rewriting and the load gate.
//!
//! Before a page is rasterized every external image in the render host is
//! routed through the same-origin proxy, fetched, and embedded as a `data:`
//! URI so the rasterizer has the bytes in memory. A failed fetch is
//! tolerated: the image is marked broken and the page still renders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Url;

use crate::dom::{for_each_image_mut, ElementNode};
use crate::host::RenderHost;
use crate::package::is_absolute_url;

/// Path of the proxy endpoint, relative to the proxy base URL.
pub const PROXY_PATH: &str = "/api/proxy-image";

/// Attribute set on images whose fetch failed.
pub const BROKEN_ATTR: &str = "data-broken";

/// Rewrites absolute image URLs to go through the proxy endpoint.
#[derive(Debug, Clone, Default)]
pub struct ProxyRewriter {
    proxy_base: Option<String>,
}

impl ProxyRewriter {
    /// With no base, URLs are fetched directly.
    pub fn new(proxy_base: Option<&str>) -> Self {
        Self {
            proxy_base: proxy_base
                .map(|b| b.trim_end_matches('/').to_string())
                .filter(|b| !b.is_empty()),
        }
    }

    /// `https://cdn/x.jpg` → `<base>/api/proxy-image?url=https%3A%2F%2Fcdn%2Fx.jpg`.
    /// Returns `None` for sources that are not absolute `http(s)` URLs.
    pub fn rewrite(&self, src: &str) -> Option<String> {
        if !is_absolute_url(src) {
            return None;
        }
        let Some(base) = &self.proxy_base else {
            return Some(src.to_string());
        };
        let endpoint = format!("{base}{PROXY_PATH}");
        if src.starts_with(&endpoint) {
            return Some(src.to_string());
        }
        match Url::parse_with_params(&endpoint, &[("url", src)]) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                log::warn!("Invalid proxy base '{base}': {e}; fetching {src} directly");
                Some(src.to_string())
            }
        }
    }
}

/// Fetched image bytes and their MIME type.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl LoadedImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }
}

/// Fetches one image.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<LoadedImage, String>;
}

/// Loads images over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<LoadedImage, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("body read failed: {e}"))?;
        Ok(LoadedImage {
            mime,
            bytes: bytes.to_vec(),
        })
    }
}

/// In-memory loader keyed by exact URL. Unknown URLs fail. Records every
/// request so callers can check what was fetched.
#[derive(Debug, Default)]
pub struct StaticImageLoader {
    images: HashMap<String, LoadedImage>,
    requests: Mutex<Vec<String>>,
}

impl StaticImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: &str, mime: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(
            url.to_string(),
            LoadedImage {
                mime: mime.to_string(),
                bytes,
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageLoader for StaticImageLoader {
    async fn load(&self, url: &str) -> Result<LoadedImage, String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no image registered for {url}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Rewriting,
    Waiting,
    Settled,
}

/// Outcome of one gate pass over a mounted page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Images whose bytes were embedded.
    pub loaded: usize,
    /// Original URLs of images that failed and render broken.
    pub failed: Vec<String>,
}

pub struct LoadGate {
    rewriter: ProxyRewriter,
    loader: Arc<dyn ImageLoader>,
    settle_delay: Duration,
    state: GateState,
}

enum Pending {
    /// Already embedded or not an image we can fetch.
    Skip,
    Fetch(String),
}

impl LoadGate {
    pub fn new(rewriter: ProxyRewriter, loader: Arc<dyn ImageLoader>, settle_delay: Duration) -> Self {
        Self {
            rewriter,
            loader,
            settle_delay,
            state: GateState::Settled,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// One pass over every image in the host: rewrite, wait for each load
    /// or error, embed, then wait out the settle delay. No retries.
    pub async fn settle(&mut self, host: &mut RenderHost) -> GateReport {
        self.state = GateState::Rewriting;
        let mut pending = Vec::new();
        let mut originals = Vec::new();
        for_each_image_mut(host.dom_mut(), &mut |img: &mut ElementNode| {
            let src = img.src().unwrap_or_default().trim().to_string();
            if src.starts_with("data:") {
                pending.push(Pending::Skip);
                originals.push(src);
                return;
            }
            match self.rewriter.rewrite(&src) {
                Some(url) => {
                    img.set_attr("src", url.clone());
                    pending.push(Pending::Fetch(url));
                }
                None => {
                    // Relative or empty sources cannot be fetched.
                    img.set_attr(BROKEN_ATTR, "true");
                    pending.push(Pending::Skip);
                }
            }
            originals.push(src);
        });

        self.state = GateState::Waiting;
        let handles: Vec<_> = pending
            .into_iter()
            .map(|p| match p {
                Pending::Skip => None,
                Pending::Fetch(url) => {
                    let loader = Arc::clone(&self.loader);
                    Some(tokio::spawn(async move { loader.load(&url).await }))
                }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle {
                None => None,
                Some(h) => Some(match h.await {
                    Ok(result) => result,
                    Err(e) => Err(format!("load task failed: {e}")),
                }),
            };
            outcomes.push(outcome);
        }

        let mut report = GateReport::default();
        let mut index = 0usize;
        for_each_image_mut(host.dom_mut(), &mut |img: &mut ElementNode| {
            let original = originals.get(index).cloned().unwrap_or_default();
            match outcomes.get(index) {
                Some(Some(Ok(image))) => {
                    img.set_attr("src", image.to_data_uri());
                    report.loaded += 1;
                }
                Some(Some(Err(reason))) => {
                    log::warn!("Image {original} failed to load: {reason}");
                    img.set_attr(BROKEN_ATTR, "true");
                    report.failed.push(original);
                }
                _ => {
                    if img.attributes.contains_key(BROKEN_ATTR) {
                        log::warn!("Image '{original}' has no fetchable source");
                        report.failed.push(original);
                    }
                }
            }
            index += 1;
        });

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.state = GateState::Settled;
        log::debug!(
            "Load gate settled: {} loaded, {} failed",
            report.loaded,
            report.failed.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::image_sources;
    use crate::layout_config::{A4_HEIGHT_PX, A4_WIDTH_PX};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

    fn mounted(imgs: &[&str]) -> RenderHost {
        let tags: String = imgs
            .iter()
            .map(|src| format!(r#"<img src="{src}" class="w-8 h-8">"#))
            .collect();
        let mut host = RenderHost::new(A4_WIDTH_PX, A4_HEIGHT_PX);
        host.mount(0, &format!(r#"<div id="page-root">{tags}</div>"#))
            .unwrap();
        host
    }

    #[test]
    fn rewrite_encodes_target_url() {
        let r = ProxyRewriter::new(Some("http://localhost:3000/"));
        let out = r.rewrite("https://cdn.example.com/a b.jpg?w=1&h=2").unwrap();
        assert!(out.starts_with("http://localhost:3000/api/proxy-image?url="));
        assert!(out.contains("https%3A%2F%2Fcdn.example.com"));
        assert!(!out.contains("&h=2"));
    }

    #[test]
    fn rewrite_skips_relative_and_passes_through_without_proxy() {
        let r = ProxyRewriter::new(Some("http://localhost:3000"));
        assert_eq!(r.rewrite("/local.png"), None);
        assert_eq!(r.rewrite(""), None);
        let direct = ProxyRewriter::new(None);
        assert_eq!(
            direct.rewrite("https://cdn.example.com/x.jpg").as_deref(),
            Some("https://cdn.example.com/x.jpg")
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        let r = ProxyRewriter::new(Some("http://localhost:3000"));
        let once = r.rewrite("https://cdn.example.com/x.jpg").unwrap();
        assert_eq!(r.rewrite(&once).unwrap(), once);
    }

    #[tokio::test]
    async fn settle_embeds_loaded_and_tolerates_failures() {
        let rewriter = ProxyRewriter::new(None);
        let loader = Arc::new(
            StaticImageLoader::new().with_image("https://ok.example/a.png", "image/png", PNG_MAGIC.to_vec()),
        );
        let mut gate = LoadGate::new(rewriter, loader.clone(), Duration::ZERO);
        let mut host = mounted(&["https://ok.example/a.png", "https://gone.example/b.png"]);

        let report = gate.settle(&mut host).await;

        assert_eq!(gate.state(), GateState::Settled);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed, vec!["https://gone.example/b.png".to_string()]);
        let srcs = image_sources(host.dom());
        assert!(srcs[0].starts_with("data:image/png;base64,"));
        assert_eq!(srcs[1], "https://gone.example/b.png");
        assert_eq!(loader.requests().len(), 2);
    }

    #[tokio::test]
    async fn settle_fetches_through_proxy() {
        let rewriter = ProxyRewriter::new(Some("http://proxy.local"));
        let proxied = rewriter.rewrite("https://cdn.example/x.png").unwrap();
        let loader = Arc::new(StaticImageLoader::new().with_image(&proxied, "image/png", PNG_MAGIC.to_vec()));
        let mut gate = LoadGate::new(rewriter, loader.clone(), Duration::ZERO);
        let mut host = mounted(&["https://cdn.example/x.png"]);

        let report = gate.settle(&mut host).await;

        assert_eq!(report.loaded, 1);
        assert_eq!(loader.requests(), vec![proxied]);
    }

    #[tokio::test]
    async fn data_uris_are_left_alone() {
        let loader = Arc::new(StaticImageLoader::new());
        let mut gate = LoadGate::new(ProxyRewriter::new(None), loader.clone(), Duration::ZERO);
        let mut host = mounted(&["data:image/png;base64,AAAA"]);

        let report = gate.settle(&mut host).await;

        assert_eq!(report, GateReport::default());
        assert!(loader.requests().is_empty());
    }
}
