//! Image proxy endpoint – `GET /api/proxy-image?url=<absolute-url>`.
//!
//! Fetches a remote image server-side and re-serves the bytes with
//! permissive cross-origin and long-lived cache headers. Stateless: the only
//! caching is what the response headers ask downstream caches to do.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ItineraryError, Result};
use crate::gate::PROXY_PATH;

pub const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind: SocketAddr,
    /// Hosts images may be fetched from. Empty allows any host.
    pub allowed_hosts: Vec<String>,
    /// Upstream request timeout.
    pub timeout: Duration,
    /// Largest upstream body that is re-served.
    pub max_body_bytes: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            allowed_hosts: Vec::new(),
            timeout: Duration::from_secs(15),
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Defaults plus the comma-separated `ITINERARY_PROXY_ALLOW` list and an
    /// optional `ITINERARY_PROXY_MAX_BYTES` body cap.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(list) = std::env::var("ITINERARY_PROXY_ALLOW") {
            config.allowed_hosts = parse_host_list(&list);
        }
        match std::env::var("ITINERARY_PROXY_MAX_BYTES").map(|v| v.trim().parse::<u64>()) {
            Ok(Ok(limit)) if limit > 0 => config.max_body_bytes = limit,
            Ok(_) => log::warn!("Ignoring invalid ITINERARY_PROXY_MAX_BYTES"),
            Err(_) => {}
        }
        config
    }

    fn allows(&self, host: &str) -> bool {
        host_allowed(&self.allowed_hosts, host)
    }
}

fn host_allowed(allowed_hosts: &[String], host: &str) -> bool {
    allowed_hosts.is_empty()
        || allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host))
}

const MAX_REDIRECTS: usize = 10;

/// Redirects are followed only while every hop stays on an allowed host.
/// A hop elsewhere stops the chain and the 3xx reaches the handler.
fn redirect_policy(allowed_hosts: Vec<String>) -> reqwest::redirect::Policy {
    if allowed_hosts.is_empty() {
        return reqwest::redirect::Policy::limited(MAX_REDIRECTS);
    }
    reqwest::redirect::Policy::custom(move |attempt| {
        let allowed = attempt
            .url()
            .host_str()
            .is_some_and(|host| host_allowed(&allowed_hosts, host));
        if !allowed {
            attempt.stop()
        } else if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

pub fn parse_host_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Image URL is required")]
    MissingUrl,

    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Host '{0}' is not allowed")]
    HostNotAllowed(String),

    #[error("Failed to fetch image: {reason}")]
    Upstream { status: StatusCode, reason: String },

    #[error("Image exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Internal Server Error")]
    Internal(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingUrl | Self::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Self::HostNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::Upstream { status, .. } => *status,
            Self::TooLarge { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(detail) => {
                log::error!("Image proxy error: {detail}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

struct ProxyState {
    client: reqwest::Client,
    config: ProxyConfig,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    url: Option<String>,
}

/// Build the proxy router.
pub fn router(config: ProxyConfig) -> Result<Router> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .redirect(redirect_policy(config.allowed_hosts.clone()))
        .build()
        .map_err(|e| ItineraryError::Config(format!("HTTP client: {e}")))?;
    let state = Arc::new(ProxyState { client, config });
    Ok(Router::new()
        .route(PROXY_PATH, get(proxy_image))
        .with_state(state))
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: ProxyConfig) -> Result<()> {
    let bind = config.bind;
    let app = router(config)?;
    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("Image proxy listening on http://{bind}{PROXY_PATH}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn proxy_image(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<ProxyQuery>,
) -> std::result::Result<Response, ProxyError> {
    let raw = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ProxyError::MissingUrl)?;
    let url = Url::parse(raw).map_err(|e| ProxyError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::InvalidUrl(format!("{raw}: no host")))?
        .to_string();
    if !state.config.allows(&host) {
        log::warn!("Refused to proxy image from {host}");
        return Err(ProxyError::HostNotAllowed(host));
    }

    let mut upstream = state
        .client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ProxyError::Internal(format!("fetching {url}: {e}")))?;
    let upstream_status = upstream.status();
    if upstream_status.is_redirection() && !state.config.allowed_hosts.is_empty() {
        let target = redirect_target(&upstream);
        log::warn!("Refused redirect from {host} to {target}");
        return Err(ProxyError::HostNotAllowed(target));
    }
    if !upstream_status.is_success() {
        let status =
            StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(ProxyError::Upstream {
            status,
            reason: upstream_status
                .canonical_reason()
                .unwrap_or("upstream error")
                .to_string(),
        });
    }
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let limit = state.config.max_body_bytes;
    if upstream.content_length().is_some_and(|len| len > limit) {
        return Err(ProxyError::TooLarge { limit });
    }
    let mut bytes = Vec::new();
    while let Some(chunk) = upstream
        .chunk()
        .await
        .map_err(|e| ProxyError::Internal(format!("reading {url}: {e}")))?
    {
        if (bytes.len() + chunk.len()) as u64 > limit {
            return Err(ProxyError::TooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }
    log::debug!("Proxied {} bytes from {host}", bytes.len());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
            (header::CACHE_CONTROL, CACHE_CONTROL_VALUE.to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Host named by the `Location` of a stopped redirect, resolved against the
/// URL that issued it.
fn redirect_target(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| response.url().join(location).ok())
        .and_then(|target| target.host_str().map(str::to_string))
        .unwrap_or_else(|| "redirect target".to_string())
}
