//! Content normalizer – turns a loosely-typed CMS package record into the
//! canonical itinerary consumed by the planner and the render host.
//!
//! Nothing in here fails: every missing or malformed field falls back to a
//! default so that a half-filled CMS entry still produces a document.

use serde::Serialize;
use serde_json::Value;

/// Stock photo used when a package has neither a banner nor a main image.
pub const FALLBACK_HERO_URL: &str =
    "https://images.unsplash.com/photo-1476514525535-07fb3b4ae5f1?auto=format&fit=crop&q=80";

pub const DEFAULT_TITLE: &str = "Travel Package";
pub const DEFAULT_LOCATION: &str = "International";
pub const DEFAULT_DURATION_DAYS: u32 = 5;
pub const DEFAULT_DESCRIPTION: &str = "A wonderful journey awaits you.";

/// One day of the itinerary. The day's position is its index in
/// [`NormalizedPackage::itinerary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayEntry {
    pub title: String,
    pub description: String,
    /// Fully-qualified image URL, if the day has one.
    pub image: Option<String>,
}

/// Canonical, read-only view of a package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPackage {
    pub title: String,
    pub slug: String,
    pub location: String,
    pub duration_days: u32,
    pub description: String,
    pub hero_image: String,
    pub itinerary: Vec<DayEntry>,
    pub inclusions: Vec<String>,
    pub exclusions: Vec<String>,
}

impl NormalizedPackage {
    /// Default output filename, `<slug>-itinerary.pdf`.
    pub fn file_name(&self) -> String {
        format!("{}-itinerary.pdf", self.slug)
    }
}

/// Resolves CMS image references against the asset endpoint.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    base: String,
}

impl AssetResolver {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a reference that is either a bare identifier or an object
    /// wrapping one (`{"id": "..."}`). Absolute URLs pass through untouched.
    pub fn resolve(&self, reference: &Value) -> Option<String> {
        let id = match reference {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("id").and_then(Value::as_str)?,
            _ => return None,
        };
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        if is_absolute_url(id) || id.starts_with("data:") {
            return Some(id.to_string());
        }
        Some(format!("{}/assets/{}", self.base, id))
    }
}

pub(crate) fn is_absolute_url(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Normalize a package record of unknown shape.
pub fn normalize(record: &Value, assets: &AssetResolver) -> NormalizedPackage {
    let title = non_empty_str(record.get("title"))
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    let slug = non_empty_str(record.get("slug"))
        .map(slug::slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            let s = slug::slugify(&title);
            if s.is_empty() {
                "package".to_string()
            } else {
                s
            }
        });

    let hero_image = ["banner_image", "image"]
        .iter()
        .find_map(|field| record.get(*field).and_then(|r| assets.resolve(r)))
        .unwrap_or_else(|| FALLBACK_HERO_URL.to_string());

    let days = record
        .get("itinerary_json")
        .or_else(|| record.get("itinerary"))
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty());

    let itinerary = days
        .map(|days| {
            days.iter()
                .enumerate()
                .map(|(i, day)| normalize_day(i, day, assets))
                .collect()
        })
        .unwrap_or_default();

    NormalizedPackage {
        title,
        slug,
        location: non_empty_str(record.get("location"))
            .unwrap_or(DEFAULT_LOCATION)
            .to_string(),
        duration_days: parse_duration(record.get("duration")),
        description: non_empty_str(record.get("description"))
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string(),
        hero_image,
        itinerary,
        inclusions: string_list(record.get("inclusions")),
        exclusions: string_list(record.get("exclusions")),
    }
}

fn normalize_day(index: usize, day: &Value, assets: &AssetResolver) -> DayEntry {
    DayEntry {
        title: non_empty_str(day.get("title"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Day {}", index + 1)),
        description: day
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        image: day.get("image").and_then(|r| assets.resolve(r)),
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_duration(v: Option<&Value>) -> u32 {
    let parsed = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|d| d.is_finite() && *d >= 1.0)
        .map(|d| d.round() as u32)
        .unwrap_or(DEFAULT_DURATION_DAYS)
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
