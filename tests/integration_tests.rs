//! Integration tests for the itinerary pipeline.
//!
//! These tests validate:
//! - Page counts and day distribution for realistic itineraries
//! - Footer numbering against the final page total
//! - Image failures never abort a document
//! - Repeated runs produce identical pages
//! - One run at a time, and cancellation between pages

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use itinerary_forge::fonts::FontManager;
use itinerary_forge::gate::StaticImageLoader;
use itinerary_forge::pipeline::GeneratorState;
use itinerary_forge::raster::RasterPage;
use itinerary_forge::templates::{render_page_html, Branding, COMING_SOON_TEXT};
use itinerary_forge::{CancelFlag, Generator, GeneratorConfig, ItineraryError, PageCapacity};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

// =====================================================================
// Helpers
// =====================================================================

const HERO_URL: &str = "https://cms.example.com/assets/hero-lisbon";

fn test_config() -> GeneratorConfig {
    GeneratorConfig {
        scale: 0.25,
        settle_delay: Duration::ZERO,
        footer_year: Some(2026),
        ..GeneratorConfig::default()
    }
}

fn generator_with(loader: Arc<StaticImageLoader>, config: GeneratorConfig) -> Generator {
    Generator::new(config, loader, FontManager::synthetic()).unwrap()
}

fn hero_png() -> Vec<u8> {
    let img = image::RgbImage::from_fn(16, 9, |x, y| image::Rgb([(x * 15) as u8, (y * 28) as u8, 120]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn package(days: usize) -> Value {
    let itinerary: Vec<Value> = (1..=days)
        .map(|d| {
            json!({
                "title": format!("Day {d} in Lisbon"),
                "description": "Walk the old town, ride tram 28 and finish with pastel de nata.",
            })
        })
        .collect();
    json!({
        "title": "Lisbon Explorer",
        "slug": "lisbon-explorer",
        "location": "Lisbon, Portugal",
        "duration": days,
        "description": "A week of tiles, trams and viewpoints.",
        "banner_image": HERO_URL,
        "itinerary_json": itinerary,
        "inclusions": ["Hotel", "Breakfast", "Airport transfer"],
        "exclusions": ["Flights"],
    })
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

async fn page_hashes(gen: &Generator, record: &Value) -> Vec<[u8; 32]> {
    let mut hashes = Vec::new();
    gen.render_pages(record, &CancelFlag::new(), &mut |page: &RasterPage| {
        hashes.push(Sha256::digest(page.pixels()).into());
        Ok(())
    })
    .await
    .unwrap();
    hashes
}

// =====================================================================
// Page planning
// =====================================================================

#[test]
fn ten_day_itinerary_spans_three_pages() {
    let gen = generator_with(Arc::new(StaticImageLoader::new()), test_config());
    let (_, plan) = gen.plan_for(&package(10)).unwrap();
    let counts: Vec<usize> = plan.pages.iter().map(|p| p.day_count()).collect();
    assert_eq!(counts, vec![3, 4, 3]);
    assert_eq!(plan.total_pages(), 3);
    assert!(plan.pages[2].carries_details_section);
}

#[test]
fn seven_day_itinerary_spills_details_onto_a_new_page() {
    let gen = generator_with(Arc::new(StaticImageLoader::new()), test_config());
    let (_, plan) = gen.plan_for(&package(7)).unwrap();
    let counts: Vec<usize> = plan.pages.iter().map(|p| p.day_count()).collect();
    assert_eq!(counts, vec![3, 4, 0]);
    assert!(!plan.pages[1].carries_details_section);
    assert!(plan.pages[2].carries_details_section);
}

#[test]
fn every_footer_shows_the_final_total() {
    let gen = generator_with(Arc::new(StaticImageLoader::new()), test_config());
    let (pkg, plan) = gen.plan_for(&package(10)).unwrap();
    let total = plan.total_pages();
    for page in &plan.pages {
        let html = render_page_html(&pkg, page, total, &Branding::default(), 2026);
        let label = format!("{} / {total}", page.page_number());
        assert!(html.contains(&label), "page {} missing '{label}'", page.page_number());
        assert!(html.contains("MyPerfectTrips"));
    }
}

#[test]
fn custom_capacity_changes_the_plan() {
    let config = GeneratorConfig {
        capacity: PageCapacity::new(2, 5).unwrap(),
        ..test_config()
    };
    let gen = generator_with(Arc::new(StaticImageLoader::new()), config);
    let (_, plan) = gen.plan_for(&package(10)).unwrap();
    let counts: Vec<usize> = plan.pages.iter().map(|p| p.day_count()).collect();
    assert_eq!(counts, vec![2, 5, 3]);
}

// =====================================================================
// Generation
// =====================================================================

#[tokio::test]
async fn ten_day_package_produces_three_page_pdf() {
    let loader = Arc::new(StaticImageLoader::new().with_image(HERO_URL, "image/png", hero_png()));
    let gen = generator_with(loader, test_config());
    let doc = gen.generate(&package(10), &CancelFlag::new()).await.unwrap();
    assert_valid_pdf(&doc.bytes);
    assert_eq!(doc.page_count, 3);
    assert_eq!(doc.file_name, "lisbon-explorer-itinerary.pdf");
    assert!(doc.broken_images.is_empty());
}

#[tokio::test]
async fn unreachable_image_does_not_abort_the_document() {
    let gen = generator_with(Arc::new(StaticImageLoader::new()), test_config());
    let doc = gen.generate(&package(4), &CancelFlag::new()).await.unwrap();
    assert_valid_pdf(&doc.bytes);
    assert_eq!(doc.page_count, 2);
    assert_eq!(doc.broken_images, vec![HERO_URL.to_string()]);
}

#[tokio::test]
async fn images_are_requested_through_the_proxy() {
    let loader = Arc::new(StaticImageLoader::new());
    let config = GeneratorConfig {
        proxy_base: Some("http://localhost:3000".into()),
        ..test_config()
    };
    let gen = generator_with(Arc::clone(&loader), config);
    gen.generate(&package(2), &CancelFlag::new()).await.unwrap();
    let requests = loader.requests();
    assert!(!requests.is_empty());
    for url in requests {
        assert!(
            url.starts_with("http://localhost:3000/api/proxy-image?url="),
            "not proxied: {url}"
        );
    }
}

#[tokio::test]
async fn empty_itinerary_still_yields_a_document() {
    let gen = generator_with(Arc::new(StaticImageLoader::new()), test_config());
    let record = json!({"title": "Mystery Trip"});
    let (pkg, plan) = gen.plan_for(&record).unwrap();
    assert_eq!(plan.total_pages(), 1);
    let html = render_page_html(&pkg, &plan.pages[0], 1, &Branding::default(), 2026);
    assert!(html.contains(COMING_SOON_TEXT));

    let doc = gen.generate(&record, &CancelFlag::new()).await.unwrap();
    assert_valid_pdf(&doc.bytes);
    assert_eq!(doc.page_count, 1);
}

#[tokio::test]
async fn repeated_runs_render_identical_pages() {
    let loader = Arc::new(StaticImageLoader::new().with_image(HERO_URL, "image/png", hero_png()));
    let gen = generator_with(loader, test_config());
    let record = package(7);
    let first = page_hashes(&gen, &record).await;
    let second = page_hashes(&gen, &record).await;
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    // Different pages really differ.
    assert_ne!(first[0], first[1]);
}

#[tokio::test]
async fn concurrent_run_is_rejected_as_busy() {
    let config = GeneratorConfig {
        settle_delay: Duration::from_millis(50),
        ..test_config()
    };
    let gen = generator_with(Arc::new(StaticImageLoader::new()), config);
    let record = package(5);
    let cancel = CancelFlag::new();

    let (first, second) = tokio::join!(gen.generate(&record, &cancel), gen.generate(&record, &cancel));
    let (winner, loser) = if first.is_ok() { (first, second) } else { (second, first) };
    assert_valid_pdf(&winner.unwrap().bytes);
    assert!(matches!(loser, Err(ItineraryError::Busy)));
    assert_eq!(gen.state(), GeneratorState::Idle);

    // The host is free again afterwards.
    assert!(gen.generate(&record, &cancel).await.is_ok());
}

#[tokio::test]
async fn cancelling_mid_run_stops_before_the_next_page() {
    let gen = generator_with(Arc::new(StaticImageLoader::new()), test_config());
    let cancel = CancelFlag::new();
    let mut delivered = 0usize;
    let res = gen
        .render_pages(&package(10), &cancel, &mut |_page: &RasterPage| {
            delivered += 1;
            cancel.cancel();
            Ok(())
        })
        .await;
    assert!(matches!(res, Err(ItineraryError::Cancelled)));
    assert_eq!(delivered, 1);
    assert_eq!(gen.state(), GeneratorState::Idle);
}

#[test]
fn fatal_errors_show_one_friendly_message() {
    let err = ItineraryError::Mount("missing root".into());
    assert_eq!(
        err.user_message(),
        "Could not generate the itinerary PDF. Please try again."
    );
}
