//! Page templates – the HTML fragment mounted in the render host for one
//! planned page.
//!
//! Every page is a fixed A4 box with id `page-root`. Page 0 carries the
//! banner, hero image and overview; later pages get a running header.
//! Days, the trip-details section and the footer follow the descriptor.

use serde::{Deserialize, Serialize};

use crate::dom::escape_html;
use crate::layout_config::{A4_HEIGHT_PX, A4_WIDTH_PX};
use crate::package::{DayEntry, NormalizedPackage};
use crate::pagination::PageDescriptor;

/// Id of the container every page template mounts.
pub const PAGE_ROOT_ID: &str = "page-root";

/// Shown in the itinerary area when a package has no days yet.
pub const COMING_SOON_TEXT: &str = "Detailed day-by-day itinerary coming soon.";

/// Brand strings printed on every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    pub name: String,
    pub website: String,
    pub email: String,
    pub disclaimer: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            name: "MyPerfectTrips".to_string(),
            website: "www.myperfecttrips.com".to_string(),
            email: "support@myperfecttrips.com".to_string(),
            disclaimer:
                "This is just an itinerary. Prices and availability are subject to confirmation."
                    .to_string(),
        }
    }
}

/// Footer label, e.g. `© 2026 MyPerfectTrips. 2 / 3`.
pub fn footer_label(branding: &Branding, year: i32, page_number: usize, total_pages: usize) -> String {
    format!(
        "\u{00A9} {year} {}. {page_number} / {total_pages}",
        branding.name
    )
}

/// Render the HTML for one planned page. `total_pages` must be the final
/// page count of the plan.
pub fn render_page_html(
    pkg: &NormalizedPackage,
    page: &PageDescriptor,
    total_pages: usize,
    branding: &Branding,
    year: i32,
) -> String {
    let mut html = format!(
        r#"<div id="{PAGE_ROOT_ID}" class="bg-white relative overflow-hidden" style="width: {A4_WIDTH_PX}px; height: {A4_HEIGHT_PX}px">"#
    );

    if page.is_first_page {
        html.push_str(&cover_header(pkg, branding));
    } else {
        html.push_str(&running_header(pkg, page.page_number()));
    }

    let days = page.days(&pkg.itinerary);
    if page.is_first_page || !days.is_empty() {
        html.push_str(r#"<div class="px-12">"#);
        if page.is_first_page {
            html.push_str(&section_heading("Itinerary", "mb-4"));
        }
        // The cover shares its height with the header and hero.
        html.push_str(if page.is_first_page {
            r#"<div class="space-y-3">"#
        } else {
            r#"<div class="space-y-4">"#
        });
        for (offset, day) in days.iter().enumerate() {
            html.push_str(&day_entry(page.days.start + offset + 1, day));
        }
        if pkg.itinerary.is_empty() {
            html.push_str(&format!(
                r#"<p class="text-sm text-slate-400 italic">{COMING_SOON_TEXT}</p>"#
            ));
        }
        html.push_str("</div></div>");
    }

    if page.carries_details_section {
        html.push_str(&details_section(pkg, branding));
    }

    html.push_str(&format!(
        r#"<div class="absolute bottom-0 left-0 w-full p-8 text-center"><div class="border-t border-slate-100 pt-4"><p class="text-[10px] text-slate-300">{}</p></div></div>"#,
        escape_html(&footer_label(branding, year, page.page_number(), total_pages))
    ));

    html.push_str("</div>");
    html
}

fn section_heading(text: &str, extra: &str) -> String {
    format!(
        r#"<h3 class="text-sm font-bold text-blue-900 border-b border-blue-100 pb-1 uppercase {extra}">{text}</h3>"#
    )
}

fn cover_header(pkg: &NormalizedPackage, branding: &Branding) -> String {
    format!(
        r#"<div class="bg-slate-900 text-white p-8 pb-12 h-[200px] flex justify-between items-start">
  <div class="flex flex-col">
    <h1 class="text-xl font-bold uppercase text-blue-400">{brand}</h1>
    <h2 class="text-3xl font-bold mt-4 max-w-md leading-tight">{title}</h2>
  </div>
  <div class="flex flex-col text-right text-slate-300 text-[10px]">
    <p>{website}</p>
    <p>{email}</p>
    <p class="text-xs text-white mt-4">{location} · {duration} Days</p>
  </div>
</div>
<div class="px-10 -mt-8 mb-4">
  <div class="w-full h-36 bg-slate-200 border-4 border-white overflow-hidden rounded-sm">
    <img src="{hero}" class="w-full h-full object-cover">
  </div>
</div>
<div class="px-12 mb-4">
  {overview}
  <p class="text-slate-600 text-sm leading-relaxed mt-2 line-clamp-4">{description}</p>
</div>"#,
        brand = escape_html(&branding.name),
        title = escape_html(&pkg.title),
        website = escape_html(&branding.website),
        email = escape_html(&branding.email),
        location = escape_html(&pkg.location),
        duration = pkg.duration_days,
        hero = escape_html(&pkg.hero_image),
        overview = section_heading("Overview", ""),
        description = escape_html(&pkg.description),
    )
}

fn running_header(pkg: &NormalizedPackage, page_number: usize) -> String {
    format!(
        r#"<div class="px-12 pt-8 pb-4 mb-6 flex justify-between items-end border-b border-slate-100">
  <p class="text-xs font-bold text-slate-400 uppercase">{title}</p>
  <p class="text-[10px] text-slate-300">Page {page_number}</p>
</div>"#,
        title = escape_html(&pkg.title),
    )
}

/// One day row. `number` is the 1-based position in the whole itinerary.
fn day_entry(number: usize, day: &DayEntry) -> String {
    let image = day
        .image
        .as_deref()
        .map(|src| {
            format!(
                r#"<div class="w-48 h-20 bg-slate-100 rounded overflow-hidden mt-1 border border-slate-100"><img src="{}" class="w-full h-full object-cover"></div>"#,
                escape_html(src)
            )
        })
        .unwrap_or_default();
    format!(
        r#"<div class="flex gap-6">
  <div class="flex flex-col items-center">
    <div class="w-8 h-8 rounded-full bg-blue-600 text-white flex items-center justify-center shrink-0"><p class="text-xs font-bold">{number}</p></div>
    <div class="w-px grow bg-slate-200 my-1"></div>
  </div>
  <div class="flex-1 flex flex-col pb-2">
    <h4 class="font-bold text-slate-900 text-sm mb-1">{title}</h4>
    <p class="text-xs text-slate-500 leading-relaxed mb-2 line-clamp-3">{description}</p>
    {image}
  </div>
</div>"#,
        title = escape_html(&day.title),
        description = escape_html(&day.description),
    )
}

fn bullet_list(items: &[String], text_color: &str) -> String {
    let mut out = String::from(r#"<ul class="space-y-3">"#);
    for item in items {
        out.push_str(&format!(
            r#"<li class="text-xs {text_color} leading-relaxed">{}</li>"#,
            escape_html(item)
        ));
    }
    out.push_str("</ul>");
    out
}

fn details_section(pkg: &NormalizedPackage, branding: &Branding) -> String {
    format!(
        r#"<div class="mt-8 pt-6 px-12">
  {heading}
  <div class="grid grid-cols-2 gap-12 mb-8">
    <div>
      <h4 class="font-bold text-slate-800 text-xs uppercase mb-4">Inclusions</h4>
      {inclusions}
    </div>
    <div>
      <h4 class="font-bold text-slate-800 text-xs uppercase mb-4">Exclusions</h4>
      {exclusions}
    </div>
  </div>
  <div class="text-center pt-6 border-t border-slate-100">
    <p class="text-[10px] text-slate-400 italic">{disclaimer}</p>
  </div>
</div>"#,
        heading = section_heading("Trip Details", "mb-6"),
        inclusions = bullet_list(&pkg.inclusions, "text-slate-600"),
        exclusions = bullet_list(&pkg.exclusions, "text-slate-500"),
        disclaimer = escape_html(&branding.disclaimer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_by_id, image_sources, parse_html};
    use crate::package::{normalize, AssetResolver};
    use crate::pagination::{plan_pages, PageCapacity};
    use serde_json::json;

    fn package(days: usize) -> NormalizedPackage {
        let itinerary: Vec<_> = (1..=days)
            .map(|i| json!({"title": format!("Stop {i}"), "description": "Walk & explore", "image": format!("img-{i}")}))
            .collect();
        normalize(
            &json!({
                "title": "Alps <Explorer>",
                "itinerary_json": itinerary,
                "inclusions": ["Hotel"],
                "exclusions": ["Flights"],
            }),
            &AssetResolver::new("https://cms.example.com"),
        )
    }

    #[test]
    fn every_page_has_root_and_footer_total() {
        let pkg = package(7);
        let plan = plan_pages(pkg.itinerary.len(), PageCapacity::default()).unwrap();
        for page in &plan.pages {
            let html = render_page_html(&pkg, page, plan.total_pages(), &Branding::default(), 2026);
            let dom = parse_html(&html);
            assert!(find_by_id(&dom, PAGE_ROOT_ID).is_some());
            let label = format!("MyPerfectTrips. {} / 3", page.page_number());
            assert!(html.contains(&label), "page {} missing {label}", page.page_index);
        }
    }

    #[test]
    fn day_badges_use_global_numbers() {
        let pkg = package(10);
        let plan = plan_pages(pkg.itinerary.len(), PageCapacity::default()).unwrap();
        let html = render_page_html(&pkg, &plan.pages[1], plan.total_pages(), &Branding::default(), 2026);
        assert!(html.contains(r#"font-bold">4</p>"#));
        assert!(html.contains(r#"font-bold">7</p>"#));
        assert!(!html.contains(r#"font-bold">8</p>"#));
        assert!(html.contains("Page 2"));
    }

    #[test]
    fn text_is_escaped() {
        let pkg = package(1);
        let plan = plan_pages(1, PageCapacity::default()).unwrap();
        let html = render_page_html(&pkg, &plan.pages[0], 1, &Branding::default(), 2026);
        assert!(html.contains("Alps &lt;Explorer&gt;"));
        assert!(html.contains("Walk &amp; explore"));
    }

    #[test]
    fn cover_carries_hero_and_day_images() {
        let pkg = package(2);
        let plan = plan_pages(2, PageCapacity::default()).unwrap();
        let html = render_page_html(&pkg, &plan.pages[0], 1, &Branding::default(), 2026);
        let srcs = image_sources(&parse_html(&html));
        assert_eq!(srcs.len(), 3);
        assert!(srcs[0].contains("unsplash"));
        assert_eq!(srcs[1], "https://cms.example.com/assets/img-1");
        assert!(html.contains("Trip Details"));
        assert!(html.contains("Hotel"));
    }

    #[test]
    fn empty_itinerary_shows_placeholder() {
        let pkg = package(0);
        let plan = plan_pages(0, PageCapacity::default()).unwrap();
        let html = render_page_html(&pkg, &plan.pages[0], 1, &Branding::default(), 2026);
        assert!(html.contains(COMING_SOON_TEXT));
        assert!(html.contains("Trip Details"));
    }

    #[test]
    fn details_only_page_has_no_days() {
        let pkg = package(7);
        let plan = plan_pages(7, PageCapacity::default()).unwrap();
        let html = render_page_html(&pkg, &plan.pages[2], 3, &Branding::default(), 2026);
        assert!(!html.contains("Stop "));
        assert!(!html.contains(COMING_SOON_TEXT));
        assert!(html.contains("Trip Details"));
        assert!(html.contains("3 / 3"));
    }
}
