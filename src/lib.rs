//! # itinerary-forge – paginated itinerary PDFs for travel packages
//!
//! Turns one travel-package record into a downloadable, multi-page A4 PDF.
//! Every page is produced the same way:
//!
//! 1. **Normalize** – raw package record → [`package::NormalizedPackage`]
//! 2. **Plan** – distribute itinerary days across pages ([`pagination`])
//! 3. **Template** – render one page of HTML ([`templates`])
//! 4. **Mount** – parse it into the off-screen render host ([`host`], [`dom`])
//! 5. **Settle** – route images through the proxy and wait for them ([`gate`])
//! 6. **Layout** – style and lay out with Taffy ([`style`], [`layout`])
//! 7. **Rasterize** – paint the page to a bitmap ([`raster`])
//! 8. **Assemble** – append the bitmap as one PDF page ([`render`])
//!
//! [`pipeline::Generator`] runs the loop; [`proxy`] is the HTTP endpoint that
//! re-serves remote images with cross-origin headers.

pub mod dom;
pub mod error;
pub mod fonts;
pub mod gate;
pub mod host;
pub mod layout;
pub mod layout_config;
pub mod package;
pub mod pagination;
pub mod pipeline;
pub mod proxy;
pub mod raster;
pub mod render;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use error::{ItineraryError, Result};
pub use package::{normalize, NormalizedPackage};
pub use pagination::{plan_pages, PageCapacity, PagePlan};
pub use pipeline::{CancelFlag, GeneratedDocument, Generator, GeneratorConfig};
