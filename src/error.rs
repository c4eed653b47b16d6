//! Error types for itinerary generation.

/// Everything that can abort a generation run.
///
/// Missing package fields and unreachable images are *not* errors: the
/// normalizer substitutes defaults and the load gate marks images broken.
#[derive(Debug, thiserror::Error)]
pub enum ItineraryError {
    /// Invalid configuration (zero page capacity, bad DPI, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// The render host could not be populated with a page.
    #[error("render host mount failed: {0}")]
    Mount(String),

    /// A mounted page could not be turned into a bitmap.
    #[error("rasterization failed on page {page}: {reason}")]
    Raster { page: usize, reason: String },

    /// The output document could not be assembled or saved.
    #[error("document assembly failed: {0}")]
    Assemble(String),

    /// Another generation run currently owns the render host.
    #[error("a document is already being generated")]
    Busy,

    /// The caller cancelled the run between pages.
    #[error("generation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ItineraryError {
    /// The single non-technical message shown to the person who clicked
    /// "download".
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Busy => "Your itinerary is already being prepared. Please wait.",
            Self::Cancelled => "Itinerary download cancelled.",
            _ => "Could not generate the itinerary PDF. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, ItineraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_share_one_user_message() {
        let mount = ItineraryError::Mount("no root".into());
        let raster = ItineraryError::Raster {
            page: 2,
            reason: "bad pixmap".into(),
        };
        assert_eq!(mount.user_message(), raster.user_message());
        assert!(!mount.user_message().contains("root"));
    }

    #[test]
    fn raster_error_names_the_page() {
        let e = ItineraryError::Raster {
            page: 3,
            reason: "x".into(),
        };
        assert!(e.to_string().contains("page 3"));
    }
}
