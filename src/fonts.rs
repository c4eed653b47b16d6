//! Font loading, text measurement and glyph access using `ttf-parser`.
//!
//! Real faces come from an explicit font file or from the system font
//! database (`fontdb`). When neither is available the manager falls back to
//! Helvetica-like synthetic metrics: layout still works, but the rasterizer
//! has no outlines to paint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes; empty for synthetic metrics.
    pub bytes: Arc<Vec<u8>>,
    /// Face index inside a collection.
    pub index: u32,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn synthetic() -> Self {
        Self {
            bytes: Arc::new(Vec::new()),
            index: 0,
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
        }
    }

    fn parse(bytes: Vec<u8>, index: u32) -> Result<Self, String> {
        let face = ttf_parser::Face::parse(&bytes, index)
            .map_err(|e| format!("Failed to parse font: {e}"))?;
        Ok(Self {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes: Arc::new(bytes),
            index,
        })
    }

    pub fn is_synthetic(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the face for glyph lookups.
    pub fn face(&self) -> Option<ttf_parser::Face<'_>> {
        if self.is_synthetic() {
            return None;
        }
        ttf_parser::Face::parse(&self.bytes, self.index).ok()
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub bold: bool,
    pub italic: bool,
}

/// Regular / bold / italic faces of the one sans-serif family used by the
/// templates.
#[derive(Clone)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
}

const REGULAR: FontKey = FontKey {
    bold: false,
    italic: false,
};

impl FontManager {
    /// A manager with synthetic metrics only.
    pub fn synthetic() -> Self {
        let mut fonts = HashMap::new();
        fonts.insert(REGULAR, FontData::synthetic());
        fonts.insert(
            FontKey {
                bold: true,
                italic: false,
            },
            FontData::synthetic(),
        );
        Self { fonts }
    }

    /// Use one font file for every style.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let bytes = std::fs::read(path)
            .map_err(|e| format!("Failed to read font '{}': {e}", path.display()))?;
        let data = FontData::parse(bytes, 0)?;
        let mut mgr = Self::synthetic();
        for bold in [false, true] {
            for italic in [false, true] {
                mgr.fonts.insert(FontKey { bold, italic }, data.clone());
            }
        }
        Ok(mgr)
    }

    /// Query the system font database for sans-serif faces. Styles that
    /// cannot be found keep synthetic metrics.
    pub fn from_system() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        let mut mgr = Self::synthetic();
        for bold in [false, true] {
            for italic in [false, true] {
                let query = fontdb::Query {
                    families: &[
                        fontdb::Family::Name("Helvetica"),
                        fontdb::Family::Name("Arial"),
                        fontdb::Family::SansSerif,
                    ],
                    weight: if bold {
                        fontdb::Weight::BOLD
                    } else {
                        fontdb::Weight::NORMAL
                    },
                    stretch: fontdb::Stretch::Normal,
                    style: if italic {
                        fontdb::Style::Italic
                    } else {
                        fontdb::Style::Normal
                    },
                };
                let Some(id) = db.query(&query) else {
                    continue;
                };
                let loaded = db
                    .with_face_data(id, |data, index| FontData::parse(data.to_vec(), index))
                    .and_then(Result::ok);
                if let Some(data) = loaded {
                    mgr.fonts.insert(FontKey { bold, italic }, data);
                }
            }
        }
        if !mgr.has_real_fonts() {
            log::warn!("No system sans-serif font found; text will not be rasterized");
        }
        mgr
    }

    /// Get font data for a style, falling back to bold/regular.
    pub fn get(&self, bold: bool, italic: bool) -> &FontData {
        let wanted = FontKey { bold, italic };
        let upright = FontKey {
            bold,
            italic: false,
        };
        self.fonts
            .get(&wanted)
            .or_else(|| self.fonts.get(&upright))
            .or_else(|| self.fonts.get(&REGULAR))
            .unwrap_or_else(|| synthetic_fallback())
    }

    /// Measure the width of a string at a given font size (in px).
    /// Synthetic faces use an average character width of 0.5 × font_size.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool, italic: bool) -> f32 {
        let data = self.get(bold, italic);
        let Some(face) = data.face() else {
            let avg = if bold { 0.55 } else { 0.5 };
            return text.chars().count() as f32 * font_size * avg;
        };
        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| match face.glyph_index(ch) {
                Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                None => font_size * 0.5,
            })
            .sum()
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Ascender in px for the given style.
    pub fn ascender_px(&self, font_size: f32, bold: bool, italic: bool) -> f32 {
        let data = self.get(bold, italic);
        data.ascender * font_size / data.units_per_em
    }

    /// Check if real font bytes are loaded for the regular face.
    pub fn has_real_fonts(&self) -> bool {
        self.fonts
            .get(&REGULAR)
            .map(|d| !d.is_synthetic())
            .unwrap_or(false)
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::synthetic()
    }
}

fn synthetic_fallback() -> &'static FontData {
    static FALLBACK: std::sync::OnceLock<FontData> = std::sync::OnceLock::new();
    FALLBACK.get_or_init(FontData::synthetic)
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    italic: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{current_line} {word}")
            };
            let w = fonts.measure_text_width(&candidate, font_size, bold, italic);
            if w > max_width && !current_line.is_empty() {
                lines.push(std::mem::replace(&mut current_line, word.to_string()));
            } else {
                current_line = candidate;
            }
        }
        lines.push(current_line);
    }
    lines
}

/// Cut wrapped lines down to `max_lines`, ending the last kept line with an
/// ellipsis that still fits `max_width`.
#[allow(clippy::too_many_arguments)]
pub fn clamp_lines(
    mut lines: Vec<String>,
    max_lines: usize,
    font_size: f32,
    bold: bool,
    italic: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_lines == 0 || lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        let mut words: Vec<&str> = last.split_whitespace().collect();
        loop {
            let candidate = format!("{}\u{2026}", words.join(" "));
            let fits = fonts.measure_text_width(&candidate, font_size, bold, italic) <= max_width;
            if fits || words.len() <= 1 {
                *last = candidate;
                break;
            }
            words.pop();
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::synthetic();
        let w = mgr.measure_text_width("Hello", 16.0, false, false);
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        assert!(!mgr.has_real_fonts());
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::synthetic();
        let lines = wrap_text("Hello world foo bar", 16.0, false, false, 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn clamp_adds_ellipsis() {
        let mgr = FontManager::synthetic();
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let lines = wrap_text(text, 10.0, false, false, 60.0, &mgr);
        assert!(lines.len() > 2);
        let clamped = clamp_lines(lines, 2, 10.0, false, false, 60.0, &mgr);
        assert_eq!(clamped.len(), 2);
        assert!(clamped[1].ends_with('\u{2026}'));
        assert!(mgr.measure_text_width(&clamped[1], 10.0, false, false) <= 60.0);
    }

    #[test]
    fn italic_falls_back_to_upright() {
        let mgr = FontManager::synthetic();
        assert!(mgr.get(true, true).is_synthetic());
    }
}
