use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::Face;

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

/// Advance width of `text` at `font_size`, using the first available face
/// from the comma-separated `font_family` list. None when no face resolves;
/// callers fall back to a heuristic width.
pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut guard = TEXT_MEASURER.lock().ok()?;
    guard.measure(text, font_size, font_family)
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    faces: HashMap<String, Option<LoadedFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            faces: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = family_key(font_family);
        if !self.faces.contains_key(&key) {
            let face = self.load_face(font_family);
            self.faces.insert(key.clone(), face);
        }
        let face = self.faces.get_mut(&key)?.as_mut()?;
        let normalized = text.replace('\t', "    ");
        Some(face.measure(&normalized, font_size))
    }

    fn load_face(&mut self, font_family: &str) -> Option<LoadedFace> {
        let mut names: Vec<String> = Vec::new();
        let mut generics: Vec<(usize, Family<'static>)> = Vec::new();
        for (position, part) in font_family.split(',').enumerate() {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => generics.push((position, Family::Serif)),
                "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => {
                    generics.push((position, Family::SansSerif))
                }
                "monospace" | "ui-monospace" => generics.push((position, Family::Monospace)),
                "cursive" => generics.push((position, Family::Cursive)),
                "fantasy" => generics.push((position, Family::Fantasy)),
                _ => names.push(raw.to_string()),
            }
        }

        let mut families: Vec<Family<'_>> = names.iter().map(|n| Family::Name(n)).collect();
        for (_, generic) in &generics {
            families.push(*generic);
        }
        if families.is_empty() {
            families.push(Family::SansSerif);
        }

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        let mut loaded: Option<LoadedFace> = None;
        self.db.with_face_data(id, |data, index| {
            if let Ok(face) = Face::parse(data, index) {
                loaded = Some(LoadedFace {
                    data: data.to_vec(),
                    index,
                    units_per_em: face.units_per_em().max(1),
                    advances: HashMap::new(),
                });
            }
        });
        loaded
    }
}

struct LoadedFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    advances: HashMap<char, Option<u16>>,
}

impl LoadedFace {
    fn measure(&mut self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * 0.56;
        let face = Face::parse(&self.data, self.index).ok();

        let mut width = 0.0f32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = match self.advances.get(&ch) {
                Some(cached) => *cached,
                None => {
                    let value = face.as_ref().and_then(|face| {
                        face.glyph_index(ch)
                            .and_then(|id| face.glyph_hor_advance(id))
                    });
                    self.advances.insert(ch, value);
                    value
                }
            };
            match advance {
                Some(units) => width += units as f32 * scale,
                None => width += fallback,
            }
        }
        width.max(0.0)
    }
}

fn family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}
