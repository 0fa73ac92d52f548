use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};
use ttf_parser::{Face, name_id};
use usvg::fontdb;

const FALLBACK_FAMILIES: &[&str] = &["Noto Sans", "DejaVu Sans", "Arial", "sans-serif"];

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub metrics: FontMetrics,
    pub family: String,
}

/// A configured font file wins over every family.
pub struct FontBook {
    families: HashMap<String, String>,
    override_path: Option<PathBuf>,
    database: OnceLock<Arc<fontdb::Database>>,
    resolved: Mutex<HashMap<String, Option<ResolvedFont>>>,
}

impl FontBook {
    pub fn new(families: HashMap<String, String>, override_path: Option<PathBuf>) -> Self {
        Self {
            families,
            override_path,
            database: OnceLock::new(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn family_for(&self, font_code: &str) -> Option<&str> {
        let code = font_code.trim().to_ascii_lowercase();
        if let Some(family) = self.families.get(&code) {
            return Some(family.as_str());
        }
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        self.families.get(primary).map(String::as_str)
    }

    pub fn database(&self) -> Arc<fontdb::Database> {
        self.database
            .get_or_init(|| {
                let mut db = fontdb::Database::new();
                db.load_system_fonts();
                if let Some(path) = &self.override_path
                    && let Err(err) = db.load_font_file(path)
                {
                    warn!("font: failed to load {}: {}", path.display(), err);
                }
                Arc::new(db)
            })
            .clone()
    }

    /// `None` means width estimates and the renderer's default family.
    pub fn resolve(&self, font_code: &str) -> Option<ResolvedFont> {
        let key = font_code.trim().to_ascii_lowercase();
        let mut cache = self
            .resolved
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if let Some(found) = cache.get(&key) {
            return found.clone();
        }
        let resolved = match self.lookup(&key) {
            Ok(font) => {
                debug!("font: {} -> {}", key, font.family);
                Some(font)
            }
            Err(err) => {
                warn!("font: no usable font for '{}': {:#}", key, err);
                None
            }
        };
        cache.insert(key, resolved.clone());
        resolved
    }

    fn lookup(&self, key: &str) -> Result<ResolvedFont> {
        if let Some(path) = &self.override_path {
            let metrics = load_font_metrics(path)?;
            let family = metrics
                .family()
                .map(|name| name.to_string())
                .unwrap_or_else(|| "sans-serif".to_string());
            return Ok(ResolvedFont { metrics, family });
        }
        let db = self.database();
        if let Some(family) = self.family_for(key)
            && let Ok(resolved) = load_font_from_family(&db, family)
        {
            return Ok(resolved);
        }
        for candidate in FALLBACK_FAMILIES {
            if let Ok(resolved) = load_font_from_family(&db, candidate) {
                return Ok(resolved);
            }
        }
        Err(anyhow!("no fallback fonts found"))
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

pub fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font
        && let Ok(face) = Face::parse(&font.data, font.face_index)
    {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(font.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        let units = font.units_per_em.max(1) as f32;
        return advance as f32 * (font_size / units);
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units)
        .sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: Arc::new(data.to_vec()),
            units_per_em,
            space_advance,
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family)
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_from_family(db: &fontdb::Database, family: &str) -> Result<ResolvedFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_metrics_from_data(&data, Some(family))?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedFont {
        metrics,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
