use crate::canvas::{FontFamily, FontWeight, TextStyle};
use crate::error::{CertError, Result};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use ttf_parser::GlyphId;

/// Environment variable listing extra font directories (platform path list).
pub const FONT_DIR_ENV: &str = "CERTPRESS_FONT_DIR";

const MAX_SYSTEM_INDEX_DEPTH: usize = 5;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    family: FontFamily,
    weight: FontWeight,
    size_milli: i64,
    spacing_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, f32>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<f32> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: f32) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// One parsed face. Collections (`.ttc`) are narrowed to a single member,
/// preferring the Simplified Chinese one.
#[derive(Debug)]
pub struct FontFace {
    pub name: String,
    data: Arc<Vec<u8>>,
    index: u32,
    pub units_per_em: u16,
    pub bold: bool,
}

impl FontFace {
    pub fn from_bytes(data: Arc<Vec<u8>>, source: &str) -> Option<FontFace> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1).max(1);
        let mut chosen: Option<(u32, String)> = None;
        for index in 0..count {
            let Ok(face) = ttf_parser::Face::parse(&data, index) else {
                continue;
            };
            let (name, family) = font_names(&face, Path::new(source));
            let simplified = family.contains(" SC") || name.contains("SC-") || name.ends_with("SC");
            if chosen.is_none() || simplified {
                chosen = Some((index, name));
            }
            if simplified {
                break;
            }
        }
        let (index, name) = chosen?;
        let face = ttf_parser::Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        let bold = face.is_bold() || face.weight().to_number() >= 600;
        drop(face);
        Some(FontFace {
            name,
            data,
            index,
            units_per_em,
            bold,
        })
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, self.index).ok()
    }

    pub fn has_glyph(&self, ch: char) -> bool {
        self.face()
            .and_then(|face| face.glyph_index(ch))
            .is_some_and(|gid| gid.0 != 0)
    }
}

/// Faces tried in order for each character of a run.
#[derive(Debug, Clone, Default)]
pub struct FontStack {
    faces: Vec<Arc<FontFace>>,
}

impl FontStack {
    pub fn faces(&self) -> &[Arc<FontFace>] {
        &self.faces
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    fn face_index_for(&self, ch: char) -> Option<usize> {
        self.faces.iter().position(|face| face.has_glyph(ch))
    }
}

#[derive(Debug, Clone)]
pub struct ShapedGlyph {
    pub face: Arc<FontFace>,
    pub glyph_id: u16,
    /// Pen position plus shaping offset, relative to the run origin.
    pub x: f32,
    /// Shaping offset above the baseline.
    pub rise: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ShapedRun {
    pub glyphs: Vec<ShapedGlyph>,
    pub width: f32,
    /// Characters no face in the stack could render.
    pub missing: Vec<char>,
}

/// Registered font files plus lazily discovered system fonts, per family.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<Arc<FontFace>>,
    lookup: HashMap<String, usize>,
    bindings: HashMap<FontFamily, Vec<usize>>,
    use_system_fonts: bool,
    stacks: Mutex<HashMap<(FontFamily, bool), FontStack>>,
    width_cache: Mutex<TextWidthCache>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        let mut registry = Self::without_system_fonts();
        registry.use_system_fonts = true;
        registry
    }

    /// Only explicitly registered fonts are used; text with no registered face
    /// is laid out with estimated advances and not painted.
    pub fn without_system_fonts() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            bindings: HashMap::new(),
            use_system_fonts: false,
            stacks: Mutex::new(HashMap::new()),
            width_cache: Mutex::new(TextWidthCache::new(4_096)),
        }
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let Ok(entries) = fs::read_dir(path.as_ref()) else {
            return 0;
        };
        let mut added = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_font_file(&path) && self.register_file(&path).is_ok() {
                added += 1;
            }
        }
        added
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| CertError::Asset(format!("font {}: {e}", path.display())))?;
        self.register_bytes(data, path.to_str())
    }

    pub fn register_bytes(&mut self, data: Vec<u8>, source_name: Option<&str>) -> Result<String> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let face = FontFace::from_bytes(Arc::new(data), source)
            .ok_or_else(|| CertError::Asset(format!("invalid font data for {source}")))?;
        let name = face.name.clone();
        let index = self.fonts.len();
        self.fonts.push(Arc::new(face));
        let stem = Path::new(source)
            .file_stem()
            .and_then(|v| v.to_str())
            .map(str::to_string);
        for alias in std::iter::once(name.clone()).chain(stem) {
            let key = normalize_name(&alias);
            if !key.is_empty() {
                self.lookup.entry(key).or_insert(index);
            }
        }
        self.invalidate();
        Ok(name)
    }

    /// Makes a registered font the first choice for `family`.
    pub fn bind(&mut self, family: FontFamily, name: &str) -> Result<()> {
        let index = self
            .lookup
            .get(&normalize_name(name))
            .copied()
            .ok_or_else(|| CertError::InvalidConfiguration(format!("font not registered: {name}")))?;
        let bound = self.bindings.entry(family).or_default();
        if !bound.contains(&index) {
            bound.push(index);
        }
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        if let Ok(mut stacks) = self.stacks.lock() {
            stacks.clear();
        }
        if let Ok(mut cache) = self.width_cache.lock() {
            let max_entries = cache.max_entries;
            *cache = TextWidthCache::new(max_entries);
        }
    }

    pub fn stack(&self, family: FontFamily, weight: FontWeight) -> FontStack {
        let bold = weight != FontWeight::Regular;
        if let Ok(stacks) = self.stacks.lock() {
            if let Some(stack) = stacks.get(&(family, bold)) {
                return stack.clone();
            }
        }
        let stack = self.build_stack(family, bold);
        if stack.is_empty() {
            log::warn!("no font available for {}; text will not be painted", family.as_str());
        }
        if let Ok(mut stacks) = self.stacks.lock() {
            stacks.insert((family, bold), stack.clone());
        }
        stack
    }

    fn build_stack(&self, family: FontFamily, bold: bool) -> FontStack {
        let mut faces: Vec<Arc<FontFace>> = Vec::new();
        let push = |face: Arc<FontFace>, faces: &mut Vec<Arc<FontFace>>| {
            if !faces.iter().any(|f| Arc::ptr_eq(f, &face)) {
                faces.push(face);
            }
        };
        if let Some(bound) = self.bindings.get(&family) {
            for index in bound {
                if let Some(face) = self.fonts.get(*index) {
                    push(face.clone(), &mut faces);
                }
            }
        }
        if self.use_system_fonts {
            for group in system_font_groups(family, bold) {
                if let Some(face) = load_first_system_font(group) {
                    push(face, &mut faces);
                }
            }
        }
        for face in &self.fonts {
            push(face.clone(), &mut faces);
        }
        FontStack { faces }
    }

    /// Shapes `text` with per-character fallback through the family's stack.
    pub fn shape(&self, style: &TextStyle, text: &str) -> ShapedRun {
        let stack = self.stack(style.family, style.weight);
        shape_with_stack(
            &stack,
            text,
            style.size.to_f32().max(0.0),
            style.letter_spacing.to_f32(),
        )
    }

    pub fn measure(&self, style: &TextStyle, text: &str) -> f32 {
        let key = TextWidthKey {
            family: style.family,
            weight: style.weight,
            size_milli: style.size.to_milli_i64(),
            spacing_milli: style.letter_spacing.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.width_cache.lock() {
            if let Some(width) = cache.get(&key) {
                return width;
            }
        }
        let width = self.shape(style, text).width;
        if let Ok(mut cache) = self.width_cache.lock() {
            cache.insert(key, width);
        }
        width
    }
}

/// Full-width characters (CJK ideographs, kana, hangul, fullwidth forms).
pub fn is_wide(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1100..=0x115F
            | 0x2E80..=0x303E
            | 0x3041..=0x33FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xA000..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x201C..=0x201D
    )
}

/// Advance used when no face can render `ch`.
pub fn fallback_advance(ch: char, font_size: f32) -> f32 {
    if is_wide(ch) {
        font_size
    } else {
        font_size * 0.55
    }
}

fn shape_with_stack(stack: &FontStack, text: &str, font_size: f32, spacing: f32) -> ShapedRun {
    let mut run = ShapedRun::default();
    if text.is_empty() || font_size <= 0.0 {
        return run;
    }
    let mut pen = 0.0f32;
    for (face_index, segment) in split_by_face(stack, text) {
        match face_index.and_then(|i| stack.faces.get(i)) {
            Some(face) => {
                pen = shape_segment(face, &segment, font_size, spacing, pen, &mut run.glyphs);
            }
            None => {
                for ch in segment.chars() {
                    if !ch.is_whitespace() && !run.missing.contains(&ch) {
                        run.missing.push(ch);
                    }
                    pen += fallback_advance(ch, font_size) + spacing;
                }
            }
        }
    }
    run.width = pen.max(0.0);
    run
}

fn split_by_face(stack: &FontStack, text: &str) -> Vec<(Option<usize>, String)> {
    let mut segments: Vec<(Option<usize>, String)> = Vec::new();
    let mut support: HashMap<char, Option<usize>> = HashMap::new();
    let mut current: Option<usize> = None;
    for ch in text.chars() {
        // Whitespace sticks to the surrounding run so shaping sees whole words.
        let chosen = match current {
            Some(i)
                if ch.is_whitespace()
                    && stack.faces.get(i).is_some_and(|face| face.has_glyph(ch)) =>
            {
                Some(i)
            }
            _ => *support
                .entry(ch)
                .or_insert_with(|| stack.face_index_for(ch)),
        };
        match segments.last_mut() {
            Some((face, buf)) if *face == chosen => buf.push(ch),
            _ => segments.push((chosen, ch.to_string())),
        }
        current = chosen;
    }
    segments
}

fn shape_segment(
    face: &Arc<FontFace>,
    text: &str,
    font_size: f32,
    spacing: f32,
    mut pen: f32,
    out: &mut Vec<ShapedGlyph>,
) -> f32 {
    let scale = font_size / face.units_per_em as f32;
    let Some(hb) = HbFace::from_slice(face.data(), face.index()) else {
        return shape_segment_unshaped(face, text, font_size, spacing, pen, out);
    };
    let hb_units = hb.units_per_em().max(1) as f32;
    let hb_scale = font_size / hb_units;
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    let output = rustybuzz::shape(&hb, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return shape_segment_unshaped(face, text, font_size, spacing, pen, out);
    }
    for (i, (info, pos)) in infos.iter().zip(positions.iter()).enumerate() {
        let gid = info.glyph_id as u16;
        if gid != 0 {
            out.push(ShapedGlyph {
                face: face.clone(),
                glyph_id: gid,
                x: pen + pos.x_offset as f32 * hb_scale,
                rise: pos.y_offset as f32 * hb_scale,
                scale,
            });
        }
        pen += pos.x_advance as f32 * hb_scale;
        let cluster_ends = infos.get(i + 1).is_none_or(|next| next.cluster != info.cluster);
        if cluster_ends {
            pen += spacing;
        }
    }
    pen
}

fn shape_segment_unshaped(
    face: &Arc<FontFace>,
    text: &str,
    font_size: f32,
    spacing: f32,
    mut pen: f32,
    out: &mut Vec<ShapedGlyph>,
) -> f32 {
    let Some(parsed) = face.face() else {
        for ch in text.chars() {
            pen += fallback_advance(ch, font_size) + spacing;
        }
        return pen;
    };
    let scale = font_size / face.units_per_em as f32;
    for ch in text.chars() {
        let gid = parsed.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        let mut advance = parsed.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32 * scale;
        if advance <= 0.0 {
            advance = fallback_advance(ch, font_size);
        }
        if gid != 0 {
            out.push(ShapedGlyph {
                face: face.clone(),
                glyph_id: gid,
                x: pen,
                rise: 0.0,
                scale,
            });
        }
        pen += advance + spacing;
    }
    pen
}

/// Candidate file names per family, grouped; each group contributes at most
/// one face to a stack. Later groups are fallbacks for missing characters.
fn system_font_groups(family: FontFamily, bold: bool) -> Vec<&'static [&'static str]> {
    const SERIF_BOLD: &[&str] = &[
        "NotoSerifCJKsc-Bold.otf",
        "NotoSerifCJK-Bold.ttc",
        "NotoSerifSC-Bold.otf",
        "NotoSerifSC-Bold.ttf",
        "SourceHanSerifSC-Bold.otf",
        "SourceHanSerif-Bold.ttc",
    ];
    const SERIF: &[&str] = &[
        "NotoSerifCJKsc-Regular.otf",
        "NotoSerifCJK-Regular.ttc",
        "NotoSerifSC-Regular.otf",
        "NotoSerifSC-Regular.ttf",
        "SourceHanSerifSC-Regular.otf",
        "SourceHanSerif-Regular.ttc",
        "simsun.ttc",
        "STSong.ttf",
        "Songti.ttc",
        "uming.ttc",
    ];
    const CURSIVE: &[&str] = &[
        "MaShanZheng-Regular.ttf",
        "ZhiMangXing-Regular.ttf",
        "LiuJianMaoCao-Regular.ttf",
        "STXingkai.ttf",
        "simkai.ttf",
        "STKaiti.ttf",
        "Kaiti.ttc",
        "ukai.ttc",
    ];
    const SANS_BOLD: &[&str] = &[
        "NotoSansCJKsc-Bold.otf",
        "NotoSansCJK-Bold.ttc",
        "NotoSansSC-Bold.otf",
        "msyhbd.ttc",
        "DejaVuSans-Bold.ttf",
        "LiberationSans-Bold.ttf",
        "arialbd.ttf",
    ];
    const SANS: &[&str] = &[
        "NotoSansCJKsc-Regular.otf",
        "NotoSansCJK-Regular.ttc",
        "NotoSansSC-Regular.otf",
        "msyh.ttc",
        "PingFang.ttc",
        "wqy-microhei.ttc",
        "wqy-zenhei.ttc",
        "DejaVuSans.ttf",
        "LiberationSans-Regular.ttf",
        "arial.ttf",
    ];

    let mut groups: Vec<&'static [&'static str]> = Vec::new();
    match family {
        FontFamily::SerifSc => {
            if bold {
                groups.push(SERIF_BOLD);
            }
            groups.push(SERIF);
            groups.push(SANS);
        }
        FontFamily::Cursive => {
            groups.push(CURSIVE);
            if bold {
                groups.push(SERIF_BOLD);
            }
            groups.push(SERIF);
            groups.push(SANS);
        }
        FontFamily::Sans => {
            if bold {
                groups.push(SANS_BOLD);
            }
            groups.push(SANS);
            groups.push(SERIF);
        }
    }
    groups
}

static SYSTEM_FONT_INDEX: OnceLock<HashMap<String, PathBuf>> = OnceLock::new();
static SYSTEM_FONT_CACHE: OnceLock<Mutex<HashMap<PathBuf, Option<Arc<FontFace>>>>> = OnceLock::new();

fn load_first_system_font(candidates: &[&str]) -> Option<Arc<FontFace>> {
    let index = SYSTEM_FONT_INDEX.get_or_init(build_system_font_index);
    let cache = SYSTEM_FONT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    for name in candidates {
        let Some(path) = index.get(&name.to_ascii_lowercase()) else {
            continue;
        };
        if let Ok(guard) = cache.lock() {
            if let Some(entry) = guard.get(path) {
                match entry {
                    Some(face) => return Some(face.clone()),
                    None => continue,
                }
            }
        }
        let loaded = fs::read(path)
            .ok()
            .and_then(|bytes| FontFace::from_bytes(Arc::new(bytes), &path.to_string_lossy()))
            .map(Arc::new);
        if loaded.is_some() {
            log::debug!("loaded system font {}", path.display());
        }
        if let Ok(mut guard) = cache.lock() {
            guard.insert(path.clone(), loaded.clone());
        }
        if loaded.is_some() {
            return loaded;
        }
    }
    None
}

fn build_system_font_index() -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    for dir in system_font_dirs() {
        index_font_dir(&dir, 0, &mut index);
    }
    log::debug!("indexed {} system font files", index.len());
    index
}

fn index_font_dir(dir: &Path, depth: usize, index: &mut HashMap<String, PathBuf>) {
    if depth > MAX_SYSTEM_INDEX_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            index_font_dir(&path, depth + 1, index);
        } else if is_font_file(&path) {
            if let Some(name) = path.file_name().and_then(|v| v.to_str()) {
                index.entry(name.to_ascii_lowercase()).or_insert(path.clone());
            }
        }
    }
}

pub(crate) fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    // Extra directories come first so they win over same-named system files.
    if let Ok(extra) = std::env::var(FONT_DIR_ENV) {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".fonts"));
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    dirs
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|v| v.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc" | "otc"))
        .unwrap_or(false)
}

/// Returns (primary name, family name).
fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, String) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .or(full)
        .or_else(|| family.clone())
        .or(stem)
        .unwrap_or_else(|| "EmbeddedFont".to_string());
    (primary, family.unwrap_or_default())
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) fn latin_test_font() -> Option<Vec<u8>> {
    const CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        r"C:\Windows\Fonts\arial.ttf",
    ];
    CANDIDATES
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .and_then(|path| fs::read(path).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    #[test]
    fn empty_registry_lays_out_with_estimated_advances() {
        let registry = FontRegistry::without_system_fonts();
        let style = TextStyle::new(FontFamily::SerifSc, 20.0, Color::BLACK);
        let run = registry.shape(&style, "张三ab");
        assert!(run.glyphs.is_empty());
        assert!((run.width - (20.0 + 20.0 + 11.0 + 11.0)).abs() < 1e-4);
        assert_eq!(run.missing, vec!['张', '三', 'a', 'b']);
        assert!((registry.measure(&style, "张三ab") - run.width).abs() < 1e-6);
    }

    #[test]
    fn letter_spacing_applies_per_character() {
        let registry = FontRegistry::without_system_fonts();
        let style = TextStyle::new(FontFamily::Sans, 10.0, Color::BLACK).tracking(2.0);
        let plain = TextStyle::new(FontFamily::Sans, 10.0, Color::BLACK);
        let diff = registry.measure(&style, "武术") - registry.measure(&plain, "武术");
        assert!((diff - 4.0).abs() < 1e-4);
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut registry = FontRegistry::without_system_fonts();
        let err = registry.register_bytes(vec![0, 1, 2, 3], Some("junk.ttf")).unwrap_err();
        assert!(matches!(err, CertError::Asset(_)));
        assert!(registry.is_empty());
        let err = registry.bind(FontFamily::Cursive, "junk").unwrap_err();
        assert!(matches!(err, CertError::InvalidConfiguration(_)));
    }

    #[test]
    fn missing_font_file_is_an_asset_error() {
        let mut registry = FontRegistry::without_system_fonts();
        let err = registry
            .register_file("/definitely/not/here/font.ttf")
            .unwrap_err();
        assert!(matches!(err, CertError::Asset(_)));
    }

    #[test]
    fn wide_characters_are_detected() {
        assert!(is_wide('武'));
        assert!(is_wide('“'));
        assert!(is_wide('：'));
        assert!(!is_wide('A'));
        assert!(!is_wide(' '));
    }

    #[test]
    fn system_groups_fall_back_across_families() {
        let groups = system_font_groups(FontFamily::Cursive, true);
        assert_eq!(groups.len(), 4);
        assert!(groups[0].contains(&"simkai.ttf"));
        let groups = system_font_groups(FontFamily::SerifSc, false);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn registered_font_shapes_latin_text() {
        let Some(bytes) = latin_test_font() else {
            eprintln!("no latin system font found; skipping");
            return;
        };
        let mut registry = FontRegistry::without_system_fonts();
        registry.register_bytes(bytes, Some("latin.ttf")).unwrap();
        let style = TextStyle::new(FontFamily::SerifSc, 20.0, Color::BLACK);
        let run = registry.shape(&style, "Ada 武");
        assert_eq!(run.missing, vec!['武']);
        assert_eq!(run.glyphs.len(), 4);
        assert!(run.glyphs.windows(2).all(|pair| pair[0].x < pair[1].x));
        assert!(run.glyphs.iter().all(|glyph| glyph.glyph_id != 0));
        let latin = registry.measure(&style, "Ada");
        assert!(latin > 20.0 && latin < 60.0, "{latin}");
    }
}
