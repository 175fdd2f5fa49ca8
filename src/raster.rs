use crate::assets::{AssetPolicy, ImageStore, RemoteFetcher, SkippedAsset, preload};
use crate::canvas::{Command, FontWeight, ImageFit, TextAlign, TextRun, TextStyle, VisualTree};
use crate::error::{CertError, Result};
use crate::font::{FontRegistry, ShapedRun, is_wide};
use crate::types::{Color, Px, Rect, Size};
use crate::viewport::ViewportTransform;
use std::sync::Arc;
use tiny_skia::{
    FillRule, FilterQuality, LineCap, LineJoin, Mask, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Stroke, StrokeDash, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

const MAX_RASTER_DIMENSION: u32 = 16_384;

#[derive(Clone)]
struct RasterState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Px,
    dash_pattern: Vec<Px>,
    dash_phase: Px,
    fill_opacity: f32,
    stroke_opacity: f32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Px::from_f32(1.0),
            dash_pattern: Vec::new(),
            dash_phase: Px::ZERO,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
        }
    }
}

/// A rasterized document plus what had to be left out of it.
#[derive(Debug)]
pub struct Capture {
    pub pixmap: Pixmap,
    /// Characters no available font could paint.
    pub missing_glyphs: Vec<char>,
    pub skipped_assets: Vec<SkippedAsset>,
}

impl Capture {
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing_glyphs.is_empty() || !self.skipped_assets.is_empty()
    }
}

/// The capture stage of an export.
pub trait Rasterizer: Send + Sync {
    fn capture(&self, tree: &VisualTree, oversample: f32, background: Color) -> Result<Capture>;
}

/// Paints display lists with tiny-skia, loading images through an
/// [`AssetPolicy`] first.
pub struct SkiaRasterizer {
    fonts: Arc<FontRegistry>,
    policy: AssetPolicy,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
}

impl SkiaRasterizer {
    pub fn new(fonts: Arc<FontRegistry>, policy: AssetPolicy) -> Self {
        Self {
            fonts,
            policy,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn fonts(&self) -> &Arc<FontRegistry> {
        &self.fonts
    }

    pub fn load_images(&self, tree: &VisualTree) -> (ImageStore, Vec<SkippedAsset>) {
        preload(&tree.image_sources(), &self.policy, self.fetcher.as_deref())
    }
}

impl Rasterizer for SkiaRasterizer {
    fn capture(&self, tree: &VisualTree, oversample: f32, background: Color) -> Result<Capture> {
        let (images, skipped) = self.load_images(tree);
        let mut capture = rasterize(tree, oversample, background, &self.fonts, &images)?;
        capture.skipped_assets = skipped;
        Ok(capture)
    }
}

/// Pixel dimensions of `size` rendered at `oversample` pixels per unit.
pub fn capture_size(size: Size, oversample: f32) -> Result<(u32, u32)> {
    if !oversample.is_finite() || oversample <= 0.0 {
        return Err(CertError::InvalidConfiguration(format!(
            "oversample must be a positive number, got {oversample}"
        )));
    }
    let to_px = |units: Px| -> Result<u32> {
        let px = (units.to_f32() * oversample).round();
        if px < 1.0 || px > MAX_RASTER_DIMENSION as f32 {
            return Err(CertError::Capture(format!(
                "raster dimension {px} out of range at {oversample}x"
            )));
        }
        Ok(px as u32)
    };
    Ok((to_px(size.width)?, to_px(size.height)?))
}

/// Paints the display list at 1:1 layout, scaled by `oversample`.
pub fn rasterize(
    tree: &VisualTree,
    oversample: f32,
    background: Color,
    fonts: &FontRegistry,
    images: &ImageStore,
) -> Result<Capture> {
    let (width, height) = capture_size(tree.size, oversample)?;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| CertError::Capture(format!("cannot allocate {width}x{height} raster")))?;
    let base = Transform::from_scale(oversample, oversample);
    let mut painter = Painter::new(&mut pixmap, base, fonts, images);
    painter.fill_backdrop(tree.size, background);
    painter.run(&tree.commands);
    let missing_glyphs = painter.missing;
    Ok(Capture {
        pixmap,
        missing_glyphs,
        skipped_assets: Vec::new(),
    })
}

/// Paints the document the way the on-screen viewport shows it: inside a
/// `container_width` x `container_height` area through `transform`.
pub fn rasterize_viewport(
    tree: &VisualTree,
    transform: &ViewportTransform,
    container_width: u32,
    container_height: u32,
    backdrop: Color,
    fonts: &FontRegistry,
    images: &ImageStore,
) -> Result<Pixmap> {
    if container_width == 0
        || container_height == 0
        || container_width > MAX_RASTER_DIMENSION
        || container_height > MAX_RASTER_DIMENSION
    {
        return Err(CertError::InvalidConfiguration(format!(
            "container size {container_width}x{container_height} out of range"
        )));
    }
    let mut pixmap = Pixmap::new(container_width, container_height).ok_or_else(|| {
        CertError::Capture(format!(
            "cannot allocate {container_width}x{container_height} preview"
        ))
    })?;
    pixmap.fill(to_sk_color(backdrop, 1.0));
    let scale = transform.scale as f32;
    let base = Transform::from_row(
        scale,
        0.0,
        0.0,
        scale,
        transform.offset_x as f32,
        transform.offset_y as f32,
    );
    let mut painter = Painter::new(&mut pixmap, base, fonts, images);
    painter.fill_backdrop(tree.size, Color::WHITE);
    painter.run(&tree.commands);
    Ok(pixmap)
}

struct Painter<'a> {
    pixmap: &'a mut Pixmap,
    base: Transform,
    fonts: &'a FontRegistry,
    images: &'a ImageStore,
    state: RasterState,
    stack: Vec<RasterState>,
    path: PathBuilder,
    has_path: bool,
    missing: Vec<char>,
}

impl<'a> Painter<'a> {
    fn new(
        pixmap: &'a mut Pixmap,
        base: Transform,
        fonts: &'a FontRegistry,
        images: &'a ImageStore,
    ) -> Self {
        Self {
            pixmap,
            base,
            fonts,
            images,
            state: RasterState::default(),
            stack: Vec::new(),
            path: PathBuilder::new(),
            has_path: false,
            missing: Vec::new(),
        }
    }

    fn fill_backdrop(&mut self, size: Size, color: Color) {
        let Some(rect) =
            tiny_skia::Rect::from_xywh(0.0, 0.0, size.width.to_f32(), size.height.to_f32())
        else {
            return;
        };
        let paint = fill_paint(color, 1.0);
        self.pixmap.fill_rect(rect, &paint, self.base, None);
    }

    fn run(&mut self, commands: &[Command]) {
        for cmd in commands {
            match cmd {
                Command::SaveState => self.stack.push(self.state.clone()),
                Command::RestoreState => {
                    if let Some(restored) = self.stack.pop() {
                        self.state = restored;
                    }
                }
                Command::Meta { .. } => {}
                Command::SetFillColor(color) => self.state.fill_color = *color,
                Command::SetStrokeColor(color) => self.state.stroke_color = *color,
                Command::SetLineWidth(width) => self.state.line_width = width.max(Px::ZERO),
                Command::SetDash { pattern, phase } => {
                    self.state.dash_pattern = pattern.clone();
                    self.state.dash_phase = *phase;
                }
                Command::SetOpacity { fill, stroke } => {
                    self.state.fill_opacity = fill.clamp(0.0, 1.0);
                    self.state.stroke_opacity = stroke.clamp(0.0, 1.0);
                }
                Command::MoveTo { x, y } => {
                    self.path.move_to(x.to_f32(), y.to_f32());
                    self.has_path = true;
                }
                Command::LineTo { x, y } => {
                    self.path.line_to(x.to_f32(), y.to_f32());
                    self.has_path = true;
                }
                Command::CurveTo {
                    x1,
                    y1,
                    x2,
                    y2,
                    x,
                    y,
                } => {
                    self.path.cubic_to(
                        x1.to_f32(),
                        y1.to_f32(),
                        x2.to_f32(),
                        y2.to_f32(),
                        x.to_f32(),
                        y.to_f32(),
                    );
                    self.has_path = true;
                }
                Command::ClosePath => self.path.close(),
                Command::Fill => self.fill_current_path(),
                Command::Stroke => self.stroke_current_path(),
                Command::DrawRect {
                    x,
                    y,
                    width,
                    height,
                } => {
                    if let Some(rect) = tiny_skia::Rect::from_xywh(
                        x.to_f32(),
                        y.to_f32(),
                        width.to_f32(),
                        height.to_f32(),
                    ) {
                        let paint = fill_paint(self.state.fill_color, self.state.fill_opacity);
                        self.pixmap.fill_rect(rect, &paint, self.base, None);
                    }
                }
                Command::DrawImage {
                    x,
                    y,
                    width,
                    height,
                    resource_id,
                    fit,
                } => {
                    let target = Rect {
                        x: *x,
                        y: *y,
                        width: *width,
                        height: *height,
                    };
                    self.draw_image(target, resource_id, *fit);
                }
                Command::DrawText { x, y, align, runs } => {
                    self.draw_text_line(x.to_f32(), y.to_f32(), *align, runs);
                }
                Command::DrawParagraph {
                    rect,
                    runs,
                    line_height,
                    first_line_indent,
                } => {
                    self.draw_paragraph(*rect, runs, line_height.to_f32(), first_line_indent.to_f32());
                }
                Command::FillDotGrid {
                    rect,
                    spacing,
                    radius,
                } => self.fill_dot_grid(*rect, spacing.to_f32(), radius.to_f32()),
            }
        }
    }

    fn take_path(&mut self) -> Option<Path> {
        if !self.has_path {
            return None;
        }
        self.has_path = false;
        std::mem::replace(&mut self.path, PathBuilder::new()).finish()
    }

    fn fill_current_path(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let paint = fill_paint(self.state.fill_color, self.state.fill_opacity);
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, self.base, None);
    }

    fn stroke_current_path(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let paint = fill_paint(self.state.stroke_color, self.state.stroke_opacity);
        let stroke = build_stroke(&self.state);
        self.pixmap.stroke_path(&path, &paint, &stroke, self.base, None);
    }

    fn draw_image(&mut self, target: Rect, resource_id: &str, fit: ImageFit) {
        let images = self.images;
        let Some(image) = images.get(resource_id) else {
            return;
        };
        let (src_w, src_h) = (image.width() as f32, image.height() as f32);
        let (x, y) = (target.x.to_f32(), target.y.to_f32());
        let (w, h) = (target.width.to_f32(), target.height.to_f32());
        if src_w <= 0.0 || src_h <= 0.0 || w <= 0.0 || h <= 0.0 {
            return;
        }
        let image_ts = match fit {
            ImageFit::Fill => Transform::from_row(w / src_w, 0.0, 0.0, h / src_h, x, y),
            ImageFit::Cover => {
                let s = (w / src_w).max(h / src_h);
                let tx = x + (w - src_w * s) / 2.0;
                let ty = y + (h - src_h * s) / 2.0;
                Transform::from_row(s, 0.0, 0.0, s, tx, ty)
            }
        };
        // Cover overflows the box; clip it back.
        let mask = match fit {
            ImageFit::Fill => None,
            ImageFit::Cover => tiny_skia::Rect::from_xywh(x, y, w, h).and_then(|rect| {
                let mut mask = Mask::new(self.pixmap.width(), self.pixmap.height())?;
                mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, true, self.base);
                Some(mask)
            }),
        };
        let mut paint = PixmapPaint::default();
        paint.quality = FilterQuality::Bilinear;
        paint.opacity = self.state.fill_opacity;
        self.pixmap.draw_pixmap(
            0,
            0,
            image.as_ref(),
            &paint,
            self.base.pre_concat(image_ts),
            mask.as_ref(),
        );
    }

    fn draw_text_line(&mut self, x: f32, baseline: f32, align: TextAlign, runs: &[TextRun]) {
        let fonts = self.fonts;
        let shaped: Vec<ShapedRun> = runs.iter().map(|run| fonts.shape(&run.style, &run.text)).collect();
        let total: f32 = shaped.iter().map(|s| s.width).sum();
        let mut pen = match align {
            TextAlign::Left => x,
            TextAlign::Center => x - total / 2.0,
            TextAlign::Right => x - total,
        };
        for (run, shaped) in runs.iter().zip(shaped.iter()) {
            self.draw_shaped(shaped, pen, baseline, &run.style);
            pen += shaped.width;
        }
    }

    fn draw_paragraph(&mut self, rect: Rect, runs: &[TextRun], line_height: f32, indent: f32) {
        let lines = wrap_runs(self.fonts, runs, rect.width.to_f32(), indent);
        let left = rect.x.to_f32();
        let first_baseline = rect.y.to_f32() + line_height * 0.75;
        for (i, line) in lines.iter().enumerate() {
            let baseline = first_baseline + line_height * i as f32;
            let mut pen = if i == 0 { left + indent } else { left };
            for piece in line {
                let style = &runs[piece.run].style;
                let shaped = self.fonts.shape(style, &piece.text);
                self.draw_shaped(&shaped, pen, baseline, style);
                pen += shaped.width;
            }
        }
    }

    fn draw_shaped(&mut self, run: &ShapedRun, x: f32, baseline: f32, style: &TextStyle) {
        for ch in &run.missing {
            if !self.missing.contains(ch) {
                self.missing.push(*ch);
            }
        }
        let paint = fill_paint(style.color, self.state.fill_opacity);
        let size = style.size.to_f32();
        for same_face in run
            .glyphs
            .chunk_by(|a, b| Arc::ptr_eq(&a.face, &b.face))
        {
            let Some(font) = same_face.first().map(|g| g.face.clone()) else {
                continue;
            };
            let Some(face) = font.face() else {
                continue;
            };
            let embolden = embolden_width(style.weight, font.bold, size);
            for glyph in same_face {
                let mut builder =
                    GlyphPathBuilder::new(x + glyph.x, baseline - glyph.rise, glyph.scale);
                if face.outline_glyph(GlyphId(glyph.glyph_id), &mut builder).is_none() {
                    continue;
                }
                let Some(path) = builder.finish() else {
                    continue;
                };
                self.pixmap
                    .fill_path(&path, &paint, FillRule::Winding, self.base, None);
                if let Some(width) = embolden {
                    let mut stroke = Stroke::default();
                    stroke.width = width;
                    stroke.line_join = LineJoin::Round;
                    self.pixmap.stroke_path(&path, &paint, &stroke, self.base, None);
                }
            }
        }
        if style.underline && run.width > 0.0 {
            let thickness = (size / 18.0).max(1.0);
            let y = baseline + size * 0.12;
            if let Some(rect) = tiny_skia::Rect::from_xywh(x, y, run.width, thickness) {
                self.pixmap.fill_rect(rect, &paint, self.base, None);
            }
        }
    }

    fn fill_dot_grid(&mut self, rect: Rect, spacing: f32, radius: f32) {
        if spacing <= 0.0 || radius <= 0.0 {
            return;
        }
        let (left, top) = (rect.x.to_f32(), rect.y.to_f32());
        let (right, bottom) = (rect.right().to_f32(), rect.bottom().to_f32());
        let mut builder = PathBuilder::new();
        let mut cy = top + spacing / 2.0;
        while cy < bottom {
            let mut cx = left + spacing / 2.0;
            while cx < right {
                builder.push_circle(cx, cy, radius);
                cx += spacing;
            }
            cy += spacing;
        }
        let Some(path) = builder.finish() else {
            return;
        };
        let paint = fill_paint(self.state.fill_color, self.state.fill_opacity);
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, self.base, None);
    }
}

/// Outline stroke added around glyphs when the face is lighter than requested.
fn embolden_width(weight: FontWeight, face_is_bold: bool, size: f32) -> Option<f32> {
    let factor = match (weight, face_is_bold) {
        (FontWeight::Regular, _) => return None,
        (FontWeight::Bold, true) => return None,
        (FontWeight::Bold, false) => 0.035,
        (FontWeight::Black, true) => 0.02,
        (FontWeight::Black, false) => 0.06,
    };
    Some(size * factor)
}

#[derive(Debug, Clone, PartialEq)]
struct Piece {
    run: usize,
    text: String,
}

#[derive(Debug, Default)]
struct Token {
    pieces: Vec<Piece>,
    /// A following Latin letter continues this word.
    open: bool,
    /// The next character must stay on the same line (after an opening quote).
    glue: bool,
}

impl Token {
    fn push(&mut self, run: usize, ch: char) {
        match self.pieces.last_mut() {
            Some(piece) if piece.run == run => piece.text.push(ch),
            _ => self.pieces.push(Piece {
                run,
                text: ch.to_string(),
            }),
        }
    }
}

fn is_closing_punct(ch: char) -> bool {
    matches!(
        ch,
        '，' | '。' | '、' | '；' | '：' | '！' | '？' | '”' | '’' | '）' | '》' | '」' | '』'
            | ',' | '.' | ';' | ':' | '!' | '?' | ')'
    )
}

fn is_opening_punct(ch: char) -> bool {
    matches!(ch, '“' | '‘' | '（' | '《' | '「' | '『' | '(')
}

/// Splits styled runs into unbreakable tokens: single CJK characters (with
/// attached punctuation) and Latin words with their trailing spaces.
fn tokenize(runs: &[TextRun]) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    for (run_index, run) in runs.iter().enumerate() {
        for ch in run.text.chars() {
            let wide = is_wide(ch);
            if let Some(last) = tokens.last_mut() {
                let attach = last.glue
                    || is_closing_punct(ch)
                    || ch.is_whitespace()
                    || (last.open && !wide);
                if attach {
                    last.push(run_index, ch);
                    if ch.is_whitespace() {
                        last.open = false;
                        last.glue = false;
                    } else {
                        last.open = !wide && (last.open || last.glue);
                        last.glue = is_opening_punct(ch);
                    }
                    continue;
                }
            }
            let mut token = Token {
                pieces: Vec::new(),
                open: !wide && !is_opening_punct(ch),
                glue: is_opening_punct(ch),
            };
            token.push(run_index, ch);
            tokens.push(token);
        }
    }
    tokens
}

/// Greedy line filling; a token wider than the line still gets its own line.
fn wrap_runs(fonts: &FontRegistry, runs: &[TextRun], max_width: f32, indent: f32) -> Vec<Vec<Piece>> {
    let mut lines: Vec<Vec<Piece>> = Vec::new();
    let mut current: Vec<Piece> = Vec::new();
    let mut used = indent;
    for token in tokenize(runs) {
        let width: f32 = token
            .pieces
            .iter()
            .map(|p| fonts.measure(&runs[p.run].style, &p.text))
            .sum();
        let trailing_space: f32 = token
            .pieces
            .last()
            .map(|p| {
                let trimmed = p.text.trim_end();
                if trimmed.len() == p.text.len() {
                    0.0
                } else {
                    fonts.measure(&runs[p.run].style, &p.text[trimmed.len()..])
                }
            })
            .unwrap_or(0.0);
        if used + width - trailing_space > max_width + 0.01 && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            used = 0.0;
        }
        used += width;
        for piece in token.pieces {
            match current.last_mut() {
                Some(last) if last.run == piece.run => last.text.push_str(&piece.text),
                _ => current.push(piece),
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }

    // Font units are y-up; the canvas is y-down.
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn build_stroke(state: &RasterState) -> Stroke {
    let mut stroke = Stroke::default();
    stroke.width = state.line_width.to_f32().max(0.0);
    stroke.line_cap = LineCap::Butt;
    stroke.line_join = LineJoin::Miter;
    if !state.dash_pattern.is_empty() {
        let mut pattern: Vec<f32> = state
            .dash_pattern
            .iter()
            .map(|p| p.to_f32().abs())
            .collect();
        if pattern.len() % 2 == 1 {
            let copy = pattern.clone();
            pattern.extend(copy);
        }
        stroke.dash = StrokeDash::new(pattern, state.dash_phase.to_f32());
    }
    stroke
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, FontFamily};
    use crate::font::latin_test_font;
    use crate::model::{DocumentModel, FieldEdit, TemplateVariant};
    use crate::template::render;
    use base64::Engine;

    fn rgb_at(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8) {
        let px = pixmap.pixel(x, y).unwrap().demultiply();
        (px.red(), px.green(), px.blue())
    }

    fn red_png_uri() -> String {
        let mut img = image::RgbaImage::new(4, 4);
        for px in img.pixels_mut() {
            px.0 = [255, 0, 0, 255];
        }
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn capture(model: &DocumentModel, variant: TemplateVariant) -> Capture {
        let rasterizer = SkiaRasterizer::new(
            Arc::new(FontRegistry::without_system_fonts()),
            AssetPolicy::default(),
        );
        rasterizer
            .capture(&render(model, variant), 2.0, Color::WHITE)
            .unwrap()
    }

    #[test]
    fn capture_is_oversampled_document_size() {
        let size = capture_size(Size::document(), 2.0).unwrap();
        assert_eq!(size, (2244, 1588));
        let cap = capture(&DocumentModel::default(), TemplateVariant::Classic);
        assert_eq!(cap.pixel_size(), (2244, 1588));
    }

    #[test]
    fn invalid_oversample_is_rejected() {
        assert!(capture_size(Size::document(), 0.0).is_err());
        assert!(capture_size(Size::document(), f32::NAN).is_err());
        assert!(matches!(
            capture_size(Size::document(), 100.0),
            Err(CertError::Capture(_))
        ));
    }

    #[test]
    fn classic_paper_shows_between_borders() {
        let cap = capture(&DocumentModel::default(), TemplateVariant::Classic);
        let (r, g, b) = rgb_at(&cap.pixmap, 80, 800);
        assert!(r >= 250 && (245..=252).contains(&g) && (235..=244).contains(&b), "{r},{g},{b}");
    }

    #[test]
    fn custom_background_covers_the_page() {
        let model = DocumentModel::default().apply(FieldEdit::CustomBackground(red_png_uri()));
        let cap = capture(&model, TemplateVariant::Classic);
        assert!(cap.skipped_assets.is_empty());
        assert_eq!(rgb_at(&cap.pixmap, 120, 800), (255, 0, 0));
        assert_eq!(rgb_at(&cap.pixmap, 2, 2), (255, 0, 0));
    }

    #[test]
    fn forbidden_background_degrades_to_plain_page() {
        let model = DocumentModel::default().apply(FieldEdit::CustomBackground(
            "https://elsewhere.example/bg.jpg".to_string(),
        ));
        let cap = capture(&model, TemplateVariant::Modern);
        assert!(cap.is_degraded());
        assert_eq!(cap.skipped_assets.len(), 1);
        assert_eq!(rgb_at(&cap.pixmap, 1000, 900), (255, 255, 255));
    }

    #[test]
    fn traditional_pattern_dots_are_painted() {
        let cap = capture(&DocumentModel::default(), TemplateVariant::Traditional);
        let (_, g, _) = rgb_at(&cap.pixmap, 20, 20);
        assert!(g < 245, "dot expected at tile centre, got g={g}");
        let (_, g, _) = rgb_at(&cap.pixmap, 30, 30);
        assert!(g >= 249, "gap expected between dots, got g={g}");
    }

    #[test]
    fn text_without_fonts_reports_missing_glyphs() {
        let cap = capture(&DocumentModel::default(), TemplateVariant::Modern);
        assert!(cap.missing_glyphs.contains(&'证'));
    }

    #[test]
    fn viewport_preview_places_document_through_transform() {
        let tree = render(&DocumentModel::default(), TemplateVariant::Classic);
        let transform = ViewportTransform {
            offset_x: 19.5,
            offset_y: 1.5,
            scale: 0.5,
        };
        let backdrop = Color::from_hex(0x404040);
        let pixmap = rasterize_viewport(
            &tree,
            &transform,
            600,
            400,
            backdrop,
            &FontRegistry::without_system_fonts(),
            &ImageStore::default(),
        )
        .unwrap();
        assert_eq!(rgb_at(&pixmap, 5, 200), (64, 64, 64));
        let (r, _, _) = rgb_at(&pixmap, 19 + 20, 200);
        assert!(r >= 250);
    }

    #[test]
    fn paragraphs_wrap_on_cjk_boundaries() {
        let fonts = FontRegistry::without_system_fonts();
        let style = TextStyle::new(FontFamily::SerifSc, 10.0, Color::BLACK);
        let runs = vec![
            TextRun::new("修习“", style),
            TextRun::new("武术", style.bold()),
            TextRun::new("”课程。hello world", style),
        ];
        let lines = wrap_runs(&fonts, &runs, 50.0, 0.0);
        let text: Vec<String> = lines
            .iter()
            .map(|line| line.iter().map(|p| p.text.as_str()).collect())
            .collect();
        assert_eq!(text, vec!["修习“武", "术”课程。", "hello ", "world"]);
    }

    #[test]
    fn first_line_indent_shortens_first_line() {
        let fonts = FontRegistry::without_system_fonts();
        let style = TextStyle::new(FontFamily::SerifSc, 10.0, Color::BLACK);
        let runs = vec![TextRun::new("一二三四五六", style)];
        let lines = wrap_runs(&fonts, &runs, 40.0, 20.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][0].text, "一二");
        assert_eq!(lines[1][0].text, "三四五六");
    }

    #[test]
    fn dashed_and_translucent_strokes_paint() {
        let mut canvas = Canvas::new(Size::document());
        canvas.set_dash(vec![Px::from_f32(4.0)], Px::ZERO);
        canvas.set_opacity(0.5, 0.5);
        canvas.hline(10.0, 200.0, 50.0, 4.0, Color::BLACK);
        let tree = canvas.finish();
        let cap = rasterize(
            &tree,
            1.0,
            Color::WHITE,
            &FontRegistry::without_system_fonts(),
            &ImageStore::default(),
        )
        .unwrap();
        let (on, _, _) = rgb_at(&cap.pixmap, 12, 50);
        let (off, _, _) = rgb_at(&cap.pixmap, 16, 50);
        assert!((120..=135).contains(&on), "{on}");
        assert_eq!(off, 255);
    }

    fn dark_pixels(pixmap: &Pixmap, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| rgb_at(pixmap, x, y).0 < 200)
            .count()
    }

    #[test]
    fn registered_font_paints_the_student_name() {
        let Some(bytes) = latin_test_font() else {
            eprintln!("no latin system font found; skipping");
            return;
        };
        let mut fonts = FontRegistry::without_system_fonts();
        fonts.register_bytes(bytes, Some("latin.ttf")).unwrap();
        let rasterizer = SkiaRasterizer::new(Arc::new(fonts), AssetPolicy::default());
        let model = DocumentModel::default()
            .apply(FieldEdit::StudentName("Ada Lovelace".to_string()));
        let tree = render(&model, TemplateVariant::Classic);

        let cap = rasterizer.capture(&tree, 1.0, Color::WHITE).unwrap();
        let painted = dark_pixels(&cap.pixmap, 100..340, 208..237);
        assert!(painted > 100, "only {painted} dark pixels in the name box");
        assert!(!cap.missing_glyphs.iter().any(|ch| "Ada Lovelace".contains(*ch)));

        // Same box at 2x with no fonts: nothing painted.
        let blank = capture(&model, TemplateVariant::Classic);
        assert_eq!(dark_pixels(&blank.pixmap, 200..680, 416..474), 0);
    }
}
