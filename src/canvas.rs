use crate::types::{Color, Px, Rect, Size};
use std::collections::BTreeMap;

pub const META_SLOT_PREFIX: &str = "slot.";
pub const META_LAYER_KEY: &str = "layer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FontFamily {
    SerifSc,
    Cursive,
    Sans,
}

impl FontFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontFamily::SerifSc => "serif-sc",
            FontFamily::Cursive => "cursive",
            FontFamily::Sans => "sans",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontWeight {
    Regular,
    Bold,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// How an image is mapped into its destination box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFit {
    Fill,
    /// Scale to cover the box, cropping overflow (CSS `object-fit: cover`).
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub family: FontFamily,
    pub weight: FontWeight,
    pub size: Px,
    pub color: Color,
    pub letter_spacing: Px,
    pub underline: bool,
}

impl TextStyle {
    pub fn new(family: FontFamily, size: f32, color: Color) -> Self {
        Self {
            family,
            weight: FontWeight::Regular,
            size: Px::from_f32(size),
            color,
            letter_spacing: Px::ZERO,
            underline: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.weight = FontWeight::Bold;
        self
    }

    pub fn black(mut self) -> Self {
        self.weight = FontWeight::Black;
        self
    }

    pub fn tracking(mut self, spacing: f32) -> Self {
        self.letter_spacing = Px::from_f32(spacing);
        self
    }

    pub fn underlined(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn sized(mut self, size: f32) -> Self {
        self.size = Px::from_f32(size);
        self
    }

    pub fn colored(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    // Non-painting metadata: field slots and layer markers. Ignored by the rasterizer.
    Meta {
        key: String,
        value: String,
    },
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Px),
    SetDash {
        pattern: Vec<Px>,
        phase: Px,
    },
    // Values outside 0..1 are clamped.
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    MoveTo {
        x: Px,
        y: Px,
    },
    LineTo {
        x: Px,
        y: Px,
    },
    CurveTo {
        x1: Px,
        y1: Px,
        x2: Px,
        y2: Px,
        x: Px,
        y: Px,
    },
    ClosePath,
    Fill,
    Stroke,
    DrawRect {
        x: Px,
        y: Px,
        width: Px,
        height: Px,
    },
    DrawImage {
        x: Px,
        y: Px,
        width: Px,
        height: Px,
        resource_id: String,
        fit: ImageFit,
    },
    // One line of styled runs. `y` is the baseline; `x` is the anchor for `align`.
    DrawText {
        x: Px,
        y: Px,
        align: TextAlign,
        runs: Vec<TextRun>,
    },
    // Wrapped runs inside `rect`, first baseline at rect.y + line_height * 0.75.
    DrawParagraph {
        rect: Rect,
        runs: Vec<TextRun>,
        line_height: Px,
        first_line_indent: Px,
    },
    // Evenly spaced dots filling `rect` with the current fill color.
    FillDotGrid {
        rect: Rect,
        spacing: Px,
        radius: Px,
    },
}

/// The renderer's output: a fixed-size display list in document-local
/// coordinates (origin top-left, y down).
#[derive(Debug, Clone, PartialEq)]
pub struct VisualTree {
    pub size: Size,
    pub commands: Vec<Command>,
}

impl VisualTree {
    /// Field values bound into the tree, keyed by slot name without prefix.
    pub fn slots(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for cmd in &self.commands {
            if let Command::Meta { key, value } = cmd {
                if let Some(slot) = key.strip_prefix(META_SLOT_PREFIX) {
                    out.entry(slot.to_string()).or_insert_with(|| value.clone());
                }
            }
        }
        out
    }

    pub fn slot(&self, name: &str) -> Option<String> {
        self.slots().remove(name)
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.commands.iter().any(|cmd| {
            matches!(cmd, Command::Meta { key, value } if key == META_LAYER_KEY && value == name)
        })
    }

    pub fn image_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for cmd in &self.commands {
            if let Command::DrawImage { resource_id, .. } = cmd {
                if !out.iter().any(|s| s == resource_id) {
                    out.push(resource_id.clone());
                }
            }
        }
        out
    }

    /// All painted text in command order, runs concatenated without separators.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for cmd in &self.commands {
            match cmd {
                Command::DrawText { runs, .. } | Command::DrawParagraph { runs, .. } => {
                    for run in runs {
                        out.push_str(&run.text);
                    }
                    out.push('\n');
                }
                _ => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Px,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Px::from_f32(1.0),
        }
    }
}

pub struct Canvas {
    size: Size,
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn slot(&mut self, name: &str, value: impl Into<String>) {
        self.meta(format!("{META_SLOT_PREFIX}{name}"), value);
    }

    pub fn layer(&mut self, name: &str) {
        self.meta(META_LAYER_KEY, name);
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Px) {
        let width = if width < Px::ZERO { Px::ZERO } else { width };
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_dash(&mut self, pattern: Vec<Px>, phase: Px) {
        self.commands.push(Command::SetDash { pattern, phase });
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        self.commands.push(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    pub fn move_to(&mut self, x: Px, y: Px) {
        self.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Px, y: Px) {
        self.commands.push(Command::LineTo { x, y });
    }

    pub fn curve_to(&mut self, x1: Px, y1: Px, x2: Px, y2: Px, x: Px, y: Px) {
        self.commands.push(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.commands.push(Command::ClosePath);
    }

    pub fn fill(&mut self) {
        self.commands.push(Command::Fill);
    }

    pub fn stroke(&mut self) {
        self.commands.push(Command::Stroke);
    }

    pub fn draw_rect(&mut self, rect: Rect) {
        self.commands.push(Command::DrawRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }

    /// Strokes a border whose outer edge is `rect`, like a CSS border of `width`.
    pub fn stroke_box(&mut self, rect: Rect, width: f32, color: Color) {
        let half = width / 2.0;
        let inner = rect.inset(half);
        self.set_stroke_color(color);
        self.set_line_width(Px::from_f32(width));
        self.move_to(inner.x, inner.y);
        self.line_to(inner.right(), inner.y);
        self.line_to(inner.right(), inner.bottom());
        self.line_to(inner.x, inner.bottom());
        self.close_path();
        self.stroke();
    }

    pub fn hline(&mut self, x0: f32, x1: f32, y: f32, width: f32, color: Color) {
        self.set_stroke_color(color);
        self.set_line_width(Px::from_f32(width));
        self.move_to(Px::from_f32(x0), Px::from_f32(y));
        self.line_to(Px::from_f32(x1), Px::from_f32(y));
        self.stroke();
    }

    pub fn circle_path(&mut self, cx: f32, cy: f32, r: f32) {
        let k = 0.552_284_75 * r;
        let p = Px::from_f32;
        self.move_to(p(cx + r), p(cy));
        self.curve_to(p(cx + r), p(cy + k), p(cx + k), p(cy + r), p(cx), p(cy + r));
        self.curve_to(p(cx - k), p(cy + r), p(cx - r), p(cy + k), p(cx - r), p(cy));
        self.curve_to(p(cx - r), p(cy - k), p(cx - k), p(cy - r), p(cx), p(cy - r));
        self.curve_to(p(cx + k), p(cy - r), p(cx + r), p(cy - k), p(cx + r), p(cy));
        self.close_path();
    }

    pub fn draw_image(&mut self, rect: Rect, resource_id: impl Into<String>, fit: ImageFit) {
        self.commands.push(Command::DrawImage {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            resource_id: resource_id.into(),
            fit,
        });
    }

    pub fn draw_text(&mut self, x: f32, baseline: f32, align: TextAlign, runs: Vec<TextRun>) {
        self.commands.push(Command::DrawText {
            x: Px::from_f32(x),
            y: Px::from_f32(baseline),
            align,
            runs,
        });
    }

    pub fn draw_paragraph(
        &mut self,
        rect: Rect,
        runs: Vec<TextRun>,
        line_height: f32,
        first_line_indent: f32,
    ) {
        self.commands.push(Command::DrawParagraph {
            rect,
            runs,
            line_height: Px::from_f32(line_height),
            first_line_indent: Px::from_f32(first_line_indent),
        });
    }

    pub fn fill_dot_grid(&mut self, rect: Rect, spacing: f32, radius: f32) {
        self.commands.push(Command::FillDotGrid {
            rect,
            spacing: Px::from_f32(spacing),
            radius: Px::from_f32(radius),
        });
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn finish(self) -> VisualTree {
        VisualTree {
            size: self.size,
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_elided() {
        let mut canvas = Canvas::new(Size::document());
        canvas.set_fill_color(Color::BLACK);
        canvas.set_fill_color(Color::from_hex(0x8b4513));
        canvas.set_fill_color(Color::from_hex(0x8b4513));
        canvas.set_line_width(Px::from_f32(1.0));
        assert_eq!(canvas.command_count(), 1);
    }

    #[test]
    fn restore_rewinds_tracked_state() {
        let mut canvas = Canvas::new(Size::document());
        canvas.save_state();
        canvas.set_fill_color(Color::WHITE);
        canvas.restore_state();
        canvas.set_fill_color(Color::WHITE);
        let tree = canvas.finish();
        let fills = tree
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SetFillColor(_)))
            .count();
        assert_eq!(fills, 2);
    }

    #[test]
    fn unmatched_restore_is_ignored() {
        let mut canvas = Canvas::new(Size::document());
        canvas.restore_state();
        assert_eq!(canvas.command_count(), 0);
    }

    #[test]
    fn slots_and_layers_are_collected_from_meta() {
        let mut canvas = Canvas::new(Size::document());
        canvas.slot("student_name", "张三");
        canvas.slot("student_name", "ignored");
        canvas.layer("watermark");
        let tree = canvas.finish();
        assert_eq!(tree.slot("student_name").as_deref(), Some("张三"));
        assert!(tree.has_layer("watermark"));
        assert!(!tree.has_layer("accent"));
    }

    #[test]
    fn image_sources_are_deduplicated_in_order() {
        let mut canvas = Canvas::new(Size::document());
        let rect = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        canvas.draw_image(rect, "b.png", ImageFit::Fill);
        canvas.draw_image(rect, "a.png", ImageFit::Cover);
        canvas.draw_image(rect, "b.png", ImageFit::Fill);
        assert_eq!(canvas.finish().image_sources(), vec!["b.png", "a.png"]);
    }
}
