//! Certificate layouts.
//!
//! Every variant paints onto the fixed 1122x794 canvas and nothing else; the
//! result does not depend on zoom, container size or any I/O. Text is emitted
//! as runs and measured later by the rasterizer, so layout here only needs
//! approximate widths for decorations such as underlines.

mod classic;
mod modern;
mod traditional;

use crate::canvas::{Canvas, ImageFit, TextAlign, TextRun, TextStyle, VisualTree};
use crate::font::is_wide;
use crate::model::{DateParts, DocumentModel, TemplateVariant};
use crate::types::{Color, Rect, Size};

pub(crate) const LAYER_CUSTOM_BACKGROUND: &str = "custom-background";
pub(crate) const LAYER_BASE_FILL: &str = "base-fill";

/// Renders `model` with the given layout into a fresh display list.
pub fn render(model: &DocumentModel, variant: TemplateVariant) -> VisualTree {
    let bindings = Bindings::from_model(model);
    let mut canvas = Canvas::new(Size::document());
    canvas.meta("template", variant.id());
    bindings.record_slots(&mut canvas);
    match variant {
        TemplateVariant::Classic => classic::paint(&mut canvas, &bindings),
        TemplateVariant::Traditional => traditional::paint(&mut canvas, &bindings),
        TemplateVariant::Modern => modern::paint(&mut canvas, &bindings),
    }
    canvas.finish()
}

/// Field values as they are substituted into a layout.
pub(crate) struct Bindings<'a> {
    pub student_name: &'a str,
    pub start_year: &'a str,
    pub start_month: &'a str,
    pub course_name: &'a str,
    pub coach_name: &'a str,
    pub issue: DateParts,
    pub issue_date_raw: &'a str,
    pub background: Option<&'a str>,
}

impl<'a> Bindings<'a> {
    fn from_model(model: &'a DocumentModel) -> Self {
        let background = model
            .custom_background_image
            .as_deref()
            .filter(|uri| !uri.trim().is_empty());
        Self {
            student_name: &model.student_name,
            start_year: &model.start_year,
            start_month: &model.start_month,
            course_name: &model.course_name,
            coach_name: &model.coach_name,
            issue: model.issue_date_parts(),
            issue_date_raw: &model.issue_date,
            background,
        }
    }

    fn record_slots(&self, canvas: &mut Canvas) {
        canvas.slot("student_name", self.student_name);
        canvas.slot("start_year", self.start_year);
        canvas.slot("start_month", self.start_month);
        canvas.slot("course_name", self.course_name);
        canvas.slot("coach_name", self.coach_name);
        canvas.slot("issue_year", self.issue.year.as_str());
        canvas.slot("issue_month", self.issue.month.as_str());
        canvas.slot("issue_day", self.issue.day.as_str());
    }
}

/// Paints either the custom background image or the variant's plain fill.
///
/// Returns true when a custom image was painted, in which case callers skip
/// decoration that assumes a plain backdrop.
pub(crate) fn paint_backdrop(canvas: &mut Canvas, bindings: &Bindings<'_>, fill: Color) -> bool {
    let full = full_rect();
    match bindings.background {
        Some(uri) => {
            canvas.layer(LAYER_CUSTOM_BACKGROUND);
            canvas.draw_image(full, uri, ImageFit::Cover);
            true
        }
        None => {
            canvas.layer(LAYER_BASE_FILL);
            canvas.set_fill_color(fill);
            canvas.draw_rect(full);
            false
        }
    }
}

pub(crate) fn full_rect() -> Rect {
    let size = Size::document();
    Rect {
        x: crate::types::Px::ZERO,
        y: crate::types::Px::ZERO,
        width: size.width,
        height: size.height,
    }
}

/// A value centred in a box at least `min_width` wide with a rule beneath it,
/// the way blanks on a printed form look.
pub(crate) struct FieldBox {
    pub min_width: f32,
    pub padding: f32,
    pub rule_offset: f32,
    pub rule_width: f32,
    pub rule_color: Color,
}

impl FieldBox {
    /// Paints `value` with its left edge at `x`; returns the box's right edge.
    pub fn paint(&self, canvas: &mut Canvas, x: f32, baseline: f32, value: &str, style: TextStyle) -> f32 {
        let size = style.size.to_f32();
        let tracking = style.letter_spacing.to_f32();
        let width = (estimate_width(value, size, tracking) + self.padding * 2.0).max(self.min_width);
        canvas.draw_text(
            x + width / 2.0,
            baseline,
            TextAlign::Center,
            vec![TextRun::new(value, style)],
        );
        if self.rule_width > 0.0 {
            canvas.hline(
                x,
                x + width,
                baseline + self.rule_offset,
                self.rule_width,
                self.rule_color,
            );
        }
        x + width
    }
}

/// Rough advance of `text` for decoration placement: full-width glyphs take
/// one em, everything else about half.
pub(crate) fn estimate_width(text: &str, size: f32, tracking: f32) -> f32 {
    text.chars()
        .map(|ch| {
            let em = if is_wide(ch) { 1.0 } else { 0.55 };
            em * size + tracking
        })
        .sum()
}
