use super::{Bindings, FieldBox, full_rect, paint_backdrop};
use crate::canvas::{Canvas, FontFamily, TextAlign, TextRun, TextStyle};
use crate::types::{Color, Px, Rect};

pub(crate) const LAYER_PATTERN: &str = "pattern";

const PAPER: Color = Color::from_hex(0xfdfbf7);
const CRIMSON: Color = Color::from_hex(0x8b0000);
const INK: Color = Color::from_hex(0x4a0e0e);

const BODY_SIZE: f32 = 24.0;
const BODY_LEADING: f32 = 48.0;
const BODY_LEFT: f32 = 112.0;
const BODY_RIGHT: f32 = 1122.0 - 112.0;
const FOOTER_LEFT: f32 = 128.0;
const FOOTER_RIGHT: f32 = 1122.0 - 128.0;

/// End month shown in the "于…年…月至…月" phrase.
///
/// Taken verbatim from the month field of the issue date string rather than
/// from the parsed date, so `2025-03-05` yields `03`. This only applies to
/// this layout.
pub(crate) fn end_month(issue_date_raw: &str) -> &str {
    issue_date_raw.trim().split('-').nth(1).unwrap_or("")
}

pub(crate) fn paint(canvas: &mut Canvas, b: &Bindings<'_>) {
    let custom = paint_backdrop(canvas, b, PAPER);
    if !custom {
        canvas.layer(LAYER_PATTERN);
        canvas.save_state();
        canvas.set_opacity(0.05, 0.05);
        canvas.set_fill_color(CRIMSON);
        canvas.fill_dot_grid(full_rect(), 20.0, 1.0);
        canvas.restore_state();
    }

    canvas.layer("border");
    paint_frame(canvas);

    canvas.layer("content");
    paint_heading(canvas);
    paint_body(canvas, b);
    paint_footer(canvas, b);
}

fn paint_frame(canvas: &mut Canvas) {
    let frame = full_rect();
    canvas.stroke_box(frame.inset(16.0), 4.0, CRIMSON);
    canvas.stroke_box(frame.inset(24.0), 1.0, CRIMSON);

    // Corner brackets: 64-unit L shapes sitting on the outer border.
    let outer = frame.inset(16.0);
    let arm = Px::from_f32(64.0);
    let half = Px::from_f32(2.0);
    canvas.set_stroke_color(CRIMSON);
    canvas.set_line_width(Px::from_f32(4.0));
    let corners = [
        (outer.x + half, outer.y + half, arm, arm),
        (outer.right() - half, outer.y + half, -arm, arm),
        (outer.x + half, outer.bottom() - half, arm, -arm),
        (outer.right() - half, outer.bottom() - half, -arm, -arm),
    ];
    for (x, y, dx, dy) in corners {
        canvas.move_to(x, y + dy);
        canvas.line_to(x, y);
        canvas.line_to(x + dx, y);
        canvas.stroke();
    }
}

fn paint_heading(canvas: &mut Canvas) {
    let kicker = TextStyle::new(FontFamily::SerifSc, 18.0, CRIMSON)
        .bold()
        .tracking(9.0);
    canvas.draw_text(561.0, 136.0, TextAlign::Center, vec![TextRun::new("中华武术传承", kicker)]);
    let title = TextStyle::new(FontFamily::SerifSc, 56.0, CRIMSON)
        .black()
        .tracking(56.0);
    canvas.draw_text(577.0, 216.0, TextAlign::Center, vec![TextRun::new("结业证书", title)]);
}

fn paint_body(canvas: &mut Canvas, b: &Bindings<'_>) {
    let body = TextStyle::new(FontFamily::SerifSc, BODY_SIZE, INK);
    let strong = body.bold();

    let name_box = FieldBox {
        min_width: 120.0,
        padding: 24.0,
        rule_offset: 8.0,
        rule_width: 2.0,
        rule_color: CRIMSON,
    };
    let name_style = TextStyle::new(FontFamily::SerifSc, 32.0, INK).bold();
    let baseline = 316.0;
    let after = name_box.paint(canvas, BODY_LEFT, baseline, b.student_name, name_style);
    canvas.draw_text(
        after + 16.0,
        baseline,
        TextAlign::Left,
        vec![TextRun::new("学员：", body)],
    );

    let course = TextStyle::new(FontFamily::SerifSc, 28.0, CRIMSON).bold();
    let runs = vec![
        TextRun::new("于 ", body),
        TextRun::new(b.start_year, strong),
        TextRun::new(" 年 ", body),
        TextRun::new(b.start_month, strong),
        TextRun::new(" 月至 ", body),
        TextRun::new(end_month(b.issue_date_raw), strong),
        TextRun::new(" 月，在本馆修习 ", body),
        TextRun::new(format!("“{}”", b.course_name), course),
        TextRun::new("。期间尊师重道，刻苦磨练，技艺精进，通过考核，特发此证。", body),
    ];
    canvas.slot("end_month", end_month(b.issue_date_raw));
    canvas.draw_paragraph(
        Rect::from_xywh(BODY_LEFT, 344.0, BODY_RIGHT - BODY_LEFT, BODY_LEADING * 3.0),
        runs,
        BODY_LEADING,
        BODY_SIZE * 2.0,
    );
}

fn paint_footer(canvas: &mut Canvas, b: &Bindings<'_>) {
    let faded = TextStyle::new(FontFamily::SerifSc, 18.0, CRIMSON);
    let seal_cx = FOOTER_LEFT + 64.0;
    canvas.save_state();
    canvas.set_opacity(0.8, 0.8);
    canvas.draw_text(seal_cx, 548.0, TextAlign::Center, vec![TextRun::new("批准单位", faded)]);
    canvas.restore_state();

    canvas.layer("seal");
    canvas.save_state();
    canvas.set_opacity(0.2, 0.2);
    canvas.set_stroke_color(CRIMSON);
    canvas.set_line_width(Px::from_f32(4.0));
    canvas.circle_path(seal_cx, 628.0, 62.0);
    canvas.stroke();
    let seal_glyph = TextStyle::new(FontFamily::SerifSc, 36.0, CRIMSON).bold();
    canvas.draw_text(seal_cx, 641.0, TextAlign::Center, vec![TextRun::new("武", seal_glyph)]);
    canvas.restore_state();

    canvas.layer("content");
    let label = TextStyle::new(FontFamily::SerifSc, 24.0, INK);
    let coach = TextStyle::new(FontFamily::Cursive, 30.0, INK).bold();
    canvas.draw_text(
        FOOTER_RIGHT,
        624.0,
        TextAlign::Right,
        vec![
            TextRun::new("教 练：", label),
            TextRun::new(" ", label),
            TextRun::new(b.coach_name, coach),
        ],
    );
    let date = TextStyle::new(FontFamily::SerifSc, 20.0, INK).tracking(2.0);
    canvas.draw_text(
        FOOTER_RIGHT,
        672.0,
        TextAlign::Right,
        vec![
            TextRun::new(b.issue.year.as_str(), date),
            TextRun::new(" 年 ", date),
            TextRun::new(b.issue.month.as_str(), date),
            TextRun::new(" 月 ", date),
            TextRun::new(b.issue.day.as_str(), date),
            TextRun::new(" 日", date),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentModel, FieldEdit, TemplateVariant};
    use crate::template::render;

    #[test]
    fn end_month_keeps_raw_month_text() {
        assert_eq!(end_month("2025-12-23"), "12");
        assert_eq!(end_month("2025-03-05"), "03");
        assert_eq!(end_month("garbage"), "");
    }

    #[test]
    fn end_month_slot_is_only_bound_by_this_layout() {
        let model = DocumentModel::default().apply(FieldEdit::IssueDate("2026-07-01".to_string()));
        let tree = render(&model, TemplateVariant::Traditional);
        assert_eq!(tree.slot("end_month").as_deref(), Some("07"));
        assert_eq!(tree.slot("issue_month").as_deref(), Some("7"));
        assert!(tree.text_content().contains("月至 07 月"));

        let classic = render(&model, TemplateVariant::Classic);
        assert_eq!(classic.slot("end_month"), None);
    }
}
