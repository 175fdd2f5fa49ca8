use super::{Bindings, FieldBox, estimate_width, full_rect, paint_backdrop};
use crate::canvas::{Canvas, FontFamily, TextAlign, TextRun, TextStyle};
use crate::types::{Color, Rect};

pub(crate) const LAYER_WATERMARK: &str = "watermark";

const PAPER: Color = Color::from_hex(0xfffaf0);
const BROWN: Color = Color::from_hex(0x8b4513);
const GOLD: Color = Color::from_hex(0xdaa520);
const INK: Color = Color::from_hex(0x1f2937);
const RULE_GRAY: Color = Color::from_hex(0x9ca3af);
const WATERMARK_RED: Color = Color::from_hex(0x7f1d1d);

const CONTENT_LEFT: f32 = 96.0;
const CONTENT_RIGHT: f32 = 1122.0 - 96.0;
const BODY_SIZE: f32 = 26.0;
const BODY_LEADING: f32 = 56.0;
const SIGNATURE_RIGHT: f32 = CONTENT_RIGHT - 48.0;

pub(crate) fn paint(canvas: &mut Canvas, b: &Bindings<'_>) {
    let custom = paint_backdrop(canvas, b, PAPER);
    if !custom {
        canvas.layer(LAYER_WATERMARK);
        canvas.save_state();
        canvas.set_opacity(0.03, 0.03);
        let mark = TextStyle::new(FontFamily::SerifSc, 500.0, WATERMARK_RED)
            .black()
            .tracking(50.0);
        canvas.draw_text(561.0, 572.0, TextAlign::Center, vec![TextRun::new("武", mark)]);
        canvas.restore_state();
    }

    canvas.layer("border");
    let frame = full_rect();
    canvas.stroke_box(frame.inset(16.0), 12.0, BROWN);
    canvas.stroke_box(frame.inset(24.0), 2.0, GOLD);

    canvas.layer("content");
    paint_title(canvas);
    paint_body(canvas, b);
    paint_signature(canvas, b);
}

fn paint_title(canvas: &mut Canvas) {
    let title = TextStyle::new(FontFamily::SerifSc, 64.0, BROWN)
        .black()
        .tracking(24.0);
    canvas.draw_text(561.0, 144.0, TextAlign::Center, vec![TextRun::new("结业证书", title)]);

    let half = estimate_width("结业证书", 64.0, 24.0) / 2.0;
    canvas.hline(561.0 - half, 561.0 + half, 166.0, 1.5, BROWN);
    canvas.hline(561.0 - half, 561.0 + half, 171.0, 1.5, BROWN);
}

fn paint_body(canvas: &mut Canvas, b: &Bindings<'_>) {
    let body = TextStyle::new(FontFamily::SerifSc, BODY_SIZE, INK);
    let strong = body.bold();

    let name_box = FieldBox {
        min_width: 150.0,
        padding: 16.0,
        rule_offset: 10.0,
        rule_width: 2.0,
        rule_color: RULE_GRAY,
    };
    let name_style = TextStyle::new(FontFamily::SerifSc, 32.0, BROWN).bold();
    let name_baseline = 236.0;
    let after = name_box.paint(canvas, CONTENT_LEFT + 4.0, name_baseline, b.student_name, name_style);
    canvas.draw_text(
        after + 4.0,
        name_baseline,
        TextAlign::Left,
        vec![TextRun::new("同学：", body)],
    );

    let width = CONTENT_RIGHT - CONTENT_LEFT;
    let indent = BODY_SIZE * 2.0;
    let lead = vec![
        TextRun::new("心慕武道，恪守武德，自 ", body),
        TextRun::new(b.start_year, strong),
        TextRun::new(" 年 ", body),
        TextRun::new(b.start_month, strong),
        TextRun::new(" 月进入武术课程学习。系统修习“", body),
        TextRun::new(b.course_name, strong.underlined()),
        TextRun::new(
            "”课程，历时一学期期满。期间勤学苦练，精进不懈，已掌握本阶段之要旨，功架端正，理法渐明，品行端正，尊师重道。",
            body,
        ),
    ];
    canvas.draw_paragraph(
        Rect::from_xywh(CONTENT_LEFT, 264.0, width, BODY_LEADING * 3.0),
        lead,
        BODY_LEADING,
        indent,
    );
    canvas.draw_paragraph(
        Rect::from_xywh(CONTENT_LEFT, 440.0, width, BODY_LEADING),
        vec![TextRun::new("经综合考核，成绩合格，准予结业。", body)],
        BODY_LEADING,
        indent,
    );
    canvas.draw_paragraph(
        Rect::from_xywh(CONTENT_LEFT, 504.0, width, BODY_LEADING),
        vec![TextRun::new("特颁此证，以资证明。", body)],
        BODY_LEADING,
        indent,
    );
}

fn paint_signature(canvas: &mut Canvas, b: &Bindings<'_>) {
    let label = TextStyle::new(FontFamily::SerifSc, 24.0, INK);
    let coach_style = TextStyle::new(FontFamily::Cursive, 24.0, INK).bold();
    let coach_box = FieldBox {
        min_width: 150.0,
        padding: 0.0,
        rule_offset: 8.0,
        rule_width: 1.0,
        rule_color: INK,
    };
    let coach_width = estimate_width(b.coach_name, 24.0, 0.0).max(coach_box.min_width);
    let coach_left = SIGNATURE_RIGHT - coach_width;
    canvas.draw_text(
        coach_left,
        640.0,
        TextAlign::Right,
        vec![TextRun::new("教练：", label)],
    );
    coach_box.paint(canvas, coach_left, 640.0, b.coach_name, coach_style);

    let date = label.tracking(2.4);
    canvas.draw_text(
        SIGNATURE_RIGHT,
        690.0,
        TextAlign::Right,
        vec![
            TextRun::new(b.issue.year.as_str(), date),
            TextRun::new("年", date),
            TextRun::new(b.issue.month.as_str(), date),
            TextRun::new("月", date),
            TextRun::new(b.issue.day.as_str(), date),
            TextRun::new("日", date),
        ],
    );
}
