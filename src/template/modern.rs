use super::{Bindings, FieldBox, estimate_width, full_rect, paint_backdrop};
use crate::canvas::{Canvas, FontFamily, TextAlign, TextRun, TextStyle};
use crate::types::{Color, Px, Rect};

pub(crate) const LAYER_ACCENT: &str = "accent";

const NAVY: Color = Color::from_hex(0x1e3a8a);
const SLATE_900: Color = Color::from_hex(0x0f172a);
const SLATE_700: Color = Color::from_hex(0x334155);
const SLATE_500: Color = Color::from_hex(0x64748b);
const SLATE_400: Color = Color::from_hex(0x94a3b8);
const SLATE_300: Color = Color::from_hex(0xcbd5e1);
const SLATE_200: Color = Color::from_hex(0xe2e8f0);
const SLATE_100: Color = Color::from_hex(0xf1f5f9);

const LEFT: f32 = 64.0;
const RIGHT: f32 = 1122.0 - 64.0;
const BODY_SIZE: f32 = 24.0;
const BODY_LEADING: f32 = 39.0;

pub(crate) fn paint(canvas: &mut Canvas, b: &Bindings<'_>) {
    let custom = paint_backdrop(canvas, b, Color::WHITE);
    if !custom {
        paint_accents(canvas);
    }

    canvas.layer("border");
    let frame = full_rect();
    canvas.stroke_box(frame.inset(32.0), 2.0, SLATE_200);
    canvas.stroke_box(frame.inset(40.0), 1.0, SLATE_100);

    canvas.layer("content");
    paint_header(canvas);
    paint_body(canvas, b);
    paint_footer(canvas, b);
}

fn paint_accents(canvas: &mut Canvas) {
    canvas.layer(LAYER_ACCENT);
    canvas.set_fill_color(NAVY);
    canvas.move_to(Px::ZERO, Px::ZERO);
    canvas.line_to(Px::from_f32(128.0), Px::ZERO);
    canvas.line_to(Px::ZERO, Px::from_f32(128.0));
    canvas.close_path();
    canvas.fill();

    canvas.save_state();
    canvas.set_opacity(0.1, 0.1);
    canvas.draw_rect(Rect::from_xywh(1122.0 - 256.0, 794.0 - 32.0, 256.0, 32.0));
    canvas.restore_state();
    canvas.save_state();
    canvas.set_opacity(0.2, 0.2);
    canvas.draw_rect(Rect::from_xywh(1122.0 - 192.0, 794.0 - 64.0, 192.0, 32.0));
    canvas.restore_state();
}

fn paint_header(canvas: &mut Canvas) {
    let title = TextStyle::new(FontFamily::SerifSc, 48.0, NAVY)
        .bold()
        .tracking(4.8);
    canvas.draw_text(LEFT, 108.0, TextAlign::Left, vec![TextRun::new("结业证书", title)]);
    let subtitle = TextStyle::new(FontFamily::Sans, 14.0, SLATE_500).tracking(4.2);
    canvas.draw_text(
        LEFT,
        140.0,
        TextAlign::Left,
        vec![TextRun::new("CERTIFICATE OF COMPLETION", subtitle)],
    );

    let (cx, cy) = (RIGHT - 32.0, 96.0);
    canvas.set_fill_color(NAVY);
    canvas.circle_path(cx, cy, 32.0);
    canvas.fill();
    let emblem = TextStyle::new(FontFamily::SerifSc, 24.0, Color::WHITE).bold();
    canvas.draw_text(cx, cy + 9.0, TextAlign::Center, vec![TextRun::new("武", emblem)]);
}

fn paint_body(canvas: &mut Canvas, b: &Bindings<'_>) {
    let body = TextStyle::new(FontFamily::SerifSc, BODY_SIZE, SLATE_700);
    let strong = body.bold().colored(SLATE_900);

    let name_box = FieldBox {
        min_width: 0.0,
        padding: 16.0,
        rule_offset: 10.0,
        rule_width: 2.0,
        rule_color: NAVY,
    };
    let name_style = TextStyle::new(FontFamily::SerifSc, 36.0, SLATE_900).bold();
    let baseline = 244.0;
    let after = name_box.paint(canvas, LEFT, baseline, b.student_name, name_style);
    canvas.draw_text(after + 16.0, baseline, TextAlign::Left, vec![TextRun::new("同学：", body)]);

    let runs = vec![
        TextRun::new("自 ", body),
        TextRun::new(b.start_year, strong),
        TextRun::new(" 年 ", body),
        TextRun::new(b.start_month, strong),
        TextRun::new(" 月起，修习“", body),
        TextRun::new(b.course_name, body.bold().colored(NAVY)),
        TextRun::new("”课程。历时一学期，勤学苦练，成绩合格，准予结业。", body),
    ];
    canvas.draw_paragraph(
        Rect::from_xywh(LEFT, 284.0, RIGHT - LEFT, BODY_LEADING * 4.0),
        runs,
        BODY_LEADING,
        32.0,
    );
}

fn paint_footer(canvas: &mut Canvas, b: &Bindings<'_>) {
    let date_style = TextStyle::new(FontFamily::SerifSc, 20.0, SLATE_900).bold();
    let caption = TextStyle::new(FontFamily::SerifSc, 14.0, SLATE_400);
    let date_runs = vec![
        TextRun::new(b.issue.year.as_str(), date_style),
        TextRun::new(" / ", date_style),
        TextRun::new(b.issue.month.as_str(), date_style),
        TextRun::new(" / ", date_style),
        TextRun::new(b.issue.day.as_str(), date_style),
    ];
    let date_width: f32 = date_runs
        .iter()
        .map(|run| estimate_width(&run.text, 20.0, 0.0))
        .sum();
    canvas.draw_text(RIGHT, 664.0, TextAlign::Right, date_runs);
    canvas.draw_text(RIGHT, 692.0, TextAlign::Right, vec![TextRun::new("颁发日期", caption)]);

    let coach_style = TextStyle::new(FontFamily::Cursive, 30.0, SLATE_900);
    let coach_box = FieldBox {
        min_width: 120.0,
        padding: 0.0,
        rule_offset: 12.0,
        rule_width: 1.0,
        rule_color: SLATE_300,
    };
    let coach_width = estimate_width(b.coach_name, 30.0, 0.0).max(coach_box.min_width);
    let coach_left = RIGHT - date_width.max(80.0) - 64.0 - coach_width;
    canvas.draw_text(
        coach_left + coach_width / 2.0,
        624.0,
        TextAlign::Center,
        vec![TextRun::new("主教练签名", caption)],
    );
    coach_box.paint(canvas, coach_left, 670.0, b.coach_name, coach_style);
}
