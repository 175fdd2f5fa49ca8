//! Pan and zoom of the fixed-size document inside a resizable container.
//!
//! The controller only ever changes how the document is shown. Exports read
//! the canonical 1:1 display list and never consult this state.

use crate::error::{CertError, Result};
use crate::types::{DOC_HEIGHT, DOC_WIDTH};

/// Hard bounds every configured scale range must sit inside.
const SCALE_FLOOR: f64 = 0.1;
const SCALE_CEILING: f64 = 3.0;

/// Viewport tuning. Built through [`ViewportConfig::builder`], which rejects
/// ranges the controller cannot honour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportConfig {
    padding: f64,
    min_scale: f64,
    max_scale: f64,
    fit_max_scale: f64,
    wheel_zoom_sensitivity: f64,
    zoom_step: f64,
    initial_scale: f64,
    transition_ms: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            padding: 40.0,
            min_scale: SCALE_FLOOR,
            max_scale: SCALE_CEILING,
            fit_max_scale: 1.0,
            wheel_zoom_sensitivity: 0.001,
            zoom_step: 0.1,
            initial_scale: 0.8,
            transition_ms: 100,
        }
    }
}

impl ViewportConfig {
    pub fn builder() -> ViewportConfigBuilder {
        ViewportConfigBuilder::default()
    }

    /// Margin kept free on every side by [`ViewportController::fit_to_container`].
    pub fn padding(&self) -> f64 {
        self.padding
    }

    pub fn min_scale(&self) -> f64 {
        self.min_scale
    }

    pub fn max_scale(&self) -> f64 {
        self.max_scale
    }

    /// Fitting never enlarges past this scale.
    pub fn fit_max_scale(&self) -> f64 {
        self.fit_max_scale
    }

    pub fn wheel_zoom_sensitivity(&self) -> f64 {
        self.wheel_zoom_sensitivity
    }

    pub fn zoom_step(&self) -> f64 {
        self.zoom_step
    }

    pub fn initial_scale(&self) -> f64 {
        self.initial_scale
    }

    pub fn transition_ms(&self) -> u32 {
        self.transition_ms
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewportConfigBuilder {
    config: ViewportConfig,
}

impl ViewportConfigBuilder {
    pub fn padding(mut self, padding: f64) -> Self {
        self.config.padding = padding;
        self
    }

    pub fn scale_range(mut self, min: f64, max: f64) -> Self {
        self.config.min_scale = min;
        self.config.max_scale = max;
        self
    }

    pub fn fit_max_scale(mut self, scale: f64) -> Self {
        self.config.fit_max_scale = scale;
        self
    }

    pub fn wheel_zoom_sensitivity(mut self, sensitivity: f64) -> Self {
        self.config.wheel_zoom_sensitivity = sensitivity;
        self
    }

    pub fn zoom_step(mut self, step: f64) -> Self {
        self.config.zoom_step = step;
        self
    }

    pub fn initial_scale(mut self, scale: f64) -> Self {
        self.config.initial_scale = scale;
        self
    }

    pub fn transition_ms(mut self, ms: u32) -> Self {
        self.config.transition_ms = ms;
        self
    }

    pub fn build(self) -> Result<ViewportConfig> {
        let c = self.config;
        let invalid = CertError::InvalidConfiguration;
        let values = [
            ("padding", c.padding),
            ("min_scale", c.min_scale),
            ("max_scale", c.max_scale),
            ("fit_max_scale", c.fit_max_scale),
            ("wheel_zoom_sensitivity", c.wheel_zoom_sensitivity),
            ("zoom_step", c.zoom_step),
            ("initial_scale", c.initial_scale),
        ];
        if let Some((name, value)) = values.iter().find(|(_, value)| !value.is_finite()) {
            return Err(invalid(format!("{name} must be finite, got {value}")));
        }
        if !(SCALE_FLOOR..=SCALE_CEILING).contains(&c.min_scale)
            || !(SCALE_FLOOR..=SCALE_CEILING).contains(&c.max_scale)
            || c.min_scale > c.max_scale
        {
            return Err(invalid(format!(
                "scale range must satisfy {SCALE_FLOOR} <= min <= max <= {SCALE_CEILING}, got [{}, {}]",
                c.min_scale, c.max_scale
            )));
        }
        if c.padding < 0.0 {
            return Err(invalid(format!("padding cannot be negative, got {}", c.padding)));
        }
        if c.fit_max_scale <= 0.0 || c.zoom_step <= 0.0 || c.wheel_zoom_sensitivity < 0.0 {
            return Err(invalid(format!(
                "fit_max_scale and zoom_step must be positive and sensitivity non-negative, got {}, {}, {}",
                c.fit_max_scale, c.zoom_step, c.wheel_zoom_sensitivity
            )));
        }
        Ok(c)
    }
}

/// Affine map from document coordinates to container coordinates:
/// `container = doc * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
}

impl ViewportTransform {
    pub fn to_container(&self, doc_x: f64, doc_y: f64) -> (f64, f64) {
        (
            doc_x * self.scale + self.offset_x,
            doc_y * self.scale + self.offset_y,
        )
    }

    pub fn to_document(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    /// Equivalent CSS transform for a top-left transform origin.
    pub fn css_transform(&self) -> String {
        format!(
            "translate({}px, {}px) scale({})",
            self.offset_x, self.offset_y, self.scale
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanState {
    Idle,
    /// Pointer position and offset when the drag began.
    Panning {
        pointer_x: f64,
        pointer_y: f64,
        origin_x: f64,
        origin_y: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelInput {
    pub delta_x: f64,
    pub delta_y: f64,
    pub ctrl: bool,
    pub meta: bool,
}

impl WheelInput {
    /// Ctrl (or Cmd) turns the wheel into a precision zoom; pinch gestures
    /// arrive this way too.
    pub fn wants_zoom(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WheelIntent {
    Zoom { delta: f64 },
    Pan { dx: f64, dy: f64 },
    Ignored,
}

/// Smoothing to apply when presenting the current transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    EaseOut { duration_ms: u32 },
}

impl Transition {
    pub fn css(&self) -> String {
        match self {
            Transition::None => "none".to_string(),
            Transition::EaseOut { duration_ms } => {
                format!("transform {}s ease-out", *duration_ms as f64 / 1000.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    config: ViewportConfig,
    transform: ViewportTransform,
    pan: PanState,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

impl ViewportController {
    pub fn new(config: ViewportConfig) -> Self {
        let mut controller = Self {
            config,
            transform: ViewportTransform {
                offset_x: 0.0,
                offset_y: 0.0,
                scale: 1.0,
            },
            pan: PanState::Idle,
        };
        controller.transform.scale = controller.clamp_scale(config.initial_scale);
        controller
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    pub fn pan_state(&self) -> PanState {
        self.pan
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.pan, PanState::Panning { .. })
    }

    fn clamp_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() {
            return self.transform.scale;
        }
        scale.max(self.config.min_scale).min(self.config.max_scale)
    }

    /// Scales the document to fit inside the padded container and centres it.
    pub fn fit_to_container(&mut self, width: f64, height: f64) -> ViewportTransform {
        if !width.is_finite() || !height.is_finite() {
            return self.transform;
        }
        let pad = self.config.padding * 2.0;
        let avail_w = (width - pad).max(0.0);
        let avail_h = (height - pad).max(0.0);
        let fit = (avail_w / DOC_WIDTH as f64)
            .min(avail_h / DOC_HEIGHT as f64)
            .min(self.config.fit_max_scale);
        let scale = self.clamp_scale(fit);
        self.transform = ViewportTransform {
            offset_x: (width - DOC_WIDTH as f64 * scale) / 2.0,
            offset_y: (height - DOC_HEIGHT as f64 * scale) / 2.0,
            scale,
        };
        log::debug!(
            "viewport fit to {width}x{height}: scale {:.4}",
            self.transform.scale
        );
        self.transform
    }

    /// Adds `delta` to the scale, leaving offsets alone.
    pub fn zoom_by(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        self.transform.scale = self.clamp_scale(self.transform.scale + delta);
    }

    /// Like [`zoom_by`](Self::zoom_by) but keeps the document point under the
    /// container point `(x, y)` stationary.
    pub fn zoom_by_at(&mut self, delta: f64, x: f64, y: f64) {
        if !delta.is_finite() || !x.is_finite() || !y.is_finite() {
            return;
        }
        let old = self.transform.scale;
        let new = self.clamp_scale(old + delta);
        if (new - old).abs() <= f64::EPSILON {
            return;
        }
        let (doc_x, doc_y) = self.transform.to_document(x, y);
        self.transform = ViewportTransform {
            offset_x: x - doc_x * new,
            offset_y: y - doc_y * new,
            scale: new,
        };
    }

    /// Wheel input with the precision-zoom modifier held.
    pub fn zoom_with_modifier(&mut self, wheel_delta_y: f64) {
        self.zoom_by(-wheel_delta_y * self.config.wheel_zoom_sensitivity);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        self.transform.offset_x += dx;
        self.transform.offset_y += dy;
    }

    /// Routes a wheel event to zoom or pan.
    pub fn handle_wheel(&mut self, input: WheelInput) -> WheelIntent {
        if !input.delta_x.is_finite() || !input.delta_y.is_finite() {
            return WheelIntent::Ignored;
        }
        if input.wants_zoom() {
            let delta = -input.delta_y * self.config.wheel_zoom_sensitivity;
            self.zoom_by(delta);
            WheelIntent::Zoom { delta }
        } else {
            let (dx, dy) = (-input.delta_x, -input.delta_y);
            self.pan_by(dx, dy);
            WheelIntent::Pan { dx, dy }
        }
    }

    /// Starts a drag. Only the primary button pans; returns whether a drag began.
    pub fn begin_pan(&mut self, button: PointerButton, x: f64, y: f64) -> bool {
        if button != PointerButton::Primary || !x.is_finite() || !y.is_finite() {
            return false;
        }
        self.pan = PanState::Panning {
            pointer_x: x,
            pointer_y: y,
            origin_x: self.transform.offset_x,
            origin_y: self.transform.offset_y,
        };
        true
    }

    /// Moves the document by the pointer's travel since [`begin_pan`](Self::begin_pan).
    /// The offset is always recomputed from the drag origin, so rounding does
    /// not accumulate across moves.
    pub fn update_pan(&mut self, x: f64, y: f64) {
        let PanState::Panning {
            pointer_x,
            pointer_y,
            origin_x,
            origin_y,
        } = self.pan
        else {
            return;
        };
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.transform.offset_x = origin_x + (x - pointer_x);
        self.transform.offset_y = origin_y + (y - pointer_y);
    }

    pub fn end_pan(&mut self) {
        self.pan = PanState::Idle;
    }

    /// The pointer left the interactive area; a held button must not leave
    /// the drag stuck.
    pub fn pointer_leave(&mut self) {
        self.end_pan();
    }

    pub fn zoom_in(&mut self) {
        self.zoom_by(self.config.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_by(-self.config.zoom_step);
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.transform.scale * 100.0).round() as u32
    }

    pub fn css_transform(&self) -> String {
        self.transform.css_transform()
    }

    pub fn transition(&self) -> Transition {
        if self.is_panning() {
            Transition::None
        } else {
            Transition::EaseOut {
                duration_ms: self.config.transition_ms,
            }
        }
    }

    pub fn to_container(&self, doc_x: f64, doc_y: f64) -> (f64, f64) {
        self.transform.to_container(doc_x, doc_y)
    }

    pub fn to_document(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.to_document(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn starts_idle_at_initial_scale() {
        let vp = ViewportController::default();
        assert_eq!(vp.pan_state(), PanState::Idle);
        assert!(close(vp.transform().scale, 0.8));
        assert_eq!(vp.zoom_percent(), 80);
    }

    #[test]
    fn fit_centres_document_inside_padding() {
        let mut vp = ViewportController::default();
        for (w, h) in [(800.0, 600.0), (1920.0, 1080.0), (500.0, 1200.0), (1300.0, 700.0)] {
            let t = vp.fit_to_container(w, h);
            assert!(close(t.offset_x, (w - 1122.0 * t.scale) / 2.0));
            assert!(close(t.offset_y, (h - 794.0 * t.scale) / 2.0));
            assert!(t.scale <= 1.0);
            assert!(t.offset_x >= 40.0 - 1e-9, "{w}x{h}: {t:?}");
            assert!(t.offset_y >= 40.0 - 1e-9, "{w}x{h}: {t:?}");
        }
    }

    #[test]
    fn fit_never_enlarges_past_natural_size() {
        let mut vp = ViewportController::default();
        let t = vp.fit_to_container(4000.0, 3000.0);
        assert!(close(t.scale, 1.0));
        assert!(close(t.offset_x, (4000.0 - 1122.0) / 2.0));
    }

    #[test]
    fn fit_into_tiny_container_still_clamps() {
        let mut vp = ViewportController::default();
        let t = vp.fit_to_container(50.0, 30.0);
        assert!(close(t.scale, 0.1));
        assert!(close(t.offset_x, (50.0 - 112.2) / 2.0));
    }

    #[test]
    fn scale_stays_in_range_for_any_zoom_sequence() {
        let mut vp = ViewportController::default();
        let deltas = [5.0, -0.3, -100.0, 0.05, 2.9, 1e9, -1e-3, f64::NAN, f64::INFINITY, -7.5];
        for delta in deltas {
            vp.zoom_by(delta);
            let s = vp.transform().scale;
            assert!((0.1..=3.0).contains(&s), "{delta} -> {s}");
            vp.zoom_with_modifier(delta * 1000.0);
            let s = vp.transform().scale;
            assert!((0.1..=3.0).contains(&s), "{delta} -> {s}");
        }
    }

    #[test]
    fn zoom_by_keeps_offsets() {
        let mut vp = ViewportController::default();
        vp.fit_to_container(1200.0, 900.0);
        let before = vp.transform();
        vp.zoom_in();
        let after = vp.transform();
        assert_eq!(after.offset_x, before.offset_x);
        assert_eq!(after.offset_y, before.offset_y);
        assert!(close(after.scale, before.scale + 0.1));
    }

    #[test]
    fn zoom_at_keeps_point_under_cursor() {
        let mut vp = ViewportController::default();
        vp.fit_to_container(1200.0, 900.0);
        let doc_before = vp.to_document(300.0, 250.0);
        vp.zoom_by_at(0.5, 300.0, 250.0);
        let doc_after = vp.to_document(300.0, 250.0);
        assert!(close(doc_before.0, doc_after.0));
        assert!(close(doc_before.1, doc_after.1));
    }

    #[test]
    fn wheel_without_modifier_pans() {
        let mut vp = ViewportController::default();
        let before = vp.transform();
        let intent = vp.handle_wheel(WheelInput {
            delta_x: 10.0,
            delta_y: -25.0,
            ..WheelInput::default()
        });
        assert_eq!(intent, WheelIntent::Pan { dx: -10.0, dy: 25.0 });
        let after = vp.transform();
        assert_eq!(after.offset_x, before.offset_x - 10.0);
        assert_eq!(after.offset_y, before.offset_y + 25.0);
        assert_eq!(after.scale, before.scale);
    }

    #[test]
    fn wheel_with_modifier_zooms() {
        let mut vp = ViewportController::default();
        let intent = vp.handle_wheel(WheelInput {
            delta_y: -100.0,
            ctrl: true,
            ..WheelInput::default()
        });
        assert!(matches!(intent, WheelIntent::Zoom { delta } if close(delta, 0.1)));
        assert!(close(vp.transform().scale, 0.9));

        let intent = vp.handle_wheel(WheelInput {
            delta_y: 200.0,
            meta: true,
            ..WheelInput::default()
        });
        assert!(matches!(intent, WheelIntent::Zoom { .. }));
        assert!(close(vp.transform().scale, 0.7));
    }

    #[test]
    fn pan_offset_tracks_pointer_delta_exactly() {
        let mut vp = ViewportController::default();
        vp.pan_by(12.25, -3.5);
        let start = vp.transform();
        assert!(vp.begin_pan(PointerButton::Primary, 400.0, 300.0));
        vp.update_pan(400.0 + 37.0, 300.0 - 12.5);
        let now = vp.transform();
        assert_eq!(now.offset_x, start.offset_x + 37.0);
        assert_eq!(now.offset_y, start.offset_y - 12.5);
        assert_eq!(vp.transition(), Transition::None);
        vp.end_pan();
        assert_eq!(vp.transition(), Transition::EaseOut { duration_ms: 100 });
    }

    #[test]
    fn non_primary_button_does_not_pan() {
        let mut vp = ViewportController::default();
        assert!(!vp.begin_pan(PointerButton::Secondary, 10.0, 10.0));
        assert!(!vp.begin_pan(PointerButton::Middle, 10.0, 10.0));
        let before = vp.transform();
        vp.update_pan(500.0, 500.0);
        assert_eq!(vp.transform(), before);
        assert!(!vp.is_panning());
    }

    #[test]
    fn end_pan_is_idempotent() {
        let mut vp = ViewportController::default();
        vp.end_pan();
        vp.end_pan();
        assert_eq!(vp.pan_state(), PanState::Idle);
        vp.begin_pan(PointerButton::Primary, 1.0, 1.0);
        vp.pointer_leave();
        assert_eq!(vp.pan_state(), PanState::Idle);
        vp.end_pan();
        assert_eq!(vp.pan_state(), PanState::Idle);
    }

    #[test]
    fn transform_maps_both_ways_and_formats_as_css() {
        let t = ViewportTransform {
            offset_x: 20.0,
            offset_y: -8.0,
            scale: 0.5,
        };
        assert_eq!(t.to_container(100.0, 100.0), (70.0, 42.0));
        assert_eq!(t.to_document(70.0, 42.0), (100.0, 100.0));
        assert_eq!(t.css_transform(), "translate(20px, -8px) scale(0.5)");
        assert_eq!(
            Transition::EaseOut { duration_ms: 100 }.css(),
            "transform 0.1s ease-out"
        );
    }

    #[test]
    fn config_builder_rejects_unusable_scale_ranges() {
        let inverted = ViewportConfig::builder().scale_range(2.0, 0.5).build();
        assert!(matches!(inverted, Err(CertError::InvalidConfiguration(_))));
        let too_wide = ViewportConfig::builder().scale_range(0.1, 10.0).build();
        assert!(matches!(too_wide, Err(CertError::InvalidConfiguration(_))));
        let too_small = ViewportConfig::builder().scale_range(0.01, 1.0).build();
        assert!(too_small.is_err());
        assert!(ViewportConfig::builder().zoom_step(0.0).build().is_err());
        assert!(ViewportConfig::builder().padding(f64::NAN).build().is_err());
        assert!(ViewportConfig::builder().padding(-1.0).build().is_err());
    }

    #[test]
    fn narrowed_scale_range_is_honoured() {
        let config = ViewportConfig::builder()
            .scale_range(0.5, 2.0)
            .initial_scale(0.2)
            .build()
            .unwrap();
        let mut vp = ViewportController::new(config);
        assert!(close(vp.transform().scale, 0.5));
        vp.zoom_by(9.0);
        assert!(close(vp.transform().scale, 2.0));
        vp.zoom_by(-9.0);
        assert!(close(vp.transform().scale, 0.5));
        vp.zoom_by_at(0.3, 100.0, 100.0);
        assert!(close(vp.transform().scale, 0.8));
    }

    #[test]
    fn pan_offset_is_origin_plus_pointer_travel() {
        let starts = [0.0, 13.37, -250.125, 1e4 + 0.1];
        let deltas = [0.3, -7.7, 123.456, -0.1, 1e-3, 999.999];
        for &px in &starts {
            for &dx in &deltas {
                let mut vp = ViewportController::default();
                vp.fit_to_container(1333.3, 777.7);
                let origin = vp.transform();
                vp.begin_pan(PointerButton::Primary, px, -px);
                for step in [0.25, 0.5, 1.0] {
                    let (x, y) = (px + dx * step, -px - dx * step);
                    vp.update_pan(x, y);
                    let now = vp.transform();
                    assert_eq!(now.offset_x, origin.offset_x + (x - px));
                    assert_eq!(now.offset_y, origin.offset_y + (y + px));
                }
            }
        }
    }
}
