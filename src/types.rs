use fixed::types::I32F32;

/// Logical document width in units (A4 landscape at the reference density).
pub const DOC_WIDTH: f32 = 1122.0;
/// Logical document height in units.
pub const DOC_HEIGHT: f32 = 794.0;

/// A logical unit on the fixed document canvas.
///
/// Stored as fixed point so layout arithmetic is exact and repeatable; two
/// renders of the same model produce bit-identical display lists.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Px(I32F32);

impl Px {
    pub const ZERO: Px = Px(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Px {
        if !value.is_finite() {
            return Px::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Px::from_milli_i64(milli)
    }

    pub fn from_i32(value: i32) -> Px {
        Px::from_milli_i64((value as i64) * 1000)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn max(self, other: Px) -> Px {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Px) -> Px {
        if self <= other { self } else { other }
    }

    pub fn from_milli_i64(milli: i64) -> Px {
        Px::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Px {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Px(I32F32::from_bits(bits))
    }
}

impl std::ops::Add for Px {
    type Output = Px;
    fn add(self, rhs: Px) -> Px {
        Px::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Sub for Px {
    type Output = Px;
    fn sub(self, rhs: Px) -> Px {
        Px::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Mul<i32> for Px {
    type Output = Px;
    fn mul(self, rhs: i32) -> Px {
        let milli = self.to_milli_i64() as i128;
        Px::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Div<i32> for Px {
    type Output = Px;
    fn div(self, rhs: i32) -> Px {
        if rhs == 0 {
            return Px::ZERO;
        }
        let num = self.to_milli_i64() as i128;
        let den = rhs as i128;
        let den_abs = den.abs();
        let value = if num >= 0 {
            (num + (den_abs / 2)) / den
        } else {
            -(((-num) + (den_abs / 2)) / den)
        };
        Px::from_milli_i128(value)
    }
}

impl std::ops::Neg for Px {
    type Output = Px;
    fn neg(self) -> Px {
        Px::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Px,
    pub height: Px,
}

impl Size {
    /// The fixed logical certificate canvas, 1122x794 units.
    pub fn document() -> Self {
        Self {
            width: Px::from_f32(DOC_WIDTH),
            height: Px::from_f32(DOC_HEIGHT),
        }
    }

    /// A4 landscape in PDF points (297mm x 210mm at 72pt/in).
    pub fn a4_landscape() -> Self {
        Self::from_mm(297.0, 210.0)
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width: Px::from_f32(width_mm * 72.0 / 25.4),
            height: Px::from_f32(height_mm * 72.0 / 25.4),
        }
    }

    pub fn aspect_ratio(self) -> f32 {
        let h = self.height.to_f32();
        if h == 0.0 {
            return 0.0;
        }
        self.width.to_f32() / h
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: Px,
    pub y: Px,
    pub width: Px,
    pub height: Px,
}

impl Rect {
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x: Px::from_f32(x),
            y: Px::from_f32(y),
            width: Px::from_f32(width),
            height: Px::from_f32(height),
        }
    }

    /// Shrinks the rect by `amount` on every side (CSS `inset`).
    pub fn inset(self, amount: f32) -> Self {
        let d = Px::from_f32(amount);
        Self {
            x: self.x + d,
            y: self.y + d,
            width: (self.width - d * 2).max(Px::ZERO),
            height: (self.height - d * 2).max(Px::ZERO),
        }
    }

    pub fn right(self) -> Px {
        self.x + self.width
    }

    pub fn bottom(self) -> Px {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_arithmetic_is_exact_in_milli_units() {
        let a = Px::from_f32(0.1);
        let b = Px::from_f32(0.2);
        assert_eq!((a + b).to_milli_i64(), 300);
        assert_eq!((Px::from_i32(10) / 3).to_milli_i64(), 3333);
        assert_eq!((-Px::from_i32(2)).to_milli_i64(), -2000);
        assert_eq!(Px::from_f32(f32::NAN), Px::ZERO);
    }

    #[test]
    fn document_and_page_share_aspect_ratio() {
        let doc = Size::document();
        let page = Size::a4_landscape();
        assert!((doc.aspect_ratio() - page.aspect_ratio()).abs() < 0.002);
        assert!((page.width.to_f32() - 841.89).abs() < 0.01);
        assert!((page.height.to_f32() - 595.28).abs() < 0.01);
    }

    #[test]
    fn inset_shrinks_all_sides() {
        let rect = Rect::from_xywh(0.0, 0.0, 1122.0, 794.0).inset(16.0);
        assert_eq!(rect.x.to_milli_i64(), 16_000);
        assert_eq!(rect.width.to_milli_i64(), 1_090_000);
        assert_eq!(rect.bottom().to_milli_i64(), 778_000);
    }

    #[test]
    fn hex_colors_decode_channels() {
        let c = Color::from_hex(0x8b0000);
        assert!((c.r - 139.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.g, 0.0);
        assert_eq!(c.b, 0.0);
    }
}
