use crate::error::{CertError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tiny_skia::Pixmap;

/// Portable raster format produced by the encode stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    /// Quality is 1..=100.
    Jpeg { quality: u8 },
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ImageFormat::Jpeg { quality } if !(1..=100).contains(quality) => {
                Err(CertError::InvalidConfiguration(format!(
                    "jpeg quality must be within 1..=100, got {quality}"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn data_uri(&self) -> String {
        use base64::Engine;
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{payload}", self.format.mime())
    }
}

pub fn encode(pixmap: &Pixmap, format: ImageFormat) -> Result<EncodedImage> {
    format.validate()?;
    let (width, height) = (pixmap.width(), pixmap.height());
    let bytes = match format {
        ImageFormat::Png => pixmap
            .encode_png()
            .map_err(|err| CertError::Encode(format!("png: {err}")))?,
        ImageFormat::Jpeg { quality } => {
            let rgb = opaque_rgb(pixmap);
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, quality).write_image(
                &rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
            out
        }
    };
    log::debug!(
        "encoded {width}x{height} raster as {} ({} bytes)",
        format.mime(),
        bytes.len()
    );
    Ok(EncodedImage {
        format,
        width,
        height,
        bytes,
    })
}

/// Un-premultiplied RGB with alpha dropped; captures are painted on an
/// opaque backdrop.
pub(crate) fn opaque_rgb(pixmap: &Pixmap) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixmap.pixels().len() * 3);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        rgb.extend_from_slice(&[c.red(), c.green(), c.blue()]);
    }
    rgb
}
