//! Compose stage: one raster image placed full-bleed on a single page.

use crate::encode::{EncodedImage, ImageFormat};
use crate::error::{CertError, Result};
use crate::types::Size;
use chrono::{DateTime, Utc};
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, StringFormat, dictionary};

const IMAGE_NAME: &str = "Im1";

/// Document Info entries written into the composed file.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub producer: String,
    pub created: Option<DateTime<Utc>>,
}

impl Default for PdfMetadata {
    fn default() -> Self {
        Self {
            title: None,
            producer: format!("certpress {}", env!("CARGO_PKG_VERSION")),
            created: None,
        }
    }
}

impl PdfMetadata {
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn created_at(mut self, when: DateTime<Utc>) -> Self {
        self.created = Some(when);
        self
    }
}

/// Writes a one-page PDF of `page` size (points) whose only content is
/// `image` stretched to the page edges.
///
/// The image is not letterboxed; callers keep the raster aspect equal to the
/// page aspect.
pub fn compose_single_page(image: &EncodedImage, page: Size, meta: &PdfMetadata) -> Result<Vec<u8>> {
    let (page_w, page_h) = (page.width.to_f32(), page.height.to_f32());
    if !(page_w > 0.0 && page_h > 0.0) {
        return Err(CertError::Compose(format!(
            "page size must be positive, got {page_w}x{page_h}"
        )));
    }
    if image.width == 0 || image.height == 0 {
        return Err(CertError::Compose("image has no pixels".to_string()));
    }
    let image_aspect = image.width as f32 / image.height as f32;
    let page_aspect = page_w / page_h;
    if (image_aspect / page_aspect - 1.0).abs() > 0.01 {
        log::warn!(
            "raster aspect {image_aspect:.4} differs from page aspect {page_aspect:.4}; output will be stretched"
        );
    }

    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(image_xobject(image)?);
    let content = format!("q {page_w:.2} 0 0 {page_h:.2} 0 0 cm /{IMAGE_NAME} Do Q\n").into_bytes();
    let content_id = doc.add_object(LoStream::new(dictionary! {}, content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_NAME => image_id,
            },
        },
        "MediaBox" => vec![
            LoObject::Integer(0),
            LoObject::Integer(0),
            LoObject::Real(page_w),
            LoObject::Real(page_h),
        ],
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![LoObject::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut info = dictionary! {
        "Producer" => LoObject::string_literal(meta.producer.as_str()),
    };
    if let Some(title) = meta.title.as_deref() {
        info.set("Title", text_string(title));
    }
    if let Some(created) = meta.created {
        let stamp = created.format("D:%Y%m%d%H%M%SZ").to_string();
        info.set("CreationDate", LoObject::string_literal(stamp));
    }
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", info_id);

    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    log::debug!(
        "composed {:.2}x{:.2}pt page around {}x{} {} ({} bytes)",
        page_w,
        page_h,
        image.width,
        image.height,
        image.format.mime(),
        out.len()
    );
    Ok(out)
}

fn image_xobject(image: &EncodedImage) -> Result<LoStream> {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    match image.format {
        ImageFormat::Jpeg { .. } => {
            let mut dict = dict;
            dict.set("Filter", "DCTDecode");
            let mut stream = LoStream::new(dict, image.bytes.clone());
            stream.allows_compression = false;
            Ok(stream)
        }
        ImageFormat::Png => {
            // PDF has no PNG filter; embed raw samples and let compress() flate them.
            let decoded = image::load_from_memory_with_format(&image.bytes, image::ImageFormat::Png)
                .map_err(|err| CertError::Compose(format!("png payload unreadable: {err}")))?
                .to_rgb8();
            if decoded.dimensions() != (image.width, image.height) {
                return Err(CertError::Compose(format!(
                    "png is {}x{}, expected {}x{}",
                    decoded.width(),
                    decoded.height(),
                    image.width,
                    image.height
                )));
            }
            Ok(LoStream::new(dict, decoded.into_raw()))
        }
    }
}

/// PDF text string: UTF-16BE with a byte order mark.
fn text_string(text: &str) -> LoObject {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    LoObject::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use tiny_skia::Pixmap;

    fn raster(w: u32, h: u32) -> Pixmap {
        let mut pixmap = Pixmap::new(w, h).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(250, 240, 220, 255));
        pixmap
    }

    fn first_page(doc: &LoDocument) -> lopdf::Dictionary {
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        doc.get_dictionary(page_id).unwrap().clone()
    }

    fn image_stream(doc: &LoDocument) -> LoStream {
        let page = first_page(doc);
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let id = xobjects.get(b"Im1").unwrap().as_reference().unwrap();
        doc.get_object(id).unwrap().as_stream().unwrap().clone()
    }

    #[test]
    fn png_is_placed_on_one_a4_landscape_page() {
        let image = encode(&raster(112, 79), ImageFormat::Png).unwrap();
        let meta = PdfMetadata::default().titled("张三 结业证书");
        let bytes = compose_single_page(&image, Size::a4_landscape(), &meta).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));

        let mut doc = LoDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let media_box = first_page(&doc).get(b"MediaBox").unwrap().as_array().unwrap().clone();
        let w = media_box[2].as_float().unwrap();
        let h = media_box[3].as_float().unwrap();
        assert!((w - 841.89).abs() < 0.05, "{w}");
        assert!((h - 595.28).abs() < 0.05, "{h}");

        let stream = image_stream(&doc);
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 112);
        assert_eq!(stream.dict.get(b"Height").unwrap().as_i64().unwrap(), 79);
        assert_eq!(stream.decompressed_content().unwrap().len(), 112 * 79 * 3);

        doc.decompress();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let content = String::from_utf8(doc.get_page_content(page_id).unwrap()).unwrap();
        assert!(content.contains("/Im1 Do"), "{content}");
        assert!(content.contains("841.89 0 0 595.28 0 0 cm"), "{content}");
    }

    #[test]
    fn jpeg_is_embedded_without_recompression() {
        let image = encode(&raster(40, 28), ImageFormat::Jpeg { quality: 85 }).unwrap();
        let bytes = compose_single_page(&image, Size::a4_landscape(), &PdfMetadata::default()).unwrap();
        let doc = LoDocument::load_mem(&bytes).unwrap();
        let stream = image_stream(&doc);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(stream.content, image.bytes);
    }

    #[test]
    fn info_carries_utf16_title_and_producer() {
        let image = encode(&raster(8, 6), ImageFormat::Png).unwrap();
        let meta = PdfMetadata::default().titled("张三 结业证书");
        let bytes = compose_single_page(&image, Size::a4_landscape(), &meta).unwrap();
        let doc = LoDocument::load_mem(&bytes).unwrap();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_id).unwrap();
        let title = info.get(b"Title").unwrap().as_str().unwrap();
        assert_eq!(&title[..2], &[0xFE, 0xFF]);
        let units: Vec<u16> = title[2..]
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), "张三 结业证书");
        let producer = info.get(b"Producer").unwrap().as_str().unwrap();
        assert!(producer.starts_with(b"certpress"));
    }

    #[test]
    fn degenerate_page_is_a_compose_error() {
        let image = encode(&raster(8, 6), ImageFormat::Png).unwrap();
        let err = compose_single_page(&image, Size::from_mm(0.0, 210.0), &PdfMetadata::default())
            .unwrap_err();
        assert!(matches!(err, CertError::Compose(_)));
    }
}
