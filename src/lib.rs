//! Course completion certificates: three fixed-size layouts, a pan/zoom
//! preview viewport and a capture → encode → compose → deliver PDF export.

mod assets;
mod canvas;
mod encode;
mod error;
mod export;
mod font;
mod model;
mod pdf;
mod raster;
mod studio;
mod suggest;
mod template;
mod types;
mod viewport;

pub use assets::{
    AssetPolicy, AssetSource, ImageStore, RemoteFetcher, SkippedAsset, decode_image_to_pixmap,
    parse_data_uri, preload,
};
pub use canvas::{
    Canvas, Command, FontFamily, FontWeight, ImageFit, META_LAYER_KEY, META_SLOT_PREFIX, TextAlign,
    TextRun, TextStyle, VisualTree,
};
pub use encode::{EncodedImage, ImageFormat, encode};
pub use error::{CertError, Result};
pub use export::{
    BusyGuard, DEFAULT_FILENAME_SUFFIX, ExportFailure, ExportGate, ExportNotice, ExportOptions,
    ExportOptionsBuilder, ExportOutcome, ExportPipeline, ExportReport, ExportStage,
    FAILURE_NOTICE, FileSink, MemorySink, SaveSink, filename_for, sanitize_filename,
};
pub use font::{
    FONT_DIR_ENV, FontFace, FontRegistry, FontStack, ShapedGlyph, ShapedRun, fallback_advance,
    is_wide,
};
pub use model::{DateParts, DocumentModel, FieldEdit, ModelStore, TemplateVariant};
pub use pdf::{PdfMetadata, compose_single_page};
pub use raster::{
    Capture, Rasterizer, SkiaRasterizer, capture_size, rasterize, rasterize_viewport,
};
pub use studio::{PREVIEW_BACKDROP, Studio};
pub use suggest::{
    CompletionBackend, CompletionRequest, CourseSuggester, MAX_SUGGESTIONS, SuggestError,
    parse_suggestions, suggestion_request,
};
pub use template::render;
pub use types::{Color, DOC_HEIGHT, DOC_WIDTH, Px, Rect, Size};
pub use viewport::{
    PanState, PointerButton, Transition, ViewportConfig, ViewportConfigBuilder, ViewportController,
    ViewportTransform, WheelInput, WheelIntent,
};
