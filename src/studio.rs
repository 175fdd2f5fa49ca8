//! One editing session: the model, the chosen layout, the viewport and the
//! export pipeline.

use crate::canvas::VisualTree;
use crate::error::Result;
use crate::export::{ExportOutcome, ExportPipeline};
use crate::model::{DocumentModel, FieldEdit, ModelStore, TemplateVariant};
use crate::raster::{SkiaRasterizer, rasterize_viewport};
use crate::template::render;
use crate::types::Color;
use crate::viewport::{ViewportConfig, ViewportController};
use std::future::Future;
use std::sync::Arc;
use tiny_skia::Pixmap;

/// Colour around the document in previews.
pub const PREVIEW_BACKDROP: Color = Color::from_hex(0xe5e7eb);

#[derive(Debug)]
pub struct Studio {
    store: ModelStore,
    variant: TemplateVariant,
    viewport: ViewportController,
    pipeline: ExportPipeline,
    rendered: Option<RenderedTree>,
}

#[derive(Debug)]
struct RenderedTree {
    version: u64,
    variant: TemplateVariant,
    tree: Arc<VisualTree>,
}

impl Studio {
    pub fn new(pipeline: ExportPipeline) -> Self {
        Self::with_parts(ModelStore::default(), ViewportConfig::default(), pipeline)
    }

    pub fn with_parts(store: ModelStore, viewport: ViewportConfig, pipeline: ExportPipeline) -> Self {
        Self {
            store,
            variant: TemplateVariant::default(),
            viewport: ViewportController::new(viewport),
            pipeline,
            rendered: None,
        }
    }

    pub fn model(&self) -> Arc<DocumentModel> {
        self.store.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn dispatch(&mut self, edit: FieldEdit) -> u64 {
        self.store.dispatch(edit)
    }

    /// Applies a form change by field name.
    pub fn edit_field(&mut self, name: &str, value: impl Into<String>) -> Result<u64> {
        let edit = FieldEdit::from_form(name, value)?;
        Ok(self.dispatch(edit))
    }

    pub fn template(&self) -> TemplateVariant {
        self.variant
    }

    pub fn set_template(&mut self, variant: TemplateVariant) {
        if self.variant != variant {
            log::debug!("template {} -> {}", self.variant.id(), variant.id());
            self.variant = variant;
        }
    }

    /// The display list for the current model and template. Re-rendered only
    /// when either has changed since the last call.
    pub fn render(&mut self) -> Arc<VisualTree> {
        let version = self.store.version();
        if let Some(cached) = &self.rendered {
            if cached.version == version && cached.variant == self.variant {
                return Arc::clone(&cached.tree);
            }
        }
        let tree = Arc::new(render(&self.store.snapshot(), self.variant));
        self.rendered = Some(RenderedTree {
            version,
            variant: self.variant,
            tree: Arc::clone(&tree),
        });
        tree
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn pipeline(&self) -> &ExportPipeline {
        &self.pipeline
    }

    /// True while an export runs; the export control should be disabled.
    pub fn is_exporting(&self) -> bool {
        self.pipeline.is_busy()
    }

    /// Paints what the viewport currently shows into a container-sized pixmap.
    pub fn preview(&mut self, rasterizer: &SkiaRasterizer, width: u32, height: u32) -> Result<Pixmap> {
        let tree = self.render();
        let (images, _) = rasterizer.load_images(&tree);
        rasterize_viewport(
            &tree,
            &self.viewport.transform(),
            width,
            height,
            PREVIEW_BACKDROP,
            rasterizer.fonts(),
            &images,
        )
    }

    /// Snapshots the current document and returns a future that exports it,
    /// so edits may continue while it runs.
    ///
    /// The future is lazy: the busy flag is taken on its first poll, not
    /// here. Hand it to `tokio::spawn` to run it in the background.
    pub fn export_task(&mut self) -> impl Future<Output = ExportOutcome> + Send + 'static {
        let tree = self.render();
        let student_name = self.store.snapshot().student_name.clone();
        let pipeline = self.pipeline.clone();
        async move { pipeline.run(VisualTree::clone(&tree), &student_name).await }
    }

    pub async fn request_export(&mut self) -> ExportOutcome {
        self.export_task().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetPolicy;
    use crate::error::CertError;
    use crate::export::{ExportOptions, MemorySink};
    use crate::font::FontRegistry;
    use crate::viewport::PointerButton;

    fn studio(sink: Arc<MemorySink>) -> Studio {
        let options = ExportOptions::builder()
            .oversample(0.25)
            .use_system_fonts(false)
            .build()
            .unwrap();
        Studio::new(ExportPipeline::new(options, sink).unwrap())
    }

    #[test]
    fn edits_rerender_with_the_latest_model() {
        let mut studio = studio(Arc::new(MemorySink::new()));
        let first = studio.render();
        assert!(Arc::ptr_eq(&first, &studio.render()));

        assert_eq!(studio.edit_field("studentName", "王五").unwrap(), 1);
        let second = studio.render();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.slot("student_name").as_deref(), Some("王五"));

        studio.set_template(TemplateVariant::Modern);
        assert!(studio.render().has_layer("accent"));

        assert!(matches!(
            studio.edit_field("nickname", "x"),
            Err(CertError::UnknownField(_))
        ));
        assert_eq!(studio.version(), 1);
    }

    #[test]
    fn issue_date_slots_agree_across_templates() {
        let mut studio = studio(Arc::new(MemorySink::new()));
        studio.edit_field("issueDate", "2025-12-23").unwrap();
        for variant in TemplateVariant::ALL {
            studio.set_template(variant);
            let tree = studio.render();
            assert_eq!(tree.slot("issue_year").as_deref(), Some("2025"), "{variant:?}");
            assert_eq!(tree.slot("issue_month").as_deref(), Some("12"), "{variant:?}");
            assert_eq!(tree.slot("issue_day").as_deref(), Some("23"), "{variant:?}");
        }
    }

    #[test]
    fn preview_follows_the_viewport() {
        let mut studio = studio(Arc::new(MemorySink::new()));
        studio.viewport_mut().fit_to_container(640.0, 480.0);
        let rasterizer = SkiaRasterizer::new(
            Arc::new(FontRegistry::without_system_fonts()),
            AssetPolicy::default(),
        );
        let pixmap = studio.preview(&rasterizer, 640, 480).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (640, 480));
        let corner = pixmap.pixel(2, 2).unwrap().demultiply();
        assert_eq!((corner.red(), corner.green(), corner.blue()), (0xe5, 0xe7, 0xeb));
    }

    #[tokio::test]
    async fn export_ignores_viewport_and_names_file_after_student() {
        let sink = Arc::new(MemorySink::new());
        let mut studio = studio(sink.clone());
        studio.viewport_mut().zoom_by(1.7);
        studio.viewport_mut().begin_pan(PointerButton::Primary, 10.0, 10.0);
        studio.viewport_mut().update_pan(300.0, -50.0);

        let outcome = studio.request_export().await;
        let ExportOutcome::Delivered(report) = outcome else {
            panic!("expected delivery, got {outcome:?}");
        };
        assert_eq!(report.pixel_size, (281, 199));
        assert_eq!(sink.filenames(), vec!["张三_结业证书.pdf".to_string()]);
        assert!(!studio.is_exporting());
        assert!(studio.viewport().is_panning());
    }

    #[tokio::test]
    async fn export_task_snapshots_the_model() {
        let sink = Arc::new(MemorySink::new());
        let mut studio = studio(sink.clone());
        let task = studio.export_task();
        studio.edit_field("studentName", "赵六").unwrap();
        assert!(!studio.is_exporting());
        let handle = tokio::spawn(task);
        assert!(handle.await.unwrap().is_delivered());
        assert!(!studio.is_exporting());
        assert_eq!(sink.filenames(), vec!["张三_结业证书.pdf".to_string()]);
    }
}
