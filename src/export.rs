//! Capture, encode, compose and deliver, one export at a time.

use crate::assets::{AssetPolicy, RemoteFetcher, SkippedAsset};
use crate::canvas::VisualTree;
use crate::encode::{ImageFormat, encode};
use crate::error::{CertError, Result};
use crate::font::FontRegistry;
use crate::pdf::{PdfMetadata, compose_single_page};
use crate::raster::{Rasterizer, SkiaRasterizer};
use crate::types::{Color, Size};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const DEFAULT_FILENAME_SUFFIX: &str = "结业证书";

/// The one message shown for any failed export.
pub const FAILURE_NOTICE: &str = "PDF生成失败，请重试";

const MAX_OVERSAMPLE: f32 = 8.0;

#[derive(Clone)]
pub struct ExportOptions {
    oversample: f32,
    image_format: ImageFormat,
    page_size: Size,
    filename_suffix: String,
    background: Color,
    asset_policy: AssetPolicy,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    use_system_fonts: bool,
    remote_fetcher: Option<Arc<dyn RemoteFetcher>>,
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("oversample", &self.oversample)
            .field("image_format", &self.image_format)
            .field("page_size", &self.page_size)
            .field("filename_suffix", &self.filename_suffix)
            .field("background", &self.background)
            .field("asset_policy", &self.asset_policy)
            .field("font_dirs", &self.font_dirs)
            .field("font_files", &self.font_files)
            .field("use_system_fonts", &self.use_system_fonts)
            .field("remote_fetcher", &self.remote_fetcher.is_some())
            .finish()
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            oversample: 2.0,
            image_format: ImageFormat::Png,
            page_size: Size::a4_landscape(),
            filename_suffix: DEFAULT_FILENAME_SUFFIX.to_string(),
            background: Color::WHITE,
            asset_policy: AssetPolicy::default(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            use_system_fonts: true,
            remote_fetcher: None,
        }
    }
}

impl ExportOptions {
    pub fn builder() -> ExportOptionsBuilder {
        ExportOptionsBuilder::default()
    }

    pub fn oversample(&self) -> f32 {
        self.oversample
    }

    pub fn image_format(&self) -> ImageFormat {
        self.image_format
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn filename_suffix(&self) -> &str {
        &self.filename_suffix
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn asset_policy(&self) -> &AssetPolicy {
        &self.asset_policy
    }

    pub fn remote_fetcher(&self) -> Option<&Arc<dyn RemoteFetcher>> {
        self.remote_fetcher.as_ref()
    }

    /// Builds the font registry captures paint text with.
    pub fn font_registry(&self) -> Result<FontRegistry> {
        let mut registry = if self.use_system_fonts {
            FontRegistry::new()
        } else {
            FontRegistry::without_system_fonts()
        };
        for dir in &self.font_dirs {
            let added = registry.register_dir(dir);
            log::debug!("registered {added} fonts from {}", dir.display());
        }
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        Ok(registry)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptionsBuilder {
    options: ExportOptions,
}

impl ExportOptionsBuilder {
    pub fn oversample(mut self, factor: f32) -> Self {
        self.options.oversample = factor;
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.options.image_format = format;
        self
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.options.page_size = size;
        self
    }

    pub fn filename_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.filename_suffix = suffix.into();
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.options.background = color;
        self
    }

    pub fn asset_policy(mut self, policy: AssetPolicy) -> Self {
        self.options.asset_policy = policy;
        self
    }

    pub fn font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.font_dirs.push(path.into());
        self
    }

    pub fn font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.font_files.push(path.into());
        self
    }

    pub fn use_system_fonts(mut self, enabled: bool) -> Self {
        self.options.use_system_fonts = enabled;
        self
    }

    /// Downloads images from hosts the asset policy permits. Without one,
    /// remote images are skipped.
    pub fn remote_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.options.remote_fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Result<ExportOptions> {
        let options = self.options;
        if !options.oversample.is_finite()
            || options.oversample <= 0.0
            || options.oversample > MAX_OVERSAMPLE
        {
            return Err(CertError::InvalidConfiguration(format!(
                "oversample must be within (0, {MAX_OVERSAMPLE}], got {}",
                options.oversample
            )));
        }
        options.image_format.validate()?;
        if options.page_size.width.to_f32() <= 0.0 || options.page_size.height.to_f32() <= 0.0 {
            return Err(CertError::InvalidConfiguration(
                "page size must be positive".to_string(),
            ));
        }
        if options.filename_suffix.contains(['/', '\\']) {
            return Err(CertError::InvalidConfiguration(format!(
                "filename suffix cannot contain path separators: {:?}",
                options.filename_suffix
            )));
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExportStage {
    Capture,
    Encode,
    Compose,
    Deliver,
}

impl ExportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Capture => "capture",
            ExportStage::Encode => "encode",
            ExportStage::Compose => "compose",
            ExportStage::Deliver => "deliver",
        }
    }

    fn error(&self, message: String) -> CertError {
        match self {
            ExportStage::Capture => CertError::Capture(message),
            ExportStage::Encode => CertError::Encode(message),
            ExportStage::Compose => CertError::Compose(message),
            ExportStage::Deliver => CertError::Deliver(message),
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("export failed at {stage}: {source}")]
pub struct ExportFailure {
    pub stage: ExportStage,
    #[source]
    pub source: CertError,
}

/// What a successful export produced.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub filename: String,
    pub bytes: usize,
    pub sha256: String,
    pub pixel_size: (u32, u32),
    /// Wall time per stage, in milliseconds.
    pub stage_ms: BTreeMap<&'static str, f64>,
    pub missing_glyphs: Vec<char>,
    pub skipped_assets: Vec<SkippedAsset>,
}

impl ExportReport {
    pub fn is_degraded(&self) -> bool {
        !self.missing_glyphs.is_empty() || !self.skipped_assets.is_empty()
    }
}

/// The single user-facing message for a failed export plus what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNotice {
    pub message: &'static str,
    pub stage: ExportStage,
    pub detail: String,
}

#[derive(Debug)]
pub enum ExportOutcome {
    Delivered(ExportReport),
    Failed(ExportNotice),
    /// Another export was still running; nothing was attempted.
    Refused,
}

impl ExportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ExportOutcome::Delivered(_))
    }
}

/// Single in-flight export flag.
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    busy: Arc<AtomicBool>,
}

impl ExportGate {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Marks the gate busy, or returns `None` when it already is.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(&self.busy),
            })
    }
}

/// Clears the busy flag when dropped, whatever the export's outcome.
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Where finished PDFs go.
pub trait SaveSink: Send + Sync {
    /// Stores `bytes` under `filename`, all or nothing.
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes into a directory through a temporary file renamed into place.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(sanitize_filename(filename))
    }
}

impl SaveSink for FileSink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        let target = self.path_for(filename);
        let partial = self
            .dir
            .join(format!(".{}.{}.partial", sanitize_filename(filename), std::process::id()));
        let written = std::fs::write(&partial, bytes).and_then(|_| std::fs::rename(&partial, &target));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&partial);
            return Err(CertError::Deliver(format!("{}: {err}", target.display())));
        }
        log::debug!("wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}

/// Keeps saved files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.saved().into_iter().map(|(name, _)| name).collect()
    }
}

impl SaveSink for MemorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| CertError::Deliver("memory sink poisoned".to_string()))?;
        saved.push((filename.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// `<studentName>_<suffix>.pdf`, with the name taken verbatim.
pub fn filename_for(student_name: &str, suffix: &str) -> String {
    format!("{student_name}_{suffix}.pdf")
}

/// Replaces path separators and control characters so the name stays
/// inside the target directory.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        trimmed if trimmed.starts_with('.') => format!("_{}", &trimmed[1..]),
        trimmed => trimmed.to_string(),
    }
}

/// Runs exports of rendered certificates. Cloning shares the busy gate.
#[derive(Clone)]
pub struct ExportPipeline {
    options: Arc<ExportOptions>,
    rasterizer: Arc<dyn Rasterizer>,
    sink: Arc<dyn SaveSink>,
    gate: ExportGate,
}

impl fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("options", &self.options)
            .field("busy", &self.gate.is_busy())
            .finish_non_exhaustive()
    }
}

impl ExportPipeline {
    /// A pipeline painting with tiny-skia and the fonts named in `options`.
    pub fn new(options: ExportOptions, sink: Arc<dyn SaveSink>) -> Result<Self> {
        let fonts = Arc::new(options.font_registry()?);
        let mut rasterizer = SkiaRasterizer::new(fonts, options.asset_policy().clone());
        if let Some(fetcher) = options.remote_fetcher() {
            rasterizer = rasterizer.with_fetcher(Arc::clone(fetcher));
        }
        Ok(Self::with_rasterizer(options, Arc::new(rasterizer), sink))
    }

    pub fn with_rasterizer(
        options: ExportOptions,
        rasterizer: Arc<dyn Rasterizer>,
        sink: Arc<dyn SaveSink>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            rasterizer,
            sink,
            gate: ExportGate::default(),
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Exports `tree` unless another export is running. Never returns an
    /// error: failures become a single [`ExportNotice`].
    ///
    /// Inside a tokio runtime each stage runs on the blocking pool. Polled by
    /// any other executor the stages run inline on the polling thread.
    pub async fn run(&self, tree: VisualTree, student_name: &str) -> ExportOutcome {
        let Some(_busy) = self.gate.try_acquire() else {
            log::debug!("export refused: another export is in flight");
            return ExportOutcome::Refused;
        };
        match self.export(tree, student_name).await {
            Ok(report) => ExportOutcome::Delivered(report),
            Err(failure) => {
                log::error!("{failure}");
                ExportOutcome::Failed(ExportNotice {
                    message: FAILURE_NOTICE,
                    stage: failure.stage,
                    detail: failure.source.to_string(),
                })
            }
        }
    }

    /// The four stages without the busy gate. Nothing is saved unless every
    /// earlier stage succeeded.
    pub async fn export(
        &self,
        tree: VisualTree,
        student_name: &str,
    ) -> std::result::Result<ExportReport, ExportFailure> {
        let mut stage_ms = BTreeMap::new();
        let options = Arc::clone(&self.options);

        let rasterizer = Arc::clone(&self.rasterizer);
        let (oversample, background) = (options.oversample, options.background);
        let capture = run_stage(ExportStage::Capture, &mut stage_ms, move || {
            rasterizer.capture(&tree, oversample, background)
        })
        .await?;
        let pixel_size = capture.pixel_size();
        if !capture.missing_glyphs.is_empty() {
            let sample: String = capture.missing_glyphs.iter().take(16).collect();
            log::warn!(
                "{} characters had no font and were left blank: {sample}",
                capture.missing_glyphs.len()
            );
        }
        let missing_glyphs = capture.missing_glyphs;
        let skipped_assets = capture.skipped_assets;

        let pixmap = capture.pixmap;
        let format = options.image_format;
        let encoded = run_stage(ExportStage::Encode, &mut stage_ms, move || {
            encode(&pixmap, format)
        })
        .await?;

        let meta = PdfMetadata::default()
            .titled(format!("{student_name} {}", options.filename_suffix))
            .created_at(chrono::Utc::now());
        let page = options.page_size;
        let pdf = run_stage(ExportStage::Compose, &mut stage_ms, move || {
            compose_single_page(&encoded, page, &meta)
        })
        .await?;

        let filename = filename_for(student_name, &options.filename_suffix);
        let sha256 = sha256_hex(&pdf);
        let bytes = pdf.len();
        let sink = Arc::clone(&self.sink);
        let save_name = filename.clone();
        run_stage(ExportStage::Deliver, &mut stage_ms, move || {
            sink.save(&save_name, &pdf)
        })
        .await?;

        log::info!("exported {filename} ({bytes} bytes, sha256 {sha256})");
        Ok(ExportReport {
            filename,
            bytes,
            sha256,
            pixel_size,
            stage_ms,
            missing_glyphs,
            skipped_assets,
        })
    }
}

async fn run_stage<T, F>(
    stage: ExportStage,
    timings: &mut BTreeMap<&'static str, f64>,
    work: F,
) -> std::result::Result<T, ExportFailure>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let joined = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle
            .spawn_blocking(work)
            .await
            .map_err(|join| format!("task did not complete: {join}")),
        Err(_) => {
            log::debug!("no tokio runtime; running export stage {stage} inline");
            std::panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|panic| format!("stage panicked: {}", panic_message(&*panic)))
        }
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    timings.insert(stage.as_str(), elapsed_ms);
    log::debug!("export stage {stage} took {elapsed_ms:.1}ms");
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ExportFailure { stage, source }),
        Err(message) => Err(ExportFailure {
            stage,
            source: stage.error(message),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}
