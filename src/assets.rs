//! Image sources referenced by a display list, resolved before capture.
//!
//! Capture never blocks on I/O mid-paint: every image is loaded (or given up
//! on) up front, so a missing or forbidden image degrades the output instead
//! of aborting it.

use crate::error::{CertError, Result};
use base64::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    DataUri,
    LocalFile(PathBuf),
    Remote { host: String },
    Unsupported(String),
}

impl AssetSource {
    pub fn classify(uri: &str) -> AssetSource {
        let uri = uri.trim();
        if uri.starts_with("data:") {
            return AssetSource::DataUri;
        }
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("file://") {
            return AssetSource::LocalFile(PathBuf::from(&uri["file://".len()..]));
        }
        for prefix in ["http://", "https://", "//"] {
            if lower.starts_with(prefix) {
                return match remote_host(&lower[prefix.len()..]) {
                    Some(host) => AssetSource::Remote { host },
                    None => AssetSource::Unsupported(uri.to_string()),
                };
            }
        }
        if let Some((scheme, _)) = uri.split_once(':') {
            // A single letter is a Windows drive, not a scheme.
            if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
                return AssetSource::Unsupported(scheme.to_string());
            }
        }
        AssetSource::LocalFile(PathBuf::from(uri))
    }
}

fn remote_host(rest: &str) -> Option<String> {
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = if host_port.starts_with('[') {
        host_port.split(']').next().map(|h| format!("{h}]"))?
    } else {
        host_port.split(':').next()?.to_string()
    };
    (!host.is_empty()).then_some(host)
}

/// Which image origins capture may read.
///
/// Remote hosts count as readable only when listed here; everything else is
/// treated like a cross-origin image without CORS headers and left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPolicy {
    pub allow_local_files: bool,
    pub permitted_hosts: Vec<String>,
}

impl Default for AssetPolicy {
    fn default() -> Self {
        Self {
            allow_local_files: true,
            permitted_hosts: Vec::new(),
        }
    }
}

impl AssetPolicy {
    pub fn permit_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into().trim().to_ascii_lowercase();
        if !host.is_empty() && !self.permitted_hosts.contains(&host) {
            self.permitted_hosts.push(host);
        }
        self
    }

    pub fn allow_local_files(mut self, allow: bool) -> Self {
        self.allow_local_files = allow;
        self
    }

    pub fn permits(&self, source: &AssetSource) -> bool {
        match source {
            AssetSource::DataUri => true,
            AssetSource::LocalFile(_) => self.allow_local_files,
            AssetSource::Remote { host } => self
                .permitted_hosts
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(host)),
            AssetSource::Unsupported(_) => false,
        }
    }
}

/// Fetches permitted remote images. The crate ships no HTTP client; hosts
/// that need remote backgrounds plug one in here.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Decoded images keyed by their source URI. A `None` entry records a source
/// that was tried and skipped.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<String, Option<Arc<Pixmap>>>,
}

impl ImageStore {
    pub fn get(&self, uri: &str) -> Option<&Pixmap> {
        self.images.get(uri).and_then(|entry| entry.as_deref())
    }

    pub fn insert(&mut self, uri: impl Into<String>, pixmap: Pixmap) {
        self.images.insert(uri.into(), Some(Arc::new(pixmap)));
    }

    pub fn loaded_count(&self) -> usize {
        self.images.values().filter(|entry| entry.is_some()).count()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.images.contains_key(uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAsset {
    pub uri: String,
    pub reason: String,
}

/// Loads every source the policy allows. Failures are collected, never raised.
pub fn preload(
    sources: &[String],
    policy: &AssetPolicy,
    fetcher: Option<&dyn RemoteFetcher>,
) -> (ImageStore, Vec<SkippedAsset>) {
    let mut store = ImageStore::default();
    let mut skipped = Vec::new();
    for uri in sources {
        if store.contains(uri) {
            continue;
        }
        match load_image(uri, policy, fetcher) {
            Ok(pixmap) => {
                log::debug!(
                    "loaded image {} ({}x{})",
                    short_uri(uri),
                    pixmap.width(),
                    pixmap.height()
                );
                store.images.insert(uri.clone(), Some(Arc::new(pixmap)));
            }
            Err(err) => {
                log::warn!("image {} skipped: {err}", short_uri(uri));
                store.images.insert(uri.clone(), None);
                skipped.push(SkippedAsset {
                    uri: short_uri(uri),
                    reason: err.to_string(),
                });
            }
        }
    }
    (store, skipped)
}

fn load_image(
    uri: &str,
    policy: &AssetPolicy,
    fetcher: Option<&dyn RemoteFetcher>,
) -> Result<Pixmap> {
    let source = AssetSource::classify(uri);
    if !policy.permits(&source) {
        return Err(CertError::Asset(match &source {
            AssetSource::Remote { host } => format!("origin {host} is not permitted"),
            AssetSource::LocalFile(_) => "local files are not permitted".to_string(),
            AssetSource::Unsupported(scheme) => format!("unsupported source {scheme}"),
            AssetSource::DataUri => "data uri rejected".to_string(),
        }));
    }
    let (bytes, mime) = match source {
        AssetSource::DataUri => {
            let (mime, data) = parse_data_uri(uri)
                .ok_or_else(|| CertError::Asset("malformed data uri".to_string()))?;
            (data, Some(mime))
        }
        AssetSource::LocalFile(path) => (read_local(&path)?, None),
        AssetSource::Remote { .. } => {
            let fetcher = fetcher
                .ok_or_else(|| CertError::Asset("no remote fetcher configured".to_string()))?;
            (fetcher.fetch(uri.trim())?, None)
        }
        AssetSource::Unsupported(scheme) => {
            return Err(CertError::Asset(format!("unsupported source {scheme}")));
        }
    };
    decode_image_to_pixmap(&bytes, mime.as_deref())
        .ok_or_else(|| CertError::Asset("image could not be decoded".to_string()))
}

fn read_local(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| CertError::Asset(format!("{}: {e}", path.display())))
}

fn short_uri(uri: &str) -> String {
    const MAX_CHARS: usize = 64;
    let trimmed = uri.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_CHARS).collect();
    out.push_str("...");
    out
}

pub fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let uri = uri.trim();
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

pub fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let hinted = mime.and_then(|mime| {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    });
    let format = hinted.or_else(|| image::guess_format(data).ok());
    let decoded = match format {
        Some(fmt) => image::load_from_memory_with_format(data, fmt)
            .or_else(|_| image::load_from_memory(data))
            .ok()?,
        None => image::load_from_memory(data).ok()?,
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}
