//! Registry of uploaded image binaries, keyed by the filename used in the source.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use folio_common::ExportError;
use mime_sniffer::MimeTypeSniffer;

use crate::preview::{PreviewStore, PreviewUrl};
use crate::raster::{EncodingFormat, Rasterizer, choose_smaller_encoding};
use crate::utils::same_basename;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub filename: String,
    /// Bytes as uploaded
    pub raw: Bytes,
    pub source_mime_type: String,
    /// Transient reference for live preview, owned by the registry
    pub preview_url: PreviewUrl,
    /// Portable `data:` URL of the chosen encoding
    pub data_url: String,
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
    pub original_size: usize,
    pub encoded_size: usize,
    pub registered_at: DateTime<Utc>,
}

pub struct ImageRegistry {
    entries: DashMap<String, Arc<RegistryEntry>>,
    rasterizer: Arc<dyn Rasterizer>,
    previews: Arc<dyn PreviewStore>,
}

impl std::fmt::Debug for ImageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRegistry")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl ImageRegistry {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, previews: Arc<dyn PreviewStore>) -> Self {
        Self {
            entries: DashMap::new(),
            rasterizer,
            previews,
        }
    }

    /// Decodes `data`, keeps the smaller portable encoding and stores the entry.
    ///
    /// The entry is only visible once this resolves. Re-registering a filename
    /// replaces the old entry and revokes its preview reference; on error the
    /// registry is left as it was.
    #[tracing::instrument(level = "debug", skip_all, fields(filename = tracing::field::Empty))]
    pub async fn register_image(
        &self,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<Arc<RegistryEntry>, ExportError> {
        let filename = filename.into();
        tracing::Span::current().record("filename", filename.as_str());
        let raw: Bytes = data.into();

        let rasterizer = self.rasterizer.clone();
        let (name, bytes) = (filename.clone(), raw.clone());
        let rasterized =
            tokio::task::spawn_blocking(move || rasterizer.rasterize(&name, &bytes)).await??;

        let chosen = choose_smaller_encoding(rasterized.candidates)
            .ok_or_else(|| ExportError::NoEncoding(filename.clone()))?;
        let data_url = format!(
            "data:{};base64,{}",
            chosen.format.mime_type(),
            STANDARD.encode(&chosen.data)
        );

        let source_mime_type = raw
            .sniff_mime_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let preview_url = self.previews.create(raw.clone(), &source_mime_type);

        let entry = Arc::new(RegistryEntry {
            filename: filename.clone(),
            original_size: raw.len(),
            encoded_size: chosen.data.len(),
            raw,
            source_mime_type,
            preview_url,
            data_url,
            format: chosen.format,
            width: rasterized.width,
            height: rasterized.height,
            registered_at: Utc::now(),
        });

        if let Some(previous) = self.entries.insert(filename.clone(), entry.clone()) {
            self.previews.revoke(&previous.preview_url);
            tracing::debug!(%filename, "replaced registered image");
        }
        tracing::debug!(
            %filename,
            format = %entry.format,
            original = entry.original_size,
            encoded = entry.encoded_size,
            "image registered"
        );
        Ok(entry)
    }

    pub fn get(&self, filename: &str) -> Option<Arc<RegistryEntry>> {
        self.entries.get(filename).map(|entry| entry.value().clone())
    }

    /// Entry for an `<img src>` style reference: exact key, else a unique
    /// basename match.
    pub fn resolve(&self, reference: &str) -> Option<Arc<RegistryEntry>> {
        if let Some(entry) = self.get(reference) {
            return Some(entry);
        }
        let mut matches = self
            .entries
            .iter()
            .filter(|entry| same_basename(reference, entry.key()))
            .map(|entry| entry.value().clone());
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn filenames(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes an entry, revoking its preview reference first.
    pub fn remove_image(&self, filename: &str) -> bool {
        match self.entries.remove(filename) {
            Some((_, entry)) => {
                self.previews.revoke(&entry.preview_url);
                true
            }
            None => false,
        }
    }

    /// Drops every entry, revoking all preview references.
    pub fn clear(&self) {
        let filenames = self.filenames();
        for filename in filenames {
            self.remove_image(&filename);
        }
    }
}

impl Drop for ImageRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
