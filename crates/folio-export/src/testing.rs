//! Test helpers shared by the pass and session tests.

use std::sync::Arc;

use folio_common::ExportError;

use crate::preview::MemoryPreviewStore;
use crate::raster::{EncodingFormat, EncodingResult, Rasterized, Rasterizer};
use crate::registry::ImageRegistry;

/// Accepts any bytes and offers them as a 1x1 PNG with a larger JPEG.
pub(crate) struct StubRasterizer;

impl Rasterizer for StubRasterizer {
    fn rasterize(&self, _filename: &str, data: &[u8]) -> Result<Rasterized, ExportError> {
        let mut jpeg = data.to_vec();
        jpeg.push(0);
        Ok(Rasterized {
            width: 1,
            height: 1,
            candidates: vec![
                EncodingResult {
                    format: EncodingFormat::Png,
                    data: data.to_vec(),
                },
                EncodingResult {
                    format: EncodingFormat::Jpeg,
                    data: jpeg,
                },
            ],
        })
    }
}

/// Registry with every filename in `filenames` registered, in order.
pub(crate) async fn stub_registry(filenames: &[&str]) -> (ImageRegistry, Arc<MemoryPreviewStore>) {
    let previews = Arc::new(MemoryPreviewStore::new());
    let registry = ImageRegistry::new(Arc::new(StubRasterizer), previews.clone());
    for filename in filenames {
        registry
            .register_image(*filename, filename.as_bytes().to_vec())
            .await
            .expect("stub rasterizer accepts everything");
    }
    (registry, previews)
}
