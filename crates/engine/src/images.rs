//! Image metadata cache.
//!
//! Populated once from a bulk image listing. When listing is disabled or the
//! provider cannot list, entries are maintained one reference at a time by
//! [`ImageCache::refresh`].

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use testbed_core::config::ImagesConfig;
use testbed_core::{EngineGateway, ImageData, ImageReference, ImageSummary, Result};

/// How the cache is kept current after its one-time initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Bulk listing succeeded; the map is authoritative.
    Populated,
    /// Bulk listing skipped or unavailable; refresh inspects per reference.
    PerReference,
}

/// Concurrent reference → metadata cache.
pub struct ImageCache {
    gateway: Arc<dyn EngineGateway>,
    bulk_listing: bool,
    entries: DashMap<ImageReference, ImageData>,
    mode: OnceLock<CacheMode>,
    init_lock: Mutex<()>,
}

impl ImageCache {
    pub fn new(gateway: Arc<dyn EngineGateway>, config: &ImagesConfig) -> Self {
        Self {
            gateway,
            bulk_listing: config.bulk_listing,
            entries: DashMap::new(),
            mode: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Cached metadata for `reference`. Performs the one-time bulk
    /// population on first use, never a per-reference lookup.
    pub async fn get(&self, reference: &ImageReference) -> Result<Option<ImageData>> {
        self.ensure_initialized().await?;
        Ok(self.entries.get(reference).map(|e| e.value().clone()))
    }

    /// Like [`get`](Self::get), but in per-reference mode inspects the image
    /// and updates the entry. Not-found or unsupported inspection removes any
    /// stale entry and yields `None`.
    pub async fn refresh(&self, reference: &ImageReference) -> Result<Option<ImageData>> {
        if self.ensure_initialized().await? == CacheMode::Populated {
            return Ok(self.entries.get(reference).map(|e| e.value().clone()));
        }

        let name = reference.canonical_name();
        match self.gateway.inspect_image(&name).await {
            Ok(inspect) => {
                let data = ImageData::from(inspect);
                self.entries.insert(reference.clone(), data.clone());
                Ok(Some(data))
            }
            Err(e) if e.is_not_found() || e.is_unsupported() => {
                tracing::trace!(image = %name, error = %e, "Image not available, dropping cache entry");
                self.entries.remove(reference);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Mode chosen at initialization, if it has happened.
    pub fn mode(&self) -> Option<CacheMode> {
        self.mode.get().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn ensure_initialized(&self) -> Result<CacheMode> {
        if let Some(mode) = self.mode.get() {
            return Ok(*mode);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(mode) = self.mode.get() {
            return Ok(*mode);
        }

        if !self.bulk_listing {
            tracing::debug!("Bulk image listing disabled, refreshing per reference");
            return Ok(self.set_mode(CacheMode::PerReference));
        }

        match self.gateway.list_images().await {
            Ok(images) => {
                self.populate(&images);
                tracing::debug!(entries = self.entries.len(), "Image cache populated from listing");
                Ok(self.set_mode(CacheMode::Populated))
            }
            Err(e) if e.is_unsupported() => {
                tracing::trace!(error = %e, "Provider does not support image listing");
                Ok(self.set_mode(CacheMode::PerReference))
            }
            Err(e) => {
                self.set_mode(CacheMode::PerReference);
                Err(e)
            }
        }
    }

    fn set_mode(&self, mode: CacheMode) -> CacheMode {
        *self.mode.get_or_init(|| mode)
    }

    fn populate(&self, images: &[ImageSummary]) {
        for image in images {
            let Some(tags) = &image.repo_tags else {
                tracing::debug!(image = %image.id, "Image has no repo tags, skipping");
                continue;
            };

            let data = ImageData::from(image);
            let unique: HashSet<&String> = tags.iter().collect();
            for tag in unique {
                match ImageReference::parse(tag) {
                    Ok(reference) => {
                        self.entries.insert(reference, data.clone());
                    }
                    Err(e) => {
                        tracing::debug!(tag = %tag, error = %e, "Skipping unparseable repo tag");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_core::mocks::{image_inspect, image_summary, GatewayCall, MockGateway};

    fn reference(raw: &str) -> ImageReference {
        ImageReference::parse(raw).unwrap()
    }

    fn enabled() -> ImagesConfig {
        ImagesConfig { bulk_listing: true }
    }

    #[tokio::test]
    async fn test_populates_once_from_listing() {
        let gateway = Arc::new(MockGateway::new().with_images(vec![
            image_summary("sha256:a", &["redis:7", "redis:latest", "redis:7"]),
            image_summary("sha256:b", &["postgres:16"]),
        ]));
        let cache = ImageCache::new(gateway.clone(), &enabled());

        let redis = cache.get(&reference("redis")).await.unwrap().unwrap();
        assert_eq!(redis.id, "sha256:a");
        assert!(cache.get(&reference("postgres:16")).await.unwrap().is_some());
        assert!(cache.get(&reference("mysql:8")).await.unwrap().is_none());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.mode(), Some(CacheMode::Populated));
        assert_eq!(gateway.calls(), vec![GatewayCall::ListImages]);
    }

    #[tokio::test]
    async fn test_untagged_images_are_skipped() {
        let mut dangling = image_summary("sha256:c", &[]);
        dangling.repo_tags = None;
        let gateway = Arc::new(MockGateway::new().with_images(vec![dangling]));
        let cache = ImageCache::new(gateway, &enabled());
        assert!(cache.get(&reference("anything")).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_reads_map_when_populated() {
        let gateway = Arc::new(
            MockGateway::new().with_images(vec![image_summary("sha256:a", &["redis:7"])]),
        );
        let cache = ImageCache::new(gateway.clone(), &enabled());
        assert!(cache.refresh(&reference("redis:7")).await.unwrap().is_some());
        assert!(cache.refresh(&reference("redis:8")).await.unwrap().is_none());
        assert_eq!(
            gateway.count(|c| matches!(c, GatewayCall::InspectImage(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_disabled_listing_uses_inspection() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_images(vec![image_summary("sha256:a", &["redis:7"])])
                .with_inspected_image("redis:7", image_inspect("sha256:a", &["redis:7"])),
        );
        let cache = ImageCache::new(gateway.clone(), &ImagesConfig { bulk_listing: false });

        assert!(cache.get(&reference("redis:7")).await.unwrap().is_none());
        let data = cache.refresh(&reference("redis:7")).await.unwrap().unwrap();
        assert_eq!(data.id, "sha256:a");
        assert!(cache.get(&reference("redis:7")).await.unwrap().is_some());
        assert_eq!(gateway.count(|c| matches!(c, GatewayCall::ListImages)), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_removes_stale_entry() {
        let gateway = Arc::new(
            MockGateway::new().with_inspected_image("app:1", image_inspect("sha256:x", &["app:1"])),
        );
        let cache = ImageCache::new(gateway.clone(), &enabled());

        assert!(cache.refresh(&reference("app:1")).await.unwrap().is_some());
        assert!(cache.get(&reference("app:1")).await.unwrap().is_some());

        gateway.set_inspected_image("app:1", None);
        assert!(cache.refresh(&reference("app:1")).await.unwrap().is_none());
        assert!(cache.get(&reference("app:1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_inspection_reports_absent() {
        let gateway = Arc::new(MockGateway::new().with_image_inspect_unsupported());
        let cache = ImageCache::new(gateway, &enabled());
        assert!(cache.refresh(&reference("app:1")).await.unwrap().is_none());
        assert_eq!(cache.mode(), Some(CacheMode::PerReference));
    }
}
