use std::sync::Arc;

use testbed_core::config::ImagesConfig;
use testbed_core::mocks::{image_inspect, image_summary, GatewayCall, MockGateway};
use testbed_core::{ImageReference, Result};
use testbed_engine::{CacheMode, ImageCache};

fn reference(raw: &str) -> ImageReference {
    raw.parse().unwrap()
}

#[tokio::test]
async fn test_bulk_hit_needs_no_further_calls() -> Result<()> {
    let gateway = Arc::new(MockGateway::new().with_images(vec![image_summary(
        "sha256:1",
        &["registry.example.com:5000/team/app:2.1"],
    )]));
    let cache = ImageCache::new(gateway.clone(), &ImagesConfig::default());

    for _ in 0..3 {
        let data = cache
            .refresh(&reference("registry.example.com:5000/team/app:2.1"))
            .await?
            .expect("cached");
        assert_eq!(data.id, "sha256:1");
    }
    assert_eq!(gateway.calls(), vec![GatewayCall::ListImages]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_first_use_lists_once() {
    let gateway = Arc::new(
        MockGateway::new().with_images(vec![image_summary("sha256:1", &["nginx:1.25"])]),
    );
    let cache = Arc::new(ImageCache::new(gateway.clone(), &ImagesConfig::default()));

    let lookups = (0..8).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get(&reference("nginx:1.25")).await })
    });
    for lookup in futures::future::join_all(lookups).await {
        assert!(lookup.unwrap().unwrap().is_some());
    }
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::ListImages)), 1);
}

#[tokio::test]
async fn test_unsupported_listing_falls_back_to_inspection() -> Result<()> {
    let gateway = Arc::new(
        MockGateway::new().with_inspected_image("busybox:latest", image_inspect("sha256:9", &["busybox:latest"])),
    );
    let cache = ImageCache::new(gateway.clone(), &ImagesConfig::default());

    let busybox = reference("busybox");
    assert!(cache.get(&busybox).await?.is_none());
    assert_eq!(cache.mode(), Some(CacheMode::PerReference));

    assert_eq!(cache.refresh(&busybox).await?.map(|d| d.id), Some("sha256:9".to_string()));
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::ListImages)), 1);
    assert_eq!(
        gateway.count(|c| matches!(c, GatewayCall::InspectImage(r) if r == "busybox:latest")),
        1
    );

    gateway.set_inspected_image("busybox:latest", None);
    assert!(cache.refresh(&busybox).await?.is_none());
    assert!(cache.get(&busybox).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_get_never_inspects() -> Result<()> {
    let gateway = Arc::new(
        MockGateway::new().with_inspected_image("redis:7", image_inspect("sha256:r", &["redis:7"])),
    );
    let cache = ImageCache::new(gateway.clone(), &ImagesConfig { bulk_listing: false });

    assert!(cache.get(&reference("redis:7")).await?.is_none());
    assert!(cache.get(&reference("redis:7")).await?.is_none());
    assert!(gateway.calls().is_empty());
    Ok(())
}
