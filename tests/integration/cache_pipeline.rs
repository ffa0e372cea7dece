use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use vidfeed::cache::{
    CacheKey, CacheManager, CacheStorage, CacheStore, EvictionPolicy, MemoryCacheStore,
    PrefetchOutcome,
};
use vidfeed::models::{ContentDescriptor, NetworkCondition, QualityLevel};
use vidfeed::workers::{InterfaceKind, PathUpdate};
use vidfeed::FeedError;

use crate::common::{GatedStore, build_service, sample_mp4};

const WIFI_20: NetworkCondition = NetworkCondition::Wifi {
    speed_bps: 20_000_000,
};

/// Accepts connections and never answers them
async fn stalled_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn concurrent_fetches_share_one_download() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/clip.mp4")
        .with_status(200)
        .with_body(sample_mp4(512))
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryCacheStore::new());
    let services = build_service(store.clone(), EvictionPolicy::default(), WIFI_20);
    let url = format!("{}/clip.mp4", server.url());
    let key = CacheKey::new("clip", QualityLevel::High);

    let (a, b) = tokio::join!(
        services.service.fetch_playable(&url, &key),
        services.service.fetch_playable(&url, &key)
    );

    assert_eq!(a.unwrap().len(), sample_mp4(512).len());
    assert_eq!(b.unwrap().len(), sample_mp4(512).len());
    assert!(store.contains(&key).await.unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn repeated_prefetch_downloads_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/a.mp4")
        .with_status(200)
        .with_body(sample_mp4(256))
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryCacheStore::new());
    let services = build_service(store.clone(), EvictionPolicy::default(), WIFI_20);
    let descriptors = vec![ContentDescriptor::new("a", format!("{}/a.mp4", server.url()))];

    let first = services.service.prefetch(&descriptors);
    let second = services.service.prefetch(&descriptors);

    for handle in first.into_iter().chain(second) {
        let outcome = handle.outcome().await;
        assert!(
            matches!(outcome, PrefetchOutcome::Completed | PrefetchOutcome::AlreadyCached),
            "unexpected outcome {outcome:?}"
        );
    }

    let third = services.service.prefetch(&descriptors);
    assert_eq!(third.len(), 1);
    for handle in third {
        assert_eq!(handle.outcome().await, PrefetchOutcome::AlreadyCached);
    }

    assert!(
        store
            .contains(&CacheKey::new("a", QualityLevel::High))
            .await
            .unwrap()
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn undecodable_download_is_never_cached() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken.mp4")
        .with_status(200)
        .with_body("not a video")
        .create_async()
        .await;

    let store = Arc::new(MemoryCacheStore::new());
    let services = build_service(store.clone(), EvictionPolicy::default(), WIFI_20);
    let key = CacheKey::new("broken", QualityLevel::Medium);

    let result = services
        .service
        .fetch_playable(&format!("{}/broken.mp4", server.url()), &key)
        .await;

    assert!(matches!(result, Err(FeedError::Validation(_))));
    assert_eq!(store.total_size(), 0);
    assert!(!store.contains(&key).await.unwrap());
}

#[tokio::test]
async fn http_error_surfaces_on_demand_and_is_silent_for_prefetch() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/gone.mp4")
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryCacheStore::new());
    let services = build_service(store.clone(), EvictionPolicy::default(), WIFI_20);
    let url = format!("{}/gone.mp4", server.url());

    let result = services
        .service
        .fetch_playable(&url, &CacheKey::new("gone", QualityLevel::Low))
        .await;
    assert!(matches!(result, Err(FeedError::Network(_))));

    let handles = services
        .service
        .prefetch(&[ContentDescriptor::new("gone", url)]);
    for handle in handles {
        assert!(matches!(handle.outcome().await, PrefetchOutcome::Failed(_)));
    }
    assert_eq!(services.service.prefetch_stats().failed(), 1);
    assert_eq!(services.service.prefetch_stats().cancelled(), 0);
}

#[tokio::test]
async fn network_degradation_cancels_in_flight_prefetches() {
    let upstream = stalled_upstream().await;
    let store = Arc::new(MemoryCacheStore::new());
    let services = build_service(store.clone(), EvictionPolicy::default(), WIFI_20);

    let descriptors: Vec<_> = ["v1", "v2", "v3"]
        .iter()
        .map(|id| ContentDescriptor::new(*id, format!("{upstream}/{id}.mp4")))
        .collect();

    let handles = services.service.prefetch(&descriptors);
    assert_eq!(handles.len(), 3);
    assert_eq!(services.service.active_prefetches(), 3);

    // Let the requests reach the stalled upstream
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        services
            .monitor
            .handle_path_update(PathUpdate::from_interface(InterfaceKind::Other))
    );

    for handle in handles {
        assert_eq!(handle.outcome().await, PrefetchOutcome::Cancelled);
    }

    let stats = services.service.prefetch_stats();
    assert_eq!(stats.cancelled(), 3);
    assert_eq!(stats.failed(), 0);
    assert_eq!(services.service.active_prefetches(), 0);
    assert_eq!(store.total_size(), 0);
    for id in ["v1", "v2", "v3"] {
        assert!(
            !store
                .contains(&CacheKey::new(id, QualityLevel::High))
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn cancel_during_store_still_runs_cleanup() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/new.mp4")
        .with_status(200)
        .with_body(sample_mp4(600))
        .create_async()
        .await;

    let store = Arc::new(GatedStore::default());
    let old = CacheKey::new("old", QualityLevel::High);
    let new = CacheKey::new("new", QualityLevel::High);
    store
        .inner
        .insert_with_access_time(
            &old,
            Bytes::from(vec![0u8; 1000]),
            chrono::Utc::now() - chrono::Duration::hours(1),
        )
        .await;

    let policy = EvictionPolicy {
        max_size: 1500,
        cleanup_threshold: 0.9,
        target_size_after_cleanup: 0.5,
    };
    let services = build_service(store.clone(), policy, WIFI_20);
    let handles = services
        .service
        .prefetch(&[ContentDescriptor::new("new", format!("{}/new.mp4", server.url()))]);
    assert_eq!(handles.len(), 1);

    tokio::time::timeout(Duration::from_secs(5), store.entered.notified())
        .await
        .expect("store was never reached");
    assert_eq!(services.service.cancel_all_prefetches(), 1);
    for handle in handles {
        assert_eq!(handle.outcome().await, PrefetchOutcome::Cancelled);
    }

    store.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.contains(&old).await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cleanup never ran");

    assert!(store.contains(&new).await.unwrap());
    assert!(store.total_size() <= 750);
}

#[tokio::test]
async fn disk_store_evicts_older_blob() {
    let dir = TempDir::new().unwrap();
    let storage = CacheStorage::spawn(dir.path().to_path_buf()).await.unwrap();
    let store: Arc<dyn CacheStore> = Arc::new(storage.clone());
    let manager = CacheManager::new(
        store.clone(),
        EvictionPolicy {
            max_size: 1500,
            cleanup_threshold: 0.9,
            target_size_after_cleanup: 0.5,
        },
    );

    let v1 = CacheKey::new("v1", QualityLevel::Low);
    let v2 = CacheKey::new("v2", QualityLevel::Low);

    store.store(&v1, Bytes::from(vec![1u8; 1000])).await.unwrap();
    manager.manage_cache().await.unwrap();
    store.store(&v2, Bytes::from(vec![2u8; 1000])).await.unwrap();
    let stats = manager.manage_cache().await.unwrap();

    assert_eq!(stats.entries_removed, 1);
    assert_eq!(store.total_size(), 1000);
    assert!(!store.contains(&v1).await.unwrap());
    assert!(store.contains(&v2).await.unwrap());
    assert!(!dir.path().join("v1_low").exists());
    assert!(dir.path().join("v2_low").exists());

    storage.shutdown().unwrap();
}

#[tokio::test]
async fn explicit_removal_and_clear() {
    let store = Arc::new(MemoryCacheStore::new());
    let services = build_service(store.clone(), EvictionPolicy::default(), WIFI_20);
    let a = CacheKey::new("a", QualityLevel::Low);
    let b = CacheKey::new("b", QualityLevel::Low);
    store.store(&a, Bytes::from(sample_mp4(16))).await.unwrap();
    store.store(&b, Bytes::from(sample_mp4(16))).await.unwrap();

    services.service.remove_from_cache(&a).await.unwrap();
    assert!(!store.contains(&a).await.unwrap());
    assert!(store.contains(&b).await.unwrap());

    services.service.clear_cache().await.unwrap();
    assert_eq!(store.total_size(), 0);
}
