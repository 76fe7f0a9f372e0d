//! Gallery preloading through the worker

mod common;

use ceylon_offline::http::{Request, Response};
use ceylon_offline::lifecycle::{ServiceWorker, WorkerHost};
use ceylon_offline::network::Network;
use ceylon_offline::preload::{ImagePreloader, PreloadStatus};
use ceylon_offline::store::{StoreManager, StoreName};
use common::{origin, url, RecordingHost, ScriptedNetwork};
use std::sync::Arc;
use tempfile::TempDir;

fn gallery() -> Vec<String> {
    (1..=6).map(|i| format!("/images/ruby-{}.jpg", i)).collect()
}

fn active_worker(temp: &TempDir, network: &Arc<ScriptedNetwork>) -> Arc<ServiceWorker> {
    let stores = Arc::new(StoreManager::new(temp.path(), "ceylon-gems", 1).unwrap());
    let worker = ServiceWorker::new(
        origin(),
        Vec::new(),
        stores,
        Arc::clone(network) as Arc<dyn Network>,
        Arc::new(RecordingHost::new()) as Arc<dyn WorkerHost>,
    );
    worker.resume().unwrap();
    Arc::new(worker)
}

#[tokio::test]
async fn test_preload_warms_images_store() {
    let temp = TempDir::new().unwrap();
    let network = Arc::new(ScriptedNetwork::new());
    for src in gallery() {
        network.respond(&url(&src), Response::new(200, "jpeg"));
    }
    let worker = active_worker(&temp, &network);

    let mut preloader = ImagePreloader::new(Arc::clone(&worker), network.clone()).with_count(1);
    let status = preloader.preload(&gallery(), 0).await.clone();
    worker.settle().await;

    assert_eq!(status.len(), 3);
    assert_eq!(status["/images/ruby-1.jpg"], PreloadStatus::Loaded);
    assert_eq!(status["/images/ruby-2.jpg"], PreloadStatus::Loaded);
    assert_eq!(status["/images/ruby-6.jpg"], PreloadStatus::Loaded);

    let identity = Request::get(url("/images/ruby-6.jpg")).identity();
    assert!(worker.stores().read(StoreName::Images, &identity).await.is_some());
}

#[tokio::test]
async fn test_preload_skips_known_and_records_failures() {
    let temp = TempDir::new().unwrap();
    let network = Arc::new(ScriptedNetwork::new());
    network.respond(&url("/images/ruby-1.jpg"), Response::new(200, "jpeg"));
    network.respond(&url("/images/ruby-2.jpg"), Response::new(200, "jpeg"));
    let worker = active_worker(&temp, &network);

    let mut preloader = ImagePreloader::new(Arc::clone(&worker), network.clone()).with_count(1);
    preloader.preload(&gallery(), 0).await;
    let calls = network.calls();

    // ruby-6 is not served by the network
    assert_eq!(
        preloader.status()["/images/ruby-6.jpg"],
        PreloadStatus::Error
    );

    // Moving one step only loads the image that is new to the window
    preloader.preload(&gallery(), 1).await;
    assert_eq!(network.calls(), calls + 1);
    assert_eq!(
        preloader.status()["/images/ruby-3.jpg"],
        PreloadStatus::Error
    );
}

#[tokio::test]
async fn test_preload_goes_to_network_when_worker_inactive() {
    let temp = TempDir::new().unwrap();
    let network = Arc::new(ScriptedNetwork::new());
    network.respond(&url("/images/ruby-1.jpg"), Response::new(200, "jpeg"));

    let stores = Arc::new(StoreManager::new(temp.path(), "ceylon-gems", 1).unwrap());
    let worker = Arc::new(ServiceWorker::new(
        origin(),
        Vec::new(),
        stores,
        network.clone() as Arc<dyn Network>,
        Arc::new(RecordingHost::new()) as Arc<dyn WorkerHost>,
    ));

    let mut preloader = ImagePreloader::new(Arc::clone(&worker), network.clone()).with_count(0);
    let status = preloader
        .preload(&["/images/ruby-1.jpg".to_string()], 0)
        .await
        .clone();

    assert_eq!(status["/images/ruby-1.jpg"], PreloadStatus::Loaded);
    assert!(worker.stores().store_names().await.unwrap().is_empty());
}
