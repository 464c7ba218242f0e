use super::*;
use crate::downloader::test_helpers::zip_bytes;
use crate::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn output_dir_change_applies_to_next_drain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/c0/Game.zip"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("data.bin", b"payload")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = MyrientDownloader::new(test_config(&server.uri(), &dir))
        .await
        .unwrap();

    let moved_to = dir.path().join("usb");
    downloader.set_output_dir(0, moved_to.clone()).await.unwrap();
    assert_eq!(
        downloader.config().await.catalog(0).unwrap().output_dir,
        moved_to
    );

    downloader.add_to_queue(QueueItem::new("Game.zip", 0)).await.unwrap();
    assert_eq!(downloader.process_queue().await.unwrap(), 1);

    assert_eq!(std::fs::read_dir(&moved_to).unwrap().count(), 1);
    assert!(!dir.path().join("out0").exists());
}

#[tokio::test]
async fn unknown_catalog_output_dir_is_rejected() {
    let (downloader, _dir) = create_test_downloader().await;
    let result = downloader.set_output_dir(9, PathBuf::from("/mnt/usb")).await;
    assert!(matches!(result, Err(Error::UnknownCatalog(9))));
}

#[tokio::test]
async fn settings_are_locked_while_draining() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/c0/Slow.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 64])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = MyrientDownloader::new(test_config(&server.uri(), &dir))
        .await
        .unwrap();
    downloader.add_to_queue(QueueItem::new("Slow.zip", 0)).await.unwrap();

    let handle = downloader.start_queue_processor();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(downloader.is_processing());

    let result = downloader.set_output_dir(0, dir.path().join("usb")).await;
    assert!(matches!(result, Err(Error::QueueBusy)));
    let result = downloader.set_decryptor_path(None).await;
    assert!(matches!(result, Err(Error::QueueBusy)));
    assert_eq!(
        downloader.config().await.catalog(0).unwrap().output_dir,
        dir.path().join("out0")
    );

    downloader.shutdown().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn decryptor_path_must_name_the_platform_binary() {
    let (downloader, dir) = create_test_downloader().await;

    let wrong = dir.path().join("decrypt.sh");
    std::fs::write(&wrong, "").unwrap();
    let result = downloader.set_decryptor_path(Some(wrong)).await;
    assert!(matches!(result, Err(Error::Config { .. })));
    assert_eq!(downloader.config().await.decryptor_path, None);

    let binary = dir.path().join("ps3dec");
    std::fs::write(&binary, "").unwrap();
    downloader
        .set_decryptor_path(Some(binary.clone()))
        .await
        .unwrap();
    assert_eq!(downloader.config().await.decryptor_path, Some(binary));

    downloader.set_decryptor_path(None).await.unwrap();
    assert_eq!(downloader.config().await.decryptor_path, None);
}

#[tokio::test]
async fn saved_config_reflects_updates() {
    let (downloader, dir) = create_test_downloader().await;
    downloader
        .set_output_dir(1, dir.path().join("usb"))
        .await
        .unwrap();

    let path = dir.path().join("config.json");
    downloader.save_config(&path).await.unwrap();

    let saved = crate::config::Config::from_file(&path).unwrap();
    assert_eq!(saved.catalog(1).unwrap().output_dir, dir.path().join("usb"));
}
