// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::RetryConfig;
use crate::downloader::test_helpers::zip_bytes;
use crate::platform::UnixDecryptor;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog(server: &MockServer, dir: &TempDir, index: usize) -> CatalogProfile {
    CatalogProfile {
        name: format!("catalog{}", index),
        index,
        url: format!("{}/files/c{}", server.uri(), index),
        output_dir: dir.path().join(format!("out{}", index)),
        file_extension: String::new(),
        requires_decryption: false,
        requires_pkg_handling: false,
        has_multiple_extensions: false,
    }
}

fn base_config(dir: &TempDir) -> Config {
    Config {
        staging_dir: dir.path().join("staging"),
        license_dir: dir.path().join("exdata"),
        queue_path: dir.path().join("queue.json"),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

fn runner_for(config: Config, platform: Arc<dyn DecryptorPlatform>) -> (WorkflowRunner, broadcast::Receiver<Event>) {
    let (tx, rx) = broadcast::channel(1000);
    let runner =
        WorkflowRunner::new(tx, Arc::new(config), platform, CancellationToken::new()).unwrap();
    (runner, rx)
}

async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Decryptor stand-in: copies `<iso>` to `<iso>.dec`, matching the Unix tool's output name
#[derive(Debug)]
struct CopyDecryptor {
    script: &'static str,
}

impl DecryptorPlatform for CopyDecryptor {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn binary_name(&self) -> &'static str {
        "sh"
    }

    fn decrypt_args(&self, iso: &Path, key: &str) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.script.to_string(),
            "sh".to_string(),
            iso.to_string_lossy().into_owned(),
            key.to_string(),
        ]
    }

    fn decrypted_output(&self, staging: &Path, base: &str) -> PathBuf {
        UnixDecryptor.decrypted_output(staging, base)
    }

    fn needs_stdin_newline(&self) -> bool {
        false
    }
}

#[test]
fn select_checks_flags_in_order() {
    let mut profile = CatalogProfile {
        name: "x".into(),
        index: 0,
        url: "https://e.com".into(),
        output_dir: "out".into(),
        file_extension: String::new(),
        requires_decryption: true,
        requires_pkg_handling: true,
        has_multiple_extensions: true,
    };
    assert_eq!(Pipeline::select(&profile), Pipeline::Ps3Iso);
    profile.requires_decryption = false;
    assert_eq!(Pipeline::select(&profile), Pipeline::PsnPkg);
    profile.requires_pkg_handling = false;
    assert_eq!(Pipeline::select(&profile), Pipeline::MultiFile);
    profile.has_multiple_extensions = false;
    assert_eq!(Pipeline::select(&profile), Pipeline::Plain);
}

#[test]
fn context_derives_base_and_url() {
    let profile = CatalogProfile {
        name: "x".into(),
        index: 0,
        url: "https://e.com/files/".into(),
        output_dir: "out".into(),
        file_extension: String::new(),
        requires_decryption: false,
        requires_pkg_handling: false,
        has_multiple_extensions: false,
    };
    let ctx = WorkflowContext::new(QueueItem::new("Game (USA).zip", 0), profile, "1/1");
    assert_eq!(ctx.base, "Game (USA)");
    assert_eq!(ctx.url, "https://e.com/files/Game%20%28USA%29.zip");
}

#[tokio::test]
async fn pkg_without_split_moves_package_and_license() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c0/Game.zip",
        zip_bytes(&[("game.pkg", b"package bytes"), ("game.rap", b"license")]),
    )
    .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_pkg_handling = true;
    config.catalogs.push(profile);
    config.pkg.split = false;

    let (runner, _rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert_eq!(
        std::fs::read(dir.path().join("out0/Game.pkg")).unwrap(),
        b"package bytes"
    );
    assert_eq!(
        std::fs::read(dir.path().join("exdata/game.rap")).unwrap(),
        b"license"
    );
    assert!(!dir.path().join("staging/Game.zip").exists());
}

#[tokio::test]
async fn pkg_over_threshold_is_split_into_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let package: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
    serve(
        &server,
        "/files/c0/Big.zip",
        zip_bytes(&[("content.pkg", &package)]),
    )
    .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_pkg_handling = true;
    config.catalogs.push(profile);

    let (runner, mut rx) = runner_for(config, Arc::new(UnixDecryptor));
    let runner = runner.with_splitter(Splitter::with_threshold(100));
    let outcome = runner.process(&QueueItem::new("Big.zip", 0), "1/1").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    let out = dir.path().join("out0");
    let mut joined = Vec::new();
    for i in 0..3 {
        joined.extend(std::fs::read(out.join(format!("Big.pkg.666{:02}", i))).unwrap());
    }
    assert_eq!(joined, package);
    assert!(!out.join("Big.pkg").exists());
    assert!(!dir.path().join("staging/Big.pkg").exists());

    let splits = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, Event::Splitting { .. }))
        .count();
    assert_eq!(splits, 3);
}

#[tokio::test]
async fn plain_renames_payload_to_item_name() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c1/Title%20%28EU%29.zip",
        zip_bytes(&[("disc.ISO", b"image"), ("readme.txt", b"hi")]),
    )
    .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 1);
    profile.file_extension = ".iso".into();
    config.catalogs.push(profile);

    let (runner, mut rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Title (EU).zip", 1), "2/3").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert_eq!(
        std::fs::read(dir.path().join("out1/Title (EU).iso")).unwrap(),
        b"image"
    );
    assert!(!dir.path().join("staging/Title (EU).zip").exists());

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(Event::ItemStarted { position, .. }) if position == "2/3"));
    assert!(matches!(events.last(), Some(Event::Complete { name, .. }) if name == "Title (EU)"));
    assert!(events.iter().any(|e| matches!(e, Event::FileOperation { message, .. } if message == "Performed rename operation")));
}

#[tokio::test]
async fn multi_file_folder_gets_suffix_on_collision() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c2/Album.zip",
        zip_bytes(&[("track1.bin", b"1"), ("disc.cue", b"cue")]),
    )
    .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 2);
    profile.has_multiple_extensions = true;
    config.catalogs.push(profile);
    std::fs::create_dir_all(dir.path().join("out2/Album")).unwrap();

    let (runner, _rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Album.zip", 2), "1/1").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert_eq!(
        std::fs::read(dir.path().join("out2/Album_1/disc.cue")).unwrap(),
        b"cue"
    );
    assert!(!dir.path().join("staging/Album").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn iso_is_decrypted_with_fetched_key() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c0/Game.zip",
        zip_bytes(&[("Game.iso", b"encrypted image")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/keys/Game.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("Game.dkey", b"00112233445566778899aabbccddeeff\n")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_decryption = true;
    config.catalogs.push(profile);
    config.key_archive_url = format!("{}/keys", server.uri());
    config.decryptor_path = Some(PathBuf::from("/bin/sh"));

    let platform = Arc::new(CopyDecryptor {
        script: r#"echo "key $2"; cp "$1" "$1.dec""#,
    });
    let (runner, mut rx) = runner_for(config, platform);
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    let out = dir.path().join("out0");
    assert_eq!(std::fs::read(out.join("Game.iso")).unwrap(), b"encrypted image");
    assert!(!out.join("Game.dkey").exists());
    assert!(!dir.path().join("staging/Game.dkey").exists());
    assert!(!dir.path().join("staging/Game.iso").exists());
    assert!(!dir.path().join("staging/Game_dkey.zip").exists());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, Event::ToolOutput { line } if line == "key 00112233445566778899aabbccddeeff")));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_decryptor_abandons_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c0/Game.zip",
        zip_bytes(&[("Game.iso", b"encrypted image")]),
    )
    .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_decryption = true;
    config.catalogs.push(profile);
    config.decryptor_path = Some(PathBuf::from("/bin/sh"));
    // Key already present in staging; nothing is fetched
    std::fs::create_dir_all(dir.path().join("staging")).unwrap();
    std::fs::write(dir.path().join("staging/Game.dkey"), "00ff").unwrap();

    let (runner, mut rx) = runner_for(config, Arc::new(CopyDecryptor { script: "exit 1" }));
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;

    match outcome {
        ItemOutcome::Abandoned { stage, .. } => assert_eq!(stage, Stage::Decrypt),
        other => panic!("expected abandonment, got {:?}", other),
    }
    // Partial state stays for inspection
    assert!(dir.path().join("staging/Game.iso").exists());
    assert!(drain(&mut rx).iter().any(|e| matches!(e, Event::Abandoned { .. })));
}

#[tokio::test]
async fn iso_without_key_is_moved_encrypted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c0/Game.zip",
        zip_bytes(&[("Game.iso", b"encrypted image")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/keys/Game.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_decryption = true;
    config.catalogs.push(profile);
    config.key_archive_url = format!("{}/keys", server.uri());

    let (runner, _rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert!(dir.path().join("out0/Game.iso").exists());
}

#[tokio::test]
async fn cancellation_during_key_retrieval_abandons_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c0/Game.zip",
        zip_bytes(&[("Game.iso", b"encrypted image")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/keys/Game.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("Game.dkey", b"00ff")]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_decryption = true;
    config.catalogs.push(profile);
    config.key_archive_url = format!("{}/keys", server.uri());

    let cancel = CancellationToken::new();
    let (tx, _rx) = broadcast::channel(1000);
    let runner =
        WorkflowRunner::new(tx, Arc::new(config), Arc::new(UnixDecryptor), cancel.clone()).unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;

    assert!(matches!(outcome, ItemOutcome::Abandoned { stage: Stage::Decrypt, .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
    // Nothing reaches the output; the image waits in staging for the next run
    assert!(!dir.path().join("out0/Game.iso").exists());
    assert!(dir.path().join("staging/Game.iso").exists());
}

#[tokio::test]
async fn archive_without_iso_is_abandoned() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(
        &server,
        "/files/c0/Game.zip",
        zip_bytes(&[("notes.txt", b"no image here")]),
    )
    .await;

    let mut config = base_config(&dir);
    let mut profile = catalog(&server, &dir, 0);
    profile.requires_decryption = true;
    config.catalogs.push(profile);
    config.iso.decrypt = false;

    let (runner, _rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;
    assert!(matches!(outcome, ItemOutcome::Abandoned { stage: Stage::Extract, .. }));
}

#[tokio::test]
async fn non_zip_download_is_abandoned_by_plain() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    serve(&server, "/files/c0/Game.iso", b"raw image".to_vec()).await;

    let mut config = base_config(&dir);
    config.catalogs.push(catalog(&server, &dir, 0));

    let (runner, _rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Game.iso", 0), "1/1").await;
    assert!(matches!(outcome, ItemOutcome::Abandoned { stage: Stage::Download, .. }));
}

#[tokio::test]
async fn unknown_catalog_is_abandoned() {
    let dir = TempDir::new().unwrap();
    let (runner, mut rx) = runner_for(base_config(&dir), Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Game.zip", 7), "1/1").await;

    assert!(matches!(outcome, ItemOutcome::Abandoned { .. }));
    assert!(matches!(drain(&mut rx).as_slice(), [Event::Abandoned { .. }]));
}

#[tokio::test]
async fn dry_run_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir);
    config.catalogs.push(catalog(&server, &dir, 0));
    config.dry_run = true;

    let (runner, mut rx) = runner_for(config, Arc::new(UnixDecryptor));
    let outcome = runner.process(&QueueItem::new("Game.zip", 0), "1/1").await;

    assert_eq!(outcome, ItemOutcome::Completed);
    assert!(!dir.path().join("staging").exists());
    let events = drain(&mut rx);
    assert!(matches!(events.as_slice(), [Event::ItemStarted { url, .. }, Event::Complete { .. }] if url.ends_with("/files/c0/Game.zip")));
}
