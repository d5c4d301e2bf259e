//! End-to-end harvest runs against a mock listing site

use crate::common::{
    card, listing, mount_empty_fallback, mount_page, mount_thumbnail, test_config, LISTING_PATH,
};
use catalog_harvest::crawler::{run_harvest, Pipeline};
use catalog_harvest::storage::{RunStatus, SqliteSink};
use catalog_harvest::{Field, ImageStatus, RecordKey};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn key(category: &str, title: &str) -> RecordKey {
    RecordKey {
        category: category.to_string(),
        title: title.to_string(),
    }
}

#[tokio::test]
async fn test_full_harvest_single_category() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "pc",
        1,
        listing(&[card("Hades", "hades"), card("Celeste", "celeste")]),
    )
    .await;
    mount_page(&server, "pc", 2, listing(&[card("Doom", "doom")])).await;
    mount_empty_fallback(&server).await;
    for slug in ["hades", "celeste", "doom"] {
        mount_thumbnail(&server, slug).await;
    }

    let config = test_config(&server, dir.path(), &["pc"]);
    let (result, sink) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.summary.total_records, 3);
    assert_eq!(result.summary.failed_pages, 0);
    assert_eq!(result.summary.failed_images, 0);
    assert!(!result.summary.cancelled);
    assert_eq!(sink.count_records().unwrap(), 3);

    let hades = &result.records[&key("pc", "Hades")];
    assert_eq!(hades.score, Field::Known("93".to_string()));
    assert_eq!(hades.rating, Field::Known("M".to_string()));
    assert_eq!(hades.release_date, Field::Known("Sep 17, 2020".to_string()));
    assert_eq!(hades.source_url, format!("{}/game/hades/", server.uri()));

    // Canonical asset is missing, so the thumbnail bytes were used
    let image = hades.image.as_ref().unwrap();
    assert_eq!(image.status, ImageStatus::Downloaded);
    assert_eq!(
        image.original_url,
        format!("{}/a/img/catalog/hades.png", server.uri())
    );
    let local = image.local_path.as_ref().unwrap();
    assert!(local.ends_with("pc/Hades.jpg"));
    let bytes = fs::read(local).unwrap();
    assert_eq!(
        image::guess_format(&bytes).unwrap(),
        image::ImageFormat::Jpeg
    );

    let csv = fs::read_to_string(&config.output.csv_path).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.starts_with("title,category,score,"));
    let summary = fs::read_to_string(&config.output.summary_path).unwrap();
    assert!(summary.contains("- **Records**: 3"));

    let run = sink.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash");
}

#[tokio::test]
async fn test_canonical_image_preferred() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "switch", 1, listing(&[card("Zelda", "zelda")])).await;
    mount_empty_fallback(&server).await;
    Mock::given(method("GET"))
        .and(path("/a/img/catalog/zelda.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(crate::common::png_bytes()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a/img/resize/abc123/catalog/zelda.png"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server, dir.path(), &["switch"]);
    let (result, _) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    let record = &result.records[&key("switch", "Zelda")];
    assert_eq!(record.image_status(), Some(ImageStatus::Downloaded));
}

#[tokio::test]
async fn test_broken_image_keeps_record() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "ps4", 1, listing(&[card("Bloodborne", "bloodborne")])).await;
    mount_empty_fallback(&server).await;
    Mock::given(method("GET"))
        .and(path("/a/img/resize/abc123/catalog/bloodborne.png"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not an image</html>"))
        .mount(&server)
        .await;

    let config = test_config(&server, dir.path(), &["ps4"]);
    let (result, sink) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.summary.total_records, 1);
    assert_eq!(result.summary.failed_images, 1);
    let stored = sink.get_record(&key("ps4", "Bloodborne")).unwrap().unwrap();
    assert_eq!(stored.image_status(), Some(ImageStatus::Failed));
    assert_eq!(stored.image.unwrap().local_path, None);
}

#[tokio::test]
async fn test_category_with_no_pages_yields_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "pc", 1, listing(&[card("Hades", "hades")])).await;
    mount_empty_fallback(&server).await;

    let config = test_config(&server, dir.path(), &["wii-u", "pc"]);
    let (result, _) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert!(result.records.keys().all(|k| k.category != "wii-u"));
    assert_eq!(result.summary.total_records, 1);
    assert_eq!(result.summary.failed_pages, 0);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "pc",
        1,
        listing(&[card("Hades", "hades"), card("Celeste", "celeste")]),
    )
    .await;
    mount_page(&server, "ps5", 1, listing(&[card("Hades", "hades")])).await;
    mount_empty_fallback(&server).await;
    for slug in ["hades", "celeste"] {
        mount_thumbnail(&server, slug).await;
    }

    let config = test_config(&server, dir.path(), &["pc", "ps5"]);

    let (first, sink) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();
    let first_count = sink.count_records().unwrap();
    drop(sink);

    let (second, sink) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first_count, 3);
    assert_eq!(sink.count_records().unwrap(), first_count);
    assert_eq!(first.records.len(), second.records.len());

    let images: Vec<_> = fs::read_dir(dir.path().join("images").join("pc"))
        .unwrap()
        .collect();
    assert_eq!(images.len(), 2);
}

#[tokio::test]
async fn test_failed_page_does_not_halt_category() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "pc", 1, listing(&[card("Hades", "hades")])).await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("platform", "pc"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, "pc", 3, listing(&[card("Doom", "doom")])).await;
    mount_empty_fallback(&server).await;

    let mut config = test_config(&server, dir.path(), &["pc"]);
    config.images.enabled = false;

    let (result, sink) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.summary.total_records, 2);
    assert_eq!(result.summary.failed_pages, 1);
    assert!(result.records.contains_key(&key("pc", "Doom")));

    let failures = sink.load_page_failures(sink.run_id()).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task.page, 2);
    assert_eq!(failures[0].error, "server error HTTP 500");
}

#[tokio::test]
async fn test_page_fetches_bounded_by_pool_width() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let categories = ["pc", "ps4", "ps5", "switch", "3ds"];

    for category in categories {
        for page in 1..=3 {
            Mock::given(method("GET"))
                .and(path(LISTING_PATH))
                .and(query_param("platform", category))
                .and(query_param("page", page.to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(listing(&[card(&format!("{} {}", category, page), "x")]))
                        .set_delay(Duration::from_millis(20)),
                )
                .mount(&server)
                .await;
        }
    }
    mount_empty_fallback(&server).await;

    let mut config = test_config(&server, dir.path(), &categories);
    config.pipeline.concurrency = 3;
    config.images.enabled = false;

    let pipeline = Pipeline::from_config(&config).unwrap();
    let sink = SqliteSink::new_in_memory(dir.path().join("images")).unwrap();
    let (result, _) = pipeline
        .run(sink, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.summary.total_records, 15);
    let peak = pipeline.page_gauge().peak();
    assert!((1..=3).contains(&peak), "peak in-flight fetches was {}", peak);
}

#[tokio::test]
async fn test_cancelled_run_is_recorded_as_interrupted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, "pc", 1, listing(&[card("Hades", "hades")])).await;
    mount_empty_fallback(&server).await;

    let config = test_config(&server, dir.path(), &["pc"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (result, sink) = run_harvest(&config, "hash", cancel).await.unwrap();

    assert!(result.summary.cancelled);
    assert_eq!(result.summary.total_records, 0);
    assert_eq!(
        sink.get_latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
    let csv = fs::read_to_string(&config.output.csv_path).unwrap();
    assert_eq!(csv.lines().count(), 1);
}

#[tokio::test]
async fn test_per_category_csv_files() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "pc",
        1,
        listing(&[card("Hades", "hades"), card("Celeste", "celeste")]),
    )
    .await;
    mount_page(&server, "switch", 1, listing(&[card("Zelda", "zelda")])).await;
    mount_empty_fallback(&server).await;

    let mut config = test_config(&server, dir.path(), &["pc", "switch", "wii-u"]);
    config.images.enabled = false;
    config.output.per_category = true;

    let (result, _) = run_harvest(&config, "hash", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.summary.total_records, 3);

    let pc = fs::read_to_string(dir.path().join("games_pc.csv")).unwrap();
    assert_eq!(pc.lines().count(), 3);
    assert!(pc.contains("Hades,pc,"));
    let switch = fs::read_to_string(dir.path().join("games_switch.csv")).unwrap();
    assert_eq!(switch.lines().count(), 2);
    assert!(!dir.path().join("games_wii-u.csv").exists());

    let combined = fs::read_to_string(&config.output.csv_path).unwrap();
    assert_eq!(combined.lines().count(), 4);
}
