//! On-disk tile cache behaviour observed through the router.

use axum::http::StatusCode;

use super::test_utils::{body_bytes, count_files, three_level_slide, TestApp};

#[tokio::test]
async fn test_rendered_tile_is_written_to_cache_layout() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let response = app.get("/tiles/scan.tiff/2/1_1.jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    let served = body_bytes(response).await;

    let path = app.tile_path("scan.tiff", 2, 1, 1);
    assert_eq!(std::fs::read(&path).unwrap(), served.to_vec());

    // nothing but the published tile, no temporary files
    assert_eq!(count_files(&app.tile_dir), 1);
}

#[tokio::test]
async fn test_errors_write_nothing() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    for uri in [
        "/tiles/scan.tiff/7/0_0.jpeg",
        "/tiles/scan.tiff/0/5_5.jpeg",
        "/tiles/missing.tiff/0/0_0.jpeg",
    ] {
        assert_eq!(app.get(uri).await.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(count_files(&app.tile_dir), 0);
}

#[tokio::test]
async fn test_cached_file_is_served_as_is() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let first = app.get("/tiles/scan.tiff/0/0_0.jpeg").await;
    assert_eq!(first.status(), StatusCode::OK);

    let path = app.tile_path("scan.tiff", 0, 0, 0);
    let marker = b"\xFF\xD8cached\xFF\xD9".to_vec();
    std::fs::write(&path, &marker).unwrap();

    let second = app.get("/tiles/scan.tiff/0/0_0.jpeg").await;
    assert_eq!(second.headers()["x-tile-cache-hit"], "true");
    assert_eq!(body_bytes(second).await.to_vec(), marker);
}

#[tokio::test]
async fn test_tile_budget_evicts_least_recently_used() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    // measure one tile, then size a budget that holds about two
    let first = app.get("/tiles/scan.tiff/2/0_0.jpeg").await;
    let tile_bytes = body_bytes(first).await.len() as u64;
    drop(app);

    let app = TestApp::with_tile_budget(Some(tile_bytes * 2 + tile_bytes / 2)).await;
    app.add_slide("scan.tiff", &three_level_slide());

    // full-resolution interior tiles share one size
    for uri in [
        "/tiles/scan.tiff/2/0_0.jpeg",
        "/tiles/scan.tiff/2/1_0.jpeg",
    ] {
        assert_eq!(app.get(uri).await.status(), StatusCode::OK);
    }
    // touch 0_0 so 1_0 becomes the oldest
    let hit = app.get("/tiles/scan.tiff/2/0_0.jpeg").await;
    assert_eq!(hit.headers()["x-tile-cache-hit"], "true");

    let response = app.get("/tiles/scan.tiff/1/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(app.tile_path("scan.tiff", 2, 0, 0).is_file());
    assert!(!app.tile_path("scan.tiff", 2, 1, 0).exists());
    assert!(app.tile_path("scan.tiff", 1, 0, 0).is_file());

    let again = app.get("/tiles/scan.tiff/2/1_0.jpeg").await;
    assert_eq!(again.headers()["x-tile-cache-hit"], "false");
}
