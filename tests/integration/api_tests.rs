//! Liveness, slide info and tile serving through the router.

use axum::http::{header, StatusCode};

use slidescope::server::RouterConfig;

use super::test_utils::{
    assert_error, body_bytes, body_json, decode_tile, three_level_slide, PyramidTiff, TestApp,
};

// =============================================================================
// Liveness
// =============================================================================

#[tokio::test]
async fn test_root_reports_live() {
    let app = TestApp::new().await;

    let response = app.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "live");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Slide info
// =============================================================================

#[tokio::test]
async fn test_info_lists_native_levels() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let response = app.get("/info/scan.tiff").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["width"], 600);
    assert_eq!(json["height"], 400);
    assert_eq!(json["tile_size"], 256);
    assert_eq!(json["levels"], 3);
    assert_eq!(
        json["level_dimensions"],
        serde_json::json!([[600, 400], [300, 200], [150, 100]])
    );
}

#[tokio::test]
async fn test_info_unknown_slide() {
    let app = TestApp::new().await;
    assert_error(app.get("/info/missing.svs").await, StatusCode::NOT_FOUND, "not_found").await;
}

#[tokio::test]
async fn test_info_undecodable_slide() {
    let app = TestApp::new().await;
    app.add_slide("notes.txt", b"this is not a slide at all");

    assert_error(
        app.get("/info/notes.txt").await,
        StatusCode::INTERNAL_SERVER_ERROR,
        "decode_error",
    )
    .await;
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_headers_and_cache_flag() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let first = app.get("/tiles/scan.tiff/2/0_0.jpeg").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        first.headers()[header::CACHE_CONTROL],
        "public, max-age=86400"
    );
    assert_eq!(first.headers()["x-tile-cache-hit"], "false");
    let first_bytes = body_bytes(first).await;

    let second = app.get("/tiles/scan.tiff/2/0_0.jpeg").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-tile-cache-hit"], "true");
    assert_eq!(body_bytes(second).await, first_bytes);
}

#[tokio::test]
async fn test_tile_cache_max_age_is_configurable() {
    let app = TestApp::with_config(RouterConfig::new().with_cache_max_age(60)).await;
    app.add_slide("scan.tiff", &three_level_slide());

    let response = app.get("/tiles/scan.tiff/0/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
}

#[tokio::test]
async fn test_tile_dimensions_follow_level_edges() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    // zoom 2 is the 600x400 level: 3x2 tiles
    let cases = [
        ("/tiles/scan.tiff/2/0_0.jpeg", (256, 256)),
        ("/tiles/scan.tiff/2/2_1.jpeg", (88, 144)),
        ("/tiles/scan.tiff/1/1_0.jpeg", (44, 200)),
        ("/tiles/scan.tiff/0/0_0.jpeg", (150, 100)),
    ];
    for (uri, expected) in cases {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        let tile = decode_tile(&body_bytes(response).await);
        assert_eq!(tile.dimensions(), expected, "{}", uri);
    }
}

#[tokio::test]
async fn test_tile_pixels_come_from_the_slide() {
    let app = TestApp::new().await;
    let slide = PyramidTiff::new()
        .level(512, 512)
        .level(256, 256)
        .color([20, 200, 60])
        .build();
    app.add_slide("green.tiff", &slide);

    let response = app.get("/tiles/green.tiff/1/1_1.jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    let tile = decode_tile(&body_bytes(response).await);

    let px = tile.get_pixel(128, 128).0;
    for (got, want) in px.iter().zip([20u8, 200, 60]) {
        assert!(got.abs_diff(want) <= 8, "pixel {:?}", px);
    }
}

#[tokio::test]
async fn test_tile_repeat_requests_return_same_bytes() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let response = app.get("/tiles/scan.tiff/1/0_0.jpeg").await;
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(body_bytes(response).await);
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

// =============================================================================
// Tile errors
// =============================================================================

#[tokio::test]
async fn test_tile_unknown_slide() {
    let app = TestApp::new().await;
    assert_error(
        app.get("/tiles/nope.svs/0/0_0.jpeg").await,
        StatusCode::NOT_FOUND,
        "not_found",
    )
    .await;
}

#[tokio::test]
async fn test_tile_zoom_without_native_level() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    assert_error(
        app.get("/tiles/scan.tiff/3/0_0.jpeg").await,
        StatusCode::NOT_FOUND,
        "invalid_zoom",
    )
    .await;
}

#[tokio::test]
async fn test_tile_outside_grid() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    for uri in ["/tiles/scan.tiff/2/3_0.jpeg", "/tiles/scan.tiff/0/0_1.jpeg"] {
        assert_error(app.get(uri).await, StatusCode::NOT_FOUND, "out_of_bounds").await;
    }
}

#[tokio::test]
async fn test_tile_outside_grid_ignores_stray_cache_file() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let stray = app.tile_path("scan.tiff", 2, 9, 9);
    std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
    std::fs::write(&stray, b"\xFF\xD8stale\xFF\xD9").unwrap();

    assert_error(
        app.get("/tiles/scan.tiff/2/9_9.jpeg").await,
        StatusCode::NOT_FOUND,
        "out_of_bounds",
    )
    .await;
}

#[tokio::test]
async fn test_tile_malformed_names() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    for uri in [
        "/tiles/scan.tiff/0/0_0.jpg",
        "/tiles/scan.tiff/0/0-0.jpeg",
        "/tiles/scan.tiff/0/a_0.jpeg",
        "/tiles/scan.tiff/0/-1_0.jpeg",
        "/tiles/scan.tiff/x/0_0.jpeg",
        "/tiles/scan.tiff/-1/0_0.jpeg",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_tile_path_traversal_is_not_found() {
    let app = TestApp::new().await;
    app.add_slide("scan.tiff", &three_level_slide());

    let response = app.get("/tiles/..%2Fslides%2Fscan.tiff/0/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
