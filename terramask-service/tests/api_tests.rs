//! Integration tests for the HTTP API.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use terramask::{ElevationCache, ElevationGrid, TerrainEngine, TileBounds, TileKey};
use terramask_service::{router, AppState};

/// Write a cache over lon 26..=28, lat 37..=39 with only the centre tile
/// present, flat at `elevation`.
fn create_test_cache(dir: &Path, elevation: i16) -> PathBuf {
    let path = dir.join("aegean.dtc");
    ElevationCache::with_bounds(
        TileBounds::new(26, 37, 28, 39),
        121,
        [(TileKey::new(27, 38), ElevationGrid::filled(121, elevation).unwrap())],
    )
    .unwrap()
    .save(&path)
    .unwrap();
    path
}

fn create_test_server(engine: TerrainEngine) -> TestServer {
    TestServer::new(router(Arc::new(AppState { engine }))).unwrap()
}

fn loaded_server(temp_dir: &TempDir, elevation: i16) -> TestServer {
    let path = create_test_cache(temp_dir.path(), elevation);
    create_test_server(TerrainEngine::builder().cache_file(path).build())
}

#[tokio::test]
async fn test_elevation_endpoint_success() {
    let temp_dir = TempDir::new().unwrap();
    let server = loaded_server(&temp_dir, 500);

    let response = server.get("/elevation?lat=38.5&lon=27.5").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["elevation"], 500.0);
    assert_eq!(json["lat"], 38.5);
    assert_eq!(json["lon"], 27.5);
}

#[tokio::test]
async fn test_elevation_endpoint_no_data() {
    let temp_dir = TempDir::new().unwrap();
    let server = loaded_server(&temp_dir, 500);

    // Inside the bounds but over an absent tile
    let response = server.get("/elevation?lat=37.5&lon=26.5").await;
    response.assert_status_ok();
    assert!(response.json::<Value>()["elevation"].is_null());

    // Outside the bounds
    let response = server.get("/elevation?lat=50.0&lon=50.0").await;
    response.assert_status_ok();
    assert!(response.json::<Value>()["elevation"].is_null());
}

#[tokio::test]
async fn test_elevation_endpoint_unloaded_engine() {
    let server = create_test_server(TerrainEngine::new());

    let response = server.get("/elevation?lat=38.5&lon=27.5").await;
    response.assert_status_ok();
    assert!(response.json::<Value>()["elevation"].is_null());
}

#[tokio::test]
async fn test_elevation_endpoint_malformed_query() {
    let server = create_test_server(TerrainEngine::new());

    let response = server.get("/elevation?lat=abc&lon=27.5").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_grid_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let server = loaded_server(&temp_dir, 500);

    let response = server
        .get("/grid?lat=38.5&lon=27.5&radius_km=5&resolution=5")
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    let elevations = json["elevations"].as_array().unwrap();
    assert_eq!(elevations.len(), 25);
    // Centre sample
    assert_eq!(elevations[12], 500.0);
    assert_eq!(json["min_elevation"], 500.0);
    assert_eq!(json["max_elevation"], 500.0);
}

#[tokio::test]
async fn test_grid_endpoint_rejects_bad_parameters() {
    let server = create_test_server(TerrainEngine::new());

    let response = server.get("/grid?lat=38.5&lon=27.5&radius_km=0").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("radius_km"));

    let response = server
        .get("/grid?lat=38.5&lon=27.5&radius_km=5&resolution=100000")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mask_endpoint_flat_terrain() {
    let temp_dir = TempDir::new().unwrap();
    let server = loaded_server(&temp_dir, 500);

    let response = server
        .get("/mask?lat=38.5&lon=27.5&alt=510&range_m=10000&azimuths=36&samples=50")
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    let profiles = json["profiles"].as_array().unwrap();
    assert_eq!(profiles.len(), 36);
    assert_eq!(json["azimuth_step_deg"], 10.0);
    assert_eq!(json["cache_version"], 1);
    for profile in profiles {
        // Sensor sits above a flat plain: every mask angle looks down
        assert!(profile["mask_angle_deg"].as_f64().unwrap() < 0.0);
    }
}

#[tokio::test]
async fn test_mask_endpoint_invalid_parameters() {
    let server = create_test_server(TerrainEngine::new());

    let response = server.get("/mask?lat=38.5&lon=27.5&alt=100&samples=0").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("num_samples"));

    let response = server.get("/mask?lat=95&lon=27.5&alt=100").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/mask?lat=38.5&lon=27.5&alt=100&azimuths=100000").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_visibility_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let server = loaded_server(&temp_dir, 500);
    let base = "/visibility?sensor_lat=38.5&sensor_lon=27.5&sensor_alt=510\
                &target_lat=38.55&target_lon=27.5&range_m=10000&azimuths=36&samples=50";

    let response = server.get(&format!("{}&target_alt=1500", base)).await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["visible"], true);
    assert!(json["margin_deg"].as_f64().unwrap() > 0.0);
    assert!(json["bearing_deg"].as_f64().unwrap().abs() < 1e-9);

    let response = server.get(&format!("{}&target_alt=0", base)).await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["visible"], false);
}

#[tokio::test]
async fn test_stats_endpoint_counts_mask_reuse() {
    let temp_dir = TempDir::new().unwrap();
    let server = loaded_server(&temp_dir, 500);

    let response = server.get("/stats").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["loaded"], true);
    assert_eq!(json["cache_hits"], 0);
    assert_eq!(json["cache_misses"], 0);

    let query = "/mask?lat=38.5&lon=27.5&alt=510&range_m=5000&azimuths=8&samples=10";
    server.get(query).await.assert_status_ok();
    server.get(query).await.assert_status_ok();

    let json: Value = server.get("/stats").await.json();
    assert_eq!(json["cache_hits"], 1);
    assert_eq!(json["cache_misses"], 1);
    assert_eq!(json["tiles_present"], 1);
}

#[tokio::test]
async fn test_reload_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_test_cache(temp_dir.path(), 500);
    let server = create_test_server(TerrainEngine::builder().cache_file(&path).build());

    // Rebuild the file in place, then reload
    create_test_cache(temp_dir.path(), 700);
    let response = server.post("/reload").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["cache_version"], 2);
    assert_eq!(json["tiles_present"], 1);
    assert_eq!(json["min_lon"], 26);
    assert_eq!(json["max_lat"], 39);

    let json: Value = server.get("/elevation?lat=38.5&lon=27.5").await.json();
    assert_eq!(json["elevation"], 700.0);

    // A broken file is rejected and the loaded terrain keeps serving
    fs::write(&path, b"DTCACHE9 not a cache").unwrap();
    let response = server.post("/reload").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let json: Value = server.get("/elevation?lat=38.5&lon=27.5").await.json();
    assert_eq!(json["elevation"], 700.0);
}

#[tokio::test]
async fn test_reload_without_cache_file() {
    let server = create_test_server(TerrainEngine::new());

    let response = server.post("/reload").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server(TerrainEngine::new());

    let response = server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["loaded"], false);
    assert!(json["version"].as_str().is_some());
}
