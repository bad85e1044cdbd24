//! TMDB Catalog Tests
//!
//! Exercises the TMDB-backed catalog against a mock server: season
//! enumeration with specials filtered out, episode listing, cross-reference
//! lookup for both media kinds, and the rate-limit retry loop.

use mockito::Server;
use reelplay::catalog::{CatalogClient, TmdbCatalog};
use reelplay::models::MediaKind;

fn catalog(base_url: &str) -> TmdbCatalog {
    TmdbCatalog::with_base_url("test-key", base_url)
}

// =============================================================================
// Season and Episode Enumeration
// =============================================================================

#[tokio::test]
async fn test_season_numbers_excludes_specials() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/tv/70523")
        .match_header("Authorization", "Bearer test-key")
        .with_status(200)
        .with_body(
            r#"{"seasons": [
                {"season_number": 0},
                {"season_number": 1},
                {"season_number": 2},
                {"season_number": 3}
            ]}"#,
        )
        .create_async()
        .await;

    let seasons = catalog(&server.url()).season_numbers(70523).await.unwrap();
    assert_eq!(seasons, vec![1, 2, 3]);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_season_episodes_returns_numbered_entries() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/tv/70523/season/1")
        .with_status(200)
        .with_body(
            r#"{"episodes": [
                {"episode_number": 1, "name": "Secrets"},
                {"episode_number": 2, "name": "Lies"}
            ]}"#,
        )
        .create_async()
        .await;

    let episodes = catalog(&server.url())
        .season_episodes(70523, 1)
        .await
        .unwrap();
    assert_eq!(episodes.len(), 2);
    assert_eq!(episodes[0].number, 1);
    assert_eq!(episodes[0].name, "Secrets");
    assert_eq!(episodes[1].number, 2);
    assert_eq!(episodes[1].name, "Lies");
}

// =============================================================================
// Cross-Reference Lookup
// =============================================================================

#[tokio::test]
async fn test_cross_reference_id_for_series() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/tv/70523/external_ids")
        .with_status(200)
        .with_body(r#"{"imdb_id": "tt5753856"}"#)
        .create_async()
        .await;

    let id = catalog(&server.url())
        .cross_reference_id(70523, MediaKind::Series)
        .await
        .unwrap();
    assert_eq!(id.as_deref(), Some("tt5753856"));
}

#[tokio::test]
async fn test_cross_reference_id_for_movie() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/movie/414906/external_ids")
        .with_status(200)
        .with_body(r#"{"imdb_id": "tt1877830"}"#)
        .create_async()
        .await;

    let id = catalog(&server.url())
        .cross_reference_id(414906, MediaKind::Movie)
        .await
        .unwrap();
    assert_eq!(id.as_deref(), Some("tt1877830"));
}

#[tokio::test]
async fn test_empty_cross_reference_id_is_none() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/tv/99999/external_ids")
        .with_status(200)
        .with_body(r#"{"imdb_id": ""}"#)
        .create_async()
        .await;

    let id = catalog(&server.url())
        .cross_reference_id(99999, MediaKind::Series)
        .await
        .unwrap();
    assert_eq!(id, None);
}

// =============================================================================
// Rate Limiting
// =============================================================================

#[tokio::test]
async fn test_handles_rate_limit() {
    let mut server = Server::new_async().await;

    // First request gets rate limited
    let rate_limit_mock = server
        .mock("GET", "/tv/70523")
        .with_status(429)
        .with_header("Retry-After", "1")
        .with_body(r#"{"status_message": "Rate limit exceeded"}"#)
        .expect(1)
        .create_async()
        .await;

    // Second request succeeds
    let success_mock = server
        .mock("GET", "/tv/70523")
        .with_status(200)
        .with_body(r#"{"seasons": [{"season_number": 1}]}"#)
        .expect(1)
        .create_async()
        .await;

    let seasons = catalog(&server.url()).season_numbers(70523).await.unwrap();
    assert_eq!(seasons, vec![1]);

    rate_limit_mock.assert_async().await;
    success_mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/tv/1/season/9")
        .with_status(404)
        .with_body(r#"{"status_message": "The resource you requested could not be found."}"#)
        .create_async()
        .await;

    let result = catalog(&server.url()).season_episodes(1, 9).await;
    assert!(result.is_err());
}
