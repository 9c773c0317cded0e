//! Integration tests for single-page indexing

use crate::crawl_tests::{create_test_config, lemma_key, mount_html, temp_storage};
use lemma_indexer::state::SiteStatus;
use lemma_indexer::storage::{lock, Storage};
use lemma_indexer::{IndexerError, IndexingController};
use wiremock::MockServer;

#[tokio::test]
async fn test_process_page_reindexes_in_place() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(
        &server,
        "/news",
        "<html><body><p>Новости дня: новости города</p></body></html>".to_string(),
    )
    .await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (0, 5));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    let site_id = lock(&storage)
        .unwrap()
        .upsert_site(&format!("{}/", base), None)
        .unwrap();

    let first = controller
        .process_page(&format!("{}/news", base), site_id)
        .await
        .unwrap();
    let second = controller
        .process_page(&format!("{}/news#comments", base), site_id)
        .await
        .unwrap();

    let store = lock(&storage).unwrap();
    assert!(store.get_page(first).unwrap().is_none());
    let page = store.get_page(second).unwrap().unwrap();
    assert_eq!(page.path, "/news");
    assert_eq!(store.count_pages(Some(site_id)).unwrap(), 1);

    // "Новости" and "новости" count under one key
    let news_key = lemma_key("новости");
    let news = store.get_lemma(&news_key).unwrap().unwrap();
    assert_eq!(news.frequency, 1);
    let index = store.get_page_index(second).unwrap();
    let rank = index.iter().find(|e| e.lemma == news_key).unwrap().rank;
    assert_eq!(rank, 2);

    // Single-page indexing leaves the site status alone
    assert_eq!(
        store.get_site(site_id).unwrap().unwrap().status,
        SiteStatus::Queued
    );
}

#[tokio::test]
async fn test_process_page_unknown_site() {
    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config("https://example.com", &db_path, (0, 5));
    let controller = IndexingController::new(config, storage).unwrap();

    let result = controller
        .process_page("https://example.com/page", 42)
        .await;
    assert!(matches!(result, Err(IndexerError::NotFound(_))));
}

#[tokio::test]
async fn test_process_page_outside_site() {
    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config("https://example.com", &db_path, (0, 5));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    let site_id = lock(&storage)
        .unwrap()
        .upsert_site("https://example.com/", None)
        .unwrap();

    let result = controller
        .process_page("https://other.org/page", site_id)
        .await;
    assert!(matches!(result, Err(IndexerError::OutsideSite { .. })));
}

#[tokio::test]
async fn test_process_page_fetch_failure() {
    let server = MockServer::start().await;
    let base = server.uri();

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (0, 5));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    let site_id = lock(&storage)
        .unwrap()
        .upsert_site(&format!("{}/", base), None)
        .unwrap();

    // Unmatched requests get a 404 from the mock server
    let result = controller
        .process_page(&format!("{}/gone", base), site_id)
        .await;
    assert!(matches!(result, Err(IndexerError::Fetch(_))));
    assert_eq!(lock(&storage).unwrap().count_pages(Some(site_id)).unwrap(), 0);
}
