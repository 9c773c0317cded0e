//! Integration tests for indexing runs
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl-and-index cycle end-to-end against a temporary database.

use lemma_indexer::config::{parse_config, Config, LemmatizerConfig};
use lemma_indexer::crawler::parse_html;
use lemma_indexer::state::SiteStatus;
use lemma_indexer::storage::{lock, open_shared, SharedStorage, Storage};
use lemma_indexer::{IndexerError, IndexingController, Lemmatizer};
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for one site with very short delays
pub fn create_test_config(site_url: &str, db_path: &str, delay_ms: (u64, u64)) -> Config {
    create_pool_config(site_url, db_path, delay_ms, 4)
}

pub fn create_pool_config(
    site_url: &str,
    db_path: &str,
    delay_ms: (u64, u64),
    pool_size: u32,
) -> Config {
    parse_config(&format!(
        r#"
[indexing]
pool-size = {pool}
min-delay-ms = {min}
max-delay-ms = {max}
stop-grace-secs = 5

[fetcher]
user-agent = "TestIndexer/1.0"
timeout-secs = 5

[storage]
database-path = "{db}"

[[sites]]
url = "{site}"
name = "Тестовый сайт"
"#,
        pool = pool_size,
        min = delay_ms.0,
        max = delay_ms.1,
        db = db_path.replace('\\', "/"),
        site = site_url,
    ))
    .expect("test config is valid")
}

/// Opens a fresh database in a temporary directory
pub fn temp_storage() -> (TempDir, String, SharedStorage) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("index.db").to_string_lossy().to_string();
    let storage = open_shared(std::path::Path::new(&db_path)).unwrap();
    (dir, db_path, storage)
}

fn html_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html; charset=utf-8")
}

pub async fn mount_html(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html_response(body))
        .mount(server)
        .await;
}

/// Serves an HTML page only after `delay`
pub async fn mount_slow_html(server: &MockServer, page: &str, body: String, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html_response(body).set_delay(delay))
        .mount(server)
        .await;
}

/// Index key the default lemmatizer stores for a single word
pub fn lemma_key(word: &str) -> String {
    let lemmas = Lemmatizer::new(&LemmatizerConfig::default()).extract_lemmas(word);
    assert_eq!(lemmas.len(), 1, "{} yields one key", word);
    lemmas.into_keys().next().unwrap()
}

fn page_a(base: &str) -> String {
    format!(
        r#"<html><head><title>Главная</title></head><body>
        <p>Кошка спит на диване. Кошка любит молоко.</p>
        <a href="{base}/b">Про собак</a>
        <a href="/c">Про птиц</a>
        <a href="mailto:admin@example.com">Почта</a>
        </body></html>"#
    )
}

fn page_b() -> String {
    r#"<html><body>
        <p>Собака охраняет дом. Собаки и кошки живут рядом.</p>
        <script>var ignored = "скрипт";</script>
        <a href="/">Главная</a>
        </body></html>"#
        .to_string()
}

fn page_c() -> String {
    r#"<html><body>
        <p>Птица поёт утром, птицы улетают осенью.</p>
        <a href="/#top">Наверх</a>
        </body></html>"#
        .to_string()
}

fn ranks_of(storage: &SharedStorage, page_id: i64) -> HashMap<String, u32> {
    lock(storage)
        .unwrap()
        .get_page_index(page_id)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.lemma, entry.rank))
        .collect()
}

#[tokio::test]
async fn test_three_page_site_is_indexed() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", page_a(&base)).await;
    mount_html(&server, "/b", page_b()).await;
    mount_html(&server, "/c", page_c()).await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (0, 10));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();

    // The run task has not been polled yet on the current-thread runtime
    let site = lock(&storage).unwrap().list_sites().unwrap()[0].clone();
    assert_eq!(site.status, SiteStatus::Queued);
    assert!(controller.is_running());

    controller.wait().await.unwrap();
    assert!(!controller.is_running());

    let site = lock(&storage).unwrap().get_site(site.id).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert_eq!(site.name.as_deref(), Some("Тестовый сайт"));
    assert!(site.last_error.is_none());

    let pages = lock(&storage).unwrap().list_pages(site.id).unwrap();
    let mut paths: Vec<_> = pages.iter().map(|p| p.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/", "/b", "/c"]);

    // Each page's ranks are exactly its own lemma counts
    let lemmatizer = Lemmatizer::new(&LemmatizerConfig::default());
    let base_url = Url::parse(&base).unwrap();
    for page in &pages {
        assert_eq!(page.code, 200);
        let text = parse_html(&page.content, &base_url).text;
        let expected = lemmatizer.extract_lemmas(&text);
        assert!(!expected.is_empty());
        assert_eq!(ranks_of(&storage, page.id), expected, "page {}", page.path);
    }

    // "Кошка" on "/" and "кошки" on "/b" share one key
    let cat_key = lemma_key("кошка");
    assert_eq!(cat_key, lemma_key("кошки"));
    let cat = lock(&storage).unwrap().get_lemma(&cat_key).unwrap().unwrap();
    assert_eq!(cat.frequency, 2);

    // Script contents never reach the index
    assert!(lock(&storage).unwrap().get_lemma("скрипт").unwrap().is_none());
}

#[tokio::test]
async fn test_second_run_starts_fresh() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", page_a(&base)).await;
    mount_html(&server, "/b", page_b()).await;
    mount_html(&server, "/c", page_c()).await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (0, 5));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();
    controller.wait().await.unwrap();
    let lemmas_after_first = lock(&storage).unwrap().count_lemmas().unwrap();
    let cat_key = lemma_key("кошка");
    let cat_after_first = lock(&storage).unwrap().get_lemma(&cat_key).unwrap().unwrap();

    controller.start_indexing().unwrap();
    controller.wait().await.unwrap();

    let store = lock(&storage).unwrap();
    assert_eq!(store.list_sites().unwrap().len(), 1);
    assert_eq!(store.count_pages(None).unwrap(), 3);
    assert_eq!(store.count_lemmas().unwrap(), lemmas_after_first);
    assert_eq!(
        store.get_lemma(&cat_key).unwrap().unwrap().frequency,
        cat_after_first.frequency
    );
    assert_eq!(store.list_sites().unwrap()[0].status, SiteStatus::Indexed);
}

#[tokio::test]
async fn test_broken_link_is_recorded() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<html><body><p>Главная страница</p><a href="/missing">Нет</a></body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (0, 5));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();
    controller.wait().await.unwrap();

    let site = lock(&storage).unwrap().list_sites().unwrap()[0].clone();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert!(site.last_error.unwrap().contains("404"));
    assert_eq!(lock(&storage).unwrap().count_pages(Some(site.id)).unwrap(), 1);
}

#[tokio::test]
async fn test_unreachable_root_fails_site() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&server.uri(), &db_path, (0, 5));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();
    controller.wait().await.unwrap();

    let site = lock(&storage).unwrap().list_sites().unwrap()[0].clone();
    assert_eq!(site.status, SiteStatus::Failed);
    assert!(site.last_error.unwrap().contains("500"));
}

#[tokio::test]
async fn test_stop_indexing_cancels_run() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/", page_a(&base)).await;

    let (_dir, db_path, storage) = temp_storage();
    // Long politeness delay keeps the session waiting before its first fetch
    let config = create_test_config(&base, &db_path, (5_000, 6_000));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let site_id = lock(&storage).unwrap().list_sites().unwrap()[0].id;
    assert_eq!(
        lock(&storage).unwrap().get_site(site_id).unwrap().unwrap().status,
        SiteStatus::Indexing
    );

    controller.stop_indexing().await.unwrap();
    assert!(!controller.is_running());

    let site = lock(&storage).unwrap().get_site(site_id).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Failed);
    assert!(site
        .last_error
        .unwrap()
        .contains("cancelled by operator"));
    assert_eq!(lock(&storage).unwrap().count_pages(Some(site_id)).unwrap(), 0);

    // Nothing left to stop
    assert!(matches!(
        controller.stop_indexing().await,
        Err(IndexerError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_stop_mid_crawl_stores_nothing_more() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/p{}">Страница</a>"#, i))
        .collect();
    mount_html(
        &server,
        "/",
        format!("<html><body><p>Главная страница</p>{}</body></html>", links),
    )
    .await;
    for i in 0..10 {
        mount_slow_html(
            &server,
            &format!("/p{}", i),
            "<html><body><p>Медленная страница</p></body></html>".to_string(),
            Duration::from_millis(300),
        )
        .await;
    }

    let (_dir, db_path, storage) = temp_storage();
    // One worker: the remaining children wait on the pool
    let config = create_pool_config(&base, &db_path, (0, 0), 1);
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;

    let site_id = lock(&storage).unwrap().list_sites().unwrap()[0].id;
    let pages_at_stop = lock(&storage).unwrap().count_pages(Some(site_id)).unwrap();
    assert!(pages_at_stop >= 1, "the root is indexed before the stop");

    controller.stop_indexing().await.unwrap();

    // The fetch in flight at the stop finishes but its page is dropped,
    // and queued children never fetch
    tokio::time::sleep(Duration::from_millis(400)).await;
    let pages_after = lock(&storage).unwrap().count_pages(Some(site_id)).unwrap();
    assert_eq!(pages_after, pages_at_stop);
    assert!(pages_after < 11);

    let site = lock(&storage).unwrap().get_site(site_id).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Failed);
    assert!(site.last_error.unwrap().contains("cancelled by operator"));
}

#[tokio::test]
async fn test_start_during_stop_conflicts() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_slow_html(
        &server,
        "/",
        "<html><body><p>Главная страница</p></body></html>".to_string(),
        Duration::from_millis(1_000),
    )
    .await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (0, 0));
    let controller = IndexingController::new(config, storage.clone()).unwrap();

    controller.start_indexing().unwrap();
    // The root fetch is in flight, so the stop has to drain it
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (stopped, (restart, second_stop, running)) = tokio::join!(controller.stop_indexing(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        (
            controller.start_indexing(),
            controller.stop_indexing().await,
            controller.is_running(),
        )
    });

    stopped.unwrap();
    assert!(matches!(restart, Err(IndexerError::Conflict(_))));
    assert!(matches!(second_stop, Err(IndexerError::Conflict(_))));
    assert!(running);
    assert!(!controller.is_running());

    let site_id = lock(&storage).unwrap().list_sites().unwrap()[0].id;
    assert_eq!(lock(&storage).unwrap().count_pages(Some(site_id)).unwrap(), 0);

    // Once drained, a new run may start
    controller.start_indexing().unwrap();
    controller.wait().await.unwrap();
    let site = lock(&storage).unwrap().get_site(site_id).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert_eq!(lock(&storage).unwrap().count_pages(Some(site_id)).unwrap(), 1);
}

#[tokio::test]
async fn test_start_while_running_conflicts() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/", page_a(&base)).await;

    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config(&base, &db_path, (5_000, 6_000));
    let controller = IndexingController::new(config, storage).unwrap();

    controller.start_indexing().unwrap();
    assert!(matches!(
        controller.start_indexing(),
        Err(IndexerError::Conflict(_))
    ));

    controller.stop_indexing().await.unwrap();
}

#[tokio::test]
async fn test_stop_when_idle_conflicts() {
    let (_dir, db_path, storage) = temp_storage();
    let config = create_test_config("https://example.com", &db_path, (0, 5));
    let controller = IndexingController::new(config, storage).unwrap();

    assert!(matches!(
        controller.stop_indexing().await,
        Err(IndexerError::Conflict(_))
    ));
    // Waiting with nothing running returns at once
    controller.wait().await.unwrap();
}

#[tokio::test]
async fn test_start_without_sites() {
    let (_dir, db_path, storage) = temp_storage();
    let config = parse_config(&format!(
        "[storage]\ndatabase-path = \"{}\"\n",
        db_path.replace('\\', "/")
    ))
    .unwrap();
    let controller = IndexingController::new(config, storage).unwrap();

    assert!(matches!(
        controller.start_indexing(),
        Err(IndexerError::Config(_))
    ));
    assert!(!controller.is_running());
}
