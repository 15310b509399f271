//! End-to-end tests for enriching saved articles: load from the store,
//! enrich in batches against a mock scrape API, write enriched bodies back.

use newsdesk::content::{ContentEnricher, Enrichment, EnrichmentSettings, SkipReason};
use newsdesk::storage::{Article, StoreHandle};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn enricher_for(server: &MockServer, key: Option<&str>) -> ContentEnricher {
    ContentEnricher::new(
        reqwest::Client::new(),
        key.map(str::to_string),
        EnrichmentSettings {
            base_url: server.uri(),
            batch_size: 2,
            batch_delay: Duration::from_millis(20),
            ..EnrichmentSettings::default()
        },
    )
}

/// Enrich everything in the store and persist enriched articles.
async fn enrich_store(store: &StoreHandle, enricher: &ContentEnricher) -> (u64, usize) {
    let db = store.get().await.unwrap();
    let articles = db.list_all().await.unwrap();
    let mut updated = 0;
    let mut failed = 0;
    for result in enricher.extract_batch(&articles).await {
        match result {
            Enrichment::Enriched(article) => updated += db.update(&article).await.unwrap(),
            Enrichment::Unchanged {
                reason: SkipReason::Failed(_),
                ..
            } => failed += 1,
            Enrichment::Unchanged { .. } => {}
        }
    }
    (updated, failed)
}

async fn seed(store: &StoreHandle) {
    let db = store.get().await.unwrap();
    db.insert(&Article::new("https://news.example.com/short", "Short").with_content("Teaser only"))
        .await
        .unwrap();
    db.insert(&Article::new("https://news.example.com/empty", "Empty"))
        .await
        .unwrap();
    db.insert(&Article::new("https://news.example.com/long", "Long").with_content("w".repeat(600)))
        .await
        .unwrap();
    db.insert(&Article::new("https://news.example.com/broken", "Broken"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_enrich_saved_articles_writes_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(body_partial_json(json!({ "url": "https://news.example.com/broken" })))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "markdown": "## Menu\n* Home\n\nThe full story.\n\n\n\nSecond paragraph." }
        })))
        // short + empty; the long article is never requested
        .expect(2)
        .mount(&server)
        .await;

    let store = StoreHandle::in_memory();
    seed(&store).await;

    let (updated, failed) = enrich_store(&store, &enricher_for(&server, Some("key"))).await;
    assert_eq!(updated, 2);
    assert_eq!(failed, 1);

    let bodies: Vec<(String, Option<String>)> = store
        .get()
        .await
        .unwrap()
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.url, a.content))
        .collect();
    let full = Some("The full story.\n\nSecond paragraph.".to_string());
    assert_eq!(
        bodies,
        vec![
            ("https://news.example.com/short".to_string(), full.clone()),
            ("https://news.example.com/empty".to_string(), full),
            ("https://news.example.com/long".to_string(), Some("w".repeat(600))),
            ("https://news.example.com/broken".to_string(), None),
        ]
    );
}

#[tokio::test]
async fn test_unconfigured_enrichment_changes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = StoreHandle::in_memory();
    seed(&store).await;
    let before = store.get().await.unwrap().list_all().await.unwrap();

    let (updated, failed) = enrich_store(&store, &enricher_for(&server, None)).await;
    assert_eq!((updated, failed), (0, 0));

    let after = store.get().await.unwrap().list_all().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_enrichment_of_deleted_article_is_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "markdown": "Full text" }
        })))
        .mount(&server)
        .await;

    let store = StoreHandle::in_memory();
    let db = store.get().await.unwrap();
    let article = Article::new("https://news.example.com/gone", "Gone");
    db.insert(&article).await.unwrap();

    let enrichment = enricher_for(&server, Some("key")).extract_one(&article).await;
    assert!(enrichment.is_enriched());

    // Removed while the request was in flight: the write-back touches nothing
    db.delete(&article.url).await.unwrap();
    assert_eq!(db.update(&enrichment.into_article()).await.unwrap(), 0);
    assert_eq!(db.count().await.unwrap(), 0);
}
