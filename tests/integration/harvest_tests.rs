use crate::common::{category, hits, mount_site, site_config, GeneratorSetup};
use catalog_harvest::harvest::{HarvestEvent, HarvestOptions, Orchestrator};
use catalog_harvest::model::{CategoryType, SessionStatus};
use catalog_harvest::storage::{SqliteStorage, Storage};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listing_answer(label: &str) -> serde_json::Value {
    json!({"candidates": [{"content": {"parts": [{"text": label}]}}]})
}

#[tokio::test]
async fn test_full_harvest_against_mock_site() {
    let site = MockServer::start().await;
    mount_site(&site, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = site_config(&site.uri(), &db_path, None);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let orchestrator = Orchestrator::from_config(&config, storage, false).unwrap();
    assert!(!orchestrator.ai_enabled());

    let summary = orchestrator
        .run_session(&HarvestOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(summary.nodes_scheduled, 4);
    assert_eq!(summary.nodes_visited, 4);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.leaf_count, 1);
    assert_eq!(summary.total_entities, 25);

    // Every node is requested exactly once, including the one that fails
    for route in [
        "/SiteMapDisplayView",
        "/electronics.html",
        "/tvs.html",
        "/audio.html",
        "/kitchen.html",
    ] {
        assert_eq!(hits(&site, route).await, 1, "requests for {}", route);
    }

    // A fresh storage handle on the same file sees the finished session
    let reopened = SqliteStorage::new(&db_path).unwrap();
    let session = reopened.get_session(&summary.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.end_time.is_some());

    let categories = reopened.list_categories(Some(&summary.session_id)).unwrap();
    assert_eq!(categories.len(), 4);

    let tvs = category(&categories, "Televisions");
    assert_eq!(tvs.category_type, CategoryType::LeafProduct);
    assert_eq!(tvs.confidence_source.as_deref(), Some("heuristic"));
    assert_eq!(tvs.parent_id, Some(category(&categories, "Electronics").id));
    assert_eq!(reopened.products_in_category(tvs.id).unwrap().len(), 25);

    let electronics = category(&categories, "Electronics");
    assert_eq!(electronics.category_type, CategoryType::NonLeafNavigation);
    assert_eq!(electronics.confidence_source.as_deref(), Some("forced-default"));

    let audio = category(&categories, "Audio");
    assert_eq!(audio.category_type, CategoryType::Unknown);
    assert!(audio.metadata.get("error").is_some());
}

#[tokio::test]
async fn test_category_filter_and_limit() {
    let site = MockServer::start().await;
    mount_site(&site, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = site_config(&site.uri(), &db_path, None);
    let orchestrator =
        Orchestrator::from_config(&config, SqliteStorage::new(&db_path).unwrap(), false).unwrap();

    let summary = orchestrator
        .run_session(&HarvestOptions {
            limit: Some(2),
            categories: vec!["Electronics".to_string()],
            ..HarvestOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.nodes_scheduled, 2);
    assert_eq!(hits(&site, "/electronics.html").await, 1);
    assert_eq!(hits(&site, "/tvs.html").await, 1);
    assert_eq!(hits(&site, "/audio.html").await, 0);
    assert_eq!(hits(&site, "/kitchen.html").await, 0);
}

#[tokio::test]
async fn test_failing_backend_gives_same_result_as_heuristic_only() {
    let site = MockServer::start().await;
    mount_site(&site, 7).await;

    let generator = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&generator)
        .await;

    let key_env = "CATALOG_HARVEST_TEST_KEY_FAILING";
    std::env::set_var(key_env, "test-key");

    let dir = tempfile::tempdir().unwrap();

    let ai_db = dir.path().join("ai.db");
    let ai_config = site_config(
        &site.uri(),
        &ai_db,
        Some(GeneratorSetup {
            endpoint: &generator.uri(),
            api_key_env: key_env,
        }),
    );
    let with_ai =
        Orchestrator::from_config(&ai_config, SqliteStorage::new(&ai_db).unwrap(), true).unwrap();
    assert!(with_ai.ai_enabled());
    let ai_summary = with_ai.run_session(&HarvestOptions::default()).await.unwrap();

    let plain_db = dir.path().join("plain.db");
    let plain_config = site_config(&site.uri(), &plain_db, None);
    let plain =
        Orchestrator::from_config(&plain_config, SqliteStorage::new(&plain_db).unwrap(), false)
            .unwrap();
    let plain_summary = plain.run_session(&HarvestOptions::default()).await.unwrap();

    // The backend was asked about the inconclusive pages and failed every time
    assert!(!generator.received_requests().await.unwrap().is_empty());

    assert_eq!(ai_summary.status, SessionStatus::Completed);
    assert_eq!(ai_summary.leaf_count, plain_summary.leaf_count);
    assert_eq!(ai_summary.total_entities, plain_summary.total_entities);

    let ai_categories = SqliteStorage::new(&ai_db)
        .unwrap()
        .list_categories(Some(&ai_summary.session_id))
        .unwrap();
    let plain_categories = SqliteStorage::new(&plain_db)
        .unwrap()
        .list_categories(Some(&plain_summary.session_id))
        .unwrap();

    assert_eq!(ai_categories.len(), plain_categories.len());
    for (ai, plain) in ai_categories.iter().zip(&plain_categories) {
        assert_eq!(ai.name, plain.name);
        assert_eq!(ai.category_type, plain.category_type);
        assert_eq!(ai.confidence_source, plain.confidence_source);
    }

    let kitchen = category(&ai_categories, "Kitchen");
    assert_eq!(kitchen.category_type, CategoryType::NonLeafNavigation);
    assert_eq!(kitchen.confidence_source.as_deref(), Some("forced-default"));
}

#[tokio::test]
async fn test_backend_resolves_inconclusive_listing() {
    let site = MockServer::start().await;
    mount_site(&site, 7).await;

    let generator = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_answer("PRODUCT_LISTING")))
        .mount(&generator)
        .await;

    let key_env = "CATALOG_HARVEST_TEST_KEY_LISTING";
    std::env::set_var(key_env, "test-key");

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = site_config(
        &site.uri(),
        &db_path,
        Some(GeneratorSetup {
            endpoint: &generator.uri(),
            api_key_env: key_env,
        }),
    );
    let orchestrator =
        Orchestrator::from_config(&config, SqliteStorage::new(&db_path).unwrap(), true).unwrap();

    let summary = orchestrator
        .run_session(&HarvestOptions {
            categories: vec!["Kitchen".to_string()],
            ..HarvestOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.nodes_scheduled, 1);
    assert_eq!(summary.leaf_count, 1);
    assert_eq!(summary.total_entities, 7);

    let storage = orchestrator.storage();
    let storage = storage.lock().unwrap();
    let session = storage.get_session(&summary.session_id).unwrap().unwrap();
    assert!(session.ai_enabled);

    let categories = storage.list_categories(Some(&summary.session_id)).unwrap();
    let kitchen = category(&categories, "Kitchen");
    assert_eq!(kitchen.category_type, CategoryType::LeafProduct);
    assert_eq!(kitchen.confidence_source.as_deref(), Some("ai"));
}

#[tokio::test]
async fn test_missing_api_key_runs_without_backend() {
    let site = MockServer::start().await;
    mount_site(&site, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = site_config(
        &site.uri(),
        &db_path,
        Some(GeneratorSetup {
            endpoint: "http://127.0.0.1:9",
            api_key_env: "CATALOG_HARVEST_TEST_KEY_NEVER_SET",
        }),
    );

    let orchestrator =
        Orchestrator::from_config(&config, SqliteStorage::new(&db_path).unwrap(), true).unwrap();
    assert!(!orchestrator.ai_enabled());
}

#[tokio::test]
async fn test_unreachable_sitemap_fails_session() {
    let site = MockServer::start().await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = site_config(&site.uri(), &db_path, None);
    let orchestrator =
        Orchestrator::from_config(&config, SqliteStorage::new(&db_path).unwrap(), false).unwrap();
    let mut events = orchestrator.subscribe();

    assert!(orchestrator
        .run_session(&HarvestOptions::default())
        .await
        .is_err());

    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if let HarvestEvent::SessionFinished { status, .. } = event {
            finished = Some(status);
        }
    }
    assert_eq!(finished, Some(SessionStatus::Failed));

    let storage = SqliteStorage::new(&db_path).unwrap();
    let sessions = storage.list_sessions(10).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_second_session_reuses_cached_sitemap() {
    let site = MockServer::start().await;
    mount_site(&site, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = site_config(&site.uri(), &db_path, None);
    let options = HarvestOptions {
        categories: vec!["Kitchen".to_string()],
        ..HarvestOptions::default()
    };

    for _ in 0..2 {
        let orchestrator =
            Orchestrator::from_config(&config, SqliteStorage::new(&db_path).unwrap(), false)
                .unwrap();
        orchestrator.run_session(&options).await.unwrap();
    }
    assert_eq!(hits(&site, "/SiteMapDisplayView").await, 1);
    assert_eq!(hits(&site, "/kitchen.html").await, 2);

    let orchestrator =
        Orchestrator::from_config(&config, SqliteStorage::new(&db_path).unwrap(), false).unwrap();
    orchestrator
        .run_session(&HarvestOptions {
            refresh_sitemap: true,
            ..options
        })
        .await
        .unwrap();
    assert_eq!(hits(&site, "/SiteMapDisplayView").await, 2);
}
