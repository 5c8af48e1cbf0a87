use catalog_harvest::model::{
    CategoryType, ConfidenceSource, ExtractedEntity, SessionStatus, PRODUCTS,
};
use catalog_harvest::storage::{NewCategory, NodeUpdate, SqliteStorage, Storage};
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::thread;

#[test]
fn test_data_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    let session = {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        let session = storage
            .create_session(Utc::now(), false, Some("hash"), &json!({}))
            .unwrap();
        let tvs = storage
            .insert_category(&session, &NewCategory::new("Televisions", "/tvs.html"))
            .unwrap();

        let mut tv = ExtractedEntity::named("55\" 4K TV");
        tv.price = Some("$599.99".into());
        storage
            .save_node(
                tvs,
                &NodeUpdate::classified(CategoryType::LeafProduct, ConfidenceSource::Heuristic)
                    .with_products([tv]),
            )
            .unwrap();
        storage
            .finish_session(&session, SessionStatus::Completed)
            .unwrap();
        session
    };

    let storage = SqliteStorage::new(&db_path).unwrap();
    let record = storage.get_session(&session).unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.config_hash.as_deref(), Some("hash"));
    assert_eq!(record.total_categories, 1);
    assert_eq!(record.total_products, 1);

    let products = storage.list_products(Some(&session), 10).unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].name, "55\" 4K TV");
    assert_eq!(products[0].entity_type, PRODUCTS);
}

#[test]
fn test_cleanup_cascades_to_session_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = SqliteStorage::new(&dir.path().join("harvest.db")).unwrap();
    let now = Utc::now();

    let old = storage
        .create_session(now - Duration::days(60), false, None, &json!({}))
        .unwrap();
    let recent = storage
        .create_session(now, false, None, &json!({}))
        .unwrap();

    for session in [&old, &recent] {
        let grocery = storage
            .insert_category(session, &NewCategory::new("Grocery", "/grocery.html"))
            .unwrap();
        let snacks = storage
            .insert_category(
                session,
                &NewCategory::new("Snacks", "/snacks.html").with_parent(Some(grocery)),
            )
            .unwrap();
        storage
            .save_node(
                snacks,
                &NodeUpdate::classified(CategoryType::LeafProduct, ConfidenceSource::Heuristic)
                    .with_products([ExtractedEntity::named("Trail Mix")]),
            )
            .unwrap();
    }

    assert_eq!(storage.purge_sessions_older_than(30, now).unwrap(), 1);

    assert!(storage.get_session(&old).unwrap().is_none());
    assert!(storage.list_categories(Some(&old)).unwrap().is_empty());
    assert!(storage.list_products(Some(&old), 10).unwrap().is_empty());
    assert!(storage.session_links(&old).unwrap().is_empty());

    assert!(storage.get_session(&recent).unwrap().is_some());
    assert_eq!(storage.list_categories(Some(&recent)).unwrap().len(), 2);
    assert_eq!(storage.list_products(Some(&recent), 10).unwrap().len(), 1);

    let stats = storage.database_stats().unwrap();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_categories, 2);
    assert_eq!(stats.total_products, 1);
}

#[test]
fn test_concurrent_sessions_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    // Schema and journal mode are set up once before the writers start
    SqliteStorage::new(&db_path).unwrap();

    let started_at = Utc::now();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db_path = db_path.clone();
            thread::spawn(move || {
                let mut storage = SqliteStorage::new(&db_path).unwrap();
                (0..5)
                    .map(|_| {
                        storage
                            .create_session(started_at, false, None, &json!({}))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: HashSet<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(ids.len(), 20);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.list_sessions(100).unwrap().len(), 20);
}

#[test]
fn test_sitemap_cache_is_keyed_by_source() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let now = Utc::now();

    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        storage
            .put_cached_sitemap("https://shop.example/sitemap", "[1]", now)
            .unwrap();
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    let cached = storage
        .get_cached_sitemap("https://shop.example/sitemap", Duration::hours(24), now)
        .unwrap();
    assert_eq!(cached.as_deref(), Some("[1]"));
    let later = now + Duration::hours(25);
    assert!(storage
        .get_cached_sitemap("https://shop.example/sitemap", Duration::hours(24), later)
        .unwrap()
        .is_none());
    assert!(storage
        .get_cached_sitemap("https://other.example/sitemap", Duration::hours(24), now)
        .unwrap()
        .is_none());
}
