use crate::common::{mount_site, site_config};
use catalog_harvest::harvest::{HarvestOptions, Orchestrator};
use catalog_harvest::output::{
    default_export_path, export_session, import_session, load_session_report, read_export,
    write_export, write_markdown_report, ExportFormat,
};
use catalog_harvest::query::QueryService;
use catalog_harvest::storage::{SqliteStorage, Storage};
use chrono::Utc;
use std::path::Path;
use wiremock::MockServer;

async fn harvest_into(db_path: &Path) -> String {
    let site = MockServer::start().await;
    mount_site(&site, 2).await;

    let config = site_config(&site.uri(), db_path, None);
    let orchestrator =
        Orchestrator::from_config(&config, SqliteStorage::new(db_path).unwrap(), false).unwrap();
    orchestrator
        .run_session(&HarvestOptions::default())
        .await
        .unwrap()
        .session_id
}

#[tokio::test]
async fn test_export_import_across_databases() {
    let dir = tempfile::tempdir().unwrap();
    let source_db = dir.path().join("source.db");
    let session = harvest_into(&source_db).await;

    let source = SqliteStorage::new(&source_db).unwrap();
    let original = export_session(&source, &session).unwrap();
    assert_eq!(original.categories.len(), 4);
    assert_eq!(original.products.len(), 25);

    let export_path = default_export_path(
        &dir.path().join("exports"),
        &session,
        ExportFormat::Json,
        Utc::now(),
    );
    write_export(&original, &export_path).unwrap();

    let target_db = dir.path().join("target.db");
    let imported = {
        let mut target = SqliteStorage::new(&target_db).unwrap();
        import_session(&mut target, &read_export(&export_path).unwrap(), Utc::now()).unwrap()
    };
    assert_ne!(imported, session);

    let target = SqliteStorage::new(&target_db).unwrap();
    let reexported = export_session(&target, &imported).unwrap();
    assert_eq!(reexported.without_identity(), original.without_identity());

    let query = QueryService::new(&target);
    let hits = query.search("Catalog item 1", Some(&imported), None).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(query.hierarchy(&imported).unwrap().len(), 4);
}

#[tokio::test]
async fn test_markdown_report_of_harvested_session() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let session = harvest_into(&db_path).await;

    let storage = SqliteStorage::new(&db_path).unwrap();
    let report = load_session_report(&storage, &session).unwrap();
    let path = dir.path().join("reports").join("session.md");
    write_markdown_report(&report, &path).unwrap();

    let markdown = std::fs::read_to_string(&path).unwrap();
    assert!(markdown.contains(&format!("- **Session ID**: {}", session)));
    assert!(markdown.contains("- **Products**: 25"));
    assert!(markdown.contains("  - Televisions (leaf, 25 products)"));
    assert_eq!(storage.list_sessions(10).unwrap().len(), 1);
}
