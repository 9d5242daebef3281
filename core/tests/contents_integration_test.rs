//! Contents integration tests against the public API

use nbcloud_core::contents::{
    ArrayUri, Catalog, Content, ContentType, ContentsManager, ContentsSettings, JsonNotebookCodec, MemoryCloud,
    SaveModel, UserProfile, Visibility,
};
use nbcloud_shared::ContentsConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn notebook(source: &str) -> serde_json::Value {
    json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {},
        "cells": [{"cell_type": "markdown", "metadata": {}, "source": source}]
    })
}

fn setup(settings: ContentsSettings) -> (TempDir, MemoryCloud, ContentsManager) {
    let temp_dir = TempDir::new().unwrap();
    let cloud = MemoryCloud::new(UserProfile {
        username: "alice".to_string(),
        organizations: vec!["lab".to_string()],
        default_storage_prefix: Some("s3://notebooks/alice/".to_string()),
        enabled_features: vec![settings.cloud_feature.clone()],
    });
    cloud.add_organization("lab", Some("s3://notebooks/lab/")).unwrap();

    let manager = ContentsManager::with_root_dir(
        temp_dir.path(),
        Arc::new(cloud.clone()),
        Arc::new(cloud.clone()),
        Arc::new(JsonNotebookCodec::new()),
        settings,
    );
    (temp_dir, cloud, manager)
}

#[tokio::test]
async fn test_notebook_lifecycle_in_organization_namespace() {
    let (_temp_dir, cloud, manager) = setup(ContentsSettings::default());

    let saved = manager
        .save(&SaveModel::notebook(notebook("# Lab notes")), "cloud/owned/lab/notes.ipynb")
        .await
        .unwrap();
    assert_eq!(saved.path, "cloud/owned/lab/notes.ipynb");
    assert_eq!(
        cloud.location_of(&ArrayUri::new("lab", "notes")).as_deref(),
        Some("s3://notebooks/lab/notes")
    );

    // The new namespace now shows up in the owned listing
    let owned = manager.get("cloud/owned", true, None, None).await.unwrap();
    let namespaces: Vec<_> = owned.children().unwrap().iter().map(|c| c.path.as_str()).collect();
    assert_eq!(namespaces, vec!["cloud/owned/lab"]);

    let listing = manager.get("cloud/owned/lab", true, None, None).await.unwrap();
    let leaves = listing.children().unwrap();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].path, "cloud/owned/lab/notes.ipynb");
    assert_eq!(leaves[0].kind, ContentType::Notebook);

    manager
        .rename("cloud/owned/lab/notes.ipynb", "cloud/owned/lab/journal.ipynb")
        .await
        .unwrap();
    let model = manager
        .get("cloud/owned/lab/journal.ipynb", true, Some(ContentType::Notebook), None)
        .await
        .unwrap();
    match model.content {
        Some(Content::Notebook(document)) => assert_eq!(document["cells"][0]["source"], json!("# Lab notes")),
        other => panic!("expected a notebook, got {:?}", other),
    }

    // Storage address is unchanged by the rename
    assert_eq!(
        cloud.location_of(&ArrayUri::new("lab", "journal")).as_deref(),
        Some("s3://notebooks/lab/notes")
    );

    manager.delete("cloud/owned/lab/journal.ipynb").await.unwrap();
    assert!(!manager.file_exists("cloud/owned/lab/journal.ipynb").await.unwrap());
}

#[tokio::test]
async fn test_custom_tag_scopes_listings() {
    let settings = ContentsSettings {
        notebook_tag: "__team-notebooks".to_string(),
        ..Default::default()
    };
    let (_temp_dir, cloud, manager) = setup(settings);
    cloud
        .register(&ArrayUri::new("bob", "tagged"), Visibility::Public, "__team-notebooks", false)
        .unwrap();
    cloud
        .register(&ArrayUri::new("bob", "other"), Visibility::Public, "__jupyter-notebook", false)
        .unwrap();

    let listing = manager.get("cloud/public/bob", true, None, None).await.unwrap();
    let names: Vec<_> = listing.children().unwrap().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["tagged"]);
    assert!(listing.children().unwrap().iter().all(|leaf| !leaf.writable));

    manager
        .save(&SaveModel::notebook(notebook("x")), "cloud/owned/alice/mine.ipynb")
        .await
        .unwrap();
    let owned = cloud.list_owned("__team-notebooks", Some("alice")).await.unwrap();
    assert_eq!(owned.len(), 1);
}

#[tokio::test]
async fn test_retry_budget_from_config() {
    let config = ContentsConfig {
        create_retry_budget: 2,
        ..Default::default()
    };
    let (_temp_dir, _cloud, manager) = setup(ContentsSettings::from(&config));
    let path = "cloud/owned/alice/Untitled.ipynb";

    manager.save(&SaveModel::notebook(notebook("1")), path).await.unwrap();
    let second = manager.save(&SaveModel::notebook(notebook("2")), path).await.unwrap();
    assert_eq!(second.path, "cloud/owned/alice/Untitled-1.ipynb");

    let err = manager.save(&SaveModel::notebook(notebook("3")), path).await.unwrap_err();
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_snapshot_round_trip_serves_same_contents() {
    let (temp_dir, cloud, manager) = setup(ContentsSettings::default());
    manager
        .save(&SaveModel::text_file("a,b\n", Some("text/csv".to_string())), "cloud/owned/alice/t.csv")
        .await
        .unwrap();

    let snapshot = temp_dir.path().join("cloud.json");
    cloud.save_snapshot(&snapshot).await.unwrap();
    let restored = MemoryCloud::load_snapshot(&snapshot).await.unwrap();

    let manager = ContentsManager::with_root_dir(
        temp_dir.path(),
        Arc::new(restored.clone()),
        Arc::new(restored),
        Arc::new(JsonNotebookCodec::new()),
        ContentsSettings::default(),
    );
    let model = manager.get("cloud/owned/alice/t.csv", true, None, None).await.unwrap();
    assert_eq!(model.content, Some(Content::Text("a,b\n".to_string())));
    assert_eq!(model.mimetype.as_deref(), Some("text/csv"));
}
