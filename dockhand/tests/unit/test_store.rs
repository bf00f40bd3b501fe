//! Store tests

use std::time::Duration;

use chrono::Utc;

use dockhand::deploy::fsm::DeploymentEvent;
use dockhand::errors::DockhandError;
use dockhand::filesys::file::File;
use dockhand::models::deployment::{Deployment, DeploymentStatus};
use dockhand::models::workload::{Workload, WorkloadStatus};
use dockhand::storage::{JsonFileStore, MemoryStore, WorkloadStore};

fn workload(id: &str) -> Workload {
    let now = Utc::now();
    Workload {
        id: id.to_string(),
        name: format!("workload {}", id),
        repository_url: "git@github.com:acme/shop.git".to_string(),
        branch: "main".to_string(),
        credentials: None,
        working_dir: format!("/srv/dockhand/{}", id).into(),
        compose_files: vec!["compose.yml".to_string()],
        environment: vec![],
        status: WorkloadStatus::Stopped,
        last_commit: None,
        auto_deploy: false,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_memory_store_crud() {
    let store = MemoryStore::new();
    store.create_workload(&workload("a")).await.unwrap();
    store.create_workload(&workload("b")).await.unwrap();

    assert!(matches!(
        store.create_workload(&workload("a")).await,
        Err(DockhandError::PersistenceError(_))
    ));

    let mut a = store.find_workload("a").await.unwrap();
    a.status = WorkloadStatus::Running;
    store.update_workload(&a).await.unwrap();
    assert_eq!(
        store.find_workload("a").await.unwrap().status,
        WorkloadStatus::Running
    );

    store.delete_workload("b").await.unwrap();
    assert_eq!(store.list_workloads().await.unwrap().len(), 1);
    assert!(matches!(
        store.find_workload("b").await,
        Err(DockhandError::NotFound(_))
    ));
    assert!(matches!(
        store.delete_workload("b").await,
        Err(DockhandError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_deployments_newest_first() {
    let store = MemoryStore::new();
    store.create_workload(&workload("a")).await.unwrap();

    let first = Deployment::started("a", None);
    store.create_deployment(&first).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = Deployment::started("a", None);
    store.create_deployment(&second).await.unwrap();
    store
        .create_deployment(&Deployment::started("other", None))
        .await
        .unwrap();

    let ids: Vec<_> = store
        .list_deployments("a")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

    store.delete_deployments("a").await.unwrap();
    assert!(store.list_deployments("a").await.unwrap().is_empty());
    assert_eq!(store.list_deployments("other").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let deployment_id = {
        let store = JsonFileStore::open(File::new(&path)).await.unwrap();
        store.create_workload(&workload("a")).await.unwrap();

        let mut deployment = Deployment::started("a", Some("abc123".to_string()));
        store.create_deployment(&deployment).await.unwrap();
        deployment
            .finish(DeploymentEvent::Complete, "up\n".to_string(), String::new())
            .unwrap();
        store.update_deployment(&deployment).await.unwrap();
        deployment.id
    };

    let store = JsonFileStore::open(File::new(&path)).await.unwrap();
    let workloads = store.list_workloads().await.unwrap();
    assert_eq!(workloads.len(), 1);
    assert_eq!(workloads[0].repository_url, "git@github.com:acme/shop.git");

    let deployment = store.find_deployment(&deployment_id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Completed);
    assert_eq!(deployment.stdout, "up\n");
    assert_eq!(deployment.commit_hash.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_json_store_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = JsonFileStore::open(File::new(&path)).await;
    assert!(matches!(result, Err(DockhandError::PersistenceError(_))));
}

#[tokio::test]
async fn test_json_store_failed_write_keeps_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonFileStore::open(File::new(&path)).await.unwrap();
    store.create_workload(&workload("a")).await.unwrap();

    // the temporary file cannot be created while a directory holds its name
    std::fs::create_dir(dir.path().join("state.tmp")).unwrap();

    assert!(matches!(
        store.create_workload(&workload("b")).await,
        Err(DockhandError::PersistenceError(_))
    ));
    let ids: Vec<_> = store
        .list_workloads()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(ids, vec!["a".to_string()]);
}

#[tokio::test]
async fn test_json_stores_sharing_a_file_keep_each_others_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let server = JsonFileStore::open(File::new(&path)).await.unwrap();
    let cli = JsonFileStore::open(File::new(&path)).await.unwrap();

    cli.create_workload(&workload("from-cli")).await.unwrap();
    server.create_workload(&workload("from-api")).await.unwrap();

    let mut seen = server.find_workload("from-cli").await.unwrap();
    seen.status = WorkloadStatus::Running;
    server.update_workload(&seen).await.unwrap();
    cli.create_deployment(&Deployment::started("from-api", None))
        .await
        .unwrap();

    let reopened = JsonFileStore::open(File::new(&path)).await.unwrap();
    let mut ids: Vec<_> = reopened
        .list_workloads()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["from-api".to_string(), "from-cli".to_string()]);
    assert_eq!(
        reopened.find_workload("from-cli").await.unwrap().status,
        WorkloadStatus::Running
    );
    assert_eq!(reopened.list_deployments("from-api").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_json_stores_block_each_other_while_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let first = std::sync::Arc::new(JsonFileStore::open(File::new(&path)).await.unwrap());
    let second = std::sync::Arc::new(JsonFileStore::open(File::new(&path)).await.unwrap());

    let mut tasks = vec![];
    for i in 0..10 {
        let store = if i % 2 == 0 { first.clone() } else { second.clone() };
        tasks.push(tokio::spawn(async move {
            store.create_workload(&workload(&format!("w{}", i))).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(first.list_workloads().await.unwrap().len(), 10);
}
