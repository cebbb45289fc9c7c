use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use projdeck::commands::Workspace;
use projdeck::launcher::server::serve;
use projdeck::launcher::LauncherState;
use projdeck::lifecycle::InstanceManager;

use crate::common::*;

const READY_COMMAND: &str = r#"echo "listening on $PORT for $PROJECT_PATH"; exec sleep 30"#;

/// Start the launcher in-process for `project`, returning its base URL.
async fn start(project: &TestProject) -> (String, InstanceManager, CancellationToken) {
    let workspace = Workspace::load(Some(&project.config_path)).unwrap();
    let manager = workspace.manager().unwrap();
    let state = LauncherState {
        manager: manager.clone(),
        projects: Arc::new(workspace.projects()),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, state, cancel.clone()));
    (base, manager, cancel)
}

#[tokio::test]
async fn concurrent_opens_share_one_instance() {
    let project = TestProject::new(&deck_config(READY_COMMAND, free_port(), 2, &[("proj-a", "a")]));
    let dir = project.project_dir("a");
    let (base, manager, cancel) = start(&project).await;
    let client = reqwest::Client::new();

    let url = format!("{}/api/instances/proj-a", base);
    let responses = futures_util::future::join_all((0..4).map(|_| client.post(&url).send())).await;

    let mut bodies = Vec::new();
    for resp in responses {
        let resp = resp.unwrap();
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap();
        // Requests racing the registration may see 409 instead of joining.
        assert!(status == 201 || status == 409, "status {status}: {body}");
        if status == 201 {
            bodies.push(body);
        }
    }
    assert!(!bodies.is_empty());
    for body in &bodies {
        assert_eq!(body["pid"], bodies[0]["pid"]);
        assert_eq!(body["backend_port"], bodies[0]["backend_port"]);
    }
    assert_eq!(manager.list_instances().len(), 1);

    let output: Value = client
        .get(format!("{}/output", url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first = output[0]["text"].as_str().unwrap();
    assert!(first.contains(dir.to_str().unwrap()), "got: {first}");

    manager.shutdown().await;
    cancel.cancel();
}

#[tokio::test]
async fn exhausted_pool_returns_503() {
    let project = TestProject::new(&deck_config(
        READY_COMMAND,
        free_port(),
        1,
        &[("proj-a", "a"), ("proj-b", "b")],
    ));
    project.project_dir("a");
    project.project_dir("b");
    let (base, manager, cancel) = start(&project).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/instances/proj-a", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{}/api/instances/proj-b", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "no available ports (max 1 concurrent instances)");

    let projects: Value = client
        .get(format!("{}/api/projects", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(projects[0]["id"], "proj-a");
    assert_eq!(projects[0]["state"], "running");
    assert_eq!(projects[1]["state"], "idle");

    manager.shutdown().await;
    cancel.cancel();
}

#[tokio::test]
async fn stop_releases_ports_for_reuse() {
    let project = TestProject::new(&deck_config(READY_COMMAND, free_port(), 1, &[("proj-a", "a")]));
    project.project_dir("a");
    let (base, manager, cancel) = start(&project).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/instances/proj-a", base);

    let first: Value = client.post(&url).send().await.unwrap().json().await.unwrap();
    let pid = first["pid"].as_u64().unwrap() as u32;

    let resp = client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 204);
    #[cfg(unix)]
    assert!(!pid_alive(pid));

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let second: Value = client.post(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(second["backend_port"], first["backend_port"]);
    assert_ne!(second["pid"], first["pid"]);

    manager.shutdown().await;
    cancel.cancel();
}
