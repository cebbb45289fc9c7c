use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use projdeck::commands::Workspace;
use projdeck::launcher::server::serve;
use projdeck::launcher::LauncherState;

use crate::common::*;

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn relays_lifecycle_events() {
    let command = r#"echo "server running on $PORT"; sleep 0.5; echo "fatal" >&2; exit 2"#;
    let mut config = deck_config(command, free_port(), 1, &[("proj-a", "a")]);
    config = config.replace("auto_init = false", "auto_init = true");
    config.push_str("\n[templates]\n\"notes.md\" = \"# {name}\\n\"\n");
    let project = TestProject::new(&config);
    project.project_dir("a");

    let workspace = Workspace::load(Some(&project.config_path)).unwrap();
    let manager = workspace.manager().unwrap();
    let state = LauncherState {
        manager: manager.clone(),
        projects: Arc::new(workspace.projects()),
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, state, cancel.clone()));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/instances/proj-a", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let initialized = next_json(&mut ws).await;
    assert_eq!(initialized["type"], "initialized");
    assert_eq!(initialized["files"][0], "notes.md");

    let spawned = next_json(&mut ws).await;
    assert_eq!(spawned["type"], "spawned");
    assert_eq!(spawned["instance"]["project_id"], "proj-a");

    let crashed = next_json(&mut ws).await;
    assert_eq!(crashed["type"], "crashed");
    assert_eq!(crashed["exit_code"], 2);
    assert!(crashed["output"]
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l["text"] == "fatal"));

    assert!(manager.list_instances().is_empty());
    assert_eq!(
        std::fs::read_to_string(project.dir.path().join("a/notes.md")).unwrap(),
        "# a\n"
    );
    cancel.cancel();
}
