use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use crate::common::*;

#[cfg(unix)]
#[tokio::test]
async fn ctrl_c_stops_every_instance() {
    let launcher_port = free_port();
    let project = TestProject::new(&deck_config(
        r#"echo "ready on $PORT"; exec sleep 60"#,
        launcher_port,
        2,
        &[("proj-a", "a"), ("proj-b", "b")],
    ));
    project.project_dir("a");
    project.project_dir("b");

    let mut child = Command::new(env!("CARGO_BIN_EXE_projdeck"))
        .args(["-f", project.config_path.to_str().unwrap(), "serve"])
        .kill_on_drop(true)
        .spawn()
        .expect("failed to start projdeck");

    assert!(
        wait_for_port(launcher_port, Duration::from_secs(10)).await,
        "launcher did not start"
    );

    let client = reqwest::Client::new();
    let mut pids = Vec::new();
    for id in ["proj-a", "proj-b"] {
        let info: Value = client
            .post(format!("http://127.0.0.1:{}/api/instances/{}", launcher_port, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        pids.push(info["pid"].as_u64().unwrap() as u32);
    }
    assert!(pids.iter().all(|pid| pid_alive(*pid)));

    let pid = child.id().unwrap();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGINT,
    )
    .ok();

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("projdeck did not shut down")
        .unwrap();
    assert!(status.success());
    assert!(pids.iter().all(|pid| !pid_alive(*pid)));
}
