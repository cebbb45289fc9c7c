use std::future::Future;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, TerminateProcess, CREATE_NEW_PROCESS_GROUP,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

pub const SHELL_NAME: &str = "cmd.exe /C";

const STILL_ACTIVE: u32 = 259;

pub fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd.exe");
    cmd.arg("/C").arg(command);
    cmd
}

pub fn configure_process_group(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

pub async fn terminate<F>(pid: u32, grace: Duration, exited: F)
where
    F: Future<Output = ()>,
{
    // A plain kill would miss grandchildren (the shell's children), so kill
    // the whole tree by PID.
    let tree = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .await;

    match tree {
        Ok(output) if output.status.success() => {
            debug!(pid, "taskkill terminated process tree");
        }
        Ok(output) => {
            warn!(
                pid,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "taskkill failed, terminating top-level process"
            );
            terminate_process(pid);
        }
        Err(e) => {
            warn!(pid, error = %e, "could not run taskkill, terminating top-level process");
            terminate_process(pid);
        }
    }

    if tokio::time::timeout(grace, exited).await.is_err() {
        warn!(pid, "process still running after termination");
    }
}

fn terminate_process(pid: u32) {
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle.is_null() {
            debug!(pid, "OpenProcess failed, process likely gone");
            return;
        }
        if TerminateProcess(handle, 1) == 0 {
            warn!(pid, "TerminateProcess failed");
        }
        CloseHandle(handle);
    }
}

pub async fn kill_group(pid: u32) {
    match Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .await
    {
        Ok(output) if output.status.success() => debug!(pid, "killed leftover process tree"),
        Ok(_) => debug!(pid, "no leftover process tree"),
        Err(e) => warn!(pid, error = %e, "could not run taskkill"),
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);
        result != 0 && exit_code == STILL_ACTIVE
    }
}
