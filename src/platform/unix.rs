use std::future::Future;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

pub const SHELL_NAME: &str = "sh -c";

pub fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

pub fn configure_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

pub async fn terminate<F>(pid: u32, grace: Duration, exited: F)
where
    F: Future<Output = ()>,
{
    let pgid = Pid::from_raw(pid as i32);
    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) => {
            debug!(pid, "sent SIGTERM to process group");
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!(pid, "process group already exited");
            return;
        }
        Err(e) => {
            warn!(pid, error = %e, "killpg(SIGTERM) failed, falling back to SIGKILL");
            let _ = kill(pgid, Signal::SIGKILL);
            return;
        }
    }

    if tokio::time::timeout(grace, exited).await.is_ok() {
        debug!(pid, "process exited after SIGTERM");
        return;
    }

    warn!(
        pid,
        grace_ms = grace.as_millis() as u64,
        "process did not exit within grace window, sending SIGKILL"
    );
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => {
            warn!(pid, error = %e, "killpg(SIGKILL) failed, killing pid directly");
            let _ = kill(pgid, Signal::SIGKILL);
        }
    }
}

pub async fn kill_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "killed leftover process group"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "killpg(SIGKILL) on leftover group failed"),
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}
