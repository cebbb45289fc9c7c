use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as imp;
#[cfg(windows)]
use windows as imp;

/// Create a platform-appropriate shell command.
/// Unix: `sh -c <command>`, Windows: `cmd.exe /C <command>`
pub fn shell_command(command: &str) -> Command {
    imp::shell_command(command)
}

/// Configure the command to run in a new process group so the whole tree
/// can be signalled at once.
pub fn configure_process_group(cmd: &mut Command) {
    imp::configure_process_group(cmd)
}

/// Terminate the process `pid` and its descendants.
///
/// `exited` must resolve once the process has been reaped. On Unix the group
/// gets SIGTERM, then SIGKILL if `exited` has not resolved within `grace`.
/// On Windows the whole tree is killed via `taskkill /T /F`, falling back to
/// `TerminateProcess` on the top-level process.
///
/// This never reports an error: the caller learns the outcome from the
/// process's own exit.
pub async fn terminate<F>(pid: u32, grace: Duration, exited: F)
where
    F: Future<Output = ()>,
{
    imp::terminate(pid, grace, exited).await
}

/// Force-kill whatever is left of the process tree rooted at `pid` without
/// waiting. Used once the top-level process has already exited; failures
/// are logged and otherwise ignored.
pub async fn kill_group(pid: u32) {
    imp::kill_group(pid).await
}

/// Check if a process with the given PID is still alive.
pub fn is_process_alive(pid: u32) -> bool {
    imp::is_process_alive(pid)
}

/// Shell name for log messages.
pub fn shell_name() -> &'static str {
    imp::SHELL_NAME
}

/// Get the current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Expand leading `~` or `$HOME` in a path string to the actual home directory.
///
/// Returns the original string unchanged when no home directory is available
/// or the string doesn't start with `~` or `$HOME`.
pub fn expand_home(path: &str) -> String {
    if let Some(home) = home_dir() {
        let home = home.to_string_lossy();
        if path == "~" || path == "$HOME" {
            return home.to_string();
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return format!("{}/{}", home, rest);
        }
        if let Some(rest) = path
            .strip_prefix("$HOME/")
            .or_else(|| path.strip_prefix("$HOME\\"))
        {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}
