//! Sandboxed process execution (C1).
//!
//! Every compile and run step goes through [`SandboxExecutor::execute`],
//! which launches one disposable `docker run` per call with network
//! disabled, a read-only root filesystem, all capabilities dropped, and a
//! hard process-group kill on timeout. The container-flag shape follows
//! the same recipe as a plain compiler sandbox; the process-group
//! SIGTERM/SIGKILL dance and stdin/stdout/stderr plumbing follow the
//! timing-shim contract the language adapters rely on. A caller-supplied
//! `CancellationToken` races the wall-clock timeout the same way, so a
//! worker shutdown kills the sandbox child instead of letting it drain to
//! completion.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use olympus_common::{JudgeError, JudgeResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Resource caps enforced on a single sandboxed run.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// `None` when the language adapter enforces memory itself (e.g. JVM
    /// `-Xmx`) rather than via the container's cgroup.
    pub memory_mb: Option<u64>,
    pub cpus: f64,
    pub wall_time_sec: u64,
    pub pids_limit: u32,
    pub tmpfs_mb: u64,
    pub uid: u32,
    pub gid: u32,
}

/// One sandboxed invocation.
pub struct SandboxSpec<'a> {
    pub image: &'a str,
    /// Full shell command, passed to `bash -c`. Language adapters embed
    /// their timing shim in here.
    pub shell_command: &'a str,
    /// Host-side path to bind-mount at `/app`.
    pub work_dir: &'a Path,
    pub read_only_workdir: bool,
    pub limits: &'a SandboxLimits,
}

/// Raw result of one sandboxed run, before verdict derivation.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub wall_exceeded: bool,
}

pub struct SandboxExecutor {
    stderr_cap_bytes: usize,
    kill_grace_sec: u64,
    run_grace_sec: u64,
}

impl SandboxExecutor {
    pub fn new(stderr_cap_bytes: usize, kill_grace_sec: u64, run_grace_sec: u64) -> Self {
        Self {
            stderr_cap_bytes,
            kill_grace_sec,
            run_grace_sec,
        }
    }

    pub async fn execute(
        &self,
        spec: &SandboxSpec<'_>,
        stdin: &[u8],
        cancel: &CancellationToken,
    ) -> JudgeResult<ExecOutcome> {
        let work_dir = spec
            .work_dir
            .canonicalize()
            .map_err(|e| JudgeError::Sandbox(format!("canonicalize work dir: {e}")))?;

        let mut args: Vec<String> = vec!["run".into(), "--rm".into()];
        args.push("--network=none".into());
        args.push(format!("--pids-limit={}", spec.limits.pids_limit));
        args.push(format!("--cpus={}", spec.limits.cpus));
        if let Some(mem) = spec.limits.memory_mb {
            args.push(format!("--memory={mem}m"));
        }
        args.push("--read-only".into());
        args.push(format!(
            "--tmpfs=/tmp:rw,noexec,nosuid,size={}m",
            spec.limits.tmpfs_mb
        ));
        args.push("--cap-drop=ALL".into());
        args.push("--security-opt=no-new-privileges".into());
        args.push(format!("--user={}:{}", spec.limits.uid, spec.limits.gid));

        let mount = if spec.read_only_workdir {
            format!("{}:/app:ro", work_dir.display())
        } else {
            format!("{}:/app", work_dir.display())
        };
        args.push("-v".into());
        args.push(mount);
        args.push("-w".into());
        args.push("/app".into());
        args.push(spec.image.to_string());
        args.push("bash".into());
        args.push("-c".into());
        args.push(spec.shell_command.to_string());

        tracing::debug!(image = %spec.image, work_dir = %work_dir.display(), "launching sandbox container");

        let mut cmd = Command::new("docker");
        cmd.args(&args)
            .process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| JudgeError::Sandbox(format!("failed to spawn docker: {e}")))?;

        let mut stdin_pipe = child.stdin.take();
        let stdin_bytes = stdin.to_vec();
        let writer = tokio::spawn(async move {
            if let Some(mut pipe) = stdin_pipe.take() {
                let _ = pipe.write_all(&stdin_bytes).await;
            }
        });

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_cap = self.stderr_cap_bytes;
        let stderr_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf.truncate(stderr_cap);
            buf
        });

        let wait_timeout = Duration::from_secs(spec.limits.wall_time_sec + self.run_grace_sec);

        enum Wait {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Cancelled,
        }

        let wait = tokio::select! {
            res = child.wait() => Wait::Exited(res),
            _ = tokio::time::sleep(wait_timeout) => Wait::TimedOut,
            _ = cancel.cancelled() => Wait::Cancelled,
        };

        let cancelled = matches!(wait, Wait::Cancelled);
        let wall_exceeded = matches!(wait, Wait::TimedOut);
        let exit_status = match wait {
            Wait::Exited(res) => res.ok(),
            Wait::TimedOut | Wait::Cancelled => {
                self.terminate(&mut child).await;
                child.wait().await.ok()
            }
        };

        let _ = writer.await;
        let stdout_bytes = stdout_reader.await.unwrap_or_default();
        let stderr_bytes = stderr_reader.await.unwrap_or_default();

        if cancelled {
            return Err(JudgeError::Sandbox(
                "execution cancelled by shutdown signal".to_string(),
            ));
        }

        let exit_code = exit_status
            .and_then(|s| s.code())
            .unwrap_or_else(|| exit_status.and_then(signal_exit_code).unwrap_or(-1));

        Ok(ExecOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            wall_exceeded,
        })
    }

    /// SIGTERM the sandbox's process group, give it `kill_grace_sec` to
    /// exit, then SIGKILL. Sent to the whole group (not just the `docker`
    /// CLI pid) so a forked child cannot outlive its parent.
    async fn terminate(&self, child: &mut Child) {
        let Some(pid) = child.id() else { return };
        let pgid = Pid::from_raw(-(pid as i32));

        if kill(pgid, Signal::SIGTERM).is_err() {
            return;
        }
        if tokio::time::timeout(Duration::from_secs(self.kill_grace_sec), child.wait())
            .await
            .is_ok()
        {
            return;
        }
        let _ = kill(pgid, Signal::SIGKILL);
        let _ = child.wait().await;
    }
}

fn signal_exit_code(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| 128 + sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_carry_optional_memory() {
        let limits = SandboxLimits {
            memory_mb: None,
            cpus: 1.0,
            wall_time_sec: 5,
            pids_limit: 64,
            tmpfs_mb: 32,
            uid: 65334,
            gid: 65334,
        };
        assert!(limits.memory_mb.is_none());
    }
}
