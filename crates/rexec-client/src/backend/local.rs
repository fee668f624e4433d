//! Local process backend.
//!
//! Each configured replica is a working directory on this machine; exec runs
//! the command there as a child process, either with piped stdio or under a
//! freshly allocated pseudo-terminal.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use rexec_core::backend::{ClusterBackend, ExecChannel, ExecControl, ExecReader, ExecSpec, ExecWriter};
use rexec_core::cluster::{ClusterId, ComputeUnit, Replica};
use rexec_core::constants::FAILURE_EXIT_CODE;
use rexec_core::error::{Error, Result};
use rexec_core::protocol::{SignalKind, TermSize};

use super::pty::{Pty, PtyResizer};
use crate::config::{ClusterInventory, ReplicaConfig};

/// Backend that runs replicas as local processes.
pub struct LocalBackend {
    cluster: ClusterId,
    inventory: ClusterInventory,
}

impl LocalBackend {
    pub fn new(cluster: ClusterId, inventory: ClusterInventory) -> Self {
        Self { cluster, inventory }
    }

    fn replica_config(&self, replica: &Replica) -> Option<&ReplicaConfig> {
        self.inventory
            .units
            .iter()
            .filter(|unit| unit.namespace == replica.namespace)
            .flat_map(|unit| unit.replicas.iter())
            .find(|r| r.pod == replica.pod && r.container == replica.container)
    }

    fn command(&self, replica: &Replica, config: &ReplicaConfig, argv: &[String]) -> Result<Command> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::RemoteExec {
            message: "empty command".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&config.env)
            .env("REXEC_CLUSTER", self.cluster.as_str())
            .env("REXEC_POD", &replica.pod)
            .kill_on_drop(true);
        if let Some(dir) = &config.workdir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ClusterBackend for LocalBackend {
    fn cluster(&self) -> ClusterId {
        self.cluster
    }

    async fn discover(&self, unit: &str) -> Result<Option<ComputeUnit>> {
        let Some(config) = self.inventory.units.iter().find(|u| u.name == unit) else {
            return Ok(None);
        };

        let replicas = config
            .replicas
            .iter()
            .map(|r| Replica {
                pod: r.pod.clone(),
                container: r.container.clone(),
                namespace: config.namespace.clone(),
                cluster: self.cluster,
                phase: r.phase,
            })
            .collect();

        Ok(Some(ComputeUnit {
            name: config.name.clone(),
            namespace: config.namespace.clone(),
            replicas,
        }))
    }

    async fn exec(&self, replica: &Replica, spec: &ExecSpec) -> Result<ExecChannel> {
        if replica.cluster != self.cluster {
            return Err(Error::RemoteExec {
                message: format!("replica {} is not owned by {}", replica.pod, self.cluster),
            });
        }
        let config = self.replica_config(replica).ok_or_else(|| Error::RemoteExec {
            message: format!(
                "container {} not found in pod {}/{}",
                replica.container, replica.namespace, replica.pod
            ),
        })?;

        let cmd = self.command(replica, config, &spec.command)?;
        info!(
            cluster = %self.cluster,
            pod = %replica.pod,
            command = ?spec.command,
            tty = spec.tty,
            "Starting local exec"
        );

        if spec.tty {
            spawn_pty(cmd, spec)
        } else {
            spawn_piped(cmd, spec)
        }
    }
}

fn spawn_piped(mut cmd: Command, spec: &ExecSpec) -> Result<ExecChannel> {
    cmd.stdin(if spec.stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(spawn_error(&spec.command))?;
    let stdin = child.stdin.take().map(|s| -> ExecWriter { Box::pin(s) });
    let stdout: ExecReader = match child.stdout.take() {
        Some(stdout) => Box::pin(stdout),
        None => return Err(missing_stream("stdout")),
    };
    let stderr = child.stderr.take().map(|s| -> ExecReader { Box::pin(s) });

    Ok(channel(child, stdin, stdout, stderr, None))
}

fn spawn_pty(mut cmd: Command, spec: &ExecSpec) -> Result<ExecChannel> {
    let mut pty = Pty::open(spec.term_size)?;
    let (stdin, stdout, stderr) = pty.child_stdio()?;
    cmd.stdin(stdin).stdout(stdout).stderr(stderr).env(
        "TERM",
        std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string()),
    );

    // SAFETY: only async-signal-safe calls between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(io::Error::from)?;
            if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(spawn_error(&spec.command))?;
    // The command still holds the slave; the master only sees EOF once every
    // slave fd outside the child is closed.
    drop(cmd);

    let (reader, writer) = pty.split();
    let stdin = spec.stdin.then(|| -> ExecWriter { Box::pin(writer) });
    Ok(channel(child, stdin, Box::pin(reader), None, Some(pty.resizer())))
}

fn channel(
    mut child: Child,
    stdin: Option<ExecWriter>,
    stdout: ExecReader,
    stderr: Option<ExecReader>,
    resizer: Option<PtyResizer>,
) -> ExecChannel {
    let exited = Arc::new(AtomicBool::new(false));
    let control = LocalControl {
        pid: child.id().map(|id| Pid::from_raw(id as i32)),
        exited: Arc::clone(&exited),
        closed: AtomicBool::new(false),
        resizer,
    };

    let exit = async move {
        let status = child.wait().await?;
        exited.store(true, Ordering::SeqCst);
        let code = exit_code(status);
        debug!(code, "Local process exited");
        Ok::<_, Error>(Some(code))
    }
    .boxed();

    ExecChannel {
        stdin,
        stdout,
        stderr,
        exit,
        control: Box::new(control),
    }
}

/// Shell convention: the exit status, or 128 + signal number.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(FAILURE_EXIT_CODE)
}

fn spawn_error(argv: &[String]) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| Error::RemoteExec {
        message: format!("failed to start {}: {}", argv.join(" "), e),
    }
}

fn missing_stream(name: &str) -> Error {
    Error::RemoteExec {
        message: format!("child {} was not captured", name),
    }
}

struct LocalControl {
    pid: Option<Pid>,
    exited: Arc<AtomicBool>,
    closed: AtomicBool,
    resizer: Option<PtyResizer>,
}

impl LocalControl {
    fn send(&self, signal: Signal) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.exited.load(Ordering::SeqCst) {
            debug!(?signal, "Process already exited, signal dropped");
            return Ok(());
        }
        kill(pid, signal).map_err(|e| Error::RemoteExec {
            message: format!("failed to signal process: {}", e),
        })
    }
}

#[async_trait]
impl ExecControl for LocalControl {
    async fn resize(&self, size: TermSize) -> Result<()> {
        match &self.resizer {
            Some(resizer) => resizer.resize(size),
            None => Ok(()),
        }
    }

    async fn signal(&self, kind: SignalKind) -> Result<()> {
        let signal = Signal::try_from(kind.as_raw()).map_err(|e| Error::RemoteExec {
            message: format!("unsupported signal {}: {}", kind, e),
        })?;
        self.send(signal)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Interactive shells ignore SIGTERM but not a hangup.
        let signal = if self.resizer.is_some() {
            Signal::SIGHUP
        } else {
            Signal::SIGTERM
        };
        if let Err(e) = self.send(signal) {
            warn!(error = %e, "Failed to terminate local process");
        }
    }
}
