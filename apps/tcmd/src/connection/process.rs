use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tcm_core::CoreError;
use tcm_core::proto::{ExitInfo, LogStream, ServiceKind};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::{OutputLine, ServerClient, wait_exited};

/// A server executable launched as a child of the daemon.
pub struct ProcessClient {
    service: ServiceKind,
    executable: PathBuf,
    shutdown_command: Option<String>,
    grace: Duration,
    lines: broadcast::Sender<OutputLine>,
    online: Arc<AtomicBool>,
    pid: Arc<AtomicU32>,
    exit_tx: Arc<watch::Sender<Option<ExitInfo>>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    stdin: Option<ChildStdin>,
    kill: CancellationToken,
}

impl ProcessClient {
    pub fn new(service: ServiceKind, executable: PathBuf) -> Self {
        let (lines, _) = broadcast::channel(1024);
        let (exit_tx, _) = watch::channel(None);
        Self {
            service,
            executable,
            shutdown_command: None,
            grace: Duration::ZERO,
            lines,
            online: Arc::new(AtomicBool::new(false)),
            pid: Arc::new(AtomicU32::new(0)),
            exit_tx: Arc::new(exit_tx),
            running: Mutex::new(None),
        }
    }

    /// Ask the process to exit through its console before killing it.
    pub fn with_graceful_stop(mut self, command: impl Into<String>, grace: Duration) -> Self {
        self.shutdown_command = Some(command.into());
        self.grace = grace;
        self
    }

    fn pump<R>(&self, reader: R, stream: LogStream)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let service = self.service;
        let lines = self.lines.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
                        let _ = lines.send(OutputLine { stream, line });
                    }
                    Err(err) => {
                        warn!("{service} {stream:?} pipe failed: {err}");
                        break;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl ServerClient for ProcessClient {
    fn service(&self) -> ServiceKind {
        self.service
    }

    fn endpoint(&self) -> String {
        self.executable.display().to_string()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), CoreError> {
        let mut running = self.running.lock().await;

        let mut command = Command::new(&self.executable);
        if let Some(dir) = working_dir(&self.executable) {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|err| CoreError::launch(self.service.to_string(), err))?;

        if let Some(stdout) = child.stdout.take() {
            self.pump(stdout, LogStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.pump(stderr, LogStream::Stderr);
        }
        let stdin = child.stdin.take();
        let pid = child.id();

        self.exit_tx.send_replace(None);
        self.online.store(true, Ordering::SeqCst);
        self.pid.store(pid.unwrap_or(0), Ordering::SeqCst);
        info!("{} started: pid={:?} path={}", self.service, pid, self.executable.display());

        let kill = CancellationToken::new();
        tokio::spawn(watch_exit(
            self.service,
            child,
            kill.clone(),
            self.online.clone(),
            self.pid.clone(),
            self.exit_tx.clone(),
        ));

        *running = Some(Running { stdin, kill });
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let Some(mut running) = self.running.lock().await.take() else {
            return Ok(());
        };
        if self.exit_tx.borrow().is_some() {
            return Ok(());
        }

        if let (Some(command), Some(stdin)) = (self.shutdown_command.as_deref(), running.stdin.as_mut()) {
            match write_line(stdin, command).await {
                Ok(()) => {
                    let exited = timeout(self.grace, wait_exited(self.exit_tx.subscribe())).await;
                    if exited.is_ok() {
                        return Ok(());
                    }
                    warn!(
                        "{} did not exit within {}s, killing it",
                        self.service,
                        self.grace.as_secs()
                    );
                }
                Err(err) => warn!("failed to send shutdown command to {}: {err}", self.service),
            }
        }

        running.kill.cancel();
        wait_exited(self.exit_tx.subscribe())
            .await
            .map(|_| ())
            .ok_or_else(|| CoreError::Internal(format!("lost track of {}", self.service)))
    }

    async fn send_command(&self, command: &str) -> Result<(), CoreError> {
        if !self.is_online() {
            return Err(CoreError::ServerOffline);
        }
        let mut running = self.running.lock().await;
        let stdin = running
            .as_mut()
            .and_then(|running| running.stdin.as_mut())
            .ok_or(CoreError::ServerOffline)?;
        write_line(stdin, command)
            .await
            .map_err(|err| CoreError::io("writing to the server console", err))
    }

    fn output(&self) -> broadcast::Receiver<OutputLine> {
        self.lines.subscribe()
    }

    fn exited(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_tx.subscribe()
    }

    fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

async fn watch_exit(
    service: ServiceKind,
    mut child: Child,
    kill: CancellationToken,
    online: Arc<AtomicBool>,
    pid: Arc<AtomicU32>,
    exit_tx: Arc<watch::Sender<Option<ExitInfo>>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => exit_info(status),
        Err(err) => {
            warn!("failed to wait for {service}: {err}");
            ExitInfo { code: None, signal: None }
        }
    };
    info!("{service} exited: code={:?} signal={:?}", exit.code, exit.signal);
    online.store(false, Ordering::SeqCst);
    pid.store(0, Ordering::SeqCst);
    exit_tx.send_replace(Some(exit));
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(format!("{line}\n").as_bytes()).await?;
    stdin.flush().await
}

fn working_dir(executable: &Path) -> Option<&Path> {
    executable.parent().filter(|dir| !dir.as_os_str().is_empty())
}

fn exit_info(status: ExitStatus) -> ExitInfo {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitInfo {
        code: status.code(),
        signal,
    }
}
