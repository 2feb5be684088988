use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tcm_core::CoreError;
use tcm_core::proto::{ExitInfo, LogStream, ServiceKind};
use tcm_ra::{RaCredentials, RaSession};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{OutputLine, ServerClient};

/// What the network connection to a service is used for.
pub enum RemoteChannel {
    /// Authenticated remote-access console; carries commands.
    Console(RaCredentials),
    /// Periodic reachability check of a port that has no console.
    Probe { every: Duration },
}

/// A service that runs elsewhere and is reached over the network.
pub struct RemoteClient {
    service: ServiceKind,
    address: String,
    channel: RemoteChannel,
    connect_timeout: Duration,
    lines: broadcast::Sender<OutputLine>,
    online: Arc<AtomicBool>,
    exit_tx: Arc<watch::Sender<Option<ExitInfo>>>,
    active: Mutex<Option<Active>>,
}

struct Active {
    session: Option<RaSession>,
    stop: CancellationToken,
}

impl RemoteClient {
    pub fn new(
        service: ServiceKind,
        address: impl Into<String>,
        channel: RemoteChannel,
        connect_timeout: Duration,
    ) -> Self {
        let (lines, _) = broadcast::channel(1024);
        let (exit_tx, _) = watch::channel(None);
        Self {
            service,
            address: address.into(),
            channel,
            connect_timeout,
            lines,
            online: Arc::new(AtomicBool::new(false)),
            exit_tx: Arc::new(exit_tx),
            active: Mutex::new(None),
        }
    }

    fn lost(&self) -> ConnectionLost {
        ConnectionLost {
            service: self.service,
            online: self.online.clone(),
            exit_tx: self.exit_tx.clone(),
        }
    }

    async fn open_console(&self, credentials: &RaCredentials) -> Result<Active, CoreError> {
        let (console_tx, mut lines) = broadcast::channel(256);
        let session = RaSession::connect(&self.address, credentials, self.connect_timeout, console_tx)
            .await
            .map_err(|err| CoreError::launch(&self.address, format!("{err:#}")))?;

        let stop = CancellationToken::new();
        let mut closed = session.closed();
        let output = self.lines.clone();
        let service = self.service;
        let lost = self.lost();
        let token = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    line = lines.recv() => match line {
                        Ok(line) => {
                            let _ = output.send(OutputLine { stream: LogStream::Stdout, line });
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = closed.changed() => {
                        if changed.is_err() || *closed.borrow_and_update() {
                            break;
                        }
                    }
                    _ = token.cancelled() => return,
                }
            }
            warn!("remote console of {service} closed by the server");
            lost.mark();
        });

        Ok(Active {
            session: Some(session),
            stop,
        })
    }

    async fn open_probe(&self, every: Duration) -> Result<Active, CoreError> {
        reach(&self.address, self.connect_timeout)
            .await
            .map_err(|err| CoreError::launch(&self.address, err))?;

        let stop = CancellationToken::new();
        let token = stop.clone();
        let address = self.address.clone();
        let connect_timeout = self.connect_timeout;
        let lost = self.lost();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = reach(&address, connect_timeout).await {
                            warn!("{} unreachable at {address}: {err}", lost.service);
                            lost.mark();
                            return;
                        }
                        debug!("{} reachable at {address}", lost.service);
                    }
                    _ = token.cancelled() => return,
                }
            }
        });

        Ok(Active { session: None, stop })
    }
}

#[async_trait]
impl ServerClient for RemoteClient {
    fn service(&self) -> ServiceKind {
        self.service
    }

    fn endpoint(&self) -> String {
        self.address.clone()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), CoreError> {
        let mut active = self.active.lock().await;
        self.exit_tx.send_replace(None);
        let opened = match &self.channel {
            RemoteChannel::Console(credentials) => self.open_console(credentials).await?,
            RemoteChannel::Probe { every } => self.open_probe(*every).await?,
        };
        self.online.store(true, Ordering::SeqCst);
        info!("connected to {} at {}", self.service, self.address);
        *active = Some(opened);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };
        active.stop.cancel();
        if let Some(session) = active.session {
            if let Err(err) = session.close().await {
                warn!("failed to close remote console of {}: {err:#}", self.service);
            }
        }
        self.lost().mark();
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), CoreError> {
        if !self.is_online() {
            return Err(CoreError::ServerOffline);
        }
        let active = self.active.lock().await;
        let Some(active) = active.as_ref() else {
            return Err(CoreError::ServerOffline);
        };
        let Some(session) = active.session.as_ref() else {
            return Err(CoreError::Unsupported(format!("{} has no remote console", self.service)));
        };
        session.send(command).await.map_err(|err| {
            CoreError::io(
                "writing to the remote console",
                std::io::Error::other(format!("{err:#}")),
            )
        })
    }

    fn output(&self) -> broadcast::Receiver<OutputLine> {
        self.lines.subscribe()
    }

    fn exited(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_tx.subscribe()
    }
}

/// Flips a remote client offline and publishes its exit once.
struct ConnectionLost {
    service: ServiceKind,
    online: Arc<AtomicBool>,
    exit_tx: Arc<watch::Sender<Option<ExitInfo>>>,
}

impl ConnectionLost {
    fn mark(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.exit_tx.send_if_modified(|exit| {
            if exit.is_some() {
                return false;
            }
            *exit = Some(ExitInfo { code: None, signal: None });
            true
        });
    }
}

async fn reach(address: &str, connect_timeout: Duration) -> Result<(), String> {
    match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("timed out after {}s", connect_timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use crate::connection::client::wait_exited;

    async fn fake_console() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            write_half.write_all(b"Username: ").await.unwrap();
            let _ = lines.next_line().await;
            write_half.write_all(b"Password: ").await.unwrap();
            let _ = lines.next_line().await;
            write_half.write_all(b"+Logged in.\r\nTC>").await.unwrap();
            while let Ok(Some(command)) = lines.next_line().await {
                let command = command.trim().to_string();
                if command == "quit" {
                    break;
                }
                if command == "server exit" {
                    return;
                }
                let reply = format!("Executed: {command}\r\nTC>");
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        address
    }

    fn console_client(address: String) -> RemoteClient {
        RemoteClient::new(
            ServiceKind::World,
            address,
            RemoteChannel::Console(RaCredentials {
                username: "ADMIN".into(),
                password: "admin".into(),
            }),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn console_relays_commands_and_output() {
        let client = console_client(fake_console().await);
        let mut output = client.output();

        client.start().await.unwrap();
        assert!(client.is_online());
        assert_eq!(client.pid(), None);

        client.send_command("server info").await.unwrap();
        let line = timeout(Duration::from_secs(2), output.recv()).await.unwrap().unwrap();
        assert_eq!(line.line, "Executed: server info");

        client.stop().await.unwrap();
        assert!(!client.is_online());
        assert!(client.exited().borrow().is_some());
        assert!(matches!(client.send_command("server info").await, Err(CoreError::ServerOffline)));
    }

    #[tokio::test]
    async fn server_side_close_marks_client_offline() {
        let client = console_client(fake_console().await);
        client.start().await.unwrap();
        client.send_command("server exit").await.unwrap();

        timeout(Duration::from_secs(2), wait_exited(client.exited()))
            .await
            .unwrap()
            .unwrap();
        assert!(!client.is_online());
    }

    #[tokio::test]
    async fn probe_tracks_reachability_and_has_no_console() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let client = RemoteClient::new(
            ServiceKind::Auth,
            address,
            RemoteChannel::Probe { every: Duration::from_millis(50) },
            Duration::from_secs(1),
        );

        client.start().await.unwrap();
        assert!(client.is_online());
        assert!(matches!(
            client.send_command("account create x y").await,
            Err(CoreError::Unsupported(_))
        ));

        drop(listener);
        timeout(Duration::from_secs(2), wait_exited(client.exited()))
            .await
            .unwrap()
            .unwrap();
        assert!(!client.is_online());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_launch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = RemoteClient::new(
            ServiceKind::Auth,
            address,
            RemoteChannel::Probe { every: Duration::from_secs(5) },
            Duration::from_secs(1),
        );
        assert!(matches!(client.start().await, Err(CoreError::Launch { .. })));
        assert!(!client.is_online());
    }
}
