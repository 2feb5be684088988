use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tcm_core::CoreError;
use tcm_core::proto::{
    ClientStatus, ConnectionMode, Event, LifecycleEvent, ServerStatus, ServiceKind, UnixMillis,
};
use tcm_ra::{RaCredentials, load_ra_settings};
use tcm_utils::now_millis;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{info, warn};

use super::client::{ServerClient, wait_exited};
use super::monitor::{relay_output, watch_client};
use super::process::ProcessClient;
use super::remote::{RemoteChannel, RemoteClient};
use crate::config::{RemoteSettings, ServerSettings};
use crate::logs::LogStore;

const DEFAULT_RA_PORT: u16 = 3443;
const KILL_WAIT: Duration = Duration::from_secs(5);

/// The auth and world clients, always attached and detached together.
#[derive(Clone)]
pub struct ClientPair {
    pub auth: Arc<dyn ServerClient>,
    pub world: Arc<dyn ServerClient>,
}

impl ClientPair {
    fn clients(&self) -> [&Arc<dyn ServerClient>; 2] {
        [&self.auth, &self.world]
    }

    pub fn online(&self) -> bool {
        self.auth.is_online() && self.world.is_online()
    }
}

pub struct Started {
    pub auth: ClientStatus,
    pub world: ClientStatus,
    pub started_at_ms: UnixMillis,
}

/// Owns the active client pair and serializes start/stop.
pub struct ServerConnection {
    server: ServerSettings,
    remote: RemoteSettings,
    logs: LogStore,
    events: broadcast::Sender<Event>,
    pair: Mutex<Option<ClientPair>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl ServerConnection {
    pub fn new(
        server: ServerSettings,
        remote: RemoteSettings,
        logs: LogStore,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            server,
            remote,
            logs,
            events,
            pair: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ClientPair>> {
        self.pair.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> ConnectionMode {
        self.server.mode
    }

    pub fn pair(&self) -> Option<ClientPair> {
        self.slot().clone()
    }

    /// The world client, only while the whole pair is online.
    pub fn online_world(&self) -> Option<Arc<dyn ServerClient>> {
        self.pair()
            .filter(|pair| pair.online())
            .map(|pair| pair.world)
    }

    pub fn status(&self) -> ServerStatus {
        let pair = self.pair();
        ServerStatus {
            mode: self.mode(),
            attached: pair.is_some(),
            online: pair.as_ref().is_some_and(ClientPair::online),
            auth: pair.as_ref().map(|pair| pair.auth.status()),
            world: pair.as_ref().map(|pair| pair.world.status()),
        }
    }

    /// Start both services. With `force`, stale instances are killed first;
    /// without it their presence is reported as `AlreadyRunning`.
    pub async fn start(&self, force: bool) -> Result<Started, CoreError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.mode() == ConnectionMode::Local {
            for service in ServiceKind::ALL {
                let path = self.server.executable(service);
                if !path.is_file() {
                    return Err(CoreError::MissingBinary { path });
                }
            }
        }

        self.clear_stale(force).await?;
        if let Some(previous) = self.slot().take() {
            info!("detaching previous {} / {} clients", previous.auth.service(), previous.world.service());
        }

        let pair = self.build_pair().await?;
        for client in pair.clients() {
            relay_output(client.as_ref(), self.logs.clone());
        }
        pair.auth.start().await?;
        if let Err(err) = pair.world.start().await {
            if let Err(stop_err) = pair.auth.stop().await {
                warn!("failed to stop {} after failed start: {stop_err}", ServiceKind::Auth);
            }
            return Err(err);
        }

        let started_at_ms = now_millis();
        for client in pair.clients() {
            watch_client(client.clone(), self.logs.clone(), self.events.clone());
            let _ = self.events.send(Event::Lifecycle(LifecycleEvent::ServiceStarted {
                service: client.service(),
                pid: client.pid(),
                at_ms: started_at_ms,
            }));
        }
        let started = Started {
            auth: pair.auth.status(),
            world: pair.world.status(),
            started_at_ms,
        };
        *self.slot() = Some(pair);

        self.logs.push_daemon(format!("server started: mode={:?}", self.mode()));
        let _ = self.events.send(Event::Status(self.status()));
        Ok(started)
    }

    /// Stop and detach both clients. Stop failures come back as warnings;
    /// the pair is detached either way.
    pub async fn stop(&self) -> Result<Vec<String>, CoreError> {
        let _lifecycle = self.lifecycle.lock().await;
        let pair = self.slot().take().ok_or(CoreError::NotRunning)?;

        let (world, auth) = tokio::join!(pair.world.stop(), pair.auth.stop());
        let warnings: Vec<String> = [(ServiceKind::World, world), (ServiceKind::Auth, auth)]
            .into_iter()
            .filter_map(|(service, result)| {
                result.err().map(|err| format!("failed to stop {service}: {err}"))
            })
            .collect();
        for warning in &warnings {
            warn!("{warning}");
        }

        self.logs.push_daemon("server stopped".to_string());
        let _ = self.events.send(Event::Status(self.status()));
        Ok(warnings)
    }

    async fn clear_stale(&self, force: bool) -> Result<(), CoreError> {
        let attached = self.pair();
        let mut stale: Vec<(ServiceKind, Option<u32>)> = Vec::new();
        if let Some(pair) = &attached {
            for client in pair.clients().into_iter().filter(|client| client.is_online()) {
                stale.push((client.service(), client.pid()));
            }
        }
        if self.mode() == ConnectionMode::Local {
            for service in ServiceKind::ALL {
                for pid in processes_running(&self.server.executable(service)) {
                    if !stale.iter().any(|(_, known)| *known == Some(pid)) {
                        stale.push((service, Some(pid)));
                    }
                }
            }
        }

        let Some((service, _)) = stale.first().copied() else {
            return Ok(());
        };
        if !force {
            return Err(CoreError::AlreadyRunning { service });
        }

        for (service, pid) in &stale {
            if let Some(pid) = pid {
                warn!("force-terminating stale {service} (pid {pid})");
                if !kill_process(*pid) {
                    warn!("{service} (pid {pid}) could not be killed");
                }
            }
        }
        if let Some(pair) = attached {
            for client in pair.clients() {
                if client.pid().is_some() {
                    if timeout(KILL_WAIT, wait_exited(client.exited())).await.is_err() {
                        warn!("{} did not exit after being killed", client.service());
                    }
                } else if let Err(err) = client.stop().await {
                    warn!("failed to close {}: {err}", client.service());
                }
            }
        }
        Ok(())
    }

    async fn build_pair(&self) -> Result<ClientPair, CoreError> {
        match self.mode() {
            ConnectionMode::Local => {
                let auth = ProcessClient::new(ServiceKind::Auth, self.server.executable(ServiceKind::Auth));
                let world = ProcessClient::new(ServiceKind::World, self.server.executable(ServiceKind::World))
                    .with_graceful_stop(self.server.shutdown_command.clone(), self.server.stop_grace());
                Ok(ClientPair {
                    auth: Arc::new(auth),
                    world: Arc::new(world),
                })
            }
            ConnectionMode::Remote => {
                let console = self.console_address().await?;
                let host = console
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| console.clone());
                let connect_timeout = Duration::from_secs(self.remote.connect_timeout_secs.max(1));

                let auth = RemoteClient::new(
                    ServiceKind::Auth,
                    format!("{host}:{}", self.remote.auth_port),
                    RemoteChannel::Probe {
                        every: Duration::from_secs(self.remote.probe_interval_secs.max(1)),
                    },
                    connect_timeout,
                );
                let world = RemoteClient::new(
                    ServiceKind::World,
                    console,
                    RemoteChannel::Console(RaCredentials {
                        username: self.remote.username.clone(),
                        password: self.remote.password.clone(),
                    }),
                    connect_timeout,
                );
                Ok(ClientPair {
                    auth: Arc::new(auth),
                    world: Arc::new(world),
                })
            }
        }
    }

    /// Remote-access address: configured host, or the RA section of the
    /// world service config in the server folder.
    async fn console_address(&self) -> Result<String, CoreError> {
        if let Some(host) = self.remote.host.as_deref().filter(|host| !host.is_empty()) {
            return Ok(format!("{host}:{}", self.remote.port.unwrap_or(DEFAULT_RA_PORT)));
        }

        let config = self.server.folder.join("worldserver.conf");
        match load_ra_settings(&config).await {
            Ok(Some(settings)) => Ok(settings.address),
            Ok(None) => Err(CoreError::InvalidConfig(format!(
                "no remote host configured and remote access is disabled in {}",
                config.display()
            ))),
            Err(err) => Err(CoreError::InvalidConfig(format!("{err:#}"))),
        }
    }

    #[cfg(test)]
    pub(crate) fn attach(&self, pair: ClientPair) {
        *self.slot() = Some(pair);
    }
}

/// Processes other than ourselves whose executable is `path`.
fn processes_running(path: &Path) -> Vec<u32> {
    let Ok(path) = std::fs::canonicalize(path) else {
        return Vec::new();
    };
    let own = std::process::id();
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .processes()
        .iter()
        .filter(|(_, process)| process.exe() == Some(path.as_path()))
        .map(|(pid, _)| pid.as_u32())
        .filter(|pid| *pid != own)
        .collect()
}

fn kill_process(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some_and(|process| process.kill())
}
