use std::sync::Arc;

use tcm_core::proto::{Event, LifecycleEvent};
use tcm_utils::now_millis;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use super::client::{ServerClient, wait_exited};
use crate::logs::LogStore;

/// Copy the client's output into the server log feed until the client is dropped.
pub fn relay_output(client: &dyn ServerClient, logs: LogStore) {
    let service = client.service();
    let mut output = client.output();
    tokio::spawn(async move {
        loop {
            match output.recv().await {
                Ok(out) => logs.push_server(service, out.stream, out.line),
                Err(RecvError::Lagged(skipped)) => warn!("{service} output relay skipped {skipped} lines"),
                Err(RecvError::Closed) => return,
            }
        }
    });
}

/// Report the client's exit once it happens. The client stays attached;
/// only an explicit stop or the next start replaces it.
pub fn watch_client(client: Arc<dyn ServerClient>, logs: LogStore, events: broadcast::Sender<Event>) {
    let exited = client.exited();
    tokio::spawn(async move {
        let Some(exit) = wait_exited(exited).await else {
            return;
        };
        let service = client.service();
        info!("{service} went offline: code={:?} signal={:?}", exit.code, exit.signal);
        logs.push_daemon(format!(
            "{service} exited: code={:?} signal={:?}",
            exit.code, exit.signal
        ));
        let _ = events.send(Event::Lifecycle(LifecycleEvent::ServiceExited {
            service,
            exit,
            at_ms: now_millis(),
        }));
    });
}
