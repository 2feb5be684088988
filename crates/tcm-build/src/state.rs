use std::sync::{Arc, Mutex, MutexGuard};

use tcm_core::proto::{PipelineState, RunId, RunKind};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::BuildError;

#[derive(Default)]
struct Slot {
    state: PipelineState,
    active: Option<ActiveRun>,
    next_run: RunId,
}

struct ActiveRun {
    id: RunId,
    kind: RunKind,
    cancel: CancellationToken,
}

pub(crate) enum Admission {
    Started(RunGuard),
    /// A compile was already running; it has been told to stop instead.
    CancelledPrior(RunId),
}

/// Single-owner pipeline state. Every transition happens under one lock so
/// admission is check-then-set in one step.
#[derive(Clone)]
pub(crate) struct RunSlot {
    inner: Arc<Mutex<Slot>>,
    busy: Arc<watch::Sender<bool>>,
}

impl Default for RunSlot {
    fn default() -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            inner: Arc::default(),
            busy: Arc::new(busy),
        }
    }
}

impl RunSlot {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.lock().state
    }

    pub(crate) fn admit(&self, kind: RunKind, initial: PipelineState) -> Result<Admission, BuildError> {
        let mut slot = self.lock();
        if let Some(active) = slot.active.as_ref() {
            return match (active.kind, kind) {
                (RunKind::Sync, _) => Err(BuildError::SyncInProgress),
                (RunKind::Compile, RunKind::Sync) => Err(BuildError::CompileInProgress),
                (RunKind::Compile, RunKind::Compile) if slot.state == PipelineState::Deploying => {
                    Err(BuildError::DeployInProgress)
                }
                (RunKind::Compile, RunKind::Compile) => {
                    active.cancel.cancel();
                    Ok(Admission::CancelledPrior(active.id))
                }
            };
        }

        slot.next_run += 1;
        let id = slot.next_run;
        slot.state = initial;
        slot.active = Some(ActiveRun {
            id,
            kind,
            cancel: CancellationToken::new(),
        });
        self.busy.send_replace(true);
        Ok(Admission::Started(RunGuard { slot: self.clone(), run: id }))
    }

    /// Cancel whatever run is active. Deployment runs to completion.
    pub(crate) fn cancel_active(&self) -> Result<Option<RunId>, BuildError> {
        let slot = self.lock();
        if slot.state == PipelineState::Deploying {
            return Err(BuildError::DeployInProgress);
        }
        Ok(slot.active.as_ref().map(|active| {
            active.cancel.cancel();
            active.id
        }))
    }

    /// Resolves once no run holds the slot.
    pub(crate) async fn idle(&self) {
        let mut busy = self.busy.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
    }
}

/// Held by the task executing a run; dropping it returns the pipeline to idle.
pub(crate) struct RunGuard {
    slot: RunSlot,
    run: RunId,
}

impl RunGuard {
    pub(crate) fn run(&self) -> RunId {
        self.run
    }

    /// Move to `state` and hand out the token the stage must observe.
    /// Compilation gets a freshly issued token.
    pub(crate) fn enter(&self, state: PipelineState) -> Result<CancellationToken, BuildError> {
        let mut guard = self.slot.lock();
        let Slot { state: current, active, .. } = &mut *guard;
        let active = active
            .as_mut()
            .filter(|active| active.id == self.run)
            .ok_or(BuildError::Cancelled)?;
        if active.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        if state == PipelineState::Compiling {
            active.cancel = CancellationToken::new();
        }
        *current = state;
        Ok(active.cancel.clone())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.active.as_ref().is_some_and(|active| active.id == self.run) {
            slot.active = None;
            slot.state = PipelineState::Idle;
            self.slot.busy.send_replace(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(admission: Admission) -> RunGuard {
        match admission {
            Admission::Started(guard) => guard,
            Admission::CancelledPrior(run) => panic!("run {run} unexpectedly active"),
        }
    }

    #[test]
    fn sync_blocks_compile_and_sync() {
        let slot = RunSlot::default();
        let _sync = started(slot.admit(RunKind::Sync, PipelineState::Syncing).unwrap());
        assert!(matches!(
            slot.admit(RunKind::Compile, PipelineState::Generating),
            Err(BuildError::SyncInProgress)
        ));
        assert!(matches!(
            slot.admit(RunKind::Sync, PipelineState::Syncing),
            Err(BuildError::SyncInProgress)
        ));
    }

    #[test]
    fn second_compile_cancels_the_first() {
        let slot = RunSlot::default();
        let first = started(slot.admit(RunKind::Compile, PipelineState::Generating).unwrap());
        let token = first.enter(PipelineState::Generating).unwrap();

        match slot.admit(RunKind::Compile, PipelineState::Generating).unwrap() {
            Admission::CancelledPrior(run) => assert_eq!(run, first.run()),
            Admission::Started(_) => panic!("second compile must not start"),
        }
        assert!(token.is_cancelled());
        assert!(matches!(first.enter(PipelineState::Compiling), Err(BuildError::Cancelled)));
        assert!(matches!(
            slot.admit(RunKind::Sync, PipelineState::Syncing),
            Err(BuildError::CompileInProgress)
        ));
    }

    #[test]
    fn compile_token_is_independent_of_generate_token() {
        let slot = RunSlot::default();
        let run = started(slot.admit(RunKind::Compile, PipelineState::Generating).unwrap());
        let generate = run.enter(PipelineState::Generating).unwrap();
        let compile = run.enter(PipelineState::Compiling).unwrap();

        generate.cancel();
        assert!(!compile.is_cancelled());
        assert_eq!(slot.state(), PipelineState::Compiling);
    }

    #[test]
    fn deploying_run_refuses_cancel_and_toggle() {
        let slot = RunSlot::default();
        let run = started(slot.admit(RunKind::Compile, PipelineState::Generating).unwrap());
        let token = run.enter(PipelineState::Deploying).unwrap();

        assert!(matches!(slot.cancel_active(), Err(BuildError::DeployInProgress)));
        assert!(matches!(
            slot.admit(RunKind::Compile, PipelineState::Generating),
            Err(BuildError::DeployInProgress)
        ));
        assert!(!token.is_cancelled());
        assert_eq!(slot.state(), PipelineState::Deploying);
    }

    #[tokio::test]
    async fn idle_resolves_when_the_guard_drops() {
        let slot = RunSlot::default();
        slot.idle().await;

        let run = started(slot.admit(RunKind::Sync, PipelineState::Syncing).unwrap());
        let waiter = tokio::spawn({
            let slot = slot.clone();
            async move { slot.idle().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(run);
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn dropping_the_guard_returns_to_idle() {
        let slot = RunSlot::default();
        let run = started(slot.admit(RunKind::Sync, PipelineState::Syncing).unwrap());
        drop(run);
        assert_eq!(slot.state(), PipelineState::Idle);
        assert!(slot.cancel_active().unwrap().is_none());
        assert!(slot.admit(RunKind::Compile, PipelineState::Generating).is_ok());
    }
}
