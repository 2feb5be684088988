use std::path::{Path, PathBuf};
use std::sync::Arc;

use tcm_core::proto::{BuildEvent, BuildOutcome, BuildStage, PipelineState, Platform, RunId, RunKind};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::deploy_artifacts;
use crate::error::BuildError;
use crate::progress::StageSink;
use crate::scratch::ScratchDir;
use crate::state::{Admission, RunGuard, RunSlot};
use crate::toolchain::BuildToolchain;
use crate::vcs::SourceRepository;

const COMPILE_ABORTED: &str = "compile aborted";
const SYNC_ABORTED: &str = "sync aborted";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_root: Option<PathBuf>,
    pub server_folder: PathBuf,
    /// Parent of the per-run scratch directories.
    pub scratch_base: PathBuf,
    /// Location of the release artifacts relative to the scratch directory.
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct CompileRequest {
    pub platform: Platform,
    /// Run the sync stage before generating build files.
    pub sync_first: bool,
}

/// A run in flight. `events` has exactly one reader; the last event is
/// always `BuildEvent::Finished`.
pub struct RunHandle {
    pub run: RunId,
    pub kind: RunKind,
    pub events: UnboundedReceiver<BuildEvent>,
    pub task: JoinHandle<BuildOutcome>,
}

pub enum Submitted {
    Started(RunHandle),
    /// A compile was already in flight and has been cancelled instead.
    CancelledPrior { run: RunId },
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    repository: Arc<dyn SourceRepository>,
    toolchain: Arc<dyn BuildToolchain>,
    slot: RunSlot,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        repository: Arc<dyn SourceRepository>,
        toolchain: Arc<dyn BuildToolchain>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repository,
            toolchain,
            slot: RunSlot::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.slot.state()
    }

    /// Cancel the active run, if any. A run that has reached deployment
    /// cannot be cancelled.
    pub fn cancel(&self) -> Result<Option<RunId>, BuildError> {
        self.slot.cancel_active()
    }

    /// Resolves once no run is in flight and its scratch directory is gone.
    pub async fn wait_idle(&self) {
        self.slot.idle().await
    }

    /// Clone the source tree when the source root is empty, pull otherwise.
    pub fn sync(&self) -> Result<RunHandle, BuildError> {
        let source_root = self.source_root()?;
        let guard = match self.slot.admit(RunKind::Sync, PipelineState::Syncing)? {
            Admission::Started(guard) => guard,
            Admission::CancelledPrior(_) => return Err(BuildError::CompileInProgress),
        };

        let pipeline = self.clone();
        Ok(self.spawn(guard, RunKind::Sync, move |guard, tx| async move {
            match guard.enter(PipelineState::Syncing) {
                Ok(cancel) => {
                    match pipeline.sync_stage(guard.run(), &source_root, &tx, &cancel).await {
                        Ok(()) => BuildOutcome::Succeeded {
                            message: format!("{} is up to date", source_root.display()),
                        },
                        Err(_) if cancel.is_cancelled() => aborted(SYNC_ABORTED),
                        Err(err) => failed(BuildStage::Sync, err),
                    }
                }
                Err(_) => aborted(SYNC_ABORTED),
            }
        }))
    }

    /// Generate, compile and deploy. A compile request while another compile
    /// is in flight cancels that run instead of starting a second one.
    pub fn compile(&self, request: CompileRequest) -> Result<Submitted, BuildError> {
        let source_root = self.source_root()?;
        if !request.platform.supported_by_host() {
            return Err(BuildError::UnsupportedPlatform(request.platform));
        }

        let initial = if request.sync_first {
            PipelineState::Syncing
        } else {
            PipelineState::Generating
        };
        let guard = match self.slot.admit(RunKind::Compile, initial)? {
            Admission::Started(guard) => guard,
            Admission::CancelledPrior(run) => {
                info!(run, "compile requested while compiling; cancelling run");
                return Ok(Submitted::CancelledPrior { run });
            }
        };

        let pipeline = self.clone();
        let handle = self.spawn(guard, RunKind::Compile, move |guard, tx| async move {
            pipeline.run_compile(&guard, &source_root, request, &tx).await
        });
        Ok(Submitted::Started(handle))
    }

    fn source_root(&self) -> Result<PathBuf, BuildError> {
        self.config
            .source_root
            .clone()
            .filter(|root| !root.as_os_str().is_empty())
            .ok_or(BuildError::SourceRootNotConfigured)
    }

    fn spawn<F, Fut>(&self, guard: RunGuard, kind: RunKind, body: F) -> RunHandle
    where
        F: FnOnce(RunGuard, UnboundedSender<BuildEvent>) -> Fut + Send + 'static,
        Fut: Future<Output = BuildOutcome> + Send + 'static,
    {
        let run = guard.run();
        let (tx, events) = mpsc::unbounded_channel();
        info!(run, ?kind, "build run started");

        let task = tokio::spawn(async move {
            let finished_tx = tx.clone();
            // the body owns the guard, so the pipeline is idle again before
            // the terminal event goes out
            let outcome = body(guard, tx).await;
            match &outcome {
                BuildOutcome::Succeeded { message } => info!(run, "build run succeeded: {message}"),
                BuildOutcome::Failed { stage, message } => {
                    warn!(run, ?stage, "build run failed: {message}")
                }
                BuildOutcome::Cancelled { message } => info!(run, "build run cancelled: {message}"),
            }
            let _ = finished_tx.send(BuildEvent::Finished {
                run,
                outcome: outcome.clone(),
            });
            outcome
        });

        RunHandle { run, kind, events, task }
    }

    async fn run_compile(
        &self,
        guard: &RunGuard,
        source_root: &Path,
        request: CompileRequest,
        tx: &UnboundedSender<BuildEvent>,
    ) -> BuildOutcome {
        if request.sync_first {
            let Ok(cancel) = guard.enter(PipelineState::Syncing) else {
                return aborted(COMPILE_ABORTED);
            };
            if let Err(err) = self.sync_stage(guard.run(), source_root, tx, &cancel).await {
                if cancel.is_cancelled() {
                    return aborted(COMPILE_ABORTED);
                }
                return failed(BuildStage::Sync, err);
            }
        }

        let scratch = match ScratchDir::create(&self.config.scratch_base).await {
            Ok(scratch) => scratch,
            Err(err) => {
                return BuildOutcome::Failed {
                    stage: BuildStage::Generate,
                    message: format!("failed to create scratch directory: {err}"),
                };
            }
        };
        debug!(run = guard.run(), "scratch directory {}", scratch.path().display());

        let outcome = self
            .build_stages(guard, source_root, request.platform, scratch.path(), tx)
            .await;

        match scratch.remove().await {
            Ok(path) => debug!(run = guard.run(), "removed scratch directory {}", path.display()),
            Err(err) => warn!(run = guard.run(), "failed to remove scratch directory: {err}"),
        }
        outcome
    }

    async fn build_stages(
        &self,
        guard: &RunGuard,
        source_root: &Path,
        platform: Platform,
        scratch: &Path,
        tx: &UnboundedSender<BuildEvent>,
    ) -> BuildOutcome {
        let run = guard.run();

        let Ok(cancel) = guard.enter(PipelineState::Generating) else {
            return aborted(COMPILE_ABORTED);
        };
        let sink = self.stage_sink(run, BuildStage::Generate, tx);
        let result = self
            .toolchain
            .generate(source_root, scratch, platform, &sink, &cancel)
            .await;
        if let Some(outcome) = stage_failure(BuildStage::Generate, &cancel, result) {
            return outcome;
        }

        let Ok(cancel) = guard.enter(PipelineState::Compiling) else {
            return aborted(COMPILE_ABORTED);
        };
        let sink = self.stage_sink(run, BuildStage::Compile, tx);
        let result = self.toolchain.compile(scratch, platform, &sink, &cancel).await;
        if let Some(outcome) = stage_failure(BuildStage::Compile, &cancel, result) {
            return outcome;
        }

        if guard.enter(PipelineState::Deploying).is_err() {
            return aborted(COMPILE_ABORTED);
        }
        let sink = self.stage_sink(run, BuildStage::Deploy, tx);
        let artifacts = scratch.join(&self.config.artifact_dir);
        let server_folder = self.config.server_folder.clone();
        match deploy_artifacts(artifacts, server_folder.clone()).await {
            Ok(count) => {
                let message = format!("deployed {count} files to {}", server_folder.display());
                sink.line(message.clone());
                BuildOutcome::Succeeded { message }
            }
            Err(err) => failed(BuildStage::Deploy, err),
        }
    }

    async fn sync_stage(
        &self,
        run: RunId,
        source_root: &Path,
        tx: &UnboundedSender<BuildEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let sink = self.stage_sink(run, BuildStage::Sync, tx);
        if is_empty_dir(source_root).await {
            sink.percent(0.0);
            self.repository.clone_fresh(source_root, &sink, cancel).await
        } else {
            self.repository.pull(source_root, &sink, cancel).await
        }
    }

    fn stage_sink(&self, run: RunId, stage: BuildStage, tx: &UnboundedSender<BuildEvent>) -> StageSink {
        let _ = tx.send(BuildEvent::StageStarted { run, stage });
        StageSink::new(run, stage, tx.clone())
    }
}

async fn is_empty_dir(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => true,
    }
}

fn stage_failure(
    stage: BuildStage,
    cancel: &CancellationToken,
    result: Result<(), String>,
) -> Option<BuildOutcome> {
    if cancel.is_cancelled() {
        return Some(aborted(COMPILE_ABORTED));
    }
    result.err().map(|err| failed(stage, err))
}

fn aborted(message: &str) -> BuildOutcome {
    BuildOutcome::Cancelled {
        message: message.to_string(),
    }
}

fn failed(stage: BuildStage, message: String) -> BuildOutcome {
    BuildOutcome::Failed { stage, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeRepository {
        clones: AtomicUsize,
        pulls: AtomicUsize,
        hold_pull: Option<Arc<Notify>>,
        fail_pull: bool,
    }

    #[async_trait]
    impl SourceRepository for FakeRepository {
        async fn clone_fresh(
            &self,
            destination: &Path,
            sink: &StageSink,
            _cancel: &CancellationToken,
        ) -> Result<(), String> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            for step in 0..=100 {
                sink.percent(f64::from(step));
            }
            std::fs::create_dir_all(destination).map_err(|e| e.to_string())?;
            std::fs::write(destination.join("CMakeLists.txt"), b"project(tc)").map_err(|e| e.to_string())
        }

        async fn pull(&self, _path: &Path, sink: &StageSink, cancel: &CancellationToken) -> Result<(), String> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pull {
                return Err("fatal: unable to access remote".into());
            }
            sink.line("Already up to date.");
            if let Some(release) = &self.hold_pull {
                tokio::select! {
                    _ = release.notified() => {}
                    _ = cancel.cancelled() => return Err("interrupted".into()),
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeToolchain {
        generates: AtomicUsize,
        compiles: AtomicUsize,
        fail_generate: bool,
        block_generate: bool,
        generate_started: Arc<Notify>,
        fail_compile: bool,
        block_compile: bool,
        compile_started: Arc<Notify>,
        scratch: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl BuildToolchain for FakeToolchain {
        async fn generate(
            &self,
            _source_root: &Path,
            scratch: &Path,
            _platform: Platform,
            sink: &StageSink,
            cancel: &CancellationToken,
        ) -> Result<(), String> {
            self.generates.fetch_add(1, Ordering::SeqCst);
            *self.scratch.lock().unwrap() = Some(scratch.to_path_buf());
            std::fs::write(scratch.join("CMakeCache.txt"), b"cache").map_err(|e| e.to_string())?;
            sink.line("-- Configuring done");
            self.generate_started.notify_one();
            if self.block_generate {
                cancel.cancelled().await;
                return Err("interrupted".into());
            }
            if self.fail_generate {
                return Err("CMake Error: missing boost".into());
            }
            Ok(())
        }

        async fn compile(
            &self,
            scratch: &Path,
            _platform: Platform,
            sink: &StageSink,
            cancel: &CancellationToken,
        ) -> Result<(), String> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            sink.line("[ 50%] Building CXX object");
            self.compile_started.notify_one();
            if self.block_compile {
                cancel.cancelled().await;
                return Err("interrupted".into());
            }
            if self.fail_compile {
                return Err("worldserver.cpp:12: error: expected ';'".into());
            }
            let release = scratch.join("bin").join("Release");
            std::fs::create_dir_all(&release).map_err(|e| e.to_string())?;
            std::fs::write(release.join("worldserver"), b"bin").map_err(|e| e.to_string())?;
            std::fs::write(release.join("authserver"), b"bin").map_err(|e| e.to_string())
        }
    }

    struct Fixture {
        _dirs: Vec<tempfile::TempDir>,
        source: PathBuf,
        server: PathBuf,
        scratch_base: PathBuf,
    }

    fn fixture(populated_source: bool) -> Fixture {
        let source = tempfile::tempdir().unwrap();
        let server = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        if populated_source {
            std::fs::write(source.path().join("CMakeLists.txt"), b"project(tc)").unwrap();
        }
        Fixture {
            source: source.path().to_path_buf(),
            server: server.path().to_path_buf(),
            scratch_base: scratch.path().to_path_buf(),
            _dirs: vec![source, server, scratch],
        }
    }

    fn pipeline(fx: &Fixture, repo: Arc<FakeRepository>, toolchain: Arc<FakeToolchain>) -> Pipeline {
        Pipeline::new(
            PipelineConfig {
                source_root: Some(fx.source.clone()),
                server_folder: fx.server.clone(),
                scratch_base: fx.scratch_base.clone(),
                artifact_dir: PathBuf::from("bin").join("Release"),
            },
            repo,
            toolchain,
        )
    }

    fn request() -> CompileRequest {
        CompileRequest {
            platform: Platform::X64,
            sync_first: false,
        }
    }

    fn started(submitted: Submitted) -> RunHandle {
        match submitted {
            Submitted::Started(handle) => handle,
            Submitted::CancelledPrior { run } => panic!("run {run} was cancelled instead"),
        }
    }

    async fn drain(handle: &mut RunHandle) -> Vec<BuildEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }
        events
    }

    fn scratch_of(toolchain: &FakeToolchain) -> PathBuf {
        toolchain.scratch.lock().unwrap().clone().expect("generate ran")
    }

    #[tokio::test]
    async fn successful_run_deploys_and_reclaims_scratch() {
        let fx = fixture(true);
        let toolchain = Arc::new(FakeToolchain::default());
        let pipeline = pipeline(&fx, Arc::default(), toolchain.clone());

        let mut handle = started(pipeline.compile(request()).unwrap());
        let events = drain(&mut handle).await;
        let outcome = handle.task.await.unwrap();

        assert!(matches!(outcome, BuildOutcome::Succeeded { .. }));
        assert!(fx.server.join("worldserver").exists());
        assert!(fx.server.join("authserver").exists());
        assert!(!scratch_of(&toolchain).exists());
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let stages: Vec<BuildStage> = events
            .iter()
            .filter_map(|event| match event {
                BuildEvent::StageStarted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![BuildStage::Generate, BuildStage::Compile, BuildStage::Deploy]);
        assert!(matches!(events.last(), Some(BuildEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn generate_failure_skips_compile_and_reclaims_scratch() {
        let fx = fixture(true);
        let toolchain = Arc::new(FakeToolchain {
            fail_generate: true,
            ..Default::default()
        });
        let pipeline = pipeline(&fx, Arc::default(), toolchain.clone());

        let handle = started(pipeline.compile(request()).unwrap());
        let outcome = handle.task.await.unwrap();

        assert_eq!(
            outcome,
            BuildOutcome::Failed {
                stage: BuildStage::Generate,
                message: "CMake Error: missing boost".into(),
            }
        );
        assert_eq!(toolchain.compiles.load(Ordering::SeqCst), 0);
        assert!(!scratch_of(&toolchain).exists());
        assert!(!fx.server.join("worldserver").exists());
    }

    #[tokio::test]
    async fn compile_failure_skips_deploy_and_reclaims_scratch() {
        let fx = fixture(true);
        let toolchain = Arc::new(FakeToolchain {
            fail_compile: true,
            ..Default::default()
        });
        let pipeline = pipeline(&fx, Arc::default(), toolchain.clone());

        let mut handle = started(pipeline.compile(request()).unwrap());
        let events = drain(&mut handle).await;
        let outcome = handle.task.await.unwrap();

        assert_eq!(
            outcome,
            BuildOutcome::Failed {
                stage: BuildStage::Compile,
                message: "worldserver.cpp:12: error: expected ';'".into(),
            }
        );
        assert!(!events
            .iter()
            .any(|event| matches!(event, BuildEvent::StageStarted { stage: BuildStage::Deploy, .. })));
        assert!(!scratch_of(&toolchain).exists());
        assert!(!fx.server.join("worldserver").exists());
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn failed_sync_stops_a_sync_first_compile() {
        let fx = fixture(true);
        let repo = Arc::new(FakeRepository {
            fail_pull: true,
            ..Default::default()
        });
        let toolchain = Arc::new(FakeToolchain::default());
        let pipeline = pipeline(&fx, repo.clone(), toolchain.clone());

        let handle = started(
            pipeline
                .compile(CompileRequest {
                    platform: Platform::X64,
                    sync_first: true,
                })
                .unwrap(),
        );
        let outcome = handle.task.await.unwrap();

        assert_eq!(
            outcome,
            BuildOutcome::Failed {
                stage: BuildStage::Sync,
                message: "fatal: unable to access remote".into(),
            }
        );
        assert_eq!(repo.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(toolchain.generates.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(&fx.scratch_base).unwrap().count(), 0);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn cancel_during_generate_skips_compile_and_reclaims_scratch() {
        let fx = fixture(true);
        let toolchain = Arc::new(FakeToolchain {
            block_generate: true,
            ..Default::default()
        });
        let pipeline = pipeline(&fx, Arc::default(), toolchain.clone());

        let handle = started(pipeline.compile(request()).unwrap());
        toolchain.generate_started.notified().await;
        assert_eq!(pipeline.state(), PipelineState::Generating);
        assert_eq!(pipeline.cancel().unwrap(), Some(handle.run));

        let outcome = handle.task.await.unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Cancelled {
                message: "compile aborted".into()
            }
        );
        assert_eq!(toolchain.compiles.load(Ordering::SeqCst), 0);
        assert!(!scratch_of(&toolchain).exists());
    }

    #[tokio::test]
    async fn wait_idle_returns_after_the_cancelled_run_cleans_up() {
        let fx = fixture(true);
        let toolchain = Arc::new(FakeToolchain {
            block_compile: true,
            ..Default::default()
        });
        let pipeline = pipeline(&fx, Arc::default(), toolchain.clone());

        let _handle = started(pipeline.compile(request()).unwrap());
        toolchain.compile_started.notified().await;
        assert!(scratch_of(&toolchain).exists());

        pipeline.cancel().unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), pipeline.wait_idle())
            .await
            .unwrap();

        assert!(!scratch_of(&toolchain).exists());
        assert_eq!(std::fs::read_dir(&fx.scratch_base).unwrap().count(), 0);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn second_compile_request_cancels_the_running_one() {
        let fx = fixture(true);
        let toolchain = Arc::new(FakeToolchain {
            block_compile: true,
            ..Default::default()
        });
        let pipeline = pipeline(&fx, Arc::default(), toolchain.clone());

        let handle = started(pipeline.compile(request()).unwrap());
        toolchain.compile_started.notified().await;

        match pipeline.compile(request()).unwrap() {
            Submitted::CancelledPrior { run } => assert_eq!(run, handle.run),
            Submitted::Started(_) => panic!("a second compile must not start"),
        }

        let outcome = handle.task.await.unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Cancelled {
                message: "compile aborted".into()
            }
        );
        assert_eq!(toolchain.generates.load(Ordering::SeqCst), 1);
        assert_eq!(toolchain.compiles.load(Ordering::SeqCst), 1);
        assert!(!scratch_of(&toolchain).exists());
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn compile_is_refused_while_syncing() {
        let fx = fixture(true);
        let release = Arc::new(Notify::new());
        let repo = Arc::new(FakeRepository {
            hold_pull: Some(release.clone()),
            ..Default::default()
        });
        let toolchain = Arc::new(FakeToolchain::default());
        let pipeline = pipeline(&fx, repo.clone(), toolchain.clone());

        let sync = pipeline.sync().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Syncing);
        assert!(matches!(pipeline.compile(request()), Err(BuildError::SyncInProgress)));

        release.notify_one();
        let outcome = sync.task.await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Succeeded { .. }));
        assert_eq!(repo.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(toolchain.generates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_source_root_is_cloned_with_throttled_progress() {
        let fx = fixture(false);
        let repo = Arc::new(FakeRepository::default());
        let pipeline = pipeline(&fx, repo.clone(), Arc::default());

        let mut handle = pipeline.sync().unwrap();
        let events = drain(&mut handle).await;

        assert_eq!(repo.clones.load(Ordering::SeqCst), 1);
        assert_eq!(repo.pulls.load(Ordering::SeqCst), 0);
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                BuildEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(progress.len() < 60);
        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn sync_first_runs_all_four_stages() {
        let fx = fixture(true);
        let repo = Arc::new(FakeRepository::default());
        let toolchain = Arc::new(FakeToolchain::default());
        let pipeline = pipeline(&fx, repo.clone(), toolchain.clone());

        let mut handle = started(
            pipeline
                .compile(CompileRequest {
                    platform: Platform::X64,
                    sync_first: true,
                })
                .unwrap(),
        );
        let events = drain(&mut handle).await;

        let stages: Vec<BuildStage> = events
            .iter()
            .filter_map(|event| match event {
                BuildEvent::StageStarted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![BuildStage::Sync, BuildStage::Generate, BuildStage::Compile, BuildStage::Deploy]
        );
        assert_eq!(repo.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_source_root_is_a_usage_error() {
        let fx = fixture(true);
        let pipeline = Pipeline::new(
            PipelineConfig {
                source_root: None,
                server_folder: fx.server.clone(),
                scratch_base: fx.scratch_base.clone(),
                artifact_dir: PathBuf::from("bin"),
            },
            Arc::new(FakeRepository::default()),
            Arc::new(FakeToolchain::default()),
        );
        assert!(matches!(pipeline.compile(request()), Err(BuildError::SourceRootNotConfigured)));
        assert!(matches!(pipeline.sync(), Err(BuildError::SourceRootNotConfigured)));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }
}
