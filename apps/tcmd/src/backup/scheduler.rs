use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tcm_core::CoreError;
use tcm_core::proto::{BackupEvent, BackupSchedule, BackupStatus, BackupStore, Event};
use tcm_utils::now_millis;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{info, warn};

use super::ops::BackupJob;
use super::schedule::{Countdown, Tick, remaining_secs};

const TICK: Duration = Duration::from_secs(1);

/// Recurring countdown that fires backup jobs for the enabled stores.
#[derive(Clone)]
pub struct BackupScheduler {
    job: Arc<dyn BackupJob>,
    events: broadcast::Sender<Event>,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    schedule: BackupSchedule,
    next: Option<Instant>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl BackupScheduler {
    pub fn new(job: Arc<dyn BackupJob>, events: broadcast::Sender<Event>) -> Self {
        Self {
            job,
            events,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the schedule. Any running countdown is dropped first, so at
    /// most one timer exists at a time.
    pub fn apply(&self, schedule: BackupSchedule) -> Result<BackupStatus, CoreError> {
        let interval = schedule.interval();
        if schedule.is_active() && interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "backup interval must be at least one minute".to_string(),
            ));
        }

        let mut inner = self.lock();
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        inner.schedule = schedule.clone();

        if !schedule.is_active() {
            inner.next = None;
            drop(inner);
            info!("backup schedule disabled");
            let _ = self.events.send(Event::Backup(BackupEvent::Stopped {}));
            return Ok(self.status());
        }

        let countdown = Countdown::start(Instant::now(), interval);
        inner.next = Some(countdown.next());
        inner.timer = Some(tokio::spawn(self.clone().run_countdown(inner.generation, countdown)));
        drop(inner);

        info!(
            "backup schedule active: stores={:?} every {}s",
            schedule.enabled_stores(),
            interval.as_secs()
        );
        Ok(self.status())
    }

    pub fn status(&self) -> BackupStatus {
        let inner = self.lock();
        BackupStatus {
            schedule: inner.schedule.clone(),
            next_at_ms: inner.next.map(wall_clock_ms),
        }
    }

    #[cfg(test)]
    fn next_backup(&self) -> Option<Instant> {
        self.lock().next
    }

    /// Run jobs for `stores` now, independent of the countdown.
    pub fn trigger(&self, stores: &[BackupStore]) {
        let _ = self.events.send(Event::Backup(BackupEvent::Triggered {
            stores: stores.to_vec(),
            at_ms: now_millis(),
        }));
        for store in stores.iter().copied() {
            let job = self.job.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                let event = match job.run(store).await {
                    Ok(path) => BackupEvent::Completed {
                        store,
                        path: path.display().to_string(),
                    },
                    Err(message) => {
                        warn!("{store} backup failed: {message}");
                        BackupEvent::Failed { store, message }
                    }
                };
                let _ = events.send(Event::Backup(event));
            });
        }
    }

    async fn run_countdown(self, generation: u64, mut countdown: Countdown) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Instant::now();

            let stores = match countdown.tick(now) {
                Tick::Waiting { .. } => None,
                Tick::Due => {
                    countdown.advance(now);
                    let mut inner = self.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.next = Some(countdown.next());
                    Some(inner.schedule.enabled_stores())
                }
            };
            if let Some(stores) = stores {
                info!("scheduled backup due for {stores:?}");
                self.trigger(&stores);
            }

            let _ = self.events.send(Event::Backup(BackupEvent::Countdown {
                next_at_ms: wall_clock_ms(countdown.next()),
                remaining_secs: remaining_secs(now, countdown.next()),
            }));
        }
    }
}

fn wall_clock_ms(target: Instant) -> u64 {
    let ahead = target.saturating_duration_since(Instant::now());
    now_millis() + ahead.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;

    const HOUR: Duration = Duration::from_secs(3600);

    #[derive(Default)]
    struct RecordingJob {
        runs: Mutex<Vec<BackupStore>>,
    }

    impl RecordingJob {
        fn runs(&self) -> Vec<BackupStore> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BackupJob for RecordingJob {
        async fn run(&self, store: BackupStore) -> Result<PathBuf, String> {
            self.runs.lock().unwrap().push(store);
            Ok(PathBuf::from(format!("/backups/{store}.sql")))
        }
    }

    fn scheduler() -> (BackupScheduler, Arc<RecordingJob>, broadcast::Receiver<Event>) {
        let job = Arc::new(RecordingJob::default());
        let (events, rx) = broadcast::channel(16_384);
        (BackupScheduler::new(job.clone(), events), job, rx)
    }

    fn auth_hourly() -> BackupSchedule {
        BackupSchedule {
            auth: true,
            hours: 1,
            ..BackupSchedule::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn auth_only_hourly_fires_once_and_advances() {
        let (scheduler, job, _rx) = scheduler();
        let t = Instant::now();

        scheduler.apply(auth_hourly()).unwrap();
        assert_eq!(scheduler.next_backup(), Some(t + HOUR));

        tokio::time::sleep(HOUR - Duration::from_secs(2)).await;
        assert!(job.runs().is_empty());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(job.runs(), vec![BackupStore::Auth]);
        assert_eq!(scheduler.next_backup(), Some(t + HOUR * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn reapplying_replaces_the_timer() {
        let (scheduler, job, _rx) = scheduler();
        let t = Instant::now();

        scheduler.apply(auth_hourly()).unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        let mut both = auth_hourly();
        both.world = true;
        scheduler.apply(both).unwrap();
        assert_eq!(scheduler.next_backup(), Some(t + Duration::from_secs(600) + HOUR));

        tokio::time::sleep(HOUR + Duration::from_millis(500)).await;
        let mut runs = job.runs();
        runs.sort();
        assert_eq!(runs, vec![BackupStore::Auth, BackupStore::World]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_all_stores_stops_the_countdown() {
        let (scheduler, job, mut rx) = scheduler();
        scheduler.apply(auth_hourly()).unwrap();

        let status = scheduler.apply(BackupSchedule { hours: 1, ..BackupSchedule::default() }).unwrap();
        assert_eq!(status.next_at_ms, None);
        assert_eq!(scheduler.next_backup(), None);

        tokio::time::sleep(HOUR * 3).await;
        assert!(job.runs().is_empty());

        let mut stopped = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::Backup(BackupEvent::Stopped {}) => stopped = true,
                Event::Backup(BackupEvent::Countdown { .. }) if stopped => {
                    panic!("countdown ticked after the schedule was disabled")
                }
                _ => {}
            }
        }
        assert!(stopped);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (scheduler, _job, _rx) = scheduler();
        let schedule = BackupSchedule {
            world: true,
            ..BackupSchedule::default()
        };
        assert!(matches!(scheduler.apply(schedule), Err(CoreError::InvalidConfig(_))));
        assert_eq!(scheduler.next_backup(), None);
    }

    #[tokio::test]
    async fn manual_trigger_reports_each_store() {
        let (scheduler, job, mut rx) = scheduler();
        scheduler.trigger(&[BackupStore::Characters, BackupStore::World]);

        let mut completed = Vec::new();
        while completed.len() < 2 {
            if let Event::Backup(BackupEvent::Completed { store, .. }) = rx.recv().await.unwrap() {
                completed.push(store);
            }
        }
        completed.sort();
        assert_eq!(completed, vec![BackupStore::Characters, BackupStore::World]);
        assert_eq!(job.runs().len(), 2);
    }
}
