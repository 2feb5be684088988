use std::sync::Mutex;

use tcm_core::proto::{BuildEvent, BuildStage, RunId};
use tokio::sync::mpsc::UnboundedSender;

/// Forwards fractional progress only when it moved by more than one unit
/// or reached the final stretch.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last: Option<f64>,
}

impl ProgressThrottle {
    pub fn offer(&mut self, value: f64) -> Option<u8> {
        let value = value.clamp(0.0, 100.0);
        let advance = match self.last {
            None => true,
            Some(last) => value - last > 1.0 || (value >= 99.0 && value > last),
        };
        if !advance {
            return None;
        }
        self.last = Some(value);
        Some(value.floor() as u8)
    }
}

/// Where a stage reports its transcript and progress.
pub struct StageSink {
    run: RunId,
    stage: BuildStage,
    tx: UnboundedSender<BuildEvent>,
    throttle: Mutex<ProgressThrottle>,
}

impl StageSink {
    pub fn new(run: RunId, stage: BuildStage, tx: UnboundedSender<BuildEvent>) -> Self {
        Self {
            run,
            stage,
            tx,
            throttle: Mutex::new(ProgressThrottle::default()),
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn line(&self, line: impl Into<String>) {
        let _ = self.tx.send(BuildEvent::Output {
            run: self.run,
            stage: self.stage,
            line: line.into(),
        });
    }

    pub fn percent(&self, value: f64) {
        let next = match self.throttle.lock() {
            Ok(mut throttle) => throttle.offer(value),
            Err(poisoned) => poisoned.into_inner().offer(value),
        };
        if let Some(percent) = next {
            let _ = self.tx.send(BuildEvent::Progress { run: self.run, percent });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_steps_are_swallowed() {
        let mut throttle = ProgressThrottle::default();
        assert_eq!(throttle.offer(0.0), Some(0));
        assert_eq!(throttle.offer(0.5), None);
        assert_eq!(throttle.offer(1.0), None);
        assert_eq!(throttle.offer(1.5), Some(1));
        assert_eq!(throttle.offer(40.0), Some(40));
    }

    #[test]
    fn final_stretch_always_advances() {
        let mut throttle = ProgressThrottle::default();
        assert_eq!(throttle.offer(98.5), Some(98));
        assert_eq!(throttle.offer(99.0), Some(99));
        assert_eq!(throttle.offer(99.4), Some(99));
        assert_eq!(throttle.offer(99.4), None);
        assert_eq!(throttle.offer(100.0), Some(100));
    }

    #[test]
    fn sink_emits_throttled_progress_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = StageSink::new(3, BuildStage::Sync, tx);
        for step in 0..=20 {
            sink.percent(f64::from(step) * 0.5);
        }
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::Progress { percent, .. } = event {
                seen.push(percent);
            }
        }
        assert_eq!(seen, vec![0, 1, 3, 4, 6, 7, 9]);
    }
}
