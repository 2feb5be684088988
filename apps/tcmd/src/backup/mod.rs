mod ops;
mod schedule;
mod scheduler;

pub use ops::{BackupJob, MysqldumpJob};
pub use scheduler::BackupScheduler;
