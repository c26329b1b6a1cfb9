pub mod output;
pub mod scheduler;

pub use output::{AudioOutput, DeviceOutput, SilentOutput, UnitId};
pub use scheduler::{PlaybackScheduler, ScheduledUnit};
