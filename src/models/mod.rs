pub mod config;
pub mod report;

pub use config::{Pid, RunConfiguration, SchedulerPolicy};
pub use report::{PatternOutcome, PatternReport, PidReport, RunReport};
