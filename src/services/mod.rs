pub mod command_runner;
pub mod dump_writer;
pub mod pid_locator;
pub mod scheduler;

#[cfg(test)]
pub mod testing;

pub use command_runner::{CommandRunner, ProcessRunner};
pub use pid_locator::{PidLocator, SysinfoPidLocator, TasklistPidLocator};
pub use scheduler::DumpScheduler;
