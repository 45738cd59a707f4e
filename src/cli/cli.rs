use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{RunConfiguration, SchedulerPolicy};
use crate::services::{CommandRunner, PidLocator, SysinfoPidLocator, TasklistPidLocator};

/// stackdump - capture a series of JVM thread dumps from running processes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Directory containing the thread-dump tool, e.g. $JAVA_HOME/bin
    pub tool_dir: PathBuf,

    /// Directory the dump files are written to (created if missing)
    pub output_dir: PathBuf,

    /// Process search patterns, comma separated or given one by one
    #[arg(required = true, num_args = 1.., value_delimiter = ',')]
    pub patterns: Vec<String>,

    /// Thread dumps per process
    #[arg(
        short = 'n',
        long,
        env = "STACKDUMP_COUNT",
        default_value_t = 6,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub dump_count: u32,

    /// Seconds between two dumps of the same process
    #[arg(short, long, env = "STACKDUMP_DELAY", default_value_t = 5)]
    pub delay_secs: u64,

    /// Milliseconds between launching two pattern tasks
    #[arg(long, default_value_t = 200)]
    pub stagger_ms: u64,

    /// Seconds to wait for all pattern tasks before giving up
    #[arg(long, env = "STACKDUMP_TIMEOUT", default_value_t = 300)]
    pub timeout_secs: u64,

    /// Pattern tasks running at the same time
    #[arg(
        short,
        long,
        default_value_t = 8,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub workers: u32,

    /// Name of the thread-dump binary inside TOOL_DIR
    #[arg(long, default_value = "jstack")]
    pub tool_binary: String,

    /// How processes are looked up
    #[arg(long, value_enum, default_value_t = LocatorKind::Auto)]
    pub locator: LocatorKind,

    /// Format of the final report on stdout
    #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
    pub summary: SummaryFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LocatorKind {
    /// `tasklist` on Windows, the native process table elsewhere
    Auto,
    Tasklist,
    Sysinfo,
}

impl LocatorKind {
    pub fn build(self, runner: Arc<dyn CommandRunner>) -> Arc<dyn PidLocator> {
        match self {
            LocatorKind::Tasklist => Arc::new(TasklistPidLocator::new(runner)),
            LocatorKind::Sysinfo => Arc::new(SysinfoPidLocator::new()),
            LocatorKind::Auto if cfg!(windows) => Arc::new(TasklistPidLocator::new(runner)),
            LocatorKind::Auto => Arc::new(SysinfoPidLocator::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Text,
    Json,
}

impl CommandArgs {
    pub fn run_configuration(&self) -> anyhow::Result<RunConfiguration> {
        if let Some(position) = self.patterns.iter().position(|p| p.trim().is_empty()) {
            anyhow::bail!(
                "search pattern #{} is empty, it would match every process",
                position + 1
            );
        }

        Ok(RunConfiguration {
            tool_dir: self.tool_dir.clone(),
            output_dir: self.output_dir.clone(),
            patterns: self.patterns.clone(),
        })
    }

    pub fn scheduler_policy(&self) -> SchedulerPolicy {
        SchedulerPolicy {
            dump_count: self.dump_count,
            dump_delay: Duration::from_secs(self.delay_secs),
            launch_stagger: Duration::from_millis(self.stagger_ms),
            overall_timeout: Duration::from_secs(self.timeout_secs),
            max_workers: self.workers as usize,
            tool_binary: self.tool_binary.clone(),
            ..SchedulerPolicy::default()
        }
    }
}
