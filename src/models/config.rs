use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default file name template, e.g. `thread_9672_1594488582405__1.dump`
pub const DEFAULT_FILE_TEMPLATE: &str = "thread_{pid}_{millis}__{index}.dump";

/// Process identifier as reported by the discovery backend.
///
/// Kept as opaque text: the scheduler never does arithmetic on it, it only
/// hands it back to the capture tool and embeds it in file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pid(String);

impl Pid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Validated input of one run. Never mutated after startup.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    /// Directory holding the thread-dump binary
    pub tool_dir: PathBuf,
    /// Directory the dump files are written to
    pub output_dir: PathBuf,
    /// Search patterns in command line order, duplicates allowed
    pub patterns: Vec<String>,
}

/// Counts, delays and naming used by the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerPolicy {
    /// Captures per PID
    pub dump_count: u32,
    /// Pause between the end of one capture and the start of the next
    pub dump_delay: Duration,
    /// Pause between launching successive pattern tasks
    pub launch_stagger: Duration,
    /// Upper bound for waiting on all pattern tasks
    pub overall_timeout: Duration,
    /// Pattern tasks allowed to run at the same time
    pub max_workers: usize,
    /// File name with `{pid}`, `{millis}` and `{index}` placeholders
    pub file_template: String,
    /// Name of the thread-dump binary inside `tool_dir`
    pub tool_binary: String,
    /// Flags passed before the PID
    pub tool_args: Vec<String>,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            dump_count: 6,
            dump_delay: Duration::from_secs(5),
            launch_stagger: Duration::from_millis(200),
            overall_timeout: Duration::from_secs(5 * 60),
            max_workers: 8,
            file_template: DEFAULT_FILE_TEMPLATE.to_string(),
            tool_binary: "jstack".to_string(),
            tool_args: vec!["-l".to_string()],
        }
    }
}
