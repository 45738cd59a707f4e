use std::sync::Arc;

use log::{debug, info, warn};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::error::DiscoveryError;
use crate::models::Pid;
use crate::services::command_runner::{CommandRunner, CommandSpec};

/// Columns of a `tasklist /v /fo csv` row; anything shorter is not a process row
pub const TASKLIST_MIN_COLUMNS: usize = 9;

/// Finds the processes whose name or title contains a search pattern.
///
/// Returns an empty list, not an error, when nothing matches. Implementations
/// must not deduplicate: a process listed twice yields its PID twice.
pub trait PidLocator: Send + Sync {
    fn find(&self, pattern: &str) -> Result<Vec<Pid>, DiscoveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowMatch {
    Matched(Pid),
    Unmatched,
    Malformed { columns: usize },
}

/// Classifies one CSV row of the verbose task listing.
///
/// The image name is always the first column and the window title always the
/// last one; either may contain the pattern. Matching is case-sensitive.
pub fn match_tasklist_row(line: &str, pattern: &str, min_columns: usize) -> RowMatch {
    let columns: Vec<&str> = line.split(',').collect();

    if columns.len() < min_columns {
        return RowMatch::Malformed {
            columns: columns.len(),
        };
    }

    let image_name = unquote(columns[0]);
    let window_title = unquote(columns[columns.len() - 1]);

    if image_name.contains(pattern) || window_title.contains(pattern) {
        RowMatch::Matched(Pid::new(columns[1].replace('"', "")))
    } else {
        RowMatch::Unmatched
    }
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Discovery through the Windows task listing
pub struct TasklistPidLocator {
    runner: Arc<dyn CommandRunner>,
    command: CommandSpec,
    min_columns: usize,
}

impl TasklistPidLocator {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            // `/nh` drops the header row, which would otherwise match patterns
            // like "Name" or "Title"
            command: CommandSpec::new("tasklist").args(["/v", "/fo", "csv", "/nh"]),
            min_columns: TASKLIST_MIN_COLUMNS,
        }
    }
}

impl PidLocator for TasklistPidLocator {
    fn find(&self, pattern: &str) -> Result<Vec<Pid>, DiscoveryError> {
        let mut pids = Vec::new();

        let context = format!("[{}] discovery", pattern);
        for line in self.runner.run(&self.command, &context)? {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match match_tasklist_row(&line, pattern, self.min_columns) {
                RowMatch::Matched(pid) => {
                    info!("[{}] Found PID {}", pattern, pid);
                    pids.push(pid);
                }
                RowMatch::Unmatched => {}
                RowMatch::Malformed { columns } => {
                    warn!(
                        "[{}] Skipping malformed process listing row ({} of {} columns): {}",
                        pattern, columns, self.min_columns, line
                    );
                }
            }
        }

        Ok(pids)
    }
}

/// Discovery through the native process table (`sysinfo`).
///
/// A process matches when the pattern is part of its name or of its full
/// command line. Threads and the running process itself (whose arguments
/// contain every pattern) are never reported.
#[derive(Debug, Default)]
pub struct SysinfoPidLocator;

impl SysinfoPidLocator {
    pub fn new() -> Self {
        Self
    }
}

impl PidLocator for SysinfoPidLocator {
    fn find(&self, pattern: &str) -> Result<Vec<Pid>, DiscoveryError> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        if sys.processes().is_empty() {
            return Err(DiscoveryError::Unavailable(
                "process table is empty or unreadable".to_string(),
            ));
        }

        let own_pid = std::process::id();
        let mut matching = Vec::new();

        for (pid, process) in sys.processes() {
            // Linux lists every JVM thread as a task sharing the command line
            if pid.as_u32() == own_pid || process.thread_kind().is_some() {
                continue;
            }

            let process_cmd = process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            let process_name = process.name().to_string_lossy();

            if process_name.contains(pattern) || process_cmd.contains(pattern) {
                debug!("[{}] Matched PID {}: {}", pattern, pid, process_cmd);
                matching.push(pid.as_u32());
            }
        }

        matching.sort_unstable();

        let pids: Vec<Pid> = matching.into_iter().map(|p| Pid::new(p.to_string())).collect();
        for pid in &pids {
            info!("[{}] Found PID {}", pattern, pid);
        }

        Ok(pids)
    }
}
