use serde::Serialize;
use std::path::PathBuf;

use crate::models::Pid;

/// Outcome of all capture iterations for one PID
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PidReport {
    pub pid: Pid,
    /// Files that received a complete capture
    pub written: Vec<PathBuf>,
    /// Iterations whose destination already existed
    pub skipped: u32,
    /// Iterations lost to a spawn, create or write failure
    pub failed: u32,
}

impl PidReport {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            written: Vec::new(),
            skipped: 0,
            failed: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.written.len() as u32 + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatternOutcome {
    Completed { pids: Vec<PidReport> },
    NoProcessFound,
    Failed { error: String },
    /// Still running at the deadline; `pids` holds the iterations finished so far
    TimedOut { pids: Vec<PidReport> },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatternReport {
    pub pattern: String,
    #[serde(flatten)]
    pub outcome: PatternOutcome,
}

impl PatternReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, PatternOutcome::Completed { .. })
    }

    pub fn files_written(&self) -> usize {
        match &self.outcome {
            PatternOutcome::Completed { pids } | PatternOutcome::TimedOut { pids } => {
                pids.iter().map(|p| p.written.len()).sum()
            }
            _ => 0,
        }
    }
}

/// Per-pattern results in configuration order
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunReport {
    pub patterns: Vec<PatternReport>,
}

impl RunReport {
    pub fn all_completed(&self) -> bool {
        self.patterns.iter().all(PatternReport::is_completed)
    }

    pub fn files_written(&self) -> usize {
        self.patterns.iter().map(PatternReport::files_written).sum()
    }

    #[cfg(test)]
    pub fn find(&self, pattern: &str) -> Option<&PatternReport> {
        self.patterns.iter().find(|p| p.pattern == pattern)
    }
}
