//! Scripted stand-ins for the external tools, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::{CommandError, DiscoveryError};
use crate::models::Pid;
use crate::services::command_runner::{CommandRunner, CommandSpec, OutputLines};
use crate::services::pid_locator::PidLocator;

enum Script {
    Lines(Vec<String>),
    SpawnFailure,
}

/// Replays queued outputs in call order, then falls back to `default_lines`.
pub struct ScriptedRunner {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<(CommandSpec, String, Instant)>>,
    default_lines: Vec<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::with_default(Vec::new())
    }

    pub fn with_default(default_lines: Vec<String>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            default_lines,
        }
    }

    pub fn push_output(&self, lines: Vec<String>) {
        self.scripts.lock().unwrap().push_back(Script::Lines(lines));
    }

    pub fn push_spawn_failure(&self) {
        self.scripts.lock().unwrap().push_back(Script::SpawnFailure);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().iter().map(|(c, _, _)| c.clone()).collect()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, c, _)| c.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, _, t)| *t).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec, context: &str) -> Result<OutputLines, CommandError> {
        self.calls
            .lock()
            .unwrap()
            .push((command.clone(), context.to_string(), Instant::now()));

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::SpawnFailure) => Err(CommandError::Spawn {
                command: command.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            Some(Script::Lines(lines)) => Ok(lines_of(lines)),
            None => Ok(lines_of(self.default_lines.clone())),
        }
    }
}

fn lines_of(lines: Vec<String>) -> OutputLines {
    Box::new(lines.into_iter().map(Ok::<String, CommandError>))
}

/// Answers discovery from a fixed table; unknown patterns match nothing.
#[derive(Default)]
pub struct TableLocator {
    table: HashMap<String, Vec<Pid>>,
    failing: Vec<String>,
    panicking: Vec<String>,
}

impl TableLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pattern: &str, pids: &[&str]) -> Self {
        self.table
            .insert(pattern.to_string(), pids.iter().map(|p| Pid::from(*p)).collect());
        self
    }

    pub fn failing(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    pub fn panicking(mut self, pattern: &str) -> Self {
        self.panicking.push(pattern.to_string());
        self
    }
}

impl PidLocator for TableLocator {
    fn find(&self, pattern: &str) -> Result<Vec<Pid>, DiscoveryError> {
        if self.panicking.iter().any(|p| p == pattern) {
            panic!("scripted panic while discovering '{}'", pattern);
        }
        if self.failing.iter().any(|p| p == pattern) {
            return Err(DiscoveryError::Unavailable("scripted failure".to_string()));
        }
        Ok(self.table.get(pattern).cloned().unwrap_or_default())
    }
}
