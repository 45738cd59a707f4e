use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::CommandError;

/// Program plus arguments, passed to the OS without a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Stdout lines of a running command, in arrival order.
///
/// The sequence ends when stdout closes and cannot be restarted.
pub type OutputLines = Box<dyn Iterator<Item = Result<String, CommandError>> + Send>;

pub trait CommandRunner: Send + Sync {
    /// Starts `command`. Its stderr lines are logged prefixed with `context`.
    fn run(&self, command: &CommandSpec, context: &str) -> Result<OutputLines, CommandError>;
}

/// Runs commands as child processes of this one
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CommandSpec, context: &str) -> Result<OutputLines, CommandError> {
        let label = command.to_string();
        debug!("Spawning `{}`", label);

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: label.clone(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::Spawn {
                command: label,
                source: io::Error::other("stdout was not captured"),
            });
        };

        // Drained on a side thread, logged only once stdout is exhausted
        let stderr = child.stderr.take().map(collect_stderr);

        Ok(Box::new(ProcessOutput {
            label,
            context: context.to_string(),
            child,
            stdout: BufReader::new(stdout),
            stderr,
            finished: false,
        }))
    }
}

fn collect_stderr(stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut lines = Vec::new();
        while let Ok(Some(line)) = read_line(&mut reader) {
            lines.push(line);
        }
        lines
    })
}

/// Reads one line without its terminator. Invalid UTF-8 is replaced rather
/// than failing the whole capture.
fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

struct ProcessOutput {
    label: String,
    context: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<Vec<String>>>,
    finished: bool,
}

impl ProcessOutput {
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(handle) = self.stderr.take() {
            match handle.join() {
                Ok(lines) => {
                    for line in lines {
                        warn!("{} stderr of `{}`: {}", self.context, self.label, line);
                    }
                }
                Err(_) => warn!("stderr reader of `{}` panicked", self.label),
            }
        }

        match self.child.wait() {
            Ok(status) => debug!("`{}` exited with {}", self.label, status),
            Err(e) => warn!("Failed to wait for `{}`: {}", self.label, e),
        }
    }
}

impl Iterator for ProcessOutput {
    type Item = Result<String, CommandError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match read_line(&mut self.stdout) {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(source) => {
                let _ = self.child.kill();
                self.finish();
                Some(Err(CommandError::Read {
                    command: self.label.clone(),
                    source,
                }))
            }
        }
    }
}

impl Drop for ProcessOutput {
    fn drop(&mut self) {
        // Consumer stopped early: nobody reads stdout any more
        if !self.finished {
            let _ = self.child.kill();
            self.finish();
        }
    }
}
