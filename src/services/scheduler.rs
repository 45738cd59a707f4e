use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::{sleep, timeout_at, Instant};

use crate::error::CaptureError;
use crate::models::{
    PatternOutcome, PatternReport, Pid, PidReport, RunConfiguration, RunReport, SchedulerPolicy,
};
use crate::services::command_runner::{CommandRunner, CommandSpec};
use crate::services::dump_writer::{BeginCapture, DumpWriter};
use crate::services::pid_locator::PidLocator;

/// Per-PID results of one pattern, updated after every capture iteration so a
/// timed-out pattern can still report what it finished.
type Progress = Arc<Mutex<Vec<PidReport>>>;

fn snapshot(progress: &Mutex<Vec<PidReport>>) -> Vec<PidReport> {
    progress
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Drives discovery and paced captures for every configured pattern.
///
/// Each pattern gets its own blocking worker. Within a pattern, PIDs are
/// handled one after another and each PID's captures are strictly sequential,
/// separated by `dump_delay`. Nothing that goes wrong in one pattern task
/// reaches its siblings.
pub struct DumpScheduler {
    config: Arc<RunConfiguration>,
    policy: SchedulerPolicy,
    locator: Arc<dyn PidLocator>,
    runner: Arc<dyn CommandRunner>,
    writer: DumpWriter,
}

impl DumpScheduler {
    pub fn new(
        config: Arc<RunConfiguration>,
        policy: SchedulerPolicy,
        locator: Arc<dyn PidLocator>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let writer = DumpWriter::new(policy.file_template.clone());
        Self {
            config,
            policy,
            locator,
            runner,
            writer,
        }
    }

    pub fn with_writer(mut self, writer: DumpWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn tool_path(&self) -> PathBuf {
        self.config.tool_dir.join(&self.policy.tool_binary)
    }

    /// Runs every pattern task and waits for them up to `overall_timeout`.
    ///
    /// The report lists patterns in configuration order.
    pub async fn run(self: Arc<Self>) -> RunReport {
        info!("Thread dump tool: {}", self.tool_path().display());

        let deadline = Instant::now() + self.policy.overall_timeout;
        let workers = Arc::new(Semaphore::new(self.policy.max_workers.max(1)));
        let mut tasks = Vec::with_capacity(self.config.patterns.len());

        for (i, pattern) in self.config.patterns.iter().enumerate() {
            if i > 0 && !self.policy.launch_stagger.is_zero() {
                sleep(self.policy.launch_stagger).await;
            }

            let scheduler = Arc::clone(&self);
            let workers = Arc::clone(&workers);
            let task_pattern = pattern.clone();
            let progress: Progress = Arc::default();
            let task_progress = Arc::clone(&progress);

            let handle = tokio::spawn(async move {
                let permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return PatternOutcome::Failed {
                            error: format!("worker pool closed: {}", e),
                        }
                    }
                };

                let blocking_pattern = task_pattern.clone();
                let result = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    scheduler.run_pattern_tracked(&blocking_pattern, &task_progress)
                })
                .await;

                result.unwrap_or_else(|e| {
                    let error = describe_join_error(e);
                    error!("[{}] Pattern task aborted: {}", task_pattern, error);
                    PatternOutcome::Failed { error }
                })
            });

            tasks.push((pattern.clone(), handle, progress));
        }

        let mut report = RunReport::default();
        for (pattern, mut handle, progress) in tasks {
            let outcome = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    let error = describe_join_error(e);
                    error!("[{}] Pattern task aborted: {}", pattern, error);
                    PatternOutcome::Failed { error }
                }
                Err(_) => {
                    warn!(
                        "[{}] Still running after {:?}, giving up on it",
                        pattern, self.policy.overall_timeout
                    );
                    PatternOutcome::TimedOut {
                        pids: snapshot(&progress),
                    }
                }
            };
            report.patterns.push(PatternReport { pattern, outcome });
        }

        info!(
            "Done: {} thread dump file(s) written for {} pattern(s)",
            report.files_written(),
            report.patterns.len()
        );
        report
    }

    /// Discovery plus all captures for one pattern. Blocks the calling thread.
    pub fn run_pattern(&self, pattern: &str) -> PatternOutcome {
        self.run_pattern_tracked(pattern, &Mutex::default())
    }

    fn run_pattern_tracked(
        &self,
        pattern: &str,
        progress: &Mutex<Vec<PidReport>>,
    ) -> PatternOutcome {
        info!("[{}] Looking up PIDs...", pattern);

        let pids = match self.locator.find(pattern) {
            Ok(pids) => pids,
            Err(e) => {
                error!("[{}] PID discovery failed: {}", pattern, e);
                return PatternOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if pids.is_empty() {
            warn!(
                "[{}] No running process found, no thread dumps will be created for it",
                pattern
            );
            return PatternOutcome::NoProcessFound;
        }

        let listed: Vec<&str> = pids.iter().map(Pid::as_str).collect();
        info!("[{}] PIDs found: [{}]", pattern, listed.join(", "));

        for pid in pids {
            self.capture_pid(pattern, pid, progress);
        }

        PatternOutcome::Completed {
            pids: snapshot(progress),
        }
    }

    fn capture_pid(&self, pattern: &str, pid: Pid, progress: &Mutex<Vec<PidReport>>) {
        let count = self.policy.dump_count;
        let delay = self.policy.dump_delay;
        info!("[{}] Creating {} thread dumps for PID '{}'...", pattern, count, pid);

        let mut report = PidReport::new(pid);
        let slot = {
            let mut reports = progress.lock().unwrap_or_else(PoisonError::into_inner);
            reports.push(report.clone());
            reports.len() - 1
        };

        // Counted from 1 to match the file names
        for index in 1..=count {
            match self.capture_once(pattern, &report.pid, index) {
                Ok(Some(path)) => {
                    info!(
                        "[{}] Thread dump {} of {} for PID '{}' written: {}",
                        pattern,
                        index,
                        count,
                        report.pid,
                        path.display()
                    );
                    report.written.push(path);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    error!(
                        "[{}] Thread dump {} of {} for PID '{}' failed: {}",
                        pattern, index, count, report.pid, e
                    );
                    report.failed += 1;
                }
            }
            progress.lock().unwrap_or_else(PoisonError::into_inner)[slot] = report.clone();

            if index < count && !delay.is_zero() {
                info!("[{}] Next thread dump in {:?}", pattern, delay);
                thread::sleep(delay);
            }
        }

        info!(
            "[{}] PID '{}' finished after {} attempts: {} written, {} skipped, {} failed",
            pattern,
            report.pid,
            report.attempts(),
            report.written.len(),
            report.skipped,
            report.failed
        );
    }

    /// One tool invocation streamed into one file. `Ok(None)` means skipped.
    fn capture_once(
        &self,
        pattern: &str,
        pid: &Pid,
        index: u32,
    ) -> Result<Option<PathBuf>, CaptureError> {
        let command = self.capture_command(pid);
        let context = format!("[{}] PID '{}' dump {}", pattern, pid, index);
        let lines = self.runner.run(&command, &context)?;

        let mut dump = match self
            .writer
            .begin_capture(pid, index, &self.config.output_dir)?
        {
            BeginCapture::Ready(dump) => dump,
            BeginCapture::Skip { path } => {
                warn!(
                    "[{}] Thread dump {} for PID '{}' skipped, {} already exists",
                    pattern,
                    index,
                    pid,
                    path.display()
                );
                return Ok(None);
            }
        };

        for line in lines {
            let line = line.inspect_err(|_| {
                warn!(
                    "[{}] Capture {} for PID '{}' interrupted, partial dump kept at {}",
                    pattern,
                    index,
                    pid,
                    dump.path().display()
                );
            })?;
            dump.append_line(&line)?;
        }

        debug!(
            "[{}] {} lines captured into {}",
            pattern,
            dump.lines_written(),
            dump.path().display()
        );
        Ok(Some(dump.into_path()))
    }

    fn capture_command(&self, pid: &Pid) -> CommandSpec {
        CommandSpec::new(self.tool_path())
            .args(self.policy.tool_args.iter().cloned())
            .arg(pid.as_str())
    }
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        format!("panicked: {}", panic_message(error.into_panic()))
    } else {
        error.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
