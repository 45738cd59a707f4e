use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::error::DumpError;
use crate::models::Pid;

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Result of trying to open the destination of one capture
#[derive(Debug)]
pub enum BeginCapture {
    Ready(DumpFile),
    /// The destination already exists and is left untouched
    Skip { path: PathBuf },
}

/// Names and exclusively creates dump files
#[derive(Debug, Clone)]
pub struct DumpWriter {
    template: String,
    clock: fn() -> u128,
}

impl DumpWriter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            clock: epoch_millis,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> u128) -> Self {
        self.clock = clock;
        self
    }

    pub fn file_name(&self, pid: &Pid, millis: u128, index: u32) -> String {
        self.template
            .replace("{pid}", pid.as_str())
            .replace("{millis}", &millis.to_string())
            .replace("{index}", &index.to_string())
    }

    /// Creates the file for capture `index` of `pid`.
    ///
    /// Never overwrites: an existing path yields [`BeginCapture::Skip`].
    pub fn begin_capture(
        &self,
        pid: &Pid,
        index: u32,
        output_dir: &Path,
    ) -> Result<BeginCapture, DumpError> {
        let path = output_dir.join(self.file_name(pid, (self.clock)(), index));

        match OpenOptions::new().append(true).create_new(true).open(&path) {
            Ok(file) => {
                debug!("Created dump file {}", path.display());
                Ok(BeginCapture::Ready(DumpFile {
                    path,
                    file,
                    lines: 0,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(
                    "Dump file {} already exists, skipping capture {} for PID '{}'",
                    path.display(),
                    index,
                    pid
                );
                Ok(BeginCapture::Skip { path })
            }
            Err(source) => Err(DumpError::Create { path, source }),
        }
    }
}

/// An open, append-only dump file
#[derive(Debug)]
pub struct DumpFile {
    path: PathBuf,
    file: File,
    lines: usize,
}

impl DumpFile {
    /// Appends `line` plus a newline and pushes it to the OS right away, so an
    /// interrupted capture still leaves whole lines behind.
    pub fn append_line(&mut self, line: &str) -> Result<(), DumpError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        self.file
            .write_all(buf.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|source| DumpError::Write {
                path: self.path.clone(),
                source,
            })?;

        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}
