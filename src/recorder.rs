use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{ControlError, ControlResult};
use crate::sequencer::InferenceRecord;

const MAX_NAME_ATTEMPTS: u32 = 100;

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::Plain(w) => w,
            Sink::Gzip(w) => w,
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gzip(w) => w.finish()?.flush(),
        }
    }
}

/// Appends one JSON line per inference to a session file.
///
/// Write errors are logged and counted; the control loop never sees them.
pub struct SessionRecorder {
    path: PathBuf,
    sink: Sink,
    records: u64,
    write_errors: u64,
}

impl SessionRecorder {
    /// Create `session_<UTC timestamp, ms>[_n].jsonl[.gz]` inside
    /// `output_dir`. Existing sessions are never overwritten.
    pub fn create(output_dir: &Path, compress: bool) -> ControlResult<Self> {
        fs::create_dir_all(output_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let ext = if compress { "jsonl.gz" } else { "jsonl" };

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("session_{}.{}", stamp, ext)
            } else {
                format!("session_{}_{}.{}", stamp, attempt, ext)
            };
            match Self::create_at(&output_dir.join(name), compress) {
                Err(ControlError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => continue,
                other => return other,
            }
        }
        Err(ControlError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free session name for {} in {}", stamp, output_dir.display()),
        )))
    }

    /// Create a new session file at `path`; fails if it already exists
    pub fn create_at(path: &Path, compress: bool) -> ControlResult<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let file = BufWriter::new(file);
        let sink = if compress {
            Sink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };
        log::info!("Recording session to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            sink,
            records: 0,
            write_errors: 0,
        })
    }

    pub fn record(&mut self, record: &InferenceRecord) {
        let result = serde_json::to_string(record)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(self.sink.writer(), "{}", line));
        match result {
            Ok(()) => self.records += 1,
            Err(e) => {
                self.write_errors += 1;
                if self.write_errors == 1 {
                    log::warn!("Session recording to {} failed: {}", self.path.display(), e);
                } else {
                    log::debug!("Session recording failure #{}: {}", self.write_errors, e);
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Flush (and close the gzip stream); returns the file path
    pub fn finish(self) -> ControlResult<PathBuf> {
        self.sink.finish()?;
        log::info!("Session saved: {} ({} records)", self.path.display(), self.records);
        Ok(self.path)
    }
}
