use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "paramsweep.log";

/// Size cap for the log file, applied once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogRotation {
    /// Trim once the file grows past this many bytes
    max_bytes: u64,
    /// Bytes of recent output kept after trimming
    keep_bytes: u64,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            keep_bytes: 1024 * 1024,
        }
    }
}

impl LogRotation {
    /// Cut `path` down to its most recent whole lines. Returns the number of
    /// bytes dropped, zero when the file is missing or small enough.
    fn apply(&self, path: &Path) -> io::Result<u64> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len <= self.max_bytes {
            return Ok(0);
        }

        let mut tail = Vec::new();
        file.seek(SeekFrom::Start(len.saturating_sub(self.keep_bytes)))?;
        file.read_to_end(&mut tail)?;
        drop(file);

        // First line of the tail is usually partial
        let start = tail.iter().position(|&b| b == b'\n').map_or(0, |i| i + 1);
        let kept = &tail[start..];
        let dropped = len - kept.len() as u64;

        let mut out = File::create(path)?;
        writeln!(out, "--- log trimmed, {dropped} older bytes removed ---")?;
        out.write_all(kept)?;
        Ok(dropped)
    }
}

fn open_log_file(dir: &Path) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE);
    if let Err(e) = LogRotation::default().apply(&path) {
        eprintln!("Warning: could not trim {}: {e}", path.display());
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Initialize logging.
///
/// Without `log_dir` events go to stderr. With it they are appended to
/// `{log_dir}/paramsweep.log`, which is trimmed to its last 1MB at startup
/// once it passes 5MB. `RUST_LOG` overrides `level`.
pub fn init_logging(log_dir: Option<&Path>, level: &str) -> color_eyre::Result<()> {
    let (writer, log_path) = match log_dir {
        Some(dir) => {
            let (file, path) = open_log_file(dir)?;
            // Workers log from their own threads; the mutex serializes lines
            (BoxMakeWriter::new(Mutex::new(file)), Some(path))
        }
        None => (BoxMakeWriter::new(io::stderr), None),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("paramsweep={level},paramsweep_core=warn")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(log_path.is_none())
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()?;

    match log_path {
        Some(path) => tracing::info!(log_path = %path.display(), "logging initialized"),
        None => tracing::debug!("logging to stderr"),
    }
    Ok(())
}
