use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log file name inside the log directory
pub const LOG_FILE: &str = "uqcase.log";

/// Maximum log file size before rotation (5 MB)
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;
/// Size to keep after rotation (1 MB of most recent logs)
const KEEP_SIZE: u64 = 1024 * 1024;

/// Trim the log file to its newest KEEP_SIZE bytes once it exceeds MAX_LOG_SIZE.
fn rotate_log_if_needed(log_path: &Path) -> io::Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let metadata = fs::metadata(log_path)?;
    if metadata.len() <= MAX_LOG_SIZE {
        return Ok(());
    }

    let mut file = File::open(log_path)?;
    let start_pos = metadata.len().saturating_sub(KEEP_SIZE);
    file.seek(SeekFrom::Start(start_pos))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    drop(file);

    // Skip to the first newline to avoid partial lines
    let skip = buffer
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut file = File::create(log_path)?;
    file.write_all(b"--- Log rotated (older entries removed) ---\n")?;
    file.write_all(&buffer[skip..])?;

    Ok(())
}

/// Produces writers for the shared log file
#[derive(Clone)]
struct LogWriterFactory {
    file: Arc<Mutex<File>>,
}

impl LogWriterFactory {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

struct LogWriter {
    file: Arc<Mutex<File>>,
}

impl LogWriter {
    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        f(&mut file)
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            file: self.file.clone(),
        }
    }
}

/// Default filter directive for both crates at `level`
pub fn default_filter(level: &str) -> String {
    format!("uqcase={level},uqcase_core={level}")
}

/// Initialize logging to stderr and to `{log_dir}/uqcase.log`.
///
/// The file is rotated before opening: past 5MB only the newest 1MB is kept.
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(log_dir: &Path, level: &str) -> color_eyre::Result<()> {
    fs::create_dir_all(log_dir)?;

    let log_path = log_dir.join(LOG_FILE);
    if let Err(e) = rotate_log_if_needed(&log_path) {
        eprintln!("Warning: Failed to rotate log file: {}", e);
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let writer_factory = LogWriterFactory::new(file);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(writer_factory)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .init();

    tracing::info!(log_path = %log_path.display(), "uqcase logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_small_log_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        fs::write(&path, "line 1\nline 2\n").unwrap();

        rotate_log_if_needed(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "line 1\nline 2\n");
    }

    #[test]
    fn test_rotation_keeps_newest_whole_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let line = "x".repeat(99) + "\n";
        let lines = (MAX_LOG_SIZE / 100 + 10) as usize;
        let mut content = line.repeat(lines);
        content.push_str("newest\n");
        fs::write(&path, &content).unwrap();

        rotate_log_if_needed(&path).unwrap();

        let rotated = fs::read_to_string(&path).unwrap();
        assert!(rotated.starts_with("--- Log rotated"));
        assert!(rotated.ends_with("newest\n"));
        assert!(rotated.len() as u64 <= KEEP_SIZE + 64);
        // every kept line is complete
        assert!(rotated.lines().skip(1).all(|l| l.len() == 99 || l == "newest"));
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("debug"), "uqcase=debug,uqcase_core=debug");
    }
}
