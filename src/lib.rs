pub mod agent_core;
pub mod banking;
pub mod inference;
pub mod tools;

use std::path::{Path, PathBuf};

/// Where `init_tracing` sends log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Rotated `agent.log` in the data directory.
    File,
    /// Standard error, for debugging a session live.
    Stderr,
}

/// Return the platform-standard data directory for finchat.
///
/// - macOS: `~/Library/Application Support/finchat/`
/// - Windows: `{FOLDERID_RoamingAppData}\finchat\`
/// - Linux: `$XDG_DATA_HOME/finchat/` (fallback `~/.local/share/finchat/`)
///
/// Falls back to `~/.finchat/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("finchat");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".finchat")
}

/// Initialize the tracing subscriber.
///
/// With [`LogOutput::File`]:
/// 1. Rotates existing logs (agent.log → agent.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh agent.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the log path for discoverability.
///
/// Returns the log file path when logging to a file.
pub fn init_tracing(output: LogOutput) -> std::io::Result<Option<PathBuf>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("finchat=info,warn"));

    if output == LogOutput::Stderr {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "=== finchat starting ===");
        return Ok(None);
    }

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("agent.log");

    // Rotate: agent.log.2 → .3, .1 → .2, agent.log → .1
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== finchat starting ==="
    );
    Ok(Some(log_path))
}

/// Rotate log files: `agent.log` → `agent.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Keeps each log line on disk immediately so a crash mid-exchange still
/// leaves the trail that led to it.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rotate_log_file_keeps_three() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("agent.log");

        for generation in 0..5 {
            rotate_log_file(&base, 3);
            std::fs::write(&base, format!("gen {generation}")).unwrap();
        }

        let read = |suffix: &str| std::fs::read_to_string(format!("{}{suffix}", base.display()));
        assert_eq!(read("").unwrap(), "gen 4");
        assert_eq!(read(".1").unwrap(), "gen 3");
        assert_eq!(read(".2").unwrap(), "gen 2");
        assert_eq!(read(".3").unwrap(), "gen 1");
        assert!(read(".4").is_err());
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        let file = std::fs::File::create(&path).unwrap();

        let mut writer = FlushingWriter::new(file);
        writer.write_all(b"line one\n").unwrap();
        let mut clone = writer.clone();
        clone.write_all(b"line two\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "line one\nline two\n"
        );
    }

    #[test]
    fn test_data_dir_is_named_for_app() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy();
        assert!(name == "finchat" || name == ".finchat");
    }
}
