pub mod agent_core;
pub mod config;
pub mod inference;
pub mod mcp_client;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Return the platform-standard data directory for toolrelay.
///
/// - macOS: `~/Library/Application Support/toolrelay/`
/// - Windows: `{FOLDERID_RoamingAppData}\toolrelay\`
/// - Linux: `$XDG_DATA_HOME/toolrelay/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.toolrelay/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolrelay");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolrelay")
}

const LOG_FILE_NAME: &str = "toolrelay.log";
const DEFAULT_FILTER: &str = "toolrelay=info,warn";
const KEPT_SESSIONS: u32 = 3;

/// Send logs for this REPL session to `toolrelay.log` in [`data_dir`],
/// rotating out older sessions first. Returns the log file path.
pub fn init_tracing() -> io::Result<PathBuf> {
    use tracing_subscriber::fmt;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_log_file(&log_path, KEPT_SESSIONS);

    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)?;

    fmt::fmt()
        .with_env_filter(env_filter())
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "toolrelay session started"
    );

    Ok(log_path)
}

/// Log to stderr instead of a file. `json` switches to one JSON object per line.
pub fn init_stderr_tracing(json: bool) {
    use tracing_subscriber::fmt;

    let builder = fmt::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

/// Each REPL session starts a fresh `toolrelay.log`; the previous `keep`
/// sessions survive as `toolrelay.log.1` (newest) through `.{keep}`.
fn rotate_log_file(log_path: &Path, keep: u32) {
    let session = |n: u32| PathBuf::from(format!("{}.{n}", log_path.display()));

    let _ = std::fs::remove_file(session(keep));
    for n in (1..keep).rev() {
        let _ = std::fs::rename(session(n), session(n + 1));
    }
    if log_path.exists() {
        let _ = std::fs::rename(log_path, session(1));
    }
}

/// Log sink shared by every span of a turn. Lines hit the file as they are
/// written, so `tail -f` shows dispatch and follow-up progress while the
/// REPL waits on a slow model or tool.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<File>>,
}

impl FlushingWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    fn file(&self) -> io::Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file()?;
        let written = file.write(buf)?;
        file.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
