//! Tool-call interpretation and execution orchestration.
//!
//! Model text flows through [`inference::extract_tool_calls`] into
//! [`agent_core::ExecutionCoordinator`], which runs each call against a
//! [`mcp_client::CapabilityExecutor`] under timeout and retry discipline and
//! records the outcome in a shared [`agent_core::MetricsCollector`].
//! Questions about the agent itself take the
//! [`agent_core::RoutingClassifier`] path instead and skip the parser.

pub mod agent_core;
pub mod inference;
pub mod mcp_client;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use agent_core::{
    AgentError, CallOutcome, CallStatus, ExecutionCoordinator, ExecutionReport, MetricsCollector,
    MetricsSnapshot, OrchestratorConfig, RetryPolicy, RoutingClassifier, RoutingDecision,
};
pub use inference::{extract_tool_calls, InferenceError, ToolCall};
pub use mcp_client::{CapabilityExecutor, CapabilityRegistry, CapabilityResponse, McpError};

/// Log file name inside the log directory.
const LOG_FILE_NAME: &str = "orchestrator.log";

/// Rotated generations kept next to the live log.
const LOG_GENERATIONS: u32 = 3;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "toolcall_orchestrator=info,warn";

/// Return the platform-standard data directory for the orchestrator.
///
/// - macOS: `~/Library/Application Support/toolcall-orchestrator/`
/// - Windows: `{FOLDERID_RoamingAppData}\toolcall-orchestrator\`
/// - Linux: `$XDG_DATA_HOME/toolcall-orchestrator/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.toolcall-orchestrator/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolcall-orchestrator");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolcall-orchestrator")
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install a file-backed tracing subscriber.
///
/// 1. Rotates existing logs (orchestrator.log → .1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh orchestrator.log with a line-flushing writer.
/// 3. Logs a startup banner with the log path.
///
/// `log_dir` defaults to [`data_dir`]. Returns the log file path.
pub fn init_tracing(log_dir: Option<&Path>) -> io::Result<PathBuf> {
    use tracing_subscriber::fmt;

    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(data_dir);
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_log_file(&log_path, LOG_GENERATIONS);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    fmt::fmt()
        .with_env_filter(env_filter())
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== toolcall-orchestrator starting ==="
    );

    Ok(log_path)
}

/// Install a JSON-lines subscriber on stderr, for hosts that ship logs elsewhere.
pub fn init_tracing_json() -> io::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}

/// Rotate log files: `orchestrator.log` → `orchestrator.log.1` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let generation = |n: u32| PathBuf::from(format!("{}.{n}", base_path.display()));

    let _ = std::fs::remove_file(generation(keep));
    for i in (1..keep).rev() {
        let _ = std::fs::rename(generation(i), generation(i + 1));
    }
    if base_path.exists() {
        let _ = std::fs::rename(base_path, generation(1));
    }
}

/// Log sink shared by every subscriber thread.
///
/// Each record is pushed to the file before `write` returns, so the tail of
/// `orchestrator.log` is complete even if the host aborts mid-batch.
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

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        op(&mut file)
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| {
            let written = file.write(buf)?;
            file.flush()?;
            Ok(written)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
