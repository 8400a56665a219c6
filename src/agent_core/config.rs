//! Orchestrator configuration: loaded from `orchestrator.yaml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. String values may reference environment variables
//! as `${VAR}` or `${VAR:-default}`; a leading `~` in a default expands to the
//! home directory.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::errors::AgentError;
use super::question_router::{RoutingClassifier, RoutingTable, DEFAULT_INDEX_NAME};
use super::retry::RetryPolicy;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "orchestrator.yaml";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TOOLCALL_ORCHESTRATOR_CONFIG";

// ─── Types ───────────────────────────────────────────────────────────────────

/// How a batch of calls is issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One call at a time, in order.
    #[default]
    Sequential,
    /// All calls at once; outcomes still come back in submission order.
    Concurrent,
}

/// One narrower search in the codebase-analysis schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProbe {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
}

impl SearchProbe {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            top_k: default_top_k(),
            timeout_ms: default_search_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_top_k() -> u32 {
    5
}
fn default_search_timeout_ms() -> u64 {
    3_000
}

/// Probe schedule for answering a self-inspection question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodebaseAnalysisConfig {
    /// Server exposing the analysis and search tools.
    pub server: String,
    pub index_name: String,
    pub search_tool: String,
    /// Timeout for the routed broad-analysis probe.
    pub primary_timeout_ms: u64,
    /// Narrower probes run after the primary one, in order.
    pub search_probes: Vec<SearchProbe>,
}

impl Default for CodebaseAnalysisConfig {
    fn default() -> Self {
        Self {
            server: "leann".into(),
            index_name: DEFAULT_INDEX_NAME.into(),
            search_tool: "leann_search".into(),
            primary_timeout_ms: 8_000,
            search_probes: vec![
                SearchProbe::new("class definitions"),
                SearchProbe::new("API endpoints def "),
                SearchProbe::new("configuration setup"),
            ],
        }
    }
}

impl CodebaseAnalysisConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }
}

/// Optional routing overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Replaces the built-in table entirely when set.
    pub table: Option<RoutingTable>,
    /// Added to the built-in self-inspection cues.
    pub extra_cues: Vec<String>,
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub per_call_timeout_ms: u64,
    pub dispatch_mode: DispatchMode,
    pub retry: RetryPolicy,
    /// Servers whose calls go through the retry engine. Others get one attempt.
    pub retryable_servers: Vec<String>,
    pub codebase_analysis: CodebaseAnalysisConfig,
    pub routing: RoutingConfig,
    pub metrics_top_n: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            per_call_timeout_ms: 5_000,
            dispatch_mode: DispatchMode::Sequential,
            retry: RetryPolicy::default(),
            retryable_servers: ["browser", "news", "crawl4ai", "search", "enhanced-news"]
                .into_iter()
                .map(String::from)
                .collect(),
            codebase_analysis: CodebaseAnalysisConfig::default(),
            routing: RoutingConfig::default(),
            metrics_top_n: crate::agent_core::metrics::DEFAULT_TOP_N,
        }
    }
}

impl OrchestratorConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn is_retryable_server(&self, server: &str) -> bool {
        self.retryable_servers.iter().any(|s| s == server)
    }

    /// Routing classifier honouring the table override and extra cues.
    pub fn build_classifier(&self) -> Result<RoutingClassifier, AgentError> {
        // Rebuilt so hand-written triggers get the same normalization as input.
        let table = match &self.routing.table {
            Some(table) => RoutingTable::new(table.rules().to_vec())?,
            None => RoutingTable::default(),
        };
        Ok(
            RoutingClassifier::new(table, self.codebase_analysis.index_name.clone())?
                .with_extra_cues(&self.routing.extra_cues),
        )
    }

    /// Reject configurations the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.per_call_timeout_ms == 0 {
            return Err(config_error("per_call_timeout_ms must be greater than 0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(config_error("retry.max_delay_ms must be >= retry.base_delay_ms"));
        }
        if self.metrics_top_n == 0 {
            return Err(config_error("metrics_top_n must be greater than 0"));
        }

        let analysis = &self.codebase_analysis;
        if analysis.server.trim().is_empty() || analysis.search_tool.trim().is_empty() {
            return Err(config_error(
                "codebase_analysis.server and search_tool must not be empty",
            ));
        }
        if analysis.primary_timeout_ms == 0 {
            return Err(config_error(
                "codebase_analysis.primary_timeout_ms must be greater than 0",
            ));
        }
        if analysis.search_probes.is_empty() {
            return Err(config_error("codebase_analysis.search_probes must not be empty"));
        }

        // Each probe is narrower than the one before it, so it gets no more time.
        let mut previous = analysis.primary_timeout_ms;
        for (idx, probe) in analysis.search_probes.iter().enumerate() {
            if probe.query.trim().is_empty() || probe.top_k == 0 {
                return Err(config_error(&format!(
                    "search probe {idx} needs a query and top_k > 0"
                )));
            }
            if probe.timeout_ms == 0 || probe.timeout_ms > previous {
                return Err(config_error(&format!(
                    "search probe {idx} timeout {}ms must be in (0, {previous}]ms",
                    probe.timeout_ms
                )));
            }
            previous = probe.timeout_ms;
        }

        if let Some(table) = &self.routing.table {
            table.validate()?;
        }

        Ok(())
    }
}

fn config_error(reason: &str) -> AgentError {
    AgentError::ConfigError {
        reason: reason.to_string(),
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `orchestrator.yaml`.
///
/// `TOOLCALL_ORCHESTRATOR_CONFIG` wins when it names an existing file.
/// Otherwise searches `start` and each of its ancestors.
pub fn find_config_path(start: &Path) -> Result<PathBuf, AgentError> {
    search_config_path(start, std::env::var(CONFIG_PATH_ENV).ok())
}

fn search_config_path(start: &Path, explicit: Option<String>) -> Result<PathBuf, AgentError> {
    if let Some(explicit) = explicit.filter(|p| !p.trim().is_empty()) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.is_file() {
            return Ok(candidate);
        }
        tracing::warn!(
            path = %candidate.display(),
            "{CONFIG_PATH_ENV} does not point at a file, searching upward instead"
        );
    }

    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| AgentError::ConfigError {
            reason: format!("could not find {CONFIG_FILE_NAME} above {}", start.display()),
        })
}

/// Read, interpolate, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, AgentError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = parse_config(&raw)?;

    tracing::info!(
        path = %path.display(),
        dispatch_mode = ?config.dispatch_mode,
        per_call_timeout_ms = config.per_call_timeout_ms,
        retries = config.retry.retries,
        "loaded orchestrator config"
    );

    Ok(config)
}

/// Parse YAML text (after env interpolation) and validate it.
pub fn parse_config(raw: &str) -> Result<OrchestratorConfig, AgentError> {
    let interpolated = interpolate_env_vars(raw);

    // An empty document parses as YAML null, not as an empty mapping.
    let config: OrchestratorConfig = if interpolated.trim().is_empty() {
        OrchestratorConfig::default()
    } else {
        serde_yaml::from_str(&interpolated).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?
    };

    config.validate()?;
    Ok(config)
}

/// Load from the discovered config file, or fall back to defaults when none exists.
///
/// A file that exists but fails to parse or validate is an error.
pub fn load_or_default(start: &Path) -> Result<OrchestratorConfig, AgentError> {
    match find_config_path(start) {
        Ok(path) => load_config(&path),
        Err(_) => {
            tracing::info!(
                start = %start.display(),
                "no {CONFIG_FILE_NAME} found, using defaults"
            );
            Ok(OrchestratorConfig::default())
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("env ref pattern is valid")
});

/// Replace `${VAR}` and `${VAR:-default}`. Unset variables without a default become "".
fn interpolate_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            match (std::env::var(name), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => expand_tilde(default.as_str()),
                (Err(_), None) => String::new(),
            }
        })
        .into_owned()
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
