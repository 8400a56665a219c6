//! ExecutionCoordinator: runs tool calls against capabilities.
//!
//! The coordinator is the bridge between parsed or routed tool calls and the
//! capability boundary. It handles:
//! - A per-call timeout around every dispatch
//! - Retry with exponential backoff for servers marked retryable
//! - Partial-failure aggregation into one ordered [`ExecutionReport`]
//! - Recording every outcome in the shared [`MetricsCollector`]
//! - The fixed probe schedule behind self-inspection questions
//!
//! No failure of a single call stops a batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::inference::tool_call_parser::extract_tool_calls;
use crate::inference::types::{ToolArgs, ToolCall};
use crate::mcp_client::{CapabilityExecutor, CapabilityResponse, McpError};

use super::config::{DispatchMode, OrchestratorConfig};
use super::errors::AgentError;
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::question_router::{direct_tool_call, QuestionKind, RoutingClassifier};
use super::retry::{retry, RetryError};
use super::types::{CallOutcome, ExecutionReport, RoutingDecision};

/// Error kind used when a capability answers with an error status.
const CAPABILITY_ERROR_KIND: &str = "CapabilityError";

/// One scheduled call with its own time budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub call: ToolCall,
    pub timeout: Duration,
}

impl Probe {
    pub fn new(call: ToolCall, timeout: Duration) -> Self {
        Self { call, timeout }
    }
}

/// Why a dispatch produced no usable response: `(kind, message)`.
type DispatchFailure = (&'static str, String);

// ─── ExecutionCoordinator ───────────────────────────────────────────────────

/// Sequences capability calls for one conversational turn.
pub struct ExecutionCoordinator {
    executor: Arc<dyn CapabilityExecutor>,
    metrics: Arc<MetricsCollector>,
    classifier: RoutingClassifier,
    config: OrchestratorConfig,
}

impl ExecutionCoordinator {
    /// Coordinator with the default configuration.
    pub fn new(executor: Arc<dyn CapabilityExecutor>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            executor,
            metrics,
            classifier: RoutingClassifier::default(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Coordinator with a validated configuration.
    pub fn with_config(
        executor: Arc<dyn CapabilityExecutor>,
        metrics: Arc<MetricsCollector>,
        config: OrchestratorConfig,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let classifier = config.build_classifier()?;
        Ok(Self {
            executor,
            metrics,
            classifier,
            config,
        })
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Metrics summary ranked with the configured `metrics_top_n`.
    pub fn metrics_summary(&self) -> MetricsSnapshot {
        self.metrics.summary_top(self.config.metrics_top_n)
    }

    pub fn classifier(&self) -> &RoutingClassifier {
        &self.classifier
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ─── Entry Points ───────────────────────────────────────────────────

    /// Run every call with the same timeout.
    pub async fn run_batch(&self, calls: &[ToolCall], per_call_timeout: Duration) -> ExecutionReport {
        let probes: Vec<Probe> = calls
            .iter()
            .cloned()
            .map(|call| Probe::new(call, per_call_timeout))
            .collect();
        self.run_probes(&probes).await
    }

    /// Extract tool calls from model output and run them with the configured timeout.
    ///
    /// Text without any tool call yields the synthetic "no information" report.
    pub async fn run_model_output(&self, text: &str) -> ExecutionReport {
        let calls = extract_tool_calls(text);
        tracing::debug!(call_count = calls.len(), "extracted tool calls from model output");
        self.run_batch(&calls, self.config.per_call_timeout()).await
    }

    /// Answer a self-inspection question with the codebase probe schedule.
    pub async fn run_codebase_analysis(&self, question: &str) -> ExecutionReport {
        let decision = self.classifier.route(question);
        let probes = self.codebase_probes(&decision);
        self.run_probes(&probes).await
    }

    /// Route a user question to the handling it needs.
    ///
    /// Returns `None` for general questions, which the model answers itself.
    pub async fn handle_question(&self, text: &str) -> Option<ExecutionReport> {
        let kind = self.classifier.classify_question(text);
        tracing::info!(kind = ?kind, "classified question");

        match kind {
            QuestionKind::SelfInspection => Some(self.run_codebase_analysis(text).await),
            QuestionKind::General => None,
            QuestionKind::Time | QuestionKind::News { .. } => {
                let call = direct_tool_call(&kind)?;
                Some(self.run_batch(&[call], self.config.per_call_timeout()).await)
            }
        }
    }

    /// Primary routed probe followed by the narrower search probes.
    pub fn codebase_probes(&self, decision: &RoutingDecision) -> Vec<Probe> {
        let analysis = &self.config.codebase_analysis;

        let mut probes = Vec::with_capacity(analysis.search_probes.len() + 1);
        probes.push(Probe::new(
            ToolCall::new(
                analysis.server.clone(),
                decision.tool_name.as_str(),
                decision.args.clone(),
            ),
            analysis.primary_timeout(),
        ));

        for search in &analysis.search_probes {
            let mut args = ToolArgs::new();
            args.insert("index_name".into(), analysis.index_name.clone().into());
            args.insert("query".into(), search.query.clone().into());
            args.insert("top_k".into(), search.top_k.into());
            probes.push(Probe::new(
                ToolCall::new(analysis.server.clone(), analysis.search_tool.clone(), args),
                search.timeout(),
            ));
        }

        probes
    }

    /// Run probes and assemble outcomes in submission order.
    pub async fn run_probes(&self, probes: &[Probe]) -> ExecutionReport {
        let batch_start = Instant::now();

        let outcomes = match self.config.dispatch_mode {
            DispatchMode::Sequential => {
                let mut outcomes = Vec::with_capacity(probes.len());
                for probe in probes {
                    outcomes.push(self.execute_one(&probe.call, probe.timeout).await);
                }
                outcomes
            }
            // join_all yields results in input order regardless of completion order.
            DispatchMode::Concurrent => {
                join_all(
                    probes
                        .iter()
                        .map(|probe| self.execute_one(&probe.call, probe.timeout)),
                )
                .await
            }
        };

        let report = ExecutionReport::finalize(outcomes);

        tracing::info!(
            submitted = probes.len(),
            succeeded = report.successes().count(),
            outcomes = report.len(),
            elapsed_ms = batch_start.elapsed().as_millis() as u64,
            "batch finished"
        );
        self.metrics.log_summary_top(self.config.metrics_top_n);

        report
    }

    // ─── Execution ──────────────────────────────────────────────────────

    /// Execute one call under `timeout` and record its outcome.
    pub async fn execute_one(&self, call: &ToolCall, timeout: Duration) -> CallOutcome {
        let capability = call.qualified_name();
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.dispatch(call)).await;
        let latency = start.elapsed().as_secs_f64();

        let outcome = match result {
            Err(_) => {
                tracing::warn!(
                    call_id = %call.id,
                    capability = %capability,
                    timeout_ms = timeout.as_millis() as u64,
                    "tool call timed out"
                );
                CallOutcome::timeout(capability, latency)
            }
            Ok(Ok(response)) if response.is_success() => {
                tracing::info!(
                    call_id = %call.id,
                    capability = %capability,
                    latency_ms = (latency * 1000.0) as u64,
                    "tool call succeeded"
                );
                CallOutcome::success(capability, latency, response.result_or_analysis)
            }
            Ok(Ok(response)) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "capability reported an error".to_string());
                tracing::warn!(
                    call_id = %call.id,
                    capability = %capability,
                    error = %message,
                    "capability returned an error"
                );
                CallOutcome::error(capability, latency, CAPABILITY_ERROR_KIND, message)
            }
            Ok(Err((kind, message))) => {
                tracing::warn!(
                    call_id = %call.id,
                    capability = %capability,
                    kind,
                    error = %message,
                    "tool call failed"
                );
                CallOutcome::error(capability, latency, kind, message)
            }
        };

        self.metrics.record(
            &outcome.capability,
            outcome.latency_seconds,
            outcome.is_success(),
        );

        outcome
    }

    /// Send a call through the boundary, retrying when its server allows it.
    async fn dispatch(&self, call: &ToolCall) -> Result<CapabilityResponse, DispatchFailure> {
        if !self.config.is_retryable_server(&call.server) {
            return self
                .executor
                .execute(&call.server, &call.tool_name, &call.args)
                .await
                .map_err(|e| (e.kind(), e.to_string()));
        }

        let executor = &self.executor;
        retry(
            move || executor.execute(&call.server, &call.tool_name, &call.args),
            &self.config.retry,
            McpError::is_retriable,
        )
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, source } => {
                let err = AgentError::RetryExhausted {
                    attempts,
                    reason: source.to_string(),
                };
                ("RetryExhausted", err.to_string())
            }
            RetryError::Permanent { source } => (source.kind(), source.to_string()),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::retry::RetryPolicy;
    use crate::agent_core::types::{AnalysisTool, CallStatus};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    enum Behaviour {
        Succeed(Value),
        SucceedAfter(Duration, Value),
        Hang,
        Reject(String),
        Fail(fn() -> McpError),
        /// Fails with a transport error this many times, then succeeds.
        Flaky(AtomicU32),
    }

    /// Executor that answers from a fixed script keyed by `server.tool`.
    #[derive(Default)]
    struct ScriptedExecutor {
        script: HashMap<String, Behaviour>,
        calls: Mutex<Vec<(String, ToolArgs)>>,
    }

    impl ScriptedExecutor {
        fn with(mut self, name: &str, behaviour: Behaviour) -> Self {
            self.script.insert(name.to_string(), behaviour);
            self
        }

        fn calls(&self) -> Vec<(String, ToolArgs)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CapabilityExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            server: &str,
            tool_name: &str,
            args: &ToolArgs,
        ) -> Result<CapabilityResponse, McpError> {
            let name = format!("{server}.{tool_name}");
            self.calls.lock().unwrap().push((name.clone(), args.clone()));

            match self.script.get(&name) {
                Some(Behaviour::Succeed(v)) => Ok(CapabilityResponse::success(v.clone())),
                Some(Behaviour::SucceedAfter(delay, v)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(CapabilityResponse::success(v.clone()))
                }
                Some(Behaviour::Hang) => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(CapabilityResponse::success(Value::Null))
                }
                Some(Behaviour::Reject(msg)) => Ok(CapabilityResponse::error(msg.clone())),
                Some(Behaviour::Fail(make)) => Err(make()),
                Some(Behaviour::Flaky(remaining)) => {
                    if remaining.load(Ordering::SeqCst) > 0 {
                        remaining.fetch_sub(1, Ordering::SeqCst);
                        Err(McpError::TransportError {
                            server: server.to_string(),
                            reason: "connection reset".into(),
                        })
                    } else {
                        Ok(CapabilityResponse::success(json!("recovered")))
                    }
                }
                None => Err(McpError::UnknownTool { name }),
            }
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy {
                retries: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_ms: 0,
            },
            ..OrchestratorConfig::default()
        }
    }

    fn coordinator(executor: ScriptedExecutor) -> (ExecutionCoordinator, Arc<ScriptedExecutor>) {
        let executor = Arc::new(executor);
        let coord = ExecutionCoordinator::with_config(
            executor.clone(),
            Arc::new(MetricsCollector::new()),
            fast_config(),
        )
        .unwrap();
        (coord, executor)
    }

    fn call(server: &str, tool: &str) -> ToolCall {
        ToolCall::new(server, tool, ToolArgs::new())
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let (coord, _) = coordinator(
            ScriptedExecutor::default()
                .with("slow.hang", Behaviour::Hang)
                .with("fast.ok", Behaviour::Succeed(json!({"answer": 42}))),
        );

        let report = coord
            .run_batch(&[call("slow", "hang"), call("fast", "ok")], Duration::from_millis(50))
            .await;

        let statuses: Vec<CallStatus> = report.outcomes().iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![CallStatus::Timeout, CallStatus::Success]);
        assert!(report.outcomes()[0].payload.is_none());
        assert_eq!(report.outcomes()[1].payload, Some(json!({"answer": 42})));

        let snapshot = coord.metrics().summary();
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.get("slow.hang").unwrap().error_count, 1);
        assert_eq!(snapshot.get("fast.ok").unwrap().error_count, 0);
    }

    #[tokio::test]
    async fn test_all_failing_appends_no_information() {
        let (coord, _) = coordinator(
            ScriptedExecutor::default().with("leann.broken", Behaviour::Reject("index missing".into())),
        );

        let report = coord
            .run_batch(
                &[call("leann", "broken"), call("ghost", "tool")],
                Duration::from_secs(1),
            )
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(
            report.outcomes()[0].payload,
            Some(json!("CapabilityError: index missing"))
        );
        assert_eq!(
            report.outcomes()[1].payload,
            Some(json!("UnknownTool: unknown tool: 'ghost.tool'"))
        );
        assert!(report.last().unwrap().is_no_information());
        // The synthetic marker is not a capability call.
        assert_eq!(coord.metrics().summary().total_calls, 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_never_empty_report() {
        let (coord, _) = coordinator(ScriptedExecutor::default());
        let report = coord.run_batch(&[], Duration::from_secs(1)).await;
        assert_eq!(report.len(), 1);
        assert!(report.last().unwrap().is_no_information());
    }

    #[tokio::test]
    async fn test_retryable_server_recovers() {
        let (coord, executor) = coordinator(
            ScriptedExecutor::default().with("browser.navigate", Behaviour::Flaky(AtomicU32::new(2))),
        );

        let report = coord
            .run_batch(&[call("browser", "navigate")], Duration::from_secs(2))
            .await;

        assert!(report.outcomes()[0].is_success());
        assert_eq!(executor.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retryable_server_exhausted() {
        let (coord, executor) = coordinator(ScriptedExecutor::default().with(
            "news.fetch_news",
            Behaviour::Fail(|| McpError::ServerCrashed {
                name: "news".into(),
                reason: "exit code 1".into(),
            }),
        ));

        let report = coord
            .run_batch(&[call("news", "fetch_news")], Duration::from_secs(2))
            .await;

        let payload = report.outcomes()[0].payload.clone().unwrap();
        assert!(payload.as_str().unwrap().starts_with("RetryExhausted: "));
        assert_eq!(executor.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_retryable_server_permanent_error_not_retried() {
        let (coord, executor) = coordinator(ScriptedExecutor::default().with(
            "search.web_search",
            Behaviour::Fail(|| McpError::InvalidArguments {
                tool: "search.web_search".into(),
                reason: "missing required field: 'q'".into(),
            }),
        ));

        let report = coord
            .run_batch(&[call("search", "web_search")], Duration::from_secs(1))
            .await;

        let payload = report.outcomes()[0].payload.clone().unwrap();
        assert!(payload.as_str().unwrap().starts_with("InvalidArguments: "));
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_server_single_attempt() {
        let (coord, executor) = coordinator(
            ScriptedExecutor::default().with("leann.leann_search", Behaviour::Flaky(AtomicU32::new(1))),
        );

        let report = coord
            .run_batch(&[call("leann", "leann_search")], Duration::from_secs(1))
            .await;

        assert_eq!(report.outcomes()[0].status, CallStatus::Error);
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_keeps_submission_order() {
        let executor = Arc::new(
            ScriptedExecutor::default()
                .with("a.slow", Behaviour::SucceedAfter(Duration::from_millis(80), json!("slow")))
                .with("b.fast", Behaviour::Succeed(json!("fast")))
                .with("c.hang", Behaviour::Hang),
        );
        let config = OrchestratorConfig {
            dispatch_mode: DispatchMode::Concurrent,
            ..fast_config()
        };
        let coord =
            ExecutionCoordinator::with_config(executor, Arc::new(MetricsCollector::new()), config)
                .unwrap();

        let started = Instant::now();
        let report = coord
            .run_batch(
                &[call("a", "slow"), call("b", "fast"), call("c", "hang")],
                Duration::from_millis(200),
            )
            .await;

        let names: Vec<&str> = report.outcomes().iter().map(|o| o.capability.as_str()).collect();
        assert_eq!(names, vec!["a.slow", "b.fast", "c.hang"]);
        assert_eq!(report.outcomes()[2].status, CallStatus::Timeout);
        // Calls overlapped: total time is bounded by the longest timeout, not the sum.
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_codebase_analysis_probe_schedule() {
        let (coord, executor) = coordinator(ScriptedExecutor::default().with(
            "leann.analyze_codebase_intelligence",
            Behaviour::Succeed(json!({"plugins": ["browser", "news"]})),
        ));

        let report = coord.run_codebase_analysis("what plugins do you have?").await;

        // Primary succeeds; the three search probes hit unknown tools.
        assert_eq!(report.len(), 4);
        assert!(report.outcomes()[0].is_success());

        let calls = executor.calls();
        let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "leann.analyze_codebase_intelligence",
                "leann.leann_search",
                "leann.leann_search",
                "leann.leann_search"
            ]
        );
        assert_eq!(calls[0].1["question"], "What plugins are available in this codebase?");
        assert_eq!(calls[1].1["query"], "class definitions");
        assert_eq!(calls[2].1["query"], "API endpoints def ");
        assert_eq!(calls[3].1["query"], "configuration setup");
        assert_eq!(calls[3].1["top_k"], 5);
        assert_eq!(calls[3].1["index_name"], "agent-code");
    }

    #[test]
    fn test_codebase_probe_timeouts_decrease() {
        let (coord, _) = coordinator(ScriptedExecutor::default());
        let decision = coord.classifier().route("how healthy are you?");
        assert_eq!(decision.tool_name, AnalysisTool::AnalyzeCodebaseHealth);

        let timeouts: Vec<Duration> = coord
            .codebase_probes(&decision)
            .iter()
            .map(|p| p.timeout)
            .collect();
        assert_eq!(
            timeouts,
            vec![
                Duration::from_secs(8),
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(3)
            ]
        );
    }

    #[tokio::test]
    async fn test_codebase_analysis_nothing_retrieved() {
        let (coord, _) = coordinator(ScriptedExecutor::default());
        let report = coord.run_codebase_analysis("assess your codebase").await;
        assert_eq!(report.len(), 5);
        assert!(report.last().unwrap().is_no_information());
    }

    #[tokio::test]
    async fn test_handle_time_question() {
        let (coord, executor) = coordinator(
            ScriptedExecutor::default().with("time.get_current_time", Behaviour::Succeed(json!("09:30"))),
        );
        let report = coord.handle_question("What time is it?").await.unwrap();
        assert!(report.outcomes()[0].is_success());
        assert_eq!(executor.calls()[0].0, "time.get_current_time");
    }

    #[tokio::test]
    async fn test_handle_news_question_passes_topic() {
        let (coord, executor) = coordinator(
            ScriptedExecutor::default().with("news.fetch_news", Behaviour::Succeed(json!([]))),
        );
        coord.handle_question("show me news about solar power").await.unwrap();
        assert_eq!(executor.calls()[0].1["topic"], "solar power");
    }

    #[tokio::test]
    async fn test_handle_general_question() {
        let (coord, executor) = coordinator(ScriptedExecutor::default());
        assert!(coord.handle_question("what's the weather?").await.is_none());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_model_output() {
        let (coord, executor) = coordinator(
            ScriptedExecutor::default().with("time.get_current_time", Behaviour::Succeed(json!("noon"))),
        );
        let text = r#"Let me check. TOOL_CALL: {"server": "time", "tool": "get_current_time", "args": {}}"#;
        let report = coord.run_model_output(text).await;
        assert_eq!(report.len(), 1);
        assert!(report.any_success());
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OrchestratorConfig {
            per_call_timeout_ms: 0,
            ..OrchestratorConfig::default()
        };
        let result = ExecutionCoordinator::with_config(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(MetricsCollector::new()),
            config,
        );
        assert!(matches!(result, Err(AgentError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_configured_top_n_limits_most_used() {
        let config = OrchestratorConfig {
            metrics_top_n: 1,
            ..fast_config()
        };
        let coord = ExecutionCoordinator::with_config(
            Arc::new(
                ScriptedExecutor::default()
                    .with("a.run", Behaviour::Succeed(json!(1)))
                    .with("b.run", Behaviour::Succeed(json!(2))),
            ),
            Arc::new(MetricsCollector::new()),
            config,
        )
        .unwrap();

        coord
            .run_batch(&[call("a", "run"), call("b", "run"), call("b", "run")], Duration::from_secs(1))
            .await;

        let snapshot = coord.metrics_summary();
        assert_eq!(snapshot.capabilities.len(), 2);
        assert_eq!(snapshot.most_used.len(), 1);
        assert_eq!(snapshot.most_used[0].capability, "b.run");
    }
}
