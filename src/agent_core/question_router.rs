//! Question routing: decides which capability should answer a free-text question.
//!
//! Two layers:
//! - [`classify_question`] sorts a user turn into time, news, self-inspection,
//!   or general. Time and news map straight to a single tool call.
//! - [`RoutingClassifier`] handles self-inspection questions. It walks an
//!   ordered [`RoutingTable`]; the first rule whose trigger phrase occurs in
//!   the normalized question wins. Unmatched questions fall back to
//!   `comprehensive_self_improvement_analysis` with the pleasantries stripped.
//!
//! Matching is plain case-insensitive substring search. It favours recall:
//! a false positive costs one extra analysis call.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inference::types::{ToolArgs, ToolCall};

use super::errors::AgentError;
use super::types::{AnalysisTool, RoutingDecision};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Index the analysis capabilities read from unless configured otherwise.
pub const DEFAULT_INDEX_NAME: &str = "agent-code";

/// Canonical question used when nothing survives pleasantry stripping.
const GENERIC_QUESTION: &str = "What should be improved in this codebase overall?";

/// Prefix that turns leftover user text into the fallback question.
const FALLBACK_QUESTION_PREFIX: &str = "Analyze this codebase to answer: ";

/// Cues that mark a question as being about the agent itself.
///
/// Substrings, so `capabilit` covers both singular and plural.
const SELF_INSPECTION_CUES: &[&str] = &[
    // codebase
    "codebase",
    "code base",
    "source code",
    "sourcecode",
    "implementation",
    "implemented",
    "code structure",
    "architecture",
    "modules",
    "functions",
    "classes",
    "how are you built",
    "how do you work",
    "what code",
    "your code",
    "internal code",
    "assess",
    "analyze",
    "review",
    "evaluate",
    "design pattern",
    "system design",
    "file structure",
    // inventory
    "plugin",
    "capabilit",
    "tool",
    "what can you",
    // health and improvement
    "health",
    "status",
    "diagnose",
    "diagnosis",
    "improve yourself",
    "self improvement",
    "self-improvement",
    "enhancement plan",
    "analysis",
    "improve your",
];

const TIME_KEYWORDS: &[&str] = &[
    "what time",
    "what's the time",
    "current time",
    "time is it",
    "tell me the time",
];

const NEWS_KEYWORDS: &[&str] = &[
    "latest news",
    "current news",
    "show me news",
    "tell me about current",
    "what's happening",
    "latest updates",
    "current situation",
    "breaking news",
    "what's new with",
    "recent developments on",
];

/// Checked in order; the first match is cut off.
const NEWS_TOPIC_PREFIXES: &[&str] = &[
    "show me the latest news about",
    "show me news about",
    "tell me about",
    "what's happening with",
    "what's new with",
    "latest updates on",
    "recent developments on",
    "current news about",
    "latest news about",
    "news about",
    "about",
    "on",
];

static PLEASANTRIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:hi|hello|hey|greetings|good\s+(?:morning|afternoon|evening)|please|kindly|thanks|thank\s+you|could\s+you|can\s+you)\b[,!.]?",
    )
    .expect("pleasantry pattern is valid")
});

// ─── Normalization ──────────────────────────────────────────────────────────

/// Lowercase and collapse runs of whitespace to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Strip greetings and politeness tokens, then tidy whitespace and punctuation.
fn strip_pleasantries(text: &str) -> String {
    let stripped = PLEASANTRIES.replace_all(text, " ");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == '.' || c == '!' || c.is_whitespace())
        .to_string()
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Fallback question for input no rule matched. Never the raw input.
pub fn canonicalize_question(text: &str) -> String {
    let core = strip_pleasantries(text);
    if core.is_empty() {
        return GENERIC_QUESTION.to_string();
    }
    format!("{FALLBACK_QUESTION_PREFIX}{}", capitalize_first(&core))
}

// ─── Routing Table ──────────────────────────────────────────────────────────

/// One routing entry: any trigger phrase selects `tool` with `question`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub triggers: Vec<String>,
    pub tool: AnalysisTool,
    pub question: String,
}

impl RouteRule {
    pub fn new(triggers: &[&str], tool: AnalysisTool, question: &str) -> Self {
        Self {
            triggers: triggers.iter().map(|t| normalize(t)).collect(),
            tool,
            question: question.to_string(),
        }
    }

    /// Whether any trigger occurs in already-normalized text.
    fn matches(&self, normalized: &str) -> bool {
        self.triggers
            .iter()
            .any(|t| !t.is_empty() && normalized.contains(t.as_str()))
    }
}

/// Ordered routing rules. Declaration order is precedence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    rules: Vec<RouteRule>,
}

impl Default for RoutingTable {
    /// Most specific intent first: an enhancement request also mentions
    /// health or architecture, and a health request may mention tools.
    fn default() -> Self {
        Self {
            rules: vec![
                RouteRule::new(
                    &[
                        "enhancement plan",
                        "generate_codebase_enhancement_plan",
                        "improve yourself",
                        "self improvement",
                        "self-improvement",
                        "improve your",
                        "improvement plan",
                    ],
                    AnalysisTool::GenerateCodebaseEnhancementPlan,
                    "What improvements should be made to this codebase?",
                ),
                RouteRule::new(
                    &[
                        "health check",
                        "system health",
                        "analyze your health",
                        "diagnose health",
                        "analyze_codebase_health",
                        "health",
                        "diagnose",
                    ],
                    AnalysisTool::AnalyzeCodebaseHealth,
                    "How healthy is this codebase?",
                ),
                RouteRule::new(
                    &[
                        "analyze your code",
                        "analyze_codebase_intelligence",
                        "architectural analysis",
                        "code intelligence",
                        "architecture",
                        "code structure",
                    ],
                    AnalysisTool::AnalyzeCodebaseIntelligence,
                    "What is the architecture of this codebase?",
                ),
                RouteRule::new(
                    &[
                        "what plugins",
                        "plugin list",
                        "plugins do you have",
                        "how many plugins",
                        "plugins are available",
                        "available plugins",
                        "list your plugins",
                        "show me your plugins",
                        "plugins you have",
                        "your plugins",
                        "plugin capabilities",
                        "plugin features",
                        "what tools do you have",
                        "what tools are available",
                        "available tools",
                        "tool capabilities",
                        "what capabilities",
                        "what can you do",
                        "what can you",
                    ],
                    AnalysisTool::AnalyzeCodebaseIntelligence,
                    "What plugins are available in this codebase?",
                ),
            ],
        }
    }
}

impl RoutingTable {
    /// Build and validate a table from explicit rules.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, AgentError> {
        let table = Self {
            rules: rules
                .into_iter()
                .map(|rule| RouteRule {
                    triggers: rule.triggers.iter().map(|t| normalize(t)).collect(),
                    ..rule
                })
                .collect(),
        };
        table.validate()?;
        Ok(table)
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Every rule needs a non-blank question and at least one non-blank trigger.
    pub fn validate(&self) -> Result<(), AgentError> {
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.question.trim().is_empty() {
                return Err(AgentError::RoutingTableInvalid {
                    reason: format!("rule {idx} ({}) has an empty question", rule.tool),
                });
            }
            if !rule.triggers.iter().any(|t| !t.trim().is_empty()) {
                return Err(AgentError::RoutingTableInvalid {
                    reason: format!("rule {idx} ({}) has no trigger phrases", rule.tool),
                });
            }
        }
        Ok(())
    }

    /// First rule matching already-normalized text.
    pub fn first_match(&self, normalized: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.matches(normalized))
    }

    fn triggers(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .flat_map(|rule| rule.triggers.iter().map(String::as_str))
    }
}

// ─── RoutingClassifier ──────────────────────────────────────────────────────

/// Detects self-inspection questions and picks one analysis capability.
#[derive(Debug, Clone)]
pub struct RoutingClassifier {
    table: RoutingTable,
    cues: Vec<String>,
    index_name: String,
}

impl Default for RoutingClassifier {
    fn default() -> Self {
        Self {
            table: RoutingTable::default(),
            cues: SELF_INSPECTION_CUES.iter().map(|c| c.to_string()).collect(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }
}

impl RoutingClassifier {
    /// Classifier over a custom table, with the built-in cue set.
    pub fn new(table: RoutingTable, index_name: impl Into<String>) -> Result<Self, AgentError> {
        table.validate()?;
        Ok(Self {
            table,
            index_name: index_name.into(),
            ..Self::default()
        })
    }

    /// Add cue phrases on top of the built-in set.
    pub fn with_extra_cues<I, S>(mut self, cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cues.extend(
            cues.into_iter()
                .map(|c| normalize(c.as_ref()))
                .filter(|c| !c.is_empty()),
        );
        self
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Is the question about the agent's own tools, plugins, or code?
    pub fn is_self_inspection_question(&self, text: &str) -> bool {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return false;
        }
        self.cues.iter().any(|cue| normalized.contains(cue.as_str()))
            || self
                .table
                .triggers()
                .any(|t| !t.is_empty() && normalized.contains(t))
    }

    /// Pick the capability and canonical question. Always produces a decision.
    pub fn route(&self, text: &str) -> RoutingDecision {
        let normalized = normalize(text);

        let (tool, question) = match self.table.first_match(&normalized) {
            Some(rule) => (rule.tool, rule.question.clone()),
            None => (
                AnalysisTool::ComprehensiveSelfImprovementAnalysis,
                canonicalize_question(text),
            ),
        };

        let fallback = tool == AnalysisTool::ComprehensiveSelfImprovementAnalysis;
        tracing::info!(
            tool = %tool,
            canonical_question = %question,
            fallback,
            "routed self-inspection question"
        );

        let mut args = Map::new();
        args.insert("index_name".into(), Value::String(self.index_name.clone()));
        args.insert("question".into(), Value::String(question.clone()));

        RoutingDecision {
            tool_name: tool,
            canonical_question: question,
            args,
        }
    }

    /// Sort a user turn into the kind of handling it needs.
    ///
    /// Time wins over self-inspection, which wins over news.
    pub fn classify_question(&self, text: &str) -> QuestionKind {
        if is_time_question(text) {
            QuestionKind::Time
        } else if self.is_self_inspection_question(text) {
            QuestionKind::SelfInspection
        } else if is_news_question(text) {
            QuestionKind::News {
                topic: extract_news_topic(text),
            }
        } else {
            QuestionKind::General
        }
    }
}

// ─── Direct Questions ───────────────────────────────────────────────────────

/// How a user turn should be handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Time,
    News { topic: String },
    SelfInspection,
    General,
}

/// Classify with the built-in routing table and cues.
pub fn classify_question(text: &str) -> QuestionKind {
    static DEFAULT: LazyLock<RoutingClassifier> = LazyLock::new(RoutingClassifier::default);
    DEFAULT.classify_question(text)
}

pub fn is_time_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    TIME_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn is_news_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    let has_keyword = NEWS_KEYWORDS.iter().any(|k| lower.contains(k));
    let has_pattern =
        (lower.contains("news") || lower.contains("latest")) && lower.contains("about");
    has_keyword || has_pattern
}

/// Pull the subject out of a news request.
///
/// `"show me news about rust 2024"` → `"rust 2024"`. Falls back to
/// `"general"` when nothing is left.
pub fn extract_news_topic(text: &str) -> String {
    let trimmed = text.trim();
    let mut topic = trimmed;

    for prefix in NEWS_TOPIC_PREFIXES {
        let Some(head) = trimmed.get(..prefix.len()) else {
            continue;
        };
        let at_word_end = trimmed[prefix.len()..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);
        if head.eq_ignore_ascii_case(prefix) && at_word_end {
            topic = trimmed[prefix.len()..].trim();
            break;
        }
    }

    let topic = topic.trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '?') || c.is_whitespace());
    if topic.is_empty() {
        "general".to_string()
    } else {
        topic.to_string()
    }
}

/// Tool call that answers a time or news question without the model.
pub fn direct_tool_call(kind: &QuestionKind) -> Option<ToolCall> {
    match kind {
        QuestionKind::Time => Some(ToolCall::new("time", "get_current_time", ToolArgs::new())),
        QuestionKind::News { topic } => {
            let mut args = ToolArgs::new();
            args.insert("topic".into(), Value::String(topic.clone()));
            Some(ToolCall::new("news", "fetch_news", args))
        }
        QuestionKind::SelfInspection | QuestionKind::General => None,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RoutingClassifier {
        RoutingClassifier::default()
    }

    #[test]
    fn test_plugin_question_routes_to_intelligence() {
        let c = classifier();
        let input = "what plugins do you have?";
        assert!(c.is_self_inspection_question(input));

        let decision = c.route(input);
        assert_eq!(decision.tool_name, AnalysisTool::AnalyzeCodebaseIntelligence);
        assert_eq!(
            decision.canonical_question,
            "What plugins are available in this codebase?"
        );
        assert_ne!(decision.canonical_question, input);
        assert_eq!(decision.args["index_name"], "agent-code");
        assert_eq!(decision.args["question"], decision.canonical_question.as_str());
    }

    #[test]
    fn test_weather_is_not_self_inspection() {
        assert!(!classifier().is_self_inspection_question("what's the weather?"));
    }

    #[test]
    fn test_empty_input_is_not_self_inspection() {
        assert!(!classifier().is_self_inspection_question("   "));
    }

    #[test]
    fn test_health_question() {
        let decision = classifier().route("Run a health check on yourself");
        assert_eq!(decision.tool_name, AnalysisTool::AnalyzeCodebaseHealth);
    }

    #[test]
    fn test_enhancement_beats_health() {
        let decision = classifier().route("Generate an enhancement plan to improve your health");
        assert_eq!(decision.tool_name, AnalysisTool::GenerateCodebaseEnhancementPlan);
    }

    #[test]
    fn test_health_beats_plugin_inventory() {
        let decision = classifier().route("What is the health of your plugins?");
        assert_eq!(decision.tool_name, AnalysisTool::AnalyzeCodebaseHealth);
    }

    #[test]
    fn test_architecture_question() {
        let decision = classifier().route("Describe   your ARCHITECTURE");
        assert_eq!(decision.tool_name, AnalysisTool::AnalyzeCodebaseIntelligence);
        assert_eq!(
            decision.canonical_question,
            "What is the architecture of this codebase?"
        );
    }

    #[test]
    fn test_fallback_strips_pleasantries() {
        let input = "Hello, please assess your codebase, thanks!";
        let c = classifier();
        assert!(c.is_self_inspection_question(input));

        let decision = c.route(input);
        assert_eq!(
            decision.tool_name,
            AnalysisTool::ComprehensiveSelfImprovementAnalysis
        );
        assert_eq!(
            decision.canonical_question,
            "Analyze this codebase to answer: Assess your codebase"
        );
    }

    #[test]
    fn test_fallback_never_verbatim() {
        let input = "review the classes";
        let decision = classifier().route(input);
        assert_eq!(
            decision.tool_name,
            AnalysisTool::ComprehensiveSelfImprovementAnalysis
        );
        assert_ne!(decision.canonical_question, input);
        assert!(!decision.canonical_question.is_empty());
    }

    #[test]
    fn test_fallback_only_pleasantries_uses_generic_question() {
        assert_eq!(canonicalize_question("hi, thanks!"), GENERIC_QUESTION);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  What\tPLUGINS \n do   you have "), "what plugins do you have");
    }

    #[test]
    fn test_custom_table_order_wins() {
        let table = RoutingTable::new(vec![
            RouteRule::new(&["Plugins"], AnalysisTool::AnalyzeCodebaseHealth, "Are plugins healthy?"),
            RouteRule::new(&["plugins"], AnalysisTool::AnalyzeCodebaseIntelligence, "Which plugins?"),
        ])
        .unwrap();
        let c = RoutingClassifier::new(table, "other-index").unwrap();
        let decision = c.route("list plugins");
        assert_eq!(decision.tool_name, AnalysisTool::AnalyzeCodebaseHealth);
        assert_eq!(decision.args["index_name"], "other-index");
    }

    #[test]
    fn test_trigger_counts_as_cue() {
        let table = RoutingTable::new(vec![RouteRule::new(
            &["widget inventory"],
            AnalysisTool::AnalyzeCodebaseIntelligence,
            "Which widgets exist?",
        )])
        .unwrap();
        let c = RoutingClassifier::new(table, DEFAULT_INDEX_NAME).unwrap();
        assert!(c.is_self_inspection_question("Show the widget inventory"));
    }

    #[test]
    fn test_extra_cues() {
        let c = classifier().with_extra_cues(["Memory Layout"]);
        assert!(c.is_self_inspection_question("explain your memory layout"));
    }

    #[test]
    fn test_invalid_table_rejected() {
        let err = RoutingTable::new(vec![RouteRule::new(
            &["  "],
            AnalysisTool::AnalyzeCodebaseHealth,
            "q",
        )]);
        assert!(matches!(err, Err(AgentError::RoutingTableInvalid { .. })));

        let err = RoutingTable::new(vec![RouteRule::new(
            &["health"],
            AnalysisTool::AnalyzeCodebaseHealth,
            "",
        )]);
        assert!(matches!(err, Err(AgentError::RoutingTableInvalid { .. })));
    }

    #[test]
    fn test_table_yaml_round_trip_keeps_order() {
        let yaml = serde_yaml::to_string(&RoutingTable::default()).unwrap();
        let parsed: RoutingTable = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, RoutingTable::default());
        assert_eq!(
            parsed.rules()[0].tool,
            AnalysisTool::GenerateCodebaseEnhancementPlan
        );
    }

    #[test]
    fn test_time_question() {
        assert!(is_time_question("What time is it in Tokyo?"));
        assert_eq!(classify_question("tell me the time"), QuestionKind::Time);
    }

    #[test]
    fn test_news_question() {
        assert!(is_news_question("Any breaking news today?"));
        assert!(is_news_question("what is the latest about the election"));
        assert_eq!(
            classify_question("show me news about the Mars rover."),
            QuestionKind::News {
                topic: "the Mars rover".into()
            }
        );
    }

    #[test]
    fn test_self_inspection_beats_news() {
        assert_eq!(
            classify_question("latest news about your plugins"),
            QuestionKind::SelfInspection
        );
    }

    #[test]
    fn test_general_question() {
        assert_eq!(classify_question("what's the weather?"), QuestionKind::General);
    }

    #[test]
    fn test_extract_news_topic_prefixes() {
        assert_eq!(
            extract_news_topic("What's happening with climate change?"),
            "climate change"
        );
        assert_eq!(
            extract_news_topic("latest updates on artificial intelligence"),
            "artificial intelligence"
        );
        assert_eq!(extract_news_topic("online safety"), "online safety");
        assert_eq!(extract_news_topic("news about"), "general");
        assert_eq!(extract_news_topic("   "), "general");
    }

    #[test]
    fn test_direct_tool_calls() {
        let time = direct_tool_call(&QuestionKind::Time).unwrap();
        assert_eq!(time.qualified_name(), "time.get_current_time");
        assert!(time.args.is_empty());

        let news = direct_tool_call(&QuestionKind::News {
            topic: "rust".into(),
        })
        .unwrap();
        assert_eq!(news.qualified_name(), "news.fetch_news");
        assert_eq!(news.args["topic"], "rust");

        assert!(direct_tool_call(&QuestionKind::General).is_none());
        assert!(direct_tool_call(&QuestionKind::SelfInspection).is_none());
    }
}
