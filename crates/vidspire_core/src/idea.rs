//! Idea validation: request checks and the projection of the backend's
//! NDJSON progress stream onto a single view state.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const MISSING_FIELDS_MESSAGE: &str = "Please fill in all fields";
pub const STREAM_ENDED_MESSAGE: &str = "Validation stream ended without a result";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaRequest {
    pub idea: String,
    pub target_audience: String,
    pub goal: String,
}

impl IdeaRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        let missing = [&self.idea, &self.target_audience, &self.goal]
            .iter()
            .any(|field| field.trim().is_empty());
        if missing {
            Err(MISSING_FIELDS_MESSAGE)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
    Warning,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSignal {
    Started,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FinalPayload {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One line of the validation stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Log(LogLine),
    AgentStatus {
        agent: String,
        status: AgentSignal,
    },
    Progress {
        percentage: f64,
        #[serde(default)]
        message: Option<String>,
    },
    Final {
        data: FinalPayload,
    },
}

impl StreamMessage {
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentPhase {
    #[default]
    Idle,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentBoard {
    pub competition: AgentPhase,
    pub audience: AgentPhase,
    pub trend: AgentPhase,
    pub strategy: AgentPhase,
}

impl AgentBoard {
    fn slot(&mut self, agent: &str) -> Option<&mut AgentPhase> {
        match agent {
            "competition" => Some(&mut self.competition),
            "audience" => Some(&mut self.audience),
            "trend" => Some(&mut self.trend),
            "strategy" => Some(&mut self.strategy),
            _ => None,
        }
    }

    fn apply(&mut self, agent: &str, signal: AgentSignal) {
        let Some(slot) = self.slot(agent) else {
            return;
        };
        match signal {
            AgentSignal::Started => *slot = AgentPhase::Running,
            AgentSignal::Completed => *slot = AgentPhase::Completed,
            AgentSignal::Error => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum IdeaState {
    #[default]
    Idle,
    Processing {
        progress: f64,
        logs: Vec<LogLine>,
        agents: AgentBoard,
    },
    Completed {
        result: Box<ValidationResult>,
    },
    Failed {
        error: String,
        retryable: bool,
    },
}

impl IdeaState {
    pub fn start() -> Self {
        IdeaState::Processing {
            progress: 0.0,
            logs: Vec::new(),
            agents: AgentBoard::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IdeaState::Completed { .. } | IdeaState::Failed { .. })
    }

    /// Applies one stream message. Anything arriving outside `Processing` is
    /// ignored.
    pub fn apply(self, message: StreamMessage) -> Self {
        let (mut progress, mut logs, mut agents) = match self {
            IdeaState::Processing {
                progress,
                logs,
                agents,
            } => (progress, logs, agents),
            other => return other,
        };

        match message {
            StreamMessage::Log(line) => logs.push(line),
            StreamMessage::AgentStatus { agent, status } => agents.apply(&agent, status),
            StreamMessage::Progress { percentage, .. } => progress = percentage,
            StreamMessage::Final { data } => return finish(data),
        }

        IdeaState::Processing {
            progress,
            logs,
            agents,
        }
    }

    /// The response body ended. A stream that never produced `final` fails.
    pub fn stream_ended(self) -> Self {
        if let IdeaState::Processing { .. } = self {
            IdeaState::Failed {
                error: STREAM_ENDED_MESSAGE.to_string(),
                retryable: true,
            }
        } else {
            self
        }
    }
}

fn finish(payload: FinalPayload) -> IdeaState {
    let failed = |error: Option<String>| IdeaState::Failed {
        error: error.unwrap_or_else(|| "Validation failed".to_string()),
        retryable: true,
    };
    match payload.data {
        Some(data) if payload.success => match serde_json::from_value::<ValidationResult>(data) {
            Ok(result) => IdeaState::Completed {
                result: Box::new(result),
            },
            Err(err) => failed(Some(format!("Invalid validation result: {err}"))),
        },
        _ => failed(payload.error),
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub strategy_recommendations: StrategyRecommendations,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub angles: Vec<String>,
    /// Competition, audience and trend analyses, passed through as sent.
    #[serde(flatten)]
    pub analysis: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRecommendations {
    #[serde(default)]
    pub content_strategy: ContentStrategy,
    #[serde(default = "default_title_formulas")]
    pub title_formulas: Vec<String>,
    #[serde(default = "default_thumbnail_guidance")]
    pub thumbnail_guidance: String,
    #[serde(default = "default_series_potential")]
    pub series_potential: String,
}

impl Default for StrategyRecommendations {
    fn default() -> Self {
        Self {
            content_strategy: ContentStrategy::default(),
            title_formulas: default_title_formulas(),
            thumbnail_guidance: default_thumbnail_guidance(),
            series_potential: default_series_potential(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStrategy {
    #[serde(default = "default_video_length")]
    pub optimal_video_length: String,
    #[serde(default = "default_hook_strategy")]
    pub hook_strategy: String,
    #[serde(
        default = "default_content_structure",
        deserialize_with = "one_or_many"
    )]
    pub content_structure: Vec<String>,
    #[serde(default = "default_unique_angles")]
    pub unique_angles: Vec<String>,
}

impl Default for ContentStrategy {
    fn default() -> Self {
        Self {
            optimal_video_length: default_video_length(),
            hook_strategy: default_hook_strategy(),
            content_structure: default_content_structure(),
            unique_angles: default_unique_angles(),
        }
    }
}

fn default_video_length() -> String {
    "15-20 minutes".to_string()
}

fn default_hook_strategy() -> String {
    "Start with a compelling question".to_string()
}

fn default_content_structure() -> Vec<String> {
    vec![
        "Introduction".to_string(),
        "Main Content".to_string(),
        "Conclusion".to_string(),
    ]
}

fn default_unique_angles() -> Vec<String> {
    vec!["Focus on practical applications".to_string()]
}

fn default_title_formulas() -> Vec<String> {
    vec![
        "How to [Achieve Result] in [Timeframe]".to_string(),
        "The Ultimate Guide to [Topic]".to_string(),
    ]
}

fn default_thumbnail_guidance() -> String {
    "Use bold text, contrasting colors, and human faces".to_string()
}

fn default_series_potential() -> String {
    "High potential for a multi-part series".to_string()
}

/// The backend sends the content structure either as one string or a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items,
    })
}
