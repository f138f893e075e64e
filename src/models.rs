use crate::types::ChatMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::types::Json;

/// Keeps the entries that parse and drops the rest, so one malformed item
/// from the extractor does not cost the whole report.
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => vec![other],
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Dropping malformed extractor entry: {}", e);
                None
            }
        })
        .collect())
}

fn lenient_impact<'de, D>(deserializer: D) -> Result<Option<Impact>, D::Error>
where
    D: Deserializer<'de>,
{
    let impact = match Value::deserialize(deserializer)? {
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "positive" => Some(Impact::Positive),
            "negative" => Some(Impact::Negative),
            "neutral" => Some(Impact::Neutral),
            _ => None,
        },
        _ => None,
    };
    Ok(impact)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Physical,
    Cognitive,
    Emotional,
    Environmental,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashTrigger {
    #[serde(rename = "type", default)]
    pub kind: TriggerKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashSymptom {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelinePhase {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashTimeline {
    #[serde(default)]
    pub onset: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub recovery_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<TimelinePhase>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashActivity {
    #[serde(default)]
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStrategy {
    #[serde(default)]
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentalFactor {
    #[serde(default)]
    pub factor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_impact",
        skip_serializing_if = "Option::is_none"
    )]
    pub impact: Option<Impact>,
}

/// The extractor's view of one crash, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredCrashReport {
    pub severity: u8,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub triggers: Vec<CrashTrigger>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub symptoms: Vec<CrashSymptom>,
    #[serde(default)]
    pub timeline: CrashTimeline,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub activities: Vec<CrashActivity>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub recovery_strategies: Vec<RecoveryStrategy>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub environmental_factors: Vec<EnvironmentalFactor>,
    #[serde(default)]
    pub ai_summary: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub id: String,
    pub user_id: String,
    pub severity: i64,
    pub triggers: Json<Vec<CrashTrigger>>,
    pub symptoms: Json<Vec<CrashSymptom>>,
    pub timeline: Json<CrashTimeline>,
    pub activities: Json<Vec<CrashActivity>>,
    pub recovery_strategies: Json<Vec<RecoveryStrategy>>,
    pub environmental_factors: Json<Vec<EnvironmentalFactor>>,
    pub conversation_id: Option<String>,
    pub ai_summary: Option<String>,
    pub raw_conversation: Json<Vec<ChatMessage>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub crash_report_id: Option<String>,
    pub messages: Json<Vec<ChatMessage>>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFrequency {
    pub trigger: String,
    pub frequency: u32,
    pub avg_severity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymptomCluster {
    pub symptoms: Vec<String>,
    pub frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryPattern {
    pub strategy: String,
    pub effectiveness: f64,
    pub frequency: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashPatterns {
    #[serde(default)]
    pub common_triggers: Vec<TriggerFrequency>,
    #[serde(default)]
    pub symptom_clusters: Vec<SymptomCluster>,
    #[serde(default)]
    pub recovery_patterns: Vec<RecoveryPattern>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFactor {
    pub factor: String,
    pub risk: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTrend {
    Improving,
    Stable,
    Worsening,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyTrend {
    Decreasing,
    Stable,
    Increasing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryTrend {
    Faster,
    Stable,
    Slower,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashTrends {
    pub severity_trend: SeverityTrend,
    pub frequency_trend: FrequencyTrend,
    pub recovery_trend: RecoveryTrend,
}

impl Default for CrashTrends {
    fn default() -> Self {
        Self {
            severity_trend: SeverityTrend::Stable,
            frequency_trend: FrequencyTrend::Stable,
            recovery_trend: RecoveryTrend::Stable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashAnalysis {
    #[serde(default)]
    pub patterns: CrashPatterns,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub trends: CrashTrends,
}
