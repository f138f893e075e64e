use crate::constants::{
    ANALYSIS_MAX_TOKENS, ANALYSIS_SYSTEM_PROMPT, ANALYSIS_TEMPERATURE, CHAT_MODEL, COMMON_TRIGGERS,
    EXTRACTION_MAX_TOKENS, EXTRACTION_SYSTEM_PROMPT, EXTRACTION_TEMPERATURE,
};
use crate::json_repair::{parse_model_json, strip_nulls};
use crate::models::{CrashAnalysis, CrashPatterns, CrashReport, CrashTrends, StructuredCrashReport};
use crate::openai::OpenAiClient;
use crate::specs::openai::{ChatCompletionRequest, ResponseFormat};
use crate::types::{ChatMessage, CrashlogError, Result, Role};
use serde_json::Value;

const EXTRACTION_SCHEMA: &str = r#"{
  "isCrashReport": boolean (true only if the user is describing a PEM crash they experienced),
  "severity": number (1-10),
  "triggers": [{"type": "physical|cognitive|emotional|environmental|other", "description": "string", "intensity": number, "timing": "string"}],
  "symptoms": [{"name": "string", "severity": number, "duration": "string", "onset": "string"}],
  "timeline": {"onset": "string", "duration": "string", "recoveryTime": "string"},
  "activities": [{"activity": "string", "timing": "string", "intensity": number}],
  "recoveryStrategies": [{"strategy": "string", "effectiveness": number, "notes": "string"}],
  "environmentalFactors": [{"factor": "string", "value": "string", "impact": "positive|negative|neutral"}],
  "aiSummary": "string - a formatted summary of the crash report"
}"#;

const SEVERITY_GUIDANCE: &str = r#"IMPORTANT: Pay special attention to implied severity indicators:
- Very brief responses often indicate severe cognitive impairment (severity 7-10)
- Phrases like "can't think," "too tired," "bad crash" suggest high severity
- Inability to provide details may correlate with crash severity
- Communication struggles themselves are symptoms worth noting
- If someone can only manage short responses, infer higher severity

Only include information that was explicitly mentioned or can be reasonably inferred from the conversation context. Use null for missing values."#;

fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_extraction_prompt(messages: &[ChatMessage]) -> String {
    format!(
        "Analyze this conversation and extract a structured crash report. The conversation is \
         between a user and an AI assistant discussing a Long COVID crash.\n\n\
         CONVERSATION:\n{}\n\n\
         Extract the following information and return as JSON:\n{}\n\n{}\n",
        render_transcript(messages),
        EXTRACTION_SCHEMA,
        SEVERITY_GUIDANCE
    )
}

/// Interprets the extractor's reply.
///
/// `Ok(None)` means there is nothing to persist: the model judged the
/// conversation not to be a crash, or it gave no usable severity.
pub fn parse_extraction(text: &str) -> Result<Option<StructuredCrashReport>> {
    let mut value = parse_model_json(text).map_err(CrashlogError::Extraction)?;
    if !value.is_object() {
        return Err(CrashlogError::Extraction("extractor reply is not a JSON object".into()).into());
    }
    strip_nulls(&mut value);

    let is_crash = match value.get("isCrashReport") {
        Some(Value::Bool(b)) => *b,
        // older prompts omit the flag; a severity alone still signals a report
        None => value.get("severity").is_some(),
        Some(other) => {
            return Err(CrashlogError::Extraction(format!(
                "isCrashReport has unexpected type: {}",
                other
            ))
            .into())
        }
    };
    if !is_crash {
        return Ok(None);
    }

    let severity = match value.get("severity").and_then(normalize_severity) {
        Some(s) => s,
        None => {
            tracing::debug!("Extractor flagged a crash but gave no usable severity");
            return Ok(None);
        }
    };

    if let Some(map) = value.as_object_mut() {
        map.remove("isCrashReport");
        map.insert("severity".to_string(), Value::from(severity));
    }

    let report: StructuredCrashReport = serde_json::from_value(value)?;
    Ok(Some(report))
}

/// Rounds and clamps a model-provided severity into `1..=10`.
pub fn normalize_severity(raw: &Value) -> Option<u8> {
    let n = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(1.0, 10.0) as u8)
}

/// Asks the model whether the conversation describes a crash and, if so, for its structure.
pub async fn extract_crash_report(
    client: &OpenAiClient,
    messages: &[ChatMessage],
) -> Result<Option<StructuredCrashReport>> {
    let request = ChatCompletionRequest {
        model: CHAT_MODEL.to_string(),
        messages: vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(build_extraction_prompt(messages)),
        ],
        max_tokens: Some(EXTRACTION_MAX_TOKENS),
        temperature: Some(EXTRACTION_TEMPERATURE),
        response_format: Some(ResponseFormat::JsonObject),
    };

    let completion = client.chat_completion(&request).await?;
    let text = match completion.first_content() {
        Some(t) => t,
        None => {
            tracing::debug!("Extractor returned an empty reply");
            return Ok(None);
        }
    };
    parse_extraction(text)
}

pub fn empty_analysis() -> CrashAnalysis {
    CrashAnalysis {
        patterns: CrashPatterns::default(),
        insights: vec!["No crash reports available for analysis yet.".to_string()],
        recommendations: vec!["Continue tracking crashes to build analysis patterns.".to_string()],
        risk_factors: Vec::new(),
        trends: CrashTrends::default(),
    }
}

/// Basic statistics shown when the model analysis is unavailable.
pub fn fallback_analysis(reports: &[CrashReport]) -> CrashAnalysis {
    let total = reports.len();
    if total == 0 {
        return empty_analysis();
    }
    let avg = reports.iter().map(|r| r.severity as f64).sum::<f64>() / total as f64;
    let plural = if total > 1 { "s" } else { "" };

    CrashAnalysis {
        patterns: CrashPatterns::default(),
        insights: vec![
            format!("You have {} crash report{} recorded.", total, plural),
            format!("Average severity: {:.1}/10", avg),
            "Detailed AI analysis temporarily unavailable - showing basic statistics.".to_string(),
        ],
        recommendations: vec![
            "Continue tracking crashes to identify patterns".to_string(),
            "Note specific triggers and their intensity".to_string(),
            "Track recovery strategies and their effectiveness".to_string(),
        ],
        risk_factors: Vec::new(),
        trends: CrashTrends::default(),
    }
}

fn to_json_text<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(s) => s,
        Err(_) => "null".to_string(),
    }
}

pub fn build_analysis_prompt(reports: &[CrashReport]) -> String {
    let mut listing = String::new();
    for (i, report) in reports.iter().enumerate() {
        listing.push_str(&format!(
            "\nReport {} ({}):\n- Severity: {}/10\n- Triggers: {}\n- Symptoms: {}\n- Timeline: {}\n\
             - Activities: {}\n- Recovery Strategies: {}\n- AI Summary: {}\n",
            i + 1,
            report.created_at,
            report.severity,
            to_json_text(&report.triggers.0),
            to_json_text(&report.symptoms.0),
            to_json_text(&report.timeline.0),
            to_json_text(&report.activities.0),
            to_json_text(&report.recovery_strategies.0),
            report.ai_summary.as_deref().unwrap_or_default(),
        ));
    }

    format!(
        r#"You are a Long COVID specialist analyzing crash report patterns. Analyze the following crash reports and provide insights:

CRASH REPORTS:
{listing}

Please analyze these reports and return a JSON object with the following structure:
{{
  "patterns": {{
    "commonTriggers": [{{"trigger": "string", "frequency": number, "avgSeverity": number}}],
    "symptomClusters": [{{"symptoms": ["string"], "frequency": number}}],
    "recoveryPatterns": [{{"strategy": "string", "effectiveness": number, "frequency": number}}]
  }},
  "insights": ["string"],
  "recommendations": ["string"],
  "riskFactors": [{{"factor": "string", "risk": "high|medium|low", "description": "string"}}],
  "trends": {{
    "severityTrend": "improving|stable|worsening",
    "frequencyTrend": "decreasing|stable|increasing",
    "recoveryTrend": "faster|stable|slower"
  }}
}}

Focus on:
1. Identifying patterns in triggers and their relationship to severity
2. Common symptom combinations
3. What recovery strategies are most effective
4. Risk factors that predict worse crashes
5. Trends over time (if multiple reports)
6. Actionable recommendations for prevention
7. Recognition that brief/minimal communication often indicates severe crashes
8. Understanding that the most severely affected patients may provide the least detailed reports

Be specific and evidence-based in your analysis, while being inclusive of all severity levels."#
    )
}

/// Pattern analysis over a user's reports. Falls back to basic statistics on any model failure.
pub async fn analyze_crash_reports(
    client: &OpenAiClient,
    reports: &[CrashReport],
) -> CrashAnalysis {
    if reports.is_empty() {
        return empty_analysis();
    }

    let request = ChatCompletionRequest {
        model: CHAT_MODEL.to_string(),
        messages: vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(build_analysis_prompt(reports)),
        ],
        max_tokens: Some(ANALYSIS_MAX_TOKENS),
        temperature: Some(ANALYSIS_TEMPERATURE),
        response_format: Some(ResponseFormat::JsonObject),
    };

    let completion = match client.chat_completion(&request).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Error analyzing crash reports: {}", e.inner);
            return fallback_analysis(reports);
        }
    };

    let text = match completion.first_content() {
        Some(t) => t,
        None => {
            tracing::error!("Error analyzing crash reports: no analysis generated");
            return fallback_analysis(reports);
        }
    };

    let parsed = parse_model_json(text).and_then(|mut v| {
        strip_nulls(&mut v);
        serde_json::from_value::<CrashAnalysis>(v).map_err(|e| e.to_string())
    });
    match parsed {
        Ok(analysis) => analysis,
        Err(e) => {
            tracing::error!("Error analyzing crash reports: {}", e);
            fallback_analysis(reports)
        }
    }
}

/// Trigger keywords mentioned by the user, deduplicated in first-seen order.
pub fn extract_triggers_from_conversation(messages: &[ChatMessage]) -> Vec<String> {
    let text = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let mut found: Vec<String> = Vec::new();
    for trigger in COMMON_TRIGGERS {
        if text.contains(trigger) && !found.iter().any(|t| t == trigger) {
            found.push(trigger.to_string());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Impact, TriggerKind};
    use serde_json::json;

    #[test]
    fn test_not_a_crash_yields_none() {
        match parse_extraction(r#"{"isCrashReport": false, "severity": null}"#) {
            Ok(None) => {}
            other => panic!("expected None, got {:?}", other.map_err(|e| e.to_string())),
        }
    }

    #[test]
    fn test_crash_with_fenced_json_and_nulls() {
        let text = "```json\n{\"isCrashReport\": true, \"severity\": 7.6, \"triggers\": \
                    [{\"type\": \"physical\", \"description\": \"walked to the shop\", \"intensity\": null}], \
                    \"timeline\": {\"onset\": \"next morning\", \"duration\": null}, \
                    \"aiSummary\": \"Crash after walking\"}\n```";
        let report = match parse_extraction(text) {
            Ok(Some(r)) => r,
            other => panic!("expected report, got {:?}", other.map_err(|e| e.to_string())),
        };
        assert_eq!(report.severity, 8);
        assert_eq!(report.triggers.len(), 1);
        assert!(report.triggers[0].intensity.is_none());
        assert_eq!(report.timeline.onset.as_deref(), Some("next morning"));
    }

    #[test]
    fn test_null_trigger_fields_keep_report() {
        let text = json!({
            "isCrashReport": true,
            "severity": 8,
            "triggers": [
                {"type": null, "description": "long walk"},
                {"type": "cognitive", "description": null}
            ],
            "symptoms": [{"name": null, "severity": 6}, "brain fog"],
            "aiSummary": "Crash after a long walk"
        })
        .to_string();
        let report = match parse_extraction(&text) {
            Ok(Some(r)) => r,
            other => panic!("expected report, got {:?}", other.map_err(|e| e.to_string())),
        };
        assert_eq!(report.severity, 8);
        assert_eq!(report.triggers.len(), 2);
        assert_eq!(report.triggers[0].kind, TriggerKind::Other);
        assert_eq!(report.triggers[0].description, "long walk");
        assert_eq!(report.triggers[1].kind, TriggerKind::Cognitive);
        assert_eq!(report.triggers[1].description, "");
        // the bare string is not a symptom object and is dropped on its own
        assert_eq!(report.symptoms.len(), 1);
        assert_eq!(report.symptoms[0].severity, Some(6.0));
    }

    #[test]
    fn test_unknown_impact_keeps_report() {
        let text = json!({
            "isCrashReport": true,
            "severity": 6,
            "environmentalFactors": [
                {"factor": "heat", "impact": "high"},
                {"factor": "noise", "impact": "Negative"}
            ]
        })
        .to_string();
        let report = match parse_extraction(&text) {
            Ok(Some(r)) => r,
            other => panic!("expected report, got {:?}", other.map_err(|e| e.to_string())),
        };
        assert_eq!(report.environmental_factors.len(), 2);
        assert_eq!(report.environmental_factors[0].factor, "heat");
        assert!(report.environmental_factors[0].impact.is_none());
        assert_eq!(report.environmental_factors[1].impact, Some(Impact::Negative));
    }

    #[test]
    fn test_missing_severity_is_incomplete() {
        match parse_extraction(r#"{"isCrashReport": true, "aiSummary": "x"}"#) {
            Ok(None) => {}
            other => panic!("expected None, got {:?}", other.map_err(|e| e.to_string())),
        }
    }

    #[test]
    fn test_garbage_is_extraction_error() {
        match parse_extraction("Sorry, I can't do that.") {
            Err(e) => assert!(matches!(e.inner, CrashlogError::Extraction(_))),
            Ok(r) => panic!("expected error, got {:?}", r),
        }
    }

    #[test]
    fn test_severity_clamped() {
        assert_eq!(normalize_severity(&json!(0)), Some(1));
        assert_eq!(normalize_severity(&json!(14)), Some(10));
        assert_eq!(normalize_severity(&json!("6")), Some(6));
        assert_eq!(normalize_severity(&json!("severe")), None);
    }

    #[test]
    fn test_triggers_from_user_messages_only() {
        let messages = vec![
            ChatMessage::assistant("Did the weather play a part?"),
            ChatMessage::user("I was at WORK all day, then walking home in the heat"),
            ChatMessage::user("work again tomorrow"),
        ];
        let triggers = extract_triggers_from_conversation(&messages);
        assert_eq!(triggers, vec!["walking", "work", "heat"]);
    }

    #[test]
    fn test_empty_analysis_text() {
        let a = empty_analysis();
        assert_eq!(a.insights, vec!["No crash reports available for analysis yet."]);
        assert!(a.risk_factors.is_empty());
    }
}
