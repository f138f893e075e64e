/// OpenAI endpoints and models
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const CHAT_MODEL: &str = "gpt-4o-mini";
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const TRANSCRIPTION_LANGUAGE: &str = "en";

/// Chat reply budget. Replies stay short for users with brain fog.
pub const CHAT_MAX_TOKENS: u32 = 300;
pub const CHAT_TEMPERATURE: f32 = 0.7;

pub const EXTRACTION_MAX_TOKENS: u32 = 1500;
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

pub const ANALYSIS_MAX_TOKENS: u32 = 2000;
pub const ANALYSIS_TEMPERATURE: f32 = 0.3;

/// Voiceflow runtime
pub const VOICEFLOW_DEFAULT_ENDPOINT: &str = "https://general-runtime.voiceflow.com";

/// ElevenLabs
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Whisper upload limit
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Session cookie holding the signed-in user's email
pub const SESSION_COOKIE: &str = "session_user";

/// Database defaults
pub const DB_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
    "PRAGMA foreign_keys = ON",
];

/// User-facing fallback strings
pub const REPLY_API_KEY_ERROR: &str =
    "API key error. Please check your OpenAI API key configuration.";
pub const REPLY_RATE_LIMITED: &str = "Rate limit exceeded. Please try again in a moment.";
pub const REPLY_BILLING_ERROR: &str = "Billing issue. Please check your OpenAI account billing.";
pub const REPLY_SERVICE_ERROR: &str =
    "I apologize, but I encountered an error connecting to the AI service. Please try again later.";
pub const REPLY_EMPTY_COMPLETION: &str =
    "I apologize, but I encountered an error. Please try again.";
pub const REPLY_VOICE_CHAT_ERROR: &str =
    "I apologize, but I'm having trouble processing that right now. Could you please try again?";
pub const REPLY_WEBHOOK_ERROR: &str = "I'm having trouble right now. Please try again.";
pub const VOICE_APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Opening line of a crash interview
pub const CRASH_INTERVIEW_OPENING: &str = "I understand you've experienced a crash. I'm here to help you understand what might have triggered it. Let's start simple - on a scale of 1 to 10, how severe was this crash for you?";

pub const LONG_COVID_SYSTEM_PROMPT: &str = r#"You are a compassionate AI assistant specializing in helping people with Long COVID manage Post-Exertional Malaise (PEM) crashes. Your primary goal is to help users avoid PEM crashes to accelerate their recovery.

Key Guidelines:
1. Keep interactions simple and low cognitive load - users may have brain fog
2. Focus on identifying crash severity, triggers, and patterns
3. Ask one question at a time
4. Be empathetic and understanding
5. Avoid giving medical advice - focus on pattern recognition and trigger identification
6. Prioritize rest and pacing strategies
7. Help users understand their personal triggers rather than prescribing activities
8. Be inclusive of severely ill patients who may only provide brief responses
9. Recognize that minimal communication often indicates high severity

When interviewing about a crash:
- Ask about severity (1-10 scale), but also infer severity from context
- Identify potential triggers (physical activity, mental exertion, stress, etc.)
- Understand the timeline (when did it start, how long did it last)
- Note symptoms experienced
- Ask about recovery time
- Pay attention to implied severity: brief responses, inability to elaborate, expressions of cognitive difficulty

Severity Indicators to Watch For:
- Very short responses may indicate severe cognitive impairment
- Phrases like "can't think," "too tired," "bad crash" suggest high severity
- Inability to provide details often correlates with crash severity
- Communication struggles themselves are symptoms worth noting

Remember: Your role is to help identify patterns and triggers, not to provide medical treatment. Every piece of information matters, especially from those who are most severely affected."#;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a medical data extraction specialist. Extract structured crash report data from conversations.";

pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a Long COVID specialist providing data-driven analysis of crash patterns.";

/// Trigger keywords scanned in user messages, in reporting order
pub const COMMON_TRIGGERS: &[&str] = &[
    "physical activity",
    "exercise",
    "walking",
    "stairs",
    "mental exertion",
    "work",
    "reading",
    "computer",
    "stress",
    "emotional stress",
    "anxiety",
    "social anxiety",
    "social activity",
    "socializing",
    "party",
    "travel",
    "driving",
    "shopping",
    "heat",
    "cold",
    "weather",
    "sleep",
    "poor sleep",
    "insomnia",
];
