pub mod elevenlabs;
pub mod openai;
pub mod voiceflow;
