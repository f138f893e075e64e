#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod auth;
pub mod chat;
pub mod config;
pub mod constants;
pub mod crash_reports;
pub mod db;
pub mod elevenlabs;
pub mod error_tracking;
pub mod extraction;
pub mod health;
pub mod json_repair;
pub mod logging;
pub mod main_helper;
pub mod models;
pub mod openai;
pub mod redaction;
pub mod relay;
pub mod responder;
pub mod specs;
pub mod str_utils;
pub mod transcription;
pub mod types;
pub mod voice;
pub mod voiceflow;

pub use types::*;

pub use main_helper::{AppState, Args};
