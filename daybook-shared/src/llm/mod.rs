//! Language-model integration
//!
//! # Modules
//!
//! - [`client`]: the [`LlmClient`] trait and its OpenAI-compatible HTTP implementation
//! - [`assistant`]: image parsing and conversational scheduling on top of a client
//! - [`image`]: validation of inline base64 images
//! - [`prompts`]: system prompts
//! - [`reply`]: extraction of JSON from free-form model replies

pub mod assistant;
pub mod client;
pub mod image;
pub mod prompts;
pub mod reply;

pub use assistant::{Assistant, ChatTurn, ImageParseOutcome, ScheduleOutcome};
pub use client::{HttpLlmClient, LlmClient, LlmConfig, LlmError, LlmResult};
pub use image::ImagePayload;
