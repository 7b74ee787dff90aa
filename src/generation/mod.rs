//! Prompt composition and answer generation.

pub mod generator;
pub mod llm;
pub mod prompt;

pub use generator::AnswerGenerator;
pub use llm::{GenerationParams, LlmClient, ProviderResponse, WatsonxClient};
