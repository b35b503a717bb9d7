//! LLM provider abstraction layer
//!
//! Provider-agnostic completion interface (OpenAI, Anthropic, Gemini) plus the
//! tiered gateway the pipeline calls through.

pub mod gateway;
pub mod provider;
pub mod providers;

pub use gateway::*;
pub use provider::*;
pub use providers::*;
