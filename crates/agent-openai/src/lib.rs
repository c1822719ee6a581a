//! # agent-openai
//!
//! Completion provider for OpenAI-compatible chat endpoints.
//!
//! ```rust,ignore
//! use agent_openai::OpenAiProvider;
//!
//! let provider = OpenAiProvider::from_env()?;
//! let agent = AgentBuilder::new("assistant")
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

pub mod openai;

pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use agent_core::{Agent, AgentError, LlmProvider, Message, ModelConfig, Result, Role, Tool};
