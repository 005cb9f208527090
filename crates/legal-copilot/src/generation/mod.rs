//! Text generation: Ollama client, prompt templates, and reply parsing

pub mod ollama;
pub mod parse;
pub mod prompt;

pub use ollama::OllamaClient;
pub use parse::{extract_json, parse_agent_json};
pub use prompt::PromptBuilder;
