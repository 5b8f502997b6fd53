pub mod gemini;
pub mod prompt;

pub use gemini::{LlmClient, LlmError};
pub use prompt::build_prompt;
