mod client;
mod error;
mod failure;
mod ollama;
mod openai;
mod prompt;
mod response;

pub use client::*;
pub use error::*;
pub use ollama::Ollama;
pub use openai::OpenAICompat;
pub use prompt::*;
pub use response::parse_analysis;
