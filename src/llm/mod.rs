//! Generation client for the local Ollama generation endpoint.

mod ollama;

pub use ollama::{GenerationOptions, OllamaClient};
