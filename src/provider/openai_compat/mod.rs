//! OpenAI-compatible chat completions client.
//!
//! Works against `OpenAI`, Azure deployments and local servers (Ollama,
//! llama.cpp, vLLM) that expose `/chat/completions`.

mod client;
mod request;
mod response;

pub use client::OpenAICompatClient;
