// ABOUTME: LLM module - chat client abstraction for the remote provider.
// ABOUTME: Defines types, the transport trait, and the OpenAI-compatible client.

mod client;
mod openai;
mod types;

pub use client::*;
pub use openai::*;
pub use types::*;

#[cfg(test)]
mod types_test;
