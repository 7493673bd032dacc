//! LLM Client Layer - OpenAI-compatible chat completions with streaming tool calls
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction, plus a scripted mock
//! - OpenAiClient implementation over Server-Sent Events
//! - Streaming chunk decoding
//! - Tool call reassembly from fragments

pub mod accumulator;
pub mod client;
pub mod openai;
pub mod streaming;
pub mod types;

pub use accumulator::ToolCallAccumulator;
pub use client::{LlmClient, LlmError, MockLlmClient, ScriptedTurn};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use streaming::{ModelChunk, ModelStream, ToolCallFragment, parse_chunk};
pub use types::{ChatRequest, FunctionCall, Message, Role, ToolDefinition, ToolInvocation};
