//! Datachat - a streaming data-analysis agent
//!
//! A model answers questions about a CSV dataset by writing small Python
//! snippets. Each snippet is statically validated, run in a restricted
//! interpreter, and the files it produces are moved into an object store.

pub mod agent;
pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod id;
pub mod llm;
pub mod ratelimit;
pub mod sandbox;
pub mod storage;

pub use error::{DataChatError, Result};
