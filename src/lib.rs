//! Retrieval-augmented generation with tool calling.
//!
//! ragent embeds a knowledge base through a remote embedding service, ranks
//! stored chunks by cosine similarity, and hands the best matches to a
//! chat-completion model as context. While the model keeps requesting tools,
//! the agent dispatches them to external [MCP](https://modelcontextprotocol.io/)
//! servers and feeds the results back, until it produces a final answer.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`store::VectorStore`] | (vector, text) records, top-K cosine search |
//! | [`embedding::EmbeddingRetriever`] | remote embedding, resize + normalize, fallback vectors |
//! | [`tools::ToolClient`] | one MCP tool server: discover, call, close |
//! | [`model::ConversationalModel`] | message history and tool-call bookkeeping |
//! | [`agent::Agent`] | the retrieve → converse → call tools loop |
//!
//! # Architecture
//!
//! - **Storage**: in memory, or SQLite with
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) ranking
//! - **Embeddings**: any HTTP endpoint returning a vector; a failed call
//!   degrades to a random vector and says so
//! - **Model**: any OpenAI-compatible `/chat/completions` endpoint
//! - **Tools**: MCP over a child process's stdio or streamable HTTP
//!
//! The same knowledge base is also served as an MCP server (`ragent serve`).
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`error`]: the error taxonomy shared by every layer
//! - [`db`]: SQLite initialization, schema, and health checks
//! - [`knowledge`]: directory scanning, chunking, and ingestion

pub mod agent;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod model;
pub mod server;
pub mod store;
pub mod tools;
