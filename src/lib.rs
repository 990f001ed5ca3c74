//! # Drive QA
//!
//! Ask questions about your Google Docs. Drive QA indexes the documents in a
//! Google Drive account as embeddings, finds the ones relevant to a
//! question, and has a chat model answer from them. Questions with no
//! matching documents are answered from general knowledge.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Google Drive │──▶│ DocumentIndex │──▶│ AnswerEngine │
//! │  Docs API    │   │  (embeddings) │   │  (chat LLM)  │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │
//!                        ┌──────────────────────┤
//!                        ▼                      ▼
//!                   ┌──────────┐          ┌──────────┐
//!                   │   CLI    │          │ HTTP/MCP │
//!                   │  (dqa)   │          │  server  │
//!                   └──────────┘          └──────────┘
//! ```
//!
//! The index, retriever, and answer engine live in `drive-qa-core`. This
//! crate supplies the concrete providers and the outer surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! dqa reindex
//! dqa ask "What was Q3 revenue?"
//! dqa serve --reindex
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`drive`] | Google Drive / Docs document source |
//! | [`embedding`] | Embedding providers |
//! | [`completion`] | Chat completion providers |
//! | [`tokenizer`] | Tokenizer selection |
//! | [`intent`] | Query intent classification |
//! | [`traits`] | Tool trait and built-in tools |
//! | [`server`] | HTTP server |
//! | [`mcp`] | MCP protocol bridge |

pub mod completion;
pub mod config;
pub mod drive;
pub mod embedding;
pub mod intent;
pub mod mcp;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod tokenizer;
pub mod traits;
