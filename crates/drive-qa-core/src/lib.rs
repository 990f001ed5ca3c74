//! # Drive QA Core
//!
//! Runtime-agnostic logic for Drive QA: data models, the error taxonomy,
//! collaborator traits (document source, embedding, completion, tokenizer),
//! the in-memory document index, the retriever, and the answer engine.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Concrete
//! providers (OpenAI, Ollama, Google Drive) live in the `drive-qa` app crate
//! and are injected through the traits defined here.
//!
//! ```text
//! DocumentSource ──▶ DocumentIndex ──▶ Retriever ──▶ AnswerEngine
//!                        ▲                 ▲              │
//!                 EmbeddingProvider ───────┘      CompletionProvider
//! ```

pub mod answer;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod retriever;
pub mod service;
pub mod source;
pub mod tokenizer;

pub use error::{QaError, Result};
