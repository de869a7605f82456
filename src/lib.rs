//! # Codex7
//!
//! **A self-hostable documentation knowledge base for LLM clients.**
//!
//! Codex7 ingests source repositories and markdown corpora, chunks them into
//! semantically coherent snippets and whole documents, tags them with
//! topics, embeds them into a dense vector space, and serves them to LLM
//! clients over the Model Context Protocol (MCP). This crate is the
//! indexing-and-retrieval engine at the center of that system — the MCP
//! wire transport and tool-registration surface are out of scope and are
//! expected to sit in front of the five public async operations on
//! [`retrieval::RetrievalEngine`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌────────────────┐
//! │  Parser  │──▶│  Topics   │──▶│ Embedding │──▶│    Storage     │
//! │ (chunk)  │   │ Extractor │   │  Client   │   │ (relational +  │
//! └──────────┘   └───────────┘   └───────────┘   │    vector)     │
//!                                                  └───────┬────────┘
//!                                                           │
//!                                                  ┌────────▼────────┐
//!                                                  │ Retrieval Engine │
//!                                                  │ (5 query modes)  │
//!                                                  └──────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. [`parser`] walks a library's source tree applying the documented
//!    include/exclude rules and produces [`models::Document`]s.
//! 2. [`chunk`] splits each document into header-anchored [`models::Snippet`]s
//!    bounded by an approximate token budget, computing a deterministic
//!    quality score for each.
//! 3. [`topics`] tags each snippet with normalized topic strings, scanning
//!    headers first and falling back to a bounded LLM call only when the
//!    header scan yields nothing and a fallback is configured.
//! 4. [`embedding`] embeds each snippet's `title/description/content` into a
//!    1536-dimensional unit vector, batching and retrying against the
//!    configured upstream.
//! 5. [`indexing`] orchestrates steps 1-4 per library under a per-library
//!    lock ([`locks`]) and executes the index-replacement invariant against
//!    [`store`].
//! 6. [`retrieval`] answers the five query-time modes (library resolution,
//!    document-by-path, topic-filtered, semantic, hybrid) by blending
//!    vector similarity with stored quality score under a token budget.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | The four persisted entities plus the transient indexing job |
//! | [`chunk`] | Header-anchored markdown chunker and quality scoring |
//! | [`topics`] | Topic normalization, header scan, and LLM-fallback parsing |
//! | [`parser`] | Source-tree walk, file selection, `Document` extraction |
//! | [`embedding`] | The `EmbeddingClient` trait and its OpenAI-compatible adapter |
//! | [`store`] | `RelationalStore` / `VectorStore` traits plus SQLite and in-memory impls |
//! | [`indexing`] | The per-library indexing orchestrator |
//! | [`retrieval`] | The five retrieval modes and blended-score rendering |
//! | [`locks`] | Per-library indexing lock (`LibraryBusy` on contention) |
//! | [`errors`] | The shared `CoreError` taxonomy |
//! | [`db`] | SQLite connection pool setup |
//! | [`migrate`] | Idempotent schema bring-up |
//!
//! ## Configuration
//!
//! Codex7 is configured via a TOML file (default: `config/codex7.toml`).
//! See [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod errors;
pub mod indexing;
pub mod locks;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod retrieval;
pub mod store;
pub mod topics;
