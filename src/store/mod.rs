//! Storage layer: a relational store (libraries, versions, documents,
//! snippets, indexing jobs) and a vector store (one point per snippet),
//! exposed as two small trait interfaces so the retrieval engine and the
//! indexing orchestrator can be tested against an in-memory fake (core
//! spec §9: remote/durable resources as interfaces).

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::errors::CoreResult;
use crate::models::{Document, IndexingJob, Library, Snippet, Version};

/// Filters applied (AND'd) to a vector or full-text search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub library_id: Option<String>,
    pub version_id: Option<String>,
    /// Non-empty intersection required when set (core spec §4.4).
    pub topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VectorSearchParams {
    pub embedding: Vec<f32>,
    pub k: i64,
    pub threshold: Option<f64>,
    pub filter: SearchFilter,
}

#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub snippet: Snippet,
    /// Cosine similarity clamped to `[0.0, 1.0]`.
    pub similarity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FullTextSearchOpts {
    pub query: String,
    pub version_id: Option<String>,
    pub code_only: bool,
    pub min_score: f64,
}

#[derive(Debug, Clone)]
pub struct FullTextSearchResult {
    pub snippet: Snippet,
    pub score: f64,
}

/// CRUD over the four persisted entities plus indexing-job bookkeeping.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn create_library(&self, library: &Library) -> CoreResult<()>;
    async fn get_library(&self, id: &str) -> CoreResult<Option<Library>>;
    async fn get_library_by_identifier(&self, identifier: &str) -> CoreResult<Option<Library>>;
    async fn list_libraries(&self, limit: i64, offset: i64) -> CoreResult<Vec<Library>>;
    async fn update_library(&self, library: &Library) -> CoreResult<()>;
    /// Cascades through versions, documents, snippets.
    async fn delete_library(&self, id: &str) -> CoreResult<()>;
    /// Case-insensitive substring match on `name, org, project, identifier`,
    /// ordered by `updated_ms` desc, limit 50.
    async fn search_libraries(&self, query: &str) -> CoreResult<Vec<Library>>;

    async fn create_version(&self, version: &Version) -> CoreResult<()>;
    async fn get_version(&self, id: &str) -> CoreResult<Option<Version>>;
    /// The version with `is_latest = true` for this library, if any (at
    /// most one such row is a storage-layer invariant).
    async fn get_latest_version(&self, library_id: &str) -> CoreResult<Option<Version>>;
    async fn list_versions(&self, library_id: &str) -> CoreResult<Vec<Version>>;
    async fn update_version(&self, version: &Version) -> CoreResult<()>;
    /// Cascades through documents and snippets carrying this version id.
    async fn delete_version(&self, id: &str) -> CoreResult<()>;

    async fn insert_documents(&self, documents: &[Document]) -> CoreResult<()>;
    async fn get_document_by_path(&self, library_id: &str, path: &str) -> CoreResult<Option<Document>>;
    async fn list_documents(&self, library_id: &str) -> CoreResult<Vec<Document>>;
    async fn delete_document(&self, id: &str) -> CoreResult<()>;
    async fn delete_documents_by_version(&self, version_id: &str) -> CoreResult<()>;
    /// Re-index dedup check: whether a document with this content hash is
    /// already stored for the library.
    async fn document_exists_by_hash(&self, library_id: &str, content_hash: &str) -> CoreResult<bool>;

    /// Idempotent per snippet id: an existing row with the same id is
    /// replaced (core spec §4.4).
    async fn insert_snippets(&self, snippets: &[Snippet]) -> CoreResult<()>;
    /// Paginated scan ordered by `quality_score` desc, used as the
    /// no-vector-search fallback (core spec §4.5).
    async fn list_snippets_by_library(
        &self,
        library_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<Snippet>>;
    async fn snippet_ids_for_library(&self, library_id: &str) -> CoreResult<Vec<String>>;

    async fn create_indexing_job(&self, job: &IndexingJob) -> CoreResult<()>;
    async fn update_indexing_job(&self, job: &IndexingJob) -> CoreResult<()>;
    async fn get_indexing_job(&self, id: &str) -> CoreResult<Option<IndexingJob>>;
    async fn list_indexing_jobs(
        &self,
        library_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<IndexingJob>>;
}

/// Vector search and full-text search over snippet content.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Batched internally at ≤100 per call; idempotent per snippet id.
    async fn upsert_snippet_vectors(&self, library_id: &str, snippets: &[Snippet]) -> CoreResult<()>;
    async fn delete_library_vectors(&self, library_id: &str) -> CoreResult<()>;
    async fn vector_search(&self, params: &VectorSearchParams) -> CoreResult<Vec<VectorSearchResult>>;
    async fn full_text_search(
        &self,
        opts: &FullTextSearchOpts,
    ) -> CoreResult<Vec<FullTextSearchResult>>;
    /// Set parity check used by tests: ids present in the vector store for
    /// a library (core spec §8: vector/relational parity).
    async fn vector_snippet_ids(&self, library_id: &str) -> CoreResult<Vec<String>>;
}
