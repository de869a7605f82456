//! Indexing Orchestrator: ties the parser, topic extractor, embedding
//! client, and storage layer into one re-indexing job per library
//! (core spec §4.6 — generalizes the teacher's connector-sync loop).

use std::sync::Arc;

use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::embedding::EmbeddingClient;
use crate::errors::{CoreError, CoreResult};
use crate::locks::LibraryLockTable;
use crate::models::{IndexingJob, JobStatus, Library, Snippet};
use crate::parser::{parse_library_tree, ParseOptions};
use crate::store::{RelationalStore, VectorStore};
use crate::topics::{
    aggregate_library_topics, build_llm_prompt, extract_topics_from_headers,
    parse_llm_topic_response, should_use_llm_fallback,
};

pub struct IndexingOrchestrator {
    relational: Arc<dyn RelationalStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    locks: Arc<LibraryLockTable>,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
}

/// A caller-supplied function that answers an LLM topic-fallback prompt.
/// `None` means no LLM is configured — header-only extraction is used.
pub type LlmTopicFallback = dyn Fn(&str) -> CoreResult<String> + Send + Sync;

impl IndexingOrchestrator {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        locks: Arc<LibraryLockTable>,
        chunking: ChunkingConfig,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            relational,
            vectors,
            embedder,
            locks,
            chunking,
            embedding,
        }
    }

    /// Re-indexes one library: acquires its lock, walks its tree, extracts
    /// topics, embeds, and executes the index-replacement invariant
    /// (delete vectors → delete library row → insert library → insert
    /// documents → insert snippets → upsert vectors), all-or-nothing on
    /// the storage side. Returns `LibraryBusy` immediately on contention.
    pub async fn reindex_library(
        &self,
        library: Library,
        root: &std::path::Path,
        options: &ParseOptions,
        now_ms: i64,
        llm_fallback: Option<&LlmTopicFallback>,
    ) -> CoreResult<IndexingJob> {
        let _guard = self.locks.try_acquire(&library.id)?;

        let mut job = IndexingJob {
            id: uuid::Uuid::new_v4().to_string(),
            library_id: library.id.clone(),
            version_id: None,
            status: JobStatus::Running,
            total_documents: 0,
            processed_documents: 0,
            failed_documents: 0,
            error: None,
            started_ms: now_ms,
            completed_ms: None,
            metadata: Default::default(),
        };
        self.relational.create_indexing_job(&job).await?;
        tracing::info!(library_id = %library.id, job_id = %job.id, "indexing job started");

        match self
            .run_pipeline(&library, root, options, now_ms, llm_fallback, &mut job)
            .await
        {
            Ok(()) => {
                job.status = JobStatus::Completed;
                job.completed_ms = Some(now_ms);
                self.relational.update_indexing_job(&job).await?;
                tracing::info!(
                    library_id = %library.id,
                    job_id = %job.id,
                    documents = job.total_documents,
                    "indexing job completed"
                );
                Ok(job)
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                job.completed_ms = Some(now_ms);
                tracing::warn!(
                    library_id = %library.id,
                    job_id = %job.id,
                    error = %e,
                    "indexing job failed, leaving library empty for retry"
                );
                // Best-effort: leave the library empty on failure so the
                // caller may retry without manual cleanup.
                let _ = self.vectors.delete_library_vectors(&library.id).await;
                let _ = self.relational.delete_library(&library.id).await;
                let _ = self.relational.update_indexing_job(&job).await;
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        library: &Library,
        root: &std::path::Path,
        options: &ParseOptions,
        now_ms: i64,
        llm_fallback: Option<&LlmTopicFallback>,
        job: &mut IndexingJob,
    ) -> CoreResult<()> {
        let parsed = parse_library_tree(root, &library.id, options, &self.chunking, now_ms)?;

        let mut snippets = parsed.snippets;
        for snippet in &mut snippets {
            // `snippet.content` is the section body with its own heading
            // line already stripped into `title` by the chunker, so the
            // header scan must run over the reconstructed `## title` text,
            // not the body alone.
            let headed_text = format!("## {}\n\n{}", snippet.title, snippet.content);
            let header_topics = extract_topics_from_headers(&headed_text);
            snippet.topics = if should_use_llm_fallback(
                &header_topics,
                self.embedding.llm_topic_fallback,
                self.embedder.llm_configured(),
            ) {
                match llm_fallback {
                    Some(f) => {
                        let prompt = build_llm_prompt(&snippet.content);
                        f(&prompt)
                            .map(|resp| parse_llm_topic_response(&resp))
                            .unwrap_or_default()
                    }
                    None => Vec::new(),
                }
            } else {
                header_topics
            };
        }

        if self.embedding.is_enabled() {
            let texts: Vec<String> = snippets.iter().map(|s| s.embedding_input()).collect();
            match self.embedder.embed(&texts).await {
                Ok(vectors) => {
                    for (snippet, vector) in snippets.iter_mut().zip(vectors.into_iter()) {
                        snippet.embedding = Some(vector);
                    }
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => return Err(e),
            }
        }

        let mut library = library.clone();
        library.topics = aggregate_library_topics(snippets.iter().map(|s| s.topics.as_slice()));

        job.total_documents = parsed.documents.len() as i64;

        self.vectors.delete_library_vectors(&library.id).await?;
        self.relational.delete_library(&library.id).await?;
        self.relational.create_library(&library).await?;
        self.relational.insert_documents(&parsed.documents).await?;
        self.relational.insert_snippets(&snippets).await?;
        self.vectors
            .upsert_snippet_vectors(&library.id, &snippets)
            .await?;

        job.processed_documents = parsed.documents.len() as i64;
        if snippets.is_empty() {
            return Err(CoreError::ValidationFailed(
                "zero snippets produced for library".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbeddingClient;
    use crate::store::memory::MemoryStore;
    use std::fs;
    use tempfile::tempdir;

    fn library(id: &str) -> Library {
        Library {
            id: id.to_string(),
            identifier: format!("/acme/{id}"),
            name: id.to_string(),
            org: "acme".to_string(),
            project: id.to_string(),
            description: String::new(),
            repository_url: None,
            homepage_url: None,
            trust_score: 5,
            keywords: Vec::new(),
            topics: Vec::new(),
            rules: Vec::new(),
            source_path: None,
            metadata: Default::default(),
            created_ms: 0,
            updated_ms: 0,
        }
    }

    #[tokio::test]
    async fn reindex_is_idempotent_and_snippet_ids_stable() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(
            dir.path().join("docs/a.md"),
            "## Routing\n\nLong enough body content for a section boundary.",
        )
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let orchestrator = IndexingOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(DisabledEmbeddingClient),
            Arc::new(LibraryLockTable::new()),
            ChunkingConfig::default(),
            EmbeddingConfig::default(),
        );
        let options = ParseOptions {
            explicit_folders: vec!["docs".to_string()],
            exclude_rules: vec![],
        };

        let job1 = orchestrator
            .reindex_library(library("lib1"), dir.path(), &options, 100, None)
            .await
            .unwrap();
        assert_eq!(job1.status, JobStatus::Completed);
        let ids1 = store.snippet_ids_for_library("lib1").await.unwrap();

        let job2 = orchestrator
            .reindex_library(library("lib1"), dir.path(), &options, 200, None)
            .await
            .unwrap();
        assert_eq!(job2.status, JobStatus::Completed);
        let mut ids2 = store.snippet_ids_for_library("lib1").await.unwrap();
        let mut ids1_sorted = ids1.clone();
        ids1_sorted.sort();
        ids2.sort();
        assert_eq!(ids1_sorted, ids2);
    }

    #[tokio::test]
    async fn concurrent_reindex_of_same_library_is_busy() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LibraryLockTable::new());
        let _guard = locks.try_acquire("lib1").unwrap();

        let orchestrator = IndexingOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(DisabledEmbeddingClient),
            locks,
            ChunkingConfig::default(),
            EmbeddingConfig::default(),
        );
        let dir = tempdir().unwrap();
        let options = ParseOptions::default();
        let err = orchestrator
            .reindex_library(library("lib1"), dir.path(), &options, 0, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::LibraryBusy);
    }
}
