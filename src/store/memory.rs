//! In-memory fakes of both store traits, used by unit tests for the
//! indexing orchestrator and retrieval engine without a SQLite file.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::embedding::cosine_similarity;
use crate::errors::CoreResult;
use crate::models::{Document, IndexingJob, Library, Snippet, Version};

use super::{
    FullTextSearchOpts, FullTextSearchResult, RelationalStore, VectorSearchParams,
    VectorSearchResult, VectorStore,
};

#[derive(Default)]
pub struct MemoryStore {
    libraries: Mutex<HashMap<String, Library>>,
    versions: Mutex<HashMap<String, Version>>,
    documents: Mutex<HashMap<String, Document>>,
    snippets: Mutex<HashMap<String, Snippet>>,
    jobs: Mutex<HashMap<String, IndexingJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn create_library(&self, library: &Library) -> CoreResult<()> {
        self.libraries
            .lock()
            .unwrap()
            .insert(library.id.clone(), library.clone());
        Ok(())
    }

    async fn get_library(&self, id: &str) -> CoreResult<Option<Library>> {
        Ok(self.libraries.lock().unwrap().get(id).cloned())
    }

    async fn get_library_by_identifier(&self, identifier: &str) -> CoreResult<Option<Library>> {
        Ok(self
            .libraries
            .lock()
            .unwrap()
            .values()
            .find(|l| l.identifier == identifier)
            .cloned())
    }

    async fn list_libraries(&self, limit: i64, offset: i64) -> CoreResult<Vec<Library>> {
        let mut all: Vec<Library> = self.libraries.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.updated_ms.cmp(&a.updated_ms));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_library(&self, library: &Library) -> CoreResult<()> {
        self.libraries
            .lock()
            .unwrap()
            .insert(library.id.clone(), library.clone());
        Ok(())
    }

    async fn delete_library(&self, id: &str) -> CoreResult<()> {
        self.libraries.lock().unwrap().remove(id);
        self.versions.lock().unwrap().retain(|_, v| v.library_id != id);
        self.documents.lock().unwrap().retain(|_, d| d.library_id != id);
        self.snippets.lock().unwrap().retain(|_, s| s.library_id != id);
        Ok(())
    }

    async fn search_libraries(&self, query: &str) -> CoreResult<Vec<Library>> {
        let needle = query.to_lowercase();
        let mut matches: Vec<Library> = self
            .libraries
            .lock()
            .unwrap()
            .values()
            .filter(|l| {
                l.name.to_lowercase().contains(&needle)
                    || l.org.to_lowercase().contains(&needle)
                    || l.project.to_lowercase().contains(&needle)
                    || l.identifier.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_ms.cmp(&a.updated_ms));
        matches.truncate(50);
        Ok(matches)
    }

    async fn create_version(&self, version: &Version) -> CoreResult<()> {
        self.versions
            .lock()
            .unwrap()
            .insert(version.id.clone(), version.clone());
        Ok(())
    }

    async fn get_version(&self, id: &str) -> CoreResult<Option<Version>> {
        Ok(self.versions.lock().unwrap().get(id).cloned())
    }

    async fn get_latest_version(&self, library_id: &str) -> CoreResult<Option<Version>> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .values()
            .find(|v| v.library_id == library_id && v.is_latest)
            .cloned())
    }

    async fn list_versions(&self, library_id: &str) -> CoreResult<Vec<Version>> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.library_id == library_id)
            .cloned()
            .collect())
    }

    async fn update_version(&self, version: &Version) -> CoreResult<()> {
        self.versions
            .lock()
            .unwrap()
            .insert(version.id.clone(), version.clone());
        Ok(())
    }

    async fn delete_version(&self, id: &str) -> CoreResult<()> {
        self.versions.lock().unwrap().remove(id);
        self.documents
            .lock()
            .unwrap()
            .retain(|_, d| d.version_id.as_deref() != Some(id));
        self.snippets
            .lock()
            .unwrap()
            .retain(|_, s| s.version_id.as_deref() != Some(id));
        Ok(())
    }

    async fn insert_documents(&self, documents: &[Document]) -> CoreResult<()> {
        let mut store = self.documents.lock().unwrap();
        for d in documents {
            store.insert(d.id.clone(), d.clone());
        }
        Ok(())
    }

    async fn get_document_by_path(&self, library_id: &str, path: &str) -> CoreResult<Option<Document>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .find(|d| d.library_id == library_id && d.path == path)
            .cloned())
    }

    async fn list_documents(&self, library_id: &str) -> CoreResult<Vec<Document>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.library_id == library_id)
            .cloned()
            .collect())
    }

    async fn delete_document(&self, id: &str) -> CoreResult<()> {
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }

    async fn delete_documents_by_version(&self, version_id: &str) -> CoreResult<()> {
        self.documents
            .lock()
            .unwrap()
            .retain(|_, d| d.version_id.as_deref() != Some(version_id));
        Ok(())
    }

    async fn document_exists_by_hash(&self, library_id: &str, content_hash: &str) -> CoreResult<bool> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .any(|d| d.library_id == library_id && d.content_hash == content_hash))
    }

    async fn insert_snippets(&self, snippets: &[Snippet]) -> CoreResult<()> {
        let mut store = self.snippets.lock().unwrap();
        for s in snippets {
            store.insert(s.id.clone(), s.clone());
        }
        Ok(())
    }

    async fn list_snippets_by_library(
        &self,
        library_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<Snippet>> {
        let mut all: Vec<Snippet> = self
            .snippets
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.library_id == library_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.quality_score.partial_cmp(&a.quality_score).unwrap());
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn snippet_ids_for_library(&self, library_id: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .snippets
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.library_id == library_id)
            .map(|s| s.id.clone())
            .collect())
    }

    async fn create_indexing_job(&self, job: &IndexingJob) -> CoreResult<()> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_indexing_job(&self, job: &IndexingJob) -> CoreResult<()> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_indexing_job(&self, id: &str) -> CoreResult<Option<IndexingJob>> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn list_indexing_jobs(
        &self,
        library_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<IndexingJob>> {
        let mut jobs: Vec<IndexingJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.library_id == library_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_ms.cmp(&a.started_ms));
        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert_snippet_vectors(&self, _library_id: &str, snippets: &[Snippet]) -> CoreResult<()> {
        let mut store = self.snippets.lock().unwrap();
        for s in snippets {
            if s.embedding.is_some() {
                store.insert(s.id.clone(), s.clone());
            }
        }
        Ok(())
    }

    async fn delete_library_vectors(&self, library_id: &str) -> CoreResult<()> {
        let mut store = self.snippets.lock().unwrap();
        for s in store.values_mut() {
            if s.library_id == library_id {
                s.embedding = None;
            }
        }
        Ok(())
    }

    async fn vector_search(&self, params: &VectorSearchParams) -> CoreResult<Vec<VectorSearchResult>> {
        let snippets = self.snippets.lock().unwrap();
        let mut results: Vec<VectorSearchResult> = snippets
            .values()
            .filter(|s| {
                params
                    .filter
                    .library_id
                    .as_ref()
                    .map(|lib| &s.library_id == lib)
                    .unwrap_or(true)
                    && params
                        .filter
                        .version_id
                        .as_ref()
                        .map(|v| s.version_id.as_deref() == Some(v.as_str()))
                        .unwrap_or(true)
                    && (params.filter.topics.is_empty()
                        || s.topics.iter().any(|t| params.filter.topics.contains(t)))
            })
            .filter_map(|s| {
                let embedding = s.embedding.as_ref()?;
                let similarity = cosine_similarity(&params.embedding, embedding).clamp(0.0, 1.0) as f64;
                if let Some(threshold) = params.threshold {
                    if similarity < threshold {
                        return None;
                    }
                }
                Some(VectorSearchResult {
                    snippet: s.clone(),
                    similarity,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.snippet.updated_ms.cmp(&a.snippet.updated_ms))
        });
        results.truncate(params.k.max(0) as usize);
        Ok(results)
    }

    async fn full_text_search(
        &self,
        opts: &FullTextSearchOpts,
    ) -> CoreResult<Vec<FullTextSearchResult>> {
        let needle = opts.query.to_lowercase();
        let snippets = self.snippets.lock().unwrap();
        let mut results: Vec<FullTextSearchResult> = snippets
            .values()
            .filter(|s| {
                opts.version_id
                    .as_ref()
                    .map(|v| s.version_id.as_deref() == Some(v.as_str()))
                    .unwrap_or(true)
                    && (!opts.code_only || s.has_code)
            })
            .filter_map(|s| {
                let title_match = s.title.to_lowercase().contains(&needle);
                let content_match = s.content.to_lowercase().contains(&needle);
                let description_match = s.description.to_lowercase().contains(&needle);
                if !title_match && !content_match && !description_match {
                    return None;
                }
                let score = if title_match {
                    0.8
                } else if content_match {
                    0.5
                } else {
                    0.3
                };
                if score < opts.min_score {
                    return None;
                }
                Some(FullTextSearchResult {
                    snippet: s.clone(),
                    score,
                })
            })
            .collect();
        results.sort_by(|a, b| b.snippet.updated_ms.cmp(&a.snippet.updated_ms));
        Ok(results)
    }

    async fn vector_snippet_ids(&self, library_id: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .snippets
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.library_id == library_id && s.embedding.is_some())
            .map(|s| s.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CodeBlock, SourceType};

    fn snippet(id: &str, topics: Vec<&str>, embedding: Vec<f32>, updated_ms: i64) -> Snippet {
        Snippet {
            id: id.to_string(),
            library_id: "lib1".to_string(),
            version_id: None,
            title: id.to_string(),
            source_file: "/a.md".to_string(),
            source_type: SourceType::Docs,
            description: String::new(),
            content: "content".to_string(),
            code_blocks: Vec::<CodeBlock>::new(),
            topics: topics.into_iter().map(String::from).collect(),
            has_code: false,
            code_block_count: 0,
            tokens: 10,
            quality_score: 0.5,
            embedding: Some(embedding),
            updated_ms,
        }
    }

    #[tokio::test]
    async fn vector_search_with_topic_filter_scenario() {
        let store = MemoryStore::new();
        let s1 = snippet("s1", vec!["auth"], vec![1.0, 0.0], 1);
        let s2 = snippet("s2", vec!["routing"], vec![0.0, 1.0], 2);
        let s3 = snippet("s3", vec!["auth", "routing"], vec![0.7, 0.7], 3);
        store.insert_snippets(&[s1, s2, s3]).await.unwrap();

        let auth_results = store
            .vector_search(&VectorSearchParams {
                embedding: vec![1.0, 0.0],
                k: 30,
                threshold: None,
                filter: super::super::SearchFilter {
                    library_id: Some("lib1".to_string()),
                    version_id: None,
                    topics: vec!["auth".to_string()],
                },
            })
            .await
            .unwrap();
        let ids: Vec<&str> = auth_results.iter().map(|r| r.snippet.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"s1"));
        assert!(ids.contains(&"s3"));

        let routing_results = store
            .vector_search(&VectorSearchParams {
                embedding: vec![0.0, 1.0],
                k: 30,
                threshold: None,
                filter: super::super::SearchFilter {
                    library_id: Some("lib1".to_string()),
                    version_id: None,
                    topics: vec!["routing".to_string()],
                },
            })
            .await
            .unwrap();
        let ids: Vec<&str> = routing_results.iter().map(|r| r.snippet.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"s2"));
        assert!(ids.contains(&"s3"));
    }
}
