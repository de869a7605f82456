//! Retrieval Engine: the five user-visible lookup modes, blended ranking,
//! and markdown rendering, all built on top of the two store traits.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::embedding::EmbeddingClient;
use crate::errors::{CoreError, CoreResult};
use crate::models::{Library, Snippet, Version};
use crate::store::{
    FullTextSearchOpts, RelationalStore, SearchFilter, VectorSearchParams, VectorStore,
};

pub struct RetrievalEngine {
    relational: Arc<dyn RelationalStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
}

/// One candidate ready for prefix-budget rendering, already blended and
/// ordered (core spec §4.5).
struct RankedSnippet {
    snippet: Snippet,
    similarity: f64,
}

fn blended_score(similarity: f64, quality_score: f64) -> f64 {
    0.7 * similarity + 0.3 * quality_score
}

/// Sorts by blended desc, ties by similarity desc, then `updated_ms` desc,
/// then `id` asc — a total order (core spec §8).
fn sort_ranked(ranked: &mut Vec<RankedSnippet>) {
    ranked.sort_by(|a, b| {
        let blended_a = blended_score(a.similarity, a.snippet.quality_score);
        let blended_b = blended_score(b.similarity, b.snippet.quality_score);
        blended_b
            .partial_cmp(&blended_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.snippet.updated_ms.cmp(&a.snippet.updated_ms))
            .then_with(|| a.snippet.id.cmp(&b.snippet.id))
    });
}

/// Renders the library header, best-practices block (if any), and as many
/// snippets as fit within `max_tokens`: strict prefix, no reordering for
/// fit (core spec §4.5).
fn render_markdown(library: &Library, snippets: &[Snippet], max_tokens: i64) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", library.name));
    out.push_str(&format!("{}\n", library.description));

    if !library.rules.is_empty() {
        out.push_str("## Best Practices\n");
        for rule in &library.rules {
            out.push_str(&format!("- {rule}\n"));
        }
    }

    let mut current_tokens = crate::models::estimate_tokens(&out);
    for snippet in snippets {
        if current_tokens + snippet.tokens > max_tokens {
            break;
        }
        out.push_str(&format!("### {}\n", snippet.title));
        out.push_str(&format!("Source: {}\n", snippet.source_file));
        out.push_str(&format!("{}\n", snippet.description));
        for code in &snippet.code_blocks {
            out.push_str(&format!("```{}\n{}\n```\n", code.language, code.code));
        }
        out.push_str("--------------------------------\n");
        current_tokens += snippet.tokens;
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryMatch {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trust_score: u8,
    pub repository_url: Option<String>,
    pub homepage_url: Option<String>,
    pub versions: Vec<String>,
    pub topics: Vec<String>,
    pub tool_hint: &'static str,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveLibraryResponse {
    pub query: String,
    pub matches: Vec<LibraryMatch>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub title: String,
    pub content: String,
    pub tokens: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    pub version: String,
    pub indexed_at: i64,
    pub documentation_chunks: i64,
    pub is_latest: bool,
    pub is_deprecated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryVersionsResponse {
    pub library: String,
    pub library_id: String,
    pub versions: Vec<VersionSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub title: String,
    pub content: String,
    pub score: f64,
    pub library: SearchResultLibrary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultLibrary {
    pub identifier: String,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchFilters {
    pub library: Option<String>,
    pub version: Option<String>,
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchDocumentationResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: i64,
    pub filters: SearchFilters,
}

impl RetrievalEngine {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            relational,
            vectors,
            embedder,
        }
    }

    /// **Mode A**: `resolve-library-id`. Local results always pre-empt any
    /// remote-upstream results (not implemented here — no remote upstream
    /// is wired in this deployment, so every match is `tool_hint:
    /// "get-local-docs"`, `source: "local"`).
    pub async fn resolve_library_id(&self, library_name: &str) -> CoreResult<ResolveLibraryResponse> {
        let libraries = self.relational.search_libraries(library_name).await?;
        let mut matches = Vec::with_capacity(libraries.len());
        for library in &libraries {
            let versions = self.relational.list_versions(&library.id).await?;
            matches.push(LibraryMatch {
                id: library.id.clone(),
                name: library.name.clone(),
                description: library.description.clone(),
                trust_score: library.trust_score,
                repository_url: library.repository_url.clone(),
                homepage_url: library.homepage_url.clone(),
                versions: versions.into_iter().map(|v| v.version_string).collect(),
                topics: library.topics.clone(),
                tool_hint: "get-local-docs",
                source: "local",
            });
        }
        let total = matches.len();
        Ok(ResolveLibraryResponse {
            query: library_name.to_string(),
            matches,
            total,
        })
    }

    /// **Mode B**: document by path (`get-library-docs` / `get-local-docs`
    /// with a `path` argument).
    pub async fn get_document(
        &self,
        library_id: &str,
        path: &str,
        tokens: i64,
    ) -> CoreResult<DocumentView> {
        let document = self
            .relational
            .get_document_by_path(library_id, path)
            .await?
            .ok_or_else(|| CoreError::not_found("document", path))?;

        let max_chars = (tokens.max(0) as usize) * 4;
        let content = if document.content.chars().count() > max_chars {
            let mut truncated: String = document.content.chars().take(max_chars).collect();
            truncated.push_str("... [truncated]");
            truncated
        } else {
            document.content.clone()
        };

        Ok(DocumentView {
            title: document.title,
            content,
            tokens: crate::models::estimate_tokens(&document.content),
        })
    }

    /// **Mode C**: topic-filtered retrieval. Uses a neutral (all-zero)
    /// query vector when no topic text narrows the embedding, per spec.
    pub async fn get_docs_by_topics(
        &self,
        library_id: &str,
        topics: &[String],
        max_tokens: i64,
    ) -> CoreResult<String> {
        let neutral = vec![0.0f32; self.embedder.dims().max(1)];
        self.render_vector_or_fallback(library_id, neutral, topics, max_tokens)
            .await
    }

    /// **Mode D**: semantic retrieval by a free-text topic.
    pub async fn get_docs_by_topic_text(
        &self,
        library_id: &str,
        topic: &str,
        max_tokens: i64,
    ) -> CoreResult<String> {
        match self.embedder.embed_query(topic).await {
            Ok(embedding) => {
                self.render_vector_or_fallback(library_id, embedding, &[], max_tokens)
                    .await
            }
            Err(_) => self.render_full_text_fallback(library_id, max_tokens).await,
        }
    }

    async fn render_vector_or_fallback(
        &self,
        library_id: &str,
        embedding: Vec<f32>,
        topics: &[String],
        max_tokens: i64,
    ) -> CoreResult<String> {
        let library = self
            .relational
            .get_library(library_id)
            .await?
            .ok_or_else(|| CoreError::not_found("library", library_id))?;

        let params = VectorSearchParams {
            embedding,
            k: 30,
            threshold: None,
            filter: SearchFilter {
                library_id: Some(library_id.to_string()),
                version_id: None,
                topics: topics.to_vec(),
            },
        };
        let results = self.vectors.vector_search(&params).await?;

        let snippets = if results.is_empty() {
            self.fallback_snippet_scan(library_id).await?
        } else {
            let mut ranked: Vec<RankedSnippet> = results
                .into_iter()
                .map(|r| RankedSnippet {
                    snippet: r.snippet,
                    similarity: r.similarity,
                })
                .collect();
            sort_ranked(&mut ranked);
            ranked.into_iter().map(|r| r.snippet).collect()
        };

        Ok(render_markdown(&library, &snippets, max_tokens))
    }

    async fn render_full_text_fallback(&self, library_id: &str, max_tokens: i64) -> CoreResult<String> {
        let library = self
            .relational
            .get_library(library_id)
            .await?
            .ok_or_else(|| CoreError::not_found("library", library_id))?;
        let snippets = self.fallback_snippet_scan(library_id).await?;
        Ok(render_markdown(&library, &snippets, max_tokens))
    }

    /// Paginated scan (limit 30) preserving `quality_score` ordering, used
    /// when vector search is unavailable or returns nothing.
    async fn fallback_snippet_scan(&self, library_id: &str) -> CoreResult<Vec<Snippet>> {
        self.relational.list_snippets_by_library(library_id, 30, 0).await
    }

    /// **Mode E**: hybrid retrieval across all libraries (`search-documentation`).
    pub async fn hybrid_search(
        &self,
        query: &str,
        filters: SearchFilters,
        limit: i64,
        min_score: f64,
    ) -> CoreResult<SearchDocumentationResponse> {
        let embedding = self.embedder.embed_query(query).await.ok();

        let mut ranked: Vec<RankedSnippet> = Vec::new();
        if let Some(embedding) = embedding {
            let params = VectorSearchParams {
                embedding,
                k: limit.max(1),
                threshold: if min_score > 0.0 { Some(min_score) } else { None },
                filter: SearchFilter {
                    library_id: filters.library.clone(),
                    version_id: filters.version.clone(),
                    topics: Vec::new(),
                },
            };
            for result in self.vectors.vector_search(&params).await? {
                ranked.push(RankedSnippet {
                    snippet: result.snippet,
                    similarity: result.similarity,
                });
            }
            let ft_opts = FullTextSearchOpts {
                query: query.to_string(),
                version_id: filters.version.clone(),
                code_only: false,
                min_score,
            };
            for result in self.vectors.full_text_search(&ft_opts).await? {
                if !ranked.iter().any(|r| r.snippet.id == result.snippet.id) {
                    ranked.push(RankedSnippet {
                        snippet: result.snippet,
                        similarity: result.score,
                    });
                }
            }
        } else {
            let ft_opts = FullTextSearchOpts {
                query: query.to_string(),
                version_id: filters.version.clone(),
                code_only: false,
                min_score,
            };
            for result in self.vectors.full_text_search(&ft_opts).await? {
                ranked.push(RankedSnippet {
                    snippet: result.snippet,
                    similarity: result.score,
                });
            }
        }

        sort_ranked(&mut ranked);
        ranked.truncate(limit.max(0) as usize);

        let mut library_cache: HashMap<String, Library> = HashMap::new();
        let mut results = Vec::with_capacity(ranked.len());
        for r in &ranked {
            if !library_cache.contains_key(&r.snippet.library_id) {
                if let Some(library) = self.relational.get_library(&r.snippet.library_id).await? {
                    library_cache.insert(r.snippet.library_id.clone(), library);
                }
            }
            let library = library_cache.get(&r.snippet.library_id);
            results.push(SearchResultItem {
                title: r.snippet.title.clone(),
                content: r.snippet.content.clone(),
                score: blended_score(r.similarity, r.snippet.quality_score),
                library: SearchResultLibrary {
                    identifier: library.map(|l| l.identifier.clone()).unwrap_or_default(),
                    name: library.map(|l| l.name.clone()).unwrap_or_default(),
                    version: r.snippet.version_id.clone(),
                },
            });
        }

        let total = results.len();
        Ok(SearchDocumentationResponse {
            query: query.to_string(),
            results,
            total,
            limit,
            filters,
        })
    }

    /// `get-library-versions`.
    pub async fn list_versions(&self, library_id: &str) -> CoreResult<LibraryVersionsResponse> {
        let library = self
            .relational
            .get_library(library_id)
            .await?
            .ok_or_else(|| CoreError::not_found("library", library_id))?;
        let versions: Vec<Version> = self.relational.list_versions(library_id).await?;
        let summaries = versions
            .into_iter()
            .map(|v| VersionSummary {
                version: v.version_string,
                indexed_at: v.indexed_ms,
                documentation_chunks: v.document_count,
                is_latest: v.is_latest,
                is_deprecated: v.is_deprecated,
            })
            .collect::<Vec<_>>();
        let total = summaries.len();
        Ok(LibraryVersionsResponse {
            library: library.name,
            library_id: library.id,
            versions: summaries,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbeddingClient;
    use crate::models::{CodeBlock, SourceType};
    use crate::store::memory::MemoryStore;

    fn snippet(id: &str, tokens: i64, quality: f64, updated_ms: i64) -> Snippet {
        Snippet {
            id: id.to_string(),
            library_id: "lib1".to_string(),
            version_id: None,
            title: id.to_string(),
            source_file: "/a.md".to_string(),
            source_type: SourceType::Docs,
            description: String::new(),
            content: "body".to_string(),
            code_blocks: Vec::<CodeBlock>::new(),
            topics: Vec::new(),
            has_code: false,
            code_block_count: 0,
            tokens,
            quality_score: quality,
            embedding: None,
            updated_ms,
        }
    }

    fn library() -> Library {
        Library {
            id: "lib1".to_string(),
            identifier: "/acme/widgets".to_string(),
            name: "Widgets".to_string(),
            org: "acme".to_string(),
            project: "widgets".to_string(),
            description: "desc".to_string(),
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

    #[test]
    fn blended_ranking_overrides_pure_similarity_scenario() {
        let a = blended_score(0.9, 0.3);
        let b = blended_score(0.7, 1.0);
        assert!((a - 0.72).abs() < 1e-9);
        assert!((b - 0.79).abs() < 1e-9);
        assert!(b > a);
    }

    #[test]
    fn token_budget_prefix_scenario() {
        let library = library();
        let snippets = vec![snippet("s1", 400, 0.5, 1), snippet("s2", 600, 0.5, 2), snippet("s3", 500, 0.5, 3)];
        let rendered = render_markdown(&library, &snippets, 1000);
        assert!(rendered.contains("### s1"));
        assert!(!rendered.contains("### s2"));
        assert!(!rendered.contains("### s3"));

        let rendered_wide = render_markdown(&library, &snippets, 2000);
        assert!(rendered_wide.contains("### s1"));
        assert!(rendered_wide.contains("### s2"));
        assert!(rendered_wide.contains("### s3"));
    }

    #[tokio::test]
    async fn get_document_truncates_with_marker() {
        let relational = Arc::new(MemoryStore::new());
        let vectors = Arc::new(MemoryStore::new());
        let document = crate::models::Document {
            id: "d1".to_string(),
            library_id: "lib1".to_string(),
            version_id: None,
            path: "/a.md".to_string(),
            title: "A".to_string(),
            content: "x".repeat(100),
            content_hash: "h".to_string(),
            tokens: 25,
            source_type: SourceType::Docs,
            source_path: None,
            source_url: None,
            language: "en".to_string(),
            indexed_ms: 0,
        };
        relational.insert_documents(&[document]).await.unwrap();

        let engine = RetrievalEngine::new(relational, vectors, Arc::new(DisabledEmbeddingClient));
        let view = engine.get_document("lib1", "/a.md", 10).await.unwrap();
        assert!(view.content.ends_with("... [truncated]"));
        assert_eq!(view.content.chars().filter(|c| *c == 'x').count(), 40);
    }

    #[tokio::test]
    async fn get_document_missing_is_not_found() {
        let relational = Arc::new(MemoryStore::new());
        let vectors = Arc::new(MemoryStore::new());
        let engine = RetrievalEngine::new(relational, vectors, Arc::new(DisabledEmbeddingClient));
        let err = engine.get_document("lib1", "/missing.md", 10).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::NotFound);
    }
}
