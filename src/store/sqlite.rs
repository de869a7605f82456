//! SQLite-backed relational and vector stores sharing one connection pool.
//!
//! Vector search is a brute-force scan over blob-encoded embeddings
//! (core spec §9: "vector-store prefix-match is test-layer-only" — there is
//! no ANN index here, matching the teacher's own `cosine_similarity` scan
//! in its embedding module, generalized to a full store).

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::errors::{CoreError, CoreResult};
use crate::models::{
    CodeBlock, Document, IndexingJob, JobStatus, Library, MetadataMap, Snippet, SourceType,
    Version,
};

use super::{
    FullTextSearchOpts, FullTextSearchResult, RelationalStore, SearchFilter, VectorSearchParams,
    VectorSearchResult, VectorStore,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn source_type_str(s: SourceType) -> &'static str {
    match s {
        SourceType::Readme => "readme",
        SourceType::Api => "api",
        SourceType::Docs => "docs",
        SourceType::Examples => "examples",
        SourceType::Content => "content",
        SourceType::Github => "github",
        SourceType::Web => "web",
        SourceType::Pdf => "pdf",
        SourceType::Markdown => "markdown",
    }
}

fn parse_source_type(s: &str) -> SourceType {
    match s {
        "readme" => SourceType::Readme,
        "api" => SourceType::Api,
        "examples" => SourceType::Examples,
        "content" => SourceType::Content,
        "github" => SourceType::Github,
        "web" => SourceType::Web,
        "pdf" => SourceType::Pdf,
        "markdown" => SourceType::Markdown,
        _ => SourceType::Docs,
    }
}

fn library_from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Library> {
    let keywords: String = row.try_get("keywords_json").map_err(CoreError::from)?;
    let topics: String = row.try_get("topics_json").map_err(CoreError::from)?;
    let rules: String = row.try_get("rules_json").map_err(CoreError::from)?;
    let metadata: String = row.try_get("metadata_json").map_err(CoreError::from)?;
    Ok(Library {
        id: row.try_get("id").map_err(CoreError::from)?,
        identifier: row.try_get("identifier").map_err(CoreError::from)?,
        name: row.try_get("name").map_err(CoreError::from)?,
        org: row.try_get("org").map_err(CoreError::from)?,
        project: row.try_get("project").map_err(CoreError::from)?,
        description: row.try_get("description").map_err(CoreError::from)?,
        repository_url: row.try_get("repository_url").map_err(CoreError::from)?,
        homepage_url: row.try_get("homepage_url").map_err(CoreError::from)?,
        trust_score: row.try_get::<i64, _>("trust_score").map_err(CoreError::from)? as u8,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        rules: serde_json::from_str(&rules).unwrap_or_default(),
        source_path: row.try_get("source_path").map_err(CoreError::from)?,
        metadata: serde_json::from_str::<MetadataMap>(&metadata).unwrap_or_default(),
        created_ms: row.try_get("created_ms").map_err(CoreError::from)?,
        updated_ms: row.try_get("updated_ms").map_err(CoreError::from)?,
    })
}

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Version> {
    Ok(Version {
        id: row.try_get("id").map_err(CoreError::from)?,
        library_id: row.try_get("library_id").map_err(CoreError::from)?,
        version_string: row.try_get("version_string").map_err(CoreError::from)?,
        version_normalized: row.try_get("version_normalized").map_err(CoreError::from)?,
        is_latest: row.try_get::<i64, _>("is_latest").map_err(CoreError::from)? != 0,
        is_deprecated: row.try_get::<i64, _>("is_deprecated").map_err(CoreError::from)? != 0,
        document_count: row.try_get("document_count").map_err(CoreError::from)?,
        git_commit_sha: row.try_get("git_commit_sha").map_err(CoreError::from)?,
        release_date_ms: row.try_get("release_date_ms").map_err(CoreError::from)?,
        indexed_ms: row.try_get("indexed_ms").map_err(CoreError::from)?,
        updated_ms: row.try_get("updated_ms").map_err(CoreError::from)?,
    })
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Document> {
    let source_type: String = row.try_get("source_type").map_err(CoreError::from)?;
    Ok(Document {
        id: row.try_get("id").map_err(CoreError::from)?,
        library_id: row.try_get("library_id").map_err(CoreError::from)?,
        version_id: row.try_get("version_id").map_err(CoreError::from)?,
        path: row.try_get("path").map_err(CoreError::from)?,
        title: row.try_get("title").map_err(CoreError::from)?,
        content: row.try_get("content").map_err(CoreError::from)?,
        content_hash: row.try_get("content_hash").map_err(CoreError::from)?,
        tokens: row.try_get("tokens").map_err(CoreError::from)?,
        source_type: parse_source_type(&source_type),
        source_path: row.try_get("source_path").map_err(CoreError::from)?,
        source_url: row.try_get("source_url").map_err(CoreError::from)?,
        language: row.try_get("language").map_err(CoreError::from)?,
        indexed_ms: row.try_get("indexed_ms").map_err(CoreError::from)?,
    })
}

fn snippet_from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Snippet> {
    let source_type: String = row.try_get("source_type").map_err(CoreError::from)?;
    let code_blocks: String = row.try_get("code_blocks_json").map_err(CoreError::from)?;
    let topics: String = row.try_get("topics_json").map_err(CoreError::from)?;
    let embedding_blob: Option<Vec<u8>> = row.try_get("embedding").map_err(CoreError::from)?;
    Ok(Snippet {
        id: row.try_get("id").map_err(CoreError::from)?,
        library_id: row.try_get("library_id").map_err(CoreError::from)?,
        version_id: row.try_get("version_id").map_err(CoreError::from)?,
        title: row.try_get("title").map_err(CoreError::from)?,
        source_file: row.try_get("source_file").map_err(CoreError::from)?,
        source_type: parse_source_type(&source_type),
        description: row.try_get("description").map_err(CoreError::from)?,
        content: row.try_get("content").map_err(CoreError::from)?,
        code_blocks: serde_json::from_str::<Vec<CodeBlock>>(&code_blocks).unwrap_or_default(),
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        has_code: row.try_get::<i64, _>("has_code").map_err(CoreError::from)? != 0,
        code_block_count: row.try_get("code_block_count").map_err(CoreError::from)?,
        tokens: row.try_get("tokens").map_err(CoreError::from)?,
        quality_score: row.try_get("quality_score").map_err(CoreError::from)?,
        embedding: embedding_blob.map(|b| blob_to_vec(&b)),
        updated_ms: row.try_get("updated_ms").map_err(CoreError::from)?,
    })
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<IndexingJob> {
    let status: String = row.try_get("status").map_err(CoreError::from)?;
    let metadata: String = row.try_get("metadata_json").map_err(CoreError::from)?;
    Ok(IndexingJob {
        id: row.try_get("id").map_err(CoreError::from)?,
        library_id: row.try_get("library_id").map_err(CoreError::from)?,
        version_id: row.try_get("version_id").map_err(CoreError::from)?,
        status: parse_job_status(&status),
        total_documents: row.try_get("total_documents").map_err(CoreError::from)?,
        processed_documents: row.try_get("processed_documents").map_err(CoreError::from)?,
        failed_documents: row.try_get("failed_documents").map_err(CoreError::from)?,
        error: row.try_get("error").map_err(CoreError::from)?,
        started_ms: row.try_get("started_ms").map_err(CoreError::from)?,
        completed_ms: row.try_get("completed_ms").map_err(CoreError::from)?,
        metadata: serde_json::from_str::<MetadataMap>(&metadata).unwrap_or_default(),
    })
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn create_library(&self, library: &Library) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO libraries (id, identifier, name, org, project, description, \
             repository_url, homepage_url, trust_score, keywords_json, topics_json, \
             rules_json, source_path, metadata_json, created_ms, updated_ms) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&library.id)
        .bind(&library.identifier)
        .bind(&library.name)
        .bind(&library.org)
        .bind(&library.project)
        .bind(&library.description)
        .bind(&library.repository_url)
        .bind(&library.homepage_url)
        .bind(library.trust_score as i64)
        .bind(serde_json::to_string(&library.keywords).unwrap_or_default())
        .bind(serde_json::to_string(&library.topics).unwrap_or_default())
        .bind(serde_json::to_string(&library.rules).unwrap_or_default())
        .bind(&library.source_path)
        .bind(serde_json::to_string(&library.metadata).unwrap_or_default())
        .bind(library.created_ms)
        .bind(library.updated_ms)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_library(&self, id: &str) -> CoreResult<Option<Library>> {
        let row = sqlx::query("SELECT * FROM libraries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(library_from_row).transpose()
    }

    async fn get_library_by_identifier(&self, identifier: &str) -> CoreResult<Option<Library>> {
        let row = sqlx::query("SELECT * FROM libraries WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(library_from_row).transpose()
    }

    async fn list_libraries(&self, limit: i64, offset: i64) -> CoreResult<Vec<Library>> {
        let rows = sqlx::query("SELECT * FROM libraries ORDER BY updated_ms DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter().map(library_from_row).collect()
    }

    async fn update_library(&self, library: &Library) -> CoreResult<()> {
        sqlx::query(
            "UPDATE libraries SET name=?, org=?, project=?, description=?, repository_url=?, \
             homepage_url=?, trust_score=?, keywords_json=?, topics_json=?, rules_json=?, \
             source_path=?, metadata_json=?, updated_ms=? WHERE id=?",
        )
        .bind(&library.name)
        .bind(&library.org)
        .bind(&library.project)
        .bind(&library.description)
        .bind(&library.repository_url)
        .bind(&library.homepage_url)
        .bind(library.trust_score as i64)
        .bind(serde_json::to_string(&library.keywords).unwrap_or_default())
        .bind(serde_json::to_string(&library.topics).unwrap_or_default())
        .bind(serde_json::to_string(&library.rules).unwrap_or_default())
        .bind(&library.source_path)
        .bind(serde_json::to_string(&library.metadata).unwrap_or_default())
        .bind(library.updated_ms)
        .bind(&library.id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn delete_library(&self, id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM libraries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn search_libraries(&self, query: &str) -> CoreResult<Vec<Library>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = sqlx::query(
            "SELECT * FROM libraries WHERE lower(name) LIKE ? OR lower(org) LIKE ? \
             OR lower(project) LIKE ? OR lower(identifier) LIKE ? \
             ORDER BY updated_ms DESC LIMIT 50",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;
        rows.iter().map(library_from_row).collect()
    }

    async fn create_version(&self, version: &Version) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO versions (id, library_id, version_string, version_normalized, \
             is_latest, is_deprecated, document_count, git_commit_sha, release_date_ms, \
             indexed_ms, updated_ms) VALUES (?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&version.id)
        .bind(&version.library_id)
        .bind(&version.version_string)
        .bind(&version.version_normalized)
        .bind(version.is_latest as i64)
        .bind(version.is_deprecated as i64)
        .bind(version.document_count)
        .bind(&version.git_commit_sha)
        .bind(version.release_date_ms)
        .bind(version.indexed_ms)
        .bind(version.updated_ms)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_version(&self, id: &str) -> CoreResult<Option<Version>> {
        let row = sqlx::query("SELECT * FROM versions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(version_from_row).transpose()
    }

    async fn get_latest_version(&self, library_id: &str) -> CoreResult<Option<Version>> {
        let row = sqlx::query(
            "SELECT * FROM versions WHERE library_id = ? AND is_latest = 1 LIMIT 1",
        )
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::from)?;
        row.as_ref().map(version_from_row).transpose()
    }

    async fn list_versions(&self, library_id: &str) -> CoreResult<Vec<Version>> {
        let rows = sqlx::query("SELECT * FROM versions WHERE library_id = ? ORDER BY updated_ms DESC")
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter().map(version_from_row).collect()
    }

    async fn delete_version(&self, id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM documents WHERE version_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        sqlx::query("DELETE FROM snippets WHERE version_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        sqlx::query("DELETE FROM versions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn update_version(&self, version: &Version) -> CoreResult<()> {
        sqlx::query(
            "UPDATE versions SET version_string=?, version_normalized=?, is_latest=?, \
             is_deprecated=?, document_count=?, git_commit_sha=?, release_date_ms=?, \
             indexed_ms=?, updated_ms=? WHERE id=?",
        )
        .bind(&version.version_string)
        .bind(&version.version_normalized)
        .bind(version.is_latest as i64)
        .bind(version.is_deprecated as i64)
        .bind(version.document_count)
        .bind(&version.git_commit_sha)
        .bind(version.release_date_ms)
        .bind(version.indexed_ms)
        .bind(version.updated_ms)
        .bind(&version.id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn insert_documents(&self, documents: &[Document]) -> CoreResult<()> {
        for doc in documents {
            sqlx::query(
                "INSERT INTO documents (id, library_id, version_id, path, title, content, \
                 content_hash, tokens, source_type, source_path, source_url, language, \
                 indexed_ms) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)",
            )
            .bind(&doc.id)
            .bind(&doc.library_id)
            .bind(&doc.version_id)
            .bind(&doc.path)
            .bind(&doc.title)
            .bind(&doc.content)
            .bind(&doc.content_hash)
            .bind(doc.tokens)
            .bind(source_type_str(doc.source_type))
            .bind(&doc.source_path)
            .bind(&doc.source_url)
            .bind(&doc.language)
            .bind(doc.indexed_ms)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        }
        Ok(())
    }

    async fn get_document_by_path(&self, library_id: &str, path: &str) -> CoreResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE library_id = ? AND path = ?")
            .bind(library_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, library_id: &str) -> CoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE library_id = ?")
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn delete_documents_by_version(&self, version_id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM documents WHERE version_id = ?")
            .bind(version_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn document_exists_by_hash(&self, library_id: &str, content_hash: &str) -> CoreResult<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM documents WHERE library_id = ? AND content_hash = ? LIMIT 1",
        )
        .bind(library_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(row.is_some())
    }

    async fn insert_snippets(&self, snippets: &[Snippet]) -> CoreResult<()> {
        for s in snippets {
            sqlx::query(
                "INSERT INTO snippets (id, library_id, version_id, title, source_file, \
                 source_type, description, content, code_blocks_json, topics_json, has_code, \
                 code_block_count, tokens, quality_score, embedding, updated_ms) \
                 VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?) \
                 ON CONFLICT(id) DO UPDATE SET \
                 title=excluded.title, description=excluded.description, \
                 content=excluded.content, code_blocks_json=excluded.code_blocks_json, \
                 topics_json=excluded.topics_json, has_code=excluded.has_code, \
                 code_block_count=excluded.code_block_count, tokens=excluded.tokens, \
                 quality_score=excluded.quality_score, embedding=excluded.embedding, \
                 updated_ms=excluded.updated_ms",
            )
            .bind(&s.id)
            .bind(&s.library_id)
            .bind(&s.version_id)
            .bind(&s.title)
            .bind(&s.source_file)
            .bind(source_type_str(s.source_type))
            .bind(&s.description)
            .bind(&s.content)
            .bind(serde_json::to_string(&s.code_blocks).unwrap_or_default())
            .bind(serde_json::to_string(&s.topics).unwrap_or_default())
            .bind(s.has_code as i64)
            .bind(s.code_block_count)
            .bind(s.tokens)
            .bind(s.quality_score)
            .bind(s.embedding.as_ref().map(|e| vec_to_blob(e)))
            .bind(s.updated_ms)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        }
        Ok(())
    }

    async fn list_snippets_by_library(
        &self,
        library_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<Snippet>> {
        let rows = sqlx::query(
            "SELECT * FROM snippets WHERE library_id = ? ORDER BY quality_score DESC \
             LIMIT ? OFFSET ?",
        )
        .bind(library_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;
        rows.iter().map(snippet_from_row).collect()
    }

    async fn snippet_ids_for_library(&self, library_id: &str) -> CoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM snippets WHERE library_id = ?")
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(CoreError::from))
            .collect()
    }

    async fn create_indexing_job(&self, job: &IndexingJob) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO indexing_jobs (id, library_id, version_id, status, total_documents, \
             processed_documents, failed_documents, error, started_ms, completed_ms, \
             metadata_json) VALUES (?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&job.id)
        .bind(&job.library_id)
        .bind(&job.version_id)
        .bind(job_status_str(job.status))
        .bind(job.total_documents)
        .bind(job.processed_documents)
        .bind(job.failed_documents)
        .bind(&job.error)
        .bind(job.started_ms)
        .bind(job.completed_ms)
        .bind(serde_json::to_string(&job.metadata).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn update_indexing_job(&self, job: &IndexingJob) -> CoreResult<()> {
        sqlx::query(
            "UPDATE indexing_jobs SET status=?, total_documents=?, processed_documents=?, \
             failed_documents=?, error=?, completed_ms=?, metadata_json=? WHERE id=?",
        )
        .bind(job_status_str(job.status))
        .bind(job.total_documents)
        .bind(job.processed_documents)
        .bind(job.failed_documents)
        .bind(&job.error)
        .bind(job.completed_ms)
        .bind(serde_json::to_string(&job.metadata).unwrap_or_default())
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_indexing_job(&self, id: &str) -> CoreResult<Option<IndexingJob>> {
        let row = sqlx::query("SELECT * FROM indexing_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_indexing_jobs(
        &self,
        library_id: &str,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<IndexingJob>> {
        let rows = sqlx::query(
            "SELECT * FROM indexing_jobs WHERE library_id = ? ORDER BY started_ms DESC \
             LIMIT ? OFFSET ?",
        )
        .bind(library_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;
        rows.iter().map(job_from_row).collect()
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_snippet_vectors(&self, _library_id: &str, snippets: &[Snippet]) -> CoreResult<()> {
        for batch in snippets.chunks(crate::embedding::MAX_BATCH_SIZE) {
            for s in batch {
                let Some(embedding) = &s.embedding else { continue };
                sqlx::query("UPDATE snippets SET embedding = ? WHERE id = ?")
                    .bind(vec_to_blob(embedding))
                    .bind(&s.id)
                    .execute(&self.pool)
                    .await
                    .map_err(CoreError::from)?;
            }
        }
        Ok(())
    }

    async fn delete_library_vectors(&self, library_id: &str) -> CoreResult<()> {
        sqlx::query("UPDATE snippets SET embedding = NULL WHERE library_id = ?")
            .bind(library_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn vector_search(&self, params: &VectorSearchParams) -> CoreResult<Vec<VectorSearchResult>> {
        let mut sql = "SELECT * FROM snippets WHERE embedding IS NOT NULL".to_string();
        if params.filter.library_id.is_some() {
            sql.push_str(" AND library_id = ?");
        }
        if params.filter.version_id.is_some() {
            sql.push_str(" AND version_id = ?");
        }
        let mut query = sqlx::query(&sql);
        if let Some(lib) = &params.filter.library_id {
            query = query.bind(lib);
        }
        if let Some(ver) = &params.filter.version_id {
            query = query.bind(ver);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(CoreError::from)?;

        let mut results: Vec<VectorSearchResult> = Vec::new();
        for row in &rows {
            let snippet = snippet_from_row(row)?;
            if !params.filter.topics.is_empty()
                && !snippet.topics.iter().any(|t| params.filter.topics.contains(t))
            {
                continue;
            }
            let Some(embedding) = &snippet.embedding else { continue };
            let similarity = cosine_similarity(&params.embedding, embedding).clamp(0.0, 1.0) as f64;
            if let Some(threshold) = params.threshold {
                if similarity < threshold {
                    continue;
                }
            }
            results.push(VectorSearchResult { snippet, similarity });
        }
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
        let mut sql = "SELECT * FROM snippets WHERE 1=1".to_string();
        if opts.version_id.is_some() {
            sql.push_str(" AND version_id = ?");
        }
        if opts.code_only {
            sql.push_str(" AND has_code = 1");
        }
        sql.push_str(" ORDER BY updated_ms DESC");
        let mut query = sqlx::query(&sql);
        if let Some(ver) = &opts.version_id {
            query = query.bind(ver);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(CoreError::from)?;

        let needle = opts.query.to_lowercase();
        let mut results = Vec::new();
        for row in &rows {
            let snippet = snippet_from_row(row)?;
            let title_match = snippet.title.to_lowercase().contains(&needle);
            let content_match = snippet.content.to_lowercase().contains(&needle);
            let description_match = snippet.description.to_lowercase().contains(&needle);
            if !title_match && !content_match && !description_match {
                continue;
            }
            let score = if title_match {
                0.8
            } else if content_match {
                0.5
            } else {
                0.3
            };
            if score < opts.min_score {
                continue;
            }
            results.push(FullTextSearchResult { snippet, score });
        }
        Ok(results)
    }

    async fn vector_snippet_ids(&self, library_id: &str) -> CoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM snippets WHERE library_id = ? AND embedding IS NOT NULL")
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(CoreError::from))
            .collect()
    }
}
