//! Database schema migrations.
//!
//! Creates the six relational tables (`libraries, versions, documents,
//! snippets, indexing_jobs, migrations`) plus their indexes (core spec §6)
//! and an FTS5 shadow table used by `full_text_search`. Idempotent: safe to
//! run on every startup.

use anyhow::Result;
use sqlx::sqlite::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS libraries (
            id TEXT PRIMARY KEY,
            identifier TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            org TEXT NOT NULL,
            project TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            repository_url TEXT,
            homepage_url TEXT,
            trust_score INTEGER NOT NULL DEFAULT 5,
            keywords_json TEXT NOT NULL DEFAULT '[]',
            topics_json TEXT NOT NULL DEFAULT '[]',
            rules_json TEXT NOT NULL DEFAULT '[]',
            source_path TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_ms INTEGER NOT NULL,
            updated_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
            version_string TEXT NOT NULL,
            version_normalized TEXT NOT NULL,
            is_latest INTEGER NOT NULL DEFAULT 0,
            is_deprecated INTEGER NOT NULL DEFAULT 0,
            document_count INTEGER NOT NULL DEFAULT 0,
            git_commit_sha TEXT,
            release_date_ms INTEGER,
            indexed_ms INTEGER NOT NULL,
            updated_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
            version_id TEXT REFERENCES versions(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            tokens INTEGER NOT NULL,
            source_type TEXT NOT NULL,
            source_path TEXT,
            source_url TEXT,
            language TEXT NOT NULL DEFAULT 'en',
            indexed_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snippets (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
            version_id TEXT REFERENCES versions(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            source_file TEXT NOT NULL,
            source_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            code_blocks_json TEXT NOT NULL DEFAULT '[]',
            topics_json TEXT NOT NULL DEFAULT '[]',
            has_code INTEGER NOT NULL DEFAULT 0,
            code_block_count INTEGER NOT NULL DEFAULT 0,
            tokens INTEGER NOT NULL,
            quality_score REAL NOT NULL DEFAULT 0.5,
            embedding BLOB,
            updated_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexing_jobs (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL,
            version_id TEXT,
            status TEXT NOT NULL,
            total_documents INTEGER NOT NULL DEFAULT 0,
            processed_documents INTEGER NOT NULL DEFAULT 0,
            failed_documents INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_ms INTEGER NOT NULL,
            completed_ms INTEGER,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='snippets_fts'",
    )
    .fetch_one(pool)
    .await?;
    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE snippets_fts USING fts5(
                snippet_id UNINDEXED,
                library_id UNINDEXED,
                title,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_libraries_identifier ON libraries(identifier)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_versions_library_version \
         ON versions(library_id, version_string)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_versions_library_latest \
         ON versions(library_id, is_latest) WHERE is_latest = 1",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_version_id ON documents(version_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snippets_library_id ON snippets(library_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snippets_version_id ON snippets(version_id)")
        .execute(pool)
        .await?;

    Ok(())
}
