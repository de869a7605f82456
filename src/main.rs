//! Operator CLI for Codex7.
//!
//! This is not the MCP tool surface (that JSON-RPC framing is out of
//! scope for this crate) — it is the maintenance CLI an operator uses to
//! drive the same indexing and retrieval engine locally: registering a
//! project, re-indexing it, and issuing ad-hoc retrieval queries against
//! the local database.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use codex7::config::{self, Config};
use codex7::db;
use codex7::errors::CoreError;
use codex7::indexing::IndexingOrchestrator;
use codex7::locks::LibraryLockTable;
use codex7::migrate;
use codex7::models::{ExcludeRule, Library};
use codex7::parser::ParseOptions;
use codex7::retrieval::{RetrievalEngine, SearchFilters};
use codex7::store::sqlite::SqliteStore;
use codex7::embedding;

#[derive(Parser)]
#[command(
    name = "codex7",
    about = "Codex7 — a self-hostable documentation knowledge base: indexing and retrieval",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/codex7.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Re-index a local project directory into a library
    Index {
        /// Root directory of the project to index
        root: PathBuf,
        /// Organization segment of the library identifier
        #[arg(long)]
        org: String,
        /// Project segment of the library identifier
        #[arg(long)]
        project: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        /// Explicit folders to scan (repeatable); standard set used if omitted
        #[arg(long = "folder")]
        folders: Vec<String>,
        /// Additional exclude rules (repeatable), any of the three dialects
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Resolve a library name to its indexed identifier (mode A)
    Resolve {
        name: String,
    },

    /// Fetch documentation for a library: a single document, topic-filtered,
    /// or semantic, depending on which flags are given (modes B/C/D)
    Docs {
        library_id: String,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long = "topics")]
        topics: Vec<String>,
        #[arg(long, default_value_t = 5000)]
        tokens: i64,
    },

    /// Hybrid search across all indexed libraries (mode E)
    Search {
        query: String,
        #[arg(long)]
        library: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
    },

    /// List the indexed versions of a library
    Versions {
        library_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            let code = e
                .downcast_ref::<CoreError>()
                .map(|c| c.exit_code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config).map_err(|e| CoreError::ConfigInvalid(e.to_string()))?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            root,
            org,
            project,
            title,
            description,
            folders,
            exclude,
        } => {
            let (relational, vectors) = open_stores(&cfg).await?;
            let embedder = embedding::create_client(&cfg.embedding)?;
            let locks = Arc::new(LibraryLockTable::new());
            let orchestrator = IndexingOrchestrator::new(
                relational.clone(),
                vectors,
                Arc::from(embedder),
                locks,
                cfg.chunking.clone(),
                cfg.embedding.clone(),
            );

            let identifier = Library::make_identifier(&org, &project);
            let now_ms = now_ms();
            let library = Library {
                id: uuid::Uuid::new_v4().to_string(),
                identifier,
                name: title.clone().unwrap_or_else(|| project.clone()),
                org,
                project,
                description,
                repository_url: None,
                homepage_url: None,
                trust_score: 10,
                keywords: Vec::new(),
                topics: Vec::new(),
                rules: Vec::new(),
                source_path: Some(root.display().to_string()),
                metadata: Default::default(),
                created_ms: now_ms,
                updated_ms: now_ms,
            };

            let options = ParseOptions {
                explicit_folders: folders,
                exclude_rules: exclude.iter().map(|s| ExcludeRule::parse(s)).collect(),
            };

            let job = orchestrator
                .reindex_library(library.clone(), &root, &options, now_ms, None)
                .await?;

            println!(
                "Indexed {} ({}): {} document(s), job status {:?}",
                library.name, library.identifier, job.total_documents, job.status
            );
        }
        Commands::Resolve { name } => {
            let (relational, vectors) = open_stores(&cfg).await?;
            let embedder = embedding::create_client(&cfg.embedding)?;
            let engine = RetrievalEngine::new(relational, vectors, Arc::from(embedder));
            let result = engine.resolve_library_id(&name).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Docs {
            library_id,
            path,
            topic,
            topics,
            tokens,
        } => {
            let (relational, vectors) = open_stores(&cfg).await?;
            let embedder = embedding::create_client(&cfg.embedding)?;
            let engine = RetrievalEngine::new(relational, vectors, Arc::from(embedder));

            let rendered = if let Some(path) = path {
                let doc = engine.get_document(&library_id, &path, tokens).await?;
                format!("# {}\n\n{}", doc.title, doc.content)
            } else if !topics.is_empty() {
                engine.get_docs_by_topics(&library_id, &topics, tokens).await?
            } else if let Some(topic) = topic {
                engine.get_docs_by_topic_text(&library_id, &topic, tokens).await?
            } else {
                engine.get_docs_by_topics(&library_id, &[], tokens).await?
            };
            println!("{rendered}");
        }
        Commands::Search {
            query,
            library,
            version,
            limit,
            min_score,
        } => {
            let (relational, vectors) = open_stores(&cfg).await?;
            let embedder = embedding::create_client(&cfg.embedding)?;
            let engine = RetrievalEngine::new(relational, vectors, Arc::from(embedder));
            let filters = SearchFilters {
                library,
                version,
                source_type: None,
            };
            let result = engine.hybrid_search(&query, filters, limit, min_score).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Versions { library_id } => {
            let (relational, vectors) = open_stores(&cfg).await?;
            let embedder = embedding::create_client(&cfg.embedding)?;
            let engine = RetrievalEngine::new(relational, vectors, Arc::from(embedder));
            let result = engine.list_versions(&library_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

type Stores = (
    Arc<dyn codex7::store::RelationalStore>,
    Arc<dyn codex7::store::VectorStore>,
);

async fn open_stores(cfg: &Config) -> anyhow::Result<Stores> {
    if cfg.db.migration_strategy == "auto" {
        migrate::run_migrations(cfg).await?;
    }
    let pool = db::connect(cfg).await?;
    let store = Arc::new(SqliteStore::new(pool));
    Ok((store.clone(), store))
}

fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
