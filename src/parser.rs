//! Document Parser & Chunker orchestration.
//!
//! Walks a library's source tree, applies the documented file-selection
//! rules (core spec §4.1), and turns each selected file into a [`Document`]
//! plus the [`Snippet`]s produced by [`crate::chunk::chunk_markdown`].

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::chunk_markdown;
use crate::config::ChunkingConfig;
use crate::errors::{CoreError, CoreResult};
use crate::models::{estimate_tokens, Document, ExcludeRule, Snippet, SourceType};

/// Top-level folder names scanned when a library's config does not name
/// explicit folders.
const STANDARD_FOLDERS: &[&str] = &["docs", "examples", "content"];
/// Root-level files always included alongside the standard folder set (and
/// alongside any explicitly configured folders).
const STANDARD_ROOT_FILES: &[&str] = &[
    "readme.md",
    "readme.rst",
    "readme.txt",
    "api.md",
    "reference.md",
];

const DEFAULT_EXCLUDED_FOLDERS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "coverage",
    "archive",
    "deprecated",
    "i18n",
];
const DEFAULT_EXCLUDED_FILES: &[&str] = &[
    "changelog.md",
    "license.md",
    "license",
    "code_of_conduct.md",
    "contributing.md",
    "security.md",
];
const ALLOWED_EXTENSIONS: &[&str] = &["md", "mdx", "rst"];

/// The result of parsing one library's source tree.
pub struct ParsedLibrary {
    pub documents: Vec<Document>,
    pub snippets: Vec<Snippet>,
    /// Non-fatal issues encountered while parsing (per-file failures,
    /// malformed per-library config, etc).
    pub warnings: Vec<String>,
}

/// Per-library parsing options, mirroring a library's `codex7.json` /
/// `context7.json` sidecar config (core spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Explicit folders to scan, relative to the library root. When empty,
    /// the standard folder set applies.
    pub explicit_folders: Vec<String>,
    pub exclude_rules: Vec<ExcludeRule>,
}

fn is_default_excluded_folder(segment: &str) -> bool {
    DEFAULT_EXCLUDED_FOLDERS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(segment))
}

fn is_default_excluded_file(file_name: &str) -> bool {
    DEFAULT_EXCLUDED_FILES
        .iter()
        .any(|f| f.eq_ignore_ascii_case(file_name))
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn to_posix(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `rel_path` (POSIX, no leading `/`) is a root-level README/API
/// file, always included alongside whichever folder set applies.
fn is_standard_root_file(rel_path: &str) -> bool {
    if rel_path.contains('/') {
        return false;
    }
    let lower = rel_path.to_lowercase();
    STANDARD_ROOT_FILES.iter().any(|f| *f == lower)
}

/// Whether `rel_path` (POSIX, no leading `/`) falls under one of the
/// selected top-level folders, or is one of the standard root files —
/// the latter always included, explicit folders or not.
fn is_selected_path(rel_path: &str, options: &ParseOptions) -> bool {
    let top_level = rel_path.split('/').next().unwrap_or("");

    if is_standard_root_file(rel_path) {
        return true;
    }

    if !options.explicit_folders.is_empty() {
        return options
            .explicit_folders
            .iter()
            .any(|f| f.eq_ignore_ascii_case(top_level));
    }

    STANDARD_FOLDERS.iter().any(|f| f.eq_ignore_ascii_case(top_level))
}

fn is_excluded(rel_path: &str, options: &ParseOptions) -> bool {
    let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    if is_default_excluded_file(file_name) {
        return true;
    }
    if rel_path
        .split('/')
        .any(|segment| is_default_excluded_folder(segment))
    {
        return true;
    }
    options.exclude_rules.iter().any(|r| r.matches(rel_path))
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn title_from_path(rel_path: &str) -> String {
    let stem = Path::new(rel_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(rel_path);
    stem.replace(['-', '_'], " ")
}

/// The file's first `# ` (level-1 ATX) header line, if any.
fn first_h1_header(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let trimmed = line.trim_start();
        let hashes = trimmed.chars().take_while(|c| *c == '#').count();
        if hashes != 1 {
            return None;
        }
        let rest = trimmed[1..].trim();
        (!rest.is_empty()).then(|| rest.to_string())
    })
}

/// Document title: the file's first `# ` header, falling back to the
/// filename stem.
fn document_title(content: &str, rel_path: &str) -> String {
    first_h1_header(content).unwrap_or_else(|| title_from_path(rel_path))
}

/// Parses a library's source tree rooted at `root` into documents and
/// snippets. Per-file failures are recorded as warnings and do not abort
/// the walk; a zero-file selection is a warning; a zero-snippet result
/// after a non-empty selection is fatal (core spec §4.1 failure semantics).
pub fn parse_library_tree(
    root: &Path,
    library_id: &str,
    options: &ParseOptions,
    chunking: &ChunkingConfig,
    now_ms: i64,
) -> CoreResult<ParsedLibrary> {
    let mut documents = Vec::new();
    let mut snippets = Vec::new();
    let mut warnings = Vec::new();
    let mut selected_count = 0usize;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let msg = format!("failed to read directory entry: {e}");
                tracing::warn!("{msg}");
                warnings.push(msg);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path: PathBuf = entry.path().to_path_buf();
        if !has_allowed_extension(&path) {
            continue;
        }
        let rel = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let rel_path = to_posix(rel);

        if !is_selected_path(&rel_path, options) {
            continue;
        }
        if is_excluded(&rel_path, options) {
            continue;
        }

        selected_count += 1;

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                let msg = format!("failed to read {rel_path}: {e}");
                tracing::warn!("{msg}");
                warnings.push(msg);
                continue;
            }
        };

        let top_level = rel_path.split('/').next().unwrap_or("");
        let source_type = SourceType::infer_from_folder(top_level);
        let doc_path = format!("/{rel_path}");

        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            library_id: library_id.to_string(),
            version_id: None,
            path: doc_path,
            title: document_title(&content, &rel_path),
            content: content.clone(),
            content_hash: content_hash(&content),
            tokens: estimate_tokens(&content),
            source_type,
            source_path: Some(rel_path.clone()),
            source_url: None,
            language: "en".to_string(),
            indexed_ms: now_ms,
        };

        let file_snippets =
            chunk_markdown(library_id, &document.path, source_type, &content, chunking, now_ms);
        snippets.extend(file_snippets);
        documents.push(document);
    }

    if selected_count == 0 {
        let msg = format!("no files matched selection rules under {}", root.display());
        tracing::warn!("{msg}");
        warnings.push(msg);
    } else if snippets.is_empty() {
        return Err(CoreError::ValidationFailed(format!(
            "zero snippets produced from {selected_count} selected file(s) under {}",
            root.display()
        )));
    }

    Ok(ParsedLibrary {
        documents,
        snippets,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn exclude_pattern_dialects_scenario() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs/node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("docs/app-sdk/v2.3")).unwrap();
        fs::create_dir_all(dir.path().join("docs/dist")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "## A\n\nSome content here that is long enough.").unwrap();
        fs::write(
            dir.path().join("docs/node_modules/pkg/doc.md"),
            "## X\n\nexcluded via bare dialect, long enough content.",
        )
        .unwrap();
        fs::write(
            dir.path().join("docs/app-sdk/v2.3/api.md"),
            "## Y\n\nexcluded via path-prefix dialect, long enough content.",
        )
        .unwrap();
        fs::write(
            dir.path().join("docs/dist/z.md"),
            "## Z\n\nexcluded via root-only dialect, long enough content.",
        )
        .unwrap();
        fs::write(dir.path().join("docs/CHANGELOG.md"), "not indexed").unwrap();

        let options = ParseOptions {
            explicit_folders: vec!["docs".to_string()],
            exclude_rules: vec![
                ExcludeRule::parse("node_modules"),
                ExcludeRule::parse("app-sdk/v2.3"),
            ],
        };
        let result = parse_library_tree(
            dir.path(),
            "lib1",
            &options,
            &ChunkingConfig::default(),
            0,
        )
        .unwrap();

        let paths: Vec<&str> = result.documents.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"/docs/a.md"));
        assert!(!paths.iter().any(|p| p.contains("node_modules")));
        assert!(!paths.iter().any(|p| p.contains("app-sdk")));
        assert!(!paths.iter().any(|p| p.contains("CHANGELOG")));
    }

    #[test]
    fn root_readme_included_alongside_explicit_folders() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "## A\n\nSome content here that is long enough.").unwrap();
        fs::write(
            dir.path().join("README.md"),
            "# Widgets\n\nRoot readme content, long enough to survive chunking easily.",
        )
        .unwrap();

        let options = ParseOptions {
            explicit_folders: vec!["docs".to_string()],
            exclude_rules: vec![],
        };
        let result = parse_library_tree(dir.path(), "lib1", &options, &ChunkingConfig::default(), 0)
            .unwrap();

        let paths: Vec<&str> = result.documents.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"/docs/a.md"));
        assert!(paths.contains(&"/README.md"));
    }

    #[test]
    fn document_title_prefers_leading_h1_over_filename_stem() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(
            dir.path().join("docs/getting-started.md"),
            "# Getting Started Guide\n\n## A\n\nLong enough body content for a section boundary.",
        )
        .unwrap();

        let options = ParseOptions {
            explicit_folders: vec!["docs".to_string()],
            exclude_rules: vec![],
        };
        let result = parse_library_tree(dir.path(), "lib1", &options, &ChunkingConfig::default(), 0)
            .unwrap();

        assert_eq!(result.documents[0].title, "Getting Started Guide");
    }

    #[test]
    fn zero_files_is_a_warning_not_fatal() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        let options = ParseOptions {
            explicit_folders: vec!["docs".to_string()],
            exclude_rules: vec![],
        };
        let result =
            parse_library_tree(dir.path(), "lib1", &options, &ChunkingConfig::default(), 0)
                .unwrap();
        assert!(result.documents.is_empty());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn zero_snippets_from_nonempty_selection_is_fatal() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "hi").unwrap();
        let options = ParseOptions {
            explicit_folders: vec!["docs".to_string()],
            exclude_rules: vec![],
        };
        let err = parse_library_tree(dir.path(), "lib1", &options, &ChunkingConfig::default(), 0)
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::ValidationFailed);
    }
}
